// libs/therapist-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query, State,
    },
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::context::RequestContext;
use shared_models::error::AppError;

use crate::models::{AvailabilityQuery, SetAvailabilityRequest, UpdateWindowRequest};
use crate::services::availability::AvailabilityStore;

pub struct AvailabilityState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn AvailabilityStore>,
}

fn request_context(auth: &Authorization<Bearer>, user: User) -> RequestContext {
    RequestContext::new(user, auth.token())
}

fn ensure_owner(ctx: &RequestContext, therapist_id: Uuid) -> Result<(), AppError> {
    if ctx.acts_for(&therapist_id.to_string()) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only the therapist or an admin can change this availability".to_string(),
        ))
    }
}

// ==============================================================================
// AVAILABILITY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_availability(
    State(state): State<Arc<AvailabilityState>>,
    Path(therapist_id): Path<Uuid>,
    query: Result<Query<AvailabilityQuery>, QueryRejection>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let ctx = request_context(&auth, user);
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let windows = state
        .store
        .list_windows(therapist_id, query.include_inactive, &ctx)
        .await?;

    Ok(Json(json!(windows)))
}

#[axum::debug_handler]
pub async fn set_availability(
    State(state): State<Arc<AvailabilityState>>,
    Path(therapist_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    payload: Result<Json<SetAvailabilityRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let ctx = request_context(&auth, user);
    ensure_owner(&ctx, therapist_id)?;

    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let windows = state
        .store
        .set_availability(therapist_id, request.windows, &ctx)
        .await?;

    Ok(Json(json!(windows)))
}

#[axum::debug_handler]
pub async fn update_window(
    State(state): State<Arc<AvailabilityState>>,
    Path((therapist_id, window_id)): Path<(Uuid, Uuid)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    payload: Result<Json<UpdateWindowRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let ctx = request_context(&auth, user);
    ensure_owner(&ctx, therapist_id)?;

    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let window = state
        .store
        .set_window_active(therapist_id, window_id, request.is_active, &ctx)
        .await?;

    Ok(Json(json!(window)))
}
