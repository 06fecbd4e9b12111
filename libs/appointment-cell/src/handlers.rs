// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::context::RequestContext;
use shared_models::error::AppError;

use crate::models::{
    parse_status_filter, Appointment, AppointmentRangeQuery, AppointmentStatus,
    BookAppointmentRequest, ConflictCheckQuery, SchedulingError, Slot, SlotQuery,
    UpdateStatusRequest,
};
use crate::state::SchedulingState;

fn request_context(auth: &Authorization<Bearer>, user: User) -> RequestContext {
    RequestContext::new(user, auth.token())
}

fn ensure_acts_for(ctx: &RequestContext, user_id: Uuid, message: &str) -> Result<(), AppError> {
    if ctx.acts_for(&user_id.to_string()) {
        Ok(())
    } else {
        Err(AppError::Forbidden(message.to_string()))
    }
}

fn is_party(ctx: &RequestContext, appointment: &Appointment) -> bool {
    ctx.acts_for(&appointment.client_id.to_string()) || ctx.acts_for(&appointment.therapist_id.to_string())
}

fn ensure_range(query: &AppointmentRangeQuery) -> Result<(), AppError> {
    if query.end <= query.start {
        return Err(AppError::validation("end", "must be after start"));
    }
    Ok(())
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<SchedulingState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    payload: Result<Json<BookAppointmentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let ctx = request_context(&auth, user);
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    if !ctx.acts_for(&request.client_id.to_string()) && !ctx.acts_for(&request.therapist_id.to_string()) {
        return Err(AppError::Forbidden(
            "Appointments can only be booked by the client, the therapist or an admin".to_string(),
        ));
    }

    let appointment = state.booking.validate_and_book(request, &ctx).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": appointment.id,
            "appointment": appointment,
        })),
    ))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<SchedulingState>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let ctx = request_context(&auth, user);

    let appointment = state
        .appointments
        .get_appointment(appointment_id, &ctx)
        .await
        .map_err(SchedulingError::from)?;

    if !is_party(&ctx, &appointment) {
        return Err(AppError::Forbidden("Not a party to this appointment".to_string()));
    }

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<Arc<SchedulingState>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let ctx = request_context(&auth, user);
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let appointment = state
        .appointments
        .get_appointment(appointment_id, &ctx)
        .await
        .map_err(SchedulingError::from)?;

    let staff = ctx.acts_for(&appointment.therapist_id.to_string());
    if !staff {
        if !is_party(&ctx, &appointment) {
            return Err(AppError::Forbidden("Not a party to this appointment".to_string()));
        }
        if request.status != AppointmentStatus::Cancelled {
            return Err(AppError::Forbidden("Clients may only cancel appointments".to_string()));
        }
    }

    let updated = state
        .lifecycle
        .transition(appointment_id, request.status, request.notes, &ctx)
        .await?;

    Ok(Json(json!({
        "appointment": updated,
        "valid_transitions": state.lifecycle.valid_transitions(updated.status),
    })))
}

#[axum::debug_handler]
pub async fn list_therapist_appointments(
    State(state): State<Arc<SchedulingState>>,
    Path(therapist_id): Path<Uuid>,
    query: Result<Query<AppointmentRangeQuery>, QueryRejection>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let ctx = request_context(&auth, user);
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    ensure_acts_for(&ctx, therapist_id, "Only the therapist or an admin can list these appointments")?;
    ensure_range(&query)?;

    let statuses = parse_status_filter(query.status.as_deref())?;
    let appointments = state
        .appointments
        .list_appointments(therapist_id, query.start, query.end, statuses.as_deref(), &ctx)
        .await
        .map_err(SchedulingError::from)?;

    Ok(Json(json!(appointments)))
}

#[axum::debug_handler]
pub async fn list_client_appointments(
    State(state): State<Arc<SchedulingState>>,
    Path(client_id): Path<Uuid>,
    query: Result<Query<AppointmentRangeQuery>, QueryRejection>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let ctx = request_context(&auth, user);
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    ensure_acts_for(&ctx, client_id, "Only the client or an admin can list these appointments")?;
    ensure_range(&query)?;

    let statuses = parse_status_filter(query.status.as_deref())?;
    let appointments = state
        .appointments
        .list_client_appointments(client_id, query.start, query.end, statuses.as_deref(), &ctx)
        .await
        .map_err(SchedulingError::from)?;

    Ok(Json(json!(appointments)))
}

// ==============================================================================
// SLOT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<SchedulingState>>,
    Path(therapist_id): Path<Uuid>,
    query: Result<Query<SlotQuery>, QueryRejection>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let ctx = request_context(&auth, user);
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let plan = state
        .slots
        .compute(
            therapist_id,
            query.start,
            query.end,
            query.duration_minutes,
            query.granularity_minutes,
            &ctx,
        )
        .await?;
    let slots: Vec<Slot> = plan.iter().collect();

    Ok(Json(json!({
        "therapist_id": therapist_id,
        "timezone": plan.timezone().name(),
        "slots": slots,
    })))
}

#[axum::debug_handler]
pub async fn check_conflicts(
    State(state): State<Arc<SchedulingState>>,
    Path(therapist_id): Path<Uuid>,
    query: Result<Query<ConflictCheckQuery>, QueryRejection>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let ctx = request_context(&auth, user);
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let response = state
        .conflicts
        .check_conflicts(
            therapist_id,
            query.start,
            query.duration_minutes,
            query.exclude_appointment_id,
            &ctx,
        )
        .await?;

    Ok(Json(json!(response)))
}
