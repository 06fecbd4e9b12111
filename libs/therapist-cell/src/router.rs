// libs/therapist-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch},
    middleware,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AvailabilityState};

pub fn availability_routes(state: Arc<AvailabilityState>) -> Router {
    Router::new()
        .route(
            "/therapists/{therapist_id}/availability",
            get(handlers::get_availability).put(handlers::set_availability),
        )
        .route(
            "/therapists/{therapist_id}/availability/{window_id}",
            patch(handlers::update_window),
        )
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
