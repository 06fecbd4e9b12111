// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
    middleware,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::state::SchedulingState;

pub fn appointment_routes(state: Arc<SchedulingState>) -> Router {
    Router::new()
        .route("/appointments", post(handlers::book_appointment))
        .route("/appointments/{appointment_id}", get(handlers::get_appointment))
        .route(
            "/appointments/{appointment_id}/status",
            put(handlers::update_appointment_status),
        )
        .route(
            "/therapists/{therapist_id}/appointments",
            get(handlers::list_therapist_appointments),
        )
        .route("/therapists/{therapist_id}/slots", get(handlers::get_available_slots))
        .route("/therapists/{therapist_id}/conflicts", get(handlers::check_conflicts))
        .route(
            "/clients/{client_id}/appointments",
            get(handlers::list_client_appointments),
        )
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
