use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::appointment_routes;
use appointment_cell::SchedulingState;
use therapist_cell::handlers::AvailabilityState;
use therapist_cell::router::availability_routes;

/// Both cells share one availability store, so windows written through the
/// availability routes are what booking and slot queries read.
pub fn create_router(state: Arc<SchedulingState>) -> Router {
    let availability = Arc::new(AvailabilityState {
        config: state.config.clone(),
        store: state.availability.clone(),
    });

    Router::new()
        .route("/", get(|| async { "Clinic scheduling API is running!" }))
        .merge(availability_routes(availability))
        .merge(appointment_routes(state))
}
