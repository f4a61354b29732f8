use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

pub mod debug_handler;
pub mod driver_handler;
pub mod ride_handler;
pub mod socket_handler;

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(socket_handler::ws_handler))
        .route("/api/rides", post(ride_handler::create_ride))
        .route("/api/rides/match", post(ride_handler::match_ride))
        .route("/api/rides/cancel", post(ride_handler::cancel_ride))
        .route("/api/rides/start", post(ride_handler::start_ride))
        .route("/api/rides/end", post(ride_handler::end_ride))
        .route("/api/rides/status/:ride_id", get(ride_handler::ride_status))
        .route("/api/admin/drivers", post(driver_handler::create_driver))
        .route("/api/admin/drivers/:driver_id/verify", post(driver_handler::verify_driver))
        .route("/debug/drivers", get(debug_handler::debug_drivers))
        .route("/health", get(debug_handler::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
