// src/handlers/debug_handler.rs
use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::state::AppState;

/// Live view of who is connected and which offers are outstanding.
pub async fn debug_drivers(State(state): State<Arc<AppState>>) -> Json<Value> {
    let pending_offers: Vec<Value> = state
        .offers
        .pending_rides()
        .into_iter()
        .filter_map(|ride_id| {
            let driver_id = state.offers.pending_driver(&ride_id)?;
            Some(json!({ "rideId": ride_id, "driverId": driver_id }))
        })
        .collect();

    Json(json!({
        "connectedDrivers": state.registry.connected_drivers(),
        "registeredRides": state.registry.registered_rides(),
        "pendingOffers": pending_offers,
    }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "store": state.store_kind,
        "connectedDrivers": state.registry.connected_drivers().len(),
    }))
}
