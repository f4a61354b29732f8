// src/handlers/ride_handler.rs
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing;

use crate::{
    errors::{DispatchError, DispatchResult, ValidationError},
    models::ride::{CancellationReason, NewRide},
    services::{dispatch_engine::DispatchOperations, ride_lifecycle::RideLifecycleOperations},
    state::AppState,
    utils::id_generator::{IdGenerator, IdType},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    pub ride_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub ride_id: String,
    #[serde(default)]
    pub reason: CancellationReason,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverActionRequest {
    pub ride_id: String,
    pub driver_id: String,
}

fn validate_new_ride(request: &NewRide) -> DispatchResult<()> {
    let mut errors = Vec::new();
    let mut check = |ok: bool, field: &str, message: &str| {
        if !ok {
            errors.push(ValidationError {
                field: field.to_string(),
                message: message.to_string(),
            });
        }
    };

    check(!request.rider_phone.trim().is_empty(), "riderPhone", "Rider phone is required");
    check(request.pickup.is_valid(), "pickup", "Pickup coordinates are out of range");
    check(request.destination.is_valid(), "destination", "Destination coordinates are out of range");
    check(request.fare.is_finite() && request.fare >= 0.0, "fare", "Fare must be a non-negative number");
    check(
        request
            .rider_id
            .as_deref()
            .is_none_or(|id| IdGenerator::validate_id(id, Some(IdType::Rider))),
        "riderId",
        "Rider ID is malformed",
    );

    if errors.is_empty() {
        Ok(())
    } else {
        Err(DispatchError::ValidationFailed(errors))
    }
}

fn require(field: &str, value: &str) -> DispatchResult<()> {
    if value.trim().is_empty() {
        return Err(DispatchError::MissingRequiredField(field.to_string()));
    }
    Ok(())
}

fn require_ride_id(value: &str) -> DispatchResult<()> {
    require("rideId", value)?;
    if !IdGenerator::validate_id(value, Some(IdType::Ride)) {
        return Err(DispatchError::validation_error("rideId", "Ride ID is malformed"));
    }
    Ok(())
}

pub async fn create_ride(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NewRide>,
) -> Result<(StatusCode, Json<Value>), DispatchError> {
    validate_new_ride(&request)?;
    let ride = state.rides.create_ride(request).await?;
    tracing::info!("Created ride {}", ride.id);

    Ok((StatusCode::CREATED, Json(json!({ "success": true, "ride": ride }))))
}

pub async fn match_ride(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MatchRequest>,
) -> Result<Json<Value>, DispatchError> {
    require_ride_id(&request.ride_id)?;

    // Own task so a client hanging up cannot abandon a claimed driver mid-offer
    let engine = state.dispatch.clone();
    let ride_id = request.ride_id.clone();
    let outcome = tokio::spawn(async move { engine.dispatch(&ride_id).await })
        .await
        .map_err(|e| DispatchError::internal_error(format!("dispatch task failed: {}", e)))??;

    Ok(Json(json!({
        "success": outcome.success(),
        "message": outcome.message(),
        "outcome": outcome,
    })))
}

pub async fn cancel_ride(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<Value>, DispatchError> {
    require_ride_id(&request.ride_id)?;
    let ride = state.lifecycle.cancel(&request.ride_id, request.reason).await?;
    Ok(Json(json!({ "success": true, "ride": ride.to_status_response() })))
}

pub async fn start_ride(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DriverActionRequest>,
) -> Result<Json<Value>, DispatchError> {
    require_ride_id(&request.ride_id)?;
    require("driverId", &request.driver_id)?;
    let ride = state.lifecycle.start(&request.ride_id, &request.driver_id).await?;
    Ok(Json(json!({ "success": true, "ride": ride.to_status_response() })))
}

pub async fn end_ride(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DriverActionRequest>,
) -> Result<Json<Value>, DispatchError> {
    require_ride_id(&request.ride_id)?;
    require("driverId", &request.driver_id)?;
    let ride = state.lifecycle.end(&request.ride_id, &request.driver_id).await?;
    Ok(Json(json!({ "success": true, "ride": ride.to_status_response() })))
}

pub async fn ride_status(
    State(state): State<Arc<AppState>>,
    Path(ride_id): Path<String>,
) -> Result<Json<Value>, DispatchError> {
    require_ride_id(&ride_id)?;
    let ride = state
        .rides
        .find_ride(&ride_id)
        .await?
        .ok_or_else(|| DispatchError::ride_not_found(&ride_id))?;

    Ok(Json(json!({ "success": true, "ride": ride.to_status_response() })))
}
