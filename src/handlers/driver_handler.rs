// src/handlers/driver_handler.rs
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
    errors::DispatchError,
    models::driver::{Driver, DriverPatch},
    state::AppState,
    utils::id_generator::{IdGenerator, IdType},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDriverRequest {
    pub id: Option<String>,
    pub name: String,
    pub phone: String,
    pub car_plate: String,
    pub car_type: String,
}

pub async fn create_driver(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateDriverRequest>,
) -> Result<(StatusCode, Json<Value>), DispatchError> {
    if request.name.trim().is_empty() {
        return Err(DispatchError::validation_error("name", "Driver name is required"));
    }
    if request.phone.trim().is_empty() {
        return Err(DispatchError::validation_error("phone", "Driver phone is required"));
    }

    let id = request
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| IdGenerator::generate(IdType::Driver));
    if state.drivers.find_driver(&id).await?.is_some() {
        return Err(DispatchError::Conflict(format!("Driver {} already exists", id)));
    }

    let driver = Driver::new(id, request.name, request.phone, request.car_plate, request.car_type);
    state.drivers.upsert_driver(driver.clone()).await?;
    tracing::info!("Registered driver {} (pending verification)", driver.id);

    Ok((StatusCode::CREATED, Json(json!({ "success": true, "driver": driver }))))
}

pub async fn verify_driver(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<String>,
) -> Result<Json<Value>, DispatchError> {
    let driver = state
        .drivers
        .update_driver(&driver_id, DriverPatch::verified())
        .await?
        .ok_or_else(|| DispatchError::driver_not_found(&driver_id))?;

    tracing::info!("Driver {} verified", driver_id);
    Ok(Json(json!({ "success": true, "driver": driver })))
}
