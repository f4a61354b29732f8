// src/models/messages.rs
// Wire format for the realtime socket: {"event": "<name>", "data": {...}}
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::location::Coordinate;
use crate::models::ride::{CancellationReason, DriverSnapshot, Ride, RideStatus};

/// Events sent by driver and rider apps.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    RegisterDriver(RegisterDriver),
    #[serde(alias = "register_user")]
    RegisterRider(RegisterRider),
    DriverLocation(LocationReport),
    UpdateLocation(LocationUpdate),
    DriverResponse(DriverResponse),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDriver {
    pub driver_id: String,
    pub location: Option<Coordinate>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRider {
    pub ride_id: String,
    pub user_id: Option<String>,
}

/// Periodic position report; also carries the driver's own availability toggle.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationReport {
    pub driver_id: String,
    pub lat: f64,
    pub lng: f64,
    pub available: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    pub driver_id: String,
    pub location: Coordinate,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverResponse {
    pub ride_id: String,
    pub driver_id: String,
    pub accepted: bool,
    pub info: Option<DriverInfo>,
}

/// Optional self-description a driver sends along with an acceptance.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DriverInfo {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub car_plate: Option<String>,
    pub car_type: Option<String>,
}

impl DriverInfo {
    /// Fills gaps in the driver's own info from the stored record.
    pub fn into_snapshot(self, fallback: DriverSnapshot) -> DriverSnapshot {
        DriverSnapshot {
            name: self.name.unwrap_or(fallback.name),
            phone: self.phone.unwrap_or(fallback.phone),
            car_plate: self.car_plate.unwrap_or(fallback.car_plate),
            car_type: self.car_type.unwrap_or(fallback.car_type),
        }
    }
}

/// Events pushed to connected apps.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    RideUpdate(RideUpdate),
    RideRequest(RideOffer),
    RideConfirmedToDriver(RideConfirmation),
    RideCancelled(RideCancellation),
    DriverResponseUser(DriverResponse),
    Error(ErrorEvent),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::RideUpdate(_) => "ride_update",
            ServerEvent::RideRequest(_) => "ride_request",
            ServerEvent::RideConfirmedToDriver(_) => "ride_confirmed_to_driver",
            ServerEvent::RideCancelled(_) => "ride_cancelled",
            ServerEvent::DriverResponseUser(_) => "driver_response_user",
            ServerEvent::Error(_) => "error",
        }
    }

    pub fn ride_update(ride: &Ride, message: impl Into<String>) -> Self {
        ServerEvent::RideUpdate(RideUpdate {
            ride_id: ride.id.clone(),
            status: ride.status,
            driver: ride.driver_info.clone(),
            message: message.into(),
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorEvent {
            message: message.into(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RideUpdate {
    pub ride_id: String,
    pub status: RideStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<DriverSnapshot>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RideOffer {
    pub ride_id: String,
    pub pickup: Coordinate,
    pub destination: Coordinate,
    pub destination_name: String,
    pub destination_address: String,
    pub user_phone: String,
    pub user_id: Option<String>,
    pub fare: f64,
    pub distance: f64,
    pub time: f64,
    pub timestamp: DateTime<Utc>,
}

impl RideOffer {
    pub fn for_ride(ride: &Ride) -> Self {
        Self {
            ride_id: ride.id.clone(),
            pickup: ride.pickup,
            destination: ride.destination,
            destination_name: ride.destination_name.clone(),
            destination_address: ride.destination_address.clone(),
            user_phone: ride.rider_phone.clone(),
            user_id: ride.rider_id.clone(),
            fare: ride.fare,
            distance: ride.distance_km,
            time: ride.duration_min,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RideConfirmation {
    pub ride_id: String,
    pub user_phone: String,
    pub destination: String,
    pub pickup: Coordinate,
    pub fare: f64,
}

impl RideConfirmation {
    pub fn for_ride(ride: &Ride) -> Self {
        Self {
            ride_id: ride.id.clone(),
            user_phone: ride.rider_phone.clone(),
            destination: ride.destination_name.clone(),
            pickup: ride.pickup,
            fare: ride.fare,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RideCancellation {
    pub ride_id: String,
    pub reason: CancellationReason,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorEvent {
    pub message: String,
}
