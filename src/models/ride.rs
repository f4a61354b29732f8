// src/models/ride.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::location::Coordinate;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Searching,      // Looking for a driver
    DriverAssigned, // A driver accepted and is heading to pickup
    InProgress,     // Rider picked up
    Completed,
    Cancelled,
    SearchFailed,   // Every candidate declined, timed out or was unreachable
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Searching => "searching",
            RideStatus::DriverAssigned => "driver_assigned",
            RideStatus::InProgress => "in_progress",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
            RideStatus::SearchFailed => "search_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RideStatus::Completed | RideStatus::Cancelled | RideStatus::SearchFailed
        )
    }

    /// Statuses during which the assigned driver and snapshot are frozen.
    pub fn has_driver(&self) -> bool {
        matches!(self, RideStatus::DriverAssigned | RideStatus::InProgress)
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    #[default]
    UserCancelled,
    DriverCancelled,
    SystemCancelled,
    Timeout,
}

/// Driver details copied onto the ride when it is assigned.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DriverSnapshot {
    pub name: String,
    pub phone: String,
    pub car_plate: String,
    pub car_type: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Accepted,
    Declined,
    TimedOut,
    Unreachable, // No live connection for the driver
    Unavailable, // Another ride claimed the driver first
    Failed,      // Offer could not be written to the connection
    Cancelled,   // Ride cancelled while the offer was pending
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DispatchAttempt {
    pub driver_id: String,
    pub distance_meters: f64,
    pub has_location: bool,
    pub attempted_at: DateTime<Utc>,
    pub outcome: Option<AttemptOutcome>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Ride {
    pub id: String,
    pub rider_id: Option<String>,
    pub rider_phone: String,

    pub pickup: Coordinate,
    pub destination: Coordinate,
    pub destination_name: String,
    pub destination_address: String,

    pub distance_km: f64,
    pub duration_min: f64,
    pub fare: f64,

    pub status: RideStatus,
    pub assigned_driver: Option<String>,
    pub driver_info: Option<DriverSnapshot>,
    pub cancellation_reason: Option<CancellationReason>,
    #[serde(default)]
    pub attempts: Vec<DispatchAttempt>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Ride as handed over by the fare-calculation collaborator.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewRide {
    pub rider_id: Option<String>,
    pub rider_phone: String,
    pub pickup: Coordinate,
    pub destination: Coordinate,
    pub destination_name: String,
    pub destination_address: String,
    pub distance_km: f64,
    pub duration_min: f64,
    pub fare: f64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideStatusResponse {
    pub id: String,
    pub status: RideStatus,
    pub driver_info: Option<DriverSnapshot>,
    pub fare: f64,
    pub pickup: Coordinate,
    pub destination: Coordinate,
    pub destination_name: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<CancellationReason>,
}

impl Ride {
    pub fn new(id: String, request: NewRide) -> Self {
        let now = Utc::now();
        Self {
            id,
            rider_id: request.rider_id,
            rider_phone: request.rider_phone,
            pickup: request.pickup,
            destination: request.destination,
            destination_name: request.destination_name,
            destination_address: request.destination_address,
            distance_km: request.distance_km,
            duration_min: request.duration_min,
            fare: request.fare,
            status: RideStatus::Searching,
            assigned_driver: None,
            driver_info: None,
            cancellation_reason: None,
            attempts: Vec::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
        }
    }

    /// Commits the assignment. Returns false (and changes nothing) if a driver
    /// is already bound to the ride.
    pub fn assign(&mut self, driver_id: &str, snapshot: DriverSnapshot) -> bool {
        if self.status.has_driver() || self.assigned_driver.is_some() {
            return false;
        }
        self.status = RideStatus::DriverAssigned;
        self.assigned_driver = Some(driver_id.to_string());
        self.driver_info = Some(snapshot);
        self.updated_at = Utc::now();
        true
    }

    pub fn set_status(&mut self, status: RideStatus) {
        let now = Utc::now();
        self.status = status;
        self.updated_at = now;
        match status {
            RideStatus::InProgress => self.started_at = Some(now),
            RideStatus::Completed => self.completed_at = Some(now),
            RideStatus::Cancelled => self.cancelled_at = Some(now),
            _ => {}
        }
    }

    pub fn is_assigned_to(&self, driver_id: &str) -> bool {
        self.assigned_driver.as_deref() == Some(driver_id)
    }

    pub fn to_status_response(&self) -> RideStatusResponse {
        RideStatusResponse {
            id: self.id.clone(),
            status: self.status,
            driver_info: self.driver_info.clone(),
            fare: self.fare,
            pickup: self.pickup,
            destination: self.destination,
            destination_name: self.destination_name.clone(),
            started_at: self.started_at,
            completed_at: self.completed_at,
            cancelled_at: self.cancelled_at,
            cancellation_reason: self.cancellation_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ride() -> Ride {
        Ride::new(
            "rid-250101-abc12".to_string(),
            NewRide {
                rider_id: Some("usr-1".to_string()),
                rider_phone: "+254700000000".to_string(),
                pickup: Coordinate::new(-1.0903, 35.8612),
                destination: Coordinate::new(-1.1, 35.87),
                destination_name: "Market".to_string(),
                destination_address: "Main St".to_string(),
                distance_km: 2.1,
                duration_min: 7.0,
                fare: 240.0,
            },
        )
    }

    #[test]
    fn test_new_ride_is_searching() {
        let ride = sample_ride();
        assert_eq!(ride.status, RideStatus::Searching);
        assert!(ride.assigned_driver.is_none());
        assert!(ride.attempts.is_empty());
    }

    #[test]
    fn test_assign_only_once() {
        let mut ride = sample_ride();
        let snapshot = DriverSnapshot {
            name: "Wanjiru".to_string(),
            ..Default::default()
        };
        assert!(ride.assign("drv-a", snapshot.clone()));
        assert!(!ride.assign("drv-b", snapshot));
        assert_eq!(ride.assigned_driver.as_deref(), Some("drv-a"));
        assert_eq!(ride.status, RideStatus::DriverAssigned);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&RideStatus::SearchFailed).unwrap();
        assert_eq!(json, "\"search_failed\"");
        assert_eq!(RideStatus::DriverAssigned.to_string(), "driver_assigned");
    }

    #[test]
    fn test_set_status_stamps_timestamps() {
        let mut ride = sample_ride();
        ride.set_status(RideStatus::Cancelled);
        assert!(ride.cancelled_at.is_some());
        assert!(ride.status.is_terminal());
    }
}
