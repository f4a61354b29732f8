// src/models/driver.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::location::DriverLocation;
use crate::models::ride::DriverSnapshot;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub car_plate: String,
    pub car_type: String,
    pub verified: bool,    // Set by an admin after document review
    pub online: bool,      // Has a live connection
    pub available: bool,   // Not on, or being offered, a ride
    /// Ride that claimed the driver, from offer until the trip ends or is cancelled.
    #[serde(default)]
    pub active_ride: Option<String>,
    pub last_known_location: Option<DriverLocation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        phone: impl Into<String>,
        car_plate: impl Into<String>,
        car_type: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            phone: phone.into(),
            car_plate: car_plate.into(),
            car_type: car_type.into(),
            verified: false,
            online: false,
            available: true,
            active_ride: None,
            last_known_location: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_eligible(&self) -> bool {
        self.verified && self.online && self.available
    }

    pub fn snapshot(&self) -> DriverSnapshot {
        DriverSnapshot {
            name: self.name.clone(),
            phone: self.phone.clone(),
            car_plate: self.car_plate.clone(),
            car_type: self.car_type.clone(),
        }
    }

    pub fn apply(&mut self, patch: &DriverPatch) {
        if let Some(online) = patch.online {
            self.online = online;
        }
        if let Some(available) = patch.available {
            self.available = available;
        }
        if let Some(verified) = patch.verified {
            self.verified = verified;
        }
        if let Some(location) = patch.last_known_location {
            self.last_known_location = Some(location);
        }
        // A held driver stays unavailable until the ride lets go
        if self.active_ride.is_some() {
            self.available = false;
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverPatch {
    pub online: Option<bool>,
    pub available: Option<bool>,
    pub verified: Option<bool>,
    pub last_known_location: Option<DriverLocation>,
}

impl DriverPatch {
    /// Availability is restored only for a driver no ride is holding.
    pub fn went_online(location: Option<DriverLocation>) -> Self {
        Self {
            online: Some(true),
            available: Some(true),
            last_known_location: location,
            ..Default::default()
        }
    }

    pub fn went_offline() -> Self {
        Self {
            online: Some(false),
            available: Some(false),
            ..Default::default()
        }
    }

    pub fn location(location: DriverLocation) -> Self {
        Self {
            last_known_location: Some(location),
            ..Default::default()
        }
    }

    pub fn available(available: bool) -> Self {
        Self {
            available: Some(available),
            ..Default::default()
        }
    }

    /// Admin approval; the driver is immediately offered rides.
    pub fn verified() -> Self {
        Self {
            verified: Some(true),
            online: Some(true),
            available: Some(true),
            ..Default::default()
        }
    }
}

/// Candidate-fetch criteria. The default matches the dispatch eligibility rule.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverFilter {
    pub verified: bool,
    pub online: bool,
    pub available: bool,
}

impl Default for DriverFilter {
    fn default() -> Self {
        Self {
            verified: true,
            online: true,
            available: true,
        }
    }
}

impl DriverFilter {
    pub fn matches(&self, driver: &Driver) -> bool {
        driver.verified == self.verified
            && driver.online == self.online
            && driver.available == self.available
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::location::Coordinate;

    #[test]
    fn test_eligibility_needs_all_flags() {
        let mut driver = Driver::new("drv-1", "Otieno", "0700", "KDA 123A", "sedan");
        assert!(!driver.is_eligible());

        driver.verified = true;
        driver.online = true;
        assert!(driver.is_eligible());

        driver.available = false;
        assert!(!driver.is_eligible());
        assert!(!DriverFilter::default().matches(&driver));
    }

    #[test]
    fn test_patch_leaves_unset_fields() {
        let mut driver = Driver::new("drv-1", "Otieno", "0700", "KDA 123A", "sedan");
        driver.verified = true;
        driver.apply(&DriverPatch::went_online(Some(DriverLocation::now(Coordinate::new(1.0, 2.0)))));
        assert!(driver.online && driver.available && driver.verified);
        assert_eq!(driver.last_known_location.map(|l| l.lat), Some(1.0));

        driver.apply(&DriverPatch::went_offline());
        assert!(!driver.online && !driver.available);
        assert!(driver.last_known_location.is_some());
    }

    #[test]
    fn test_held_driver_cannot_become_available() {
        let mut driver = Driver::new("drv-1", "Otieno", "0700", "KDA 123A", "sedan");
        driver.verified = true;
        driver.active_ride = Some("rid-1".to_string());

        driver.apply(&DriverPatch::went_online(None));
        assert!(driver.online && !driver.available);

        driver.apply(&DriverPatch::available(true));
        driver.apply(&DriverPatch::verified());
        assert!(!driver.available);
        assert!(!driver.is_eligible());
    }
}
