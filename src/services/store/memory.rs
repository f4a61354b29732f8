// src/services/store/memory.rs
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing;

use crate::{
    errors::DispatchResult,
    models::{
        driver::{Driver, DriverFilter, DriverPatch},
        ride::{NewRide, Ride},
    },
    services::store::{DriverStore, RideStore},
    utils::id_generator::{IdGenerator, IdType},
};

/// Process-local store used when no Redis URL is configured, and in tests.
#[derive(Default)]
pub struct InMemoryStore {
    rides: RwLock<HashMap<String, Ride>>,
    drivers: RwLock<HashMap<String, Driver>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_drivers(drivers: impl IntoIterator<Item = Driver>) -> Self {
        let store = Self::new();
        {
            let mut map = store.drivers.write().await;
            for driver in drivers {
                map.insert(driver.id.clone(), driver);
            }
        }
        store
    }

    pub async fn insert_ride(&self, ride: Ride) {
        self.rides.write().await.insert(ride.id.clone(), ride);
    }
}

#[async_trait]
impl RideStore for InMemoryStore {
    async fn create_ride(&self, request: NewRide) -> DispatchResult<Ride> {
        let ride = Ride::new(IdGenerator::generate(IdType::Ride), request);
        self.rides.write().await.insert(ride.id.clone(), ride.clone());
        tracing::debug!("Stored ride {}", ride.id);
        Ok(ride)
    }

    async fn find_ride(&self, ride_id: &str) -> DispatchResult<Option<Ride>> {
        Ok(self.rides.read().await.get(ride_id).cloned())
    }

    async fn save_ride(&self, ride: &Ride) -> DispatchResult<()> {
        self.rides.write().await.insert(ride.id.clone(), ride.clone());
        Ok(())
    }
}

#[async_trait]
impl DriverStore for InMemoryStore {
    async fn find_driver(&self, driver_id: &str) -> DispatchResult<Option<Driver>> {
        Ok(self.drivers.read().await.get(driver_id).cloned())
    }

    async fn upsert_driver(&self, driver: Driver) -> DispatchResult<()> {
        self.drivers.write().await.insert(driver.id.clone(), driver);
        Ok(())
    }

    async fn update_driver(&self, driver_id: &str, patch: DriverPatch) -> DispatchResult<Option<Driver>> {
        let mut drivers = self.drivers.write().await;
        Ok(drivers.get_mut(driver_id).map(|driver| {
            driver.apply(&patch);
            driver.clone()
        }))
    }

    async fn find_eligible_drivers(&self, filter: &DriverFilter) -> DispatchResult<Vec<Driver>> {
        let drivers = self.drivers.read().await;
        let mut matching: Vec<Driver> = drivers
            .values()
            .filter(|driver| filter.matches(driver))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matching)
    }

    async fn claim_driver(&self, driver_id: &str, ride_id: &str) -> DispatchResult<bool> {
        let mut drivers = self.drivers.write().await;
        match drivers.get_mut(driver_id) {
            Some(driver) if driver.is_eligible() && driver.active_ride.is_none() => {
                driver.available = false;
                driver.active_ride = Some(ride_id.to_string());
                driver.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_driver(&self, driver_id: &str, ride_id: &str) -> DispatchResult<()> {
        let mut drivers = self.drivers.write().await;
        let Some(driver) = drivers.get_mut(driver_id) else {
            return Ok(());
        };
        if driver.active_ride.as_deref().is_some_and(|held| held != ride_id) {
            tracing::warn!(
                "Not releasing driver {} for ride {}: held by ride {:?}",
                driver_id, ride_id, driver.active_ride
            );
            return Ok(());
        }
        driver.active_ride = None;
        if driver.online {
            driver.available = true;
        }
        driver.updated_at = Utc::now();
        Ok(())
    }
}
