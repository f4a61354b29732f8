// src/services/store/mod.rs
// Ride and driver persistence consumed by the dispatch core.
use async_trait::async_trait;

use crate::{
    errors::DispatchResult,
    models::{
        driver::{Driver, DriverFilter, DriverPatch},
        ride::{NewRide, Ride},
    },
};

pub mod memory;
pub mod redis_store;

pub use memory::InMemoryStore;
pub use redis_store::RedisStore;

#[async_trait]
pub trait RideStore: Send + Sync {
    async fn create_ride(&self, request: NewRide) -> DispatchResult<Ride>;
    async fn find_ride(&self, ride_id: &str) -> DispatchResult<Option<Ride>>;
    /// Full-record overwrite; saving the same ride twice is harmless.
    async fn save_ride(&self, ride: &Ride) -> DispatchResult<()>;
}

#[async_trait]
pub trait DriverStore: Send + Sync {
    async fn find_driver(&self, driver_id: &str) -> DispatchResult<Option<Driver>>;
    async fn upsert_driver(&self, driver: Driver) -> DispatchResult<()>;
    /// Applies the patch atomically; `None` when the driver does not exist.
    async fn update_driver(&self, driver_id: &str, patch: DriverPatch) -> DispatchResult<Option<Driver>>;
    /// Matching drivers ordered by registration time.
    async fn find_eligible_drivers(&self, filter: &DriverFilter) -> DispatchResult<Vec<Driver>>;
    /// Compare-and-set: flips `available` to false and records `ride_id` as
    /// the holder, only if the driver is currently eligible. Returns whether
    /// this caller won the driver.
    async fn claim_driver(&self, driver_id: &str, ride_id: &str) -> DispatchResult<bool>;
    /// Drops the hold `ride_id` has on the driver and makes them available
    /// again unless they went offline. A hold by another ride is left alone.
    async fn release_driver(&self, driver_id: &str, ride_id: &str) -> DispatchResult<()>;
}
