// src/services/ride_lifecycle.rs
use async_trait::async_trait;
use std::sync::Arc;
use tracing;

use crate::{
    errors::{DispatchError, DispatchResult},
    models::{
        driver::DriverPatch,
        messages::{RideCancellation, ServerEvent},
        ride::{CancellationReason, Ride, RideStatus},
    },
    services::{
        notification_service::{Notifier, NotifyTarget},
        offer_coordinator::OfferCoordinator,
        ride_locks::RideLocks,
        store::{DriverStore, RideStore},
    },
};

#[async_trait]
pub trait RideLifecycleOperations: Send + Sync {
    async fn cancel(&self, ride_id: &str, reason: CancellationReason) -> DispatchResult<Ride>;
    async fn start(&self, ride_id: &str, driver_id: &str) -> DispatchResult<Ride>;
    async fn end(&self, ride_id: &str, driver_id: &str) -> DispatchResult<Ride>;
}

pub fn cancellation_message(reason: CancellationReason) -> &'static str {
    match reason {
        CancellationReason::UserCancelled => "The rider cancelled this ride.",
        CancellationReason::DriverCancelled => "The driver cancelled this ride.",
        CancellationReason::SystemCancelled => "This ride was cancelled by the system.",
        CancellationReason::Timeout => "This ride timed out.",
    }
}

pub fn cancellation_notice(ride_id: &str, reason: CancellationReason) -> ServerEvent {
    ServerEvent::RideCancelled(RideCancellation {
        ride_id: ride_id.to_string(),
        reason,
        message: cancellation_message(reason).to_string(),
    })
}

pub struct RideLifecycle {
    rides: Arc<dyn RideStore>,
    drivers: Arc<dyn DriverStore>,
    offers: Arc<OfferCoordinator>,
    notifier: Arc<dyn Notifier>,
    locks: Arc<RideLocks>,
}

impl RideLifecycle {
    pub fn new(
        rides: Arc<dyn RideStore>,
        drivers: Arc<dyn DriverStore>,
        offers: Arc<OfferCoordinator>,
        notifier: Arc<dyn Notifier>,
        locks: Arc<RideLocks>,
    ) -> Self {
        Self {
            rides,
            drivers,
            offers,
            notifier,
            locks,
        }
    }

    async fn load_ride(&self, ride_id: &str) -> DispatchResult<Ride> {
        self.rides
            .find_ride(ride_id)
            .await?
            .ok_or_else(|| DispatchError::ride_not_found(ride_id))
    }

    /// Loads the ride, checks the transition is legal for this driver, then
    /// stores the new status. Nothing is written when a check fails.
    async fn transition(
        &self,
        ride_id: &str,
        driver_id: &str,
        from: RideStatus,
        to: RideStatus,
        action: &'static str,
    ) -> DispatchResult<Ride> {
        let _lock = self.locks.lock(ride_id).await;
        let mut ride = self.load_ride(ride_id).await?;

        if ride.status != from {
            return Err(DispatchError::invalid_transition(ride_id, ride.status, action));
        }
        if !ride.is_assigned_to(driver_id) {
            return Err(DispatchError::DriverMismatch {
                ride_id: ride_id.to_string(),
                driver_id: driver_id.to_string(),
            });
        }

        ride.set_status(to);
        self.rides.save_ride(&ride).await?;
        Ok(ride)
    }
}

#[async_trait]
impl RideLifecycleOperations for RideLifecycle {
    async fn cancel(&self, ride_id: &str, reason: CancellationReason) -> DispatchResult<Ride> {
        let (ride, offered_driver) = {
            let _lock = self.locks.lock(ride_id).await;
            let mut ride = self.load_ride(ride_id).await?;

            if !matches!(ride.status, RideStatus::Searching | RideStatus::DriverAssigned) {
                return Err(DispatchError::invalid_transition(ride_id, ride.status, "cancel"));
            }

            ride.set_status(RideStatus::Cancelled);
            ride.cancellation_reason = Some(reason);
            self.rides.save_ride(&ride).await?;

            // Status is saved first so a dispatch that has not yet
            // registered its next offer sees the cancellation
            (ride, self.offers.cancel(ride_id))
        };

        tracing::info!("Ride {} cancelled ({:?})", ride_id, reason);

        if let Some(driver_id) = offered_driver {
            self.notifier
                .notify(NotifyTarget::Driver(driver_id), cancellation_notice(ride_id, reason))
                .await;
        }

        if let Some(driver_id) = ride.assigned_driver.as_deref() {
            self.notifier
                .notify(NotifyTarget::Driver(driver_id.to_string()), cancellation_notice(ride_id, reason))
                .await;
            if let Err(e) = self.drivers.release_driver(driver_id, ride_id).await {
                tracing::error!("Could not free driver {} after cancelling ride {}: {}", driver_id, ride_id, e);
            }
        }

        self.notifier.notify_rider(&ride, cancellation_message(reason)).await;
        Ok(ride)
    }

    async fn start(&self, ride_id: &str, driver_id: &str) -> DispatchResult<Ride> {
        let ride = self
            .transition(ride_id, driver_id, RideStatus::DriverAssigned, RideStatus::InProgress, "start")
            .await?;
        tracing::info!("Ride {} started by driver {}", ride_id, driver_id);

        if let Err(e) = self.drivers.update_driver(driver_id, DriverPatch::available(false)).await {
            tracing::error!("Could not mark driver {} busy: {}", driver_id, e);
        }

        self.notifier.notify_rider(&ride, "Your ride has started.").await;
        Ok(ride)
    }

    async fn end(&self, ride_id: &str, driver_id: &str) -> DispatchResult<Ride> {
        let ride = self
            .transition(ride_id, driver_id, RideStatus::InProgress, RideStatus::Completed, "end")
            .await?;
        tracing::info!("Ride {} completed by driver {}", ride_id, driver_id);

        if let Err(e) = self.drivers.release_driver(driver_id, ride_id).await {
            tracing::error!("Could not free driver {} after ride {}: {}", driver_id, ride_id, e);
        }

        self.notifier.notify_rider(&ride, "You have arrived. Thanks for riding!").await;
        Ok(ride)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_reason_has_a_message() {
        for reason in [
            CancellationReason::UserCancelled,
            CancellationReason::DriverCancelled,
            CancellationReason::SystemCancelled,
            CancellationReason::Timeout,
        ] {
            assert!(!cancellation_message(reason).is_empty());
        }
    }

    #[test]
    fn test_cancellation_notice_carries_reason() {
        match cancellation_notice("rid-1", CancellationReason::Timeout) {
            ServerEvent::RideCancelled(notice) => {
                assert_eq!(notice.ride_id, "rid-1");
                assert_eq!(notice.reason, CancellationReason::Timeout);
                assert_eq!(notice.message, "This ride timed out.");
            }
            other => panic!("expected ride_cancelled, got {:?}", other),
        }
    }
}
