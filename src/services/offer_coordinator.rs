// src/services/offer_coordinator.rs
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing;

use crate::models::messages::DriverInfo;

pub const DEFAULT_OFFER_TIMEOUT: Duration = Duration::from_millis(25_000);

#[derive(Debug, Clone, PartialEq)]
pub enum OfferOutcome {
    Accepted(DriverInfo),
    Declined,
    TimedOut,
    /// The ride was cancelled while the offer was pending.
    Cancelled,
    /// A newer offer for the same ride replaced this one.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveResult {
    Resolved,
    /// A different driver holds the current offer for the ride.
    StaleDriver,
    NoPendingOffer,
}

struct PendingOffer {
    driver_id: String,
    seq: u64,
    responder: oneshot::Sender<OfferOutcome>,
}

/// Receiving side of one offer. Obtained from [`OfferCoordinator::register_offer`]
/// before the offer is sent so a fast reply cannot be missed.
#[derive(Debug)]
pub struct OfferTicket {
    ride_id: String,
    driver_id: String,
    seq: u64,
    receiver: oneshot::Receiver<OfferOutcome>,
}

/// Pending-offer table: at most one outstanding offer per ride.
#[derive(Default)]
pub struct OfferCoordinator {
    pending: DashMap<String, PendingOffer>,
    next_seq: AtomicU64,
}

impl OfferCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_offer(&self, ride_id: &str, driver_id: &str) -> OfferTicket {
        let (responder, receiver) = oneshot::channel();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        let offer = PendingOffer {
            driver_id: driver_id.to_string(),
            seq,
            responder,
        };
        if let Some(previous) = self.pending.insert(ride_id.to_string(), offer) {
            tracing::warn!(
                "Offer to driver {} for ride {} superseded by offer to {}",
                previous.driver_id, ride_id, driver_id
            );
            let _ = previous.responder.send(OfferOutcome::Superseded);
        }

        OfferTicket {
            ride_id: ride_id.to_string(),
            driver_id: driver_id.to_string(),
            seq,
            receiver,
        }
    }

    /// Waits for the driver's answer or the deadline, whichever comes first.
    pub async fn wait(&self, mut ticket: OfferTicket, timeout: Duration) -> OfferOutcome {
        match tokio::time::timeout(timeout, &mut ticket.receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => OfferOutcome::Superseded,
            Err(_) => {
                let expired = self
                    .pending
                    .remove_if(&ticket.ride_id, |_, offer| offer.seq == ticket.seq)
                    .is_some();
                if expired {
                    tracing::info!(
                        "Driver {} did not answer ride {} within {:?}",
                        ticket.driver_id, ticket.ride_id, timeout
                    );
                    return OfferOutcome::TimedOut;
                }
                // Resolved right at the deadline; the value is already on its way
                ticket.receiver.await.unwrap_or(OfferOutcome::Superseded)
            }
        }
    }

    pub async fn await_response(&self, ride_id: &str, driver_id: &str, timeout: Duration) -> OfferOutcome {
        let ticket = self.register_offer(ride_id, driver_id);
        self.wait(ticket, timeout).await
    }

    /// Drops an offer that was registered but could not be delivered.
    pub fn withdraw(&self, ticket: OfferTicket) {
        self.pending
            .remove_if(&ticket.ride_id, |_, offer| offer.seq == ticket.seq);
    }

    pub fn resolve_response(
        &self,
        ride_id: &str,
        driver_id: &str,
        accepted: bool,
        info: Option<DriverInfo>,
    ) -> ResolveResult {
        let Some((_, offer)) = self
            .pending
            .remove_if(ride_id, |_, offer| offer.driver_id == driver_id)
        else {
            if self.pending.contains_key(ride_id) {
                tracing::warn!("Ignoring response from driver {} for ride {}: not the offered driver", driver_id, ride_id);
                return ResolveResult::StaleDriver;
            }
            tracing::debug!("No pending offer for ride {} (response from {})", ride_id, driver_id);
            return ResolveResult::NoPendingOffer;
        };

        let outcome = if accepted {
            OfferOutcome::Accepted(info.unwrap_or_default())
        } else {
            OfferOutcome::Declined
        };

        match offer.responder.send(outcome) {
            Ok(()) => ResolveResult::Resolved,
            Err(_) => ResolveResult::NoPendingOffer,
        }
    }

    /// Clears the ride's pending offer, if any, and returns the offered driver.
    pub fn cancel(&self, ride_id: &str) -> Option<String> {
        let (_, offer) = self.pending.remove(ride_id)?;
        let _ = offer.responder.send(OfferOutcome::Cancelled);
        Some(offer.driver_id)
    }

    pub fn pending_driver(&self, ride_id: &str) -> Option<String> {
        self.pending.get(ride_id).map(|offer| offer.driver_id.clone())
    }

    pub fn pending_rides(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_accept_resolves_waiter() {
        let coordinator = Arc::new(OfferCoordinator::new());
        let ticket = coordinator.register_offer("ride-1", "drv-1");

        let result = coordinator.resolve_response(
            "ride-1",
            "drv-1",
            true,
            Some(DriverInfo {
                name: Some("Njeri".to_string()),
                ..Default::default()
            }),
        );
        assert_eq!(result, ResolveResult::Resolved);

        let outcome = coordinator.wait(ticket, DEFAULT_OFFER_TIMEOUT).await;
        match outcome {
            OfferOutcome::Accepted(info) => assert_eq!(info.name.as_deref(), Some("Njeri")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(coordinator.pending_rides().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_decline() {
        let coordinator = Arc::new(OfferCoordinator::new());
        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .await_response("ride-1", "drv-1", Duration::from_secs(25))
                    .await
            })
        };
        while coordinator.pending_driver("ride-1").is_none() {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            coordinator.resolve_response("ride-1", "drv-1", false, None),
            ResolveResult::Resolved
        );
        assert_eq!(waiter.await.unwrap(), OfferOutcome::Declined);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_entry_and_late_reply_is_noop() {
        let coordinator = OfferCoordinator::new();
        let outcome = coordinator
            .await_response("ride-1", "drv-1", Duration::from_secs(25))
            .await;
        assert_eq!(outcome, OfferOutcome::TimedOut);
        assert!(coordinator.pending_driver("ride-1").is_none());

        assert_eq!(
            coordinator.resolve_response("ride-1", "drv-1", true, None),
            ResolveResult::NoPendingOffer
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_driver_is_ignored() {
        let coordinator = OfferCoordinator::new();
        let ticket = coordinator.register_offer("ride-1", "drv-2");

        assert_eq!(
            coordinator.resolve_response("ride-1", "drv-1", true, None),
            ResolveResult::StaleDriver
        );
        assert_eq!(coordinator.pending_driver("ride-1").as_deref(), Some("drv-2"));

        let outcome = coordinator.wait(ticket, Duration::from_secs(1)).await;
        assert_eq!(outcome, OfferOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_resolution_is_noop() {
        let coordinator = OfferCoordinator::new();
        let ticket = coordinator.register_offer("ride-1", "drv-1");

        assert_eq!(coordinator.resolve_response("ride-1", "drv-1", false, None), ResolveResult::Resolved);
        assert_eq!(coordinator.resolve_response("ride-1", "drv-1", true, None), ResolveResult::NoPendingOffer);
        assert_eq!(coordinator.wait(ticket, Duration::from_secs(1)).await, OfferOutcome::Declined);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_wakes_waiter() {
        let coordinator = OfferCoordinator::new();
        let ticket = coordinator.register_offer("ride-1", "drv-1");

        assert_eq!(coordinator.cancel("ride-1").as_deref(), Some("drv-1"));
        assert_eq!(coordinator.cancel("ride-1"), None);
        assert_eq!(coordinator.wait(ticket, Duration::from_secs(25)).await, OfferOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_offer_supersedes_previous() {
        let coordinator = OfferCoordinator::new();
        let first = coordinator.register_offer("ride-1", "drv-1");
        let second = coordinator.register_offer("ride-1", "drv-2");

        assert_eq!(coordinator.wait(first, Duration::from_secs(25)).await, OfferOutcome::Superseded);
        assert_eq!(coordinator.pending_driver("ride-1").as_deref(), Some("drv-2"));

        coordinator.withdraw(second);
        assert!(coordinator.pending_rides().is_empty());
    }
}
