// src/services/dispatch_engine.rs
use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing;

use crate::{
    errors::{DispatchError, DispatchResult},
    models::{
        driver::DriverFilter,
        messages::{DriverInfo, RideConfirmation, RideOffer, ServerEvent},
        ride::{AttemptOutcome, DispatchAttempt, DriverSnapshot, Ride, RideStatus},
    },
    services::{
        connection_registry::ConnectionRegistry,
        geo_ranker::{rank_candidates, RankedCandidate, RankingConfig},
        notification_service::{Notifier, NotifyTarget},
        offer_coordinator::{OfferCoordinator, OfferOutcome, DEFAULT_OFFER_TIMEOUT},
        ride_lifecycle::cancellation_notice,
        ride_locks::RideLocks,
        store::{DriverStore, RideStore},
    },
};

pub const SEARCHING_MESSAGE: &str = "Searching for available drivers...";
pub const ACCEPTED_MESSAGE: &str = "Driver accepted. On the way.";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchConfig {
    pub offer_timeout: Duration,
    pub ranking: RankingConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            offer_timeout: DEFAULT_OFFER_TIMEOUT,
            ranking: RankingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchFailure {
    NoDrivers,        // Nobody eligible at all
    NoDriversInRange, // Eligible drivers exist, none within the radius
    NoAcceptance,     // Every candidate was skipped, declined or timed out
    Fault,            // Storage or transport error mid-search
}

impl SearchFailure {
    pub fn message(&self) -> &'static str {
        match self {
            SearchFailure::NoDrivers => "No drivers available at the moment.",
            SearchFailure::NoDriversInRange => "No drivers available in your area.",
            SearchFailure::NoAcceptance => "No drivers accepted the ride request.",
            SearchFailure::Fault => "Something went wrong while searching for a driver.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum DispatchOutcome {
    Assigned {
        ride_id: String,
        driver_id: String,
        driver: DriverSnapshot,
    },
    SearchFailed {
        ride_id: String,
        reason: SearchFailure,
    },
    Cancelled {
        ride_id: String,
    },
}

impl DispatchOutcome {
    pub fn success(&self) -> bool {
        matches!(self, DispatchOutcome::Assigned { .. })
    }

    pub fn message(&self) -> &'static str {
        match self {
            DispatchOutcome::Assigned { .. } => ACCEPTED_MESSAGE,
            DispatchOutcome::SearchFailed { reason, .. } => reason.message(),
            DispatchOutcome::Cancelled { .. } => "The ride was cancelled during the search.",
        }
    }
}

#[async_trait]
pub trait DispatchOperations: Send + Sync {
    /// Offers the ride to ranked candidates one at a time until one accepts,
    /// the list runs out, or the ride is cancelled.
    async fn dispatch(&self, ride_id: &str) -> DispatchResult<DispatchOutcome>;
}

/// What one search has done so far that is not yet on the stored ride.
#[derive(Default)]
struct SearchPass {
    attempts: Vec<DispatchAttempt>,
    claimed: Option<String>,
}

impl SearchPass {
    fn begin_attempt(&mut self, candidate: &RankedCandidate) {
        self.attempts.push(DispatchAttempt {
            driver_id: candidate.driver.id.clone(),
            distance_meters: candidate.distance_meters,
            has_location: candidate.has_location,
            attempted_at: Utc::now(),
            outcome: None,
        });
    }

    fn settle(&mut self, outcome: AttemptOutcome) {
        if let Some(attempt) = self.attempts.last_mut() {
            if attempt.outcome.is_none() {
                attempt.outcome = Some(outcome);
            }
        }
    }
}

enum Step {
    Next(AttemptOutcome),
    Accepted(DriverInfo),
    Cancelled,
}

struct ActiveDispatch<'a> {
    active: &'a DashMap<String, ()>,
    ride_id: String,
}

impl Drop for ActiveDispatch<'_> {
    fn drop(&mut self) {
        self.active.remove(&self.ride_id);
    }
}

pub struct DispatchEngine {
    rides: Arc<dyn RideStore>,
    drivers: Arc<dyn DriverStore>,
    registry: Arc<ConnectionRegistry>,
    offers: Arc<OfferCoordinator>,
    notifier: Arc<dyn Notifier>,
    locks: Arc<RideLocks>,
    active: DashMap<String, ()>,
    config: DispatchConfig,
}

impl DispatchEngine {
    pub fn new(
        rides: Arc<dyn RideStore>,
        drivers: Arc<dyn DriverStore>,
        registry: Arc<ConnectionRegistry>,
        offers: Arc<OfferCoordinator>,
        notifier: Arc<dyn Notifier>,
        locks: Arc<RideLocks>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            rides,
            drivers,
            registry,
            offers,
            notifier,
            locks,
            active: DashMap::new(),
            config,
        }
    }

    pub fn is_dispatching(&self, ride_id: &str) -> bool {
        self.active.contains_key(ride_id)
    }

    fn begin(&self, ride_id: &str) -> DispatchResult<ActiveDispatch<'_>> {
        match self.active.entry(ride_id.to_string()) {
            Entry::Occupied(_) => return Err(DispatchError::DispatchInProgress(ride_id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(());
            }
        }
        Ok(ActiveDispatch {
            active: &self.active,
            ride_id: ride_id.to_string(),
        })
    }

    async fn load_ride(&self, ride_id: &str) -> DispatchResult<Ride> {
        self.rides
            .find_ride(ride_id)
            .await?
            .ok_or_else(|| DispatchError::ride_not_found(ride_id))
    }

    async fn start_search(&self, ride_id: &str) -> DispatchResult<Ride> {
        let _lock = self.locks.lock(ride_id).await;
        let mut ride = self.load_ride(ride_id).await?;

        if ride.status.has_driver() {
            return Err(DispatchError::RideAlreadyAssigned(ride_id.to_string()));
        }
        if matches!(ride.status, RideStatus::Completed | RideStatus::Cancelled) {
            return Err(DispatchError::invalid_transition(ride_id, ride.status, "dispatch"));
        }

        ride.set_status(RideStatus::Searching);
        self.rides.save_ride(&ride).await?;
        Ok(ride)
    }

    async fn search(&self, ride_id: &str, pass: &mut SearchPass) -> DispatchResult<DispatchOutcome> {
        let ride = self.start_search(ride_id).await?;
        self.notifier.notify_rider(&ride, SEARCHING_MESSAGE).await;

        let eligible = self
            .drivers
            .find_eligible_drivers(&DriverFilter::default())
            .await?;
        if eligible.is_empty() {
            return self.finish_failed(ride_id, pass, SearchFailure::NoDrivers).await;
        }

        let candidates = rank_candidates(ride.pickup, eligible, &self.config.ranking);
        if candidates.is_empty() {
            return self.finish_failed(ride_id, pass, SearchFailure::NoDriversInRange).await;
        }

        tracing::info!("Dispatching ride {} to {} candidate(s)", ride_id, candidates.len());

        for candidate in &candidates {
            match self.offer(&ride, candidate, pass).await? {
                Step::Next(outcome) => pass.settle(outcome),
                Step::Accepted(info) => return self.commit_assignment(ride_id, candidate, info, pass).await,
                Step::Cancelled => return self.finish_cancelled(ride_id, pass).await,
            }
        }

        self.finish_failed(ride_id, pass, SearchFailure::NoAcceptance).await
    }

    async fn offer(&self, ride: &Ride, candidate: &RankedCandidate, pass: &mut SearchPass) -> DispatchResult<Step> {
        let driver_id = candidate.driver.id.as_str();
        pass.begin_attempt(candidate);

        if !self.registry.is_driver_connected(driver_id) {
            tracing::warn!("Skipping driver {} for ride {}: no live connection", driver_id, ride.id);
            return Ok(Step::Next(AttemptOutcome::Unreachable));
        }

        if !self.drivers.claim_driver(driver_id, &ride.id).await? {
            tracing::warn!("Skipping driver {} for ride {}: claimed by another ride", driver_id, ride.id);
            return Ok(Step::Next(AttemptOutcome::Unavailable));
        }
        pass.claimed = Some(driver_id.to_string());

        let ticket = self.offers.register_offer(&ride.id, driver_id);

        // A cancel that ran before the offer existed is only visible on the record
        let still_searching = match self.rides.find_ride(&ride.id).await {
            Ok(current) => current.is_some_and(|r| r.status == RideStatus::Searching),
            Err(e) => {
                self.offers.withdraw(ticket);
                return Err(e);
            }
        };
        if !still_searching {
            self.offers.withdraw(ticket);
            return Ok(Step::Cancelled);
        }

        let request = ServerEvent::RideRequest(RideOffer::for_ride(ride));
        if let Err(e) = self.registry.send_to_driver(driver_id, request) {
            tracing::warn!("Could not deliver ride {} to driver {}: {}", ride.id, driver_id, e);
            self.offers.withdraw(ticket);
            self.release_claimed(&ride.id, pass).await?;
            return Ok(Step::Next(AttemptOutcome::Failed));
        }

        tracing::info!(
            "Offered ride {} to driver {} ({:.0} m away)",
            ride.id, driver_id, candidate.distance_meters
        );

        match self.offers.wait(ticket, self.config.offer_timeout).await {
            OfferOutcome::Accepted(info) => Ok(Step::Accepted(info)),
            OfferOutcome::Declined => {
                tracing::info!("Driver {} declined ride {}", driver_id, ride.id);
                self.release_claimed(&ride.id, pass).await?;
                Ok(Step::Next(AttemptOutcome::Declined))
            }
            OfferOutcome::TimedOut => {
                self.release_claimed(&ride.id, pass).await?;
                Ok(Step::Next(AttemptOutcome::TimedOut))
            }
            OfferOutcome::Cancelled => Ok(Step::Cancelled),
            OfferOutcome::Superseded => {
                tracing::warn!("Offer of ride {} to driver {} was superseded", ride.id, driver_id);
                self.release_claimed(&ride.id, pass).await?;
                Ok(Step::Next(AttemptOutcome::Failed))
            }
        }
    }

    async fn release_claimed(&self, ride_id: &str, pass: &mut SearchPass) -> DispatchResult<()> {
        if let Some(driver_id) = pass.claimed.as_deref() {
            self.drivers.release_driver(driver_id, ride_id).await?;
        }
        pass.claimed = None;
        Ok(())
    }

    async fn commit_assignment(
        &self,
        ride_id: &str,
        candidate: &RankedCandidate,
        info: DriverInfo,
        pass: &mut SearchPass,
    ) -> DispatchResult<DispatchOutcome> {
        let driver_id = candidate.driver.id.clone();
        let snapshot = info.into_snapshot(candidate.driver.snapshot());

        let committed = {
            let _lock = self.locks.lock(ride_id).await;
            let mut ride = self.load_ride(ride_id).await?;

            if ride.status != RideStatus::Searching {
                Err(ride)
            } else {
                if !ride.assign(&driver_id, snapshot.clone()) {
                    return Err(DispatchError::RideAlreadyAssigned(ride_id.to_string()));
                }
                let mut attempts = pass.attempts.clone();
                if let Some(last) = attempts.last_mut() {
                    last.outcome = Some(AttemptOutcome::Accepted);
                }
                ride.attempts.extend(attempts);
                self.rides.save_ride(&ride).await?;
                pass.attempts.clear();
                // The claim now belongs to the ride
                pass.claimed = None;
                Ok(ride)
            }
        };

        let ride = match committed {
            Ok(ride) => ride,
            Err(stopped) => {
                // The accept emptied the offer table first, so cancel had nobody to tell
                tracing::info!("Driver {} accepted ride {} after it was cancelled", driver_id, ride_id);
                let reason = stopped.cancellation_reason.unwrap_or_default();
                self.notifier
                    .notify(NotifyTarget::Driver(driver_id), cancellation_notice(ride_id, reason))
                    .await;
                return self.finish_cancelled(ride_id, pass).await;
            }
        };

        tracing::info!("Ride {} assigned to driver {}", ride_id, driver_id);

        self.notifier
            .notify(
                NotifyTarget::Driver(driver_id.clone()),
                ServerEvent::RideConfirmedToDriver(RideConfirmation::for_ride(&ride)),
            )
            .await;
        self.notifier.notify_rider(&ride, ACCEPTED_MESSAGE).await;

        Ok(DispatchOutcome::Assigned {
            ride_id: ride_id.to_string(),
            driver_id,
            driver: snapshot,
        })
    }

    async fn finish_failed(
        &self,
        ride_id: &str,
        pass: &mut SearchPass,
        reason: SearchFailure,
    ) -> DispatchResult<DispatchOutcome> {
        self.release_claimed(ride_id, pass).await?;

        let ride = {
            let _lock = self.locks.lock(ride_id).await;
            let mut ride = self.load_ride(ride_id).await?;
            if ride.status == RideStatus::Searching {
                ride.set_status(RideStatus::SearchFailed);
            }
            ride.attempts.extend(pass.attempts.drain(..));
            self.rides.save_ride(&ride).await?;
            ride
        };

        if ride.status == RideStatus::Cancelled {
            tracing::info!("Search for ride {} ran out of candidates after it was cancelled", ride_id);
            return Ok(DispatchOutcome::Cancelled {
                ride_id: ride_id.to_string(),
            });
        }

        tracing::info!(
            "Search for ride {} failed after {} attempt(s): {}",
            ride_id, ride.attempts.len(), reason.message()
        );

        if ride.status == RideStatus::SearchFailed {
            self.notifier.notify_rider(&ride, reason.message()).await;
        }

        Ok(DispatchOutcome::SearchFailed {
            ride_id: ride_id.to_string(),
            reason,
        })
    }

    async fn finish_cancelled(&self, ride_id: &str, pass: &mut SearchPass) -> DispatchResult<DispatchOutcome> {
        pass.settle(AttemptOutcome::Cancelled);
        self.release_claimed(ride_id, pass).await?;

        {
            let _lock = self.locks.lock(ride_id).await;
            let mut ride = self.load_ride(ride_id).await?;
            ride.attempts.extend(pass.attempts.drain(..));
            self.rides.save_ride(&ride).await?;
        }

        tracing::info!("Search for ride {} stopped: ride cancelled", ride_id);
        Ok(DispatchOutcome::Cancelled {
            ride_id: ride_id.to_string(),
        })
    }

    /// Best effort after a fault: free the claimed driver and park the ride
    /// in search_failed so the rider can retry.
    async fn recover(&self, ride_id: &str, pass: &mut SearchPass, cause: &DispatchError) {
        tracing::error!("Dispatch of ride {} aborted: {}", ride_id, cause);
        pass.settle(AttemptOutcome::Failed);

        if let Err(e) = self.release_claimed(ride_id, pass).await {
            tracing::error!("Could not release driver for ride {}: {}", ride_id, e);
        }

        let ride = {
            let _lock = self.locks.lock(ride_id).await;
            let mut ride = match self.rides.find_ride(ride_id).await {
                Ok(Some(ride)) => ride,
                Ok(None) => return,
                Err(e) => {
                    tracing::error!("Could not reload ride {} after fault: {}", ride_id, e);
                    return;
                }
            };
            if ride.status == RideStatus::Searching {
                ride.set_status(RideStatus::SearchFailed);
            }
            ride.attempts.extend(pass.attempts.drain(..));
            if let Err(e) = self.rides.save_ride(&ride).await {
                tracing::error!("Could not mark ride {} as search_failed: {}", ride_id, e);
            }
            ride
        };

        if ride.status == RideStatus::SearchFailed {
            self.notifier.notify_rider(&ride, SearchFailure::Fault.message()).await;
        }
    }
}

#[async_trait]
impl DispatchOperations for DispatchEngine {
    async fn dispatch(&self, ride_id: &str) -> DispatchResult<DispatchOutcome> {
        let _active = self.begin(ride_id)?;
        let mut pass = SearchPass::default();

        match self.search(ride_id, &mut pass).await {
            Ok(outcome) => Ok(outcome),
            Err(err) if err.is_fault() => {
                self.recover(ride_id, &mut pass, &err).await;
                Ok(DispatchOutcome::SearchFailed {
                    ride_id: ride_id.to_string(),
                    reason: SearchFailure::Fault,
                })
            }
            Err(err) => {
                if let Err(e) = self.release_claimed(ride_id, &mut pass).await {
                    tracing::error!("Could not release driver for ride {}: {}", ride_id, e);
                }
                Err(err)
            }
        }
    }
}
