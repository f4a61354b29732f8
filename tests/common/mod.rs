// Shared fixtures: an in-memory app state plus simulated driver apps.
#![allow(dead_code)]

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use sparrow_dispatch::{
    models::{
        driver::Driver,
        location::{Coordinate, DriverLocation},
        messages::ServerEvent,
        ride::{NewRide, Ride},
    },
    services::{
        connection_registry::{ConnectionHandle, ConnectionId},
        store::{DriverStore, InMemoryStore, RideStore},
    },
    state::{AppConfig, AppState},
};

pub const PICKUP: Coordinate = Coordinate {
    lat: -1.0903,
    lng: 35.8612,
};

const METERS_PER_DEGREE_LAT: f64 = 6_371_000.0 * std::f64::consts::PI / 180.0;

/// A point the given distance due north of the pickup.
pub fn north_of_pickup(meters: f64) -> Coordinate {
    Coordinate::new(PICKUP.lat + meters / METERS_PER_DEGREE_LAT, PICKUP.lng)
}

pub fn approx(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() < 1.0
}

/// Verified, online and available. `rank` sets registration order.
pub fn eligible_driver(id: &str, rank: i64, location: Option<Coordinate>) -> Driver {
    let mut driver = Driver::new(id, format!("Driver {}", id), "0700000000", "KAA 001A", "sedan");
    driver.verified = true;
    driver.online = true;
    driver.created_at = Utc::now() - ChronoDuration::minutes(60 - rank);
    driver.last_known_location = location.map(DriverLocation::now);
    driver
}

pub fn new_ride() -> NewRide {
    NewRide {
        rider_id: Some("usr-251019-a1b2c".to_string()),
        rider_phone: "+254711000000".to_string(),
        pickup: PICKUP,
        destination: Coordinate::new(-1.1, 35.87),
        destination_name: "Town centre".to_string(),
        destination_address: "Kenyatta Ave".to_string(),
        distance_km: 1.8,
        duration_min: 6.0,
        fare: 200.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Behaviour {
    Accept,
    Decline,
    /// Never answers; the offer times out.
    Ignore,
    /// Accepts, then the app disappears before the confirmation arrives.
    AcceptAndVanish,
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub store: Arc<InMemoryStore>,
    /// `(driver_id, ride_id)` for every ride_request any simulated driver received.
    pub offer_log: Arc<Mutex<Vec<(String, String)>>>,
}

pub struct SimDriver {
    pub id: String,
    pub connection_id: ConnectionId,
    pub inbox: Arc<Mutex<Vec<ServerEvent>>>,
}

impl SimDriver {
    pub fn received(&self) -> Vec<ServerEvent> {
        self.inbox.lock().unwrap().clone()
    }

    pub fn offers_received(&self) -> usize {
        self.received()
            .iter()
            .filter(|e| matches!(e, ServerEvent::RideRequest(_)))
            .count()
    }
}

impl Harness {
    pub async fn new(drivers: Vec<Driver>) -> Self {
        Self::with_config(drivers, AppConfig::default()).await
    }

    pub async fn with_config(drivers: Vec<Driver>, config: AppConfig) -> Self {
        let store = Arc::new(InMemoryStore::with_drivers(drivers).await);
        let state = Arc::new(AppState::with_stores(config, "memory", store.clone(), store.clone()));
        Self {
            state,
            store,
            offer_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Rides come from `store`; driver reads and claims go through `drivers`.
    pub fn with_driver_store(store: Arc<InMemoryStore>, drivers: Arc<dyn DriverStore>) -> Self {
        let state = Arc::new(AppState::with_stores(AppConfig::default(), "memory", store.clone(), drivers));
        Self {
            state,
            store,
            offer_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn driver(&self, driver_id: &str) -> Driver {
        self.store.find_driver(driver_id).await.unwrap().unwrap()
    }

    pub async fn create_ride(&self) -> Ride {
        self.store.create_ride(new_ride()).await.unwrap()
    }

    pub async fn ride(&self, ride_id: &str) -> Ride {
        self.store.find_ride(ride_id).await.unwrap().unwrap()
    }

    pub fn offered_drivers(&self) -> Vec<String> {
        self.offer_log.lock().unwrap().iter().map(|(d, _)| d.clone()).collect()
    }

    /// Binds a driver connection and answers offers per `behaviour`.
    pub fn connect_driver(&self, driver_id: &str, behaviour: Behaviour) -> SimDriver {
        let (handle, rx) = ConnectionHandle::channel();
        let connection_id = handle.id();
        self.state.registry.register_driver(driver_id, handle);
        let inbox = Arc::new(Mutex::new(Vec::new()));
        self.spawn_driver(driver_id, behaviour, rx, inbox.clone());

        SimDriver {
            id: driver_id.to_string(),
            connection_id,
            inbox,
        }
    }

    /// Binds a rider connection for the ride and returns its receiver.
    pub fn connect_rider(&self, ride_id: &str) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (handle, rx) = ConnectionHandle::channel();
        self.state.registry.register_rider(ride_id, handle);
        rx
    }

    fn spawn_driver(
        &self,
        driver_id: &str,
        behaviour: Behaviour,
        mut rx: mpsc::UnboundedReceiver<ServerEvent>,
        inbox: Arc<Mutex<Vec<ServerEvent>>>,
    ) {
        let driver_id = driver_id.to_string();
        let offers = self.state.offers.clone();
        let offer_log = self.offer_log.clone();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                inbox.lock().unwrap().push(event.clone());
                let ServerEvent::RideRequest(offer) = event else { continue };
                offer_log
                    .lock()
                    .unwrap()
                    .push((driver_id.clone(), offer.ride_id.clone()));

                match behaviour {
                    Behaviour::Accept => {
                        offers.resolve_response(&offer.ride_id, &driver_id, true, None);
                    }
                    Behaviour::Decline => {
                        offers.resolve_response(&offer.ride_id, &driver_id, false, None);
                    }
                    Behaviour::Ignore => {}
                    Behaviour::AcceptAndVanish => {
                        offers.resolve_response(&offer.ride_id, &driver_id, true, None);
                        break;
                    }
                }
            }
        });
    }
}

/// Lets every other task run until it blocks. With paused time the sleep
/// only completes once the runtime is idle.
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
}

/// Yields until the ride has an outstanding offer. Paused time does not
/// advance while this loop keeps the runtime busy.
pub async fn wait_for_offer(harness: &Harness, ride_id: &str) -> String {
    loop {
        if let Some(driver_id) = harness.state.offers.pending_driver(ride_id) {
            return driver_id;
        }
        tokio::task::yield_now().await;
    }
}

pub fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
