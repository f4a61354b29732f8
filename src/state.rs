// src/state.rs
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

use crate::{
    errors::{DispatchError, DispatchResult},
    services::{
        connection_registry::ConnectionRegistry,
        dispatch_engine::{DispatchConfig, DispatchEngine},
        gateway::RealtimeGateway,
        geo_ranker::{RankingConfig, DEFAULT_MAX_RADIUS_METERS},
        notification_service::{Notifier, SocketNotifier},
        offer_coordinator::{OfferCoordinator, DEFAULT_OFFER_TIMEOUT},
        ride_lifecycle::RideLifecycle,
        ride_locks::RideLocks,
        store::{DriverStore, InMemoryStore, RedisStore, RideStore},
    },
};

pub struct AppState {
    pub config: AppConfig,
    pub store_kind: &'static str,
    pub rides: Arc<dyn RideStore>,
    pub drivers: Arc<dyn DriverStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub offers: Arc<OfferCoordinator>,
    pub notifier: Arc<dyn Notifier>,
    pub dispatch: Arc<DispatchEngine>,
    pub lifecycle: Arc<RideLifecycle>,
    pub gateway: Arc<RealtimeGateway>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub redis_url: Option<String>,
    pub offer_timeout_ms: u64,
    pub max_radius_meters: f64,
    pub log_level: Level,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3005)),
            redis_url: None,
            offer_timeout_ms: DEFAULT_OFFER_TIMEOUT.as_millis() as u64,
            max_radius_meters: DEFAULT_MAX_RADIUS_METERS,
            log_level: Level::INFO,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> DispatchResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> DispatchResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = match value("BIND_ADDR") {
            Some(raw) => parse("BIND_ADDR", &raw)?,
            None => defaults.bind_addr,
        };

        let offer_timeout_ms = match value("OFFER_TIMEOUT_MS") {
            Some(raw) => parse::<u64>("OFFER_TIMEOUT_MS", &raw)?,
            None => defaults.offer_timeout_ms,
        };
        if offer_timeout_ms == 0 {
            return Err(DispatchError::InvalidConfiguration(
                "OFFER_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }

        let max_radius_meters = match value("MAX_RADIUS_METERS") {
            Some(raw) => parse::<f64>("MAX_RADIUS_METERS", &raw)?,
            None => defaults.max_radius_meters,
        };
        if !max_radius_meters.is_finite() || max_radius_meters <= 0.0 {
            return Err(DispatchError::InvalidConfiguration(
                "MAX_RADIUS_METERS must be a positive number".to_string(),
            ));
        }

        let log_level = match value("LOG_LEVEL") {
            Some(raw) => parse("LOG_LEVEL", &raw)?,
            None => defaults.log_level,
        };

        Ok(Self {
            bind_addr,
            redis_url: value("REDIS_URL"),
            offer_timeout_ms,
            max_radius_meters,
            log_level,
        })
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            offer_timeout: Duration::from_millis(self.offer_timeout_ms),
            ranking: RankingConfig {
                max_radius_meters: self.max_radius_meters,
            },
        }
    }
}

fn parse<T>(key: &str, raw: &str) -> DispatchResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| DispatchError::InvalidConfiguration(format!("{}={:?}: {}", key, raw, e)))
}

impl AppState {
    pub async fn new(config: AppConfig) -> DispatchResult<Self> {
        match config.redis_url.clone() {
            Some(url) => {
                let store = Arc::new(RedisStore::connect(&url).await?);
                Ok(Self::with_stores(config, "redis", store.clone(), store))
            }
            None => {
                tracing::warn!("REDIS_URL not set, using in-memory store");
                let store = Arc::new(InMemoryStore::new());
                Ok(Self::with_stores(config, "memory", store.clone(), store))
            }
        }
    }

    pub fn with_stores(
        config: AppConfig,
        store_kind: &'static str,
        rides: Arc<dyn RideStore>,
        drivers: Arc<dyn DriverStore>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let offers = Arc::new(OfferCoordinator::new());
        let locks = Arc::new(RideLocks::new());
        let notifier: Arc<dyn Notifier> = Arc::new(SocketNotifier::new(registry.clone()));

        let dispatch = Arc::new(DispatchEngine::new(
            rides.clone(),
            drivers.clone(),
            registry.clone(),
            offers.clone(),
            notifier.clone(),
            locks.clone(),
            config.dispatch_config(),
        ));
        let lifecycle = Arc::new(RideLifecycle::new(
            rides.clone(),
            drivers.clone(),
            offers.clone(),
            notifier.clone(),
            locks,
        ));
        let gateway = Arc::new(RealtimeGateway::new(
            registry.clone(),
            offers.clone(),
            drivers.clone(),
            notifier.clone(),
        ));

        Self {
            config,
            store_kind,
            rides,
            drivers,
            registry,
            offers,
            notifier,
            dispatch,
            lifecycle,
            gateway,
        }
    }
}
