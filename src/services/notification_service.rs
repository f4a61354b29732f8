// src/services/notification_service.rs
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing;

use crate::{
    models::{messages::ServerEvent, ride::Ride},
    services::connection_registry::ConnectionRegistry,
};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("no live connection for {0}")]
    NotConnected(String),

    #[error("connection closed for {0}")]
    ConnectionClosed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyTarget {
    /// The rider waiting on a ride.
    Rider(String),
    Driver(String),
}

impl std::fmt::Display for NotifyTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyTarget::Rider(ride_id) => write!(f, "rider of ride {}", ride_id),
            NotifyTarget::Driver(driver_id) => write!(f, "driver {}", driver_id),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, target: NotifyTarget, event: ServerEvent) -> Result<(), DeliveryError>;

    /// Best-effort delivery: failures are logged, never returned.
    async fn notify(&self, target: NotifyTarget, event: ServerEvent) {
        let name = event.name();
        if let Err(e) = self.deliver(target.clone(), event).await {
            tracing::debug!("Dropped {} for {}: {}", name, target, e);
        }
    }

    async fn notify_rider(&self, ride: &Ride, message: &str) {
        self.notify(
            NotifyTarget::Rider(ride.id.clone()),
            ServerEvent::ride_update(ride, message),
        )
        .await;
    }
}

/// Delivers over the realtime sockets tracked by the registry.
pub struct SocketNotifier {
    registry: Arc<ConnectionRegistry>,
}

impl SocketNotifier {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Notifier for SocketNotifier {
    async fn deliver(&self, target: NotifyTarget, event: ServerEvent) -> Result<(), DeliveryError> {
        let handle = match &target {
            NotifyTarget::Rider(ride_id) => self.registry.rider_connection(ride_id),
            NotifyTarget::Driver(driver_id) => self.registry.driver_connection(driver_id),
        }
        .ok_or_else(|| DeliveryError::NotConnected(target.to_string()))?;

        tracing::debug!("Sending {} to {}", event.name(), target);
        handle
            .send(event)
            .map_err(|_| DeliveryError::ConnectionClosed(target.to_string()))
    }
}
