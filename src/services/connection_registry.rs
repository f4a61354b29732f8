// src/services/connection_registry.rs
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing;
use uuid::Uuid;

use crate::errors::{DispatchError, DispatchResult};
use crate::models::messages::ServerEvent;

pub type ConnectionId = Uuid;

/// Sending half of a live socket. The socket's writer task owns the receiver,
/// so a send fails once that task has exited.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
        }
    }

    /// Handle plus the receiver a writer task (or a test) drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn send(&self, event: ServerEvent) -> DispatchResult<()> {
        self.sender
            .send(event)
            .map_err(|_| DispatchError::ConnectionClosed(self.id.to_string()))
    }
}

/// Bindings removed by [`ConnectionRegistry::unregister_by_connection`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Unregistered {
    pub driver_id: Option<String>,
    pub ride_id: Option<String>,
}

/// Who is reachable right now. Drivers are keyed by driver id, riders by the
/// ride they are waiting on.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    drivers: DashMap<String, ConnectionHandle>,
    connection_drivers: DashMap<ConnectionId, String>,
    riders: DashMap<String, ConnectionHandle>,
    connection_rides: DashMap<ConnectionId, String>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_driver(&self, driver_id: &str, handle: ConnectionHandle) {
        let connection_id = handle.id();

        if let Some(previous) = self.connection_drivers.insert(connection_id, driver_id.to_string()) {
            if previous != driver_id {
                self.drivers.remove_if(&previous, |_, h| h.id() == connection_id);
            }
        }

        if let Some(stale) = self.drivers.insert(driver_id.to_string(), handle) {
            if stale.id() != connection_id {
                self.connection_drivers.remove(&stale.id());
                // The old socket may still be open; tell it, ignore failures
                let _ = stale.send(ServerEvent::error("Driver registered on another connection"));
                tracing::info!("Driver {} re-registered, replacing connection {}", driver_id, stale.id());
            }
        }

        tracing::debug!("Driver {} bound to connection {}", driver_id, connection_id);
    }

    pub fn register_rider(&self, ride_id: &str, handle: ConnectionHandle) {
        let connection_id = handle.id();

        if let Some(previous) = self.connection_rides.insert(connection_id, ride_id.to_string()) {
            if previous != ride_id {
                self.riders.remove_if(&previous, |_, h| h.id() == connection_id);
            }
        }

        if let Some(stale) = self.riders.insert(ride_id.to_string(), handle) {
            if stale.id() != connection_id {
                self.connection_rides.remove(&stale.id());
            }
        }

        tracing::debug!("Rider for ride {} bound to connection {}", ride_id, connection_id);
    }

    pub fn driver_connection(&self, driver_id: &str) -> Option<ConnectionHandle> {
        self.drivers.get(driver_id).map(|entry| entry.value().clone())
    }

    pub fn rider_connection(&self, ride_id: &str) -> Option<ConnectionHandle> {
        self.riders.get(ride_id).map(|entry| entry.value().clone())
    }

    pub fn is_driver_connected(&self, driver_id: &str) -> bool {
        self.driver_connection(driver_id)
            .is_some_and(|handle| !handle.is_closed())
    }

    pub fn send_to_driver(&self, driver_id: &str, event: ServerEvent) -> DispatchResult<()> {
        match self.driver_connection(driver_id) {
            Some(handle) => handle.send(event),
            None => Err(DispatchError::ConnectionClosed(format!("driver {}", driver_id))),
        }
    }

    pub fn send_to_rider(&self, ride_id: &str, event: ServerEvent) -> DispatchResult<()> {
        match self.rider_connection(ride_id) {
            Some(handle) => handle.send(event),
            None => Err(DispatchError::ConnectionClosed(format!("rider of ride {}", ride_id))),
        }
    }

    /// Drops whatever this connection was bound to. Safe to call repeatedly.
    /// An id is reported only when this call removed its live binding, so a
    /// stale socket closing after a re-registration reports nothing.
    pub fn unregister_by_connection(&self, connection_id: ConnectionId) -> Unregistered {
        let driver_id = self
            .connection_drivers
            .remove(&connection_id)
            .and_then(|(_, driver_id)| {
                self.drivers
                    .remove_if(&driver_id, |_, h| h.id() == connection_id)
                    .map(|(driver_id, _)| driver_id)
            });

        let ride_id = self
            .connection_rides
            .remove(&connection_id)
            .and_then(|(_, ride_id)| {
                self.riders
                    .remove_if(&ride_id, |_, h| h.id() == connection_id)
                    .map(|(ride_id, _)| ride_id)
            });

        Unregistered { driver_id, ride_id }
    }

    pub fn connected_drivers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.drivers.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn registered_rides(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.riders.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}
