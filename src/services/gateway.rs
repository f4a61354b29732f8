// src/services/gateway.rs
// Routes inbound socket events to the registry, the offer table and the driver store.
use std::sync::Arc;
use tracing;

use crate::{
    errors::{DispatchError, DispatchResult},
    models::{
        driver::DriverPatch,
        location::{Coordinate, DriverLocation},
        messages::{ClientEvent, DriverResponse, LocationReport, RegisterDriver, ServerEvent},
    },
    services::{
        connection_registry::{ConnectionHandle, ConnectionId, ConnectionRegistry},
        notification_service::{Notifier, NotifyTarget},
        offer_coordinator::{OfferCoordinator, ResolveResult},
        store::DriverStore,
    },
};

pub struct RealtimeGateway {
    registry: Arc<ConnectionRegistry>,
    offers: Arc<OfferCoordinator>,
    drivers: Arc<dyn DriverStore>,
    notifier: Arc<dyn Notifier>,
}

impl RealtimeGateway {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        offers: Arc<OfferCoordinator>,
        drivers: Arc<dyn DriverStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            registry,
            offers,
            drivers,
            notifier,
        }
    }

    pub async fn handle_text(&self, connection: &ConnectionHandle, text: &str) -> DispatchResult<()> {
        let event: ClientEvent = serde_json::from_str(text)?;
        self.handle_event(connection, event).await
    }

    pub async fn handle_event(&self, connection: &ConnectionHandle, event: ClientEvent) -> DispatchResult<()> {
        match event {
            ClientEvent::RegisterDriver(register) => self.register_driver(connection, register).await,
            ClientEvent::RegisterRider(register) => {
                self.registry.register_rider(&register.ride_id, connection.clone());
                tracing::info!("Rider registered for ride {}", register.ride_id);
                Ok(())
            }
            ClientEvent::DriverLocation(report) => self.driver_location(connection, report).await,
            ClientEvent::UpdateLocation(update) => {
                self.ensure_bound(connection, &update.driver_id)?;
                self.patch_driver(&update.driver_id, DriverPatch::location(located(update.location)?))
                    .await
            }
            ClientEvent::DriverResponse(response) => self.driver_response(connection, response).await,
        }
    }

    /// Unbinds the connection; a driver that owned it goes offline.
    pub async fn handle_disconnect(&self, connection_id: ConnectionId) {
        let removed = self.registry.unregister_by_connection(connection_id);

        if let Some(driver_id) = removed.driver_id {
            tracing::info!("Driver {} disconnected", driver_id);
            if let Err(e) = self.drivers.update_driver(&driver_id, DriverPatch::went_offline()).await {
                tracing::error!("Could not mark driver {} offline: {}", driver_id, e);
            }
        }
        if let Some(ride_id) = removed.ride_id {
            tracing::debug!("Rider of ride {} disconnected", ride_id);
        }
    }

    async fn register_driver(&self, connection: &ConnectionHandle, register: RegisterDriver) -> DispatchResult<()> {
        if self.drivers.find_driver(&register.driver_id).await?.is_none() {
            return Err(DispatchError::driver_not_found(&register.driver_id));
        }
        let location = register.location.map(located).transpose()?;

        self.registry.register_driver(&register.driver_id, connection.clone());
        self.patch_driver(&register.driver_id, DriverPatch::went_online(location))
            .await?;

        tracing::info!("Driver {} online on connection {}", register.driver_id, connection.id());
        Ok(())
    }

    async fn driver_location(&self, connection: &ConnectionHandle, report: LocationReport) -> DispatchResult<()> {
        self.ensure_bound(connection, &report.driver_id)?;
        let patch = DriverPatch {
            last_known_location: Some(located(Coordinate::new(report.lat, report.lng))?),
            // Only an explicit toggle changes availability; an offered driver stays claimed
            available: report.available,
            ..Default::default()
        };
        self.patch_driver(&report.driver_id, patch).await
    }

    async fn driver_response(&self, connection: &ConnectionHandle, response: DriverResponse) -> DispatchResult<()> {
        self.ensure_bound(connection, &response.driver_id)?;

        let result = self.offers.resolve_response(
            &response.ride_id,
            &response.driver_id,
            response.accepted,
            response.info.clone(),
        );
        if result != ResolveResult::Resolved {
            tracing::debug!(
                "Response from driver {} for ride {} not applied: {:?}",
                response.driver_id, response.ride_id, result
            );
        }

        self.notifier
            .notify(
                NotifyTarget::Rider(response.ride_id.clone()),
                ServerEvent::DriverResponseUser(response),
            )
            .await;
        Ok(())
    }

    fn ensure_bound(&self, connection: &ConnectionHandle, driver_id: &str) -> DispatchResult<()> {
        match self.registry.driver_connection(driver_id) {
            Some(bound) if bound.id() == connection.id() => Ok(()),
            _ => Err(DispatchError::bad_request(format!(
                "Connection is not registered as driver {}",
                driver_id
            ))),
        }
    }

    async fn patch_driver(&self, driver_id: &str, patch: DriverPatch) -> DispatchResult<()> {
        self.drivers
            .update_driver(driver_id, patch)
            .await?
            .map(|_| ())
            .ok_or_else(|| DispatchError::driver_not_found(driver_id))
    }
}

fn located(point: Coordinate) -> DispatchResult<DriverLocation> {
    if !point.is_valid() {
        return Err(DispatchError::validation_error("location", "Coordinates are out of range"));
    }
    Ok(DriverLocation::now(point))
}
