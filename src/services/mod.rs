pub mod connection_registry;
pub mod dispatch_engine;
pub mod gateway;
pub mod geo_ranker;
pub mod notification_service;
pub mod offer_coordinator;
pub mod ride_lifecycle;
pub mod ride_locks;
pub mod store;
