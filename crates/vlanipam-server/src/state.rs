use crate::allocator::Allocator;
use crate::config::ServiceConfig;
use crate::health::HealthAggregator;
use crate::refresh::RefreshDriver;
use std::sync::Arc;
use vlanipam_cloud::CloudInventory;
use vlanipam_store::StoreConnector;

/// Shared application state, built once at startup and handed to every
/// request handler. Process-wide mutable state (the caches) lives
/// inside the components it belongs to; there are no globals.
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub allocator: Allocator,
    pub health: HealthAggregator,
    pub refresh: Arc<dyn RefreshDriver>,
}

impl AppState {
    pub fn new(
        config: Arc<ServiceConfig>,
        connector: Arc<dyn StoreConnector>,
        cloud: Arc<dyn CloudInventory>,
        refresh: Arc<dyn RefreshDriver>,
    ) -> Self {
        let allocator = Allocator::new(config.clone(), connector.clone(), cloud.clone());
        let health = HealthAggregator::new(config.clone(), cloud, connector);
        Self {
            config,
            allocator,
            health,
            refresh,
        }
    }
}
