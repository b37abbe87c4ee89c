//! Request/response surface. Each module pairs `_db` storage helpers
//! (`Result<_, String>`) with command functions that take `&AppState`.

pub mod alerts;
pub mod config;
pub mod metrics;
pub mod streams;
pub mod webhooks;

use std::sync::Arc;

use crate::alerts::notifier::WebhookNotifier;
use crate::bridge::CollectorBridge;
use crate::db::DbPool;
use crate::error::CommandError;
use crate::registry::StreamRegistry;
use crate::types::config::MonitorConfig;

/// Shared handles every command needs.
pub struct AppState {
    pub pool: DbPool,
    pub registry: Arc<StreamRegistry>,
    pub notifier: Arc<WebhookNotifier>,
    pub collector: Option<Arc<CollectorBridge>>,
}

impl AppState {
    pub fn new(pool: DbPool, settings: MonitorConfig) -> Result<Self, CommandError> {
        let notifier = Arc::new(
            WebhookNotifier::new(settings.webhooks.clone()).map_err(CommandError::Internal)?,
        );
        let registry = Arc::new(StreamRegistry::new(settings, notifier.clone()));
        Ok(Self {
            pool,
            registry,
            notifier,
            collector: None,
        })
    }

    pub fn with_collector(mut self, collector: Arc<CollectorBridge>) -> Self {
        self.collector = Some(collector);
        self
    }
}
