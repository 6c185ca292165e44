//! # Web API Application State

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::LdnConfig;
use crate::orchestration::DeliveryCoordinator;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<DeliveryCoordinator>,
    pub config: Arc<LdnConfig>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(coordinator: Arc<DeliveryCoordinator>, config: Arc<LdnConfig>) -> Self {
        Self {
            coordinator,
            config,
            started_at: Utc::now(),
        }
    }
}
