use thiserror::Error;

use crate::config::ConfigurationError;
use crate::models::ValidationError;
use crate::registry::RegistryError;
use crate::state_machine::StateMachineError;
use crate::store::StoreError;

/// Top-level error for the LDN inbox engine
#[derive(Debug, Error)]
pub enum LdnError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("State transition error: {0}")]
    StateTransition(#[from] StateMachineError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Orchestration error: {0}")]
    Orchestration(String),
}

impl LdnError {
    /// Whether the caller submitted something unacceptable, as opposed to an
    /// infrastructure fault on our side
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, LdnError>;
