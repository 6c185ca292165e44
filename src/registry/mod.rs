//! # Registry Infrastructure
//!
//! The ordered processor registry and the factory that builds it from
//! configuration.
//!
//! ```text
//! Registry Infrastructure
//! ├── ProcessorFactory    (route config -> processors, by kind)
//! └── ProcessorRegistry   (ordered, read-only after startup)
//! ```

pub mod processor_factory;
pub mod processor_registry;

use thiserror::Error;

pub use processor_factory::{ProcessorBuilder, ProcessorFactory};
pub use processor_registry::{ProcessorRegistry, RegistryStats};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Processor '{id}' is already registered")]
    DuplicateProcessor { id: String },

    #[error("Route '{route}' uses unknown processor kind '{kind}'")]
    UnknownKind { route: String, kind: String },

    #[error("Invalid settings for route '{route}': {reason}")]
    InvalidSettings { route: String, reason: String },
}
