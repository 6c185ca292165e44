//! # Processor Registry
//!
//! Ordered set of processors consulted by the router.
//!
//! Registration order is significant: the router returns the first processor
//! whose predicate accepts an envelope, so a processor registered after an
//! overlapping one only sees the envelopes the earlier one declines. The
//! registry is populated at startup and read-only afterwards.

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use super::RegistryError;
use crate::orchestration::processor::Processor;

/// Registry statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub total_processors: usize,
    /// Processor ids in evaluation order
    pub processor_ids: Vec<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ProcessorRegistry {
    processors: Vec<Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a processor; ids must be unique
    pub fn register(&mut self, processor: Arc<dyn Processor>) -> Result<(), RegistryError> {
        if self.get(processor.id()).is_some() {
            return Err(RegistryError::DuplicateProcessor {
                id: processor.id().to_string(),
            });
        }

        debug!(
            processor_id = processor.id(),
            position = self.processors.len(),
            "Registered processor"
        );
        self.processors.push(processor);
        Ok(())
    }

    /// Builder-style [`Self::register`]
    pub fn with(mut self, processor: Arc<dyn Processor>) -> Result<Self, RegistryError> {
        self.register(processor)?;
        Ok(self)
    }

    /// Processors in registration order
    pub fn all(&self) -> &[Arc<dyn Processor>] {
        &self.processors
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Processor>> {
        self.processors.iter().find(|p| p.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            total_processors: self.processors.len(),
            processor_ids: self.processors.iter().map(|p| p.id().to_string()).collect(),
        }
    }
}
