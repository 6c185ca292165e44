//! # Metadata Processor
//!
//! Records a relationship announced by a notification as a metadata value on
//! a repository item, e.g. "item X `isReviewedBy` review Y".
//!
//! The item is identified by `context.id` (falling back to `object.id`); the
//! value is read from the raw document through a JSON pointer. Before writing,
//! the processor checks whether the value is already present, so a repeated
//! delivery of the same notification is a no-op.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::Notification;
use crate::orchestration::processor::{Processor, ProcessorError, ProcessorOutcome, ProcessorResult};

/// Pointers tried in order when no `value_pointer` is configured
const DEFAULT_VALUE_POINTERS: [&str; 2] = ["/object/ietf:cite-as", "/object/id"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

/// Access to repository item metadata
#[async_trait]
pub trait ItemRepository: Send + Sync {
    async fn has_metadata(&self, item_id: &str, field: &str, value: &str)
        -> Result<bool, RepositoryError>;

    async fn add_metadata(&self, item_id: &str, field: &str, value: &str)
        -> Result<(), RepositoryError>;
}

/// Settings for a `metadata` route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSettings {
    /// Metadata field to add, e.g. `datacite.relation.isReviewedBy`
    pub field: String,
    #[serde(default)]
    pub value_pointer: Option<String>,
    /// Overrides the `context.id` / `object.id` item lookup
    #[serde(default)]
    pub item_pointer: Option<String>,
}

impl MetadataSettings {
    pub fn for_field(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value_pointer: None,
            item_pointer: None,
        }
    }

    pub fn from_value(settings: serde_json::Value) -> Result<Self, ProcessorError> {
        let settings: Self = serde_json::from_value(settings)
            .map_err(|e| ProcessorError::Settings(e.to_string()))?;
        if settings.field.trim().is_empty() {
            return Err(ProcessorError::Settings("field must not be empty".to_string()));
        }
        Ok(settings)
    }
}

pub struct MetadataProcessor {
    id: String,
    settings: MetadataSettings,
    repository: Arc<dyn ItemRepository>,
}

impl MetadataProcessor {
    pub fn new(
        id: impl Into<String>,
        settings: MetadataSettings,
        repository: Arc<dyn ItemRepository>,
    ) -> Self {
        Self {
            id: id.into(),
            settings,
            repository,
        }
    }

    fn item_id(&self, notification: &Notification) -> Option<String> {
        if let Some(pointer) = &self.settings.item_pointer {
            return string_at(notification, pointer);
        }
        notification
            .context
            .as_ref()
            .or(notification.object.as_ref())
            .map(|o| o.id.clone())
    }

    fn value(&self, notification: &Notification) -> Option<String> {
        match &self.settings.value_pointer {
            Some(pointer) => string_at(notification, pointer),
            None => DEFAULT_VALUE_POINTERS
                .iter()
                .find_map(|pointer| string_at(notification, pointer)),
        }
    }
}

fn string_at(notification: &Notification, pointer: &str) -> Option<String> {
    notification
        .raw
        .pointer(pointer)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn outcome_for(error: RepositoryError) -> ProcessorOutcome {
    match error {
        RepositoryError::ItemNotFound(_) => ProcessorOutcome::permanent(error.to_string()),
        RepositoryError::Unavailable(_) => ProcessorOutcome::transient(error.to_string()),
    }
}

#[async_trait]
impl Processor for MetadataProcessor {
    fn id(&self) -> &str {
        &self.id
    }

    fn matches(&self, _notification: &Notification) -> bool {
        true
    }

    async fn process(&self, notification: &Notification) -> ProcessorResult {
        let Some(item_id) = self.item_id(notification) else {
            return Ok(ProcessorOutcome::permanent("no target item identified"));
        };
        let Some(value) = self.value(notification) else {
            return Ok(ProcessorOutcome::permanent(format!(
                "no value for metadata field {}",
                self.settings.field
            )));
        };
        let field = self.settings.field.as_str();

        match self.repository.has_metadata(&item_id, field, &value).await {
            Ok(true) => {
                debug!(
                    processor_id = %self.id,
                    item_id = %item_id,
                    field = field,
                    "Metadata already present; nothing to do"
                );
                return Ok(ProcessorOutcome::Success);
            }
            Ok(false) => {}
            Err(e) => return Ok(outcome_for(e)),
        }

        if let Err(e) = self.repository.add_metadata(&item_id, field, &value).await {
            return Ok(outcome_for(e));
        }

        info!(
            processor_id = %self.id,
            message_id = %notification.id,
            item_id = %item_id,
            field = field,
            value = %value,
            "📝 Metadata added from notification"
        );
        Ok(ProcessorOutcome::Success)
    }
}

/// Item repository held in memory
#[derive(Debug, Default)]
pub struct InMemoryItemRepository {
    items: DashMap<String, HashMap<String, Vec<String>>>,
    unavailable: AtomicBool,
}

impl InMemoryItemRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let repository = Self::new();
        for item in items {
            repository.insert_item(item);
        }
        repository
    }

    pub fn insert_item(&self, item_id: impl Into<String>) {
        self.items.entry(item_id.into()).or_default();
    }

    pub fn metadata(&self, item_id: &str, field: &str) -> Vec<String> {
        self.items
            .get(item_id)
            .and_then(|item| item.get(field).cloned())
            .unwrap_or_default()
    }

    /// Simulate an outage
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("repository offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ItemRepository for InMemoryItemRepository {
    async fn has_metadata(
        &self,
        item_id: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, RepositoryError> {
        self.check_available()?;
        let item = self
            .items
            .get(item_id)
            .ok_or_else(|| RepositoryError::ItemNotFound(item_id.to_string()))?;
        Ok(item
            .get(field)
            .is_some_and(|values| values.iter().any(|v| v == value)))
    }

    async fn add_metadata(
        &self,
        item_id: &str,
        field: &str,
        value: &str,
    ) -> Result<(), RepositoryError> {
        self.check_available()?;
        let mut item = self
            .items
            .get_mut(item_id)
            .ok_or_else(|| RepositoryError::ItemNotFound(item_id.to_string()))?;
        let values = item.entry(field.to_string()).or_default();
        if !values.iter().any(|v| v == value) {
            values.push(value.to_string());
        }
        Ok(())
    }
}
