//! # Processor Factory
//!
//! Builds the processor registry from the `[[routes]]` configuration table.
//!
//! ## Overview
//!
//! Each route names a processor *kind*. The factory maps kinds to builder
//! functions, builds the processor for each route, wraps it in a
//! [`RuleProcessor`] carrying the route's match rule, and registers the
//! results in route order. Unknown kinds fail at startup rather than at
//! routing time.
//!
//! ## Usage
//!
//! ```rust
//! use ldn_core::config::RouteConfig;
//! use ldn_core::processors::InMemoryItemRepository;
//! use ldn_core::registry::ProcessorFactory;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = ProcessorFactory::new()
//!     .with_metadata_kind(Arc::new(InMemoryItemRepository::new()));
//!
//! let routes = vec![RouteConfig {
//!     name: "offers".to_string(),
//!     processor: "acknowledge".to_string(),
//!     types: vec!["Offer".to_string()],
//!     object_types: vec![],
//!     target_types: vec![],
//!     settings: Default::default(),
//! }];
//! let registry = factory.build_registry(&routes)?;
//! assert_eq!(registry.len(), 1);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::{ProcessorRegistry, RegistryError};
use crate::config::RouteConfig;
use crate::logging::log_registry_operation;
use crate::orchestration::matching::{MatchRule, RuleProcessor};
use crate::orchestration::processor::Processor;
use crate::processors::{
    AcknowledgeProcessor, ForwardProcessor, ForwardSettings, ItemRepository, MetadataProcessor,
    MetadataSettings, OutboundSender,
};

type BuildResult = Result<Arc<dyn Processor>, RegistryError>;

/// Builds the processor for one route
pub type ProcessorBuilder = Arc<dyn Fn(&RouteConfig) -> BuildResult + Send + Sync>;

pub const ACKNOWLEDGE_KIND: &str = "acknowledge";
pub const METADATA_KIND: &str = "metadata";
pub const FORWARD_KIND: &str = "forward";

/// Kind-keyed processor builders
#[derive(Clone)]
pub struct ProcessorFactory {
    builders: HashMap<String, ProcessorBuilder>,
}

impl Default for ProcessorFactory {
    fn default() -> Self {
        Self::new()
    }
}

fn settings_value(route: &RouteConfig) -> serde_json::Value {
    serde_json::Value::Object(route.settings.clone())
}

fn invalid_settings(route: &RouteConfig, error: impl std::fmt::Display) -> RegistryError {
    RegistryError::InvalidSettings {
        route: route.name.clone(),
        reason: error.to_string(),
    }
}

impl ProcessorFactory {
    /// Factory that knows only the `acknowledge` kind
    pub fn new() -> Self {
        let mut factory = Self {
            builders: HashMap::new(),
        };
        factory.register_kind(
            ACKNOWLEDGE_KIND,
            Arc::new(|route: &RouteConfig| -> BuildResult {
                Ok(Arc::new(AcknowledgeProcessor::new(route.name.clone())))
            }),
        );
        factory
    }

    /// Factory with every built-in kind
    pub fn with_defaults(
        repository: Arc<dyn ItemRepository>,
        sender: Arc<dyn OutboundSender>,
    ) -> Self {
        Self::new()
            .with_metadata_kind(repository)
            .with_forward_kind(sender)
    }

    pub fn with_metadata_kind(mut self, repository: Arc<dyn ItemRepository>) -> Self {
        self.register_kind(
            METADATA_KIND,
            Arc::new(move |route: &RouteConfig| -> BuildResult {
                let settings = MetadataSettings::from_value(settings_value(route))
                    .map_err(|e| invalid_settings(route, e))?;
                Ok(Arc::new(MetadataProcessor::new(
                    route.name.clone(),
                    settings,
                    repository.clone(),
                )))
            }),
        );
        self
    }

    pub fn with_forward_kind(mut self, sender: Arc<dyn OutboundSender>) -> Self {
        self.register_kind(
            FORWARD_KIND,
            Arc::new(move |route: &RouteConfig| -> BuildResult {
                let settings = ForwardSettings::from_value(settings_value(route))
                    .map_err(|e| invalid_settings(route, e))?;
                Ok(Arc::new(ForwardProcessor::new(
                    route.name.clone(),
                    settings,
                    sender.clone(),
                )))
            }),
        );
        self
    }

    /// Add or replace the builder for `kind`
    pub fn register_kind(&mut self, kind: impl Into<String>, builder: ProcessorBuilder) {
        self.builders.insert(kind.into(), builder);
    }

    /// Known kinds, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Build the processor for one route, guarded by the route's match rule
    pub fn build(&self, route: &RouteConfig) -> BuildResult {
        let builder = self
            .builders
            .get(&route.processor)
            .ok_or_else(|| RegistryError::UnknownKind {
                route: route.name.clone(),
                kind: route.processor.clone(),
            })?;

        let inner = builder(route)?;
        let rule = MatchRule::for_types(route.types.iter().map(String::as_str))
            .with_object_types(route.object_types.iter().map(String::as_str))
            .with_target_types(route.target_types.iter().map(String::as_str));

        log_registry_operation("build", &route.name, &route.processor, "ok");
        Ok(Arc::new(RuleProcessor::new(route.name.clone(), rule, inner)))
    }

    /// Build every route in order
    pub fn build_registry(
        &self,
        routes: &[RouteConfig],
    ) -> Result<ProcessorRegistry, RegistryError> {
        let mut registry = ProcessorRegistry::new();
        for route in routes {
            registry.register(self.build(route)?)?;
        }

        info!(
            processors = registry.len(),
            order = ?registry.stats().processor_ids,
            "📚 Processor registry built from configuration"
        );
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Notification;
    use crate::processors::InMemoryItemRepository;
    use serde_json::json;

    fn route(name: &str, kind: &str, types: &[&str]) -> RouteConfig {
        RouteConfig {
            name: name.to_string(),
            processor: kind.to_string(),
            types: types.iter().map(|t| t.to_string()).collect(),
            object_types: vec![],
            target_types: vec![],
            settings: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let factory = ProcessorFactory::new();
        let result = factory.build_registry(&[route("mystery", "teleport", &["Offer"])]);
        assert!(matches!(
            result,
            Err(RegistryError::UnknownKind { ref kind, .. }) if kind == "teleport"
        ));
    }

    #[test]
    fn test_built_processor_uses_route_rule() {
        let factory = ProcessorFactory::new();
        let registry = factory
            .build_registry(&[route("offers", ACKNOWLEDGE_KIND, &["Offer"])])
            .unwrap();

        let processor = &registry.all()[0];
        assert_eq!(processor.id(), "offers");

        let offer =
            Notification::parse(json!({ "id": "m1", "type": "Offer:ReviewOffer" })).unwrap();
        let announce = Notification::parse(json!({ "id": "m2", "type": "Announce" })).unwrap();
        assert!(processor.matches(&offer));
        assert!(!processor.matches(&announce));
    }

    #[test]
    fn test_metadata_kind_validates_settings() {
        let factory =
            ProcessorFactory::new().with_metadata_kind(Arc::new(InMemoryItemRepository::new()));
        assert_eq!(factory.kinds(), vec![ACKNOWLEDGE_KIND, METADATA_KIND]);

        let missing_field = route("reviews", METADATA_KIND, &["Announce"]);
        assert!(matches!(
            factory.build(&missing_field),
            Err(RegistryError::InvalidSettings { .. })
        ));

        let mut configured = missing_field.clone();
        configured
            .settings
            .insert("field".to_string(), json!("datacite.relation.isReviewedBy"));
        assert!(factory.build(&configured).is_ok());
    }
}
