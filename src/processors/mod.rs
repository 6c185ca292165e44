//! # Reference Processors
//!
//! Concrete [`Processor`](crate::orchestration::Processor) implementations
//! and the collaborators they act through.
//!
//! - [`AcknowledgeProcessor`]: records the notification, no side effect
//! - [`MetadataProcessor`]: adds a metadata value to a repository item
//! - [`ForwardProcessor`]: relays the notification to `target.inbox`

pub mod acknowledge;
pub mod forward;
pub mod metadata;
pub mod outbound;

pub use acknowledge::AcknowledgeProcessor;
pub use forward::{ForwardProcessor, ForwardSettings};
pub use metadata::{
    InMemoryItemRepository, ItemRepository, MetadataProcessor, MetadataSettings, RepositoryError,
};
pub use outbound::{HttpOutboundSender, OutboundError, OutboundSender};
