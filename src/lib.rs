#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # LDN Core Rust
//!
//! Inbox engine for Linked Data Notifications in the COAR Notify dialect.
//!
//! ## Overview
//!
//! A repository exposes an inbox; external services (review platforms,
//! aggregators, other repositories) POST JSON-LD notifications to it. Each
//! accepted notification is persisted as a message record, routed to at most
//! one processor, processed, and its outcome recorded. Transient failures are
//! retried on a backoff schedule until they succeed or run out of attempts.
//!
//! ## Architecture
//!
//! ```text
//! POST /ldn/inbox
//!     │
//!     ▼
//! Notification::from_document ── 400 on malformed input
//!     │
//!     ▼
//! DeliveryCoordinator ── per-id lock ── MessageStore (insert_if_absent, CAS)
//!     │                                      ▲
//!     ▼                                      │
//! Router ──▶ Processor ──▶ outcome ──▶ MessageStateMachine
//!                                            ▲
//! RetryScheduler ── find_due ── retry_if_due ┘
//! ```
//!
//! ## Key Features
//!
//! - **Idempotent receipt**: one record per notification id; duplicates of
//!   finished messages replay the stored outcome
//! - **At-most-one attempt in flight** per message id, across live receipt,
//!   scheduled retries and manual retry
//! - **Fault isolation**: processor errors, panics and timeouts become
//!   transient failures instead of crashing the engine
//! - **Config-driven routing**: ordered `[[routes]]` with type, object-type and
//!   target-type patterns
//! - **Pluggable persistence**: in-memory store, or PostgreSQL via SQLx
//!
//! ## Module Organization
//!
//! - [`models`] - Notification envelope and message record
//! - [`state_machine`] - Queue status transition table
//! - [`store`] - Message store trait and implementations
//! - [`orchestration`] - Router, delivery coordinator, retry scheduler, backoff
//! - [`processors`] - Reference processors and their collaborators
//! - [`registry`] - Processor registry and config-driven factory
//! - [`config`] - Layered TOML and environment configuration
//! - [`error`] - Structured error handling
//! - `web` - axum inbox and operator endpoints (feature `web-api`)
//!
//! ## Quick Start
//!
//! ```rust
//! use ldn_core::config::LdnConfig;
//! use ldn_core::orchestration::{DeliveryCoordinator, DeliveryOutcome, Router};
//! use ldn_core::processors::InMemoryItemRepository;
//! use ldn_core::registry::ProcessorFactory;
//! use ldn_core::store::InMemoryMessageStore;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = LdnConfig::default();
//! config.routes = vec![serde_json::from_value(json!({
//!     "name": "offers",
//!     "processor": "acknowledge",
//!     "types": ["Offer"]
//! }))?];
//!
//! let factory = ProcessorFactory::new()
//!     .with_metadata_kind(Arc::new(InMemoryItemRepository::new()));
//! let registry = factory.build_registry(&config.routes)?;
//! let coordinator = DeliveryCoordinator::from_config(
//!     &config,
//!     Arc::new(InMemoryMessageStore::new()),
//!     Router::new(Arc::new(registry)),
//! );
//!
//! let outcome = coordinator
//!     .submit(json!({ "id": "urn:uuid:1", "type": ["Offer", "coar-notify:ReviewAction"] }))
//!     .await?;
//! assert!(matches!(outcome, DeliveryOutcome::Processed(_)));
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```
//!
//! PostgreSQL store tests are ignored unless `DATABASE_URL` points at a
//! database: `cargo test -- --ignored`.

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod orchestration;
pub mod processors;
pub mod registry;
pub mod state_machine;
pub mod store;
pub mod utils;

#[cfg(feature = "web-api")]
pub mod web;

pub use config::{ConfigManager, LdnConfig};
pub use error::{LdnError, Result};
pub use metrics::{DeliveryMetrics, DeliveryMetricsSnapshot};
pub use models::{MessageRecord, Notification};
pub use orchestration::{DeliveryCoordinator, DeliveryOutcome, RetryScheduler, Router};
pub use state_machine::QueueStatus;
