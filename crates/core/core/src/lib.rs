//! # supasaasy core
//!
//! This crate provides the foundational types and traits for the supasaasy
//! ingestion pipeline. It defines the canonical data structures (`Entity`,
//! `SyncJob`, `WebhookLog`), the error taxonomy, and the trait interfaces
//! that storage adapters and connectors must implement.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{CoreError, CoreResult};
pub use traits::{Connector, ConnectorPage, EntityStore, JobStore, SyncStateStore, WebhookLogStore};
pub use types::{
    AppConfig, ConnectorAppConfig, ConnectorMetadata, Entity, EntityKey, NormalizedEntity,
    ParsedWebhookEvent, ResourceDescriptor, SecretRef, SyncCounters, SyncJob, SyncJobTask,
    SyncMode, SyncState, SyncStatus, UpsertOutcome, WebhookEventType, WebhookLog,
};
