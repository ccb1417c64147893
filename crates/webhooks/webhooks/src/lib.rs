//! # supasaasy webhooks
//!
//! Inbound webhook admission pipeline for the ingestion core: method/app_key/
//! body-size/rate-limit admission, connector resolution, signature
//! verification, payload parsing, and dispatch into the entity store. See
//! [`handler::router`] for the axum route this crate exposes.

pub mod admission;
pub mod dispatch;
mod error;
pub mod handler;
pub mod redact;

pub use error::{WebhookError, WebhookResult};
pub use handler::{router, WebhookState};
