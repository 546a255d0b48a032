//! Firestore REST API client.
//!
//! This crate provides:
//! - Document get and masked merge updates
//! - Service account authentication via gcp_auth, or the emulator
//! - The run record written after a remix is published
//!
//! Requests go through a [`remix_pool::CredentialPool`], so rate limits and
//! server errors follow the shared retry policy.

pub mod client;
pub mod error;
pub mod metrics;
pub mod record;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use record::{RunRecord, RunRecordStore};
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
