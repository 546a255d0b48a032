//! S3-compatible object storage client.
//!
//! This crate provides:
//! - `put(bytes, key) -> uri` and `get(uri) -> bytes`
//! - File upload/download helpers
//! - `s3://bucket/key` URI handling
//!
//! Calls go through a single-slot [`remix_pool::CredentialPool`] so throttling
//! and transient failures share the same retry policy as every other
//! external service.

pub mod client;
pub mod error;
pub mod uri;

pub use client::{BucketClient, BucketConfig};
pub use error::{StorageError, StorageResult};
pub use uri::ObjectUri;
