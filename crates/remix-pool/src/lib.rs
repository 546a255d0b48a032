//! Credential rotation and retry pool.
//!
//! Every external API call goes through a [`CredentialPool`]. The pool owns
//! a set of API keys ("slots") and hides three concerns from its callers:
//!
//! - **Rotation**: a rate-limited slot cools down with exponential backoff
//!   and the call moves on to the next available slot.
//! - **Retry**: transient failures are retried on the same slot with
//!   jittered exponential backoff.
//! - **Exclusivity**: a slot serves at most one call at a time; distinct
//!   slots serve callers in parallel.
//!
//! Callers classify their own errors through [`RetryClassify`].

pub mod backoff;
pub mod classify;
pub mod config;
pub mod error;
pub mod key;
pub mod metrics;
pub mod pool;
pub mod slot;

pub use classify::{parse_retry_after, FailureKind, RetryClassify};
pub use config::{keys_from_env, PoolConfig};
pub use error::{AcquireError, PoolError, PoolResult};
pub use key::ApiKey;
pub use pool::{CredentialPool, SlotLease};
pub use slot::{SlotSnapshot, SlotState};
