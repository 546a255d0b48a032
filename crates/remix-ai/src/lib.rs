//! AI collaborators for the remix pipeline.
//!
//! This crate provides:
//! - A Gemini client (Files API upload, polling, `generateContent`)
//! - The structural video analyzer and the audio drop detector built on it
//! - A MiniMax music composer
//!
//! Every request runs inside a [`remix_pool::CredentialPool`] call, so keys
//! rotate on rate limits and transient failures are retried with backoff.

pub mod analyzer;
pub mod detector;
pub mod error;
pub mod gemini;
pub mod json;
pub mod minimax;

pub use analyzer::StructureAnalyzer;
pub use detector::DropDetector;
pub use error::{AiError, AiResult};
pub use gemini::{GeminiClient, GeminiConfig};
pub use minimax::{MinimaxClient, MinimaxConfig};
