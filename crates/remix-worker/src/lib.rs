//! Drop-synced remix worker.
//!
//! This crate provides:
//! - Run configuration and the run error taxonomy
//! - Collaborator traits and their service-backed implementations
//! - The sequential remix pipeline with cancellation between stages
//! - A batch executor for concurrent runs

pub mod adapters;
pub mod batch;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod ports;

pub use adapters::FfmpegEngine;
pub use batch::BatchExecutor;
pub use config::{RunConfig, WorkerConfig};
pub use error::{RunError, RunResult};
pub use logging::RunLogger;
pub use pipeline::{ClipInput, ClipSource, RemixPipeline, RunReport, RunRequest};
pub use ports::{
    AudioDropDetector, DropDetection, MediaEngine, MusicComposer, ObjectStore, RecordStore,
    Services, VideoAnalyzer,
};
