//! Shared data models for the drop-synced remix engine.
//!
//! This crate provides Serde-serializable types for:
//! - Structural descriptions of videos and generated tracks
//! - Music generation requests and styles
//! - Drop offsets and alignment planning
//! - Remix plans, segments and transitions
//! - Run identifiers

pub mod audio;
pub mod error;
pub mod music;
pub mod offset;
pub mod run;
pub mod structure;
pub mod timeline;

// Re-export common types
pub use audio::AudioStructure;
pub use error::{ModelError, ModelResult};
pub use music::{build_music_request, MusicRequest, MusicStyle, PlannedSection};
pub use offset::{compute_offset, AlignmentPlan, AlignmentStatus, Direction, Offset, SkipReason};
pub use run::RunId;
pub use structure::{RawSection, Section, SectionLabel, VideoStructure};
pub use timeline::{ClipRef, PlanEntry, RemixPlan, Segment, TimeRange, TransitionKind, TransitionSpec};
