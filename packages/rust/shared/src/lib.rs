//! Shared types, error model, and configuration for cultureseg.
//!
//! This crate is the foundation depended on by all other cultureseg crates.
//! It provides:
//! - [`SegmenterError`]: the unified error type
//! - Domain types ([`Segment`], [`SegmentId`], [`RunId`], [`Confidence`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, EnrichmentSettings, QualityConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, validate_config,
};
pub use error::{Result, SegmenterError};
pub use types::{Confidence, OVERVIEW_TITLE, RunId, Segment, SegmentId, UNDETERMINED_LANG};
