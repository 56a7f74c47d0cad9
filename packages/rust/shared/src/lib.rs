//! Shared types, error model, and configuration for rosterboard.
//!
//! This crate is the foundation depended on by all other rosterboard crates.
//! It provides:
//! - [`RosterboardError`] — the unified error type
//! - Domain types ([`GuildRecord`], [`WorldSummary`], [`Snapshot`], [`ChangeSet`])
//! - Configuration ([`AppConfig`], [`EmbedLimits`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, EmbedLimits, LimitsConfig, RosterConfig, SnapshotConfig, WebhookConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from,
    resolve_webhook_url,
};
pub use error::{Result, RosterboardError};
pub use types::{
    AllianceGroup, CURRENT_SCHEMA_VERSION, ChangeSet, GuildRecord, MessageRef, RunId, Snapshot,
    WorldId, WorldNames, WorldSummary, roster_digest,
};
