//! Shared types, error model, configuration and retry policy for WeeklyPack.
//!
//! This crate is the foundation depended on by all other WeeklyPack crates.
//! It provides:
//! - [`WeeklyPackError`]: the unified error type
//! - Domain types ([`PeriodKey`], [`MetadataRecord`], [`StorageLinksRecord`], [`PublishLinksRecord`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)
//! - [`RetryPolicy`]: bounded exponential backoff for external calls

pub mod config;
pub mod error;
pub mod retry;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, EnvValue, GeneratorConfig, GeneratorSettings, KnowledgeBaseConfig,
    KnowledgeBaseSettings, PipelineConfig, StorageConfig, StorageSettings, WebhookConfig,
    WebhookSettings, config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{ErrorCategory, Result, WeeklyPackError};
pub use retry::{AttemptFailure, RetryExhausted, RetryPolicy};
pub use types::{MetadataRecord, PeriodKey, PublishLinksRecord, StorageLinksRecord};
