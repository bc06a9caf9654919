//! Pipeline stages and orchestration for WeeklyPack.
//!
//! Each stage reads and writes the period directory owned by
//! [`weeklypack_artifacts::ArtifactStore`]; stages never call each other
//! directly. [`pipeline`] wires them to configuration and reports progress.

pub mod completion;
pub mod fallback;
pub mod generate;
pub mod notify;
pub mod pipeline;
pub mod publish;
pub mod topics;
pub mod upload;

pub use generate::{ContentSource, GenerateOutcome};
pub use notify::NotifyOutcome;
pub use pipeline::{
    RunSummary, SilentProgress, Stage, StageReporter, run_all, run_generate, run_notify,
    run_publish, run_upload,
};
pub use topics::TopicConfig;
