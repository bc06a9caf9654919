//! Stage entry points: each one resolves its period, builds its collaborators
//! from [`PipelineConfig`], and runs against the artifact store.
//!
//! Generate keys off today's date; the other stages pick the latest period
//! directory that exists, so each can be re-run on its own.

use std::path::Path;

use chrono::NaiveDate;
use tracing::{info, instrument, warn};

use weeklypack_artifacts::{ArtifactStore, resolve_current};
use weeklypack_knowledge::NotionClient;
use weeklypack_shared::{
    PeriodKey, PipelineConfig, PublishLinksRecord, Result, StorageLinksRecord, WeeklyPackError,
};
use weeklypack_storage::DriveClient;

use crate::completion::{Completer, OpenAiCompleter};
use crate::generate::{GenerateInputs, GenerateOutcome, generate_bundle};
use crate::notify::{HttpWebhookSender, NotifyOutcome, notify, webhook_destination};
use crate::publish::{PublishTarget, publish_to_knowledge_base};
use crate::topics::TopicConfig;
use crate::upload::{UploadTarget, publish_to_storage};

/// The four stages, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Generate,
    Upload,
    Publish,
    Notify,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Self::Generate, Self::Upload, Self::Publish, Self::Notify];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Upload => "upload",
            Self::Publish => "publish",
            Self::Notify => "notify",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Progress callback for reporting stage status.
pub trait StageReporter: Send + Sync {
    /// Called when a stage starts working on a period.
    fn stage_started(&self, stage: Stage, key: &PeriodKey);
    /// Called when entering a new step inside a stage.
    fn phase(&self, name: &str);
    /// Called when a stage completes.
    fn stage_finished(&self, stage: Stage, summary: &str);
    /// Called when a stage has nothing to do.
    fn stage_skipped(&self, stage: Stage, reason: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl StageReporter for SilentProgress {
    fn stage_started(&self, _stage: Stage, _key: &PeriodKey) {}
    fn phase(&self, _name: &str) {}
    fn stage_finished(&self, _stage: Stage, _summary: &str) {}
    fn stage_skipped(&self, _stage: Stage, _reason: &str) {}
}

/// Result of [`run_all`].
#[derive(Debug)]
pub struct RunSummary {
    pub key: PeriodKey,
    pub generated: GenerateOutcome,
    pub storage_links: Option<StorageLinksRecord>,
    pub published: Option<PublishLinksRecord>,
    pub notified: NotifyOutcome,
}

fn load_system_prompt(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            WeeklyPackError::config(format!("system prompt not found at {}", path.display()))
        } else {
            WeeklyPackError::io(path, e)
        }
    })
}

// ---------------------------------------------------------------------------
// Generate
// ---------------------------------------------------------------------------

/// Generate the bundle for the ISO week containing `today`.
pub async fn run_generate(
    config: &PipelineConfig,
    today: NaiveDate,
    progress: &dyn StageReporter,
) -> Result<GenerateOutcome> {
    let store = ArtifactStore::new(&config.output_root);
    generate_stage(config, &store, &resolve_current(today), today, progress).await
}

#[instrument(skip_all, fields(period = %key))]
async fn generate_stage(
    config: &PipelineConfig,
    store: &ArtifactStore,
    key: &PeriodKey,
    today: NaiveDate,
    progress: &dyn StageReporter,
) -> Result<GenerateOutcome> {
    progress.stage_started(Stage::Generate, key);

    let topics = TopicConfig::load(&config.topic_bank)?;
    let completer = OpenAiCompleter::from_settings(&config.generator)?;
    let system_prompt = match completer {
        Some(_) => load_system_prompt(&config.system_prompt)?,
        None => String::new(),
    };

    let inputs = GenerateInputs {
        topics: &topics,
        system_prompt: &system_prompt,
        completer: completer.as_ref().map(|c| c as &dyn Completer),
        retry: config.generator.retry,
    };
    let outcome = generate_bundle(store, key, today, &inputs, progress).await?;

    progress.stage_finished(
        Stage::Generate,
        &format!(
            "{} (pack: {}, article: {})",
            store.period_dir(key).display(),
            outcome.pack_source,
            outcome.article_source
        ),
    );
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

/// Whether any storage setting is present at all.
pub fn upload_configured(config: &PipelineConfig) -> bool {
    config.storage.has_credentials() || config.storage.parent_folder_id.is_set()
}

/// Upload the latest period's documents.
pub async fn run_upload(
    config: &PipelineConfig,
    progress: &dyn StageReporter,
) -> Result<StorageLinksRecord> {
    let store = ArtifactStore::new(&config.output_root);
    let (parent, drive) = upload_collaborators(config)?;
    let key = store.resolve_latest_existing()?;
    upload_stage(config, &store, &key, parent, &drive, progress).await
}

fn upload_collaborators(config: &PipelineConfig) -> Result<(&str, DriveClient)> {
    let drive = DriveClient::new(&config.storage)?;
    let parent = config.storage.parent_folder_id.require()?;
    Ok((parent, drive))
}

#[instrument(skip_all, fields(period = %key))]
async fn upload_stage(
    config: &PipelineConfig,
    store: &ArtifactStore,
    key: &PeriodKey,
    parent_folder_id: &str,
    drive: &DriveClient,
    progress: &dyn StageReporter,
) -> Result<StorageLinksRecord> {
    progress.stage_started(Stage::Upload, key);
    let target = UploadTarget {
        parent_folder_id,
        utm_source: &config.storage.utm_source,
        utm_medium: &config.storage.utm_medium,
    };
    let links = publish_to_storage(store, key, &target, drive, progress).await?;
    progress.stage_finished(
        Stage::Upload,
        links.folder_url.as_deref().unwrap_or(&links.primary_url),
    );
    Ok(links)
}

// ---------------------------------------------------------------------------
// Publish
// ---------------------------------------------------------------------------

/// Whether any knowledge-base setting is present at all.
pub fn publish_configured(config: &PipelineConfig) -> bool {
    let kb = &config.knowledge_base;
    kb.api_key.is_set() || kb.database_id.is_set() || kb.hub_page_id.is_set()
}

/// Publish the latest period to the knowledge base.
pub async fn run_publish(
    config: &PipelineConfig,
    progress: &dyn StageReporter,
) -> Result<PublishLinksRecord> {
    let store = ArtifactStore::new(&config.output_root);
    let client = NotionClient::new(&config.knowledge_base)?;
    let target = publish_target(config)?;
    let key = store.resolve_latest_existing()?;
    publish_stage(&store, &key, &target, &client, progress).await
}

fn publish_target(config: &PipelineConfig) -> Result<PublishTarget<'_>> {
    let kb = &config.knowledge_base;
    Ok(PublishTarget {
        database_id: kb.database_id.require()?,
        hub_page_id: kb.hub_page_id.require()?,
        repository: kb.repository.get(),
        branch: &kb.branch,
    })
}

#[instrument(skip_all, fields(period = %key))]
async fn publish_stage(
    store: &ArtifactStore,
    key: &PeriodKey,
    target: &PublishTarget<'_>,
    client: &NotionClient,
    progress: &dyn StageReporter,
) -> Result<PublishLinksRecord> {
    progress.stage_started(Stage::Publish, key);
    let record = publish_to_knowledge_base(store, key, target, client, progress).await?;
    progress.stage_finished(Stage::Publish, &record.article_url);
    Ok(record)
}

// ---------------------------------------------------------------------------
// Notify
// ---------------------------------------------------------------------------

/// Notify the webhook about the latest period. A missing or invalid URL skips the stage.
pub async fn run_notify(
    config: &PipelineConfig,
    progress: &dyn StageReporter,
) -> Result<NotifyOutcome> {
    let store = ArtifactStore::new(&config.output_root);
    let Some(url) = destination(config, progress) else {
        return Ok(NotifyOutcome::Skipped);
    };
    let key = store.resolve_latest_existing()?;
    notify_stage(config, &store, &key, &url, progress).await
}

fn destination(config: &PipelineConfig, progress: &dyn StageReporter) -> Option<url::Url> {
    let raw = config.webhook.url.get();
    let url = webhook_destination(raw);
    if url.is_none() {
        let reason = match raw {
            Some(_) => {
                warn!(var = %config.webhook.url.var, "webhook URL is not an absolute http(s) URL");
                format!("{} is not a valid http(s) URL", config.webhook.url.var)
            }
            None => format!("{} is not set", config.webhook.url.var),
        };
        progress.stage_skipped(Stage::Notify, &reason);
    }
    url
}

#[instrument(skip_all, fields(period = %key))]
async fn notify_stage(
    config: &PipelineConfig,
    store: &ArtifactStore,
    key: &PeriodKey,
    url: &url::Url,
    progress: &dyn StageReporter,
) -> Result<NotifyOutcome> {
    progress.stage_started(Stage::Notify, key);
    progress.phase("Posting webhook");
    let sender = HttpWebhookSender::new(config.webhook.timeout)?;
    let outcome = notify(
        store,
        key,
        Some(url),
        config.webhook.token.get(),
        &config.webhook.retry,
        &sender,
    )
    .await?;

    if let NotifyOutcome::Delivered { status, attempts } = &outcome {
        progress.stage_finished(
            Stage::Notify,
            &format!("HTTP {status} after {attempts} attempt(s)"),
        );
    }
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Full run
// ---------------------------------------------------------------------------

/// Generate, then upload, publish and notify the same period.
///
/// Upload and publish are skipped when none of their settings are present;
/// a partially configured stage fails the run before anything is generated.
/// The first fatal error stops the run.
#[instrument(skip_all)]
pub async fn run_all(
    config: &PipelineConfig,
    today: NaiveDate,
    progress: &dyn StageReporter,
) -> Result<RunSummary> {
    let store = ArtifactStore::new(&config.output_root);
    let key = resolve_current(today);

    // Fail on partial configuration before generation makes any remote call.
    let storage = if upload_configured(config) {
        Some(upload_collaborators(config)?)
    } else {
        None
    };
    let knowledge = if publish_configured(config) {
        Some((NotionClient::new(&config.knowledge_base)?, publish_target(config)?))
    } else {
        None
    };

    let generated = generate_stage(config, &store, &key, today, progress).await?;

    let storage_links = match storage {
        Some((parent, drive)) => {
            Some(upload_stage(config, &store, &key, parent, &drive, progress).await?)
        }
        None => {
            progress.stage_skipped(Stage::Upload, "storage is not configured");
            None
        }
    };

    let published = match knowledge {
        Some((client, target)) => {
            Some(publish_stage(&store, &key, &target, &client, progress).await?)
        }
        None => {
            progress.stage_skipped(Stage::Publish, "knowledge base is not configured");
            None
        }
    };

    let notified = match destination(config, progress) {
        Some(url) => notify_stage(config, &store, &key, &url, progress).await?,
        None => NotifyOutcome::Skipped,
    };

    info!(period = %key, "run complete");
    Ok(RunSummary {
        key,
        generated,
        storage_links,
        published,
        notified,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use weeklypack_artifacts::ArtifactKind;
    use weeklypack_shared::{AppConfig, ErrorCategory};

    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl StageReporter for Recorder {
        fn stage_started(&self, stage: Stage, key: &PeriodKey) {
            self.events.lock().unwrap().push(format!("start {stage} {key}"));
        }
        fn phase(&self, _name: &str) {}
        fn stage_finished(&self, stage: Stage, _summary: &str) {
            self.events.lock().unwrap().push(format!("done {stage}"));
        }
        fn stage_skipped(&self, stage: Stage, _reason: &str) {
            self.events.lock().unwrap().push(format!("skip {stage}"));
        }
    }

    const BANK: &str = "niche: Example Niche
personas:
  - name: Solo maker
    outcome: sell more
long_tail_queries:
  - example query
";

    fn config(dir: &Path, env: &[(&str, &str)]) -> PipelineConfig {
        std::fs::write(dir.join("topic_bank.yaml"), BANK).unwrap();
        let map: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let mut cfg = PipelineConfig::resolve(&AppConfig::default(), |k| map.get(k).cloned());
        cfg.output_root = dir.join("output");
        cfg.topic_bank = dir.join("topic_bank.yaml");
        cfg.system_prompt = dir.join("missing_prompt.txt");
        cfg
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 12).unwrap()
    }

    #[tokio::test]
    async fn unconfigured_run_generates_and_skips_the_rest() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path(), &[]);
        let recorder = Recorder::default();

        let summary = run_all(&cfg, today(), &recorder).await.unwrap();
        assert_eq!(summary.key.token(), "2025-P07");
        assert!(summary.storage_links.is_none());
        assert!(summary.published.is_none());
        assert_eq!(summary.notified, NotifyOutcome::Skipped);

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(
            events,
            [
                "start generate 2025-P07",
                "done generate",
                "skip upload",
                "skip publish",
                "skip notify"
            ]
        );

        let store = ArtifactStore::new(&cfg.output_root);
        assert!(store.exists(&summary.key, ArtifactKind::Metadata));
    }

    #[tokio::test]
    async fn partial_storage_config_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path(), &[("DRIVE_PARENT_FOLDER_ID", "parent-9")]);

        let err = run_all(&cfg, today(), &SilentProgress).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(err.to_string().contains("GOOGLE_SERVICE_ACCOUNT_JSON"));
        assert!(!cfg.output_root.exists());
    }

    #[tokio::test]
    async fn partial_publish_config_stops_run_before_generation() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path(), &[("NOTION_API_KEY", "secret")]);
        let recorder = Recorder::default();

        let err = run_all(&cfg, today(), &recorder).await.unwrap_err();
        assert!(err.to_string().contains("NOTION_DATABASE_ID"));
        assert!(recorder.events.lock().unwrap().is_empty());
        assert!(!cfg.output_root.exists());
    }

    #[tokio::test]
    async fn generator_key_without_prompt_file_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path(), &[("OPENAI_API_KEY", "sk-test")]);

        let err = run_generate(&cfg, today(), &SilentProgress).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(err.to_string().contains("system prompt"));
    }

    #[tokio::test]
    async fn later_stages_need_an_existing_period() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(
            tmp.path(),
            &[
                ("NOTION_API_KEY", "secret"),
                ("NOTION_DATABASE_ID", "db"),
                ("NOTION_MEMBERS_PAGE_ID", "hub"),
            ],
        );

        let err = run_publish(&cfg, &SilentProgress).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::StateAbsent);
    }

    #[tokio::test]
    async fn publish_config_is_checked_before_state() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path(), &[("NOTION_API_KEY", "secret")]);

        let err = run_publish(&cfg, &SilentProgress).await.unwrap_err();
        assert!(err.to_string().contains("NOTION_DATABASE_ID"));
    }

    #[tokio::test]
    async fn invalid_webhook_url_skips_notify() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path(), &[("WEBHOOK_URL", "not a url")]);
        let recorder = Recorder::default();

        let outcome = run_notify(&cfg, &recorder).await.unwrap();
        assert_eq!(outcome, NotifyOutcome::Skipped);
        assert_eq!(*recorder.events.lock().unwrap(), ["skip notify"]);
    }

    #[test]
    fn stage_names_in_order() {
        let names: Vec<&str> = Stage::ALL.iter().map(Stage::name).collect();
        assert_eq!(names, ["generate", "upload", "publish", "notify"]);
    }
}
