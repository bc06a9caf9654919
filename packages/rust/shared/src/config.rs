//! Application configuration for WeeklyPack.
//!
//! User config lives at `~/.weeklypack/weeklypack.toml` (or a path given on
//! the command line). The file never holds secrets: each section names the
//! environment variable that does. [`PipelineConfig::resolve`] reads those
//! variables exactly once, at process entry, and the resulting struct is
//! passed into every stage.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WeeklyPackError};
use crate::retry::RetryPolicy;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "weeklypack.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".weeklypack";

// ---------------------------------------------------------------------------
// Config structs (matching weeklypack.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Local paths.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Remote text generator.
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Remote object storage (Drive).
    #[serde(default)]
    pub storage: StorageConfig,

    /// Knowledge base (Notion).
    #[serde(default)]
    pub knowledge_base: KnowledgeBaseConfig,

    /// Completion webhook.
    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Root of the artifact store; one sub-directory per period.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// YAML topic bank consumed by the generate stage.
    #[serde(default = "default_topic_bank")]
    pub topic_bank: String,

    /// System prompt sent with every generation request.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            topic_bank: default_topic_bank(),
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_output_dir() -> String {
    "output".into()
}
fn default_topic_bank() -> String {
    "data/topic_bank.yaml".into()
}
fn default_system_prompt() -> String {
    "prompts/system_prompt.txt".into()
}

/// `[generator]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Name of the env var holding the API key. Unset means "always use the local fallback".
    #[serde(default = "default_generator_key_env")]
    pub api_key_env: String,

    /// Model identifier sent with each request.
    #[serde(default = "default_model")]
    pub model: String,

    /// OpenAI-compatible API base URL.
    #[serde(default = "default_generator_base")]
    pub api_base: String,

    /// Per-request timeout.
    #[serde(default = "default_generator_timeout")]
    pub timeout_secs: u64,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_generator_key_env(),
            model: default_model(),
            api_base: default_generator_base(),
            timeout_secs: default_generator_timeout(),
            temperature: default_temperature(),
            retry: RetryPolicy::default(),
        }
    }
}

fn default_generator_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_generator_base() -> String {
    "https://api.openai.com/v1".into()
}
fn default_generator_timeout() -> u64 {
    60
}
fn default_temperature() -> f32 {
    0.7
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Env var holding the service-account JSON key.
    #[serde(default = "default_service_account_env")]
    pub service_account_env: String,

    /// Env var holding a pre-issued OAuth access token (alternative to a service account).
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,

    /// Env var holding the id of the folder period folders are created under.
    #[serde(default = "default_parent_folder_env")]
    pub parent_folder_env: String,

    /// `utm_source` appended to document links.
    #[serde(default = "default_utm_source")]
    pub utm_source: String,

    /// `utm_medium` appended to document links.
    #[serde(default = "default_utm_medium")]
    pub utm_medium: String,

    /// Drive metadata API base.
    #[serde(default = "default_drive_api_base")]
    pub api_base: String,

    /// Drive upload API base.
    #[serde(default = "default_drive_upload_base")]
    pub upload_base: String,

    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            service_account_env: default_service_account_env(),
            access_token_env: default_access_token_env(),
            parent_folder_env: default_parent_folder_env(),
            utm_source: default_utm_source(),
            utm_medium: default_utm_medium(),
            api_base: default_drive_api_base(),
            upload_base: default_drive_upload_base(),
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_service_account_env() -> String {
    "GOOGLE_SERVICE_ACCOUNT_JSON".into()
}
fn default_access_token_env() -> String {
    "GOOGLE_ACCESS_TOKEN".into()
}
fn default_parent_folder_env() -> String {
    "DRIVE_PARENT_FOLDER_ID".into()
}
fn default_utm_source() -> String {
    "email".into()
}
fn default_utm_medium() -> String {
    "members".into()
}
fn default_drive_api_base() -> String {
    "https://www.googleapis.com/drive/v3".into()
}
fn default_drive_upload_base() -> String {
    "https://www.googleapis.com/upload/drive/v3".into()
}
fn default_http_timeout() -> u64 {
    30
}

/// `[knowledge_base]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBaseConfig {
    #[serde(default = "default_notion_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_database_env")]
    pub database_id_env: String,

    /// Env var holding the hub page that receives the weekly link block.
    #[serde(default = "default_hub_page_env")]
    pub hub_page_id_env: String,

    /// Env var holding `owner/repo`, used for raw-file links when no storage links exist.
    #[serde(default = "default_repository_env")]
    pub repository_env: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default = "default_notion_api_base")]
    pub api_base: String,

    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_notion_key_env(),
            database_id_env: default_database_env(),
            hub_page_id_env: default_hub_page_env(),
            repository_env: default_repository_env(),
            branch: default_branch(),
            api_base: default_notion_api_base(),
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_notion_key_env() -> String {
    "NOTION_API_KEY".into()
}
fn default_database_env() -> String {
    "NOTION_DATABASE_ID".into()
}
fn default_hub_page_env() -> String {
    "NOTION_MEMBERS_PAGE_ID".into()
}
fn default_repository_env() -> String {
    "GITHUB_REPOSITORY".into()
}
fn default_branch() -> String {
    "main".into()
}
fn default_notion_api_base() -> String {
    "https://api.notion.com/v1".into()
}

/// `[webhook]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_url_env")]
    pub url_env: String,

    /// Env var holding an optional shared secret.
    #[serde(default = "default_webhook_token_env")]
    pub token_env: String,

    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url_env: default_webhook_url_env(),
            token_env: default_webhook_token_env(),
            timeout_secs: default_webhook_timeout(),
            retry: RetryPolicy::default(),
        }
    }
}

fn default_webhook_url_env() -> String {
    "WEBHOOK_URL".into()
}
fn default_webhook_token_env() -> String {
    "WEBHOOK_TOKEN".into()
}
fn default_webhook_timeout() -> u64 {
    20
}

// ---------------------------------------------------------------------------
// Runtime config (config file + environment, resolved once)
// ---------------------------------------------------------------------------

/// A value sourced from a named environment variable.
///
/// `Debug` never prints the value.
#[derive(Clone, Default)]
pub struct EnvValue {
    pub var: String,
    pub value: Option<String>,
}

impl EnvValue {
    fn lookup(var: &str, lookup: &impl Fn(&str) -> Option<String>) -> Self {
        Self {
            var: var.to_string(),
            value: lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
        }
    }

    /// A value not backed by the environment (tests, CLI overrides).
    pub fn fixed(var: impl Into<String>, value: Option<&str>) -> Self {
        Self {
            var: var.into(),
            value: value.map(String::from),
        }
    }

    pub fn get(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// The value, or a configuration error naming the variable.
    pub fn require(&self) -> Result<&str> {
        self.get().ok_or_else(|| {
            WeeklyPackError::config(format!("{} is not set", self.var))
        })
    }
}

impl std::fmt::Debug for EnvValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = if self.is_set() { "set" } else { "unset" };
        write!(f, "{}=<{state}>", self.var)
    }
}

/// Everything the stages need, resolved once at process entry.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub output_root: PathBuf,
    pub topic_bank: PathBuf,
    pub system_prompt: PathBuf,
    pub generator: GeneratorSettings,
    pub storage: StorageSettings,
    pub knowledge_base: KnowledgeBaseSettings,
    pub webhook: WebhookSettings,
}

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub api_key: EnvValue,
    pub model: String,
    pub api_base: String,
    pub timeout: Duration,
    pub temperature: f32,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub service_account_json: EnvValue,
    pub access_token: EnvValue,
    pub parent_folder_id: EnvValue,
    pub utm_source: String,
    pub utm_medium: String,
    pub api_base: String,
    pub upload_base: String,
    pub timeout: Duration,
}

impl StorageSettings {
    /// Whether any credential for remote storage is present.
    pub fn has_credentials(&self) -> bool {
        self.service_account_json.is_set() || self.access_token.is_set()
    }
}

#[derive(Debug, Clone)]
pub struct KnowledgeBaseSettings {
    pub api_key: EnvValue,
    pub database_id: EnvValue,
    pub hub_page_id: EnvValue,
    pub repository: EnvValue,
    pub branch: String,
    pub api_base: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct WebhookSettings {
    pub url: EnvValue,
    pub token: EnvValue,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl PipelineConfig {
    /// Merge the file config with values looked up by variable name.
    ///
    /// The CLI passes `|k| std::env::var(k).ok()`; tests pass a map.
    pub fn resolve(app: &AppConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let g = &app.generator;
        let s = &app.storage;
        let k = &app.knowledge_base;
        let w = &app.webhook;

        Self {
            output_root: expand_home(&app.defaults.output_dir),
            topic_bank: expand_home(&app.defaults.topic_bank),
            system_prompt: expand_home(&app.defaults.system_prompt),
            generator: GeneratorSettings {
                api_key: EnvValue::lookup(&g.api_key_env, &lookup),
                model: g.model.clone(),
                api_base: g.api_base.trim_end_matches('/').to_string(),
                timeout: Duration::from_secs(g.timeout_secs),
                temperature: g.temperature,
                retry: g.retry,
            },
            storage: StorageSettings {
                service_account_json: EnvValue::lookup(&s.service_account_env, &lookup),
                access_token: EnvValue::lookup(&s.access_token_env, &lookup),
                parent_folder_id: EnvValue::lookup(&s.parent_folder_env, &lookup),
                utm_source: s.utm_source.clone(),
                utm_medium: s.utm_medium.clone(),
                api_base: s.api_base.trim_end_matches('/').to_string(),
                upload_base: s.upload_base.trim_end_matches('/').to_string(),
                timeout: Duration::from_secs(s.timeout_secs),
            },
            knowledge_base: KnowledgeBaseSettings {
                api_key: EnvValue::lookup(&k.api_key_env, &lookup),
                database_id: EnvValue::lookup(&k.database_id_env, &lookup),
                hub_page_id: EnvValue::lookup(&k.hub_page_id_env, &lookup),
                repository: EnvValue::lookup(&k.repository_env, &lookup),
                branch: k.branch.clone(),
                api_base: k.api_base.trim_end_matches('/').to_string(),
                timeout: Duration::from_secs(k.timeout_secs),
            },
            webhook: WebhookSettings {
                url: EnvValue::lookup(&w.url_env, &lookup),
                token: EnvValue::lookup(&w.token_env, &lookup),
                timeout: Duration::from_secs(w.timeout_secs),
                retry: w.retry,
            },
        }
    }
}

/// Expand a leading `~/` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.weeklypack/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| WeeklyPackError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.weeklypack/weeklypack.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| WeeklyPackError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        WeeklyPackError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| WeeklyPackError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| WeeklyPackError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| WeeklyPackError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
