//! Notify stage: tells an external automation endpoint the bundle is ready.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, instrument, warn};
use url::Url;

use weeklypack_artifacts::ArtifactStore;
use weeklypack_shared::{AttemptFailure, PeriodKey, Result, RetryPolicy, WeeklyPackError};

/// Header carrying the shared secret, when one is configured.
pub const TOKEN_HEADER: &str = "X-Webhook-Token";

/// JSON body posted to the webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookPayload {
    pub title: String,
    pub period: u32,
    /// Same as `period`, for receivers written against the ISO-week name.
    pub week: u32,
    /// Directory token, e.g. `2025-P39`.
    pub period_token: String,
    pub year: i32,
    pub primary_url: String,
    pub rendered_url: String,
    /// Same as `rendered_url`, under the name existing receivers filter on.
    pub pdf_url: String,
    /// Same as `primary_url`.
    pub md_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
}

impl WebhookPayload {
    /// Build from the artifact store: metadata is required, links are optional.
    pub fn from_store(store: &ArtifactStore, key: &PeriodKey, token: Option<&str>) -> Result<Self> {
        let meta = store.read_metadata(key)?;
        let links = store.read_storage_links(key)?.unwrap_or_default();

        Ok(Self {
            title: meta.title,
            period: key.period,
            week: key.period,
            period_token: key.token(),
            year: key.year,
            pdf_url: links.rendered_url.clone(),
            md_url: links.primary_url.clone(),
            primary_url: links.primary_url,
            rendered_url: links.rendered_url,
            token: token.map(String::from),
            auth: token.map(String::from),
        })
    }
}

/// Sends one webhook request and reports the HTTP status.
#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn post(&self, url: &Url, payload: &WebhookPayload, token: Option<&str>) -> Result<u16>;
}

/// reqwest-backed sender.
pub struct HttpWebhookSender {
    http: Client,
}

impl HttpWebhookSender {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WeeklyPackError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn post(&self, url: &Url, payload: &WebhookPayload, token: Option<&str>) -> Result<u16> {
        let mut request = self.http.post(url.clone()).json(payload);
        if let Some(token) = token {
            request = request.header(TOKEN_HEADER, token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| WeeklyPackError::Network(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}

/// Parse the configured destination. Anything other than an absolute
/// http(s) URL with a host disables notification.
pub fn webhook_destination(raw: Option<&str>) -> Option<Url> {
    let url = Url::parse(raw?.trim()).ok()?;
    let web = matches!(url.scheme(), "http" | "https");
    let has_host = url.host_str().is_some_and(|h| !h.is_empty());
    (web && has_host).then_some(url)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Skipped,
    Delivered { status: u16, attempts: u32 },
}

/// Post the bundle notification, retrying until a 2xx or the policy runs out.
#[instrument(skip_all, fields(period = %key))]
pub async fn notify(
    store: &ArtifactStore,
    key: &PeriodKey,
    destination: Option<&Url>,
    token: Option<&str>,
    retry: &RetryPolicy,
    sender: &dyn WebhookSender,
) -> Result<NotifyOutcome> {
    let Some(url) = destination else {
        info!("no valid webhook URL configured; skipping");
        return Ok(NotifyOutcome::Skipped);
    };

    let payload = WebhookPayload::from_store(store, key, token)?;
    let attempts = AtomicU32::new(0);

    let result = retry
        .run(
            |attempt| {
                attempts.store(attempt, Ordering::SeqCst);
                sender.post(url, &payload, token)
            },
            |status| (200..300).contains(status),
        )
        .await;

    match result {
        Ok(status) => {
            let attempts = attempts.load(Ordering::SeqCst);
            info!(status, attempts, "webhook delivered");
            Ok(NotifyOutcome::Delivered { status, attempts })
        }
        Err(exhausted) => {
            let message = match exhausted.last {
                AttemptFailure::Rejected(status) => format!("HTTP {status}"),
                AttemptFailure::Failed(e) => e.to_string(),
            };
            warn!(attempts = exhausted.attempts, %message, "webhook gave up");
            Err(WeeklyPackError::Webhook {
                attempts: exhausted.attempts,
                message,
            })
        }
    }
}
