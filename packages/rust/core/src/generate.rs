//! Generate stage: writes the week's prompt pack, its PDF, the short article
//! and the metadata record.

use chrono::NaiveDate;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use tracing::{info, instrument, warn};

use weeklypack_artifacts::{ArtifactKind, ArtifactReceipt, ArtifactStore};
use weeklypack_markdown::{RenderOptions, render_pdf};
use weeklypack_shared::{AttemptFailure, MetadataRecord, PeriodKey, Result, RetryPolicy};

use crate::completion::Completer;
use crate::fallback::{BUILTIN_QUERY, fallback_article, fallback_pack};
use crate::pipeline::StageReporter;
use crate::topics::TopicConfig;

/// Where a piece of content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    Remote,
    Fallback,
}

impl std::fmt::Display for ContentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Remote => "remote",
            Self::Fallback => "fallback",
        })
    }
}

/// Everything generation reads besides the artifact store.
pub struct GenerateInputs<'a> {
    pub topics: &'a TopicConfig,
    pub system_prompt: &'a str,
    /// `None` skips the remote generator entirely.
    pub completer: Option<&'a dyn Completer>,
    pub retry: RetryPolicy,
}

#[derive(Debug)]
pub struct GenerateOutcome {
    pub key: PeriodKey,
    pub metadata: MetadataRecord,
    pub pack_source: ContentSource,
    pub article_source: ContentSource,
    pub receipts: Vec<ArtifactReceipt>,
}

/// User message for the prompt-pack request.
pub fn pack_request(topics: &TopicConfig, period: u32) -> String {
    let persona = topics
        .primary_persona()
        .map(|p| format!("{} who wants to {}", p.name, p.outcome))
        .unwrap_or_default();

    format!(
        "Niche: {niche}
Persona: {persona}
Angles: {angles}
Rules: {rules}

Deliver TWO sections:
1) Weekly Prompt Pack (30 prompts grouped by Research, Writing, Personalization, QA; each with example input + swap-in vars)
2) Notion Mini-Template (properties, 5–7 blocks, 5-step SOP)
Also add 3 micro cases + Changelog Week {period}.",
        niche = topics.niche,
        angles = topics.content_angles.join(", "),
        rules = topics.weekly_variation_rules.join(", "),
    )
}

/// User message for the article request.
pub fn article_request(niche: &str, query: &str) -> String {
    format!(
        "Create a 500-700 word actionable article for {niche} answering this long-tail query: {query}"
    )
}

/// Produce and persist the bundle for `key`.
///
/// Remote failures never abort the stage: each request falls back to the
/// local generator once the retry policy is exhausted.
#[instrument(skip_all, fields(period = %key))]
pub async fn generate_bundle(
    store: &ArtifactStore,
    key: &PeriodKey,
    today: NaiveDate,
    inputs: &GenerateInputs<'_>,
    progress: &dyn StageReporter,
) -> Result<GenerateOutcome> {
    let topics = inputs.topics;
    let mut rng = StdRng::seed_from_u64(key.seed());
    let query = topics
        .long_tail_queries
        .choose(&mut rng)
        .map(String::as_str)
        .unwrap_or(BUILTIN_QUERY)
        .to_string();

    progress.phase("Generating prompt pack");
    let (pack, pack_source) = match remote_text(inputs, &pack_request(topics, key.period)).await {
        Some(text) => (text, ContentSource::Remote),
        None => (
            fallback_pack(&topics.niche, key.period, &topics.long_tail_queries, &mut rng),
            ContentSource::Fallback,
        ),
    };

    progress.phase("Generating article");
    let (article, article_source) =
        match remote_text(inputs, &article_request(&topics.niche, &query)).await {
            Some(text) => (text, ContentSource::Remote),
            None => (fallback_article(&topics.niche, &query), ContentSource::Fallback),
        };

    progress.phase("Rendering PDF");
    let pdf = render_pdf(
        &pack,
        &RenderOptions {
            title: format!("Week {} Pack", key.period),
            ..Default::default()
        },
    );

    progress.phase("Writing artifacts");
    let metadata = MetadataRecord {
        title: format!("{} — Week {} ({})", topics.niche, key.period, key.year),
        generated_at: today,
        primary_filename: ArtifactKind::PrimaryDocument.file_name(key),
        rendered_filename: ArtifactKind::RenderedDocument.file_name(key),
    };

    // Metadata goes last: its presence marks a complete bundle.
    let receipts = vec![
        store.put(key, ArtifactKind::PrimaryDocument, pack.as_bytes())?,
        store.put(key, ArtifactKind::RenderedDocument, &pdf)?,
        store.put(key, ArtifactKind::Article, article.as_bytes())?,
        store.put_json(key, ArtifactKind::Metadata, &metadata)?,
    ];

    info!(
        dir = %store.period_dir(key).display(),
        pack = %pack_source,
        article = %article_source,
        "bundle generated"
    );

    Ok(GenerateOutcome {
        key: *key,
        metadata,
        pack_source,
        article_source,
        receipts,
    })
}

/// Ask the remote generator under the retry policy; `None` means "use the fallback".
async fn remote_text(inputs: &GenerateInputs<'_>, user: &str) -> Option<String> {
    let Some(completer) = inputs.completer else {
        warn!("no generator configured; using local fallback");
        return None;
    };

    match inputs
        .retry
        .run(|_| completer.complete(inputs.system_prompt, user), |_| true)
        .await
    {
        Ok(text) => Some(text),
        Err(exhausted) => {
            let reason = match exhausted.last {
                AttemptFailure::Failed(e) => e.to_string(),
                AttemptFailure::Rejected(_) => "rejected".to_string(),
            };
            warn!(attempts = exhausted.attempts, %reason, "remote generation failed; using local fallback");
            None
        }
    }
}
