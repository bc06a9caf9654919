//! Upload stage: copies the generated documents into remote storage and
//! records their public links.

use tracing::{info, instrument};
use url::Url;

use weeklypack_artifacts::{ArtifactKind, ArtifactStore};
use weeklypack_shared::{PeriodKey, Result, StorageLinksRecord, WeeklyPackError};
use weeklypack_storage::ObjectStorage;

use crate::pipeline::StageReporter;

/// Where and how to upload.
#[derive(Debug, Clone)]
pub struct UploadTarget<'a> {
    pub parent_folder_id: &'a str,
    pub utm_source: &'a str,
    pub utm_medium: &'a str,
}

/// `utm_campaign` value for a period, e.g. `week7-2025`.
pub fn campaign(key: &PeriodKey) -> String {
    format!("week{}-{}", key.period, key.year)
}

/// Append tracking parameters to a link, keeping any query it already has.
pub fn with_tracking(link: &str, source: &str, medium: &str, campaign: &str) -> Result<String> {
    let mut url = Url::parse(link)
        .map_err(|e| WeeklyPackError::validation(format!("bad link {link}: {e}")))?;
    url.query_pairs_mut()
        .append_pair("utm_source", source)
        .append_pair("utm_medium", medium)
        .append_pair("utm_campaign", campaign);
    Ok(url.into())
}

/// Upload the primary and rendered documents for `key` and persist their links.
///
/// Local files are checked before any remote call. The links record is
/// written only after every remote step succeeded.
#[instrument(skip_all, fields(period = %key))]
pub async fn publish_to_storage(
    store: &ArtifactStore,
    key: &PeriodKey,
    target: &UploadTarget<'_>,
    storage: &dyn ObjectStorage,
    progress: &dyn StageReporter,
) -> Result<StorageLinksRecord> {
    let meta = store.read_metadata(key)?;
    let primary = store.require(key, ArtifactKind::PrimaryDocument)?;
    let rendered = store.require(key, ArtifactKind::RenderedDocument)?;

    progress.phase("Resolving period folder");
    let folder_id = storage
        .find_or_create_folder(&key.token(), target.parent_folder_id)
        .await?;

    progress.phase("Uploading rendered document");
    let rendered_id = storage
        .upload(
            &folder_id,
            &meta.rendered_filename,
            rendered,
            ArtifactKind::RenderedDocument.mime_type(),
        )
        .await?;
    storage.grant_public_read(&rendered_id).await?;

    progress.phase("Uploading primary document");
    let primary_id = storage
        .upload(
            &folder_id,
            &meta.primary_filename,
            primary,
            ArtifactKind::PrimaryDocument.mime_type(),
        )
        .await?;
    storage.grant_public_read(&primary_id).await?;

    let campaign = campaign(key);
    let links = StorageLinksRecord {
        primary_url: with_tracking(
            &storage.public_url(&primary_id),
            target.utm_source,
            target.utm_medium,
            &campaign,
        )?,
        rendered_url: with_tracking(
            &storage.public_url(&rendered_id),
            target.utm_source,
            target.utm_medium,
            &campaign,
        )?,
        folder_url: Some(storage.folder_url(&folder_id)),
    };

    store.put_json(key, ArtifactKind::StorageLinks, &links)?;
    info!(%folder_id, "documents uploaded");
    Ok(links)
}
