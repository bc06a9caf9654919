//! On-disk artifact store shared by all pipeline stages.
//!
//! Every stage reads and writes through [`ArtifactStore`], addressed only by
//! `(PeriodKey, ArtifactKind)`. The directory for a period is the pipeline's
//! whole memory between runs:
//!
//! ```text
//! <root>/
//! └── 2025-P39/
//!     ├── Week-39-2025-pack.md     (generate)
//!     ├── Week-39-2025-pack.pdf    (generate)
//!     ├── seo_post.md              (generate)
//!     ├── meta.json                (generate)
//!     ├── drive_links.json         (upload, optional)
//!     └── notion_urls.json         (publish, optional)
//! ```
//!
//! Writes go to a hidden temp file and are renamed into place, so a reader
//! never observes a partial file.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use weeklypack_shared::{MetadataRecord, PeriodKey, Result, StorageLinksRecord, WeeklyPackError};

// ---------------------------------------------------------------------------
// ArtifactKind
// ---------------------------------------------------------------------------

/// The files a bundle consists of. Each kind is written by exactly one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Prompt-pack markdown.
    PrimaryDocument,
    /// PDF rendering of the prompt pack.
    RenderedDocument,
    /// Short-form article markdown.
    Article,
    /// [`MetadataRecord`].
    Metadata,
    /// [`StorageLinksRecord`].
    StorageLinks,
    /// `PublishLinksRecord`.
    PublishLinks,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 6] = [
        Self::PrimaryDocument,
        Self::RenderedDocument,
        Self::Article,
        Self::Metadata,
        Self::StorageLinks,
        Self::PublishLinks,
    ];

    /// File name inside the period directory.
    pub fn file_name(&self, key: &PeriodKey) -> String {
        match self {
            Self::PrimaryDocument => format!("Week-{:02}-{}-pack.md", key.period, key.year),
            Self::RenderedDocument => format!("Week-{:02}-{}-pack.pdf", key.period, key.year),
            Self::Article => "seo_post.md".into(),
            Self::Metadata => "meta.json".into(),
            Self::StorageLinks => "drive_links.json".into(),
            Self::PublishLinks => "notion_urls.json".into(),
        }
    }

    /// MIME type used when the artifact leaves the machine.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::PrimaryDocument | Self::Article => "text/markdown",
            Self::RenderedDocument => "application/pdf",
            Self::Metadata | Self::StorageLinks | Self::PublishLinks => "application/json",
        }
    }

    /// Name of the stage that owns this file.
    pub fn producer(&self) -> &'static str {
        match self {
            Self::PrimaryDocument | Self::RenderedDocument | Self::Article | Self::Metadata => {
                "generate"
            }
            Self::StorageLinks => "upload",
            Self::PublishLinks => "publish",
        }
    }
}

/// Checksum and size of a written artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReceipt {
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: usize,
}

// ---------------------------------------------------------------------------
// ArtifactStore
// ---------------------------------------------------------------------------

/// Filesystem-backed store rooted at the configured output directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

/// Period key for the calendar date a run starts on.
pub fn resolve_current(today: NaiveDate) -> PeriodKey {
    PeriodKey::from_date(today)
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one period's bundle.
    pub fn period_dir(&self, key: &PeriodKey) -> PathBuf {
        self.root.join(key.token())
    }

    /// Full path of one artifact.
    pub fn path_of(&self, key: &PeriodKey, kind: ArtifactKind) -> PathBuf {
        self.period_dir(key).join(kind.file_name(key))
    }

    pub fn exists(&self, key: &PeriodKey, kind: ArtifactKind) -> bool {
        self.path_of(key, kind).is_file()
    }

    /// Read an artifact; `Ok(None)` when it has not been written.
    pub fn get(&self, key: &PeriodKey, kind: ArtifactKind) -> Result<Option<Vec<u8>>> {
        let path = self.path_of(key, kind);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(WeeklyPackError::io(path, e)),
        }
    }

    /// Read an artifact an earlier stage must have produced.
    pub fn require(&self, key: &PeriodKey, kind: ArtifactKind) -> Result<Vec<u8>> {
        self.get(key, kind)?
            .ok_or_else(|| WeeklyPackError::state_missing(key.token(), kind.file_name(key)))
    }

    /// Read a required UTF-8 artifact.
    pub fn require_text(&self, key: &PeriodKey, kind: ArtifactKind) -> Result<String> {
        let bytes = self.require(key, kind)?;
        String::from_utf8(bytes).map_err(|e| {
            WeeklyPackError::parse(format!("{} is not UTF-8: {e}", kind.file_name(key)))
        })
    }

    /// Atomically write an artifact (temp file, then rename).
    #[instrument(skip_all, fields(period = %key, kind = ?kind, size = bytes.len()))]
    pub fn put(&self, key: &PeriodKey, kind: ArtifactKind, bytes: &[u8]) -> Result<ArtifactReceipt> {
        let dir = self.period_dir(key);
        std::fs::create_dir_all(&dir).map_err(|e| WeeklyPackError::io(&dir, e))?;

        let filename = kind.file_name(key);
        let target = dir.join(&filename);
        let temp = dir.join(format!(".{filename}.tmp"));

        std::fs::write(&temp, bytes).map_err(|e| WeeklyPackError::io(&temp, e))?;
        std::fs::rename(&temp, &target).map_err(|e| WeeklyPackError::io(&target, e))?;

        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let sha256 = format!("{:x}", hasher.finalize());

        debug!(file = %filename, %sha256, "wrote artifact");

        Ok(ArtifactReceipt {
            path: target,
            sha256,
            size_bytes: bytes.len(),
        })
    }

    /// Serialize a record as pretty JSON and write it.
    pub fn put_json<T: Serialize>(
        &self,
        key: &PeriodKey,
        kind: ArtifactKind,
        record: &T,
    ) -> Result<ArtifactReceipt> {
        let json = serde_json::to_vec_pretty(record).map_err(|e| {
            WeeklyPackError::validation(format!("JSON serialization failed: {e}"))
        })?;
        self.put(key, kind, &json)
    }

    /// Load the metadata record written by the generate stage.
    pub fn read_metadata(&self, key: &PeriodKey) -> Result<MetadataRecord> {
        let bytes = self.require(key, ArtifactKind::Metadata)?;
        parse_record(&bytes, &ArtifactKind::Metadata.file_name(key))
    }

    /// Load the storage links if the upload stage has completed.
    pub fn read_storage_links(&self, key: &PeriodKey) -> Result<Option<StorageLinksRecord>> {
        match self.get(key, ArtifactKind::StorageLinks)? {
            Some(bytes) => {
                parse_record(&bytes, &ArtifactKind::StorageLinks.file_name(key)).map(Some)
            }
            None => {
                warn!(period = %key, "no storage links recorded; link fields will be empty");
                Ok(None)
            }
        }
    }

    /// The most recent period that has a directory in the store.
    ///
    /// Directories whose names are not period tokens are ignored.
    pub fn resolve_latest_existing(&self) -> Result<PeriodKey> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WeeklyPackError::NotFound(format!(
                    "artifact root {} does not exist",
                    self.root.display()
                )));
            }
            Err(e) => return Err(WeeklyPackError::io(&self.root, e)),
        };

        let mut tokens: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| PeriodKey::parse_token(name).is_some())
            .collect();
        tokens.sort();

        tokens
            .last()
            .and_then(|name| PeriodKey::parse_token(name))
            .ok_or_else(|| {
                WeeklyPackError::NotFound(format!(
                    "no period directories under {}",
                    self.root.display()
                ))
            })
    }

    /// Which artifacts exist for a period, in pipeline order.
    pub fn inventory(&self, key: &PeriodKey) -> Vec<(ArtifactKind, bool)> {
        ArtifactKind::ALL
            .iter()
            .map(|kind| (*kind, self.exists(key, *kind)))
            .collect()
    }
}

/// Parse a structured record, accepting JSON first and TOML second.
pub fn parse_record<T: DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| WeeklyPackError::parse(format!("{what} is not UTF-8: {e}")))?;

    let json_err = match serde_json::from_str(text) {
        Ok(record) => return Ok(record),
        Err(e) => e,
    };

    toml::from_str(text).map_err(|toml_err| {
        WeeklyPackError::parse(format!(
            "{what} is neither valid JSON ({json_err}) nor valid TOML ({toml_err})"
        ))
    })
}
