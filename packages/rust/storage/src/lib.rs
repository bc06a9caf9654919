//! Remote object storage for finished bundles.
//!
//! [`ObjectStorage`] is the seam the upload stage talks to. [`DriveClient`]
//! implements it against the Google Drive v3 REST API: period folders are
//! found or created by exact name under a parent folder, files are uploaded
//! with a multipart request, and each file is shared as "anyone with the
//! link can read".

mod auth;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument};

use weeklypack_shared::{Result, StorageSettings, WeeklyPackError};

pub use auth::{Credentials, DRIVE_SCOPE, ServiceAccountKey};
use auth::TokenSource;

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Public download link for a file id.
pub fn public_file_url(file_id: &str) -> String {
    format!("https://drive.google.com/uc?id={file_id}")
}

/// Browser link for a folder id.
pub fn public_folder_url(folder_id: &str) -> String {
    format!("https://drive.google.com/drive/folders/{folder_id}")
}

// ---------------------------------------------------------------------------
// Collaborator trait
// ---------------------------------------------------------------------------

/// Operations the upload stage needs from a remote object store.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Id of the folder named `name` directly under `parent_id`, creating it if absent.
    async fn find_or_create_folder(&self, name: &str, parent_id: &str) -> Result<String>;

    /// Create a new file under `parent_id`; returns its id. Never overwrites.
    async fn upload(
        &self,
        parent_id: &str,
        filename: &str,
        bytes: Vec<u8>,
        mime: &str,
    ) -> Result<String>;

    /// Make a file readable by anyone holding its link.
    async fn grant_public_read(&self, file_id: &str) -> Result<()>;

    /// Link for an uploaded file. Pure function of the id.
    fn public_url(&self, file_id: &str) -> String {
        public_file_url(file_id)
    }

    /// Link for a folder. Pure function of the id.
    fn folder_url(&self, folder_id: &str) -> String {
        public_folder_url(folder_id)
    }
}

// ---------------------------------------------------------------------------
// Drive implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FileRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileRef>,
}

/// Google Drive v3 client.
pub struct DriveClient {
    http: Client,
    tokens: TokenSource,
    api_base: String,
    upload_base: String,
}

impl DriveClient {
    /// Build a client from resolved settings. Fails if no credential is configured.
    pub fn new(settings: &StorageSettings) -> Result<Self> {
        let credentials = Credentials::from_settings(settings)?;
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| WeeklyPackError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            tokens: TokenSource::new(credentials, http.clone()),
            http,
            api_base: settings.api_base.clone(),
            upload_base: settings.upload_base.clone(),
        })
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.tokens.bearer().await?;
        Ok(request.bearer_auth(token))
    }

    async fn find_folder(&self, name: &str, parent_id: &str) -> Result<Option<String>> {
        let query = format!(
            "name = '{}' and '{}' in parents and mimeType = '{FOLDER_MIME}' and trashed = false",
            escape_query(name),
            escape_query(parent_id),
        );
        let request = self.http.get(format!("{}/files", self.api_base)).query(&[
            ("q", query.as_str()),
            ("fields", "files(id, name)"),
            ("spaces", "drive"),
            ("supportsAllDrives", "true"),
            ("includeItemsFromAllDrives", "true"),
        ]);

        let list: FileList = parse_json(send(self.authorized(request).await?, "list folders").await?)
            .await?;
        Ok(list.files.into_iter().next().map(|f| f.id))
    }
}

#[async_trait]
impl ObjectStorage for DriveClient {
    #[instrument(skip(self))]
    async fn find_or_create_folder(&self, name: &str, parent_id: &str) -> Result<String> {
        if let Some(id) = self.find_folder(name, parent_id).await? {
            debug!(%id, "reusing existing folder");
            return Ok(id);
        }

        let request = self
            .http
            .post(format!("{}/files", self.api_base))
            .query(&[("fields", "id"), ("supportsAllDrives", "true")])
            .json(&json!({
                "name": name,
                "mimeType": FOLDER_MIME,
                "parents": [parent_id],
            }));

        let created: FileRef =
            parse_json(send(self.authorized(request).await?, "create folder").await?).await?;
        info!(id = %created.id, "created folder");
        Ok(created.id)
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(
        &self,
        parent_id: &str,
        filename: &str,
        bytes: Vec<u8>,
        mime: &str,
    ) -> Result<String> {
        let metadata = json!({ "name": filename, "parents": [parent_id] });
        let boundary = format!("weeklypack-{}", uuid::Uuid::now_v7().simple());
        let body = multipart_related(&boundary, &metadata, &bytes, mime);

        let request = self
            .http
            .post(format!("{}/files", self.upload_base))
            .query(&[
                ("uploadType", "multipart"),
                ("fields", "id"),
                ("supportsAllDrives", "true"),
            ])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body);

        let created: FileRef =
            parse_json(send(self.authorized(request).await?, "upload").await?).await?;
        info!(id = %created.id, "uploaded file");
        Ok(created.id)
    }

    #[instrument(skip(self))]
    async fn grant_public_read(&self, file_id: &str) -> Result<()> {
        let request = self
            .http
            .post(format!("{}/files/{file_id}/permissions", self.api_base))
            .query(&[("supportsAllDrives", "true")])
            .json(&json!({ "role": "reader", "type": "anyone" }));

        send(self.authorized(request).await?, "grant permission").await?;
        Ok(())
    }
}

/// Escape a value for a single-quoted Drive query literal.
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Assemble a `multipart/related` body: JSON metadata part, then media part.
fn multipart_related(boundary: &str, metadata: &serde_json::Value, media: &[u8], mime: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(media.len() + 512);
    body.extend(format!("--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n").as_bytes());
    body.extend(metadata.to_string().as_bytes());
    body.extend(format!("\r\n--{boundary}\r\nContent-Type: {mime}\r\n\r\n").as_bytes());
    body.extend(media);
    body.extend(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

async fn send(request: RequestBuilder, what: &str) -> Result<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| WeeklyPackError::Network(format!("{what}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(WeeklyPackError::Storage(format!("{what}: HTTP {status}: {body}")));
    }
    Ok(response)
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    response
        .json()
        .await
        .map_err(|e| WeeklyPackError::parse(format!("unexpected Drive response: {e}")))
}
