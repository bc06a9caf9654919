//! Knowledge-base collaborator.
//!
//! The publish stage only sees the [`KnowledgeBase`] trait. [`NotionClient`]
//! implements it against the Notion REST API. The database schema is fetched
//! on every run and turned into a typed [`KnowledgeBaseSchema`] so the caller
//! can decide which properties it is allowed to write.

mod blocks;
mod schema;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use weeklypack_shared::{KnowledgeBaseSettings, Result, WeeklyPackError};

pub use blocks::{Block, MAX_CHILDREN, MAX_TEXT_CHARS, Properties, PropertyValue, paragraphs};
pub use schema::{
    CONVENTIONAL_TITLE, FieldKind, KnowledgeBaseSchema, TitleField, TitleResolution,
    find_title_field,
};

/// API version header value the request shapes are written against.
pub const NOTION_VERSION: &str = "2022-06-28";

/// A created record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RecordRef {
    pub id: String,
    #[serde(default)]
    pub url: String,
}

/// Operations the publish stage needs from a knowledge base.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn get_schema(&self, database_id: &str) -> Result<KnowledgeBaseSchema>;

    /// Create a record in `database_id` with the given properties and body blocks.
    async fn create_record(
        &self,
        database_id: &str,
        properties: &[(String, PropertyValue)],
        children: &[Block],
    ) -> Result<RecordRef>;

    async fn update_record(
        &self,
        record_id: &str,
        properties: &[(String, PropertyValue)],
    ) -> Result<()>;

    /// Append blocks to the end of a page.
    async fn append_blocks(&self, page_id: &str, blocks: &[Block]) -> Result<()>;
}

/// Notion REST client.
pub struct NotionClient {
    http: Client,
    api_key: String,
    api_base: String,
}

impl NotionClient {
    /// Build a client from resolved settings. Fails if the API key is not set.
    pub fn new(settings: &KnowledgeBaseSettings) -> Result<Self> {
        let api_key = settings.api_key.require()?.to_string();
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| WeeklyPackError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key,
            api_base: settings.api_base.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.api_base))
            .bearer_auth(&self.api_key)
            .header("Notion-Version", NOTION_VERSION)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| WeeklyPackError::Network(format!("{what}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WeeklyPackError::KnowledgeBase(format!(
                "{what}: HTTP {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| WeeklyPackError::parse(format!("{what}: unexpected response: {e}")))
    }
}

#[async_trait]
impl KnowledgeBase for NotionClient {
    #[instrument(skip(self))]
    async fn get_schema(&self, database_id: &str) -> Result<KnowledgeBaseSchema> {
        let body = self
            .send(
                self.request(reqwest::Method::GET, &format!("/databases/{database_id}")),
                "fetch database",
            )
            .await?;

        let schema = KnowledgeBaseSchema::from_properties(&body["properties"])?;
        debug!(fields = schema.fields().len(), "fetched schema");
        Ok(schema)
    }

    #[instrument(skip_all, fields(%database_id, children = children.len()))]
    async fn create_record(
        &self,
        database_id: &str,
        properties: &[(String, PropertyValue)],
        children: &[Block],
    ) -> Result<RecordRef> {
        let payload = json!({
            "parent": { "database_id": database_id },
            "properties": blocks::properties_json(properties),
            "children": blocks::blocks_json(children),
        });

        let body = self
            .send(
                self.request(reqwest::Method::POST, "/pages").json(&payload),
                "create record",
            )
            .await?;

        let record: RecordRef = serde_json::from_value(body)
            .map_err(|e| WeeklyPackError::parse(format!("create record: {e}")))?;
        info!(id = %record.id, "created record");
        Ok(record)
    }

    #[instrument(skip(self, properties), fields(count = properties.len()))]
    async fn update_record(
        &self,
        record_id: &str,
        properties: &[(String, PropertyValue)],
    ) -> Result<()> {
        let payload = json!({ "properties": blocks::properties_json(properties) });
        self.send(
            self.request(reqwest::Method::PATCH, &format!("/pages/{record_id}"))
                .json(&payload),
            "update record",
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, blocks), fields(count = blocks.len()))]
    async fn append_blocks(&self, page_id: &str, blocks: &[Block]) -> Result<()> {
        let payload = json!({ "children": blocks::blocks_json(blocks) });
        self.send(
            self.request(reqwest::Method::PATCH, &format!("/blocks/{page_id}/children"))
                .json(&payload),
            "append blocks",
        )
        .await?;
        Ok(())
    }
}
