//! Remote text generation against an OpenAI-compatible chat endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use weeklypack_shared::{GeneratorSettings, Result, WeeklyPackError};

/// A remote text generator.
#[async_trait]
pub trait Completer: Send + Sync {
    /// Complete one system + user exchange. Empty output is a failure.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

/// `POST {api_base}/chat/completions` client.
pub struct OpenAiCompleter {
    http: Client,
    api_key: String,
    endpoint: String,
    model: String,
    temperature: f32,
}

impl OpenAiCompleter {
    /// `None` when no API key is configured; generation then uses the local fallback only.
    pub fn from_settings(settings: &GeneratorSettings) -> Result<Option<Self>> {
        let Some(api_key) = settings.api_key.get() else {
            return Ok(None);
        };
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| WeeklyPackError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Some(Self {
            http,
            api_key: api_key.to_string(),
            endpoint: format!("{}/chat/completions", settings.api_base),
            model: settings.model.clone(),
            temperature: settings.temperature,
        }))
    }
}

#[async_trait]
impl Completer for OpenAiCompleter {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| WeeklyPackError::Generation(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WeeklyPackError::Generation(format!("HTTP {status}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| WeeklyPackError::Generation(format!("unreadable response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| WeeklyPackError::Generation("empty completion".into()))?;

        debug!(chars = content.len(), "completion received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use weeklypack_shared::{AppConfig, EnvValue, PipelineConfig};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn completer(server: &MockServer) -> OpenAiCompleter {
        let mut settings = PipelineConfig::resolve(&AppConfig::default(), |_| None).generator;
        settings.api_key = EnvValue::fixed("OPENAI_API_KEY", Some("sk-test"));
        settings.api_base = server.uri();
        OpenAiCompleter::from_settings(&settings).unwrap().unwrap()
    }

    #[test]
    fn no_key_means_no_completer() {
        let settings = PipelineConfig::resolve(&AppConfig::default(), |_| None).generator;
        assert!(OpenAiCompleter::from_settings(&settings).unwrap().is_none());
    }

    #[tokio::test]
    async fn returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "messages": [{ "role": "system", "content": "sys" }, { "role": "user", "content": "hi" }],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "index": 0, "message": { "role": "assistant", "content": "# Pack" } }]
            })))
            .mount(&server)
            .await;

        assert_eq!(completer(&server).complete("sys", "hi").await.unwrap(), "# Pack");
    }

    #[tokio::test]
    async fn empty_content_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "  " } }]
            })))
            .mount(&server)
            .await;

        let err = completer(&server).complete("s", "u").await.unwrap_err();
        assert!(matches!(err, WeeklyPackError::Generation(_)));
    }

    #[tokio::test]
    async fn server_error_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = completer(&server).complete("s", "u").await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }
}
