//! Hosted language-model clients and the question-answering prompt.
//!
//! [`LlmSettings`] is built once at startup from `[llm]` plus the provider
//! credential and shared as `Arc<LlmSettings>`; nothing mutates it
//! afterwards. [`create_llm_client`] turns it into an [`LlmClient`].

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::config::LlmConfig;
use crate::embedding::{gemini_model_path, send_json};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";

pub type SharedLlmClient = Arc<dyn LlmClient>;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one non-streaming completion for `prompt`.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Gemini,
    OpenAi,
}

/// Immutable model configuration shared by every query.
#[derive(Clone)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub model: String,
    pub api_key: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub timeout: Duration,
    pub base_url: String,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("timeout", &self.timeout)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl LlmSettings {
    /// Build settings from config, reading the credential from the
    /// environment (`GOOGLE_API_KEY` or `OPENAI_API_KEY`).
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let (provider, key_var) = match config.provider.as_str() {
            "gemini" => (LlmProvider::Gemini, "GOOGLE_API_KEY"),
            "openai" => (LlmProvider::OpenAi, "OPENAI_API_KEY"),
            other => bail!("Unknown llm provider: {}", other),
        };
        let api_key = std::env::var(key_var)
            .with_context(|| format!("Set {} to use the {} model", key_var, config.provider))?;
        Ok(Self::with_api_key(config, provider, api_key))
    }

    pub fn with_api_key(
        config: &LlmConfig,
        provider: LlmProvider,
        api_key: impl Into<String>,
    ) -> Self {
        let default_base = match provider {
            LlmProvider::Gemini => GEMINI_BASE_URL,
            LlmProvider::OpenAi => OPENAI_BASE_URL,
        };
        let model = match provider {
            LlmProvider::Gemini => gemini_model_path(&config.model),
            LlmProvider::OpenAi => config.model.clone(),
        };
        Self {
            provider,
            model,
            api_key: api_key.into(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
            base_url: config
                .url
                .as_deref()
                .unwrap_or(default_base)
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

/// The fixed question-answering template.
///
/// `{context_str}` and `{query_str}` are the only placeholders.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

pub const QA_TEMPLATE: &str = "Instruction: Answer the question based on the provided context.\n\
Context: {context_str}\n\
Question: {query_str}\n\
Answer: ";

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: QA_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Substitute in one pass so text inside `context` that happens to look
    /// like `{query_str}` is left alone.
    pub fn format(&self, context: &str, query: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + context.len() + query.len());
        let mut rest = self.template.as_str();
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            if let Some(after) = tail.strip_prefix("{context_str}") {
                out.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix("{query_str}") {
                out.push_str(query);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

// ============ Gemini ============

pub struct GeminiLlmClient {
    client: reqwest::Client,
    settings: Arc<LlmSettings>,
}

impl GeminiLlmClient {
    pub fn new(settings: Arc<LlmSettings>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self { client, settings })
    }
}

#[async_trait]
impl LlmClient for GeminiLlmClient {
    #[instrument(level = "debug", skip_all, fields(model = %self.settings.model))]
    async fn complete(&self, prompt: &str) -> Result<String> {
        let s = &self.settings;
        let request = self
            .client
            .post(format!("{}/v1beta/{}:generateContent", s.base_url, s.model))
            .header("x-goog-api-key", &s.api_key)
            .json(&serde_json::json!({
                "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
                "generationConfig": {
                    "temperature": s.temperature,
                    "maxOutputTokens": s.max_output_tokens,
                },
            }));

        let json = send_json(request, "Gemini").await?;
        parse_gemini_completion(&json)
    }
}

fn parse_gemini_completion(json: &serde_json::Value) -> Result<String> {
    let candidate = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| {
            let reason = json
                .pointer("/promptFeedback/blockReason")
                .and_then(|r| r.as_str())
                .unwrap_or("no candidates returned");
            anyhow!("Gemini returned no answer: {}", reason)
        })?;

    let parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow!("Invalid Gemini response: missing content parts"))?;

    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join(""))
}

// ============ OpenAI ============

pub struct OpenAiLlmClient {
    client: reqwest::Client,
    settings: Arc<LlmSettings>,
}

impl OpenAiLlmClient {
    pub fn new(settings: Arc<LlmSettings>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self { client, settings })
    }
}

#[async_trait]
impl LlmClient for OpenAiLlmClient {
    #[instrument(level = "debug", skip_all, fields(model = %self.settings.model))]
    async fn complete(&self, prompt: &str) -> Result<String> {
        let s = &self.settings;
        let request = self
            .client
            .post(format!("{}/v1/chat/completions", s.base_url))
            .header("Authorization", format!("Bearer {}", s.api_key))
            .json(&serde_json::json!({
                "model": s.model,
                "messages": [{ "role": "user", "content": prompt }],
                "temperature": s.temperature,
                "max_tokens": s.max_output_tokens,
            }));

        let json = send_json(request, "OpenAI").await?;
        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("LLM response did not contain any choices"))
    }
}

pub fn create_llm_client(settings: Arc<LlmSettings>) -> Result<SharedLlmClient> {
    Ok(match settings.provider {
        LlmProvider::Gemini => Arc::new(GeminiLlmClient::new(settings)?),
        LlmProvider::OpenAi => Arc::new(OpenAiLlmClient::new(settings)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn settings_for(server: &MockServer, provider: LlmProvider, model: &str) -> Arc<LlmSettings> {
        let config = LlmConfig {
            model: model.to_string(),
            url: Some(server.base_url()),
            ..LlmConfig::default()
        };
        Arc::new(LlmSettings::with_api_key(&config, provider, "test-key"))
    }

    #[test]
    fn test_default_template_layout() {
        let prompt = PromptTemplate::default().format("ctx A\n\nctx B", "What?");
        assert_eq!(
            prompt,
            "Instruction: Answer the question based on the provided context.\n\
             Context: ctx A\n\nctx B\n\
             Question: What?\n\
             Answer: "
        );
    }

    #[test]
    fn test_template_does_not_reexpand_inserted_text() {
        let prompt = PromptTemplate::default().format("literal {query_str} here", "Q");
        assert!(prompt.contains("literal {query_str} here"));
        assert!(prompt.contains("Question: Q\n"));
    }

    #[test]
    fn test_settings_defaults() {
        let settings = LlmSettings::with_api_key(
            &LlmConfig::default(),
            LlmProvider::Gemini,
            "k",
        );
        assert_eq!(settings.model, "models/gemini-1.5-flash");
        assert_eq!(settings.temperature, 0.5);
        assert_eq!(settings.max_output_tokens, 256);
        assert!(!format!("{:?}", settings).contains("\"k\""));
    }

    #[tokio::test]
    async fn test_gemini_completion() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/gemini-1.5-flash:generateContent")
                    .header("x-goog-api-key", "test-key")
                    .json_body_partial(
                        r#"{"generationConfig": {"temperature": 0.5, "maxOutputTokens": 256}}"#,
                    );
                then.status(200).json_body(json!({
                    "candidates": [{
                        "content": { "parts": [{ "text": "The answer " }, { "text": "is 42." }] }
                    }]
                }));
            })
            .await;

        let client = GeminiLlmClient::new(settings_for(
            &server,
            LlmProvider::Gemini,
            "gemini-1.5-flash",
        ))
        .unwrap();
        let answer = client.complete("question").await.unwrap();

        mock.assert_async().await;
        assert_eq!(answer, "The answer is 42.");
    }

    #[tokio::test]
    async fn test_gemini_blocked_prompt() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200)
                    .json_body(json!({ "promptFeedback": { "blockReason": "SAFETY" } }));
            })
            .await;

        let client = GeminiLlmClient::new(settings_for(
            &server,
            LlmProvider::Gemini,
            "gemini-1.5-flash",
        ))
        .unwrap();
        let err = client.complete("question").await.unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[tokio::test]
    async fn test_openai_completion() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("Authorization", "Bearer test-key");
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "role": "assistant", "content": "Paris" } }]
                }));
            })
            .await;

        let client =
            OpenAiLlmClient::new(settings_for(&server, LlmProvider::OpenAi, "gpt-4o-mini"))
                .unwrap();
        assert_eq!(client.complete("capital?").await.unwrap(), "Paris");
    }
}
