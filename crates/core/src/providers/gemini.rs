use super::{base_url, json_body, require, ChatModel};
use crate::config::GeminiSettings;
use crate::embeddings::Embedder;
use crate::error::{ConfigError, ProviderError};
use crate::models::{ChatMessage, ChatRole};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

const PROVIDER: &str = "gemini";

pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    embed_model: String,
    temperature: f32,
}

/// Gemini addresses models as resources: `models/<name>`.
pub fn normalize_model(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.starts_with("models/") {
        trimmed.to_string()
    } else {
        format!("models/{trimmed}")
    }
}

impl GeminiClient {
    pub fn new(settings: &GeminiSettings, temperature: f32) -> Result<Self, ConfigError> {
        Ok(Self {
            http: Client::new(),
            base_url: base_url(&settings.base_url)?,
            api_key: require(&settings.api_key, PROVIDER, "api_key")?,
            chat_model: normalize_model(&settings.chat_model),
            embed_model: normalize_model(&settings.embed_model),
            temperature,
        })
    }
}

#[async_trait]
impl Embedder for GeminiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let response = self
            .http
            .post(format!("{}/v1beta/{}:embedContent", self.base_url, self.embed_model))
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({
                "model": self.embed_model,
                "content": { "parts": [{ "text": text }] },
            }))
            .send()
            .await?;

        let body = json_body(PROVIDER, response).await?;
        body.pointer("/embedding/values")
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_f64)
                    .map(|value| value as f32)
                    .collect()
            })
            .ok_or(ProviderError::EmptyResponse {
                provider: PROVIDER,
                what: "embedding",
            })
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let response = self
            .http
            .post(format!("{}/v1beta/{}:generateContent", self.base_url, self.chat_model))
            .query(&[("key", self.api_key.as_str())])
            .json(&generate_request(messages, self.temperature))
            .send()
            .await?;

        let body = json_body(PROVIDER, response).await?;
        parse_generated_text(&body)
    }
}

/// System messages become `systemInstruction`; assistant turns use the
/// `model` role.
fn generate_request(messages: &[ChatMessage], temperature: f32) -> Value {
    let system = messages
        .iter()
        .filter(|message| message.role == ChatRole::System)
        .map(|message| message.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let contents = messages
        .iter()
        .filter(|message| message.role != ChatRole::System)
        .map(|message| {
            let role = match message.role {
                ChatRole::Assistant => "model",
                _ => "user",
            };
            json!({ "role": role, "parts": [{ "text": message.content }] })
        })
        .collect::<Vec<_>>();

    let mut request = json!({
        "contents": contents,
        "generationConfig": { "temperature": temperature },
    });
    if !system.is_empty() {
        request["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }
    request
}

fn parse_generated_text(body: &Value) -> Result<String, ProviderError> {
    let text = body
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.pointer("/text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default();

    if text.is_empty() {
        return Err(ProviderError::EmptyResponse {
            provider: PROVIDER,
            what: "completion",
        });
    }
    Ok(text)
}
