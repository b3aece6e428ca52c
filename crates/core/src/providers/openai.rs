use super::{base_url, json_body, require, ChatModel};
use crate::config::OpenAiSettings;
use crate::embeddings::Embedder;
use crate::error::{ConfigError, ProviderError};
use crate::models::ChatMessage;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

const PROVIDER: &str = "openai";
pub(crate) const EMBED_BATCH_SIZE: usize = 64;

pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    embed_model: String,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(settings: &OpenAiSettings, temperature: f32) -> Result<Self, ConfigError> {
        Ok(Self {
            http: Client::new(),
            base_url: base_url(&settings.base_url)?,
            api_key: require(&settings.api_key, PROVIDER, "api_key")?,
            chat_model: settings.chat_model.clone(),
            embed_model: settings.embed_model.clone(),
            temperature,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or(ProviderError::EmptyResponse {
                provider: PROVIDER,
                what: "embedding",
            })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            let response = self
                .http
                .post(format!("{}/v1/embeddings", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&json!({
                    "model": self.embed_model,
                    "input": batch,
                }))
                .send()
                .await?;

            let body = json_body(PROVIDER, response).await?;
            vectors.extend(parse_embeddings(PROVIDER, &body, batch.len())?);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.chat_model,
                "messages": chat_messages(messages),
                "temperature": self.temperature,
            }))
            .send()
            .await?;

        let body = json_body(PROVIDER, response).await?;
        parse_chat(PROVIDER, &body)
    }
}

pub(crate) fn chat_messages(messages: &[ChatMessage]) -> Value {
    Value::Array(
        messages
            .iter()
            .map(|message| json!({"role": message.role.as_str(), "content": message.content}))
            .collect(),
    )
}

/// Reads `data[*].embedding` ordered by `data[*].index`.
pub(crate) fn parse_embeddings(
    provider: &'static str,
    body: &Value,
    expected: usize,
) -> Result<Vec<Vec<f32>>, ProviderError> {
    let data = body
        .pointer("/data")
        .and_then(Value::as_array)
        .ok_or(ProviderError::EmptyResponse {
            provider,
            what: "embedding data",
        })?;

    let mut indexed = data
        .iter()
        .enumerate()
        .map(|(position, item)| -> Result<(u64, Vec<f32>), ProviderError> {
            let index = item
                .pointer("/index")
                .and_then(Value::as_u64)
                .unwrap_or(position as u64);
            let vector = item
                .pointer("/embedding")
                .and_then(Value::as_array)
                .map(|values| {
                    values
                        .iter()
                        .filter_map(Value::as_f64)
                        .map(|value| value as f32)
                        .collect::<Vec<_>>()
                })
                .ok_or_else(|| ProviderError::Response {
                    provider,
                    details: format!("embedding {index} is missing"),
                })?;
            Ok((index, vector))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if indexed.len() != expected {
        return Err(ProviderError::Response {
            provider,
            details: format!("expected {expected} embeddings, got {}", indexed.len()),
        });
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, vector)| vector).collect())
}

pub(crate) fn parse_chat(provider: &'static str, body: &Value) -> Result<String, ProviderError> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(ProviderError::EmptyResponse {
            provider,
            what: "completion",
        })
}
