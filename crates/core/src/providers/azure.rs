use super::openai::{chat_messages, parse_chat, parse_embeddings, EMBED_BATCH_SIZE};
use super::{base_url, json_body, require, ChatModel};
use crate::config::AzureSettings;
use crate::embeddings::Embedder;
use crate::error::{ConfigError, ProviderError};
use crate::models::ChatMessage;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

const PROVIDER: &str = "azure";

/// Azure OpenAI addresses deployments, not model names.
pub struct AzureClient {
    http: Client,
    endpoint: String,
    api_key: String,
    chat_deployment: String,
    embed_deployment: String,
    api_version: String,
    temperature: f32,
}

impl AzureClient {
    pub fn new(settings: &AzureSettings, temperature: f32) -> Result<Self, ConfigError> {
        let endpoint = require(&settings.endpoint, PROVIDER, "endpoint")?;
        Ok(Self {
            http: Client::new(),
            endpoint: base_url(&endpoint)?,
            api_key: require(&settings.api_key, PROVIDER, "api_key")?,
            chat_deployment: require(&settings.chat_deployment, PROVIDER, "chat_deployment")?,
            embed_deployment: require(&settings.embed_deployment, PROVIDER, "embed_deployment")?,
            api_version: settings.api_version.clone(),
            temperature,
        })
    }

    fn deployment_url(&self, deployment: &str, operation: &str) -> String {
        format!(
            "{}/openai/deployments/{}/{}",
            self.endpoint, deployment, operation
        )
    }
}

#[async_trait]
impl Embedder for AzureClient {
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
                .post(self.deployment_url(&self.embed_deployment, "embeddings"))
                .query(&[("api-version", self.api_version.as_str())])
                .header("api-key", &self.api_key)
                .json(&json!({ "input": batch }))
                .send()
                .await?;

            let body = json_body(PROVIDER, response).await?;
            vectors.extend(parse_embeddings(PROVIDER, &body, batch.len())?);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl ChatModel for AzureClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let response = self
            .http
            .post(self.deployment_url(&self.chat_deployment, "chat/completions"))
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .json(&json!({
                "messages": chat_messages(messages),
                "temperature": self.temperature,
            }))
            .send()
            .await?;

        let body = json_body(PROVIDER, response).await?;
        parse_chat(PROVIDER, &body)
    }
}
