//! Hosted language-model and embedding providers.
//!
//! The provider is chosen once, from configuration, when the service starts:
//! [`ProviderClient::from_settings`] parses the selector into a
//! [`ProviderKind`], checks that the credentials for that provider are
//! present, and returns a client implementing both [`Embedder`] and
//! [`ChatModel`]. Nothing downstream matches on provider names again.

pub mod azure;
pub mod gemini;
pub mod openai;

pub use azure::AzureClient;
pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

use crate::config::Settings;
use crate::embeddings::Embedder;
use crate::error::{ConfigError, ProviderError};
use crate::models::ChatMessage;
use async_trait::async_trait;
use reqwest::Response;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[async_trait]
pub trait ChatModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError>;
}

#[async_trait]
impl<T> ChatModel for Arc<T>
where
    T: ChatModel + Send + Sync + ?Sized,
{
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        (**self).complete(messages).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Azure,
    Gemini,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Azure => "azure",
            ProviderKind::Gemini => "gemini",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "azure" => Ok(ProviderKind::Azure),
            "gemini" => Ok(ProviderKind::Gemini),
            other => Err(ConfigError::UnsupportedProvider(other.to_string())),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub enum ProviderClient {
    OpenAi(OpenAiClient),
    Azure(AzureClient),
    Gemini(GeminiClient),
}

impl ProviderClient {
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let kind = settings.provider.parse::<ProviderKind>()?;
        let client = match kind {
            ProviderKind::OpenAi => {
                ProviderClient::OpenAi(OpenAiClient::new(&settings.openai, settings.temperature)?)
            }
            ProviderKind::Azure => {
                ProviderClient::Azure(AzureClient::new(&settings.azure, settings.temperature)?)
            }
            ProviderKind::Gemini => {
                ProviderClient::Gemini(GeminiClient::new(&settings.gemini, settings.temperature)?)
            }
        };
        Ok(client)
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderClient::OpenAi(_) => ProviderKind::OpenAi,
            ProviderClient::Azure(_) => ProviderKind::Azure,
            ProviderClient::Gemini(_) => ProviderKind::Gemini,
        }
    }
}

#[async_trait]
impl Embedder for ProviderClient {
    fn dimensions(&self) -> Option<usize> {
        match self {
            ProviderClient::OpenAi(client) => client.dimensions(),
            ProviderClient::Azure(client) => client.dimensions(),
            ProviderClient::Gemini(client) => client.dimensions(),
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        match self {
            ProviderClient::OpenAi(client) => client.embed(text).await,
            ProviderClient::Azure(client) => client.embed(text).await,
            ProviderClient::Gemini(client) => client.embed(text).await,
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        match self {
            ProviderClient::OpenAi(client) => client.embed_batch(texts).await,
            ProviderClient::Azure(client) => client.embed_batch(texts).await,
            ProviderClient::Gemini(client) => client.embed_batch(texts).await,
        }
    }
}

#[async_trait]
impl ChatModel for ProviderClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        match self {
            ProviderClient::OpenAi(client) => client.complete(messages).await,
            ProviderClient::Azure(client) => client.complete(messages).await,
            ProviderClient::Gemini(client) => client.complete(messages).await,
        }
    }
}

pub(crate) fn require(
    value: &Option<String>,
    provider: &'static str,
    setting: &'static str,
) -> Result<String, ConfigError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or(ConfigError::MissingSetting { provider, setting })
}

pub(crate) fn base_url(raw: &str) -> Result<String, ConfigError> {
    let parsed = url::Url::parse(raw.trim())
        .map_err(|error| ConfigError::Invalid(format!("bad url {raw:?}: {error}")))?;
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

pub(crate) async fn json_body(
    provider: &'static str,
    response: Response,
) -> Result<Value, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let details = response.text().await.unwrap_or_default();
        return Err(ProviderError::Response {
            provider,
            details: format!("{status}: {details}"),
        });
    }
    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_selector_is_case_insensitive() -> Result<(), ConfigError> {
        assert_eq!("OpenAI".parse::<ProviderKind>()?, ProviderKind::OpenAi);
        assert_eq!(" azure ".parse::<ProviderKind>()?, ProviderKind::Azure);
        assert_eq!("gemini".parse::<ProviderKind>()?, ProviderKind::Gemini);
        Ok(())
    }

    #[test]
    fn unknown_provider_fails_at_construction() {
        let settings = Settings {
            provider: "anthropic".to_string(),
            ..Settings::default()
        };
        assert!(matches!(
            ProviderClient::from_settings(&settings),
            Err(ConfigError::UnsupportedProvider(name)) if name == "anthropic"
        ));
    }

    #[test]
    fn missing_credentials_fail_at_construction() {
        let settings = Settings {
            provider: "openai".to_string(),
            ..Settings::default()
        };
        assert!(matches!(
            ProviderClient::from_settings(&settings),
            Err(ConfigError::MissingSetting { setting: "api_key", .. })
        ));

        let mut settings = Settings {
            provider: "azure".to_string(),
            ..Settings::default()
        };
        settings.azure.api_key = Some("key".to_string());
        settings.azure.endpoint = Some("https://example.openai.azure.com".to_string());
        assert!(matches!(
            ProviderClient::from_settings(&settings),
            Err(ConfigError::MissingSetting { provider: "azure", .. })
        ));
    }

    #[test]
    fn configured_gemini_builds() -> Result<(), ConfigError> {
        let mut settings = Settings::default();
        settings.gemini.api_key = Some("key".to_string());
        let client = ProviderClient::from_settings(&settings)?;
        assert_eq!(client.kind(), ProviderKind::Gemini);
        Ok(())
    }

    #[test]
    fn base_url_drops_trailing_slash() -> Result<(), ConfigError> {
        assert_eq!(base_url("https://api.openai.com/")?, "https://api.openai.com");
        assert!(base_url("not a url").is_err());
        Ok(())
    }
}
