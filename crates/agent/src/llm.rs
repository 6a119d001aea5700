//! Text-completion transport for the LLM-backed understanding collaborator.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use huddle_core::config::{LlmConfig, LlmProvider};

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 1024;

/// One HTTP round trip per completion. No timeout and no retry: a stalled
/// provider blocks the calling agent's turn.
#[derive(Clone)]
pub struct HttpLlmClient {
    client: reqwest::Client,
    provider: LlmProvider,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: ChatMessage,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    format: &'a str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: ChatMessage,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let default_base = match config.provider {
            LlmProvider::Rules => bail!("the `rules` provider does not use an HTTP client"),
            LlmProvider::OpenAi => OPENAI_BASE_URL,
            LlmProvider::Anthropic => ANTHROPIC_BASE_URL,
            LlmProvider::Ollama => {
                config.base_url.as_deref().context("llm.base_url is required for ollama")?
            }
        };
        let base_url = config.base_url.as_deref().unwrap_or(default_base);

        Ok(Self {
            client: reqwest::Client::new(),
            provider: config.provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self) -> String {
        match self.provider {
            LlmProvider::OpenAi | LlmProvider::Rules => {
                format!("{}/v1/chat/completions", self.base_url)
            }
            LlmProvider::Anthropic => format!("{}/v1/messages", self.base_url),
            LlmProvider::Ollama => format!("{}/api/chat", self.base_url),
        }
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .context("llm.api_key is not configured")
    }

    fn user_message(prompt: &str) -> Vec<ChatMessage> {
        vec![ChatMessage { role: "user".to_string(), content: prompt.to_string() }]
    }

    async fn complete_openai(&self, prompt: &str) -> Result<String> {
        let request =
            OpenAiRequest { model: &self.model, messages: Self::user_message(prompt), temperature: 0.0 };
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.api_key()?)
            .json(&request)
            .send()
            .await
            .context("failed to send request to OpenAI")?;
        let response = ensure_success(response, "OpenAI").await?;
        let body: OpenAiResponse =
            response.json().await.context("failed to parse OpenAI response")?;

        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .context("no choices in OpenAI response")
    }

    async fn complete_anthropic(&self, prompt: &str) -> Result<String> {
        let request = AnthropicRequest {
            model: &self.model,
            max_tokens: ANTHROPIC_MAX_TOKENS,
            messages: Self::user_message(prompt),
        };
        let response = self
            .client
            .post(self.endpoint())
            .header("x-api-key", self.api_key()?)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .context("failed to send request to Anthropic")?;
        let response = ensure_success(response, "Anthropic").await?;
        let body: AnthropicResponse =
            response.json().await.context("failed to parse Anthropic response")?;

        body.content
            .into_iter()
            .find(|block| block.kind == "text")
            .map(|block| block.text)
            .context("no text block in Anthropic response")
    }

    async fn complete_ollama(&self, prompt: &str) -> Result<String> {
        let request = OllamaRequest {
            model: &self.model,
            messages: Self::user_message(prompt),
            stream: false,
            format: "json",
        };
        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .context("failed to send request to Ollama")?;
        let response = ensure_success(response, "Ollama").await?;
        let body: OllamaResponse =
            response.json().await.context("failed to parse Ollama response")?;

        Ok(body.message.content)
    }
}

async fn ensure_success(response: reqwest::Response, provider: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    bail!("{provider} request failed with status {status}: {body}")
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        match self.provider {
            LlmProvider::Rules => bail!("the `rules` provider does not use an HTTP client"),
            LlmProvider::OpenAi => self.complete_openai(prompt).await,
            LlmProvider::Anthropic => self.complete_anthropic(prompt).await,
            LlmProvider::Ollama => self.complete_ollama(prompt).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use huddle_core::config::{AppConfig, LlmProvider};

    use super::HttpLlmClient;

    #[test]
    fn endpoints_follow_provider_and_strip_trailing_slash() {
        let mut config = AppConfig::default().llm;

        config.provider = LlmProvider::Ollama;
        config.base_url = Some("http://localhost:11434/".to_string());
        let ollama = HttpLlmClient::from_config(&config).expect("ollama client");
        assert_eq!(ollama.endpoint(), "http://localhost:11434/api/chat");

        config.provider = LlmProvider::OpenAi;
        config.base_url = None;
        let openai = HttpLlmClient::from_config(&config).expect("openai client");
        assert_eq!(openai.endpoint(), "https://api.openai.com/v1/chat/completions");

        config.provider = LlmProvider::Anthropic;
        let anthropic = HttpLlmClient::from_config(&config).expect("anthropic client");
        assert_eq!(anthropic.endpoint(), "https://api.anthropic.com/v1/messages");
    }

    #[test]
    fn rules_provider_has_no_http_client() {
        let config = AppConfig::default().llm;
        assert!(HttpLlmClient::from_config(&config).is_err());
    }
}
