//! Text-completion service abstraction.
//!
//! The [`CompletionService`] trait decouples the stages from the hosted model
//! deployment. Tests use scripted services that return predetermined replies
//! without touching the network.

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::io::config::CompletionConfig;

/// One chat-style completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Sampling parameters per call site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub max_tokens: u32,
    pub temperature: f32,
}

pub const RESOLVER_SAMPLING: Sampling = Sampling {
    max_tokens: 300,
    temperature: 0.2,
};

pub const GENERATOR_SAMPLING: Sampling = Sampling {
    max_tokens: 1200,
    temperature: 0.5,
};

pub const DESCRIPTION_SAMPLING: Sampling = Sampling {
    max_tokens: 800,
    temperature: 0.7,
};

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>, sampling: Sampling) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            max_tokens: sampling.max_tokens,
            temperature: sampling.temperature,
        }
    }
}

/// Abstraction over completion backends.
pub trait CompletionService: Send + Sync {
    /// Return the text of the first choice.
    fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Azure OpenAI chat-completions deployment.
pub struct AzureOpenAiClient {
    http: reqwest::blocking::Client,
    url: String,
    api_key: String,
    api_version: String,
}

impl std::fmt::Debug for AzureOpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureOpenAiClient")
            .field("url", &self.url)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatPayload<'a> {
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl AzureOpenAiClient {
    /// Build a client; fails when endpoint or key are not configured.
    pub fn from_config(cfg: &CompletionConfig) -> Result<Self> {
        let endpoint = cfg
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| anyhow!("completion endpoint is not configured"))?;
        let api_key = cfg
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow!("completion api key is not configured"))?;
        let http = reqwest::blocking::Client::builder()
            .timeout(cfg.timeout())
            .build()
            .context("build completion http client")?;
        Ok(Self {
            http,
            url: deployment_url(endpoint, &cfg.deployment),
            api_key: api_key.to_string(),
            api_version: cfg.api_version.clone(),
        })
    }
}

fn deployment_url(endpoint: &str, deployment: &str) -> String {
    format!(
        "{}/openai/deployments/{}/chat/completions",
        endpoint.trim_end_matches('/'),
        deployment
    )
}

impl CompletionService for AzureOpenAiClient {
    #[instrument(skip_all, fields(max_tokens = request.max_tokens))]
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let payload = ChatPayload {
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: 1.0,
        };

        debug!("sending completion request");
        let resp = self
            .http
            .post(&self.url)
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .json(&payload)
            .send()
            .context("send completion request")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            warn!(%status, "completion service returned an error");
            bail!("completion service error {status}: {}", body.trim());
        }

        let body: ChatResponse = resp.json().context("decode completion response")?;
        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        debug!(chars = text.len(), "completion received");
        Ok(text)
    }
}
