use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use smartdo_core::SYSTEM_PROMPT;
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::error::BackendError;

/// Hard per-request timeout for every backend.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_LOCAL_URL: &str = "http://localhost:1234/v1/chat/completions";
pub const DEFAULT_LOCAL_MODEL: &str = "local-model";
pub const DEFAULT_HOSTED_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_HOSTED_MODEL: &str = "gpt-3.5-turbo";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// OpenAI-compatible server on this machine (LM Studio, llama-server).
    Local,
    /// Hosted OpenAI API; needs a key.
    Hosted,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Local => f.write_str("local LLM"),
            Backend::Hosted => f.write_str("hosted API"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Backend::Local),
            "hosted" | "openai" => Ok(Backend::Hosted),
            other => Err(format!("unknown backend: {other} (expected local or hosted)")),
        }
    }
}

/// Anything that can turn a prompt into model text.
///
/// One call is one attempt: no retries, no caching.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, prompt: &str, backend: Backend) -> Result<String, BackendError>;
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub local_url: String,
    pub local_model: String,
    pub hosted_url: String,
    pub hosted_model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            local_url: DEFAULT_LOCAL_URL.to_string(),
            local_model: DEFAULT_LOCAL_MODEL.to_string(),
            hosted_url: DEFAULT_HOSTED_URL.to_string(),
            hosted_model: DEFAULT_HOSTED_MODEL.to_string(),
            api_key: None,
            temperature: 0.7,
            max_tokens: 500,
        }
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct Resp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MsgOut,
}

#[derive(Deserialize)]
struct MsgOut {
    content: Option<String>,
}

/// OpenAI-style chat-completions client for both backends.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl InferenceClient {
    pub fn new(config: ClientConfig) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn chat(
        &self,
        backend: Backend,
        url: &str,
        model: &str,
        api_key: Option<&str>,
        prompt: &str,
    ) -> Result<String, BackendError> {
        let body = Req {
            model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let mut req = self.http.post(url).json(&body);
        if let Some(key) = api_key {
            req = req.header(AUTHORIZATION, format!("Bearer {key}"));
        }

        debug!(%backend, url, model, prompt_chars = prompt.len(), "sending completion request");

        let resp = req.send().await.map_err(|e| BackendError::Unavailable {
            backend,
            reason: if e.is_timeout() {
                format!("request timed out after {}s", REQUEST_TIMEOUT.as_secs())
            } else {
                e.to_string()
            },
        })?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            let txt: String = txt.chars().take(200).collect();
            return Err(BackendError::Unavailable {
                backend,
                reason: format!("{status} {txt}").trim().to_string(),
            });
        }

        let out: Resp = resp.json().await.map_err(|e| BackendError::MalformedBody {
            backend,
            reason: e.to_string(),
        })?;

        out.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BackendError::MalformedBody {
                backend,
                reason: "missing choices[0].message.content".to_string(),
            })
    }
}

#[async_trait]
impl Completer for InferenceClient {
    async fn complete(&self, prompt: &str, backend: Backend) -> Result<String, BackendError> {
        match backend {
            Backend::Local => {
                self.chat(
                    backend,
                    &self.config.local_url,
                    &self.config.local_model,
                    None,
                    prompt,
                )
                .await
            }
            Backend::Hosted => {
                let key = self
                    .config
                    .api_key
                    .as_deref()
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .ok_or(BackendError::MissingCredential)?;
                self.chat(
                    backend,
                    &self.config.hosted_url,
                    &self.config.hosted_model,
                    Some(key),
                    prompt,
                )
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parses_from_config_strings() {
        assert_eq!("local".parse::<Backend>(), Ok(Backend::Local));
        assert_eq!("Hosted".parse::<Backend>(), Ok(Backend::Hosted));
        assert_eq!("openai".parse::<Backend>(), Ok(Backend::Hosted));
        assert!("cloud".parse::<Backend>().is_err());
    }

    #[tokio::test]
    async fn hosted_without_key_fails_fast() {
        let client = InferenceClient::new(ClientConfig {
            // Unroutable; must never be contacted.
            hosted_url: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            api_key: Some("   ".to_string()),
            ..ClientConfig::default()
        })
        .unwrap();
        let err = client.complete("hi", Backend::Hosted).await.unwrap_err();
        assert_eq!(err, BackendError::MissingCredential);
    }
}
