use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::providers::{anthropic, google, local, openai};

/// Longest slice of an error body kept in a [`ProviderError::Status`] message.
const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    Local,
    Anthropic,
    Openai,
    Google,
}

impl EndpointKind {
    pub const ALL: [EndpointKind; 4] = [
        EndpointKind::Local,
        EndpointKind::Anthropic,
        EndpointKind::Openai,
        EndpointKind::Google,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Anthropic => "anthropic",
            Self::Openai => "openai",
            Self::Google => "google",
        }
    }

    /// Vendor name used in user-facing error messages.
    pub fn vendor(self) -> &'static str {
        match self {
            Self::Local => "Ollama",
            Self::Anthropic => "Anthropic",
            Self::Openai => "OpenAI",
            Self::Google => "Google",
        }
    }

    /// Environment variable holding the credential, if the kind needs one.
    pub fn credential_env(self) -> Option<&'static str> {
        match self {
            Self::Local => None,
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Openai => Some("OPENAI_API_KEY"),
            Self::Google => Some("GOOGLE_API_KEY"),
        }
    }

    pub fn requires_credential(self) -> bool {
        self.credential_env().is_some()
    }

    pub fn default_endpoint(self) -> &'static str {
        match self {
            Self::Local => "http://localhost:11434",
            Self::Anthropic => "https://api.anthropic.com",
            Self::Openai => "https://api.openai.com",
            Self::Google => "https://generativelanguage.googleapis.com",
        }
    }

    /// Builds the request for this kind. `credential` is ignored by `local`.
    pub fn prepare(
        self,
        endpoint: &str,
        credential: &str,
        model: &str,
        prompt: &str,
    ) -> PreparedRequest {
        let base = endpoint.trim_end_matches('/');
        match self {
            Self::Local => local::prepare(base, model, prompt),
            Self::Anthropic => anthropic::prepare(base, credential, model, prompt),
            Self::Openai => openai::prepare(base, credential, model, prompt),
            Self::Google => google::prepare(base, credential, model, prompt),
        }
    }

    /// Checks the response shape and extracts the answer text.
    pub fn normalize(self, body: &str) -> Result<String, ProviderError> {
        let extracted = match self {
            Self::Local => local::normalize(body),
            Self::Anthropic => anthropic::normalize(body),
            Self::Openai => openai::normalize(body),
            Self::Google => google::normalize(body),
        };
        extracted.map_err(|detail| ProviderError::UnexpectedShape { kind: self, detail })
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" | "ollama" => Ok(Self::Local),
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::Openai),
            "google" | "gemini" => Ok(Self::Google),
            other => Err(format!(
                "Unknown endpoint kind '{other}'. Supported values: local, anthropic, openai, google."
            )),
        }
    }
}

/// One configured destination capable of answering a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTarget {
    pub id: String,
    pub name: String,
    pub kind: EndpointKind,
    pub model: String,
    #[serde(default)]
    pub enabled: bool,
}

impl ProviderTarget {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: EndpointKind,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            model: model.into(),
            enabled: true,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// API keys per endpoint kind, resolved once and handed to the aggregator.
#[derive(Clone, Default)]
pub struct Credentials {
    keys: HashMap<EndpointKind, String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        let mut credentials = Self::default();
        for kind in EndpointKind::ALL {
            let Some(key_env) = kind.credential_env() else {
                continue;
            };
            if let Ok(value) = env::var(key_env) {
                credentials = credentials.with(kind, value);
            }
        }
        credentials
    }

    /// Adds a key; blank values are ignored.
    pub fn with(mut self, kind: EndpointKind, key: impl Into<String>) -> Self {
        let key = key.into();
        let trimmed = key.trim();
        if !trimmed.is_empty() {
            self.keys.insert(kind, trimmed.to_string());
        }
        self
    }

    pub fn get(&self, kind: EndpointKind) -> Option<&str> {
        self.keys.get(&kind).map(String::as_str)
    }

    /// True when `kind` needs no key or a key is present.
    pub fn covers(&self, kind: EndpointKind) -> bool {
        !kind.requires_credential() || self.keys.contains_key(&kind)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut present: Vec<&str> = self.keys.keys().map(|kind| kind.as_str()).collect();
        present.sort_unstable();
        f.debug_struct("Credentials").field("present", &present).finish()
    }
}

/// Base URL per endpoint kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub local: String,
    pub anthropic: String,
    pub openai: String,
    pub google: String,
}

impl Endpoints {
    pub fn get(&self, kind: EndpointKind) -> &str {
        match kind {
            EndpointKind::Local => &self.local,
            EndpointKind::Anthropic => &self.anthropic,
            EndpointKind::Openai => &self.openai,
            EndpointKind::Google => &self.google,
        }
    }

    /// Points every kind at the same base URL, used by local stubs.
    pub fn all(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            local: base.clone(),
            anthropic: base.clone(),
            openai: base.clone(),
            google: base,
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            local: EndpointKind::Local.default_endpoint().to_string(),
            anthropic: EndpointKind::Anthropic.default_endpoint().to_string(),
            openai: EndpointKind::Openai.default_endpoint().to_string(),
            google: EndpointKind::Google.default_endpoint().to_string(),
        }
    }
}

/// A fully built HTTP request, independent of the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

impl PreparedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{key_env} is not set in the environment")]
    MissingCredential {
        kind: EndpointKind,
        key_env: &'static str,
    },
    #[error("{} request failed: {source}", kind.vendor())]
    Transport {
        kind: EndpointKind,
        #[source]
        source: reqwest::Error,
    },
    #[error("{} request timed out after {:.2}s", kind.vendor(), after.as_secs_f64())]
    TimedOut { kind: EndpointKind, after: Duration },
    #[error("{} API error {status}: {body}", kind.vendor())]
    Status {
        kind: EndpointKind,
        status: StatusCode,
        body: String,
    },
    #[error("Unexpected response from {} API: {detail}", kind.vendor())]
    UnexpectedShape { kind: EndpointKind, detail: String },
}

impl ProviderError {
    pub fn status(kind: EndpointKind, status: StatusCode, body: &str) -> Self {
        Self::Status {
            kind,
            status,
            body: summarize_body(body, status),
        }
    }
}

fn summarize_body(body: &str, status: StatusCode) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string();
    }
    if trimmed.chars().count() <= MAX_ERROR_BODY_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
    format!("{cut}...")
}

/// Sends a prompt to one target and returns the normalized answer text.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, target: &ProviderTarget, prompt: &str)
    -> Result<String, ProviderError>;
}
