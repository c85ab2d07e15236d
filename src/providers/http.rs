use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use crate::providers::provider::{
    Credentials, Dispatcher, EndpointKind, Endpoints, PreparedRequest, ProviderError,
    ProviderTarget,
};

/// Sends prepared requests over HTTP with one shared client.
///
/// Requests are issued once. A timeout, when configured, applies to each
/// request on its own; otherwise the client's defaults hold.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: reqwest::Client,
    endpoints: Endpoints,
    credentials: Credentials,
    timeout: Option<Duration>,
}

impl HttpDispatcher {
    pub fn new(endpoints: Endpoints, credentials: Credentials, timeout: Option<Duration>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints,
            credentials,
            timeout,
        }
    }

    async fn send(
        &self,
        kind: EndpointKind,
        request: PreparedRequest,
    ) -> Result<String, ProviderError> {
        let mut builder = self
            .client
            .post(&request.url)
            .header(CONTENT_TYPE, "application/json")
            .json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|source| self.classify(kind, source))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| self.classify(kind, source))?;

        tracing::debug!(kind = %kind, %status, bytes = body.len(), "provider responded");

        if !status.is_success() {
            return Err(ProviderError::status(kind, status, &body));
        }
        Ok(body)
    }

    fn classify(&self, kind: EndpointKind, source: reqwest::Error) -> ProviderError {
        match self.timeout {
            Some(after) if source.is_timeout() => ProviderError::TimedOut { kind, after },
            _ => ProviderError::Transport {
                kind,
                source: source.without_url(),
            },
        }
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(
        &self,
        target: &ProviderTarget,
        prompt: &str,
    ) -> Result<String, ProviderError> {
        let kind = target.kind;
        let credential = match kind.credential_env() {
            Some(key_env) => self
                .credentials
                .get(kind)
                .ok_or(ProviderError::MissingCredential { kind, key_env })?,
            None => "",
        };

        let request = kind.prepare(self.endpoints.get(kind), credential, &target.model, prompt);
        tracing::debug!(target_id = %target.id, kind = %kind, model = %target.model, "dispatching prompt");

        let body = self.send(kind, request).await?;
        kind.normalize(&body)
    }
}
