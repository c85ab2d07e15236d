//! Local inference server (Ollama `generate` API).

use serde::{Deserialize, Serialize};

use crate::providers::provider::PreparedRequest;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

pub(crate) fn prepare(base: &str, model: &str, prompt: &str) -> PreparedRequest {
    let payload = GenerateRequest {
        model,
        prompt,
        stream: false,
    };
    PreparedRequest {
        url: format!("{base}/api/generate"),
        headers: Vec::new(),
        body: serde_json::to_value(payload).unwrap_or_default(),
    }
}

pub(crate) fn normalize(body: &str) -> Result<String, String> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|err| format!("expected a string `response` field ({err})"))?;
    Ok(parsed.response.trim().to_string())
}
