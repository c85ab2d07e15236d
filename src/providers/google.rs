//! Google Gemini `generateContent` API.
//!
//! The API key travels in the query string, so prepared URLs for this kind
//! must never be logged.

use serde::{Deserialize, Serialize};

use crate::providers::provider::PreparedRequest;

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

pub(crate) fn prepare(base: &str, api_key: &str, model: &str, prompt: &str) -> PreparedRequest {
    let payload = GenerateContentRequest {
        contents: [Content {
            parts: [Part { text: prompt }],
        }],
    };
    PreparedRequest {
        url: format!("{base}/v1beta/models/{model}:generateContent?key={api_key}"),
        headers: Vec::new(),
        body: serde_json::to_value(payload).unwrap_or_default(),
    }
}

pub(crate) fn normalize(body: &str) -> Result<String, String> {
    let parsed: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|err| format!("expected a `candidates` list ({err})"))?;
    let candidate = parsed
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| "`candidates` list is empty".to_string())?;
    candidate
        .content
        .and_then(|content| content.parts.into_iter().next())
        .and_then(|part| part.text)
        .ok_or_else(|| "first candidate has no `content.parts[0].text`".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_is_embedded_in_url() {
        let request = prepare(
            "https://generativelanguage.googleapis.com",
            "g-key",
            "gemini-2.0-flash-exp",
            "hi",
        );
        assert_eq!(
            request.url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash-exp:generateContent?key=g-key"
        );
        assert!(request.headers.is_empty());
        assert_eq!(request.body, json!({"contents": [{"parts": [{"text": "hi"}]}]}));
    }

    #[test]
    fn nested_text_is_extracted() {
        let body = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Four"}]},"finishReason":"STOP"}]}"#;
        assert_eq!(normalize(body).unwrap(), "Four");
    }

    #[test]
    fn blocked_candidate_without_content_is_rejected() {
        let body = r#"{"candidates":[{"finishReason":"SAFETY"}]}"#;
        let err = normalize(body).unwrap_err();
        assert!(err.contains("content.parts[0].text"));
    }

    #[test]
    fn prompt_feedback_only_response_is_rejected() {
        let err = normalize(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap_err();
        assert!(err.contains("`candidates`"));
    }
}
