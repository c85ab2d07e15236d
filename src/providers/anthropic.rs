//! Anthropic messages API.

use serde::{Deserialize, Serialize};

use crate::providers::provider::PreparedRequest;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 4096;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [UserMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

pub(crate) fn prepare(base: &str, api_key: &str, model: &str, prompt: &str) -> PreparedRequest {
    let payload = MessagesRequest {
        model,
        max_tokens: MAX_OUTPUT_TOKENS,
        messages: [UserMessage {
            role: "user",
            content: prompt,
        }],
    };
    PreparedRequest {
        url: format!("{base}/v1/messages"),
        headers: vec![
            ("x-api-key", api_key.to_string()),
            ("anthropic-version", ANTHROPIC_VERSION.to_string()),
        ],
        body: serde_json::to_value(payload).unwrap_or_default(),
    }
}

pub(crate) fn normalize(body: &str) -> Result<String, String> {
    let parsed: MessagesResponse = serde_json::from_str(body)
        .map_err(|err| format!("expected a `content` list ({err})"))?;
    parsed
        .content
        .into_iter()
        .next()
        .and_then(|block| block.text)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| "first `content` block has no text".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_carries_key_and_version_headers() {
        let request = prepare("https://api.anthropic.com", "sk-ant", "claude-sonnet-4-5", "hi");
        assert_eq!(request.url, "https://api.anthropic.com/v1/messages");
        assert_eq!(request.header("x-api-key"), Some("sk-ant"));
        assert_eq!(request.header("anthropic-version"), Some("2023-06-01"));
        assert_eq!(
            request.body,
            json!({
                "model": "claude-sonnet-4-5",
                "max_tokens": 4096,
                "messages": [{"role": "user", "content": "hi"}]
            })
        );
    }

    #[test]
    fn first_text_block_is_extracted() {
        let body = r#"{"id":"msg_1","content":[{"type":"text","text":"Four."}],"stop_reason":"end_turn"}"#;
        assert_eq!(normalize(body).unwrap(), "Four.");
    }

    #[test]
    fn empty_content_list_is_rejected() {
        let err = normalize(r#"{"content":[]}"#).unwrap_err();
        assert_eq!(err, "first `content` block has no text");
    }

    #[test]
    fn error_envelope_is_rejected() {
        let err = normalize(r#"{"type":"error","error":{"message":"overloaded"}}"#).unwrap_err();
        assert!(err.contains("`content`"));
    }
}
