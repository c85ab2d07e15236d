//! OpenAI chat-completions API.

use serde::{Deserialize, Serialize};

use crate::providers::provider::PreparedRequest;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

pub(crate) fn prepare(base: &str, api_key: &str, model: &str, prompt: &str) -> PreparedRequest {
    let payload = ChatCompletionRequest {
        model,
        messages: [ChatMessage {
            role: "user",
            content: prompt,
        }],
    };
    PreparedRequest {
        url: format!("{base}/v1/chat/completions"),
        headers: vec![("authorization", format!("Bearer {api_key}"))],
        body: serde_json::to_value(payload).unwrap_or_default(),
    }
}

pub(crate) fn normalize(body: &str) -> Result<String, String> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|err| format!("expected a `choices` list ({err})"))?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| "`choices` list is empty".to_string())?;
    choice
        .message
        .content
        .ok_or_else(|| "first choice has no message content".to_string())
}
