use std::io::{self, IsTerminal, Read};
use std::sync::Arc;

use serde_json::{Map, Value, json};

use crate::config::AppConfig;
use crate::fanout::{self, Aggregator};
use crate::history::HistoryStore;
use crate::providers::{HttpDispatcher, ProviderTarget};

pub mod ask;
pub mod compare;
pub mod config;
pub mod history;
pub mod serve;

const REDACTED: &str = "<redacted>";

/// Returns the argument prompt, else whatever is piped on stdin.
pub(crate) fn read_prompt(arg: Option<String>) -> Result<String, String> {
    if let Some(prompt) = arg {
        return Ok(prompt);
    }
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(String::new());
    }
    let mut buffer = String::new();
    stdin
        .lock()
        .read_to_string(&mut buffer)
        .map_err(|err| format!("Failed to read prompt from stdin: {err}"))?;
    Ok(buffer)
}

pub(crate) fn load_history(config: &AppConfig) -> HistoryStore {
    HistoryStore::load(&config.history_file, config.history_limit)
}

pub(crate) fn build_aggregator(config: &AppConfig) -> Aggregator {
    let dispatcher = HttpDispatcher::new(
        config.endpoints.clone(),
        config.credentials.clone(),
        config.timeout,
    );
    Aggregator::new(
        Arc::new(dispatcher),
        Arc::new(load_history(config)),
        config.credentials.clone(),
    )
}

/// The requests a submission would send, with credentials redacted.
pub(crate) fn dry_run_report(
    config: &AppConfig,
    prompt: &str,
    targets: &[ProviderTarget],
) -> Result<Value, String> {
    let prompt = fanout::validate(prompt, targets).map_err(|err| err.to_string())?;
    let requests: Vec<Value> = targets
        .iter()
        .filter(|target| target.enabled)
        .map(|target| {
            let endpoint = config.endpoints.get(target.kind);
            let request = target
                .kind
                .prepare(endpoint, REDACTED, &target.model, prompt);
            let headers: Map<String, Value> = request
                .headers
                .iter()
                .map(|(name, value)| (name.to_string(), Value::String(value.clone())))
                .collect();
            json!({
                "target": target.id,
                "kind": target.kind,
                "model": target.model,
                "url": request.url,
                "headers": headers,
                "body": request.body,
            })
        })
        .collect();

    Ok(json!({
        "dry_run": true,
        "prompt": prompt,
        "requests": requests,
    }))
}

pub(crate) fn print_json(value: &Value) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| format!("Failed to encode JSON output: {err}"))?;
    println!("{text}");
    Ok(())
}
