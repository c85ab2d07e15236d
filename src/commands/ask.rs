use std::io::{IsTerminal, Write};

use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::commands::{build_aggregator, dry_run_report, print_json, read_prompt};
use crate::config::AppConfig;
use crate::fanout::{Aggregator, OutcomeReport, ProviderOutcome, TargetOutcome};
use crate::providers::ProviderTarget;

const QUIT_WORDS: [&str; 3] = ["quit", "exit", "q"];

#[derive(Debug, Args, Clone)]
pub struct AskArgs {
    /// Target id; defaults to the first enabled target in the config.
    #[arg(long, short = 't', value_name = "ID")]
    target: Option<String>,
    /// Print the outcome as JSON.
    #[arg(long)]
    json: bool,
    /// Print the request that would be sent and exit.
    #[arg(long)]
    dry_run: bool,
    /// Keep asking: one prompt per stdin line until EOF or `quit`.
    #[arg(long, short = 'i', conflicts_with_all = ["dry_run", "prompt"])]
    interactive: bool,
    /// Prompt text; read from stdin when omitted.
    prompt: Option<String>,
}

pub async fn run(args: AskArgs) -> Result<(), String> {
    let config = AppConfig::load()?;
    let target = pick_target(&config, args.target.as_deref())?;
    let targets = [target];

    if args.interactive {
        return chat(&config, &targets, args.json).await;
    }

    let prompt = read_prompt(args.prompt)?;
    if args.dry_run {
        return print_json(&dry_run_report(&config, &prompt, &targets)?);
    }

    let aggregator = build_aggregator(&config);
    let outcome = ask_once(&aggregator, &prompt, &targets).await?;
    if args.json {
        print_report(&outcome)?;
    }

    match outcome.outcome {
        ProviderOutcome::Success { text, .. } => {
            if !args.json {
                println!("{text}");
            }
            Ok(())
        }
        ProviderOutcome::Failure { message, .. } => Err(message),
    }
}

/// Reads prompts line by line. Failed turns are reported and the session
/// carries on; only EOF or a quit word ends it.
async fn chat(config: &AppConfig, targets: &[ProviderTarget], json: bool) -> Result<(), String> {
    let aggregator = build_aggregator(config);
    let interactive = std::io::stdin().is_terminal();
    if interactive {
        eprintln!(
            "Chatting with {}. Type 'quit', 'exit', or 'q' to end the session.",
            targets[0].name
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if interactive {
            eprint!("> ");
            let _ = std::io::stderr().flush();
        }
        let Some(line) = lines
            .next_line()
            .await
            .map_err(|err| format!("Failed to read prompt from stdin: {err}"))?
        else {
            break;
        };
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        if QUIT_WORDS.contains(&prompt.to_lowercase().as_str()) {
            break;
        }

        let outcome = match ask_once(&aggregator, prompt, targets).await {
            Ok(outcome) => outcome,
            Err(message) => {
                eprintln!("Error: {message}");
                continue;
            }
        };
        if json {
            print_report(&outcome)?;
            continue;
        }
        match outcome.outcome {
            ProviderOutcome::Success { text, .. } => println!("{text}\n"),
            ProviderOutcome::Failure { message, .. } => eprintln!("Error: {message}"),
        }
    }
    Ok(())
}

async fn ask_once(
    aggregator: &Aggregator,
    prompt: &str,
    targets: &[ProviderTarget],
) -> Result<TargetOutcome, String> {
    aggregator
        .submit(prompt, targets)
        .map_err(|err| err.to_string())?
        .finish()
        .await
        .into_iter()
        .next()
        .ok_or_else(|| "No outcome was reported.".to_string())
}

fn print_report(outcome: &TargetOutcome) -> Result<(), String> {
    let line = serde_json::to_string(&OutcomeReport::from(outcome))
        .map_err(|err| format!("Failed to encode JSON output: {err}"))?;
    println!("{line}");
    Ok(())
}

fn pick_target(config: &AppConfig, id: Option<&str>) -> Result<ProviderTarget, String> {
    let target = match id {
        Some(id) => config.target(id).ok_or_else(|| {
            format!(
                "Unknown target '{id}'. Configured targets: {}.",
                config
                    .targets
                    .iter()
                    .map(|target| target.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })?,
        None => config
            .targets
            .iter()
            .find(|target| target.enabled)
            .ok_or_else(|| {
                "No target selected. Use --target or enable one in the config file.".to_string()
            })?,
    };
    Ok(target.clone().enabled(true))
}
