use clap::Args;
use owo_colors::{OwoColorize, Stream};

use crate::commands::{build_aggregator, dry_run_report, print_json, read_prompt};
use crate::config::AppConfig;
use crate::fanout::{OutcomeReport, ProviderOutcome, TargetOutcome};

#[derive(Debug, Args, Clone)]
pub struct CompareArgs {
    /// Send only to these target ids (repeatable).
    #[arg(long = "target", short = 't', value_name = "ID")]
    targets: Vec<String>,
    /// Send to every configured target.
    #[arg(long, conflicts_with = "targets")]
    all: bool,
    /// Print one JSON object per outcome.
    #[arg(long)]
    json: bool,
    /// Print the requests that would be sent and exit.
    #[arg(long)]
    dry_run: bool,
    /// Prompt text; read from stdin when omitted.
    prompt: Option<String>,
}

pub async fn run(args: CompareArgs) -> Result<(), String> {
    let config = AppConfig::load()?;
    let targets = config.select_targets(&args.targets, args.all)?;
    let prompt = read_prompt(args.prompt)?;

    if args.dry_run {
        return print_json(&dry_run_report(&config, &prompt, &targets)?);
    }

    let aggregator = build_aggregator(&config);
    let mut submission = aggregator
        .submit(&prompt, &targets)
        .map_err(|err| err.to_string())?;

    let (mut succeeded, mut failed) = (0usize, 0usize);
    while let Some(outcome) = submission.next_outcome().await {
        if outcome.outcome.is_success() {
            succeeded += 1;
        } else {
            failed += 1;
        }
        if args.json {
            let line = serde_json::to_string(&OutcomeReport::from(&outcome))
                .map_err(|err| format!("Failed to encode JSON output: {err}"))?;
            println!("{line}");
        } else {
            render_text(&outcome);
        }
    }

    eprintln!("{succeeded} succeeded, {failed} failed");
    Ok(())
}

fn render_text(outcome: &TargetOutcome) {
    let header = format!("== {} [{}]", outcome.target.name, outcome.target.id);
    println!("{}", header.if_supports_color(Stream::Stdout, |text| text.bold()));

    let secs = outcome.outcome.elapsed().as_secs_f64();
    match &outcome.outcome {
        ProviderOutcome::Success { text, .. } => {
            let status = format!("✓ Completed in {secs:.2}s");
            println!("{}", status.if_supports_color(Stream::Stdout, |s| s.green()));
            println!("{text}");
        }
        ProviderOutcome::Failure { message, .. } => {
            let status = format!("✗ Failed after {secs:.2}s");
            println!("{}", status.if_supports_color(Stream::Stdout, |s| s.red()));
            println!("Error: {message}");
        }
    }
    println!();
}
