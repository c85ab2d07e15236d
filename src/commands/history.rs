use clap::{Args, Subcommand};

use crate::commands::load_history;
use crate::config::AppConfig;

const PREVIEW_CHARS: usize = 60;

#[derive(Debug, Args, Clone)]
pub struct HistoryArgs {
    #[command(subcommand)]
    command: HistorySubcommand,
}

#[derive(Debug, Subcommand, Clone)]
enum HistorySubcommand {
    /// List remembered prompts, oldest first.
    List {
        #[arg(long)]
        newest_first: bool,
        /// Print the full prompts as a JSON array.
        #[arg(long)]
        json: bool,
    },
    /// Remember a prompt without sending it.
    Add { prompt: String },
}

pub fn run(args: HistoryArgs) -> Result<(), String> {
    let config = AppConfig::load()?;
    let store = load_history(&config);

    match args.command {
        HistorySubcommand::List { newest_first, json } => {
            let log = store.snapshot();
            let prompts = if newest_first {
                log.newest_first()
            } else {
                log.oldest_first().to_vec()
            };
            print_prompts(&prompts, json)
        }
        HistorySubcommand::Add { prompt } => {
            let prompt = prompt.trim();
            if prompt.is_empty() {
                return Err("Missing prompt".to_string());
            }
            let log = store.record(prompt);
            print_prompts(log.oldest_first(), false)
        }
    }
}

fn print_prompts(prompts: &[String], json: bool) -> Result<(), String> {
    if json {
        let text = serde_json::to_string(prompts)
            .map_err(|err| format!("Failed to encode JSON output: {err}"))?;
        println!("{text}");
        return Ok(());
    }
    for prompt in prompts {
        println!("{}", preview(prompt));
    }
    Ok(())
}

fn preview(prompt: &str) -> String {
    let flat = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    format!("{cut}...")
}
