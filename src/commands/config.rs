use clap::{Args, Subcommand};

use crate::config::{self, AppConfig};

#[derive(Debug, Args, Clone)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Debug, Subcommand, Clone)]
enum ConfigSubcommand {
    /// Parse and validate the config file.
    Check,
    /// Print the resolved settings and targets.
    Show,
}

pub fn run(args: ConfigArgs) -> Result<(), String> {
    match args.command {
        ConfigSubcommand::Check => {
            let path = config::validate_config()?;
            println!("config OK: {}", path.display());
            Ok(())
        }
        ConfigSubcommand::Show => {
            let config = AppConfig::load()?;
            println!("config: {}", config.path.display());
            println!("history: {} (limit {})", config.history_file.display(), config.history_limit);
            match config.timeout {
                Some(timeout) => println!("timeout: {}s", timeout.as_secs()),
                None => println!("timeout: client default"),
            }
            for target in &config.targets {
                let credential = match target.kind.credential_env() {
                    None => "not needed",
                    Some(_) if config.credentials.covers(target.kind) => "present",
                    Some(_) => "missing",
                };
                println!(
                    "target {} kind={} model={} enabled={} credential={credential}",
                    target.id, target.kind, target.model, target.enabled
                );
            }
            Ok(())
        }
    }
}
