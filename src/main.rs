use std::io;
use std::process;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, shells};
use mcompare::LONG_VERSION;
use mcompare::commands::ask::{self, AskArgs};
use mcompare::commands::compare::{self, CompareArgs};
use mcompare::commands::config::{self, ConfigArgs};
use mcompare::commands::history::{self, HistoryArgs};
use mcompare::commands::serve::{self, ServeArgs};
use mcompare::logging;

const ROOT_HELP_EXAMPLES: &str = "Examples:\n  mcompare compare \"Explain borrow checking in one paragraph\"\n  echo \"2+2?\" | mcompare compare --target ollama --target openai --json\n  mcompare history list --newest-first\n  mcompare serve --port 8080\n  mcompare completion bash > ~/.local/share/bash-completion/completions/mcompare";

const COMPARE_HELP_EXAMPLES: &str = "Examples:\n  mcompare compare \"2+2?\"\n  mcompare compare --all --json \"Summarize RFC 9110\"\n  mcompare compare --target anthropic --dry-run \"hello\"";

#[derive(Debug, Parser)]
#[command(
    name = "mcompare",
    about = "Compare answers from several LLM providers side by side",
    version,
    long_version = LONG_VERSION,
    after_help = ROOT_HELP_EXAMPLES
)]
struct Cli {
    /// Log debug details to stderr.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
    /// Only log errors.
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Send a prompt to every enabled target", after_help = COMPARE_HELP_EXAMPLES)]
    Compare(CompareArgs),
    #[command(about = "Ask a single target")]
    Ask(AskArgs),
    #[command(about = "Read or extend the prompt history")]
    History(HistoryArgs),
    #[command(about = "Run the local compare server")]
    Serve(ServeArgs),
    #[command(about = "Manage local config")]
    Config(ConfigArgs),
    #[command(about = "Generate shell completion script")]
    Completion {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

fn print_completion(shell: CompletionShell) {
    let mut cmd = Cli::command();
    let out = &mut io::stdout();
    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, "mcompare", out),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, "mcompare", out),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, "mcompare", out),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Compare(args) => compare::run(args).await,
        Commands::Ask(args) => ask::run(args).await,
        Commands::History(args) => history::run(args),
        Commands::Serve(args) => serve::run(args).await,
        Commands::Config(args) => config::run(args),
        Commands::Completion { shell } => {
            print_completion(shell);
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("{err}");
        process::exit(1);
    }
}
