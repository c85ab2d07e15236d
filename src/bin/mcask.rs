use std::process;

use clap::Parser;
use mcompare::LONG_VERSION;
use mcompare::commands::ask::{self, AskArgs};
use mcompare::logging;

#[derive(Debug, Parser)]
#[command(
    name = "mcask",
    about = "Ask a single LLM provider target",
    version,
    long_version = LONG_VERSION
)]
struct Cli {
    /// Log debug details to stderr.
    #[arg(long, short = 'v')]
    verbose: bool,
    /// Only log errors.
    #[arg(long, short = 'q')]
    quiet: bool,
    #[command(flatten)]
    ask: AskArgs,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    if let Err(err) = ask::run(cli.ask).await {
        eprintln!("{err}");
        process::exit(1);
    }
}
