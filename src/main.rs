//! Larder CLI: dietary substitution plans for recipes.

use clap::Parser;
use larder::logging::LoggingConfig;

#[derive(Parser, Debug)]
#[command(
    name = "larder",
    version,
    about = "Deterministic dietary substitution: one substitute that satisfies every active diet"
)]
struct Cli {
    /// Debug-level diagnostics on stderr (ignored when RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: larder::cli::Commands,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = LoggingConfig::from_env().verbose(cli.verbose).init() {
        eprintln!("warning: {}", e);
    }
    if let Err(e) = larder::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
