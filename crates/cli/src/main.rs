mod commands;
mod config;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "diskvault",
    version,
    about = "Backup disk resolver and registry"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config_path = cli.config.unwrap_or_else(config::default_config_path);

    match cli.command {
        commands::Command::Disks => commands::disks::run(&config_path).await,
        commands::Command::Default(args) => commands::default::run(args, &config_path).await,
        commands::Command::Check(args) => commands::check::run(args, &config_path).await,
    }
}
