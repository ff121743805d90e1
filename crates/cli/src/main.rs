//! Road scene analysis - command-line entry point

use clap::Parser;
use tracing::info;

use road_scene_cli::{commands, init_logging, Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs)?;

    info!("road-scene v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Analyze(args) => commands::analyze(args),
        Commands::Calibrate(args) => commands::calibrate(args),
        Commands::Replay(args) => commands::replay(args),
    }
}
