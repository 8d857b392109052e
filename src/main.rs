use clap::Parser;
use grblstream::cli::{run, Cli};
use grblstream::init_logging;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.json)?;

    tracing::info!("grblstream {} ({})", grblstream::VERSION, grblstream::BUILD_DATE);
    run(cli)
}
