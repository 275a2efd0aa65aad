//! Kinect session CLI
//!
//! Opens sensors through the virtual backend and drives them from the
//! command line.

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};

use kinect::KinectConfig;

mod cli;
use cli::{Cli, Commands};

mod commands;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(KinectConfig::default_path);
    let config = KinectConfig::load(&config_path)?;

    // RUST_LOG wins over --log-level, which wins over the config file
    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("Loaded config from {:?}", config_path);

    let driver = commands::open_driver(&config, cli.monitor, cli.filter.as_deref())?;
    let index = cli.device.unwrap_or(config.device);

    match cli.command {
        Commands::List => commands::query::list(driver.as_ref())?,
        Commands::Led { option } => commands::set::led(driver.as_ref(), index, &option)?,
        Commands::Tilt { degrees } => commands::set::tilt(driver.as_ref(), index, degrees)?,
        Commands::Stream {
            depth,
            video,
            frames,
            seconds,
        } => {
            let options = commands::stream::StreamOptions {
                depth,
                video,
                frames,
                seconds,
                capacity: config.event_capacity,
            };
            commands::stream::run(driver, index, options).await?;
        }
        Commands::Script { file } => {
            commands::script::run(driver.as_ref(), index, file.as_deref())?
        }
    }

    info!("Done");
    Ok(())
}
