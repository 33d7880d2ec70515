use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use tracing::{info, warn};

use stagekit_dmx::bridge::Bridge;
use stagekit_dmx::config::Config;
use stagekit_dmx::logging;
use stagekit_dmx::topology::{parse_topology, Topology};

#[derive(Parser)]
#[command(name = "stagekit_dmx")]
#[command(about = "Stage kit lighting over sACN to 2, 4 or 8 DMX par cans\n\nReceives the game's stage kit lighting universe and drives RGB pars through a USB DMX dongle.", long_about = None)]
struct Cli {
    /// Path to configuration file (JSON)
    config: Option<String>,

    /// Serial port of the DMX dongle (overrides config)
    #[arg(long)]
    port: Option<String>,

    /// Number of fixtures: 2, 4 or 8 (overrides config)
    #[arg(long, value_parser = parse_topology)]
    topology: Option<Topology>,

    /// Enable debug output (statistics)
    #[arg(long)]
    debug: bool,

    /// Enable detailed debug (channel dumps every frame)
    #[arg(long)]
    ddebug: bool,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            let config_data =
                fs::read_to_string(path).context(format!("Failed to read config {}", path))?;
            serde_json::from_str(&config_data).context(format!("Invalid config {}", path))?
        }
        None => Config::default(),
    };

    if let Some(port) = &cli.port {
        config.output.port = port.clone();
    }
    if let Some(topology) = cli.topology {
        config.fixtures.topology = topology;
    }

    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(logging::level_for(cli.debug, cli.ddebug));

    let config = load_config(&cli)?;

    // ddebug implies debug
    let debug = cli.debug || cli.ddebug;

    let mut bridge = Bridge::new(config, debug)?;

    // Set up Ctrl-C handler with graceful shutdown
    let running = bridge.get_running_flag();
    let result = ctrlc::set_handler(move || {
        info!("Shutting down...");
        running.store(false, std::sync::atomic::Ordering::Relaxed);
    });

    if let Err(e) = result {
        warn!("Could not set Ctrl-C handler: {}", e);
    }

    // Run bridge (blocks until shutdown)
    bridge.run()?;

    // Graceful shutdown - blank all fixtures
    bridge.shutdown();

    Ok(())
}
