//! SNMP simulator agent main application

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};

use snmp_sim_agent::{
    config::SimulatorConfig,
    core::engine::{SimulatorEngine, SimulatorEvent},
    utils::setup_logging,
    Result,
};

#[derive(Parser)]
#[command(name = "snmp-sim-agent")]
#[command(about = "Programmable SNMP agent simulator")]
#[command(version = snmp_sim_agent::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the simulator
    Start,
    /// Validate configuration
    ValidateConfig,
    /// Generate default configuration
    GenerateConfig {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_configuration(&cli).await?;

    setup_logging(&config.logging)?;

    info!("Starting {} v{}", snmp_sim_agent::NAME, snmp_sim_agent::VERSION);
    info!("Description: {}", snmp_sim_agent::DESCRIPTION);

    match &cli.command {
        Some(Commands::Start) | None => run_simulator(config).await,
        Some(Commands::ValidateConfig) => validate_configuration(&config).await,
        Some(Commands::GenerateConfig { output }) => generate_default_config(output.clone()).await,
    }
}

async fn load_configuration(cli: &Cli) -> Result<SimulatorConfig> {
    let config = if let Some(config_path) = &cli.config {
        info!("Loading configuration from: {}", config_path.display());
        SimulatorConfig::load_from_file(config_path)?
    } else {
        info!("No configuration file specified, trying environment variables");
        match SimulatorConfig::load_from_env() {
            Ok(config) => config,
            Err(_) => {
                info!("No environment configuration found, using defaults");
                SimulatorConfig::default_config()
            }
        }
    };

    config.validate()?;
    info!("Configuration loaded and validated successfully");

    Ok(config)
}

async fn run_simulator(config: SimulatorConfig) -> Result<()> {
    info!("Initializing SNMP simulator");

    let mut engine = SimulatorEngine::new(config).await?;

    let mut event_rx = engine
        .take_event_receiver()
        .ok_or_else(|| snmp_sim_agent::Error::internal("failed to get event receiver"))?;

    engine.start();

    let event_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            handle_simulator_event(event).await;
        }
    });

    let shutdown_task = tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down gracefully"),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }
    });

    tokio::select! {
        _ = event_task => {
            info!("Event handling completed");
        }
        _ = shutdown_task => {
            info!("Shutdown signal received");
        }
    }

    engine.stop();
    info!("SNMP simulator shutdown complete");
    Ok(())
}

async fn handle_simulator_event(event: SimulatorEvent) {
    match event {
        SimulatorEvent::Started => {
            info!("simulator started");
        }
        SimulatorEvent::Stopped => {
            info!("simulator stopped");
        }
        SimulatorEvent::ContextLoaded { name, record_count } => {
            info!("context '{}' loaded ({} records)", name, record_count);
        }
        SimulatorEvent::ScenarioStarted { id, name } => {
            info!("scenario '{}' started (id={})", name, id);
        }
        SimulatorEvent::ScenarioStopped { id } => {
            info!("scenario stopped (id={})", id);
        }
        SimulatorEvent::Restarted { engine_boots } => {
            info!("simulated restart, engineBoots now {}", engine_boots);
        }
        SimulatorEvent::Error { message } => {
            error!("simulator error: {}", message);
        }
    }
}

async fn validate_configuration(config: &SimulatorConfig) -> Result<()> {
    info!("Validating configuration...");

    config.validate()?;

    println!("Configuration is valid");
    println!("  Node ID: {}", config.general.node_id);
    println!("  Endpoints: {}", config.endpoints.len());
    for endpoint in &config.endpoints {
        println!("    {} -> {}", endpoint.name, endpoint.udp);
    }
    println!("  Contexts: {}", config.contexts.len());
    for context in &config.contexts {
        println!("    {} ({})", context.name, context.store_ref);
    }

    Ok(())
}

async fn generate_default_config(output_path: Option<PathBuf>) -> Result<()> {
    let config = SimulatorConfig::default_config();
    let toml_content = toml::to_string_pretty(&config)
        .map_err(|e| snmp_sim_agent::Error::internal(format!("failed to serialize config: {e}")))?;

    match output_path {
        Some(path) => {
            std::fs::write(&path, toml_content)?;
            println!("Default configuration written to: {}", path.display());
        }
        None => {
            println!("{toml_content}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_config_generation() {
        let result = generate_default_config(None).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_config_validation() {
        let config = SimulatorConfig::default_config();
        let result = validate_configuration(&config).await;
        assert!(result.is_ok());
    }
}
