//! CLI entry point for courier

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use courier_agent::{ChatRelay, RelayLoop};
use courier_channels::ChannelManager;
use courier_core::bus::MessageBus;
use courier_core::config::{Config, ConfigLoader};
use courier_core::history::HistoryStore;
use courier_core::logging::init_logging;
use courier_providers::OpenAiClient;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "A Telegram-to-LLM conversational relay")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay gateway
    Gateway,
    /// Send a single message to the relay and print the reply
    Agent {
        /// Message to send
        #[arg(short, long)]
        message: String,
        /// Model to use
        #[arg(long)]
        model: Option<String>,
    },
    /// Show configuration status
    Status,
}

fn loader_for(config_dir: &Option<PathBuf>) -> ConfigLoader {
    match config_dir {
        Some(dir) => ConfigLoader::with_dir(dir),
        None => ConfigLoader::new(),
    }
}

fn build_provider(config: &Config) -> Arc<OpenAiClient> {
    Arc::new(OpenAiClient::new(
        config.providers.openai.api_key.clone(),
        config.providers.openai.api_base.clone(),
        config.agent.model.clone(),
    ))
}

async fn run_gateway(config: Config) -> Result<()> {
    let _guard = init_logging(&config.logging);

    info!("Starting courier gateway");

    let bus = MessageBus::new();
    let history = Arc::new(HistoryStore::new(config.agent.history_limit));
    let relay = Arc::new(ChatRelay::new(
        build_provider(&config),
        history,
        &config.agent,
    ));

    let manager = ChannelManager::new(config, bus.clone());
    manager.initialize().await?;

    let relay_loop = RelayLoop::new(bus.clone(), relay);
    let relay_handle = tokio::spawn(async move { relay_loop.run().await });

    let dispatcher = bus.clone();
    let dispatch_handle = tokio::spawn(async move { dispatcher.dispatch_outbound_loop().await });

    manager.start_all().await?;

    info!("Gateway running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    manager.stop_all().await;
    bus.stop().await;
    relay_handle.abort();
    dispatch_handle.abort();

    Ok(())
}

async fn run_agent(config: Config, message: String, model: Option<String>) -> Result<()> {
    let mut agent_config = config.agent.clone();
    if let Some(model) = model {
        agent_config.model = model;
    }

    let provider = Arc::new(OpenAiClient::new(
        config.providers.openai.api_key.clone(),
        config.providers.openai.api_base.clone(),
        agent_config.model.clone(),
    ));
    let history = Arc::new(HistoryStore::new(agent_config.history_limit));
    let relay = ChatRelay::new(provider, history, &agent_config);

    let reply = relay.respond("cli:local", &message).await;
    println!("{}", reply);

    Ok(())
}

fn show_status(loader: &ConfigLoader) {
    println!(
        "{} {}",
        style("Config dir:").bold(),
        loader.config_dir().display()
    );

    match loader.load() {
        Ok(config) => {
            println!("{} {}", style("Model:").bold(), config.agent.model);
            println!(
                "{} {}",
                style("History limit:").bold(),
                config.agent.history_limit
            );
            println!("{} telegram", style("Channels:").bold());
            println!("{}", style("Configuration OK").green());
        }
        Err(e) => {
            println!("{} {}", style("Invalid configuration:").red(), e);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let loader = loader_for(&cli.config_dir);

    match cli.command {
        Commands::Gateway => {
            let config = loader.load()?;
            run_gateway(config).await
        }
        Commands::Agent { message, model } => {
            let config = loader.load()?;
            run_agent(config, message, model).await
        }
        Commands::Status => {
            show_status(&loader);
            Ok(())
        }
    }
}
