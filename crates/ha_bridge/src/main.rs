use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use clap::Subcommand;
use ha_bridge::Bridge;
use ha_bridge::Config;
use tracing::info;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "ha-bridge", about = "Follow Home Assistant entity states")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "ha-bridge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect and log every state change until interrupted
    Watch,

    /// Print the current state of every entity as JSON
    States {
        /// Only include entities of this domain (e.g. "light")
        #[arg(long)]
        domain: Option<String>,
    },

    /// Print the catalog of callable actions as JSON
    Actions,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(config.logging.filter())
        .init();

    info!("Loaded config from: {}", cli.config.display());

    let bridge = Bridge::from_config(&config.bridge)?;

    match cli.command {
        Command::Watch => watch(&bridge).await?,
        Command::States { domain } => {
            let states = bridge.get_all_states().await;
            bridge.disconnect();
            let prefix = domain.map(|d| format!("{}.", d));
            let states: BTreeMap<_, _> = states?
                .into_iter()
                .filter(|(id, _)| prefix.as_ref().is_none_or(|p| id.starts_with(p.as_str())))
                .collect();
            println!("{}", serde_json::to_string_pretty(&states)?);
        }
        Command::Actions => {
            let actions: BTreeMap<_, _> = bridge.get_actions().await?.into_iter().collect();
            println!("{}", serde_json::to_string_pretty(&actions)?);
        }
    }

    Ok(())
}

async fn watch(bridge: &Bridge) -> anyhow::Result<()> {
    // A failed first attempt is retried in the background
    if let Err(e) = bridge.connect().await {
        warn!("Initial connect failed: {}", e);
    }

    let _subscription = bridge.on_state_changed(|entity_id, new_state, old_state| match old_state {
        Some(old) => info!("{}: {} -> {}", entity_id, old.state, new_state.state),
        None => info!("{}: {}", entity_id, new_state.state),
    });

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("Shutting down");
    bridge.disconnect();
    Ok(())
}
