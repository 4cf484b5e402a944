mod cli;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::cli::{Cli, Commands};
use lobby_core::{Config, ConfigValidator};
use lobby_gateway::{GatewayBroadcaster, GatewayEvent, GatewayServer, MethodHandlers, ShutdownEvent};
use lobby_presence::{KeyValueStore, PresenceRegistry, PresenceWorker, StoreRegistryFactory};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const SHUTDOWN_FLUSH: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lobby=info,warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    // Handle ConfigSample immediately without loading config
    if let Some(Commands::ConfigSample { output }) = &cli.command {
        let path = output
            .clone()
            .unwrap_or_else(|| std::path::PathBuf::from("./lobby.sample.yaml"));
        Config::sample().save(&path)?;
        println!("Sample configuration written to {}", path.display());
        return Ok(());
    }

    let config = Config::load(&cli.config_path)?;
    ConfigValidator::validate(&config)?;

    let kv = lobby_presence::open_store(&config.store).await?;

    match cli.command {
        None | Some(Commands::Serve) => serve(config, kv).await?,
        Some(Commands::ConfigSample { .. }) => {
            // Already handled
        }
        Some(Commands::Online { tenant }) => {
            let registry = PresenceRegistry::from_config(kv, None, &config);
            let listing = registry.list_online(&tenant).await?;
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        Some(Commands::Reconcile { tenant }) => {
            let registry = PresenceRegistry::from_config(kv, None, &config);
            let report = registry.reconciler().sweep(&tenant).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

async fn serve(config: Config, kv: Arc<dyn KeyValueStore>) -> Result<()> {
    let broadcaster = GatewayBroadcaster::new(config.gateway.event_capacity);
    let registry =
        PresenceRegistry::from_config(kv.clone(), Some(Arc::new(broadcaster.clone())), &config);
    let handlers = Arc::new(MethodHandlers::new(registry, broadcaster.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = if config.worker.enabled {
        let worker = PresenceWorker::new(
            StoreRegistryFactory::new(kv, config.clone()),
            &config.worker,
        );
        Some(tokio::spawn(worker.run(shutdown_rx)))
    } else {
        None
    };

    let server = GatewayServer::new(config.gateway.clone(), handlers, broadcaster.clone());
    info!(
        "Lobby service starting on {}:{}{}",
        config.gateway.host, config.gateway.port, config.gateway.ws_path
    );

    let result = tokio::select! {
        result = server.start() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            Ok(())
        }
    };

    let shutdown = ShutdownEvent {
        reason: "server shutting down".to_string(),
        restart_expected_ms: None,
    };
    broadcaster.send(GatewayEvent::new("shutdown", serde_json::to_value(shutdown)?));
    if !broadcaster.drain(SHUTDOWN_GRACE).await {
        tracing::warn!("Some connections did not receive the shutdown event");
    }
    // let connection tasks write what they picked up
    tokio::time::sleep(SHUTDOWN_FLUSH).await;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = worker {
        if let Err(e) = handle.await {
            tracing::warn!("Presence worker ended abnormally: {}", e);
        }
    }

    result
}
