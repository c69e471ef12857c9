// ABOUTME: Entry point for the gordon daemon.
// ABOUTME: Wires runtime, route store, event bus, handlers, and supervisor.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use gordon::config::Settings;
use gordon::envfile::{DirEnvLoader, EnvFileExtractor};
use gordon::error::{Error, Result};
use gordon::events::{Event, EventBus};
use gordon::manager::{
    AutoRouteResolver, ConfigReloadHandler, ContainerManager, FsBlobStore, ImagePushedHandler,
    ManualDeployHandler, ManualReloadHandler, Supervisor,
};
use gordon::routes::{FileRouteStore, RouteStore};
use gordon::runtime::{DockerRuntime, Runtime};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let config_path = cli.config.unwrap_or_else(|| PathBuf::from("gordon.yml"));

    let result = match cli.command {
        Commands::Check => check(&config_path),
        Commands::Serve => serve(&config_path).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn check(config_path: &PathBuf) -> Result<()> {
    Settings::load(config_path)?;
    println!("configuration OK: {}", config_path.display());
    Ok(())
}

async fn serve(config_path: &PathBuf) -> Result<()> {
    let settings = Settings::load(config_path)?;

    let docker = DockerRuntime::connect()?;
    let extractor: Option<Arc<dyn EnvFileExtractor>> = if settings.registry.env_file_extraction {
        Some(Arc::new(docker.env_file_extractor()))
    } else {
        None
    };
    let runtime: Arc<dyn Runtime> = Arc::new(docker);
    let env_loader = Arc::new(DirEnvLoader::new(settings.env_dir.clone()));

    let routes_path = config_path.with_file_name("routes.yml");
    let store = Arc::new(
        FileRouteStore::load(
            routes_path,
            settings.routes.clone(),
            &settings.registry,
            settings.auto_route,
        )
        .map_err(|e| Error::RouteStore(e.to_string()))?,
    );

    let manager = ContainerManager::new(runtime, settings.clone(), env_loader);

    let bus = Arc::new(EventBus::new());
    manager.set_event_publisher(bus.clone());

    let autoroute = settings.registry.blob_dir.as_ref().map(|blob_dir| {
        let blobs = Arc::new(FsBlobStore::new(blob_dir.clone()));
        AutoRouteResolver::new(manager.clone(), store.clone(), blobs, extractor.clone())
    });

    bus.register(Arc::new(ImagePushedHandler::new(
        manager.clone(),
        store.clone(),
        autoroute,
    )));
    bus.register(Arc::new(ConfigReloadHandler::new(
        manager.clone(),
        store.clone(),
    )));
    bus.register(Arc::new(ManualReloadHandler::new(
        manager.clone(),
        store.clone(),
    )));
    bus.register(Arc::new(ManualDeployHandler::new(
        manager.clone(),
        store.clone(),
    )));
    let bus_task = bus.start();

    // Reattach to whatever is already running, then converge on the routes.
    manager.sync().await?;

    let routes = store
        .routes()
        .await
        .map_err(|e| Error::RouteStore(e.to_string()))?;
    let cancel = tokio_util::sync::CancellationToken::new();
    let failures = manager.auto_start(&routes, &cancel).await;
    if failures > 0 {
        tracing::warn!(failures, "some routes failed to autostart");
    }

    let supervisor = Supervisor::new(manager.clone(), settings.supervisor.clone());
    supervisor.start();

    tracing::info!("gordon is serving");
    run_signal_loop(config_path, &manager, &store, &bus).await;

    tracing::info!("shutting down");
    bus.stop();
    let _ = bus_task.await;
    supervisor.stop().await;
    manager.shutdown().await;

    Ok(())
}

/// Block until SIGINT/SIGTERM. SIGHUP re-reads the settings file and queues a
/// config-reload event.
async fn run_signal_loop(
    config_path: &PathBuf,
    manager: &Arc<ContainerManager>,
    store: &Arc<FileRouteStore>,
    bus: &Arc<EventBus>,
) {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sig) => sig,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGTERM handler");
            return;
        }
    };
    let mut sighup = match signal(SignalKind::hangup()) {
        Ok(sig) => sig,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGHUP handler");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = sigterm.recv() => break,
            _ = sighup.recv() => {
                tracing::info!("SIGHUP received, reloading configuration");
                match Settings::load(config_path) {
                    Ok(settings) => {
                        manager.update_config(settings.clone());
                        if let Err(e) = store.reload(settings.routes) {
                            tracing::error!(error = %e, "route reload failed");
                        }
                        if let Err(e) = bus.send(Event::ConfigReload) {
                            tracing::error!(error = %e, "failed to queue config reload");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "configuration reload failed, keeping previous settings");
                    }
                }
            }
        }
    }
}
