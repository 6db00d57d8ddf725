use std::fs::OpenOptions;
use std::path::Path;

use dynconf::Dynconf;
use dynconf::DynconfBuilder;
use dynconf::DynconfConfig;
use dynconf::EtcdStoreFactory;
use dynconf::Error;
use dynconf::Result;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::time::interval;
use tokio::time::MissedTickBehavior;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = DynconfConfig::new()?.validate()?;

    // Initializing Logs
    let _guard = init_observability(settings.watcher.log_dir.as_deref())?;
    info!(config = ?settings, "dynconf watcher starting");

    let dynconf = DynconfBuilder::from_config(&settings)
        .store_factory(EtcdStoreFactory::new(settings.store.clone()))
        .build()
        .await?;

    tokio::select! {
        _ = print_settings(&dynconf, settings.watcher.print_interval()) => {}
        result = shutdown_signal() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        }
    }

    dynconf.close().await;
    info!("Exiting watcher.");
    Ok(())
}

async fn print_settings(
    dynconf: &Dynconf,
    every: std::time::Duration,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let mut settings: Vec<(String, String)> = dynconf.settings().into_iter().collect();
        settings.sort();
        info!(path = dynconf.path(), state = %dynconf.state(), ?settings, "settings");
    }
}

async fn shutdown_signal() -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).map_err(|e| Error::Fatal(e.to_string()))?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(|e| Error::Fatal(e.to_string()))?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }
    Ok(())
}

/// Logs go to `<log_dir>/watcher.log` when a directory is configured,
/// stderr otherwise. Filtered by `RUST_LOG`, `info` by default.
fn init_observability(log_dir: Option<&Path>) -> Result<WorkerGuard> {
    let (non_blocking, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| Error::Fatal(format!("create {:?}: {}", dir, e)))?;
            let log_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join("watcher.log"))
                .map_err(|e| Error::Fatal(format!("open log file in {:?}: {}", dir, e)))?;
            tracing_appender::non_blocking(log_file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let base_subscriber = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(filter);
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}
