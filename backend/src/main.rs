//! Backend entry-point: validates configuration, then runs the startup
//! sequence and serves until terminated.

use std::process::ExitCode;

use mockable::DefaultEnv;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use social_backend::config::AppConfig;
use social_backend::outbound::backplane::{BrokerConfig, RedisBackplane};
use social_backend::outbound::persistence::PgDriver;
use social_backend::server::ServerConfig;
use social_backend::{Bootstrap, StartupError};

#[actix_web::main]
async fn main() -> ExitCode {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "startup failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), StartupError> {
    let config = AppConfig::from_env(&DefaultEnv::new())?;
    let broker = BrokerConfig::new(config.broker_url(), config.fanout_channel());
    let started = Bootstrap::new(config, PgDriver, RedisBackplane::new(broker))
        .with_server_config(ServerConfig::without_signal_handling)
        .start()
        .await?;
    let shutdown = started.shutdown_handle();
    actix_web::rt::spawn(async move {
        termination().await;
        shutdown.stop(true).await;
    });
    if let Err(err) = started.run().await {
        error!(error = %err, "server terminated with an error");
    }
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on Unix.
async fn termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(err) => {
                warn!(error = %err, "SIGTERM handler unavailable; waiting for SIGINT");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("termination signal received");
}
