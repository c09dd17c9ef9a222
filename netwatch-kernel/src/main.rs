/**
 * NETWATCH KERNEL - Entry point of the network monitor
 *
 * Wires the pieces together: settings from the environment, probes,
 * YAML device registry, notifier (SMTP or log), poll loop, HTTP API.
 *
 * Two tasks run side by side: the poll loop (sole writer of device state)
 * and the axum server (readers). SIGINT/SIGTERM stop the server first,
 * then the poll loop finishes its current cycle and exits.
 */

mod config;
mod evaluator;
mod health;
mod http;
mod logging;
mod models;
mod notifier;
mod poller;
mod registry;
mod store;
mod throttle;
#[cfg(test)]
mod testing;

use crate::config::{load_email_config, Settings};
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::notifier::{LogNotifier, Notifier, SmtpNotifier};
use crate::poller::Poller;
use crate::registry::{RegistrySource, YamlRegistry};
use crate::store::StatusStore;

use anyhow::Context;
use netwatch_probes::{NetworkProbe, PingProbe, Probe, SnmpProbe};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    let settings = Settings::from_env().context("invalid configuration")?;
    logging::init_logging(settings.log_dir.as_deref()).context("cannot open log file")?;

    tracing::info!(
        devices = %settings.devices_path.display(),
        interval = ?settings.poll_interval,
        threshold = settings.unreachable_threshold,
        initial_delay = ?settings.initial_delay,
        cooldown = ?settings.alert_cooldown,
        "starting network monitor"
    );

    let notifier: Arc<dyn Notifier> = match load_email_config(&settings.email_config_path)
        .await
        .context("cannot load email configuration")?
    {
        Some(smtp) => {
            tracing::info!(server = %smtp.server, port = smtp.port, sender = %smtp.sender, "email configuration loaded");
            Arc::new(SmtpNotifier::new(smtp))
        }
        None => {
            tracing::warn!(
                path = %settings.email_config_path.display(),
                "no email configuration, alerts will only be logged"
            );
            Arc::new(LogNotifier)
        }
    };

    let retry = settings.snmp_retry_policy();
    let probe: Arc<dyn Probe> = Arc::new(NetworkProbe::new(
        PingProbe::new(settings.ping_timeout),
        SnmpProbe::new(settings.snmp_community.clone(), settings.snmp_timeout, retry),
    ));
    let registry: Arc<dyn RegistrySource> = Arc::new(YamlRegistry::new(&settings.devices_path));
    let store = StatusStore::new();
    let health = HealthTracker::new();

    let poller = Poller::new(
        &settings,
        probe,
        registry.clone(),
        notifier,
        store.clone(),
        health.clone(),
    );
    if settings.startup_notice {
        poller.announce_startup(OffsetDateTime::now_utc()).await;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poll_task = tokio::spawn(poller.run(shutdown_rx));

    let app = http::build_router(AppState { store, registry, health });
    let listener = TcpListener::bind(settings.listen)
        .await
        .with_context(|| format!("cannot bind {}", settings.listen))?;
    tracing::info!("listening on http://{}", settings.listen);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // server gone (signal or error): let the poll loop finish its cycle
    shutdown_tx.send(true).ok();
    if let Err(e) = poll_task.await {
        tracing::error!(error = %e, "poll loop task failed");
    }

    served.context("http server failed")?;
    tracing::info!("network monitor stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown requested, finishing current cycle");
}
