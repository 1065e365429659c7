use std::sync::Arc;

use anyhow::Context;

use mail_monitor::config::AppConfig;
use mail_monitor::enrich::create_enricher;
use mail_monitor::logging::init_logging;
use mail_monitor::monitor::{Monitor, MonitorDeps, RunOutcome};
use mail_monitor::notify::create_notifier;
use mail_monitor::source::ImapSource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    let config = AppConfig::from_env().context("Invalid configuration")?;
    let _log_guard = init_logging(&config.log).context("Failed to initialize logging")?;

    eprintln!("📬 Mail Monitor v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Mailbox: {}@{}:{}/{}",
        config.imap.username, config.imap.host, config.imap.port, config.imap.mailbox
    );
    eprintln!("   Whitelist: {}", config.whitelist);
    eprintln!("   Notify: {}", config.notify.channel_name());
    eprintln!("   Interval: {}s\n", config.monitor.poll_interval.as_secs());

    let deps = MonitorDeps {
        source: Box::new(ImapSource::new(config.imap.clone(), config.whitelist.clone())),
        enricher: create_enricher(config.summary_mode, config.llm.as_ref()),
        notifier: create_notifier(&config.notify),
    };
    let monitor = Arc::new(Monitor::new(config.monitor.clone(), deps));

    // SIGINT / SIGTERM → stop()
    let signal_monitor = Arc::clone(&monitor);
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_monitor.stop();
    });

    match monitor.start().await {
        Ok(RunOutcome::Completed(report)) => {
            tracing::info!(
                cycles = report.cycles,
                delivered = report.delivered,
                failed = report.failed,
                "Shutdown complete"
            );
            Ok(())
        }
        Ok(RunOutcome::AlreadyStarted(_)) => Ok(()),
        Err(e) => {
            tracing::error!(error = %e, "Monitor failed to start");
            // Returning (not exiting) lets the log guard flush the file writer.
            Err(e).context("Monitor failed to start")
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received terminate signal, shutting down"),
    }
}
