//! Vision alert relay
//!
//! An HTTP service that relays alerts to email and WhatsApp, and reports its
//! own shutdown or crash through the same channels.

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vision_alert::{
    app::App,
    cli::Cli,
    config::Config,
    lifecycle::{install_crash_hook, shutdown_signal, LifecycleHook},
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = Config::load(&cli).unwrap_or_else(|err| {
        eprintln!("Failed to load configuration: {}", err);
        std::process::exit(1);
    });

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("{} starting up...", config.system_name);

    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Mode: {}", config.mode);
    info!("Listen Address: {}:{}", config.server.host, config.server.port);
    info!(
        "SMTP Host: {}",
        config.smtp.host.as_deref().unwrap_or("Not configured")
    );
    info!("Admin Recipients: {}", config.recipients().len());
    info!(
        "WhatsApp Token: {}",
        if config.whatsapp.token.is_some() {
            "Configured"
        } else {
            "Not configured"
        }
    );
    info!(
        "Proxy URL: {}",
        config.proxy.url.as_deref().unwrap_or("Not configured")
    );
    info!("Escalation Keywords: {:?}", config.dispatch.keywords);
    info!("Channel Timeout: {}ms", config.dispatch.channel_timeout_ms);
    info!("Metrics: {}", if config.metrics.enabled { "Enabled" } else { "Disabled" });
    info!("-------------------------------------------------------");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = App::builder(config.clone()).build(shutdown_rx).await?;

    let hook = Arc::new(LifecycleHook::new(
        config.system_name.clone(),
        app.dispatcher(),
        config.dispatch.shutdown_grace(),
    ));
    install_crash_hook(hook.clone());

    let app_handle = tokio::spawn(app.run());

    shutdown_signal().await;
    info!("Shutdown signal received. Shutting down gracefully...");
    hook.on_shutdown(&format!(
        "Termination signal received at {}",
        Utc::now().to_rfc3339()
    ))
    .await;

    if shutdown_tx.send(true).is_err() {
        error!("Application already stopped before shutdown was signalled.");
    }
    match app_handle.await {
        Ok(Ok(())) => info!("All tasks shut down. Exiting."),
        Ok(Err(e)) => error!("Application shut down with errors: {}", e),
        Err(e) => error!("Application task panicked: {:?}", e),
    }

    Ok(())
}
