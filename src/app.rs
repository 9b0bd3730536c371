//! The main application logic, decoupled from the entry point.

use crate::{
    config::Config,
    core::{Channel, ChannelSender, RoutingPolicy},
    dispatcher::{Dispatcher, KeywordPolicy},
    internal_metrics::MetricsBuilder,
    notification::{EmailSender, MailTransport, SmtpMailTransport, WhatsAppSender},
    server::{router, ServerState},
    task_manager::TaskManager,
    utils::heartbeat::run_heartbeat,
};
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, instrument};

/// A handle to the running application.
pub struct App {
    task_manager: TaskManager,
    local_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// The address the HTTP listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The dispatcher shared by the HTTP surface and the lifecycle hooks.
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    /// Waits for the shutdown signal and then gracefully shuts down all tasks.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.task_manager.get_shutdown_rx();
        shutdown_rx.changed().await.ok();
        info!("Shutdown signal received. Waiting for tasks to complete...");

        let panicked = self.task_manager.shutdown().await;
        if !panicked.is_empty() {
            anyhow::bail!("tasks failed during shutdown: {:?}", panicked);
        }
        Ok(())
    }
}

/// Builder for the main application.
///
/// Separates constructing the application's components from running them,
/// and lets tests swap out transports and senders.
pub struct AppBuilder {
    config: Config,
    mail_transport_override: Option<Arc<dyn MailTransport>>,
    sender_overrides: Vec<Arc<dyn ChannelSender>>,
    policy_override: Option<Arc<dyn RoutingPolicy>>,
    listen_addr_override: Option<SocketAddr>,
    heartbeat_period: Duration,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            mail_transport_override: None,
            sender_overrides: Vec::new(),
            policy_override: None,
            listen_addr_override: None,
            heartbeat_period: Duration::from_secs(60),
        }
    }

    /// Replaces the SMTP transport used by the email channel.
    pub fn mail_transport_override(mut self, transport: Arc<dyn MailTransport>) -> Self {
        self.mail_transport_override = Some(transport);
        self
    }

    /// Replaces the sender for the override's channel.
    pub fn sender_override(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        self.sender_overrides.push(sender);
        self
    }

    /// Replaces the keyword routing policy.
    pub fn policy_override(mut self, policy: Arc<dyn RoutingPolicy>) -> Self {
        self.policy_override = Some(policy);
        self
    }

    /// Binds the listener to `addr` instead of the configured host and port.
    pub fn listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr_override = Some(addr);
        self
    }

    pub fn heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat_period = period;
        self
    }

    /// Builds and starts all application components, returning a runnable `App`.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        let task_manager = TaskManager::new(shutdown_rx);
        let started_at = Instant::now();

        // =========================================================================
        // 1. Initialize Metrics
        // =========================================================================
        let (metrics, metrics_handle) = MetricsBuilder::new(config.metrics.clone()).build();
        let metrics = Arc::new(metrics);

        // =========================================================================
        // 2. Channel Senders
        // =========================================================================
        let channel_timeout = config.dispatch.channel_timeout();
        let recipients = config.recipients();
        if recipients.is_empty() {
            error!("No admin recipients configured; email alerts will fail.");
        }

        let mail_transport = match self.mail_transport_override {
            Some(transport) => Some(transport),
            None => SmtpMailTransport::from_config(&config.smtp, channel_timeout)?
                .map(|t| Arc::new(t) as Arc<dyn MailTransport>),
        };
        let mut senders: Vec<Arc<dyn ChannelSender>> = vec![
            Arc::new(EmailSender::new(
                config.smtp.from.clone(),
                recipients.clone(),
                mail_transport,
            )),
            Arc::new(WhatsAppSender::new(&config.whatsapp, channel_timeout)?),
        ];
        for sender in self.sender_overrides {
            let channel = sender.channel();
            senders.retain(|s| s.channel() != channel);
            senders.push(sender);
        }
        senders.sort_by_key(|s| match s.channel() {
            Channel::Email => 0,
            Channel::WhatsApp => 1,
        });

        // =========================================================================
        // 3. Dispatcher
        // =========================================================================
        let policy = self
            .policy_override
            .unwrap_or_else(|| {
                Arc::new(KeywordPolicy::new(&config.dispatch.keywords)) as Arc<dyn RoutingPolicy>
            });
        let dispatcher = Arc::new(Dispatcher::new(
            senders,
            policy,
            channel_timeout,
            metrics.clone(),
        ));

        // =========================================================================
        // 4. HTTP Server
        // =========================================================================
        let listener = match self.listen_addr_override {
            Some(addr) => TcpListener::bind(addr).await?,
            None => TcpListener::bind((config.server.host.as_str(), config.server.port)).await?,
        };
        let local_addr = listener.local_addr()?;
        debug!(%local_addr, "HTTP listener bound");

        let state = Arc::new(ServerState {
            dispatcher: dispatcher.clone(),
            system_name: config.system_name.clone(),
            mode: config.mode.clone(),
            recipients,
            proxy: config.proxy.clone(),
            http: reqwest::Client::builder().timeout(channel_timeout).build()?,
            started_at,
            metrics_handle,
            vision: config.vision.clone(),
            scan_log_lock: Mutex::new(()),
        });
        let app = router(state);

        let mut server_shutdown_rx = task_manager.get_shutdown_rx();
        task_manager.spawn("HttpServer", async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    server_shutdown_rx.changed().await.ok();
                })
                .await;
            if let Err(e) = result {
                error!("HTTP server error: {}", e);
            }
            info!("HTTP server stopped.");
        });

        task_manager.spawn(
            "Heartbeat",
            run_heartbeat(
                "HttpServer",
                self.heartbeat_period,
                started_at,
                task_manager.get_shutdown_rx(),
            ),
        );

        info!(%local_addr, "{} listening.", config.system_name);

        Ok(App {
            task_manager,
            local_addr,
            dispatcher,
        })
    }
}
