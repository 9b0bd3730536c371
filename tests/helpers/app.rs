#![allow(dead_code)]
//! Test helpers for running the full application instance.

use anyhow::Result;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle, time::timeout};
use vision_alert::{
    app::App,
    config::Config,
    core::ChannelSender,
    notification::test_utils::MemoryMailTransport,
};

/// A running instance of the application bound to an ephemeral port.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    pub mail: MemoryMailTransport,
    shutdown_tx: watch::Sender<bool>,
    app_handle: Option<JoinHandle<Result<()>>>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Shuts down the application and waits for it to terminate.
    /// Fails if the application does not shut down within the specified timeout.
    pub async fn shutdown(mut self, timeout_duration: Duration) -> Result<()> {
        self.shutdown_tx.send(true)?;

        if let Some(handle) = self.app_handle.take() {
            match timeout(timeout_duration, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(anyhow::anyhow!("App failed to shut down within the timeout")),
            }
        } else {
            Ok(())
        }
    }
}

/// A builder for creating `TestApp` instances with specific configurations.
pub struct TestAppBuilder {
    pub config: Config,
    mail: MemoryMailTransport,
    senders: Vec<Arc<dyn ChannelSender>>,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.admin_emails = Some("ops@example.com".to_string());
        // Nothing listens here; tests that need WhatsApp point it at a mock server.
        config.whatsapp.api_url = "http://127.0.0.1:9/messages".to_string();
        config.dispatch.channel_timeout_ms = 2_000;

        Self {
            config,
            mail: MemoryMailTransport::new(),
            senders: Vec::new(),
        }
    }

    pub fn with_config_modifier(mut self, modifier: impl FnOnce(&mut Config)) -> Self {
        modifier(&mut self.config);
        self
    }

    pub fn with_mail_transport(mut self, mail: MemoryMailTransport) -> Self {
        self.mail = mail;
        self
    }

    pub fn with_sender(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        self.senders.push(sender);
        self
    }

    pub async fn build(self) -> Result<TestApp> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut builder = App::builder(self.config)
            .mail_transport_override(Arc::new(self.mail.clone()))
            .listen_addr("127.0.0.1:0".parse()?);
        for sender in self.senders {
            builder = builder.sender_override(sender);
        }

        let app = builder.build(shutdown_rx).await?;
        let addr = app.local_addr();
        let app_handle = tokio::spawn(app.run());

        Ok(TestApp {
            addr,
            client: reqwest::Client::new(),
            mail: self.mail,
            shutdown_tx,
            app_handle: Some(app_handle),
        })
    }
}
