//! Test doubles for channel senders and mail transports.

use crate::core::{AlertRequest, Channel, ChannelSender, Delivery};
use crate::notification::{ChannelError, MailTransport, OutgoingMail};
use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

/// A `ChannelSender` that records every request and replies with a fixed result.
#[derive(Clone)]
pub struct RecordingSender {
    channel: Channel,
    result: Result<Delivery, ChannelError>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<AlertRequest>>>,
}

impl RecordingSender {
    /// A sender that always delivers.
    pub fn succeeding(channel: Channel) -> Self {
        Self::with_result(
            channel,
            Ok(Delivery {
                receipt: Some(format!("{}-receipt", channel)),
            }),
        )
    }

    /// A sender that always fails with `error`.
    pub fn failing(channel: Channel, error: ChannelError) -> Self {
        Self::with_result(channel, Err(error))
    }

    pub fn with_result(channel: Channel, result: Result<Delivery, ChannelError>) -> Self {
        Self {
            channel,
            result,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Makes every send wait for `delay` before replying.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<AlertRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelSender for RecordingSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, request: &AlertRequest) -> Result<Delivery, ChannelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.clone()
    }
}

/// An in-memory `MailTransport` that keeps every submitted message.
#[derive(Clone, Default)]
pub struct MemoryMailTransport {
    failure: Option<String>,
    sent: Arc<Mutex<Vec<OutgoingMail>>>,
    submissions: Arc<AtomicUsize>,
}

impl MemoryMailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose every submission fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailTransport for MemoryMailTransport {
    async fn submit(&self, mail: OutgoingMail) -> anyhow::Result<String> {
        let n = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(message) = &self.failure {
            anyhow::bail!("{}", message);
        }
        self.sent.lock().unwrap().push(mail);
        Ok(format!("queued-{}", n))
    }
}
