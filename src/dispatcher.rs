//! Routes alerts to their channels and aggregates the per-channel outcomes.

use crate::core::{
    AlertRequest, AlertResult, Channel, ChannelSender, DispatchOutcome, RoutingPolicy, Severity,
};
use crate::internal_metrics::Metrics;
use crate::notification::ChannelError;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The request was malformed; no channel was attempted.
    #[error("invalid alert request: {0}")]
    Validation(String),
}

/// Escalates alerts whose subject mentions one of a set of keywords.
///
/// Routine alerts go to email only; critical alerts also page over WhatsApp.
#[derive(Debug, Clone)]
pub struct KeywordPolicy {
    keywords: Vec<String>,
}

impl KeywordPolicy {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }
}

impl Default for KeywordPolicy {
    fn default() -> Self {
        Self::new(["shutdown", "error", "crash"])
    }
}

impl RoutingPolicy for KeywordPolicy {
    fn severity(&self, request: &AlertRequest) -> Severity {
        let subject = request.subject.to_lowercase();
        if self.keywords.iter().any(|k| subject.contains(k.as_str())) {
            Severity::Critical
        } else {
            Severity::Routine
        }
    }

    fn channels(&self, severity: Severity) -> Vec<Channel> {
        match severity {
            Severity::Routine => vec![Channel::Email],
            Severity::Critical => vec![Channel::Email, Channel::WhatsApp],
        }
    }
}

/// Fans an alert out to every channel its policy selects.
pub struct Dispatcher {
    senders: Vec<Arc<dyn ChannelSender>>,
    policy: Arc<dyn RoutingPolicy>,
    channel_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(
        senders: Vec<Arc<dyn ChannelSender>>,
        policy: Arc<dyn RoutingPolicy>,
        channel_timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            senders,
            policy,
            channel_timeout,
            metrics,
        }
    }

    /// Returns the registered sender for `channel`.
    pub fn sender(&self, channel: Channel) -> Option<Arc<dyn ChannelSender>> {
        self.senders.iter().find(|s| s.channel() == channel).cloned()
    }

    /// Dispatches an alert.
    ///
    /// Channel failures are recorded in the returned `AlertResult`; only an
    /// invalid request produces an error, and then no channel is attempted.
    /// Every attempted channel runs to completion before this returns.
    #[instrument(skip_all, fields(subject = %request.subject))]
    pub async fn dispatch(&self, request: &AlertRequest) -> Result<AlertResult, DispatchError> {
        if let Err(e) = validate(request) {
            self.metrics.alerts_rejected_total.increment(1);
            return Err(e);
        }
        self.metrics.alerts_received_total.increment(1);

        let severity = self.policy.severity(request);
        let channels = self.policy.channels(severity);
        debug!(?severity, ?channels, "Routing alert");

        let outcomes = join_all(
            channels
                .into_iter()
                .map(|channel| self.attempt(channel, request)),
        )
        .await;

        let result = AlertResult::from_outcomes(outcomes);
        if result.overall_success {
            info!(channels = result.outcomes.len(), "Alert delivered on all channels");
        } else {
            warn!(failed = ?result.failed_channels(), "Alert delivery incomplete");
        }
        Ok(result)
    }

    async fn attempt(&self, channel: Channel, request: &AlertRequest) -> DispatchOutcome {
        let outcome = match self.sender(channel) {
            None => DispatchOutcome::failed(
                channel,
                &ChannelError::Configuration(format!("no sender registered for {}", channel)),
            ),
            Some(sender) => {
                match tokio::time::timeout(self.channel_timeout, sender.send(request)).await {
                    Ok(Ok(delivery)) => DispatchOutcome::delivered(channel, delivery),
                    Ok(Err(e)) => DispatchOutcome::failed(channel, &e),
                    Err(_) => DispatchOutcome::failed(
                        channel,
                        &ChannelError::Transport(format!(
                            "{} delivery timed out after {:?}",
                            channel, self.channel_timeout
                        )),
                    ),
                }
            }
        };

        match &outcome.error_detail {
            None => debug!(%channel, "Channel delivered"),
            Some(detail) => warn!(%channel, error = %detail, "Channel failed"),
        }
        self.metrics.record_delivery(channel, outcome.delivered);
        outcome
    }
}

fn validate(request: &AlertRequest) -> Result<(), DispatchError> {
    if request.subject.trim().is_empty() {
        return Err(DispatchError::Validation("subject is required".to_string()));
    }
    if request.body.trim().is_empty() {
        return Err(DispatchError::Validation("body is required".to_string()));
    }
    Ok(())
}
