//! Core domain types and service traits for the alert service
//!
//! This module defines the fundamental data structures and trait contracts
//! that govern how alerts travel from an inbound request to the individual
//! notification channels.

use crate::notification::ChannelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An alert to be fanned out to the notification channels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AlertRequest {
    /// Short subject line, also used for severity classification
    pub subject: String,
    /// Free-form alert body, delivered verbatim by email
    pub body: String,
}

impl AlertRequest {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// The alert emitted when the process is asked to terminate.
    pub fn shutdown(system_name: &str, detail: &str) -> Self {
        Self::new(format!("{} shutting down", system_name), detail)
    }

    /// The alert emitted when the process hits an unrecoverable fault.
    pub fn crash(system_name: &str, description: &str) -> Self {
        Self::new(
            format!("{} crash detected", system_name),
            format!("Unrecoverable fault: {}", description),
        )
    }
}

/// A delivery mechanism for an alert.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    WhatsApp,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::WhatsApp => "whatsapp",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How urgently an alert needs to reach an operator.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Routine,
    Critical,
}

/// Why a channel attempt failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// The channel could not run at all (missing credentials, recipients, ...)
    Configuration,
    /// The underlying network call failed
    Transport,
}

/// A successful delivery, optionally carrying the transport's identifier.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Delivery {
    pub receipt: Option<String>,
}

/// The result of one channel attempt for one alert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub channel: Channel,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
}

impl DispatchOutcome {
    pub fn delivered(channel: Channel, delivery: Delivery) -> Self {
        Self {
            channel,
            delivered: true,
            error_kind: None,
            error_detail: None,
            receipt: delivery.receipt,
        }
    }

    pub fn failed(channel: Channel, error: &ChannelError) -> Self {
        Self {
            channel,
            delivered: false,
            error_kind: Some(error.kind()),
            error_detail: Some(error.to_string()),
            receipt: None,
        }
    }
}

/// The aggregated result of dispatching one alert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertResult {
    /// True iff every attempted channel delivered
    pub overall_success: bool,
    pub outcomes: Vec<DispatchOutcome>,
}

impl AlertResult {
    pub fn from_outcomes(outcomes: Vec<DispatchOutcome>) -> Self {
        Self {
            overall_success: outcomes.iter().all(|o| o.delivered),
            outcomes,
        }
    }

    /// Returns the outcome recorded for `channel`, if it was attempted.
    pub fn outcome(&self, channel: Channel) -> Option<&DispatchOutcome> {
        self.outcomes.iter().find(|o| o.channel == channel)
    }

    pub fn failed_channels(&self) -> Vec<Channel> {
        self.outcomes
            .iter()
            .filter(|o| !o.delivered)
            .map(|o| o.channel)
            .collect()
    }
}

// =============================================================================
// Service Traits
// =============================================================================

/// Delivers alerts over a single transport.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// The channel this sender delivers on.
    fn channel(&self) -> Channel;

    /// Attempts delivery of an alert.
    ///
    /// # Returns
    /// * `Ok(Delivery)` once the transport accepted the message
    /// * `Err(ChannelError::Configuration)` if the sender cannot run, detected
    ///   before any network call
    /// * `Err(ChannelError::Transport)` if the network call itself failed
    async fn send(&self, request: &AlertRequest) -> Result<Delivery, ChannelError>;
}

/// Decides which channels an alert is routed to.
pub trait RoutingPolicy: Send + Sync {
    /// Classifies an alert.
    fn severity(&self, request: &AlertRequest) -> Severity;

    /// The channels to attempt for a severity, in attempt order.
    fn channels(&self, severity: Severity) -> Vec<Channel>;

    fn route(&self, request: &AlertRequest) -> Vec<Channel> {
        self.channels(self.severity(request))
    }
}
