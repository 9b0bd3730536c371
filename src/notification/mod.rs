//! Channel senders for delivering alerts.
//!
//! Each sender owns its channel configuration and reports success or
//! failure independently. Failures are channel-local values, never process
//! faults: the dispatcher records them and moves on to the next channel.
pub mod email;
pub mod whatsapp;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use email::{EmailSender, MailTransport, OutgoingMail, SmtpMailTransport};
pub use whatsapp::WhatsAppSender;

use crate::core::FailureKind;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel cannot run; detected before any network call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The channel's network call failed.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ChannelError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ChannelError::Configuration(_) => FailureKind::Configuration,
            ChannelError::Transport(_) => FailureKind::Transport,
        }
    }
}
