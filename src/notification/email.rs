//! The email channel, submitting alerts to an SMTP relay.

use crate::config::SmtpConfig;
use crate::core::{AlertRequest, Channel, ChannelSender, Delivery};
use crate::notification::ChannelError;
use crate::recipients::RecipientSet;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// A fully addressed message, ready for submission.
#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub from: Mailbox,
    pub to: Vec<Mailbox>,
    pub subject: String,
    pub body: String,
}

/// Submits a message to a mail server and returns its identifier.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn submit(&self, mail: OutgoingMail) -> anyhow::Result<String>;
}

/// A `MailTransport` backed by an asynchronous SMTP connection pool.
pub struct SmtpMailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailTransport {
    /// Builds the transport from config.
    ///
    /// Returns `Ok(None)` when no SMTP host is configured, which leaves the
    /// email channel unconfigured rather than failing startup.
    pub fn from_config(config: &SmtpConfig, timeout: Duration) -> anyhow::Result<Option<Self>> {
        let Some(host) = config.host.as_deref().filter(|h| !h.trim().is_empty()) else {
            return Ok(None);
        };

        let builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .tls(Tls::Opportunistic(TlsParameters::new(host.to_string())?))
        };

        let mut builder = builder.port(config.port).timeout(Some(timeout));
        if let (Some(user), Some(password)) = (&config.user, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Some(Self {
            transport: builder.build(),
        }))
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn submit(&self, mail: OutgoingMail) -> anyhow::Result<String> {
        let mut builder = Message::builder().from(mail.from);
        for to in mail.to {
            builder = builder.to(to);
        }
        let message = builder
            .subject(mail.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body)?;

        let response = self.transport.send(message).await?;
        Ok(response
            .message()
            .map(|line| line.to_string())
            .collect::<Vec<String>>()
            .join(" "))
    }
}

/// Sends alerts by email to every configured admin recipient.
pub struct EmailSender {
    from: String,
    recipients: RecipientSet,
    transport: Option<Arc<dyn MailTransport>>,
}

impl EmailSender {
    pub fn new(
        from: impl Into<String>,
        recipients: RecipientSet,
        transport: Option<Arc<dyn MailTransport>>,
    ) -> Self {
        Self {
            from: from.into(),
            recipients,
            transport,
        }
    }

    fn compose(&self, request: &AlertRequest) -> Result<OutgoingMail, ChannelError> {
        let from = self.from.parse::<Mailbox>().map_err(|e| {
            ChannelError::Configuration(format!("invalid sender address {:?}: {}", self.from, e))
        })?;
        let to = self
            .recipients
            .iter()
            .map(|address| {
                address.parse::<Mailbox>().map_err(|e| {
                    ChannelError::Configuration(format!(
                        "invalid recipient address {:?}: {}",
                        address, e
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(OutgoingMail {
            from,
            to,
            subject: request.subject.clone(),
            body: request.body.clone(),
        })
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    #[instrument(skip_all, fields(recipients = self.recipients.len()))]
    async fn send(&self, request: &AlertRequest) -> Result<Delivery, ChannelError> {
        if self.recipients.is_empty() {
            return Err(ChannelError::Configuration(
                "no admin recipients configured".to_string(),
            ));
        }
        let Some(transport) = &self.transport else {
            return Err(ChannelError::Configuration(
                "SMTP transport not configured".to_string(),
            ));
        };

        let mail = self.compose(request)?;
        let message_id = transport
            .submit(mail)
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;
        debug!(message_id = %message_id, "Email accepted by mail server");

        Ok(Delivery {
            receipt: Some(message_id),
        })
    }
}
