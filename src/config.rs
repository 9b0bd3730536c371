//! Configuration management for the alert service
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to layer built-in defaults, an optional TOML file, `VISION_`
//! prefixed environment variables, the flat environment names the service
//! has always been deployed with, and finally command-line flags.

use crate::cli::Cli;
use crate::recipients::RecipientSet;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    value::{Dict, Map, Value},
    Error, Figment, Metadata, Profile, Provider,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// Deployment label reported by the status endpoints (e.g. "production").
    pub mode: String,
    /// Human-readable system name used in status replies and lifecycle alerts.
    pub system_name: String,
    /// Comma-separated admin recipient list for the email channel.
    #[serde(default)]
    pub admin_emails: Option<String>,
    /// Configuration for the HTTP listener.
    pub server: ServerConfig,
    /// Configuration for the email channel.
    pub smtp: SmtpConfig,
    /// Configuration for the WhatsApp channel.
    pub whatsapp: WhatsAppConfig,
    /// Configuration for the upstream handshake.
    pub proxy: ProxyConfig,
    /// Configuration for alert routing and timeouts.
    pub dispatch: DispatchConfig,
    /// Configuration for the Prometheus exporter.
    pub metrics: MetricsConfig,
    /// Configuration for the `/vision` scan endpoints.
    pub vision: VisionConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// SMTP connection parameters.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SmtpConfig {
    /// SMTP relay host. The email channel is unconfigured without it.
    #[serde(default)]
    pub host: Option<String>,
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Use implicit TLS instead of opportunistic STARTTLS.
    pub secure: bool,
    /// Sender identity, e.g. `Vision System <alerts@vision.local>`.
    pub from: String,
}

/// WhatsApp messaging API parameters.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WhatsAppConfig {
    pub api_url: String,
    /// Bearer token. The WhatsApp channel is unconfigured without it.
    #[serde(default)]
    pub token: Option<String>,
    /// Target phone number.
    pub to: String,
}

/// Upstream proxy used by the `/sync` handshake.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProxyConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub security_key: Option<String>,
    /// Header carrying the shared security key.
    pub security_header: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DispatchConfig {
    /// Subject keywords that escalate an alert to every channel.
    pub keywords: Vec<String>,
    /// Upper bound for a single channel attempt, in milliseconds.
    pub channel_timeout_ms: u64,
    /// Upper bound for the shutdown/crash alert, in milliseconds.
    pub shutdown_grace_ms: u64,
}

impl DispatchConfig {
    pub fn channel_timeout(&self) -> Duration {
        Duration::from_millis(self.channel_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder and serve `/metrics`.
    pub enabled: bool,
}

/// Settings for the `/vision/scan` request log and `/vision/status`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct VisionConfig {
    /// File that receives one JSON line per scan request.
    pub scan_log: PathBuf,
    /// Name reported by `/vision/status`.
    pub status_system: String,
}

impl Config {
    /// Loads the application configuration from all sources.
    pub fn load(cli: &Cli) -> Result<Self> {
        let config = Self::figment(cli, EnvOverrides::from_env()).extract()?;
        Ok(config)
    }

    /// Builds the layered figment without extracting it.
    pub fn figment(cli: &Cli, env: EnvOverrides) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if let Some(path) = &cli.config {
            figment = figment.merge(Toml::file(path));
        }
        figment
            // Nested overrides, e.g. VISION_SMTP__PORT=2525
            .merge(Env::prefixed("VISION_").split("__"))
            .merge(env)
            .merge(cli.clone())
    }

    /// Resolves the configured admin recipients.
    pub fn recipients(&self) -> RecipientSet {
        RecipientSet::parse(self.admin_emails.as_deref())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            mode: "production".to_string(),
            system_name: "Vision System".to_string(),
            admin_emails: None,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 9000,
            },
            smtp: SmtpConfig {
                host: None,
                port: 587,
                user: None,
                password: None,
                secure: false,
                from: "Vision System <alerts@vision.local>".to_string(),
            },
            whatsapp: WhatsAppConfig {
                api_url: "https://graph.facebook.com/v18.0/me/messages".to_string(),
                token: None,
                to: "+15550100000".to_string(),
            },
            proxy: ProxyConfig {
                url: None,
                security_key: None,
                security_header: "x-security-key".to_string(),
            },
            dispatch: DispatchConfig {
                keywords: vec![
                    "shutdown".to_string(),
                    "error".to_string(),
                    "crash".to_string(),
                ],
                channel_timeout_ms: 10_000,
                shutdown_grace_ms: 5_000,
            },
            metrics: MetricsConfig::default(),
            vision: VisionConfig {
                scan_log: PathBuf::from("vision_log.txt"),
                status_system: "Vino Auto BenchLab".to_string(),
            },
        }
    }
}

/// Maps the flat deployment variables (`SMTP_HOST`, `ADMIN_EMAILS`, ...)
/// onto their configuration paths.
///
/// Values are kept as strings unless the target is numeric or boolean, so
/// tokens and phone numbers are never reinterpreted as numbers.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    vars: Vec<(String, String)>,
}

impl EnvOverrides {
    /// Captures the current process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    fn values(&self) -> Result<Vec<(&'static str, Value)>, Error> {
        let mut values = Vec::new();
        for (name, raw) in &self.vars {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let entry = match name.as_str() {
                "PORT" => ("server.port", Value::from(parse_port(name, raw)?)),
                "SMTP_HOST" => ("smtp.host", Value::from(raw)),
                "SMTP_PORT" => ("smtp.port", Value::from(parse_port(name, raw)?)),
                "SMTP_USER" => ("smtp.user", Value::from(raw)),
                "SMTP_PASS" => ("smtp.password", Value::from(raw)),
                "SMTP_SECURE" => ("smtp.secure", Value::from(parse_flag(raw))),
                "MAIL_FROM" => ("smtp.from", Value::from(raw)),
                "ADMIN_EMAILS" => ("admin_emails", Value::from(raw)),
                "WHATSAPP_API_URL" => ("whatsapp.api_url", Value::from(raw)),
                "WHATSAPP_TOKEN" => ("whatsapp.token", Value::from(raw)),
                "WHATSAPP_TO" => ("whatsapp.to", Value::from(raw)),
                "PROXY_URL" => ("proxy.url", Value::from(raw)),
                "SECURITY_KEY" => ("proxy.security_key", Value::from(raw)),
                "MODE" => ("mode", Value::from(raw)),
                "SCAN_LOG_FILE" => ("vision.scan_log", Value::from(raw)),
                _ => continue,
            };
            values.push(entry);
        }
        Ok(values)
    }
}

fn parse_port(name: &str, raw: &str) -> Result<u16, Error> {
    raw.parse::<u16>()
        .map_err(|e| Error::from(format!("{} must be a port number, got {:?}: {}", name, raw, e)))
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

impl Provider for EnvOverrides {
    fn metadata(&self) -> Metadata {
        Metadata::named("Environment Variables")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut figment = Figment::new();
        for (path, value) in self.values()? {
            figment = figment.merge(Serialized::default(path, value));
        }
        figment.data()
    }
}
