//! Vision alert relay
//!
//! This library accepts alert requests and fans them out to the configured
//! notification channels (email over SMTP, WhatsApp over an HTTP messaging
//! API), aggregating the per-channel outcomes into a single result.

pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod dispatcher;
pub mod internal_metrics;
pub mod lifecycle;
pub mod notification;
pub mod recipients;
pub mod server;
pub mod task_manager;
pub mod utils;

// Re-export core types for convenience
pub use crate::core::*;
