//! Best-effort alerts on process shutdown and crash.
//!
//! Both hooks bound their delivery attempt by a grace period and swallow
//! every failure: the process must always reach its intended exit status.

use crate::core::{AlertRequest, AlertResult, ChannelSender, DispatchOutcome};
use crate::dispatcher::Dispatcher;
use std::any::Any;
use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Where a lifecycle alert is delivered.
enum Route {
    /// Full dispatch: email plus keyword-gated WhatsApp.
    Dispatcher(Arc<Dispatcher>),
    /// A single sender, bypassing routing.
    Direct(Arc<dyn ChannelSender>),
}

/// Emits an alert when the process is about to terminate.
pub struct LifecycleHook {
    system_name: String,
    route: Route,
    grace: Duration,
}

impl LifecycleHook {
    /// A hook that routes lifecycle alerts through the full dispatcher.
    pub fn new(system_name: impl Into<String>, dispatcher: Arc<Dispatcher>, grace: Duration) -> Self {
        Self {
            system_name: system_name.into(),
            route: Route::Dispatcher(dispatcher),
            grace,
        }
    }

    /// A hook that can only reach the WhatsApp channel directly.
    pub fn whatsapp_only(
        system_name: impl Into<String>,
        sender: Arc<dyn ChannelSender>,
        grace: Duration,
    ) -> Self {
        Self {
            system_name: system_name.into(),
            route: Route::Direct(sender),
            grace,
        }
    }

    /// Sends the shutdown alert. Never fails.
    pub async fn on_shutdown(&self, detail: &str) -> Option<AlertResult> {
        info!("Sending shutdown alert...");
        self.deliver(AlertRequest::shutdown(&self.system_name, detail))
            .await
    }

    /// Sends the crash alert with the fault description embedded. Never fails.
    pub async fn on_crash(&self, description: &str) -> Option<AlertResult> {
        error!(fault = %description, "Sending crash alert...");
        self.deliver(AlertRequest::crash(&self.system_name, description))
            .await
    }

    async fn deliver(&self, request: AlertRequest) -> Option<AlertResult> {
        let attempt = async {
            match &self.route {
                Route::Dispatcher(dispatcher) => {
                    dispatcher.dispatch(&request).await.map_err(|e| e.to_string())
                }
                Route::Direct(sender) => {
                    let outcome = match sender.send(&request).await {
                        Ok(delivery) => DispatchOutcome::delivered(sender.channel(), delivery),
                        Err(e) => DispatchOutcome::failed(sender.channel(), &e),
                    };
                    Ok(AlertResult::from_outcomes(vec![outcome]))
                }
            }
        };

        match tokio::time::timeout(self.grace, attempt).await {
            Ok(Ok(result)) => {
                if result.overall_success {
                    info!("Lifecycle alert delivered.");
                } else {
                    warn!(failed = ?result.failed_channels(), "Lifecycle alert partially failed.");
                }
                Some(result)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Lifecycle alert could not be sent.");
                None
            }
            Err(_) => {
                warn!(grace = ?self.grace, "Lifecycle alert abandoned after grace period.");
                None
            }
        }
    }
}

/// Resolves when the process receives Ctrl-C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C."),
        _ = terminate => info!("Received SIGTERM."),
    }
}

/// Lets exactly one panic report a crash.
#[derive(Debug, Default)]
struct CrashGuard(AtomicBool);

impl CrashGuard {
    /// True for the first caller only.
    fn claim(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

static CRASH_REPORTED: CrashGuard = CrashGuard(AtomicBool::new(false));

/// Installs a panic hook that reports the fault and exits with status 1.
///
/// The report runs on a dedicated thread with its own runtime, since the
/// panicking thread may be a runtime worker. It is bounded by the hook's
/// grace period. Only the first panic reports; any later one, including a
/// panic inside the report itself, exits immediately.
pub fn install_crash_hook(hook: Arc<LifecycleHook>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        previous(info);
        if !CRASH_REPORTED.claim() {
            std::process::exit(1);
        }
        let description = describe_panic(info.payload(), info.location());

        let hook = hook.clone();
        let reporter = std::thread::spawn(move || {
            match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => {
                    runtime.block_on(hook.on_crash(&description));
                }
                Err(e) => error!("Failed to start runtime for crash alert: {}", e),
            }
        });
        if reporter.join().is_err() {
            error!("Crash alert reporter panicked.");
        }
        std::process::exit(1);
    }));
}

fn describe_panic(payload: &(dyn Any + Send), location: Option<&Location<'_>>) -> String {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    match location {
        Some(location) => format!("{} at {}", message, location),
        None => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Channel, FailureKind};
    use crate::dispatcher::KeywordPolicy;
    use crate::internal_metrics::Metrics;
    use crate::notification::test_utils::RecordingSender;
    use crate::notification::ChannelError;

    fn dispatcher(email: &RecordingSender, whatsapp: &RecordingSender) -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(
            vec![Arc::new(email.clone()), Arc::new(whatsapp.clone())],
            Arc::new(KeywordPolicy::default()),
            Duration::from_secs(10),
            Arc::new(Metrics::new()),
        ))
    }

    #[tokio::test]
    async fn test_shutdown_alert_goes_through_dispatcher() {
        let email = RecordingSender::succeeding(Channel::Email);
        let whatsapp = RecordingSender::succeeding(Channel::WhatsApp);
        let hook = LifecycleHook::new(
            "Vision System",
            dispatcher(&email, &whatsapp),
            Duration::from_secs(1),
        );

        let result = hook.on_shutdown("SIGTERM received").await.unwrap();

        assert!(result.overall_success);
        let sent = email.requests();
        assert_eq!(sent[0].subject, "Vision System shutting down");
        assert_eq!(sent[0].body, "SIGTERM received");
        // Routine subject: the dispatcher path never pages WhatsApp on its own.
        assert_eq!(result.outcomes.len(), 1);
        assert_eq!(whatsapp.calls(), 0);
    }

    #[tokio::test]
    async fn test_dispatcher_hook_reports_validation_failure_without_sending() {
        let email = RecordingSender::succeeding(Channel::Email);
        let whatsapp = RecordingSender::succeeding(Channel::WhatsApp);
        let hook = LifecycleHook::new(
            "Vision System",
            dispatcher(&email, &whatsapp),
            Duration::from_secs(1),
        );

        assert!(hook.on_shutdown("   ").await.is_none());
        assert_eq!(email.calls(), 0);
        assert_eq!(whatsapp.calls(), 0);
    }

    #[tokio::test]
    async fn test_crash_alert_escalates_and_embeds_fault() {
        let email = RecordingSender::succeeding(Channel::Email);
        let whatsapp = RecordingSender::succeeding(Channel::WhatsApp);
        let hook = LifecycleHook::new(
            "Vision System",
            dispatcher(&email, &whatsapp),
            Duration::from_secs(1),
        );

        let result = hook.on_crash("index out of bounds").await.unwrap();

        assert_eq!(result.outcomes.len(), 2);
        assert!(whatsapp.requests()[0].body.contains("index out of bounds"));
    }

    #[tokio::test]
    async fn test_whatsapp_only_hook_sends_directly() {
        let whatsapp = RecordingSender::succeeding(Channel::WhatsApp);
        let hook = LifecycleHook::whatsapp_only(
            "Vision System",
            Arc::new(whatsapp.clone()),
            Duration::from_secs(1),
        );

        let result = hook.on_shutdown("bye").await.unwrap();

        assert_eq!(result.outcomes.len(), 1);
        assert_eq!(result.outcomes[0].channel, Channel::WhatsApp);
        assert_eq!(whatsapp.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_alert_is_tolerated() {
        let whatsapp = RecordingSender::failing(
            Channel::WhatsApp,
            ChannelError::Configuration("WhatsApp API token not configured".into()),
        );
        let hook = LifecycleHook::whatsapp_only(
            "Vision System",
            Arc::new(whatsapp),
            Duration::from_secs(1),
        );

        let result = hook.on_crash("boom").await.unwrap();

        assert!(!result.overall_success);
        assert_eq!(
            result.outcomes[0].error_kind,
            Some(FailureKind::Configuration)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_is_bounded_by_grace_period() {
        let whatsapp =
            RecordingSender::succeeding(Channel::WhatsApp).with_delay(Duration::from_secs(600));
        let hook = LifecycleHook::whatsapp_only(
            "Vision System",
            Arc::new(whatsapp.clone()),
            Duration::from_secs(2),
        );

        assert!(hook.on_shutdown("bye").await.is_none());
        assert_eq!(whatsapp.calls(), 1);
    }

    #[test]
    fn test_crash_guard_admits_one_reporter() {
        let guard = CrashGuard::default();
        assert!(guard.claim());
        assert!(!guard.claim());
        assert!(!guard.claim());
    }

    #[test]
    fn test_crash_guard_admits_one_reporter_across_threads() {
        let guard = Arc::new(CrashGuard::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                std::thread::spawn(move || guard.claim())
            })
            .collect();

        let claimed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|claimed| *claimed)
            .count();
        assert_eq!(claimed, 1);
    }

    #[test]
    fn test_describe_panic_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(describe_panic(payload.as_ref(), None), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bad state"));
        assert_eq!(describe_panic(payload.as_ref(), None), "bad state");

        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(describe_panic(payload.as_ref(), None), "unknown panic");
    }
}
