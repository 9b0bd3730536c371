use log::{debug, info};
use std::time::Instant;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Periodically logs that the service is alive, with its uptime.
///
/// Mirrors what `GET /heartbeat` reports, so liveness can be followed in the
/// logs even when nothing polls the endpoint. Returns once the shutdown
/// signal changes.
pub async fn run_heartbeat(
    task_name: &'static str,
    period: Duration,
    started_at: Instant,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!("[Heartbeat] '{}' started.", task_name);
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                debug!("[Heartbeat] '{}' received shutdown. Exiting.", task_name);
                break;
            }
            _ = timer.tick() => {
                info!(
                    "[Heartbeat] '{}' is alive, uptime {}s.",
                    task_name,
                    started_at.elapsed().as_secs()
                );
            }
        }
    }
}
