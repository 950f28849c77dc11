//! Reconnect pacing shared by the RCON and mission-control channels.

use std::time::Duration;

use tokio::sync::watch;
use tracing::warn;

use crate::shutdown;

/// Fixed pause between reconnect attempts. Attempts never run out; only
/// shutdown ends a retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(3))
    }
}

impl ReconnectPolicy {
    pub const fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

/// Retry `connect` until it succeeds or shutdown is requested. `None` means
/// shutdown won.
pub async fn retry<T, E, F, Fut>(
    policy: &ReconnectPolicy,
    what: &'static str,
    shutdown: &mut watch::Receiver<bool>,
    mut connect: F,
) -> Option<T>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 0;
    loop {
        if shutdown::is_requested(shutdown) {
            return None;
        }
        match connect().await {
            Ok(value) => return Some(value),
            Err(e) => {
                warn!(
                    error = %e,
                    attempt,
                    delay_ms = policy.delay.as_millis(),
                    channel = what,
                    "Reconnecting"
                );
                if shutdown::sleep_or_cancelled(policy.delay, shutdown).await {
                    return None;
                }
                attempt = attempt.saturating_add(1);
            }
        }
    }
}
