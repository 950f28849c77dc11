//! Cooperative shutdown signal shared by every loop.
//!
//! The supervisor owns a `watch::Sender<bool>`; loops hold receivers, check
//! [`is_requested`] once per iteration and race their waits against
//! [`cancelled`]. A dropped sender counts as a shutdown request.

use std::time::Duration;

use tokio::sync::watch;

/// Create a shutdown sender and its first receiver.
pub fn channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

pub fn is_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

/// Resolves once shutdown is requested.
pub async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|requested| *requested).await;
}

/// Sleep for `delay`; returns `true` if shutdown cut the sleep short.
pub async fn sleep_or_cancelled(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        () = tokio::time::sleep(delay) => false,
        () = cancelled(shutdown) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sleep_is_interrupted_by_shutdown() {
        let (tx, mut rx) = channel();
        let waiter = tokio::spawn(async move {
            sleep_or_cancelled(Duration::from_secs(60), &mut rx).await
        });
        let _ = tx.send(true);
        assert!(waiter.await.unwrap_or(false));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_without_shutdown() {
        let (_tx, mut rx) = channel();
        assert!(!sleep_or_cancelled(Duration::from_millis(10), &mut rx).await);
    }

    #[test]
    fn dropped_sender_counts_as_shutdown() {
        let (tx, rx) = channel();
        assert!(!is_requested(&rx));
        drop(tx);
        assert!(is_requested(&rx));
    }
}
