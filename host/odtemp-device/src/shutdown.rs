use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ShutdownReason {
    /// The presenter was closed by the user
    WindowClosed,
    Interrupted,
    /// The sensor failed or went silent and nobody is around to wait for it
    DeviceFailure,
    /// The sensor reset itself and nobody is around to wait for it
    DeviceReset,
    AgentExited,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShutdownReason::WindowClosed => "the window was closed",
            ShutdownReason::Interrupted => "interrupted",
            ShutdownReason::DeviceFailure => "the sensor stopped responding",
            ShutdownReason::DeviceReset => "the sensor is resetting",
            ShutdownReason::AgentExited => "an internal task exited unexpectedly",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Default)]
struct Inner {
    fired: AtomicBool,
    reason: OnceLock<ShutdownReason>,
    token: CancellationToken,
}

/// One-time broadcast shared by every task of a run. Any number of triggers may
/// race, only the first one is recorded.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

impl Shutdown {
    /// Returns `false` if the shutdown was already triggered
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        if self
            .inner
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        // the reason is set before anyone can observe the cancellation
        let _ = self.inner.reason.set(reason);
        tracing::info!("Shutting down: {reason}");
        self.inner.token.cancel();
        true
    }

    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.inner.reason.get().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_first_trigger_wins() {
        let shutdown = Shutdown::default();
        assert!(!shutdown.is_triggered());
        assert_eq!(shutdown.reason(), None);

        assert!(shutdown.trigger(ShutdownReason::WindowClosed));
        assert!(!shutdown.trigger(ShutdownReason::Interrupted));

        assert!(shutdown.is_triggered());
        assert_eq!(shutdown.reason(), Some(ShutdownReason::WindowClosed));
    }

    #[test]
    fn test_concurrent_triggers_fire_once() {
        let shutdown = Shutdown::default();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shutdown = shutdown.clone();
                thread::spawn(move || shutdown.trigger(ShutdownReason::DeviceFailure))
            })
            .collect();

        let fired = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&fired| fired)
            .count();
        assert_eq!(fired, 1, "exactly one trigger must win");
    }

    #[tokio::test]
    async fn test_cancelled_resolves_for_clones() {
        let shutdown = Shutdown::default();
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.cancelled().await })
        };

        shutdown.trigger(ShutdownReason::Interrupted);
        waiter.await.unwrap();
    }
}
