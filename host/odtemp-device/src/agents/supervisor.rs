use crate::agents::Context;
use crate::Error;
use tokio::sync::oneshot;
use tokio::task::{spawn_blocking, JoinSet};
use tokio::time::sleep;

async fn supervisor_loop(ctx: Context, found: oneshot::Sender<u64>) {
    let mut first_attempt = true;

    loop {
        let locator = ctx.locator.clone();
        let (vendor_id, product_id) = (ctx.config.vendor_id, ctx.config.product_id);
        let attempt = spawn_blocking(move || locator.open(vendor_id, product_id)).await;

        match attempt {
            Ok(Ok(handle)) => {
                if ctx.shutdown.is_triggered() {
                    // nobody is going to read it, dropping it closes it
                    return;
                }
                let generation = ctx.session.install(handle);
                tracing::info!("Sensor opened (connection #{generation})");
                // the reader may be gone already, there is nothing to do about it here
                let _ = found.send(generation);
                return;
            }
            Ok(Err(e)) => log_failure(&ctx, &e, first_attempt),
            Err(e) => tracing::error!("Sensor lookup task failed: {e}"),
        }
        first_attempt = false;

        tokio::select! {
            _ = ctx.shutdown.cancelled() => return,
            _ = sleep(ctx.config.backoff) => (),
        }
    }
}

fn log_failure(ctx: &Context, error: &Error, first_attempt: bool) {
    let backoff = ctx.config.backoff.as_secs_f64();
    if first_attempt {
        tracing::info!("{error}, waiting for the sensor to be connected");
    } else if ctx.config.quiet {
        tracing::debug!("{error}, retrying in {backoff:.1}s");
    } else {
        tracing::warn!("{error}, retrying in {backoff:.1}s");
    }
}

/// Spawns a fresh supervisor into `supervisors` that keeps trying to open the
/// sensor until it succeeds or the run is shut down. The receiver gets the
/// generation of the installed handle, or an error if the supervisor gave up
/// because of the shutdown.
pub fn start(supervisors: &mut JoinSet<()>, ctx: Context) -> oneshot::Receiver<u64> {
    let (sender, receiver) = oneshot::channel();

    supervisors.spawn(supervisor_loop(ctx, sender));

    receiver
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::ShutdownReason;
    use crate::testing::{test_context, MockLocator, MockTransport};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_installs_and_signals() {
        let locator = Arc::new(
            MockLocator::new(vec![MockTransport::new(vec![])]).failing_first(2),
        );
        let ctx = test_context(locator.clone());
        let mut supervisors = JoinSet::new();

        let generation = timeout(Duration::from_secs(5), start(&mut supervisors, ctx.clone()))
            .await
            .unwrap()
            .expect("supervisor must signal once the sensor is found");

        assert_eq!(generation, 1);
        assert!(ctx.session.is_current(1));
        assert_eq!(locator.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exits_on_shutdown_without_signal() {
        let locator = Arc::new(MockLocator::new(vec![]));
        let ctx = test_context(locator);
        let mut supervisors = JoinSet::new();

        let found = start(&mut supervisors, ctx.clone());
        ctx.shutdown.trigger(ShutdownReason::Interrupted);

        let result = timeout(Duration::from_secs(5), found).await.unwrap();
        assert!(result.is_err(), "a cancelled supervisor must not signal");
        assert!(!ctx.session.is_alive());
        assert!(
            timeout(Duration::from_secs(5), supervisors.join_next())
                .await
                .unwrap()
                .is_some_and(|r| r.is_ok()),
            "the supervisor task must end on its own"
        );
    }

    #[tokio::test]
    async fn test_restart_bumps_generation() {
        let locator = Arc::new(MockLocator::new(vec![
            MockTransport::new(vec![]),
            MockTransport::new(vec![]),
        ]));
        let ctx = test_context(locator);
        let mut supervisors = JoinSet::new();

        let first = start(&mut supervisors, ctx.clone()).await.unwrap();
        ctx.session.clear();
        let second = start(&mut supervisors, ctx.clone()).await.unwrap();

        assert!(second > first);
        assert!(ctx.session.is_current(second));
    }
}
