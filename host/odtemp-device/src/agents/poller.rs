use crate::agents::Context;
use crate::presentation::Presenter;
use crate::sample::LiveCache;
use crate::session::DeviceSession;
use crate::shutdown::Shutdown;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time;
use tokio::time::MissedTickBehavior;

async fn poller_loop(
    presenter: Arc<dyn Presenter>,
    session: Arc<DeviceSession>,
    live: Arc<LiveCache>,
    period: Duration,
    shutdown: Shutdown,
) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                // lock-free check, the handle lock can be held by a blocking read
                if !session.is_alive() {
                    continue;
                }
                if let Some(reading) = live.snapshot() {
                    presenter.on_measurement(
                        reading.temperature,
                        reading.humidity.unwrap_or_default(),
                        reading.humidity_present(),
                    );
                }
            }
        }
    }
}

pub fn start(
    agent_set: &mut JoinSet<()>,
    ctx: &Context,
    presenter: Arc<dyn Presenter>,
    live: Arc<LiveCache>,
) {
    agent_set.spawn(poller_loop(
        presenter,
        ctx.session.clone(),
        live,
        ctx.config.poll_interval,
        ctx.shutdown.clone(),
    ));
}
