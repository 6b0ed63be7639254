use crate::agents::Context;
use crate::sample::{log_measurement, Sample};
use crate::session::DeviceSession;
use crate::shutdown::Shutdown;
use chrono::Local;
use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};

/// Period-aligned time slots, keyed by slot end in milliseconds since the epoch.
/// A slot covers `[end - period, end)` and keeps only the latest sample.
#[derive(Debug)]
pub struct Slots {
    period_ms: i64,
    by_end: BTreeMap<i64, Sample>,
    /// Every slot ending at or before this has been flushed and stays closed
    flushed_until: i64,
}

impl Slots {
    pub fn new(period: Duration) -> Self {
        Self {
            period_ms: (period.as_millis() as i64).max(1),
            by_end: BTreeMap::new(),
            flushed_until: i64::MIN,
        }
    }

    pub fn slot_end(&self, timestamp_ms: i64) -> i64 {
        timestamp_ms.div_euclid(self.period_ms) * self.period_ms + self.period_ms
    }

    /// First boundary strictly after `now_ms`
    pub fn next_boundary(&self, now_ms: i64) -> i64 {
        self.slot_end(now_ms)
    }

    /// Returns `false` if the sample's slot was already flushed
    pub fn offer(&mut self, sample: Sample) -> bool {
        let end = self.slot_end(sample.timestamp.timestamp_millis());
        if end <= self.flushed_until {
            return false;
        }
        self.by_end.insert(end, sample);
        true
    }

    /// Closes every slot ending at or before `boundary` and returns the samples
    /// that `is_current` accepts, oldest slot first.
    pub fn flush(&mut self, boundary: i64, is_current: impl Fn(u64) -> bool) -> Vec<Sample> {
        let pending = self.by_end.split_off(&boundary.saturating_add(1));
        let due = mem::replace(&mut self.by_end, pending);
        self.flushed_until = self.flushed_until.max(boundary);

        due.into_values()
            .filter(|sample| is_current(sample.generation))
            .collect()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.by_end.is_empty()
    }
}

/// Single-slot mailbox into the aggregator. A sample that wasn't picked up yet is
/// replaced by the next one, only the newest unconsumed sample survives.
#[derive(Debug, Clone)]
pub struct AggregatorHandle {
    sender: Arc<watch::Sender<Option<Sample>>>,
}

impl AggregatorHandle {
    pub fn offer(&self, sample: Sample) {
        self.sender.send_replace(Some(sample));
    }
}

/// `emit` gets one sample per flushed slot, oldest first
async fn aggregator_loop(
    mut slots: Slots,
    session: Arc<DeviceSession>,
    mut mailbox: watch::Receiver<Option<Sample>>,
    shutdown: Shutdown,
    emit: impl Fn(&Sample),
) {
    let mut last_boundary = i64::MIN;

    loop {
        // always recomputed from the wall clock, so a late wakeup doesn't accumulate
        let now_ms = Local::now().timestamp_millis();
        let boundary = slots
            .next_boundary(now_ms)
            .max(last_boundary.saturating_add(slots.period_ms));
        let wait = Duration::from_millis((boundary - now_ms).max(0) as u64);
        let deadline = sleep_until(Instant::now() + wait);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                changed = mailbox.changed() => {
                    if changed.is_err() {
                        tracing::info!("Sample mailbox is dropped, aggregator exiting");
                        return;
                    }
                    let latest = *mailbox.borrow_and_update();
                    if let Some(sample) = latest {
                        if session.is_current(sample.generation) && !slots.offer(sample) {
                            tracing::debug!("Dropping a late sample from {}", sample.timestamp);
                        }
                    }
                },
                _ = &mut deadline => {
                    for sample in slots.flush(boundary, |g| session.is_current(g)) {
                        emit(&sample);
                    }
                    last_boundary = boundary;
                    break;
                }
            }
        }
    }
}

pub fn start(agent_set: &mut JoinSet<()>, ctx: &Context) -> AggregatorHandle {
    let (sender, receiver) = watch::channel(None);
    let slots = Slots::new(ctx.config.period);

    agent_set.spawn(aggregator_loop(
        slots,
        ctx.session.clone(),
        receiver,
        ctx.shutdown.clone(),
        |sample: &Sample| log_measurement(&sample.reading),
    ));

    AggregatorHandle {
        sender: Arc::new(sender),
    }
}
