use crate::agents::aggregator::AggregatorHandle;
use crate::agents::{supervisor, Context};
use crate::hid::Transport;
use crate::presentation::Presenter;
use crate::sample::{log_measurement, LiveCache, Sample};
use crate::shutdown::ShutdownReason;
use crate::Error;
use chrono::Local;
use odtemp_shared::{
    parse_interval_feature_response, set_feature_interval, Reading, Report, ResetKind,
    COMMAND_REPORT_ID, FEATURE_REPORT_SIZE, MAX_REPORT_SIZE,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::{spawn_blocking, JoinError, JoinSet};
use tokio::time::sleep;

// how long to wait for someone else to reinstall a handle that disappeared under us
const NO_DEVICE_DELAY: Duration = Duration::from_millis(100);

/// Countdown of consecutive empty reads
#[derive(Debug)]
pub struct Heartbeat {
    budget: u32,
    remaining: u32,
}

impl Heartbeat {
    pub fn new(budget: u32) -> Self {
        Self {
            budget,
            remaining: budget,
        }
    }

    pub fn reset(&mut self) {
        self.remaining = self.budget;
    }

    /// Returns `true` once the budget is exhausted
    pub fn miss(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining == 0
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Loss {
    /// I/O error
    Disconnected,
    /// Too many empty reads in a row
    ConnectionLost,
    /// The sensor announced its own reset
    DeviceReset,
}

#[derive(Debug, Eq, PartialEq)]
enum Step {
    Continue,
    Lost(Loss),
}

#[derive(Debug)]
enum ReadOutcome {
    Report(Vec<u8>),
    Empty,
    Failed(Error),
    /// The blocking read itself died, the handle state is unknown
    TaskFailed(JoinError),
    NoDevice,
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

/// Read-modify-write of the interval field, then a read back of what the device
/// actually accepted (it may clamp the value)
fn negotiate_interval(handle: &dyn Transport, interval_ms: u32) -> Result<u32, Error> {
    let mut buf = [0u8; FEATURE_REPORT_SIZE];
    buf[0] = COMMAND_REPORT_ID;
    handle.get_feature_report(&mut buf)?;

    set_feature_interval(&mut buf, interval_ms);
    handle.send_feature_report(&buf)?;

    let mut readback = [0u8; FEATURE_REPORT_SIZE];
    readback[0] = COMMAND_REPORT_ID;
    let len = handle.get_feature_report(&mut readback)?;
    parse_interval_feature_response(&readback[..len.min(FEATURE_REPORT_SIZE)])
        .ok_or(Error::ShortFeatureReport(len))
}

pub struct Reader {
    ctx: Context,
    presenter: Option<Arc<dyn Presenter>>,
    live: Arc<LiveCache>,
    aggregator: Option<AggregatorHandle>,
    heartbeat: Heartbeat,
    /// At most one supervisor is running, the reader joins it before moving on
    supervisors: JoinSet<()>,
}

impl Reader {
    pub fn new(
        ctx: Context,
        presenter: Option<Arc<dyn Presenter>>,
        live: Arc<LiveCache>,
        aggregator: Option<AggregatorHandle>,
    ) -> Self {
        let heartbeat = Heartbeat::new(ctx.config.heartbeat);
        Self {
            ctx,
            presenter,
            live,
            aggregator,
            heartbeat,
            supervisors: JoinSet::new(),
        }
    }

    async fn run(mut self) {
        let found = supervisor::start(&mut self.supervisors, self.ctx.clone());
        if self.await_connection(found).await {
            self.read_loop().await;
        }

        // a supervisor cancelled mid-search may still be finishing its open attempt
        while self.supervisors.join_next().await.is_some() {}

        tracing::info!("Telemetry reader exiting");
    }

    async fn read_loop(&mut self) {
        while !self.ctx.shutdown.is_triggered() {
            let step = match self.read_report().await {
                ReadOutcome::Report(report) => {
                    self.heartbeat.reset();
                    self.dispatch(&report)
                }
                ReadOutcome::Empty => {
                    if self.heartbeat.miss() {
                        tracing::warn!("The sensor is not responding, timeout exceeded");
                        Step::Lost(Loss::ConnectionLost)
                    } else {
                        Step::Continue
                    }
                }
                ReadOutcome::Failed(e) => {
                    tracing::error!("Read error: {e}");
                    Step::Lost(Loss::Disconnected)
                }
                ReadOutcome::TaskFailed(e) => {
                    tracing::error!("Read task failed: {e}");
                    Step::Lost(Loss::Disconnected)
                }
                ReadOutcome::NoDevice => {
                    tokio::select! {
                        _ = self.ctx.shutdown.cancelled() => (),
                        _ = sleep(NO_DEVICE_DELAY) => (),
                    }
                    Step::Continue
                }
            };

            if let Step::Lost(loss) = step {
                if !self.recover(loss).await {
                    break;
                }
            }
        }
    }

    /// Waits for the supervisor, then prepares the fresh connection. Returns `false`
    /// if the run is shutting down instead.
    async fn await_connection(&mut self, found: oneshot::Receiver<u64>) -> bool {
        let generation = tokio::select! {
            _ = self.ctx.shutdown.cancelled() => return false,
            found = found => match found {
                Ok(generation) => generation,
                // the supervisor only gives up on shutdown
                Err(_) => return false,
            },
        };
        // the supervisor returns right after signalling
        while self.supervisors.join_next().await.is_some() {}

        tracing::info!("Starting the read loop (connection #{generation})");

        tokio::select! {
            _ = self.ctx.shutdown.cancelled() => return false,
            _ = sleep(self.ctx.config.settle) => (),
        }

        if !self.ctx.config.aggregates() {
            self.set_sampling_interval().await;
        }

        self.heartbeat.reset();
        true
    }

    async fn set_sampling_interval(&self) {
        let interval_ms = self.ctx.config.sampling_interval_ms();
        let session = self.ctx.session.clone();
        let result = spawn_blocking(move || {
            session.with_handle(|handle| negotiate_interval(handle, interval_ms))
        })
        .await;

        match result {
            Ok(Some(Ok(accepted))) => {
                tracing::info!("Sampling interval: {accepted} ms (requested {interval_ms} ms)")
            }
            Ok(Some(Err(e))) => tracing::warn!("Couldn't set the sampling interval: {e}"),
            Ok(None) => tracing::debug!("The sensor went away before the interval was set"),
            Err(e) => tracing::error!("Sampling interval task failed: {e}"),
        }
    }

    async fn read_report(&self) -> ReadOutcome {
        let session = self.ctx.session.clone();
        let timeout = self.ctx.config.read_timeout;

        let result = spawn_blocking(move || {
            let mut buf = vec![0u8; MAX_REPORT_SIZE];
            match session.with_handle(|handle| handle.read_timeout(&mut buf, timeout)) {
                None => ReadOutcome::NoDevice,
                Some(Err(e)) => ReadOutcome::Failed(e),
                Some(Ok(0)) => ReadOutcome::Empty,
                Some(Ok(n)) => {
                    buf.truncate(n);
                    ReadOutcome::Report(buf)
                }
            }
        })
        .await;

        result.unwrap_or_else(ReadOutcome::TaskFailed)
    }

    fn dispatch(&self, bytes: &[u8]) -> Step {
        match Report::parse(bytes) {
            Ok(Report::Data(reading)) => self.handle_reading(reading),
            Ok(Report::Event) => (),
            Ok(Report::Firmware(Some(version))) => {
                tracing::info!("[FW] Firmware version: {version}")
            }
            Ok(Report::Firmware(None)) => {
                tracing::debug!("Firmware report with a mismatching length: {}", hex(bytes))
            }
            Ok(Report::Command { code, args }) => match ResetKind::try_from(code) {
                Ok(kind) => {
                    tracing::info!("The sensor is resetting ({kind:?}), closing it");
                    return Step::Lost(Loss::DeviceReset);
                }
                Err(_) => tracing::info!("Received command 0x{code:02X} with data: {}", hex(args)),
            },
            Ok(Report::Uuid(uuid)) => tracing::debug!("Sensor UUID report: {}", hex(uuid)),
            Ok(Report::Unknown(id)) => tracing::warn!("Unknown report id: {id}"),
            Err(e) => tracing::debug!("Skipping a report: {e}"),
        }

        Step::Continue
    }

    fn handle_reading(&self, reading: Reading) {
        self.live.update(reading);

        match &self.aggregator {
            Some(aggregator) => aggregator.offer(Sample {
                reading,
                timestamp: Local::now(),
                generation: self.ctx.session.generation(),
            }),
            // short periods log every sample as it comes
            None => log_measurement(&reading),
        }
    }

    /// Releases the sensor, then either waits for it to come back or ends the run
    /// if there is no presenter to report to. Returns `false` in the latter case.
    async fn recover(&mut self, loss: Loss) -> bool {
        self.ctx.session.clear();

        let Some(presenter) = &self.presenter else {
            let reason = match loss {
                Loss::DeviceReset => ShutdownReason::DeviceReset,
                Loss::Disconnected | Loss::ConnectionLost => ShutdownReason::DeviceFailure,
            };
            self.ctx.shutdown.trigger(reason);
            return false;
        };

        match loss {
            Loss::ConnectionLost => presenter.on_connection_lost(),
            Loss::Disconnected | Loss::DeviceReset => presenter.on_disconnected(),
        }

        let found = supervisor::start(&mut self.supervisors, self.ctx.clone());
        self.await_connection(found).await
    }
}

/// The reader starts its own supervisor and waits for it before the first read
pub fn start(agent_set: &mut JoinSet<()>, reader: Reader) {
    agent_set.spawn(reader.run());
}
