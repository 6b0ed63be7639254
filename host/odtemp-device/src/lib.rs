use crate::agents::reader::Reader;
use crate::agents::{agent_watcher, aggregator, poller, reader, Context};
use odtemp_shared::{build_reset_command, ResetKind, MIN_SAMPLING_INTERVAL_MS, USB_PID, USB_VID};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

mod agents;
pub mod hid;
pub mod presentation;
pub mod sample;
pub mod session;
pub mod shutdown;
#[cfg(test)]
mod testing;

pub use crate::hid::{HidLocator, Locator, Transport};
pub use crate::presentation::Presenter;
pub use crate::sample::{LiveCache, Sample, MEASUREMENT_TARGET};
pub use crate::session::DeviceSession;
pub use crate::shutdown::{Shutdown, ShutdownReason};
pub use odtemp_shared::Reading;

/// Periods below this are logged sample by sample instead of being bucketed
pub const AGGREGATION_THRESHOLD: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HID error while {0}")]
    Hid(&'static str, #[source] hidapi::HidError),
    #[error("No sensor found (VID: 0x{vendor_id:04X}, PID: 0x{product_id:04X})")]
    NotFound { vendor_id: u16, product_id: u16 },
    #[error("Sensor disconnected")]
    Disconnected,
    #[error("Feature report is too short ({0} bytes)")]
    ShortFeatureReport(usize),
    #[error("Logging period must be a positive number of seconds, got {0}")]
    InvalidPeriod(f64),
    #[error("Read timeout must be at least 1 ms")]
    InvalidReadTimeout,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Logging period. Also drives the device sampling interval when it's
    /// below [`AGGREGATION_THRESHOLD`]
    pub period: Duration,
    /// Wait between two failed attempts to open the sensor
    pub backoff: Duration,
    /// Pause between opening the sensor and the first read
    pub settle: Duration,
    /// Driver read timeout, an empty read counts as a missed heartbeat
    pub read_timeout: Duration,
    /// Consecutive empty reads tolerated before the connection is declared lost
    pub heartbeat: u32,
    /// How often the presenter gets the latest reading
    pub poll_interval: Duration,
    /// Don't log failed lookup attempts
    pub quiet: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            vendor_id: USB_VID,
            product_id: USB_PID,
            period: Duration::from_secs(60),
            backoff: Duration::from_secs(1),
            settle: Duration::from_millis(500),
            read_timeout: Duration::from_secs(1),
            heartbeat: 9,
            poll_interval: Duration::from_millis(200),
            quiet: false,
        }
    }
}

impl MonitorConfig {
    pub fn with_period_secs(mut self, secs: f64) -> Result<Self, Error> {
        if !secs.is_finite() || secs <= 0.0 {
            return Err(Error::InvalidPeriod(secs));
        }
        self.period = Duration::from_secs_f64(secs);
        Ok(self)
    }

    /// Rejects zero, with which every read returns empty at once
    pub fn with_read_timeout(mut self, timeout: Duration) -> Result<Self, Error> {
        if timeout.as_millis() == 0 {
            return Err(Error::InvalidReadTimeout);
        }
        self.read_timeout = timeout;
        Ok(self)
    }

    pub fn aggregates(&self) -> bool {
        self.period >= AGGREGATION_THRESHOLD
    }

    /// Interval requested from the device when logging every sample
    pub fn sampling_interval_ms(&self) -> u32 {
        let ms = self.period.as_millis().min(u32::MAX as u128) as u32;
        ms.max(MIN_SAMPLING_INTERVAL_MS)
    }
}

/// Owns a monitoring run: looks for the sensor, reads it, reconnects when it
/// goes away and logs measurements until the shutdown signal fires.
pub struct Monitor {
    config: MonitorConfig,
    locator: Arc<dyn Locator>,
    presenter: Option<Arc<dyn Presenter>>,
    shutdown: Shutdown,
}

impl Monitor {
    pub fn new(config: MonitorConfig, locator: Arc<dyn Locator>, shutdown: Shutdown) -> Self {
        Self {
            config,
            locator,
            presenter: None,
            shutdown,
        }
    }

    /// With a presenter attached, a lost sensor is waited for. Without one, losing
    /// the sensor ends the run.
    pub fn with_presenter(mut self, presenter: Arc<dyn Presenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    pub async fn run(self) -> ShutdownReason {
        let session = Arc::new(DeviceSession::default());
        let live = Arc::new(LiveCache::default());
        let ctx = Context {
            session: session.clone(),
            locator: self.locator,
            shutdown: self.shutdown.clone(),
            config: Arc::new(self.config),
        };

        let period = ctx.config.period.as_secs_f64();
        tracing::info!("Logging period: {period:.1} seconds");

        let mut agent_set: JoinSet<()> = JoinSet::new();

        let aggregator = ctx
            .config
            .aggregates()
            .then(|| aggregator::start(&mut agent_set, &ctx));
        if let Some(presenter) = &self.presenter {
            poller::start(&mut agent_set, &ctx, presenter.clone(), live.clone());
        }

        let reader = Reader::new(ctx.clone(), self.presenter, live, aggregator);
        reader::start(&mut agent_set, reader);

        agent_watcher::watch(agent_set, &self.shutdown).await;

        if session.clear() {
            tracing::info!("Sensor closed");
        }

        self.shutdown.reason().unwrap_or(ShutdownReason::AgentExited)
    }
}

/// Asks the sensor to reboot into its bootloader. The handle is closed right away,
/// the sensor re-enumerates as a different device.
pub fn enter_bootloader(
    locator: &dyn Locator,
    vendor_id: u16,
    product_id: u16,
) -> Result<(), Error> {
    let handle = locator.open(vendor_id, product_id)?;
    handle.write(&build_reset_command(ResetKind::Bootloader))?;
    tracing::info!("Bootloader command sent");
    Ok(())
}
