use crate::cli::DeviceArgs;
use crate::live::{readout_line, TerminalPresenter};
use crate::logging::{self, LogOptions};
use anyhow::{anyhow, Context};
use odtemp_device::{HidLocator, Monitor, MonitorConfig, Shutdown, ShutdownReason};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(clap::Args, Debug)]
pub struct Args {
    /// Logging period in seconds. Below 2 seconds every sample is logged as it
    /// arrives and the sensor is asked to sample at that rate
    #[arg(long, default_value_t = 60.0)]
    period: f64,

    /// Directory for the log file, created if it doesn't exist.
    /// Defaults to the current directory
    #[arg(long)]
    path: Option<PathBuf>,

    /// Don't write a log file, only warnings and measurements reach the console
    #[arg(long)]
    silent: bool,

    /// Show a live readout. With it, a lost sensor is waited for instead of
    /// ending the run
    #[arg(long)]
    live: bool,

    #[command(flatten)]
    device: DeviceArgs,

    /// How long a single read waits for a report, at least 1
    #[arg(long, default_value_t = 1000)]
    read_timeout_ms: u64,
}

impl Args {
    pub fn config(&self) -> anyhow::Result<MonitorConfig> {
        let (vendor_id, product_id) = self.device.ids();
        let config = MonitorConfig {
            vendor_id,
            product_id,
            quiet: self.silent,
            ..MonitorConfig::default()
        };

        Ok(config
            .with_period_secs(self.period)?
            .with_read_timeout(Duration::from_millis(self.read_timeout_ms))?)
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let config = self.config()?;

        let readout = self.live.then(readout_line);
        let log_file = logging::init(&LogOptions {
            dir: self.path.clone(),
            silent: self.silent,
            progress: readout.clone(),
        })?;
        if let Some(path) = log_file {
            tracing::info!("Writing the log to {}", path.display());
        }

        let locator = HidLocator::init().context("Couldn't initialise the HID subsystem")?;
        let shutdown = Shutdown::default();
        spawn_interrupt_handler(shutdown.clone());

        let mut monitor = Monitor::new(config, Arc::new(locator), shutdown);
        if let Some(line) = readout {
            monitor = monitor.with_presenter(Arc::new(TerminalPresenter::new(line)));
        }

        let reason = monitor.run().await;
        tracing::info!("Monitoring stopped: {reason}");

        match reason {
            ShutdownReason::WindowClosed
            | ShutdownReason::Interrupted
            | ShutdownReason::DeviceReset => Ok(()),
            ShutdownReason::DeviceFailure | ShutdownReason::AgentExited => {
                Err(anyhow!("Monitoring stopped: {reason}"))
            }
        }
    }
}

fn spawn_interrupt_handler(shutdown: Shutdown) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                shutdown.trigger(ShutdownReason::Interrupted);
            }
            Err(e) => tracing::error!("Couldn't listen for Ctrl-C: {e}"),
        }
    });
}
