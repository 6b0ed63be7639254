mod bootloader;
mod monitor;

use anyhow::anyhow;
use odtemp_device::MonitorConfig;

#[derive(clap::Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Log temperature (and humidity, if the sensor has it) until interrupted.
    /// Measurements are bucketed into period-aligned slots, one line per slot.
    Monitor(monitor::Args),
    /// Reboot the sensor into its bootloader for a firmware update
    Bootloader(bootloader::Args),
}

impl Command {
    pub async fn run(self) -> anyhow::Result<()> {
        match self {
            Command::Monitor(cmd) => cmd.run().await,
            Command::Bootloader(cmd) => cmd.run().await,
        }
    }
}

/// Which USB device to talk to
#[derive(clap::Args, Debug)]
pub struct DeviceArgs {
    /// USB vendor id, decimal or 0x-prefixed hex [default: 0x0483]
    #[arg(long, value_parser = parse_usb_id)]
    vendor_id: Option<u16>,
    /// USB product id, decimal or 0x-prefixed hex [default: 0xA26A]
    #[arg(long, value_parser = parse_usb_id)]
    product_id: Option<u16>,
}

impl DeviceArgs {
    pub fn ids(&self) -> (u16, u16) {
        let defaults = MonitorConfig::default();
        (
            self.vendor_id.unwrap_or(defaults.vendor_id),
            self.product_id.unwrap_or(defaults.product_id),
        )
    }
}

fn parse_usb_id(s: &str) -> anyhow::Result<u16> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| anyhow!("Invalid USB id \"{s}\": {e}"))
}
