use crate::cli::DeviceArgs;
use crate::logging::{self, LogOptions};
use anyhow::Context;
use odtemp_device::{enter_bootloader, HidLocator};

#[derive(clap::Args, Debug)]
pub struct Args {
    #[command(flatten)]
    device: DeviceArgs,
}

impl Args {
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init(&LogOptions {
            silent: true,
            ..LogOptions::default()
        })?;

        let (vendor_id, product_id) = self.device.ids();
        let locator = HidLocator::init().context("Couldn't initialise the HID subsystem")?;
        enter_bootloader(&locator, vendor_id, product_id)
            .context("Couldn't send the bootloader command")?;

        println!("Bootloader requested");
        println!("The sensor should re-enumerate as a firmware update device");

        Ok(())
    }
}
