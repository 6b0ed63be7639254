use crate::Error;
use hidapi::{HidApi, HidDevice};
use parking_lot::Mutex;
use std::time::Duration;

/// An open connection to the sensor. Dropping it closes the connection.
pub trait Transport: Send {
    /// Blocks for at most `timeout`, `Ok(0)` means nothing arrived in time
    fn read_timeout(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, Error>;
    fn write(&self, data: &[u8]) -> Result<usize, Error>;
    /// `buf[0]` must hold the report id
    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize, Error>;
    fn send_feature_report(&self, data: &[u8]) -> Result<(), Error>;
}

pub trait Locator: Send + Sync {
    /// Opens the first matching device, in the order the driver lists them
    fn open(&self, vendor_id: u16, product_id: u16) -> Result<Box<dyn Transport>, Error>;
}

impl Transport for HidDevice {
    fn read_timeout(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, Error> {
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
        HidDevice::read_timeout(self, buf, timeout_ms)
            .map_err(|e| Error::Hid("reading a report", e))
    }

    fn write(&self, data: &[u8]) -> Result<usize, Error> {
        HidDevice::write(self, data).map_err(|e| Error::Hid("writing a report", e))
    }

    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize, Error> {
        HidDevice::get_feature_report(self, buf)
            .map_err(|e| Error::Hid("reading a feature report", e))
    }

    fn send_feature_report(&self, data: &[u8]) -> Result<(), Error> {
        HidDevice::send_feature_report(self, data)
            .map_err(|e| Error::Hid("writing a feature report", e))
    }
}

/// hidapi-backed locator. The HID subsystem lives exactly as long as this value:
/// create it once at startup, drop it once at exit.
pub struct HidLocator {
    api: Mutex<HidApi>,
}

impl HidLocator {
    pub fn init() -> Result<Self, Error> {
        let api = HidApi::new().map_err(|e| Error::Hid("initialising the HID subsystem", e))?;
        Ok(Self {
            api: Mutex::new(api),
        })
    }
}

impl Locator for HidLocator {
    fn open(&self, vendor_id: u16, product_id: u16) -> Result<Box<dyn Transport>, Error> {
        let mut api = self.api.lock();
        api.refresh_devices()
            .map_err(|e| Error::Hid("listing devices", e))?;

        let mut connected_devices = api
            .device_list()
            .filter(|di| di.vendor_id() == vendor_id && di.product_id() == product_id);

        let first = connected_devices.next().ok_or(Error::NotFound {
            vendor_id,
            product_id,
        })?;
        let path = first.path().to_string_lossy().into_owned();

        let others = connected_devices.count();
        if others > 0 {
            tracing::warn!(
                "More than one sensor detected ({}), using {path}",
                others + 1
            );
        }

        tracing::info!("Found the sensor at {path}, opening");
        let device = first
            .open_device(&api)
            .map_err(|e| Error::Hid("opening the device", e))?;

        Ok(Box::new(device))
    }
}
