//! Scriptable stand-ins for the HID driver and the presenter

use crate::agents::Context;
use crate::hid::{Locator, Transport};
use crate::presentation::Presenter;
use crate::session::DeviceSession;
use crate::shutdown::{Shutdown, ShutdownReason};
use crate::{Error, MonitorConfig};
use odtemp_shared::{parse_interval_feature_response, set_feature_interval, FEATURE_REPORT_SIZE};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub fn test_config() -> MonitorConfig {
    MonitorConfig {
        settle: Duration::ZERO,
        backoff: Duration::from_millis(10),
        read_timeout: Duration::from_millis(20),
        poll_interval: Duration::from_millis(10),
        ..MonitorConfig::default()
    }
}

pub fn test_context(locator: Arc<dyn Locator>) -> Context {
    Context {
        session: Arc::new(DeviceSession::default()),
        locator,
        shutdown: Shutdown::default(),
        config: Arc::new(test_config()),
    }
}

#[derive(Debug, Clone)]
pub enum MockRead {
    Report(Vec<u8>),
    /// Nothing arrived within the timeout, returned without waiting
    Empty,
    Fail,
    Panic,
}

/// Plays back scripted reads, then behaves like a silent device
pub struct MockTransport {
    reads: Mutex<VecDeque<MockRead>>,
    closes: Arc<AtomicUsize>,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    feature: Arc<Mutex<[u8; FEATURE_REPORT_SIZE]>>,
    min_interval_ms: Option<u32>,
}

impl MockTransport {
    pub fn new(reads: Vec<MockRead>) -> Self {
        Self {
            reads: Mutex::new(reads.into()),
            closes: Arc::default(),
            writes: Arc::default(),
            feature: Arc::new(Mutex::new([0; FEATURE_REPORT_SIZE])),
            min_interval_ms: None,
        }
    }

    pub fn with_feature(self, feature: [u8; FEATURE_REPORT_SIZE]) -> Self {
        *self.feature.lock() = feature;
        self
    }

    /// Emulates firmware that refuses intervals below `min_interval_ms`
    pub fn with_clamp(mut self, min_interval_ms: u32) -> Self {
        self.min_interval_ms = Some(min_interval_ms);
        self
    }

    pub fn closes(&self) -> Arc<AtomicUsize> {
        self.closes.clone()
    }

    pub fn writes(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        self.writes.clone()
    }

    pub fn feature(&self) -> Arc<Mutex<[u8; FEATURE_REPORT_SIZE]>> {
        self.feature.clone()
    }
}

impl Transport for MockTransport {
    fn read_timeout(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, Error> {
        let next = self.reads.lock().pop_front();
        match next {
            Some(MockRead::Report(report)) => {
                let len = report.len().min(buf.len());
                buf[..len].copy_from_slice(&report[..len]);
                Ok(len)
            }
            Some(MockRead::Empty) => Ok(0),
            Some(MockRead::Fail) => Err(Error::Disconnected),
            Some(MockRead::Panic) => panic!("driver crashed"),
            None => {
                thread::sleep(timeout);
                Ok(0)
            }
        }
    }

    fn write(&self, data: &[u8]) -> Result<usize, Error> {
        self.writes.lock().push(data.to_vec());
        Ok(data.len())
    }

    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let feature = self.feature.lock();
        let len = buf.len().min(FEATURE_REPORT_SIZE);
        buf[..len].copy_from_slice(&feature[..len]);
        Ok(len)
    }

    fn send_feature_report(&self, data: &[u8]) -> Result<(), Error> {
        let mut feature = self.feature.lock();
        let len = data.len().min(FEATURE_REPORT_SIZE);
        feature[..len].copy_from_slice(&data[..len]);

        let requested = parse_interval_feature_response(&feature[..]);
        if let (Some(min), Some(requested)) = (self.min_interval_ms, requested) {
            set_feature_interval(&mut feature, requested.max(min));
        }
        Ok(())
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockLocator {
    handles: Mutex<VecDeque<MockTransport>>,
    fail_first: AtomicUsize,
    open_delay: Duration,
    pub attempts: AtomicUsize,
    pub opened: AtomicUsize,
}

impl MockLocator {
    pub fn new(handles: Vec<MockTransport>) -> Self {
        Self {
            handles: Mutex::new(handles.into()),
            fail_first: AtomicUsize::new(0),
            open_delay: Duration::ZERO,
            attempts: AtomicUsize::new(0),
            opened: AtomicUsize::new(0),
        }
    }

    pub fn failing_first(self, attempts: usize) -> Self {
        self.fail_first.store(attempts, Ordering::SeqCst);
        self
    }

    /// Every `open` blocks this long before answering
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }
}

impl Locator for MockLocator {
    fn open(&self, vendor_id: u16, product_id: u16) -> Result<Box<dyn Transport>, Error> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.open_delay);
        let not_found = Error::NotFound {
            vendor_id,
            product_id,
        };

        let failing = self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(not_found);
        }

        let handle = self.handles.lock().pop_front().ok_or(not_found)?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(handle))
    }
}

#[derive(Default)]
pub struct MockPresenter {
    shutdown: Shutdown,
    close_on_loss: bool,
    close_on_measurement: bool,
    pub disconnected: AtomicUsize,
    pub connection_lost: AtomicUsize,
    pub last_measurement: Mutex<Option<(f64, f64, bool)>>,
}

impl MockPresenter {
    /// Closes the "window" as soon as the sensor is lost
    pub fn closing_on_loss(shutdown: Shutdown) -> Self {
        Self {
            shutdown,
            close_on_loss: true,
            ..Self::default()
        }
    }

    /// Closes the "window" once the first measurement shows up
    pub fn closing_on_measurement(shutdown: Shutdown) -> Self {
        Self {
            shutdown,
            close_on_measurement: true,
            ..Self::default()
        }
    }

    fn close(&self) {
        self.shutdown.trigger(ShutdownReason::WindowClosed);
    }
}

impl Presenter for MockPresenter {
    fn on_measurement(&self, temperature: f64, humidity: f64, humidity_present: bool) {
        *self.last_measurement.lock() = Some((temperature, humidity, humidity_present));
        if self.close_on_measurement {
            self.close();
        }
    }

    fn on_disconnected(&self) {
        self.disconnected.fetch_add(1, Ordering::SeqCst);
        if self.close_on_loss {
            self.close();
        }
    }

    fn on_connection_lost(&self) {
        self.connection_lost.fetch_add(1, Ordering::SeqCst);
        if self.close_on_loss {
            self.close();
        }
    }
}
