use crate::hid::Locator;
use crate::session::DeviceSession;
use crate::shutdown::Shutdown;
use crate::MonitorConfig;
use std::sync::Arc;

pub mod agent_watcher;
pub mod aggregator;
pub mod poller;
pub mod reader;
pub mod supervisor;

/// What every agent of a run shares
#[derive(Clone)]
pub struct Context {
    pub session: Arc<DeviceSession>,
    pub locator: Arc<dyn Locator>,
    pub shutdown: Shutdown,
    pub config: Arc<MonitorConfig>,
}
