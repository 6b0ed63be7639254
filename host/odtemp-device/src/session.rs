use crate::hid::Transport;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// The single owner of the sensor handle.
///
/// `generation` and `alive` can be read without the lock, they are used to tell
/// whether a sample was produced by the connection that is still current.
/// Everything else goes through the lock, and the handle itself never leaves it:
/// callers get to use it for exactly one operation via [`DeviceSession::with_handle`].
#[derive(Default)]
pub struct DeviceSession {
    handle: Mutex<Option<Box<dyn Transport>>>,
    generation: AtomicU64,
    alive: AtomicBool,
}

impl DeviceSession {
    /// Installs a freshly opened handle and returns its generation.
    pub fn install(&self, handle: Box<dyn Transport>) -> u64 {
        let mut slot = self.handle.lock();
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        if slot.replace(handle).is_some() {
            tracing::warn!("A live handle was replaced, the previous one is closed");
        }
        self.alive.store(true, Ordering::Release);
        generation
    }

    /// Closes the handle if there is one. Safe to call repeatedly, returns whether
    /// something was actually closed.
    pub fn clear(&self) -> bool {
        let mut slot = self.handle.lock();
        self.alive.store(false, Ordering::Release);
        let handle = slot.take();
        let was_open = handle.is_some();
        // closes the handle while the lock is still held
        drop(handle);
        was_open
    }

    pub fn with_handle<R>(&self, f: impl FnOnce(&dyn Transport) -> R) -> Option<R> {
        let slot = self.handle.lock();
        slot.as_deref().map(f)
    }

    pub fn is_connected(&self) -> bool {
        self.handle.lock().is_some()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Whether data stamped with `generation` belongs to the connection that is up right now
    pub fn is_current(&self, generation: u64) -> bool {
        self.is_alive() && self.generation() == generation
    }
}
