/// Live readout collaborator.
///
/// Callbacks come from the monitor's tasks and must not block. A presenter that
/// can be closed by the user should hold a [`crate::Shutdown`] clone and trigger
/// it with [`crate::ShutdownReason::WindowClosed`].
pub trait Presenter: Send + Sync {
    /// `humidity` is meaningless when `humidity_present` is false
    fn on_measurement(&self, temperature: f64, humidity: f64, humidity_present: bool);
    /// The sensor failed (I/O error or reset), a reconnection is in progress
    fn on_disconnected(&self);
    /// The sensor went silent, a reconnection is in progress
    fn on_connection_lost(&self);
}
