use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use odtemp_device::Presenter;
use std::time::Duration;

/// Single-line live readout on the terminal
pub struct TerminalPresenter {
    line: ProgressBar,
}

/// The readout line. Console logging has to print around it, see
/// [`crate::logging::LogOptions::progress`].
pub fn readout_line() -> ProgressBar {
    let line = ProgressBar::new_spinner();
    line.set_style(
        ProgressStyle::with_template("{spinner:.dim} {msg}")
            .expect("Spinner template must be correct"),
    );
    line.enable_steady_tick(Duration::from_millis(250));
    line.set_message("Waiting for the sensor…");
    line
}

impl TerminalPresenter {
    pub fn new(line: ProgressBar) -> Self {
        Self { line }
    }
}

fn format_measurement(temperature: f64, humidity: f64, humidity_present: bool) -> String {
    let temperature = style(format!("{temperature:.2}°C")).bold().green();
    if humidity_present {
        format!("{temperature}  {}", style(format!("{humidity:.2}%")).bold().cyan())
    } else {
        temperature.to_string()
    }
}

impl Presenter for TerminalPresenter {
    fn on_measurement(&self, temperature: f64, humidity: f64, humidity_present: bool) {
        self.line
            .set_message(format_measurement(temperature, humidity, humidity_present));
    }

    fn on_disconnected(&self) {
        self.line.set_message(format!(
            "{}, waiting for it to come back…",
            style("Sensor disconnected").yellow()
        ));
    }

    fn on_connection_lost(&self) {
        self.line.set_message(format!(
            "{}, waiting for it to come back…",
            style("Sensor stopped responding").red()
        ));
    }
}

impl Drop for TerminalPresenter {
    fn drop(&mut self) {
        self.line.finish_and_clear();
    }
}
