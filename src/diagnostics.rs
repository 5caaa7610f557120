//! # Diagnostic Reporting
//!
//! Shader logs, FPS reports and context info are delivered through a
//! replaceable print callback with the signature
//! `(headline, detail, error)`. The default callback forwards to the [`log`]
//! facade; a silent printer drops everything.
//!
//! ```no_run
//! use gears::diagnostics::Printer;
//!
//! let mut printer = Printer::new();
//! printer.print("Gears Info", Some("RENDERER = headless"), None);
//!
//! // Route reports somewhere else
//! printer.set_callback(Some(Box::new(|head, detail, _err| {
//!     eprintln!("{head} {}", detail.unwrap_or(""));
//! })));
//! ```

use std::backtrace::Backtrace;

use crate::error::GearsError;

/// Diagnostic sink: headline, optional detail text, optional error.
pub type PrintCallback = Box<dyn FnMut(&str, Option<&str>, Option<&GearsError>)>;

/// Default sink. Plain reports go to `info!`, reports carrying an error go to
/// `error!` together with a backtrace.
pub fn default_print_callback(headline: &str, detail: Option<&str>, error: Option<&GearsError>) {
    match error {
        Some(error) => log::error!("{}", error_report(headline, detail, error)),
        None => match detail {
            Some(detail) => log::info!("{headline}\n{detail}"),
            None => log::info!("{headline}"),
        },
    }
}

/// Headline, detail, error and a backtrace captured regardless of
/// `RUST_BACKTRACE`.
fn error_report(headline: &str, detail: Option<&str>, error: &GearsError) -> String {
    let backtrace = Backtrace::force_capture();
    match detail {
        Some(detail) => format!("{headline}\n{detail}\n{error:?}\n{backtrace}"),
        None => format!("{headline}\n{error:?}\n{backtrace}"),
    }
}

/// Owner of the current print callback.
pub struct Printer {
    callback: Option<PrintCallback>,
}

impl Printer {
    /// Printer using [`default_print_callback`].
    pub fn new() -> Self {
        Self {
            callback: Some(Box::new(default_print_callback)),
        }
    }

    /// Printer that suppresses all reporting.
    pub fn silent() -> Self {
        Self { callback: None }
    }

    /// Replace the callback. `None` restores the default one.
    pub fn set_callback(&mut self, callback: Option<PrintCallback>) {
        self.callback = Some(callback.unwrap_or_else(|| Box::new(default_print_callback)));
    }

    pub fn is_silent(&self) -> bool {
        self.callback.is_none()
    }

    pub fn print(&mut self, headline: &str, detail: Option<&str>, error: Option<&GearsError>) {
        if let Some(callback) = self.callback.as_mut() {
            callback(headline, detail, error);
        }
    }
}

impl Default for Printer {
    fn default() -> Self {
        Self::new()
    }
}
