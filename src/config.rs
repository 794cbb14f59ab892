//! Process-wide runtime configuration.
//!
//! The only runtime knob is the verbose-logging flag. It controls per-frame
//! diagnostics and nothing else; packet contents never depend on it.

use std::sync::atomic::{AtomicBool, Ordering};

use log::Level;

/// Environment variable read by [`init_logging`] to pre-enable verbose output.
pub const VERBOSE_ENV: &str = "FORKSTREAM_VERBOSE";

/// Per-frame logging toggle (off by default)
static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Enable or disable per-frame logging.
pub fn set_verbose(enabled: bool) {
    VERBOSE.store(enabled, Ordering::Relaxed);
}

/// Whether per-frame logging is enabled.
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

/// Level of the per-frame lines printed while verbose logging is on.
///
/// Matches the default `info` filter so the toggle alone makes them visible.
pub const FRAME_LOG_LEVEL: Level = Level::Info;

/// Whether a per-frame line would be printed right now.
pub fn frame_logging_enabled() -> bool {
    is_verbose() && log::log_enabled!(FRAME_LOG_LEVEL)
}

/// Human readable status line, as printed by the "show logger" command.
pub fn logger_status() -> &'static str {
    if is_verbose() {
        "ForkStream logging is enabled"
    } else {
        "ForkStream logging is disabled"
    }
}

/// Install the `env_logger` backend (default filter `info`).
///
/// Safe to call more than once; a logger installed by the host application
/// is left in place.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    if let Ok(value) = std::env::var(VERBOSE_ENV) {
        if parse_flag(&value) {
            set_verbose(true);
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}
