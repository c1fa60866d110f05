#![deny(missing_docs)]
//! Shared logging utilities for the geocoder workspace.
//!
//! This crate provides the `ingest_*` logging macros used across the codebase
//! and a minimal test initializer for the global logger. Every record is
//! prefixed with the id of the run currently driven on this thread, so
//! interleaved output from consecutive runs stays readable.

use std::cell::Cell;

thread_local! {
    /// Thread-local storage for the id of the run being driven.
    static RUN_ID: Cell<u64> = const { Cell::new(0) };
}

/// Sets the run id for the current thread.
/// The session driver calls this whenever a new run starts.
pub fn set_run_context(run: u64) {
    RUN_ID.with(|v| v.set(run));
}

/// Retrieves the run id for the current thread.
/// Returns 0 outside of any run.
pub fn current_run() -> u64 {
    RUN_ID.with(|v| v.get())
}

/// Logs a trace-level message tagged with the current run.
#[macro_export]
macro_rules! ingest_trace {
    ($($arg:tt)*) => {{
        log::trace!("[run {}] {}", $crate::current_run(), format_args!($($arg)*));
    }};
}

/// Logs a debug-level message tagged with the current run.
#[macro_export]
macro_rules! ingest_debug {
    ($($arg:tt)*) => {{
        log::debug!("[run {}] {}", $crate::current_run(), format_args!($($arg)*));
    }};
}

/// Logs an info-level message tagged with the current run.
#[macro_export]
macro_rules! ingest_info {
    ($($arg:tt)*) => {{
        log::info!("[run {}] {}", $crate::current_run(), format_args!($($arg)*));
    }};
}

/// Logs a warn-level message tagged with the current run.
#[macro_export]
macro_rules! ingest_warn {
    ($($arg:tt)*) => {{
        log::warn!("[run {}] {}", $crate::current_run(), format_args!($($arg)*));
    }};
}

/// Logs an error-level message tagged with the current run.
#[macro_export]
macro_rules! ingest_error {
    ($($arg:tt)*) => {{
        log::error!("[run {}] {}", $crate::current_run(), format_args!($($arg)*));
    }};
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
