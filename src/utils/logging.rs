//! Per-module switchable logging macros.
//!
//! The ingestion path logs one line per persisted record, which is useful in
//! production but noisy under test. Modules that want the switch declare
//!
//! ```rust
//! const ENABLE_LOGS: bool = true;
//! ```
//!
//! and use `log_info!` / `log_warn!` / `log_error!` (exported at the crate
//! root) instead of the bare `log` macros.

/// Info-level logging, gated on the calling module's `ENABLE_LOGS` const.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Warn-level logging, gated on the calling module's `ENABLE_LOGS` const.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Error-level logging, gated on the calling module's `ENABLE_LOGS` const.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
