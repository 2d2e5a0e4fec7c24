//! Debug-gated operational logging.
//!
//! Operations log their progress at `info` (and failures at `error`) only
//! when the caller asked for debug output through the operation's options.
//! Otherwise the same events are emitted at `debug` level.

/// Log progress at `info` when debug output is enabled, `debug` otherwise
macro_rules! verbose {
    ($debug:expr, $($arg:tt)+) => {
        if $debug {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

/// Log a failure at `error` when debug output is enabled, `debug` otherwise
macro_rules! verbose_error {
    ($debug:expr, $($arg:tt)+) => {
        if $debug {
            tracing::error!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

pub(crate) use verbose;
pub(crate) use verbose_error;
