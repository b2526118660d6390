//! Logging macros shared by the soroplan crates.
//!
//! With the `telemetry` feature they forward to `tracing`; without it
//! warnings are written via `eprintln!` and debug events are compiled out.

#[cfg(feature = "telemetry")]
#[macro_export]
macro_rules! warn_event {
    ($($arg:tt)+) => {
        $crate::__tracing::warn!($($arg)+)
    };
}

#[cfg(not(feature = "telemetry"))]
#[macro_export]
macro_rules! warn_event {
    ($($arg:tt)+) => {
        eprintln!($($arg)+)
    };
}

#[cfg(feature = "telemetry")]
#[macro_export]
macro_rules! debug_event {
    ($($arg:tt)+) => {
        $crate::__tracing::debug!($($arg)+)
    };
}

#[cfg(not(feature = "telemetry"))]
#[macro_export]
macro_rules! debug_event {
    ($($arg:tt)+) => {
        if false {
            eprintln!($($arg)+);
        }
    };
}
