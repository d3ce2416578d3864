// EMISSION TRACING MACROS
#[macro_export]
#[cfg(feature = "emit_trace")]
macro_rules! emit_log {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

#[macro_export]
#[cfg(not(feature = "emit_trace"))]
macro_rules! emit_log {
    ($($arg:tt)*) => {
        // Nothing
    };
}
