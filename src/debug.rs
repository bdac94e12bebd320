//! Runtime-gated debug logging.
//!
//! [`debug_log!`](crate::debug_log) emits at `debug` level only when the
//! crate is built with the `core-debug` feature *and* the settings cache
//! has debug mode switched on. Without the feature the condition is a
//! constant `false` and the whole statement is removed by the compiler.

/// Whether the `core-debug` feature is compiled in.
pub const ENABLED: bool = cfg!(feature = "core-debug");

/// Debug log gated by the build feature and the runtime debug flag.
///
/// ```ignore
/// debug_log!(settings, "Worker: '{}' from client {}", method, client);
/// ```
#[macro_export]
macro_rules! debug_log {
    ($settings:expr, $($arg:tt)+) => {
        if $crate::debug::ENABLED && $settings.is_debug_enabled() {
            ::log::debug!($($arg)+);
        }
    };
}
