//! Logging macros that tag every line with the node's role.
//!
//! The tag lives in the process-global `ME`; a server sets it to its role
//! and the client binary sets it to `client`. Lines logged before it is set
//! carry `-`.

use std::sync::OnceLock;

use env_logger::Env;

/// Role tag printed in front of every log line.
pub static ME: OnceLock<String> = OnceLock::new();

/// Shared expansion behind the `pf_*` macros.
#[doc(hidden)]
#[macro_export]
macro_rules! pf_log {
    ($level:ident, $($fmt_args:tt)*) => {
        log::$level!(
            "({}) {}",
            $crate::ME.get().map_or("-", |me| me.as_str()),
            format!($($fmt_args)*)
        )
    };
}

/// Log TRACE message tagged with the role.
#[macro_export]
macro_rules! pf_trace {
    ($($fmt_args:tt)*) => { $crate::pf_log!(trace, $($fmt_args)*) };
}

/// Log DEBUG message tagged with the role.
#[macro_export]
macro_rules! pf_debug {
    ($($fmt_args:tt)*) => { $crate::pf_log!(debug, $($fmt_args)*) };
}

/// Log INFO message tagged with the role.
///
/// Example:
/// ```no_compile
/// pf_info!("promoted after {:?} of silence", silence);
/// ```
#[macro_export]
macro_rules! pf_info {
    ($($fmt_args:tt)*) => { $crate::pf_log!(info, $($fmt_args)*) };
}

/// Log WARN message tagged with the role.
#[macro_export]
macro_rules! pf_warn {
    ($($fmt_args:tt)*) => { $crate::pf_log!(warn, $($fmt_args)*) };
}

/// Log ERROR message tagged with the role.
#[macro_export]
macro_rules! pf_error {
    ($($fmt_args:tt)*) => { $crate::pf_log!(error, $($fmt_args)*) };
}

/// Initializes `env_logger` once; `RUST_LOG` overrides the `info` default.
pub fn logger_init() {
    let _ =
        env_logger::Builder::from_env(Env::default().default_filter_or("info"))
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .try_init();
}

/// Sets the role tag. Only the first call takes effect.
pub fn set_me(me: impl Into<String>) {
    let _ = ME.set(me.into());
}

/// Logs the message at ERROR and evaluates to `Err(GavelError)` carrying
/// the same text.
///
/// Example:
/// ```no_compile
/// return logged_err!("unknown role '{}'", role);
/// ```
#[macro_export]
macro_rules! logged_err {
    ($($fmt_args:tt)*) => {
        {
            $crate::pf_error!($($fmt_args)*);
            Err($crate::GavelError::msg(format!($($fmt_args)*)))
        }
    };
}
