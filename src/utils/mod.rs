//! Helper utilities, functions, and macros.

#[macro_use]
mod print;

#[macro_use]
mod config;

mod clock;
mod error;
mod safetcp;
mod timer;

pub use clock::{from_unix_ms, unix_nanos, Clock, ManualClock, SystemClock};
pub use error::GavelError;
pub use print::{logger_init, set_me, ME};
pub use timer::Timer;

pub(crate) use safetcp::{safe_tcp_read, safe_tcp_write, tcp_connect_with_retry};
