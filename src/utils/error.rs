//! Customized unified error type.

use std::error;
use std::fmt;
use std::io;
use std::net;
use std::num;

/// Customized error type for Gavel.
///
/// Business outcomes of a bid (`Fail`, `Exception`) are never carried by this
/// type; they travel as values inside `BidResponse`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct GavelError(pub String);

impl GavelError {
    pub fn msg(msg: impl ToString) -> Self {
        GavelError(msg.to_string())
    }
}

impl fmt::Display for GavelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0) // do not display literal quotes
    }
}

impl error::Error for GavelError {}

// Helper macro for saving boiler-plate `impl From<X>`s for transparent
// conversion from various common error types to `GavelError`.
macro_rules! impl_from_error {
    ($error:ty) => {
        impl From<$error> for GavelError {
            fn from(e: $error) -> Self {
                // just store the source error's string representation
                GavelError(e.to_string())
            }
        }
    };
}

impl_from_error!(io::Error);
impl_from_error!(num::ParseIntError);
impl_from_error!(net::AddrParseError);
impl_from_error!(rmp_serde::encode::Error);
impl_from_error!(rmp_serde::decode::Error);
impl_from_error!(toml::de::Error);
impl_from_error!(ctrlc::Error);
impl_from_error!(tokio::time::error::Elapsed);
impl_from_error!(tokio::task::JoinError);
