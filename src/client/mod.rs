//! Gavel's client functionality modules.

mod apistub;
mod config;
mod failover;

pub use apistub::ApiStub;
pub use config::ClientConfig;
pub use failover::{make_request_id, FailoverClient, Target};
