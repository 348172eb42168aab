//! Re-armable reply deadline built on `tokio::time::Sleep`.

use std::pin::Pin;

use crate::utils::GavelError;

use tokio::time::{self, Duration, Instant, Sleep};

/// Deadline that an API stub arms before each request and races against the
/// reply read inside a `tokio::select!`.
///
/// Must be used within the context of a tokio runtime.
#[derive(Debug)]
pub struct Timer {
    /// Pinned so the same sleep can be reset and awaited many times.
    sleep: Pin<Box<Sleep>>,
}

impl Timer {
    /// Creates an already-expired deadline.
    pub fn new() -> Self {
        Timer {
            sleep: Box::pin(time::sleep(Duration::ZERO)),
        }
    }

    /// Re-arms the deadline to fire `dur` from now. A zero duration would
    /// expire every request immediately and is rejected.
    pub fn restart(&mut self, dur: Duration) -> Result<(), GavelError> {
        if dur.is_zero() {
            return logged_err!("reply deadline must be non-zero");
        }
        self.sleep.as_mut().reset(Instant::now() + dur);
        Ok(())
    }

    /// Resolves once the deadline passes.
    pub async fn timeout(&mut self) {
        self.sleep.as_mut().await
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
