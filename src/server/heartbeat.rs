//! Gavel heartbeats: the primary's sending side and the backup's liveness
//! bookkeeping.

use std::sync::{Arc, Mutex};

use crate::server::ReplicaLink;

use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};

/// Backup-local record of when the primary was last heard from.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatState {
    pub last_seen: Instant,
}

/// Primary liveness tracker. Has its own lock, separate from the node's
/// auction lock, because it is refreshed on every inbound primary RPC.
#[derive(Debug)]
pub struct Liveness {
    state: Mutex<HeartbeatState>,
}

impl Liveness {
    /// Creates a tracker that considers the primary heard at `now`.
    pub fn new(now: Instant) -> Self {
        Liveness {
            state: Mutex::new(HeartbeatState { last_seen: now }),
        }
    }

    /// Records that the primary was heard at `now`. Never moves `last_seen`
    /// backwards.
    pub fn heard(&self, now: Instant) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if now > state.last_seen {
            state.last_seen = now;
        }
    }

    /// How long the primary has been silent as of `now`.
    pub fn silence(&self, now: Instant) -> Duration {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        now.saturating_duration_since(state.last_seen)
    }

    /// Snapshot of the current state.
    pub fn snapshot(&self) -> HeartbeatState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Promotion rule: a silence at or beyond the threshold triggers promotion.
#[inline]
pub fn silence_exceeds(silence: Duration, threshold: Duration) -> bool {
    silence >= threshold
}

/// The primary's heartbeat sender.
pub struct Heartbeater {
    /// Link to the backup.
    link: Arc<dyn ReplicaLink>,

    /// Sending interval.
    send_interval: Duration,

    /// Bound on each heartbeat round trip.
    reply_timeout: Duration,

    /// Approximate health of the backup, as last observed.
    peer_alive: bool,
}

impl Heartbeater {
    /// Creates a heartbeat sender over `link`.
    pub fn new(
        link: Arc<dyn ReplicaLink>,
        send_interval: Duration,
        reply_timeout: Duration,
    ) -> Self {
        Heartbeater {
            link,
            send_interval,
            reply_timeout,
            peer_alive: true,
        }
    }

    /// Spawns the sending loop as a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.sender_thread())
    }

    /// Sends one heartbeat and updates the observed backup health. Returns
    /// whether the backup answered alive.
    pub async fn send_once(&mut self) -> bool {
        let alive = matches!(
            time::timeout(self.reply_timeout, self.link.heartbeat()).await,
            Ok(Ok(true))
        );
        if alive != self.peer_alive {
            if alive {
                pf_info!("backup answering heartbeats again");
            } else {
                pf_warn!("backup stopped answering heartbeats");
            }
            self.peer_alive = alive;
        }
        alive
    }

    /// Heartbeat sender thread function.
    async fn sender_thread(mut self) {
        pf_debug!(
            "heartbeater thread spawned, interval {:?}",
            self.send_interval
        );

        let mut ticker = time::interval(self.send_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.send_once().await;
        }
    }
}
