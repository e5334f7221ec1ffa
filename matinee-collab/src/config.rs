use std::time::Duration;

use matinee_core::{Backoff, SyncConfig};

/// The configuration of the collab system
#[derive(Debug, Clone)]
pub struct CollabConfig {
    /// How long an emptied room survives before deletion
    pub room_grace_period: Duration,
    /// How often the lifecycle sweep scans all rooms
    pub sweep_interval: Duration,
    /// How long a member may stay inactive before the sweep evicts them
    pub member_inactivity_bound: Duration,
    /// How many chat messages a room retains
    pub chat_history_limit: usize,
    /// How long a watcher waits for the push feed to confirm itself
    pub push_confirm_timeout: Duration,
    /// How often the polling fallback re-fetches snapshots
    pub poll_interval: Duration,
    /// How often sessions report member activity
    pub heartbeat_interval: Duration,
    /// First delay after a failed snapshot fetch
    pub backoff_base: Duration,
    /// Largest delay between retries
    pub backoff_cap: Duration,
    /// How many retries before a watcher parks itself
    pub backoff_attempts: u32,
    /// Tuning for viewer playback reconciliation
    pub sync: SyncConfig,
}

impl CollabConfig {
    /// Returns a fresh retry policy for a watcher
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.backoff_base, self.backoff_cap, self.backoff_attempts)
    }
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            // Short enough to reap abandoned rooms, long enough to survive a reconnect
            room_grace_period: Duration::from_secs(60 * 5),
            sweep_interval: Duration::from_secs(60 * 10),
            member_inactivity_bound: Duration::from_secs(60 * 30),
            chat_history_limit: 100,
            push_confirm_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(3),
            heartbeat_interval: Duration::from_secs(30),
            backoff_base: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(30),
            backoff_attempts: 5,
            sync: SyncConfig::default(),
        }
    }
}
