use log::warn;
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use matinee_core::PlaybackState;

use crate::{CollabContext, RoomId, RoomManager};

/// Publishes a host's local playback state into the room.
///
/// Updates go through an unbounded channel and are coalesced, a burst
/// of rapid position reports collapses into its newest state so the
/// repository sees one write instead of dozens. The session also
/// heartbeats the host's membership, keeping the lifecycle sweep away.
///
/// Publishing never blocks. Writes fail if the member loses the host
/// flag mid-session; those are logged and dropped while the session
/// stays up, in case the flag comes back. Dropping the session lets
/// queued updates drain before the task ends.
pub struct HostSession {
    updates: mpsc::UnboundedSender<PlaybackState>,
}

impl HostSession {
    pub(crate) fn new(context: &CollabContext, room_id: RoomId, user_id: String) -> Self {
        let (updates, receiver) = mpsc::unbounded_channel();

        let task = HostTask {
            manager: RoomManager::new(context),
            context: context.clone(),
            room_id,
            user_id,
            receiver,
        };

        tokio::spawn(task.run());

        Self { updates }
    }

    /// Queues a playback state for publishing
    pub fn publish(&self, state: PlaybackState) {
        let _ = self.updates.send(state);
    }
}

struct HostTask {
    manager: RoomManager,
    context: CollabContext,
    room_id: RoomId,
    user_id: String,
    receiver: mpsc::UnboundedReceiver<PlaybackState>,
}

impl HostTask {
    async fn run(mut self) {
        let mut heartbeat = tokio::time::interval(self.context.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                update = self.receiver.recv() => {
                    let Some(mut state) = update else {
                        // The handle is gone, nothing more will arrive
                        return;
                    };

                    // Collapse a queued burst into its newest state
                    while let Ok(newer) = self.receiver.try_recv() {
                        state = newer;
                    }

                    if let Err(err) = self
                        .manager
                        .update_playback(&self.room_id, &self.user_id, state)
                        .await
                    {
                        warn!("Could not publish playback for room {}: {}", self.room_id, err);
                    }
                }
                _ = heartbeat.tick() => {
                    self.manager.touch_member(&self.room_id, &self.user_id).await;
                }
            }
        }
    }
}
