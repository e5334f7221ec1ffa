use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::time::MissedTickBehavior;

use crate::{CollabContext, CollabEvent, RoomManager};

/// Reaps what explicit leaves cannot: members that vanished without a
/// goodbye, and rooms that sat empty past their grace period.
#[derive(Clone)]
pub struct LifecycleSupervisor {
    context: CollabContext,
}

impl LifecycleSupervisor {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Starts the periodic sweep. The first pass runs immediately,
    /// which doubles as startup cleanup of rooms left over from a
    /// previous run.
    pub fn run(&self) {
        let supervisor = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(supervisor.context.config.sweep_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                supervisor.sweep().await;
            }
        });
    }

    /// Scans every room once, evicting members whose last activity
    /// exceeds the inactivity bound and deleting rooms that outlived
    /// their grace period without an in-process timer.
    ///
    /// Eviction goes through the same leave path as an explicit leave,
    /// so host failover and the grace window apply to vanished clients
    /// the same way.
    pub async fn sweep(&self) {
        let rooms = match self.context.repository.list_rooms().await {
            Ok(rooms) => rooms,
            Err(err) => {
                warn!("Sweep could not list rooms: {}", err);
                return;
            }
        };

        let manager = RoomManager::new(&self.context);
        let now = Utc::now();

        for room in rooms {
            let members = match self.context.repository.members_of(&room.id).await {
                Ok(members) => members,
                // Deleted mid-sweep
                Err(_) => continue,
            };

            for member in &members {
                if exceeds(
                    now,
                    member.last_active,
                    self.context.config.member_inactivity_bound,
                ) {
                    info!(
                        "Evicting {} from room {} after inactivity",
                        member.user_id, room.id
                    );

                    if let Err(err) = manager.leave_room(&room.id, &member.user_id).await {
                        warn!(
                            "Could not evict {} from room {}: {}",
                            member.user_id, room.id, err
                        );
                    }
                }
            }

            // Backup path for deletion timers lost to a restart
            if members.is_empty()
                && exceeds(now, room.last_active, self.context.config.room_grace_period)
                && !self.context.deletions.contains_key(&room.id)
            {
                self.context.delete_room_now(&room.id).await;
            }
        }
    }
}

/// Returns true if `then` lies further than `bound` behind `now`
fn exceeds(now: DateTime<Utc>, then: DateTime<Utc>, bound: Duration) -> bool {
    now.signed_duration_since(then)
        .to_std()
        .map(|age| age > bound)
        .unwrap_or_default()
}

impl CollabContext {
    /// Schedules the deferred deletion of an emptied room, replacing
    /// any earlier timer. The timer re-checks emptiness when it fires,
    /// a rejoin in the meantime wins.
    pub(crate) fn schedule_room_deletion(&self, room_id: &str) {
        let context = self.clone();
        let owned_id = room_id.to_string();
        let grace = self.config.room_grace_period;

        let task = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            context.delete_room_if_empty(&owned_id).await;
        });

        debug!("Room {} is empty, deletion due in {:?}", room_id, grace);

        if let Some(previous) = self
            .deletions
            .insert(room_id.to_string(), task.abort_handle())
        {
            previous.abort();
        }
    }

    /// Cancels a pending deferred deletion, if any
    pub(crate) fn cancel_room_deletion(&self, room_id: &str) {
        if let Some((_, timer)) = self.deletions.remove(room_id) {
            timer.abort();
        }
    }

    async fn delete_room_if_empty(&self, room_id: &str) {
        self.deletions.remove(room_id);

        let members = match self.repository.members_of(room_id).await {
            Ok(members) => members,
            // Already gone
            Err(_) => return,
        };

        if !members.is_empty() {
            return;
        }

        self.delete_room_now(room_id).await;
    }

    /// Deletes the room and cleans up its stored media, best effort
    pub(crate) async fn delete_room_now(&self, room_id: &str) {
        let video = self
            .repository
            .room_by_id(room_id)
            .await
            .ok()
            .and_then(|room| room.video);

        if let Err(err) = self.repository.delete_room(room_id).await {
            warn!("Could not delete room {}: {}", room_id, err);
            return;
        }

        info!("Room {} deleted after sitting empty", room_id);

        if let Some(video) = video {
            self.cleanup_media(video.url);
        }

        self.emit(CollabEvent::RoomDeleted {
            room_id: room_id.to_string(),
        });
    }
}
