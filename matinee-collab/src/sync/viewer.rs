use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;
use parking_lot::Mutex;
use tokio::select;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;

use matinee_core::{DeviceClass, MediaElement, Reconciler, SourceProfile, TickOutcome};

use crate::{CollabContext, RoomId, RoomManager, RoomSnapshot, RoomWatcher};

/// Follows a room as a watching member and corrects a local media
/// element towards the shared playback state.
///
/// The session owns a [`RoomWatcher`] for snapshot delivery, runs the
/// reconciliation engine on the device's cadence and immediately after
/// pushed changes, and heartbeats the member's activity so the
/// lifecycle sweep never mistakes a quiet viewer for a vanished one.
///
/// If the member holds the host flag the engine stands down, their
/// element is the state everyone else converges on. The session ends
/// on its own once the room is deleted; dropping it stops everything.
pub struct ViewerSession {
    watcher: RoomWatcher,
    reconciler: Arc<Mutex<Reconciler>>,
    last_synced: Arc<Mutex<Option<DateTime<Utc>>>>,
    task: AbortHandle,
}

/// A point in time view of a session's connection health
#[derive(Debug, Clone)]
pub struct SyncStatus {
    /// True while snapshot fetches are succeeding
    pub live: bool,
    /// Consecutive failed fetch attempts, zero while live
    pub reconnect_attempts: u32,
    /// When the element was last reconciled against shared state
    pub last_synced: Option<DateTime<Utc>>,
}

impl ViewerSession {
    pub(crate) fn new(
        context: &CollabContext,
        room_id: RoomId,
        user_id: String,
        element: Arc<dyn MediaElement>,
        device: DeviceClass,
        profile: SourceProfile,
    ) -> Self {
        let watcher = RoomWatcher::new(context, room_id.clone());

        let reconciler = Arc::new(Mutex::new(Reconciler::new(
            context.config.sync.clone(),
            device,
            profile,
        )));
        let last_synced = Arc::new(Mutex::new(None));

        let task = ViewerTask {
            manager: RoomManager::new(context),
            context: context.clone(),
            room_id,
            user_id,
            element,
            device,
            reconciler: reconciler.clone(),
            last_synced: last_synced.clone(),
            snapshots: watcher.snapshots(),
        };

        Self {
            watcher,
            reconciler,
            last_synced,
            task: tokio::spawn(task.run()).abort_handle(),
        }
    }

    /// The watcher delivering snapshots to this session
    pub fn watcher(&self) -> &RoomWatcher {
        &self.watcher
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            live: self.watcher.is_live(),
            reconnect_attempts: self.watcher.reconnect_attempts(),
            last_synced: *self.last_synced.lock(),
        }
    }

    /// Wakes a parked watcher, see [`RoomWatcher::retry_now`]
    pub fn retry_now(&self) {
        self.watcher.retry_now();
    }

    /// Marks the start of a user driven seek, suspending corrections
    /// until [`end_seek`](Self::end_seek)
    pub fn begin_seek(&self) {
        self.reconciler.lock().begin_seek();
    }

    pub fn end_seek(&self) {
        self.reconciler.lock().end_seek();
    }

    /// Records a scroll interaction, briefly debouncing corrections
    pub fn note_scroll(&self) {
        self.reconciler.lock().note_scroll();
    }
}

impl Drop for ViewerSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct ViewerTask {
    manager: RoomManager,
    context: CollabContext,
    room_id: RoomId,
    user_id: String,
    element: Arc<dyn MediaElement>,
    device: DeviceClass,
    reconciler: Arc<Mutex<Reconciler>>,
    last_synced: Arc<Mutex<Option<DateTime<Utc>>>>,
    snapshots: watch::Receiver<Option<RoomSnapshot>>,
}

impl ViewerTask {
    async fn run(mut self) {
        let mut ticks =
            tokio::time::interval(self.context.config.sync.sync_interval(self.device));
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut heartbeat = tokio::time::interval(self.context.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut seen_room = false;

        loop {
            select! {
                _ = ticks.tick() => self.reconcile(),
                result = self.snapshots.changed() => {
                    if result.is_err() {
                        return;
                    }

                    if self.snapshots.borrow_and_update().is_some() {
                        seen_room = true;
                        // React to pushed changes without waiting out the interval
                        self.reconcile();
                    } else if seen_room {
                        debug!("Room {} is gone, ending the viewer session", self.room_id);
                        return;
                    }
                }
                _ = heartbeat.tick() => {
                    self.manager.touch_member(&self.room_id, &self.user_id).await;
                }
            }
        }
    }

    fn reconcile(&self) {
        let shared = {
            let borrowed = self.snapshots.borrow();

            let Some(snapshot) = borrowed.as_ref() else {
                return;
            };

            // The host's element is the authority, never correct it
            if snapshot
                .host()
                .is_some_and(|host| host.user_id == self.user_id)
            {
                return;
            }

            // Embedded pages cannot be steered, they run free
            match &snapshot.room.video {
                Some(video) if video.synchronizable() => snapshot.room.playback,
                _ => return,
            }
        };

        let outcome = self.reconciler.lock().tick(shared, self.element.as_ref());

        if let TickOutcome::Ran(report) = outcome {
            if let Some(position) = report.seeked_to {
                debug!(
                    "Corrected the element in room {} to {:.1}s",
                    self.room_id, position
                );
            }

            *self.last_synced.lock() = Some(Utc::now());
        }
    }
}
