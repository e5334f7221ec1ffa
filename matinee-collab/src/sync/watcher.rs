use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::sync::{watch, Notify};
use tokio::task::AbortHandle;
use tokio::time::{timeout, MissedTickBehavior};

use crate::{
    ChangeNotice, ChangeStream, CollabContext, RoomError, RoomId, RoomManager, RoomSnapshot,
};

/// Follows one room and keeps the latest authoritative snapshot
/// available locally.
///
/// The watcher prefers the repository's push feed, but only trusts it
/// once the feed confirms itself within the configured window. A feed
/// that never confirms, or closes later, degrades the watcher to
/// interval polling, which is the mode of last resort and never given
/// up on. Either way, a notice or a poll tick triggers the same thing:
/// a full snapshot re-fetch.
///
/// Failed fetches retry with capped exponential backoff. Once the
/// retry budget is spent the watcher parks and waits for an explicit
/// [`retry_now`](Self::retry_now), so a dead repository is not hammered
/// forever.
///
/// Dropping the watcher stops the background task.
pub struct RoomWatcher {
    room_id: RoomId,
    snapshots: watch::Receiver<Option<RoomSnapshot>>,
    live: watch::Receiver<bool>,
    attempts: Arc<AtomicU32>,
    retry: Arc<Notify>,
    task: AbortHandle,
}

impl RoomWatcher {
    pub(crate) fn new(context: &CollabContext, room_id: RoomId) -> Self {
        let (snapshot_sender, snapshot_receiver) = watch::channel(None);
        let (live_sender, live_receiver) = watch::channel(false);
        let attempts = Arc::new(AtomicU32::new(0));
        let retry = Arc::new(Notify::new());

        let task = WatchTask {
            manager: RoomManager::new(context),
            context: context.clone(),
            room_id: room_id.clone(),
            snapshots: snapshot_sender,
            live: live_sender,
            attempts: attempts.clone(),
            retry: retry.clone(),
        };

        Self {
            room_id,
            snapshots: snapshot_receiver,
            live: live_receiver,
            attempts,
            retry,
            task: tokio::spawn(task.run()).abort_handle(),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// A channel of snapshot updates. Holds `None` until the first
    /// fetch lands, and again once the room is gone
    pub fn snapshots(&self) -> watch::Receiver<Option<RoomSnapshot>> {
        self.snapshots.clone()
    }

    /// The most recent snapshot, if any
    pub fn latest(&self) -> Option<RoomSnapshot> {
        self.snapshots.borrow().clone()
    }

    /// True while snapshot fetches are succeeding
    pub fn is_live(&self) -> bool {
        *self.live.borrow()
    }

    /// A channel view of [`is_live`](Self::is_live)
    pub fn liveness(&self) -> watch::Receiver<bool> {
        self.live.clone()
    }

    /// Consecutive failed fetch attempts, zero while live
    pub fn reconnect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Wakes a watcher that parked after spending its retry budget
    pub fn retry_now(&self) {
        self.retry.notify_one();
    }
}

impl Drop for RoomWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum PushEnd {
    RoomGone,
    ChannelLost,
}

struct WatchTask {
    manager: RoomManager,
    context: CollabContext,
    room_id: RoomId,
    snapshots: watch::Sender<Option<RoomSnapshot>>,
    live: watch::Sender<bool>,
    attempts: Arc<AtomicU32>,
    retry: Arc<Notify>,
}

impl WatchTask {
    async fn run(self) {
        // Subscribe before the first fetch so a change landing in
        // between is not missed
        let push = self.establish_push().await;

        if !self.refresh_with_backoff().await {
            return;
        }

        if let Some(stream) = push {
            if let PushEnd::RoomGone = self.push_loop(stream).await {
                return;
            }
        }

        self.poll_loop().await;
    }

    /// Opens the push feed and waits for it to confirm itself
    async fn establish_push(&self) -> Option<ChangeStream> {
        let mut stream = match self.context.repository.subscribe(&self.room_id).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!("Push feed for room {} unavailable: {}", self.room_id, err);
                return None;
            }
        };

        match timeout(self.context.config.push_confirm_timeout, stream.next()).await {
            Ok(Some(ChangeNotice::Established)) => Some(stream),
            // A delivered change proves the feed works just as well
            Ok(Some(ChangeNotice::Changed(_))) => Some(stream),
            Ok(None) => {
                warn!("Push feed for room {} closed before confirming", self.room_id);
                None
            }
            Err(_) => {
                warn!(
                    "Push feed for room {} did not confirm within {:?}",
                    self.room_id, self.context.config.push_confirm_timeout
                );
                None
            }
        }
    }

    /// Consumes notices until the feed closes or the room disappears
    async fn push_loop(&self, mut stream: ChangeStream) -> PushEnd {
        loop {
            match stream.next().await {
                Some(ChangeNotice::Changed(scope)) => {
                    debug!("Room {} changed: {:?}", self.room_id, scope);

                    if !self.refresh_with_backoff().await {
                        return PushEnd::RoomGone;
                    }
                }
                Some(ChangeNotice::Established) => {}
                None => {
                    info!(
                        "Push feed for room {} closed, falling back to polling",
                        self.room_id
                    );
                    return PushEnd::ChannelLost;
                }
            }
        }
    }

    /// The mode of last resort: re-fetch the snapshot on a fixed
    /// interval for as long as the watcher lives
    async fn poll_loop(&self) {
        let mut interval = tokio::time::interval(self.context.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            if !self.refresh_with_backoff().await {
                return;
            }
        }
    }

    /// Fetches until a snapshot lands. Returns false once the room is
    /// gone, which ends the watch.
    async fn refresh_with_backoff(&self) -> bool {
        let mut backoff = self.context.config.backoff();

        loop {
            match self.refresh_once().await {
                Ok(()) => {
                    self.attempts.store(0, Ordering::Relaxed);
                    self.live.send_replace(true);
                    return true;
                }
                Err(RoomError::NotFound(_)) => {
                    debug!("Room {} is gone, ending the watch", self.room_id);
                    self.snapshots.send_replace(None);
                    self.live.send_replace(false);
                    return false;
                }
                Err(err) => {
                    warn!("Snapshot fetch for room {} failed: {}", self.room_id, err);
                    self.live.send_replace(false);

                    match backoff.next_delay() {
                        Some(delay) => {
                            self.attempts.store(backoff.attempts(), Ordering::Relaxed);
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            // Budget spent, hold still until someone asks
                            warn!(
                                "Room {} fetch retries exhausted, parking until retried",
                                self.room_id
                            );
                            self.retry.notified().await;
                            backoff.reset();
                        }
                    }
                }
            }
        }
    }

    async fn refresh_once(&self) -> Result<(), RoomError> {
        let snapshot = self.manager.snapshot(&self.room_id).await?;
        self.snapshots.send_replace(Some(snapshot));

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        Collab, CollabConfig, LocalMediaStore, MemberData, MemoryRepository, MessageData,
        NewMember, NewMessage, NewRoom, Repository, RepositoryError, RoomData, UserProfile,
    };
    use async_trait::async_trait;
    use futures_util::stream;
    use matinee_core::{PlaybackState, VideoRef};
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    /// How the double's push feed misbehaves
    #[derive(Clone, Copy)]
    enum PushStyle {
        /// Delegates to the real feed
        Live,
        /// Closes before saying anything
        Dead,
        /// Stays open but never confirms
        Mute,
        /// Confirms, then closes immediately
        ConfirmThenClose,
    }

    /// Delegates to a real in-memory repository, with switches to
    /// sabotage the paths a watcher depends on
    struct FlakyRepository {
        inner: MemoryRepository,
        healthy: Arc<AtomicBool>,
        push: PushStyle,
    }

    impl FlakyRepository {
        fn new(push: PushStyle) -> (Self, Arc<AtomicBool>) {
            let healthy = Arc::new(AtomicBool::new(true));

            let repository = Self {
                inner: MemoryRepository::new(100),
                healthy: healthy.clone(),
                push,
            };

            (repository, healthy)
        }
    }

    #[async_trait]
    impl Repository for FlakyRepository {
        async fn create_room(&self, new_room: NewRoom) -> crate::db::Result<RoomData> {
            self.inner.create_room(new_room).await
        }

        // The first call a snapshot fetch makes, so the switch lives here
        async fn room_by_id(&self, room_id: &str) -> crate::db::Result<RoomData> {
            if !self.healthy.load(Ordering::Relaxed) {
                return Err(RepositoryError::Internal("connection refused".into()));
            }

            self.inner.room_by_id(room_id).await
        }

        async fn list_rooms(&self) -> crate::db::Result<Vec<RoomData>> {
            self.inner.list_rooms().await
        }

        async fn update_room_name(&self, room_id: &str, name: &str) -> crate::db::Result<RoomData> {
            self.inner.update_room_name(room_id, name).await
        }

        async fn update_room_creator(
            &self,
            room_id: &str,
            user_id: &str,
        ) -> crate::db::Result<RoomData> {
            self.inner.update_room_creator(room_id, user_id).await
        }

        async fn update_room_video(
            &self,
            room_id: &str,
            video: Option<VideoRef>,
        ) -> crate::db::Result<RoomData> {
            self.inner.update_room_video(room_id, video).await
        }

        async fn update_room_playback(
            &self,
            room_id: &str,
            playback: PlaybackState,
        ) -> crate::db::Result<RoomData> {
            self.inner.update_room_playback(room_id, playback).await
        }

        async fn touch_room(&self, room_id: &str) -> crate::db::Result<()> {
            self.inner.touch_room(room_id).await
        }

        async fn delete_room(&self, room_id: &str) -> crate::db::Result<()> {
            self.inner.delete_room(room_id).await
        }

        async fn upsert_member(&self, new_member: NewMember) -> crate::db::Result<MemberData> {
            self.inner.upsert_member(new_member).await
        }

        async fn members_of(&self, room_id: &str) -> crate::db::Result<Vec<MemberData>> {
            self.inner.members_of(room_id).await
        }

        async fn set_member_host(
            &self,
            room_id: &str,
            user_id: &str,
            host: bool,
        ) -> crate::db::Result<MemberData> {
            self.inner.set_member_host(room_id, user_id, host).await
        }

        async fn touch_member(&self, room_id: &str, user_id: &str) -> crate::db::Result<()> {
            self.inner.touch_member(room_id, user_id).await
        }

        async fn delete_member(&self, room_id: &str, user_id: &str) -> crate::db::Result<()> {
            self.inner.delete_member(room_id, user_id).await
        }

        async fn append_message(
            &self,
            new_message: NewMessage,
        ) -> crate::db::Result<MessageData> {
            self.inner.append_message(new_message).await
        }

        async fn recent_messages(
            &self,
            room_id: &str,
            limit: usize,
        ) -> crate::db::Result<Vec<MessageData>> {
            self.inner.recent_messages(room_id, limit).await
        }

        async fn subscribe(&self, room_id: &str) -> crate::db::Result<ChangeStream> {
            match self.push {
                PushStyle::Live => self.inner.subscribe(room_id).await,
                PushStyle::Dead => Ok(Box::pin(stream::empty())),
                PushStyle::Mute => Ok(Box::pin(stream::pending())),
                PushStyle::ConfirmThenClose => {
                    Ok(Box::pin(stream::iter([ChangeNotice::Established])))
                }
            }
        }
    }

    fn collab() -> Collab {
        Collab::new(
            CollabConfig::default(),
            MemoryRepository::new(100),
            LocalMediaStore::new(std::env::temp_dir().join("matinee-watcher-tests")),
        )
    }

    fn user(id: &str) -> UserProfile {
        UserProfile {
            user_id: id.to_string(),
            name: id.to_string(),
        }
    }

    async fn next_matching<F>(
        snapshots: &mut watch::Receiver<Option<RoomSnapshot>>,
        description: &str,
        predicate: F,
    ) -> RoomSnapshot
    where
        F: Fn(&RoomSnapshot) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                {
                    let borrowed = snapshots.borrow_and_update();

                    if let Some(snapshot) = borrowed.as_ref() {
                        if predicate(snapshot) {
                            return snapshot.clone();
                        }
                    }
                }

                snapshots.changed().await.expect("the watcher is alive");
            }
        })
        .await
        .unwrap_or_else(|_| panic!("no snapshot where {}", description))
    }

    #[tokio::test]
    async fn test_push_notices_update_the_snapshot() {
        let collab = collab();

        collab
            .rooms
            .create_room("night", "Movie night", user("alice"))
            .await
            .unwrap();

        let watcher = collab.watch("night");
        let mut snapshots = watcher.snapshots();

        next_matching(&mut snapshots, "alice is present", |s| s.members.len() == 1).await;

        collab.rooms.join_room("night", user("bob")).await.unwrap();

        let snapshot =
            next_matching(&mut snapshots, "bob arrived", |s| s.members.len() == 2).await;

        assert!(watcher.is_live(), "a delivering watcher reports live");
        assert_eq!(
            watcher.reconnect_attempts(),
            0,
            "no retries were needed"
        );
        assert!(
            snapshot.members.iter().any(|m| m.user_id == "bob"),
            "the pushed change is reflected"
        );
    }

    #[tokio::test]
    async fn test_watcher_ends_when_the_room_is_deleted() {
        let collab = Collab::new(
            CollabConfig {
                room_grace_period: Duration::from_millis(30),
                ..Default::default()
            },
            MemoryRepository::new(100),
            LocalMediaStore::new(std::env::temp_dir().join("matinee-watcher-tests")),
        );

        collab
            .rooms
            .create_room("night", "Movie night", user("alice"))
            .await
            .unwrap();

        let watcher = collab.watch("night");
        let mut snapshots = watcher.snapshots();

        next_matching(&mut snapshots, "the room is visible", |_| true).await;

        collab.rooms.leave_room("night", "alice").await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while snapshots.borrow_and_update().is_some() {
                snapshots
                    .changed()
                    .await
                    .expect("the watcher publishes before exiting");
            }
        })
        .await
        .expect("the snapshot clears once the room is gone");

        assert!(!watcher.is_live(), "a gone room is not live");
    }

    #[tokio::test]
    async fn test_dead_push_feed_falls_back_to_polling() {
        let (repository, _) = FlakyRepository::new(PushStyle::Dead);

        let collab = Collab::new(
            CollabConfig {
                poll_interval: Duration::from_millis(20),
                ..Default::default()
            },
            repository,
            LocalMediaStore::new(std::env::temp_dir().join("matinee-watcher-tests")),
        );

        collab
            .rooms
            .create_room("night", "Movie night", user("alice"))
            .await
            .unwrap();

        let watcher = collab.watch("night");
        let mut snapshots = watcher.snapshots();

        next_matching(&mut snapshots, "the first fetch landed", |_| true).await;

        collab.rooms.join_room("night", user("bob")).await.unwrap();

        // Only polling can pick this up, the push feed never confirmed
        next_matching(&mut snapshots, "polling found bob", |s| s.members.len() == 2).await;

        assert!(watcher.is_live(), "polling keeps the watcher live");
    }

    #[tokio::test]
    async fn test_unconfirmed_push_feed_times_out_into_polling() {
        let (repository, _) = FlakyRepository::new(PushStyle::Mute);

        let collab = Collab::new(
            CollabConfig {
                push_confirm_timeout: Duration::from_millis(30),
                poll_interval: Duration::from_millis(20),
                ..Default::default()
            },
            repository,
            LocalMediaStore::new(std::env::temp_dir().join("matinee-watcher-tests")),
        );

        collab
            .rooms
            .create_room("night", "Movie night", user("alice"))
            .await
            .unwrap();

        let watcher = collab.watch("night");
        let mut snapshots = watcher.snapshots();

        next_matching(&mut snapshots, "the first fetch landed", |_| true).await;

        collab.rooms.join_room("night", user("bob")).await.unwrap();

        // The feed held its silence past the window, so polling took over
        next_matching(&mut snapshots, "polling found bob", |s| s.members.len() == 2).await;
    }

    #[tokio::test]
    async fn test_push_feed_closing_mid_session_degrades_to_polling() {
        let (repository, _) = FlakyRepository::new(PushStyle::ConfirmThenClose);

        let collab = Collab::new(
            CollabConfig {
                poll_interval: Duration::from_millis(20),
                ..Default::default()
            },
            repository,
            LocalMediaStore::new(std::env::temp_dir().join("matinee-watcher-tests")),
        );

        collab
            .rooms
            .create_room("night", "Movie night", user("alice"))
            .await
            .unwrap();

        let watcher = collab.watch("night");
        let mut snapshots = watcher.snapshots();

        next_matching(&mut snapshots, "the first fetch landed", |_| true).await;

        collab.rooms.join_room("night", user("bob")).await.unwrap();

        next_matching(&mut snapshots, "polling found bob", |s| s.members.len() == 2).await;

        assert!(watcher.is_live(), "losing push does not end the watcher");
    }

    #[tokio::test]
    async fn test_exhausted_watcher_parks_until_retried() {
        let (repository, healthy) = FlakyRepository::new(PushStyle::Live);

        let collab = Collab::new(
            CollabConfig {
                backoff_base: Duration::from_millis(5),
                backoff_cap: Duration::from_millis(10),
                backoff_attempts: 2,
                ..Default::default()
            },
            repository,
            LocalMediaStore::new(std::env::temp_dir().join("matinee-watcher-tests")),
        );

        collab
            .rooms
            .create_room("night", "Movie night", user("alice"))
            .await
            .unwrap();

        healthy.store(false, Ordering::Relaxed);
        let watcher = collab.watch("night");

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(!watcher.is_live(), "a failing watcher is not live");
        assert_eq!(
            watcher.reconnect_attempts(),
            2,
            "the retry budget was spent"
        );
        assert!(watcher.latest().is_none(), "no snapshot ever landed");

        healthy.store(true, Ordering::Relaxed);
        watcher.retry_now();

        let mut snapshots = watcher.snapshots();
        next_matching(&mut snapshots, "the retry landed a snapshot", |_| true).await;

        assert!(watcher.is_live(), "the watcher recovers once retried");
        assert_eq!(
            watcher.reconnect_attempts(),
            0,
            "the attempt counter resets on success"
        );
    }

    #[tokio::test]
    async fn test_scoped_notices_all_trigger_refetches() {
        let collab = collab();

        collab
            .rooms
            .create_room("night", "Movie night", user("alice"))
            .await
            .unwrap();

        let watcher = collab.watch("night");
        let mut snapshots = watcher.snapshots();

        next_matching(&mut snapshots, "the room is visible", |_| true).await;

        collab
            .rooms
            .send_message("night", "alice", "anyone here?")
            .await
            .unwrap();

        let snapshot = next_matching(&mut snapshots, "chat arrived", |s| !s.messages.is_empty()).await;

        assert_eq!(
            snapshot.messages[0].text, "anyone here?",
            "a chat notice refreshes the whole snapshot"
        );
    }
}
