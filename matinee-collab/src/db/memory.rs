use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use futures_util::stream::{self, StreamExt};
use matinee_core::{PlaybackState, VideoRef};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::util::random_string;

use super::{
    ChangeNotice, ChangeScope, ChangeStream, MemberData, MessageData, NewMember, NewMessage,
    NewRoom, Repository, RepositoryError, Result, RoomData,
};

/// Notices are tiny and lagged subscribers recover by re-fetching
const FEED_CAPACITY: usize = 64;

/// An in-memory repository, the bundled store for single instance
/// deployments. Rows live in DashMaps keyed by room, chat is a ring
/// buffer, and every room carries its own broadcast change feed.
pub struct MemoryRepository {
    rooms: DashMap<String, RoomData>,
    members: DashMap<String, Vec<MemberData>>,
    messages: DashMap<String, VecDeque<MessageData>>,
    feeds: DashMap<String, broadcast::Sender<ChangeNotice>>,
    chat_limit: usize,
}

impl MemoryRepository {
    pub fn new(chat_limit: usize) -> Self {
        Self {
            rooms: Default::default(),
            members: Default::default(),
            messages: Default::default(),
            feeds: Default::default(),
            chat_limit,
        }
    }

    fn missing_room(room_id: &str) -> RepositoryError {
        RepositoryError::NotFound {
            resource: "room",
            identifier: room_id.to_string(),
        }
    }

    fn missing_member(user_id: &str) -> RepositoryError {
        RepositoryError::NotFound {
            resource: "member",
            identifier: user_id.to_string(),
        }
    }

    /// Applies a mutation to the room row and refreshes its activity
    fn update_room<F>(&self, room_id: &str, apply: F) -> Result<RoomData>
    where
        F: FnOnce(&mut RoomData),
    {
        let mut room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| Self::missing_room(room_id))?;

        apply(&mut room);
        room.last_active = Utc::now();

        Ok(room.clone())
    }

    fn bump_room_activity(&self, room_id: &str) {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            room.last_active = Utc::now();
        }
    }

    fn notify(&self, room_id: &str, scope: ChangeScope) {
        if let Some(feed) = self.feeds.get(room_id) {
            // Nobody listening is fine
            let _ = feed.send(ChangeNotice::Changed(scope));
        }
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        let now = Utc::now();

        let room = RoomData {
            id: new_room.id,
            name: new_room.name,
            creator_user_id: new_room.creator_user_id,
            video: None,
            playback: PlaybackState::stopped(),
            created_at: now,
            last_active: now,
        };

        match self.rooms.entry(room.id.clone()) {
            Entry::Occupied(_) => {
                return Err(RepositoryError::Conflict {
                    resource: "room",
                    field: "id",
                    value: room.id,
                })
            }
            Entry::Vacant(entry) => {
                entry.insert(room.clone());
            }
        }

        self.members.insert(room.id.clone(), Vec::new());
        self.messages.insert(room.id.clone(), VecDeque::new());
        self.feeds
            .insert(room.id.clone(), broadcast::channel(FEED_CAPACITY).0);

        Ok(room)
    }

    async fn room_by_id(&self, room_id: &str) -> Result<RoomData> {
        self.rooms
            .get(room_id)
            .map(|room| room.clone())
            .ok_or_else(|| Self::missing_room(room_id))
    }

    async fn list_rooms(&self) -> Result<Vec<RoomData>> {
        Ok(self.rooms.iter().map(|room| room.clone()).collect())
    }

    async fn update_room_name(&self, room_id: &str, name: &str) -> Result<RoomData> {
        let room = self.update_room(room_id, |room| room.name = name.to_string())?;

        self.notify(room_id, ChangeScope::Room);
        Ok(room)
    }

    async fn update_room_creator(&self, room_id: &str, user_id: &str) -> Result<RoomData> {
        let room = self.update_room(room_id, |room| {
            room.creator_user_id = user_id.to_string()
        })?;

        self.notify(room_id, ChangeScope::Room);
        Ok(room)
    }

    async fn update_room_video(&self, room_id: &str, video: Option<VideoRef>) -> Result<RoomData> {
        let room = self.update_room(room_id, |room| {
            room.video = video;
            // A new video always starts from the beginning, paused
            room.playback = PlaybackState::stopped();
        })?;

        self.notify(room_id, ChangeScope::Room);
        Ok(room)
    }

    async fn update_room_playback(
        &self,
        room_id: &str,
        playback: PlaybackState,
    ) -> Result<RoomData> {
        let room = self.update_room(room_id, |room| room.playback = playback)?;

        self.notify(room_id, ChangeScope::Room);
        Ok(room)
    }

    async fn touch_room(&self, room_id: &str) -> Result<()> {
        self.update_room(room_id, |_| {}).map(|_| ())
    }

    async fn delete_room(&self, room_id: &str) -> Result<()> {
        self.rooms.remove(room_id);
        self.members.remove(room_id);
        self.messages.remove(room_id);
        // Dropping the sender ends every subscriber's stream
        self.feeds.remove(room_id);

        Ok(())
    }

    async fn upsert_member(&self, new_member: NewMember) -> Result<MemberData> {
        if !self.rooms.contains_key(&new_member.room_id) {
            return Err(Self::missing_room(&new_member.room_id));
        }

        let now = Utc::now();

        let member = {
            let mut members = self.members.entry(new_member.room_id.clone()).or_default();

            match members
                .iter_mut()
                .find(|m| m.user_id == new_member.user_id)
            {
                Some(existing) => {
                    existing.name = new_member.name;
                    // A returning member keeps the role they had
                    existing.host = existing.host || new_member.host;
                    existing.last_active = now;
                    existing.clone()
                }
                None => {
                    let member = MemberData {
                        room_id: new_member.room_id.clone(),
                        user_id: new_member.user_id,
                        name: new_member.name,
                        host: new_member.host,
                        joined_at: now,
                        last_active: now,
                    };

                    members.push(member.clone());
                    member
                }
            }
        };

        self.bump_room_activity(&member.room_id);
        self.notify(&member.room_id, ChangeScope::Members);

        Ok(member)
    }

    async fn members_of(&self, room_id: &str) -> Result<Vec<MemberData>> {
        self.members
            .get(room_id)
            .map(|members| members.clone())
            .ok_or_else(|| Self::missing_room(room_id))
    }

    async fn set_member_host(
        &self,
        room_id: &str,
        user_id: &str,
        host: bool,
    ) -> Result<MemberData> {
        let member = {
            let mut members = self
                .members
                .get_mut(room_id)
                .ok_or_else(|| Self::missing_room(room_id))?;

            let member = members
                .iter_mut()
                .find(|m| m.user_id == user_id)
                .ok_or_else(|| Self::missing_member(user_id))?;

            member.host = host;
            member.clone()
        };

        self.bump_room_activity(room_id);
        self.notify(room_id, ChangeScope::Members);

        Ok(member)
    }

    async fn touch_member(&self, room_id: &str, user_id: &str) -> Result<()> {
        let now = Utc::now();

        {
            let mut members = self
                .members
                .get_mut(room_id)
                .ok_or_else(|| Self::missing_room(room_id))?;

            let member = members
                .iter_mut()
                .find(|m| m.user_id == user_id)
                .ok_or_else(|| Self::missing_member(user_id))?;

            member.last_active = now;
        }

        self.bump_room_activity(room_id);

        Ok(())
    }

    async fn delete_member(&self, room_id: &str, user_id: &str) -> Result<()> {
        let removed = {
            let Some(mut members) = self.members.get_mut(room_id) else {
                return Ok(());
            };

            let before = members.len();
            members.retain(|m| m.user_id != user_id);
            members.len() != before
        };

        if removed {
            self.bump_room_activity(room_id);
            self.notify(room_id, ChangeScope::Members);
        }

        Ok(())
    }

    async fn append_message(&self, new_message: NewMessage) -> Result<MessageData> {
        let message = MessageData {
            id: random_string(16),
            room_id: new_message.room_id,
            user_id: new_message.user_id,
            author: new_message.author,
            text: new_message.text,
            sent_at: Utc::now(),
        };

        {
            let mut messages = self
                .messages
                .get_mut(&message.room_id)
                .ok_or_else(|| Self::missing_room(&message.room_id))?;

            messages.push_back(message.clone());

            // Oldest messages fall off first
            while messages.len() > self.chat_limit {
                messages.pop_front();
            }
        }

        self.bump_room_activity(&message.room_id);
        self.notify(&message.room_id, ChangeScope::Chat);

        Ok(message)
    }

    async fn recent_messages(&self, room_id: &str, limit: usize) -> Result<Vec<MessageData>> {
        let messages = self
            .messages
            .get(room_id)
            .ok_or_else(|| Self::missing_room(room_id))?;

        let skip = messages.len().saturating_sub(limit);

        Ok(messages.iter().skip(skip).cloned().collect())
    }

    async fn subscribe(&self, room_id: &str) -> Result<ChangeStream> {
        let receiver = self
            .feeds
            .get(room_id)
            .ok_or_else(|| Self::missing_room(room_id))?
            .subscribe();

        let changes = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(notice) => break Some((notice, receiver)),
                    // A lagged subscriber re-fetches on the next notice anyway
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break None,
                }
            }
        });

        let stream = stream::once(async { ChangeNotice::Established }).chain(changes);

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use futures_util::FutureExt;

    fn new_room(id: &str) -> NewRoom {
        NewRoom {
            id: id.to_string(),
            name: "Movie night".to_string(),
            creator_user_id: "alice".to_string(),
        }
    }

    fn new_member(room_id: &str, user_id: &str, host: bool) -> NewMember {
        NewMember {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            name: user_id.to_string(),
            host,
        }
    }

    fn new_message(room_id: &str, text: &str) -> NewMessage {
        NewMessage {
            room_id: room_id.to_string(),
            user_id: "alice".to_string(),
            author: "alice".to_string(),
            text: text.to_string(),
        }
    }

    async fn repository_with_room() -> MemoryRepository {
        let repository = MemoryRepository::new(100);

        repository
            .create_room(new_room("night"))
            .await
            .expect("room is created");

        repository
    }

    #[tokio::test]
    async fn test_create_room_conflict() {
        let repository = repository_with_room().await;

        let result = repository.create_room(new_room("night")).await;

        assert!(
            matches!(result, Err(RepositoryError::Conflict { .. })),
            "creating the same room twice conflicts"
        );
    }

    #[tokio::test]
    async fn test_upsert_does_not_duplicate() {
        let repository = repository_with_room().await;

        let first = repository
            .upsert_member(new_member("night", "alice", true))
            .await
            .unwrap();

        let second = repository
            .upsert_member(new_member("night", "alice", false))
            .await
            .unwrap();

        let members = repository.members_of("night").await.unwrap();

        assert_eq!(members.len(), 1, "rejoining does not duplicate the row");
        assert_eq!(
            second.joined_at, first.joined_at,
            "the original join time survives a rejoin"
        );
        assert!(second.host, "an upsert never revokes the host flag");
    }

    #[tokio::test]
    async fn test_video_update_resets_playback() {
        let repository = repository_with_room().await;

        repository
            .update_room_playback(
                "night",
                PlaybackState {
                    is_playing: true,
                    position: 120.,
                },
            )
            .await
            .unwrap();

        let video = VideoRef {
            id: "v2".to_string(),
            title: "Second feature".to_string(),
            url: "https://example.com/v2".to_string(),
            thumbnail: None,
            kind: matinee_core::VideoKind::File,
        };

        let room = repository
            .update_room_video("night", Some(video))
            .await
            .unwrap();

        assert_eq!(
            room.playback,
            PlaybackState::stopped(),
            "a replaced video starts paused at zero"
        );
    }

    #[tokio::test]
    async fn test_chat_ring_buffer_drops_oldest() {
        let repository = MemoryRepository::new(3);

        repository.create_room(new_room("night")).await.unwrap();

        for text in ["one", "two", "three", "four", "five"] {
            repository
                .append_message(new_message("night", text))
                .await
                .unwrap();
        }

        let messages = repository.recent_messages("night", 10).await.unwrap();
        let texts: Vec<_> = messages.iter().map(|m| m.text.as_str()).collect();

        assert_eq!(
            texts,
            vec!["three", "four", "five"],
            "only the newest messages survive, in ascending order"
        );
    }

    #[tokio::test]
    async fn test_recent_messages_limit() {
        let repository = repository_with_room().await;

        for text in ["one", "two", "three"] {
            repository
                .append_message(new_message("night", text))
                .await
                .unwrap();
        }

        let messages = repository.recent_messages("night", 2).await.unwrap();
        let texts: Vec<_> = messages.iter().map(|m| m.text.as_str()).collect();

        assert_eq!(texts, vec!["two", "three"], "the limit keeps the newest");
    }

    #[tokio::test]
    async fn test_subscribe_delivers_scoped_notices() {
        let repository = repository_with_room().await;

        let mut feed = repository.subscribe("night").await.unwrap();

        assert_eq!(
            feed.next().await,
            Some(ChangeNotice::Established),
            "the feed confirms itself first"
        );

        repository
            .update_room_playback("night", PlaybackState::stopped())
            .await
            .unwrap();

        assert_eq!(
            feed.next().await,
            Some(ChangeNotice::Changed(ChangeScope::Room)),
            "room changes arrive with the room scope"
        );

        repository
            .upsert_member(new_member("night", "bob", false))
            .await
            .unwrap();

        assert_eq!(
            feed.next().await,
            Some(ChangeNotice::Changed(ChangeScope::Members)),
            "member changes arrive with the members scope"
        );

        repository
            .append_message(new_message("night", "hello"))
            .await
            .unwrap();

        assert_eq!(
            feed.next().await,
            Some(ChangeNotice::Changed(ChangeScope::Chat)),
            "chat changes arrive with the chat scope"
        );
    }

    #[tokio::test]
    async fn test_touches_stay_off_the_feed() {
        let repository = repository_with_room().await;

        repository
            .upsert_member(new_member("night", "alice", true))
            .await
            .unwrap();

        let mut feed = repository.subscribe("night").await.unwrap();
        feed.next().await;

        repository.touch_member("night", "alice").await.unwrap();
        repository.touch_room("night").await.unwrap();

        assert!(
            feed.next().now_or_never().is_none(),
            "heartbeats do not wake subscribers"
        );
    }

    #[tokio::test]
    async fn test_feed_ends_when_room_is_deleted() {
        let repository = repository_with_room().await;

        let mut feed = repository.subscribe("night").await.unwrap();
        feed.next().await;

        repository.delete_room("night").await.unwrap();

        assert_eq!(feed.next().await, None, "deletion closes the feed");
    }

    #[tokio::test]
    async fn test_deletes_degrade_to_noops() {
        let repository = MemoryRepository::new(100);

        assert!(
            repository.delete_room("gone").await.is_ok(),
            "deleting an absent room is fine"
        );
        assert!(
            repository.delete_member("gone", "alice").await.is_ok(),
            "deleting an absent member is fine"
        );
    }
}
