use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use matinee_core::{PlaybackState, VideoRef};
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

pub type Result<T> = std::result::Result<T, RepositoryError>;

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// An unknown or internal error happened with the store
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the store doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: String,
    },
}

/// The table scope a change notification refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeScope {
    Room,
    Members,
    Chat,
}

/// A payload-free notification from a room's change feed.
///
/// A notice is a trigger to re-fetch the authoritative snapshot, never
/// a delta, which makes delivery idempotent and immune to missed,
/// duplicated, or reordered notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeNotice {
    /// The subscription is confirmed and will deliver changes
    Established,
    /// Something in the given scope changed
    Changed(ChangeScope),
}

/// The end of the stream means the transport failed or the room is gone
pub type ChangeStream = Pin<Box<dyn Stream<Item = ChangeNotice> + Send>>;

/// Represents a type that can store and distribute matinee rooms.
///
/// Mutations are single-row, keyed by room id or (room id, user id).
/// Mutating calls also refresh the room's activity timestamp, except
/// the explicit touch operations which refresh nothing else and stay
/// silent on the change feed.
#[async_trait]
pub trait Repository: Send + Sync + 'static {
    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData>;
    async fn room_by_id(&self, room_id: &str) -> Result<RoomData>;
    async fn list_rooms(&self) -> Result<Vec<RoomData>>;
    async fn update_room_name(&self, room_id: &str, name: &str) -> Result<RoomData>;
    async fn update_room_creator(&self, room_id: &str, user_id: &str) -> Result<RoomData>;
    /// Replacing the video always resets playback to the stopped state
    async fn update_room_video(&self, room_id: &str, video: Option<VideoRef>) -> Result<RoomData>;
    async fn update_room_playback(&self, room_id: &str, playback: PlaybackState)
        -> Result<RoomData>;
    async fn touch_room(&self, room_id: &str) -> Result<()>;
    /// Deleting an absent room is a no-op, not an error
    async fn delete_room(&self, room_id: &str) -> Result<()>;

    /// Inserts the member, or refreshes the existing row for the same
    /// user. An upsert never revokes a host flag, revocation goes
    /// through [`Repository::set_member_host`].
    async fn upsert_member(&self, new_member: NewMember) -> Result<MemberData>;
    async fn members_of(&self, room_id: &str) -> Result<Vec<MemberData>>;
    async fn set_member_host(&self, room_id: &str, user_id: &str, host: bool)
        -> Result<MemberData>;
    /// Refreshes the member's and the room's activity timestamps
    async fn touch_member(&self, room_id: &str, user_id: &str) -> Result<()>;
    /// Deleting an absent member is a no-op, not an error
    async fn delete_member(&self, room_id: &str, user_id: &str) -> Result<()>;

    async fn append_message(&self, new_message: NewMessage) -> Result<MessageData>;
    /// At most `limit` most recent messages, in ascending send order
    async fn recent_messages(&self, room_id: &str, limit: usize) -> Result<Vec<MessageData>>;

    /// Opens the change feed of a room
    async fn subscribe(&self, room_id: &str) -> Result<ChangeStream>;
}

#[derive(Debug)]
pub struct NewRoom {
    pub id: String,
    pub name: String,
    /// The creator of the new room
    pub creator_user_id: String,
}

#[derive(Debug)]
pub struct NewMember {
    pub room_id: String,
    pub user_id: String,
    pub name: String,
    pub host: bool,
}

#[derive(Debug)]
pub struct NewMessage {
    pub room_id: String,
    pub user_id: String,
    pub author: String,
    pub text: String,
}
