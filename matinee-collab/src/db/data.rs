use chrono::{DateTime, Utc};
use matinee_core::{PlaybackState, VideoRef};

/// A watch room
#[derive(Debug, Clone)]
pub struct RoomData {
    /// An opaque string id, treated as an unguessable capability token
    pub id: String,
    pub name: String,
    /// The user that created the room, protected from demotion by others
    pub creator_user_id: String,
    pub video: Option<VideoRef>,
    pub playback: PlaybackState,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// A member of a room
#[derive(Debug, Clone)]
pub struct MemberData {
    pub room_id: String,
    /// A client generated token, stable for one browser session only
    pub user_id: String,
    pub name: String,
    /// If this is true, the member is authoritative for playback state
    pub host: bool,
    pub joined_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// A chat message sent to a room
#[derive(Debug, Clone)]
pub struct MessageData {
    pub id: String,
    pub room_id: String,
    pub user_id: String,
    /// The author's display name at the time of sending
    pub author: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}
