//! All schemas that are exposed from endpoints are defined here
//! along with the conversions from collab types

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use matinee_collab::{
    MemberData, MessageData, RoomData, RoomSnapshot as CollabSnapshot,
};
use matinee_core::{PlaybackState, VideoRef};

use crate::schemas::VideoKindSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    id: String,
    name: String,
    creator_user_id: String,
    video: Option<Video>,
    playback: Playback,
    created_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    id: String,
    title: String,
    url: String,
    thumbnail: Option<String>,
    kind: VideoKindSchema,
    /// False for page embeds, which render but are never steered
    synchronizable: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Playback {
    is_playing: bool,
    /// Seconds from the start of the video
    position: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    user_id: String,
    name: String,
    host: bool,
    joined_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    id: String,
    user_id: String,
    author: String,
    text: String,
    sent_at: DateTime<Utc>,
}

/// The full view of a room that clients re-fetch on every change notice
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    room: Room,
    members: Vec<Member>,
    messages: Vec<Message>,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl<I, O> ToSerialized<Option<O>> for Option<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Option<O> {
        self.as_ref().map(|x| x.to_serialized())
    }
}

impl ToSerialized<Room> for RoomData {
    fn to_serialized(&self) -> Room {
        Room {
            id: self.id.clone(),
            name: self.name.clone(),
            creator_user_id: self.creator_user_id.clone(),
            video: self.video.to_serialized(),
            playback: self.playback.to_serialized(),
            created_at: self.created_at,
            last_active: self.last_active,
        }
    }
}

impl ToSerialized<Video> for VideoRef {
    fn to_serialized(&self) -> Video {
        Video {
            id: self.id.clone(),
            title: self.title.clone(),
            url: self.url.clone(),
            thumbnail: self.thumbnail.clone(),
            kind: self.kind.clone().into(),
            synchronizable: self.synchronizable(),
        }
    }
}

impl ToSerialized<Playback> for PlaybackState {
    fn to_serialized(&self) -> Playback {
        Playback {
            is_playing: self.is_playing,
            position: self.position,
        }
    }
}

impl ToSerialized<Member> for MemberData {
    fn to_serialized(&self) -> Member {
        Member {
            user_id: self.user_id.clone(),
            name: self.name.clone(),
            host: self.host,
            joined_at: self.joined_at,
            last_active: self.last_active,
        }
    }
}

impl ToSerialized<Message> for MessageData {
    fn to_serialized(&self) -> Message {
        Message {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            author: self.author.clone(),
            text: self.text.clone(),
            sent_at: self.sent_at,
        }
    }
}

impl ToSerialized<Snapshot> for CollabSnapshot {
    fn to_serialized(&self) -> Snapshot {
        Snapshot {
            room: self.room.to_serialized(),
            members: self.members.to_serialized(),
            messages: self.messages.to_serialized(),
        }
    }
}
