use crossbeam::channel::{Receiver, Sender};

use crate::{MemberData, MessageData, RoomData, RoomId};

pub type EventSender = Sender<CollabEvent>;
pub type EventReceiver = Receiver<CollabEvent>;

/// Events emitted by the collab system, distributed to remote clients
/// by the server's push channel. Like the repository feed, these are
/// re-fetch triggers first, the payload is a convenience.
#[derive(Debug, Clone)]
pub enum CollabEvent {
    /// The room row changed, name, video, or playback
    RoomUpdated { room_id: RoomId, room: RoomData },
    /// A user became a member of a room
    UserJoined {
        room_id: RoomId,
        new_member: MemberData,
    },
    /// A user left a room, or was evicted after going stale
    UserLeft { room_id: RoomId, user_id: String },
    /// The host flag moved to another member
    HostChanged {
        room_id: RoomId,
        new_host: MemberData,
    },
    /// A chat message was sent to a room
    MessageSent {
        room_id: RoomId,
        message: MessageData,
    },
    /// A room was deleted after sitting empty past its grace period
    RoomDeleted { room_id: RoomId },
}
