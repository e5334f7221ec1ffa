use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
    routing::get,
};
use futures_util::Stream;
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    collections::VecDeque,
    convert::Infallible,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    task::{Context, Poll, Waker},
};
use utoipa::ToSchema;

use matinee_collab::CollabEvent;
use matinee_core::Id;

use crate::{
    context::ServerContext,
    serialized::{Member, Message, Room, ToSerialized},
    Router,
};

type ConnectionId = Id<Connection>;

/// What a room's event stream delivers. Every event names its room and
/// doubles as a change notice, clients re-fetch the snapshot rather
/// than patching local state from payloads.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum ServerEvent {
    /// The room's video or playback changed
    RoomUpdated { room_id: String, room: Room },
    /// A user became a member of the room
    UserJoined { room_id: String, new_member: Member },
    /// A user left the room
    UserLeft { room_id: String, user_id: String },
    /// The host flag moved to another member
    HostChanged { room_id: String, new_host: Member },
    /// A chat message arrived
    MessageSent { room_id: String, message: Message },
    /// The room is gone, the stream ends after this
    RoomDeleted { room_id: String },
}

impl ServerEvent {
    fn room_id(&self) -> &str {
        match self {
            Self::RoomUpdated { room_id, .. } => room_id,
            Self::UserJoined { room_id, .. } => room_id,
            Self::UserLeft { room_id, .. } => room_id,
            Self::HostChanged { room_id, .. } => room_id,
            Self::MessageSent { room_id, .. } => room_id,
            Self::RoomDeleted { room_id } => room_id,
        }
    }
}

impl From<CollabEvent> for ServerEvent {
    fn from(value: CollabEvent) -> Self {
        match value {
            CollabEvent::RoomUpdated { room_id, room } => Self::RoomUpdated {
                room_id,
                room: room.to_serialized(),
            },
            CollabEvent::UserJoined {
                room_id,
                new_member,
            } => Self::UserJoined {
                room_id,
                new_member: new_member.to_serialized(),
            },
            CollabEvent::UserLeft { room_id, user_id } => Self::UserLeft { room_id, user_id },
            CollabEvent::HostChanged { room_id, new_host } => Self::HostChanged {
                room_id,
                new_host: new_host.to_serialized(),
            },
            CollabEvent::MessageSent { room_id, message } => Self::MessageSent {
                room_id,
                message: message.to_serialized(),
            },
            CollabEvent::RoomDeleted { room_id } => Self::RoomDeleted { room_id },
        }
    }
}

/// Manages server sent event connections, each following one room
pub struct ServerSentEvents {
    me: Weak<Self>,
    connections: Mutex<Vec<Connection>>,
}

struct Connection {
    id: ConnectionId,
    room_id: String,
    pending_messages: Arc<Mutex<VecDeque<ServerEvent>>>,
    /// Set once the room is deleted, the stream ends after draining
    done: Arc<AtomicBool>,
    waker: Arc<Mutex<Option<Waker>>>,
}

pub struct ConnectionHandle {
    id: ConnectionId,
    /// A reference to [Connection]'s pending messages
    pending_messages: Arc<Mutex<VecDeque<ServerEvent>>>,
    done: Arc<AtomicBool>,
    /// A reference to [Connection]'s stored [Waker]
    waker: Arc<Mutex<Option<Waker>>>,
    /// Required to remove the connection when dropped
    manager: Weak<ServerSentEvents>,
}

impl ServerSentEvents {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            connections: Default::default(),
        })
    }

    /// Delivers an event to every connection following its room
    pub fn broadcast(&self, event: ServerEvent) {
        let connections = self.connections.lock();

        for connection in connections.iter() {
            if connection.room_id == event.room_id() {
                connection.send(event.clone())
            }
        }
    }

    fn connect(&self, room_id: String) -> ConnectionHandle {
        let connection = Connection::new(room_id);
        let handle = connection.handle(self.me.clone());

        self.connections.lock().push(connection);
        handle
    }

    fn disconnect(&self, id: ConnectionId) {
        self.connections.lock().retain(|c| c.id != id)
    }
}

impl Connection {
    fn new(room_id: String) -> Self {
        Self {
            id: ConnectionId::new(),
            room_id,
            pending_messages: Default::default(),
            done: Default::default(),
            waker: Default::default(),
        }
    }

    fn send(&self, message: ServerEvent) {
        let ends_the_stream = matches!(message, ServerEvent::RoomDeleted { .. });

        self.pending_messages.lock().push_back(message);

        if ends_the_stream {
            self.done.store(true, Ordering::Relaxed);
        }

        if let Some(waker) = self.waker.lock().take() {
            waker.wake()
        }
    }

    fn handle(&self, manager: Weak<ServerSentEvents>) -> ConnectionHandle {
        ConnectionHandle {
            id: self.id,
            pending_messages: self.pending_messages.clone(),
            done: self.done.clone(),
            waker: self.waker.clone(),
            manager,
        }
    }
}

impl Stream for ConnectionHandle {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut pending_messages = self.pending_messages.lock();

        let next_event = pending_messages
            .pop_front()
            .map(|m| serde_json::to_string(&m).expect("serializes properly"));

        if let Some(event) = next_event {
            return Poll::Ready(Some(Ok(Event::default().data(event))));
        }

        if self.done.load(Ordering::Relaxed) {
            return Poll::Ready(None);
        }

        *self.waker.lock() = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.disconnect(self.id)
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}/events",
    tag = "events",
    responses(
        (
            status = 200,
            content_type = "text/event-stream",
            description = "A stream of events from one room",
            body = ServerEvent
        )
    )
)]
async fn event_stream(
    State(context): State<ServerContext>,
    Path(room_id): Path<String>,
) -> Sse<ConnectionHandle> {
    Sse::new(context.sse.connect(room_id)).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod test {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_broadcasts_are_scoped_and_deletion_ends_the_stream() {
        let sse = ServerSentEvents::new();
        let mut night = sse.connect("night".to_string());
        let mut lounge = sse.connect("lounge".to_string());

        sse.broadcast(ServerEvent::UserLeft {
            room_id: "night".to_string(),
            user_id: "alice".to_string(),
        });
        sse.broadcast(ServerEvent::RoomDeleted {
            room_id: "night".to_string(),
        });
        sse.broadcast(ServerEvent::RoomDeleted {
            room_id: "lounge".to_string(),
        });

        assert!(night.next().await.is_some(), "the scoped event arrives");
        assert!(night.next().await.is_some(), "the deletion notice arrives");
        assert!(night.next().await.is_none(), "a deleted room ends its stream");

        assert!(
            lounge.next().await.is_some(),
            "other rooms see only their own events"
        );
        assert!(
            lounge.next().await.is_none(),
            "each stream ends on its own room's deletion"
        );
    }
}

pub fn router() -> Router {
    Router::new().route("/:id/events", get(event_stream))
}
