use log::{debug, info};
use thiserror::Error;

use matinee_core::{PlaybackState, VideoRef};

use crate::{
    CollabContext, CollabEvent, MemberData, MessageData, NewMember, NewMessage, NewRoom,
    RepositoryError, RoomData,
};

pub type RoomId = String;

/// Manages room state: membership, the single host flag, video and
/// playback updates, and chat.
///
/// Every host flag mutation in the system goes through here, behind a
/// named operation with explicit preconditions. Host failover is the
/// only conflict resolution rule there is, there is never more than
/// one authoritative writer for playback state.
pub struct RoomManager {
    context: CollabContext,
}

/// The identity a caller acts on a room with
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub user_id: String,
    pub name: String,
}

/// A full view of a room, the re-fetch target of the distribution layer
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub room: RoomData,
    pub members: Vec<MemberData>,
    pub messages: Vec<MessageData>,
}

impl RoomSnapshot {
    /// The member currently authoritative for playback, if any
    pub fn host(&self) -> Option<&MemberData> {
        self.members.iter().find(|m| m.host)
    }
}

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("room {0} already has members")]
    Conflict(RoomId),
    #[error("room {0} doesn't exist")]
    NotFound(RoomId),
    #[error("user {user_id} is not a member of room {room_id}")]
    NotAMember { room_id: RoomId, user_id: String },
    #[error("{action} is not allowed for this user")]
    Forbidden { action: &'static str },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl RoomManager {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Creates a room with the caller as its sole, host member.
    ///
    /// An existing room id conflicts, unless the room sits empty in its
    /// grace window, in which case it is reclaimed in place with the
    /// previous video intact.
    pub async fn create_room(
        &self,
        room_id: &str,
        name: &str,
        host: UserProfile,
    ) -> Result<RoomSnapshot, RoomError> {
        let existing = match self.context.repository.room_by_id(room_id).await {
            Ok(room) => Some(room),
            Err(RepositoryError::NotFound { .. }) => None,
            Err(e) => return Err(e.into()),
        };

        match existing {
            Some(_) => {
                let members = self.members(room_id).await?;

                if !members.is_empty() {
                    return Err(RoomError::Conflict(room_id.to_string()));
                }

                self.context
                    .repository
                    .update_room_name(room_id, name)
                    .await?;
                self.context
                    .repository
                    .update_room_creator(room_id, &host.user_id)
                    .await?;

                info!("Room {} reclaimed by {}", room_id, host.user_id);
            }
            None => {
                self.context
                    .repository
                    .create_room(NewRoom {
                        id: room_id.to_string(),
                        name: name.to_string(),
                        creator_user_id: host.user_id.clone(),
                    })
                    .await?;

                info!("Room {} created by {}", room_id, host.user_id);
            }
        }

        let new_member = self
            .context
            .repository
            .upsert_member(NewMember {
                room_id: room_id.to_string(),
                user_id: host.user_id,
                name: host.name,
                host: true,
            })
            .await?;

        self.context.cancel_room_deletion(room_id);
        self.context.emit(CollabEvent::UserJoined {
            room_id: room_id.to_string(),
            new_member,
        });

        self.snapshot(room_id).await
    }

    /// Adds the caller to the room. A rejoining user replaces their
    /// prior row rather than duplicating it, which is how reconnection
    /// after a dropped connection avoids phantom members.
    pub async fn join_room(
        &self,
        room_id: &str,
        user: UserProfile,
    ) -> Result<RoomSnapshot, RoomError> {
        self.room(room_id).await?;

        let new_member = self
            .context
            .repository
            .upsert_member(NewMember {
                room_id: room_id.to_string(),
                user_id: user.user_id,
                name: user.name,
                host: false,
            })
            .await?;

        self.context.cancel_room_deletion(room_id);

        // Joining an empty room during its grace window leaves no
        // host, so the earliest join takes the flag
        self.ensure_host(room_id).await?;

        info!("{} joined room {}", new_member.user_id, room_id);
        self.context.emit(CollabEvent::UserJoined {
            room_id: room_id.to_string(),
            new_member,
        });

        self.snapshot(room_id).await
    }

    /// Removes the caller from the room. Returns `None` once the room
    /// is empty and handed to deferred deletion, never deleting
    /// synchronously so a quick rejoin finds the room intact.
    pub async fn leave_room(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<RoomData>, RoomError> {
        let members = match self.context.repository.members_of(room_id).await {
            Ok(members) => members,
            // The room racing away during a leave is expected
            Err(RepositoryError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let Some(leaver) = members.iter().find(|m| m.user_id == user_id) else {
            return self.room(room_id).await.map(Some);
        };
        let was_host = leaver.host;

        self.context.repository.delete_member(room_id, user_id).await?;

        info!("{} left room {}", user_id, room_id);
        self.context.emit(CollabEvent::UserLeft {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
        });

        let remaining = self.members(room_id).await?;

        if remaining.is_empty() {
            self.context.schedule_room_deletion(room_id);
            return Ok(None);
        }

        if was_host {
            self.ensure_host(room_id).await?;
        }

        self.room(room_id).await.map(Some)
    }

    /// Replaces the room's video reference. Playback always resets to
    /// the stopped state, and a stored file the room no longer points
    /// at is cleaned up in the background.
    pub async fn update_video(
        &self,
        room_id: &str,
        acting_user_id: &str,
        video: Option<VideoRef>,
    ) -> Result<RoomData, RoomError> {
        let members = self.members(room_id).await?;
        Self::member_of(&members, room_id, acting_user_id)?;

        let previous = self.room(room_id).await?.video;
        let room = self
            .context
            .repository
            .update_room_video(room_id, video)
            .await?;

        // The old file only goes away if the new reference points elsewhere
        let replaced = previous.filter(|p| {
            room.video
                .as_ref()
                .map(|v| v.url != p.url)
                .unwrap_or(true)
        });

        if let Some(replaced) = replaced {
            self.context.cleanup_media(replaced.url);
        }

        self.context.emit(CollabEvent::RoomUpdated {
            room_id: room_id.to_string(),
            room: room.clone(),
        });

        Ok(room)
    }

    /// Pushes the host's playback state. Positions are accepted as
    /// reported, out of range values are clamped by media elements on
    /// apply.
    pub async fn update_playback(
        &self,
        room_id: &str,
        acting_user_id: &str,
        playback: PlaybackState,
    ) -> Result<RoomData, RoomError> {
        let members = self.members(room_id).await?;
        let acting = Self::member_of(&members, room_id, acting_user_id)?;

        if !acting.host {
            return Err(RoomError::Forbidden {
                action: "updating playback",
            });
        }

        let room = self
            .context
            .repository
            .update_room_playback(room_id, playback)
            .await?;

        self.context.emit(CollabEvent::RoomUpdated {
            room_id: room_id.to_string(),
            room: room.clone(),
        });

        Ok(room)
    }

    /// Moves the host flag to the target member.
    ///
    /// Allowed for the current host, and for the room's creator taking
    /// the flag back for themselves, which keeps a promoted guest from
    /// locking them out.
    pub async fn promote_member(
        &self,
        room_id: &str,
        acting_user_id: &str,
        target_user_id: &str,
    ) -> Result<RoomData, RoomError> {
        let room = self.room(room_id).await?;
        let members = self.members(room_id).await?;

        let acting = Self::member_of(&members, room_id, acting_user_id)?;
        let target = Self::member_of(&members, room_id, target_user_id)?;

        let reclaiming =
            acting_user_id == target_user_id && room.creator_user_id == acting_user_id;

        if !acting.host && !reclaiming {
            return Err(RoomError::Forbidden {
                action: "promoting a member",
            });
        }

        if target.host {
            return Ok(room);
        }

        // Revoke first so there is never a moment with two hosts
        if let Some(previous) = members.iter().find(|m| m.host) {
            self.context
                .repository
                .set_member_host(room_id, &previous.user_id, false)
                .await?;
        }

        let new_host = self
            .context
            .repository
            .set_member_host(room_id, target_user_id, true)
            .await?;

        info!("Host of room {} passed to {}", room_id, new_host.user_id);
        self.context.emit(CollabEvent::HostChanged {
            room_id: room_id.to_string(),
            new_host,
        });

        self.room(room_id).await
    }

    /// Strips the host flag from the target member, passing it to the
    /// earliest joined other member. Host only; the creator cannot be
    /// demoted by anyone but themselves, and the sole member of a room
    /// keeps the flag.
    pub async fn demote_member(
        &self,
        room_id: &str,
        acting_user_id: &str,
        target_user_id: &str,
    ) -> Result<RoomData, RoomError> {
        let room = self.room(room_id).await?;
        let members = self.members(room_id).await?;

        let acting = Self::member_of(&members, room_id, acting_user_id)?;
        let target = Self::member_of(&members, room_id, target_user_id)?;

        if !acting.host {
            return Err(RoomError::Forbidden {
                action: "demoting a member",
            });
        }

        if target_user_id == room.creator_user_id && acting_user_id != target_user_id {
            return Err(RoomError::Forbidden {
                action: "demoting the creator",
            });
        }

        if !target.host {
            return Ok(room);
        }

        let successor = Self::earliest(
            members
                .iter()
                .filter(|m| m.user_id != target_user_id),
        );

        // A non-empty room keeps exactly one host
        let Some(successor) = successor else {
            return Ok(room);
        };

        self.context
            .repository
            .set_member_host(room_id, target_user_id, false)
            .await?;

        let new_host = self
            .context
            .repository
            .set_member_host(room_id, &successor.user_id, true)
            .await?;

        info!("Host of room {} passed to {}", room_id, new_host.user_id);
        self.context.emit(CollabEvent::HostChanged {
            room_id: room_id.to_string(),
            new_host,
        });

        self.room(room_id).await
    }

    /// Appends a chat message with a server generated id and timestamp
    pub async fn send_message(
        &self,
        room_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<MessageData, RoomError> {
        let members = self.members(room_id).await?;
        let sender = Self::member_of(&members, room_id, user_id)?;

        let message = self
            .context
            .repository
            .append_message(NewMessage {
                room_id: room_id.to_string(),
                user_id: user_id.to_string(),
                author: sender.name.clone(),
                text: text.to_string(),
            })
            .await?;

        self.context.emit(CollabEvent::MessageSent {
            room_id: room_id.to_string(),
            message: message.clone(),
        });

        Ok(message)
    }

    /// At most `limit` most recent messages, ascending by send time
    pub async fn recent_messages(
        &self,
        room_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageData>, RoomError> {
        self.context
            .repository
            .recent_messages(room_id, limit)
            .await
            .map_err(|e| Self::room_error(room_id, e))
    }

    /// The full room view, what watchers re-fetch on every notice
    pub async fn snapshot(&self, room_id: &str) -> Result<RoomSnapshot, RoomError> {
        let room = self.room(room_id).await?;
        let members = self.members(room_id).await?;
        let messages = self
            .recent_messages(room_id, self.context.config.chat_history_limit)
            .await?;

        Ok(RoomSnapshot {
            room,
            members,
            messages,
        })
    }

    /// Activity heartbeat. Failures are logged and swallowed, this
    /// runs constantly and self-heals on the next beat
    pub async fn touch_member(&self, room_id: &str, user_id: &str) {
        if let Err(err) = self.context.repository.touch_member(room_id, user_id).await {
            debug!("Heartbeat for {} in room {} failed: {}", user_id, room_id, err);
        }
    }

    pub async fn list_rooms(&self) -> Result<Vec<RoomData>, RoomError> {
        Ok(self.context.repository.list_rooms().await?)
    }

    /// Promotes the earliest joined member when the room has no host
    pub(crate) async fn ensure_host(&self, room_id: &str) -> Result<(), RoomError> {
        let members = self.members(room_id).await?;

        if members.iter().any(|m| m.host) {
            return Ok(());
        }

        if let Some(successor) = Self::earliest(members.iter()) {
            let new_host = self
                .context
                .repository
                .set_member_host(room_id, &successor.user_id, true)
                .await?;

            info!("Host of room {} passed to {}", room_id, new_host.user_id);
            self.context.emit(CollabEvent::HostChanged {
                room_id: room_id.to_string(),
                new_host,
            });
        }

        Ok(())
    }

    /// Deterministic successor pick: lowest joined_at, then lowest user id
    fn earliest<'m>(members: impl Iterator<Item = &'m MemberData>) -> Option<&'m MemberData> {
        members.min_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.user_id.cmp(&b.user_id))
        })
    }

    fn member_of<'m>(
        members: &'m [MemberData],
        room_id: &str,
        user_id: &str,
    ) -> Result<&'m MemberData, RoomError> {
        members
            .iter()
            .find(|m| m.user_id == user_id)
            .ok_or_else(|| RoomError::NotAMember {
                room_id: room_id.to_string(),
                user_id: user_id.to_string(),
            })
    }

    fn room_error(room_id: &str, error: RepositoryError) -> RoomError {
        match error {
            RepositoryError::NotFound {
                resource: "room", ..
            } => RoomError::NotFound(room_id.to_string()),
            e => e.into(),
        }
    }

    async fn room(&self, room_id: &str) -> Result<RoomData, RoomError> {
        self.context
            .repository
            .room_by_id(room_id)
            .await
            .map_err(|e| Self::room_error(room_id, e))
    }

    async fn members(&self, room_id: &str) -> Result<Vec<MemberData>, RoomError> {
        self.context
            .repository
            .members_of(room_id)
            .await
            .map_err(|e| Self::room_error(room_id, e))
    }
}
