mod config;
mod db;
mod events;
mod lifecycle;
mod media;
mod rooms;
mod sync;
mod util;

use std::sync::Arc;

use dashmap::DashMap;
use log::warn;
use tokio::task::AbortHandle;

pub use config::*;
pub use db::*;
pub use events::*;
pub use lifecycle::*;
pub use media::*;
pub use rooms::*;
pub use sync::*;

use matinee_core::{DeviceClass, MediaElement, SourceProfile};

/// The matinee collab system: rooms, the sync sessions that follow
/// them, and the lifecycle that cleans up after both.
pub struct Collab {
    pub rooms: RoomManager,
    pub lifecycle: LifecycleSupervisor,

    context: CollabContext,
    event_receiver: EventReceiver,
}

/// A type passed to the components of the collab system, to access
/// state, emit events, and dispatch actions.
#[derive(Clone)]
pub struct CollabContext {
    pub config: CollabConfig,
    pub repository: Arc<dyn Repository>,
    pub media: Arc<dyn MediaStore>,

    event_sender: EventSender,
    /// Pending deferred room deletions, keyed by room id
    pub(crate) deletions: Arc<DashMap<RoomId, AbortHandle>>,
}

impl Collab {
    pub fn new(config: CollabConfig, repository: impl Repository, media: impl MediaStore) -> Self {
        let (event_sender, event_receiver) = crossbeam::channel::unbounded();

        let context = CollabContext {
            config,
            repository: Arc::new(repository),
            media: Arc::new(media),
            event_sender,
            deletions: Default::default(),
        };

        Self {
            rooms: RoomManager::new(&context),
            lifecycle: LifecycleSupervisor::new(&context),
            context,
            event_receiver,
        }
    }

    /// Starts background upkeep. Call once, from within the runtime.
    pub fn start(&self) {
        self.lifecycle.run();
    }

    /// Returns the receiver end of collab events
    pub fn events(&self) -> EventReceiver {
        self.event_receiver.clone()
    }

    pub fn context(&self) -> &CollabContext {
        &self.context
    }

    /// Follows a room's state without joining it
    pub fn watch(&self, room_id: &str) -> RoomWatcher {
        RoomWatcher::new(&self.context, room_id.to_string())
    }

    /// Starts a session correcting `element` towards the room's shared
    /// playback state
    pub fn viewer_session(
        &self,
        room_id: &str,
        user_id: &str,
        element: Arc<dyn MediaElement>,
        device: DeviceClass,
        profile: SourceProfile,
    ) -> ViewerSession {
        ViewerSession::new(
            &self.context,
            room_id.to_string(),
            user_id.to_string(),
            element,
            device,
            profile,
        )
    }

    /// Starts a session publishing the user's playback into the room
    pub fn host_session(&self, room_id: &str, user_id: &str) -> HostSession {
        HostSession::new(&self.context, room_id.to_string(), user_id.to_string())
    }
}

impl CollabContext {
    /// Emits a collab event
    pub(crate) fn emit(&self, event: CollabEvent) {
        let _ = self.event_sender.send(event);
    }

    /// Deletes a stored media resource in the background, if it is
    /// ours to delete
    pub(crate) fn cleanup_media(&self, url: String) {
        if !self.media.owns(&url) {
            return;
        }

        let media = self.media.clone();

        tokio::spawn(async move {
            if let Err(err) = media.delete(&url).await {
                warn!("Could not delete stored media {}: {}", url, err);
            }
        });
    }
}
