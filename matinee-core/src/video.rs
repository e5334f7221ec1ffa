use serde::{Deserialize, Serialize};

/// The video a room is currently watching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRef {
    pub id: String,
    pub title: String,
    /// A direct stream url for files, a page url for embeds
    pub url: String,
    pub thumbnail: Option<String>,
    pub kind: VideoKind,
}

/// The closed set of sources a room can present
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum VideoKind {
    /// A directly streamable file, uploaded or linked
    File,
    /// A third party page embedded in an iframe
    PageEmbed,
    /// A third party tv episode page embedded in an iframe
    EpisodeEmbed { season: u32, episode: u32 },
}

impl VideoRef {
    /// Returns true if host playback state can be applied to this source.
    ///
    /// Cross-origin page embeds expose no control surface, so they are
    /// rendered but left unsynchronized.
    pub fn synchronizable(&self) -> bool {
        matches!(self.kind, VideoKind::File)
    }
}
