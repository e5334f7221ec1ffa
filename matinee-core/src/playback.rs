use serde::{Deserialize, Serialize};

/// The play state and position every member of a room converges on.
///
/// Only the current host writes this. Everyone else treats it as the
/// truth and corrects their local player towards it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    /// Whether playback is running
    pub is_playing: bool,
    /// Seconds from the start of the video
    pub position: f64,
}

impl PlaybackState {
    /// The state a room starts from when a video is set or replaced
    pub fn stopped() -> Self {
        Self {
            is_playing: false,
            position: 0.,
        }
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::stopped()
    }
}

/// Rough class of the viewing device, which decides sync cadence and drift tolerance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceClass {
    Desktop,
    Mobile,
}

/// How a synchronizable video is rendered locally.
///
/// Embedded players answer position queries late and seek sluggishly,
/// so they get their own drift thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceProfile {
    DirectFile,
    EmbeddedPlayer,
}
