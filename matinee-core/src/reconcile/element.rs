use thiserror::Error;

/// The local media surface the engine inspects and corrects.
///
/// Implementations wrap whatever renders the video, such as an HTML
/// media element behind a webview bridge or a scripted stand-in.
pub trait MediaElement: Send + Sync + 'static {
    /// The locally observed position, in seconds
    fn position(&self) -> f64;

    /// Returns true if the element is paused
    fn is_paused(&self) -> bool;

    /// Returns true if the element reports that it cannot currently advance
    fn is_buffering(&self) -> bool;

    /// Starts playback. The platform may refuse, most commonly due to
    /// an autoplay policy when the user has not interacted yet.
    fn play(&self) -> Result<(), PlayRejected>;

    /// Pauses playback
    fn pause(&self);

    /// Moves playback to the given position, in seconds
    fn seek(&self, position: f64);
}

/// Returned when the platform refuses to start playback
#[derive(Debug, Clone, Error)]
#[error("playback start rejected: {reason}")]
pub struct PlayRejected {
    pub reason: String,
}
