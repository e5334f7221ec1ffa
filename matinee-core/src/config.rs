use std::time::Duration;

use crate::{DeviceClass, SourceProfile};

/// The tuning parameters of the playback sync engine
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How often a desktop viewer reconciles against the shared state
    pub desktop_sync_interval: Duration,
    /// How often a mobile viewer reconciles against the shared state
    pub mobile_sync_interval: Duration,
    /// Tolerated drift in seconds for embedded players on desktop
    pub embed_drift_desktop: f64,
    /// Tolerated drift in seconds for embedded players on mobile
    pub embed_drift_mobile: f64,
    /// Tolerated drift in seconds for direct files on desktop
    pub file_drift_desktop: f64,
    /// Tolerated drift in seconds for direct files on mobile
    pub file_drift_mobile: f64,
    /// How long corrections stay suppressed after a scroll gesture
    pub gesture_debounce: Duration,
}

impl SyncConfig {
    /// Returns how often the engine should run for a device
    pub fn sync_interval(&self, device: DeviceClass) -> Duration {
        match device {
            DeviceClass::Desktop => self.desktop_sync_interval,
            DeviceClass::Mobile => self.mobile_sync_interval,
        }
    }

    /// Returns the drift in seconds a device tolerates before seeking
    pub fn drift_threshold(&self, device: DeviceClass, profile: SourceProfile) -> f64 {
        match (profile, device) {
            (SourceProfile::EmbeddedPlayer, DeviceClass::Desktop) => self.embed_drift_desktop,
            (SourceProfile::EmbeddedPlayer, DeviceClass::Mobile) => self.embed_drift_mobile,
            (SourceProfile::DirectFile, DeviceClass::Desktop) => self.file_drift_desktop,
            (SourceProfile::DirectFile, DeviceClass::Mobile) => self.file_drift_mobile,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            desktop_sync_interval: Duration::from_secs(1),
            // Mobile ticks slower to save battery and reduce visible stutter
            mobile_sync_interval: Duration::from_secs(2),
            embed_drift_desktop: 2.,
            // Embedded players on mobile report positions late, so allow a bit more
            embed_drift_mobile: 3.,
            file_drift_desktop: 2.,
            // Loosest threshold, frequent buffering makes tight corrections thrash
            file_drift_mobile: 4.,
            gesture_debounce: Duration::from_millis(200),
        }
    }
}
