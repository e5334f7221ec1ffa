mod element;
mod guard;

pub use element::*;
pub use guard::*;

use std::time::Instant;

use crate::{DeviceClass, PlaybackState, SourceProfile, SyncConfig};

/// Corrects a local media element towards the shared playback state.
///
/// Runs on every member that is not the current host. Corrections are
/// deliberately coarse, a viewer is allowed to drift up to the
/// configured threshold at all times, because small corrections on a
/// jittery connection read as stutter.
pub struct Reconciler {
    config: SyncConfig,
    device: DeviceClass,
    profile: SourceProfile,
    guard: GestureGuard,
    last_tick: Option<Instant>,
}

/// What a single reconciliation pass did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    Ran(TickReport),
    /// The pass bailed before touching the element
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickReport {
    /// Observed distance from the shared position, in seconds
    pub drift: f64,
    /// The position the element was corrected to, if drift crossed the threshold
    pub seeked_to: Option<f64>,
    /// True when a threshold crossing seek was withheld because the element was buffering
    pub seek_suppressed: bool,
    /// The play or pause correction issued, if any
    pub transport: Option<TransportCorrection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCorrection {
    Played,
    /// Play was issued but the platform refused, usually an autoplay policy
    PlayRejected,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The sync interval has not elapsed since the previous pass
    Throttled,
    /// A user seek or scroll gesture is in flight
    Gesture,
}

impl Reconciler {
    pub fn new(config: SyncConfig, device: DeviceClass, profile: SourceProfile) -> Self {
        let guard = GestureGuard::new(config.gesture_debounce);

        Self {
            config,
            device,
            profile,
            guard,
            last_tick: None,
        }
    }

    /// Runs a reconciliation pass against the element
    pub fn tick<E>(&mut self, shared: PlaybackState, element: &E) -> TickOutcome
    where
        E: MediaElement + ?Sized,
    {
        self.tick_at(Instant::now(), shared, element)
    }

    pub fn tick_at<E>(&mut self, now: Instant, shared: PlaybackState, element: &E) -> TickOutcome
    where
        E: MediaElement + ?Sized,
    {
        let interval = self.config.sync_interval(self.device);

        let elapsed = self
            .last_tick
            .map(|last| now.saturating_duration_since(last));

        if elapsed.is_some_and(|elapsed| elapsed < interval) {
            return TickOutcome::Skipped(SkipReason::Throttled);
        }

        self.last_tick = Some(now);

        if self.guard.is_active_at(now) {
            return TickOutcome::Skipped(SkipReason::Gesture);
        }

        let mut report = TickReport {
            drift: (element.position() - shared.position).abs(),
            ..Default::default()
        };

        let threshold = self.config.drift_threshold(self.device, self.profile);

        if report.drift > threshold {
            // Seeking a buffering mobile element queues another stall,
            // which manifests as a seek loop
            if self.device == DeviceClass::Mobile && element.is_buffering() {
                report.seek_suppressed = true;
            } else {
                element.seek(shared.position);
                report.seeked_to = Some(shared.position);
            }
        }

        if shared.is_playing && element.is_paused() {
            report.transport = Some(match element.play() {
                Ok(()) => TransportCorrection::Played,
                Err(_) => TransportCorrection::PlayRejected,
            });
        } else if !shared.is_playing && !element.is_paused() {
            element.pause();
            report.transport = Some(TransportCorrection::Paused);
        }

        TickOutcome::Ran(report)
    }

    /// Marks the start of a user driven seek
    pub fn begin_seek(&mut self) {
        self.guard.begin_seek()
    }

    /// Marks the end of a user driven seek
    pub fn end_seek(&mut self) {
        self.guard.end_seek()
    }

    /// Records a scroll interaction
    pub fn note_scroll(&mut self) {
        self.guard.note_scroll()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Action {
        Seek(f64),
        Play,
        Pause,
    }

    #[derive(Default)]
    struct FakeState {
        position: f64,
        paused: bool,
        buffering: bool,
        reject_play: bool,
        actions: Vec<Action>,
    }

    #[derive(Default)]
    struct FakeElement {
        state: Mutex<FakeState>,
    }

    impl FakeElement {
        fn playing_at(position: f64) -> Self {
            Self {
                state: Mutex::new(FakeState {
                    position,
                    ..Default::default()
                }),
            }
        }

        fn paused_at(position: f64) -> Self {
            Self {
                state: Mutex::new(FakeState {
                    position,
                    paused: true,
                    ..Default::default()
                }),
            }
        }

        fn buffering(self) -> Self {
            self.state.lock().buffering = true;
            self
        }

        fn rejecting_play(self) -> Self {
            self.state.lock().reject_play = true;
            self
        }

        fn actions(&self) -> Vec<Action> {
            self.state.lock().actions.clone()
        }
    }

    impl MediaElement for FakeElement {
        fn position(&self) -> f64 {
            self.state.lock().position
        }

        fn is_paused(&self) -> bool {
            self.state.lock().paused
        }

        fn is_buffering(&self) -> bool {
            self.state.lock().buffering
        }

        fn play(&self) -> Result<(), PlayRejected> {
            let mut state = self.state.lock();
            state.actions.push(Action::Play);

            if state.reject_play {
                return Err(PlayRejected {
                    reason: "autoplay blocked".to_string(),
                });
            }

            state.paused = false;
            Ok(())
        }

        fn pause(&self) {
            let mut state = self.state.lock();
            state.actions.push(Action::Pause);
            state.paused = true;
        }

        fn seek(&self, position: f64) {
            let mut state = self.state.lock();
            state.actions.push(Action::Seek(position));
            state.position = position;
        }
    }

    fn playing(position: f64) -> PlaybackState {
        PlaybackState {
            is_playing: true,
            position,
        }
    }

    fn desktop_file() -> Reconciler {
        Reconciler::new(
            SyncConfig::default(),
            DeviceClass::Desktop,
            SourceProfile::DirectFile,
        )
    }

    fn mobile_file() -> Reconciler {
        Reconciler::new(
            SyncConfig::default(),
            DeviceClass::Mobile,
            SourceProfile::DirectFile,
        )
    }

    #[test]
    fn test_no_seek_below_threshold() {
        let mut reconciler = desktop_file();
        let element = FakeElement::playing_at(100.5);

        let outcome = reconciler.tick(playing(101.), &element);

        assert_eq!(
            outcome,
            TickOutcome::Ran(TickReport {
                drift: 0.5,
                ..Default::default()
            }),
            "half a second of drift is tolerated"
        );
        assert!(element.actions().is_empty(), "the element is left alone");
    }

    #[test]
    fn test_single_seek_above_threshold() {
        let mut reconciler = desktop_file();
        let element = FakeElement::playing_at(90.);
        let now = Instant::now();

        let outcome = reconciler.tick_at(now, playing(95.), &element);

        assert_eq!(
            outcome,
            TickOutcome::Ran(TickReport {
                drift: 5.,
                seeked_to: Some(95.),
                ..Default::default()
            }),
            "drift above threshold forces a seek"
        );

        let next = reconciler.tick_at(now + Duration::from_secs(1), playing(95.), &element);

        assert_eq!(
            next,
            TickOutcome::Ran(TickReport::default()),
            "the corrected element needs no second seek"
        );
        assert_eq!(
            element.actions(),
            vec![Action::Seek(95.)],
            "exactly one seek is issued"
        );
    }

    #[test]
    fn test_gesture_skips_correction() {
        let mut reconciler = desktop_file();
        let element = FakeElement::paused_at(0.);
        let now = Instant::now();

        reconciler.begin_seek();
        let outcome = reconciler.tick_at(now, playing(50.), &element);

        assert_eq!(
            outcome,
            TickOutcome::Skipped(SkipReason::Gesture),
            "a held seek suppresses the pass"
        );
        assert!(element.actions().is_empty(), "nothing touches the element");

        reconciler.end_seek();
        let outcome = reconciler.tick_at(now + Duration::from_secs(1), playing(50.), &element);

        assert_eq!(
            outcome,
            TickOutcome::Ran(TickReport {
                drift: 50.,
                seeked_to: Some(50.),
                transport: Some(TransportCorrection::Played),
                ..Default::default()
            }),
            "corrections resume once the gesture ends"
        );
    }

    #[test]
    fn test_play_and_pause_corrections() {
        let mut reconciler = desktop_file();
        let now = Instant::now();

        let element = FakeElement::paused_at(10.);
        let outcome = reconciler.tick_at(now, playing(10.), &element);

        assert_eq!(
            outcome,
            TickOutcome::Ran(TickReport {
                transport: Some(TransportCorrection::Played),
                ..Default::default()
            }),
            "a paused element is started"
        );
        assert!(!element.is_paused(), "the element is playing afterwards");

        let shared = PlaybackState {
            is_playing: false,
            position: 10.,
        };
        let outcome = reconciler.tick_at(now + Duration::from_secs(1), shared, &element);

        assert_eq!(
            outcome,
            TickOutcome::Ran(TickReport {
                transport: Some(TransportCorrection::Paused),
                ..Default::default()
            }),
            "a playing element is paused"
        );
        assert!(element.is_paused(), "the element is paused afterwards");
    }

    #[test]
    fn test_rejected_play_is_reported() {
        let mut reconciler = desktop_file();
        let element = FakeElement::paused_at(0.).rejecting_play();

        let outcome = reconciler.tick(playing(0.), &element);

        assert_eq!(
            outcome,
            TickOutcome::Ran(TickReport {
                transport: Some(TransportCorrection::PlayRejected),
                ..Default::default()
            }),
            "a refused play is reported, not raised"
        );
        assert!(element.is_paused(), "the element stays paused");
    }

    #[test]
    fn test_mobile_buffering_suspends_seek_only() {
        let mut reconciler = mobile_file();
        let element = FakeElement::paused_at(0.).buffering();

        let outcome = reconciler.tick(playing(100.), &element);

        assert_eq!(
            outcome,
            TickOutcome::Ran(TickReport {
                drift: 100.,
                seek_suppressed: true,
                transport: Some(TransportCorrection::Played),
                ..Default::default()
            }),
            "buffering withholds the seek but not the transport"
        );
        assert_eq!(
            element.actions(),
            vec![Action::Play],
            "no seek reaches the element"
        );
    }

    #[test]
    fn test_desktop_buffering_still_seeks() {
        let mut reconciler = desktop_file();
        let element = FakeElement::playing_at(0.).buffering();

        let outcome = reconciler.tick(playing(100.), &element);

        assert_eq!(
            outcome,
            TickOutcome::Ran(TickReport {
                drift: 100.,
                seeked_to: Some(100.),
                ..Default::default()
            }),
            "desktop elements are corrected while buffering"
        );
    }

    #[test]
    fn test_ticks_are_throttled() {
        let mut reconciler = desktop_file();
        let element = FakeElement::playing_at(0.);
        let now = Instant::now();

        reconciler.tick_at(now, playing(0.), &element);
        let outcome = reconciler.tick_at(now + Duration::from_millis(500), playing(0.), &element);

        assert_eq!(
            outcome,
            TickOutcome::Skipped(SkipReason::Throttled),
            "a second pass within the interval is dropped"
        );

        let outcome = reconciler.tick_at(now + Duration::from_secs(1), playing(0.), &element);
        assert!(
            matches!(outcome, TickOutcome::Ran(_)),
            "the pass runs again once the interval elapses"
        );
    }
}
