use std::time::Duration;

use bevy::{prelude::*, time::Stopwatch};
use crossbeam_channel::Sender;

use crate::{
    VideoScreen, VideoScreenError,
    backend::{
        FrameStatus, Generation, SessionMessage, SessionMessageKind, SessionNotifier,
        VideoBackend, VideoDecoder,
    },
    resolver::{ResolveError, StreamResolver, is_youtube_url},
};

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Reflect)]
pub enum PlaybackState {
    #[default]
    Idle,
    Initializing,
    Ready,
    Stalled,
    Ended,
    Destroyed,
}

/// Snapshot of a screen's playback, refreshed every frame.
#[derive(Component, Clone, Copy, Default, Debug, PartialEq, Reflect)]
#[reflect(Component, Default)]
pub struct VideoStatus {
    pub state: PlaybackState,
    pub initializing: bool,
    pub video_loaded: bool,
    pub audio_loaded: bool,
    pub playback_time: f64,
}

/// What the controller needs from the outside world to (re)start a session.
pub(crate) struct Collaborators<'a> {
    pub backend: &'a mut (dyn VideoBackend + 'static),
    pub resolver: Option<&'a (dyn StreamResolver + 'static)>,
    pub tx: &'a Sender<SessionMessage>,
}

#[derive(Debug, PartialEq)]
pub(crate) enum Handled {
    Stale,
    Loaded { became_ready: bool },
    Seeked { became_ready: bool },
    AudioReady,
    Ended,
    Resolved,
    ResolveFailed(ResolveError),
    Failed(String),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct TickOutcome {
    pub frame: FrameStatus,
    pub hitched: bool,
    /// Position at the moment a hitch was detected.
    pub hitch_position: f64,
}

/// Drives one screen's decoder session from start to steady playback and
/// restarts it when frames stop arriving.
pub struct PlaybackController {
    entity: Entity,
    target: AssetId<Image>,
    url: String,
    looping: bool,
    volume: f32,
    hitch_threshold: Duration,
    generation: Generation,
    state: PlaybackState,
    decoder: Option<Box<dyn VideoDecoder>>,
    initializing: bool,
    video_loaded: bool,
    audio_loaded: bool,
    since_update: Stopwatch,
    playback_time: f64,
    resume_at: Option<f64>,
}

impl PlaybackController {
    pub(crate) fn new(
        entity: Entity,
        target: AssetId<Image>,
        screen: &VideoScreen,
        hitch_threshold: Duration,
    ) -> Self {
        Self {
            entity,
            target,
            url: screen.url.clone(),
            looping: screen.repeat,
            volume: screen.volume,
            hitch_threshold,
            generation: Generation::default(),
            state: PlaybackState::Idle,
            decoder: None,
            initializing: false,
            video_loaded: false,
            audio_loaded: false,
            since_update: Stopwatch::new(),
            playback_time: 0.0,
            resume_at: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn is_initializing(&self) -> bool {
        self.initializing
    }

    pub fn is_video_loaded(&self) -> bool {
        self.video_loaded
    }

    pub fn is_audio_loaded(&self) -> bool {
        self.audio_loaded
    }

    pub fn playback_time(&self) -> f64 {
        self.playback_time
    }

    pub fn status(&self) -> VideoStatus {
        VideoStatus {
            state: self.state,
            initializing: self.initializing,
            video_loaded: self.video_loaded,
            audio_loaded: self.audio_loaded,
            playback_time: self.playback_time,
        }
    }

    /// Begin a new session for `url`, releasing the previous decoder.
    /// Indirect urls are handed to the resolver and only played once it
    /// answers.
    pub(crate) fn start(
        &mut self,
        url: &str,
        collaborators: &mut Collaborators<'_>,
    ) -> Result<Generation, VideoScreenError> {
        if url.trim().is_empty() {
            return Err(VideoScreenError::EmptyUrl);
        }
        self.release_decoder();
        self.generation = self.generation.next();
        self.url = url.to_owned();
        self.state = PlaybackState::Initializing;
        self.initializing = true;
        self.video_loaded = false;
        self.audio_loaded = false;
        self.since_update.reset();
        self.resume_at = None;

        let notifier = SessionNotifier::new(self.entity, self.generation, collaborators.tx.clone());
        let mut decoder = match collaborators.backend.create(self.target, notifier.clone()) {
            Ok(decoder) => decoder,
            Err(err) => {
                self.state = PlaybackState::Idle;
                self.initializing = false;
                return Err(err);
            }
        };
        decoder.set_looping(self.looping);
        match collaborators.resolver {
            Some(resolver) if resolver.is_indirect(url) => resolver.resolve(url, notifier),
            None if is_youtube_url(url) => notifier.resolved(Err(ResolveError::NoResolver)),
            _ => decoder.play(url),
        }
        self.decoder = Some(decoder);
        Ok(self.generation)
    }

    pub(crate) fn handle(&mut self, generation: Generation, kind: SessionMessageKind) -> Handled {
        if generation != self.generation || self.decoder.is_none() {
            debug!(
                "Ignoring {kind:?} for superseded session {generation:?} of {}",
                self.entity
            );
            return Handled::Stale;
        }
        match kind {
            SessionMessageKind::Loaded => {
                self.frames_available();
                Handled::Loaded {
                    became_ready: self.complete_readiness(),
                }
            }
            SessionMessageKind::Seeked => {
                self.frames_available();
                self.leave_ended();
                Handled::Seeked {
                    became_ready: self.complete_readiness(),
                }
            }
            SessionMessageKind::AudioReady => {
                if let Some(decoder) = self.decoder.as_mut() {
                    decoder.attach_audio(normalized_volume(self.volume));
                    self.audio_loaded = true;
                }
                Handled::AudioReady
            }
            SessionMessageKind::Ended => {
                if !self.looping {
                    self.state = PlaybackState::Ended;
                }
                Handled::Ended
            }
            SessionMessageKind::Resolved(Ok(stream_url)) => {
                info!("Resolved {} to {stream_url}", self.url);
                if let Some(decoder) = self.decoder.as_mut() {
                    decoder.play(&stream_url);
                }
                Handled::Resolved
            }
            SessionMessageKind::Resolved(Err(err)) => Handled::ResolveFailed(err),
            SessionMessageKind::Failed(reason) => Handled::Failed(reason),
        }
    }

    fn frames_available(&mut self) {
        self.video_loaded = true;
        self.since_update.reset();
    }

    /// A seek away from the end, or switching to looping, resumes playback.
    fn leave_ended(&mut self) {
        if self.state == PlaybackState::Ended && !self.initializing {
            self.state = PlaybackState::Ready;
            self.since_update.reset();
        }
    }

    /// Leave the initializing phase once frames are available and issue the
    /// post-ready seek. Runs at most once per session.
    fn complete_readiness(&mut self) -> bool {
        if !self.initializing || !self.video_loaded {
            return false;
        }
        self.initializing = false;
        self.state = PlaybackState::Ready;
        let position = self.resume_at.take().unwrap_or(0.0);
        self.seek(position);
        true
    }

    /// Publish the current frame and check for a hitch. `None` when no
    /// session is active.
    pub(crate) fn tick(
        &mut self,
        delta: Duration,
        images: &mut Assets<Image>,
        collaborators: &mut Collaborators<'_>,
    ) -> Option<TickOutcome> {
        let decoder = self.decoder.as_mut()?;
        let frame = decoder.present(images);
        self.playback_time = decoder.playback_time();
        if frame.advanced {
            self.since_update.reset();
        } else {
            self.since_update.tick(delta);
        }

        let hitched = self.has_hitched();
        let hitch_position = self.playback_time;
        if hitched {
            self.on_hitch(collaborators);
        }
        Some(TickOutcome {
            frame,
            hitched,
            hitch_position,
        })
    }

    pub fn has_hitched(&self) -> bool {
        self.video_loaded
            && self.state == PlaybackState::Ready
            && self.since_update.elapsed() > self.hitch_threshold
    }

    fn on_hitch(&mut self, collaborators: &mut Collaborators<'_>) {
        warn!(
            "Video hitch detected on {}, seeking to current time {:.2}s",
            self.entity, self.playback_time
        );
        self.video_loaded = false;
        self.state = PlaybackState::Stalled;
        self.refresh(collaborators);
    }

    /// Restart the session on the same url and resume at the current
    /// position once the new session is ready.
    pub(crate) fn refresh(&mut self, collaborators: &mut Collaborators<'_>) {
        let position = self
            .decoder
            .as_ref()
            .map_or(self.playback_time, |decoder| decoder.playback_time());
        self.initializing = false;
        let url = self.url.clone();
        match self.start(&url, collaborators) {
            Ok(_) => self.resume_at = Some(position),
            Err(err) => error!("Failed to restart video on {}: {err}", self.entity),
        }
    }

    /// Ignored unless frames are currently available.
    pub fn seek(&mut self, time: f64) -> bool {
        if !self.video_loaded {
            return false;
        }
        let Some(decoder) = self.decoder.as_mut() else {
            return false;
        };
        self.video_loaded = false;
        self.since_update.reset();
        decoder.seek(time);
        true
    }

    pub(crate) fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
        if looping {
            self.leave_ended();
        }
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.set_looping(looping);
        }
    }

    pub(crate) fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        if self.audio_loaded
            && let Some(decoder) = self.decoder.as_mut()
        {
            decoder.set_volume(normalized_volume(volume));
        }
    }

    pub fn destroy(&mut self) {
        self.release_decoder();
        self.state = PlaybackState::Destroyed;
        self.initializing = false;
        self.video_loaded = false;
        self.audio_loaded = false;
        self.resume_at = None;
    }

    fn release_decoder(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            decoder.dispose();
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.release_decoder();
    }
}

fn normalized_volume(volume: f32) -> f32 {
    (volume / 100.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{DecoderCall, FakeBackend};
    use crossbeam_channel::Receiver;

    const THRESHOLD: Duration = Duration::from_secs(1);

    struct FakeResolver(Result<String, ResolveError>);

    impl StreamResolver for FakeResolver {
        fn is_indirect(&self, url: &str) -> bool {
            crate::resolver::is_youtube_url(url)
        }

        fn resolve(&self, _url: &str, notifier: SessionNotifier) {
            notifier.resolved(self.0.clone());
        }
    }

    struct Harness {
        backend: FakeBackend,
        resolver: Option<Box<dyn StreamResolver>>,
        tx: Sender<SessionMessage>,
        rx: Receiver<SessionMessage>,
        images: Assets<Image>,
        controller: PlaybackController,
    }

    impl Harness {
        fn new(url: &str) -> Self {
            let (tx, rx) = crossbeam_channel::unbounded();
            let screen = VideoScreen::new(url);
            Self {
                backend: FakeBackend::default(),
                resolver: None,
                tx,
                rx,
                images: Assets::default(),
                controller: PlaybackController::new(
                    Entity::from_raw(7),
                    AssetId::default(),
                    &screen,
                    THRESHOLD,
                ),
            }
        }

        fn with_resolver(mut self, result: Result<String, ResolveError>) -> Self {
            self.resolver = Some(Box::new(FakeResolver(result)));
            self
        }

        fn start(&mut self, url: &str) -> Generation {
            let mut collaborators = Collaborators {
                backend: &mut self.backend,
                resolver: self.resolver.as_deref(),
                tx: &self.tx,
            };
            self.controller.start(url, &mut collaborators).unwrap()
        }

        fn tick(&mut self, delta: Duration) -> TickOutcome {
            let mut collaborators = Collaborators {
                backend: &mut self.backend,
                resolver: self.resolver.as_deref(),
                tx: &self.tx,
            };
            self.controller
                .tick(delta, &mut self.images, &mut collaborators)
                .unwrap()
        }

        fn pump(&mut self) -> Vec<Handled> {
            let mut handled = Vec::new();
            while let Ok(message) = self.rx.try_recv() {
                handled.push(self.controller.handle(message.generation, message.kind));
            }
            handled
        }

        fn set_frame(&mut self, advanced: bool, playback_time: f64) {
            let mut media = self.backend.0.borrow_mut();
            media.frame = FrameStatus {
                texture_ready: true,
                advanced,
            };
            media.playback_time = playback_time;
        }

        /// Start, load and confirm the initial seek.
        fn ready(url: &str) -> Self {
            let mut harness = Self::new(url);
            harness.start(url);
            let notifier = harness.backend.0.borrow().latest_notifier();
            notifier.loaded();
            harness.pump();
            notifier.seeked();
            harness.pump();
            harness
        }
    }

    #[test]
    fn initializing_clears_once_after_frames_arrive() {
        let mut harness = Harness::new("https://cdn.example/video.mp4");
        harness.start("https://cdn.example/video.mp4");
        assert!(harness.controller.is_initializing());
        assert_eq!(harness.controller.state(), PlaybackState::Initializing);

        harness.tick(Duration::from_millis(16));
        assert!(harness.controller.is_initializing());

        let notifier = harness.backend.0.borrow().latest_notifier();
        notifier.loaded();
        assert_eq!(
            harness.pump(),
            vec![Handled::Loaded { became_ready: true }]
        );
        assert!(!harness.controller.is_initializing());
        assert_eq!(harness.controller.state(), PlaybackState::Ready);

        notifier.seeked();
        assert_eq!(
            harness.pump(),
            vec![Handled::Seeked {
                became_ready: false
            }]
        );
        assert!(!harness.controller.is_initializing());
    }

    #[test]
    fn readiness_issues_a_single_seek_to_zero() {
        let mut harness = Harness::new("https://cdn.example/video.mp4");
        harness.start("https://cdn.example/video.mp4");
        assert!(!harness.controller.seek(3.0));

        let notifier = harness.backend.0.borrow().latest_notifier();
        notifier.loaded();
        harness.pump();
        assert!(!harness.controller.seek(4.0));
        assert_eq!(harness.backend.0.borrow().seeks(), vec![0.0]);

        notifier.seeked();
        harness.pump();
        assert!(harness.controller.seek(4.0));
        assert_eq!(harness.backend.0.borrow().seeks(), vec![0.0, 4.0]);
    }

    #[test]
    fn seek_while_not_loaded_does_nothing() {
        let mut harness = Harness::ready("https://cdn.example/video.mp4");
        assert!(harness.controller.seek(2.0));
        assert!(!harness.controller.is_video_loaded());
        assert!(!harness.controller.seek(5.0));
        assert_eq!(harness.backend.0.borrow().seeks(), vec![0.0, 2.0]);
    }

    #[test]
    fn hitch_fires_only_past_the_threshold() {
        let mut harness = Harness::ready("https://cdn.example/video.mp4");
        harness.set_frame(false, 3.0);

        assert!(!harness.tick(THRESHOLD).hitched);
        assert_eq!(harness.controller.state(), PlaybackState::Ready);

        let outcome = harness.tick(Duration::from_millis(1));
        assert!(outcome.hitched);
        assert_eq!(outcome.hitch_position, 3.0);
    }

    #[test]
    fn stalled_frames_trigger_restart() {
        let url = "https://cdn.example/video.mp4";
        let mut harness = Harness::ready(url);
        let first = harness.controller.generation();

        harness.set_frame(true, 0.2);
        harness.tick(Duration::from_millis(200));
        harness.set_frame(false, 0.2);
        let outcome = harness.tick(Duration::from_millis(1300));

        assert!(outcome.hitched);
        assert!(!harness.controller.is_video_loaded());
        assert_ne!(harness.controller.generation(), first);
        assert_eq!(harness.controller.state(), PlaybackState::Initializing);
        let media = harness.backend.0.borrow();
        assert_eq!(media.count(&DecoderCall::Dispose), 1);
        assert_eq!(media.plays(), vec![url.to_owned(), url.to_owned()]);
    }

    #[test]
    fn advancing_frames_keep_the_clock_fresh() {
        let mut harness = Harness::ready("https://cdn.example/video.mp4");
        harness.set_frame(true, 1.0);
        for _ in 0..30 {
            assert!(!harness.tick(Duration::from_millis(100)).hitched);
        }
        assert_eq!(harness.controller.state(), PlaybackState::Ready);
    }

    #[test]
    fn recovery_resumes_at_the_stalled_position() {
        let mut harness = Harness::ready("https://cdn.example/video.mp4");
        harness.set_frame(false, 12.5);
        assert!(harness.tick(Duration::from_millis(1500)).hitched);

        let notifier = harness.backend.0.borrow().latest_notifier();
        notifier.loaded();
        assert_eq!(
            harness.pump(),
            vec![Handled::Loaded { became_ready: true }]
        );
        let seeks = harness.backend.0.borrow().seeks();
        assert_eq!(seeks.last().copied(), Some(12.5));
        assert_eq!(seeks, vec![0.0, 12.5]);
    }

    #[test]
    fn superseded_session_callbacks_are_ignored() {
        let mut harness = Harness::new("https://cdn.example/a.mp4");
        harness.start("https://cdn.example/a.mp4");
        let stale = harness.backend.0.borrow().latest_notifier();
        harness.start("https://cdn.example/b.mp4");

        stale.loaded();
        stale.audio_ready();
        assert_eq!(harness.pump(), vec![Handled::Stale, Handled::Stale]);
        assert!(harness.controller.is_initializing());
        assert!(!harness.controller.is_audio_loaded());
        assert_eq!(
            harness.backend.0.borrow().count(&DecoderCall::Dispose),
            1
        );
    }

    #[test]
    fn audio_attaches_at_configured_volume() {
        let mut harness = Harness::new("https://cdn.example/video.mp4");
        harness.start("https://cdn.example/video.mp4");
        harness.backend.0.borrow().latest_notifier().audio_ready();
        harness.pump();
        assert!(harness.controller.is_audio_loaded());
        assert_eq!(
            harness.backend.0.borrow().count(&DecoderCall::AttachAudio(0.9)),
            1
        );

        harness.controller.set_volume(50.0);
        assert_eq!(
            harness.backend.0.borrow().count(&DecoderCall::Volume(0.5)),
            1
        );
    }

    #[test]
    fn indirect_url_plays_resolved_stream() {
        let mut harness = Harness::new("https://youtu.be/XYZ")
            .with_resolver(Ok("https://stream.example/abc.m3u8".into()));
        harness.start("https://youtu.be/XYZ");
        assert!(harness.backend.0.borrow().plays().is_empty());

        assert_eq!(harness.pump(), vec![Handled::Resolved]);
        assert_eq!(
            harness.backend.0.borrow().plays(),
            vec!["https://stream.example/abc.m3u8".to_owned()]
        );
    }

    #[test]
    fn direct_url_is_played_unchanged() {
        let mut harness = Harness::new("https://cdn.example/video.mp4")
            .with_resolver(Ok("https://stream.example/abc.m3u8".into()));
        harness.start("https://cdn.example/video.mp4");
        assert_eq!(
            harness.backend.0.borrow().plays(),
            vec!["https://cdn.example/video.mp4".to_owned()]
        );
        assert!(harness.pump().is_empty());
    }

    #[test]
    fn resolution_failure_is_reported_and_not_retried() {
        let mut harness =
            Harness::new("https://youtu.be/XYZ").with_resolver(Err(ResolveError::NoStream));
        harness.start("https://youtu.be/XYZ");
        assert_eq!(
            harness.pump(),
            vec![Handled::ResolveFailed(ResolveError::NoStream)]
        );
        assert!(harness.backend.0.borrow().plays().is_empty());
        assert!(harness.controller.is_initializing());
    }

    #[test]
    fn ended_session_is_not_a_hitch() {
        let mut harness = Harness::ready("https://cdn.example/video.mp4");
        harness.backend.0.borrow().latest_notifier().ended();
        harness.pump();
        harness.set_frame(false, 30.0);
        assert!(!harness.tick(Duration::from_secs(5)).hitched);
        assert_eq!(harness.controller.state(), PlaybackState::Ended);
    }

    #[test]
    fn destroy_is_idempotent() {
        let mut never_started = Harness::new("https://cdn.example/video.mp4");
        never_started.controller.destroy();
        never_started.controller.destroy();
        assert_eq!(never_started.controller.state(), PlaybackState::Destroyed);
        assert!(never_started.backend.0.borrow().calls.is_empty());

        let mut harness = Harness::ready("https://cdn.example/video.mp4");
        harness.controller.destroy();
        harness.controller.destroy();
        assert_eq!(
            harness.backend.0.borrow().count(&DecoderCall::Dispose),
            1
        );
        let mut collaborators = Collaborators {
            backend: &mut harness.backend,
            resolver: None,
            tx: &harness.tx,
        };
        assert!(
            harness
                .controller
                .tick(Duration::from_secs(2), &mut harness.images, &mut collaborators)
                .is_none()
        );
    }

    #[test]
    fn empty_url_is_rejected() {
        let mut harness = Harness::new("");
        let mut collaborators = Collaborators {
            backend: &mut harness.backend,
            resolver: None,
            tx: &harness.tx,
        };
        assert!(matches!(
            harness.controller.start("  ", &mut collaborators),
            Err(VideoScreenError::EmptyUrl)
        ));
        assert_eq!(harness.controller.state(), PlaybackState::Idle);
    }

    #[test]
    fn platform_link_without_resolver_is_not_played() {
        let mut harness = Harness::new("https://youtu.be/XYZ");
        harness.start("https://youtu.be/XYZ");
        assert!(harness.backend.0.borrow().plays().is_empty());
        assert_eq!(
            harness.pump(),
            vec![Handled::ResolveFailed(ResolveError::NoResolver)]
        );
        assert!(harness.backend.0.borrow().plays().is_empty());
    }

    #[test]
    fn failed_decoder_creation_returns_to_idle() {
        let mut harness = Harness::new("https://cdn.example/video.mp4");
        harness.backend.0.borrow_mut().fail_create = true;
        let mut collaborators = Collaborators {
            backend: &mut harness.backend,
            resolver: None,
            tx: &harness.tx,
        };
        assert!(matches!(
            harness
                .controller
                .start("https://cdn.example/video.mp4", &mut collaborators),
            Err(VideoScreenError::Backend(_))
        ));
        assert_eq!(harness.controller.state(), PlaybackState::Idle);
        assert!(!harness.controller.is_initializing());
    }

    #[test]
    fn seeking_away_from_the_end_resumes_hitch_detection() {
        let mut harness = Harness::ready("https://cdn.example/video.mp4");
        let notifier = harness.backend.0.borrow().latest_notifier();
        notifier.ended();
        harness.pump();
        assert_eq!(harness.controller.state(), PlaybackState::Ended);

        assert!(harness.controller.seek(5.0));
        notifier.seeked();
        harness.pump();
        assert_eq!(harness.controller.state(), PlaybackState::Ready);
        assert!(harness.controller.is_video_loaded());

        harness.set_frame(false, 5.0);
        assert!(harness.tick(Duration::from_secs(5)).hitched);
    }

    #[test]
    fn enabling_looping_after_the_end_resumes_playback() {
        let mut harness = Harness::ready("https://cdn.example/video.mp4");
        harness.backend.0.borrow().latest_notifier().ended();
        harness.pump();
        assert_eq!(harness.controller.state(), PlaybackState::Ended);

        harness.controller.set_looping(true);
        assert_eq!(harness.controller.state(), PlaybackState::Ready);
        harness.set_frame(false, 30.0);
        assert!(harness.tick(Duration::from_secs(5)).hitched);
    }
}
