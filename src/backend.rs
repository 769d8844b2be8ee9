use bevy::prelude::*;
use crossbeam_channel::Sender;

use crate::{VideoScreenError, resolver::ResolveError};

/// Identifies one session of a video screen. Every restart bumps it, so
/// callbacks from a superseded decoder can be told apart and dropped.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Hash)]
pub struct Generation(u32);

impl Generation {
    pub(crate) fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// What a decoder reports after publishing to its target texture.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct FrameStatus {
    /// The target texture holds a decoded frame.
    pub texture_ready: bool,
    /// Playback position moved since the previous present.
    pub advanced: bool,
}

/// One decode-and-present session bound to a single target texture.
pub trait VideoDecoder {
    fn play(&mut self, url: &str);

    fn seek(&mut self, time: f64);

    /// Publish the latest decoded frame into the target texture. Called once
    /// per frame while the session is alive.
    fn present(&mut self, images: &mut Assets<Image>) -> FrameStatus;

    /// Current position in seconds.
    fn playback_time(&self) -> f64;

    fn set_looping(&mut self, looping: bool);

    /// Route the audio stream to the output. `volume` is in `0.0..=1.0`.
    fn attach_audio(&mut self, volume: f32);

    fn set_volume(&mut self, volume: f32);

    /// Release every resource held by the session. Must be safe to call on
    /// a session that never started playing.
    fn dispose(&mut self);
}

/// Creates decoder sessions. Lives on the main thread only.
pub trait VideoBackend: 'static {
    fn create(
        &mut self,
        target: AssetId<Image>,
        notifier: SessionNotifier,
    ) -> Result<Box<dyn VideoDecoder>, VideoScreenError>;
}

#[derive(Debug)]
pub(crate) struct SessionMessage {
    pub entity: Entity,
    pub generation: Generation,
    pub kind: SessionMessageKind,
}

#[derive(Debug)]
pub(crate) enum SessionMessageKind {
    Loaded,
    Seeked,
    AudioReady,
    Ended,
    Failed(String),
    Resolved(Result<String, ResolveError>),
}

/// Handed to decoders and resolvers so they can report milestones back to
/// the owning screen. Messages are drained once per frame.
#[derive(Clone, Debug)]
pub struct SessionNotifier {
    entity: Entity,
    generation: Generation,
    tx: Sender<SessionMessage>,
}

impl SessionNotifier {
    pub(crate) fn new(entity: Entity, generation: Generation, tx: Sender<SessionMessage>) -> Self {
        Self {
            entity,
            generation,
            tx,
        }
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// The first frame of the session is available.
    pub fn loaded(&self) {
        self.send(SessionMessageKind::Loaded);
    }

    /// A seek finished and frames are available again.
    pub fn seeked(&self) {
        self.send(SessionMessageKind::Seeked);
    }

    pub fn audio_ready(&self) {
        self.send(SessionMessageKind::AudioReady);
    }

    pub fn ended(&self) {
        self.send(SessionMessageKind::Ended);
    }

    pub fn failed(&self, reason: impl Into<String>) {
        self.send(SessionMessageKind::Failed(reason.into()));
    }

    /// Completion of a [`StreamResolver::resolve`](crate::StreamResolver::resolve) call.
    pub fn resolved(&self, result: Result<String, ResolveError>) {
        self.send(SessionMessageKind::Resolved(result));
    }

    fn send(&self, kind: SessionMessageKind) {
        let message = SessionMessage {
            entity: self.entity,
            generation: self.generation,
            kind,
        };
        if let Err(err) = self.tx.send(message) {
            warn!("Failed to send video session message: {err:?}");
        }
    }
}
