use std::{collections::HashMap, time::Duration};

use bevy::prelude::*;
use crossbeam_channel::Sender;

use crate::{
    VideoScreen, VideoScreenError,
    backend::{Generation, SessionMessage, VideoBackend},
    controller::{Collaborators, Handled, PlaybackController, TickOutcome, VideoStatus},
    resolver::StreamResolver,
};

/// Main-thread registry of every screen's controller. Decoders are not
/// `Send` on the web, so this lives in a non-send resource.
pub(crate) struct VideoSessions {
    backend: Option<Box<dyn VideoBackend>>,
    resolver: Option<Box<dyn StreamResolver>>,
    controllers: HashMap<Entity, PlaybackController>,
    tx: Sender<SessionMessage>,
}

impl VideoSessions {
    pub(crate) fn new(tx: Sender<SessionMessage>) -> Self {
        Self {
            backend: None,
            resolver: None,
            controllers: HashMap::default(),
            tx,
        }
    }

    pub(crate) fn set_backend(&mut self, backend: impl VideoBackend) {
        self.backend = Some(Box::new(backend));
    }

    pub(crate) fn set_resolver(&mut self, resolver: impl StreamResolver) {
        self.resolver = Some(Box::new(resolver));
    }

    pub(crate) fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Split into the controller for `entity` and what it needs to talk to
    /// the outside world.
    fn parts(
        &mut self,
        entity: Entity,
    ) -> Option<(&mut PlaybackController, Option<Collaborators<'_>>)> {
        let Self {
            backend,
            resolver,
            controllers,
            tx,
        } = self;
        let resolver = resolver.as_deref();
        let tx: &Sender<SessionMessage> = tx;
        let controller = controllers.get_mut(&entity)?;
        let collaborators = backend.as_deref_mut().map(|backend| Collaborators {
            backend,
            resolver,
            tx,
        });
        Some((controller, collaborators))
    }

    /// Start (or restart) the session of `entity` with the screen's current
    /// settings.
    pub(crate) fn start(
        &mut self,
        entity: Entity,
        target: AssetId<Image>,
        screen: &VideoScreen,
        hitch_threshold: Duration,
    ) -> Result<Generation, VideoScreenError> {
        let controller = self
            .controllers
            .entry(entity)
            .or_insert_with(|| PlaybackController::new(entity, target, screen, hitch_threshold));
        controller.set_looping(screen.repeat);
        controller.set_volume(screen.volume);
        let Some((controller, Some(mut collaborators))) = self.parts(entity) else {
            return Err(VideoScreenError::NoBackend);
        };
        controller.start(&screen.url, &mut collaborators)
    }

    pub(crate) fn handle(&mut self, message: SessionMessage) -> Option<Handled> {
        let controller = self.controllers.get_mut(&message.entity)?;
        Some(controller.handle(message.generation, message.kind))
    }

    pub(crate) fn tick(
        &mut self,
        entity: Entity,
        delta: Duration,
        images: &mut Assets<Image>,
    ) -> Option<TickOutcome> {
        let (controller, mut collaborators) = self.parts(entity)?;
        controller.tick(delta, images, collaborators.as_mut()?)
    }

    pub(crate) fn seek(&mut self, entity: Entity, time: f64) -> bool {
        self.controllers
            .get_mut(&entity)
            .is_some_and(|controller| controller.seek(time))
    }

    pub(crate) fn set_looping(&mut self, entity: Entity, looping: bool) {
        if let Some(controller) = self.controllers.get_mut(&entity) {
            controller.set_looping(looping);
        }
    }

    pub(crate) fn set_volume(&mut self, entity: Entity, volume: f32) {
        if let Some(controller) = self.controllers.get_mut(&entity) {
            controller.set_volume(volume);
        }
    }

    pub(crate) fn controller(&self, entity: Entity) -> Option<&PlaybackController> {
        self.controllers.get(&entity)
    }

    pub(crate) fn status(&self, entity: Entity) -> Option<VideoStatus> {
        self.controllers.get(&entity).map(PlaybackController::status)
    }

    /// Release the decoder of `entity` but keep its controller around.
    pub(crate) fn stop(&mut self, entity: Entity) {
        if let Some(controller) = self.controllers.get_mut(&entity) {
            controller.destroy();
        }
    }

    /// Forget `entity` entirely. Safe to call repeatedly.
    pub(crate) fn remove(&mut self, entity: Entity) -> bool {
        self.controllers
            .remove(&entity)
            .map(|mut controller| controller.destroy())
            .is_some()
    }
}
