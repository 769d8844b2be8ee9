use bevy::prelude::*;

use crate::{VideoScreen, VideoScreenSettings, VideoTexture, registry::VideoSessions};

pub trait VideoScreenCommandsExt {
    /// Seek to `time` seconds. Ignored while the video is not loaded.
    fn seek_video(&mut self, time: f64) -> &mut Self;

    /// Start a fresh session with the screen's current settings.
    fn restart_video(&mut self) -> &mut Self;

    /// Release the decoder. The screen keeps its last frame.
    fn stop_video(&mut self) -> &mut Self;
}

impl VideoScreenCommandsExt for EntityCommands<'_> {
    fn seek_video(&mut self, time: f64) -> &mut Self {
        self.queue(move |mut entity: EntityWorldMut| {
            entity.seek_video(time);
        })
    }

    fn restart_video(&mut self) -> &mut Self {
        self.queue(|mut entity: EntityWorldMut| {
            entity.restart_video();
        })
    }

    fn stop_video(&mut self) -> &mut Self {
        self.queue(|mut entity: EntityWorldMut| {
            entity.stop_video();
        })
    }
}

impl VideoScreenCommandsExt for EntityWorldMut<'_> {
    fn seek_video(&mut self, time: f64) -> &mut Self {
        let entity = self.id();
        self.world_scope(|world| {
            if let Some(mut sessions) = world.get_non_send_resource_mut::<VideoSessions>()
                && !sessions.seek(entity, time)
            {
                debug!("Seek to {time:.2}s on {entity} ignored, video not loaded");
            }
        });
        self
    }

    fn restart_video(&mut self) -> &mut Self {
        let entity = self.id();
        let (Some(screen), Some(texture)) = (
            self.get::<VideoScreen>().cloned(),
            self.get::<VideoTexture>().map(|texture| texture.id()),
        ) else {
            warn!("Entity {entity} has no started VideoScreen to restart");
            return self;
        };
        self.world_scope(|world| {
            let hitch_threshold = world
                .get_resource::<VideoScreenSettings>()
                .map(|settings| settings.hitch_threshold)
                .unwrap_or_default();
            if let Some(mut sessions) = world.get_non_send_resource_mut::<VideoSessions>()
                && let Err(err) = sessions.start(entity, texture, &screen, hitch_threshold)
            {
                error!("Failed to restart video on {entity}: {err}");
            }
        });
        self
    }

    fn stop_video(&mut self) -> &mut Self {
        let entity = self.id();
        self.world_scope(|world| {
            if let Some(mut sessions) = world.get_non_send_resource_mut::<VideoSessions>() {
                sessions.stop(entity);
            }
        });
        self
    }
}
