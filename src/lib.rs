use std::time::Duration;

use bevy::prelude::*;

mod backend;
mod commands;
mod controller;
mod registry;
pub mod resolver;
pub mod screen;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use backend::{FrameStatus, Generation, SessionNotifier, VideoBackend, VideoDecoder};
pub use commands::VideoScreenCommandsExt;
pub use controller::{PlaybackController, PlaybackState, VideoStatus};
pub use resolver::{ResolveError, StreamResolver};

use backend::SessionMessage;
use controller::Handled;
use registry::VideoSessions;

/// Plays a video on a quad attached to entities carrying [`VideoScreen`].
///
/// A decoder backend must be installed with
/// [`VideoScreenAppExt::set_video_backend`]; on the web the HTML `<video>`
/// backend is installed automatically.
#[derive(Clone, Debug)]
pub struct VideoScreenPlugin {
    /// How long frames may stop advancing before the session is restarted.
    pub hitch_threshold: Duration,
    /// Video pixels per world unit when sizing the quad.
    pub pixels_per_unit: f32,
}

impl Default for VideoScreenPlugin {
    fn default() -> Self {
        Self {
            hitch_threshold: Duration::from_secs(1),
            pixels_per_unit: 1000.0,
        }
    }
}

impl Plugin for VideoScreenPlugin {
    fn build(&self, app: &mut App) {
        let (tx, rx) = crossbeam_channel::unbounded();
        app.register_type::<VideoScreen>()
            .register_type::<VideoStatus>()
            .insert_resource(VideoScreenSettings {
                hitch_threshold: self.hitch_threshold,
                pixels_per_unit: self.pixels_per_unit,
            })
            .insert_resource(SessionReceiver(rx))
            .insert_non_send_resource(VideoSessions::new(tx))
            .add_systems(
                Update,
                (
                    start_videos,
                    apply_screen_changes,
                    handle_session_messages,
                    tick_videos,
                )
                    .chain()
                    .in_set(VideoScreenSystems),
            )
            .add_systems(PostUpdate, remove_despawned_videos);

        #[cfg(feature = "gizmos")]
        app.add_systems(PostUpdate, screen::draw_screen_bounds);

        #[cfg(target_arch = "wasm32")]
        web::plugin(app);
    }

    fn finish(&self, app: &mut App) {
        if !app
            .world()
            .get_non_send_resource::<VideoSessions>()
            .is_some_and(VideoSessions::has_backend)
        {
            warn!("No video backend installed, video screens will stay blank");
        }

        #[cfg(target_arch = "wasm32")]
        web::finish(app);
    }
}

#[derive(SystemSet, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VideoScreenSystems;

#[derive(Resource, Clone, Debug)]
pub struct VideoScreenSettings {
    pub hitch_threshold: Duration,
    pub pixels_per_unit: f32,
}

/// A video panel. Changing `url` restarts playback; the other fields are
/// applied to the running session.
#[derive(Component, Reflect, Clone, Debug, PartialEq)]
#[reflect(Component, Default)]
#[require(Transform, Visibility, VideoStatus)]
pub struct VideoScreen {
    /// Direct media url or a streaming-platform page url.
    pub url: String,
    /// Restart at the end instead of stopping.
    pub repeat: bool,
    /// Panel width in video pixels.
    pub width: f32,
    /// Panel height in video pixels.
    pub height: f32,
    /// `0.0..=100.0`
    pub volume: f32,
    /// `0.0..=1.0`
    pub opacity: f32,
}

impl Default for VideoScreen {
    fn default() -> Self {
        Self {
            url: String::new(),
            repeat: false,
            width: 1920.0,
            height: 1080.0,
            volume: 90.0,
            opacity: 1.0,
        }
    }
}

impl VideoScreen {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..default()
        }
    }

    pub fn with_repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn with_size(mut self, width: f32, height: f32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }
}

/// Texture the decoder renders into. Inserted when the screen starts unless
/// one was provided.
#[derive(Component, Clone, Debug, Deref)]
pub struct VideoTexture(pub Handle<Image>);

/// The first frame of a session is on screen.
#[derive(Event, Clone, Copy, Debug)]
pub struct VideoReady;

/// Playback stalled and the session is being restarted.
#[derive(Event, Clone, Copy, Debug)]
pub struct VideoHitched {
    pub playback_time: f64,
}

#[derive(Event, Clone, Debug)]
pub struct VideoFailed {
    pub reason: String,
}

pub trait VideoScreenAppExt {
    fn set_video_backend(&mut self, backend: impl VideoBackend) -> &mut Self;
    fn set_stream_resolver(&mut self, resolver: impl StreamResolver) -> &mut Self;
}

impl VideoScreenAppExt for App {
    fn set_video_backend(&mut self, backend: impl VideoBackend) -> &mut Self {
        match self.world_mut().get_non_send_resource_mut::<VideoSessions>() {
            Some(mut sessions) => sessions.set_backend(backend),
            None => warn!("VideoScreenPlugin must be added before setting a video backend"),
        }
        self
    }

    fn set_stream_resolver(&mut self, resolver: impl StreamResolver) -> &mut Self {
        match self.world_mut().get_non_send_resource_mut::<VideoSessions>() {
            Some(mut sessions) => sessions.set_resolver(resolver),
            None => warn!("VideoScreenPlugin must be added before setting a stream resolver"),
        }
        self
    }
}

#[derive(Resource)]
struct SessionReceiver(crossbeam_channel::Receiver<SessionMessage>);

fn start_videos(
    mut commands: Commands,
    screens: Query<(Entity, &VideoScreen, Option<&VideoTexture>), Added<VideoScreen>>,
    images: Res<Assets<Image>>,
    settings: Res<VideoScreenSettings>,
    mut sessions: NonSendMut<VideoSessions>,
) {
    for (entity, screen, texture) in &screens {
        let texture = texture
            .cloned()
            .unwrap_or_else(|| VideoTexture(images.reserve_handle()));
        if let Err(err) = sessions.start(entity, texture.id(), screen, settings.hitch_threshold) {
            error!("Failed to start video on {entity}: {err}");
        }
        commands.entity(entity).insert(texture);
    }
}

fn apply_screen_changes(
    mut screens: Query<(
        Entity,
        Ref<VideoScreen>,
        &VideoTexture,
        Option<(&Mesh3d, &mut screen::QuadSize)>,
    )>,
    settings: Res<VideoScreenSettings>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut sessions: NonSendMut<VideoSessions>,
) {
    for (entity, screen, texture, quad) in &mut screens {
        let screen_changed = !screen.is_added() && screen.is_changed();
        if screen_changed {
            let url_changed = sessions
                .controller(entity)
                .is_none_or(|controller| controller.url() != screen.url);
            if url_changed {
                if let Err(err) =
                    sessions.start(entity, texture.id(), &screen, settings.hitch_threshold)
                {
                    error!("Failed to restart video on {entity}: {err}");
                }
            } else {
                sessions.set_looping(entity, screen.repeat);
                sessions.set_volume(entity, screen.volume);
            }
        }
        if (screen_changed || settings.is_changed())
            && let Some((mesh, mut quad)) = quad
        {
            let size = screen::screen_size(&screen, settings.pixels_per_unit);
            screen::resize_quad(&mut meshes, mesh, &mut quad, size);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_session_messages(
    mut commands: Commands,
    receiver: Res<SessionReceiver>,
    screens: Query<(&VideoScreen, &VideoTexture)>,
    settings: Res<VideoScreenSettings>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut sessions: NonSendMut<VideoSessions>,
) {
    while let Ok(message) = receiver.0.try_recv() {
        let entity = message.entity;
        let Some(handled) = sessions.handle(message) else {
            continue;
        };
        let Ok((screen, texture)) = screens.get(entity) else {
            continue;
        };
        match handled {
            Handled::Loaded { became_ready } => {
                screen::build_screen(
                    &mut commands,
                    entity,
                    screen,
                    texture,
                    settings.pixels_per_unit,
                    &mut meshes,
                    &mut materials,
                );
                if became_ready {
                    commands.trigger_targets(VideoReady, entity);
                }
            }
            Handled::Seeked { became_ready: true } => {
                commands.trigger_targets(VideoReady, entity);
            }
            Handled::ResolveFailed(err) => {
                error!("Failed to resolve {} for {entity}: {err}", screen.url);
                commands.trigger_targets(
                    VideoFailed {
                        reason: err.to_string(),
                    },
                    entity,
                );
            }
            Handled::Failed(reason) => {
                warn!("Video on {entity} failed: {reason}");
                commands.trigger_targets(VideoFailed { reason }, entity);
            }
            _ => {}
        }
    }
}

fn tick_videos(
    mut commands: Commands,
    mut screens: Query<(
        Entity,
        &VideoScreen,
        &VideoTexture,
        Option<&MeshMaterial3d<StandardMaterial>>,
        &mut VideoStatus,
    )>,
    time: Res<Time>,
    mut images: ResMut<Assets<Image>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut sessions: NonSendMut<VideoSessions>,
) {
    for (entity, screen, texture, material, mut status) in &mut screens {
        if let Some(outcome) = sessions.tick(entity, time.delta(), &mut images) {
            if outcome.frame.texture_ready
                && let Some(material) = material
            {
                screen::publish_frame(&mut materials, material, texture, screen.opacity);
            }
            if outcome.hitched {
                commands.trigger_targets(
                    VideoHitched {
                        playback_time: outcome.hitch_position,
                    },
                    entity,
                );
            }
        }
        if let Some(current) = sessions.status(entity) {
            status.set_if_neq(current);
        }
    }
}

fn remove_despawned_videos(
    mut removed: RemovedComponents<VideoScreen>,
    mut sessions: NonSendMut<VideoSessions>,
) {
    for entity in removed.read() {
        sessions.remove(entity);
    }
}

#[derive(Debug)]
pub enum VideoScreenError {
    EmptyUrl,
    NoBackend,
    Backend(String),
}

impl std::error::Error for VideoScreenError {}

impl std::fmt::Display for VideoScreenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyUrl => write!(f, "video url is empty"),
            Self::NoBackend => write!(f, "no video backend installed"),
            Self::Backend(message) => write!(f, "{message}"),
        }
    }
}

#[cfg(target_arch = "wasm32")]
impl From<wasm_bindgen::JsValue> for VideoScreenError {
    fn from(value: wasm_bindgen::JsValue) -> Self {
        Self::Backend(format!("{value:?}"))
    }
}
