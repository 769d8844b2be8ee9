#![cfg(target_arch = "wasm32")]

use bevy::{prelude::*, window::WindowResolution};
use bevy_video_screen::{
    VideoFailed, VideoHitched, VideoReady, VideoScreen, VideoScreenAppExt,
    VideoScreenCommandsExt, VideoScreenPlugin, VideoStatus, web::YoutubeResolver,
};
use wasm_bindgen::prelude::*;

#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    let mut app = App::new();
    app.add_plugins((
        DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                resolution: WindowResolution::new(1280.0, 720.0),
                ..default()
            }),
            ..default()
        }),
        VideoScreenPlugin::default(),
    ))
    .set_stream_resolver(YoutubeResolver::new("/youtube/player?id={id}"))
    .add_systems(Startup, setup)
    .add_systems(Update, controls);

    app.run();
}

fn setup(mut commands: Commands) {
    commands
        .spawn((
            VideoScreen::new(
                "https://commondatastorage.googleapis.com/gtv-videos-bucket/sample/BigBuckBunny.mp4",
            )
            .with_repeat(true),
            Transform::from_xyz(0.0, 0.0, 0.0),
        ))
        .observe(|trigger: Trigger<VideoReady>| info!("Video {} ready", trigger.target()))
        .observe(|trigger: Trigger<VideoHitched>| {
            info!("Video hitched at {:.1}s", trigger.event().playback_time)
        })
        .observe(|trigger: Trigger<VideoFailed>| {
            warn!("Video failed: {}", trigger.event().reason)
        });
    commands.spawn((PointLight::default(), Transform::from_xyz(3.0, 3.0, 2.0)));
    commands.spawn((Camera3d::default(), Transform::from_xyz(0., 0., 2.)));
}

fn controls(
    mut commands: Commands,
    keys: Res<ButtonInput<KeyCode>>,
    mut screens: Query<(Entity, &mut VideoScreen, &VideoStatus)>,
) {
    for (entity, mut screen, status) in &mut screens {
        if keys.just_pressed(KeyCode::ArrowRight) {
            commands
                .entity(entity)
                .seek_video(status.playback_time + 10.0);
        }
        if keys.just_pressed(KeyCode::KeyR) {
            commands.entity(entity).restart_video();
        }
        if keys.just_pressed(KeyCode::ArrowUp) {
            screen.opacity = (screen.opacity + 0.1).min(1.0);
        }
        if keys.just_pressed(KeyCode::ArrowDown) {
            screen.opacity = (screen.opacity - 0.1).max(0.0);
        }
    }
}
