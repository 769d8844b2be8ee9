//! HTML `<video>` backed playback for wasm builds.

use bevy::{
    prelude::*,
    render::{Render, RenderApp, RenderSet},
};

use crate::VideoScreenAppExt;

mod decoder;
mod render;
mod youtube;

pub use decoder::HtmlVideoBackend;
pub use youtube::YoutubeResolver;

pub(crate) fn plugin(app: &mut App) {
    app.set_video_backend(HtmlVideoBackend);
}

pub(crate) fn finish(app: &mut App) {
    if let Some(render_app) = app.get_sub_app_mut(RenderApp) {
        render_app.add_systems(
            Render,
            render::render_videos.in_set(RenderSet::PrepareResources),
        );
    }
}
