use bevy::{
    prelude::*,
    render::{render_asset::RenderAssets, renderer::RenderQueue, texture::GpuImage},
};
use wgpu_types::{
    CopyExternalImageDestInfo, CopyExternalImageSourceInfo, ExternalImageSource, Origin2d,
    Origin3d, PredefinedColorSpace, TextureAspect,
};

use super::decoder::with_frame_sources;

pub fn render_videos(queue: Res<RenderQueue>, images: Res<RenderAssets<GpuImage>>) {
    with_frame_sources(|sources| {
        sources
            .iter()
            .filter(|(_, source)| source.renderable)
            .filter_map(|(image_id, source)| {
                images.get(*image_id).map(|gpu_image| (gpu_image, source))
            })
            .for_each(|(gpu_image, source)| {
                queue.copy_external_image_to_texture(
                    &CopyExternalImageSourceInfo {
                        source: ExternalImageSource::HTMLVideoElement(source.element.clone()),
                        origin: Origin2d::ZERO,
                        flip_y: false,
                    },
                    CopyExternalImageDestInfo {
                        texture: &gpu_image.texture,
                        mip_level: 0,
                        origin: Origin3d::ZERO,
                        aspect: TextureAspect::All,
                        color_space: PredefinedColorSpace::Srgb,
                        premultiplied_alpha: true,
                    },
                    gpu_image.size,
                );
            });
    });
}
