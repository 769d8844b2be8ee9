use bevy::{
    asset::RenderAssetUsages,
    prelude::*,
    render::mesh::{Indices, PrimitiveTopology},
};

use crate::{VideoScreen, VideoTexture};

/// Smallest edge a screen may have, in pixels.
const MIN_EDGE: f32 = 0.1;

/// World-space size of a screen.
pub fn screen_size(screen: &VideoScreen, pixels_per_unit: f32) -> Vec2 {
    Vec2::new(screen.width.max(MIN_EDGE), screen.height.max(MIN_EDGE)) / pixels_per_unit
}

/// A flat quad centered on the origin, facing +Z, with the texture upright.
pub fn video_quad(size: Vec2) -> Mesh {
    let half = size * 0.5;
    Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
        .with_inserted_attribute(
            Mesh::ATTRIBUTE_POSITION,
            vec![
                [-half.x, -half.y, 0.0],
                [half.x, -half.y, 0.0],
                [half.x, half.y, 0.0],
                [-half.x, half.y, 0.0],
            ],
        )
        .with_inserted_attribute(Mesh::ATTRIBUTE_NORMAL, vec![[0.0, 0.0, 1.0]; 4])
        .with_inserted_attribute(
            Mesh::ATTRIBUTE_UV_0,
            vec![[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]],
        )
        .with_inserted_indices(Indices::U32(vec![0, 1, 2, 2, 3, 0]))
}

fn alpha_mode(opacity: f32) -> AlphaMode {
    if opacity < 1.0 {
        AlphaMode::Blend
    } else {
        AlphaMode::Opaque
    }
}

pub(crate) fn screen_material(texture: Handle<Image>, opacity: f32) -> StandardMaterial {
    let opacity = opacity.clamp(0.0, 1.0);
    StandardMaterial {
        base_color: Color::WHITE.with_alpha(opacity),
        base_color_texture: Some(texture),
        alpha_mode: alpha_mode(opacity),
        unlit: true,
        ..default()
    }
}

/// World-space size the screen's quad mesh was last built with.
#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub(crate) struct QuadSize(pub Vec2);

/// Give the screen its quad and a material bound to the video texture.
pub(crate) fn build_screen(
    commands: &mut Commands,
    entity: Entity,
    screen: &VideoScreen,
    texture: &VideoTexture,
    pixels_per_unit: f32,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
) {
    let size = screen_size(screen, pixels_per_unit);
    let mesh = meshes.add(video_quad(size));
    let material = materials.add(screen_material(texture.0.clone(), screen.opacity));
    commands
        .entity(entity)
        .try_insert((Mesh3d(mesh), MeshMaterial3d(material), QuadSize(size)));
}

/// Rebuild the quad in place, only if its size actually changed.
pub(crate) fn resize_quad(
    meshes: &mut Assets<Mesh>,
    mesh: &Mesh3d,
    quad: &mut QuadSize,
    size: Vec2,
) -> bool {
    if quad.0 == size {
        return false;
    }
    let Some(current) = meshes.get_mut(&mesh.0) else {
        return false;
    };
    *current = video_quad(size);
    quad.0 = size;
    true
}

/// Point the material at the video texture with the current opacity.
/// Untouched when nothing changed, and skipped while the material does not
/// exist yet.
pub(crate) fn publish_frame(
    materials: &mut Assets<StandardMaterial>,
    material: &MeshMaterial3d<StandardMaterial>,
    texture: &Handle<Image>,
    opacity: f32,
) {
    let opacity = opacity.clamp(0.0, 1.0);
    let Some(current) = materials.get(&material.0) else {
        return;
    };
    if current.base_color_texture.as_ref() == Some(texture)
        && current.base_color.alpha() == opacity
    {
        return;
    }
    if let Some(current) = materials.get_mut(&material.0) {
        current.base_color_texture = Some(texture.clone());
        current.base_color = Color::WHITE.with_alpha(opacity);
        current.alpha_mode = alpha_mode(opacity);
    }
}

#[cfg(feature = "gizmos")]
pub(crate) fn draw_screen_bounds(
    mut gizmos: Gizmos,
    screens: Query<(&GlobalTransform, &VideoScreen)>,
    settings: Res<crate::VideoScreenSettings>,
) {
    use bevy::color::palettes::css::YELLOW;

    for (transform, screen) in &screens {
        let transform = transform.compute_transform();
        gizmos.rect(
            Isometry3d::new(transform.translation, transform.rotation),
            screen_size(screen, settings.pixels_per_unit) * transform.scale.truncate(),
            YELLOW.with_alpha(0.8),
        );
    }
}
