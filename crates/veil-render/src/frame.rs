//! Per-frame state snapshotted by the host before pass execution.

use glam::Vec3;

/// Directional light state, snapshotted once per frame.
///
/// Injected through [`FrameContext`] rather than looked up from global engine
/// state, so tests can drive the pass with synthetic light configurations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionalLight {
    /// Forward direction the light shines toward (unit vector).
    pub direction: Vec3,
    /// Light color in linear RGB.
    pub color: [f32; 3],
    /// Whether the light is currently active in the scene.
    pub enabled: bool,
}

/// Everything a pass may touch during one camera's frame.
///
/// `source` and `destination_view` may alias the same texture: the composite
/// is an in-place write, made safe by snapshotting the source into a transient
/// copy before anything samples it.
pub struct FrameContext<'a> {
    /// Camera color target as rendered so far. Must carry `COPY_SRC`.
    pub source: &'a wgpu::Texture,
    /// Where the composited result lands. Usually a view of `source`.
    pub destination_view: &'a wgpu::TextureView,
    /// The scene's directional light, if one exists.
    pub sun: Option<DirectionalLight>,
}
