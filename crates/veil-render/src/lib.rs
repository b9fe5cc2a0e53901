//! Screen-space volumetric lighting for wgpu render pipelines.
//!
//! Accumulates light scattering into a downscaled sample map with
//! noise-dithered sampling, then composites it additively onto the camera
//! color buffer. Designed to slot into a host pipeline after transparent
//! geometry and before final post-processing.

pub mod dither;
pub mod feature;
pub mod frame;
pub mod pass;
pub mod scatter;

pub use dither::{DitherError, DitherTexture};
pub use feature::VolumetricLightingFeature;
pub use frame::{DirectionalLight, FrameContext};
pub use pass::{FrameDescriptor, FramePass, PassError, PassQueue, RenderStage};
pub use scatter::{
    SCATTER_SHADER_SOURCE, ScatteringSamplerPass, sample_map_extent, screen_size_uniform,
};
