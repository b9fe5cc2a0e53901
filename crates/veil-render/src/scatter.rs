//! The volumetric scattering sampler pass.
//!
//! Per frame: snapshots the camera color buffer, accumulates noise-jittered
//! scattering samples into a downscaled single-channel sample map, then
//! composites the tinted result additively back onto the destination at full
//! resolution. Transient targets live exactly one Configure → Cleanup span.

use bytemuck::{Pod, Zeroable};
use veil_config::VolumetricSettings;

use crate::dither::DitherTexture;
use crate::frame::{DirectionalLight, FrameContext};
use crate::pass::{FrameDescriptor, FramePass, PassError, RenderStage};

/// Format of the accumulated scattering intensity buffer. Single-channel,
/// renderable, and filterable so the composite can upsample bilinearly.
pub const SAMPLE_MAP_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R16Float;

/// GPU uniform for the scattering accumulation shader. Matches the WGSL
/// struct layout.
///
/// WGSL alignment rules: vec3<f32> has 16-byte alignment, so the anisotropy
/// scalar rides in the fourth lane after the direction instead of standalone
/// padding.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct ScatterParams {
    /// Full-resolution screen size as (w, h, 1/w, 1/h). (offset 0)
    pub screen_size: [f32; 4],
    /// (scattering, extinction, 0, skybox_extinction). (offset 16)
    pub light_transport: [f32; 4],
    /// (noise_offset.xyz, noise_scale). (offset 32)
    pub noise: [f32; 4],
    /// Surface-to-light direction: the light's forward vector, negated. (offset 48)
    pub sun_direction: [f32; 3],
    /// Henyey-Greenstein g parameter. (offset 60)
    pub anisotropy_scalar: f32,
    /// (dither_scale, dither_strength). (offset 64)
    pub dither: [f32; 2],
    /// Scattering samples per pixel. (offset 72)
    pub samples: u32,
    /// 1 / samples, precomputed so the shader loop never divides. (offset 76)
    pub inverse_samples: f32,
    /// 1 when the phase function is directional, 0 for isotropic. (offset 80)
    pub use_anisotropy: u32,
    /// Padding to the 16-byte struct stride. (offset 84)
    pub _pad: [u32; 3],
}

impl ScatterParams {
    /// Pack the per-frame parameter block from a settings snapshot and the
    /// frame's sun state.
    ///
    /// `map_extent` is the downscaled sample-map size; multiplying it back by
    /// the downscale recovers the full-resolution screen-size uniform.
    pub(crate) fn pack(
        settings: &VolumetricSettings,
        sun: &DirectionalLight,
        map_extent: (u32, u32),
    ) -> Self {
        Self {
            screen_size: screen_size_uniform(map_extent, settings.texture_downscale),
            light_transport: [
                settings.scattering,
                settings.extinction,
                0.0,
                settings.skybox_extinction,
            ],
            noise: [
                settings.noise_offset[0],
                settings.noise_offset[1],
                settings.noise_offset[2],
                settings.noise_scale,
            ],
            sun_direction: (-sun.direction).to_array(),
            anisotropy_scalar: settings.anisotropy_scalar,
            dither: [settings.dither_scale, settings.dither_strength],
            samples: settings.pixel_samples,
            inverse_samples: 1.0 / settings.pixel_samples as f32,
            use_anisotropy: u32::from(settings.anisotropy),
            _pad: [0; 3],
        }
    }
}

/// GPU uniform for the compositing shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct CompositeParams {
    /// Sun tint applied to the accumulated scattering intensity.
    pub ray_color: [f32; 4],
}

/// Sample-map dimensions for a camera target: floor-divide both axes by the
/// downscale, clamped so tiny targets never produce a zero-sized buffer.
pub fn sample_map_extent(width: u32, height: u32, downscale: u32) -> (u32, u32) {
    ((width / downscale).max(1), (height / downscale).max(1))
}

/// Full-resolution screen-size uniform recovered from the downscaled extent,
/// packed as (w, h, 1/w, 1/h) for the shaders.
pub fn screen_size_uniform(map_extent: (u32, u32), downscale: u32) -> [f32; 4] {
    let width = (map_extent.0 * downscale) as f32;
    let height = (map_extent.1 * downscale) as f32;
    [width, height, 1.0 / width, 1.0 / height]
}

/// WGSL source for both scattering programs (accumulation and compositing).
pub const SCATTER_SHADER_SOURCE: &str = r#"
struct ScatterParams {
    screen_size: vec4<f32>,
    light_transport: vec4<f32>,
    noise: vec4<f32>,
    sun_direction: vec3<f32>,
    anisotropy_scalar: f32,
    dither: vec2<f32>,
    samples: u32,
    inverse_samples: f32,
    use_anisotropy: u32,
};

struct CompositeParams {
    ray_color: vec4<f32>,
};

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@group(0) @binding(0) var<uniform> params: ScatterParams;
@group(0) @binding(1) var<uniform> composite: CompositeParams;
@group(1) @binding(0) var input_tex: texture_2d<f32>;
@group(1) @binding(1) var input_sampler: sampler;
@group(2) @binding(0) var detail_tex: texture_2d<f32>;
@group(2) @binding(1) var detail_sampler: sampler;

@vertex
fn vs_fullscreen(@builtin(vertex_index) idx: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((idx << 1u) & 2u), f32(idx & 2u));
    var out: VertexOutput;
    out.position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2<f32>(uv.x, 1.0 - uv.y);
    return out;
}

fn hash13(p: vec3<f32>) -> f32 {
    var p3 = fract(p * 0.1031);
    p3 = p3 + vec3<f32>(dot(p3, p3.yzx + vec3<f32>(33.33)));
    return fract((p3.x + p3.y) * p3.z);
}

fn henyey_greenstein(cos_theta: f32, g: f32) -> f32 {
    let g2 = g * g;
    let denom = 1.0 + g2 - 2.0 * g * cos_theta;
    return (1.0 - g2) / (12.5663706 * pow(max(denom, 1e-4), 1.5));
}

// Accumulate in-scattered luminance along a screen-space ray toward the
// light. Extinction attenuates with marched distance; the skybox term damps
// energy for rays that leave the scene.
@fragment
fn fs_accumulate(in: VertexOutput) -> @location(0) vec4<f32> {
    let scattering = params.light_transport.x;
    let extinction = params.light_transport.y;
    let skybox_extinction = params.light_transport.w;

    let dither = textureSample(detail_tex, detail_sampler, in.uv * params.dither.x).r;

    let view_dir = normalize(vec3<f32>(in.uv * 2.0 - vec2<f32>(1.0), 1.0));
    var phase = 1.0;
    var light_uv = vec2<f32>(0.5, 0.5);
    if (params.use_anisotropy != 0u) {
        let sun_dir = normalize(params.sun_direction);
        phase = henyey_greenstein(dot(view_dir, sun_dir), params.anisotropy_scalar);
        light_uv = light_uv + sun_dir.xy * vec2<f32>(0.5, -0.5);
    }

    let pixel = in.uv * params.screen_size.xy;
    let march = light_uv - in.uv;
    var accumulated = 0.0;
    var transmittance = 1.0;
    for (var i = 0u; i < params.samples; i = i + 1u) {
        let noise_p = vec3<f32>(pixel, f32(i)) * params.noise.w + params.noise.xyz;
        let jitter = (hash13(noise_p) - 0.5) + (dither - 0.5) * params.dither.y;
        let t = (f32(i) + 0.5 + jitter) * params.inverse_samples;
        let sample_uv = clamp(in.uv + march * t, vec2<f32>(0.0), vec2<f32>(1.0));
        let radiance = textureSample(input_tex, input_sampler, sample_uv).rgb;
        let luminance = dot(radiance, vec3<f32>(0.2126, 0.7152, 0.0722));
        accumulated = accumulated + luminance * transmittance * scattering * phase;
        transmittance = transmittance * (1.0 - extinction * params.inverse_samples);
    }

    let intensity = accumulated * params.inverse_samples * exp(-skybox_extinction);
    return vec4<f32>(intensity, 0.0, 0.0, 1.0);
}

// Upsample the sample map bilinearly and add the tinted rays onto the
// full-resolution base color.
@fragment
fn fs_composite(in: VertexOutput) -> @location(0) vec4<f32> {
    let base = textureSample(input_tex, input_sampler, in.uv);
    let intensity = textureSample(detail_tex, detail_sampler, in.uv).r;
    return vec4<f32>(base.rgb + composite.ray_color.rgb * intensity, base.a);
}
"#;

/// Transient GPU resources scoped to a single frame.
///
/// Allocated in Configure, consumed in Execute, dropped in Cleanup. Never
/// persists across frames.
struct TransientTargets {
    /// Full-resolution snapshot of the camera color buffer.
    full_res: wgpu::Texture,
    full_res_bind_group: wgpu::BindGroup,
    /// Downscaled scattering intensity buffer.
    #[allow(dead_code)]
    sample_map: wgpu::Texture,
    sample_map_view: wgpu::TextureView,
    sample_map_bind_group: wgpu::BindGroup,
    /// Camera target dimensions this frame.
    full_extent: (u32, u32),
    /// Sample-map dimensions this frame.
    map_extent: (u32, u32),
}

/// The per-frame scattering work unit.
///
/// Long-lived pipelines and layouts are built once; everything sized to the
/// frame lives in [`TransientTargets`] behind an `Option` that doubles as the
/// Configure/Cleanup state machine.
pub struct ScatteringSamplerPass {
    stage: RenderStage,
    /// Settings snapshot for the frame being recorded.
    settings: VolumetricSettings,
    texture_bgl: wgpu::BindGroupLayout,
    accumulate_pipeline: wgpu::RenderPipeline,
    composite_pipeline: wgpu::RenderPipeline,
    sampler_linear: wgpu::Sampler,
    sampler_dither: wgpu::Sampler,
    scatter_buffer: wgpu::Buffer,
    composite_buffer: wgpu::Buffer,
    params_bind_group: wgpu::BindGroup,
    dither_bind_group: wgpu::BindGroup,
    targets: Option<TransientTargets>,
}

impl ScatteringSamplerPass {
    /// Build the pass's pipelines and shared resources once at startup.
    ///
    /// `color_format` is the camera color target format the composite writes
    /// to. Shader or pipeline validation failure surfaces here, before the
    /// first frame ever runs.
    pub fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        dither: &DitherTexture,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("volumetric-shader"),
            source: wgpu::ShaderSource::Wgsl(SCATTER_SHADER_SOURCE.into()),
        });

        let params_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("volumetric-params-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: std::num::NonZeroU64::new(96),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: std::num::NonZeroU64::new(16),
                    },
                    count: None,
                },
            ],
        });

        let texture_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("volumetric-texture-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("volumetric-layout"),
            bind_group_layouts: &[&params_bgl, &texture_bgl, &texture_bgl],
            immediate_size: 0,
        });

        let accumulate_pipeline = create_fullscreen_pipeline(
            device,
            &shader,
            &layout,
            "fs_accumulate",
            SAMPLE_MAP_FORMAT,
            "volumetric-accumulate",
        );
        let composite_pipeline = create_fullscreen_pipeline(
            device,
            &shader,
            &layout,
            "fs_composite",
            color_format,
            "volumetric-composite",
        );

        let sampler_linear = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("volumetric-linear-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let sampler_dither = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("volumetric-dither-sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            ..Default::default()
        });

        use wgpu::util::DeviceExt;
        let scatter_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("volumetric-scatter-params"),
            contents: bytemuck::cast_slice(&[ScatterParams::zeroed()]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let composite_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("volumetric-composite-params"),
            contents: bytemuck::cast_slice(&[CompositeParams::zeroed()]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let params_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("volumetric-params-bg"),
            layout: &params_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: scatter_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: composite_buffer.as_entire_binding(),
                },
            ],
        });

        let dither_bind_group =
            create_texture_bind_group(device, &texture_bgl, &dither.view, &sampler_dither);

        Self {
            stage: RenderStage::AfterTransparents,
            settings: VolumetricSettings::default(),
            texture_bgl,
            accumulate_pipeline,
            composite_pipeline,
            sampler_linear,
            sampler_dither,
            scatter_buffer,
            composite_buffer,
            params_bind_group,
            dither_bind_group,
            targets: None,
        }
    }

    /// Install the settings snapshot the next frame will record with.
    pub fn prepare_frame(&mut self, settings: VolumetricSettings) {
        self.settings = settings;
    }

    /// Swap the dither pattern.
    pub fn set_dither_texture(&mut self, device: &wgpu::Device, dither: &DitherTexture) {
        self.dither_bind_group =
            create_texture_bind_group(device, &self.texture_bgl, &dither.view, &self.sampler_dither);
    }

    /// Whether transient targets are currently allocated.
    pub fn is_configured(&self) -> bool {
        self.targets.is_some()
    }

    /// Sample-map dimensions for the frame being recorded, if configured.
    pub fn sample_map_dimensions(&self) -> Option<(u32, u32)> {
        self.targets.as_ref().map(|t| t.map_extent)
    }
}

impl FramePass for ScatteringSamplerPass {
    fn stage(&self) -> RenderStage {
        self.stage
    }

    fn configure(
        &mut self,
        device: &wgpu::Device,
        frame: &FrameDescriptor,
    ) -> Result<(), PassError> {
        let intermediate = frame.intermediate();
        if intermediate.width == 0 || intermediate.height == 0 {
            return Err(PassError::ZeroSizedTarget {
                width: intermediate.width,
                height: intermediate.height,
            });
        }

        // Downscale is validated and clamped upstream; sizing never divides
        // by zero here.
        let map_extent = sample_map_extent(
            intermediate.width,
            intermediate.height,
            self.settings.texture_downscale,
        );

        let full_res = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("volumetric-full-res"),
            size: wgpu::Extent3d {
                width: intermediate.width,
                height: intermediate.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: intermediate.sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: intermediate.format,
            usage: wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let full_res_view = full_res.create_view(&wgpu::TextureViewDescriptor::default());
        let full_res_bind_group =
            create_texture_bind_group(device, &self.texture_bgl, &full_res_view, &self.sampler_linear);

        let sample_map = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("volumetric-sample-map"),
            size: wgpu::Extent3d {
                width: map_extent.0,
                height: map_extent.1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SAMPLE_MAP_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let sample_map_view = sample_map.create_view(&wgpu::TextureViewDescriptor::default());
        let sample_map_bind_group = create_texture_bind_group(
            device,
            &self.texture_bgl,
            &sample_map_view,
            &self.sampler_linear,
        );

        log::trace!(
            "Volumetric targets: full {}x{}, sample map {}x{}",
            intermediate.width,
            intermediate.height,
            map_extent.0,
            map_extent.1
        );

        self.targets = Some(TransientTargets {
            full_res,
            full_res_bind_group,
            sample_map,
            sample_map_view,
            sample_map_bind_group,
            full_extent: (intermediate.width, intermediate.height),
            map_extent,
        });
        Ok(())
    }

    fn execute(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        queue: &wgpu::Queue,
        frame: &FrameContext,
    ) {
        let Some(targets) = self.targets.as_ref() else {
            log::warn!("volumetric pass executed without configured targets; skipping");
            return;
        };
        let Some(sun) = frame.sun.filter(|sun| sun.enabled) else {
            log::trace!("volumetric pass executed without an active sun; skipping");
            return;
        };

        let params = ScatterParams::pack(&self.settings, &sun, targets.map_extent);
        queue.write_buffer(&self.scatter_buffer, 0, bytemuck::cast_slice(&[params]));

        let composite = CompositeParams {
            ray_color: [sun.color[0], sun.color[1], sun.color[2], 1.0],
        };
        queue.write_buffer(&self.composite_buffer, 0, bytemuck::cast_slice(&[composite]));

        // Snapshot the camera color buffer. The composite below writes into
        // the destination (often the same texture), so the original content
        // has to survive somewhere samplable.
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: frame.source,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: &targets.full_res,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: targets.full_extent.0,
                height: targets.full_extent.1,
                depth_or_array_layers: 1,
            },
        );

        // 1. Accumulate scattering into the low-resolution sample map.
        run_fullscreen_pass(
            encoder,
            &self.accumulate_pipeline,
            &self.params_bind_group,
            &targets.full_res_bind_group,
            &self.dither_bind_group,
            &targets.sample_map_view,
            wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
            "volumetric-accumulate",
        );

        // 2. Upsample and composite additively onto the destination.
        run_fullscreen_pass(
            encoder,
            &self.composite_pipeline,
            &self.params_bind_group,
            &targets.full_res_bind_group,
            &targets.sample_map_bind_group,
            frame.destination_view,
            wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            "volumetric-composite",
        );
    }

    fn cleanup(&mut self) {
        if self.targets.take().is_some() {
            log::trace!("Released volumetric transient targets");
        }
    }
}

/// Record a single fullscreen triangle pass.
#[allow(clippy::too_many_arguments)]
fn run_fullscreen_pass(
    encoder: &mut wgpu::CommandEncoder,
    pipeline: &wgpu::RenderPipeline,
    params_bind_group: &wgpu::BindGroup,
    input_bind_group: &wgpu::BindGroup,
    detail_bind_group: &wgpu::BindGroup,
    target_view: &wgpu::TextureView,
    load_op: wgpu::LoadOp<wgpu::Color>,
    label: &str,
) {
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: target_view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: load_op,
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, params_bind_group, &[]);
    pass.set_bind_group(1, input_bind_group, &[]);
    pass.set_bind_group(2, detail_bind_group, &[]);
    pass.draw(0..3, 0..1);
}

/// Create a fullscreen render pipeline with the given fragment entry point.
fn create_fullscreen_pipeline(
    device: &wgpu::Device,
    shader: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    fragment_entry: &str,
    target_format: wgpu::TextureFormat,
    label: &str,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_fullscreen"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(fragment_entry),
            targets: &[Some(wgpu::ColorTargetState {
                format: target_format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview_mask: None,
        cache: None,
    })
}

/// Bind a texture view and sampler as a texture bind group.
fn create_texture_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("volumetric-texture-bg"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}
