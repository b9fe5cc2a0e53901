//! Dither pattern textures used to break up banding in the scattering pass.
//!
//! Hosts normally supply a tiling blue-noise texture. When none is shipped,
//! [`DitherTexture::interleaved_gradient`] generates a deterministic
//! interleaved-gradient pattern that masks banding nearly as well.

/// Errors that can occur while building a dither texture.
#[derive(Debug, thiserror::Error)]
pub enum DitherError {
    /// Width or height is zero.
    #[error("dither texture dimensions must be non-zero, got {width}x{height}")]
    ZeroDimensions { width: u32, height: u32 },

    /// Pixel data length doesn't match the expected size for the dimensions.
    #[error("dither data size ({actual}) does not match expected ({expected}) for {width}x{height}")]
    DataSizeMismatch {
        actual: usize,
        expected: usize,
        width: u32,
        height: u32,
    },

    /// The supplied image bytes could not be decoded.
    #[error("failed to decode dither image: {0}")]
    Decode(#[from] image::ImageError),
}

/// A GPU-resident single-channel dither pattern.
///
/// Sampled with repeat addressing and nearest filtering so the pattern tiles
/// across the screen without smearing.
pub struct DitherTexture {
    /// The underlying GPU texture (`R8Unorm`).
    pub texture: wgpu::Texture,
    /// Default view into the texture.
    pub view: wgpu::TextureView,
    /// Width and height in texels.
    pub dimensions: (u32, u32),
}

impl DitherTexture {
    /// Upload a single-channel 8-bit pattern.
    pub fn from_gray8(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<Self, DitherError> {
        validate_gray8(width, height, data)?;

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("volumetric-dither"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        log::debug!("Uploaded {width}x{height} dither texture");

        Ok(Self {
            texture,
            view,
            dimensions: (width, height),
        })
    }

    /// Decode a PNG (typically a blue-noise tile) and upload it as luma8.
    pub fn from_png_bytes(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        bytes: &[u8],
    ) -> Result<Self, DitherError> {
        let (width, height, data) = decode_luma8(bytes)?;
        Self::from_gray8(device, queue, width, height, &data)
    }

    /// Generate an interleaved-gradient-noise tile of `size` x `size` texels.
    ///
    /// Deterministic, so captures are reproducible frame to frame.
    pub fn interleaved_gradient(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        size: u32,
    ) -> Result<Self, DitherError> {
        if size == 0 {
            return Err(DitherError::ZeroDimensions {
                width: size,
                height: size,
            });
        }
        let mut data = Vec::with_capacity((size * size) as usize);
        for y in 0..size {
            for x in 0..size {
                data.push((interleaved_gradient_noise(x, y) * 255.0).round() as u8);
            }
        }
        Self::from_gray8(device, queue, size, size, &data)
    }
}

/// Interleaved gradient noise (Jimenez 2014) at integer pixel coordinates.
/// Returns a value in \[0, 1).
pub fn interleaved_gradient_noise(x: u32, y: u32) -> f32 {
    let v = 0.06711056 * x as f32 + 0.00583715 * y as f32;
    (52.982_918 * v.fract()).fract()
}

/// Check dimensions and data length for a gray8 upload.
fn validate_gray8(width: u32, height: u32, data: &[u8]) -> Result<(), DitherError> {
    if width == 0 || height == 0 {
        return Err(DitherError::ZeroDimensions { width, height });
    }
    let expected = (width * height) as usize;
    if data.len() != expected {
        return Err(DitherError::DataSizeMismatch {
            actual: data.len(),
            expected,
            width,
            height,
        });
    }
    Ok(())
}

/// Decode image bytes to (width, height, luma8 pixels).
fn decode_luma8(bytes: &[u8]) -> Result<(u32, u32, Vec<u8>), DitherError> {
    let img = image::load_from_memory(bytes)?.to_luma8();
    let (width, height) = img.dimensions();
    Ok((width, height, img.into_raw()))
}
