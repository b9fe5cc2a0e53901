//! The volumetric lighting settings record and its range validation.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Bounds for `texture_downscale`. A divisor of 0 would size a zero-pixel
/// sample map; anything above 5 produces a buffer too coarse to upsample.
pub const DOWNSCALE_RANGE: (u32, u32) = (1, 5);

/// Tuning parameters for the volumetric scattering pass.
///
/// Immutable during a frame: the feature controller clones a snapshot into
/// the pass before enqueueing, so external tooling may rewrite these fields
/// between frames without torn reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VolumetricSettings {
    /// Master toggle. When false the pass is never enqueued.
    pub enabled: bool,
    /// Scattering samples accumulated per pixel. Must be >= 1.
    /// Drives per-pixel cost; lower counts band more and lean on dithering.
    pub pixel_samples: u32,
    /// Offset into the procedural jitter noise field.
    pub noise_offset: [f32; 3],
    /// Frequency scale of the jitter noise.
    pub noise_scale: f32,
    /// In-scattering coefficient. Range \[0, 1\].
    pub scattering: f32,
    /// Extinction (out-scattering + absorption) coefficient. Must be >= 0.
    pub extinction: f32,
    /// Extinction applied where the ray exits into the skybox.
    pub skybox_extinction: f32,
    /// Divisor applied to both sample-map dimensions. Range \[1, 5\].
    pub texture_downscale: u32,
    /// Enable directionally biased (forward) scattering.
    pub anisotropy: bool,
    /// Henyey-Greenstein g parameter for the phase function. Range \[0, 1\].
    pub anisotropy_scalar: f32,
    /// Strength of the blue-noise dither applied to sample positions.
    pub dither_strength: f32,
    /// UV tiling scale of the dither texture.
    pub dither_scale: f32,
}

impl Default for VolumetricSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            pixel_samples: 32,
            noise_offset: [0.0; 3],
            noise_scale: 1.0,
            scattering: 0.07,
            extinction: 0.22,
            skybox_extinction: 0.0,
            texture_downscale: 1,
            anisotropy: true,
            anisotropy_scalar: 0.1,
            dither_strength: 0.5,
            dither_scale: 1.27,
        }
    }
}

impl VolumetricSettings {
    /// Check every field against its documented range.
    ///
    /// Returns the first violation found. Call before handing a record to the
    /// render feature; out-of-range values must never reach buffer sizing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pixel_samples < 1 {
            return Err(ConfigError::OutOfRange {
                field: "pixel_samples",
                value: f64::from(self.pixel_samples),
                min: 1.0,
                max: f64::from(u32::MAX),
            });
        }
        let (min_d, max_d) = DOWNSCALE_RANGE;
        if self.texture_downscale < min_d || self.texture_downscale > max_d {
            return Err(ConfigError::OutOfRange {
                field: "texture_downscale",
                value: f64::from(self.texture_downscale),
                min: f64::from(min_d),
                max: f64::from(max_d),
            });
        }
        if !(0.0..=1.0).contains(&self.scattering) {
            return Err(ConfigError::OutOfRange {
                field: "scattering",
                value: f64::from(self.scattering),
                min: 0.0,
                max: 1.0,
            });
        }
        if self.extinction < 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "extinction",
                value: f64::from(self.extinction),
                min: 0.0,
                max: f64::from(f32::MAX),
            });
        }
        if !(0.0..=1.0).contains(&self.anisotropy_scalar) {
            return Err(ConfigError::OutOfRange {
                field: "anisotropy_scalar",
                value: f64::from(self.anisotropy_scalar),
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(())
    }

    /// Saturating repair: clamp every field into its documented range.
    ///
    /// Used when values arrive from untrusted sources (hand-edited RON,
    /// tooling sliders) and a hard rejection would be hostile.
    pub fn clamped(&self) -> Self {
        let (min_d, max_d) = DOWNSCALE_RANGE;
        Self {
            pixel_samples: self.pixel_samples.max(1),
            texture_downscale: self.texture_downscale.clamp(min_d, max_d),
            scattering: self.scattering.clamp(0.0, 1.0),
            extinction: self.extinction.max(0.0),
            anisotropy_scalar: self.anisotropy_scalar.clamp(0.0, 1.0),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = VolumetricSettings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_default_tuning_values() {
        let settings = VolumetricSettings::default();
        assert!(settings.enabled);
        assert_eq!(settings.pixel_samples, 32);
        assert_eq!(settings.texture_downscale, 1);
        assert!((settings.scattering - 0.07).abs() < 1e-6);
        assert!((settings.extinction - 0.22).abs() < 1e-6);
        assert!((settings.dither_scale - 1.27).abs() < 1e-6);
    }

    #[test]
    fn test_zero_samples_rejected() {
        let settings = VolumetricSettings {
            pixel_samples: 0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::OutOfRange {
                field: "pixel_samples",
                ..
            })
        ));
    }

    #[test]
    fn test_zero_downscale_rejected() {
        let settings = VolumetricSettings {
            texture_downscale: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_oversized_downscale_rejected() {
        let settings = VolumetricSettings {
            texture_downscale: 6,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_downscale_bounds_accepted() {
        for downscale in 1..=5 {
            let settings = VolumetricSettings {
                texture_downscale: downscale,
                ..Default::default()
            };
            assert!(
                settings.validate().is_ok(),
                "downscale {downscale} should be accepted"
            );
        }
    }

    #[test]
    fn test_clamped_repairs_degenerate_values() {
        let settings = VolumetricSettings {
            pixel_samples: 0,
            texture_downscale: 9,
            scattering: 3.0,
            extinction: -1.0,
            anisotropy_scalar: 2.0,
            ..Default::default()
        };
        let repaired = settings.clamped();
        assert_eq!(repaired.pixel_samples, 1);
        assert_eq!(repaired.texture_downscale, 5);
        assert_eq!(repaired.scattering, 1.0);
        assert_eq!(repaired.extinction, 0.0);
        assert_eq!(repaired.anisotropy_scalar, 1.0);
        assert!(repaired.validate().is_ok());
    }

    #[test]
    fn test_clamped_preserves_valid_values() {
        let settings = VolumetricSettings::default();
        assert_eq!(settings.clamped(), settings);
    }

    #[test]
    fn test_negative_scattering_rejected() {
        let settings = VolumetricSettings {
            scattering: -0.1,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
