//! The feature controller: owns the scattering pass across the application
//! lifetime and decides, once per frame per camera, whether it runs.

use veil_config::VolumetricSettings;

use crate::dither::DitherTexture;
use crate::frame::{DirectionalLight, FrameContext};
use crate::pass::PassQueue;
use crate::scatter::ScatteringSamplerPass;

/// Owns the volumetric scattering pass and its tuning.
///
/// Constructed once at startup; the pass's pipelines never rebuild per frame.
/// Per frame the controller snapshots the settings into the pass and enqueues
/// it, or contributes nothing when the skip condition holds.
pub struct VolumetricLightingFeature {
    settings: VolumetricSettings,
    pass: ScatteringSamplerPass,
}

impl VolumetricLightingFeature {
    /// Build the feature. Pipeline or shader validation failures surface
    /// here, once, rather than per frame.
    ///
    /// Incoming settings are clamped into their documented ranges so sizing
    /// invariants hold before the first Configure.
    pub fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        dither: &DitherTexture,
        settings: VolumetricSettings,
    ) -> Self {
        let pass = ScatteringSamplerPass::new(device, color_format, dither);
        Self {
            settings: settings.clamped(),
            pass,
        }
    }

    /// Current tuning.
    pub fn settings(&self) -> &VolumetricSettings {
        &self.settings
    }

    /// Replace the tuning. Values are clamped, not rejected; external tooling
    /// sliders may briefly pass through wild intermediate values.
    pub fn set_settings(&mut self, settings: VolumetricSettings) {
        self.settings = settings.clamped();
    }

    /// Swap the dither pattern at runtime.
    pub fn set_dither_texture(&mut self, device: &wgpu::Device, dither: &DitherTexture) {
        self.pass.set_dither_texture(device, dither);
    }

    /// Read-only access to the owned pass, for host-side introspection.
    pub fn pass(&self) -> &ScatteringSamplerPass {
        &self.pass
    }

    /// Called once per frame per camera. Enqueues the pass for this frame,
    /// or does nothing when the effect is disabled or no active directional
    /// light exists. A skipped frame allocates no resources at all.
    pub fn enqueue_passes<'frame>(
        &'frame mut self,
        frame: &FrameContext,
        queue: &mut PassQueue<'frame>,
    ) {
        if should_skip(self.settings.enabled, frame.sun.as_ref()) {
            log::trace!(
                "volumetric pass skipped (enabled: {}, sun active: {})",
                self.settings.enabled,
                frame.sun.as_ref().is_some_and(|sun| sun.enabled),
            );
            return;
        }

        self.pass.prepare_frame(self.settings.clone());
        queue.enqueue(&mut self.pass);
    }
}

/// The skip condition: effect disabled, no directional light, or the light
/// is inactive. A missing light is a normal skip, never an error.
fn should_skip(enabled: bool, sun: Option<&DirectionalLight>) -> bool {
    !enabled || !sun.is_some_and(|sun| sun.enabled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn active_sun() -> DirectionalLight {
        DirectionalLight {
            direction: Vec3::NEG_Y,
            color: [1.0; 3],
            enabled: true,
        }
    }

    #[test]
    fn test_skip_when_disabled() {
        let sun = active_sun();
        assert!(should_skip(false, Some(&sun)));
    }

    #[test]
    fn test_skip_when_no_sun_exists() {
        assert!(should_skip(true, None));
    }

    #[test]
    fn test_skip_when_sun_inactive() {
        let sun = DirectionalLight {
            enabled: false,
            ..active_sun()
        };
        assert!(should_skip(true, Some(&sun)));
    }

    #[test]
    fn test_runs_with_enabled_effect_and_active_sun() {
        let sun = active_sun();
        assert!(!should_skip(true, Some(&sun)));
    }
}
