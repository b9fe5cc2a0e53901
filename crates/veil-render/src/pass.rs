//! The host pipeline's extension contract: stage ordering, the pass
//! lifecycle trait, and the per-frame queue that drives it.
//!
//! A pass moves through exactly one Configure → Execute → Cleanup triple per
//! camera per frame. [`PassQueue::run`] is the only driver and guarantees the
//! ordering; a failed Configure skips Execute but never Cleanup.

use crate::frame::FrameContext;

/// Ordering key slotting a pass into the host pipeline's total pass order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RenderStage {
    BeforeOpaques,
    AfterOpaques,
    AfterSkybox,
    /// Opaque and transparent geometry are fully composited here. Volumetrics
    /// run at this stage so rays pick up everything in the color buffer.
    AfterTransparents,
    BeforePostProcess,
    AfterPostProcess,
}

/// Errors raised while configuring a pass for a frame.
#[derive(Debug, thiserror::Error)]
pub enum PassError {
    /// A transient target would have a zero dimension.
    #[error("transient target would be zero-sized: {width}x{height}")]
    ZeroSizedTarget { width: u32, height: u32 },
}

/// Geometry of the camera target for one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameDescriptor {
    /// Target width in pixels.
    pub width: u32,
    /// Target height in pixels.
    pub height: u32,
    /// MSAA sample count of the camera target.
    pub sample_count: u32,
    /// Depth buffer precision of the camera target (0 = no depth).
    pub depth_bits: u32,
    /// Color format of the camera target.
    pub format: wgpu::TextureFormat,
}

impl FrameDescriptor {
    /// Descriptor for intermediate 2D compositing targets: same dimensions
    /// and format, single-sample, no depth.
    pub fn intermediate(&self) -> FrameDescriptor {
        FrameDescriptor {
            sample_count: 1,
            depth_bits: 0,
            ..*self
        }
    }
}

/// Lifecycle callbacks a pass implements to participate in a frame.
pub trait FramePass {
    /// Ordering key for this pass.
    fn stage(&self) -> RenderStage;

    /// Allocate per-frame transient resources sized to the camera target.
    fn configure(
        &mut self,
        device: &wgpu::Device,
        frame: &FrameDescriptor,
    ) -> Result<(), PassError>;

    /// Record GPU commands into `encoder`. Must not submit, block, or read
    /// back; the host submits the encoder asynchronously after all passes.
    fn execute(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        queue: &wgpu::Queue,
        frame: &FrameContext,
    );

    /// Release everything allocated in `configure`. Runs on every exit path,
    /// including frames where Execute was skipped after a Configure failure.
    fn cleanup(&mut self);
}

/// Per-frame collection of enqueued passes.
///
/// Rebuilt every frame; passes that should not run this frame are simply
/// never enqueued, so no resources are allocated for them.
pub struct PassQueue<'frame> {
    passes: Vec<&'frame mut dyn FramePass>,
}

impl Default for PassQueue<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'frame> PassQueue<'frame> {
    /// Create an empty queue for this frame.
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Register a pass for execution this frame.
    pub fn enqueue(&mut self, pass: &'frame mut dyn FramePass) {
        self.passes.push(pass);
    }

    /// Number of passes enqueued this frame.
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Whether any pass was enqueued this frame.
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Drive every enqueued pass through Configure → Execute → Cleanup in
    /// stage order. Insertion order breaks ties within a stage.
    ///
    /// A Configure error is surfaced through the log and skips that pass's
    /// Execute; Cleanup still runs so partial allocations never leak.
    pub fn run(
        mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        descriptor: &FrameDescriptor,
        frame: &FrameContext,
    ) {
        self.passes.sort_by_key(|pass| pass.stage());

        for pass in self.passes {
            match pass.configure(device, descriptor) {
                Ok(()) => pass.execute(encoder, queue, frame),
                Err(err) => {
                    log::error!("pass configuration failed, skipping execute: {err}");
                }
            }
            pass.cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_ordering_is_total() {
        assert!(RenderStage::BeforeOpaques < RenderStage::AfterOpaques);
        assert!(RenderStage::AfterOpaques < RenderStage::AfterSkybox);
        assert!(RenderStage::AfterSkybox < RenderStage::AfterTransparents);
        assert!(RenderStage::AfterTransparents < RenderStage::BeforePostProcess);
        assert!(RenderStage::BeforePostProcess < RenderStage::AfterPostProcess);
    }

    #[test]
    fn test_intermediate_descriptor_forces_single_sample_no_depth() {
        let descriptor = FrameDescriptor {
            width: 1920,
            height: 1080,
            sample_count: 4,
            depth_bits: 24,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
        };
        let intermediate = descriptor.intermediate();
        assert_eq!(intermediate.width, 1920);
        assert_eq!(intermediate.height, 1080);
        assert_eq!(intermediate.sample_count, 1);
        assert_eq!(intermediate.depth_bits, 0);
        assert_eq!(intermediate.format, descriptor.format);
    }

    #[test]
    fn test_empty_queue_reports_empty() {
        let queue = PassQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_zero_sized_target_error_message() {
        let err = PassError::ZeroSizedTarget {
            width: 0,
            height: 270,
        };
        assert_eq!(
            err.to_string(),
            "transient target would be zero-sized: 0x270"
        );
    }
}
