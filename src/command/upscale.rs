//! Seam for temporal upscalers. The vendor integrations live outside this crate.
use std::sync::Arc;

use ash::{prelude::VkResult, vk};

use crate::resources::TextureView;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpscalerKind {
    Dlss2,
    Fsr2,
}

#[derive(Clone, Debug)]
pub struct UpscaleInputs {
    pub in_color: Arc<TextureView>,
    pub out_upscaled_color: Arc<TextureView>,
    pub motion_vectors: Arc<TextureView>,
    pub depth: Arc<TextureView>,
    pub exposure: Arc<TextureView>,
    pub reset_accumulation: bool,
    pub jitter_offset: [f32; 2],
    pub motion_vectors_scale: [f32; 2],
    pub camera_near: f32,
    pub camera_far: f32,
    pub camera_fov_v: f32,
}

impl UpscaleInputs {
    pub fn views(&self) -> [&Arc<TextureView>; 5] {
        [
            &self.in_color,
            &self.out_upscaled_color,
            &self.motion_vectors,
            &self.depth,
            &self.exposure,
        ]
    }
}

pub trait Upscaler: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> UpscalerKind;

    /// Records the upscaler's work into `command_buffer`.
    ///
    /// # Safety
    /// `command_buffer` must be in the recording state, outside of a render pass,
    /// and every input view must be in the layout its usage implies.
    unsafe fn evaluate(
        &self,
        command_buffer: vk::CommandBuffer,
        inputs: &UpscaleInputs,
    ) -> VkResult<()>;
}
