use std::sync::Arc;

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::{
    command::sync::TextureUsageBit,
    diagnostics::DiagnosticsSink,
    framebuffer::{Framebuffer, MAX_COLOR_ATTACHMENTS},
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CommandBufferFlags: u32 {
        const GENERAL_WORK = 1 << 0;
        const COMPUTE_WORK = 1 << 1;
        const TRANSFER_WORK = 1 << 2;
        /// The stream is expected to hold few commands.
        const SMALL_BATCH = 1 << 3;
        /// The stream is executed from inside another stream's render pass.
        const SECOND_LEVEL = 1 << 4;
    }
}

/// Tunables for command stream recording.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecorderConfig {
    /// Commands a small-batch stream is expected to stay under.
    pub small_batch_max_commands: u32,
    /// Small-batch streams above `small_batch_max_commands * batch_band_factor`
    /// commands, and regular streams at or below
    /// `small_batch_max_commands / batch_band_factor`, are reported.
    pub batch_band_factor: u32,
    /// Repeats of one diagnostic kind that are logged before going quiet.
    pub max_repeated_warnings: u32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            small_batch_max_commands: 100,
            batch_band_factor: 4,
            max_repeated_warnings: 10,
        }
    }
}

/// The render pass a second level stream records into.
#[derive(Clone)]
pub struct InheritedRenderPass {
    pub framebuffer: Arc<Framebuffer>,
    pub color_attachment_usages: SmallVec<[TextureUsageBit; MAX_COLOR_ATTACHMENTS]>,
    pub depth_stencil_attachment_usage: TextureUsageBit,
}

#[derive(Clone)]
pub struct CommandBufferInitInfo {
    pub flags: CommandBufferFlags,
    pub config: RecorderConfig,
    pub diagnostics: Arc<dyn DiagnosticsSink>,
    /// Required for `SECOND_LEVEL` streams, forbidden otherwise.
    pub inherited_render_pass: Option<InheritedRenderPass>,
}

impl CommandBufferInitInfo {
    pub fn new(flags: CommandBufferFlags, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        Self {
            flags,
            config: RecorderConfig::default(),
            diagnostics,
            inherited_render_pass: None,
        }
    }

    pub fn second_level(
        diagnostics: Arc<dyn DiagnosticsSink>,
        inherited_render_pass: InheritedRenderPass,
    ) -> Self {
        Self {
            flags: CommandBufferFlags::GENERAL_WORK | CommandBufferFlags::SECOND_LEVEL,
            config: RecorderConfig::default(),
            diagnostics,
            inherited_render_pass: Some(inherited_render_pass),
        }
    }

    pub fn with_config(mut self, config: RecorderConfig) -> Self {
        self.config = config;
        self
    }
}
