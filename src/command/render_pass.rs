//! Render pass phases and the dynamic state tracked across them.
use std::sync::Arc;

use ash::vk;
use smallvec::SmallVec;

use super::{commands::Command, sync::TextureUsageBit};
use crate::{
    config::InheritedRenderPass,
    framebuffer::{AttachmentLayouts, Framebuffer, MAX_COLOR_ATTACHMENTS},
    resources::{Texture, TextureSubresource, TextureView},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderPassPhase {
    Inactive,
    /// `begin_render_pass` was called but nothing has been recorded in the pass yet.
    PendingBegin,
    Began,
}

pub(crate) struct RenderPassState {
    phase: RenderPassPhase,
    framebuffer: Option<Arc<Framebuffer>>,
    color_usages: SmallVec<[TextureUsageBit; MAX_COLOR_ATTACHMENTS]>,
    depth_stencil_usage: TextureUsageBit,
    render_area: vk::Rect2D,
    contents: Option<vk::SubpassContents>,
}

impl Default for RenderPassState {
    fn default() -> Self {
        Self {
            phase: RenderPassPhase::Inactive,
            framebuffer: None,
            color_usages: SmallVec::new(),
            depth_stencil_usage: TextureUsageBit::empty(),
            render_area: vk::Rect2D::default(),
            contents: None,
        }
    }
}

impl RenderPassState {
    pub(crate) fn phase(&self) -> RenderPassPhase {
        self.phase
    }

    pub(crate) fn is_active(&self) -> bool {
        self.phase != RenderPassPhase::Inactive
    }

    pub(crate) fn framebuffer(&self) -> Option<&Arc<Framebuffer>> {
        self.framebuffer.as_ref()
    }

    pub(crate) fn render_area(&self) -> vk::Rect2D {
        self.render_area
    }

    pub(crate) fn begin(
        &mut self,
        framebuffer: Arc<Framebuffer>,
        color_usages: &[TextureUsageBit],
        depth_stencil_usage: TextureUsageBit,
        render_area: vk::Rect2D,
    ) {
        assert_eq!(
            self.phase,
            RenderPassPhase::Inactive,
            "render pass begun while another one is active"
        );
        assert_eq!(
            color_usages.len(),
            framebuffer.color_attachments().len(),
            "one usage is needed per color attachment"
        );
        assert_eq!(
            depth_stencil_usage.is_empty(),
            framebuffer.depth_stencil_attachment().is_none(),
            "depth-stencil usage must be given exactly when there is a depth-stencil attachment"
        );
        self.render_area = clamp_render_area(render_area, &framebuffer);
        self.framebuffer = Some(framebuffer);
        self.color_usages = color_usages.iter().copied().collect();
        self.depth_stencil_usage = depth_stencil_usage;
        self.contents = None;
        self.phase = RenderPassPhase::PendingBegin;
    }

    /// Second level streams live inside a pass begun by someone else.
    pub(crate) fn inherit(&mut self, inherited: &InheritedRenderPass) {
        let framebuffer = inherited.framebuffer.clone();
        self.begin(
            framebuffer.clone(),
            &inherited.color_attachment_usages,
            inherited.depth_stencil_attachment_usage,
            vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D {
                    width: framebuffer.width(),
                    height: framebuffer.height(),
                },
            },
        );
        self.phase = RenderPassPhase::Began;
        self.contents = Some(vk::SubpassContents::INLINE);
    }

    /// Marks the native begin as recorded.
    pub(crate) fn mark_began(&mut self, contents: vk::SubpassContents) {
        assert_eq!(self.phase, RenderPassPhase::PendingBegin);
        self.phase = RenderPassPhase::Began;
        self.contents = Some(contents);
    }

    /// Checks that inline and secondary contents are not mixed in the pass.
    pub(crate) fn record(&mut self, contents: vk::SubpassContents) {
        assert_eq!(self.phase, RenderPassPhase::Began);
        assert_eq!(
            self.contents,
            Some(contents),
            "inline commands and secondary command buffers cannot be mixed in one render pass"
        );
    }

    /// Attachments paired with the usage they are planned for, colors first.
    ///
    /// A depth-stencil attachment always covers every aspect of its texture,
    /// the render pass moves depth and stencil to the same layout even when
    /// the view only selects one of them.
    pub(crate) fn attachments(
        &self,
    ) -> SmallVec<[(Arc<Texture>, TextureSubresource, TextureUsageBit); 5]> {
        let mut attachments = SmallVec::new();
        if let Some(framebuffer) = self.framebuffer.as_ref() {
            for (attachment, usage) in framebuffer
                .color_attachments()
                .iter()
                .zip(self.color_usages.iter())
            {
                let view = &attachment.view;
                attachments.push((view.texture().clone(), *view.subresource(), *usage));
            }
            if let Some(attachment) = framebuffer.depth_stencil_attachment() {
                let texture = attachment.view.texture();
                let subresource = TextureSubresource {
                    aspect: texture.aspects(),
                    ..*attachment.view.subresource()
                };
                attachments.push((texture.clone(), subresource, self.depth_stencil_usage));
            }
        }
        attachments
    }

    pub(crate) fn attachment_layouts(&self) -> AttachmentLayouts {
        let layout = |view: &TextureView, usage: TextureUsageBit| {
            view.texture().layout(usage, view.subresource().first_mip)
        };
        let framebuffer = match self.framebuffer.as_ref() {
            Some(framebuffer) => framebuffer,
            None => return AttachmentLayouts::default(),
        };
        AttachmentLayouts {
            color: framebuffer
                .color_attachments()
                .iter()
                .zip(self.color_usages.iter())
                .map(|(attachment, usage)| layout(&attachment.view, *usage))
                .collect(),
            depth_stencil: framebuffer
                .depth_stencil_attachment()
                .map(|attachment| layout(&attachment.view, self.depth_stencil_usage)),
        }
    }

    pub(crate) fn is_attachment(&self, texture: &Texture) -> bool {
        self.framebuffer
            .as_ref()
            .map_or(false, |framebuffer| framebuffer.has_attachment(texture))
    }

    /// Returns whether secondary command buffers were executed in the pass.
    pub(crate) fn end(&mut self) -> bool {
        assert_eq!(
            self.phase,
            RenderPassPhase::Began,
            "render pass ended before it was begun"
        );
        let had_secondaries = self.contents == Some(vk::SubpassContents::SECONDARY_COMMAND_BUFFERS);
        *self = Self::default();
        had_secondaries
    }
}

fn clamp_render_area(area: vk::Rect2D, framebuffer: &Framebuffer) -> vk::Rect2D {
    let (width, height) = (framebuffer.width(), framebuffer.height());
    assert!(
        area.offset.x >= 0
            && area.offset.y >= 0
            && (area.offset.x as u32) < width
            && (area.offset.y as u32) < height,
        "render area origin {:?} outside of the {}x{} framebuffer",
        area.offset,
        width,
        height
    );
    let (x, y) = (area.offset.x as u32, area.offset.y as u32);
    vk::Rect2D {
        offset: area.offset,
        extent: vk::Extent2D {
            width: area.extent.width.min(width - x),
            height: area.extent.height.min(height - y),
        },
    }
}

/// Rectangle as `[x, y, width, height]`.
type Rect = [u32; 4];

fn rect_of(area: vk::Rect2D) -> Rect {
    [
        area.offset.x as u32,
        area.offset.y as u32,
        area.extent.width,
        area.extent.height,
    ]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StencilValue {
    CompareMask,
    WriteMask,
    Reference,
}

const FACES: [vk::StencilFaceFlags; 2] = [vk::StencilFaceFlags::FRONT, vk::StencilFaceFlags::BACK];

/// Fragment size used by draws when variable rate shading is enabled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum VrsRate {
    #[default]
    Rate1x1,
    Rate2x1,
    Rate1x2,
    Rate2x2,
    Rate4x2,
    Rate2x4,
    Rate4x4,
}

impl VrsRate {
    pub const fn width(&self) -> u32 {
        match self {
            Self::Rate1x1 | Self::Rate1x2 => 1,
            Self::Rate2x1 | Self::Rate2x2 | Self::Rate2x4 => 2,
            Self::Rate4x2 | Self::Rate4x4 => 4,
        }
    }

    pub const fn height(&self) -> u32 {
        match self {
            Self::Rate1x1 | Self::Rate2x1 => 1,
            Self::Rate1x2 | Self::Rate2x2 | Self::Rate4x2 => 2,
            Self::Rate2x4 | Self::Rate4x4 => 4,
        }
    }

    pub fn fragment_size(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width(),
            height: self.height(),
        }
    }
}

/// Dynamic state as the native command buffer last saw it. Viewport, scissor
/// and the shading rate are flushed lazily before draws, stencil values are
/// emitted as soon as they change.
pub(crate) struct DynamicState {
    viewport: Option<Rect>,
    scissor: Option<Rect>,
    viewport_dirty: bool,
    scissor_dirty: bool,
    last_viewport: Option<Rect>,
    last_scissor: Option<Rect>,
    /// Front and back values of each stencil state.
    stencil: [[Option<u32>; 2]; 3],
    /// `None` until the first `set_vrs_rate`, no shading rate is ever emitted before that.
    vrs_rate: Option<VrsRate>,
    vrs_dirty: bool,
    graphics_pipeline: Option<vk::Pipeline>,
    compute_pipeline: Option<vk::Pipeline>,
    ray_tracing_pipeline: Option<vk::Pipeline>,
}

impl Default for DynamicState {
    fn default() -> Self {
        Self {
            viewport: None,
            scissor: None,
            viewport_dirty: true,
            scissor_dirty: true,
            last_viewport: None,
            last_scissor: None,
            stencil: [[None; 2]; 3],
            vrs_rate: None,
            vrs_dirty: false,
            graphics_pipeline: None,
            compute_pipeline: None,
            ray_tracing_pipeline: None,
        }
    }
}

impl DynamicState {
    pub(crate) fn set_viewport(&mut self, viewport: Rect) {
        assert!(viewport[2] > 0 && viewport[3] > 0, "empty viewport");
        self.viewport = Some(viewport);
        self.viewport_dirty = true;
    }

    pub(crate) fn set_scissor(&mut self, scissor: Rect) {
        assert!(scissor[2] > 0 && scissor[3] > 0, "empty scissor");
        self.scissor = Some(scissor);
        self.scissor_dirty = true;
    }

    /// A new pass starts with viewport and scissor to be re-evaluated.
    pub(crate) fn mark_viewport_scissor_dirty(&mut self) {
        self.viewport_dirty = true;
        self.scissor_dirty = true;
    }

    /// Viewport and scissor commands owed before a draw. The viewport
    /// defaults to the render area, the scissor to the whole framebuffer.
    pub(crate) fn flush_viewport_scissor(
        &mut self,
        render_area: vk::Rect2D,
        framebuffer_size: (u32, u32),
    ) -> SmallVec<[Command; 2]> {
        let mut commands = SmallVec::new();
        if self.viewport_dirty {
            let viewport = self.viewport.unwrap_or_else(|| rect_of(render_area));
            if self.last_viewport != Some(viewport) {
                commands.push(Command::SetViewport(vk::Viewport {
                    x: viewport[0] as f32,
                    y: viewport[1] as f32,
                    width: viewport[2] as f32,
                    height: viewport[3] as f32,
                    min_depth: 0.0,
                    max_depth: 1.0,
                }));
                self.last_viewport = Some(viewport);
            }
            self.viewport_dirty = false;
        }
        if self.scissor_dirty {
            let scissor = self.scissor.unwrap_or([0, 0, u32::MAX, u32::MAX]);
            let (width, height) = framebuffer_size;
            let x = scissor[0].min(width);
            let y = scissor[1].min(height);
            let clamped = [
                x,
                y,
                scissor[2].min(width - x),
                scissor[3].min(height - y),
            ];
            if self.last_scissor != Some(clamped) {
                commands.push(Command::SetScissor(vk::Rect2D {
                    offset: vk::Offset2D {
                        x: clamped[0] as i32,
                        y: clamped[1] as i32,
                    },
                    extent: vk::Extent2D {
                        width: clamped[2],
                        height: clamped[3],
                    },
                }));
                self.last_scissor = Some(clamped);
            }
            self.scissor_dirty = false;
        }
        commands
    }

    pub(crate) fn set_vrs_rate(&mut self, rate: VrsRate) {
        if self.vrs_rate != Some(rate) {
            self.vrs_rate = Some(rate);
            self.vrs_dirty = true;
        }
    }

    /// The shading rate command owed before a draw.
    pub(crate) fn flush_vrs_rate(&mut self) -> Option<Command> {
        if !self.vrs_dirty {
            return None;
        }
        self.vrs_dirty = false;
        self.vrs_rate.map(|rate| Command::SetFragmentShadingRate {
            fragment_size: rate.fragment_size(),
            combiner_ops: [vk::FragmentShadingRateCombinerOpKHR::KEEP; 2],
        })
    }

    pub(crate) fn set_stencil_compare_mask(&mut self, faces: vk::StencilFaceFlags, value: u32) -> Option<Command> {
        self.set_stencil(StencilValue::CompareMask, faces, value)
    }

    pub(crate) fn set_stencil_write_mask(&mut self, faces: vk::StencilFaceFlags, value: u32) -> Option<Command> {
        self.set_stencil(StencilValue::WriteMask, faces, value)
    }

    pub(crate) fn set_stencil_reference(&mut self, faces: vk::StencilFaceFlags, value: u32) -> Option<Command> {
        self.set_stencil(StencilValue::Reference, faces, value)
    }

    fn set_stencil(
        &mut self,
        which: StencilValue,
        faces: vk::StencilFaceFlags,
        value: u32,
    ) -> Option<Command> {
        assert!(
            !faces.is_empty() && vk::StencilFaceFlags::FRONT_AND_BACK.contains(faces),
            "invalid stencil faces {:?}",
            faces
        );
        let mut changed = false;
        for (i, face) in FACES.iter().enumerate() {
            if faces.contains(*face) && self.stencil[which as usize][i] != Some(value) {
                self.stencil[which as usize][i] = Some(value);
                changed = true;
            }
        }
        changed.then(|| stencil_command(which, faces, value))
    }

    /// Returns whether the pipeline has to be bound.
    pub(crate) fn bind_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) -> bool {
        let slot = match bind_point {
            vk::PipelineBindPoint::GRAPHICS => &mut self.graphics_pipeline,
            vk::PipelineBindPoint::COMPUTE => &mut self.compute_pipeline,
            vk::PipelineBindPoint::RAY_TRACING_KHR => &mut self.ray_tracing_pipeline,
            _ => panic!("unsupported pipeline bind point {:?}", bind_point),
        };
        if *slot == Some(pipeline) {
            false
        } else {
            *slot = Some(pipeline);
            true
        }
    }

    pub(crate) fn has_pipeline(&self, bind_point: vk::PipelineBindPoint) -> bool {
        match bind_point {
            vk::PipelineBindPoint::GRAPHICS => self.graphics_pipeline.is_some(),
            vk::PipelineBindPoint::COMPUTE => self.compute_pipeline.is_some(),
            vk::PipelineBindPoint::RAY_TRACING_KHR => self.ray_tracing_pipeline.is_some(),
            _ => false,
        }
    }

    /// Forgets everything the native command buffer may have lost and
    /// returns the commands restoring the stencil state. A shading rate in
    /// use falls back to 1x1, emitted before the next draw.
    pub(crate) fn reset(&mut self) -> SmallVec<[Command; 6]> {
        self.graphics_pipeline = None;
        self.compute_pipeline = None;
        self.ray_tracing_pipeline = None;
        self.last_viewport = None;
        self.last_scissor = None;
        self.mark_viewport_scissor_dirty();
        if self.vrs_rate.is_some() {
            self.vrs_rate = Some(VrsRate::Rate1x1);
            self.vrs_dirty = true;
        }

        let mut commands = SmallVec::new();
        for which in [
            StencilValue::CompareMask,
            StencilValue::WriteMask,
            StencilValue::Reference,
        ] {
            match self.stencil[which as usize] {
                [Some(front), Some(back)] if front == back => {
                    commands.push(stencil_command(which, vk::StencilFaceFlags::FRONT_AND_BACK, front));
                }
                values => {
                    for (face, value) in FACES.iter().zip(values) {
                        if let Some(value) = value {
                            commands.push(stencil_command(which, *face, value));
                        }
                    }
                }
            }
        }
        commands
    }
}

fn stencil_command(which: StencilValue, faces: vk::StencilFaceFlags, value: u32) -> Command {
    match which {
        StencilValue::CompareMask => Command::SetStencilCompareMask { faces, value },
        StencilValue::WriteMask => Command::SetStencilWriteMask { faces, value },
        StencilValue::Reference => Command::SetStencilReference { faces, value },
    }
}
