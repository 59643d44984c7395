use std::{
    collections::HashSet,
    sync::Arc,
    thread::{self, ThreadId},
};

use ash::{prelude::VkResult, vk};
use smallvec::SmallVec;

use super::{
    barrier::{
        AccelerationStructureBarrierInfo, BarrierBatcher, BufferBarrierInfo, ImageBarrier,
        TextureBarrierInfo,
    },
    commands::Command,
    executable::{CommandExecutable, ExecutionState},
    render_pass::{DynamicState, RenderPassPhase, RenderPassState, VrsRate},
    sink::{BeginInfo, CommandSink, Inheritance},
    sync::{AccelerationStructureUsageBit, BufferUsageBit, TextureUsageBit, UsageTransition},
    tracker::SubresourceTracker,
    upscale::{UpscaleInputs, Upscaler, UpscalerKind},
};
use crate::{
    accel_struct::{AccelerationStructure, AccelerationStructureBuild},
    config::{CommandBufferFlags, CommandBufferInitInfo, RecorderConfig},
    diagnostics::{Diagnostic, DiagnosticKind, DiagnosticsSink},
    framebuffer::Framebuffer,
    pipeline::{Pipeline, PipelineLayout},
    resources::{format, Buffer, Texture, TextureSubresource, TextureType, TextureView},
};

/// Objects a command buffer keeps alive until it finished executing.
/// Each object is held once no matter how often it is referenced.
#[derive(Default)]
pub(crate) struct ObjectRefs {
    seen: HashSet<usize>,
    objects: Vec<Box<dyn Send + Sync>>,
}

impl ObjectRefs {
    pub(crate) fn push<T: ?Sized + Send + Sync + 'static>(&mut self, object: &Arc<T>) {
        let key = Arc::as_ptr(object) as *const () as usize;
        if self.seen.insert(key) {
            self.objects.push(Box::new(object.clone()));
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.len()
    }

    pub(crate) fn clear(&mut self) {
        self.seen.clear();
        self.objects.clear();
    }
}

/// Shader binding table regions for `trace_rays`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShaderBindingRegions {
    pub raygen: vk::StridedDeviceAddressRegionKHR,
    pub miss: vk::StridedDeviceAddressRegionKHR,
    pub hit: vk::StridedDeviceAddressRegionKHR,
    pub callable: vk::StridedDeviceAddressRegionKHR,
}

/// A command buffer in the initial state.
pub struct CommandBuffer {
    sink: Box<dyn CommandSink>,
    info: CommandBufferInitInfo,
}

impl CommandBuffer {
    pub fn new(sink: Box<dyn CommandSink>, info: CommandBufferInitInfo) -> Self {
        assert_eq!(
            info.flags.contains(CommandBufferFlags::SECOND_LEVEL),
            info.inherited_render_pass.is_some(),
            "second level command buffers, and only those, need an inherited render pass"
        );
        Self { sink, info }
    }

    pub fn raw(&self) -> vk::CommandBuffer {
        self.sink.raw()
    }

    /// Starts recording. The returned stream may only be used from the calling thread.
    pub fn begin_recording(self) -> VkResult<CommandStream> {
        let Self { mut sink, info } = self;
        let mut render_pass = RenderPassState::default();
        let mut begin_info = BeginInfo::default();
        let inherited_framebuffer = info.inherited_render_pass.as_ref().map(|inherited| {
            render_pass.inherit(inherited);
            begin_info.inheritance = Some(Inheritance {
                framebuffer: inherited.framebuffer.clone(),
                layouts: render_pass.attachment_layouts(),
            });
            inherited.framebuffer.clone()
        });
        sink.begin(&begin_info)?;
        let raw = sink.raw();
        tracing::debug!(command_buffer = ?raw, flags = ?info.flags, "begin recording");
        Ok(CommandStream {
            raw,
            sink: Some(sink),
            flags: info.flags,
            config: info.config,
            diagnostics: info.diagnostics,
            thread: thread::current().id(),
            empty: true,
            command_count: 0,
            refs: ObjectRefs::default(),
            tracker: SubresourceTracker::default(),
            batcher: BarrierBatcher::default(),
            render_pass,
            dynamic: DynamicState::default(),
            inherited_framebuffer,
            deferred_error: None,
        })
    }
}

/// A command buffer in the recording state.
///
/// Every operation transitions the resources it touches, batching the owed
/// barriers until the next command that needs them. Errors of the native
/// encoder are kept and reported by [`CommandStream::end_recording`].
pub struct CommandStream {
    raw: vk::CommandBuffer,
    /// Taken when the stream is finalized.
    sink: Option<Box<dyn CommandSink>>,
    flags: CommandBufferFlags,
    config: RecorderConfig,
    diagnostics: Arc<dyn DiagnosticsSink>,
    thread: ThreadId,
    empty: bool,
    command_count: u32,
    refs: ObjectRefs,
    tracker: SubresourceTracker,
    batcher: BarrierBatcher,
    render_pass: RenderPassState,
    dynamic: DynamicState,
    inherited_framebuffer: Option<Arc<Framebuffer>>,
    deferred_error: Option<vk::Result>,
}

impl CommandStream {
    pub fn raw(&self) -> vk::CommandBuffer {
        self.raw
    }
    pub fn flags(&self) -> CommandBufferFlags {
        self.flags
    }
    pub fn command_count(&self) -> u32 {
        self.command_count
    }
    pub fn render_pass_phase(&self) -> RenderPassPhase {
        self.render_pass.phase()
    }
    /// Native pipeline barriers emitted so far.
    pub fn flush_count(&self) -> u64 {
        self.batcher.flush_count()
    }

    pub fn tracked_texture_usage(
        &mut self,
        texture: &Arc<Texture>,
        subresource: &TextureSubresource,
    ) -> TextureUsageBit {
        self.tracker.texture_usage(texture, subresource)
    }

    pub fn tracked_buffer_usage(
        &mut self,
        buffer: &Arc<Buffer>,
        offset: vk::DeviceSize,
    ) -> BufferUsageBit {
        self.tracker.buffer_usage(buffer, offset)
    }

    fn is_second_level(&self) -> bool {
        self.flags.contains(CommandBufferFlags::SECOND_LEVEL)
    }

    fn assert_thread(&self) {
        assert_eq!(
            thread::current().id(),
            self.thread,
            "command stream used from a thread other than the one that began recording it"
        );
    }

    fn command_common(&mut self) {
        self.assert_thread();
        self.empty = false;
        self.command_count += 1;
    }

    fn assert_outside_render_pass(&self, what: &str) {
        assert!(
            !self.render_pass.is_active(),
            "{} is not allowed inside a render pass",
            what
        );
    }

    fn emit(&mut self, command: Command) {
        if let Some(sink) = self.sink.as_mut() {
            if let Err(err) = sink.encode(&command) {
                tracing::error!(command_buffer = ?self.raw, command = command.name(), ?err, "failed to encode command");
                self.deferred_error.get_or_insert(err);
            }
        }
    }

    /// Emits everything batched so far as one native barrier and starts a new
    /// synchronization point.
    fn flush_barriers(&mut self) {
        if let Some(barrier) = self.batcher.flush() {
            self.diagnostics.record_pipeline_barrier(barrier.len());
            tracing::trace!(
                command_buffer = ?self.raw,
                barriers = barrier.len(),
                src_stage_mask = ?barrier.src_stage_mask,
                dst_stage_mask = ?barrier.dst_stage_mask,
                "flush barriers"
            );
            self.emit(Command::PipelineBarrier(barrier));
        }
        self.tracker.advance();
    }

    fn flush_and_emit(&mut self, command: Command) {
        self.flush_barriers();
        self.emit(command);
    }

    fn request_texture(
        &mut self,
        texture: &Arc<Texture>,
        subresource: &TextureSubresource,
        usage: TextureUsageBit,
    ) {
        assert!(
            texture.usage_valid(usage),
            "texture usage {:?} outside of the capabilities {:?}",
            usage,
            texture.usage()
        );
        let mut subresource = *subresource;
        if usage == TextureUsageBit::GENERATE_MIPMAPS {
            // Levels above 0 are transitioned by generate_mipmaps itself.
            if subresource.first_mip > 0 {
                return;
            }
            subresource.mip_count = 1;
        }
        for transition in self.tracker.transition_texture(texture, &subresource, usage) {
            self.batcher.push_texture_transition(texture, &transition);
        }
        self.refs.push(texture);
    }

    fn request_buffer(
        &mut self,
        buffer: &Arc<Buffer>,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        usage: BufferUsageBit,
    ) {
        let range = buffer.resolve_range(offset, size);
        for transition in self.tracker.transition_buffer(buffer, range, usage) {
            self.batcher.push_buffer_transition(buffer, &transition, usage);
        }
        self.refs.push(buffer);
    }

    fn request_acceleration_structure(
        &mut self,
        acceleration_structure: &Arc<AccelerationStructure>,
        usage: AccelerationStructureUsageBit,
    ) {
        if let Some(prev) = self
            .tracker
            .transition_acceleration_structure(acceleration_structure, usage)
        {
            self.batcher
                .push_acceleration_structure_transition(prev, usage);
        }
        self.refs.push(acceleration_structure);
    }

    /// Makes the given resources usable as their next usage. Barriers issued
    /// back to back end up in one native call.
    pub fn set_pipeline_barrier(
        &mut self,
        textures: &[TextureBarrierInfo],
        buffers: &[BufferBarrierInfo],
        acceleration_structures: &[AccelerationStructureBarrierInfo],
    ) {
        self.command_common();
        assert!(
            self.render_pass.phase() != RenderPassPhase::Began,
            "pipeline barriers cannot be set inside a render pass"
        );
        for info in textures {
            debug_assert!(
                !self.render_pass.is_attachment(&info.texture),
                "attachments of the active render pass cannot be transitioned"
            );
            self.request_texture(&info.texture, &info.subresource, info.next_usage);
        }
        for info in buffers {
            self.request_buffer(&info.buffer, info.offset, info.size, info.next_usage);
        }
        for info in acceleration_structures {
            self.request_acceleration_structure(&info.acceleration_structure, info.next_usage);
        }
    }

    /// The native begin is deferred until the first command inside the pass.
    pub fn begin_render_pass(
        &mut self,
        framebuffer: &Arc<Framebuffer>,
        color_attachment_usages: &[TextureUsageBit],
        depth_stencil_attachment_usage: TextureUsageBit,
        render_area: vk::Rect2D,
    ) {
        self.command_common();
        assert!(
            !self.is_second_level(),
            "second level command buffers inherit their render pass"
        );
        self.render_pass.begin(
            framebuffer.clone(),
            color_attachment_usages,
            depth_stencil_attachment_usage,
            render_area,
        );
        self.dynamic.mark_viewport_scissor_dirty();
        self.refs.push(framebuffer);
    }

    fn ensure_render_pass_began(&mut self, contents: vk::SubpassContents) {
        match self.render_pass.phase() {
            RenderPassPhase::Inactive => panic!("no render pass is active"),
            RenderPassPhase::Began => {}
            RenderPassPhase::PendingBegin => {
                for (texture, subresource, usage) in self.render_pass.attachments() {
                    self.request_texture(&texture, &subresource, usage);
                }
                self.flush_barriers();
                if let Some(framebuffer) = self.render_pass.framebuffer().cloned() {
                    let command = Command::BeginRenderPass {
                        framebuffer,
                        layouts: self.render_pass.attachment_layouts(),
                        render_area: self.render_pass.render_area(),
                        contents,
                    };
                    self.emit(command);
                }
                self.render_pass.mark_began(contents);
            }
        }
    }

    /// Ends the active render pass. A pass nothing was recorded in is still
    /// begun first. After secondary command buffers the dynamic state is
    /// unknown and gets restored.
    pub fn end_render_pass(&mut self) {
        self.command_common();
        assert!(
            !self.is_second_level(),
            "second level command buffers cannot end the inherited render pass"
        );
        if self.render_pass.phase() == RenderPassPhase::PendingBegin {
            self.ensure_render_pass_began(vk::SubpassContents::INLINE);
        }
        let had_secondaries = self.render_pass.end();
        self.emit(Command::EndRenderPass);
        if had_secondaries {
            for command in self.dynamic.reset() {
                self.emit(command);
            }
        }
    }

    pub fn bind_pipeline(&mut self, pipeline: &Arc<Pipeline>) {
        self.command_common();
        if self.dynamic.bind_pipeline(pipeline.bind_point(), pipeline.raw()) {
            self.flush_and_emit(Command::BindPipeline {
                bind_point: pipeline.bind_point(),
                pipeline: pipeline.raw(),
            });
        }
        self.refs.push(pipeline);
    }

    pub fn bind_vertex_buffer(&mut self, binding: u32, buffer: &Arc<Buffer>, offset: vk::DeviceSize) {
        self.command_common();
        assert!(
            buffer.usage_valid(BufferUsageBit::VERTEX),
            "buffer usage {:?} does not allow vertex fetches",
            buffer.usage()
        );
        buffer.resolve_range(offset, vk::WHOLE_SIZE);
        self.flush_and_emit(Command::BindVertexBuffer {
            binding,
            buffer: buffer.raw(),
            offset,
        });
        self.refs.push(buffer);
    }

    pub fn bind_index_buffer(
        &mut self,
        buffer: &Arc<Buffer>,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        self.command_common();
        assert!(
            buffer.usage_valid(BufferUsageBit::INDEX),
            "buffer usage {:?} does not allow index fetches",
            buffer.usage()
        );
        buffer.resolve_range(offset, vk::WHOLE_SIZE);
        self.flush_and_emit(Command::BindIndexBuffer {
            buffer: buffer.raw(),
            offset,
            index_type,
        });
        self.refs.push(buffer);
    }

    pub fn bind_descriptor_sets(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        layout: &Arc<PipelineLayout>,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        self.command_common();
        self.flush_and_emit(Command::BindDescriptorSets {
            bind_point,
            layout: layout.raw(),
            first_set,
            sets: sets.iter().copied().collect(),
            dynamic_offsets: dynamic_offsets.iter().copied().collect(),
        });
        self.refs.push(layout);
    }

    pub fn push_constants(
        &mut self,
        layout: &Arc<PipelineLayout>,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        self.command_common();
        assert!(
            offset % 4 == 0 && data.len() % 4 == 0 && !data.is_empty(),
            "push constant ranges must be non-empty multiples of 4 bytes"
        );
        self.flush_and_emit(Command::PushConstants {
            layout: layout.raw(),
            stages,
            offset,
            data: data.iter().copied().collect(),
        });
        self.refs.push(layout);
    }

    pub fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.command_common();
        self.dynamic.set_viewport([x, y, width, height]);
    }

    pub fn set_scissor(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.command_common();
        self.dynamic.set_scissor([x, y, width, height]);
    }

    pub fn set_stencil_compare_mask(&mut self, faces: vk::StencilFaceFlags, mask: u32) {
        self.command_common();
        if let Some(command) = self.dynamic.set_stencil_compare_mask(faces, mask) {
            self.flush_and_emit(command);
        }
    }

    pub fn set_stencil_write_mask(&mut self, faces: vk::StencilFaceFlags, mask: u32) {
        self.command_common();
        if let Some(command) = self.dynamic.set_stencil_write_mask(faces, mask) {
            self.flush_and_emit(command);
        }
    }

    pub fn set_stencil_reference(&mut self, faces: vk::StencilFaceFlags, reference: u32) {
        self.command_common();
        if let Some(command) = self.dynamic.set_stencil_reference(faces, reference) {
            self.flush_and_emit(command);
        }
    }

    /// Shading rate of the following draws. Needs a pool with fragment
    /// shading rate enabled.
    pub fn set_vrs_rate(&mut self, rate: VrsRate) {
        self.command_common();
        self.dynamic.set_vrs_rate(rate);
    }

    fn draw_common(&mut self) {
        self.command_common();
        assert!(
            self.render_pass.is_active(),
            "draws need an active render pass"
        );
        assert!(
            self.dynamic.has_pipeline(vk::PipelineBindPoint::GRAPHICS),
            "no graphics pipeline is bound"
        );
        self.ensure_render_pass_began(vk::SubpassContents::INLINE);
        self.render_pass.record(vk::SubpassContents::INLINE);
        let framebuffer_size = self
            .render_pass
            .framebuffer()
            .map_or((0, 0), |framebuffer| (framebuffer.width(), framebuffer.height()));
        let render_area = self.render_pass.render_area();
        for command in self
            .dynamic
            .flush_viewport_scissor(render_area, framebuffer_size)
        {
            self.emit(command);
        }
        if let Some(command) = self.dynamic.flush_vrs_rate() {
            self.emit(command);
        }
    }

    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.draw_common();
        self.emit(Command::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.draw_common();
        self.emit(Command::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });
    }

    pub fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        self.command_common();
        self.assert_outside_render_pass("dispatch");
        assert!(
            self.dynamic.has_pipeline(vk::PipelineBindPoint::COMPUTE),
            "no compute pipeline is bound"
        );
        self.flush_and_emit(Command::Dispatch {
            group_count: [group_count_x, group_count_y, group_count_z],
        });
    }

    pub fn trace_rays(&mut self, regions: &ShaderBindingRegions, width: u32, height: u32, depth: u32) {
        self.command_common();
        self.assert_outside_render_pass("trace_rays");
        assert!(
            self.dynamic.has_pipeline(vk::PipelineBindPoint::RAY_TRACING_KHR),
            "no ray tracing pipeline is bound"
        );
        self.flush_and_emit(Command::TraceRays {
            raygen: regions.raygen,
            miss: regions.miss,
            hit: regions.hit,
            callable: regions.callable,
            width,
            height,
            depth,
        });
    }

    /// Builds `acceleration_structure` from `build` on the device. The whole
    /// of `scratch` is used as build scratch memory, `scratch_address` is its
    /// device address and must meet the scratch alignment of the device.
    ///
    /// Later reads of the structure wait for the build once they are
    /// requested through [`set_pipeline_barrier`](Self::set_pipeline_barrier).
    pub fn build_acceleration_structure(
        &mut self,
        acceleration_structure: &Arc<AccelerationStructure>,
        build: &AccelerationStructureBuild,
        scratch: &Arc<Buffer>,
        scratch_address: vk::DeviceAddress,
    ) {
        self.command_common();
        self.assert_outside_render_pass("build_acceleration_structure");
        build.validate(acceleration_structure.ty());
        self.request_acceleration_structure(
            acceleration_structure,
            AccelerationStructureUsageBit::BUILD,
        );
        self.request_buffer(
            scratch,
            0,
            vk::WHOLE_SIZE,
            BufferUsageBit::ACCELERATION_STRUCTURE_BUILD_SCRATCH,
        );
        self.flush_and_emit(Command::BuildAccelerationStructure {
            ty: acceleration_structure.ty().into(),
            dst: acceleration_structure.raw(),
            scratch_address,
            build: build.clone(),
        });
    }

    /// `size` may be `vk::WHOLE_SIZE`, meaning the rest of `src`.
    pub fn copy_buffer(
        &mut self,
        src: &Arc<Buffer>,
        src_offset: vk::DeviceSize,
        dst: &Arc<Buffer>,
        dst_offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) {
        self.command_common();
        self.assert_outside_render_pass("copy_buffer");
        let src_range = src.resolve_range(src_offset, size);
        let size = src_range.end - src_range.start;
        self.request_buffer(src, src_offset, size, BufferUsageBit::TRANSFER_SOURCE);
        self.request_buffer(dst, dst_offset, size, BufferUsageBit::TRANSFER_DESTINATION);
        self.flush_and_emit(Command::CopyBuffer {
            src: src.raw(),
            dst: dst.raw(),
            region: vk::BufferCopy {
                src_offset,
                dst_offset,
                size,
            },
        });
    }

    pub fn fill_buffer(&mut self, buffer: &Arc<Buffer>, offset: vk::DeviceSize, size: vk::DeviceSize, value: u32) {
        self.command_common();
        self.assert_outside_render_pass("fill_buffer");
        assert!(
            offset % 4 == 0 && (size == vk::WHOLE_SIZE || size % 4 == 0),
            "fills must be 4 byte aligned"
        );
        self.request_buffer(buffer, offset, size, BufferUsageBit::TRANSFER_DESTINATION);
        self.flush_and_emit(Command::FillBuffer {
            buffer: buffer.raw(),
            offset,
            size,
            data: value,
        });
    }

    /// Uploads `buffer[offset..offset + range]` into the single surface (or
    /// volume) `view` points at. `range` has to be exactly the tightly packed
    /// size of that surface.
    pub fn copy_buffer_to_texture(
        &mut self,
        buffer: &Arc<Buffer>,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
        view: &Arc<TextureView>,
    ) {
        self.command_common();
        self.assert_outside_render_pass("copy_buffer_to_texture");
        let texture = view.texture().clone();
        let subresource = *view.subresource();
        assert!(
            subresource.mip_count == 1 && subresource.layer_count == 1 && subresource.face_count == 1,
            "the copy destination must be a single surface"
        );
        let mip = subresource.first_mip;
        let width = (texture.width() >> mip).max(1);
        let height = (texture.height() >> mip).max(1);
        let depth = (texture.depth() >> mip).max(1);
        let expected = if texture.texture_type() == TextureType::D3 {
            format::compute_volume_size(width, height, depth, texture.format(), subresource.aspect)
        } else {
            format::compute_surface_size(width, height, texture.format(), subresource.aspect)
        };
        assert_eq!(
            range, expected,
            "copy range does not match the size of the destination surface"
        );
        buffer.resolve_range(offset, range);

        self.request_buffer(buffer, offset, range, BufferUsageBit::TRANSFER_SOURCE);
        self.request_texture(&texture, &subresource, TextureUsageBit::TRANSFER_DESTINATION);
        self.flush_barriers();
        let region = vk::BufferImageCopy {
            buffer_offset: offset,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: subresource.aspect.to_vk(),
                mip_level: mip,
                base_array_layer: texture.vk_array_layer(subresource.first_layer, subresource.first_face),
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width,
                height,
                depth,
            },
        };
        self.emit(Command::CopyBufferToImage {
            buffer: buffer.raw(),
            image: texture.raw(),
            layout: texture.layout(TextureUsageBit::TRANSFER_DESTINATION, mip),
            region,
        });
        self.refs.push(view);
    }

    /// Fills every level below the base of `view` by successive blits. The view
    /// has to start at mip 0 and cover one face of one layer.
    pub fn generate_mipmaps(&mut self, view: &Arc<TextureView>) {
        self.command_common();
        self.assert_outside_render_pass("generate_mipmaps");
        let texture = view.texture().clone();
        let subresource = *view.subresource();
        assert!(
            texture.texture_type() != TextureType::D3,
            "mipmaps of 3D textures cannot be generated"
        );
        assert!(
            subresource.first_mip == 0 && subresource.layer_count == 1 && subresource.face_count == 1,
            "mipmap generation needs a view of mip 0 of one face of one layer"
        );
        self.refs.push(view);

        let mip_count = texture.mip_count();
        if mip_count == 1 {
            self.flush_barriers();
            return;
        }

        let whole = TextureSubresource {
            mip_count,
            ..subresource
        };
        self.request_texture(&texture, &whole, TextureUsageBit::GENERATE_MIPMAPS);
        self.flush_barriers();

        let traits = texture.surface_traits();
        let vk_layer = texture.vk_array_layer(subresource.first_layer, subresource.first_face);
        let aspect_mask = subresource.aspect.to_vk();
        let level_range = |mip: u32| vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: mip,
            level_count: 1,
            base_array_layer: vk_layer,
            layer_count: 1,
        };
        let filter = if texture.is_depth_stencil() {
            vk::Filter::NEAREST
        } else {
            vk::Filter::LINEAR
        };

        for level in 0..mip_count - 1 {
            if level > 0 {
                // Written by the previous blit, read by the next one.
                let transition = UsageTransition {
                    src_stage_mask: vk::PipelineStageFlags2::TRANSFER,
                    src_access_mask: vk::AccessFlags2::TRANSFER_WRITE,
                    dst_stage_mask: vk::PipelineStageFlags2::TRANSFER,
                    dst_access_mask: vk::AccessFlags2::TRANSFER_READ,
                    old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    new_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                };
                self.batcher
                    .push_image(ImageBarrier::new(texture.raw(), &transition, level_range(level)));
            }

            let next_level = TextureSubresource {
                first_mip: level + 1,
                mip_count: 1,
                ..subresource
            };
            let prev = self.tracker.texture_usage(&texture, &next_level);
            let src = prev.to_vk(traits, level + 1, true);
            let transition = UsageTransition {
                src_stage_mask: if src.stage_mask.is_empty() {
                    vk::PipelineStageFlags2::TOP_OF_PIPE
                } else {
                    src.stage_mask
                },
                src_access_mask: if prev.has_writes() {
                    src.access_mask
                } else {
                    vk::AccessFlags2::NONE
                },
                dst_stage_mask: vk::PipelineStageFlags2::TRANSFER,
                dst_access_mask: vk::AccessFlags2::TRANSFER_WRITE,
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            };
            self.batcher
                .push_image(ImageBarrier::new(texture.raw(), &transition, level_range(level + 1)));
            self.flush_barriers();

            let extent = |mip: u32| vk::Offset3D {
                x: (texture.width() >> mip).max(1) as i32,
                y: (texture.height() >> mip).max(1) as i32,
                z: 1,
            };
            let layers = |mip: u32| vk::ImageSubresourceLayers {
                aspect_mask,
                mip_level: mip,
                base_array_layer: vk_layer,
                layer_count: 1,
            };
            let origin = vk::Offset3D { x: 0, y: 0, z: 0 };
            self.emit(Command::BlitImage {
                src_image: texture.raw(),
                src_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst_image: texture.raw(),
                dst_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                region: vk::ImageBlit {
                    src_subresource: layers(level),
                    src_offsets: [origin, extent(level)],
                    dst_subresource: layers(level + 1),
                    dst_offsets: [origin, extent(level + 1)],
                },
                filter,
            });
        }

        self.tracker
            .set_texture_usage(&texture, &whole, TextureUsageBit::GENERATE_MIPMAPS);
    }

    /// Runs finalized second level command buffers inside the active render pass.
    pub fn execute_secondary(&mut self, executables: &[Arc<CommandExecutable>]) {
        self.command_common();
        assert!(!executables.is_empty(), "nothing to execute");
        let framebuffer = match self.render_pass.framebuffer() {
            Some(framebuffer) => framebuffer.clone(),
            None => panic!("secondary command buffers need an active render pass"),
        };
        for executable in executables {
            assert!(
                executable.is_second_level(),
                "only second level command buffers can be executed inside a render pass"
            );
            assert_eq!(
                executable.state(),
                ExecutionState::Finalized,
                "secondary command buffer is not finalized"
            );
            assert!(
                executable
                    .framebuffer()
                    .map_or(false, |f| Arc::ptr_eq(f, &framebuffer)),
                "secondary command buffer was recorded for another framebuffer"
            );
        }
        self.ensure_render_pass_began(vk::SubpassContents::SECONDARY_COMMAND_BUFFERS);
        self.render_pass
            .record(vk::SubpassContents::SECONDARY_COMMAND_BUFFERS);
        let raws: SmallVec<[vk::CommandBuffer; 4]> = executables.iter().map(|e| e.raw()).collect();
        self.emit(Command::ExecuteCommands(raws));
        for executable in executables {
            self.refs.push(executable);
        }
    }

    pub fn dispatch_upscale(&mut self, upscaler: &Arc<dyn Upscaler>, inputs: &UpscaleInputs) {
        self.command_common();
        self.assert_outside_render_pass("dispatch_upscale");
        for view in inputs.views() {
            self.refs.push(view);
        }
        self.refs.push(upscaler);
        self.flush_and_emit(Command::Upscale {
            upscaler: upscaler.clone(),
            inputs: inputs.clone(),
        });

        if upscaler.kind() == UpscalerKind::Fsr2 {
            // The evaluation leaves the exposure texture sampled, put it back in
            // the layout storage reads expect.
            let texture = inputs.exposure.texture().clone();
            let subresource = *inputs.exposure.subresource();
            self.tracker
                .set_texture_usage(&texture, &subresource, TextureUsageBit::SAMPLED_COMPUTE);
            self.request_texture(&texture, &subresource, TextureUsageBit::IMAGE_COMPUTE_READ);
        }
    }

    fn report(&self, kind: DiagnosticKind) {
        self.diagnostics.report(&Diagnostic {
            kind,
            command_buffer: self.raw,
            command_count: self.command_count,
        });
    }

    /// Finalizes the stream. Tracked usages become visible to later streams.
    pub fn end_recording(mut self) -> VkResult<CommandExecutable> {
        self.assert_thread();
        assert!(!self.empty, "command stream finalized while empty");
        assert!(
            self.is_second_level() || !self.render_pass.is_active(),
            "command stream finalized inside a render pass"
        );
        self.flush_barriers();
        if let Some(err) = self.deferred_error.take() {
            return Err(err);
        }
        let mut sink = match self.sink.take() {
            Some(sink) => sink,
            None => unreachable!("streams are finalized once"),
        };
        sink.end()?;
        self.tracker.commit();

        let max = self.config.small_batch_max_commands;
        let factor = self.config.batch_band_factor.max(1);
        if self.flags.contains(CommandBufferFlags::SMALL_BATCH) {
            if self.command_count > max.saturating_mul(factor) {
                self.report(DiagnosticKind::TooManyCommands);
            }
        } else if self.command_count <= max / factor {
            self.report(DiagnosticKind::TooFewCommands);
        }
        self.diagnostics.record_stream(self.command_count);
        tracing::debug!(
            command_buffer = ?self.raw,
            command_count = self.command_count,
            barriers = self.batcher.barrier_count(),
            references = self.refs.len(),
            "end recording"
        );

        Ok(CommandExecutable::new(
            sink,
            std::mem::take(&mut self.refs),
            self.flags,
            self.command_count,
            self.diagnostics.clone(),
            self.inherited_framebuffer.take(),
        ))
    }
}

impl Drop for CommandStream {
    fn drop(&mut self) {
        if self.sink.is_some() {
            self.report(DiagnosticKind::UnfinalizedStream);
            if self.empty {
                self.report(DiagnosticKind::EmptyStream);
            }
        }
    }
}
