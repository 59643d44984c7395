use std::sync::Arc;

use ash::vk;
use smallvec::SmallVec;

use super::{
    barrier::PipelineBarrier,
    upscale::{UpscaleInputs, Upscaler},
};
use crate::{
    accel_struct::AccelerationStructureBuild,
    framebuffer::{AttachmentLayouts, Framebuffer},
};

/// One native command, fully resolved. Streams build these and a
/// [`CommandSink`](super::sink::CommandSink) turns them into Vulkan calls.
#[derive(Clone, Debug)]
pub enum Command {
    PipelineBarrier(PipelineBarrier),
    BeginRenderPass {
        framebuffer: Arc<Framebuffer>,
        layouts: AttachmentLayouts,
        render_area: vk::Rect2D,
        contents: vk::SubpassContents,
    },
    EndRenderPass,
    BindPipeline {
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    },
    BindVertexBuffer {
        binding: u32,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
    },
    BindIndexBuffer {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    },
    BindDescriptorSets {
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: SmallVec<[vk::DescriptorSet; 4]>,
        dynamic_offsets: SmallVec<[u32; 4]>,
    },
    PushConstants {
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: SmallVec<[u8; 128]>,
    },
    SetViewport(vk::Viewport),
    SetScissor(vk::Rect2D),
    SetStencilCompareMask {
        faces: vk::StencilFaceFlags,
        value: u32,
    },
    SetStencilWriteMask {
        faces: vk::StencilFaceFlags,
        value: u32,
    },
    SetStencilReference {
        faces: vk::StencilFaceFlags,
        value: u32,
    },
    SetFragmentShadingRate {
        fragment_size: vk::Extent2D,
        combiner_ops: [vk::FragmentShadingRateCombinerOpKHR; 2],
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    Dispatch {
        group_count: [u32; 3],
    },
    TraceRays {
        raygen: vk::StridedDeviceAddressRegionKHR,
        miss: vk::StridedDeviceAddressRegionKHR,
        hit: vk::StridedDeviceAddressRegionKHR,
        callable: vk::StridedDeviceAddressRegionKHR,
        width: u32,
        height: u32,
        depth: u32,
    },
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        region: vk::BufferCopy,
    },
    FillBuffer {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        data: u32,
    },
    CopyBufferToImage {
        buffer: vk::Buffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        region: vk::BufferImageCopy,
    },
    BlitImage {
        src_image: vk::Image,
        src_layout: vk::ImageLayout,
        dst_image: vk::Image,
        dst_layout: vk::ImageLayout,
        region: vk::ImageBlit,
        filter: vk::Filter,
    },
    BuildAccelerationStructure {
        ty: vk::AccelerationStructureTypeKHR,
        dst: vk::AccelerationStructureKHR,
        scratch_address: vk::DeviceAddress,
        build: AccelerationStructureBuild,
    },
    ExecuteCommands(SmallVec<[vk::CommandBuffer; 4]>),
    Upscale {
        upscaler: Arc<dyn Upscaler>,
        inputs: UpscaleInputs,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::PipelineBarrier(_) => "pipeline_barrier",
            Command::BeginRenderPass { .. } => "begin_render_pass",
            Command::EndRenderPass => "end_render_pass",
            Command::BindPipeline { .. } => "bind_pipeline",
            Command::BindVertexBuffer { .. } => "bind_vertex_buffer",
            Command::BindIndexBuffer { .. } => "bind_index_buffer",
            Command::BindDescriptorSets { .. } => "bind_descriptor_sets",
            Command::PushConstants { .. } => "push_constants",
            Command::SetViewport(_) => "set_viewport",
            Command::SetScissor(_) => "set_scissor",
            Command::SetStencilCompareMask { .. } => "set_stencil_compare_mask",
            Command::SetStencilWriteMask { .. } => "set_stencil_write_mask",
            Command::SetStencilReference { .. } => "set_stencil_reference",
            Command::SetFragmentShadingRate { .. } => "set_fragment_shading_rate",
            Command::Draw { .. } => "draw",
            Command::DrawIndexed { .. } => "draw_indexed",
            Command::Dispatch { .. } => "dispatch",
            Command::TraceRays { .. } => "trace_rays",
            Command::CopyBuffer { .. } => "copy_buffer",
            Command::FillBuffer { .. } => "fill_buffer",
            Command::CopyBufferToImage { .. } => "copy_buffer_to_image",
            Command::BlitImage { .. } => "blit_image",
            Command::BuildAccelerationStructure { .. } => "build_acceleration_structure",
            Command::ExecuteCommands(_) => "execute_commands",
            Command::Upscale { .. } => "upscale",
        }
    }
}
