use ash::{extensions::khr, prelude::VkResult, vk};
use smallvec::SmallVec;

use super::commands::Command;
use crate::{accel_struct::AccelerationStructureLoader, framebuffer::RenderPassCache};

/// Turns [`Command`]s into `vkCmd*` calls. Commands of an extension whose
/// loader is missing fail with `ERROR_EXTENSION_NOT_PRESENT`.
pub(crate) struct NativeEncoder<'a> {
    pub device: &'a ash::Device,
    pub ray_tracing: Option<&'a khr::RayTracingPipeline>,
    pub acceleration_structure: Option<&'a AccelerationStructureLoader>,
    pub fragment_shading_rate: Option<&'a khr::FragmentShadingRate>,
    pub render_passes: &'a RenderPassCache,
}

impl<'a> NativeEncoder<'a> {
    /// # Safety
    /// `command_buffer` must be recording, and host access to it and to its
    /// pool must be externally synchronized.
    pub unsafe fn encode(&self, command_buffer: vk::CommandBuffer, command: &Command) -> VkResult<()> {
        let device = self.device;
        match command {
            Command::PipelineBarrier(barrier) => {
                let memory_barriers: SmallVec<[vk::MemoryBarrier2; 1]> =
                    barrier.memory_barriers.iter().map(|b| b.to_vk()).collect();
                let buffer_barriers: SmallVec<[vk::BufferMemoryBarrier2; 4]> =
                    barrier.buffer_barriers.iter().map(|b| b.to_vk()).collect();
                let image_barriers: SmallVec<[vk::ImageMemoryBarrier2; 4]> =
                    barrier.image_barriers.iter().map(|b| b.to_vk()).collect();
                let dependency_info = vk::DependencyInfo::builder()
                    .memory_barriers(&memory_barriers)
                    .buffer_memory_barriers(&buffer_barriers)
                    .image_memory_barriers(&image_barriers);
                device.cmd_pipeline_barrier2(command_buffer, &dependency_info);
            }
            Command::BeginRenderPass {
                framebuffer,
                layouts,
                render_area,
                contents,
            } => {
                let render_pass = self.render_passes.get_or_create(framebuffer, layouts)?;
                let clear_values = framebuffer.clear_values();
                let begin_info = vk::RenderPassBeginInfo::builder()
                    .render_pass(render_pass)
                    .framebuffer(framebuffer.raw())
                    .render_area(*render_area)
                    .clear_values(&clear_values);
                device.cmd_begin_render_pass(command_buffer, &begin_info, *contents);
            }
            Command::EndRenderPass => device.cmd_end_render_pass(command_buffer),
            Command::BindPipeline {
                bind_point,
                pipeline,
            } => device.cmd_bind_pipeline(command_buffer, *bind_point, *pipeline),
            Command::BindVertexBuffer {
                binding,
                buffer,
                offset,
            } => device.cmd_bind_vertex_buffers(command_buffer, *binding, &[*buffer], &[*offset]),
            Command::BindIndexBuffer {
                buffer,
                offset,
                index_type,
            } => device.cmd_bind_index_buffer(command_buffer, *buffer, *offset, *index_type),
            Command::BindDescriptorSets {
                bind_point,
                layout,
                first_set,
                sets,
                dynamic_offsets,
            } => device.cmd_bind_descriptor_sets(
                command_buffer,
                *bind_point,
                *layout,
                *first_set,
                sets,
                dynamic_offsets,
            ),
            Command::PushConstants {
                layout,
                stages,
                offset,
                data,
            } => device.cmd_push_constants(command_buffer, *layout, *stages, *offset, data),
            Command::SetViewport(viewport) => {
                device.cmd_set_viewport(command_buffer, 0, std::slice::from_ref(viewport))
            }
            Command::SetScissor(scissor) => {
                device.cmd_set_scissor(command_buffer, 0, std::slice::from_ref(scissor))
            }
            Command::SetStencilCompareMask { faces, value } => {
                device.cmd_set_stencil_compare_mask(command_buffer, *faces, *value)
            }
            Command::SetStencilWriteMask { faces, value } => {
                device.cmd_set_stencil_write_mask(command_buffer, *faces, *value)
            }
            Command::SetStencilReference { faces, value } => {
                device.cmd_set_stencil_reference(command_buffer, *faces, *value)
            }
            Command::SetFragmentShadingRate {
                fragment_size,
                combiner_ops,
            } => {
                let loader = self
                    .fragment_shading_rate
                    .ok_or(vk::Result::ERROR_EXTENSION_NOT_PRESENT)?;
                loader.cmd_set_fragment_shading_rate(command_buffer, fragment_size, combiner_ops);
            }
            Command::Draw {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            } => device.cmd_draw(
                command_buffer,
                *vertex_count,
                *instance_count,
                *first_vertex,
                *first_instance,
            ),
            Command::DrawIndexed {
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            } => device.cmd_draw_indexed(
                command_buffer,
                *index_count,
                *instance_count,
                *first_index,
                *vertex_offset,
                *first_instance,
            ),
            Command::Dispatch { group_count } => device.cmd_dispatch(
                command_buffer,
                group_count[0],
                group_count[1],
                group_count[2],
            ),
            Command::TraceRays {
                raygen,
                miss,
                hit,
                callable,
                width,
                height,
                depth,
            } => {
                let loader = self
                    .ray_tracing
                    .ok_or(vk::Result::ERROR_EXTENSION_NOT_PRESENT)?;
                loader.cmd_trace_rays(
                    command_buffer,
                    raygen,
                    miss,
                    hit,
                    callable,
                    *width,
                    *height,
                    *depth,
                );
            }
            Command::CopyBuffer { src, dst, region } => {
                device.cmd_copy_buffer(command_buffer, *src, *dst, std::slice::from_ref(region))
            }
            Command::FillBuffer {
                buffer,
                offset,
                size,
                data,
            } => device.cmd_fill_buffer(command_buffer, *buffer, *offset, *size, *data),
            Command::CopyBufferToImage {
                buffer,
                image,
                layout,
                region,
            } => device.cmd_copy_buffer_to_image(
                command_buffer,
                *buffer,
                *image,
                *layout,
                std::slice::from_ref(region),
            ),
            Command::BlitImage {
                src_image,
                src_layout,
                dst_image,
                dst_layout,
                region,
                filter,
            } => device.cmd_blit_image(
                command_buffer,
                *src_image,
                *src_layout,
                *dst_image,
                *dst_layout,
                std::slice::from_ref(region),
                *filter,
            ),
            Command::BuildAccelerationStructure {
                ty,
                dst,
                scratch_address,
                build,
            } => {
                let loader = self
                    .acceleration_structure
                    .ok_or(vk::Result::ERROR_EXTENSION_NOT_PRESENT)?;
                let (geometries, ranges) = build.to_vk();
                let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::builder()
                    .ty(*ty)
                    .flags(build.flags)
                    .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
                    .dst_acceleration_structure(*dst)
                    .geometries(&geometries)
                    .scratch_data(vk::DeviceOrHostAddressKHR {
                        device_address: *scratch_address,
                    })
                    .build();
                loader.cmd_build_acceleration_structures(
                    command_buffer,
                    std::slice::from_ref(&build_info),
                    &[ranges.as_slice()],
                );
            }
            Command::ExecuteCommands(command_buffers) => {
                device.cmd_execute_commands(command_buffer, command_buffers)
            }
            Command::Upscale { upscaler, inputs } => upscaler.evaluate(command_buffer, inputs)?,
        }
        Ok(())
    }
}

pub(crate) fn begin_info_flags(second_level: bool) -> vk::CommandBufferUsageFlags {
    let mut flags = vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT;
    if second_level {
        flags |= vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE;
    }
    flags
}
