use ash::{extensions::khr, prelude::VkResult, vk};
use crossbeam_queue::SegQueue;
use parking_lot::Mutex;
use std::sync::Arc;

use super::{
    commands::Command,
    encode::{begin_info_flags, NativeEncoder},
    recorder::CommandBuffer,
    sink::{BeginInfo, CommandSink},
};
use crate::{
    accel_struct::AccelerationStructureLoader, config::CommandBufferInitInfo,
    framebuffer::RenderPassCache,
};

/// A transient command pool. Command buffers go back to the pool when the
/// executable holding them is dropped and get reused by later allocations.
pub struct CommandPool {
    pub(crate) device: Arc<ash::Device>,
    pool: Mutex<vk::CommandPool>,
    queue_family_index: u32,
    /// Reset command buffers, primary then secondary.
    recycled: [SegQueue<vk::CommandBuffer>; 2],
    render_passes: Arc<RenderPassCache>,
    ray_tracing: Option<Arc<khr::RayTracingPipeline>>,
    acceleration_structure: Option<Arc<AccelerationStructureLoader>>,
    fragment_shading_rate: Option<Arc<khr::FragmentShadingRate>>,
}

impl CommandPool {
    pub fn new(
        device: Arc<ash::Device>,
        queue_family_index: u32,
        render_passes: Arc<RenderPassCache>,
    ) -> VkResult<CommandPool> {
        let create_info = vk::CommandPoolCreateInfo::builder()
            .flags(
                vk::CommandPoolCreateFlags::TRANSIENT
                    | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )
            .queue_family_index(queue_family_index);
        // Safety: No Host Syncronization rules for vkCreateCommandPool.
        let pool = unsafe { device.create_command_pool(&create_info, None)? };
        Ok(CommandPool {
            device,
            pool: Mutex::new(pool),
            queue_family_index,
            recycled: [SegQueue::new(), SegQueue::new()],
            render_passes,
            ray_tracing: None,
            acceleration_structure: None,
            fragment_shading_rate: None,
        })
    }

    /// Enables `trace_rays` for command buffers of this pool.
    pub fn with_ray_tracing(mut self, loader: Arc<khr::RayTracingPipeline>) -> Self {
        self.ray_tracing = Some(loader);
        self
    }

    /// Enables `build_acceleration_structure` for command buffers of this pool.
    pub fn with_acceleration_structure(mut self, loader: Arc<AccelerationStructureLoader>) -> Self {
        self.acceleration_structure = Some(loader);
        self
    }

    /// Enables `set_vrs_rate` for command buffers of this pool.
    pub fn with_fragment_shading_rate(mut self, loader: Arc<khr::FragmentShadingRate>) -> Self {
        self.fragment_shading_rate = Some(loader);
        self
    }

    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    fn recycled(&self, level: vk::CommandBufferLevel) -> &SegQueue<vk::CommandBuffer> {
        if level == vk::CommandBufferLevel::SECONDARY {
            &self.recycled[1]
        } else {
            &self.recycled[0]
        }
    }

    pub fn allocate(self: &Arc<Self>, level: vk::CommandBufferLevel) -> VkResult<PooledCommandBuffer> {
        if let Some(raw) = self.recycled(level).pop() {
            return Ok(PooledCommandBuffer {
                pool: self.clone(),
                raw,
                level,
            });
        }
        let pool = self.pool.lock();
        let mut raw = vk::CommandBuffer::null();
        // Safety: Host Syncronization rule for vkAllocateCommandBuffers:
        // - Host access to pAllocateInfo->commandPool must be externally synchronized.
        // We hold the pool lock.
        unsafe {
            (self.device.fp_v1_0().allocate_command_buffers)(
                    self.device.handle(),
                    &vk::CommandBufferAllocateInfo::builder()
                        .command_pool(*pool)
                        .level(level)
                        .command_buffer_count(1)
                        .build(),
                    &mut raw,
                )
                .result()?;
        }
        tracing::trace!(command_buffer = ?raw, ?level, "allocated command buffer");
        Ok(PooledCommandBuffer {
            pool: self.clone(),
            raw,
            level,
        })
    }

    /// Allocates a command buffer of the level `info.flags` asks for.
    pub fn new_command_buffer(self: &Arc<Self>, info: CommandBufferInitInfo) -> VkResult<CommandBuffer> {
        let level = if info.inherited_render_pass.is_some() {
            vk::CommandBufferLevel::SECONDARY
        } else {
            vk::CommandBufferLevel::PRIMARY
        };
        let sink = self.allocate(level)?;
        Ok(CommandBuffer::new(Box::new(sink), info))
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        // Safety: Host Syncronization rule for vkDestroyCommandPool:
        // - Host access to commandPool must be externally synchronized
        // We have &mut self and thus ownership on commandPool.
        unsafe {
            self.device.destroy_command_pool(*self.pool.get_mut(), None);
        }
    }
}

/// A command buffer allocated from a [`CommandPool`], recorded through the native encoder.
pub struct PooledCommandBuffer {
    pool: Arc<CommandPool>,
    raw: vk::CommandBuffer,
    level: vk::CommandBufferLevel,
}

impl CommandSink for PooledCommandBuffer {
    fn raw(&self) -> vk::CommandBuffer {
        self.raw
    }

    fn begin(&mut self, info: &BeginInfo) -> VkResult<()> {
        let _pool = self.pool.pool.lock();
        let device = &self.pool.device;
        let second_level = self.level == vk::CommandBufferLevel::SECONDARY;
        let mut inheritance_info = vk::CommandBufferInheritanceInfo::builder();
        if let Some(inheritance) = info.inheritance.as_ref() {
            let render_pass = self
                .pool
                .render_passes
                .get_or_create(&inheritance.framebuffer, &inheritance.layouts)?;
            inheritance_info = inheritance_info
                .render_pass(render_pass)
                .subpass(0)
                .framebuffer(inheritance.framebuffer.raw());
        }
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(begin_info_flags(second_level))
            .inheritance_info(&inheritance_info);
        // Safety: Host Syncronization rule for vkBeginCommandBuffer:
        // - Host access to commandBuffer must be externally synchronized.
        // - Host access to the VkCommandPool that commandBuffer was allocated from must be externally synchronized.
        // We have &mut self and hold the pool lock.
        unsafe { device.begin_command_buffer(self.raw, &begin_info) }
    }

    fn encode(&mut self, command: &Command) -> VkResult<()> {
        let _pool = self.pool.pool.lock();
        let encoder = NativeEncoder {
            device: &self.pool.device,
            ray_tracing: self.pool.ray_tracing.as_deref(),
            acceleration_structure: self.pool.acceleration_structure.as_deref(),
            fragment_shading_rate: self.pool.fragment_shading_rate.as_deref(),
            render_passes: &self.pool.render_passes,
        };
        // Safety: the command buffer is recording, we have &mut self and hold the pool lock.
        unsafe { encoder.encode(self.raw, command) }
    }

    fn end(&mut self) -> VkResult<()> {
        let _pool = self.pool.pool.lock();
        // Safety: Host Syncronization rule for vkEndCommandBuffer:
        // - Host access to commandBuffer must be externally synchronized.
        // - Host access to the VkCommandPool that commandBuffer was allocated from must be externally synchronized.
        // We have &mut self and hold the pool lock.
        unsafe { self.pool.device.end_command_buffer(self.raw) }
    }
}

impl Drop for PooledCommandBuffer {
    fn drop(&mut self) {
        let pool = self.pool.pool.lock();
        // Safety: Host Syncronization rule for vkResetCommandBuffer and vkFreeCommandBuffers:
        // - Host access to commandBuffer must be externally synchronized.
        // - Host access to the VkCommandPool that commandBuffer was allocated from must be externally synchronized.
        // We have &mut self and hold the pool lock.
        unsafe {
            match self
                .pool
                .device
                .reset_command_buffer(self.raw, vk::CommandBufferResetFlags::empty())
            {
                Ok(()) => self.pool.recycled(self.level).push(self.raw),
                Err(err) => {
                    tracing::warn!(command_buffer = ?self.raw, ?err, "failed to reset command buffer, freeing it");
                    self.pool.device.free_command_buffers(*pool, &[self.raw]);
                }
            }
        }
    }
}
