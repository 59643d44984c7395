use std::sync::Arc;

use ash::vk;
use smallvec::SmallVec;

use super::sync::{
    AccelerationStructureUsageBit, BufferUsageBit, TextureUsageBit, UsageTransition,
};
use super::tracker::{BufferTransition, TextureTransition};
use crate::{
    accel_struct::AccelerationStructure,
    resources::{Buffer, Texture, TextureSubresource},
};

/// Asks for `subresource` of `texture` to be usable as `next_usage`.
#[derive(Clone, Debug)]
pub struct TextureBarrierInfo {
    pub texture: Arc<Texture>,
    pub subresource: TextureSubresource,
    pub next_usage: TextureUsageBit,
}

/// Asks for `[offset, offset + size)` of `buffer` to be usable as `next_usage`.
/// `size` may be `vk::WHOLE_SIZE`.
#[derive(Clone, Debug)]
pub struct BufferBarrierInfo {
    pub buffer: Arc<Buffer>,
    pub offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
    pub next_usage: BufferUsageBit,
}

#[derive(Clone, Debug)]
pub struct AccelerationStructureBarrierInfo {
    pub acceleration_structure: Arc<AccelerationStructure>,
    pub next_usage: AccelerationStructureUsageBit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryBarrier {
    pub src_stage_mask: vk::PipelineStageFlags2,
    pub src_access_mask: vk::AccessFlags2,
    pub dst_stage_mask: vk::PipelineStageFlags2,
    pub dst_access_mask: vk::AccessFlags2,
}

impl MemoryBarrier {
    pub fn to_vk(&self) -> vk::MemoryBarrier2 {
        vk::MemoryBarrier2::builder()
            .src_stage_mask(self.src_stage_mask)
            .src_access_mask(self.src_access_mask)
            .dst_stage_mask(self.dst_stage_mask)
            .dst_access_mask(self.dst_access_mask)
            .build()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferBarrier {
    pub buffer: vk::Buffer,
    pub src_stage_mask: vk::PipelineStageFlags2,
    pub src_access_mask: vk::AccessFlags2,
    pub dst_stage_mask: vk::PipelineStageFlags2,
    pub dst_access_mask: vk::AccessFlags2,
    pub offset: vk::DeviceSize,
    /// `vk::WHOLE_SIZE` when the barrier covers the whole buffer.
    pub size: vk::DeviceSize,
}

impl BufferBarrier {
    pub fn to_vk(&self) -> vk::BufferMemoryBarrier2 {
        vk::BufferMemoryBarrier2::builder()
            .src_stage_mask(self.src_stage_mask)
            .src_access_mask(self.src_access_mask)
            .dst_stage_mask(self.dst_stage_mask)
            .dst_access_mask(self.dst_access_mask)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(self.buffer)
            .offset(self.offset)
            .size(self.size)
            .build()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ImageBarrier {
    pub image: vk::Image,
    pub src_stage_mask: vk::PipelineStageFlags2,
    pub src_access_mask: vk::AccessFlags2,
    pub dst_stage_mask: vk::PipelineStageFlags2,
    pub dst_access_mask: vk::AccessFlags2,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub subresource_range: vk::ImageSubresourceRange,
}

impl ImageBarrier {
    pub fn new(
        image: vk::Image,
        transition: &UsageTransition,
        subresource_range: vk::ImageSubresourceRange,
    ) -> Self {
        Self {
            image,
            src_stage_mask: transition.src_stage_mask,
            src_access_mask: transition.src_access_mask,
            dst_stage_mask: transition.dst_stage_mask,
            dst_access_mask: transition.dst_access_mask,
            old_layout: transition.old_layout,
            new_layout: transition.new_layout,
            subresource_range,
        }
    }

    pub fn to_vk(&self) -> vk::ImageMemoryBarrier2 {
        vk::ImageMemoryBarrier2::builder()
            .src_stage_mask(self.src_stage_mask)
            .src_access_mask(self.src_access_mask)
            .dst_stage_mask(self.dst_stage_mask)
            .dst_access_mask(self.dst_access_mask)
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(self.subresource_range)
            .build()
    }
}

/// Everything synchronized by one `vkCmdPipelineBarrier2` call.
#[derive(Clone, Debug, Default)]
pub struct PipelineBarrier {
    /// Union of the source stages of every barrier.
    pub src_stage_mask: vk::PipelineStageFlags2,
    /// Union of the destination stages of every barrier.
    pub dst_stage_mask: vk::PipelineStageFlags2,
    pub memory_barriers: SmallVec<[MemoryBarrier; 1]>,
    pub buffer_barriers: SmallVec<[BufferBarrier; 4]>,
    pub image_barriers: SmallVec<[ImageBarrier; 4]>,
}

impl PipelineBarrier {
    pub fn is_empty(&self) -> bool {
        self.memory_barriers.is_empty()
            && self.buffer_barriers.is_empty()
            && self.image_barriers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.memory_barriers.len() + self.buffer_barriers.len() + self.image_barriers.len()
    }
}

/// Collects the barriers owed at one synchronization point.
#[derive(Default)]
pub(crate) struct BarrierBatcher {
    pending: PipelineBarrier,
    flush_count: u64,
    barrier_count: u64,
}

impl BarrierBatcher {
    pub(crate) fn push_image(&mut self, barrier: ImageBarrier) {
        self.pending.src_stage_mask |= barrier.src_stage_mask;
        self.pending.dst_stage_mask |= barrier.dst_stage_mask;
        self.pending.image_barriers.push(barrier);
    }

    pub(crate) fn push_buffer(&mut self, barrier: BufferBarrier) {
        self.pending.src_stage_mask |= barrier.src_stage_mask;
        self.pending.dst_stage_mask |= barrier.dst_stage_mask;
        self.pending.buffer_barriers.push(barrier);
    }

    pub(crate) fn push_memory(&mut self, barrier: MemoryBarrier) {
        self.pending.src_stage_mask |= barrier.src_stage_mask;
        self.pending.dst_stage_mask |= barrier.dst_stage_mask;
        self.pending.memory_barriers.push(barrier);
    }

    pub(crate) fn push_texture_transition(&mut self, texture: &Texture, transition: &TextureTransition) {
        self.push_image(ImageBarrier::new(
            texture.raw(),
            &transition.transition,
            transition.range,
        ));
    }

    pub(crate) fn push_buffer_transition(
        &mut self,
        buffer: &Buffer,
        transition: &BufferTransition,
        next: BufferUsageBit,
    ) {
        let usage = BufferUsageBit::derive_transition(transition.prev, next);
        let (offset, size) = transition.range;
        let (offset, size) = if offset == 0 && size == buffer.size() {
            (0, vk::WHOLE_SIZE)
        } else {
            (offset, size)
        };
        self.push_buffer(BufferBarrier {
            buffer: buffer.raw(),
            src_stage_mask: usage.src_stage_mask,
            src_access_mask: usage.src_access_mask,
            dst_stage_mask: usage.dst_stage_mask,
            dst_access_mask: usage.dst_access_mask,
            offset,
            size,
        });
    }

    pub(crate) fn push_acceleration_structure_transition(
        &mut self,
        prev: AccelerationStructureUsageBit,
        next: AccelerationStructureUsageBit,
    ) {
        let usage = AccelerationStructureUsageBit::derive_transition(prev, next);
        self.push_memory(MemoryBarrier {
            src_stage_mask: usage.src_stage_mask,
            src_access_mask: usage.src_access_mask,
            dst_stage_mask: usage.dst_stage_mask,
            dst_access_mask: usage.dst_access_mask,
        });
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Takes the batch if there is anything in it.
    pub(crate) fn flush(&mut self) -> Option<PipelineBarrier> {
        if self.pending.is_empty() {
            return None;
        }
        let barrier = std::mem::take(&mut self.pending);
        self.flush_count += 1;
        self.barrier_count += barrier.len() as u64;
        Some(barrier)
    }

    /// Number of flushes that produced a barrier command.
    pub(crate) fn flush_count(&self) -> u64 {
        self.flush_count
    }

    pub(crate) fn barrier_count(&self) -> u64 {
        self.barrier_count
    }
}
