use ash::{prelude::VkResult, vk};
use parking_lot::Mutex;
use std::sync::Arc;

use super::ResourceId;
use crate::command::{sync::BufferUsageBit, tracker::BufferState};

pub struct Buffer {
    id: ResourceId,
    device: Option<Arc<ash::Device>>,
    pub(crate) raw: vk::Buffer,
    size: vk::DeviceSize,
    usage: BufferUsageBit,
    pub(crate) tracked: Mutex<BufferState>,
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("raw", &self.raw)
            .field("size", &self.size)
            .field("usage", &self.usage)
            .finish()
    }
}

impl Buffer {
    /// Creates the buffer. Memory binding is left to the caller.
    pub fn new(
        device: Arc<ash::Device>,
        size: vk::DeviceSize,
        usage: BufferUsageBit,
    ) -> VkResult<Self> {
        let create_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(buffer_usage_flags(usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { device.create_buffer(&create_info, None)? };
        tracing::debug!(buffer = ?buffer, size, "create buffer");
        Ok(Self::with_owner(Some(device), buffer, size, usage))
    }

    /// Wraps a buffer owned elsewhere. The buffer is not destroyed on drop.
    pub fn from_raw(raw: vk::Buffer, size: vk::DeviceSize, usage: BufferUsageBit) -> Self {
        Self::with_owner(None, raw, size, usage)
    }

    fn with_owner(
        device: Option<Arc<ash::Device>>,
        raw: vk::Buffer,
        size: vk::DeviceSize,
        usage: BufferUsageBit,
    ) -> Self {
        assert!(size > 0, "buffers cannot be empty");
        Self {
            id: ResourceId::next(),
            device,
            raw,
            size,
            usage,
            tracked: Mutex::new(BufferState::new(size)),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }
    pub fn raw(&self) -> vk::Buffer {
        self.raw
    }
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
    pub fn usage(&self) -> BufferUsageBit {
        self.usage
    }
    pub fn usage_valid(&self, usage: BufferUsageBit) -> bool {
        self.usage.contains(usage)
    }

    /// Resolves `WHOLE_SIZE` and checks the range lies inside the buffer.
    pub(crate) fn resolve_range(
        &self,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> std::ops::Range<vk::DeviceSize> {
        assert!(
            offset < self.size,
            "offset {} out of bounds for a buffer of {} bytes",
            offset,
            self.size
        );
        let size = if size == vk::WHOLE_SIZE {
            self.size - offset
        } else {
            size
        };
        assert!(size > 0, "buffer ranges cannot be empty");
        assert!(
            offset.checked_add(size).map_or(false, |end| end <= self.size),
            "range {}+{} out of bounds for a buffer of {} bytes",
            offset,
            size,
            self.size
        );
        offset..offset + size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(device) = self.device.as_ref() {
            tracing::debug!(buffer = ?self.raw, "drop buffer");
            unsafe { device.destroy_buffer(self.raw, None) }
        }
    }
}

fn buffer_usage_flags(usage: BufferUsageBit) -> vk::BufferUsageFlags {
    type B = BufferUsageBit;
    let mut flags = vk::BufferUsageFlags::empty();
    let uniform = B::UNIFORM_GEOMETRY | B::UNIFORM_FRAGMENT | B::UNIFORM_COMPUTE | B::UNIFORM_TRACE_RAYS;
    let storage = B::STORAGE_GEOMETRY_READ
        | B::STORAGE_GEOMETRY_WRITE
        | B::STORAGE_FRAGMENT_READ
        | B::STORAGE_FRAGMENT_WRITE
        | B::STORAGE_COMPUTE_READ
        | B::STORAGE_COMPUTE_WRITE
        | B::STORAGE_TRACE_RAYS_READ
        | B::STORAGE_TRACE_RAYS_WRITE;
    let texel = B::TEXEL_GEOMETRY_READ
        | B::TEXEL_FRAGMENT_READ
        | B::TEXEL_COMPUTE_READ
        | B::TEXEL_TRACE_RAYS_READ;
    let indirect = B::INDIRECT_DRAW | B::INDIRECT_COMPUTE | B::INDIRECT_TRACE_RAYS;
    if usage.intersects(uniform) {
        flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.intersects(storage) {
        flags |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.intersects(texel) {
        flags |= vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER;
    }
    if usage.contains(B::INDEX) {
        flags |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(B::VERTEX) {
        flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.intersects(indirect) {
        flags |= vk::BufferUsageFlags::INDIRECT_BUFFER;
    }
    if usage.contains(B::TRANSFER_SOURCE) {
        flags |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(B::TRANSFER_DESTINATION) {
        flags |= vk::BufferUsageFlags::TRANSFER_DST;
    }
    if usage.contains(B::ACCELERATION_STRUCTURE_BUILD) {
        flags |= vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR
            | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS;
    }
    if usage.contains(B::ACCELERATION_STRUCTURE_BUILD_SCRATCH) {
        flags |= vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS;
    }
    if usage.contains(B::SHADER_BINDING_TABLE) {
        flags |= vk::BufferUsageFlags::SHADER_BINDING_TABLE_KHR
            | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS;
    }
    flags
}
