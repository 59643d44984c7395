use std::{future::Future, sync::Arc};

use ash::{prelude::VkResult, vk};

pub struct Fence {
    device: Arc<ash::Device>,
    pub(crate) raw: vk::Fence,
}

impl std::fmt::Debug for Fence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("Fence({:?})", self.raw))
    }
}

impl Fence {
    pub fn new(device: Arc<ash::Device>, signaled: bool) -> VkResult<Self> {
        let mut flags = vk::FenceCreateFlags::empty();
        if signaled {
            flags |= vk::FenceCreateFlags::SIGNALED;
        }
        // Safety: No Host Syncronization rules for vkCreateFence.
        let raw = unsafe {
            device.create_fence(&vk::FenceCreateInfo::builder().flags(flags).build(), None)?
        };
        Ok(Self { device, raw })
    }

    pub fn raw(&self) -> vk::Fence {
        self.raw
    }

    pub fn signaled(&self) -> VkResult<bool> {
        unsafe { self.device.get_fence_status(self.raw) }
    }

    /// Blocks until the fence was signaled.
    pub fn wait(&self) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[self.raw], true, u64::MAX) }
    }

    pub fn reset(&mut self) -> VkResult<()> {
        // Safety: Host Syncronization rule for vkResetFences:
        // - Host access to each member of pFences must be externally synchronized.
        // We have &mut self.
        unsafe { self.device.reset_fences(&[self.raw]) }
    }

    /// Waits on the blocking thread pool.
    pub fn wait_async(self) -> impl Future<Output = VkResult<()>> {
        blocking::unblock(move || self.wait())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        tracing::debug!(fence = ?self.raw, "drop fence");
        // Safety: Host Syncronization rule for vkDestroyFence:
        // - Host access to fence must be externally synchronized
        // We have &mut self and thus exclusive control on the fence.
        unsafe {
            self.device.destroy_fence(self.raw, None);
        }
    }
}
