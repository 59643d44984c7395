use crate::{
    command::executable::{CommandExecutable, ExecutionState},
    fence::Fence,
};
use ash::{prelude::VkResult, vk};
use std::{future::Future, sync::Arc};

pub struct Queue {
    pub(crate) device: Arc<ash::Device>,
    pub(crate) raw: vk::Queue,
    pub(crate) family_index: u32,
}

/// A thin wrapper for a Vulkan Queue. Most queue operations require host-side syncronization,
/// so these Queue operations take a mutable reference.
impl Queue {
    pub fn new(device: Arc<ash::Device>, family_index: u32, queue_index: u32) -> Self {
        // Safety: No Host Syncronization rules for vkGetDeviceQueue.
        let raw = unsafe { device.get_device_queue(family_index, queue_index) };
        Self {
            device,
            raw,
            family_index,
        }
    }

    pub fn raw(&self) -> vk::Queue {
        self.raw
    }

    pub fn family_index(&self) -> u32 {
        self.family_index
    }

    /// Submits finalized primary executables with a fence for host-side syncronization.
    /// The executables are moved to `Submitted` right away and to `Executed`, releasing
    /// the objects they keep alive, once the returned future resolves.
    #[must_use = "The submit future needs to be awaited so we can release resources upon queue completion."]
    pub fn submit(
        &mut self,
        executables: Vec<Arc<CommandExecutable>>,
    ) -> impl Future<Output = VkResult<()>> {
        for executable in executables.iter() {
            assert!(
                !executable.is_second_level(),
                "second level command buffers cannot be submitted"
            );
            assert_eq!(
                executable.state(),
                ExecutionState::Finalized,
                "only finalized command buffers can be submitted"
            );
        }
        // We always use a fence because we always need to drop used resources upon completion.
        let fence_result = Fence::new(self.device.clone(), false).and_then(|fence| {
            let buffers: Vec<vk::CommandBuffer> = executables.iter().map(|c| c.raw()).collect();
            // Safety: Host Syncronization rule for vkQueueSubmit:
            // - Host access to queue must be externally synchronized.
            // - Host access to fence must be externally synchronized.
            // We have &mut self and own the fence.
            unsafe {
                self.device.queue_submit(
                    self.raw,
                    &[vk::SubmitInfo::builder().command_buffers(&buffers).build()],
                    fence.raw,
                )?;
            }
            for executable in executables.iter() {
                executable.mark_submitted();
            }
            tracing::debug!(queue = ?self.raw, count = executables.len(), "submitted");
            Ok(fence)
        });

        async move {
            let fence = fence_result?;
            fence.wait_async().await?;
            for executable in executables.iter() {
                executable.signal_executed();
            }
            Ok(())
        }
    }
}
