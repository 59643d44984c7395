use std::sync::Arc;

use ash::prelude::VkResult;
use thread_local::ThreadLocal;

use super::pool::CommandPool;
use crate::framebuffer::RenderPassCache;

/// One [`CommandPool`] per recording thread, created on first use.
pub struct SharedCommandPool {
    pub(crate) device: Arc<ash::Device>,
    pub(crate) pool: ThreadLocal<Arc<CommandPool>>,
    pub(crate) queue_family_index: u32,
    render_passes: Arc<RenderPassCache>,
}

impl SharedCommandPool {
    pub fn new(
        device: Arc<ash::Device>,
        queue_family_index: u32,
        render_passes: Arc<RenderPassCache>,
    ) -> Self {
        Self {
            device,
            pool: ThreadLocal::new(),
            queue_family_index,
            render_passes,
        }
    }

    /// The pool of the calling thread.
    pub fn get(&self) -> VkResult<&Arc<CommandPool>> {
        self.pool.get_or_try(|| {
            let command_pool = CommandPool::new(
                self.device.clone(),
                self.queue_family_index,
                self.render_passes.clone(),
            )?;
            Ok(Arc::new(command_pool))
        })
    }
}
