use ash::{prelude::VkResult, vk};
use std::sync::Arc;

pub struct PipelineLayout {
    device: Option<Arc<ash::Device>>,
    raw: vk::PipelineLayout,
}

impl std::fmt::Debug for PipelineLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("PipelineLayout({:?})", self.raw))
    }
}

impl PipelineLayout {
    pub fn new(device: Arc<ash::Device>, info: &vk::PipelineLayoutCreateInfo) -> VkResult<Self> {
        // Safety: No Host Syncronization rules for vkCreatePipelineLayout.
        let raw = unsafe { device.create_pipeline_layout(info, None)? };
        Ok(Self {
            device: Some(device),
            raw,
        })
    }

    /// Wraps a layout owned elsewhere. It is not destroyed on drop.
    pub fn from_raw(raw: vk::PipelineLayout) -> Self {
        Self { device: None, raw }
    }

    pub fn raw(&self) -> vk::PipelineLayout {
        self.raw
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        if let Some(device) = self.device.as_ref() {
            unsafe {
                device.destroy_pipeline_layout(self.raw, None);
            }
        }
    }
}

/// A graphics, compute or ray tracing pipeline together with its layout.
pub struct Pipeline {
    device: Option<Arc<ash::Device>>,
    raw: vk::Pipeline,
    layout: Arc<PipelineLayout>,
    bind_point: vk::PipelineBindPoint,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("raw", &self.raw)
            .field("bind_point", &self.bind_point)
            .finish()
    }
}

impl Pipeline {
    /// Takes ownership of a pipeline created on `device`.
    pub fn new(
        device: Arc<ash::Device>,
        raw: vk::Pipeline,
        layout: Arc<PipelineLayout>,
        bind_point: vk::PipelineBindPoint,
    ) -> Self {
        tracing::debug!(pipeline = ?raw, ?bind_point, "adopt pipeline");
        Self {
            device: Some(device),
            raw,
            layout,
            bind_point,
        }
    }

    /// Wraps a pipeline owned elsewhere. It is not destroyed on drop.
    pub fn from_raw(
        raw: vk::Pipeline,
        layout: Arc<PipelineLayout>,
        bind_point: vk::PipelineBindPoint,
    ) -> Self {
        Self {
            device: None,
            raw,
            layout,
            bind_point,
        }
    }

    pub fn raw(&self) -> vk::Pipeline {
        self.raw
    }
    pub fn layout(&self) -> &Arc<PipelineLayout> {
        &self.layout
    }
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        self.bind_point
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(device) = self.device.as_ref() {
            tracing::debug!(pipeline = ?self.raw, "drop pipeline");
            unsafe {
                device.destroy_pipeline(self.raw, None);
            }
        }
    }
}
