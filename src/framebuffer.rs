use std::{collections::HashMap, sync::Arc};

use ash::{prelude::VkResult, vk};
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::resources::{Texture, TextureView};

pub const MAX_COLOR_ATTACHMENTS: usize = 4;

#[derive(Clone)]
pub struct Attachment {
    pub view: Arc<TextureView>,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub stencil_load_op: vk::AttachmentLoadOp,
    pub stencil_store_op: vk::AttachmentStoreOp,
    pub clear_value: vk::ClearValue,
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("view", &self.view)
            .field("load_op", &self.load_op)
            .field("store_op", &self.store_op)
            .finish()
    }
}

impl Attachment {
    /// Loads and stores the previous contents.
    pub fn new(view: Arc<TextureView>) -> Self {
        Self {
            view,
            load_op: vk::AttachmentLoadOp::LOAD,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            clear_value: vk::ClearValue {
                color: vk::ClearColorValue { float32: [0.0; 4] },
            },
        }
    }

    pub fn cleared(view: Arc<TextureView>, clear_value: vk::ClearValue) -> Self {
        Self {
            load_op: vk::AttachmentLoadOp::CLEAR,
            stencil_load_op: vk::AttachmentLoadOp::CLEAR,
            clear_value,
            ..Self::new(view)
        }
    }
}

/// Image layout of every attachment for the duration of a render pass.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct AttachmentLayouts {
    pub color: SmallVec<[vk::ImageLayout; MAX_COLOR_ATTACHMENTS]>,
    pub depth_stencil: Option<vk::ImageLayout>,
}

pub struct Framebuffer {
    device: Option<Arc<ash::Device>>,
    raw: vk::Framebuffer,
    width: u32,
    height: u32,
    color_attachments: SmallVec<[Attachment; MAX_COLOR_ATTACHMENTS]>,
    depth_stencil_attachment: Option<Attachment>,
}

impl std::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framebuffer")
            .field("raw", &self.raw)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("color_attachments", &self.color_attachments)
            .field("depth_stencil_attachment", &self.depth_stencil_attachment)
            .finish()
    }
}

impl Framebuffer {
    /// Wraps a framebuffer owned elsewhere. It is not destroyed on drop.
    pub fn from_raw(
        raw: vk::Framebuffer,
        color_attachments: &[Attachment],
        depth_stencil_attachment: Option<Attachment>,
    ) -> Self {
        let (width, height) = framebuffer_extent(color_attachments, depth_stencil_attachment.as_ref());
        Self {
            device: None,
            raw,
            width,
            height,
            color_attachments: color_attachments.iter().cloned().collect(),
            depth_stencil_attachment,
        }
    }

    /// Creates the framebuffer against a render pass compatible with every
    /// render pass the attachments will be used with.
    pub fn new(
        render_passes: &RenderPassCache,
        color_attachments: &[Attachment],
        depth_stencil_attachment: Option<Attachment>,
    ) -> VkResult<Self> {
        let mut framebuffer = Self::from_raw(
            vk::Framebuffer::null(),
            color_attachments,
            depth_stencil_attachment,
        );
        let layouts = AttachmentLayouts {
            color: color_attachments
                .iter()
                .map(|_| vk::ImageLayout::GENERAL)
                .collect(),
            depth_stencil: framebuffer
                .depth_stencil_attachment
                .as_ref()
                .map(|_| vk::ImageLayout::GENERAL),
        };
        let render_pass = render_passes.get_or_create(&framebuffer, &layouts)?;
        let views: SmallVec<[vk::ImageView; MAX_COLOR_ATTACHMENTS + 1]> =
            framebuffer.attachments().map(|a| a.view.raw()).collect();
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(&views)
            .width(framebuffer.width)
            .height(framebuffer.height)
            .layers(1);
        let device = render_passes.device.clone();
        framebuffer.raw = unsafe { device.create_framebuffer(&create_info, None)? };
        tracing::debug!(framebuffer = ?framebuffer.raw, "create framebuffer");
        framebuffer.device = Some(device);
        Ok(framebuffer)
    }

    pub fn raw(&self) -> vk::Framebuffer {
        self.raw
    }
    pub fn width(&self) -> u32 {
        self.width
    }
    pub fn height(&self) -> u32 {
        self.height
    }
    pub fn color_attachments(&self) -> &[Attachment] {
        &self.color_attachments
    }
    pub fn depth_stencil_attachment(&self) -> Option<&Attachment> {
        self.depth_stencil_attachment.as_ref()
    }

    /// Color attachments first, then the depth-stencil one.
    pub fn attachments(&self) -> impl Iterator<Item = &Attachment> {
        self.color_attachments
            .iter()
            .chain(self.depth_stencil_attachment.iter())
    }

    pub fn clear_values(&self) -> SmallVec<[vk::ClearValue; MAX_COLOR_ATTACHMENTS + 1]> {
        self.attachments().map(|a| a.clear_value).collect()
    }

    pub fn has_attachment(&self, texture: &Texture) -> bool {
        self.attachments()
            .any(|a| a.view.texture().id() == texture.id())
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        if let Some(device) = self.device.as_ref() {
            tracing::debug!(framebuffer = ?self.raw, "drop framebuffer");
            unsafe { device.destroy_framebuffer(self.raw, None) }
        }
    }
}

fn framebuffer_extent(colors: &[Attachment], depth_stencil: Option<&Attachment>) -> (u32, u32) {
    assert!(
        !colors.is_empty() || depth_stencil.is_some(),
        "framebuffers need at least one attachment"
    );
    assert!(
        colors.len() <= MAX_COLOR_ATTACHMENTS,
        "at most {} color attachments are supported",
        MAX_COLOR_ATTACHMENTS
    );
    assert!(
        depth_stencil.map_or(true, |a| a.view.texture().is_depth_stencil()),
        "depth-stencil attachment needs a depth or stencil format"
    );
    colors
        .iter()
        .chain(depth_stencil)
        .fold((u32::MAX, u32::MAX), |(width, height), attachment| {
            let subresource = attachment.view.subresource();
            assert!(
                subresource.mip_count == 1 && subresource.layer_count == 1 && subresource.face_count == 1,
                "framebuffer attachments must be a single surface"
            );
            let extent = attachment.view.extent();
            (width.min(extent.width), height.min(extent.height))
        })
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct AttachmentKey {
    format: vk::Format,
    samples: vk::SampleCountFlags,
    load_op: vk::AttachmentLoadOp,
    store_op: vk::AttachmentStoreOp,
    stencil_load_op: vk::AttachmentLoadOp,
    stencil_store_op: vk::AttachmentStoreOp,
    layout: vk::ImageLayout,
}

impl AttachmentKey {
    fn new(attachment: &Attachment, layout: vk::ImageLayout) -> Self {
        let texture = attachment.view.texture();
        Self {
            format: texture.format(),
            samples: texture.info().samples,
            load_op: attachment.load_op,
            store_op: attachment.store_op,
            stencil_load_op: attachment.stencil_load_op,
            stencil_store_op: attachment.stencil_store_op,
            layout,
        }
    }

    fn description(&self) -> vk::AttachmentDescription {
        vk::AttachmentDescription {
            flags: vk::AttachmentDescriptionFlags::empty(),
            format: self.format,
            samples: self.samples,
            load_op: self.load_op,
            store_op: self.store_op,
            stencil_load_op: self.stencil_load_op,
            stencil_store_op: self.stencil_store_op,
            initial_layout: self.layout,
            final_layout: self.layout,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct RenderPassKey {
    colors: SmallVec<[AttachmentKey; MAX_COLOR_ATTACHMENTS]>,
    depth_stencil: Option<AttachmentKey>,
}

/// Creates render passes on demand, one per distinct attachment configuration.
/// Attachments stay in one layout for the whole pass; transitions happen
/// through pipeline barriers outside of it.
pub struct RenderPassCache {
    device: Arc<ash::Device>,
    render_passes: Mutex<HashMap<RenderPassKey, vk::RenderPass>>,
}

impl RenderPassCache {
    pub fn new(device: Arc<ash::Device>) -> Self {
        Self {
            device,
            render_passes: Mutex::new(HashMap::new()),
        }
    }

    pub fn device(&self) -> &Arc<ash::Device> {
        &self.device
    }

    pub fn get_or_create(
        &self,
        framebuffer: &Framebuffer,
        layouts: &AttachmentLayouts,
    ) -> VkResult<vk::RenderPass> {
        assert_eq!(layouts.color.len(), framebuffer.color_attachments().len());
        let key = RenderPassKey {
            colors: framebuffer
                .color_attachments()
                .iter()
                .zip(layouts.color.iter())
                .map(|(attachment, layout)| AttachmentKey::new(attachment, *layout))
                .collect(),
            depth_stencil: framebuffer
                .depth_stencil_attachment()
                .zip(layouts.depth_stencil)
                .map(|(attachment, layout)| AttachmentKey::new(attachment, layout)),
        };
        let mut render_passes = self.render_passes.lock();
        if let Some(render_pass) = render_passes.get(&key) {
            return Ok(*render_pass);
        }

        let descriptions: SmallVec<[vk::AttachmentDescription; MAX_COLOR_ATTACHMENTS + 1]> = key
            .colors
            .iter()
            .chain(key.depth_stencil.iter())
            .map(AttachmentKey::description)
            .collect();
        let color_references: SmallVec<[vk::AttachmentReference; MAX_COLOR_ATTACHMENTS]> = key
            .colors
            .iter()
            .enumerate()
            .map(|(i, color)| vk::AttachmentReference {
                attachment: i as u32,
                layout: color.layout,
            })
            .collect();
        let depth_stencil_reference = key.depth_stencil.as_ref().map(|ds| vk::AttachmentReference {
            attachment: key.colors.len() as u32,
            layout: ds.layout,
        });
        let mut subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_references);
        if let Some(reference) = depth_stencil_reference.as_ref() {
            subpass = subpass.depth_stencil_attachment(reference);
        }
        let subpasses = [subpass.build()];
        let create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&descriptions)
            .subpasses(&subpasses);
        let render_pass = unsafe { self.device.create_render_pass(&create_info, None)? };
        tracing::debug!(render_pass = ?render_pass, "create render pass");
        render_passes.insert(key, render_pass);
        Ok(render_pass)
    }
}

impl Drop for RenderPassCache {
    fn drop(&mut self) {
        for (_, render_pass) in self.render_passes.get_mut().drain() {
            tracing::debug!(render_pass = ?render_pass, "drop render pass");
            unsafe { self.device.destroy_render_pass(render_pass, None) }
        }
    }
}
