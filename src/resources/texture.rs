use std::sync::Arc;

use ash::{prelude::VkResult, vk};
use parking_lot::Mutex;
use smallvec::SmallVec;

use super::{format, DepthStencilAspect, ResourceId};
use crate::command::{
    sync::{SurfaceTraits, TextureUsageBit, UsageTransition},
    tracker::TextureState,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureType {
    D2,
    D2Array,
    D3,
    Cube,
    CubeArray,
}

impl TextureType {
    pub fn face_count(self) -> u32 {
        match self {
            TextureType::Cube | TextureType::CubeArray => 6,
            _ => 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TextureInfo {
    pub ty: TextureType,
    pub format: vk::Format,
    pub width: u32,
    pub height: u32,
    /// Only meaningful for 3D textures.
    pub depth: u32,
    /// Array layers, not counting cube faces.
    pub layer_count: u32,
    pub mip_count: u32,
    pub samples: vk::SampleCountFlags,
    /// Every usage the texture may ever be transitioned to.
    pub usage: TextureUsageBit,
    /// Usage the texture is in when it enters its first stream.
    pub initial_usage: TextureUsageBit,
}

impl TextureInfo {
    pub fn new_2d(width: u32, height: u32, format: vk::Format, usage: TextureUsageBit) -> Self {
        Self {
            ty: TextureType::D2,
            format,
            width,
            height,
            depth: 1,
            layer_count: 1,
            mip_count: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            usage,
            initial_usage: TextureUsageBit::empty(),
        }
    }
}

/// A range of mips, layers, faces and one or both depth/stencil aspects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureSubresource {
    pub first_mip: u32,
    pub mip_count: u32,
    pub first_layer: u32,
    pub layer_count: u32,
    pub first_face: u32,
    pub face_count: u32,
    pub aspect: DepthStencilAspect,
}

impl TextureSubresource {
    /// One mip of one face of one layer.
    pub fn surface(mip: u32, face: u32, layer: u32, aspect: DepthStencilAspect) -> Self {
        Self {
            first_mip: mip,
            mip_count: 1,
            first_layer: layer,
            layer_count: 1,
            first_face: face,
            face_count: 1,
            aspect,
        }
    }
}

pub struct Texture {
    id: ResourceId,
    device: Option<Arc<ash::Device>>,
    raw: vk::Image,
    info: TextureInfo,
    aspects: DepthStencilAspect,
    pub(crate) tracked: Mutex<TextureState>,
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("raw", &self.raw)
            .field("info", &self.info)
            .finish()
    }
}

impl Texture {
    /// Wraps an image owned elsewhere. The image is not destroyed on drop.
    pub fn from_raw(raw: vk::Image, info: TextureInfo) -> Self {
        Self::with_owner(None, raw, info)
    }

    /// Creates the image. Memory binding is left to the caller.
    pub fn new(device: Arc<ash::Device>, info: TextureInfo) -> VkResult<Self> {
        let image_type = match info.ty {
            TextureType::D3 => vk::ImageType::TYPE_3D,
            _ => vk::ImageType::TYPE_2D,
        };
        let mut flags = vk::ImageCreateFlags::empty();
        if info.ty.face_count() == 6 {
            flags |= vk::ImageCreateFlags::CUBE_COMPATIBLE;
        }
        let create_info = vk::ImageCreateInfo::builder()
            .flags(flags)
            .image_type(image_type)
            .format(info.format)
            .extent(vk::Extent3D {
                width: info.width,
                height: info.height,
                depth: info.depth,
            })
            .mip_levels(info.mip_count)
            .array_layers(info.layer_count * info.ty.face_count())
            .samples(info.samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(image_usage_flags(&info))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let raw = unsafe { device.create_image(&create_info, None)? };
        tracing::debug!(image = ?raw, "create image");
        Ok(Self::with_owner(Some(device), raw, info))
    }

    fn with_owner(device: Option<Arc<ash::Device>>, raw: vk::Image, info: TextureInfo) -> Self {
        assert!(info.width > 0 && info.height > 0 && info.depth > 0);
        assert!(info.mip_count > 0 && info.layer_count > 0);
        assert!(
            info.layer_count == 1
                || matches!(info.ty, TextureType::D2Array | TextureType::CubeArray),
            "only array textures can have more than one layer"
        );
        assert!(
            info.depth == 1 || info.ty == TextureType::D3,
            "only 3D textures can have depth"
        );
        assert!(
            info.usage.contains(info.initial_usage),
            "initial usage outside of the texture capabilities"
        );
        let aspects = format::format_info(info.format).aspects();
        let aspect_slots = if aspects.bits().count_ones() == 2 { 2 } else { 1 };
        let slot_count =
            (info.mip_count * info.layer_count * info.ty.face_count()) as usize * aspect_slots;
        Self {
            id: ResourceId::next(),
            device,
            raw,
            aspects,
            tracked: Mutex::new(TextureState::new(slot_count, info.initial_usage)),
            info,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }
    pub fn raw(&self) -> vk::Image {
        self.raw
    }
    pub fn info(&self) -> &TextureInfo {
        &self.info
    }
    pub fn texture_type(&self) -> TextureType {
        self.info.ty
    }
    pub fn format(&self) -> vk::Format {
        self.info.format
    }
    pub fn width(&self) -> u32 {
        self.info.width
    }
    pub fn height(&self) -> u32 {
        self.info.height
    }
    pub fn depth(&self) -> u32 {
        self.info.depth
    }
    pub fn mip_count(&self) -> u32 {
        self.info.mip_count
    }
    pub fn layer_count(&self) -> u32 {
        self.info.layer_count
    }
    pub fn face_count(&self) -> u32 {
        self.info.ty.face_count()
    }
    pub fn usage(&self) -> TextureUsageBit {
        self.info.usage
    }
    pub fn aspects(&self) -> DepthStencilAspect {
        self.aspects
    }
    pub fn is_depth_stencil(&self) -> bool {
        !self.aspects.is_empty()
    }

    pub fn surface_traits(&self) -> SurfaceTraits {
        SurfaceTraits {
            depth_stencil: self.is_depth_stencil(),
            mip_count: self.info.mip_count,
        }
    }

    /// The whole texture, every aspect included.
    pub fn subresource(&self) -> TextureSubresource {
        TextureSubresource {
            first_mip: 0,
            mip_count: self.info.mip_count,
            first_layer: 0,
            layer_count: self.info.layer_count,
            first_face: 0,
            face_count: self.face_count(),
            aspect: self.aspects,
        }
    }

    pub fn usage_valid(&self, usage: TextureUsageBit) -> bool {
        self.info.usage.contains(usage)
    }

    pub fn subresource_valid(&self, subresource: &TextureSubresource) -> bool {
        let s = subresource;
        let aspect_valid = if self.is_depth_stencil() {
            !s.aspect.is_empty() && self.aspects.contains(s.aspect)
        } else {
            s.aspect.is_empty()
        };
        s.mip_count > 0
            && s.layer_count > 0
            && s.face_count > 0
            && s.first_mip + s.mip_count <= self.info.mip_count
            && s.first_layer + s.layer_count <= self.info.layer_count
            && s.first_face + s.face_count <= self.face_count()
            && aspect_valid
    }

    /// Array layer as seen by Vulkan, where cube faces are layers.
    pub fn vk_array_layer(&self, layer: u32, face: u32) -> u32 {
        layer * self.face_count() + face
    }

    pub fn layout(&self, usage: TextureUsageBit, level: u32) -> vk::ImageLayout {
        usage.layout(self.surface_traits(), level)
    }

    pub fn derive_transition(
        &self,
        prev: TextureUsageBit,
        next: TextureUsageBit,
        base_level: u32,
    ) -> UsageTransition {
        assert!(
            self.usage_valid(next),
            "texture usage {:?} outside of the capabilities {:?}",
            next,
            self.info.usage
        );
        assert!(
            self.usage_valid(prev),
            "texture usage {:?} outside of the capabilities {:?}",
            prev,
            self.info.usage
        );
        TextureUsageBit::derive_transition(prev, next, self.surface_traits(), base_level)
    }

    /// Tracker slots covered by `aspect`, paired with the matching image aspect flags.
    pub(crate) fn aspect_slots(
        &self,
        aspect: DepthStencilAspect,
    ) -> SmallVec<[(usize, vk::ImageAspectFlags); 2]> {
        let mut slots = SmallVec::new();
        if self.aspects.bits().count_ones() == 2 {
            if aspect.contains(DepthStencilAspect::DEPTH) {
                slots.push((0, vk::ImageAspectFlags::DEPTH));
            }
            if aspect.contains(DepthStencilAspect::STENCIL) {
                slots.push((1, vk::ImageAspectFlags::STENCIL));
            }
        } else {
            slots.push((0, self.aspects.to_vk()));
        }
        slots
    }

    pub(crate) fn slot_index(&self, mip: u32, vk_layer: u32, aspect_slot: usize) -> usize {
        let aspect_slots = if self.aspects.bits().count_ones() == 2 { 2 } else { 1 };
        ((vk_layer * self.info.mip_count + mip) as usize) * aspect_slots + aspect_slot
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        if let Some(device) = self.device.as_ref() {
            tracing::debug!(image = ?self.raw, "drop image");
            unsafe { device.destroy_image(self.raw, None) }
        }
    }
}

fn image_usage_flags(info: &TextureInfo) -> vk::ImageUsageFlags {
    let usage = info.usage;
    let mut flags = vk::ImageUsageFlags::TRANSFER_SRC;
    if usage.intersects(TextureUsageBit::ALL_SAMPLED) {
        flags |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.intersects(TextureUsageBit::ALL_IMAGE) {
        flags |= vk::ImageUsageFlags::STORAGE;
    }
    if usage.intersects(TextureUsageBit::ALL_FRAMEBUFFER) {
        if format::format_info(info.format).is_depth_stencil() {
            flags |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        } else {
            flags |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        }
    }
    if usage.contains(TextureUsageBit::FRAMEBUFFER_SHADING_RATE) {
        flags |= vk::ImageUsageFlags::FRAGMENT_SHADING_RATE_ATTACHMENT_KHR;
    }
    if usage.intersects(TextureUsageBit::TRANSFER_DESTINATION | TextureUsageBit::GENERATE_MIPMAPS)
    {
        flags |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    flags
}

/// A view over a subresource of a texture. Keeps the texture alive.
pub struct TextureView {
    device: Option<Arc<ash::Device>>,
    raw: vk::ImageView,
    texture: Arc<Texture>,
    subresource: TextureSubresource,
}

impl std::fmt::Debug for TextureView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureView")
            .field("raw", &self.raw)
            .field("texture", &self.texture.id())
            .field("subresource", &self.subresource)
            .finish()
    }
}

impl TextureView {
    /// Wraps a view owned elsewhere. The view is not destroyed on drop.
    pub fn from_raw(raw: vk::ImageView, texture: Arc<Texture>, subresource: TextureSubresource) -> Self {
        assert!(
            texture.subresource_valid(&subresource),
            "invalid subresource {:?}",
            subresource
        );
        Self {
            device: None,
            raw,
            texture,
            subresource,
        }
    }

    pub fn new(
        device: Arc<ash::Device>,
        texture: Arc<Texture>,
        subresource: TextureSubresource,
    ) -> VkResult<Self> {
        assert!(
            texture.subresource_valid(&subresource),
            "invalid subresource {:?}",
            subresource
        );
        let view_type = match texture.texture_type() {
            TextureType::D3 => vk::ImageViewType::TYPE_3D,
            TextureType::D2 => vk::ImageViewType::TYPE_2D,
            TextureType::D2Array => vk::ImageViewType::TYPE_2D_ARRAY,
            TextureType::Cube if subresource.face_count == 6 => vk::ImageViewType::CUBE,
            TextureType::CubeArray if subresource.face_count == 6 => vk::ImageViewType::CUBE_ARRAY,
            TextureType::Cube => vk::ImageViewType::TYPE_2D,
            TextureType::CubeArray => vk::ImageViewType::TYPE_2D_ARRAY,
        };
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(texture.raw())
            .view_type(view_type)
            .format(texture.format())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: subresource.aspect.to_vk(),
                base_mip_level: subresource.first_mip,
                level_count: subresource.mip_count,
                base_array_layer: texture
                    .vk_array_layer(subresource.first_layer, subresource.first_face),
                layer_count: subresource.layer_count * subresource.face_count,
            });
        let raw = unsafe { device.create_image_view(&create_info, None)? };
        Ok(Self {
            device: Some(device),
            raw,
            texture,
            subresource,
        })
    }

    pub fn raw(&self) -> vk::ImageView {
        self.raw
    }
    pub fn texture(&self) -> &Arc<Texture> {
        &self.texture
    }
    pub fn subresource(&self) -> &TextureSubresource {
        &self.subresource
    }

    /// Size of the first mip level the view covers.
    pub fn extent(&self) -> vk::Extent2D {
        let mip = self.subresource.first_mip;
        vk::Extent2D {
            width: (self.texture.width() >> mip).max(1),
            height: (self.texture.height() >> mip).max(1),
        }
    }
}

impl Drop for TextureView {
    fn drop(&mut self) {
        if let Some(device) = self.device.as_ref() {
            tracing::debug!(image_view = ?self.raw, "drop image view");
            unsafe { device.destroy_image_view(self.raw, None) }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn cube_array() -> Texture {
        Texture::from_raw(
            vk::Image::null(),
            TextureInfo {
                ty: TextureType::CubeArray,
                layer_count: 2,
                mip_count: 3,
                ..TextureInfo::new_2d(64, 64, vk::Format::R8G8B8A8_UNORM, TextureUsageBit::ALL_SAMPLED)
            },
        )
    }

    #[test]
    fn cube_layers() {
        let texture = cube_array();
        assert_eq!(texture.face_count(), 6);
        assert_eq!(texture.vk_array_layer(0, 5), 5);
        assert_eq!(texture.vk_array_layer(1, 2), 8);
        let whole = texture.subresource();
        assert!(texture.subresource_valid(&whole));
        assert!(!texture.subresource_valid(&TextureSubresource {
            first_mip: 2,
            mip_count: 2,
            ..whole
        }));
        assert!(!texture.subresource_valid(&TextureSubresource {
            aspect: DepthStencilAspect::DEPTH,
            ..whole
        }));
    }

    #[test]
    fn depth_stencil_slots() {
        let texture = Texture::from_raw(
            vk::Image::null(),
            TextureInfo::new_2d(
                16,
                16,
                vk::Format::D24_UNORM_S8_UINT,
                TextureUsageBit::ALL_FRAMEBUFFER,
            ),
        );
        assert!(texture.is_depth_stencil());
        assert_eq!(texture.aspect_slots(DepthStencilAspect::STENCIL).as_slice(), &[(1, vk::ImageAspectFlags::STENCIL)]);
        assert_eq!(texture.aspect_slots(texture.aspects()).len(), 2);
        assert_eq!(
            texture.layout(TextureUsageBit::FRAMEBUFFER_WRITE, 0),
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    #[should_panic(expected = "outside of the capabilities")]
    fn transition_outside_capabilities() {
        let texture = cube_array();
        texture.derive_transition(TextureUsageBit::empty(), TextureUsageBit::IMAGE_COMPUTE_WRITE, 0);
    }
}
