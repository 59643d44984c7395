use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;

pub mod buffer;
pub mod format;
pub mod texture;

pub use buffer::Buffer;
pub use texture::{Texture, TextureInfo, TextureSubresource, TextureType, TextureView};

/// Process-unique identity of a tracked resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

bitflags! {
    /// Aspect of a depth/stencil texture. Empty means the color aspect.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DepthStencilAspect: u8 {
        const DEPTH = 1 << 0;
        const STENCIL = 1 << 1;
    }
}

impl DepthStencilAspect {
    pub fn to_vk(self) -> ash::vk::ImageAspectFlags {
        use ash::vk::ImageAspectFlags;
        if self.is_empty() {
            return ImageAspectFlags::COLOR;
        }
        let mut flags = ImageAspectFlags::empty();
        if self.contains(Self::DEPTH) {
            flags |= ImageAspectFlags::DEPTH;
        }
        if self.contains(Self::STENCIL) {
            flags |= ImageAspectFlags::STENCIL;
        }
        flags
    }
}
