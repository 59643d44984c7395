//! Usage bits and the pure mapping from usage transitions to Vulkan
//! pipeline stages, access masks and image layouts.
use ash::vk;
use bitflags::bitflags;

bitflags! {
    /// How a texture is going to be accessed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureUsageBit: u32 {
        const SAMPLED_GEOMETRY = 1 << 0;
        const SAMPLED_FRAGMENT = 1 << 1;
        const SAMPLED_COMPUTE = 1 << 2;
        const SAMPLED_TRACE_RAYS = 1 << 3;

        const IMAGE_GEOMETRY_READ = 1 << 4;
        const IMAGE_GEOMETRY_WRITE = 1 << 5;
        const IMAGE_FRAGMENT_READ = 1 << 6;
        const IMAGE_FRAGMENT_WRITE = 1 << 7;
        const IMAGE_COMPUTE_READ = 1 << 8;
        const IMAGE_COMPUTE_WRITE = 1 << 9;
        const IMAGE_TRACE_RAYS_READ = 1 << 10;
        const IMAGE_TRACE_RAYS_WRITE = 1 << 11;

        const FRAMEBUFFER_READ = 1 << 12;
        const FRAMEBUFFER_WRITE = 1 << 13;
        const FRAMEBUFFER_SHADING_RATE = 1 << 14;

        const TRANSFER_DESTINATION = 1 << 15;
        /// Level 0 is the blit source, every other level a blit destination.
        const GENERATE_MIPMAPS = 1 << 16;
        const PRESENT = 1 << 17;

        const ALL_SAMPLED = Self::SAMPLED_GEOMETRY.bits()
            | Self::SAMPLED_FRAGMENT.bits()
            | Self::SAMPLED_COMPUTE.bits()
            | Self::SAMPLED_TRACE_RAYS.bits();
        const ALL_IMAGE = Self::IMAGE_GEOMETRY_READ.bits()
            | Self::IMAGE_GEOMETRY_WRITE.bits()
            | Self::IMAGE_FRAGMENT_READ.bits()
            | Self::IMAGE_FRAGMENT_WRITE.bits()
            | Self::IMAGE_COMPUTE_READ.bits()
            | Self::IMAGE_COMPUTE_WRITE.bits()
            | Self::IMAGE_TRACE_RAYS_READ.bits()
            | Self::IMAGE_TRACE_RAYS_WRITE.bits();
        const ALL_FRAMEBUFFER = Self::FRAMEBUFFER_READ.bits() | Self::FRAMEBUFFER_WRITE.bits();
        const ALL_WRITE = Self::IMAGE_GEOMETRY_WRITE.bits()
            | Self::IMAGE_FRAGMENT_WRITE.bits()
            | Self::IMAGE_COMPUTE_WRITE.bits()
            | Self::IMAGE_TRACE_RAYS_WRITE.bits()
            | Self::FRAMEBUFFER_WRITE.bits()
            | Self::TRANSFER_DESTINATION.bits()
            | Self::GENERATE_MIPMAPS.bits();
    }
}

bitflags! {
    /// How a buffer range is going to be accessed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsageBit: u32 {
        const UNIFORM_GEOMETRY = 1 << 0;
        const UNIFORM_FRAGMENT = 1 << 1;
        const UNIFORM_COMPUTE = 1 << 2;
        const UNIFORM_TRACE_RAYS = 1 << 3;

        const STORAGE_GEOMETRY_READ = 1 << 4;
        const STORAGE_GEOMETRY_WRITE = 1 << 5;
        const STORAGE_FRAGMENT_READ = 1 << 6;
        const STORAGE_FRAGMENT_WRITE = 1 << 7;
        const STORAGE_COMPUTE_READ = 1 << 8;
        const STORAGE_COMPUTE_WRITE = 1 << 9;
        const STORAGE_TRACE_RAYS_READ = 1 << 10;
        const STORAGE_TRACE_RAYS_WRITE = 1 << 11;

        const TEXEL_GEOMETRY_READ = 1 << 12;
        const TEXEL_FRAGMENT_READ = 1 << 13;
        const TEXEL_COMPUTE_READ = 1 << 14;
        const TEXEL_TRACE_RAYS_READ = 1 << 15;

        const INDEX = 1 << 16;
        const VERTEX = 1 << 17;
        const INDIRECT_DRAW = 1 << 18;
        const INDIRECT_COMPUTE = 1 << 19;
        const INDIRECT_TRACE_RAYS = 1 << 20;

        const TRANSFER_SOURCE = 1 << 21;
        const TRANSFER_DESTINATION = 1 << 22;

        const ACCELERATION_STRUCTURE_BUILD = 1 << 23;
        const SHADER_BINDING_TABLE = 1 << 24;
        /// Scratch memory of an acceleration structure build.
        const ACCELERATION_STRUCTURE_BUILD_SCRATCH = 1 << 25;

        const ALL_WRITE = Self::STORAGE_GEOMETRY_WRITE.bits()
            | Self::STORAGE_FRAGMENT_WRITE.bits()
            | Self::STORAGE_COMPUTE_WRITE.bits()
            | Self::STORAGE_TRACE_RAYS_WRITE.bits()
            | Self::TRANSFER_DESTINATION.bits()
            | Self::ACCELERATION_STRUCTURE_BUILD_SCRATCH.bits();
    }
}

bitflags! {
    /// How an acceleration structure is going to be accessed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccelerationStructureUsageBit: u32 {
        const BUILD = 1 << 0;
        /// Read as a bottom level structure while building a top level one.
        const ATTACH = 1 << 1;
        const GEOMETRY_READ = 1 << 2;
        const FRAGMENT_READ = 1 << 3;
        const COMPUTE_READ = 1 << 4;
        const TRACE_RAYS_READ = 1 << 5;

        const ALL_WRITE = Self::BUILD.bits();
    }
}

const GEOMETRY_STAGES: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::from_raw(
    vk::PipelineStageFlags2::VERTEX_SHADER.as_raw()
        | vk::PipelineStageFlags2::TESSELLATION_CONTROL_SHADER.as_raw()
        | vk::PipelineStageFlags2::TESSELLATION_EVALUATION_SHADER.as_raw()
        | vk::PipelineStageFlags2::GEOMETRY_SHADER.as_raw(),
);

const FRAGMENT_TESTS: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::from_raw(
    vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw()
        | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
);

/// Stage and access mask of a single usage bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VkAccessInfo {
    pub stage_mask: vk::PipelineStageFlags2,
    pub access_mask: vk::AccessFlags2,
}

impl VkAccessInfo {
    const fn new(stage_mask: vk::PipelineStageFlags2, access_mask: vk::AccessFlags2) -> Self {
        Self {
            stage_mask,
            access_mask,
        }
    }
}

/// The full synchronization scope of one usage transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UsageTransition {
    pub src_stage_mask: vk::PipelineStageFlags2,
    pub src_access_mask: vk::AccessFlags2,
    pub dst_stage_mask: vk::PipelineStageFlags2,
    pub dst_access_mask: vk::AccessFlags2,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
}

/// Properties of a texture that influence how its usages map to layouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceTraits {
    pub depth_stencil: bool,
    pub mip_count: u32,
}

/// Iterates the single bits set in `bits`, lowest first.
fn single_bits(mut bits: u32) -> impl Iterator<Item = u32> {
    std::iter::from_fn(move || {
        if bits == 0 {
            return None;
        }
        let bit = bits & bits.wrapping_neg();
        bits &= !bit;
        Some(bit)
    })
}

impl TextureUsageBit {
    pub fn has_writes(self) -> bool {
        self.intersects(Self::ALL_WRITE)
    }

    /// `src` selects the availability side of the barrier. Only generate-mipmaps
    /// depends on the direction and on the level.
    fn bit_to_vk(self, traits: SurfaceTraits, level: u32, src: bool) -> VkAccessInfo {
        use vk::AccessFlags2 as A;
        use vk::PipelineStageFlags2 as S;
        match self {
            Self::SAMPLED_GEOMETRY => VkAccessInfo::new(GEOMETRY_STAGES, A::SHADER_SAMPLED_READ),
            Self::SAMPLED_FRAGMENT => VkAccessInfo::new(S::FRAGMENT_SHADER, A::SHADER_SAMPLED_READ),
            Self::SAMPLED_COMPUTE => VkAccessInfo::new(S::COMPUTE_SHADER, A::SHADER_SAMPLED_READ),
            Self::SAMPLED_TRACE_RAYS => {
                VkAccessInfo::new(S::RAY_TRACING_SHADER_KHR, A::SHADER_SAMPLED_READ)
            }
            Self::IMAGE_GEOMETRY_READ => VkAccessInfo::new(GEOMETRY_STAGES, A::SHADER_STORAGE_READ),
            Self::IMAGE_GEOMETRY_WRITE => {
                VkAccessInfo::new(GEOMETRY_STAGES, A::SHADER_STORAGE_WRITE)
            }
            Self::IMAGE_FRAGMENT_READ => {
                VkAccessInfo::new(S::FRAGMENT_SHADER, A::SHADER_STORAGE_READ)
            }
            Self::IMAGE_FRAGMENT_WRITE => {
                VkAccessInfo::new(S::FRAGMENT_SHADER, A::SHADER_STORAGE_WRITE)
            }
            Self::IMAGE_COMPUTE_READ => VkAccessInfo::new(S::COMPUTE_SHADER, A::SHADER_STORAGE_READ),
            Self::IMAGE_COMPUTE_WRITE => {
                VkAccessInfo::new(S::COMPUTE_SHADER, A::SHADER_STORAGE_WRITE)
            }
            Self::IMAGE_TRACE_RAYS_READ => {
                VkAccessInfo::new(S::RAY_TRACING_SHADER_KHR, A::SHADER_STORAGE_READ)
            }
            Self::IMAGE_TRACE_RAYS_WRITE => {
                VkAccessInfo::new(S::RAY_TRACING_SHADER_KHR, A::SHADER_STORAGE_WRITE)
            }
            Self::FRAMEBUFFER_READ if traits.depth_stencil => {
                VkAccessInfo::new(FRAGMENT_TESTS, A::DEPTH_STENCIL_ATTACHMENT_READ)
            }
            Self::FRAMEBUFFER_READ => {
                VkAccessInfo::new(S::COLOR_ATTACHMENT_OUTPUT, A::COLOR_ATTACHMENT_READ)
            }
            Self::FRAMEBUFFER_WRITE if traits.depth_stencil => {
                VkAccessInfo::new(FRAGMENT_TESTS, A::DEPTH_STENCIL_ATTACHMENT_WRITE)
            }
            Self::FRAMEBUFFER_WRITE => {
                VkAccessInfo::new(S::COLOR_ATTACHMENT_OUTPUT, A::COLOR_ATTACHMENT_WRITE)
            }
            Self::FRAMEBUFFER_SHADING_RATE => VkAccessInfo::new(
                S::FRAGMENT_SHADING_RATE_ATTACHMENT_KHR,
                A::FRAGMENT_SHADING_RATE_ATTACHMENT_READ_KHR,
            ),
            Self::TRANSFER_DESTINATION => VkAccessInfo::new(S::TRANSFER, A::TRANSFER_WRITE),
            Self::GENERATE_MIPMAPS if src => {
                let last_level = level > 0 && level + 1 == traits.mip_count;
                if last_level {
                    VkAccessInfo::new(S::TRANSFER, A::TRANSFER_WRITE)
                } else {
                    VkAccessInfo::new(S::TRANSFER, A::NONE)
                }
            }
            Self::GENERATE_MIPMAPS => {
                assert_eq!(level, 0, "generate-mipmaps only applies to level 0 as a next usage");
                VkAccessInfo::new(S::TRANSFER, A::TRANSFER_READ)
            }
            Self::PRESENT => VkAccessInfo::new(S::ALL_COMMANDS, A::MEMORY_READ),
            _ => panic!("{:?} is not a single texture usage bit", self),
        }
    }

    /// Union of the stages and accesses of every bit in `self`.
    pub fn to_vk(self, traits: SurfaceTraits, level: u32, src: bool) -> VkAccessInfo {
        let mut info = VkAccessInfo::new(vk::PipelineStageFlags2::empty(), vk::AccessFlags2::empty());
        for bit in single_bits(self.bits()) {
            let bit_info = Self::from_bits_retain(bit).bit_to_vk(traits, level, src);
            info.stage_mask |= bit_info.stage_mask;
            info.access_mask |= bit_info.access_mask;
        }
        info
    }

    pub fn layout(self, traits: SurfaceTraits, level: u32) -> vk::ImageLayout {
        let framebuffer_only = (self & !Self::ALL_FRAMEBUFFER).is_empty();
        let sampled_only = (self & !Self::ALL_SAMPLED).is_empty();
        let depth_read_only = (self & !(Self::ALL_SAMPLED | Self::FRAMEBUFFER_READ)).is_empty();
        if self.is_empty() {
            vk::ImageLayout::UNDEFINED
        } else if framebuffer_only {
            if !traits.depth_stencil {
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            } else if self.contains(Self::FRAMEBUFFER_WRITE) {
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
            } else {
                vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
            }
        } else if sampled_only {
            if traits.depth_stencil {
                vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
            } else {
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
            }
        } else if traits.depth_stencil && depth_read_only {
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        } else if self == Self::GENERATE_MIPMAPS {
            if level == 0 || level + 1 < traits.mip_count {
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL
            } else {
                vk::ImageLayout::TRANSFER_DST_OPTIMAL
            }
        } else if self == Self::TRANSFER_DESTINATION {
            vk::ImageLayout::TRANSFER_DST_OPTIMAL
        } else if self == Self::PRESENT {
            vk::ImageLayout::PRESENT_SRC_KHR
        } else if self == Self::FRAMEBUFFER_SHADING_RATE {
            vk::ImageLayout::FRAGMENT_SHADING_RATE_ATTACHMENT_OPTIMAL_KHR
        } else {
            vk::ImageLayout::GENERAL
        }
    }

    pub fn derive_transition(
        prev: Self,
        next: Self,
        traits: SurfaceTraits,
        level: u32,
    ) -> UsageTransition {
        assert!(!next.is_empty(), "next texture usage cannot be empty");
        assert!(
            !prev.contains(Self::GENERATE_MIPMAPS) || prev == Self::GENERATE_MIPMAPS,
            "generate-mipmaps cannot be combined with other usages"
        );
        assert!(
            !next.contains(Self::GENERATE_MIPMAPS) || next == Self::GENERATE_MIPMAPS,
            "generate-mipmaps cannot be combined with other usages"
        );
        let src = prev.to_vk(traits, level, true);
        let dst = next.to_vk(traits, level, false);
        let old_layout = prev.layout(traits, level);
        let new_layout = next.layout(traits, level);

        // Availability for writes only. A layout transition is itself a write,
        // so the destination needs visibility whenever one happens.
        let src_access_mask = if prev.has_writes() {
            src.access_mask
        } else {
            vk::AccessFlags2::NONE
        };
        let dst_access_mask = if !src_access_mask.is_empty() || old_layout != new_layout {
            dst.access_mask
        } else {
            vk::AccessFlags2::NONE
        };
        finish_transition(UsageTransition {
            src_stage_mask: src.stage_mask,
            src_access_mask,
            dst_stage_mask: dst.stage_mask,
            dst_access_mask,
            old_layout,
            new_layout,
        })
    }
}

impl BufferUsageBit {
    pub fn has_writes(self) -> bool {
        self.intersects(Self::ALL_WRITE)
    }

    fn bit_to_vk(self) -> VkAccessInfo {
        use vk::AccessFlags2 as A;
        use vk::PipelineStageFlags2 as S;
        match self {
            Self::UNIFORM_GEOMETRY => VkAccessInfo::new(GEOMETRY_STAGES, A::UNIFORM_READ),
            Self::UNIFORM_FRAGMENT => VkAccessInfo::new(S::FRAGMENT_SHADER, A::UNIFORM_READ),
            Self::UNIFORM_COMPUTE => VkAccessInfo::new(S::COMPUTE_SHADER, A::UNIFORM_READ),
            Self::UNIFORM_TRACE_RAYS => {
                VkAccessInfo::new(S::RAY_TRACING_SHADER_KHR, A::UNIFORM_READ)
            }
            Self::STORAGE_GEOMETRY_READ => {
                VkAccessInfo::new(GEOMETRY_STAGES, A::SHADER_STORAGE_READ)
            }
            Self::STORAGE_GEOMETRY_WRITE => {
                VkAccessInfo::new(GEOMETRY_STAGES, A::SHADER_STORAGE_WRITE)
            }
            Self::STORAGE_FRAGMENT_READ => {
                VkAccessInfo::new(S::FRAGMENT_SHADER, A::SHADER_STORAGE_READ)
            }
            Self::STORAGE_FRAGMENT_WRITE => {
                VkAccessInfo::new(S::FRAGMENT_SHADER, A::SHADER_STORAGE_WRITE)
            }
            Self::STORAGE_COMPUTE_READ => {
                VkAccessInfo::new(S::COMPUTE_SHADER, A::SHADER_STORAGE_READ)
            }
            Self::STORAGE_COMPUTE_WRITE => {
                VkAccessInfo::new(S::COMPUTE_SHADER, A::SHADER_STORAGE_WRITE)
            }
            Self::STORAGE_TRACE_RAYS_READ => {
                VkAccessInfo::new(S::RAY_TRACING_SHADER_KHR, A::SHADER_STORAGE_READ)
            }
            Self::STORAGE_TRACE_RAYS_WRITE => {
                VkAccessInfo::new(S::RAY_TRACING_SHADER_KHR, A::SHADER_STORAGE_WRITE)
            }
            Self::TEXEL_GEOMETRY_READ => VkAccessInfo::new(GEOMETRY_STAGES, A::SHADER_SAMPLED_READ),
            Self::TEXEL_FRAGMENT_READ => {
                VkAccessInfo::new(S::FRAGMENT_SHADER, A::SHADER_SAMPLED_READ)
            }
            Self::TEXEL_COMPUTE_READ => VkAccessInfo::new(S::COMPUTE_SHADER, A::SHADER_SAMPLED_READ),
            Self::TEXEL_TRACE_RAYS_READ => {
                VkAccessInfo::new(S::RAY_TRACING_SHADER_KHR, A::SHADER_SAMPLED_READ)
            }
            Self::INDEX => VkAccessInfo::new(S::INDEX_INPUT, A::INDEX_READ),
            Self::VERTEX => VkAccessInfo::new(S::VERTEX_ATTRIBUTE_INPUT, A::VERTEX_ATTRIBUTE_READ),
            Self::INDIRECT_DRAW | Self::INDIRECT_COMPUTE | Self::INDIRECT_TRACE_RAYS => {
                VkAccessInfo::new(S::DRAW_INDIRECT, A::INDIRECT_COMMAND_READ)
            }
            Self::TRANSFER_SOURCE => VkAccessInfo::new(S::TRANSFER, A::TRANSFER_READ),
            Self::TRANSFER_DESTINATION => VkAccessInfo::new(S::TRANSFER, A::TRANSFER_WRITE),
            Self::ACCELERATION_STRUCTURE_BUILD => {
                VkAccessInfo::new(S::ACCELERATION_STRUCTURE_BUILD_KHR, A::SHADER_READ)
            }
            Self::SHADER_BINDING_TABLE => {
                VkAccessInfo::new(S::RAY_TRACING_SHADER_KHR, A::SHADER_READ)
            }
            Self::ACCELERATION_STRUCTURE_BUILD_SCRATCH => VkAccessInfo::new(
                S::ACCELERATION_STRUCTURE_BUILD_KHR,
                A::ACCELERATION_STRUCTURE_READ_KHR | A::ACCELERATION_STRUCTURE_WRITE_KHR,
            ),
            _ => panic!("{:?} is not a single buffer usage bit", self),
        }
    }

    pub fn to_vk(self) -> VkAccessInfo {
        let mut info = VkAccessInfo::new(vk::PipelineStageFlags2::empty(), vk::AccessFlags2::empty());
        for bit in single_bits(self.bits()) {
            let bit_info = Self::from_bits_retain(bit).bit_to_vk();
            info.stage_mask |= bit_info.stage_mask;
            info.access_mask |= bit_info.access_mask;
        }
        info
    }

    pub fn derive_transition(prev: Self, next: Self) -> UsageTransition {
        assert!(!next.is_empty(), "next buffer usage cannot be empty");
        let src = prev.to_vk();
        let dst = next.to_vk();
        memory_transition(src, prev.has_writes(), dst)
    }
}

impl AccelerationStructureUsageBit {
    pub fn has_writes(self) -> bool {
        self.intersects(Self::ALL_WRITE)
    }

    fn bit_to_vk(self) -> VkAccessInfo {
        use vk::AccessFlags2 as A;
        use vk::PipelineStageFlags2 as S;
        match self {
            Self::BUILD => VkAccessInfo::new(
                S::ACCELERATION_STRUCTURE_BUILD_KHR,
                A::ACCELERATION_STRUCTURE_WRITE_KHR,
            ),
            Self::ATTACH => VkAccessInfo::new(
                S::ACCELERATION_STRUCTURE_BUILD_KHR,
                A::ACCELERATION_STRUCTURE_READ_KHR,
            ),
            Self::GEOMETRY_READ => {
                VkAccessInfo::new(GEOMETRY_STAGES, A::ACCELERATION_STRUCTURE_READ_KHR)
            }
            Self::FRAGMENT_READ => {
                VkAccessInfo::new(S::FRAGMENT_SHADER, A::ACCELERATION_STRUCTURE_READ_KHR)
            }
            Self::COMPUTE_READ => {
                VkAccessInfo::new(S::COMPUTE_SHADER, A::ACCELERATION_STRUCTURE_READ_KHR)
            }
            Self::TRACE_RAYS_READ => {
                VkAccessInfo::new(S::RAY_TRACING_SHADER_KHR, A::ACCELERATION_STRUCTURE_READ_KHR)
            }
            _ => panic!("{:?} is not a single acceleration structure usage bit", self),
        }
    }

    pub fn to_vk(self) -> VkAccessInfo {
        let mut info = VkAccessInfo::new(vk::PipelineStageFlags2::empty(), vk::AccessFlags2::empty());
        for bit in single_bits(self.bits()) {
            let bit_info = Self::from_bits_retain(bit).bit_to_vk();
            info.stage_mask |= bit_info.stage_mask;
            info.access_mask |= bit_info.access_mask;
        }
        info
    }

    pub fn derive_transition(prev: Self, next: Self) -> UsageTransition {
        assert!(!next.is_empty(), "next acceleration structure usage cannot be empty");
        memory_transition(prev.to_vk(), prev.has_writes(), next.to_vk())
    }
}

fn memory_transition(src: VkAccessInfo, src_writes: bool, dst: VkAccessInfo) -> UsageTransition {
    let src_access_mask = if src_writes {
        src.access_mask
    } else {
        vk::AccessFlags2::NONE
    };
    // WAR only needs an execution dependency.
    let dst_access_mask = if src_access_mask.is_empty() {
        vk::AccessFlags2::NONE
    } else {
        dst.access_mask
    };
    finish_transition(UsageTransition {
        src_stage_mask: src.stage_mask,
        src_access_mask,
        dst_stage_mask: dst.stage_mask,
        dst_access_mask,
        old_layout: vk::ImageLayout::UNDEFINED,
        new_layout: vk::ImageLayout::UNDEFINED,
    })
}

fn finish_transition(mut transition: UsageTransition) -> UsageTransition {
    if transition.src_stage_mask.is_empty() {
        transition.src_stage_mask = vk::PipelineStageFlags2::TOP_OF_PIPE;
    }
    if transition.dst_stage_mask.is_empty() {
        transition.dst_stage_mask = vk::PipelineStageFlags2::BOTTOM_OF_PIPE;
    }
    transition
}
