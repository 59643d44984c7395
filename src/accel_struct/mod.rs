use std::{ops::Deref, sync::Arc};

use ash::extensions::khr;
use ash::{prelude::VkResult, vk};
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::{
    command::{sync::AccelerationStructureUsageBit, tracker::AccelerationStructureState},
    resources::{Buffer, ResourceId},
};

pub struct AccelerationStructureLoader {
    loader: khr::AccelerationStructure,
}

impl AccelerationStructureLoader {
    pub fn new(instance: &ash::Instance, device: &ash::Device) -> Self {
        let loader = khr::AccelerationStructure::new(instance, device);
        Self { loader }
    }
}

impl AccelerationStructureLoader {
    /// Sizes of the structure and of the scratch memory a device build of
    /// `build` needs.
    pub fn build_sizes(
        &self,
        ty: AccelerationStructureType,
        build: &AccelerationStructureBuild,
    ) -> vk::AccelerationStructureBuildSizesInfoKHR {
        let (geometries, ranges) = build.to_vk();
        let primitive_counts: SmallVec<[u32; 1]> =
            ranges.iter().map(|range| range.primitive_count).collect();
        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::builder()
            .ty(ty.into())
            .flags(build.flags)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(&geometries);
        unsafe {
            self.loader.get_acceleration_structure_build_sizes(
                vk::AccelerationStructureBuildTypeKHR::DEVICE,
                &build_info,
                &primitive_counts,
            )
        }
    }
}

impl Deref for AccelerationStructureLoader {
    type Target = khr::AccelerationStructure;

    fn deref(&self) -> &Self::Target {
        &self.loader
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccelerationStructureType {
    TopLevel,
    BottomLevel,
}

impl From<AccelerationStructureType> for vk::AccelerationStructureTypeKHR {
    fn from(ty: AccelerationStructureType) -> Self {
        match ty {
            AccelerationStructureType::TopLevel => vk::AccelerationStructureTypeKHR::TOP_LEVEL,
            AccelerationStructureType::BottomLevel => {
                vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL
            }
        }
    }
}

/// Geometry data consumed by a build, addressed through device addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccelerationStructureGeometry {
    Triangles {
        vertex_format: vk::Format,
        vertex_data: vk::DeviceAddress,
        vertex_stride: vk::DeviceSize,
        max_vertex: u32,
        index_type: vk::IndexType,
        /// Ignored when `index_type` is `NONE_KHR`.
        index_data: vk::DeviceAddress,
        /// Zero for no transform.
        transform_data: vk::DeviceAddress,
    },
    Aabbs {
        data: vk::DeviceAddress,
        stride: vk::DeviceSize,
    },
    /// Only valid in top level structures.
    Instances { data: vk::DeviceAddress },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccelerationStructureBuildGeometry {
    pub geometry: AccelerationStructureGeometry,
    pub flags: vk::GeometryFlagsKHR,
    /// Triangles, boxes or instances.
    pub primitive_count: u32,
}

/// Everything a device build of one structure needs apart from the
/// destination and the scratch memory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccelerationStructureBuild {
    pub flags: vk::BuildAccelerationStructureFlagsKHR,
    pub geometries: SmallVec<[AccelerationStructureBuildGeometry; 1]>,
}

impl AccelerationStructureBuild {
    /// Panics if the geometries do not fit a structure of type `ty`.
    pub fn validate(&self, ty: AccelerationStructureType) {
        assert!(!self.geometries.is_empty(), "acceleration structure builds need geometry");
        let instances = self
            .geometries
            .iter()
            .filter(|g| matches!(g.geometry, AccelerationStructureGeometry::Instances { .. }))
            .count();
        match ty {
            AccelerationStructureType::TopLevel => assert!(
                instances == 1 && self.geometries.len() == 1,
                "top level structures are built from exactly one instance geometry"
            ),
            AccelerationStructureType::BottomLevel => assert_eq!(
                instances, 0,
                "bottom level structures cannot be built from instances"
            ),
        }
    }

    /// Geometries and their build ranges, in the same order.
    pub(crate) fn to_vk(
        &self,
    ) -> (
        SmallVec<[vk::AccelerationStructureGeometryKHR; 1]>,
        SmallVec<[vk::AccelerationStructureBuildRangeInfoKHR; 1]>,
    ) {
        let const_address = |device_address| vk::DeviceOrHostAddressConstKHR { device_address };
        let mut geometries = SmallVec::new();
        let mut ranges = SmallVec::new();
        for build_geometry in self.geometries.iter() {
            let (geometry_type, geometry) = match build_geometry.geometry {
                AccelerationStructureGeometry::Triangles {
                    vertex_format,
                    vertex_data,
                    vertex_stride,
                    max_vertex,
                    index_type,
                    index_data,
                    transform_data,
                } => (
                    vk::GeometryTypeKHR::TRIANGLES,
                    vk::AccelerationStructureGeometryDataKHR {
                        triangles: vk::AccelerationStructureGeometryTrianglesDataKHR::builder()
                            .vertex_format(vertex_format)
                            .vertex_data(const_address(vertex_data))
                            .vertex_stride(vertex_stride)
                            .max_vertex(max_vertex)
                            .index_type(index_type)
                            .index_data(const_address(index_data))
                            .transform_data(const_address(transform_data))
                            .build(),
                    },
                ),
                AccelerationStructureGeometry::Aabbs { data, stride } => (
                    vk::GeometryTypeKHR::AABBS,
                    vk::AccelerationStructureGeometryDataKHR {
                        aabbs: vk::AccelerationStructureGeometryAabbsDataKHR::builder()
                            .data(const_address(data))
                            .stride(stride)
                            .build(),
                    },
                ),
                AccelerationStructureGeometry::Instances { data } => (
                    vk::GeometryTypeKHR::INSTANCES,
                    vk::AccelerationStructureGeometryDataKHR {
                        instances: vk::AccelerationStructureGeometryInstancesDataKHR::builder()
                            .array_of_pointers(false)
                            .data(const_address(data))
                            .build(),
                    },
                ),
            };
            geometries.push(
                vk::AccelerationStructureGeometryKHR::builder()
                    .geometry_type(geometry_type)
                    .geometry(geometry)
                    .flags(build_geometry.flags)
                    .build(),
            );
            ranges.push(vk::AccelerationStructureBuildRangeInfoKHR {
                primitive_count: build_geometry.primitive_count,
                primitive_offset: 0,
                first_vertex: 0,
                transform_offset: 0,
            });
        }
        (geometries, ranges)
    }
}

/// Built by [`CommandStream::build_acceleration_structure`](crate::command::CommandStream::build_acceleration_structure),
/// which orders the build against every later read of the structure.
pub struct AccelerationStructure {
    id: ResourceId,
    loader: Option<Arc<AccelerationStructureLoader>>,
    raw: vk::AccelerationStructureKHR,
    device_address: vk::DeviceAddress,
    ty: AccelerationStructureType,
    usage: AccelerationStructureUsageBit,
    backing_buffer: Option<Arc<Buffer>>,
    pub(crate) tracked: Mutex<AccelerationStructureState>,
}

impl std::fmt::Debug for AccelerationStructure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccelerationStructure")
            .field("id", &self.id)
            .field("raw", &self.raw)
            .field("ty", &self.ty)
            .field("usage", &self.usage)
            .finish()
    }
}

impl AccelerationStructure {
    /// Creates a structure stored in `backing_buffer[offset..offset + size]`.
    pub fn new(
        loader: Arc<AccelerationStructureLoader>,
        backing_buffer: Arc<Buffer>,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        ty: AccelerationStructureType,
        usage: AccelerationStructureUsageBit,
    ) -> VkResult<Self> {
        let create_info = vk::AccelerationStructureCreateInfoKHR::builder()
            .buffer(backing_buffer.raw())
            .offset(offset)
            .size(size)
            .ty(ty.into());
        let raw = unsafe { loader.create_acceleration_structure(&create_info, None)? };
        let device_address = unsafe {
            loader.get_acceleration_structure_device_address(
                &vk::AccelerationStructureDeviceAddressInfoKHR::builder()
                    .acceleration_structure(raw),
            )
        };
        tracing::debug!(acceleration_structure = ?raw, "create acceleration structure");
        Ok(Self {
            id: ResourceId::next(),
            loader: Some(loader),
            raw,
            device_address,
            ty,
            usage,
            backing_buffer: Some(backing_buffer),
            tracked: Mutex::new(AccelerationStructureState::default()),
        })
    }

    /// Wraps a structure owned elsewhere. It is not destroyed on drop.
    pub fn from_raw(
        raw: vk::AccelerationStructureKHR,
        device_address: vk::DeviceAddress,
        ty: AccelerationStructureType,
        usage: AccelerationStructureUsageBit,
    ) -> Self {
        Self {
            id: ResourceId::next(),
            loader: None,
            raw,
            device_address,
            ty,
            usage,
            backing_buffer: None,
            tracked: Mutex::new(AccelerationStructureState::default()),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }
    pub fn raw(&self) -> vk::AccelerationStructureKHR {
        self.raw
    }
    pub fn device_address(&self) -> vk::DeviceAddress {
        self.device_address
    }
    pub fn ty(&self) -> AccelerationStructureType {
        self.ty
    }
    pub fn usage(&self) -> AccelerationStructureUsageBit {
        self.usage
    }
    pub fn usage_valid(&self, usage: AccelerationStructureUsageBit) -> bool {
        self.usage.contains(usage)
    }
    pub fn backing_buffer(&self) -> Option<&Arc<Buffer>> {
        self.backing_buffer.as_ref()
    }
}

impl Drop for AccelerationStructure {
    fn drop(&mut self) {
        if let Some(loader) = self.loader.as_ref() {
            tracing::debug!(acceleration_structure = ?self.raw, "drop acceleration structure");
            unsafe {
                loader.destroy_acceleration_structure(self.raw, None);
            }
        }
    }
}
