//! 加速结构的构建与更新
//!
//! 每个加速结构由一个 BLAS 和只包含一个实例的 TLAS 组成，构建直接录制在当前的 command buffer 中

use ash::vk;
use gpu_allocator::MemoryLocation;

use super::VulkanDevice;
use crate::device::GpuAccelStructId;
use crate::resources::resource_desc::{AccelStructBuildFlags, AccelStructDesc, BufferDesc, BufferKind, IndexFormat};
use crate::vulkan::convert;
use crate::vulkan::device_functions::check;
use crate::vulkan::frame::DeferredDestroy;
use crate::vulkan::resources::{VulkanAccelStruct, VulkanBuffer};

fn build_flags(flags: AccelStructBuildFlags) -> vk::BuildAccelerationStructureFlagsKHR {
    let mut vk_flags = vk::BuildAccelerationStructureFlagsKHR::empty();
    if flags.contains(AccelStructBuildFlags::ALLOW_UPDATE) {
        vk_flags |= vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE;
    }
    if flags.contains(AccelStructBuildFlags::ALLOW_COMPACTION) {
        vk_flags |= vk::BuildAccelerationStructureFlagsKHR::ALLOW_COMPACTION;
    }
    if flags.contains(AccelStructBuildFlags::PREFER_FAST_TRACE) {
        vk_flags |= vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE;
    }
    if flags.contains(AccelStructBuildFlags::PREFER_FAST_BUILD) {
        vk_flags |= vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_BUILD;
    }
    if flags.contains(AccelStructBuildFlags::ALLOW_DATA_ACCESS) {
        vk_flags |= vk::BuildAccelerationStructureFlagsKHR::ALLOW_DATA_ACCESS;
    }
    vk_flags
}

/// TLAS 中唯一的实例：单位变换，不做背面剔除，强制 opaque
fn single_instance(blas_address: vk::DeviceAddress) -> vk::AccelerationStructureInstanceKHR {
    vk::AccelerationStructureInstanceKHR {
        // 3x4 row-major matrix
        transform: vk::TransformMatrixKHR {
            matrix: [1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        },
        instance_custom_index_and_mask: vk::Packed24_8::new(0, 0xFF),
        instance_shader_binding_table_record_offset_and_flags: vk::Packed24_8::new(
            0,
            (vk::GeometryInstanceFlagsKHR::FORCE_OPAQUE | vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE)
                .as_raw() as u8,
        ),
        acceleration_structure_reference: vk::AccelerationStructureReferenceKHR {
            device_handle: blas_address,
        },
    }
}

/// BLAS 的几何描述，以及每段几何的 primitive 数量
struct BlasInputs {
    geometries: Vec<vk::AccelerationStructureGeometryKHR<'static>>,
    ranges: Vec<vk::AccelerationStructureBuildRangeInfoKHR>,
}
impl BlasInputs {
    fn max_primitives(&self) -> Vec<u32> {
        self.ranges.iter().map(|range| range.primitive_count).collect()
    }
}

impl VulkanDevice {
    /// 加速结构本身所在的 buffer
    fn new_accel_struct_buffer(&mut self, size: u64, name: &str) -> VulkanBuffer {
        VulkanBuffer::new(
            &self.functions,
            &mut self.allocator,
            BufferDesc::new(BufferKind::UnorderedAccess, size),
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            MemoryLocation::GpuOnly,
            name,
        )
    }

    fn new_scratch_buffer(&mut self, size: u64) -> VulkanBuffer {
        VulkanBuffer::new(
            &self.functions,
            &mut self.allocator,
            BufferDesc::new(BufferKind::UnorderedAccess, size),
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            MemoryLocation::GpuOnly,
            "accel-struct-scratch",
        )
    }

    fn create_vk_accel_struct(
        &self,
        buffer: &VulkanBuffer,
        size: u64,
        ty: vk::AccelerationStructureTypeKHR,
    ) -> vk::AccelerationStructureKHR {
        let create_info = vk::AccelerationStructureCreateInfoKHR::default().buffer(buffer.vk_buffer()).size(size).ty(ty);
        unsafe {
            check(
                self.functions.acceleration_structure().create_acceleration_structure(&create_info, None),
                "vkCreateAccelerationStructureKHR",
            )
        }
    }

    fn accel_struct_address(&self, accel_struct: vk::AccelerationStructureKHR) -> vk::DeviceAddress {
        unsafe {
            self.functions.acceleration_structure().get_acceleration_structure_device_address(
                &vk::AccelerationStructureDeviceAddressInfoKHR::default().acceleration_structure(accel_struct),
            )
        }
    }

    /// 失效的 vertex/index buffer 对应的几何会被跳过
    fn blas_inputs(&self, desc: &AccelStructDesc) -> BlasInputs {
        let mut inputs = BlasInputs {
            geometries: Vec::with_capacity(desc.geometries.len()),
            ranges: Vec::with_capacity(desc.geometries.len()),
        };

        for geometry in &desc.geometries {
            let Some(vertex_address) = self.buffers.get(geometry.vertex_buffer).and_then(|b| b.device_address()) else {
                log::error!("acceleration structure geometry references an invalid vertex buffer");
                continue;
            };

            let mut triangles = vk::AccelerationStructureGeometryTrianglesDataKHR::default()
                .vertex_format(convert::vk_format(geometry.vertex_format))
                .vertex_data(vk::DeviceOrHostAddressConstKHR {
                    device_address: vertex_address + geometry.vertex_offset,
                })
                .vertex_stride(geometry.vertex_stride as u64)
                .max_vertex(geometry.vertex_count.saturating_sub(1))
                .index_type(vk::IndexType::NONE_KHR);

            let primitive_count = match geometry.index_buffer {
                Some(index_buffer) => {
                    let Some(index_address) = self.buffers.get(index_buffer).and_then(|b| b.device_address()) else {
                        log::error!("acceleration structure geometry references an invalid index buffer");
                        continue;
                    };
                    triangles = triangles
                        .index_type(match geometry.index_format {
                            IndexFormat::U16 => vk::IndexType::UINT16,
                            IndexFormat::U32 => vk::IndexType::UINT32,
                        })
                        .index_data(vk::DeviceOrHostAddressConstKHR {
                            device_address: index_address + geometry.index_offset,
                        });
                    geometry.index_count / 3
                }
                None => geometry.vertex_count / 3,
            };

            inputs.geometries.push(
                vk::AccelerationStructureGeometryKHR::default()
                    .geometry_type(vk::GeometryTypeKHR::TRIANGLES)
                    .geometry(vk::AccelerationStructureGeometryDataKHR { triangles })
                    .flags(vk::GeometryFlagsKHR::OPAQUE),
            );
            inputs.ranges.push(vk::AccelerationStructureBuildRangeInfoKHR::default().primitive_count(primitive_count));
        }

        inputs
    }

    fn build_sizes(
        &self,
        build_info: &vk::AccelerationStructureBuildGeometryInfoKHR,
        max_primitives: &[u32],
    ) -> vk::AccelerationStructureBuildSizesInfoKHR<'static> {
        let mut size_info = vk::AccelerationStructureBuildSizesInfoKHR::default();
        unsafe {
            self.functions.acceleration_structure().get_acceleration_structure_build_sizes(
                vk::AccelerationStructureBuildTypeKHR::DEVICE,
                build_info,
                max_primitives,
                &mut size_info,
            );
        }
        size_info
    }

    /// 在 render pass 之外录制一次构建，scratch buffer 在提交完成后销毁
    fn record_accel_struct_build(
        &mut self,
        mut build_info: vk::AccelerationStructureBuildGeometryInfoKHR,
        ranges: &[vk::AccelerationStructureBuildRangeInfoKHR],
        scratch_size: u64,
    ) {
        let scratch = self.new_scratch_buffer(scratch_size);
        build_info.scratch_data = vk::DeviceOrHostAddressKHR {
            device_address: scratch.device_address().unwrap_or_default(),
        };

        let cmd = self.begin_outside_rendering();
        unsafe {
            self.functions.acceleration_structure().cmd_build_acceleration_structures(
                cmd,
                std::slice::from_ref(&build_info),
                &[ranges],
            );
        }
        self.defer_destroy(DeferredDestroy::Buffer(scratch));
    }

    fn tlas_geometry(instance_buffer: &VulkanBuffer) -> vk::AccelerationStructureGeometryKHR<'static> {
        vk::AccelerationStructureGeometryKHR::default().geometry_type(vk::GeometryTypeKHR::INSTANCES).geometry(
            vk::AccelerationStructureGeometryDataKHR {
                instances: vk::AccelerationStructureGeometryInstancesDataKHR::default()
                    .array_of_pointers(false)
                    .data(vk::DeviceOrHostAddressConstKHR {
                        device_address: instance_buffer.device_address().unwrap_or_default(),
                    }),
            },
        )
    }

    pub(super) fn build_accel_struct(&mut self, desc: &AccelStructDesc) -> VulkanAccelStruct {
        if !self.raytracing {
            panic!("acceleration structure created on a device without raytracing");
        }
        let flags = build_flags(desc.build_flags);

        // BLAS
        let blas_inputs = self.blas_inputs(desc);
        let mut blas_build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL)
            .flags(flags)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(&blas_inputs.geometries);
        let blas_sizes = self.build_sizes(&blas_build_info, &blas_inputs.max_primitives());

        let blas_buffer = self.new_accel_struct_buffer(blas_sizes.acceleration_structure_size, "blas");
        let blas = self.create_vk_accel_struct(
            &blas_buffer,
            blas_sizes.acceleration_structure_size,
            vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
        );
        blas_build_info = blas_build_info.dst_acceleration_structure(blas);
        self.record_accel_struct_build(blas_build_info, &blas_inputs.ranges, blas_sizes.build_scratch_size);

        // instance buffer
        let instance = single_instance(self.accel_struct_address(blas));
        let mut instance_buffer = VulkanBuffer::new(
            &self.functions,
            &mut self.allocator,
            BufferDesc::new(BufferKind::Staging, size_of::<vk::AccelerationStructureInstanceKHR>() as u64),
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            MemoryLocation::CpuToGpu,
            "tlas-instances",
        );
        match instance_buffer.mapped_slice_mut() {
            Some(mapped) => unsafe {
                std::ptr::copy_nonoverlapping(
                    (&instance as *const vk::AccelerationStructureInstanceKHR).cast::<u8>(),
                    mapped.as_mut_ptr(),
                    size_of::<vk::AccelerationStructureInstanceKHR>(),
                );
            },
            None => panic!("instance buffer is not host visible"),
        }

        // TLAS
        let tlas_geometry = Self::tlas_geometry(&instance_buffer);
        let mut tlas_build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::TOP_LEVEL)
            .flags(flags)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(std::slice::from_ref(&tlas_geometry));
        let tlas_sizes = self.build_sizes(&tlas_build_info, &[1]);

        let tlas_buffer = self.new_accel_struct_buffer(tlas_sizes.acceleration_structure_size, "tlas");
        let tlas = self.create_vk_accel_struct(
            &tlas_buffer,
            tlas_sizes.acceleration_structure_size,
            vk::AccelerationStructureTypeKHR::TOP_LEVEL,
        );
        tlas_build_info = tlas_build_info.dst_acceleration_structure(tlas);
        // begin_outside_rendering 中的 barrier 保证 BLAS 构建完成后才开始构建 TLAS
        self.record_accel_struct_build(
            tlas_build_info,
            &[vk::AccelerationStructureBuildRangeInfoKHR::default().primitive_count(1)],
            tlas_sizes.build_scratch_size,
        );

        VulkanAccelStruct {
            desc: desc.clone(),
            blas,
            blas_buffer,
            tlas,
            tlas_buffer,
            instance_buffer,
        }
    }

    /// 用新的几何数据重建 BLAS，然后原地更新 TLAS
    pub(super) fn refit_accel_struct(&mut self, accel_struct: GpuAccelStructId, desc: &AccelStructDesc) {
        let Some(target) = self.accel_structs.get(accel_struct) else {
            log::error!("update_accel_struct: invalid acceleration structure {accel_struct:?}");
            return;
        };
        if !target.desc.build_flags.contains(AccelStructBuildFlags::ALLOW_UPDATE) {
            log::error!("update_accel_struct: acceleration structure was not created as updatable");
            return;
        }
        let (blas, tlas, blas_capacity) = (target.blas, target.tlas, target.blas_buffer.size());
        let tlas_geometry = Self::tlas_geometry(&target.instance_buffer);
        let flags = build_flags(desc.build_flags | AccelStructBuildFlags::ALLOW_UPDATE);

        let blas_inputs = self.blas_inputs(desc);
        let mut blas_build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL)
            .flags(flags)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(&blas_inputs.geometries);
        let blas_sizes = self.build_sizes(&blas_build_info, &blas_inputs.max_primitives());
        if blas_sizes.acceleration_structure_size > blas_capacity {
            log::error!(
                "update_accel_struct: new geometry needs {} bytes, the acceleration structure holds {blas_capacity}",
                blas_sizes.acceleration_structure_size
            );
            return;
        }
        blas_build_info = blas_build_info.dst_acceleration_structure(blas);
        self.record_accel_struct_build(blas_build_info, &blas_inputs.ranges, blas_sizes.build_scratch_size);

        let tlas_build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::TOP_LEVEL)
            .flags(flags)
            .mode(vk::BuildAccelerationStructureModeKHR::UPDATE)
            .src_acceleration_structure(tlas)
            .dst_acceleration_structure(tlas)
            .geometries(std::slice::from_ref(&tlas_geometry));
        let tlas_sizes = self.build_sizes(&tlas_build_info, &[1]);
        self.record_accel_struct_build(
            tlas_build_info,
            &[vk::AccelerationStructureBuildRangeInfoKHR::default().primitive_count(1)],
            tlas_sizes.update_scratch_size,
        );

        if let Some(target) = self.accel_structs.get_mut(accel_struct) {
            target.desc = desc.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_flags() {
        let flags = build_flags(
            AccelStructBuildFlags::ALLOW_DATA_ACCESS
                | AccelStructBuildFlags::PREFER_FAST_BUILD
                | AccelStructBuildFlags::ALLOW_UPDATE,
        );
        assert_eq!(
            flags,
            vk::BuildAccelerationStructureFlagsKHR::ALLOW_DATA_ACCESS
                | vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_BUILD
                | vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE
        );
        assert!(build_flags(AccelStructBuildFlags::empty()).is_empty());
    }

    #[test]
    fn test_single_instance() {
        let instance = single_instance(0x1000);
        // mask 位于高 8 位
        assert_eq!(instance.instance_custom_index_and_mask.high_8(), 0xFF);
        assert_eq!(instance.instance_custom_index_and_mask.low_24(), 0);
        let flags = instance.instance_shader_binding_table_record_offset_and_flags.high_8() as u32;
        assert_eq!(
            flags,
            (vk::GeometryInstanceFlagsKHR::FORCE_OPAQUE | vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE)
                .as_raw()
        );
        assert_eq!(instance.transform.matrix[0], 1.0);
        assert_eq!(instance.transform.matrix[5], 1.0);
        assert_eq!(instance.transform.matrix[10], 1.0);
    }
}
