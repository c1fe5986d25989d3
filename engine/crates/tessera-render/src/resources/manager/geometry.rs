use tessera_gfx::basic::format::Format;
use tessera_gfx::device::GfxDevice;
use tessera_gfx::pipelines::pipeline_desc::{PrimitiveType, VertexAttributeDesc};
use tessera_gfx::resources::resource_desc::{
    AccelStructBuildFlags, AccelStructDesc, BufferKind, GeometryTriangles, IndexFormat,
};

use super::ResourceManager;
use crate::resources::handles::{AccelStructHandle, BufferHandle, MeshHandle};
use crate::resources::{AccelStructRecord, MeshRange, MeshRecord};

// mesh
impl ResourceManager {
    pub fn create_mesh(&mut self, primitive: PrimitiveType) -> MeshHandle {
        MeshHandle::new(self.meshes.insert(MeshRecord {
            primitive,
            nb_indices: 0,
            nb_vertices: 0,
            index_buffer: BufferHandle::null(),
            index_format: IndexFormat::U32,
            attributes: vec![],
            attrib_buffers: vec![],
        }))
    }

    /// 同时删除 mesh 持有的 index buffer 与 vertex buffer
    pub fn delete_mesh(&mut self, device: &mut dyn GfxDevice, mesh: MeshHandle) {
        let Some(record) = self.meshes.remove(mesh.inner) else {
            return;
        };
        self.delete_buffer(device, record.index_buffer);
        for buffer in record.attrib_buffers {
            self.delete_buffer(device, buffer);
        }
    }

    #[inline]
    pub fn set_mesh_indices(&mut self, device: &mut dyn GfxDevice, mesh: MeshHandle, indices: &[u32]) {
        self.set_mesh_index_data(device, mesh, IndexFormat::U32, bytemuck::cast_slice(indices), indices.len() as u32);
    }

    #[inline]
    pub fn set_mesh_indices16(&mut self, device: &mut dyn GfxDevice, mesh: MeshHandle, indices: &[u16]) {
        self.set_mesh_index_data(device, mesh, IndexFormat::U16, bytemuck::cast_slice(indices), indices.len() as u32);
    }

    /// 替换 index buffer；数量为 0 时 mesh 不再有 index
    fn set_mesh_index_data(
        &mut self,
        device: &mut dyn GfxDevice,
        mesh: MeshHandle,
        format: IndexFormat,
        data: &[u8],
        count: u32,
    ) {
        let Some(old_buffer) = self.meshes.get(mesh.inner).map(|record| record.index_buffer) else {
            log::error!("Setting indices of an invalid mesh");
            return;
        };
        self.delete_buffer(device, old_buffer);

        let index_buffer = if count > 0 {
            let buffer = self.create_buffer(device, BufferKind::IndexBuffer, (count * format.size()) as u64);
            self.set_buffer_data(device, buffer, data);
            buffer
        } else {
            BufferHandle::null()
        };

        if let Some(record) = self.meshes.get_mut(mesh.inner) {
            record.nb_indices = count;
            record.index_format = format;
            record.index_buffer = index_buffer;
        }
    }

    /// 添加一个顶点属性，使用独立的 vertex buffer
    ///
    /// `data` 为 None 时只分配 buffer，内容由 GPU 写入；mesh 的顶点数变为 `count`
    pub fn add_mesh_attrib(
        &mut self,
        device: &mut dyn GfxDevice,
        mesh: MeshHandle,
        format: Format,
        instanced: bool,
        data: Option<&[u8]>,
        count: u32,
    ) {
        if self.meshes.get(mesh.inner).is_none() {
            log::error!("Adding an attribute to an invalid mesh");
            return;
        }
        let element_size = format.size();
        let byte_size = (count * element_size) as u64;
        if let Some(data) = data
            && data.len() as u64 > byte_size
        {
            log::error!("Mesh attribute data is larger than {count} elements of {}", format.info().name);
            return;
        }

        let buffer = self.create_buffer(device, BufferKind::VertexBuffer, byte_size);
        if let Some(data) = data {
            self.set_buffer_data(device, buffer, data);
        }

        if let Some(record) = self.meshes.get_mut(mesh.inner) {
            record.nb_vertices = count;
            record.attributes.push(VertexAttributeDesc {
                format,
                buffer_index: record.attributes.len() as u32,
                offset: 0,
                element_stride: element_size,
                is_instanced: instanced,
            });
            record.attrib_buffers.push(buffer);
        }
    }

    /// 没有 index 时返回 null
    #[inline]
    pub fn index_buffer(&self, mesh: MeshHandle) -> BufferHandle {
        self.mesh(mesh).map_or(BufferHandle::null(), |record| record.index_buffer)
    }

    #[inline]
    pub fn attrib_buffer(&self, mesh: MeshHandle, index: usize) -> BufferHandle {
        self.mesh(mesh)
            .and_then(|record| record.attrib_buffers.get(index).copied())
            .unwrap_or_default()
    }

    #[inline]
    pub fn nb_indices(&self, mesh: MeshHandle) -> u32 {
        self.mesh(mesh).map_or(0, |record| record.nb_indices)
    }

    #[inline]
    pub fn nb_vertices(&self, mesh: MeshHandle) -> u32 {
        self.mesh(mesh).map_or(0, |record| record.nb_vertices)
    }

    /// 以原点为中心、边长为 2 的立方体，6 个四边形 patch
    pub fn create_unit_cube_patch(&mut self, device: &mut dyn GfxDevice) -> MeshHandle {
        #[rustfmt::skip]
        const VERTICES: [[f32; 4]; 8] = [
            [-1.0, -1.0, -1.0, 0.0], [ 1.0, -1.0, -1.0, 0.0], [-1.0,  1.0, -1.0, 0.0], [ 1.0,  1.0, -1.0, 0.0],
            [-1.0, -1.0,  1.0, 0.0], [ 1.0, -1.0,  1.0, 0.0], [-1.0,  1.0,  1.0, 0.0], [ 1.0,  1.0,  1.0, 0.0],
        ];
        #[rustfmt::skip]
        const INDICES: [u32; 24] = [
            0, 1, 2, 3,   4, 5, 0, 1,   5, 7, 1, 3,
            7, 6, 3, 2,   6, 4, 2, 0,   6, 7, 4, 5,
        ];

        let cube = self.create_mesh(PrimitiveType::PatchList);
        self.set_mesh_indices(device, cube, &INDICES);
        self.add_mesh_attrib(
            device,
            cube,
            Format::Rgba32Float,
            false,
            Some(bytemuck::cast_slice(&VERTICES)),
            VERTICES.len() as u32,
        );
        cube
    }
}
// acceleration structure
impl ResourceManager {
    /// 每个 range 对应 BLAS 中的一段几何；顶点来自第 0 个属性
    fn blas_desc(
        &self,
        mesh: MeshHandle,
        ranges: &[MeshRange],
        build_flags: AccelStructBuildFlags,
    ) -> Option<AccelStructDesc> {
        let record = self.mesh(mesh)?;
        let (Some(attribute), Some(vertex_buffer)) = (
            record.attributes.first(),
            record.attrib_buffers.first().and_then(|&buffer| self.buffer(buffer)),
        ) else {
            log::error!("Building an acceleration structure from a mesh without vertices");
            return None;
        };
        let index_buffer = self.buffer(record.index_buffer).map(|buffer| buffer.gpu());

        let base = GeometryTriangles {
            vertex_buffer: vertex_buffer.gpu(),
            vertex_format: attribute.format,
            vertex_stride: attribute.format.size(),
            vertex_offset: 0,
            vertex_count: record.nb_vertices,
            index_buffer,
            index_format: record.index_format,
            index_offset: 0,
            index_count: 0,
        };
        let geometries = ranges
            .iter()
            .map(|range| {
                let mut triangles = base;
                if index_buffer.is_some() {
                    triangles.index_offset = range.first as u64 * record.index_format.size() as u64;
                    triangles.index_count = range.count;
                } else {
                    triangles.vertex_offset = range.first as u64 * base.vertex_stride as u64;
                    triangles.vertex_count = range.count;
                }
                triangles
            })
            .collect();

        Some(AccelStructDesc {
            geometries,
            build_flags,
        })
    }

    /// 整个 mesh 作为一段几何
    pub fn create_acceleration_structure(
        &mut self,
        device: &mut dyn GfxDevice,
        mesh: MeshHandle,
        updatable: bool,
    ) -> AccelStructHandle {
        let count = match self.mesh(mesh) {
            Some(record) if record.has_indices() => record.nb_indices,
            Some(record) => record.nb_vertices,
            None => 0,
        };
        self.create_multi_acceleration_structure(device, mesh, &[MeshRange::new(0, count)], updatable)
    }

    pub fn create_multi_acceleration_structure(
        &mut self,
        device: &mut dyn GfxDevice,
        mesh: MeshHandle,
        ranges: &[MeshRange],
        updatable: bool,
    ) -> AccelStructHandle {
        let build_flags = AccelStructBuildFlags::ALLOW_DATA_ACCESS
            | if updatable {
                AccelStructBuildFlags::PREFER_FAST_BUILD | AccelStructBuildFlags::ALLOW_UPDATE
            } else {
                AccelStructBuildFlags::PREFER_FAST_TRACE
            };
        let Some(desc) = self.blas_desc(mesh, ranges, build_flags) else {
            log::error!("Creation of an acceleration structure from an invalid mesh");
            return AccelStructHandle::null();
        };

        let gpu = device.create_accel_struct(&desc);
        AccelStructHandle::new(self.accel_structs.insert(AccelStructRecord { gpu }))
    }

    /// 用 mesh 当前的内容重建 BLAS 并更新 TLAS
    pub fn update_acceleration_structure(
        &mut self,
        device: &mut dyn GfxDevice,
        accel_struct: AccelStructHandle,
        mesh: MeshHandle,
        ranges: &[MeshRange],
    ) {
        let Some(gpu) = self.accel_struct(accel_struct).map(|record| record.gpu()) else {
            log::error!("Updating an invalid acceleration structure");
            return;
        };
        let build_flags = AccelStructBuildFlags::ALLOW_DATA_ACCESS
            | AccelStructBuildFlags::PREFER_FAST_BUILD
            | AccelStructBuildFlags::ALLOW_UPDATE;
        let Some(desc) = self.blas_desc(mesh, ranges, build_flags) else {
            log::error!("Updating an acceleration structure from an invalid mesh");
            return;
        };
        device.update_accel_struct(gpu, &desc);
    }

    pub fn delete_acceleration_structure(&mut self, device: &mut dyn GfxDevice, accel_struct: AccelStructHandle) {
        if let Some(record) = self.accel_structs.remove(accel_struct.inner) {
            device.destroy_accel_struct(record.gpu);
        }
    }
}

#[cfg(test)]
mod tests {
    use tessera_gfx::headless::{HeadlessDevice, RecordedCommand};

    use super::*;

    fn triangle_mesh(manager: &mut ResourceManager, device: &mut HeadlessDevice) -> MeshHandle {
        let mesh = manager.create_mesh(PrimitiveType::TriangleList);
        let positions: [[f32; 3]; 4] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]];
        manager.add_mesh_attrib(
            device,
            mesh,
            Format::Rgb32Float,
            false,
            Some(bytemuck::cast_slice(&positions)),
            4,
        );
        mesh
    }

    #[test]
    fn test_mesh_attributes_and_indices() {
        let mut device = HeadlessDevice::new();
        let mut manager = ResourceManager::new();
        let mesh = triangle_mesh(&mut manager, &mut device);
        manager.add_mesh_attrib(&mut device, mesh, Format::Rg32Float, true, None, 2);

        let record = manager.mesh(mesh).unwrap();
        assert_eq!(record.attributes().len(), 2);
        assert_eq!(record.attributes()[1].buffer_index, 1);
        assert_eq!(record.attributes()[1].element_stride, 8);
        assert!(record.attributes()[1].is_instanced);
        // 顶点数总是最后一次添加的属性的数量
        assert_eq!(manager.nb_vertices(mesh), 2);
        assert!(manager.index_buffer(mesh).is_null());

        manager.set_mesh_indices16(&mut device, mesh, &[0, 1, 2, 2, 1, 3]);
        assert_eq!(manager.nb_indices(mesh), 6);
        assert_eq!(manager.mesh(mesh).unwrap().index_format(), IndexFormat::U16);
        let index_buffer = manager.index_buffer(mesh);
        assert_eq!(manager.buffer(index_buffer).unwrap().byte_size(), 12);

        // 替换 index 时旧的 buffer 被释放
        manager.set_mesh_indices(&mut device, mesh, &[0, 1, 2]);
        assert!(manager.buffer(index_buffer).is_none());
        assert_eq!(manager.buffer(manager.index_buffer(mesh)).unwrap().byte_size(), 12);

        manager.set_mesh_indices(&mut device, mesh, &[]);
        assert!(manager.index_buffer(mesh).is_null());
        assert_eq!(device.live_buffer_count(), 2);

        manager.delete_mesh(&mut device, mesh);
        manager.delete_mesh(&mut device, mesh);
        assert_eq!(device.live_buffer_count(), 0);
        assert_eq!(manager.nb_vertices(mesh), 0);
    }

    #[test]
    fn test_oversized_attribute_rejected() {
        let mut device = HeadlessDevice::new();
        let mut manager = ResourceManager::new();
        let mesh = manager.create_mesh(PrimitiveType::PointList);
        manager.add_mesh_attrib(&mut device, mesh, Format::R32Float, false, Some(&[0u8; 16]), 2);
        assert!(manager.mesh(mesh).unwrap().attributes().is_empty());
        assert_eq!(device.live_buffer_count(), 0);
    }

    #[test]
    fn test_unit_cube_patch() {
        let mut device = HeadlessDevice::new();
        let mut manager = ResourceManager::new();
        let cube = manager.create_unit_cube_patch(&mut device);

        let record = manager.mesh(cube).unwrap();
        assert_eq!(record.primitive(), PrimitiveType::PatchList);
        assert_eq!(record.nb_indices(), 24);
        assert_eq!(record.nb_vertices(), 8);
        assert_eq!(record.attributes()[0].format, Format::Rgba32Float);

        let vertices = manager.map_buffer(&mut device, manager.attrib_buffer(cube, 0));
        let vertices: &[[f32; 4]] = bytemuck::cast_slice(&vertices);
        assert_eq!(vertices[7], [1.0, 1.0, 1.0, 0.0]);
        let indices = manager.map_buffer(&mut device, manager.index_buffer(cube));
        assert_eq!(&bytemuck::cast_slice::<u8, u32>(&indices)[8..12], &[5, 7, 1, 3]);
    }

    #[test]
    fn test_acceleration_structure_ranges() {
        let mut device = HeadlessDevice::new();
        let mut manager = ResourceManager::new();
        let mesh = triangle_mesh(&mut manager, &mut device);

        // 没有 index：range 以顶点计
        let accel = manager.create_multi_acceleration_structure(
            &mut device,
            mesh,
            &[MeshRange::new(0, 3), MeshRange::new(1, 3)],
            false,
        );
        let gpu = manager.accel_struct(accel).unwrap().gpu();
        let desc = device.accel_struct(gpu).unwrap();
        assert_eq!(desc.geometries.len(), 2);
        assert_eq!(desc.geometries[1].vertex_offset, 12);
        assert_eq!(desc.geometries[1].vertex_count, 3);
        assert_eq!(desc.geometries[1].vertex_stride, 12);
        assert!(desc.build_flags.contains(AccelStructBuildFlags::PREFER_FAST_TRACE));
        assert!(!desc.build_flags.contains(AccelStructBuildFlags::ALLOW_UPDATE));

        // 有 index：range 以 index 计
        manager.set_mesh_indices(&mut device, mesh, &[0, 1, 2, 2, 1, 3]);
        let updatable = manager.create_acceleration_structure(&mut device, mesh, true);
        let gpu = manager.accel_struct(updatable).unwrap().gpu();
        let desc = device.accel_struct(gpu).unwrap();
        assert_eq!(desc.geometries[0].index_count, 6);
        assert!(desc.geometries[0].index_buffer.is_some());
        assert!(desc.build_flags.contains(AccelStructBuildFlags::ALLOW_UPDATE));

        manager.update_acceleration_structure(&mut device, updatable, mesh, &[MeshRange::new(3, 3)]);
        assert!(matches!(
            device.commands().last(),
            Some(RecordedCommand::BuildAccelStruct { update: true, .. })
        ));
        assert_eq!(device.accel_struct(gpu).unwrap().geometries[0].index_offset, 12);

        manager.delete_acceleration_structure(&mut device, accel);
        manager.delete_acceleration_structure(&mut device, accel);
        assert_eq!(device.live_accel_struct_count(), 1);
    }

    #[test]
    fn test_acceleration_structure_without_vertices() {
        let mut device = HeadlessDevice::new();
        let mut manager = ResourceManager::new();
        let mesh = manager.create_mesh(PrimitiveType::TriangleList);
        assert!(manager.create_acceleration_structure(&mut device, mesh, false).is_null());
        assert_eq!(device.live_accel_struct_count(), 0);
    }
}
