mod framebuffer;
mod geometry;

use glam::Vec4;
use slotmap::SlotMap;
use tessera_gfx::basic::format::Format;
use tessera_gfx::device::GfxDevice;
use tessera_gfx::resources::resource_desc::{BufferDesc, BufferKind, TextureDesc, TextureSubresourceSet, TextureType};
use tessera_gfx::resources::sampler_state::SamplerState;

use crate::resources::handles::{
    AccelStructHandle, BufferHandle, FramebufferHandle, InnerAccelStructKey, InnerBufferKey, InnerFramebufferKey,
    InnerMeshKey, InnerTextureKey, MeshHandle, TextureHandle,
};
use crate::resources::{
    AccelStructRecord, BufferRecord, FramebufferRecord, MeshRecord, TextureFlags, TextureRecord,
};

/// 资源管理器
///
/// 使用 SlotMap 存储资源记录，对外提供带 generation 的句柄。
/// 所有需要 GPU 的操作都显式传入设备，删除操作是幂等的。
pub struct ResourceManager {
    buffers: SlotMap<InnerBufferKey, BufferRecord>,
    textures: SlotMap<InnerTextureKey, TextureRecord>,
    meshes: SlotMap<InnerMeshKey, MeshRecord>,
    framebuffers: SlotMap<InnerFramebufferKey, FramebufferRecord>,
    accel_structs: SlotMap<InnerAccelStructKey, AccelStructRecord>,

    destroyed: bool,
}
impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}
// new & init
impl ResourceManager {
    pub fn new() -> Self {
        Self {
            buffers: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            meshes: SlotMap::with_key(),
            framebuffers: SlotMap::with_key(),
            accel_structs: SlotMap::with_key(),

            destroyed: false,
        }
    }
}
// destroy
impl ResourceManager {
    /// 销毁所有还存活的资源
    pub fn destroy_mut(&mut self, device: &mut dyn GfxDevice) {
        // mesh 持有的 buffer 也在 buffers 中，只需要丢弃 mesh 记录
        self.meshes.clear();
        self.framebuffers.clear();

        for (_, accel_struct) in self.accel_structs.drain() {
            device.destroy_accel_struct(accel_struct.gpu);
        }
        for (_, texture) in self.textures.drain() {
            device.destroy_texture(texture.gpu);
        }
        for (_, buffer) in self.buffers.drain() {
            device.destroy_buffer(buffer.gpu);
        }

        self.destroyed = true;
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}
// getters
impl ResourceManager {
    #[inline]
    pub fn buffer(&self, buffer: BufferHandle) -> Option<&BufferRecord> {
        self.buffers.get(buffer.inner)
    }
    #[inline]
    pub fn texture(&self, texture: TextureHandle) -> Option<&TextureRecord> {
        self.textures.get(texture.inner)
    }
    #[inline]
    pub fn mesh(&self, mesh: MeshHandle) -> Option<&MeshRecord> {
        self.meshes.get(mesh.inner)
    }
    #[inline]
    pub fn framebuffer(&self, framebuffer: FramebufferHandle) -> Option<&FramebufferRecord> {
        self.framebuffers.get(framebuffer.inner)
    }
    #[inline]
    pub fn accel_struct(&self, accel_struct: AccelStructHandle) -> Option<&AccelStructRecord> {
        self.accel_structs.get(accel_struct.inner)
    }

    #[inline]
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }
    #[inline]
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
    #[inline]
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }
}
// buffer
impl ResourceManager {
    pub fn create_buffer(&mut self, device: &mut dyn GfxDevice, kind: BufferKind, size: u64) -> BufferHandle {
        let desc = BufferDesc::new(kind, size);
        let gpu = device.create_buffer(&desc);
        BufferHandle::new(self.buffers.insert(BufferRecord { gpu, desc }))
    }

    /// CPU 可读的 buffer，用于回读
    #[inline]
    pub fn create_staging_buffer(&mut self, device: &mut dyn GfxDevice, size: u64) -> BufferHandle {
        self.create_buffer(device, BufferKind::Staging, size)
    }

    pub fn delete_buffer(&mut self, device: &mut dyn GfxDevice, buffer: BufferHandle) {
        if let Some(record) = self.buffers.remove(buffer.inner) {
            device.destroy_buffer(record.gpu);
        }
    }

    pub fn set_buffer_data(&mut self, device: &mut dyn GfxDevice, buffer: BufferHandle, data: &[u8]) {
        let Some(record) = self.buffers.get(buffer.inner) else {
            log::error!("Setting data of an invalid buffer");
            return;
        };
        device.write_buffer(record.gpu, 0, data);
    }

    /// 复制的字节数为目标 buffer 的大小
    pub fn copy_buffer(&mut self, device: &mut dyn GfxDevice, dst: BufferHandle, src: BufferHandle) {
        let (Some(dst), Some(src)) = (self.buffers.get(dst.inner), self.buffers.get(src.inner)) else {
            log::error!("Copy between invalid buffers");
            return;
        };
        if src.byte_size() < dst.byte_size() {
            log::error!("Copy source is smaller than the destination: {} < {}", src.byte_size(), dst.byte_size());
            return;
        }
        device.copy_buffer(dst.gpu, 0, src.gpu, 0, dst.byte_size());
    }

    /// 阻塞式回读
    pub fn map_buffer(&self, device: &mut dyn GfxDevice, buffer: BufferHandle) -> Vec<u8> {
        match self.buffers.get(buffer.inner) {
            Some(record) => device.read_buffer(record.gpu),
            None => {
                log::error!("Mapping an invalid buffer");
                vec![]
            }
        }
    }
}
// texture
impl ResourceManager {
    #[allow(clippy::too_many_arguments)]
    pub fn create_texture(
        &mut self,
        device: &mut dyn GfxDevice,
        texture_type: TextureType,
        width: u32,
        height: u32,
        depth: u32,
        layers: u32,
        format: Format,
        flags: TextureFlags,
    ) -> TextureHandle {
        let mip_levels = if flags.contains(TextureFlags::MIPMAPS) {
            32 - width.max(height).max(1).leading_zeros()
        } else {
            1
        };
        let is_uav = format != Format::Srgba8Unorm && format != Format::Sbgra8Unorm && !format.is_depth() && !flags.is_msaa();

        let desc = TextureDesc {
            texture_type,
            width,
            height,
            depth: depth.max(1),
            array_size: layers.max(1),
            mip_levels,
            sample_count: flags.sample_count(),
            sample_quality: flags.contains(TextureFlags::SAMPLES_RELOCATION) as u32,
            format,
            is_uav,
            is_render_target: true,
            debug_name: format!("Texture::{texture_type:?}-{width}x{height}"),
        };
        let gpu = device.create_texture(&desc);
        TextureHandle::new(self.textures.insert(TextureRecord {
            gpu,
            desc,
            sampler: SamplerState::default(),
        }))
    }

    pub fn create_texture_1d(
        &mut self,
        device: &mut dyn GfxDevice,
        size: u32,
        format: Format,
        flags: TextureFlags,
    ) -> TextureHandle {
        self.create_texture(device, TextureType::Texture1D, size, 1, 1, 1, format, flags)
    }

    /// 带 MSAA 标志时创建多重采样纹理
    pub fn create_texture_2d(
        &mut self,
        device: &mut dyn GfxDevice,
        width: u32,
        height: u32,
        format: Format,
        flags: TextureFlags,
    ) -> TextureHandle {
        let texture_type = if flags.is_msaa() { TextureType::Texture2DMS } else { TextureType::Texture2D };
        self.create_texture(device, texture_type, width, height, 1, 1, format, flags)
    }

    pub fn create_texture_3d(
        &mut self,
        device: &mut dyn GfxDevice,
        width: u32,
        height: u32,
        depth: u32,
        format: Format,
        flags: TextureFlags,
    ) -> TextureHandle {
        self.create_texture(device, TextureType::Texture3D, width, height, depth, 1, format, flags)
    }

    /// 由像素数据创建 2D 纹理；`SRGB` 与 `SNORM` 标志会替换为对应的格式
    pub fn create_texture_2d_with_data(
        &mut self,
        device: &mut dyn GfxDevice,
        width: u32,
        height: u32,
        format: Format,
        flags: TextureFlags,
        data: &[u8],
    ) -> TextureHandle {
        let format = if flags.contains(TextureFlags::SRGB) {
            format.to_srgb()
        } else if flags.contains(TextureFlags::SNORM) {
            format.to_snorm()
        } else {
            format
        };
        let texture = self.create_texture_2d(device, width, height, format, flags);
        self.set_texture_data(device, texture, data);
        texture
    }

    pub fn delete_texture(&mut self, device: &mut dyn GfxDevice, texture: TextureHandle) {
        if let Some(record) = self.textures.remove(texture.inner) {
            device.destroy_texture(record.gpu);
        }
    }

    /// 写入 layer 0 的 mip 0，有多个 mip 时重新生成 mip 链
    pub fn set_texture_data(&mut self, device: &mut dyn GfxDevice, texture: TextureHandle, data: &[u8]) {
        self.set_texture_layer_data(device, texture, 0, data);
        if self.texture(texture).is_some_and(|record| record.desc.mip_levels > 1) {
            self.update_mipmaps(device, texture);
        }
    }

    pub fn set_texture_layer_data(&mut self, device: &mut dyn GfxDevice, texture: TextureHandle, layer: u32, data: &[u8]) {
        let Some(record) = self.textures.get(texture.inner) else {
            log::error!("Setting data of an invalid texture");
            return;
        };
        device.write_texture(record.gpu, layer, 0, data);
    }

    #[inline]
    pub fn clear_texture(&mut self, device: &mut dyn GfxDevice, texture: TextureHandle, color: Vec4) {
        self.clear_texture_layers(device, texture, color, 0, TextureSubresourceSet::ALL);
    }

    /// 清除所有 mip 的 `[first, first + count)` 层；深度格式只使用 `color.x`
    pub fn clear_texture_layers(
        &mut self,
        device: &mut dyn GfxDevice,
        texture: TextureHandle,
        color: Vec4,
        first: u32,
        count: u32,
    ) {
        let Some(record) = self.textures.get(texture.inner) else {
            log::error!("Clearing an invalid texture");
            return;
        };
        let subresources = TextureSubresourceSet::new(0, TextureSubresourceSet::ALL, first, count);
        device.clear_texture(record.gpu, subresources, color.to_array());
    }

    /// 采样数不同时执行 resolve
    pub fn copy_texture(&mut self, device: &mut dyn GfxDevice, dst: TextureHandle, src: TextureHandle) {
        let (Some(dst), Some(src)) = (self.textures.get(dst.inner), self.textures.get(src.inner)) else {
            log::error!("Copy between invalid textures");
            return;
        };
        device.copy_texture(dst.gpu, src.gpu);
    }

    pub fn update_mipmaps(&mut self, device: &mut dyn GfxDevice, texture: TextureHandle) {
        let Some(record) = self.textures.get(texture.inner) else {
            log::error!("Updating mipmaps of an invalid texture");
            return;
        };
        device.generate_mipmaps(record.gpu);
    }

    /// 阻塞式回读 mip 0
    pub fn map_texture(&self, device: &mut dyn GfxDevice, texture: TextureHandle) -> Vec<u8> {
        match self.textures.get(texture.inner) {
            Some(record) => device.read_texture(record.gpu),
            None => {
                log::error!("Mapping an invalid texture");
                vec![]
            }
        }
    }

    /// 修改后在下一次重建 binding set 时生效
    #[inline]
    pub fn sampler_mut(&mut self, texture: TextureHandle) -> Option<&mut SamplerState> {
        self.textures.get_mut(texture.inner).map(|record| &mut record.sampler)
    }
}

#[cfg(test)]
mod tests {
    use tessera_gfx::headless::{HeadlessDevice, RecordedCommand};

    use super::*;

    #[test]
    fn test_buffer_lifecycle() {
        let mut device = HeadlessDevice::new();
        let mut manager = ResourceManager::new();

        let buffer = manager.create_buffer(&mut device, BufferKind::UnorderedAccess, 8);
        manager.set_buffer_data(&mut device, buffer, &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(manager.map_buffer(&mut device, buffer), vec![1, 2, 3, 4, 5, 6, 7, 8]);

        let staging = manager.create_staging_buffer(&mut device, 8);
        manager.copy_buffer(&mut device, staging, buffer);
        assert_eq!(manager.map_buffer(&mut device, staging), vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(device.live_buffer_count(), 2);

        // 重复删除没有效果
        manager.delete_buffer(&mut device, buffer);
        manager.delete_buffer(&mut device, buffer);
        manager.delete_buffer(&mut device, BufferHandle::null());
        assert!(manager.buffer(buffer).is_none());
        assert_eq!(device.live_buffer_count(), 1);

        // 失效的句柄不会写入任何东西
        manager.set_buffer_data(&mut device, buffer, &[0; 8]);
        assert!(manager.map_buffer(&mut device, buffer).is_empty());
    }

    #[test]
    fn test_copy_buffer_smaller_source() {
        let mut device = HeadlessDevice::new();
        let mut manager = ResourceManager::new();
        let dst = manager.create_buffer(&mut device, BufferKind::UnorderedAccess, 16);
        let src = manager.create_buffer(&mut device, BufferKind::UnorderedAccess, 8);
        device.take_commands();

        manager.copy_buffer(&mut device, dst, src);
        assert!(device.commands().is_empty());
    }

    #[test]
    fn test_texture_desc_from_flags() {
        let mut device = HeadlessDevice::new();
        let mut manager = ResourceManager::new();

        let mipmapped = manager.create_texture_2d(&mut device, 256, 100, Format::Rgba8Unorm, TextureFlags::MIPMAPS);
        let desc = manager.texture(mipmapped).map(|t| t.desc().clone()).unwrap();
        assert_eq!(desc.mip_levels, 9);
        assert_eq!(desc.texture_type, TextureType::Texture2D);
        assert!(desc.is_uav);
        assert!(desc.is_render_target);

        let msaa = manager.create_texture_2d(
            &mut device,
            64,
            64,
            Format::Rgba16Float,
            TextureFlags::MSAA_X4 | TextureFlags::SAMPLES_RELOCATION,
        );
        let desc = manager.texture(msaa).map(|t| t.desc().clone()).unwrap();
        assert_eq!(desc.texture_type, TextureType::Texture2DMS);
        assert_eq!(desc.sample_count, 4);
        assert_eq!(desc.sample_quality, 1);
        assert!(!desc.is_uav);

        let srgb = manager.create_texture_2d(&mut device, 4, 4, Format::Srgba8Unorm, TextureFlags::empty());
        assert!(!manager.texture(srgb).unwrap().desc().is_uav);
        let depth = manager.create_texture_2d(&mut device, 4, 4, Format::D32, TextureFlags::empty());
        assert!(!manager.texture(depth).unwrap().desc().is_uav);
    }

    #[test]
    fn test_texture_data_generates_mipmaps() {
        let mut device = HeadlessDevice::new();
        let mut manager = ResourceManager::new();

        let pixels = vec![255u8; 4 * 4 * 4];
        let texture = manager.create_texture_2d_with_data(
            &mut device,
            4,
            4,
            Format::Rgba8Unorm,
            TextureFlags::MIPMAPS | TextureFlags::SRGB,
            &pixels,
        );
        let record = manager.texture(texture).unwrap();
        assert_eq!(record.desc().format, Format::Srgba8Unorm);
        assert_eq!(record.desc().mip_levels, 3);
        assert!(
            device
                .commands()
                .iter()
                .any(|cmd| matches!(cmd, RecordedCommand::GenerateMipmaps { texture } if *texture == record.gpu()))
        );
        assert_eq!(device.texture_data(record.gpu(), 0, 2), Some(&[255u8, 255, 255, 255][..]));
    }

    #[test]
    fn test_clear_texture_layers() {
        let mut device = HeadlessDevice::new();
        let mut manager = ResourceManager::new();
        let texture = manager.create_texture(
            &mut device,
            TextureType::Texture2DArray,
            2,
            2,
            1,
            3,
            Format::R32Float,
            TextureFlags::empty(),
        );
        manager.clear_texture_layers(&mut device, texture, Vec4::splat(0.5), 1, 2);

        let gpu = manager.texture(texture).unwrap().gpu();
        let half = 0.5f32.to_ne_bytes().repeat(4);
        assert_eq!(device.texture_data(gpu, 0, 0), Some(&[0u8; 16][..]));
        assert_eq!(device.texture_data(gpu, 1, 0), Some(&half[..]));
        assert_eq!(device.texture_data(gpu, 2, 0), Some(&half[..]));
    }

    #[test]
    fn test_copy_texture_resolves_msaa() {
        let mut device = HeadlessDevice::new();
        let mut manager = ResourceManager::new();
        let msaa = manager.create_texture_2d(&mut device, 8, 8, Format::Rgba8Unorm, TextureFlags::MSAA_X4);
        let resolved = manager.create_texture_2d(&mut device, 8, 8, Format::Rgba8Unorm, TextureFlags::empty());
        manager.copy_texture(&mut device, resolved, msaa);
        assert!(matches!(device.commands().last(), Some(RecordedCommand::ResolveTexture { .. })));
    }

    #[test]
    fn test_sampler_per_texture() {
        let mut device = HeadlessDevice::new();
        let mut manager = ResourceManager::new();
        let a = manager.create_texture_2d(&mut device, 4, 4, Format::Rgba8Unorm, TextureFlags::empty());
        let b = manager.create_texture_2d(&mut device, 4, 4, Format::Rgba8Unorm, TextureFlags::empty());

        if let Some(sampler) = manager.sampler_mut(a) {
            sampler.set_filter(false);
        }
        assert!(!manager.texture(a).unwrap().sampler().min_filter);
        assert!(manager.texture(b).unwrap().sampler().min_filter);

        manager.delete_texture(&mut device, a);
        assert!(manager.sampler_mut(a).is_none());
    }

    #[test]
    fn test_destroy_releases_everything() {
        let mut device = HeadlessDevice::new();
        let mut manager = ResourceManager::new();
        manager.create_buffer(&mut device, BufferKind::ConstantBuffer, 256);
        manager.create_texture_2d(&mut device, 4, 4, Format::Rgba8Unorm, TextureFlags::empty());

        manager.destroy_mut(&mut device);
        assert!(manager.is_destroyed());
        assert_eq!(device.live_buffer_count(), 0);
        assert_eq!(device.live_texture_count(), 0);
    }
}
