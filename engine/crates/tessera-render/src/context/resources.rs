use glam::Vec4;
use log::Level;
use tessera_gfx::basic::format::Format;
use tessera_gfx::device::GfxDevice;
use tessera_gfx::pipelines::pipeline_desc::PrimitiveType;
use tessera_gfx::resources::resource_desc::{BufferKind, TextureType};
use tessera_gfx::resources::sampler_state::SamplerState;

use super::RenderContext;
use crate::resources::handles::{AccelStructHandle, BufferHandle, FramebufferHandle, MeshHandle, TextureHandle};
use crate::resources::{MeshRange, TextureFlags};

// buffer
impl<D: GfxDevice> RenderContext<D> {
    #[inline]
    pub fn create_buffer(&mut self, kind: BufferKind, size: u64) -> BufferHandle {
        self.resources.create_buffer(&mut self.device, kind, size)
    }

    #[inline]
    pub fn create_staging_buffer(&mut self, size: u64) -> BufferHandle {
        self.resources.create_staging_buffer(&mut self.device, size)
    }

    /// 同时从挂载了它的 shader 中移除
    pub fn delete_buffer(&mut self, buffer: BufferHandle) {
        if self.resources.buffer(buffer).is_none() {
            return;
        }
        self.shaders.values_mut().for_each(|shader| shader.detach_buffer(buffer));
        self.resources.delete_buffer(&mut self.device, buffer);
    }

    #[inline]
    pub fn set_buffer_data(&mut self, buffer: BufferHandle, data: &[u8]) {
        self.resources.set_buffer_data(&mut self.device, buffer, data);
    }

    #[inline]
    pub fn copy_buffer(&mut self, dst: BufferHandle, src: BufferHandle) {
        self.resources.copy_buffer(&mut self.device, dst, src);
    }

    /// 阻塞式回读
    #[inline]
    pub fn map_buffer(&mut self, buffer: BufferHandle) -> Vec<u8> {
        self.resources.map_buffer(&mut self.device, buffer)
    }
}
// texture
impl<D: GfxDevice> RenderContext<D> {
    #[allow(clippy::too_many_arguments)]
    #[inline]
    pub fn create_texture(
        &mut self,
        texture_type: TextureType,
        width: u32,
        height: u32,
        depth: u32,
        layers: u32,
        format: Format,
        flags: TextureFlags,
    ) -> TextureHandle {
        self.resources.create_texture(&mut self.device, texture_type, width, height, depth, layers, format, flags)
    }

    #[inline]
    pub fn create_texture_1d(&mut self, size: u32, format: Format, flags: TextureFlags) -> TextureHandle {
        self.resources.create_texture_1d(&mut self.device, size, format, flags)
    }

    #[inline]
    pub fn create_texture_2d(&mut self, width: u32, height: u32, format: Format, flags: TextureFlags) -> TextureHandle {
        self.resources.create_texture_2d(&mut self.device, width, height, format, flags)
    }

    #[inline]
    pub fn create_texture_3d(
        &mut self,
        width: u32,
        height: u32,
        depth: u32,
        format: Format,
        flags: TextureFlags,
    ) -> TextureHandle {
        self.resources.create_texture_3d(&mut self.device, width, height, depth, format, flags)
    }

    #[inline]
    pub fn create_texture_2d_with_data(
        &mut self,
        width: u32,
        height: u32,
        format: Format,
        flags: TextureFlags,
        data: &[u8],
    ) -> TextureHandle {
        self.resources.create_texture_2d_with_data(&mut self.device, width, height, format, flags, data)
    }

    /// 同时从挂载了它的 shader 中移除；以它为附件的 framebuffer 之后不能再绘制
    pub fn delete_texture(&mut self, texture: TextureHandle) {
        if self.resources.texture(texture).is_none() {
            return;
        }
        self.shaders.values_mut().for_each(|shader| shader.detach_texture(texture));
        self.resources.delete_texture(&mut self.device, texture);
    }

    #[inline]
    pub fn set_texture_data(&mut self, texture: TextureHandle, data: &[u8]) {
        self.resources.set_texture_data(&mut self.device, texture, data);
    }

    #[inline]
    pub fn set_texture_layer_data(&mut self, texture: TextureHandle, layer: u32, data: &[u8]) {
        self.resources.set_texture_layer_data(&mut self.device, texture, layer, data);
    }

    #[inline]
    pub fn clear_texture(&mut self, texture: TextureHandle, color: Vec4) {
        self.resources.clear_texture(&mut self.device, texture, color);
    }

    #[inline]
    pub fn clear_texture_layers(&mut self, texture: TextureHandle, color: Vec4, first: u32, count: u32) {
        self.resources.clear_texture_layers(&mut self.device, texture, color, first, count);
    }

    /// 采样数不同时执行 resolve
    #[inline]
    pub fn copy_texture(&mut self, dst: TextureHandle, src: TextureHandle) {
        self.resources.copy_texture(&mut self.device, dst, src);
    }

    #[inline]
    pub fn update_mipmaps(&mut self, texture: TextureHandle) {
        self.resources.update_mipmaps(&mut self.device, texture);
    }

    #[inline]
    pub fn map_texture(&mut self, texture: TextureHandle) -> Vec<u8> {
        self.resources.map_texture(&mut self.device, texture)
    }

    /// 已绑定该纹理的 shader 需要重新设置 uniform 才会使用新的采样器
    #[inline]
    pub fn sampler_mut(&mut self, texture: TextureHandle) -> Option<&mut SamplerState> {
        self.resources.sampler_mut(texture)
    }
}
// framebuffer
impl<D: GfxDevice> RenderContext<D> {
    #[inline]
    pub fn create_framebuffer(&mut self, colors: &[TextureHandle], depth: TextureHandle) -> FramebufferHandle {
        self.resources.create_framebuffer(colors, depth)
    }

    #[inline]
    pub fn create_framebuffer_mip(&mut self, colors: &[TextureHandle], depth: TextureHandle, mip: u32) -> FramebufferHandle {
        self.resources.create_framebuffer_mip(colors, depth, mip)
    }

    #[inline]
    pub fn create_empty_framebuffer(&mut self, width: u32, height: u32) -> FramebufferHandle {
        self.resources.create_empty_framebuffer(width, height)
    }

    /// 删除当前 framebuffer 时同时清空当前 framebuffer
    pub fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if self.resources.delete_framebuffer(framebuffer) && self.current_framebuffer == framebuffer {
            self.current_framebuffer = FramebufferHandle::null();
        }
    }

    #[inline]
    pub fn current_framebuffer(&self) -> FramebufferHandle {
        self.current_framebuffer
    }

    /// 设置当前 framebuffer，并把当前渲染状态的 viewport 与 scissor 调整为它的尺寸
    pub fn use_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        let Some(record) = self.resources.framebuffer(framebuffer) else {
            context_log!(self, Level::Error, "Using an invalid framebuffer");
            return;
        };
        let (width, height) = (record.info().width, record.info().height);
        self.current_framebuffer = framebuffer;

        let state = self.render_states.current_mut();
        state.viewport.max_x = width as f32;
        state.viewport.max_y = height as f32;
        state.scissor.max_x = width as i32;
        state.scissor.max_y = height as i32;
    }
}
// mesh
impl<D: GfxDevice> RenderContext<D> {
    #[inline]
    pub fn create_mesh(&mut self, primitive: PrimitiveType) -> MeshHandle {
        self.resources.create_mesh(primitive)
    }

    /// mesh 持有的 buffer 可能作为 storage buffer 挂载在 shader 上
    pub fn delete_mesh(&mut self, mesh: MeshHandle) {
        let Some(record) = self.resources.mesh(mesh) else {
            return;
        };
        let owned: Vec<BufferHandle> =
            std::iter::once(record.index_buffer()).chain(record.attrib_buffers().iter().copied()).collect();
        for buffer in owned.into_iter().filter(|buffer| !buffer.is_null()) {
            self.shaders.values_mut().for_each(|shader| shader.detach_buffer(buffer));
        }
        self.resources.delete_mesh(&mut self.device, mesh);
    }

    #[inline]
    pub fn set_mesh_indices(&mut self, mesh: MeshHandle, indices: &[u32]) {
        self.resources.set_mesh_indices(&mut self.device, mesh, indices);
    }

    #[inline]
    pub fn set_mesh_indices16(&mut self, mesh: MeshHandle, indices: &[u16]) {
        self.resources.set_mesh_indices16(&mut self.device, mesh, indices);
    }

    #[inline]
    pub fn add_mesh_attrib(&mut self, mesh: MeshHandle, format: Format, instanced: bool, data: Option<&[u8]>, count: u32) {
        self.resources.add_mesh_attrib(&mut self.device, mesh, format, instanced, data, count);
    }

    #[inline]
    pub fn mesh_index_buffer(&self, mesh: MeshHandle) -> BufferHandle {
        self.resources.index_buffer(mesh)
    }

    #[inline]
    pub fn mesh_attrib_buffer(&self, mesh: MeshHandle, index: usize) -> BufferHandle {
        self.resources.attrib_buffer(mesh, index)
    }

    #[inline]
    pub fn mesh_nb_indices(&self, mesh: MeshHandle) -> u32 {
        self.resources.nb_indices(mesh)
    }

    #[inline]
    pub fn mesh_nb_vertices(&self, mesh: MeshHandle) -> u32 {
        self.resources.nb_vertices(mesh)
    }

    #[inline]
    pub fn create_unit_cube_patch(&mut self) -> MeshHandle {
        self.resources.create_unit_cube_patch(&mut self.device)
    }
}
// acceleration structure
impl<D: GfxDevice> RenderContext<D> {
    pub fn create_acceleration_structure(&mut self, mesh: MeshHandle, updatable: bool) -> AccelStructHandle {
        if !self.settings.raytracing {
            context_log!(self, Level::Error, "Creation of an acceleration structure while raytracing is disabled.");
            return AccelStructHandle::null();
        }
        self.resources.create_acceleration_structure(&mut self.device, mesh, updatable)
    }

    /// 每个 range 是 BLAS 中的一段几何
    pub fn create_multi_acceleration_structure(
        &mut self,
        mesh: MeshHandle,
        ranges: &[MeshRange],
        updatable: bool,
    ) -> AccelStructHandle {
        if !self.settings.raytracing {
            context_log!(self, Level::Error, "Creation of an acceleration structure while raytracing is disabled.");
            return AccelStructHandle::null();
        }
        self.resources.create_multi_acceleration_structure(&mut self.device, mesh, ranges, updatable)
    }

    #[inline]
    pub fn update_acceleration_structure(&mut self, accel_struct: AccelStructHandle, mesh: MeshHandle, ranges: &[MeshRange]) {
        self.resources.update_acceleration_structure(&mut self.device, accel_struct, mesh, ranges);
    }

    pub fn delete_acceleration_structure(&mut self, accel_struct: AccelStructHandle) {
        if self.resources.accel_struct(accel_struct).is_none() {
            return;
        }
        self.shaders.values_mut().for_each(|shader| shader.detach_accel_struct(accel_struct));
        self.resources.delete_acceleration_structure(&mut self.device, accel_struct);
    }
}

#[cfg(test)]
mod tests {
    use tessera_crate_tools::shader_source::MemoryShaderSource;
    use tessera_gfx::headless::HeadlessDevice;
    use tessera_gfx::pipelines::pipeline_desc::ShaderStage;

    use super::*;
    use crate::context::tests::headless_context;
    use crate::settings::ContextSettings;
    use crate::test_utils::SpirvAssembler;

    #[test]
    fn test_use_framebuffer_resizes_viewport() {
        let mut ctx = headless_context(MemoryShaderSource::new());
        let color = ctx.create_texture_2d(1024, 512, Format::Rgba8Unorm, TextureFlags::empty());
        let fb = ctx.create_framebuffer(&[color], TextureHandle::null());

        ctx.use_framebuffer(fb);
        assert_eq!(ctx.current_framebuffer(), fb);
        assert_eq!(ctx.render_state().viewport.max_x, 1024.0);
        assert_eq!(ctx.render_state().viewport.max_y, 512.0);
        assert_eq!(ctx.render_state().scissor.max_x, 1024);
        assert_eq!(ctx.render_state().scissor.max_y, 512);

        // 无效句柄不改变当前 framebuffer
        ctx.use_framebuffer(FramebufferHandle::null());
        assert_eq!(ctx.current_framebuffer(), fb);

        ctx.delete_framebuffer(fb);
        assert!(ctx.current_framebuffer().is_null());
        // framebuffer 不持有附件
        assert!(ctx.resources().texture(color).is_some());
    }

    #[test]
    fn test_deleted_handles_are_rejected() {
        let mut ctx = headless_context(MemoryShaderSource::new());
        let buffer = ctx.create_buffer(BufferKind::ConstantBuffer, 64);
        ctx.delete_buffer(buffer);
        ctx.delete_buffer(buffer);
        assert!(ctx.resources().buffer(buffer).is_none());
        assert!(ctx.map_buffer(buffer).is_empty());

        // 同一个槽位被复用时旧句柄仍然无效
        let other = ctx.create_buffer(BufferKind::ConstantBuffer, 64);
        assert_ne!(other, buffer);
        assert!(ctx.resources().buffer(buffer).is_none());
        assert_eq!(ctx.device().live_buffer_count(), 1);
    }

    #[test]
    fn test_acceleration_structure_requires_raytracing() {
        let mut ctx = headless_context(MemoryShaderSource::new());
        let mesh = ctx.create_unit_cube_patch();
        assert!(ctx.create_acceleration_structure(mesh, false).is_null());
        assert_eq!(ctx.device().live_accel_struct_count(), 0);

        let mut ctx = RenderContext::with_shader_source(
            HeadlessDevice::new(),
            ContextSettings {
                raytracing: true,
                ..Default::default()
            },
            Box::new(MemoryShaderSource::new()),
        );
        let mesh = ctx.create_unit_cube_patch();
        let accel_struct = ctx.create_acceleration_structure(mesh, true);
        assert!(!accel_struct.is_null());
        assert_eq!(ctx.device().live_accel_struct_count(), 1);

        ctx.delete_acceleration_structure(accel_struct);
        assert_eq!(ctx.device().live_accel_struct_count(), 0);
    }

    #[test]
    fn test_deleting_attached_resources_detaches_them() {
        let mut asm = SpirvAssembler::new(ShaderStage::Compute);
        asm.accel_struct("scene", 0)
            .storage_buffer("vertices", "Vertices", 1)
            .storage_buffer("indices", "Indices", 2);
        let bytes = asm.to_bytes();
        let mut ctx = RenderContext::with_shader_source(
            HeadlessDevice::new(),
            ContextSettings {
                raytracing: true,
                ..Default::default()
            },
            Box::new(MemoryShaderSource::new()),
        );
        let shader = ctx.create_compute_shader(&bytes);
        let mesh = ctx.create_unit_cube_patch();
        let accel_struct = ctx.create_acceleration_structure(mesh, false);
        let vertices = ctx.create_buffer(BufferKind::UnorderedAccess, 64);

        ctx.use_shader(shader);
        ctx.set_uniform_acceleration_structure(accel_struct);
        ctx.set_uniform_buffer(vertices, "vertices");
        let index_buffer = ctx.mesh_index_buffer(mesh);
        ctx.set_uniform_buffer(index_buffer, "indices");
        ctx.dispatch_1d(64);
        assert!(!ctx.shader(shader).unwrap().binding_state().needs_rebuild());

        ctx.delete_buffer(vertices);
        let layout = ctx.shader(shader).unwrap().layout();
        assert!(layout.buffers.iter().find(|slot| slot.name == "vertices").unwrap().buffer.is_null());
        assert!(ctx.shader(shader).unwrap().binding_state().needs_rebuild());
        ctx.dispatch_1d(64);

        // mesh 持有的 index buffer 随 mesh 一起删除
        ctx.delete_acceleration_structure(accel_struct);
        ctx.delete_mesh(mesh);
        let layout = ctx.shader(shader).unwrap().layout();
        assert!(layout.buffers.iter().all(|slot| slot.buffer.is_null()));
        assert!(layout.accel_struct.as_ref().unwrap().accel_struct.is_null());
        assert!(ctx.shader(shader).unwrap().binding_state().needs_rebuild());
    }
}
