//! 作用域内的资源与渲染状态
//!
//! guard 持有 `&mut RenderContext`，并解引用为它，因此作用域内仍然可以正常调用上下文的方法。

use std::ops::{Deref, DerefMut};

use tessera_gfx::device::GfxDevice;

use crate::context::RenderContext;
use crate::resources::handles::{
    AccelStructHandle, BufferHandle, FramebufferHandle, MeshHandle, ShaderHandle, TextureHandle,
};

/// 可以由 [`RenderContext`] 删除的句柄
pub trait ScopedResource<D: GfxDevice>: Copy {
    fn delete(self, ctx: &mut RenderContext<D>);
}

macro_rules! impl_scoped_resource {
    ($handle:ty, $delete:ident) => {
        impl<D: GfxDevice> ScopedResource<D> for $handle {
            #[inline]
            fn delete(self, ctx: &mut RenderContext<D>) {
                ctx.$delete(self);
            }
        }
    };
}

impl_scoped_resource!(ShaderHandle, delete_shader);
impl_scoped_resource!(BufferHandle, delete_buffer);
impl_scoped_resource!(TextureHandle, delete_texture);
impl_scoped_resource!(MeshHandle, delete_mesh);
impl_scoped_resource!(FramebufferHandle, delete_framebuffer);
impl_scoped_resource!(AccelStructHandle, delete_acceleration_structure);

/// drop 时删除 `handle`
pub struct Scoped<'a, D: GfxDevice, H: ScopedResource<D>> {
    ctx: &'a mut RenderContext<D>,
    handle: H,
}
impl<'a, D: GfxDevice, H: ScopedResource<D>> Scoped<'a, D, H> {
    #[inline]
    pub fn new(ctx: &'a mut RenderContext<D>, handle: H) -> Self {
        Self { ctx, handle }
    }

    #[inline]
    pub fn handle(&self) -> H {
        self.handle
    }
}
impl<D: GfxDevice, H: ScopedResource<D>> Deref for Scoped<'_, D, H> {
    type Target = RenderContext<D>;

    fn deref(&self) -> &Self::Target {
        &*self.ctx
    }
}
impl<D: GfxDevice, H: ScopedResource<D>> DerefMut for Scoped<'_, D, H> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.ctx
    }
}
impl<D: GfxDevice, H: ScopedResource<D>> Drop for Scoped<'_, D, H> {
    fn drop(&mut self) {
        self.handle.delete(self.ctx);
    }
}

/// 创建时 push 渲染状态，drop 时 pop
pub struct RenderStateScope<'a, D: GfxDevice> {
    ctx: &'a mut RenderContext<D>,
}
impl<'a, D: GfxDevice> RenderStateScope<'a, D> {
    pub fn new(ctx: &'a mut RenderContext<D>) -> Self {
        ctx.push_render_state();
        Self { ctx }
    }
}
impl<D: GfxDevice> Deref for RenderStateScope<'_, D> {
    type Target = RenderContext<D>;

    fn deref(&self) -> &Self::Target {
        &*self.ctx
    }
}
impl<D: GfxDevice> DerefMut for RenderStateScope<'_, D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.ctx
    }
}
impl<D: GfxDevice> Drop for RenderStateScope<'_, D> {
    fn drop(&mut self) {
        self.ctx.pop_render_state();
    }
}

// scoped
impl<D: GfxDevice> RenderContext<D> {
    #[inline]
    pub fn scoped_shader(&mut self, shader: ShaderHandle) -> Scoped<'_, D, ShaderHandle> {
        Scoped::new(self, shader)
    }
    #[inline]
    pub fn scoped_buffer(&mut self, buffer: BufferHandle) -> Scoped<'_, D, BufferHandle> {
        Scoped::new(self, buffer)
    }
    #[inline]
    pub fn scoped_texture(&mut self, texture: TextureHandle) -> Scoped<'_, D, TextureHandle> {
        Scoped::new(self, texture)
    }
    #[inline]
    pub fn scoped_mesh(&mut self, mesh: MeshHandle) -> Scoped<'_, D, MeshHandle> {
        Scoped::new(self, mesh)
    }
    #[inline]
    pub fn scoped_framebuffer(&mut self, framebuffer: FramebufferHandle) -> Scoped<'_, D, FramebufferHandle> {
        Scoped::new(self, framebuffer)
    }
    #[inline]
    pub fn scoped_acceleration_structure(
        &mut self,
        accel_struct: AccelStructHandle,
    ) -> Scoped<'_, D, AccelStructHandle> {
        Scoped::new(self, accel_struct)
    }

    #[inline]
    pub fn scoped_render_state(&mut self) -> RenderStateScope<'_, D> {
        RenderStateScope::new(self)
    }
}
