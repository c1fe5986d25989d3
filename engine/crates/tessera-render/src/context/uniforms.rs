use glam::{IVec4, Mat3, Mat4, Vec4};
use log::Level;
use tessera_gfx::device::GfxDevice;
use tessera_gfx::resources::resource_desc::TextureSubresourceSet;

use super::RenderContext;
use crate::resources::handles::{AccelStructHandle, BufferHandle, TextureHandle};
use crate::shader::UniformWriteError;

/// 1 到 4 个分量的标量 uniform
macro_rules! scalar_uniform_setters {
    ($ty:ty, $set1:ident, $set2:ident, $set3:ident, $set4:ident) => {
        #[inline]
        pub fn $set1(&mut self, x: $ty, name: &str) {
            self.set_uniform_bytes(bytemuck::bytes_of(&x), name);
        }
        #[inline]
        pub fn $set2(&mut self, x: $ty, y: $ty, name: &str) {
            self.set_uniform_bytes(bytemuck::cast_slice(&[x, y]), name);
        }
        #[inline]
        pub fn $set3(&mut self, x: $ty, y: $ty, z: $ty, name: &str) {
            self.set_uniform_bytes(bytemuck::cast_slice(&[x, y, z]), name);
        }
        #[inline]
        pub fn $set4(&mut self, x: $ty, y: $ty, z: $ty, w: $ty, name: &str) {
            self.set_uniform_bytes(bytemuck::cast_slice(&[x, y, z, w]), name);
        }
    };
}

// uniform
impl<D: GfxDevice> RenderContext<D> {
    /// 写入当前 shader 中所有名为 `name` 的 uniform
    ///
    /// 数据只写入 staging，下一次 draw / dispatch 时才提交到 GPU
    pub fn set_uniform_bytes(&mut self, data: &[u8], name: &str) {
        let Some(shader) = self.shaders.get_mut(self.current_shader.inner) else {
            context_log!(self, Level::Error, "Setting an uniform to an invalid shader");
            return;
        };
        match shader.write_uniform(name, data) {
            Ok(()) => (),
            Err(UniformWriteError::NotFound) => context_log!(self, Level::Warn, "Uniform \"{name}\" not found"),
            Err(UniformWriteError::SizeMismatch) => {
                context_log!(self, Level::Error, "Uniform size mismatch (\"{name}\", {} bytes)", data.len())
            }
        }
    }

    scalar_uniform_setters!(f32, set_uniform_1f, set_uniform_2f, set_uniform_3f, set_uniform_4f);
    scalar_uniform_setters!(f64, set_uniform_1d, set_uniform_2d, set_uniform_3d, set_uniform_4d);
    scalar_uniform_setters!(i16, set_uniform_1s, set_uniform_2s, set_uniform_3s, set_uniform_4s);
    scalar_uniform_setters!(i32, set_uniform_1i, set_uniform_2i, set_uniform_3i, set_uniform_4i);
    scalar_uniform_setters!(i64, set_uniform_1l, set_uniform_2l, set_uniform_3l, set_uniform_4l);

    /// 只使用前 `n` 个分量
    fn set_uniform_vec4_prefix(&mut self, v: Vec4, n: usize, name: &str) {
        self.set_uniform_bytes(bytemuck::cast_slice(&v.to_array()[..n]), name);
    }

    fn set_uniform_ivec4_prefix(&mut self, v: IVec4, n: usize, name: &str) {
        self.set_uniform_bytes(bytemuck::cast_slice(&v.to_array()[..n]), name);
    }

    #[inline]
    pub fn set_uniform_1fv(&mut self, v: Vec4, name: &str) {
        self.set_uniform_vec4_prefix(v, 1, name);
    }
    #[inline]
    pub fn set_uniform_2fv(&mut self, v: Vec4, name: &str) {
        self.set_uniform_vec4_prefix(v, 2, name);
    }
    #[inline]
    pub fn set_uniform_3fv(&mut self, v: Vec4, name: &str) {
        self.set_uniform_vec4_prefix(v, 3, name);
    }
    #[inline]
    pub fn set_uniform_4fv(&mut self, v: Vec4, name: &str) {
        self.set_uniform_vec4_prefix(v, 4, name);
    }

    #[inline]
    pub fn set_uniform_1iv(&mut self, v: IVec4, name: &str) {
        self.set_uniform_ivec4_prefix(v, 1, name);
    }
    #[inline]
    pub fn set_uniform_2iv(&mut self, v: IVec4, name: &str) {
        self.set_uniform_ivec4_prefix(v, 2, name);
    }
    #[inline]
    pub fn set_uniform_3iv(&mut self, v: IVec4, name: &str) {
        self.set_uniform_ivec4_prefix(v, 3, name);
    }
    #[inline]
    pub fn set_uniform_4iv(&mut self, v: IVec4, name: &str) {
        self.set_uniform_ivec4_prefix(v, 4, name);
    }

    /// 按列写入左上角的 3x3
    pub fn set_uniform_mat3(&mut self, m: Mat4, name: &str) {
        self.set_uniform_bytes(bytemuck::cast_slice(&Mat3::from_mat4(m).to_cols_array()), name);
    }

    pub fn set_uniform_mat4(&mut self, m: Mat4, name: &str) {
        self.set_uniform_bytes(bytemuck::cast_slice(&m.to_cols_array()), name);
    }
}
// attachments
impl<D: GfxDevice> RenderContext<D> {
    /// 绑定纹理的一段 mip 与 layer；storage image 只使用 `mip` 这一层
    ///
    /// `nb_mips` 与 `nb_layers` 可以是 [`TextureSubresourceSet::ALL`]
    pub fn set_uniform_texture_view(
        &mut self,
        texture: TextureHandle,
        mip: u32,
        nb_mips: u32,
        layer: u32,
        nb_layers: u32,
        name: &str,
    ) {
        if self.resources.texture(texture).is_none() {
            context_log!(self, Level::Warn, "Setting an invalid uniform texture (\"{name}\")");
            return;
        }
        let Some(shader) = self.shaders.get_mut(self.current_shader.inner) else {
            context_log!(self, Level::Error, "Setting an uniform texture to an invalid shader");
            return;
        };
        let view = TextureSubresourceSet::new(mip, nb_mips, layer, nb_layers);
        if !shader.attach_texture(name, texture, view) {
            context_log!(self, Level::Warn, "Uniform \"{name}\" not found");
        }
    }

    #[inline]
    pub fn set_uniform_texture_mip(&mut self, texture: TextureHandle, mip: u32, name: &str) {
        self.set_uniform_texture_view(texture, mip, 1, 0, TextureSubresourceSet::ALL, name);
    }

    #[inline]
    pub fn set_uniform_texture(&mut self, texture: TextureHandle, name: &str) {
        self.set_uniform_texture_view(texture, 0, TextureSubresourceSet::ALL, 0, TextureSubresourceSet::ALL, name);
    }

    pub fn set_uniform_buffer(&mut self, buffer: BufferHandle, name: &str) {
        if self.resources.buffer(buffer).is_none() {
            context_log!(self, Level::Warn, "Setting an invalid uniform buffer (\"{name}\")");
            return;
        }
        let Some(shader) = self.shaders.get_mut(self.current_shader.inner) else {
            context_log!(self, Level::Error, "Setting an uniform buffer to an invalid shader");
            return;
        };
        if !shader.attach_buffer(name, buffer) {
            context_log!(self, Level::Warn, "Uniform \"{name}\" not found");
        }
    }

    /// 每个 shader 只有一个加速结构的槽位，不需要名字
    pub fn set_uniform_acceleration_structure(&mut self, accel_struct: AccelStructHandle) {
        if self.resources.accel_struct(accel_struct).is_none() {
            context_log!(self, Level::Warn, "Setting an invalid acceleration structure");
            return;
        }
        let Some(shader) = self.shaders.get_mut(self.current_shader.inner) else {
            context_log!(self, Level::Error, "Setting an acceleration structure to an invalid shader");
            return;
        };
        if !shader.attach_accel_struct(accel_struct) {
            context_log!(self, Level::Warn, "Shader '{}' has no acceleration structure", shader.name());
        }
    }
}
