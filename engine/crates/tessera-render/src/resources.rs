//! GPU 资源的句柄与记录
//!
//! 所有资源都存放在 [`manager::ResourceManager`] 的 arena 中，对外只暴露带 generation 的句柄，
//! 删除之后旧句柄自动失效。

pub mod handles;
pub mod manager;

use tessera_gfx::device::{FramebufferTargets, GpuAccelStructId, GpuBufferId, GpuTextureId};
use tessera_gfx::pipelines::pipeline_desc::{FramebufferInfo, PrimitiveType, VertexAttributeDesc};
use tessera_gfx::resources::resource_desc::{BufferDesc, IndexFormat, TextureDesc};
use tessera_gfx::resources::sampler_state::SamplerState;

use crate::resources::handles::{BufferHandle, TextureHandle};

bitflags::bitflags! {
    /// 创建纹理时的选项
    ///
    /// 第 4、5 位是 MSAA 的采样数：`1 << ((bits >> 4) & 3)`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureFlags: u32 {
        /// 生成完整的 mip 链
        const MIPMAPS = 1;
        /// 使用对应的 sRGB 格式（只影响由像素数据创建的纹理）
        const SRGB = 1 << 1;
        /// 使用对应的 snorm 格式（只影响由像素数据创建的纹理）
        const SNORM = 1 << 2;
        /// 可编程采样位置
        const SAMPLES_RELOCATION = 1 << 3;

        const MSAA_X2 = 1 << 4;
        const MSAA_X4 = 2 << 4;
        const MSAA_X8 = 3 << 4;
    }
}
impl TextureFlags {
    const MSAA_SHIFT: u32 = 4;

    /// `1 << samples_log2` 个采样，`samples_log2` 最大为 3
    #[inline]
    pub fn msaa(samples_log2: u32) -> Self {
        Self::from_bits_retain((samples_log2 & 3) << Self::MSAA_SHIFT)
    }

    #[inline]
    pub fn sample_count(self) -> u32 {
        1 << ((self.bits() >> Self::MSAA_SHIFT) & 3)
    }

    #[inline]
    pub fn is_msaa(self) -> bool {
        self.sample_count() > 1
    }
}

/// mesh 的一段范围：有 index 时以 index 计，否则以顶点计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeshRange {
    pub first: u32,
    pub count: u32,
}
impl MeshRange {
    #[inline]
    pub fn new(first: u32, count: u32) -> Self {
        Self { first, count }
    }
}

pub struct BufferRecord {
    pub(crate) gpu: GpuBufferId,
    pub(crate) desc: BufferDesc,
}
// getters
impl BufferRecord {
    #[inline]
    pub fn gpu(&self) -> GpuBufferId {
        self.gpu
    }
    #[inline]
    pub fn desc(&self) -> &BufferDesc {
        &self.desc
    }
    #[inline]
    pub fn byte_size(&self) -> u64 {
        self.desc.byte_size
    }
}

pub struct TextureRecord {
    pub(crate) gpu: GpuTextureId,
    pub(crate) desc: TextureDesc,
    /// 每张纹理各自的采样状态，绑定为 SRV 时使用
    pub(crate) sampler: SamplerState,
}
// getters
impl TextureRecord {
    #[inline]
    pub fn gpu(&self) -> GpuTextureId {
        self.gpu
    }
    #[inline]
    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }
    #[inline]
    pub fn sampler(&self) -> &SamplerState {
        &self.sampler
    }
}

pub struct MeshRecord {
    pub(crate) primitive: PrimitiveType,
    pub(crate) nb_indices: u32,
    pub(crate) nb_vertices: u32,
    /// 没有 index 时为 null
    pub(crate) index_buffer: BufferHandle,
    pub(crate) index_format: IndexFormat,
    /// 第 i 个属性使用第 i 个 vertex buffer
    pub(crate) attributes: Vec<VertexAttributeDesc>,
    pub(crate) attrib_buffers: Vec<BufferHandle>,
}
// getters
impl MeshRecord {
    #[inline]
    pub fn primitive(&self) -> PrimitiveType {
        self.primitive
    }
    #[inline]
    pub fn nb_indices(&self) -> u32 {
        self.nb_indices
    }
    #[inline]
    pub fn nb_vertices(&self) -> u32 {
        self.nb_vertices
    }
    #[inline]
    pub fn index_buffer(&self) -> BufferHandle {
        self.index_buffer
    }
    #[inline]
    pub fn index_format(&self) -> IndexFormat {
        self.index_format
    }
    #[inline]
    pub fn attributes(&self) -> &[VertexAttributeDesc] {
        &self.attributes
    }
    #[inline]
    pub fn attrib_buffers(&self) -> &[BufferHandle] {
        &self.attrib_buffers
    }
    #[inline]
    pub fn has_indices(&self) -> bool {
        !self.index_buffer.is_null()
    }
}

pub struct FramebufferRecord {
    pub(crate) targets: FramebufferTargets,
    /// 有深度附件时才存在，深度写入关闭时使用
    pub(crate) read_only_targets: Option<FramebufferTargets>,
    pub(crate) info: FramebufferInfo,
    /// 创建时使用的纹理，包括深度纹理
    pub(crate) attachments: Vec<TextureHandle>,
}
// getters
impl FramebufferRecord {
    #[inline]
    pub fn attachments(&self) -> &[TextureHandle] {
        &self.attachments
    }

    #[inline]
    pub fn info(&self) -> &FramebufferInfo {
        &self.info
    }

    /// 按深度写入开关选择渲染目标
    #[inline]
    pub fn targets(&self, depth_write_enable: bool) -> &FramebufferTargets {
        match (&self.read_only_targets, depth_write_enable) {
            (Some(read_only), false) => read_only,
            _ => &self.targets,
        }
    }
}

pub struct AccelStructRecord {
    pub(crate) gpu: GpuAccelStructId,
}
// getters
impl AccelStructRecord {
    #[inline]
    pub fn gpu(&self) -> GpuAccelStructId {
        self.gpu
    }
}
