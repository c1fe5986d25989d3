use crate::basic::format::Format;
use crate::device::GpuBufferId;

/// buffer 的主要用途，决定其 usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    ConstantBuffer,
    VertexBuffer,
    IndexBuffer,
    IndirectArgument,
    UnorderedAccess,
    /// CPU 可读的回读 buffer
    Staging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferDesc {
    pub byte_size: u64,
    pub kind: BufferKind,
}
impl BufferDesc {
    #[inline]
    pub fn new(kind: BufferKind, byte_size: u64) -> Self {
        Self { byte_size, kind }
    }

    #[inline]
    pub fn is_cpu_readable(&self) -> bool {
        self.kind == BufferKind::Staging
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureType {
    Texture1D,
    Texture1DArray,
    Texture2D,
    Texture2DArray,
    TextureCube,
    TextureCubeArray,
    Texture2DMS,
    Texture2DMSArray,
    Texture3D,
}
impl TextureType {
    #[inline]
    pub fn is_cube(self) -> bool {
        matches!(self, TextureType::TextureCube | TextureType::TextureCubeArray)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub texture_type: TextureType,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub array_size: u32,
    pub mip_levels: u32,
    pub sample_count: u32,
    pub sample_quality: u32,
    pub format: Format,
    pub is_uav: bool,
    pub is_render_target: bool,
    pub debug_name: String,
}
impl TextureDesc {
    /// 某一层 mip 的尺寸
    pub fn mip_extent(&self, mip: u32) -> (u32, u32, u32) {
        (
            (self.width >> mip).max(1),
            (self.height >> mip).max(1),
            (self.depth >> mip).max(1),
        )
    }

    /// 一个 array layer 在 mip 0 上的字节数
    #[inline]
    pub fn layer_byte_size(&self) -> u64 {
        self.format.slice_pitch(self.width, self.height) * self.depth as u64
    }
}

/// 纹理的子资源范围；`count` 为 [`TextureSubresourceSet::ALL`] 时表示直到末尾
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSubresourceSet {
    pub base_mip_level: u32,
    pub num_mip_levels: u32,
    pub base_array_slice: u32,
    pub num_array_slices: u32,
}
impl TextureSubresourceSet {
    pub const ALL: u32 = !0;

    pub const fn new(base_mip_level: u32, num_mip_levels: u32, base_array_slice: u32, num_array_slices: u32) -> Self {
        Self {
            base_mip_level,
            num_mip_levels,
            base_array_slice,
            num_array_slices,
        }
    }

    pub const fn all() -> Self {
        Self::new(0, Self::ALL, 0, Self::ALL)
    }

    /// 根据纹理的实际 mip 与 layer 数量，将 `ALL` 展开为具体数量
    pub fn resolve(&self, desc: &TextureDesc) -> Self {
        let base_mip = self.base_mip_level.min(desc.mip_levels.saturating_sub(1));
        let base_slice = self.base_array_slice.min(desc.array_size.saturating_sub(1));
        let max_mips = desc.mip_levels - base_mip;
        let max_slices = desc.array_size - base_slice;
        Self {
            base_mip_level: base_mip,
            num_mip_levels: self.num_mip_levels.min(max_mips),
            base_array_slice: base_slice,
            num_array_slices: self.num_array_slices.min(max_slices),
        }
    }
}
impl Default for TextureSubresourceSet {
    fn default() -> Self {
        Self::new(0, 1, 0, 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    U16,
    U32,
}
impl IndexFormat {
    #[inline]
    pub fn size(self) -> u32 {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccelStructBuildFlags: u8 {
        const ALLOW_UPDATE = 1;
        const ALLOW_COMPACTION = 2;
        const PREFER_FAST_TRACE = 4;
        const PREFER_FAST_BUILD = 8;
        const ALLOW_DATA_ACCESS = 16;
    }
}

/// BLAS 中的一段三角形几何
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryTriangles {
    pub vertex_buffer: GpuBufferId,
    pub vertex_format: Format,
    pub vertex_stride: u32,
    pub vertex_offset: u64,
    pub vertex_count: u32,

    pub index_buffer: Option<GpuBufferId>,
    pub index_format: IndexFormat,
    pub index_offset: u64,
    pub index_count: u32,
}

/// 一个 BLAS（多段几何）以及引用它的单实例 TLAS
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccelStructDesc {
    pub geometries: Vec<GeometryTriangles>,
    pub build_flags: AccelStructBuildFlags,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc_2d(width: u32, height: u32, mips: u32, layers: u32) -> TextureDesc {
        TextureDesc {
            texture_type: TextureType::Texture2DArray,
            width,
            height,
            depth: 1,
            array_size: layers,
            mip_levels: mips,
            sample_count: 1,
            sample_quality: 0,
            format: Format::Rgba8Unorm,
            is_uav: true,
            is_render_target: true,
            debug_name: "test".to_string(),
        }
    }

    #[test]
    fn test_subresource_resolve() {
        let desc = desc_2d(256, 256, 9, 4);

        let all = TextureSubresourceSet::all().resolve(&desc);
        assert_eq!(all, TextureSubresourceSet::new(0, 9, 0, 4));

        // 从第 3 层 mip 开始，直到末尾
        let tail = TextureSubresourceSet::new(3, TextureSubresourceSet::ALL, 1, 2).resolve(&desc);
        assert_eq!(tail, TextureSubresourceSet::new(3, 6, 1, 2));
    }

    #[test]
    fn test_mip_extent() {
        let desc = desc_2d(100, 30, 7, 1);
        assert_eq!(desc.mip_extent(0), (100, 30, 1));
        assert_eq!(desc.mip_extent(5), (3, 1, 1));
        assert_eq!(desc.layer_byte_size(), 100 * 30 * 4);
    }
}
