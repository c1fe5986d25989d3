/// 格式的基本信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    pub format: Format,
    pub name: &'static str,
    /// 每个元素的字节数；对于块压缩格式，是一个块的字节数
    pub bytes_per_block: u32,
    /// 块压缩格式为 4，其他为 1
    pub block_size: u32,
    pub has_depth: bool,
    pub has_stencil: bool,
}

macro_rules! define_formats {
    ($($variant:ident => ($name:literal, $bytes:literal, $block:literal, $depth:literal, $stencil:literal)),* $(,)?) => {
        /// 纹理、顶点属性以及 index 使用的数据格式
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub enum Format {
            #[default]
            Unknown,
            $($variant,)*
        }

        impl Format {
            /// 所有已知格式（不含 Unknown）
            pub const ALL: &'static [Format] = &[$(Format::$variant,)*];

            pub fn info(self) -> FormatInfo {
                match self {
                    Format::Unknown => FormatInfo {
                        format: Format::Unknown,
                        name: "UNKNOWN",
                        bytes_per_block: 0,
                        block_size: 0,
                        has_depth: false,
                        has_stencil: false,
                    },
                    $(Format::$variant => FormatInfo {
                        format: Format::$variant,
                        name: $name,
                        bytes_per_block: $bytes,
                        block_size: $block,
                        has_depth: $depth,
                        has_stencil: $stencil,
                    },)*
                }
            }
        }
    };
}

define_formats! {
    R8Uint => ("R8_UINT", 1, 1, false, false),
    R8Sint => ("R8_SINT", 1, 1, false, false),
    R8Unorm => ("R8_UNORM", 1, 1, false, false),
    R8Snorm => ("R8_SNORM", 1, 1, false, false),
    Rg8Uint => ("RG8_UINT", 2, 1, false, false),
    Rg8Sint => ("RG8_SINT", 2, 1, false, false),
    Rg8Unorm => ("RG8_UNORM", 2, 1, false, false),
    Rg8Snorm => ("RG8_SNORM", 2, 1, false, false),
    R16Uint => ("R16_UINT", 2, 1, false, false),
    R16Sint => ("R16_SINT", 2, 1, false, false),
    R16Unorm => ("R16_UNORM", 2, 1, false, false),
    R16Snorm => ("R16_SNORM", 2, 1, false, false),
    R16Float => ("R16_FLOAT", 2, 1, false, false),
    Bgra4Unorm => ("BGRA4_UNORM", 2, 1, false, false),
    B5g6r5Unorm => ("B5G6R5_UNORM", 2, 1, false, false),
    B5g5r5a1Unorm => ("B5G5R5A1_UNORM", 2, 1, false, false),
    Rgba8Uint => ("RGBA8_UINT", 4, 1, false, false),
    Rgba8Sint => ("RGBA8_SINT", 4, 1, false, false),
    Rgba8Unorm => ("RGBA8_UNORM", 4, 1, false, false),
    Rgba8Snorm => ("RGBA8_SNORM", 4, 1, false, false),
    Bgra8Unorm => ("BGRA8_UNORM", 4, 1, false, false),
    Srgba8Unorm => ("SRGBA8_UNORM", 4, 1, false, false),
    Sbgra8Unorm => ("SBGRA8_UNORM", 4, 1, false, false),
    R10g10b10a2Unorm => ("R10G10B10A2_UNORM", 4, 1, false, false),
    R11g11b10Float => ("R11G11B10_FLOAT", 4, 1, false, false),
    Rg16Uint => ("RG16_UINT", 4, 1, false, false),
    Rg16Sint => ("RG16_SINT", 4, 1, false, false),
    Rg16Unorm => ("RG16_UNORM", 4, 1, false, false),
    Rg16Snorm => ("RG16_SNORM", 4, 1, false, false),
    Rg16Float => ("RG16_FLOAT", 4, 1, false, false),
    R32Uint => ("R32_UINT", 4, 1, false, false),
    R32Sint => ("R32_SINT", 4, 1, false, false),
    R32Float => ("R32_FLOAT", 4, 1, false, false),
    Rgba16Uint => ("RGBA16_UINT", 8, 1, false, false),
    Rgba16Sint => ("RGBA16_SINT", 8, 1, false, false),
    Rgba16Float => ("RGBA16_FLOAT", 8, 1, false, false),
    Rgba16Unorm => ("RGBA16_UNORM", 8, 1, false, false),
    Rgba16Snorm => ("RGBA16_SNORM", 8, 1, false, false),
    Rg32Uint => ("RG32_UINT", 8, 1, false, false),
    Rg32Sint => ("RG32_SINT", 8, 1, false, false),
    Rg32Float => ("RG32_FLOAT", 8, 1, false, false),
    Rgb32Uint => ("RGB32_UINT", 12, 1, false, false),
    Rgb32Sint => ("RGB32_SINT", 12, 1, false, false),
    Rgb32Float => ("RGB32_FLOAT", 12, 1, false, false),
    Rgba32Uint => ("RGBA32_UINT", 16, 1, false, false),
    Rgba32Sint => ("RGBA32_SINT", 16, 1, false, false),
    Rgba32Float => ("RGBA32_FLOAT", 16, 1, false, false),
    D16 => ("D16", 2, 1, true, false),
    D24S8 => ("D24S8", 4, 1, true, true),
    X24G8Uint => ("X24G8_UINT", 4, 1, false, true),
    D32 => ("D32", 4, 1, true, false),
    D32S8 => ("D32S8", 8, 1, true, true),
    X32G8Uint => ("X32G8_UINT", 8, 1, false, true),
    Bc1Unorm => ("BC1_UNORM", 8, 4, false, false),
    Bc1UnormSrgb => ("BC1_UNORM_SRGB", 8, 4, false, false),
    Bc2Unorm => ("BC2_UNORM", 16, 4, false, false),
    Bc2UnormSrgb => ("BC2_UNORM_SRGB", 16, 4, false, false),
    Bc3Unorm => ("BC3_UNORM", 16, 4, false, false),
    Bc3UnormSrgb => ("BC3_UNORM_SRGB", 16, 4, false, false),
    Bc4Unorm => ("BC4_UNORM", 8, 4, false, false),
    Bc4Snorm => ("BC4_SNORM", 8, 4, false, false),
    Bc5Unorm => ("BC5_UNORM", 16, 4, false, false),
    Bc5Snorm => ("BC5_SNORM", 16, 4, false, false),
    Bc6hUfloat => ("BC6H_UFLOAT", 16, 4, false, false),
    Bc6hSfloat => ("BC6H_SFLOAT", 16, 4, false, false),
    Bc7Unorm => ("BC7_UNORM", 16, 4, false, false),
    Bc7UnormSrgb => ("BC7_UNORM_SRGB", 16, 4, false, false),
}

impl Format {
    #[inline]
    pub fn is_depth(self) -> bool {
        let info = self.info();
        info.has_depth || info.has_stencil
    }

    #[inline]
    pub fn is_compressed(self) -> bool {
        self.info().block_size > 1
    }

    /// 一个元素（或者一个压缩块）的字节数
    #[inline]
    pub fn size(self) -> u32 {
        self.info().bytes_per_block
    }

    /// 一行 `width` 个像素所占的字节数，压缩格式按块计算
    pub fn row_pitch(self, width: u32) -> u64 {
        let info = self.info();
        if info.block_size == 0 {
            return 0;
        }
        let blocks = width.div_ceil(info.block_size);
        blocks as u64 * info.bytes_per_block as u64
    }

    /// 一个 `width x height` 切片所占的字节数
    pub fn slice_pitch(self, width: u32, height: u32) -> u64 {
        let info = self.info();
        if info.block_size == 0 {
            return 0;
        }
        self.row_pitch(width) * height.div_ceil(info.block_size) as u64
    }

    /// 对应的 sRGB 格式，不存在时返回自身
    pub fn to_srgb(self) -> Format {
        match self {
            Format::Rgba8Unorm => Format::Srgba8Unorm,
            Format::Bgra8Unorm => Format::Sbgra8Unorm,
            Format::Bc1Unorm => Format::Bc1UnormSrgb,
            Format::Bc2Unorm => Format::Bc2UnormSrgb,
            Format::Bc3Unorm => Format::Bc3UnormSrgb,
            Format::Bc7Unorm => Format::Bc7UnormSrgb,
            other => other,
        }
    }

    /// 对应的 snorm 格式，不存在时返回自身
    pub fn to_snorm(self) -> Format {
        match self {
            Format::R8Unorm => Format::R8Snorm,
            Format::Rg8Unorm => Format::Rg8Snorm,
            Format::R16Unorm => Format::R16Snorm,
            Format::Rgba8Unorm => Format::Rgba8Snorm,
            Format::Rg16Unorm => Format::Rg16Snorm,
            Format::Rgba16Unorm => Format::Rgba16Snorm,
            Format::Bc4Unorm => Format::Bc4Snorm,
            Format::Bc5Unorm => Format::Bc5Snorm,
            other => other,
        }
    }
}

/// 深度与模板测试使用的比较函数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    #[default]
    Always,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_info() {
        assert_eq!(Format::Rgba32Float.size(), 16);
        assert_eq!(Format::R16Uint.size(), 2);
        assert_eq!(Format::Rgb32Float.info().name, "RGB32_FLOAT");
        assert_eq!(Format::Unknown.size(), 0);

        assert!(Format::D32.is_depth());
        assert!(Format::D24S8.is_depth());
        assert!(!Format::Rgba8Unorm.is_depth());
    }

    #[test]
    fn test_compressed_pitch() {
        // BC1：4x4 的块，每块 8 字节
        assert!(Format::Bc1Unorm.is_compressed());
        assert_eq!(Format::Bc1Unorm.row_pitch(16), 32);
        assert_eq!(Format::Bc1Unorm.slice_pitch(16, 16), 128);
        // 不足一个块的按一个块计算
        assert_eq!(Format::Bc7Unorm.slice_pitch(1, 1), 16);

        assert_eq!(Format::Rgba8Unorm.slice_pitch(4, 2), 32);
    }

    #[test]
    fn test_srgb_snorm_variants() {
        assert_eq!(Format::Rgba8Unorm.to_srgb(), Format::Srgba8Unorm);
        assert_eq!(Format::R32Float.to_srgb(), Format::R32Float);
        assert_eq!(Format::Rgba8Unorm.to_snorm(), Format::Rgba8Snorm);
    }
}
