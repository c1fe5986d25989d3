//! RHI 值类型到 Vulkan 枚举的转换

use ash::vk;

use crate::basic::format::{CompareFunc, Format};
use crate::descriptors::binding::ResourceKind;
use crate::pipelines::pipeline_desc::{PrimitiveType, ShaderStage};
use crate::pipelines::render_state::{
    BlendFactor, BlendOp, ColorMask, CullMode, FillMode, ShadingRateCombiner, StencilOp, StencilOpDesc,
    VariableShadingRate,
};
use crate::resources::resource_desc::{BufferKind, TextureDesc, TextureType};
use crate::resources::sampler_state::WrapMode;

pub fn vk_format(format: Format) -> vk::Format {
    match format {
        Format::Unknown => vk::Format::UNDEFINED,
        Format::R8Uint => vk::Format::R8_UINT,
        Format::R8Sint => vk::Format::R8_SINT,
        Format::R8Unorm => vk::Format::R8_UNORM,
        Format::R8Snorm => vk::Format::R8_SNORM,
        Format::Rg8Uint => vk::Format::R8G8_UINT,
        Format::Rg8Sint => vk::Format::R8G8_SINT,
        Format::Rg8Unorm => vk::Format::R8G8_UNORM,
        Format::Rg8Snorm => vk::Format::R8G8_SNORM,
        Format::R16Uint => vk::Format::R16_UINT,
        Format::R16Sint => vk::Format::R16_SINT,
        Format::R16Unorm => vk::Format::R16_UNORM,
        Format::R16Snorm => vk::Format::R16_SNORM,
        Format::R16Float => vk::Format::R16_SFLOAT,
        Format::Bgra4Unorm => vk::Format::B4G4R4A4_UNORM_PACK16,
        Format::B5g6r5Unorm => vk::Format::B5G6R5_UNORM_PACK16,
        Format::B5g5r5a1Unorm => vk::Format::B5G5R5A1_UNORM_PACK16,
        Format::Rgba8Uint => vk::Format::R8G8B8A8_UINT,
        Format::Rgba8Sint => vk::Format::R8G8B8A8_SINT,
        Format::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        Format::Rgba8Snorm => vk::Format::R8G8B8A8_SNORM,
        Format::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        Format::Srgba8Unorm => vk::Format::R8G8B8A8_SRGB,
        Format::Sbgra8Unorm => vk::Format::B8G8R8A8_SRGB,
        Format::R10g10b10a2Unorm => vk::Format::A2B10G10R10_UNORM_PACK32,
        Format::R11g11b10Float => vk::Format::B10G11R11_UFLOAT_PACK32,
        Format::Rg16Uint => vk::Format::R16G16_UINT,
        Format::Rg16Sint => vk::Format::R16G16_SINT,
        Format::Rg16Unorm => vk::Format::R16G16_UNORM,
        Format::Rg16Snorm => vk::Format::R16G16_SNORM,
        Format::Rg16Float => vk::Format::R16G16_SFLOAT,
        Format::R32Uint => vk::Format::R32_UINT,
        Format::R32Sint => vk::Format::R32_SINT,
        Format::R32Float => vk::Format::R32_SFLOAT,
        Format::Rgba16Uint => vk::Format::R16G16B16A16_UINT,
        Format::Rgba16Sint => vk::Format::R16G16B16A16_SINT,
        Format::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
        Format::Rgba16Unorm => vk::Format::R16G16B16A16_UNORM,
        Format::Rgba16Snorm => vk::Format::R16G16B16A16_SNORM,
        Format::Rg32Uint => vk::Format::R32G32_UINT,
        Format::Rg32Sint => vk::Format::R32G32_SINT,
        Format::Rg32Float => vk::Format::R32G32_SFLOAT,
        Format::Rgb32Uint => vk::Format::R32G32B32_UINT,
        Format::Rgb32Sint => vk::Format::R32G32B32_SINT,
        Format::Rgb32Float => vk::Format::R32G32B32_SFLOAT,
        Format::Rgba32Uint => vk::Format::R32G32B32A32_UINT,
        Format::Rgba32Sint => vk::Format::R32G32B32A32_SINT,
        Format::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
        Format::D16 => vk::Format::D16_UNORM,
        Format::D24S8 | Format::X24G8Uint => vk::Format::D24_UNORM_S8_UINT,
        Format::D32 => vk::Format::D32_SFLOAT,
        Format::D32S8 | Format::X32G8Uint => vk::Format::D32_SFLOAT_S8_UINT,
        Format::Bc1Unorm => vk::Format::BC1_RGBA_UNORM_BLOCK,
        Format::Bc1UnormSrgb => vk::Format::BC1_RGBA_SRGB_BLOCK,
        Format::Bc2Unorm => vk::Format::BC2_UNORM_BLOCK,
        Format::Bc2UnormSrgb => vk::Format::BC2_SRGB_BLOCK,
        Format::Bc3Unorm => vk::Format::BC3_UNORM_BLOCK,
        Format::Bc3UnormSrgb => vk::Format::BC3_SRGB_BLOCK,
        Format::Bc4Unorm => vk::Format::BC4_UNORM_BLOCK,
        Format::Bc4Snorm => vk::Format::BC4_SNORM_BLOCK,
        Format::Bc5Unorm => vk::Format::BC5_UNORM_BLOCK,
        Format::Bc5Snorm => vk::Format::BC5_SNORM_BLOCK,
        Format::Bc6hUfloat => vk::Format::BC6H_UFLOAT_BLOCK,
        Format::Bc6hSfloat => vk::Format::BC6H_SFLOAT_BLOCK,
        Format::Bc7Unorm => vk::Format::BC7_UNORM_BLOCK,
        Format::Bc7UnormSrgb => vk::Format::BC7_SRGB_BLOCK,
    }
}

/// 深度格式同时带模板时两个 aspect 都需要
pub fn aspect_flags(format: Format) -> vk::ImageAspectFlags {
    let info = format.info();
    match (info.has_depth, info.has_stencil) {
        (true, true) => vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
        (true, false) => vk::ImageAspectFlags::DEPTH,
        (false, true) => vk::ImageAspectFlags::STENCIL,
        (false, false) => vk::ImageAspectFlags::COLOR,
    }
}

pub fn compare_op(func: CompareFunc) -> vk::CompareOp {
    match func {
        CompareFunc::Never => vk::CompareOp::NEVER,
        CompareFunc::Less => vk::CompareOp::LESS,
        CompareFunc::Equal => vk::CompareOp::EQUAL,
        CompareFunc::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareFunc::Greater => vk::CompareOp::GREATER,
        CompareFunc::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareFunc::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareFunc::Always => vk::CompareOp::ALWAYS,
    }
}

pub fn blend_factor(factor: BlendFactor) -> vk::BlendFactor {
    match factor {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SrcColor => vk::BlendFactor::SRC_COLOR,
        BlendFactor::InvSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
        BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::InvSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
        BlendFactor::InvDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        BlendFactor::DstColor => vk::BlendFactor::DST_COLOR,
        BlendFactor::InvDstColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
        BlendFactor::SrcAlphaSaturate => vk::BlendFactor::SRC_ALPHA_SATURATE,
        BlendFactor::ConstantColor => vk::BlendFactor::CONSTANT_COLOR,
        BlendFactor::InvConstantColor => vk::BlendFactor::ONE_MINUS_CONSTANT_COLOR,
        BlendFactor::Src1Color => vk::BlendFactor::SRC1_COLOR,
        BlendFactor::InvSrc1Color => vk::BlendFactor::ONE_MINUS_SRC1_COLOR,
        BlendFactor::Src1Alpha => vk::BlendFactor::SRC1_ALPHA,
        BlendFactor::InvSrc1Alpha => vk::BlendFactor::ONE_MINUS_SRC1_ALPHA,
    }
}

pub fn blend_op(op: BlendOp) -> vk::BlendOp {
    match op {
        BlendOp::Add => vk::BlendOp::ADD,
        BlendOp::Subtract => vk::BlendOp::SUBTRACT,
        BlendOp::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        BlendOp::Min => vk::BlendOp::MIN,
        BlendOp::Max => vk::BlendOp::MAX,
    }
}

pub fn color_write_mask(mask: ColorMask) -> vk::ColorComponentFlags {
    let mut flags = vk::ColorComponentFlags::empty();
    if mask.contains(ColorMask::RED) {
        flags |= vk::ColorComponentFlags::R;
    }
    if mask.contains(ColorMask::GREEN) {
        flags |= vk::ColorComponentFlags::G;
    }
    if mask.contains(ColorMask::BLUE) {
        flags |= vk::ColorComponentFlags::B;
    }
    if mask.contains(ColorMask::ALPHA) {
        flags |= vk::ColorComponentFlags::A;
    }
    flags
}

pub fn polygon_mode(mode: FillMode) -> vk::PolygonMode {
    match mode {
        FillMode::Solid => vk::PolygonMode::FILL,
        FillMode::Wireframe => vk::PolygonMode::LINE,
        FillMode::Point => vk::PolygonMode::POINT,
    }
}

pub fn cull_mode(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::Back => vk::CullModeFlags::BACK,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::None => vk::CullModeFlags::NONE,
    }
}

pub fn stencil_op(op: StencilOp) -> vk::StencilOp {
    match op {
        StencilOp::Keep => vk::StencilOp::KEEP,
        StencilOp::Zero => vk::StencilOp::ZERO,
        StencilOp::Replace => vk::StencilOp::REPLACE,
        StencilOp::IncrementAndClamp => vk::StencilOp::INCREMENT_AND_CLAMP,
        StencilOp::DecrementAndClamp => vk::StencilOp::DECREMENT_AND_CLAMP,
        StencilOp::Invert => vk::StencilOp::INVERT,
        StencilOp::IncrementAndWrap => vk::StencilOp::INCREMENT_AND_WRAP,
        StencilOp::DecrementAndWrap => vk::StencilOp::DECREMENT_AND_WRAP,
    }
}

pub fn stencil_op_state(desc: &StencilOpDesc, read_mask: u8, write_mask: u8, reference: u8) -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: stencil_op(desc.fail_op),
        pass_op: stencil_op(desc.pass_op),
        depth_fail_op: stencil_op(desc.depth_fail_op),
        compare_op: compare_op(desc.stencil_func),
        compare_mask: read_mask as u32,
        write_mask: write_mask as u32,
        reference: reference as u32,
    }
}

pub fn primitive_topology(prim: PrimitiveType) -> vk::PrimitiveTopology {
    match prim {
        PrimitiveType::PointList => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveType::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveType::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveType::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveType::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveType::TriangleFan => vk::PrimitiveTopology::TRIANGLE_FAN,
        PrimitiveType::TriangleListWithAdjacency => vk::PrimitiveTopology::TRIANGLE_LIST_WITH_ADJACENCY,
        PrimitiveType::TriangleStripWithAdjacency => vk::PrimitiveTopology::TRIANGLE_STRIP_WITH_ADJACENCY,
        PrimitiveType::PatchList => vk::PrimitiveTopology::PATCH_LIST,
    }
}

pub fn shader_stage(stage: ShaderStage) -> vk::ShaderStageFlags {
    match stage {
        ShaderStage::Amplification => vk::ShaderStageFlags::TASK_EXT,
        ShaderStage::Mesh => vk::ShaderStageFlags::MESH_EXT,
        ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStage::Hull => vk::ShaderStageFlags::TESSELLATION_CONTROL,
        ShaderStage::Domain => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
        ShaderStage::Geometry => vk::ShaderStageFlags::GEOMETRY,
        ShaderStage::Pixel => vk::ShaderStageFlags::FRAGMENT,
        ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
    }
}

pub fn descriptor_type(kind: ResourceKind) -> vk::DescriptorType {
    match kind {
        ResourceKind::VolatileConstantBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        ResourceKind::RawBufferUav => vk::DescriptorType::STORAGE_BUFFER,
        ResourceKind::TextureSrv => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        ResourceKind::TextureUav => vk::DescriptorType::STORAGE_IMAGE,
        ResourceKind::AccelStruct => vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
    }
}

pub fn address_mode(mode: WrapMode) -> vk::SamplerAddressMode {
    match mode {
        WrapMode::Clamp => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        WrapMode::Wrap => vk::SamplerAddressMode::REPEAT,
        WrapMode::Border => vk::SamplerAddressMode::CLAMP_TO_BORDER,
        WrapMode::Mirror => vk::SamplerAddressMode::MIRRORED_REPEAT,
        WrapMode::MirrorOnce => vk::SamplerAddressMode::MIRROR_CLAMP_TO_EDGE,
    }
}

pub fn sample_count(count: u32) -> vk::SampleCountFlags {
    match count {
        2 => vk::SampleCountFlags::TYPE_2,
        4 => vk::SampleCountFlags::TYPE_4,
        8 => vk::SampleCountFlags::TYPE_8,
        16 => vk::SampleCountFlags::TYPE_16,
        32 => vk::SampleCountFlags::TYPE_32,
        64 => vk::SampleCountFlags::TYPE_64,
        _ => vk::SampleCountFlags::TYPE_1,
    }
}

pub fn image_type(texture_type: TextureType) -> vk::ImageType {
    match texture_type {
        TextureType::Texture1D | TextureType::Texture1DArray => vk::ImageType::TYPE_1D,
        TextureType::Texture3D => vk::ImageType::TYPE_3D,
        _ => vk::ImageType::TYPE_2D,
    }
}

/// view 的类型由纹理类型与实际引用的 layer 数共同决定
pub fn image_view_type(texture_type: TextureType, num_array_slices: u32) -> vk::ImageViewType {
    match texture_type {
        TextureType::Texture1D => vk::ImageViewType::TYPE_1D,
        TextureType::Texture1DArray => vk::ImageViewType::TYPE_1D_ARRAY,
        TextureType::Texture2D | TextureType::Texture2DMS => vk::ImageViewType::TYPE_2D,
        TextureType::Texture2DArray | TextureType::Texture2DMSArray => vk::ImageViewType::TYPE_2D_ARRAY,
        TextureType::TextureCube if num_array_slices == 6 => vk::ImageViewType::CUBE,
        TextureType::TextureCube | TextureType::TextureCubeArray if num_array_slices % 6 == 0 => {
            vk::ImageViewType::CUBE_ARRAY
        }
        TextureType::TextureCube | TextureType::TextureCubeArray => vk::ImageViewType::TYPE_2D_ARRAY,
        TextureType::Texture3D => vk::ImageViewType::TYPE_3D,
    }
}

pub fn image_usage(desc: &TextureDesc) -> vk::ImageUsageFlags {
    let mut usage = vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST;
    if desc.is_uav {
        usage |= vk::ImageUsageFlags::STORAGE;
    }
    if desc.is_render_target {
        if desc.format.is_depth() {
            usage |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        } else {
            usage |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        }
    }
    usage
}

/// 所有 buffer 都可以作为拷贝的源与目标；开启光追时，几何相关的 buffer 还需要作为加速结构的构建输入
///
/// UNIFORM + device address 的组合不允许出现
pub fn buffer_usage(kind: BufferKind, raytracing: bool) -> vk::BufferUsageFlags {
    let mut usage = vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST;
    usage |= match kind {
        BufferKind::ConstantBuffer => vk::BufferUsageFlags::UNIFORM_BUFFER,
        BufferKind::VertexBuffer => vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::STORAGE_BUFFER,
        BufferKind::IndexBuffer => vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::STORAGE_BUFFER,
        BufferKind::IndirectArgument => vk::BufferUsageFlags::INDIRECT_BUFFER | vk::BufferUsageFlags::STORAGE_BUFFER,
        BufferKind::UnorderedAccess => vk::BufferUsageFlags::STORAGE_BUFFER,
        BufferKind::Staging => vk::BufferUsageFlags::empty(),
    };
    if raytracing && !matches!(kind, BufferKind::ConstantBuffer | BufferKind::Staging) {
        usage |= vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
            | vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR;
    }
    usage
}

pub fn shading_rate_extent(rate: VariableShadingRate) -> vk::Extent2D {
    let (width, height) = match rate {
        VariableShadingRate::E1x1 => (1, 1),
        VariableShadingRate::E1x2 => (1, 2),
        VariableShadingRate::E2x1 => (2, 1),
        VariableShadingRate::E2x2 => (2, 2),
        VariableShadingRate::E2x4 => (2, 4),
        VariableShadingRate::E4x2 => (4, 2),
        VariableShadingRate::E4x4 => (4, 4),
    };
    vk::Extent2D { width, height }
}

pub fn shading_rate_combiner(combiner: ShadingRateCombiner) -> vk::FragmentShadingRateCombinerOpKHR {
    match combiner {
        ShadingRateCombiner::Passthrough => vk::FragmentShadingRateCombinerOpKHR::KEEP,
        ShadingRateCombiner::Override => vk::FragmentShadingRateCombinerOpKHR::REPLACE,
        ShadingRateCombiner::Min => vk::FragmentShadingRateCombinerOpKHR::MIN,
        ShadingRateCombiner::Max => vk::FragmentShadingRateCombinerOpKHR::MAX,
        ShadingRateCombiner::ApplyRelative => vk::FragmentShadingRateCombinerOpKHR::MUL,
    }
}
