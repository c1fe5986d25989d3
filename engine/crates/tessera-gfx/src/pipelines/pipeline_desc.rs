use crate::basic::format::Format;
use crate::device::{BindingLayoutId, ShaderModuleId};
use crate::pipelines::render_state::{FixedFunctionState, VariableRateShadingState};

/// shader 阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Amplification,
    Mesh,
    Vertex,
    Hull,
    Domain,
    Geometry,
    Pixel,
    Compute,
}
impl ShaderStage {
    /// 按文件扫描顺序排列的所有阶段
    pub const SCAN_ORDER: [ShaderStage; 8] = [
        ShaderStage::Amplification,
        ShaderStage::Mesh,
        ShaderStage::Vertex,
        ShaderStage::Hull,
        ShaderStage::Domain,
        ShaderStage::Geometry,
        ShaderStage::Pixel,
        ShaderStage::Compute,
    ];

    /// 预编译 shader 文件的扩展名（不含 `.spv`）
    pub fn extension(self) -> &'static str {
        match self {
            ShaderStage::Amplification => "task",
            ShaderStage::Mesh => "mesh",
            ShaderStage::Vertex => "vert",
            ShaderStage::Hull => "tesc",
            ShaderStage::Domain => "tese",
            ShaderStage::Geometry => "geom",
            ShaderStage::Pixel => "frag",
            ShaderStage::Compute => "comp",
        }
    }

    /// 该阶段能够决定的管线类型；pixel 阶段同时属于 graphics 与 meshlet，不参与决定
    pub fn pipeline_type(self) -> Option<PipelineType> {
        match self {
            ShaderStage::Amplification | ShaderStage::Mesh => Some(PipelineType::Meshlet),
            ShaderStage::Vertex | ShaderStage::Hull | ShaderStage::Domain | ShaderStage::Geometry => {
                Some(PipelineType::Graphics)
            }
            ShaderStage::Compute => Some(PipelineType::Compute),
            ShaderStage::Pixel => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineType {
    Graphics,
    Compute,
    Meshlet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveType {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
    TriangleFan,
    TriangleListWithAdjacency,
    TriangleStripWithAdjacency,
    PatchList,
}

/// 顶点属性：每个属性使用独立的 vertex buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttributeDesc {
    pub format: Format,
    pub buffer_index: u32,
    pub offset: u32,
    pub element_stride: u32,
    pub is_instanced: bool,
}

/// 特化常量，值以 32 位整数写入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpecializationConstant {
    pub constant_id: u32,
    pub value: u32,
}
impl SpecializationConstant {
    /// workgroup 尺寸使用 0/1/2 三个特化常量
    pub fn group_size(group_size: [u32; 3]) -> Vec<SpecializationConstant> {
        group_size
            .iter()
            .enumerate()
            .map(|(i, &value)| SpecializationConstant {
                constant_id: i as u32,
                value,
            })
            .collect()
    }
}

/// framebuffer 的格式描述，是管线兼容性的一部分
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FramebufferInfo {
    pub color_formats: Vec<Format>,
    pub depth_format: Format,
    pub sample_count: u32,
    pub sample_quality: u32,
    pub width: u32,
    pub height: u32,
}
impl FramebufferInfo {
    #[inline]
    pub fn has_depth(&self) -> bool {
        self.depth_format != Format::Unknown
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphicsPipelineDesc {
    pub prim_type: PrimitiveType,
    pub patch_control_points: u32,
    pub input_layout: Vec<VertexAttributeDesc>,

    pub vs: Option<ShaderModuleId>,
    pub hs: Option<ShaderModuleId>,
    pub ds: Option<ShaderModuleId>,
    pub gs: Option<ShaderModuleId>,
    pub ps: Option<ShaderModuleId>,

    pub render_state: FixedFunctionState,
    pub shading_rate: VariableRateShadingState,
    pub binding_layouts: Vec<BindingLayoutId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComputePipelineDesc {
    pub cs: ShaderModuleId,
    pub specialization: Vec<SpecializationConstant>,
    pub binding_layouts: Vec<BindingLayoutId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MeshletPipelineDesc {
    pub prim_type: PrimitiveType,

    pub amplification: Option<ShaderModuleId>,
    pub mesh: ShaderModuleId,
    pub ps: Option<ShaderModuleId>,
    /// 作用于 amplification 与 mesh 阶段
    pub specialization: Vec<SpecializationConstant>,

    pub render_state: FixedFunctionState,
    pub binding_layouts: Vec<BindingLayoutId>,
}
