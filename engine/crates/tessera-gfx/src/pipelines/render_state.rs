//! 渲染状态的值类型
//!
//! 所有类型都是 `Copy` 的快照，可以直接放入渲染状态栈中。
//! [`FixedFunctionState`] 是参与管线 key 计算的子集，浮点字段按位比较。

use std::hash::{Hash, Hasher};

use crate::basic::format::CompareFunc;

pub const MAX_RENDER_TARGETS: usize = 8;
pub const MAX_SAMPLE_LOCATIONS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    InvSrcColor,
    SrcAlpha,
    InvSrcAlpha,
    DstAlpha,
    InvDstAlpha,
    DstColor,
    InvDstColor,
    SrcAlphaSaturate,
    ConstantColor,
    InvConstantColor,
    Src1Color,
    InvSrc1Color,
    Src1Alpha,
    InvSrc1Alpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorMask: u8 {
        const RED = 1;
        const GREEN = 2;
        const BLUE = 4;
        const ALPHA = 8;
        const ALL = 0xF;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetBlendState {
    pub blend_enable: bool,
    pub src_blend: BlendFactor,
    pub dest_blend: BlendFactor,
    pub blend_op: BlendOp,
    pub src_blend_alpha: BlendFactor,
    pub dest_blend_alpha: BlendFactor,
    pub blend_op_alpha: BlendOp,
    pub color_write_mask: ColorMask,
}
impl Default for RenderTargetBlendState {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_blend: BlendFactor::One,
            dest_blend: BlendFactor::Zero,
            blend_op: BlendOp::Add,
            src_blend_alpha: BlendFactor::One,
            dest_blend_alpha: BlendFactor::Zero,
            blend_op_alpha: BlendOp::Add,
            color_write_mask: ColorMask::ALL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlendState {
    pub targets: [RenderTargetBlendState; MAX_RENDER_TARGETS],
    pub alpha_to_coverage_enable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FillMode {
    #[default]
    Solid,
    Wireframe,
    Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    Back,
    Front,
    None,
}

/// 光栅化状态
///
/// 深度偏移相关的字段是 f32，因此手动实现按位比较的 `Eq` 与 `Hash`
#[derive(Debug, Clone, Copy)]
pub struct RasterState {
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    pub front_counter_clockwise: bool,
    pub depth_clip_enable: bool,
    pub scissor_enable: bool,
    pub multisample_enable: bool,
    pub antialiased_line_enable: bool,
    pub rasterizer_discard: bool,
    pub depth_bias: i32,
    pub depth_bias_clamp: f32,
    pub slope_scaled_depth_bias: f32,

    pub forced_sample_count: u8,
    pub programmable_sample_positions_enable: bool,
    pub conservative_raster_enable: bool,
    pub quad_fill_enable: bool,
    /// 采样点位置，单位为 1/16 像素
    pub sample_positions_x: [i8; MAX_SAMPLE_LOCATIONS],
    pub sample_positions_y: [i8; MAX_SAMPLE_LOCATIONS],
}
impl Default for RasterState {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::Solid,
            cull_mode: CullMode::Back,
            front_counter_clockwise: false,
            depth_clip_enable: false,
            scissor_enable: false,
            multisample_enable: false,
            antialiased_line_enable: false,
            rasterizer_discard: false,
            depth_bias: 0,
            depth_bias_clamp: 0.0,
            slope_scaled_depth_bias: 0.0,
            forced_sample_count: 0,
            programmable_sample_positions_enable: false,
            conservative_raster_enable: false,
            quad_fill_enable: false,
            sample_positions_x: [0; MAX_SAMPLE_LOCATIONS],
            sample_positions_y: [0; MAX_SAMPLE_LOCATIONS],
        }
    }
}
type RasterBitImage = (
    (FillMode, CullMode, bool, bool, bool, bool, bool, bool),
    (i32, u32, u32),
    (u8, bool, bool, bool),
    [i8; MAX_SAMPLE_LOCATIONS],
    [i8; MAX_SAMPLE_LOCATIONS],
);

impl RasterState {
    /// 参与比较的所有字段，浮点数取其位模式
    #[inline]
    fn bit_image(&self) -> RasterBitImage {
        (
            (
                self.fill_mode,
                self.cull_mode,
                self.front_counter_clockwise,
                self.depth_clip_enable,
                self.scissor_enable,
                self.multisample_enable,
                self.antialiased_line_enable,
                self.rasterizer_discard,
            ),
            (self.depth_bias, self.depth_bias_clamp.to_bits(), self.slope_scaled_depth_bias.to_bits()),
            (
                self.forced_sample_count,
                self.programmable_sample_positions_enable,
                self.conservative_raster_enable,
                self.quad_fill_enable,
            ),
            self.sample_positions_x,
            self.sample_positions_y,
        )
    }
}
impl PartialEq for RasterState {
    fn eq(&self, other: &Self) -> bool {
        self.bit_image() == other.bit_image()
    }
}
impl Eq for RasterState {}
impl Hash for RasterState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bit_image().hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrementAndClamp,
    DecrementAndClamp,
    Invert,
    IncrementAndWrap,
    DecrementAndWrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilOpDesc {
    pub fail_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub stencil_func: CompareFunc,
}
impl Default for StencilOpDesc {
    fn default() -> Self {
        Self {
            fail_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            stencil_func: CompareFunc::Always,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_func: CompareFunc,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub stencil_ref_value: u8,
    pub dynamic_stencil_ref: bool,
    pub front_face_stencil: StencilOpDesc,
    pub back_face_stencil: StencilOpDesc,
}
impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test_enable: true,
            depth_write_enable: true,
            depth_func: CompareFunc::Less,
            stencil_enable: false,
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
            stencil_ref_value: 0,
            dynamic_stencil_ref: false,
            front_face_stencil: StencilOpDesc::default(),
            back_face_stencil: StencilOpDesc::default(),
        }
    }
}

/// viewport 矩形，`min_z`/`max_z` 为深度范围
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewportState {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
    pub min_z: f32,
    pub max_z: f32,
}
impl ViewportState {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            min_x: 0.0,
            max_x: width,
            min_y: 0.0,
            max_y: height,
            min_z: 0.0,
            max_z: 1.0,
        }
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }
    #[inline]
    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }
}

/// scissor 矩形，单位为像素
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScissorRect {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
}
impl ScissorRect {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            min_x: 0,
            max_x: width as i32,
            min_y: 0,
            max_y: height as i32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VariableShadingRate {
    #[default]
    E1x1,
    E1x2,
    E2x1,
    E2x2,
    E2x4,
    E4x2,
    E4x4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadingRateCombiner {
    #[default]
    Passthrough,
    Override,
    Min,
    Max,
    ApplyRelative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VariableRateShadingState {
    pub enabled: bool,
    pub shading_rate: VariableShadingRate,
    pub pipeline_primitive_combiner: ShadingRateCombiner,
    pub image_combiner: ShadingRateCombiner,
}

/// 参与管线 key 的固定功能状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FixedFunctionState {
    pub blend: BlendState,
    pub depth_stencil: DepthStencilState,
    pub raster: RasterState,
}

/// 一次 draw 使用的完整渲染状态
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderState {
    pub blend: BlendState,
    pub depth_stencil: DepthStencilState,
    pub raster: RasterState,
    pub viewport: ViewportState,
    pub scissor: ScissorRect,
    pub vrs: VariableRateShadingState,
}
impl RenderState {
    #[inline]
    pub fn fixed_function(&self) -> FixedFunctionState {
        FixedFunctionState {
            blend: self.blend,
            depth_stencil: self.depth_stencil,
            raster: self.raster,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;

    use super::*;

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_defaults() {
        let state = RenderState::default();
        assert!(!state.blend.targets[0].blend_enable);
        assert_eq!(state.blend.targets[7].color_write_mask, ColorMask::ALL);
        assert!(state.depth_stencil.depth_test_enable);
        assert_eq!(state.depth_stencil.depth_func, CompareFunc::Less);
        assert_eq!(state.depth_stencil.stencil_read_mask, 0xFF);
        assert_eq!(state.raster.cull_mode, CullMode::Back);
        assert!(!state.raster.depth_clip_enable);
        assert!(!state.vrs.enabled);
    }

    #[test]
    fn test_raster_bitwise_eq() {
        let a = RasterState::default();
        let mut b = RasterState::default();
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        // 0.0 与 -0.0 数值相等，但按位不同
        b.slope_scaled_depth_bias = -0.0;
        assert_ne!(a, b);

        let mut c = RasterState::default();
        c.sample_positions_x[3] = 8;
        assert_ne!(a, c);
    }

    #[test]
    fn test_fixed_function_ignores_viewport() {
        let a = RenderState::default();
        let mut b = RenderState::default();
        b.viewport = ViewportState::new(800.0, 600.0);
        b.scissor = ScissorRect::new(800, 600);
        assert_ne!(a, b);
        assert_eq!(a.fixed_function(), b.fixed_function());
        assert_eq!(hash_of(&a.fixed_function()), hash_of(&b.fixed_function()));
    }
}
