use std::hash::{Hash, Hasher};

use crate::basic::format::CompareFunc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WrapMode {
    #[default]
    Clamp,
    Wrap,
    Border,
    Mirror,
    MirrorOnce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterFunc {
    #[default]
    Standard,
    Comparison,
    Minimum,
    Maximum,
}

/// 每张纹理各自持有一份采样状态，后端按值去重创建 sampler
#[derive(Debug, Clone, Copy)]
pub struct SamplerState {
    pub border_color: [f32; 4],
    pub max_anisotropy: f32,
    pub mip_bias: f32,
    /// true 表示线性过滤
    pub min_filter: bool,
    pub mag_filter: bool,
    pub mip_filter: bool,
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
    pub wrap_w: WrapMode,
    pub filter_func: FilterFunc,
    pub compare_func: CompareFunc,
}
impl Default for SamplerState {
    fn default() -> Self {
        Self {
            border_color: [0.0; 4],
            max_anisotropy: 1.0,
            mip_bias: 0.0,
            min_filter: true,
            mag_filter: true,
            mip_filter: true,
            wrap_u: WrapMode::Clamp,
            wrap_v: WrapMode::Clamp,
            wrap_w: WrapMode::Clamp,
            filter_func: FilterFunc::Standard,
            compare_func: CompareFunc::Never,
        }
    }
}
impl SamplerState {
    fn key(&self) -> ([u32; 4], u32, u32, [bool; 3], [WrapMode; 3], FilterFunc, CompareFunc) {
        (
            self.border_color.map(f32::to_bits),
            self.max_anisotropy.to_bits(),
            self.mip_bias.to_bits(),
            [self.min_filter, self.mag_filter, self.mip_filter],
            [self.wrap_u, self.wrap_v, self.wrap_w],
            self.filter_func,
            self.compare_func,
        )
    }

    /// 三个方向使用同一种寻址方式
    pub fn set_wrap(&mut self, mode: WrapMode) {
        self.wrap_u = mode;
        self.wrap_v = mode;
        self.wrap_w = mode;
    }

    /// 同时设置 min/mag/mip 过滤
    pub fn set_filter(&mut self, linear: bool) {
        self.min_filter = linear;
        self.mag_filter = linear;
        self.mip_filter = linear;
    }
}
impl PartialEq for SamplerState {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for SamplerState {}
impl Hash for SamplerState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}
