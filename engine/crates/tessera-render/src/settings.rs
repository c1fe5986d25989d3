use std::fmt::Display;
use std::ops::Deref;

/// 渲染核心的默认配置
pub struct DefaultRenderSettings;
impl DefaultRenderSettings {
    /// volatile constant buffer 的对齐要求
    pub const CONSTANT_BUFFER_ALIGNMENT: u32 = 256;
    /// Frames in Flight
    pub const FRAMES_IN_FLIGHT: usize = 3;
    pub const COMPUTE_GROUP_SIZE: [u32; 3] = [8, 8, 1];
    pub const MESHLET_GROUP_SIZE: [u32; 3] = [64, 1, 1];
    pub const PATCH_CONTROL_POINTS: u32 = 4;
    pub const SURFACE_WIDTH: u32 = 1280;
    pub const SURFACE_HEIGHT: u32 = 720;
}

/// 创建 [`crate::context::RenderContext`] 时使用的配置
#[derive(Debug, Clone, Copy)]
pub struct ContextSettings {
    /// swapchain 的尺寸，用于默认的 viewport 与 scissor
    pub surface_width: u32,
    pub surface_height: u32,

    pub constant_buffer_alignment: u32,
    pub compute_group_size: [u32; 3],
    pub meshlet_group_size: [u32; 3],
    pub patch_control_points: u32,

    /// 设备是否开启了光线追踪相关的扩展；关闭时不能创建加速结构
    pub raytracing: bool,
}
impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            surface_width: DefaultRenderSettings::SURFACE_WIDTH,
            surface_height: DefaultRenderSettings::SURFACE_HEIGHT,
            constant_buffer_alignment: DefaultRenderSettings::CONSTANT_BUFFER_ALIGNMENT,
            compute_group_size: DefaultRenderSettings::COMPUTE_GROUP_SIZE,
            meshlet_group_size: DefaultRenderSettings::MESHLET_GROUP_SIZE,
            patch_control_points: DefaultRenderSettings::PATCH_CONTROL_POINTS,
            raytracing: false,
        }
    }
}
impl ContextSettings {
    /// 向上对齐到 constant buffer 的对齐要求
    #[inline]
    pub fn pad_constant_buffer_size(&self, size: u32) -> u32 {
        let alignment = self.constant_buffer_alignment.max(1);
        size.div_ceil(alignment) * alignment
    }
}

/// 帧标签（A/B/C）
///
/// 表示当前处于 Frames in Flight 的哪一帧。
/// 通过 `Deref` 转换为索引 0/1/2。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLabel {
    A,
    B,
    C,
}
impl Deref for FrameLabel {
    type Target = usize;
    #[inline]
    fn deref(&self) -> &Self::Target {
        match self {
            Self::A => &Self::INDEX[0],
            Self::B => &Self::INDEX[1],
            Self::C => &Self::INDEX[2],
        }
    }
}
impl Display for FrameLabel {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::C => write!(f, "C"),
        }
    }
}
impl FrameLabel {
    const INDEX: [usize; 3] = [0, 1, 2];

    #[inline]
    pub fn from_usize(idx: usize) -> Self {
        match idx % Self::INDEX.len() {
            0 => Self::A,
            1 => Self::B,
            _ => Self::C,
        }
    }
}
