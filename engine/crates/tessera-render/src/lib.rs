//! Tessera 渲染核心
//!
//! 应用只和 [`context::RenderContext`] 打交道：
//! - 加载 shader 时通过 SPIR-V 反射得到 uniform、纹理、buffer 与加速结构的绑定表
//! - 设置 uniform 只修改 shader 本地的 staging 数据与附件表
//! - draw / dispatch 时按渲染状态与 framebuffer 格式查找或创建管线，并按需重建 binding set

pub mod binding_set;
pub mod camera;
pub mod context;
pub mod frame_counter;
pub mod guard;
pub mod pipeline_cache;
pub mod reflection;
pub mod render_state_stack;
pub mod resources;
pub mod settings;
pub mod shader;

#[cfg(test)]
mod demo_flows;
#[cfg(test)]
mod test_utils;
