//! RHI (Rendering Hardware Interface) 抽象层
//!
//! 渲染核心只通过 [`device::GfxDevice`] 与 GPU 交互，本 crate 提供：
//! - 值类型：格式、渲染状态、管线与 binding 描述
//! - [`headless::HeadlessDevice`]：不依赖 GPU 的录制后端，用于测试与离线运行
//! - [`vulkan::VulkanDevice`]：基于 ash 与 gpu-allocator 的 Vulkan 后端

pub mod basic;
pub mod descriptors;
pub mod device;
pub mod headless;
pub mod pipelines;
pub mod resources;
pub mod vulkan;
