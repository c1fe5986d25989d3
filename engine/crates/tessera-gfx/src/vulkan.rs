pub mod convert;
pub mod descriptors;
pub mod device_functions;
pub mod frame;
pub mod pipelines;
pub mod resources;
pub mod vulkan_device;

pub use vulkan_device::{VulkanDevice, VulkanDeviceCreateInfo};
