use std::collections::HashMap;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};

use crate::resources::resource_desc::{AccelStructDesc, BufferDesc, BufferKind, TextureDesc, TextureSubresourceSet};
use crate::vulkan::convert;
use crate::vulkan::device_functions::{DeviceFunctions, check};

/// 分配失败视为致命错误
#[track_caller]
fn allocate(allocator: &mut Allocator, desc: &AllocationCreateDesc) -> Allocation {
    match allocator.allocate(desc) {
        Ok(allocation) => allocation,
        Err(e) => panic!("failed to allocate memory for {}: {e}", desc.name),
    }
}

fn free(allocator: &mut Allocator, allocation: Allocation) {
    if let Err(e) = allocator.free(allocation) {
        log::error!("failed to free allocation: {e}");
    }
}

pub struct VulkanBuffer {
    handle: vk::Buffer,
    allocation: Option<Allocation>,
    desc: BufferDesc,

    /// 只有在 buffer usage 包含 SHADER_DEVICE_ADDRESS 时才有值
    device_addr: Option<vk::DeviceAddress>,
}
// new & init
impl VulkanBuffer {
    pub fn new(
        device: &DeviceFunctions,
        allocator: &mut Allocator,
        desc: BufferDesc,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Self {
        // 0 字节的 buffer 不合法，至少分配 4 字节
        let buffer_ci = vk::BufferCreateInfo::default().size(desc.byte_size.max(4)).usage(usage);
        let handle = unsafe { check(device.create_buffer(&buffer_ci, None), "vkCreateBuffer") };

        let requirements = unsafe { device.get_buffer_memory_requirements(handle) };
        let allocation = allocate(
            allocator,
            &AllocationCreateDesc {
                name,
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            },
        );
        unsafe {
            check(device.bind_buffer_memory(handle, allocation.memory(), allocation.offset()), "vkBindBufferMemory");
        }

        let device_addr = usage.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS).then(|| unsafe {
            device.get_buffer_device_address(&vk::BufferDeviceAddressInfo::default().buffer(handle))
        });

        device.set_object_debug_name(handle, format!("Buffer::{name}"));
        Self {
            handle,
            allocation: Some(allocation),
            desc,
            device_addr,
        }
    }

    /// CPU 写入、GPU 读取的中转 buffer
    pub fn new_upload(device: &DeviceFunctions, allocator: &mut Allocator, size: u64, name: &str) -> Self {
        Self::new(
            device,
            allocator,
            BufferDesc::new(BufferKind::Staging, size),
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            name,
        )
    }

    /// GPU 写入、CPU 回读的中转 buffer
    pub fn new_readback(device: &DeviceFunctions, allocator: &mut Allocator, size: u64, name: &str) -> Self {
        Self::new(
            device,
            allocator,
            BufferDesc::new(BufferKind::Staging, size),
            vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuToCpu,
            name,
        )
    }

    pub fn destroy(mut self, device: &DeviceFunctions, allocator: &mut Allocator) {
        unsafe {
            device.destroy_buffer(self.handle, None);
        }
        if let Some(allocation) = self.allocation.take() {
            free(allocator, allocation);
        }
    }
}
// getters
impl VulkanBuffer {
    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.handle
    }
    #[inline]
    pub fn desc(&self) -> &BufferDesc {
        &self.desc
    }
    #[inline]
    pub fn size(&self) -> u64 {
        self.desc.byte_size
    }
    #[inline]
    pub fn device_address(&self) -> Option<vk::DeviceAddress> {
        self.device_addr
    }
    /// 仅 host visible 的 buffer 有值
    #[inline]
    pub fn mapped_slice(&self) -> Option<&[u8]> {
        self.allocation.as_ref().and_then(|a| a.mapped_slice())
    }
    #[inline]
    pub fn mapped_slice_mut(&mut self) -> Option<&mut [u8]> {
        self.allocation.as_mut().and_then(|a| a.mapped_slice_mut())
    }
}

/// image view 的用途，决定 view 的 aspect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewUsage {
    Sampled,
    Storage,
    Attachment,
}

/// 所有 image 创建后都处于 GENERAL layout
pub struct VulkanTexture {
    image: vk::Image,
    /// 外部导入的 image（例如 swapchain image）没有 allocation，也不由这里销毁
    allocation: Option<Allocation>,
    desc: TextureDesc,
    views: HashMap<(TextureSubresourceSet, ViewUsage), vk::ImageView>,
}
// new & init
impl VulkanTexture {
    pub fn new(device: &DeviceFunctions, allocator: &mut Allocator, desc: &TextureDesc) -> Self {
        let is_cube = desc.texture_type.is_cube();
        let image_ci = vk::ImageCreateInfo::default()
            .flags(if is_cube {
                vk::ImageCreateFlags::CUBE_COMPATIBLE
            } else {
                vk::ImageCreateFlags::empty()
            })
            .image_type(convert::image_type(desc.texture_type))
            .format(convert::vk_format(desc.format))
            .extent(vk::Extent3D {
                width: desc.width.max(1),
                height: desc.height.max(1),
                depth: desc.depth.max(1),
            })
            .mip_levels(desc.mip_levels.max(1))
            .array_layers(desc.array_size.max(1))
            .samples(convert::sample_count(desc.sample_count))
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(convert::image_usage(desc))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = unsafe { check(device.create_image(&image_ci, None), "vkCreateImage") };

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let allocation = allocate(
            allocator,
            &AllocationCreateDesc {
                name: &desc.debug_name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            },
        );
        unsafe {
            check(device.bind_image_memory(image, allocation.memory(), allocation.offset()), "vkBindImageMemory");
        }

        device.set_object_debug_name(image, format!("Image::{}", desc.debug_name));
        Self {
            image,
            allocation: Some(allocation),
            desc: desc.clone(),
            views: HashMap::new(),
        }
    }

    /// 包装一个外部创建的 image
    pub fn from_external(image: vk::Image, desc: &TextureDesc) -> Self {
        Self {
            image,
            allocation: None,
            desc: desc.clone(),
            views: HashMap::new(),
        }
    }

    pub fn destroy(mut self, device: &DeviceFunctions, allocator: &mut Allocator) {
        unsafe {
            for (_, view) in self.views.drain() {
                device.destroy_image_view(view, None);
            }
            if let Some(allocation) = self.allocation.take() {
                device.destroy_image(self.image, None);
                free(allocator, allocation);
            }
        }
    }
}
// getters
impl VulkanTexture {
    #[inline]
    pub fn vk_image(&self) -> vk::Image {
        self.image
    }
    #[inline]
    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }
    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        convert::aspect_flags(self.desc.format)
    }

    pub fn subresource_range(&self, subresources: TextureSubresourceSet) -> vk::ImageSubresourceRange {
        let subresources = subresources.resolve(&self.desc);
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect(),
            base_mip_level: subresources.base_mip_level,
            level_count: subresources.num_mip_levels,
            base_array_layer: subresources.base_array_slice,
            layer_count: subresources.num_array_slices,
        }
    }
}
// tools
impl VulkanTexture {
    /// 按需创建并缓存 image view
    pub fn view(&mut self, device: &DeviceFunctions, subresources: TextureSubresourceSet, usage: ViewUsage) -> vk::ImageView {
        let subresources = subresources.resolve(&self.desc);
        if let Some(view) = self.views.get(&(subresources, usage)) {
            return *view;
        }

        let mut range = self.subresource_range(subresources);
        // 采样深度模板纹理时只能使用深度 aspect
        if usage == ViewUsage::Sampled && self.desc.format.info().has_depth {
            range.aspect_mask = vk::ImageAspectFlags::DEPTH;
        }
        let view_ci = vk::ImageViewCreateInfo::default()
            .image(self.image)
            .view_type(convert::image_view_type(self.desc.texture_type, range.layer_count))
            .format(convert::vk_format(self.desc.format))
            .subresource_range(range);
        let view = unsafe { check(device.create_image_view(&view_ci, None), "vkCreateImageView") };
        device.set_object_debug_name(view, format!("ImageView::{}", self.desc.debug_name));

        self.views.insert((subresources, usage), view);
        view
    }
}

/// 单个 BLAS 与引用它的单实例 TLAS
pub struct VulkanAccelStruct {
    pub(crate) desc: AccelStructDesc,

    pub(crate) blas: vk::AccelerationStructureKHR,
    pub(crate) blas_buffer: VulkanBuffer,
    pub(crate) tlas: vk::AccelerationStructureKHR,
    pub(crate) tlas_buffer: VulkanBuffer,
    /// CPU 可写的 instance buffer
    pub(crate) instance_buffer: VulkanBuffer,
}
impl VulkanAccelStruct {
    pub fn destroy(self, device: &DeviceFunctions, allocator: &mut Allocator) {
        unsafe {
            device.acceleration_structure().destroy_acceleration_structure(self.tlas, None);
            device.acceleration_structure().destroy_acceleration_structure(self.blas, None);
        }
        self.tlas_buffer.destroy(device, allocator);
        self.blas_buffer.destroy(device, allocator);
        self.instance_buffer.destroy(device, allocator);
    }

    #[inline]
    pub fn tlas(&self) -> vk::AccelerationStructureKHR {
        self.tlas
    }
}
