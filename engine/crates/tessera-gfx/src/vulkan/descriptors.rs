use std::collections::HashMap;

use ash::vk;
use itertools::Itertools;

use crate::resources::sampler_state::{FilterFunc, SamplerState};
use crate::vulkan::convert;
use crate::vulkan::device_functions::{DeviceFunctions, check};

/// 对 descriptor set 中某个 binding 的一次写入
pub struct DescriptorWrite {
    pub dst_set: vk::DescriptorSet,
    pub dst_binding: u32,
    pub dst_array_element: u32,
    pub descriptor_type: vk::DescriptorType,

    pub buffer_infos: Vec<vk::DescriptorBufferInfo>,
    pub image_infos: Vec<vk::DescriptorImageInfo>,
    pub acceleration_structures: Vec<vk::AccelerationStructureKHR>,
}
impl DescriptorWrite {
    pub fn buffer(
        dst_set: vk::DescriptorSet,
        dst_binding: u32,
        descriptor_type: vk::DescriptorType,
        info: vk::DescriptorBufferInfo,
    ) -> Self {
        Self {
            dst_set,
            dst_binding,
            dst_array_element: 0,
            descriptor_type,
            buffer_infos: vec![info],
            image_infos: vec![],
            acceleration_structures: vec![],
        }
    }

    pub fn image(
        dst_set: vk::DescriptorSet,
        dst_binding: u32,
        dst_array_element: u32,
        descriptor_type: vk::DescriptorType,
        info: vk::DescriptorImageInfo,
    ) -> Self {
        Self {
            dst_set,
            dst_binding,
            dst_array_element,
            descriptor_type,
            buffer_infos: vec![],
            image_infos: vec![info],
            acceleration_structures: vec![],
        }
    }

    pub fn tlas(dst_set: vk::DescriptorSet, dst_binding: u32, tlas: vk::AccelerationStructureKHR) -> Self {
        Self {
            dst_set,
            dst_binding,
            dst_array_element: 0,
            descriptor_type: vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
            buffer_infos: vec![],
            image_infos: vec![],
            acceleration_structures: vec![tlas],
        }
    }

    fn to_vk_type(&self) -> vk::WriteDescriptorSet<'_> {
        let descriptor_count = if !self.buffer_infos.is_empty() {
            self.buffer_infos.len()
        } else if !self.image_infos.is_empty() {
            self.image_infos.len()
        } else {
            self.acceleration_structures.len()
        };

        vk::WriteDescriptorSet {
            dst_set: self.dst_set,
            dst_binding: self.dst_binding,
            dst_array_element: self.dst_array_element,
            descriptor_count: descriptor_count as u32,
            descriptor_type: self.descriptor_type,
            // 选择 buffer ptr 还是 image ptr，是由 descriptor type 控制的
            p_buffer_info: self.buffer_infos.as_ptr(),
            p_image_info: self.image_infos.as_ptr(),
            ..Default::default()
        }
    }

    /// 加速结构需要通过 p_next 链接额外的结构体
    pub fn update(device: &DeviceFunctions, writes: &[Self]) {
        let mut write_accs = writes
            .iter()
            .map(|w| {
                vk::WriteDescriptorSetAccelerationStructureKHR::default()
                    .acceleration_structures(&w.acceleration_structures)
            })
            .collect_vec();
        let vk_writes = writes
            .iter()
            .map(|w| w.to_vk_type())
            .zip(write_accs.iter_mut())
            .map(|(w, write_acc)| if write_acc.acceleration_structure_count > 0 { w.push_next(write_acc) } else { w })
            .collect_vec();
        unsafe {
            device.update_descriptor_sets(&vk_writes, &[]);
        }
    }
}

/// 全局唯一的 descriptor pool，set 可以单独释放
pub struct DescriptorAllocator {
    pool: vk::DescriptorPool,
}
impl DescriptorAllocator {
    const MAX_SETS: u32 = 4096;

    pub fn new(device: &DeviceFunctions, raytracing: bool) -> Self {
        let mut pool_sizes = vec![
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 4 * Self::MAX_SETS,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: 4 * Self::MAX_SETS,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: 8 * Self::MAX_SETS,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_IMAGE,
                descriptor_count: 4 * Self::MAX_SETS,
            },
        ];
        if raytracing {
            pool_sizes.push(vk::DescriptorPoolSize {
                ty: vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
                descriptor_count: Self::MAX_SETS,
            });
        }

        let pool_ci = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(Self::MAX_SETS)
            .pool_sizes(&pool_sizes);
        let pool = unsafe { check(device.create_descriptor_pool(&pool_ci, None), "vkCreateDescriptorPool") };
        device.set_object_debug_name(pool, "DescriptorPool::global");

        Self { pool }
    }

    pub fn destroy(&self, device: &DeviceFunctions) {
        unsafe {
            device.destroy_descriptor_pool(self.pool, None);
        }
    }

    #[inline]
    pub fn pool(&self) -> vk::DescriptorPool {
        self.pool
    }

    pub fn allocate(&self, device: &DeviceFunctions, layout: vk::DescriptorSetLayout) -> vk::DescriptorSet {
        let layouts = [layout];
        let allocate_info = vk::DescriptorSetAllocateInfo::default().descriptor_pool(self.pool).set_layouts(&layouts);
        unsafe { check(device.allocate_descriptor_sets(&allocate_info), "vkAllocateDescriptorSets")[0] }
    }
}

/// 按值去重的 sampler 缓存
#[derive(Default)]
pub struct SamplerCache {
    samplers: HashMap<SamplerState, vk::Sampler>,
}
impl SamplerCache {
    pub fn get_sampler(&mut self, device: &DeviceFunctions, state: &SamplerState) -> vk::Sampler {
        if let Some(&sampler) = self.samplers.get(state) {
            sampler
        } else {
            let sampler = Self::create_vk_sampler(device, state);
            self.samplers.insert(*state, sampler);
            sampler
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samplers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samplers.is_empty()
    }

    pub fn destroy(&mut self, device: &DeviceFunctions) {
        for (_, sampler) in self.samplers.drain() {
            unsafe {
                device.destroy_sampler(sampler, None);
            }
        }
    }

    /// 只支持三种预定义的边框颜色
    fn border_color(color: [f32; 4]) -> vk::BorderColor {
        if color == [0.0, 0.0, 0.0, 1.0] {
            vk::BorderColor::FLOAT_OPAQUE_BLACK
        } else if color == [1.0; 4] {
            vk::BorderColor::FLOAT_OPAQUE_WHITE
        } else {
            vk::BorderColor::FLOAT_TRANSPARENT_BLACK
        }
    }

    fn create_vk_sampler(device: &DeviceFunctions, state: &SamplerState) -> vk::Sampler {
        let mut reduction_ci = vk::SamplerReductionModeCreateInfo::default();
        let filter = |linear: bool| if linear { vk::Filter::LINEAR } else { vk::Filter::NEAREST };
        let mut create_info = vk::SamplerCreateInfo::default()
            .mag_filter(filter(state.mag_filter))
            .min_filter(filter(state.min_filter))
            .mipmap_mode(if state.mip_filter {
                vk::SamplerMipmapMode::LINEAR
            } else {
                vk::SamplerMipmapMode::NEAREST
            })
            .address_mode_u(convert::address_mode(state.wrap_u))
            .address_mode_v(convert::address_mode(state.wrap_v))
            .address_mode_w(convert::address_mode(state.wrap_w))
            .mip_lod_bias(state.mip_bias)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(Self::border_color(state.border_color));

        if state.max_anisotropy > 1.0 {
            create_info = create_info.anisotropy_enable(true).max_anisotropy(state.max_anisotropy);
        }

        let reduction_mode = match state.filter_func {
            FilterFunc::Standard => None,
            FilterFunc::Comparison => {
                create_info = create_info.compare_enable(true).compare_op(convert::compare_op(state.compare_func));
                None
            }
            FilterFunc::Minimum => Some(vk::SamplerReductionMode::MIN),
            FilterFunc::Maximum => Some(vk::SamplerReductionMode::MAX),
        };
        if let Some(mode) = reduction_mode {
            reduction_ci = reduction_ci.reduction_mode(mode);
            create_info = create_info.push_next(&mut reduction_ci);
        }

        unsafe { check(device.create_sampler(&create_info, None), "vkCreateSampler") }
    }
}
