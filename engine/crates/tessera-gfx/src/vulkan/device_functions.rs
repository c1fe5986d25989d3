use std::ffi::{CStr, CString};
use std::ops::Deref;

use ash::vk;

/// 逻辑设备以及各个扩展的函数指针
///
/// 逻辑设备由外部创建，这里只负责加载函数指针。
/// 未启用的扩展同样会被加载，但调用其函数是未定义行为，由 `VulkanDevice` 根据开关避免调用。
///
/// # 扩展
/// - Dynamic Rendering (KHR)
/// - Acceleration Structure (KHR)，仅在开启光追时使用
/// - Mesh Shader (EXT)
/// - Debug Utils (EXT)，可选
pub struct DeviceFunctions {
    pub(crate) device: ash::Device,
    pub(crate) dynamic_rendering: ash::khr::dynamic_rendering::Device,
    pub(crate) acceleration_structure: ash::khr::acceleration_structure::Device,
    pub(crate) mesh_shader: ash::ext::mesh_shader::Device,
    pub(crate) debug_utils: Option<ash::ext::debug_utils::Device>,
}

// new & init
impl DeviceFunctions {
    pub fn new(instance: &ash::Instance, device: &ash::Device, enable_debug_utils: bool) -> Self {
        Self {
            device: device.clone(),
            dynamic_rendering: ash::khr::dynamic_rendering::Device::new(instance, device),
            acceleration_structure: ash::khr::acceleration_structure::Device::new(instance, device),
            mesh_shader: ash::ext::mesh_shader::Device::new(instance, device),
            debug_utils: enable_debug_utils.then(|| ash::ext::debug_utils::Device::new(instance, device)),
        }
    }

    /// 创建逻辑设备时需要启用的扩展
    pub fn required_extensions(raytracing: bool, mesh_shader: bool) -> Vec<&'static CStr> {
        let mut exts = vec![ash::khr::swapchain::NAME, ash::khr::dynamic_rendering::NAME];

        if raytracing {
            exts.append(&mut vec![
                ash::khr::acceleration_structure::NAME,
                ash::khr::ray_query::NAME,
                ash::khr::deferred_host_operations::NAME,
            ]);
        }
        if mesh_shader {
            exts.push(ash::ext::mesh_shader::NAME);
        }

        exts
    }

    /// 必要的 core features
    pub fn required_core_features() -> vk::PhysicalDeviceFeatures {
        vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(true)
            .fragment_stores_and_atomics(true)
            .independent_blend(true)
            .depth_clamp(true)
            .fill_mode_non_solid(true)
            .tessellation_shader(true)
            .geometry_shader(true)
            .dual_src_blend(true)
    }

    /// 必要的扩展 features，需要串到 `PhysicalDeviceFeatures2` 的 p_next 上
    pub fn required_extra_features(raytracing: bool, mesh_shader: bool) -> Vec<Box<dyn vk::ExtendsPhysicalDeviceFeatures2>> {
        let mut features: Vec<Box<dyn vk::ExtendsPhysicalDeviceFeatures2>> = vec![
            Box::new(vk::PhysicalDeviceDynamicRenderingFeatures::default().dynamic_rendering(true)),
            Box::new(vk::PhysicalDeviceSynchronization2Features::default().synchronization2(true)),
            Box::new(vk::PhysicalDeviceTimelineSemaphoreFeatures::default().timeline_semaphore(true)),
            Box::new(vk::PhysicalDeviceHostQueryResetFeatures::default().host_query_reset(true)),
        ];
        if raytracing {
            features.push(Box::new(
                vk::PhysicalDeviceBufferDeviceAddressFeatures::default().buffer_device_address(true),
            ));
            features.push(Box::new(
                vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default().acceleration_structure(true),
            ));
            features.push(Box::new(vk::PhysicalDeviceRayQueryFeaturesKHR::default().ray_query(true)));
        }
        if mesh_shader {
            features.push(Box::new(
                vk::PhysicalDeviceMeshShaderFeaturesEXT::default().mesh_shader(true).task_shader(true),
            ));
        }
        features
    }
}

// getters
impl DeviceFunctions {
    #[inline]
    pub fn vk_handle(&self) -> vk::Device {
        self.device.handle()
    }
    #[inline]
    pub fn dynamic_rendering(&self) -> &ash::khr::dynamic_rendering::Device {
        &self.dynamic_rendering
    }
    #[inline]
    pub fn acceleration_structure(&self) -> &ash::khr::acceleration_structure::Device {
        &self.acceleration_structure
    }
    #[inline]
    pub fn mesh_shader(&self) -> &ash::ext::mesh_shader::Device {
        &self.mesh_shader
    }
}

// tools
impl DeviceFunctions {
    /// 未启用 debug utils 时什么也不做
    pub fn set_object_debug_name<T: vk::Handle + Copy>(&self, handle: T, name: impl AsRef<str>) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name.as_ref()) else {
            log::warn!("debug name contains a nul byte: {:?}", name.as_ref());
            return;
        };
        unsafe {
            if let Err(e) = debug_utils.set_debug_utils_object_name(
                &vk::DebugUtilsObjectNameInfoEXT::default().object_name(name.as_c_str()).object_handle(handle),
            ) {
                log::warn!("failed to set debug name: {e}");
            }
        }
    }

    #[inline]
    pub fn wait_idle(&self) {
        unsafe {
            check(self.device.device_wait_idle(), "vkDeviceWaitIdle");
        }
    }
}

impl Deref for DeviceFunctions {
    type Target = ash::Device;
    fn deref(&self) -> &Self::Target {
        &self.device
    }
}

/// 后端调用失败视为致命错误
#[inline]
#[track_caller]
pub(crate) fn check<T>(result: ash::prelude::VkResult<T>, what: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("{what} failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_extensions() {
        let basic = DeviceFunctions::required_extensions(false, false);
        assert!(basic.contains(&ash::khr::dynamic_rendering::NAME));
        assert!(!basic.contains(&ash::khr::acceleration_structure::NAME));

        let all = DeviceFunctions::required_extensions(true, true);
        assert!(all.contains(&ash::khr::acceleration_structure::NAME));
        assert!(all.contains(&ash::ext::mesh_shader::NAME));
    }

    #[test]
    fn test_required_extra_features() {
        assert_eq!(DeviceFunctions::required_extra_features(false, false).len(), 4);
        assert_eq!(DeviceFunctions::required_extra_features(true, true).len(), 8);
    }
}
