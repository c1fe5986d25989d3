use ash::vk;
use gpu_allocator::vulkan::Allocator;

use crate::vulkan::device_functions::{DeviceFunctions, check};
use crate::vulkan::pipelines::VulkanBindingLayout;
use crate::vulkan::resources::{VulkanAccelStruct, VulkanBuffer, VulkanTexture};

/// 所有提交共用的 timeline semaphore
///
/// 每次 submit 都会 signal 一个递增的值，销毁与 command pool 的重置都以该值为准
pub struct Timeline {
    semaphore: vk::Semaphore,
    /// 最近一次 submit signal 的值
    submitted: u64,
}
// 创建与销毁
impl Timeline {
    pub fn new(device: &DeviceFunctions) -> Self {
        let mut timeline_type_ci = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(0);
        let semaphore_ci = vk::SemaphoreCreateInfo::default().push_next(&mut timeline_type_ci);
        let semaphore = unsafe { check(device.create_semaphore(&semaphore_ci, None), "vkCreateSemaphore") };
        device.set_object_debug_name(semaphore, "Semaphore::submit-timeline");

        Self { semaphore, submitted: 0 }
    }

    pub fn destroy(&self, device: &DeviceFunctions) {
        unsafe {
            device.destroy_semaphore(self.semaphore, None);
        }
    }
}
// getters
impl Timeline {
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }

    #[inline]
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// 下一次 submit 将要 signal 的值
    #[inline]
    pub fn next_value(&self) -> u64 {
        self.submitted + 1
    }

    pub fn completed(&self, device: &DeviceFunctions) -> u64 {
        unsafe { check(device.get_semaphore_counter_value(self.semaphore), "vkGetSemaphoreCounterValue") }
    }
}
// tools
impl Timeline {
    /// 占用下一个值，返回值用于本次 submit 的 signal
    #[inline]
    pub fn advance(&mut self) -> u64 {
        self.submitted += 1;
        self.submitted
    }

    pub fn wait(&self, device: &DeviceFunctions, value: u64) {
        if value == 0 {
            return;
        }
        unsafe {
            let semaphores = [self.semaphore];
            let wait_info = vk::SemaphoreWaitInfo::default()
                .semaphores(&semaphores)
                .values(std::slice::from_ref(&value));
            check(device.wait_semaphores(&wait_info, u64::MAX), "vkWaitSemaphores");
        }
    }
}

/// 一个 frame slot 持有的 command pool 与 command buffer
pub struct FrameSlot {
    command_pool: vk::CommandPool,
    /// 已经分配、可以复用的 command buffer
    free_command_buffers: Vec<vk::CommandBuffer>,
    /// 本轮已经使用过的 command buffer，在 pool 重置后回到 free 列表
    used_command_buffers: Vec<vk::CommandBuffer>,
    /// 本 slot 最近一次 submit signal 的 timeline 值
    last_submitted: u64,
}
// 创建与销毁
impl FrameSlot {
    pub fn new(device: &DeviceFunctions, queue_family_index: u32, slot: usize) -> Self {
        let pool_ci = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let command_pool = unsafe { check(device.create_command_pool(&pool_ci, None), "vkCreateCommandPool") };
        device.set_object_debug_name(command_pool, format!("CommandPool::frame-{slot}"));

        Self {
            command_pool,
            free_command_buffers: vec![],
            used_command_buffers: vec![],
            last_submitted: 0,
        }
    }

    pub fn destroy(self, device: &DeviceFunctions) {
        unsafe {
            // pool 销毁时其中的 command buffer 一并释放
            device.destroy_command_pool(self.command_pool, None);
        }
    }
}
// tools
impl FrameSlot {
    /// 取出一个 command buffer 并开始录制
    pub fn begin_command_buffer(&mut self, device: &DeviceFunctions) -> vk::CommandBuffer {
        let command_buffer = match self.free_command_buffers.pop() {
            Some(command_buffer) => command_buffer,
            None => {
                let allocate_info = vk::CommandBufferAllocateInfo::default()
                    .command_pool(self.command_pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1);
                unsafe { check(device.allocate_command_buffers(&allocate_info), "vkAllocateCommandBuffers")[0] }
            }
        };
        self.used_command_buffers.push(command_buffer);

        unsafe {
            check(
                device.begin_command_buffer(
                    command_buffer,
                    &vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
                ),
                "vkBeginCommandBuffer",
            );
        }
        command_buffer
    }

    #[inline]
    pub fn mark_submitted(&mut self, value: u64) {
        self.last_submitted = value;
    }

    #[inline]
    pub fn last_submitted(&self) -> u64 {
        self.last_submitted
    }

    /// 调用前必须确保本 slot 的提交都已经完成
    pub fn reset(&mut self, device: &DeviceFunctions) {
        unsafe {
            check(
                device.reset_command_pool(self.command_pool, vk::CommandPoolResetFlags::empty()),
                "vkResetCommandPool",
            );
        }
        self.free_command_buffers.append(&mut self.used_command_buffers);
    }
}

/// 等待 GPU 用完后才能销毁的对象
pub enum DeferredDestroy {
    Buffer(VulkanBuffer),
    Texture(VulkanTexture),
    AccelStruct(VulkanAccelStruct),
    ShaderModule(vk::ShaderModule),
    BindingLayout(VulkanBindingLayout),
    BindingSet(vk::DescriptorSet),
    Pipeline(vk::Pipeline),
}
impl DeferredDestroy {
    pub fn destroy(self, device: &DeviceFunctions, allocator: &mut Allocator, descriptor_pool: vk::DescriptorPool) {
        match self {
            DeferredDestroy::Buffer(buffer) => buffer.destroy(device, allocator),
            DeferredDestroy::Texture(texture) => texture.destroy(device, allocator),
            DeferredDestroy::AccelStruct(accel_struct) => accel_struct.destroy(device, allocator),
            DeferredDestroy::ShaderModule(module) => unsafe { device.destroy_shader_module(module, None) },
            DeferredDestroy::BindingLayout(layout) => layout.destroy(device),
            DeferredDestroy::BindingSet(set) => unsafe {
                if let Err(e) = device.free_descriptor_sets(descriptor_pool, &[set]) {
                    log::error!("failed to free descriptor set: {e}");
                }
            },
            DeferredDestroy::Pipeline(pipeline) => unsafe { device.destroy_pipeline(pipeline, None) },
        }
    }
}

/// 按 timeline 值排队的延迟销毁队列
#[derive(Default)]
pub struct DeferredQueue {
    /// (需要等待的 timeline 值, 对象)，值单调不减
    pending: Vec<(u64, DeferredDestroy)>,
}
impl DeferredQueue {
    #[inline]
    pub fn push(&mut self, retire_value: u64, object: DeferredDestroy) {
        self.pending.push((retire_value, object));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// 取出所有 timeline 值不大于 `completed` 的对象
    pub fn drain_retired(&mut self, completed: u64) -> Vec<DeferredDestroy> {
        let split = self.pending.partition_point(|(value, _)| *value <= completed);
        self.pending.drain(..split).map(|(_, object)| object).collect()
    }

    pub fn drain_all(&mut self) -> Vec<DeferredDestroy> {
        self.pending.drain(..).map(|(_, object)| object).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deferred_queue_retire_order() {
        let mut queue = DeferredQueue::default();
        queue.push(1, DeferredDestroy::Pipeline(vk::Pipeline::null()));
        queue.push(2, DeferredDestroy::Pipeline(vk::Pipeline::null()));
        queue.push(2, DeferredDestroy::ShaderModule(vk::ShaderModule::null()));
        queue.push(5, DeferredDestroy::Pipeline(vk::Pipeline::null()));

        // 还没有任何提交完成
        assert!(queue.drain_retired(0).is_empty());
        assert_eq!(queue.drain_retired(2).len(), 3);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain_all().len(), 1);
        assert!(queue.is_empty());
    }
}
