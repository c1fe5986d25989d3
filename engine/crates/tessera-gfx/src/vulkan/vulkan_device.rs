//! 基于 Vulkan 1.3 的 [`GfxDevice`] 实现
//!
//! - 所有 image 始终处于 GENERAL layout，同步统一使用全局 memory barrier：
//!   render pass 之外的每个命令以及每次 begin rendering 之前都会插入一次
//! - 渲染使用 dynamic rendering，framebuffer 变化时才重新 begin rendering
//! - 所有提交共用一个 timeline semaphore，延迟销毁与 command pool 的回收都以其值为准

mod acceleration;
mod draw;
mod transfer;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use slotmap::SlotMap;

use crate::descriptors::binding::{BindingLayoutDesc, BindingSetDesc, BindingSetItem};
use crate::device::{
    BindingLayoutId, BindingSetId, ComputeState, DrawArguments, GfxDevice, GpuAccelStructId, GpuBufferId, GpuTextureId,
    GraphicsState, MeshletState, PipelineId, ShaderModuleId,
};
use crate::pipelines::pipeline_desc::{
    ComputePipelineDesc, FramebufferInfo, GraphicsPipelineDesc, MeshletPipelineDesc, ShaderStage,
};
use crate::resources::resource_desc::{
    AccelStructDesc, BufferDesc, BufferKind, TextureDesc, TextureSubresourceSet,
};
use crate::vulkan::convert;
use crate::vulkan::descriptors::{DescriptorAllocator, DescriptorWrite, SamplerCache};
use crate::vulkan::device_functions::{DeviceFunctions, check};
use crate::vulkan::frame::{DeferredDestroy, DeferredQueue, FrameSlot, Timeline};
use crate::vulkan::pipelines::{self, VulkanBindingLayout, VulkanPipeline};
use crate::vulkan::resources::{VulkanAccelStruct, VulkanBuffer, VulkanTexture, ViewUsage};

/// 逻辑设备与 queue 由外部创建，需要启用 [`DeviceFunctions::required_extensions`] 中的扩展
pub struct VulkanDeviceCreateInfo {
    pub instance: ash::Instance,
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub queue: vk::Queue,
    pub queue_family_index: u32,

    pub frames_in_flight: usize,
    pub raytracing: bool,
    pub debug_utils: bool,
}

pub struct VulkanDevice {
    functions: DeviceFunctions,
    allocator: Allocator,
    queue: vk::Queue,
    raytracing: bool,
    /// 每个 timestamp tick 的纳秒数
    timestamp_period: f32,

    timeline: Timeline,
    frames: Vec<FrameSlot>,
    current_slot: usize,
    /// 正在录制的 command buffer，第一次录制命令时才开始
    recording: Option<vk::CommandBuffer>,
    deferred: DeferredQueue,

    descriptor_allocator: DescriptorAllocator,
    sampler_cache: SamplerCache,
    empty_pipeline_layout: vk::PipelineLayout,
    timer_query_pool: vk::QueryPool,
    timer_query_issued: bool,

    buffers: SlotMap<GpuBufferId, VulkanBuffer>,
    textures: SlotMap<GpuTextureId, VulkanTexture>,
    accel_structs: SlotMap<GpuAccelStructId, VulkanAccelStruct>,
    shader_modules: SlotMap<ShaderModuleId, (ShaderStage, vk::ShaderModule)>,
    binding_layouts: SlotMap<BindingLayoutId, VulkanBindingLayout>,
    binding_sets: SlotMap<BindingSetId, vk::DescriptorSet>,
    pipelines: SlotMap<PipelineId, VulkanPipeline>,

    /// 当前 dynamic rendering 使用的渲染目标
    active_rendering: Option<crate::device::FramebufferTargets>,
    indirect_buffer: Option<GpuBufferId>,
}

// new & init
impl VulkanDevice {
    pub fn new(info: VulkanDeviceCreateInfo) -> Self {
        let functions = DeviceFunctions::new(&info.instance, &info.device, info.debug_utils);

        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: info.instance.clone(),
            device: info.device.clone(),
            physical_device: info.physical_device,
            debug_settings: Default::default(),
            buffer_device_address: info.raytracing,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => panic!("failed to create gpu allocator: {e}"),
        };

        let properties = unsafe { info.instance.get_physical_device_properties(info.physical_device) };

        let frames_in_flight = info.frames_in_flight.max(1);
        let frames = (0..frames_in_flight)
            .map(|slot| FrameSlot::new(&functions, info.queue_family_index, slot))
            .collect();

        let timer_query_pool = unsafe {
            check(
                functions.create_query_pool(
                    &vk::QueryPoolCreateInfo::default().query_type(vk::QueryType::TIMESTAMP).query_count(2),
                    None,
                ),
                "vkCreateQueryPool",
            )
        };

        log::info!(
            "vulkan device: {:?}, frames in flight: {}, raytracing: {}",
            properties.device_name_as_c_str().unwrap_or_default(),
            frames_in_flight,
            info.raytracing
        );

        Self {
            timeline: Timeline::new(&functions),
            descriptor_allocator: DescriptorAllocator::new(&functions, info.raytracing),
            empty_pipeline_layout: pipelines::create_empty_pipeline_layout(&functions),
            functions,
            allocator,
            queue: info.queue,
            raytracing: info.raytracing,
            timestamp_period: properties.limits.timestamp_period,

            frames,
            current_slot: 0,
            recording: None,
            deferred: DeferredQueue::default(),

            sampler_cache: SamplerCache::default(),
            timer_query_pool,
            timer_query_issued: false,

            buffers: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            accel_structs: SlotMap::with_key(),
            shader_modules: SlotMap::with_key(),
            binding_layouts: SlotMap::with_key(),
            binding_sets: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),

            active_rendering: None,
            indirect_buffer: None,
        }
    }

    /// 包装一个外部创建的 image（例如 swapchain image），调用者负责其 layout 与生命周期
    pub fn import_texture(&mut self, image: vk::Image, desc: &TextureDesc) -> GpuTextureId {
        self.textures.insert(VulkanTexture::from_external(image, desc))
    }
}
impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("destroying vulkan device");
        self.submit();
        self.functions.wait_idle();

        let functions = &self.functions;
        let allocator = &mut self.allocator;
        let pool = self.descriptor_allocator.pool();
        for object in self.deferred.drain_all() {
            object.destroy(functions, allocator, pool);
        }
        for (_, pipeline) in self.pipelines.drain() {
            unsafe { functions.destroy_pipeline(pipeline.handle, None) };
        }
        for (_, layout) in self.binding_layouts.drain() {
            layout.destroy(functions);
        }
        for (_, (_, module)) in self.shader_modules.drain() {
            unsafe { functions.destroy_shader_module(module, None) };
        }
        for (_, accel_struct) in self.accel_structs.drain() {
            accel_struct.destroy(functions, allocator);
        }
        for (_, texture) in self.textures.drain() {
            texture.destroy(functions, allocator);
        }
        for (_, buffer) in self.buffers.drain() {
            buffer.destroy(functions, allocator);
        }
        self.binding_sets.clear();
        self.sampler_cache.destroy(functions);

        unsafe {
            functions.destroy_pipeline_layout(self.empty_pipeline_layout, None);
            functions.destroy_query_pool(self.timer_query_pool, None);
        }
        // 销毁 pool 时其中的 set 一并释放
        self.descriptor_allocator.destroy(functions);
        for frame in self.frames.drain(..) {
            frame.destroy(functions);
        }
        self.timeline.destroy(functions);
    }
}

// getters
impl VulkanDevice {
    #[inline]
    pub fn functions(&self) -> &DeviceFunctions {
        &self.functions
    }
    #[inline]
    pub fn raytracing_enabled(&self) -> bool {
        self.raytracing
    }
    #[inline]
    pub fn vk_image(&self, texture: GpuTextureId) -> Option<vk::Image> {
        self.textures.get(texture).map(|t| t.vk_image())
    }
    #[inline]
    pub fn vk_buffer(&self, buffer: GpuBufferId) -> Option<vk::Buffer> {
        self.buffers.get(buffer).map(|b| b.vk_buffer())
    }
    /// 正在录制的 command buffer，供外部（例如 present 前的 layout 转换）追加命令
    pub fn command_buffer(&mut self) -> vk::CommandBuffer {
        self.end_rendering();
        self.cmd()
    }
}

// tools
impl VulkanDevice {
    /// 返回正在录制的 command buffer，必要时开始录制
    fn cmd(&mut self) -> vk::CommandBuffer {
        if let Some(cmd) = self.recording {
            return cmd;
        }
        let cmd = self.frames[self.current_slot].begin_command_buffer(&self.functions);
        self.recording = Some(cmd);
        cmd
    }

    /// 提交正在录制的命令，signal timeline 的下一个值
    fn submit(&mut self) {
        self.end_rendering();
        let Some(cmd) = self.recording.take() else {
            return;
        };

        let value = self.timeline.advance();
        unsafe {
            check(self.functions.end_command_buffer(cmd), "vkEndCommandBuffer");

            let command_buffer_infos = [vk::CommandBufferSubmitInfo::default().command_buffer(cmd)];
            let signal_infos = [vk::SemaphoreSubmitInfo::default()
                .semaphore(self.timeline.handle())
                .value(value)
                .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)];
            let submit_info = vk::SubmitInfo2::default()
                .command_buffer_infos(&command_buffer_infos)
                .signal_semaphore_infos(&signal_infos);
            check(
                self.functions.queue_submit2(self.queue, std::slice::from_ref(&submit_info), vk::Fence::null()),
                "vkQueueSubmit2",
            );
        }
        self.frames[self.current_slot].mark_submitted(value);
    }

    /// 提交并等待所有已提交的命令完成
    fn submit_and_wait(&mut self) {
        self.submit();
        self.timeline.wait(&self.functions, self.timeline.submitted());
        self.collect_garbage();
    }

    /// 对象可能被正在录制的命令引用，因此要等到下一次提交完成后才能销毁
    fn defer_destroy(&mut self, object: DeferredDestroy) {
        let retire_value = if self.recording.is_some() {
            self.timeline.next_value()
        } else {
            self.timeline.submitted()
        };
        self.deferred.push(retire_value, object);
    }

    fn collect_garbage(&mut self) {
        let completed = self.timeline.completed(&self.functions);
        let pool = self.descriptor_allocator.pool();
        for object in self.deferred.drain_retired(completed) {
            object.destroy(&self.functions, &mut self.allocator, pool);
        }
    }

    /// 全局 memory barrier，不能在 rendering 内部调用
    fn global_barrier(&mut self) {
        debug_assert!(self.active_rendering.is_none());
        let cmd = self.cmd();
        let barrier = vk::MemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .dst_access_mask(vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE);
        unsafe {
            self.functions.cmd_pipeline_barrier2(
                cmd,
                &vk::DependencyInfo::default().memory_barriers(std::slice::from_ref(&barrier)),
            );
        }
    }

    /// 结束 rendering 并插入 barrier，之后可以录制 render pass 之外的命令
    fn begin_outside_rendering(&mut self) -> vk::CommandBuffer {
        self.end_rendering();
        self.global_barrier();
        self.cmd()
    }

    fn memory_location(kind: BufferKind) -> MemoryLocation {
        match kind {
            BufferKind::Staging => MemoryLocation::GpuToCpu,
            _ => MemoryLocation::GpuOnly,
        }
    }
}

impl GfxDevice for VulkanDevice {
    fn create_buffer(&mut self, desc: &BufferDesc) -> GpuBufferId {
        let buffer = VulkanBuffer::new(
            &self.functions,
            &mut self.allocator,
            *desc,
            convert::buffer_usage(desc.kind, self.raytracing),
            Self::memory_location(desc.kind),
            &format!("{:?}", desc.kind),
        );
        self.buffers.insert(buffer)
    }

    fn destroy_buffer(&mut self, buffer: GpuBufferId) {
        if let Some(buffer) = self.buffers.remove(buffer) {
            self.defer_destroy(DeferredDestroy::Buffer(buffer));
        }
    }

    fn buffer_desc(&self, buffer: GpuBufferId) -> Option<&BufferDesc> {
        self.buffers.get(buffer).map(|b| b.desc())
    }

    fn write_buffer(&mut self, buffer: GpuBufferId, offset: u64, data: &[u8]) {
        self.record_write_buffer(buffer, offset, data);
    }

    fn copy_buffer(&mut self, dst: GpuBufferId, dst_offset: u64, src: GpuBufferId, src_offset: u64, size: u64) {
        self.record_copy_buffer(dst, dst_offset, src, src_offset, size);
    }

    fn read_buffer(&mut self, buffer: GpuBufferId) -> Vec<u8> {
        self.readback_buffer(buffer)
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> GpuTextureId {
        let texture = VulkanTexture::new(&self.functions, &mut self.allocator, desc);
        self.record_initial_layout(&texture);
        self.textures.insert(texture)
    }

    fn destroy_texture(&mut self, texture: GpuTextureId) {
        if let Some(texture) = self.textures.remove(texture) {
            self.defer_destroy(DeferredDestroy::Texture(texture));
        }
    }

    fn texture_desc(&self, texture: GpuTextureId) -> Option<&TextureDesc> {
        self.textures.get(texture).map(|t| t.desc())
    }

    fn write_texture(&mut self, texture: GpuTextureId, layer: u32, mip: u32, data: &[u8]) {
        self.record_write_texture(texture, layer, mip, data);
    }

    fn clear_texture(&mut self, texture: GpuTextureId, subresources: TextureSubresourceSet, color: [f32; 4]) {
        self.record_clear_texture(texture, subresources, color);
    }

    fn copy_texture(&mut self, dst: GpuTextureId, src: GpuTextureId) {
        self.record_copy_texture(dst, src);
    }

    fn generate_mipmaps(&mut self, texture: GpuTextureId) {
        self.record_generate_mipmaps(texture);
    }

    fn read_texture(&mut self, texture: GpuTextureId) -> Vec<u8> {
        self.readback_texture(texture)
    }

    fn create_accel_struct(&mut self, desc: &AccelStructDesc) -> GpuAccelStructId {
        let accel_struct = self.build_accel_struct(desc);
        self.accel_structs.insert(accel_struct)
    }

    fn update_accel_struct(&mut self, accel_struct: GpuAccelStructId, desc: &AccelStructDesc) {
        self.refit_accel_struct(accel_struct, desc);
    }

    fn destroy_accel_struct(&mut self, accel_struct: GpuAccelStructId) {
        if let Some(accel_struct) = self.accel_structs.remove(accel_struct) {
            self.defer_destroy(DeferredDestroy::AccelStruct(accel_struct));
        }
    }

    fn create_shader_module(&mut self, stage: ShaderStage, spirv: &[u32]) -> ShaderModuleId {
        let module_ci = vk::ShaderModuleCreateInfo::default().code(spirv);
        let module = unsafe { check(self.functions.create_shader_module(&module_ci, None), "vkCreateShaderModule") };
        self.functions.set_object_debug_name(module, format!("ShaderModule::{stage:?}"));
        self.shader_modules.insert((stage, module))
    }

    fn destroy_shader_module(&mut self, module: ShaderModuleId) {
        if let Some((_, module)) = self.shader_modules.remove(module) {
            self.defer_destroy(DeferredDestroy::ShaderModule(module));
        }
    }

    fn create_binding_layout(&mut self, desc: &BindingLayoutDesc) -> BindingLayoutId {
        let layout = VulkanBindingLayout::new(&self.functions, desc);
        self.binding_layouts.insert(layout)
    }

    fn destroy_binding_layout(&mut self, layout: BindingLayoutId) {
        if let Some(layout) = self.binding_layouts.remove(layout) {
            self.defer_destroy(DeferredDestroy::BindingLayout(layout));
        }
    }

    fn create_binding_set(&mut self, layout: BindingLayoutId, desc: &BindingSetDesc) -> BindingSetId {
        let set_layout = match self.binding_layouts.get(layout) {
            Some(layout) => layout.set_layout(),
            None => panic!("create_binding_set: invalid binding layout {layout:?}"),
        };
        let set = self.descriptor_allocator.allocate(&self.functions, set_layout);

        let writes = desc
            .items
            .iter()
            .filter_map(|item| {
                let write = self.descriptor_write(set, item);
                if write.is_none() {
                    log::error!("binding set item at slot {} references a destroyed resource", item.slot());
                }
                write
            })
            .collect::<Vec<_>>();
        DescriptorWrite::update(&self.functions, &writes);

        self.binding_sets.insert(set)
    }

    fn destroy_binding_set(&mut self, set: BindingSetId) {
        if let Some(set) = self.binding_sets.remove(set) {
            self.defer_destroy(DeferredDestroy::BindingSet(set));
        }
    }

    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc, fb_info: &FramebufferInfo) -> PipelineId {
        let layout = self.pipeline_layout_of(&desc.binding_layouts);
        let pipeline =
            pipelines::create_graphics_pipeline(&self.functions, desc, fb_info, |id| self.vk_shader_module(id), layout);
        self.pipelines.insert(pipeline)
    }

    fn create_compute_pipeline(&mut self, desc: &ComputePipelineDesc) -> PipelineId {
        let layout = self.pipeline_layout_of(&desc.binding_layouts);
        let module = self.vk_shader_module(desc.cs);
        let pipeline = pipelines::create_compute_pipeline(&self.functions, desc, module, layout);
        self.pipelines.insert(pipeline)
    }

    fn create_meshlet_pipeline(&mut self, desc: &MeshletPipelineDesc, fb_info: &FramebufferInfo) -> PipelineId {
        let layout = self.pipeline_layout_of(&desc.binding_layouts);
        let pipeline =
            pipelines::create_meshlet_pipeline(&self.functions, desc, fb_info, |id| self.vk_shader_module(id), layout);
        self.pipelines.insert(pipeline)
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineId) {
        if let Some(pipeline) = self.pipelines.remove(pipeline) {
            self.defer_destroy(DeferredDestroy::Pipeline(pipeline.handle));
        }
    }

    fn set_graphics_state(&mut self, state: &GraphicsState) {
        self.record_graphics_state(state);
    }

    fn draw(&mut self, args: &DrawArguments) {
        let cmd = self.cmd();
        unsafe {
            self.functions.cmd_draw(
                cmd,
                args.vertex_count,
                args.instance_count,
                args.start_vertex_location,
                args.start_instance_location,
            );
        }
    }

    fn draw_indexed(&mut self, args: &DrawArguments) {
        let cmd = self.cmd();
        unsafe {
            self.functions.cmd_draw_indexed(
                cmd,
                args.vertex_count,
                args.instance_count,
                args.start_index_location,
                args.start_vertex_location as i32,
                args.start_instance_location,
            );
        }
    }

    fn draw_indirect(&mut self, offset_bytes: u64, draw_count: u32) {
        self.record_draw_indirect(offset_bytes, draw_count, false);
    }

    fn draw_indexed_indirect(&mut self, offset_bytes: u64, draw_count: u32) {
        self.record_draw_indirect(offset_bytes, draw_count, true);
    }

    fn set_compute_state(&mut self, state: &ComputeState) {
        self.record_compute_state(state);
    }

    fn dispatch(&mut self, groups_x: u32, groups_y: u32, groups_z: u32) {
        let cmd = self.begin_outside_rendering();
        unsafe {
            self.functions.cmd_dispatch(cmd, groups_x, groups_y, groups_z);
        }
    }

    fn set_meshlet_state(&mut self, state: &MeshletState) {
        self.record_meshlet_state(state);
    }

    fn dispatch_mesh(&mut self, groups_x: u32, groups_y: u32, groups_z: u32) {
        let cmd = self.cmd();
        unsafe {
            self.functions.mesh_shader().cmd_draw_mesh_tasks(cmd, groups_x, groups_y, groups_z);
        }
    }

    fn begin_timer_query(&mut self) {
        let cmd = self.begin_outside_rendering();
        unsafe {
            self.functions.cmd_reset_query_pool(cmd, self.timer_query_pool, 0, 2);
            self.functions.cmd_write_timestamp2(
                cmd,
                vk::PipelineStageFlags2::ALL_COMMANDS,
                self.timer_query_pool,
                0,
            );
        }
        self.timer_query_issued = false;
    }

    fn end_timer_query(&mut self) {
        let cmd = self.cmd();
        unsafe {
            self.functions.cmd_write_timestamp2(
                cmd,
                vk::PipelineStageFlags2::ALL_COMMANDS,
                self.timer_query_pool,
                1,
            );
        }
        self.timer_query_issued = true;
    }

    fn timer_query_result(&mut self) -> f32 {
        if !self.timer_query_issued {
            log::warn!("timer query result requested before the query ended");
            return 0.0;
        }
        self.submit_and_wait();

        let mut timestamps = [0u64; 2];
        unsafe {
            check(
                self.functions.get_query_pool_results(
                    self.timer_query_pool,
                    0,
                    &mut timestamps,
                    vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT,
                ),
                "vkGetQueryPoolResults",
            );
        }
        let ticks = timestamps[1].saturating_sub(timestamps[0]);
        (ticks as f64 * self.timestamp_period as f64 * 1e-9) as f32
    }

    fn begin_frame(&mut self, slot: usize) {
        // 上一帧之外录制的命令归属于上一个 slot
        self.submit();

        self.current_slot = slot % self.frames.len();
        let last_submitted = self.frames[self.current_slot].last_submitted();
        self.timeline.wait(&self.functions, last_submitted);
        self.frames[self.current_slot].reset(&self.functions);
        self.collect_garbage();
    }

    fn end_frame(&mut self, slot: usize) {
        if slot % self.frames.len() != self.current_slot {
            log::warn!("end_frame({slot}) does not match the current frame slot {}", self.current_slot);
        }
        self.submit();
        self.collect_garbage();
    }

    fn flush(&mut self) {
        self.submit();
    }

    fn wait_idle(&mut self) {
        self.submit_and_wait();
    }
}

// 资源解析
impl VulkanDevice {
    fn vk_shader_module(&self, module: ShaderModuleId) -> vk::ShaderModule {
        match self.shader_modules.get(module) {
            Some((_, module)) => *module,
            None => panic!("invalid shader module {module:?}"),
        }
    }

    fn pipeline_layout_of(&self, binding_layouts: &[BindingLayoutId]) -> vk::PipelineLayout {
        binding_layouts
            .first()
            .and_then(|layout| self.binding_layouts.get(*layout))
            .map_or(self.empty_pipeline_layout, |layout| layout.pipeline_layout())
    }

    /// 失效的资源 id 会被跳过并记录错误
    fn descriptor_write(&mut self, set: vk::DescriptorSet, item: &BindingSetItem) -> Option<DescriptorWrite> {
        let write = match *item {
            BindingSetItem::ConstantBuffer {
                slot,
                buffer,
                offset,
                size,
            } => DescriptorWrite::buffer(
                set,
                slot,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::DescriptorBufferInfo {
                    buffer: self.buffers.get(buffer)?.vk_buffer(),
                    offset,
                    range: size,
                },
            ),
            BindingSetItem::RawBufferUav { slot, buffer } => DescriptorWrite::buffer(
                set,
                slot,
                vk::DescriptorType::STORAGE_BUFFER,
                vk::DescriptorBufferInfo {
                    buffer: self.buffers.get(buffer)?.vk_buffer(),
                    offset: 0,
                    range: vk::WHOLE_SIZE,
                },
            ),
            BindingSetItem::TextureSrv {
                slot,
                array_element,
                texture,
                subresources,
                sampler,
            } => {
                let sampler = self.sampler_cache.get_sampler(&self.functions, &sampler);
                let image_view = self.textures.get_mut(texture)?.view(&self.functions, subresources, ViewUsage::Sampled);
                DescriptorWrite::image(
                    set,
                    slot,
                    array_element,
                    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    vk::DescriptorImageInfo {
                        sampler,
                        image_view,
                        image_layout: vk::ImageLayout::GENERAL,
                    },
                )
            }
            BindingSetItem::TextureUav {
                slot,
                array_element,
                texture,
                subresources,
            } => {
                let image_view = self.textures.get_mut(texture)?.view(&self.functions, subresources, ViewUsage::Storage);
                DescriptorWrite::image(
                    set,
                    slot,
                    array_element,
                    vk::DescriptorType::STORAGE_IMAGE,
                    vk::DescriptorImageInfo {
                        sampler: vk::Sampler::null(),
                        image_view,
                        image_layout: vk::ImageLayout::GENERAL,
                    },
                )
            }
            BindingSetItem::AccelStruct { slot, accel_struct } => {
                DescriptorWrite::tlas(set, slot, self.accel_structs.get(accel_struct)?.tlas())
            }
        };
        Some(write)
    }
}
