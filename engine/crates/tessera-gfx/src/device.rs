//! 渲染核心所消费的设备接口
//!
//! 核心只持有 [`GfxDevice`] 返回的不透明 id，所有 GPU 对象的创建、命令录制与帧同步都经过该 trait。
//! 管线创建对调用者而言不会失败：后端在创建失败时直接 panic。

use slotmap::new_key_type;

use crate::descriptors::binding::{BindingLayoutDesc, BindingSetDesc};
use crate::pipelines::pipeline_desc::{
    ComputePipelineDesc, FramebufferInfo, GraphicsPipelineDesc, MeshletPipelineDesc, ShaderStage,
};
use crate::pipelines::render_state::{ScissorRect, VariableRateShadingState, ViewportState};
use crate::resources::resource_desc::{
    AccelStructDesc, BufferDesc, IndexFormat, TextureDesc, TextureSubresourceSet,
};

new_key_type! {
    pub struct GpuBufferId;
    pub struct GpuTextureId;
    pub struct GpuAccelStructId;
    pub struct ShaderModuleId;
    pub struct BindingLayoutId;
    pub struct BindingSetId;
    pub struct PipelineId;
}

/// framebuffer 中的一个附件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferAttachment {
    pub texture: GpuTextureId,
    pub mip_level: u32,
    pub base_array_slice: u32,
    pub num_array_slices: u32,
}

/// 一次 pass 的渲染目标
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FramebufferTargets {
    pub colors: Vec<FramebufferAttachment>,
    pub depth: Option<FramebufferAttachment>,
    /// 深度附件只读（深度写入关闭时使用）
    pub depth_read_only: bool,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBufferBinding {
    pub buffer: GpuBufferId,
    pub slot: u32,
    pub offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexBufferBinding {
    pub buffer: GpuBufferId,
    pub format: IndexFormat,
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsState {
    pub pipeline: PipelineId,
    pub framebuffer: FramebufferTargets,
    pub viewport: ViewportState,
    pub scissor: ScissorRect,
    pub shading_rate: VariableRateShadingState,
    pub binding_set: Option<BindingSetId>,
    pub vertex_buffers: Vec<VertexBufferBinding>,
    pub index_buffer: Option<IndexBufferBinding>,
    pub indirect_buffer: Option<GpuBufferId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputeState {
    pub pipeline: PipelineId,
    pub binding_set: Option<BindingSetId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshletState {
    pub pipeline: PipelineId,
    pub framebuffer: FramebufferTargets,
    pub viewport: ViewportState,
    pub scissor: ScissorRect,
    pub binding_set: Option<BindingSetId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawArguments {
    /// 非 indexed 时为顶点数，indexed 时为 index 数
    pub vertex_count: u32,
    pub instance_count: u32,
    pub start_index_location: u32,
    pub start_vertex_location: u32,
    pub start_instance_location: u32,
}
impl Default for DrawArguments {
    fn default() -> Self {
        Self {
            vertex_count: 0,
            instance_count: 1,
            start_index_location: 0,
            start_vertex_location: 0,
            start_instance_location: 0,
        }
    }
}

pub trait GfxDevice {
    // buffer
    fn create_buffer(&mut self, desc: &BufferDesc) -> GpuBufferId;
    fn destroy_buffer(&mut self, buffer: GpuBufferId);
    fn buffer_desc(&self, buffer: GpuBufferId) -> Option<&BufferDesc>;
    /// 录制一次 buffer 写入
    fn write_buffer(&mut self, buffer: GpuBufferId, offset: u64, data: &[u8]);
    fn copy_buffer(&mut self, dst: GpuBufferId, dst_offset: u64, src: GpuBufferId, src_offset: u64, size: u64);
    /// 阻塞式回读：提交已录制的命令，等待 GPU 空闲后返回 buffer 的全部内容
    fn read_buffer(&mut self, buffer: GpuBufferId) -> Vec<u8>;

    // texture
    fn create_texture(&mut self, desc: &TextureDesc) -> GpuTextureId;
    fn destroy_texture(&mut self, texture: GpuTextureId);
    fn texture_desc(&self, texture: GpuTextureId) -> Option<&TextureDesc>;
    /// `data` 为 mip 层 `mip` 的一个 array layer 的紧密排列数据
    fn write_texture(&mut self, texture: GpuTextureId, layer: u32, mip: u32, data: &[u8]);
    /// 深度格式只使用 `color[0]` 作为深度清除值
    fn clear_texture(&mut self, texture: GpuTextureId, subresources: TextureSubresourceSet, color: [f32; 4]);
    /// 采样数不同时执行 resolve
    fn copy_texture(&mut self, dst: GpuTextureId, src: GpuTextureId);
    /// 由 mip 0 逐级生成其余 mip
    fn generate_mipmaps(&mut self, texture: GpuTextureId);
    /// 阻塞式回读 mip 0 的所有 layer
    fn read_texture(&mut self, texture: GpuTextureId) -> Vec<u8>;

    // acceleration structure
    fn create_accel_struct(&mut self, desc: &AccelStructDesc) -> GpuAccelStructId;
    fn update_accel_struct(&mut self, accel_struct: GpuAccelStructId, desc: &AccelStructDesc);
    fn destroy_accel_struct(&mut self, accel_struct: GpuAccelStructId);

    // shader module & binding
    fn create_shader_module(&mut self, stage: ShaderStage, spirv: &[u32]) -> ShaderModuleId;
    fn destroy_shader_module(&mut self, module: ShaderModuleId);
    fn create_binding_layout(&mut self, desc: &BindingLayoutDesc) -> BindingLayoutId;
    fn destroy_binding_layout(&mut self, layout: BindingLayoutId);
    fn create_binding_set(&mut self, layout: BindingLayoutId, desc: &BindingSetDesc) -> BindingSetId;
    fn destroy_binding_set(&mut self, set: BindingSetId);

    // pipeline
    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc, fb_info: &FramebufferInfo) -> PipelineId;
    fn create_compute_pipeline(&mut self, desc: &ComputePipelineDesc) -> PipelineId;
    fn create_meshlet_pipeline(&mut self, desc: &MeshletPipelineDesc, fb_info: &FramebufferInfo) -> PipelineId;
    fn destroy_pipeline(&mut self, pipeline: PipelineId);

    // 命令录制
    fn set_graphics_state(&mut self, state: &GraphicsState);
    fn draw(&mut self, args: &DrawArguments);
    fn draw_indexed(&mut self, args: &DrawArguments);
    fn draw_indirect(&mut self, offset_bytes: u64, draw_count: u32);
    fn draw_indexed_indirect(&mut self, offset_bytes: u64, draw_count: u32);
    fn set_compute_state(&mut self, state: &ComputeState);
    fn dispatch(&mut self, groups_x: u32, groups_y: u32, groups_z: u32);
    fn set_meshlet_state(&mut self, state: &MeshletState);
    fn dispatch_mesh(&mut self, groups_x: u32, groups_y: u32, groups_z: u32);

    // timer query
    fn begin_timer_query(&mut self);
    fn end_timer_query(&mut self);
    /// 等待 GPU 空闲后返回上一次查询的耗时，单位为秒
    fn timer_query_result(&mut self) -> f32;

    // 帧同步
    /// 等待该 slot 上一轮的提交完成，回收其延迟销毁的对象，然后开始录制
    fn begin_frame(&mut self, slot: usize);
    /// 提交该 slot 录制的命令
    fn end_frame(&mut self, slot: usize);
    /// 提交已录制的命令并重新开始录制，不等待
    fn flush(&mut self);
    fn wait_idle(&mut self);
}
