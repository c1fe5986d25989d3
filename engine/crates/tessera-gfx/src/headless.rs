//! 不依赖 GPU 的设备实现
//!
//! 所有对象都保存在 SlotMap 中，buffer 与纹理的内容放在 CPU 内存里，
//! 每一条命令都追加到 [`RecordedCommand`] 日志，用于测试以及离线运行。
//! 没有 GPU 在使用资源，因此销毁是立即生效的。

use slotmap::SlotMap;

use crate::basic::format::Format;
use crate::descriptors::binding::{BindingLayoutDesc, BindingSetDesc};
use crate::device::{
    BindingLayoutId, BindingSetId, ComputeState, DrawArguments, GfxDevice, GpuAccelStructId, GpuBufferId, GpuTextureId,
    GraphicsState, MeshletState, PipelineId, ShaderModuleId,
};
use crate::pipelines::pipeline_desc::{
    ComputePipelineDesc, FramebufferInfo, GraphicsPipelineDesc, MeshletPipelineDesc, ShaderStage,
};
use crate::resources::resource_desc::{AccelStructDesc, BufferDesc, TextureDesc, TextureSubresourceSet};

/// 录制下来的一条命令
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    WriteBuffer {
        buffer: GpuBufferId,
        offset: u64,
        size: u64,
    },
    CopyBuffer {
        dst: GpuBufferId,
        src: GpuBufferId,
        size: u64,
    },
    WriteTexture {
        texture: GpuTextureId,
        layer: u32,
        mip: u32,
    },
    ClearTexture {
        texture: GpuTextureId,
        subresources: TextureSubresourceSet,
        color: [f32; 4],
    },
    CopyTexture {
        dst: GpuTextureId,
        src: GpuTextureId,
    },
    ResolveTexture {
        dst: GpuTextureId,
        src: GpuTextureId,
    },
    GenerateMipmaps {
        texture: GpuTextureId,
    },
    BuildAccelStruct {
        accel_struct: GpuAccelStructId,
        update: bool,
    },
    SetGraphicsState(GraphicsState),
    Draw(DrawArguments),
    DrawIndexed(DrawArguments),
    DrawIndirect {
        offset: u64,
        count: u32,
    },
    DrawIndexedIndirect {
        offset: u64,
        count: u32,
    },
    SetComputeState(ComputeState),
    Dispatch([u32; 3]),
    SetMeshletState(MeshletState),
    DispatchMesh([u32; 3]),
    BeginTimerQuery,
    EndTimerQuery,
    BeginFrame(usize),
    EndFrame(usize),
    Flush,
    WaitIdle,
}

struct HeadlessBuffer {
    desc: BufferDesc,
    data: Vec<u8>,
}

struct HeadlessTexture {
    desc: TextureDesc,
    /// 下标为 `layer * mip_levels + mip`
    subresources: Vec<Vec<u8>>,
}
impl HeadlessTexture {
    fn new(desc: &TextureDesc) -> Self {
        let mut subresources = Vec::with_capacity((desc.array_size * desc.mip_levels) as usize);
        for _layer in 0..desc.array_size {
            for mip in 0..desc.mip_levels {
                let (w, h, d) = desc.mip_extent(mip);
                subresources.push(vec![0; (desc.format.slice_pitch(w, h) * d as u64) as usize]);
            }
        }
        Self {
            desc: desc.clone(),
            subresources,
        }
    }

    #[inline]
    fn index(&self, layer: u32, mip: u32) -> usize {
        (layer * self.desc.mip_levels + mip) as usize
    }
}

/// 管线的创建参数，保留下来供测试检查
#[derive(Debug, Clone, PartialEq)]
pub enum HeadlessPipeline {
    Graphics(GraphicsPipelineDesc, FramebufferInfo),
    Compute(ComputePipelineDesc),
    Meshlet(MeshletPipelineDesc, FramebufferInfo),
}

#[derive(Default)]
pub struct HeadlessDevice {
    buffers: SlotMap<GpuBufferId, HeadlessBuffer>,
    textures: SlotMap<GpuTextureId, HeadlessTexture>,
    accel_structs: SlotMap<GpuAccelStructId, AccelStructDesc>,
    shader_modules: SlotMap<ShaderModuleId, (ShaderStage, Vec<u32>)>,
    binding_layouts: SlotMap<BindingLayoutId, BindingLayoutDesc>,
    binding_sets: SlotMap<BindingSetId, (BindingLayoutId, BindingSetDesc)>,
    pipelines: SlotMap<PipelineId, HeadlessPipeline>,

    commands: Vec<RecordedCommand>,

    /// 累计创建的数量，销毁不会减少
    created_pipeline_count: usize,
    created_binding_set_count: usize,
    current_frame_slot: Option<usize>,
}

// new & init
impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }
}

// getters
impl HeadlessDevice {
    #[inline]
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// 取出并清空命令日志
    pub fn take_commands(&mut self) -> Vec<RecordedCommand> {
        std::mem::take(&mut self.commands)
    }

    #[inline]
    pub fn created_pipeline_count(&self) -> usize {
        self.created_pipeline_count
    }

    #[inline]
    pub fn created_binding_set_count(&self) -> usize {
        self.created_binding_set_count
    }

    #[inline]
    pub fn live_pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    #[inline]
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    #[inline]
    pub fn live_accel_struct_count(&self) -> usize {
        self.accel_structs.len()
    }

    #[inline]
    pub fn live_binding_set_count(&self) -> usize {
        self.binding_sets.len()
    }

    #[inline]
    pub fn current_frame_slot(&self) -> Option<usize> {
        self.current_frame_slot
    }

    pub fn buffer_data(&self, buffer: GpuBufferId) -> Option<&[u8]> {
        self.buffers.get(buffer).map(|b| b.data.as_slice())
    }

    pub fn texture_data(&self, texture: GpuTextureId, layer: u32, mip: u32) -> Option<&[u8]> {
        let tex = self.textures.get(texture)?;
        if layer >= tex.desc.array_size || mip >= tex.desc.mip_levels {
            return None;
        }
        Some(tex.subresources[tex.index(layer, mip)].as_slice())
    }

    pub fn pipeline(&self, pipeline: PipelineId) -> Option<&HeadlessPipeline> {
        self.pipelines.get(pipeline)
    }

    pub fn binding_set(&self, set: BindingSetId) -> Option<&BindingSetDesc> {
        self.binding_sets.get(set).map(|(_, desc)| desc)
    }

    pub fn accel_struct(&self, accel_struct: GpuAccelStructId) -> Option<&AccelStructDesc> {
        self.accel_structs.get(accel_struct)
    }

    pub fn shader_module_stage(&self, module: ShaderModuleId) -> Option<ShaderStage> {
        self.shader_modules.get(module).map(|(stage, _)| *stage)
    }

    /// 日志中所有 dispatch 的 group 数量
    pub fn dispatches(&self) -> Vec<[u32; 3]> {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                RecordedCommand::Dispatch(groups) => Some(*groups),
                _ => None,
            })
            .collect()
    }

    /// 日志中 draw 类命令的数量
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|cmd| {
                matches!(
                    cmd,
                    RecordedCommand::Draw(_)
                        | RecordedCommand::DrawIndexed(_)
                        | RecordedCommand::DrawIndirect { .. }
                        | RecordedCommand::DrawIndexedIndirect { .. }
                        | RecordedCommand::DispatchMesh(_)
                )
            })
            .count()
    }
}

// tools
impl HeadlessDevice {
    /// 某种格式的一个像素的清除值；不支持的格式返回全 0
    fn encode_clear_value(format: Format, color: [f32; 4]) -> Vec<u8> {
        let unorm = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        match format {
            Format::R32Float | Format::D32 => bytemuck::bytes_of(&color[0]).to_vec(),
            Format::Rg32Float => bytemuck::cast_slice(&color[..2]).to_vec(),
            Format::Rgb32Float => bytemuck::cast_slice(&color[..3]).to_vec(),
            Format::Rgba32Float => bytemuck::cast_slice(&color).to_vec(),
            Format::Rgba8Unorm | Format::Srgba8Unorm => color.iter().map(|&c| unorm(c)).collect(),
            Format::Bgra8Unorm | Format::Sbgra8Unorm => {
                vec![unorm(color[2]), unorm(color[1]), unorm(color[0]), unorm(color[3])]
            }
            Format::R8Unorm => vec![unorm(color[0])],
            other => vec![0; other.size() as usize],
        }
    }

    /// 2x2 盒式滤波，支持 8 位 unorm 与 32 位浮点格式
    fn downsample(format: Format, src: &[u8], src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Option<Vec<u8>> {
        let pixel_size = format.size() as usize;
        let float_channels = match format {
            Format::R32Float => Some(1),
            Format::Rg32Float => Some(2),
            Format::Rgb32Float => Some(3),
            Format::Rgba32Float => Some(4),
            _ => None,
        };
        let byte_channels = match format {
            Format::R8Unorm => Some(1),
            Format::Rg8Unorm => Some(2),
            Format::Rgba8Unorm | Format::Srgba8Unorm | Format::Bgra8Unorm | Format::Sbgra8Unorm => Some(4),
            _ => None,
        };
        if float_channels.is_none() && byte_channels.is_none() {
            return None;
        }

        let mut dst = vec![0u8; pixel_size * (dst_w * dst_h) as usize];
        for y in 0..dst_h {
            for x in 0..dst_w {
                let taps = [
                    (2 * x, 2 * y),
                    ((2 * x + 1).min(src_w - 1), 2 * y),
                    (2 * x, (2 * y + 1).min(src_h - 1)),
                    ((2 * x + 1).min(src_w - 1), (2 * y + 1).min(src_h - 1)),
                ];
                let dst_offset = ((y * dst_w + x) as usize) * pixel_size;
                let src_offset = |(sx, sy): (u32, u32)| ((sy * src_w + sx) as usize) * pixel_size;

                if let Some(channels) = float_channels {
                    for c in 0..channels {
                        let sum: f32 = taps
                            .iter()
                            .map(|&tap| {
                                let o = src_offset(tap) + c * 4;
                                bytemuck::pod_read_unaligned::<f32>(&src[o..o + 4])
                            })
                            .sum();
                        let o = dst_offset + c * 4;
                        dst[o..o + 4].copy_from_slice(&(sum * 0.25).to_ne_bytes());
                    }
                } else if let Some(channels) = byte_channels {
                    for c in 0..channels {
                        let sum: u32 = taps.iter().map(|&tap| src[src_offset(tap) + c] as u32).sum();
                        dst[dst_offset + c] = ((sum + 2) / 4) as u8;
                    }
                }
            }
        }
        Some(dst)
    }
}

impl GfxDevice for HeadlessDevice {
    fn create_buffer(&mut self, desc: &BufferDesc) -> GpuBufferId {
        self.buffers.insert(HeadlessBuffer {
            desc: *desc,
            data: vec![0; desc.byte_size as usize],
        })
    }

    fn destroy_buffer(&mut self, buffer: GpuBufferId) {
        self.buffers.remove(buffer);
    }

    fn buffer_desc(&self, buffer: GpuBufferId) -> Option<&BufferDesc> {
        self.buffers.get(buffer).map(|b| &b.desc)
    }

    fn write_buffer(&mut self, buffer: GpuBufferId, offset: u64, data: &[u8]) {
        let Some(buf) = self.buffers.get_mut(buffer) else {
            log::error!("write to a destroyed buffer");
            return;
        };
        let begin = offset as usize;
        let end = begin + data.len();
        if end > buf.data.len() {
            log::error!("buffer write out of range: {}..{} > {}", begin, end, buf.data.len());
            return;
        }
        buf.data[begin..end].copy_from_slice(data);
        self.commands.push(RecordedCommand::WriteBuffer {
            buffer,
            offset,
            size: data.len() as u64,
        });
    }

    fn copy_buffer(&mut self, dst: GpuBufferId, dst_offset: u64, src: GpuBufferId, src_offset: u64, size: u64) {
        let Some(src_data) = self
            .buffers
            .get(src)
            .and_then(|b| b.data.get(src_offset as usize..(src_offset + size) as usize))
            .map(|s| s.to_vec())
        else {
            log::error!("invalid copy source");
            return;
        };
        let Some(dst_data) = self
            .buffers
            .get_mut(dst)
            .and_then(|b| b.data.get_mut(dst_offset as usize..(dst_offset + size) as usize))
        else {
            log::error!("invalid copy destination");
            return;
        };
        dst_data.copy_from_slice(&src_data);
        self.commands.push(RecordedCommand::CopyBuffer { dst, src, size });
    }

    fn read_buffer(&mut self, buffer: GpuBufferId) -> Vec<u8> {
        self.buffers.get(buffer).map(|b| b.data.clone()).unwrap_or_default()
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> GpuTextureId {
        self.textures.insert(HeadlessTexture::new(desc))
    }

    fn destroy_texture(&mut self, texture: GpuTextureId) {
        self.textures.remove(texture);
    }

    fn texture_desc(&self, texture: GpuTextureId) -> Option<&TextureDesc> {
        self.textures.get(texture).map(|t| &t.desc)
    }

    fn write_texture(&mut self, texture: GpuTextureId, layer: u32, mip: u32, data: &[u8]) {
        let Some(tex) = self.textures.get_mut(texture) else {
            log::error!("write to a destroyed texture");
            return;
        };
        if layer >= tex.desc.array_size || mip >= tex.desc.mip_levels {
            log::error!("texture write out of range: layer {layer}, mip {mip}");
            return;
        }
        let index = tex.index(layer, mip);
        let dst = &mut tex.subresources[index];
        let len = dst.len().min(data.len());
        dst[..len].copy_from_slice(&data[..len]);
        self.commands.push(RecordedCommand::WriteTexture { texture, layer, mip });
    }

    fn clear_texture(&mut self, texture: GpuTextureId, subresources: TextureSubresourceSet, color: [f32; 4]) {
        let Some(tex) = self.textures.get_mut(texture) else {
            log::error!("clear of a destroyed texture");
            return;
        };
        let range = subresources.resolve(&tex.desc);
        let pixel = Self::encode_clear_value(tex.desc.format, color);
        for layer in range.base_array_slice..range.base_array_slice + range.num_array_slices {
            for mip in range.base_mip_level..range.base_mip_level + range.num_mip_levels {
                let index = tex.index(layer, mip);
                if pixel.is_empty() {
                    continue;
                }
                for chunk in tex.subresources[index].chunks_exact_mut(pixel.len()) {
                    chunk.copy_from_slice(&pixel);
                }
            }
        }
        self.commands.push(RecordedCommand::ClearTexture {
            texture,
            subresources,
            color,
        });
    }

    fn copy_texture(&mut self, dst: GpuTextureId, src: GpuTextureId) {
        let (Some(src_tex), Some(dst_tex)) = (self.textures.get(src), self.textures.get(dst)) else {
            log::error!("copy between invalid textures");
            return;
        };
        let resolve = src_tex.desc.sample_count != dst_tex.desc.sample_count;
        if resolve {
            // resolve 只处理 mip 0 与 layer 0
            let data = src_tex.subresources[0].clone();
            if let Some(dst_tex) = self.textures.get_mut(dst) {
                let len = dst_tex.subresources[0].len().min(data.len());
                dst_tex.subresources[0][..len].copy_from_slice(&data[..len]);
            }
            self.commands.push(RecordedCommand::ResolveTexture { dst, src });
        } else {
            let data = src_tex.subresources.clone();
            if let Some(dst_tex) = self.textures.get_mut(dst) {
                for (d, s) in dst_tex.subresources.iter_mut().zip(data.iter()) {
                    let len = d.len().min(s.len());
                    d[..len].copy_from_slice(&s[..len]);
                }
            }
            self.commands.push(RecordedCommand::CopyTexture { dst, src });
        }
    }

    fn generate_mipmaps(&mut self, texture: GpuTextureId) {
        let Some(tex) = self.textures.get_mut(texture) else {
            log::error!("mipmap generation of a destroyed texture");
            return;
        };
        let format = tex.desc.format;
        for layer in 0..tex.desc.array_size {
            for mip in 1..tex.desc.mip_levels {
                let (src_w, src_h, _) = tex.desc.mip_extent(mip - 1);
                let (dst_w, dst_h, _) = tex.desc.mip_extent(mip);
                let src_index = tex.index(layer, mip - 1);
                let Some(data) = Self::downsample(format, &tex.subresources[src_index], src_w, src_h, dst_w, dst_h)
                else {
                    break;
                };
                let dst_index = tex.index(layer, mip);
                let len = tex.subresources[dst_index].len().min(data.len());
                tex.subresources[dst_index][..len].copy_from_slice(&data[..len]);
            }
        }
        self.commands.push(RecordedCommand::GenerateMipmaps { texture });
    }

    fn read_texture(&mut self, texture: GpuTextureId) -> Vec<u8> {
        let Some(tex) = self.textures.get(texture) else {
            return Vec::new();
        };
        (0..tex.desc.array_size).flat_map(|layer| tex.subresources[tex.index(layer, 0)].iter().copied()).collect()
    }

    fn create_accel_struct(&mut self, desc: &AccelStructDesc) -> GpuAccelStructId {
        let accel_struct = self.accel_structs.insert(desc.clone());
        self.commands.push(RecordedCommand::BuildAccelStruct {
            accel_struct,
            update: false,
        });
        accel_struct
    }

    fn update_accel_struct(&mut self, accel_struct: GpuAccelStructId, desc: &AccelStructDesc) {
        let Some(slot) = self.accel_structs.get_mut(accel_struct) else {
            log::error!("update of a destroyed acceleration structure");
            return;
        };
        *slot = desc.clone();
        self.commands.push(RecordedCommand::BuildAccelStruct {
            accel_struct,
            update: true,
        });
    }

    fn destroy_accel_struct(&mut self, accel_struct: GpuAccelStructId) {
        self.accel_structs.remove(accel_struct);
    }

    fn create_shader_module(&mut self, stage: ShaderStage, spirv: &[u32]) -> ShaderModuleId {
        self.shader_modules.insert((stage, spirv.to_vec()))
    }

    fn destroy_shader_module(&mut self, module: ShaderModuleId) {
        self.shader_modules.remove(module);
    }

    fn create_binding_layout(&mut self, desc: &BindingLayoutDesc) -> BindingLayoutId {
        self.binding_layouts.insert(desc.clone())
    }

    fn destroy_binding_layout(&mut self, layout: BindingLayoutId) {
        self.binding_layouts.remove(layout);
    }

    fn create_binding_set(&mut self, layout: BindingLayoutId, desc: &BindingSetDesc) -> BindingSetId {
        self.created_binding_set_count += 1;
        self.binding_sets.insert((layout, desc.clone()))
    }

    fn destroy_binding_set(&mut self, set: BindingSetId) {
        self.binding_sets.remove(set);
    }

    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc, fb_info: &FramebufferInfo) -> PipelineId {
        self.created_pipeline_count += 1;
        self.pipelines.insert(HeadlessPipeline::Graphics(desc.clone(), fb_info.clone()))
    }

    fn create_compute_pipeline(&mut self, desc: &ComputePipelineDesc) -> PipelineId {
        self.created_pipeline_count += 1;
        self.pipelines.insert(HeadlessPipeline::Compute(desc.clone()))
    }

    fn create_meshlet_pipeline(&mut self, desc: &MeshletPipelineDesc, fb_info: &FramebufferInfo) -> PipelineId {
        self.created_pipeline_count += 1;
        self.pipelines.insert(HeadlessPipeline::Meshlet(desc.clone(), fb_info.clone()))
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineId) {
        self.pipelines.remove(pipeline);
    }

    fn set_graphics_state(&mut self, state: &GraphicsState) {
        self.commands.push(RecordedCommand::SetGraphicsState(state.clone()));
    }

    fn draw(&mut self, args: &DrawArguments) {
        self.commands.push(RecordedCommand::Draw(*args));
    }

    fn draw_indexed(&mut self, args: &DrawArguments) {
        self.commands.push(RecordedCommand::DrawIndexed(*args));
    }

    fn draw_indirect(&mut self, offset_bytes: u64, draw_count: u32) {
        self.commands.push(RecordedCommand::DrawIndirect {
            offset: offset_bytes,
            count: draw_count,
        });
    }

    fn draw_indexed_indirect(&mut self, offset_bytes: u64, draw_count: u32) {
        self.commands.push(RecordedCommand::DrawIndexedIndirect {
            offset: offset_bytes,
            count: draw_count,
        });
    }

    fn set_compute_state(&mut self, state: &ComputeState) {
        self.commands.push(RecordedCommand::SetComputeState(*state));
    }

    fn dispatch(&mut self, groups_x: u32, groups_y: u32, groups_z: u32) {
        self.commands.push(RecordedCommand::Dispatch([groups_x, groups_y, groups_z]));
    }

    fn set_meshlet_state(&mut self, state: &MeshletState) {
        self.commands.push(RecordedCommand::SetMeshletState(state.clone()));
    }

    fn dispatch_mesh(&mut self, groups_x: u32, groups_y: u32, groups_z: u32) {
        self.commands.push(RecordedCommand::DispatchMesh([groups_x, groups_y, groups_z]));
    }

    fn begin_timer_query(&mut self) {
        self.commands.push(RecordedCommand::BeginTimerQuery);
    }

    fn end_timer_query(&mut self) {
        self.commands.push(RecordedCommand::EndTimerQuery);
    }

    fn timer_query_result(&mut self) -> f32 {
        0.0
    }

    fn begin_frame(&mut self, slot: usize) {
        self.current_frame_slot = Some(slot);
        self.commands.push(RecordedCommand::BeginFrame(slot));
    }

    fn end_frame(&mut self, slot: usize) {
        self.current_frame_slot = None;
        self.commands.push(RecordedCommand::EndFrame(slot));
    }

    fn flush(&mut self) {
        self.commands.push(RecordedCommand::Flush);
    }

    fn wait_idle(&mut self) {
        self.commands.push(RecordedCommand::WaitIdle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::resource_desc::{BufferKind, TextureType};

    fn texture_desc(format: Format, width: u32, height: u32, mips: u32) -> TextureDesc {
        TextureDesc {
            texture_type: TextureType::Texture2D,
            width,
            height,
            depth: 1,
            array_size: 1,
            mip_levels: mips,
            sample_count: 1,
            sample_quality: 0,
            format,
            is_uav: true,
            is_render_target: true,
            debug_name: "test".to_string(),
        }
    }

    #[test]
    fn test_buffer_write_and_read_back() {
        let mut device = HeadlessDevice::new();
        let buffer = device.create_buffer(&BufferDesc::new(BufferKind::ConstantBuffer, 16));
        device.write_buffer(buffer, 4, &[1, 2, 3, 4]);
        assert_eq!(&device.read_buffer(buffer)[4..8], &[1, 2, 3, 4]);

        // 越界写入被忽略
        device.write_buffer(buffer, 14, &[9, 9, 9, 9]);
        assert_eq!(device.read_buffer(buffer)[14], 0);
        assert_eq!(device.commands().len(), 1);
    }

    #[test]
    fn test_copy_buffer() {
        let mut device = HeadlessDevice::new();
        let src = device.create_buffer(&BufferDesc::new(BufferKind::UnorderedAccess, 8));
        let dst = device.create_buffer(&BufferDesc::new(BufferKind::Staging, 8));
        device.write_buffer(src, 0, &[7; 8]);
        device.copy_buffer(dst, 0, src, 0, 8);
        assert_eq!(device.read_buffer(dst), vec![7; 8]);
    }

    #[test]
    fn test_clear_and_mipmaps() {
        let mut device = HeadlessDevice::new();
        let tex = device.create_texture(&texture_desc(Format::Rgba32Float, 4, 4, 3));
        device.clear_texture(tex, TextureSubresourceSet::new(0, 1, 0, 1), [0.5, 1.0, 0.0, 1.0]);
        device.generate_mipmaps(tex);

        let mip2 = device
            .texture_data(tex, 0, 2)
            .unwrap()
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes(c.try_into().unwrap()))
            .collect::<Vec<_>>();
        assert_eq!(mip2, vec![0.5, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_counters() {
        let mut device = HeadlessDevice::new();
        let module = device.create_shader_module(ShaderStage::Compute, &[0x07230203]);
        let desc = ComputePipelineDesc {
            cs: module,
            specialization: vec![],
            binding_layouts: vec![],
        };
        let a = device.create_compute_pipeline(&desc);
        let _b = device.create_compute_pipeline(&desc);
        device.destroy_pipeline(a);
        assert_eq!(device.created_pipeline_count(), 2);
        assert_eq!(device.live_pipeline_count(), 1);
        assert_eq!(device.shader_module_stage(module), Some(ShaderStage::Compute));
    }
}
