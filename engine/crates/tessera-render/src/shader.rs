//! shader 对象：反射得到的绑定表、staging uniform、binding set 状态与管线缓存

use std::collections::HashMap;

use tessera_gfx::descriptors::binding::{BindingLayoutDesc, BindingLayoutItem, ResourceKind};
use tessera_gfx::device::{BindingLayoutId, BindingSetId, GfxDevice, GpuBufferId, PipelineId, ShaderModuleId};
use tessera_gfx::pipelines::pipeline_desc::{
    ComputePipelineDesc, GraphicsPipelineDesc, MeshletPipelineDesc, PipelineType, ShaderStage, SpecializationConstant,
};
use tessera_gfx::resources::resource_desc::{BufferDesc, BufferKind, TextureSubresourceSet};

use crate::binding_set::{BindingSetState, build_binding_set_desc};
use crate::pipeline_cache::{GraphicsPipelineKey, MeshletPipelineKey, PipelineCache};
use crate::reflection::{ReflectedResource, ResourceClass, StageReflection};
use crate::resources::handles::{AccelStructHandle, BufferHandle, TextureHandle};
use crate::resources::manager::ResourceManager;
use crate::settings::ContextSettings;

/// 一个 uniform 在 staging 中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformTarget {
    pub offset: u32,
    pub size: u32,
}

/// 一个 uniform buffer 绑定在 staging 中占据 `start..end`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformBinding {
    pub slot: u32,
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureAccess {
    /// 采样纹理，绑定为 SRV + sampler
    Sampled,
    /// storage image，绑定为 UAV
    Storage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureSlot {
    /// 数组纹理的每个元素名为 `name[i]`
    pub name: String,
    pub binding: u32,
    pub array_element: u32,
    pub access: TextureAccess,
    pub view: TextureSubresourceSet,
    pub texture: TextureHandle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BufferSlot {
    pub name: String,
    pub binding: u32,
    pub buffer: BufferHandle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccelStructSlot {
    pub name: String,
    pub binding: u32,
    pub accel_struct: AccelStructHandle,
}

/// 所有阶段的反射结果合并后的绑定表
#[derive(Debug, Clone, Default)]
pub struct ShaderLayout {
    pub uniform_bindings: Vec<UniformBinding>,
    /// 同名 uniform 可能出现在多个阶段
    pub uniforms: HashMap<String, Vec<UniformTarget>>,
    pub textures: Vec<TextureSlot>,
    pub buffers: Vec<BufferSlot>,
    /// 每个 shader 最多一个加速结构
    pub accel_struct: Option<AccelStructSlot>,
    /// 按 slot 排序
    pub layout_desc: BindingLayoutDesc,
    pub staging_size: u32,
}
impl ShaderLayout {
    /// 按阶段顺序合并
    ///
    /// 所有阶段的 uniform buffer 依次排布在同一块 staging 中，每个 block 按 constant buffer 的对齐要求补齐
    pub fn from_stages(stages: &[StageReflection], settings: &ContextSettings) -> Self {
        let mut layout = Self::default();
        let mut cursor = 0;

        for stage in stages {
            for resource in &stage.resources {
                match resource.class {
                    ResourceClass::UniformBuffer => {
                        cursor = layout.add_uniform_buffer(resource, cursor, settings);
                    }
                    ResourceClass::StorageBuffer => {
                        layout.buffers.push(BufferSlot {
                            name: resource.name.clone(),
                            binding: resource.binding,
                            buffer: BufferHandle::null(),
                        });
                        layout.add_layout_item(resource, ResourceKind::RawBufferUav);
                    }
                    ResourceClass::SampledImage => layout.add_texture(resource, TextureAccess::Sampled),
                    ResourceClass::StorageImage => layout.add_texture(resource, TextureAccess::Storage),
                    ResourceClass::AccelStruct => {
                        if let Some(existing) = &layout.accel_struct {
                            if existing.binding != resource.binding {
                                log::warn!(
                                    "Only one acceleration structure is supported per shader, \"{}\" is ignored",
                                    resource.name
                                );
                            }
                            continue;
                        }
                        layout.accel_struct = Some(AccelStructSlot {
                            name: resource.name.clone(),
                            binding: resource.binding,
                            accel_struct: AccelStructHandle::null(),
                        });
                        layout.add_layout_item(resource, ResourceKind::AccelStruct);
                    }
                }
            }
        }

        layout.layout_desc.sort_and_dedup();
        layout.staging_size = settings.pad_constant_buffer_size(cursor);
        layout
    }

    /// 返回下一个 binding 的起始偏移
    fn add_uniform_buffer(&mut self, resource: &ReflectedResource, start: u32, settings: &ContextSettings) -> u32 {
        for member in &resource.members {
            if member.is_array() {
                for i in 0..member.array_len {
                    self.uniforms.entry(format!("{}[{i}]", member.name)).or_default().push(UniformTarget {
                        offset: start + member.offset + i * member.size,
                        size: member.size,
                    });
                }
            } else {
                self.uniforms.entry(member.name.clone()).or_default().push(UniformTarget {
                    offset: start + member.offset,
                    size: member.size,
                });
            }
        }

        let end = start + settings.pad_constant_buffer_size(resource.block_size);
        self.uniform_bindings.push(UniformBinding {
            slot: resource.binding,
            start,
            end,
        });
        self.add_layout_item(resource, ResourceKind::VolatileConstantBuffer);
        end
    }

    fn add_texture(&mut self, resource: &ReflectedResource, access: TextureAccess) {
        let slot = |name: String, array_element: u32| TextureSlot {
            name,
            binding: resource.binding,
            array_element,
            access,
            view: TextureSubresourceSet::all(),
            texture: TextureHandle::null(),
        };
        if resource.count > 1 {
            self.textures.extend((0..resource.count).map(|i| slot(format!("{}[{i}]", resource.name), i)));
        } else {
            self.textures.push(slot(resource.name.clone(), 0));
        }

        let kind = match access {
            TextureAccess::Sampled => ResourceKind::TextureSrv,
            TextureAccess::Storage => ResourceKind::TextureUav,
        };
        self.add_layout_item(resource, kind);
    }

    #[inline]
    fn add_layout_item(&mut self, resource: &ReflectedResource, kind: ResourceKind) {
        self.layout_desc.items.push(BindingLayoutItem {
            slot: resource.binding,
            kind,
            array_size: resource.count,
        });
    }
}

/// 写入 uniform 失败的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformWriteError {
    NotFound,
    /// 至少一处的尺寸与写入的数据不一致，这些位置没有被写入
    SizeMismatch,
}

pub struct ShaderObject {
    name: String,
    pipeline_type: PipelineType,
    modules: Vec<(ShaderStage, ShaderModuleId)>,
    layout: ShaderLayout,
    binding_layout: BindingLayoutId,

    /// CPU 侧的 uniform 数据，与 `uniform_buffer` 布局一致
    staging: Vec<u8>,
    uniform_buffer: Option<GpuBufferId>,

    pub(crate) binding_state: BindingSetState,
    pub(crate) pipelines: PipelineCache,

    group_size: [u32; 3],
    patch_control_points: u32,
}
// new & init
impl ShaderObject {
    /// 由各阶段的 SPIR-V 创建 shader
    ///
    /// 先完成全部阶段的反射，反射失败时不会创建任何 GPU 对象
    pub fn new(
        device: &mut dyn GfxDevice,
        name: &str,
        stages: &[(ShaderStage, Vec<u32>)],
        settings: &ContextSettings,
    ) -> anyhow::Result<Self> {
        let reflections = stages
            .iter()
            .map(|(stage, words)| StageReflection::reflect(*stage, words))
            .collect::<anyhow::Result<Vec<_>>>()?;

        // 按扫描顺序，最后一个能决定类型的阶段生效
        let pipeline_type = ShaderStage::SCAN_ORDER
            .iter()
            .filter(|stage| stages.iter().any(|(s, _)| s == *stage))
            .filter_map(|stage| stage.pipeline_type())
            .last()
            .ok_or_else(|| anyhow::anyhow!("No shader found with name '{name}'"))?;

        let layout = ShaderLayout::from_stages(&reflections, settings);
        let modules = stages
            .iter()
            .map(|(stage, words)| (*stage, device.create_shader_module(*stage, words)))
            .collect();
        let binding_layout = device.create_binding_layout(&layout.layout_desc);

        let staging = vec![0; layout.staging_size as usize];
        let uniform_buffer = (layout.staging_size > 0)
            .then(|| device.create_buffer(&BufferDesc::new(BufferKind::ConstantBuffer, layout.staging_size as u64)));

        let group_size = match pipeline_type {
            PipelineType::Meshlet => settings.meshlet_group_size,
            _ => settings.compute_group_size,
        };

        log::debug!(
            "shader '{}' created: {:?}, {} uniforms, {} textures, {} buffers, staging {} bytes",
            name,
            pipeline_type,
            layout.uniforms.len(),
            layout.textures.len(),
            layout.buffers.len(),
            layout.staging_size
        );

        Ok(Self {
            name: name.to_string(),
            pipeline_type,
            modules,
            layout,
            binding_layout,
            staging,
            uniform_buffer,
            binding_state: BindingSetState::new(),
            pipelines: PipelineCache::new(),
            group_size,
            patch_control_points: settings.patch_control_points,
        })
    }
}
// getters
impl ShaderObject {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
    #[inline]
    pub fn pipeline_type(&self) -> PipelineType {
        self.pipeline_type
    }
    #[inline]
    pub fn module(&self, stage: ShaderStage) -> Option<ShaderModuleId> {
        self.modules.iter().find(|(s, _)| *s == stage).map(|(_, m)| *m)
    }
    #[inline]
    pub fn layout(&self) -> &ShaderLayout {
        &self.layout
    }
    #[inline]
    pub fn binding_layout(&self) -> BindingLayoutId {
        self.binding_layout
    }
    #[inline]
    pub fn staging(&self) -> &[u8] {
        &self.staging
    }
    #[inline]
    pub fn uniform_buffer(&self) -> Option<GpuBufferId> {
        self.uniform_buffer
    }
    #[inline]
    pub fn binding_state(&self) -> &BindingSetState {
        &self.binding_state
    }
    #[inline]
    pub fn pipelines(&self) -> &PipelineCache {
        &self.pipelines
    }
    #[inline]
    pub fn group_size(&self) -> [u32; 3] {
        self.group_size
    }
    #[inline]
    pub fn patch_control_points(&self) -> u32 {
        self.patch_control_points
    }

    /// 名字对应的全部位置
    #[inline]
    pub fn uniform_targets(&self, name: &str) -> &[UniformTarget] {
        self.layout.uniforms.get(name).map_or(&[], |targets| targets.as_slice())
    }
}
// update
impl ShaderObject {
    /// 写入所有同名的 uniform；找到名字时总会标记 staging 为脏
    pub fn write_uniform(&mut self, name: &str, data: &[u8]) -> Result<(), UniformWriteError> {
        let Some(targets) = self.layout.uniforms.get(name) else {
            return Err(UniformWriteError::NotFound);
        };
        self.binding_state.mark_uniforms_dirty();

        let mut result = Ok(());
        for target in targets {
            if target.size as usize != data.len() {
                result = Err(UniformWriteError::SizeMismatch);
                continue;
            }
            let offset = target.offset as usize;
            self.staging[offset..offset + data.len()].copy_from_slice(data);
        }
        result
    }

    /// 挂载到所有同名的纹理槽；没有同名的槽时返回 false
    pub fn attach_texture(&mut self, name: &str, texture: TextureHandle, view: TextureSubresourceSet) -> bool {
        let mut found = false;
        for slot in self.layout.textures.iter_mut().filter(|slot| slot.name == name) {
            slot.texture = texture;
            slot.view = view;
            found = true;
        }
        if found {
            self.binding_state.invalidate();
        }
        found
    }

    pub fn attach_buffer(&mut self, name: &str, buffer: BufferHandle) -> bool {
        let mut found = false;
        for slot in self.layout.buffers.iter_mut().filter(|slot| slot.name == name) {
            slot.buffer = buffer;
            found = true;
        }
        if found {
            self.binding_state.invalidate();
        }
        found
    }

    /// shader 没有声明加速结构时返回 false
    pub fn attach_accel_struct(&mut self, accel_struct: AccelStructHandle) -> bool {
        let Some(slot) = &mut self.layout.accel_struct else {
            return false;
        };
        slot.accel_struct = accel_struct;
        self.binding_state.invalidate();
        true
    }

    /// 纹理被删除后从所有槽中移除
    pub fn detach_texture(&mut self, texture: TextureHandle) {
        let mut found = false;
        for slot in self.layout.textures.iter_mut().filter(|slot| slot.texture == texture) {
            slot.texture = TextureHandle::null();
            found = true;
        }
        if found {
            self.binding_state.invalidate();
        }
    }

    pub fn detach_buffer(&mut self, buffer: BufferHandle) {
        let mut found = false;
        for slot in self.layout.buffers.iter_mut().filter(|slot| slot.buffer == buffer) {
            slot.buffer = BufferHandle::null();
            found = true;
        }
        if found {
            self.binding_state.invalidate();
        }
    }

    pub fn detach_accel_struct(&mut self, accel_struct: AccelStructHandle) {
        if let Some(slot) = &mut self.layout.accel_struct
            && slot.accel_struct == accel_struct
        {
            slot.accel_struct = AccelStructHandle::null();
            self.binding_state.invalidate();
        }
    }

    #[inline]
    pub fn set_group_size(&mut self, group_size: [u32; 3]) {
        self.group_size = group_size;
    }

    #[inline]
    pub fn set_patch_control_points(&mut self, count: u32) {
        self.patch_control_points = count;
    }
}
// pipelines
impl ShaderObject {
    /// 光栅化丢弃时不使用像素阶段
    pub(crate) fn graphics_pipeline(&mut self, device: &mut dyn GfxDevice, key: GraphicsPipelineKey) -> PipelineId {
        let [vs, hs, ds, gs, ps] = [
            ShaderStage::Vertex,
            ShaderStage::Hull,
            ShaderStage::Domain,
            ShaderStage::Geometry,
            ShaderStage::Pixel,
        ]
        .map(|stage| self.module(stage));
        let binding_layout = self.binding_layout;

        self.pipelines.graphics_pipeline(key, |key| {
            let desc = GraphicsPipelineDesc {
                prim_type: key.prim_type,
                patch_control_points: key.patch_control_points,
                input_layout: key.input_layout.clone(),
                vs,
                hs,
                ds,
                gs,
                ps: ps.filter(|_| !key.render_state.raster.rasterizer_discard),
                render_state: key.render_state,
                shading_rate: key.shading_rate,
                binding_layouts: vec![binding_layout],
            };
            device.create_graphics_pipeline(&desc, &key.framebuffer)
        })
    }

    /// workgroup 尺寸通过特化常量写入管线
    pub(crate) fn compute_pipeline(&mut self, device: &mut dyn GfxDevice) -> Option<PipelineId> {
        let cs = self.module(ShaderStage::Compute)?;
        let binding_layout = self.binding_layout;

        Some(self.pipelines.compute_pipeline(self.group_size, |group_size| {
            device.create_compute_pipeline(&ComputePipelineDesc {
                cs,
                specialization: SpecializationConstant::group_size(*group_size),
                binding_layouts: vec![binding_layout],
            })
        }))
    }

    /// 只有 amplification 阶段、没有 mesh 阶段时返回 None
    pub(crate) fn meshlet_pipeline(&mut self, device: &mut dyn GfxDevice, key: MeshletPipelineKey) -> Option<PipelineId> {
        let mesh = self.module(ShaderStage::Mesh)?;
        let amplification = self.module(ShaderStage::Amplification);
        let ps = self.module(ShaderStage::Pixel);
        let binding_layout = self.binding_layout;

        Some(self.pipelines.meshlet_pipeline(key, |key| {
            let desc = MeshletPipelineDesc {
                prim_type: key.prim_type,
                amplification,
                mesh,
                ps: ps.filter(|_| !key.render_state.raster.rasterizer_discard),
                specialization: SpecializationConstant::group_size(key.group_size),
                render_state: key.render_state,
                binding_layouts: vec![binding_layout],
            };
            device.create_meshlet_pipeline(&desc, &key.framebuffer)
        }))
    }

    /// 刷新 uniform buffer，必要时重建 binding set
    pub(crate) fn prepare_bindings(
        &mut self,
        device: &mut dyn GfxDevice,
        resources: &ResourceManager,
    ) -> Option<BindingSetId> {
        let layout = &self.layout;
        let uniform_buffer = self.uniform_buffer;
        self.binding_state.prepare(device, self.binding_layout, &self.staging, uniform_buffer, || {
            build_binding_set_desc(layout, uniform_buffer, resources)
        })
    }
}
// destroy
impl ShaderObject {
    pub fn destroy(mut self, device: &mut dyn GfxDevice) {
        self.pipelines.destroy(device);
        self.binding_state.destroy(device);
        if let Some(buffer) = self.uniform_buffer.take() {
            device.destroy_buffer(buffer);
        }
        device.destroy_binding_layout(self.binding_layout);
        for (_, module) in self.modules.drain(..) {
            device.destroy_shader_module(module);
        }
    }
}
