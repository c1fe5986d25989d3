//! 每个 shader 一份的管线缓存
//!
//! key 只包含值类型（渲染状态按位比较，framebuffer 只取格式描述），
//! 结构上相同的状态无论以什么顺序出现，都会命中同一个缓存项。

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use tessera_gfx::device::{GfxDevice, PipelineId};
use tessera_gfx::pipelines::pipeline_desc::{FramebufferInfo, PrimitiveType, VertexAttributeDesc};
use tessera_gfx::pipelines::render_state::{FixedFunctionState, VariableRateShadingState};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphicsPipelineKey {
    pub prim_type: PrimitiveType,
    pub patch_control_points: u32,
    /// 来自 mesh 的顶点属性；没有 mesh 时为空
    pub input_layout: Vec<VertexAttributeDesc>,
    pub render_state: FixedFunctionState,
    pub shading_rate: VariableRateShadingState,
    pub framebuffer: FramebufferInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MeshletPipelineKey {
    pub group_size: [u32; 3],
    pub prim_type: PrimitiveType,
    pub render_state: FixedFunctionState,
    pub framebuffer: FramebufferInfo,
}

/// compute 管线只由 workgroup 尺寸区分
pub type ComputePipelineKey = [u32; 3];

/// 三类管线各自一张表；每个 key 最多创建一次管线
#[derive(Default)]
pub struct PipelineCache {
    graphics: HashMap<GraphicsPipelineKey, PipelineId>,
    compute: HashMap<ComputePipelineKey, PipelineId>,
    meshlet: HashMap<MeshletPipelineKey, PipelineId>,

    /// 创建过的管线总数
    built_count: usize,
}
// new & init
impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }
}
// getters
impl PipelineCache {
    #[inline]
    pub fn graphics_count(&self) -> usize {
        self.graphics.len()
    }
    #[inline]
    pub fn compute_count(&self) -> usize {
        self.compute.len()
    }
    #[inline]
    pub fn meshlet_count(&self) -> usize {
        self.meshlet.len()
    }
    #[inline]
    pub fn len(&self) -> usize {
        self.graphics.len() + self.compute.len() + self.meshlet.len()
    }
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    #[inline]
    pub fn built_count(&self) -> usize {
        self.built_count
    }
}
// lookup or build
impl PipelineCache {
    /// 命中时直接返回；否则用 `build` 创建并记录
    pub fn graphics_pipeline(
        &mut self,
        key: GraphicsPipelineKey,
        build: impl FnOnce(&GraphicsPipelineKey) -> PipelineId,
    ) -> PipelineId {
        Self::lookup_or_build(&mut self.graphics, &mut self.built_count, key, build)
    }

    pub fn compute_pipeline(
        &mut self,
        key: ComputePipelineKey,
        build: impl FnOnce(&ComputePipelineKey) -> PipelineId,
    ) -> PipelineId {
        Self::lookup_or_build(&mut self.compute, &mut self.built_count, key, build)
    }

    pub fn meshlet_pipeline(
        &mut self,
        key: MeshletPipelineKey,
        build: impl FnOnce(&MeshletPipelineKey) -> PipelineId,
    ) -> PipelineId {
        Self::lookup_or_build(&mut self.meshlet, &mut self.built_count, key, build)
    }

    fn lookup_or_build<K: std::hash::Hash + Eq>(
        table: &mut HashMap<K, PipelineId>,
        built_count: &mut usize,
        key: K,
        build: impl FnOnce(&K) -> PipelineId,
    ) -> PipelineId {
        match table.entry(key) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let pipeline = build(entry.key());
                *built_count += 1;
                *entry.insert(pipeline)
            }
        }
    }
}
// destroy
impl PipelineCache {
    pub fn destroy(&mut self, device: &mut dyn GfxDevice) {
        let pipelines = self
            .graphics
            .drain()
            .map(|(_, p)| p)
            .chain(self.compute.drain().map(|(_, p)| p))
            .chain(self.meshlet.drain().map(|(_, p)| p));
        for pipeline in pipelines {
            device.destroy_pipeline(pipeline);
        }
    }
}

#[cfg(test)]
mod tests {
    use slotmap::KeyData;
    use tessera_gfx::basic::format::Format;
    use tessera_gfx::headless::HeadlessDevice;
    use tessera_gfx::pipelines::pipeline_desc::{ComputePipelineDesc, ShaderStage};
    use tessera_gfx::pipelines::render_state::{CullMode, RenderState};

    use super::*;

    fn fake_pipeline(id: u64) -> PipelineId {
        PipelineId::from(KeyData::from_ffi(id))
    }

    fn graphics_key(width: u32) -> GraphicsPipelineKey {
        GraphicsPipelineKey {
            prim_type: PrimitiveType::TriangleList,
            patch_control_points: 4,
            input_layout: vec![],
            render_state: RenderState::default().fixed_function(),
            shading_rate: VariableRateShadingState::default(),
            framebuffer: FramebufferInfo {
                color_formats: vec![Format::Rgba8Unorm],
                sample_count: 1,
                width,
                height: 600,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_equal_keys_share_pipeline() {
        let mut cache = PipelineCache::new();
        let a = cache.graphics_pipeline(graphics_key(800), |_| fake_pipeline(1));
        let b = cache.graphics_pipeline(graphics_key(800), |_| panic!("the cached pipeline must be reused"));
        assert_eq!(a, b);
        assert_eq!(cache.built_count(), 1);

        // framebuffer 尺寸不同，key 不同
        let c = cache.graphics_pipeline(graphics_key(1024), |_| fake_pipeline(2));
        assert_ne!(a, c);
        assert_eq!(cache.graphics_count(), 2);
    }

    #[test]
    fn test_n_distinct_keys_build_n_pipelines() {
        let mut cache = PipelineCache::new();
        let culls = [CullMode::Back, CullMode::Front, CullMode::None];
        for round in 0..3 {
            for (i, cull) in culls.iter().enumerate() {
                let mut key = graphics_key(800);
                key.render_state.raster.cull_mode = *cull;
                cache.graphics_pipeline(key, |_| fake_pipeline(10 + i as u64));
            }
            assert_eq!(cache.built_count(), culls.len(), "round {round}");
        }
    }

    #[test]
    fn test_compute_and_meshlet_tables() {
        let mut cache = PipelineCache::new();
        cache.compute_pipeline([8, 8, 1], |_| fake_pipeline(1));
        cache.compute_pipeline([16, 16, 1], |size| {
            assert_eq!(size, &[16, 16, 1]);
            fake_pipeline(2)
        });
        cache.compute_pipeline([8, 8, 1], |_| fake_pipeline(3));

        let key = MeshletPipelineKey {
            group_size: [64, 1, 1],
            prim_type: PrimitiveType::TriangleList,
            render_state: FixedFunctionState::default(),
            framebuffer: FramebufferInfo::default(),
        };
        cache.meshlet_pipeline(key.clone(), |_| fake_pipeline(4));
        cache.meshlet_pipeline(key, |_| fake_pipeline(5));

        assert_eq!((cache.compute_count(), cache.meshlet_count()), (2, 1));
        assert_eq!(cache.built_count(), 3);
    }

    #[test]
    fn test_destroy_releases_pipelines() {
        let mut device = HeadlessDevice::new();
        let mut cache = PipelineCache::new();
        let cs = ComputePipelineDesc {
            cs: device.create_shader_module(ShaderStage::Compute, &[]),
            specialization: vec![],
            binding_layouts: vec![],
        };
        cache.compute_pipeline([1, 1, 1], |_| device.create_compute_pipeline(&cs));
        assert_eq!(device.live_pipeline_count(), 1);

        cache.destroy(&mut device);
        assert!(cache.is_empty());
        assert_eq!(device.live_pipeline_count(), 0);
    }
}
