use anyhow::Context;
use log::Level;
use tessera_gfx::device::GfxDevice;
use tessera_gfx::pipelines::pipeline_desc::{PipelineType, ShaderStage};

use super::RenderContext;
use crate::reflection::spirv_words;
use crate::resources::handles::ShaderHandle;
use crate::shader::ShaderObject;

/// 由内存创建的 shader 在日志中使用的名字
const MEMORY_SHADER_NAME: &str = "<memory>";

// load & delete
impl<D: GfxDevice> RenderContext<D> {
    /// 查找 `{name}.{ext}.spv` 形式的各阶段文件，`ext` 见 [`ShaderStage::extension`]
    pub fn try_load_shader(&mut self, name: &str) -> anyhow::Result<ShaderHandle> {
        let mut stages = vec![];
        for stage in ShaderStage::SCAN_ORDER {
            let filename = format!("{name}.{}.spv", stage.extension());
            if !self.shader_source.exists(&filename) {
                continue;
            }
            stages.push((stage, self.shader_source.read(&filename)?));
        }

        let stages = stages.iter().map(|(stage, bytes)| (*stage, bytes.as_slice())).collect::<Vec<_>>();
        self.create_shader(name, &stages)
    }

    /// 失败时记录错误并返回 null
    pub fn load_shader(&mut self, name: &str) -> ShaderHandle {
        self.try_load_shader(name).unwrap_or_else(|e| {
            context_log!(self, Level::Error, "{e:#}");
            ShaderHandle::null()
        })
    }

    /// 空的二进制视为该阶段不存在
    pub fn load_shader_from_memory(&mut self, stages: &[(ShaderStage, &[u8])]) -> ShaderHandle {
        self.create_shader(MEMORY_SHADER_NAME, stages).unwrap_or_else(|e| {
            context_log!(self, Level::Error, "{e:#}");
            ShaderHandle::null()
        })
    }

    pub fn create_graphics_shader(
        &mut self,
        vert: &[u8],
        tesc: &[u8],
        tese: &[u8],
        geom: &[u8],
        frag: &[u8],
    ) -> ShaderHandle {
        self.load_shader_from_memory(&[
            (ShaderStage::Vertex, vert),
            (ShaderStage::Hull, tesc),
            (ShaderStage::Domain, tese),
            (ShaderStage::Geometry, geom),
            (ShaderStage::Pixel, frag),
        ])
    }

    #[inline]
    pub fn create_compute_shader(&mut self, comp: &[u8]) -> ShaderHandle {
        self.load_shader_from_memory(&[(ShaderStage::Compute, comp)])
    }

    fn create_shader(&mut self, name: &str, stages: &[(ShaderStage, &[u8])]) -> anyhow::Result<ShaderHandle> {
        let stages = stages
            .iter()
            .filter(|(_, bytes)| !bytes.is_empty())
            .map(|(stage, bytes)| {
                let words = spirv_words(bytes).with_context(|| format!("invalid {} stage of '{name}'", stage.extension()))?;
                Ok((*stage, words))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let shader = ShaderObject::new(&mut self.device, name, &stages, &self.settings)?;
        context_log!(self, Level::Info, "shader '{}' loaded ({:?})", name, shader.pipeline_type());
        Ok(ShaderHandle::new(self.shaders.insert(shader)))
    }

    /// 删除当前 shader 时同时清空当前 shader
    pub fn delete_shader(&mut self, shader: ShaderHandle) {
        let Some(object) = self.shaders.remove(shader.inner) else {
            return;
        };
        if self.current_shader == shader {
            self.current_shader = ShaderHandle::null();
        }
        object.destroy(&mut self.device);
    }
}
// current shader
impl<D: GfxDevice> RenderContext<D> {
    #[inline]
    pub fn current_shader(&self) -> ShaderHandle {
        self.current_shader
    }

    #[inline]
    pub fn shader(&self, shader: ShaderHandle) -> Option<&ShaderObject> {
        self.shaders.get(shader.inner)
    }

    #[inline]
    pub fn shader_count(&self) -> usize {
        self.shaders.len()
    }

    /// 切换当前 shader，并写入相机的 `ProjectionMatrix` 与 `ViewMatrix`
    ///
    /// shader 不需要这两个 uniform 时不会产生任何日志
    pub fn use_shader(&mut self, shader: ShaderHandle) {
        self.current_shader = shader;

        let log_active = self.log_active;
        self.log_active = false;
        let mut ctx = scopeguard::guard(self, move |ctx| ctx.log_active = log_active);

        let (projection, view) = (ctx.camera.projection, ctx.camera.view);
        ctx.set_uniform_mat4(projection, "ProjectionMatrix");
        ctx.set_uniform_mat4(view, "ViewMatrix");
    }

    pub fn set_tessellation_control_points(&mut self, count: u32) {
        let Some(shader) = self.shaders.get_mut(self.current_shader.inner) else {
            context_log!(self, Level::Error, "Setting patch control points of an invalid shader");
            return;
        };
        if shader.pipeline_type() != PipelineType::Graphics {
            context_log!(self, Level::Warn, "Setting patch control points of a non graphics shader");
        }
        shader.set_patch_control_points(count);
    }

    #[inline]
    pub fn set_group_size_1d(&mut self, x: u32) {
        self.set_group_size_3d(x, 1, 1);
    }

    #[inline]
    pub fn set_group_size_2d(&mut self, x: u32, y: u32) {
        self.set_group_size_3d(x, y, 1);
    }

    pub fn set_group_size_3d(&mut self, x: u32, y: u32, z: u32) {
        let Some(shader) = self.shaders.get_mut(self.current_shader.inner) else {
            context_log!(self, Level::Error, "Setting compute group size of an invalid shader");
            return;
        };
        if shader.pipeline_type() == PipelineType::Graphics {
            context_log!(self, Level::Warn, "Setting compute group size of a non compute shader");
        }
        shader.set_group_size([x, y, z]);
    }
}

#[cfg(test)]
mod tests {
    use tessera_crate_tools::shader_source::MemoryShaderSource;

    use super::*;
    use crate::context::tests::headless_context;
    use crate::test_utils;

    #[test]
    fn test_load_shader_by_name() {
        let source = MemoryShaderSource::new()
            .with_file("mvp.vert.spv", test_utils::mvp_stage(ShaderStage::Vertex, 0))
            .with_file("mvp.frag.spv", test_utils::mvp_stage(ShaderStage::Pixel, 1))
            .with_file("counter.comp.spv", test_utils::counter_compute());
        let mut ctx = headless_context(source);

        let mvp = ctx.load_shader("mvp");
        assert_eq!(ctx.shader(mvp).unwrap().pipeline_type(), PipelineType::Graphics);
        assert!(ctx.shader(mvp).unwrap().module(ShaderStage::Pixel).is_some());

        let counter = ctx.load_shader("counter");
        assert_eq!(ctx.shader(counter).unwrap().pipeline_type(), PipelineType::Compute);
        assert_eq!(ctx.shader_count(), 2);
    }

    #[test]
    fn test_missing_shader_returns_null() {
        let mut ctx = headless_context(MemoryShaderSource::new());
        assert!(ctx.load_shader("nothing").is_null());

        let err = ctx.try_load_shader("nothing").unwrap_err();
        assert_eq!(err.to_string(), "No shader found with name 'nothing'");
        assert_eq!(ctx.shader_count(), 0);
        assert_eq!(ctx.device().live_buffer_count(), 0);
    }

    #[test]
    fn test_empty_binaries_are_skipped() {
        let mut ctx = headless_context(MemoryShaderSource::new());
        let vert = test_utils::mvp_stage(ShaderStage::Vertex, 0);
        let shader = ctx.create_graphics_shader(&vert, &[], &[], &[], &[]);
        assert!(!shader.is_null());
        assert!(ctx.shader(shader).unwrap().module(ShaderStage::Pixel).is_none());

        assert!(ctx.create_compute_shader(&[]).is_null());
        // 不是 4 字节的整数倍
        assert!(ctx.create_compute_shader(&[1, 2, 3]).is_null());
    }

    #[test]
    fn test_delete_current_shader() {
        let mut ctx = headless_context(MemoryShaderSource::new());
        let shader = ctx.create_compute_shader(&test_utils::counter_compute());
        ctx.use_shader(shader);
        assert_eq!(ctx.current_shader(), shader);

        ctx.delete_shader(shader);
        assert!(ctx.current_shader().is_null());
        assert!(ctx.shader(shader).is_none());
        // 重复删除没有影响
        ctx.delete_shader(shader);
        ctx.delete_shader(ShaderHandle::null());
    }

    #[test]
    fn test_use_shader_writes_camera_matrices() {
        let mut ctx = headless_context(MemoryShaderSource::new());
        let camera_stage = test_utils::camera_stage(ShaderStage::Vertex);
        let shader = ctx.create_graphics_shader(&camera_stage, &[], &[], &[], &[]);

        ctx.use_shader(shader);
        assert!(ctx.is_log_active());
        let staging = ctx.shader(shader).unwrap().staging();
        let projection = ctx.camera().projection.to_cols_array();
        let view = ctx.camera().view.to_cols_array();
        assert_eq!(&staging[..64], bytemuck::cast_slice::<f32, u8>(&projection));
        assert_eq!(&staging[64..128], bytemuck::cast_slice::<f32, u8>(&view));

        // 日志关闭时保持关闭
        ctx.set_log_active(false);
        ctx.use_shader(shader);
        assert!(!ctx.is_log_active());
    }

    #[test]
    fn test_group_size_and_control_points() {
        let mut ctx = headless_context(MemoryShaderSource::new());
        // 没有当前 shader 时什么也不做
        ctx.set_group_size_2d(16, 16);

        let shader = ctx.create_compute_shader(&test_utils::counter_compute());
        ctx.use_shader(shader);
        ctx.set_group_size_2d(16, 16);
        assert_eq!(ctx.shader(shader).unwrap().group_size(), [16, 16, 1]);

        ctx.set_tessellation_control_points(3);
        assert_eq!(ctx.shader(shader).unwrap().patch_control_points(), 3);
    }
}
