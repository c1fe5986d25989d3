//! 渲染上下文
//!
//! 持有设备、资源、shader 以及「当前」shader / framebuffer / 渲染状态。
//! 所有渲染调用都在同一个线程上通过 `&mut RenderContext` 完成，没有任何全局状态。

use slotmap::SlotMap;
use tessera_crate_tools::shader_source::{FsShaderSource, ShaderSource};
use tessera_gfx::device::GfxDevice;

use crate::camera::Camera;
use crate::frame_counter::FrameCounter;
use crate::render_state_stack::RenderStateStack;
use crate::resources::handles::{FramebufferHandle, InnerShaderKey, ShaderHandle};
use crate::resources::manager::ResourceManager;
use crate::settings::ContextSettings;
use crate::shader::ShaderObject;

/// 受 [`RenderContext::set_log_active`] 控制的日志
macro_rules! context_log {
    ($ctx:expr, $level:expr, $($arg:tt)+) => {
        if $ctx.log_active {
            log::log!($level, $($arg)+);
        }
    };
}

mod draw;
mod render_state;
mod resources;
mod shaders;
mod uniforms;

pub struct RenderContext<D: GfxDevice> {
    device: D,
    settings: ContextSettings,

    resources: ResourceManager,
    shaders: SlotMap<InnerShaderKey, ShaderObject>,
    shader_source: Box<dyn ShaderSource>,

    /// draw / dispatch / 设置 uniform 隐式作用的对象
    current_shader: ShaderHandle,
    current_framebuffer: FramebufferHandle,
    render_states: RenderStateStack,

    camera: Camera,
    frame_counter: FrameCounter,

    log_active: bool,
    destroyed: bool,
}
// new & init
impl<D: GfxDevice> RenderContext<D> {
    /// shader 文件从当前目录读取
    pub fn new(device: D, settings: ContextSettings) -> Self {
        Self::with_shader_source(device, settings, Box::new(FsShaderSource::default()))
    }

    pub fn with_shader_source(device: D, settings: ContextSettings, shader_source: Box<dyn ShaderSource>) -> Self {
        log::info!(
            "render context created: {}x{}, raytracing {}",
            settings.surface_width,
            settings.surface_height,
            if settings.raytracing { "enabled" } else { "disabled" }
        );

        let mut camera = Camera::default();
        camera.update_matrices(settings.surface_width as f32 / settings.surface_height.max(1) as f32);

        Self {
            device,
            settings,

            resources: ResourceManager::new(),
            shaders: SlotMap::with_key(),
            shader_source,

            current_shader: ShaderHandle::null(),
            current_framebuffer: FramebufferHandle::null(),
            render_states: RenderStateStack::new(settings.surface_width, settings.surface_height),

            camera,
            frame_counter: FrameCounter::default(),

            log_active: true,
            destroyed: false,
        }
    }
}
// destroy
impl<D: GfxDevice> RenderContext<D> {
    /// 等待 GPU 空闲后销毁所有 shader 与资源
    pub fn destroy_mut(&mut self) {
        if self.destroyed {
            return;
        }

        self.device.wait_idle();
        for (_, shader) in self.shaders.drain() {
            shader.destroy(&mut self.device);
        }
        self.resources.destroy_mut(&mut self.device);
        self.current_shader = ShaderHandle::null();
        self.current_framebuffer = FramebufferHandle::null();

        self.destroyed = true;
    }
}
impl<D: GfxDevice> Drop for RenderContext<D> {
    fn drop(&mut self) {
        self.destroy_mut();
    }
}
// getters
impl<D: GfxDevice> RenderContext<D> {
    #[inline]
    pub fn device(&self) -> &D {
        &self.device
    }
    #[inline]
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
    #[inline]
    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }
    #[inline]
    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }
    #[inline]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }
    #[inline]
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }
    #[inline]
    pub fn frame_counter(&self) -> &FrameCounter {
        &self.frame_counter
    }
    #[inline]
    pub fn raytracing_enabled(&self) -> bool {
        self.settings.raytracing
    }
    #[inline]
    pub fn surface_size(&self) -> (u32, u32) {
        (self.settings.surface_width, self.settings.surface_height)
    }
    #[inline]
    pub fn is_log_active(&self) -> bool {
        self.log_active
    }
    #[inline]
    pub fn set_log_active(&mut self, active: bool) {
        self.log_active = active;
    }
}
// frame
impl<D: GfxDevice> RenderContext<D> {
    /// 刷新相机矩阵，开始录制当前 slot 的命令
    pub fn begin_frame(&mut self) {
        let (width, height) = self.surface_size();
        self.camera.update_matrices(width as f32 / height.max(1) as f32);
        self.device.begin_frame(self.frame_counter.frame_slot());
    }

    /// 提交当前 slot，并切换到下一个 slot
    ///
    /// 下一个 slot 上一次的提交完成之前会阻塞，CPU 最多领先 GPU `fif_count` 帧
    pub fn end_frame(&mut self) {
        self.device.end_frame(self.frame_counter.frame_slot());
        self.frame_counter.next_frame();
    }

    #[inline]
    pub fn flush(&mut self) {
        self.device.flush();
    }

    #[inline]
    pub fn wait_gpu_idle(&mut self) {
        self.device.wait_idle();
    }

    /// surface 尺寸变化之后，新的默认渲染状态使用新的尺寸
    pub fn resize_surface(&mut self, width: u32, height: u32) {
        self.settings.surface_width = width;
        self.settings.surface_height = height;
        self.render_states.set_surface_size(width, height);
    }

    #[inline]
    pub fn begin_timer_query(&mut self) {
        self.device.begin_timer_query();
    }

    #[inline]
    pub fn end_timer_query(&mut self) {
        self.device.end_timer_query();
    }

    /// 毫秒；会等待查询结果可用
    #[inline]
    pub fn timer_query_result(&mut self) -> f32 {
        self.device.timer_query_result()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use tessera_crate_tools::shader_source::MemoryShaderSource;
    use tessera_gfx::headless::{HeadlessDevice, RecordedCommand};

    use super::*;

    pub(crate) fn headless_context(source: MemoryShaderSource) -> RenderContext<HeadlessDevice> {
        RenderContext::with_shader_source(
            HeadlessDevice::new(),
            ContextSettings {
                surface_width: 800,
                surface_height: 600,
                ..Default::default()
            },
            Box::new(source),
        )
    }

    #[test]
    fn test_frame_ring() {
        let mut ctx = headless_context(MemoryShaderSource::new());
        for _ in 0..4 {
            ctx.begin_frame();
            ctx.end_frame();
        }
        assert_eq!(ctx.frame_counter().frame_id(), 4);

        let slots = ctx
            .device()
            .commands()
            .iter()
            .filter_map(|cmd| match cmd {
                RecordedCommand::EndFrame(slot) => Some(*slot),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(slots, vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_destroy_releases_everything() {
        let mut ctx = headless_context(MemoryShaderSource::new());
        let texture = ctx.create_texture_2d(64, 64, tessera_gfx::basic::format::Format::Rgba8Unorm, Default::default());
        assert!(!texture.is_null());
        assert_eq!(ctx.device().live_texture_count(), 1);

        ctx.destroy_mut();
        assert_eq!(ctx.device().live_texture_count(), 0);
        assert!(ctx.resources().is_destroyed());
        // 重复销毁没有影响
        ctx.destroy_mut();
    }

    #[test]
    fn test_resize_surface() {
        let mut ctx = headless_context(MemoryShaderSource::new());
        ctx.resize_surface(1024, 768);
        ctx.reset_render_state();
        assert_eq!(ctx.render_state().viewport.max_x, 1024.0);
        assert_eq!(ctx.render_state().scissor.max_y, 768);
    }
}
