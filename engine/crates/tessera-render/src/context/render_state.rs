use tessera_gfx::device::GfxDevice;
use tessera_gfx::pipelines::render_state::{BlendFactor, RenderState};

use super::RenderContext;

// render state
impl<D: GfxDevice> RenderContext<D> {
    /// 下一次 draw 使用的状态
    #[inline]
    pub fn render_state(&self) -> &RenderState {
        self.render_states.current()
    }

    #[inline]
    pub fn render_state_mut(&mut self) -> &mut RenderState {
        self.render_states.current_mut()
    }

    /// 栈中的状态数量
    #[inline]
    pub fn render_state_depth(&self) -> usize {
        self.render_states.len()
    }

    #[inline]
    pub fn push_render_state(&mut self) {
        self.render_states.push();
    }

    #[inline]
    pub fn pop_render_state(&mut self) {
        self.render_states.pop();
    }

    #[inline]
    pub fn reset_render_state(&mut self) {
        self.render_states.reset();
    }

    #[inline]
    pub fn set_default_render_state(&mut self) {
        self.render_states.set_default();
    }

    #[inline]
    pub fn set_blend_factors(
        &mut self,
        target: usize,
        src: BlendFactor,
        src_alpha: BlendFactor,
        dst: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        self.render_states.set_blend_factors(target, src, src_alpha, dst, dst_alpha);
    }

    /// `x` 与 `y` 为像素内的偏移，范围 [-0.5, 0.5)
    #[inline]
    pub fn set_sample_location(&mut self, sample: usize, x: f32, y: f32) {
        self.render_states.set_sample_location(sample, x, y);
    }
}
