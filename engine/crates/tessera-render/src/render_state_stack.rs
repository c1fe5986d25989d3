use tessera_gfx::basic::format::CompareFunc;
use tessera_gfx::pipelines::render_state::{
    BlendFactor, CullMode, MAX_RENDER_TARGETS, MAX_SAMPLE_LOCATIONS, RenderState, ScissorRect, ViewportState,
};

/// 渲染状态的栈
///
/// 栈顶单独存放，因此栈永远不为空；`saved` 中是 push 时保存的状态
pub struct RenderStateStack {
    top: RenderState,
    saved: Vec<RenderState>,

    surface_width: u32,
    surface_height: u32,
}
// new & init
impl RenderStateStack {
    pub fn new(surface_width: u32, surface_height: u32) -> Self {
        let mut stack = Self {
            top: RenderState::default(),
            saved: vec![],
            surface_width,
            surface_height,
        };
        stack.top = stack.default_state();
        stack
    }

    /// 默认状态：深度比较为 GreaterOrEqual（reversed-Z），逆时针为正面，不剔除，
    /// viewport 与 scissor 覆盖整个 surface
    pub fn default_state(&self) -> RenderState {
        let mut state = RenderState::default();
        state.viewport = ViewportState::new(self.surface_width as f32, self.surface_height as f32);
        state.scissor = ScissorRect::new(self.surface_width, self.surface_height);
        state.depth_stencil.depth_func = CompareFunc::GreaterOrEqual;
        state.raster.front_counter_clockwise = true;
        state.raster.cull_mode = CullMode::None;
        state
    }
}
// getters
impl RenderStateStack {
    #[inline]
    pub fn current(&self) -> &RenderState {
        &self.top
    }

    #[inline]
    pub fn current_mut(&mut self) -> &mut RenderState {
        &mut self.top
    }

    /// 栈中的状态数量，至少为 1
    #[inline]
    pub fn len(&self) -> usize {
        self.saved.len() + 1
    }

    #[inline]
    pub fn surface_size(&self) -> (u32, u32) {
        (self.surface_width, self.surface_height)
    }
}
// update
impl RenderStateStack {
    /// 复制栈顶
    pub fn push(&mut self) {
        self.saved.push(self.top);
    }

    /// 恢复 push 之前的状态；只剩一个状态时恢复为默认状态
    pub fn pop(&mut self) {
        self.top = match self.saved.pop() {
            Some(state) => state,
            None => self.default_state(),
        };
    }

    /// 清空为唯一的默认状态
    pub fn reset(&mut self) {
        self.saved.clear();
        self.top = self.default_state();
    }

    /// 只重置栈顶
    pub fn set_default(&mut self) {
        self.top = self.default_state();
    }

    /// 之后创建的默认状态使用新的尺寸，已有的状态不受影响
    pub fn set_surface_size(&mut self, width: u32, height: u32) {
        self.surface_width = width;
        self.surface_height = height;
    }

    /// `target` 越界时忽略
    pub fn set_blend_factors(
        &mut self,
        target: usize,
        src: BlendFactor,
        src_alpha: BlendFactor,
        dst: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        if target >= MAX_RENDER_TARGETS {
            return;
        }
        let blend = &mut self.top.blend.targets[target];
        blend.src_blend = src;
        blend.src_blend_alpha = src_alpha;
        blend.dest_blend = dst;
        blend.dest_blend_alpha = dst_alpha;
    }

    /// 采样位置以 1/16 像素为单位保存；`sample` 越界时忽略
    pub fn set_sample_location(&mut self, sample: usize, x: f32, y: f32) {
        if sample >= MAX_SAMPLE_LOCATIONS {
            return;
        }
        let raster = &mut self.top.raster;
        raster.sample_positions_x[sample] = (x * 16.0).round() as i8;
        raster.sample_positions_y[sample] = (y * 16.0).round() as i8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_round_trip() {
        let mut stack = RenderStateStack::new(800, 600);
        let before = *stack.current();

        stack.push();
        stack.current_mut().raster.cull_mode = CullMode::Back;
        stack.current_mut().depth_stencil.depth_write_enable = false;
        assert_eq!(stack.len(), 2);

        stack.pop();
        assert_eq!(stack.len(), 1);
        assert_eq!(*stack.current(), before);
        assert_eq!(stack.current().raster.cull_mode, CullMode::None);
    }

    #[test]
    fn test_pop_single_entry_resets_to_default() {
        let mut stack = RenderStateStack::new(800, 600);
        stack.current_mut().raster.rasterizer_discard = true;

        stack.pop();
        assert_eq!(stack.len(), 1);
        assert_eq!(*stack.current(), stack.default_state());
    }

    #[test]
    fn test_reset() {
        let mut stack = RenderStateStack::new(640, 480);
        stack.push();
        stack.push();
        stack.current_mut().blend.targets[0].blend_enable = true;

        stack.reset();
        assert_eq!(stack.len(), 1);
        assert_eq!(*stack.current(), stack.default_state());
    }

    #[test]
    fn test_default_state() {
        let stack = RenderStateStack::new(640, 480);
        let state = stack.current();
        assert_eq!(state.depth_stencil.depth_func, CompareFunc::GreaterOrEqual);
        assert!(state.raster.front_counter_clockwise);
        assert_eq!(state.raster.cull_mode, CullMode::None);
        assert_eq!(state.viewport.max_x, 640.0);
        assert_eq!(state.viewport.max_y, 480.0);
        assert_eq!(state.viewport.max_z, 1.0);
        assert_eq!(state.scissor.max_x, 640);
        assert_eq!(state.scissor.max_y, 480);
        assert!(!state.blend.targets[0].blend_enable);
    }

    #[test]
    fn test_set_default_keeps_saved_states() {
        let mut stack = RenderStateStack::new(640, 480);
        stack.current_mut().raster.cull_mode = CullMode::Front;
        stack.push();
        stack.current_mut().raster.cull_mode = CullMode::Back;

        stack.set_default();
        assert_eq!(stack.current().raster.cull_mode, CullMode::None);
        stack.pop();
        assert_eq!(stack.current().raster.cull_mode, CullMode::Front);
    }

    #[test]
    fn test_blend_factors_out_of_range_ignored() {
        let mut stack = RenderStateStack::new(640, 480);
        let before = *stack.current();
        stack.set_blend_factors(
            MAX_RENDER_TARGETS,
            BlendFactor::SrcAlpha,
            BlendFactor::One,
            BlendFactor::InvSrcAlpha,
            BlendFactor::Zero,
        );
        assert_eq!(*stack.current(), before);

        stack.set_blend_factors(1, BlendFactor::SrcAlpha, BlendFactor::One, BlendFactor::InvSrcAlpha, BlendFactor::Zero);
        let target = stack.current().blend.targets[1];
        assert_eq!(target.src_blend, BlendFactor::SrcAlpha);
        assert_eq!(target.src_blend_alpha, BlendFactor::One);
        assert_eq!(target.dest_blend, BlendFactor::InvSrcAlpha);
        assert_eq!(target.dest_blend_alpha, BlendFactor::Zero);
    }

    #[test]
    fn test_sample_location() {
        let mut stack = RenderStateStack::new(640, 480);
        stack.set_sample_location(3, 0.25, -0.5);
        assert_eq!(stack.current().raster.sample_positions_x[3], 4);
        assert_eq!(stack.current().raster.sample_positions_y[3], -8);

        // 越界的 sample 被忽略
        let before = *stack.current();
        stack.set_sample_location(MAX_SAMPLE_LOCATIONS, 0.5, 0.5);
        assert_eq!(*stack.current(), before);
    }
}
