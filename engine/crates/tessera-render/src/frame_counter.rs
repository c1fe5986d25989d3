use crate::settings::{DefaultRenderSettings, FrameLabel};

/// 帧序号与 Frames in Flight 的 slot
pub struct FrameCounter {
    /// 当前的帧序号，一直累加
    frame_id: u64,
}
// new & init
impl FrameCounter {
    pub fn new(init_frame_id: u64) -> Self {
        Self {
            frame_id: init_frame_id,
        }
    }
}
impl Default for FrameCounter {
    fn default() -> Self {
        Self::new(0)
    }
}
// update
impl FrameCounter {
    #[inline]
    pub fn next_frame(&mut self) {
        self.frame_id = self.frame_id.wrapping_add(1);
    }
}
// getters
impl FrameCounter {
    const FIF_COUNT: usize = DefaultRenderSettings::FRAMES_IN_FLIGHT;

    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }
    #[inline]
    pub const fn fif_count() -> usize {
        Self::FIF_COUNT
    }
    #[inline]
    pub const fn frame_labels() -> [FrameLabel; Self::FIF_COUNT] {
        [FrameLabel::A, FrameLabel::B, FrameLabel::C]
    }
    #[inline]
    pub fn frame_label(&self) -> FrameLabel {
        FrameLabel::from_usize(self.frame_slot())
    }
    /// 当前帧使用的 slot，范围是 `0..fif_count()`
    #[inline]
    pub fn frame_slot(&self) -> usize {
        (self.frame_id % Self::FIF_COUNT as u64) as usize
    }
    #[inline]
    pub fn frame_name(&self) -> String {
        format!("[F{}{}]", self.frame_id, self.frame_label())
    }
}
