/// 帧计数与 frames in flight 的节拍
///
/// 第 N 帧复用第 N - fif 帧的资源，开始第 N 帧之前需要等待第 N - fif 帧完成。
pub struct FrameCounter {
    /// 当前的帧序号，一直累加
    frame_id: u64,
    fif_count: usize,
}
// new & init
impl FrameCounter {
    pub const DEFAULT_FIF_COUNT: usize = 3;

    pub fn new(init_frame_id: u64, fif_count: usize) -> Self {
        assert!(fif_count > 0, "frames in flight must be at least 1");
        Self {
            frame_id: init_frame_id,
            fif_count,
        }
    }
}
impl Default for FrameCounter {
    fn default() -> Self {
        Self::new(0, Self::DEFAULT_FIF_COUNT)
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
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }
    #[inline]
    pub fn fif_count(&self) -> usize {
        self.fif_count
    }
    /// 当前帧占用的 frames in flight 槽位
    #[inline]
    pub fn frame_slot(&self) -> usize {
        (self.frame_id % self.fif_count as u64) as usize
    }
    /// 开始当前帧之前需要等待完成的帧，前 fif 帧不需要等待
    #[inline]
    pub fn frame_to_wait(&self) -> Option<u64> {
        self.frame_id.checked_sub(self.fif_count as u64)
    }
    #[inline]
    pub fn frame_label(&self) -> char {
        (b'A' + (self.frame_slot() % 26) as u8) as char
    }
    #[inline]
    pub fn frame_name(&self) -> String {
        format!("[F{}{}]", self.frame_id, self.frame_label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_pacing() {
        let mut counter = FrameCounter::new(0, 2);
        assert_eq!(counter.frame_to_wait(), None);
        assert_eq!(counter.frame_name(), "[F0A]");

        counter.next_frame();
        counter.next_frame();
        assert_eq!(counter.frame_slot(), 0);
        assert_eq!(counter.frame_to_wait(), Some(0));

        counter.next_frame();
        assert_eq!(counter.frame_name(), "[F3B]");
    }
}
