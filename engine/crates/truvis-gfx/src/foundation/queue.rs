use std::fmt::Display;

/// 硬件队列
///
/// - `Main`：graphics + compute + transfer
/// - `AsyncCompute`：独立的 compute 队列，和 `Main` 并行执行
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum GfxQueueType {
    #[default]
    Main,
    AsyncCompute,
}
impl GfxQueueType {
    pub const COUNT: usize = 2;
    pub const ALL: [Self; Self::COUNT] = [Self::Main, Self::AsyncCompute];

    #[inline]
    pub const fn index(&self) -> usize {
        match self {
            Self::Main => 0,
            Self::AsyncCompute => 1,
        }
    }
}
impl Display for GfxQueueType {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Main => write!(f, "main"),
            Self::AsyncCompute => write!(f, "async"),
        }
    }
}
