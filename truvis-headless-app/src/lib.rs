//! 没有窗口的 RenderGraph 应用：在 headless 设备上逐帧声明、构建并执行示例场景
//!
//! - [`scene_passes`]：一帧中的所有 pass
//! - [`frame_loop`]：frames in flight 节拍与每个槽位的资源

pub mod frame_loop;
pub mod scene_passes;
