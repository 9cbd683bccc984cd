//! 在 headless 设备上跑若干帧 RenderGraph，第一帧打印 pass 调度与执行计划
//!
//! 用法：`rg-frame-loop [frame-count] [--no-async]`

use anyhow::Context;

use truvis_gfx::headless::HeadlessDevice;
use truvis_headless_app::frame_loop::{FrameLoopSettings, HeadlessFrameLoop};

fn panic_handler(info: &std::panic::PanicHookInfo) {
    log::error!("{}", info);
}

fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(panic_handler));
    truvis_crate_tools::init_log::init_log();

    let mut settings = FrameLoopSettings::default();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--no-async" => settings.graph.async_compute = false,
            count => {
                settings.frame_count = count.parse().with_context(|| format!("invalid frame count \"{count}\""))?;
            }
        }
    }

    let device = HeadlessDevice::default();
    let mut frame_loop = HeadlessFrameLoop::new(device.clone(), settings)?;
    let result = frame_loop.run();
    frame_loop.destroy();
    result?;

    let errors = device.validation_errors();
    for error in &errors {
        log::error!("validation: {}", error);
    }
    anyhow::ensure!(errors.is_empty(), "{} validation errors", errors.len());

    log::info!("{} frames finished, {} submissions", settings.frame_count, device.submissions().len());
    Ok(())
}
