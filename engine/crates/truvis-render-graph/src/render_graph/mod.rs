//! RenderGraph - 逐帧声明、自动同步的渲染图
//!
//! # 核心概念
//!
//! - **RgPersistent**: 跨帧状态。persistent / temporal / external texture、transient 图像池、
//!   每个队列的 timeline semaphore
//! - **RgBuilder**: 每帧创建一次，声明 buffer、transient texture 和 pass
//! - **版本**: 每次写入资源都会得到一个新的 id，旧 id 之后不能再使用
//! - **RenderGraph**: `build` 的产物，带有推导好的 barrier 与 semaphore，`execute` 后提交到各个队列
//! - **RgRuntime**: pass 回调中把 token 解析为物理资源与 bindless 描述符
//!
//! # 使用示例
//!
//! ```ignore
//! persistent.rotate_textures();
//! let mut builder = RgBuilder::new(&mut persistent);
//!
//! let mut output = builder.create_texture(RgTextureCreateInfo::new_2d(
//!     "output",
//!     extent,
//!     vk::Format::R8G8B8A8_UNORM,
//!     RgTextureKind::Transient,
//! ));
//! let mut pass = builder.create_pass("shade", GfxQueueType::AsyncCompute);
//! let output_token = pass.write_texture("output:shaded", &mut output, RgImageState::STORAGE_WRITE_COMPUTE);
//! pass.set_compute_callback(move |_, rt, cmd| {
//!     let _uav = rt.get_storage_texture_descriptor(output_token, 0);
//!     cmd.dispatch(glam::UVec3::new(extent.width / 8, extent.height / 8, 1));
//! });
//!
//! let graph = builder.build(&device, &mut device_allocator, &mut upload_allocator, &mut descriptors)?;
//! graph.execute(&device)?;
//! ```

mod barrier;
mod buffer_resource;
mod builder;
mod error;
mod executor;
mod graph;
mod handle;
mod image_resource;
mod pass;
mod persistent;
mod resource_state;
mod runtime;
mod settings;

// Re-exports
pub use barrier::RgQueuePoint;
pub use buffer_resource::RgBufferCreateInfo;
pub use builder::RgBuilder;
pub use error::{RgError, RgResult};
pub use graph::{RenderGraph, RgRtPass};
pub use handle::{
    RgBufferId, RgBufferToken, RgPassId, RgSemaphoreId, RgTextureId, RgTextureToken, RgUntypedBufferId,
};
pub use image_resource::{
    RG_MAX_TEMPORAL_LAYERS, RgTemporalInit, RgTextureCreateInfo, RgTextureInitCallback, RgTextureKind,
};
pub use pass::{RgCommandCallback, RgHostCallback, RgPassBuilder, RgPassKind};
pub use persistent::RgPersistent;
pub use resource_state::{RgBufferState, RgImageState};
pub use runtime::RgRuntime;
pub use settings::RgSettings;
