//! RenderGraph 与 GPU 之间的资源层
//!
//! - [`bump_allocator`]：device / upload 两种策略的线性分配器，承载 RenderGraph 的临时 buffer
//! - [`descriptor_allocator`]：bindless 描述符下标的分配与按 scope 回收
//! - [`gfx_resource_arena`]：长期存在的 image 与 image view，支持按帧延迟销毁
//! - [`frame_counter`]：帧序号与 frames in flight 节拍

pub mod bump_allocator;
pub mod descriptor_allocator;
pub mod frame_counter;
pub mod gfx_resource_arena;
