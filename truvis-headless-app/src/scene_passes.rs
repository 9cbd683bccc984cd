//! 示例帧的 pass 声明
//!
//! ```text
//! camera:upload (host) ─┐
//! cull (async) ─────────┼─> raster (main) ─> accumulate (async) ─> tonemap (main) ─> present
//!                       │                        ▲
//!                       └──────────── accum[history 1]
//! ```

use ash::vk;
use glam::{Mat4, UVec3, Vec4};

use truvis_gfx::commands::rendering_info::{GfxColorAttachmentOps, GfxDepthAttachmentOps};
use truvis_gfx::foundation::queue::GfxQueueType;
use truvis_gfx::handles::GfxSamplerHandle;
use truvis_gfx::resources::buffer::GfxMemoryHeap;
use truvis_render_graph::render_graph::{
    RgBufferCreateInfo, RgBufferState, RgBuilder, RgImageState, RgPersistent, RgTemporalInit, RgTextureCreateInfo,
    RgTextureId, RgTextureKind,
};

pub struct ScenePasses {
    extent: vk::Extent2D,
    sampler: GfxSamplerHandle,

    /// 两层的 temporal texture，每帧累积到当前层
    accum: RgTextureId,
    /// 由调用者每帧绑定
    backbuffer: RgTextureId,
}
// new & init
impl ScenePasses {
    pub const BACKBUFFER_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;
    pub const BACKBUFFER_USAGE: vk::ImageUsageFlags =
        vk::ImageUsageFlags::from_raw(vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw() | vk::ImageUsageFlags::TRANSFER_DST.as_raw());

    pub fn new(persistent: &mut RgPersistent, extent: vk::Extent2D, sampler: GfxSamplerHandle) -> Self {
        let accum = persistent.create_texture(RgTextureCreateInfo::new_2d(
            "accum",
            extent,
            vk::Format::R16G16B16A16_SFLOAT,
            RgTextureKind::Temporal {
                layers: 2,
                init: Some(RgTemporalInit::Clear(Vec4::ZERO)),
            },
        ));
        let backbuffer = persistent.create_texture(RgTextureCreateInfo::new_2d(
            "backbuffer",
            extent,
            Self::BACKBUFFER_FORMAT,
            RgTextureKind::External {
                usage: Self::BACKBUFFER_USAGE,
            },
        ));

        Self {
            extent,
            sampler,
            accum,
            backbuffer,
        }
    }
}
// getters
impl ScenePasses {
    #[inline]
    pub fn backbuffer(&self) -> RgTextureId {
        self.backbuffer
    }
}
impl ScenePasses {
    /// 声明一帧的所有 pass，调用前 backbuffer 需要已经绑定
    pub fn declare(&self, builder: &mut RgBuilder, view_proj: Mat4) {
        let extent = self.extent;
        let groups = UVec3::new(extent.width.div_ceil(8), extent.height.div_ceil(8), 1);

        let mut camera = builder
            .create_buffer("camera", GfxMemoryHeap::Upload, size_of::<Mat4>() as vk::DeviceSize)
            .cast::<Mat4>();
        let mut upload = builder.create_pass("camera:upload", GfxQueueType::Main);
        let camera_token = upload.write_buffer("camera:written", &mut camera, RgBufferState::HOST_WRITE);
        upload.set_host_callback(move |_, rt| rt.write_buffer(camera_token, &[view_proj]));

        // indirect draw 的参数：vertex_count, instance_count, first_vertex, first_instance
        let mut draw_args = builder.create_buffer_with_init(
            RgBufferCreateInfo::new("draw-args", GfxMemoryHeap::Default, 4)
                .with_init(0u32)
                .with_init_queue(GfxQueueType::AsyncCompute),
        );
        let mut cull = builder.create_pass("cull", GfxQueueType::AsyncCompute);
        let args_token = cull.write_buffer("draw-args:culled", &mut draw_args, RgBufferState::STORAGE_READ_WRITE_COMPUTE);
        cull.set_compute_callback(move |_, rt, cmd| {
            log::trace!("cull: draw args at {:?}", rt.get_buffer_device_ptr(args_token));
            cmd.dispatch(UVec3::new(64, 1, 1));
        });

        let mut scene_color = builder.create_texture(RgTextureCreateInfo::new_2d(
            "scene-color",
            extent,
            vk::Format::R16G16B16A16_SFLOAT,
            RgTextureKind::Transient,
        ));
        let mut depth = builder.create_texture(RgTextureCreateInfo::new_2d(
            "depth",
            extent,
            vk::Format::D32_SFLOAT,
            RgTextureKind::Transient,
        ));
        let mut raster = builder.create_pass("raster", GfxQueueType::Main);
        raster.read_buffer(draw_args, RgBufferState::INDIRECT_BUFFER);
        raster.read_buffer(camera, RgBufferState::UNIFORM_FRAGMENT);
        raster.write_color_attachment(
            "scene-color:raster",
            &mut scene_color,
            GfxColorAttachmentOps::clear(Vec4::ZERO),
            0,
        );
        raster.write_depth_attachment("depth:raster", &mut depth, GfxDepthAttachmentOps::clear(1.0));
        raster.set_render_pass_callback(|_, _, cmd| cmd.draw(3, 1));

        let mut accum = self.accum;
        let mut accumulate = builder.create_pass("accumulate", GfxQueueType::AsyncCompute);
        let history = accumulate.read_texture_history(self.accum, RgImageState::SHADER_READ_COMPUTE, None, 1);
        let color = accumulate.read_texture(scene_color, RgImageState::SHADER_READ_COMPUTE);
        let output = accumulate.write_texture("accum:resolved", &mut accum, RgImageState::STORAGE_WRITE_COMPUTE);
        accumulate.set_compute_callback(move |_, rt, cmd| {
            log::trace!(
                "accumulate: history #{} color #{} output #{}",
                rt.get_texture_descriptor(history).index(),
                rt.get_texture_descriptor(color).index(),
                rt.get_storage_texture_descriptor(output, 0).index()
            );
            cmd.dispatch(groups);
        });

        let mut backbuffer = self.backbuffer;
        let mut tonemap = builder.create_pass("tonemap", GfxQueueType::Main);
        let source = tonemap.read_sampled_texture(accum, RgImageState::SHADER_READ_FRAGMENT, self.sampler);
        tonemap.write_color_attachment(
            "backbuffer:tonemapped",
            &mut backbuffer,
            GfxColorAttachmentOps::clear(Vec4::ZERO),
            0,
        );
        tonemap.set_render_pass_callback(move |_, rt, cmd| {
            log::trace!("tonemap: source #{}", rt.get_sampled_texture_descriptor(source).index());
            cmd.draw(3, 1);
        });

        let mut present = builder.create_pass("present", GfxQueueType::Main);
        present.read_texture(backbuffer, RgImageState::PRESENT);
        present.set_callback(|_, _, _| {});
    }
}
