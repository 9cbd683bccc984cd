//! 在 headless 设备上驱动 RenderGraph 的帧循环
//!
//! 每个 frame in flight 槽位持有自己的 bump allocator、描述符 scope 和 backbuffer，
//! 复用槽位之前先等待该槽位上一次提交的各个队列 time。

use anyhow::Context;
use ash::vk;
use glam::{Mat4, Vec3};

use truvis_crate_tools::{profile_frame_mark, profile_span};
use truvis_gfx::commands::submit_info::GfxSubmitInfo;
use truvis_gfx::foundation::device::GfxDevice;
use truvis_gfx::foundation::queue::GfxQueueType;
use truvis_gfx::handles::{GfxImageHandle, GfxImageViewHandle, GfxSamplerHandle};
use truvis_gfx::headless::HeadlessDevice;
use truvis_gfx::resources::descriptor::GfxDescriptorKind;
use truvis_gfx::resources::image::GfxImageDesc;
use truvis_gfx::resources::image_view::GfxImageViewDesc;
use truvis_gfx::sampler::GfxSamplerDesc;
use truvis_render_graph::render_graph::{RgBuilder, RgImageState, RgPersistent, RgSettings};
use truvis_render_interface::bump_allocator::{BumpAllocatorSettings, DeviceBumpAllocator, UploadBumpAllocator};
use truvis_render_interface::descriptor_allocator::{DescriptorAllocator, DescriptorAllocatorScope};
use truvis_render_interface::frame_counter::FrameCounter;

use crate::scene_passes::ScenePasses;

static PASS_DUMP: std::sync::Once = std::sync::Once::new();

#[derive(Clone, Copy, Debug)]
pub struct FrameLoopSettings {
    pub frame_count: u64,
    pub extent: vk::Extent2D,
    pub graph: RgSettings,
    /// 每个槽位的 device / upload bump allocator 的 block 大小
    pub bump_block_size: vk::DeviceSize,
}
impl Default for FrameLoopSettings {
    fn default() -> Self {
        Self {
            frame_count: 8,
            extent: vk::Extent2D {
                width: 320,
                height: 180,
            },
            graph: RgSettings::default(),
            bump_block_size: 4 * 1024 * 1024,
        }
    }
}

struct FrameSlot {
    device_allocator: DeviceBumpAllocator,
    upload_allocator: UploadBumpAllocator,
    descriptors: DescriptorAllocatorScope,

    /// 该槽位最近一帧提交后各队列的 time
    queue_times: [u64; GfxQueueType::COUNT],

    backbuffer: GfxImageHandle,
    backbuffer_view: GfxImageViewHandle,
    /// backbuffer 是否已经被 present 过一次
    presented: bool,
}

pub struct HeadlessFrameLoop {
    device: HeadlessDevice,
    settings: FrameLoopSettings,

    frame_counter: FrameCounter,
    slots: Vec<FrameSlot>,
    /// 所有槽位共享的描述符堆
    descriptor_allocator: DescriptorAllocator,
    sampler: GfxSamplerHandle,

    scene: ScenePasses,
    persistent: RgPersistent,
}
// new & init
impl HeadlessFrameLoop {
    pub fn new(device: HeadlessDevice, settings: FrameLoopSettings) -> anyhow::Result<Self> {
        let _span = profile_span!("HeadlessFrameLoop::new");
        let fif_count = settings.graph.fif_count;

        let sampler = device.create_sampler(&GfxSamplerDesc::default()).context("creating tonemap sampler")?;
        let descriptor_allocator = DescriptorAllocator::default();
        let block_settings = BumpAllocatorSettings {
            block_size: settings.bump_block_size,
        };

        let mut slots = Vec::with_capacity(fif_count);
        for index in 0..fif_count {
            let backbuffer = device.create_image(&GfxImageDesc::new_2d(
                format!("backbuffer-{index}"),
                settings.extent,
                ScenePasses::BACKBUFFER_FORMAT,
                ScenePasses::BACKBUFFER_USAGE,
            ))?;
            let backbuffer_view = device.create_image_view(
                backbuffer,
                &GfxImageViewDesc::new_2d(ScenePasses::BACKBUFFER_FORMAT, vk::ImageAspectFlags::COLOR),
            )?;
            slots.push(FrameSlot {
                device_allocator: DeviceBumpAllocator::new(block_settings),
                upload_allocator: UploadBumpAllocator::new(block_settings),
                descriptors: DescriptorAllocatorScope::new(&descriptor_allocator),
                queue_times: [0; GfxQueueType::COUNT],
                backbuffer,
                backbuffer_view,
                presented: false,
            });
        }

        // RgPersistent 最后创建，之后不再有失败的路径
        let mut persistent = RgPersistent::new(&device, settings.graph)?;
        let scene = ScenePasses::new(&mut persistent, settings.extent, sampler);

        log::info!(
            "frame loop: {}x{}, {} frames in flight, async compute {}",
            settings.extent.width,
            settings.extent.height,
            fif_count,
            if settings.graph.async_compute { "on" } else { "off" }
        );

        Ok(Self {
            frame_counter: FrameCounter::new(0, fif_count),
            device,
            settings,
            slots,
            descriptor_allocator,
            sampler,
            scene,
            persistent,
        })
    }
}
// destroy
impl HeadlessFrameLoop {
    pub fn destroy(mut self) {
        let _span = profile_span!("HeadlessFrameLoop::destroy");
        if let Err(e) = self.device.wait_idle() {
            log::error!("device is not idle before destroy: {}", e);
        }

        for mut slot in self.slots.drain(..) {
            slot.descriptors.reset();
            slot.device_allocator.destroy(&self.device);
            slot.upload_allocator.destroy(&self.device);
            self.device.destroy_image_view(slot.backbuffer_view);
            self.device.destroy_image(slot.backbuffer);
        }
        self.persistent.destroy(&self.device);
        self.device.destroy_sampler(self.sampler);

        let leaked: u32 = [
            GfxDescriptorKind::Sampler,
            GfxDescriptorKind::Texture,
            GfxDescriptorKind::SampledTexture,
            GfxDescriptorKind::StorageTexture,
        ]
        .into_iter()
        .map(|kind| self.descriptor_allocator.allocated_count(kind))
        .sum();
        if leaked != 0 {
            log::warn!("{} bindless descriptors are still allocated after destroy", leaked);
        }
    }
}
// getters
impl HeadlessFrameLoop {
    #[inline]
    pub fn device(&self) -> &HeadlessDevice {
        &self.device
    }

    #[inline]
    pub fn frame_counter(&self) -> &FrameCounter {
        &self.frame_counter
    }

    #[inline]
    pub fn persistent(&self) -> &RgPersistent {
        &self.persistent
    }
}
// tick
impl HeadlessFrameLoop {
    pub fn run(&mut self) -> anyhow::Result<()> {
        for _ in 0..self.settings.frame_count {
            self.run_frame()?;
        }
        Ok(())
    }

    pub fn run_frame(&mut self) -> anyhow::Result<()> {
        let _span = profile_span!("HeadlessFrameLoop::run_frame");
        let frame_name = self.frame_counter.frame_name();
        let slot_index = self.frame_counter.frame_slot();
        let view_proj = self.camera(self.frame_counter.frame_id());

        // 等到上一次使用该槽位的帧在所有队列上完成
        if let Some(frame) = self.frame_counter.frame_to_wait() {
            let _span = profile_span!("wait frame in flight");
            for queue in GfxQueueType::ALL {
                let value = self.slots[slot_index].queue_times[queue.index()];
                self.persistent
                    .wait_for_queue_time(&self.device, queue, value)
                    .with_context(|| format!("{frame_name}: waiting for frame {frame} on {queue} queue"))?;
            }
        }

        let slot = &mut self.slots[slot_index];
        slot.descriptors.reset();
        slot.upload_allocator.reset();
        {
            let mut cmd = self.device.begin_command_buffer(GfxQueueType::Main, "bump-reset")?;
            slot.device_allocator.reset(cmd.as_mut());
            self.device.submit(GfxQueueType::Main, GfxSubmitInfo::new(&[cmd.end()]))?;
        }

        self.persistent.rotate_textures();
        let mut builder = RgBuilder::new(&mut self.persistent);

        let backbuffer_state = if slot.presented {
            RgImageState::PRESENT
        } else {
            RgImageState::UNDEFINED
        };
        builder.set_external_texture(self.scene.backbuffer(), slot.backbuffer, slot.backbuffer_view, backbuffer_state);
        self.scene.declare(&mut builder, view_proj);

        let mut first_frame = false;
        PASS_DUMP.call_once(|| first_frame = true);
        if first_frame {
            builder.dump_pass_schedule();
        }

        let graph = builder
            .build(&self.device, &mut slot.device_allocator, &mut slot.upload_allocator, &mut slot.descriptors)
            .with_context(|| format!("{frame_name}: building render graph"))?;
        if first_frame {
            graph.print_execution_plan();
        }
        graph.execute(&self.device).with_context(|| format!("{frame_name}: executing render graph"))?;

        for queue in GfxQueueType::ALL {
            slot.queue_times[queue.index()] = self.persistent.queue_time(queue);
        }
        slot.presented = true;
        log::debug!(
            "{} submitted: main {}, async {}",
            frame_name,
            slot.queue_times[GfxQueueType::Main.index()],
            slot.queue_times[GfxQueueType::AsyncCompute.index()]
        );

        self.frame_counter.next_frame();
        profile_frame_mark!();
        Ok(())
    }

    /// 绕 y 轴旋转的相机
    fn camera(&self, frame_id: u64) -> Mat4 {
        let extent = self.settings.extent;
        let angle = frame_id as f32 * 0.05;
        let eye = Vec3::new(angle.cos() * 5.0, 2.0, angle.sin() * 5.0);
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        Mat4::perspective_rh(60_f32.to_radians(), aspect, 0.1, 100.0) * Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_settings(frame_count: u64, async_compute: bool) -> FrameLoopSettings {
        truvis_crate_tools::init_log::try_init_log(log::LevelFilter::Debug);
        FrameLoopSettings {
            frame_count,
            extent: vk::Extent2D { width: 64, height: 32 },
            graph: RgSettings {
                async_compute,
                fif_count: 2,
                ..Default::default()
            },
            bump_block_size: 64 * 1024,
        }
    }

    #[test]
    fn test_frames_run_without_validation_errors() {
        let device = HeadlessDevice::default();
        let mut frame_loop = HeadlessFrameLoop::new(device.clone(), small_settings(5, true)).unwrap();
        frame_loop.run().unwrap();

        assert_eq!(frame_loop.frame_counter().frame_id(), 5);
        assert!(frame_loop.persistent().queue_time(GfxQueueType::Main) >= 5);
        assert!(frame_loop.persistent().queue_time(GfxQueueType::AsyncCompute) >= 5);
        frame_loop.destroy();

        assert_eq!(device.validation_errors(), Vec::<String>::new());
        assert_eq!(device.live_image_count(), 0);
        assert_eq!(device.live_image_view_count(), 0);
    }

    #[test]
    fn test_no_async_submits_only_main() {
        let device = HeadlessDevice::default();
        let mut frame_loop = HeadlessFrameLoop::new(device.clone(), small_settings(3, false)).unwrap();
        frame_loop.run().unwrap();

        assert_eq!(frame_loop.persistent().queue_time(GfxQueueType::AsyncCompute), 0);
        frame_loop.destroy();

        assert!(device.validation_errors().is_empty());
        assert!(device.submissions().iter().all(|submission| submission.queue == GfxQueueType::Main));
    }

    #[test]
    fn test_backbuffer_ends_in_present_layout() {
        let device = HeadlessDevice::default();
        let mut frame_loop = HeadlessFrameLoop::new(device.clone(), small_settings(2, true)).unwrap();
        frame_loop.run().unwrap();
        device.wait_idle().unwrap();

        for slot in &frame_loop.slots {
            assert_eq!(device.image_layout(slot.backbuffer), Some(vk::ImageLayout::PRESENT_SRC_KHR));
        }
        frame_loop.destroy();
    }
}
