//! 在 HeadlessDevice 上跑完整的帧：声明、build、execute，然后检查同步结果与设备状态

use std::cell::Cell;
use std::sync::{Arc, Mutex};

use ash::vk;
use glam::{UVec3, Vec4};

use truvis_gfx::GfxError;
use truvis_gfx::commands::command_recorder::GfxCommandRecorder;
use truvis_gfx::commands::rendering_info::GfxColorAttachmentOps;
use truvis_gfx::commands::submit_info::GfxSemaphoreSubmitInfo;
use truvis_gfx::foundation::device::GfxDevice;
use truvis_gfx::foundation::queue::GfxQueueType;
use truvis_gfx::handles::GfxImageHandle;
use truvis_gfx::headless::{HeadlessDevice, HeadlessSettings};
use truvis_gfx::resources::buffer::{GfxBufferView, GfxMemoryHeap};
use truvis_gfx::resources::descriptor::GfxDescriptorKind;
use truvis_gfx::resources::image::GfxImageDesc;
use truvis_gfx::resources::image_view::GfxImageViewDesc;
use truvis_render_graph::render_graph::{
    RenderGraph, RgBufferState, RgBuilder, RgError, RgImageState, RgPersistent, RgRuntime, RgSettings, RgTemporalInit,
    RgTextureCreateInfo, RgTextureId, RgTextureKind,
};
use truvis_render_interface::bump_allocator::{BumpAllocatorSettings, DeviceBumpAllocator, UploadBumpAllocator};
use truvis_render_interface::descriptor_allocator::{
    DescriptorAllocator, DescriptorAllocatorScope, DescriptorAllocatorSettings,
};

struct Harness {
    device: HeadlessDevice,
    persistent: RgPersistent,
    device_allocator: DeviceBumpAllocator,
    upload_allocator: UploadBumpAllocator,
    descriptors: DescriptorAllocatorScope,
}
impl Harness {
    fn new(settings: RgSettings) -> Self {
        Self::with_device(HeadlessDevice::default(), settings)
    }

    fn with_device(device: HeadlessDevice, settings: RgSettings) -> Self {
        truvis_crate_tools::init_log::try_init_log(log::LevelFilter::Trace);
        let persistent = RgPersistent::new(&device, settings).unwrap();
        let allocator_settings = BumpAllocatorSettings { block_size: 64 * 1024 };
        Self {
            device,
            persistent,
            device_allocator: DeviceBumpAllocator::new(allocator_settings),
            upload_allocator: UploadBumpAllocator::new(allocator_settings),
            descriptors: DescriptorAllocatorScope::new(&DescriptorAllocator::default()),
        }
    }

    fn destroy(mut self) {
        self.device.wait_idle().unwrap();
        self.descriptors.reset();
        self.persistent.destroy(&self.device);
        self.device_allocator.destroy(&self.device);
        self.upload_allocator.destroy(&self.device);
    }
}

fn texture_2d(name: &str, size: u32, kind: RgTextureKind) -> RgTextureCreateInfo {
    RgTextureCreateInfo::new_2d(
        name,
        vk::Extent2D {
            width: size,
            height: size,
        },
        vk::Format::R8G8B8A8_UNORM,
        kind,
    )
}

fn dispatch(_: &dyn GfxDevice, _: &RgRuntime, cmd: &mut dyn GfxCommandRecorder) {
    cmd.dispatch(UVec3::ONE);
}

/// 每个 pass 的同步结果，用于比较两次 build
fn describe(graph: &RenderGraph) -> Vec<String> {
    graph
        .passes()
        .iter()
        .map(|pass| {
            format!(
                "{} {:?}@{} mem={} img={:?} wait={:?} signal={:?}",
                pass.name(),
                pass.queue(),
                pass.time(),
                pass.memory_barriers().len(),
                pass.image_barriers().iter().map(|b| (b.old_layout(), b.new_layout())).collect::<Vec<_>>(),
                pass.wait_semaphores().iter().map(|w| w.value).collect::<Vec<_>>(),
                pass.signal_semaphores().iter().map(|s| s.value).collect::<Vec<_>>(),
            )
        })
        .collect()
}

#[test]
fn test_cross_queue_read_uses_semaphore() {
    let mut h = Harness::new(RgSettings::default());
    let main = h.persistent.queue_semaphore(GfxQueueType::Main);
    let async_compute = h.persistent.queue_semaphore(GfxQueueType::AsyncCompute);

    h.persistent.rotate_textures();
    {
        let mut builder = RgBuilder::new(&mut h.persistent);
        let mut data = builder.create_buffer("data", GfxMemoryHeap::Default, 256);

        let mut produce = builder.create_pass("produce", GfxQueueType::Main);
        produce.write_buffer("data:produced", &mut data, RgBufferState::STORAGE_WRITE_COMPUTE);
        produce.set_compute_callback(dispatch);

        let mut consume = builder.create_pass("consume", GfxQueueType::AsyncCompute);
        consume.read_buffer(data, RgBufferState::STORAGE_READ_COMPUTE);
        consume.set_compute_callback(dispatch);

        let graph = builder
            .build(&h.device, &mut h.device_allocator, &mut h.upload_allocator, &mut h.descriptors)
            .unwrap();

        let produce = graph.pass("produce").unwrap();
        assert!(!produce.has_barriers());
        assert!(produce.wait_semaphores().is_empty());
        assert_eq!(
            produce.signal_semaphores(),
            &[GfxSemaphoreSubmitInfo::timeline(main, vk::PipelineStageFlags2::ALL_COMMANDS, 1)]
        );

        let consume = graph.pass("consume").unwrap();
        assert_eq!(consume.queue(), Some(GfxQueueType::AsyncCompute));
        assert!(consume.memory_barriers().is_empty());
        assert_eq!(
            consume.wait_semaphores(),
            &[GfxSemaphoreSubmitInfo::timeline(main, vk::PipelineStageFlags2::ALL_COMMANDS, 1)]
        );
        assert_eq!(
            consume.signal_semaphores(),
            &[GfxSemaphoreSubmitInfo::timeline(async_compute, vk::PipelineStageFlags2::ALL_COMMANDS, 1)]
        );

        graph.execute(&h.device).unwrap();
    }

    h.persistent.wait_for_queue_time(&h.device, GfxQueueType::AsyncCompute, 1).unwrap();
    assert_eq!(h.persistent.queue_time(GfxQueueType::Main), 1);
    assert_eq!(h.persistent.queue_time(GfxQueueType::AsyncCompute), 1);

    let submissions = h.device.take_submissions();
    assert_eq!(submissions.len(), 2);
    let async_submission = submissions.iter().find(|s| s.queue == GfxQueueType::AsyncCompute).unwrap();
    assert_eq!(async_submission.labels(), vec!["consume"]);
    assert!(h.device.validation_errors().is_empty(), "{:?}", h.device.validation_errors());

    h.destroy();
}

#[test]
fn test_consecutive_sampled_reads_share_one_transition() {
    let mut h = Harness::new(RgSettings::default());
    let image = Cell::new(None::<GfxImageHandle>);

    h.persistent.rotate_textures();
    {
        let mut builder = RgBuilder::new(&mut h.persistent);
        let mut target = builder.create_texture(texture_2d("target", 8, RgTextureKind::Transient));
        builder.clear_texture("target:clear", &mut target, Vec4::ONE);

        for name in ["read-a", "read-b"] {
            let mut pass = builder.create_pass(name, GfxQueueType::Main);
            let token = pass.read_texture(target, RgImageState::SHADER_READ_COMPUTE);
            let image = &image;
            pass.set_compute_callback(move |_, rt, cmd| {
                assert!(rt.try_get_texture_descriptor(token).is_some());
                image.set(Some(rt.get_texture(token)));
                cmd.dispatch(UVec3::ONE);
            });
        }

        let graph = builder
            .build(&h.device, &mut h.device_allocator, &mut h.upload_allocator, &mut h.descriptors)
            .unwrap();

        let clear = graph.pass("target:clear").unwrap();
        assert_eq!(clear.image_barriers().len(), 1);
        assert_eq!(clear.image_barriers()[0].old_layout(), vk::ImageLayout::UNDEFINED);

        let read_a = graph.pass("read-a").unwrap();
        assert_eq!(read_a.image_barriers().len(), 1);
        let barrier = &read_a.image_barriers()[0];
        assert_eq!(barrier.old_layout(), vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(barrier.new_layout(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(barrier.src_stage(), vk::PipelineStageFlags2::TRANSFER);
        assert_eq!(barrier.dst_stage(), vk::PipelineStageFlags2::COMPUTE_SHADER);

        assert!(!graph.pass("read-b").unwrap().has_barriers());

        graph.execute(&h.device).unwrap();
    }

    h.device.wait_idle().unwrap();
    let image = image.get().unwrap();
    assert_eq!(h.device.image_layout(image), Some(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));
    assert_eq!(h.device.image_clear_value(image), Some(Vec4::ONE));
    assert!(h.device.validation_errors().is_empty(), "{:?}", h.device.validation_errors());

    h.destroy();
}

#[test]
fn test_temporal_history_reads_previous_frame() {
    let mut h = Harness::new(RgSettings::default());
    let history = h.persistent.create_texture(texture_2d(
        "history",
        4,
        RgTextureKind::Temporal {
            layers: 2,
            init: None,
        },
    ));

    let mut read_layers = Vec::new();
    let mut written = Vec::new();
    let mut read = Vec::new();
    for _ in 0..3 {
        h.persistent.rotate_textures();
        read_layers.push(h.persistent.temporal_layer(history, 1));

        let current = Cell::new(None::<GfxImageHandle>);
        let previous = Cell::new(None::<GfxImageHandle>);
        {
            let mut builder = RgBuilder::new(&mut h.persistent);
            let mut id = history;
            let mut pass = builder.create_pass("accumulate", GfxQueueType::Main);
            let previous_token = pass.read_texture_history(id, RgImageState::SHADER_READ_COMPUTE, None, 1);
            let current_token = pass.write_texture("history:next", &mut id, RgImageState::STORAGE_WRITE_COMPUTE);
            let (current, previous) = (&current, &previous);
            pass.set_compute_callback(move |_, rt, cmd| {
                current.set(Some(rt.get_texture(current_token)));
                previous.set(Some(rt.get_texture(previous_token)));
                assert!(rt.try_get_storage_texture_descriptor(current_token, 0).is_some());
                cmd.dispatch(UVec3::ONE);
            });

            let graph = builder
                .build(&h.device, &mut h.device_allocator, &mut h.upload_allocator, &mut h.descriptors)
                .unwrap();
            graph.execute(&h.device).unwrap();
        }
        written.push(current.get().unwrap());
        read.push(previous.get().unwrap());
    }

    assert_eq!(read_layers, vec![0, 1, 0]);
    // 本帧读到的 history 是上一帧写入的图像
    assert_eq!(read[1], written[0]);
    assert_eq!(read[2], written[1]);
    assert_ne!(written[0], written[1]);
    assert_eq!(written[0], written[2]);

    h.device.wait_idle().unwrap();
    assert!(h.device.validation_errors().is_empty(), "{:?}", h.device.validation_errors());
    h.destroy();
}

#[test]
fn test_temporal_init_runs_once() {
    let mut h = Harness::new(RgSettings::default());
    let clear_value = Vec4::new(0.25, 0.5, 0.75, 1.0);
    let accum = h.persistent.create_texture(texture_2d(
        "accum",
        4,
        RgTextureKind::Temporal {
            layers: 2,
            init: Some(RgTemporalInit::Clear(clear_value)),
        },
    ));

    let images = Cell::new(None::<(GfxImageHandle, GfxImageHandle)>);
    for frame in 0..2 {
        h.persistent.rotate_textures();
        {
            let mut builder = RgBuilder::new(&mut h.persistent);
            let mut id = accum;
            let mut pass = builder.create_pass("accumulate", GfxQueueType::Main);
            let previous = pass.read_texture_history(id, RgImageState::SHADER_READ_COMPUTE, None, 1);
            let current = pass.write_texture("accum:next", &mut id, RgImageState::STORAGE_WRITE_COMPUTE);
            let images = &images;
            pass.set_compute_callback(move |_, rt, cmd| {
                images.set(Some((rt.get_texture(current), rt.get_texture(previous))));
                cmd.dispatch(UVec3::ONE);
            });

            let graph = builder
                .build(&h.device, &mut h.device_allocator, &mut h.upload_allocator, &mut h.descriptors)
                .unwrap();
            assert_eq!(graph.pass("init:accum").is_some(), frame == 0);
            graph.execute(&h.device).unwrap();
        }

        h.device.wait_idle().unwrap();
        let (current, previous) = images.get().unwrap();
        assert_eq!(h.device.image_clear_value(current), Some(clear_value));
        assert_eq!(h.device.image_clear_value(previous), Some(clear_value));
    }

    assert!(h.device.validation_errors().is_empty(), "{:?}", h.device.validation_errors());
    h.destroy();
}

#[test]
fn test_temporal_init_callback_sees_every_layer() {
    let mut h = Harness::new(RgSettings::default());
    let initialized = Arc::new(Mutex::new(Vec::<GfxImageHandle>::new()));
    let init = {
        let initialized = initialized.clone();
        RgTemporalInit::callback(RgImageState::STORAGE_WRITE_COMPUTE, move |_, image, cmd| {
            initialized.lock().unwrap().push(image);
            cmd.dispatch(UVec3::ONE);
        })
    };
    let accum = h.persistent.create_texture(texture_2d(
        "accum",
        4,
        RgTextureKind::Temporal {
            layers: 2,
            init: Some(init),
        },
    ));

    let images = Cell::new(None::<(GfxImageHandle, GfxImageHandle)>);
    for frame in 0..2 {
        h.persistent.rotate_textures();
        {
            let mut builder = RgBuilder::new(&mut h.persistent);
            let mut id = accum;
            let mut pass = builder.create_pass("accumulate", GfxQueueType::Main);
            let previous = pass.read_texture_history(id, RgImageState::SHADER_READ_COMPUTE, None, 1);
            let current = pass.write_texture("accum:next", &mut id, RgImageState::STORAGE_WRITE_COMPUTE);
            let images = &images;
            pass.set_compute_callback(move |_, rt, cmd| {
                images.set(Some((rt.get_texture(current), rt.get_texture(previous))));
                cmd.dispatch(UVec3::ONE);
            });

            let graph = builder
                .build(&h.device, &mut h.device_allocator, &mut h.upload_allocator, &mut h.descriptors)
                .unwrap();
            if frame == 0 {
                let init = graph.pass("init:accum").unwrap();
                assert_eq!(init.image_barriers().len(), 2);
                assert!(init.image_barriers().iter().all(|b| b.new_layout() == vk::ImageLayout::GENERAL));
            } else {
                assert!(graph.pass("init:accum").is_none());
            }
            graph.execute(&h.device).unwrap();
        }
        h.device.wait_idle().unwrap();
    }

    let (current, previous) = images.get().unwrap();
    let mut initialized = initialized.lock().unwrap().clone();
    initialized.sort();
    let mut expected = vec![current, previous];
    expected.sort();
    assert_eq!(initialized, expected);

    assert!(h.device.validation_errors().is_empty(), "{:?}", h.device.validation_errors());
    h.destroy();
}

#[test]
#[should_panic(expected = "must be initialized with a write access")]
fn test_temporal_init_requires_write_state() {
    let mut h = Harness::new(RgSettings::default());
    h.persistent.create_texture(texture_2d(
        "accum",
        4,
        RgTextureKind::Temporal {
            layers: 2,
            init: Some(RgTemporalInit::callback(RgImageState::SHADER_READ_COMPUTE, |_, _, _| {})),
        },
    ));
}

#[test]
fn test_fill_and_copy_reach_memory() {
    let mut h = Harness::new(RgSettings::default());
    let copy_view = Cell::new(None::<GfxBufferView>);
    let triples_view = Cell::new(None::<GfxBufferView>);

    h.persistent.rotate_textures();
    {
        let mut builder = RgBuilder::new(&mut h.persistent);
        let mut words = builder.create_buffer("words", GfxMemoryHeap::Default, 64).cast::<u32>();
        builder.fill_buffer("words:fill", &mut words, 7u32);
        let mut copy = builder.create_buffer("copy", GfxMemoryHeap::Default, 64).cast::<u32>();
        builder.copy_buffer(words, "copy:from-words", &mut copy);
        let mut triples = builder.create_buffer("triples", GfxMemoryHeap::Default, 12).cast::<[u16; 3]>();
        builder.fill_buffer("triples:fill", &mut triples, [1u16, 2, 3]);

        let mut readback = builder.create_pass("readback", GfxQueueType::Main);
        let copy_token = readback.read_buffer(copy, RgBufferState::TRANSFER_SRC);
        let triples_token = readback.read_buffer(triples, RgBufferState::TRANSFER_SRC);
        let (copy_view, triples_view) = (&copy_view, &triples_view);
        readback.set_callback(move |_, rt, _| {
            assert_eq!(rt.get_buffer_len(copy_token), 16);
            copy_view.set(Some(rt.get_buffer(copy_token)));
            triples_view.set(Some(rt.get_buffer(triples_token)));
        });

        let graph = builder
            .build(&h.device, &mut h.device_allocator, &mut h.upload_allocator, &mut h.descriptors)
            .unwrap();
        // fill 之后的拷贝需要 transfer -> transfer 的 barrier
        let barriers = graph.pass("copy:from-words").unwrap().memory_barriers();
        assert_eq!(barriers.len(), 1);
        assert_eq!(barriers[0].src_access(), vk::AccessFlags2::TRANSFER_WRITE);
        graph.execute(&h.device).unwrap();
    }

    h.device.wait_idle().unwrap();
    assert_eq!(h.device.read_buffer_view::<u32>(&copy_view.get().unwrap()), vec![7u32; 16]);
    assert_eq!(
        h.device.read_buffer_view::<[u16; 3]>(&triples_view.get().unwrap()),
        vec![[1u16, 2, 3]; 2]
    );
    assert!(h.device.validation_errors().is_empty(), "{:?}", h.device.validation_errors());

    h.destroy();
}

#[test]
fn test_async_disabled_runs_on_main() {
    let mut h = Harness::new(RgSettings {
        async_compute: false,
        ..Default::default()
    });

    h.persistent.rotate_textures();
    {
        let mut builder = RgBuilder::new(&mut h.persistent);
        let mut data = builder.create_buffer("data", GfxMemoryHeap::Default, 64);
        let mut produce = builder.create_pass("produce", GfxQueueType::Main);
        produce.write_buffer("data:produced", &mut data, RgBufferState::STORAGE_WRITE_COMPUTE);
        produce.set_compute_callback(dispatch);
        let mut consume = builder.create_pass("consume", GfxQueueType::AsyncCompute);
        consume.read_buffer(data, RgBufferState::STORAGE_READ_COMPUTE);
        consume.set_compute_callback(dispatch);

        let graph = builder
            .build(&h.device, &mut h.device_allocator, &mut h.upload_allocator, &mut h.descriptors)
            .unwrap();
        let consume = graph.pass("consume").unwrap();
        assert_eq!(consume.queue(), Some(GfxQueueType::Main));
        assert_eq!(consume.time(), 2);
        assert!(consume.wait_semaphores().is_empty());
        // 同一队列上改为 barrier
        assert_eq!(consume.memory_barriers().len(), 1);
        assert_eq!(graph.queue_passes(GfxQueueType::AsyncCompute).count(), 0);
        graph.execute(&h.device).unwrap();
    }

    assert_eq!(h.persistent.queue_time(GfxQueueType::Main), 2);
    assert_eq!(h.persistent.queue_time(GfxQueueType::AsyncCompute), 0);
    h.destroy();
}

#[test]
fn test_cross_frame_dependency_waits_without_new_signal() {
    let mut h = Harness::new(RgSettings::default());
    let async_compute = h.persistent.queue_semaphore(GfxQueueType::AsyncCompute);
    let lighting = h.persistent.create_texture(texture_2d("lighting", 8, RgTextureKind::Persistent));

    h.persistent.rotate_textures();
    {
        let mut builder = RgBuilder::new(&mut h.persistent);
        let mut id = lighting;
        let mut pass = builder.create_pass("lighting:compute", GfxQueueType::AsyncCompute);
        pass.write_texture("lighting:written", &mut id, RgImageState::STORAGE_WRITE_COMPUTE);
        pass.set_compute_callback(dispatch);
        let graph = builder
            .build(&h.device, &mut h.device_allocator, &mut h.upload_allocator, &mut h.descriptors)
            .unwrap();
        graph.execute(&h.device).unwrap();
    }

    h.persistent.rotate_textures();
    {
        let mut builder = RgBuilder::new(&mut h.persistent);
        let mut pass = builder.create_pass("lighting:sample", GfxQueueType::Main);
        pass.read_texture(lighting, RgImageState::SHADER_READ_COMPUTE);
        pass.set_compute_callback(dispatch);
        let graph = builder
            .build(&h.device, &mut h.device_allocator, &mut h.upload_allocator, &mut h.descriptors)
            .unwrap();

        let sample = graph.pass("lighting:sample").unwrap();
        assert_eq!(
            sample.wait_semaphores(),
            &[GfxSemaphoreSubmitInfo::timeline(async_compute, vk::PipelineStageFlags2::ALL_COMMANDS, 1)]
        );
        let barrier = &sample.image_barriers()[0];
        assert_eq!(barrier.old_layout(), vk::ImageLayout::GENERAL);
        assert_eq!(barrier.queues(), Some((GfxQueueType::AsyncCompute, GfxQueueType::Main)));
        assert_eq!(graph.queue_passes(GfxQueueType::AsyncCompute).count(), 0);
        graph.execute(&h.device).unwrap();
    }

    h.device.wait_idle().unwrap();
    assert!(h.device.validation_errors().is_empty(), "{:?}", h.device.validation_errors());
    h.destroy();
}

#[test]
fn test_pooled_transient_waits_for_previous_frame() {
    let mut h = Harness::new(RgSettings::default());
    let async_compute = h.persistent.queue_semaphore(GfxQueueType::AsyncCompute);
    let images = [Cell::new(None::<GfxImageHandle>), Cell::new(None), Cell::new(None)];

    fn declare<'a>(builder: &mut RgBuilder<'a>, queue: GfxQueueType, image: &'a Cell<Option<GfxImageHandle>>) {
        let mut scratch = builder.create_texture(texture_2d("scratch", 16, RgTextureKind::Transient));
        let mut pass = builder.create_pass("scratch:write", queue);
        let token = pass.write_texture("scratch:written", &mut scratch, RgImageState::STORAGE_WRITE_COMPUTE);
        pass.set_compute_callback(move |_, rt, cmd| {
            image.set(Some(rt.get_texture(token)));
            cmd.dispatch(UVec3::ONE);
        });
    }

    // 第一帧在 async 队列上写
    h.persistent.rotate_textures();
    {
        let mut builder = RgBuilder::new(&mut h.persistent);
        declare(&mut builder, GfxQueueType::AsyncCompute, &images[0]);
        let graph = builder
            .build(&h.device, &mut h.device_allocator, &mut h.upload_allocator, &mut h.descriptors)
            .unwrap();
        graph.execute(&h.device).unwrap();
    }

    // 第二帧在 main 队列上复用同一个图像，需要等待上一帧的写入
    h.persistent.rotate_textures();
    {
        let mut builder = RgBuilder::new(&mut h.persistent);
        declare(&mut builder, GfxQueueType::Main, &images[1]);
        let graph = builder
            .build(&h.device, &mut h.device_allocator, &mut h.upload_allocator, &mut h.descriptors)
            .unwrap();

        let pass = graph.pass("scratch:write").unwrap();
        assert_eq!(
            pass.wait_semaphores(),
            &[GfxSemaphoreSubmitInfo::timeline(async_compute, vk::PipelineStageFlags2::ALL_COMMANDS, 1)]
        );
        let barrier = &pass.image_barriers()[0];
        assert_eq!(barrier.old_layout(), vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.new_layout(), vk::ImageLayout::GENERAL);
        graph.execute(&h.device).unwrap();
    }

    // 第三帧在同一队列上复用：没有 semaphore，barrier 的 src 为上一帧的写入
    h.persistent.rotate_textures();
    {
        let mut builder = RgBuilder::new(&mut h.persistent);
        declare(&mut builder, GfxQueueType::Main, &images[2]);
        let graph = builder
            .build(&h.device, &mut h.device_allocator, &mut h.upload_allocator, &mut h.descriptors)
            .unwrap();

        let pass = graph.pass("scratch:write").unwrap();
        assert!(pass.wait_semaphores().is_empty());
        let barrier = &pass.image_barriers()[0];
        assert_eq!(barrier.old_layout(), vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.src_stage(), vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(barrier.src_access(), vk::AccessFlags2::SHADER_STORAGE_WRITE);
        graph.execute(&h.device).unwrap();
    }

    h.device.wait_idle().unwrap();
    let first = images[0].get().unwrap();
    assert!(images.iter().all(|image| image.get() == Some(first)));
    assert_eq!(h.device.live_image_count(), 1);
    assert!(h.device.validation_errors().is_empty(), "{:?}", h.device.validation_errors());
    h.destroy();
}

#[test]
fn test_build_is_deterministic() {
    fn build_once() -> Vec<String> {
        let mut h = Harness::new(RgSettings::default());
        let history = h.persistent.create_texture(texture_2d(
            "history",
            8,
            RgTextureKind::Temporal {
                layers: 2,
                init: Some(RgTemporalInit::Clear(Vec4::ZERO)),
            },
        ));

        h.persistent.rotate_textures();
        let plan = {
            let mut builder = RgBuilder::new(&mut h.persistent);
            let mut color = builder.create_texture(texture_2d("color", 8, RgTextureKind::Transient));
            let mut counts = builder.create_buffer("counts", GfxMemoryHeap::Default, 64).cast::<u32>();
            builder.fill_buffer("counts:zero", &mut counts, 0);

            let mut cull = builder.create_pass("cull", GfxQueueType::AsyncCompute);
            cull.write_buffer("counts:culled", &mut counts, RgBufferState::STORAGE_READ_WRITE_COMPUTE);
            cull.set_compute_callback(dispatch);

            let mut draw = builder.create_pass("draw", GfxQueueType::Main);
            draw.read_buffer(counts, RgBufferState::INDIRECT_BUFFER);
            draw.read_texture_history(history, RgImageState::SHADER_READ_FRAGMENT, None, 1);
            draw.write_color_attachment("color:drawn", &mut color, GfxColorAttachmentOps::clear(Vec4::ZERO), 0);
            draw.set_render_pass_callback(|_, _, cmd| cmd.draw(3, 1));

            let mut id = history;
            let mut resolve = builder.create_pass("resolve", GfxQueueType::AsyncCompute);
            resolve.read_texture(color, RgImageState::SHADER_READ_COMPUTE);
            resolve.write_texture("history:resolved", &mut id, RgImageState::STORAGE_WRITE_COMPUTE);
            resolve.set_compute_callback(dispatch);

            let graph = builder
                .build(&h.device, &mut h.device_allocator, &mut h.upload_allocator, &mut h.descriptors)
                .unwrap();
            let plan = describe(&graph);
            graph.execute(&h.device).unwrap();
            plan
        };

        h.device.wait_idle().unwrap();
        assert!(h.device.validation_errors().is_empty(), "{:?}", h.device.validation_errors());
        h.destroy();
        plan
    }

    let first = build_once();
    assert_eq!(first.len(), 5);
    assert_eq!(first, build_once());
}

#[test]
fn test_failed_build_leaves_nothing_behind() {
    let device = HeadlessDevice::new(HeadlessSettings {
        device_memory_budget: Some(1500),
    });
    let mut h = Harness::with_device(device, RgSettings::default());
    let a = h.persistent.create_texture(texture_2d("a", 16, RgTextureKind::Persistent));
    let b = h.persistent.create_texture(texture_2d("b", 16, RgTextureKind::Persistent));

    fn declare(builder: &mut RgBuilder, mut a: RgTextureId, mut b: RgTextureId) {
        builder.clear_texture("a:clear", &mut a, Vec4::ZERO);
        builder.clear_texture("b:clear", &mut b, Vec4::ZERO);
    }

    h.persistent.rotate_textures();
    {
        let mut builder = RgBuilder::new(&mut h.persistent);
        declare(&mut builder, a, b);
        let result = builder.build(&h.device, &mut h.device_allocator, &mut h.upload_allocator, &mut h.descriptors);
        assert!(matches!(result, Err(RgError::Gfx(GfxError::OutOfDeviceMemory { .. }))));
    }
    assert_eq!(h.device.live_image_count(), 0);
    assert_eq!(h.device.device_memory_used(), 0);
    assert_eq!(h.persistent.queue_time(GfxQueueType::Main), 0);

    h.device.set_device_memory_budget(None);
    h.persistent.rotate_textures();
    {
        let mut builder = RgBuilder::new(&mut h.persistent);
        declare(&mut builder, a, b);
        let graph = builder
            .build(&h.device, &mut h.device_allocator, &mut h.upload_allocator, &mut h.descriptors)
            .unwrap();
        graph.execute(&h.device).unwrap();
    }
    assert_eq!(h.device.live_image_count(), 2);
    assert_eq!(h.persistent.queue_time(GfxQueueType::Main), 2);

    h.device.wait_idle().unwrap();
    assert!(h.device.validation_errors().is_empty(), "{:?}", h.device.validation_errors());
    let device = h.device.clone();
    h.destroy();
    assert_eq!(device.live_image_count(), 0);
}

#[test]
fn test_descriptor_exhaustion_fails_build() {
    let mut h = Harness::new(RgSettings::default());
    let allocator = DescriptorAllocator::new(DescriptorAllocatorSettings {
        max_srvs: 1,
        ..Default::default()
    });
    h.descriptors = DescriptorAllocatorScope::new(&allocator);

    fn declare(builder: &mut RgBuilder, names: &[&str]) {
        for name in names {
            let mut target = builder.create_texture(texture_2d(name, 8, RgTextureKind::Transient));
            builder.clear_texture(format!("{name}:clear"), &mut target, Vec4::ZERO);
            let mut pass = builder.create_pass(format!("{name}:read"), GfxQueueType::Main);
            pass.read_texture(target, RgImageState::SHADER_READ_COMPUTE);
            pass.set_compute_callback(dispatch);
        }
    }

    h.persistent.rotate_textures();
    {
        let mut builder = RgBuilder::new(&mut h.persistent);
        declare(&mut builder, &["a", "b"]);
        let result = builder.build(&h.device, &mut h.device_allocator, &mut h.upload_allocator, &mut h.descriptors);
        assert!(matches!(
            result,
            Err(RgError::Gfx(GfxError::DescriptorHeapExhausted {
                kind: GfxDescriptorKind::Texture,
                capacity: 1
            }))
        ));
    }
    assert_eq!(h.device.live_image_count(), 0);
    assert_eq!(h.persistent.queue_time(GfxQueueType::Main), 0);

    // 失败前分配的描述符仍然属于 scope，reset 后归还
    h.descriptors.reset();
    assert_eq!(allocator.allocated_count(GfxDescriptorKind::Texture), 0);

    h.persistent.rotate_textures();
    {
        let mut builder = RgBuilder::new(&mut h.persistent);
        declare(&mut builder, &["a"]);
        let graph = builder
            .build(&h.device, &mut h.device_allocator, &mut h.upload_allocator, &mut h.descriptors)
            .unwrap();
        graph.execute(&h.device).unwrap();
    }
    assert_eq!(allocator.allocated_count(GfxDescriptorKind::Texture), 1);

    h.device.wait_idle().unwrap();
    assert!(h.device.validation_errors().is_empty(), "{:?}", h.device.validation_errors());
    h.destroy();
}

#[test]
fn test_external_texture_must_be_bound() {
    let mut h = Harness::new(RgSettings::default());
    let swapchain = h.persistent.create_texture(texture_2d(
        "swapchain",
        16,
        RgTextureKind::External {
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
        },
    ));

    fn declare(builder: &mut RgBuilder, mut id: RgTextureId) {
        let mut draw = builder.create_pass("draw", GfxQueueType::Main);
        draw.write_color_attachment("swapchain:drawn", &mut id, GfxColorAttachmentOps::clear(Vec4::ZERO), 0);
        draw.set_render_pass_callback(|_, _, cmd| cmd.draw(3, 1));
        let mut present = builder.create_pass("present", GfxQueueType::Main);
        present.read_texture(id, RgImageState::PRESENT);
        present.set_callback(|_, _, _| {});
    }

    h.persistent.rotate_textures();
    {
        let mut builder = RgBuilder::new(&mut h.persistent);
        declare(&mut builder, swapchain);
        let result = builder.build(&h.device, &mut h.device_allocator, &mut h.upload_allocator, &mut h.descriptors);
        assert_eq!(
            result.err(),
            Some(RgError::ExternalNotBound {
                name: "swapchain".to_string()
            })
        );
    }

    let image = h
        .device
        .create_image(&GfxImageDesc::new_2d(
            "swapchain-image",
            vk::Extent2D { width: 16, height: 16 },
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
        ))
        .unwrap();
    let view = h
        .device
        .create_image_view(image, &GfxImageViewDesc::new_2d(vk::Format::R8G8B8A8_UNORM, vk::ImageAspectFlags::COLOR))
        .unwrap();

    h.persistent.rotate_textures();
    {
        let mut builder = RgBuilder::new(&mut h.persistent);
        builder.set_external_texture(swapchain, image, view, RgImageState::UNDEFINED);
        declare(&mut builder, swapchain);
        let graph = builder
            .build(&h.device, &mut h.device_allocator, &mut h.upload_allocator, &mut h.descriptors)
            .unwrap();
        let rendering = graph.pass("draw").unwrap().rendering().unwrap();
        assert_eq!(rendering.color_attachments[0].as_ref().unwrap().view, view);
        graph.execute(&h.device).unwrap();
    }

    h.device.wait_idle().unwrap();
    assert_eq!(h.device.image_layout(image), Some(vk::ImageLayout::PRESENT_SRC_KHR));
    assert!(h.device.validation_errors().is_empty(), "{:?}", h.device.validation_errors());

    h.device.destroy_image_view(view);
    h.device.destroy_image(image);
    h.destroy();
}
