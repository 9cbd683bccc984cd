//! 每帧的 RenderGraph 构建器
//!
//! 使用流程：
//! 1. [`RgBuilder::new`] 开始新的一帧，绑定 [`RgPersistent`]
//! 2. 创建本帧的 buffer / transient texture，绑定 external 资源
//! 3. [`RgBuilder::create_pass`] 按执行顺序声明 pass 以及它们的读写
//! 4. [`RgBuilder::build`] 分配物理资源，推导 barrier 与跨队列的 semaphore，得到 [`RenderGraph`]
//!
//! 每一次写都会产生资源的一个新版本（新的 id），旧版本之后不能再被读写，
//! 由此保证同一个物理资源在一帧之内只有一条写入链。

use std::collections::{HashMap, HashSet};

use ash::vk;
use itertools::Itertools;
use slotmap::{SecondaryMap, SlotMap};

use truvis_gfx::commands::barrier::{GfxImageBarrier, GfxMemoryBarrier};
use truvis_gfx::commands::rendering_info::{GfxColorAttachment, GfxDepthAttachment, GfxRenderingInfo};
use truvis_gfx::commands::submit_info::GfxSemaphoreSubmitInfo;
use truvis_gfx::foundation::device::GfxDevice;
use truvis_gfx::foundation::queue::GfxQueueType;
use truvis_gfx::handles::{GfxImageHandle, GfxImageViewHandle, GfxSamplerHandle, GfxSemaphoreHandle};
use truvis_gfx::resources::buffer::{GfxBufferView, GfxMemoryHeap};
use truvis_gfx::resources::image::GfxImageDesc;
use truvis_render_interface::bump_allocator::{
    BumpAllocatorPolicy, DeviceBumpAllocator, DevicePolicy, UploadBumpAllocator, UploadPolicy,
};
use truvis_render_interface::descriptor_allocator::{
    BindlessSrvHandle, BindlessTextureHandle, BindlessUavHandle, DescriptorAllocatorScope,
};
use truvis_render_interface::gfx_resource_arena::GfxResourceArena;

use super::barrier::{RgAccess, RgAccessTracker, RgQueuePoint};
use super::buffer_resource::{RgBuffer, RgBufferCreateInfo, RgBufferUse, RgPhysicalBuffer};
use super::error::{RgError, RgResult};
use super::graph::{RenderGraph, RgRtPass};
use super::handle::{
    RgBufferId, RgBufferKey, RgBufferToken, RgPassId, RgSemaphoreId, RgTextureId, RgTextureToken, RgUntypedBufferId,
};
use super::image_resource::{
    RgPhysicalTexture, RgPooledTexture, RgTemporalInit, RgTexture, RgTextureCreateInfo, RgTextureKind, RgTextureSlot,
    RgTextureUse,
};
use super::pass::{RgPass, RgPassBuilder, RgPassCallback, RgPassKind};
use super::persistent::RgPersistent;
use super::resource_state::{RgBufferState, RgImageState};
use super::runtime::{RgRtBuffer, RgRtBufferUse, RgRtTexture, RgRtTextureUse, RgRuntime};

pub struct RgBuilder<'a> {
    persistent: &'a mut RgPersistent,
    serial: u32,

    pub(crate) passes: SlotMap<RgPassId, RgPass<'a>>,
    /// 声明顺序，也是执行顺序
    pass_order: Vec<RgPassId>,

    buffers: SlotMap<RgBufferKey, RgBuffer>,
    physical_buffers: Vec<RgPhysicalBuffer>,

    buffer_uses: Vec<RgBufferUse>,
    texture_uses: Vec<RgTextureUse>,
}

/// build 过程中新建、尚未写回 [`RgPersistent`] 的状态
///
/// build 失败时所有新建的图像立即销毁，persistent 保持上一帧结束时的样子
struct RgStaged {
    /// 按物理下标，本帧使用的图像
    images: Vec<Option<GfxImageHandle>>,
    /// 按物理下标，从上一帧的状态开始，随调度推进
    trackers: Vec<RgAccessTracker>,
    /// 按物理下标，temporal texture 的图像是新分配的
    needs_init: Vec<bool>,
    /// persistent / temporal texture 新建的图像
    textures: Vec<RgStagedTexture>,
    /// 新加入 transient 池的图像，以及使用它的物理下标
    pooled: Vec<(GfxImageDesc, GfxImageHandle, usize)>,
    /// 本帧从 transient 池中取出的 (池下标, 物理下标)
    pool_claims: Vec<(usize, usize)>,
}

struct RgStagedTexture {
    index: usize,
    image: GfxImageHandle,
    usage: vk::ImageUsageFlags,
}

impl RgStaged {
    fn new(physical_textures: &[RgPhysicalTexture]) -> Self {
        Self {
            images: vec![None; physical_textures.len()],
            trackers: physical_textures.iter().map(|texture| texture.slot.tracker.clone()).collect(),
            needs_init: physical_textures.iter().map(|texture| texture.needs_init).collect(),
            textures: Vec::new(),
            pooled: Vec::new(),
            pool_claims: Vec::new(),
        }
    }

    fn rollback(self, device: &dyn GfxDevice, arena: &mut GfxResourceArena) {
        let images = self.textures.iter().map(|texture| texture.image);
        for image in images.chain(self.pooled.iter().map(|(_, image, _)| *image)) {
            arena.destroy_image_immediate(device, image);
        }
    }
}

// new & init
impl<'a> RgBuilder<'a> {
    /// 开始新的一帧
    ///
    /// 调用之前需要先调用 [`RgPersistent::rotate_textures`]
    pub fn new(persistent: &'a mut RgPersistent) -> Self {
        let serial = persistent.begin_frame();
        let mut builder = Self {
            persistent,
            serial,
            passes: SlotMap::with_key(),
            pass_order: Vec::new(),
            buffers: SlotMap::with_key(),
            physical_buffers: Vec::new(),
            buffer_uses: Vec::new(),
            texture_uses: Vec::new(),
        };
        builder.create_temporal_init_passes();
        builder
    }

    /// 为每个需要初始化的 temporal texture 创建一个 init pass，排在所有 pass 之前
    ///
    /// 图像没有重新分配时，init pass 在 build 时被剔除
    fn create_temporal_init_passes(&mut self) {
        let persistent_count = self.persistent.persistent_texture_count();
        let inits = self.persistent.physical_textures[..persistent_count]
            .iter()
            .enumerate()
            .filter(|(index, texture)| texture.base == *index as u32)
            .filter_map(|(_, texture)| match &texture.info.kind {
                RgTextureKind::Temporal { layers, init: Some(init) } => Some((
                    texture.base,
                    *layers,
                    texture.id,
                    texture.init_id?,
                    init.clone(),
                    texture.info.name.clone(),
                )),
                _ => None,
            })
            .collect_vec();

        for (base, layers, id, init_id, init, name) in inits {
            let pass = self.passes.insert(RgPass::new(format!("init:{name}"), GfxQueueType::Main));
            self.pass_order.push(pass);
            self.passes[pass].temporal_init = Some(base);

            // 第 0 层走版本链，使后续读到的 id 的 producer 是 init pass；history 层直接写物理资源
            let state = init.state();
            let mut tokens = vec![self.write_texture_into(pass, id, init_id, state)];
            for layer in 1..layers {
                tokens.push(self.push_texture_use(pass, base + layer, None, state));
            }
            RgPassBuilder { builder: self, pass }.set_callback(move |device, rt, cmd| {
                for token in tokens {
                    let image = rt.get_texture(token);
                    match &init {
                        RgTemporalInit::Clear(value) => {
                            cmd.clear_image(image, vk::ImageLayout::TRANSFER_DST_OPTIMAL, *value)
                        }
                        RgTemporalInit::Callback { callback, .. } => callback(device, image, cmd),
                    }
                }
            });
        }
    }
}
// getters
impl<'a> RgBuilder<'a> {
    #[inline]
    pub fn frame_index(&self) -> u64 {
        self.persistent.frame_index()
    }

    #[inline]
    pub fn persistent(&self) -> &RgPersistent {
        self.persistent
    }

    fn buffer(&self, key: RgBufferKey) -> &RgBuffer {
        self.buffers.get(key).unwrap_or_else(|| panic!("buffer {:?} does not belong to this graph", key))
    }

    fn texture(&self, id: RgTextureId) -> &RgTexture {
        self.persistent
            .textures
            .get(id)
            .unwrap_or_else(|| panic!("texture {:?} is not alive in this frame", id))
    }

    /// 最后一次声明的使用状态，还没有使用时为 UNDEFINED
    pub fn get_final_buffer_state<T>(&self, id: RgBufferId<T>) -> RgBufferState {
        let physical = self.buffer(id.key).parent;
        self.buffer_uses
            .iter()
            .rev()
            .find(|buffer_use| buffer_use.physical == physical)
            .map_or(RgBufferState::UNDEFINED, |buffer_use| buffer_use.state)
    }
}
// pass
impl<'a> RgBuilder<'a> {
    pub fn create_pass(&mut self, name: impl Into<String>, queue: GfxQueueType) -> RgPassBuilder<'_, 'a> {
        let pass = self.passes.insert(RgPass::new(name.into(), queue));
        self.pass_order.push(pass);
        RgPassBuilder { builder: self, pass }
    }
}
// buffer
impl<'a> RgBuilder<'a> {
    /// 本帧的 buffer，物理内存在 build 时从 bump allocator 分配
    pub fn create_buffer(&mut self, name: impl Into<String>, heap: GfxMemoryHeap, size: vk::DeviceSize) -> RgUntypedBufferId {
        let name = name.into();
        assert!(size > 0, "buffer \"{}\" created with zero size", name);

        let parent = self.physical_buffers.len() as u32;
        self.physical_buffers.push(RgPhysicalBuffer {
            name: name.clone(),
            heap,
            size,
            external: None,
            tracker: RgAccessTracker::default(),
        });
        RgBufferId::new(self.buffers.insert(RgBuffer {
            name,
            parent,
            def: None,
            kill: None,
            child: None,
        }))
    }

    /// 带类型的 buffer，提供初始值时会在 `init_queue` 上插入一个 fill pass
    pub fn create_buffer_with_init<T: bytemuck::Pod>(&mut self, info: RgBufferCreateInfo<T>) -> RgBufferId<T> {
        let size = (info.count * size_of::<T>()) as vk::DeviceSize;
        let mut id = self.create_buffer(info.name.clone(), info.heap, size).cast::<T>();
        if let Some(value) = info.init {
            self.fill_buffer_on(info.init_queue, format!("init:{}", info.name), &mut id, value);
        }
        id
    }

    /// 用 `value` 填满整个 buffer
    pub fn fill_buffer<T: bytemuck::Pod>(&mut self, name: impl Into<String>, id: &mut RgBufferId<T>, value: T) {
        self.fill_buffer_on(GfxQueueType::Main, name.into(), id, value);
    }

    fn fill_buffer_on<T: bytemuck::Pod>(&mut self, queue: GfxQueueType, name: String, id: &mut RgBufferId<T>, value: T) {
        assert!(size_of::<T>() > 0, "fill of buffer \"{}\" with a zero sized value", name);
        let size = self.physical_buffers[self.buffer(id.key).parent as usize].size;

        if size_of::<T>() == 4 && size % 4 == 0 {
            let word = bytemuck::pod_read_unaligned::<u32>(bytemuck::bytes_of(&value));
            let mut pass = self.create_pass(name.clone(), queue);
            let dst = pass.write_buffer(name, id, RgBufferState::TRANSFER_DST);
            pass.set_callback(move |_, rt, cmd| cmd.fill_buffer(&rt.get_buffer(dst), word));
            return;
        }

        // 其他大小的元素：先在 host 上写入 staging buffer，再拷贝过去
        let count = (size / size_of::<T>() as vk::DeviceSize) as usize;
        let mut staging = self.create_buffer(format!("{name}:staging"), GfxMemoryHeap::Upload, size).cast::<T>();
        let mut pass = self.create_pass(format!("{name}:upload"), queue);
        let token = pass.write_buffer(format!("{name}:staging"), &mut staging, RgBufferState::HOST_WRITE);
        pass.set_host_callback(move |_, rt| rt.write_buffer(token, &vec![value; count]));

        let mut dst = id.cast::<u8>();
        self.copy_buffer_on(queue, staging.cast(), name, &mut dst);
        *id = dst.cast();
    }

    /// 拷贝 `src` 到 `dst`，长度取两者中较短的一个
    pub fn copy_buffer<T>(&mut self, src: RgBufferId<T>, name: impl Into<String>, dst: &mut RgBufferId<T>) {
        let mut raw = dst.cast::<u8>();
        self.copy_buffer_on(GfxQueueType::Main, src.cast(), name.into(), &mut raw);
        *dst = raw.cast();
    }

    fn copy_buffer_on(&mut self, queue: GfxQueueType, src: RgUntypedBufferId, name: String, dst: &mut RgUntypedBufferId) {
        let mut pass = self.create_pass(name.clone(), queue);
        let src = pass.read_buffer(src, RgBufferState::TRANSFER_SRC);
        let dst = pass.write_buffer(name, dst, RgBufferState::TRANSFER_DST);
        pass.set_callback(move |_, rt, cmd| {
            let src = rt.get_buffer(src);
            let dst = rt.get_buffer(dst);
            let size = src.size.min(dst.size);
            cmd.copy_buffer(&src.sub_view(0, size), &dst.sub_view(0, size));
        });
    }

    /// 本帧使用调用者提供的 buffer，`state` 是它在本帧之前的最后状态
    pub fn set_external_buffer<T>(&mut self, id: RgBufferId<T>, view: GfxBufferView, state: RgBufferState) {
        let parent = self.buffer(id.key).parent as usize;
        let physical = &mut self.physical_buffers[parent];
        assert!(
            view.size >= physical.size,
            "external buffer bound to \"{}\" is too small ({} < {})",
            physical.name,
            view.size,
            physical.size
        );
        physical.external = Some(view);
        physical.tracker = RgAccessTracker::with_initial_state(state.stage, state.access, vk::ImageLayout::UNDEFINED);
    }

    pub(crate) fn read_buffer<T>(
        &mut self,
        pass: RgPassId,
        id: RgBufferId<T>,
        state: RgBufferState,
        offset: usize,
    ) -> RgBufferToken<T> {
        let buffer = self.buffer(id.key);
        assert!(!state.is_write(), "buffer \"{}\" read with a write state {:?}", buffer.name, state);
        assert!(
            buffer.kill.is_none(),
            "buffer \"{}\" is read by pass \"{}\" after it was overwritten",
            buffer.name,
            self.passes[pass].name
        );
        assert!(
            buffer.def != Some(pass),
            "pass \"{}\" reads buffer \"{}\" that it writes itself",
            self.passes[pass].name,
            buffer.name
        );

        let physical = buffer.parent;
        let byte_offset = (offset * size_of::<T>()) as vk::DeviceSize;
        assert!(
            byte_offset < self.physical_buffers[physical as usize].size,
            "read of buffer \"{}\" at element {} is out of range",
            buffer.name,
            offset
        );
        RgBufferToken::new(self.push_buffer_use(pass, physical, byte_offset, state), self.serial)
    }

    pub(crate) fn write_buffer<T>(
        &mut self,
        pass: RgPassId,
        name: impl Into<String>,
        id: &mut RgBufferId<T>,
        state: RgBufferState,
    ) -> RgBufferToken<T> {
        let parent = self.buffer(id.key);
        assert!(state.is_write(), "buffer \"{}\" written with a read-only state {:?}", parent.name, state);
        assert!(parent.child.is_none(), "buffer \"{}\" already has a newer version", parent.name);
        assert!(
            parent.def != Some(pass),
            "pass \"{}\" writes buffer \"{}\" twice",
            self.passes[pass].name,
            parent.name
        );

        let physical = parent.parent;
        let child = self.buffers.insert(RgBuffer {
            name: name.into(),
            parent: physical,
            def: Some(pass),
            kill: None,
            child: None,
        });
        let parent = &mut self.buffers[id.key];
        parent.kill = Some(pass);
        parent.child = Some(child);
        *id = RgBufferId::new(child);

        RgBufferToken::new(self.push_buffer_use(pass, physical, 0, state), self.serial)
    }

    fn push_buffer_use(&mut self, pass: RgPassId, physical: u32, offset: vk::DeviceSize, state: RgBufferState) -> u32 {
        let index = self.buffer_uses.len() as u32;
        self.buffer_uses.push(RgBufferUse {
            physical,
            offset,
            state,
        });
        self.passes[pass].buffer_uses.push(index);
        index
    }
}
// texture
impl<'a> RgBuilder<'a> {
    /// 只在本帧存在的 texture，图像从 transient 池中复用
    pub fn create_texture(&mut self, info: RgTextureCreateInfo) -> RgTextureId {
        info.validate();
        assert!(
            matches!(info.kind, RgTextureKind::Transient),
            "texture \"{}\" outlives the frame and must be created through RgPersistent",
            info.name
        );

        let index = self.persistent.physical_textures.len() as u32;
        let id = self.persistent.textures.insert(RgTexture {
            name: info.name.clone(),
            parent: index,
            def: None,
            kill: None,
            child: None,
        });
        self.persistent.physical_textures.push(RgPhysicalTexture {
            info,
            slot: RgTextureSlot::default(),
            id,
            init_id: None,
            base: index,
            needs_init: false,
            external_view: None,
        });
        id
    }

    /// 清除整个 texture
    pub fn clear_texture(&mut self, name: impl Into<String>, id: &mut RgTextureId, value: glam::Vec4) {
        let name = name.into();
        let mut pass = self.create_pass(name.clone(), GfxQueueType::Main);
        let token = pass.write_texture(name, id, RgImageState::TRANSFER_DST);
        pass.set_callback(move |_, rt, cmd| {
            cmd.clear_image(rt.get_texture(token), vk::ImageLayout::TRANSFER_DST_OPTIMAL, value)
        });
    }

    /// 本帧使用调用者提供的图像，`state` 是它在本帧之前的最后状态
    pub fn set_external_texture(
        &mut self,
        id: RgTextureId,
        image: GfxImageHandle,
        view: GfxImageViewHandle,
        state: RgImageState,
    ) {
        let parent = self.texture(id).parent as usize;
        let texture = &mut self.persistent.physical_textures[parent];
        let RgTextureKind::External { usage } = texture.info.kind else {
            panic!("texture \"{}\" is not external", texture.info.name);
        };
        texture.slot = RgTextureSlot {
            image: Some(image),
            usage,
            tracker: RgAccessTracker::with_initial_state(state.stage, state.access, state.layout),
            layer: 0,
        };
        texture.external_view = Some(view);
    }

    pub(crate) fn read_texture(
        &mut self,
        pass: RgPassId,
        id: RgTextureId,
        state: RgImageState,
        sampler: Option<GfxSamplerHandle>,
        history: u32,
    ) -> RgTextureToken {
        let texture = self.texture(id);
        assert!(!state.is_write(), "texture \"{}\" read with a write state {:?}", texture.name, state);

        let mut physical = texture.parent;
        if history == 0 {
            assert!(
                texture.kill.is_none(),
                "texture \"{}\" is read by pass \"{}\" after it was overwritten",
                texture.name,
                self.passes[pass].name
            );
            assert!(
                texture.def != Some(pass),
                "pass \"{}\" reads texture \"{}\" that it writes itself",
                self.passes[pass].name,
                texture.name
            );
        } else {
            // history 层不在本帧的版本链上
            let physical_texture = &self.persistent.physical_textures[physical as usize];
            assert!(
                physical_texture.id == id,
                "history of texture \"{}\" must be read through the id returned by create_texture",
                texture.name
            );
            assert!(
                history < physical_texture.temporal_layers(),
                "texture \"{}\" has no history layer {}",
                texture.name,
                history
            );
            physical = physical_texture.base + history;
        }

        self.push_texture_use(pass, physical, sampler, state)
    }

    pub(crate) fn write_texture(
        &mut self,
        pass: RgPassId,
        name: impl Into<String>,
        id: &mut RgTextureId,
        state: RgImageState,
    ) -> RgTextureToken {
        let parent = self.texture(*id);
        assert!(state.is_write(), "texture \"{}\" written with a read-only state {:?}", parent.name, state);
        assert!(parent.child.is_none(), "texture \"{}\" already has a newer version", parent.name);
        assert!(
            parent.def != Some(pass),
            "pass \"{}\" writes texture \"{}\" twice",
            self.passes[pass].name,
            parent.name
        );

        let physical = parent.parent;
        let child = self.persistent.textures.insert(RgTexture {
            name: name.into(),
            parent: physical,
            def: Some(pass),
            kill: None,
            child: None,
        });
        let parent = &mut self.persistent.textures[*id];
        parent.kill = Some(pass);
        parent.child = Some(child);
        *id = child;

        self.push_texture_use(pass, physical, None, state)
    }

    pub(crate) fn write_texture_into(
        &mut self,
        pass: RgPassId,
        dst: RgTextureId,
        src: RgTextureId,
        state: RgImageState,
    ) -> RgTextureToken {
        assert_ne!(dst, src, "write_texture_into with the same version");
        let src_texture = self.texture(src);
        let dst_texture = self.texture(dst);
        assert!(state.is_write(), "texture \"{}\" written with a read-only state {:?}", dst_texture.name, state);
        assert_eq!(
            src_texture.parent, dst_texture.parent,
            "\"{}\" and \"{}\" are not versions of the same texture",
            src_texture.name, dst_texture.name
        );
        assert!(src_texture.child.is_none(), "texture \"{}\" already has a newer version", src_texture.name);
        assert!(dst_texture.def.is_none(), "texture \"{}\" already has a producer", dst_texture.name);

        let physical = src_texture.parent;
        let src_texture = &mut self.persistent.textures[src];
        src_texture.kill = Some(pass);
        src_texture.child = Some(dst);
        self.persistent.textures[dst].def = Some(pass);

        self.push_texture_use(pass, physical, None, state)
    }

    fn push_texture_use(
        &mut self,
        pass: RgPassId,
        physical: u32,
        sampler: Option<GfxSamplerHandle>,
        state: RgImageState,
    ) -> RgTextureToken {
        let index = self.texture_uses.len() as u32;
        self.texture_uses.push(RgTextureUse {
            physical,
            sampler,
            state,
        });
        self.passes[pass].texture_uses.push(index);
        RgTextureToken {
            index,
            serial: self.serial,
        }
    }
}
// semaphore
impl<'a> RgBuilder<'a> {
    pub fn set_external_semaphore(&mut self, id: RgSemaphoreId, semaphore: GfxSemaphoreHandle) {
        let Some(external) = self.persistent.semaphores.get_mut(id) else {
            panic!("semaphore {:?} is not registered", id);
        };
        external.handle = Some(semaphore);
    }
}
// debug
impl<'a> RgBuilder<'a> {
    /// 打印声明的 pass 以及它们的读写，build 之前使用
    pub fn dump_pass_schedule(&self) {
        log::info!(
            "rg: frame {} declares {} passes",
            self.persistent.frame_index(),
            self.pass_order.len()
        );
        for (order, id) in self.pass_order.iter().enumerate() {
            let pass = &self.passes[*id];
            let buffers = pass
                .buffer_uses
                .iter()
                .map(|index| {
                    let buffer_use = &self.buffer_uses[*index as usize];
                    let mode = if buffer_use.state.is_write() { "W" } else { "R" };
                    format!("{}:{}", mode, self.physical_buffers[buffer_use.physical as usize].name)
                })
                .join(", ");
            let textures = pass
                .texture_uses
                .iter()
                .map(|index| {
                    let texture_use = &self.texture_uses[*index as usize];
                    let mode = if texture_use.state.is_write() { "W" } else { "R" };
                    let texture = &self.persistent.physical_textures[texture_use.physical as usize];
                    format!("{}:{}[{}]", mode, texture.info.name, texture.slot.layer)
                })
                .join(", ");
            log::info!(
                "  [{}] \"{}\" on {} | buffers: [{}] | textures: [{}]",
                order,
                pass.name,
                pass.queue,
                buffers,
                textures
            );
        }
    }
}
// build
impl<'a> RgBuilder<'a> {
    /// 分配物理资源并推导同步，得到可以执行的 RenderGraph
    ///
    /// 失败时本帧新建的图像全部销毁，[`RgPersistent`] 保持不变，得到的错误只可能来自分配
    pub fn build(
        mut self,
        device: &dyn GfxDevice,
        device_allocator: &mut DeviceBumpAllocator,
        upload_allocator: &'a mut UploadBumpAllocator,
        descriptors: &mut DescriptorAllocatorScope,
    ) -> RgResult<RenderGraph<'a>> {
        let _span = truvis_crate_tools::profile_span!("RgBuilder::build");

        self.validate_passes();
        self.check_external_bindings()?;

        let frame_index = self.persistent.frame_index();
        self.persistent.arena.cleanup(device, frame_index);

        let mut staged = RgStaged::new(&self.persistent.physical_textures);
        let prepared = self.prepare(device, device_allocator, upload_allocator, descriptors, &mut staged);
        let (buffers, textures, texture_uses) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                log::error!("rg: build of frame {} failed: {}", frame_index, e);
                staged.rollback(device, &mut self.persistent.arena);
                return Err(e);
            }
        };

        let active = self.active_passes(&staged.needs_init);
        let (passes, queue_counts) = self.schedule(&active, &mut staged, &textures);
        self.commit(staged, queue_counts);

        let runtime = RgRuntime {
            serial: self.serial,
            buffers,
            buffer_uses: self
                .buffer_uses
                .iter()
                .map(|buffer_use| RgRtBufferUse {
                    physical: buffer_use.physical,
                    offset: buffer_use.offset,
                })
                .collect(),
            textures,
            texture_uses,
            semaphores: self
                .persistent
                .semaphores
                .iter()
                .filter_map(|(id, semaphore)| semaphore.handle.map(|handle| (id, handle)))
                .collect::<SecondaryMap<_, _>>(),
            upload_allocator: std::cell::RefCell::new(upload_allocator),
        };

        log::debug!(
            "rg: built frame {} with {} of {} passes",
            frame_index,
            passes.len(),
            self.pass_order.len()
        );
        Ok(RenderGraph {
            frame_index,
            passes,
            runtime,
        })
    }

    fn scheduled_queue(&self, pass: &RgPass) -> GfxQueueType {
        match pass.queue {
            GfxQueueType::AsyncCompute if !self.persistent.settings().async_compute => GfxQueueType::Main,
            queue => queue,
        }
    }

    fn validate_passes(&self) {
        for pass in self.pass_order.iter().map(|id| &self.passes[*id]) {
            let Some(callback) = pass.callback.as_ref() else {
                panic!("pass \"{}\" has no callback", pass.name);
            };
            match callback.kind() {
                RgPassKind::Host => {
                    assert!(
                        pass.texture_uses.is_empty() && !pass.has_attachments(),
                        "host pass \"{}\" declares texture access",
                        pass.name
                    );
                    assert!(
                        pass.wait_semaphores.is_empty() && pass.signal_semaphores.is_empty(),
                        "host pass \"{}\" can not wait or signal semaphores",
                        pass.name
                    );
                    for &index in &pass.buffer_uses {
                        let buffer_use = &self.buffer_uses[index as usize];
                        let buffer = &self.physical_buffers[buffer_use.physical as usize];
                        assert!(
                            buffer_use.state.is_host_only(),
                            "host pass \"{}\" declares GPU access to \"{}\"",
                            pass.name,
                            buffer.name
                        );
                        assert!(
                            buffer.heap.is_host_visible() && buffer.external.is_none(),
                            "host pass \"{}\" accesses \"{}\" which is not host visible",
                            pass.name,
                            buffer.name
                        );
                        // host 回调在提交之前执行，GPU 不能在它之前访问同一块内存
                        assert!(
                            self.buffer_uses[..index as usize]
                                .iter()
                                .filter(|earlier| earlier.physical == buffer_use.physical)
                                .all(|earlier| earlier.state.is_host_only()),
                            "host pass \"{}\" accesses \"{}\" after GPU access in the same frame",
                            pass.name,
                            buffer.name
                        );
                    }
                }
                RgPassKind::Graphics => assert_eq!(
                    self.scheduled_queue(pass),
                    GfxQueueType::Main,
                    "graphics pass \"{}\" must run on the main queue",
                    pass.name
                ),
                RgPassKind::Compute | RgPassKind::Generic => assert!(
                    !pass.has_attachments(),
                    "pass \"{}\" binds attachments but is not a graphics pass",
                    pass.name
                ),
            }
        }
    }

    fn check_external_bindings(&self) -> RgResult<()> {
        for texture_use in &self.texture_uses {
            let texture = &self.persistent.physical_textures[texture_use.physical as usize];
            if texture.is_external() && texture.slot.image.is_none() {
                return Err(RgError::ExternalNotBound {
                    name: texture.info.name.clone(),
                });
            }
        }
        for pass in self.pass_order.iter().map(|id| &self.passes[*id]) {
            for semaphore_use in pass.wait_semaphores.iter().chain(&pass.signal_semaphores) {
                let semaphore = &self.persistent.semaphores[semaphore_use.semaphore];
                if semaphore.handle.is_none() {
                    return Err(RgError::ExternalNotBound {
                        name: semaphore.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::type_complexity)]
    fn prepare(
        &mut self,
        device: &dyn GfxDevice,
        device_allocator: &mut DeviceBumpAllocator,
        upload_allocator: &mut UploadBumpAllocator,
        descriptors: &mut DescriptorAllocatorScope,
        staged: &mut RgStaged,
    ) -> RgResult<(Vec<Option<RgRtBuffer>>, Vec<Option<RgRtTexture>>, Vec<RgRtTextureUse>)> {
        self.materialize_textures(device, staged)?;
        let buffers = self.materialize_buffers(device, device_allocator, upload_allocator)?;
        let textures = self.create_texture_views(device, &staged.images)?;
        let texture_uses = self.create_descriptors(device, &textures, descriptors)?;
        Ok((buffers, textures, texture_uses))
    }

    fn materialize_textures(&mut self, device: &dyn GfxDevice, staged: &mut RgStaged) -> RgResult<()> {
        let _span = truvis_crate_tools::profile_span!("RgBuilder::materialize_textures");

        let persistent = &mut *self.persistent;
        let count = persistent.physical_textures.len();

        // temporal texture 的所有层共享 usage，统一记在第一层上
        let mut usages = vec![vk::ImageUsageFlags::empty(); count];
        let mut used = vec![false; count];
        for texture_use in &self.texture_uses {
            let physical = texture_use.physical as usize;
            let base = persistent.physical_textures[physical].base as usize;
            usages[base] |= texture_use.state.required_usage();
            used[physical] = true;
        }

        for index in (0..count).filter(|index| used[*index]) {
            let texture = &persistent.physical_textures[index];
            let base = texture.base as usize;
            let required = usages[base];

            match texture.info.kind {
                RgTextureKind::External { usage } => {
                    assert!(
                        usage.contains(required),
                        "external texture \"{}\" lacks usage {:?}",
                        texture.info.name,
                        required & !usage
                    );
                    staged.images[index] = texture.slot.image;
                }
                RgTextureKind::Transient => {
                    let key = texture.info.image_desc(String::new(), required);
                    let claimed = persistent
                        .transient_pool
                        .iter()
                        .enumerate()
                        .find(|(slot, pooled)| {
                            pooled.key == key && !staged.pool_claims.iter().any(|(claimed, _)| claimed == slot)
                        });
                    let image = match claimed {
                        Some((slot, pooled)) => {
                            // 上一次使用可能还在其他队列上执行
                            staged.trackers[index] = pooled.tracker.discard_contents();
                            staged.pool_claims.push((slot, index));
                            pooled.image
                        }
                        None => {
                            let desc = texture.info.image_desc(texture.info.name.clone(), required);
                            let image = persistent.arena.create_image(device, &desc)?;
                            staged.pooled.push((key, image, index));
                            image
                        }
                    };
                    staged.images[index] = Some(image);
                }
                RgTextureKind::Persistent | RgTextureKind::Temporal { .. } => match texture.slot.image {
                    Some(image) if texture.slot.usage.contains(required) => {
                        staged.images[index] = Some(image);
                    }
                    previous => {
                        let usage = texture.slot.usage | required;
                        let name = if texture.temporal_layers() > 1 {
                            format!("{}[{}]", texture.info.name, texture.slot.layer)
                        } else {
                            texture.info.name.clone()
                        };
                        if previous.is_some() {
                            log::debug!("rg: recreating \"{}\" for usage {:?}", name, usage);
                        }
                        let image = persistent.arena.create_image(device, &texture.info.image_desc(name, usage))?;
                        staged.textures.push(RgStagedTexture { index, image, usage });
                        staged.images[index] = Some(image);
                        staged.trackers[index] = RgAccessTracker::default();
                        staged.needs_init[base] = true;
                    }
                },
            }
        }
        Ok(())
    }

    fn materialize_buffers(
        &self,
        device: &dyn GfxDevice,
        device_allocator: &mut DeviceBumpAllocator,
        upload_allocator: &mut UploadBumpAllocator,
    ) -> RgResult<Vec<Option<RgRtBuffer>>> {
        let _span = truvis_crate_tools::profile_span!("RgBuilder::materialize_buffers");

        let mut usages = vec![vk::BufferUsageFlags::empty(); self.physical_buffers.len()];
        let mut used = vec![false; self.physical_buffers.len()];
        for buffer_use in &self.buffer_uses {
            usages[buffer_use.physical as usize] |= buffer_use.state.required_usage();
            used[buffer_use.physical as usize] = true;
        }

        let mut buffers = Vec::with_capacity(self.physical_buffers.len());
        for (index, physical) in self.physical_buffers.iter().enumerate() {
            if !used[index] {
                buffers.push(None);
                continue;
            }

            let buffer = if let Some(view) = physical.external {
                RgRtBuffer {
                    name: physical.name.clone(),
                    view,
                    device_ptr: device.get_buffer_device_ptr(view.buffer).offset(view.offset),
                    upload: None,
                }
            } else if physical.heap.is_host_visible() {
                assert!(
                    UploadPolicy::buffer_usage().contains(usages[index]),
                    "buffer \"{}\" needs usage {:?} which {} does not provide",
                    physical.name,
                    usages[index],
                    UploadPolicy::NAME
                );
                let allocation = upload_allocator.allocate::<u8>(device, physical.size as usize)?;
                RgRtBuffer {
                    name: physical.name.clone(),
                    view: allocation.view,
                    device_ptr: allocation.device_ptr,
                    upload: Some(allocation),
                }
            } else {
                assert!(
                    DevicePolicy::buffer_usage().contains(usages[index]),
                    "buffer \"{}\" needs usage {:?} which {} does not provide",
                    physical.name,
                    usages[index],
                    DevicePolicy::NAME
                );
                let allocation = device_allocator.allocate::<u8>(device, physical.size as usize)?;
                RgRtBuffer {
                    name: physical.name.clone(),
                    view: allocation.view,
                    device_ptr: allocation.ptr,
                    upload: None,
                }
            };
            log::trace!("rg: buffer \"{}\" -> {:?}", physical.name, buffer.view);
            buffers.push(Some(buffer));
        }
        Ok(buffers)
    }

    fn create_texture_views(
        &mut self,
        device: &dyn GfxDevice,
        images: &[Option<GfxImageHandle>],
    ) -> RgResult<Vec<Option<RgRtTexture>>> {
        let persistent = &mut *self.persistent;
        let mut textures = Vec::with_capacity(images.len());
        for (index, image) in images.iter().enumerate() {
            let Some(image) = *image else {
                textures.push(None);
                continue;
            };
            let texture = &persistent.physical_textures[index];
            let view = match texture.external_view {
                Some(view) => view,
                None => persistent.arena.get_or_create_image_view(device, image, texture.info.default_view_desc())?,
            };
            textures.push(Some(RgRtTexture {
                name: texture.info.name.clone(),
                image,
                view,
                extent: texture.info.extent,
            }));
        }
        Ok(textures)
    }

    /// 每个 (物理 texture, 描述符种类) 只分配一次
    fn create_descriptors(
        &mut self,
        device: &dyn GfxDevice,
        textures: &[Option<RgRtTexture>],
        descriptors: &mut DescriptorAllocatorScope,
    ) -> RgResult<Vec<RgRtTextureUse>> {
        let persistent = &mut *self.persistent;
        let mut srvs: HashMap<u32, BindlessSrvHandle> = HashMap::new();
        let mut sampled: HashMap<(u32, GfxSamplerHandle), BindlessTextureHandle> = HashMap::new();
        let mut uavs: HashMap<u32, Vec<BindlessUavHandle>> = HashMap::new();

        let mut texture_uses = Vec::with_capacity(self.texture_uses.len());
        for texture_use in &self.texture_uses {
            let physical = texture_use.physical;
            let mut rt_use = RgRtTextureUse {
                physical,
                layout: texture_use.state.layout,
                ..Default::default()
            };
            let texture = rt_texture(textures, physical);
            let access = texture_use.state.access;

            if let Some(sampler) = texture_use.sampler {
                let handle = match sampled.get(&(physical, sampler)) {
                    Some(handle) => *handle,
                    None => {
                        let handle = descriptors.allocate_texture(device, texture.view, sampler)?;
                        sampled.insert((physical, sampler), handle);
                        handle
                    }
                };
                rt_use.texture = Some(handle);
            } else if access.intersects(vk::AccessFlags2::SHADER_SAMPLED_READ) {
                let handle = match srvs.get(&physical) {
                    Some(handle) => *handle,
                    None => {
                        let handle = descriptors.allocate_srv(device, texture.view)?;
                        srvs.insert(physical, handle);
                        handle
                    }
                };
                rt_use.srv = Some(handle);
            }

            if access.intersects(vk::AccessFlags2::SHADER_STORAGE_READ | vk::AccessFlags2::SHADER_STORAGE_WRITE) {
                if let Some(handles) = uavs.get(&physical) {
                    rt_use.uavs = handles.clone();
                } else {
                    let physical_texture = &persistent.physical_textures[physical as usize];
                    let mut handles = Vec::with_capacity(physical_texture.info.mip_levels as usize);
                    if physical_texture.is_external() {
                        // 外部图像只有调用者提供的 view
                        handles.push(descriptors.allocate_uav(device, texture.view)?);
                    } else {
                        for mip in 0..physical_texture.info.mip_levels {
                            let view_desc = physical_texture.info.default_view_desc().with_single_mip(mip);
                            let view = persistent.arena.get_or_create_image_view(device, texture.image, view_desc)?;
                            handles.push(descriptors.allocate_uav(device, view)?);
                        }
                    }
                    uavs.insert(physical, handles.clone());
                    rt_use.uavs = handles;
                }
            }

            texture_uses.push(rt_use);
        }
        Ok(texture_uses)
    }

    /// 剔除不需要执行的 temporal init pass
    fn active_passes(&self, needs_init: &[bool]) -> Vec<RgPassId> {
        self.pass_order
            .iter()
            .copied()
            .filter(|id| {
                let pass = &self.passes[*id];
                let active = pass.temporal_init.is_none_or(|base| needs_init[base as usize]);
                if !active {
                    log::trace!("rg: skipping \"{}\", history is already initialized", pass.name);
                }
                active
            })
            .collect()
    }

    /// 按声明顺序给 pass 分配队列上的 time，推导 barrier 与 semaphore
    ///
    /// 返回编译后的 pass 以及每个队列本帧的 pass 个数
    fn schedule(
        &mut self,
        active: &[RgPassId],
        staged: &mut RgStaged,
        textures: &[Option<RgRtTexture>],
    ) -> (Vec<RgRtPass<'a>>, [u64; GfxQueueType::COUNT]) {
        let _span = truvis_crate_tools::profile_span!("RgBuilder::schedule");

        let base_times = self.persistent.queue_times;
        let mut counts = [0u64; GfxQueueType::COUNT];
        // [等待的队列][被等待的队列]：本帧已经等待过的最大值
        let mut waited = [[0u64; GfxQueueType::COUNT]; GfxQueueType::COUNT];
        // 被其他队列等待的 pass，需要 signal 自己的 time
        let mut signal_points = HashSet::new();
        let mut buffer_trackers = self.physical_buffers.iter().map(|buffer| buffer.tracker.clone()).collect_vec();

        let mut rt_passes = Vec::with_capacity(active.len());
        for &id in active {
            let pass = &self.passes[id];
            let kind = pass.callback.as_ref().map_or(RgPassKind::Generic, RgPassCallback::kind);
            if kind == RgPassKind::Host {
                rt_passes.push(RgRtPass {
                    name: pass.name.clone(),
                    queue: None,
                    time: 0,
                    kind,
                    memory_barriers: Vec::new(),
                    image_barriers: Vec::new(),
                    wait_semaphores: Vec::new(),
                    signal_semaphores: Vec::new(),
                    rendering: None,
                    callback: self.passes[id].callback.take(),
                });
                continue;
            }

            let queue = self.scheduled_queue(pass);
            let q = queue.index();
            counts[q] += 1;
            let point = RgQueuePoint {
                queue,
                time: base_times[q] + counts[q],
            };

            let mut memory_barrier: Option<GfxMemoryBarrier> = None;
            let mut image_barriers = Vec::new();
            // 按被等待的队列，本 pass 需要等待的最大值
            let mut queue_waits = [0u64; GfxQueueType::COUNT];
            let mut collect_waits = |waits: &[RgQueuePoint]| {
                // time 0 表示本帧之前的初始状态，不需要等待
                for wait in waits.iter().filter(|wait| wait.time > 0) {
                    let value = &mut queue_waits[wait.queue.index()];
                    *value = (*value).max(wait.time);
                }
            };

            for buffer_use in pass.buffer_uses.iter().map(|index| &self.buffer_uses[*index as usize]) {
                if buffer_use.state.is_host_only() {
                    continue;
                }
                let sync = buffer_trackers[buffer_use.physical as usize].access(&RgAccess {
                    point,
                    stage: buffer_use.state.stage,
                    access: buffer_use.state.access,
                    layout: None,
                });
                if sync.is_empty() {
                    continue;
                }
                log::trace!(
                    "rg: \"{}\" buffer \"{}\": {:?}",
                    pass.name,
                    self.physical_buffers[buffer_use.physical as usize].name,
                    sync
                );
                if let Some(src) = sync.src {
                    merge_memory_barrier(&mut memory_barrier, src, (buffer_use.state.stage, buffer_use.state.access));
                }
                collect_waits(&sync.waits);
            }

            for texture_use in pass.texture_uses.iter().map(|index| &self.texture_uses[*index as usize]) {
                let physical = texture_use.physical as usize;
                let state = texture_use.state;
                let previous = staged.trackers[physical].last_access();
                let sync = staged.trackers[physical].access(&RgAccess {
                    point,
                    stage: state.stage,
                    access: state.access,
                    layout: Some(state.layout),
                });
                if sync.is_empty() {
                    continue;
                }
                log::trace!(
                    "rg: \"{}\" texture \"{}\": {:?}",
                    pass.name,
                    self.persistent.physical_textures[physical].info.name,
                    sync
                );

                if let Some((old_layout, new_layout)) = sync.layout_transition {
                    let (src_stage, src_access) = sync.src.unwrap_or((vk::PipelineStageFlags2::NONE, vk::AccessFlags2::NONE));
                    let info = &self.persistent.physical_textures[physical].info;
                    let mut barrier = GfxImageBarrier::new()
                        .image(rt_texture(textures, texture_use.physical).image)
                        .layout_transfer(old_layout, new_layout)
                        .src_mask(src_stage, src_access)
                        .dst_mask(state.stage, state.access)
                        .subresource_range(info.full_range());
                    if let Some(previous) = previous.filter(|p| p.queue != queue && p.time > 0) {
                        barrier = barrier.queue_transfer(previous.queue, queue);
                    }
                    image_barriers.push(barrier);
                } else if let Some(src) = sync.src {
                    merge_memory_barrier(&mut memory_barrier, src, (state.stage, state.access));
                }
                collect_waits(&sync.waits);
            }

            let mut wait_semaphores = Vec::new();
            for producer in GfxQueueType::ALL {
                let value = queue_waits[producer.index()];
                if value == 0 || value <= waited[q][producer.index()] {
                    continue;
                }
                waited[q][producer.index()] = value;
                if value > base_times[producer.index()] {
                    signal_points.insert(RgQueuePoint { queue: producer, time: value });
                }
                wait_semaphores.push(GfxSemaphoreSubmitInfo::timeline(
                    self.persistent.queue_semaphore(producer),
                    vk::PipelineStageFlags2::ALL_COMMANDS,
                    value,
                ));
            }
            let external = |semaphore_use: &super::pass::RgSemaphoreUse| {
                let handle = self.persistent.semaphores[semaphore_use.semaphore].handle;
                let Some(semaphore) = handle else {
                    unreachable!("external semaphores are checked before scheduling");
                };
                GfxSemaphoreSubmitInfo {
                    semaphore,
                    stage: semaphore_use.stage,
                    value: semaphore_use.value,
                }
            };
            wait_semaphores.extend(pass.wait_semaphores.iter().map(external));
            let signal_semaphores = pass.signal_semaphores.iter().map(external).collect_vec();

            let rendering = pass.has_attachments().then(|| self.rendering_info(pass, textures));

            rt_passes.push(RgRtPass {
                name: pass.name.clone(),
                queue: Some(queue),
                time: point.time,
                kind,
                memory_barriers: memory_barrier.into_iter().collect(),
                image_barriers,
                wait_semaphores,
                signal_semaphores,
                rendering,
                callback: self.passes[id].callback.take(),
            });
        }

        // 被等待的 pass，以及每个队列上的最后一个 pass，signal 自己的 time
        let mut last = [None; GfxQueueType::COUNT];
        for (index, rt_pass) in rt_passes.iter().enumerate() {
            if let Some(queue) = rt_pass.queue {
                last[queue.index()] = Some(index);
            }
        }
        for (index, rt_pass) in rt_passes.iter_mut().enumerate() {
            let Some(queue) = rt_pass.queue else {
                continue;
            };
            let point = RgQueuePoint {
                queue,
                time: rt_pass.time,
            };
            if signal_points.contains(&point) || last[queue.index()] == Some(index) {
                rt_pass.signal_semaphores.push(GfxSemaphoreSubmitInfo::timeline(
                    self.persistent.queue_semaphore(queue),
                    vk::PipelineStageFlags2::ALL_COMMANDS,
                    rt_pass.time,
                ));
            }
        }

        for (index, tracker) in buffer_trackers.into_iter().enumerate() {
            self.physical_buffers[index].tracker = tracker;
        }
        (rt_passes, counts)
    }

    fn rendering_info(&self, pass: &RgPass, textures: &[Option<RgRtTexture>]) -> GfxRenderingInfo {
        let resolve = |token: RgTextureToken| {
            let texture_use = &self.texture_uses[token.index as usize];
            (rt_texture(textures, texture_use.physical), texture_use.state.layout)
        };

        let color_attachments = pass
            .color_attachments
            .iter()
            .map(|attachment| {
                attachment.map(|attachment| {
                    let (texture, layout) = resolve(attachment.token);
                    GfxColorAttachment {
                        image: texture.image,
                        view: texture.view,
                        layout,
                        ops: attachment.ops,
                    }
                })
            })
            .collect_vec();
        let depth_attachment = pass.depth_attachment.map(|attachment| {
            let (texture, layout) = resolve(attachment.token);
            GfxDepthAttachment {
                image: texture.image,
                view: texture.view,
                layout,
                ops: attachment.ops,
            }
        });

        let extents = pass
            .color_attachments
            .iter()
            .flatten()
            .map(|attachment| attachment.token)
            .chain(pass.depth_attachment.map(|attachment| attachment.token))
            .map(|token| resolve(token).0.extent)
            .collect_vec();
        assert!(
            extents.iter().all_equal(),
            "attachments of pass \"{}\" differ in size: {:?}",
            pass.name,
            extents
        );
        let extent = extents[0];

        GfxRenderingInfo {
            render_area: vk::Extent2D {
                width: extent.width,
                height: extent.height,
            },
            color_attachments,
            depth_attachment,
        }
    }

    /// 把本帧的结果写回 RgPersistent，之后不会再失败
    fn commit(&mut self, mut staged: RgStaged, queue_counts: [u64; GfxQueueType::COUNT]) {
        let persistent = &mut *self.persistent;
        let frame_index = persistent.frame_index();
        let persistent_count = persistent.persistent_texture_count();

        for staged_texture in &staged.textures {
            let texture = &mut persistent.physical_textures[staged_texture.index];
            if let Some(retired) = texture.slot.image.replace(staged_texture.image) {
                persistent.arena.destroy_image(retired, frame_index);
            }
            texture.slot.usage = staged_texture.usage;
        }

        for &(slot, index) in &staged.pool_claims {
            let pooled = &mut persistent.transient_pool[slot];
            pooled.last_used_frame = frame_index;
            pooled.tracker = staged.trackers[index].clone();
        }
        for (key, image, index) in staged.pooled.drain(..) {
            persistent.transient_pool.push(RgPooledTexture {
                key,
                image,
                last_used_frame: frame_index,
                tracker: staged.trackers[index].clone(),
            });
        }

        let trackers = staged.trackers.into_iter().take(persistent_count);
        for (texture, tracker) in persistent.physical_textures.iter_mut().zip(trackers) {
            if !texture.is_external() {
                texture.slot.tracker = tracker;
            }
            texture.needs_init = false;
        }

        for queue in GfxQueueType::ALL {
            persistent.queue_times[queue.index()] += queue_counts[queue.index()];
        }
    }
}

fn rt_texture(textures: &[Option<RgRtTexture>], physical: u32) -> &RgRtTexture {
    let Some(texture) = textures[physical as usize].as_ref() else {
        unreachable!("texture #{} is used but was not materialized", physical);
    };
    texture
}

fn merge_memory_barrier(
    barrier: &mut Option<GfxMemoryBarrier>,
    src: (vk::PipelineStageFlags2, vk::AccessFlags2),
    dst: (vk::PipelineStageFlags2, vk::AccessFlags2),
) {
    let merged = match *barrier {
        Some(b) => b
            .src_mask(b.src_stage() | src.0, b.src_access() | src.1)
            .dst_mask(b.dst_stage() | dst.0, b.dst_access() | dst.1),
        None => GfxMemoryBarrier::new().src_mask(src.0, src.1).dst_mask(dst.0, dst.1),
    };
    *barrier = Some(merged);
}
