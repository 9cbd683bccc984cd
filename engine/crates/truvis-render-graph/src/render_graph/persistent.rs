//! 跨帧存在的 RenderGraph 状态
//!
//! - persistent / temporal / external texture 的物理信息以及它们的访问状态
//! - transient texture 的图像池
//! - 每个队列一个 timeline semaphore，以及队列的 time 计数器
//! - external semaphore 的注册表

use std::collections::HashSet;

use slotmap::SlotMap;

use truvis_gfx::foundation::device::{GfxDevice, GfxSemaphoreDesc};
use truvis_gfx::foundation::queue::GfxQueueType;
use truvis_gfx::handles::GfxSemaphoreHandle;
use truvis_render_interface::gfx_resource_arena::GfxResourceArena;

use super::error::RgResult;
use super::handle::{RgSemaphoreId, RgTextureId};
use super::image_resource::{
    RgPhysicalTexture, RgPooledTexture, RgTexture, RgTextureCreateInfo, RgTextureKind, RgTextureSlot,
};
use super::settings::RgSettings;

pub(crate) struct RgExternalSemaphore {
    pub name: String,
    /// 本帧绑定的 semaphore
    pub handle: Option<GfxSemaphoreHandle>,
}

pub struct RgPersistent {
    settings: RgSettings,

    pub(crate) arena: GfxResourceArena,

    pub(crate) textures: SlotMap<RgTextureId, RgTexture>,
    /// 前 `persistent_texture_count` 个跨帧保留，之后的是本帧的 transient texture
    pub(crate) physical_textures: Vec<RgPhysicalTexture>,
    persistent_texture_count: usize,
    texture_names: HashSet<String>,

    pub(crate) transient_pool: Vec<RgPooledTexture>,

    pub(crate) semaphores: SlotMap<RgSemaphoreId, RgExternalSemaphore>,

    queue_semaphores: [GfxSemaphoreHandle; GfxQueueType::COUNT],
    pub(crate) queue_times: [u64; GfxQueueType::COUNT],

    frame_index: u64,
    /// 每创建一个 builder 加一，用于校验 token
    build_serial: u32,

    destroyed: bool,
}
// new & init
impl RgPersistent {
    pub fn new(device: &dyn GfxDevice, settings: RgSettings) -> RgResult<Self> {
        let main = device.create_semaphore(&GfxSemaphoreDesc::timeline("rg-queue-main", 0))?;
        let async_compute = match device.create_semaphore(&GfxSemaphoreDesc::timeline("rg-queue-async", 0)) {
            Ok(semaphore) => semaphore,
            Err(e) => {
                device.destroy_semaphore(main);
                return Err(e.into());
            }
        };

        Ok(Self {
            settings,
            arena: GfxResourceArena::new(settings.fif_count),
            textures: SlotMap::with_key(),
            physical_textures: Vec::new(),
            persistent_texture_count: 0,
            texture_names: HashSet::new(),
            transient_pool: Vec::new(),
            semaphores: SlotMap::with_key(),
            queue_semaphores: [main, async_compute],
            queue_times: [0; GfxQueueType::COUNT],
            frame_index: 0,
            build_serial: 0,
            destroyed: false,
        })
    }
}
// destroy
impl RgPersistent {
    /// 释放所有物理资源，调用前设备需要处于 idle 状态
    pub fn destroy(&mut self, device: &dyn GfxDevice) {
        let _span = truvis_crate_tools::profile_span!("RgPersistent::destroy");

        self.physical_textures.clear();
        self.persistent_texture_count = 0;
        self.transient_pool.clear();
        self.textures.clear();
        self.arena.destroy(device);
        for semaphore in self.queue_semaphores {
            device.destroy_semaphore(semaphore);
        }
        self.destroyed = true;
    }
}
impl Drop for RgPersistent {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert!(self.destroyed, "RgPersistent dropped without destroy");
        }
    }
}
// getters
impl RgPersistent {
    #[inline]
    pub fn settings(&self) -> &RgSettings {
        &self.settings
    }

    #[inline]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    #[inline]
    pub fn queue_semaphore(&self, queue: GfxQueueType) -> GfxSemaphoreHandle {
        self.queue_semaphores[queue.index()]
    }

    /// 队列上最后一个 pass 的 time，也是上一次 build 完成后 semaphore 最终会到达的值
    #[inline]
    pub fn queue_time(&self, queue: GfxQueueType) -> u64 {
        self.queue_times[queue.index()]
    }

    #[inline]
    pub fn texture_name(&self, id: RgTextureId) -> &str {
        &self.textures[id].name
    }
}
// texture API
impl RgPersistent {
    /// 注册一个跨帧存在的 texture，图像在第一次 build 时才分配
    ///
    /// 同名的 texture 只能注册一次，返回的 id 需要由调用者缓存
    pub fn create_texture(&mut self, info: RgTextureCreateInfo) -> RgTextureId {
        info.validate();
        assert!(
            !matches!(info.kind, RgTextureKind::Transient),
            "transient texture \"{}\" must be created through RgBuilder",
            info.name
        );
        assert!(
            self.texture_names.insert(info.name.clone()),
            "persistent texture \"{}\" is already registered",
            info.name
        );

        // 丢弃上一帧留下的 transient texture
        self.physical_textures.truncate(self.persistent_texture_count);

        let base = self.physical_textures.len() as u32;
        let layers = match info.kind {
            RgTextureKind::Temporal { layers, .. } => layers,
            _ => 1,
        };
        let has_init = matches!(info.kind, RgTextureKind::Temporal { init: Some(_), .. });

        let id = self.textures.insert(RgTexture {
            name: info.name.clone(),
            parent: base,
            def: None,
            kill: None,
            child: None,
        });
        let init_id = has_init.then(|| {
            self.textures.insert(RgTexture {
                name: format!("{}-init", info.name),
                parent: base,
                def: None,
                kill: None,
                child: None,
            })
        });

        for layer in 0..layers {
            self.physical_textures.push(RgPhysicalTexture {
                info: info.clone(),
                slot: RgTextureSlot {
                    layer,
                    ..Default::default()
                },
                id,
                init_id,
                base,
                needs_init: has_init,
                external_view: None,
            });
        }
        self.persistent_texture_count = self.physical_textures.len();

        log::debug!("rg: registered texture \"{}\" ({:?})", info.name, info.kind);
        id
    }

    /// 每帧 build 之前调用一次：所有 temporal texture 轮转一层
    ///
    /// 本帧写入第 0 层，第 k 层是 k 帧之前写入的内容
    pub fn rotate_textures(&mut self) {
        let _span = truvis_crate_tools::profile_span!("RgPersistent::rotate_textures");

        let mut base = 0;
        while base < self.persistent_texture_count {
            let layers = self.physical_textures[base].temporal_layers() as usize;
            if layers > 1 {
                let mut slots = self.physical_textures[base..base + layers]
                    .iter_mut()
                    .map(|texture| std::mem::take(&mut texture.slot))
                    .collect::<Vec<_>>();
                slots.rotate_right(1);
                for (texture, slot) in self.physical_textures[base..base + layers].iter_mut().zip(slots) {
                    texture.slot = slot;
                }
            }
            base += layers;
        }
        self.frame_index += 1;
    }

    /// temporal texture 第 `history` 层当前对应的层编号
    pub fn temporal_layer(&self, id: RgTextureId, history: u32) -> u32 {
        let base = self.textures[id].parent as usize;
        let texture = &self.physical_textures[base];
        assert!(
            history < texture.temporal_layers(),
            "texture \"{}\" has no history layer {}",
            texture.info.name,
            history
        );
        self.physical_textures[base + history as usize].slot.layer
    }
}
// semaphore API
impl RgPersistent {
    /// 注册一个外部 semaphore，每帧通过 `RgBuilder::set_external_semaphore` 绑定
    pub fn create_external_semaphore(&mut self, name: impl Into<String>) -> RgSemaphoreId {
        self.semaphores.insert(RgExternalSemaphore {
            name: name.into(),
            handle: None,
        })
    }

    /// 阻塞当前线程，直到 `queue` 的 time 达到 `value`，用于 CPU 端的帧节拍
    pub fn wait_for_queue_time(&self, device: &dyn GfxDevice, queue: GfxQueueType, value: u64) -> RgResult<()> {
        let _span = truvis_crate_tools::profile_span!("RgPersistent::wait_for_queue_time");
        device.wait_for_semaphore(
            self.queue_semaphore(queue),
            value,
            self.settings.queue_semaphore_wait_timeout,
        )?;
        Ok(())
    }
}
// frame bookkeeping
impl RgPersistent {
    /// 开始新的一帧：丢弃上一帧的 transient 数据，重置版本链和 external 绑定
    pub(crate) fn begin_frame(&mut self) -> u32 {
        self.build_serial = self.build_serial.wrapping_add(1);

        self.physical_textures.truncate(self.persistent_texture_count);
        let physical_textures = &self.physical_textures;
        self.textures.retain(|id, texture| {
            physical_textures
                .get(texture.parent as usize)
                .is_some_and(|physical| physical.id == id || physical.init_id == Some(id))
        });
        for (_, texture) in self.textures.iter_mut() {
            texture.def = None;
            texture.kill = None;
            texture.child = None;
        }

        for texture in self.physical_textures.iter_mut().filter(|t| t.is_external()) {
            texture.slot.image = None;
            texture.external_view = None;
            texture.slot.tracker = Default::default();
        }
        for (_, semaphore) in self.semaphores.iter_mut() {
            semaphore.handle = None;
        }

        self.retire_transient_pool();

        self.build_serial
    }

    /// 把一个 fif 周期内都没有用到的池中图像交给 arena 延迟销毁
    fn retire_transient_pool(&mut self) {
        let fif = self.settings.fif_count as u64;
        let frame_index = self.frame_index;
        let arena = &mut self.arena;
        self.transient_pool.retain(|pooled| {
            if pooled.last_used_frame + fif < frame_index {
                log::warn!(
                    "rg: retiring pooled texture {:?} {}x{}, unused since frame {}",
                    pooled.key.format,
                    pooled.key.extent.width,
                    pooled.key.extent.height,
                    pooled.last_used_frame
                );
                arena.destroy_image(pooled.image, frame_index);
                false
            } else {
                true
            }
        });
    }

    #[inline]
    pub(crate) fn persistent_texture_count(&self) -> usize {
        self.persistent_texture_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;
    use truvis_gfx::headless::HeadlessDevice;

    fn temporal_info(name: &str, layers: u32) -> RgTextureCreateInfo {
        RgTextureCreateInfo::new_2d(
            name,
            vk::Extent2D { width: 4, height: 4 },
            vk::Format::R16G16B16A16_SFLOAT,
            RgTextureKind::Temporal { layers, init: None },
        )
    }

    #[test]
    fn test_temporal_rotation_alternates() {
        let device = HeadlessDevice::default();
        let mut persistent = RgPersistent::new(&device, RgSettings::default()).unwrap();
        let history = persistent.create_texture(temporal_info("history", 2));

        assert_eq!(persistent.temporal_layer(history, 0), 0);
        assert_eq!(persistent.temporal_layer(history, 1), 1);

        let mut read_layers = Vec::new();
        for _ in 0..3 {
            persistent.rotate_textures();
            read_layers.push(persistent.temporal_layer(history, 1));
        }
        assert_eq!(read_layers, vec![0, 1, 0]);
        assert_eq!(persistent.frame_index(), 3);

        persistent.destroy(&device);
    }

    #[test]
    fn test_rotation_with_four_layers() {
        let device = HeadlessDevice::default();
        let mut persistent = RgPersistent::new(&device, RgSettings::default()).unwrap();
        let a = persistent.create_texture(temporal_info("a", 4));
        let b = persistent.create_texture(temporal_info("b", 3));

        persistent.rotate_textures();
        assert_eq!(
            (0..4).map(|h| persistent.temporal_layer(a, h)).collect::<Vec<_>>(),
            vec![3, 0, 1, 2]
        );
        assert_eq!(
            (0..3).map(|h| persistent.temporal_layer(b, h)).collect::<Vec<_>>(),
            vec![2, 0, 1]
        );

        persistent.destroy(&device);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_duplicate_name_panics() {
        let device = HeadlessDevice::default();
        let mut persistent = RgPersistent::new(&device, RgSettings::default()).unwrap();
        persistent.create_texture(temporal_info("history", 2));
        persistent.create_texture(temporal_info("history", 2));
    }

    #[test]
    fn test_queue_semaphores() {
        let device = HeadlessDevice::default();
        let mut persistent = RgPersistent::new(&device, RgSettings::default()).unwrap();
        assert_ne!(
            persistent.queue_semaphore(GfxQueueType::Main),
            persistent.queue_semaphore(GfxQueueType::AsyncCompute)
        );
        assert_eq!(persistent.queue_time(GfxQueueType::Main), 0);
        persistent.wait_for_queue_time(&device, GfxQueueType::Main, 0).unwrap();

        persistent.destroy(&device);
        assert_eq!(device.live_semaphore_count(), 0);
    }
}
