use std::collections::HashMap;
use std::hash::Hash;

use ash::vk::{self, Handle};
use parking_lot::Mutex;

use crate::error::LayerError;
use crate::reclaim::PendingRelease;

/// Map from an opaque handle to the layer's metadata for it.
///
/// A missing entry is the normal case for objects created before the layer
/// was loaded or by other layers; callers fall back to pass-through.
pub struct ShadowTable<H, T> {
    entries: HashMap<H, T>,
}

impl<H: Handle + Copy + Eq + Hash, T> ShadowTable<H, T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register metadata for a handle, returning any stale entry it replaces.
    pub fn register(&mut self, handle: H, shadow: T) -> Option<T> {
        self.entries.insert(handle, shadow)
    }

    pub fn lookup(&self, handle: H) -> Option<&T> {
        self.entries.get(&handle)
    }

    pub fn lookup_mut(&mut self, handle: H) -> Option<&mut T> {
        self.entries.get_mut(&handle)
    }

    /// Lookup where a missing entry is an invariant fault.
    pub fn require_mut(&mut self, kind: &'static str, handle: H) -> Result<&mut T, LayerError> {
        self.entries.get_mut(&handle).ok_or(LayerError::Unregistered {
            kind,
            handle: handle.as_raw(),
        })
    }

    pub fn get_or_register_with(&mut self, handle: H, shadow: impl FnOnce() -> T) -> &mut T {
        self.entries.entry(handle).or_insert_with(shadow)
    }

    pub fn unregister(&mut self, handle: H) -> Option<T> {
        self.entries.remove(&handle)
    }

    pub fn contains(&self, handle: H) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Remove and return every entry matching `pred`.
    pub fn unregister_where(&mut self, mut pred: impl FnMut(&H, &T) -> bool) -> Vec<(H, T)> {
        let keys: Vec<H> = self
            .entries
            .iter()
            .filter(|(h, t)| pred(h, t))
            .map(|(h, _)| *h)
            .collect();
        keys.into_iter()
            .filter_map(|h| self.entries.remove(&h).map(|t| (h, t)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<H: Handle + Copy + Eq + Hash, T> Default for ShadowTable<H, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BufferShadow {
    pub device: vk::Device,
    pub size: vk::DeviceSize,
    /// Null until vkBindBufferMemory
    pub memory: vk::DeviceMemory,
    pub memory_offset: vk::DeviceSize,
}

#[derive(Debug, Clone, Copy)]
pub struct ImageShadow {
    pub device: vk::Device,
    /// Format the application asked for, before any rewrite.
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
}

impl ImageShadow {
    /// Format the image actually has on the device.
    pub fn device_format(&self) -> vk::Format {
        crate::format::decode_target_format(self.format)
    }
}

#[derive(Debug)]
pub struct CommandBufferShadow {
    pub device: vk::Device,
    pub pool: vk::CommandPool,
    /// Fence of the last submission containing this command buffer.
    pub fence: Option<vk::Fence>,
    /// Begun with `ONE_TIME_SUBMIT` since it was last reset.
    pub one_time_submit: bool,
    /// Decode resources recorded into this command buffer that no fence owns yet.
    pub pending: Vec<PendingRelease>,
}

#[derive(Debug)]
pub struct FenceShadow {
    pub device: vk::Device,
    pub pending: Vec<PendingRelease>,
}

#[derive(Debug, Clone, Copy)]
pub struct QueueShadow {
    pub device: vk::Device,
    pub family: u32,
}

/// All shadow tables. Only reachable through [`Registry::with`].
#[derive(Default)]
pub struct Tables {
    pub buffers: ShadowTable<vk::Buffer, BufferShadow>,
    pub images: ShadowTable<vk::Image, ImageShadow>,
    pub command_buffers: ShadowTable<vk::CommandBuffer, CommandBufferShadow>,
    pub fences: ShadowTable<vk::Fence, FenceShadow>,
    pub queues: ShadowTable<vk::Queue, QueueShadow>,
}

/// Process-wide shadow state, serialized behind one lock.
#[derive(Default)]
pub struct Registry {
    tables: Mutex<Tables>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with exclusive access to every table. Backend calls should be
    /// made outside of `f` wherever the result does not depend on the lookup.
    pub fn with<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        f(&mut self.tables.lock())
    }

    /// Drop every shadow owned by `device`, returning the resources still
    /// waiting on a fence or command buffer so the caller can free them.
    pub fn purge_device(&self, device: vk::Device) -> Vec<PendingRelease> {
        self.with(|t| {
            t.buffers.unregister_where(|_, s| s.device == device);
            t.images.unregister_where(|_, s| s.device == device);
            t.queues.unregister_where(|_, s| s.device == device);
            let mut pending = Vec::new();
            for (_, cb) in t.command_buffers.unregister_where(|_, s| s.device == device) {
                pending.extend(cb.pending);
            }
            for (_, fence) in t.fences.unregister_where(|_, s| s.device == device) {
                pending.extend(fence.pending);
            }
            pending
        })
    }
}
