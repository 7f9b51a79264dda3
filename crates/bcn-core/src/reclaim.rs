//! Deferred release of the transient resources a decode dispatch needs.
//!
//! Resources created while recording stay with the command buffer's shadow.
//! `vkQueueSubmit` moves staging buffers onto the submission's fence, and they
//! are freed once that fence is observed signaled through a wait or status
//! poll. Views and descriptor sets follow them only for command buffers begun
//! with `ONE_TIME_SUBMIT`; any other command buffer may be submitted again
//! and keeps them until it is re-recorded or freed.

use ash::vk;
use parking_lot::Mutex;
use tracing::debug;

use crate::backend::DeviceBackend;
use crate::descriptor_pool::DescriptorPoolManager;
use crate::error::LayerResult;
use crate::registry::{FenceShadow, Registry};

/// Device state needed to give pending resources back.
#[derive(Clone, Copy)]
pub struct Releaser<'a> {
    pub backend: &'a dyn DeviceBackend,
    pub pools: &'a Mutex<DescriptorPoolManager>,
}

/// A resource that must outlive the GPU work reading it.
///
/// Deliberately not `Clone`: each item has exactly one owner until released.
#[derive(Debug, PartialEq, Eq)]
pub enum PendingRelease {
    StagingBuffer {
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        size: vk::DeviceSize,
    },
    ImageView(vk::ImageView),
    DescriptorSet {
        pool: vk::DescriptorPool,
        set: vk::DescriptorSet,
    },
}

impl PendingRelease {
    pub fn release(self, releaser: Releaser<'_>) {
        match self {
            PendingRelease::StagingBuffer { buffer, memory, .. } => {
                releaser.backend.destroy_buffer(buffer);
                releaser.backend.free_memory(memory);
            }
            PendingRelease::ImageView(view) => releaser.backend.destroy_image_view(view),
            PendingRelease::DescriptorSet { pool, set } => releaser.pools.lock().free(releaser.backend, pool, set),
        }
    }

    /// Whether the fence of the submission may take this item over.
    /// Staging buffers always move; the rest only when the command buffer
    /// cannot run again without being re-recorded.
    pub fn moves_to_fence(&self, one_time_submit: bool) -> bool {
        one_time_submit || matches!(self, PendingRelease::StagingBuffer { .. })
    }
}

/// Free every item in `items`.
pub fn release_all(releaser: Releaser<'_>, items: Vec<PendingRelease>) -> usize {
    let count = items.len();
    for item in items {
        item.release(releaser);
    }
    count
}

/// Attach resources recorded into `command_buffer` to its shadow.
///
/// Decodes are only recorded into command buffers the layer allocated. If the
/// shadow has vanished anyway the resources are leaked, since recorded
/// commands may still reference them.
pub fn hold(registry: &Registry, command_buffer: vk::CommandBuffer, items: Vec<PendingRelease>) -> LayerResult<()> {
    if items.is_empty() {
        return Ok(());
    }
    registry.with(|t| {
        let cb = t.command_buffers.require_mut("command buffer", command_buffer)?;
        cb.pending.extend(items);
        Ok(())
    })
}

/// Record `fence` as the guard of every command buffer in a submission and
/// hand it the held resources it may own. A null fence leaves them where
/// they are.
pub fn on_submit(registry: &Registry, device: vk::Device, command_buffers: &[vk::CommandBuffer], fence: vk::Fence) {
    registry.with(|t| {
        let fence = (fence != vk::Fence::null()).then_some(fence);
        let mut moved = Vec::new();
        for &handle in command_buffers {
            let Some(cb) = t.command_buffers.lookup_mut(handle) else {
                continue;
            };
            cb.fence = fence;
            if fence.is_some() {
                let one_time_submit = cb.one_time_submit;
                let (to_fence, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut cb.pending)
                    .into_iter()
                    .partition(|item| item.moves_to_fence(one_time_submit));
                cb.pending = kept;
                moved.extend(to_fence);
            }
        }
        if let Some(fence) = fence {
            if moved.is_empty() {
                return;
            }
            debug!("fence {:?} now guards {} more decode resources", fence, moved.len());
            t.fences
                .get_or_register_with(fence, || FenceShadow { device, pending: Vec::new() })
                .pending
                .append(&mut moved);
        }
    });
}

/// Free everything `fence` guards. Call only after observing it signaled.
pub fn reclaim(registry: &Registry, releaser: Releaser<'_>, fence: vk::Fence) -> usize {
    let items = registry.with(|t| {
        t.fences
            .lookup_mut(fence)
            .map(|shadow| std::mem::take(&mut shadow.pending))
            .unwrap_or_default()
    });
    let count = release_all(releaser, items);
    if count > 0 {
        debug!("reclaimed {} decode resources guarded by {:?}", count, fence);
    }
    count
}

/// Free what `command_buffer` still holds, for begin/reset of a command buffer
/// that can no longer be pending.
pub fn release_held(registry: &Registry, releaser: Releaser<'_>, command_buffer: vk::CommandBuffer) -> usize {
    let items = registry.with(|t| {
        t.command_buffers
            .lookup_mut(command_buffer)
            .map(|cb| std::mem::take(&mut cb.pending))
            .unwrap_or_default()
    });
    release_all(releaser, items)
}
