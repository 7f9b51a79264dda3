use std::sync::Arc;

use ash::prelude::VkResult;
use ash::vk;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::backend::DeviceBackend;
use crate::config::DecodePath;
use crate::decode::{DecodeRequest, Decoder};
use crate::descriptor_pool::DescriptorPoolManager;
use crate::error::LayerResult;
use crate::format;
use crate::kernels::{KernelSource, KernelVariant};
use crate::pipeline::DecodePipelines;
use crate::reclaim::{self, Releaser};
use crate::registry::{BufferShadow, CommandBufferShadow, FenceShadow, ImageShadow, QueueShadow, Registry};

/// What the layer learned about a device while creating it.
#[derive(Debug, Clone, Copy)]
pub struct DeviceSettings {
    /// Requested path; resolved against `storage_image_supported`.
    pub decode_path: DecodePath,
    /// Every decode target format supports optimal-tiling storage images.
    pub storage_image_supported: bool,
    /// First memory type with `HOST_VISIBLE`.
    pub host_visible_memory: Option<u32>,
    /// Queue of the first compute-capable family, when the application created one.
    pub compute_queue: Option<vk::Queue>,
}

/// Decode state of one device plus the operations the layer forwards to it.
pub struct DecodeDevice {
    handle: vk::Device,
    backend: Arc<dyn DeviceBackend>,
    registry: Arc<Registry>,
    pipelines: DecodePipelines,
    pools: Mutex<DescriptorPoolManager>,
    path: DecodePath,
    host_visible_memory: Option<u32>,
    compute_queue: Option<vk::Queue>,
}

impl DecodeDevice {
    pub fn new(
        handle: vk::Device,
        backend: Arc<dyn DeviceBackend>,
        registry: Arc<Registry>,
        settings: DeviceSettings,
        kernels: &dyn KernelSource,
    ) -> LayerResult<Self> {
        let path = settings.decode_path.resolve(settings.storage_image_supported);
        let variant = match path {
            DecodePath::Image => KernelVariant::Image,
            _ => KernelVariant::Buffer,
        };
        let pipelines = DecodePipelines::build(backend.as_ref(), kernels, variant)?;
        let pools = match DescriptorPoolManager::new(backend.as_ref(), pipelines.set_layout, pipelines.destination_type) {
            Ok(pools) => pools,
            Err(e) => {
                pipelines.destroy(backend.as_ref());
                return Err(e);
            }
        };
        if path == DecodePath::Buffer && settings.host_visible_memory.is_none() {
            warn!("device {:?} has no host-visible memory type, decodes will fail", handle);
        }
        info!("device {:?}: BCn decode via {:?} path", handle, path);

        Ok(Self {
            handle,
            backend,
            registry,
            pipelines,
            pools: Mutex::new(pools),
            path,
            host_visible_memory: settings.host_visible_memory,
            compute_queue: settings.compute_queue,
        })
    }

    pub fn handle(&self) -> vk::Device {
        self.handle
    }

    pub fn backend(&self) -> &dyn DeviceBackend {
        self.backend.as_ref()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Resolved decode path, never `Auto`.
    pub fn decode_path(&self) -> DecodePath {
        self.path
    }

    pub fn compute_queue(&self) -> Option<vk::Queue> {
        self.compute_queue
    }

    pub fn descriptor_pool_count(&self) -> usize {
        self.pools.lock().pool_count()
    }

    fn releaser(&self) -> Releaser<'_> {
        Releaser {
            backend: self.backend(),
            pools: &self.pools,
        }
    }

    // ── Buffers ────────────────────────────────────────────────

    pub fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> VkResult<vk::Buffer> {
        let mut patched = *info;
        patched.usage |= vk::BufferUsageFlags::STORAGE_BUFFER;
        let buffer = self.backend.create_buffer(&patched).inspect_err(|e| {
            error!("vkCreateBuffer failed: {:?}", e);
        })?;
        self.registry.with(|t| {
            t.buffers.register(
                buffer,
                BufferShadow {
                    device: self.handle,
                    size: info.size,
                    memory: vk::DeviceMemory::null(),
                    memory_offset: 0,
                },
            )
        });
        Ok(buffer)
    }

    pub fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        self.backend.bind_buffer_memory(buffer, memory, offset)?;
        self.registry.with(|t| {
            if let Some(shadow) = t.buffers.lookup_mut(buffer) {
                shadow.memory = memory;
                shadow.memory_offset = offset;
            }
        });
        Ok(())
    }

    pub fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.backend.destroy_buffer(buffer);
        self.registry.with(|t| t.buffers.unregister(buffer));
    }

    // ── Images ─────────────────────────────────────────────────

    /// Compressed images are created with their decode target format and
    /// storage usage; the registry keeps the requested format.
    pub fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image> {
        let mut patched = *info;
        if format::is_supported(info.format) {
            patched.format = format::decode_target_format(info.format);
            patched.usage |= vk::ImageUsageFlags::STORAGE;
            patched.flags &=
                !(vk::ImageCreateFlags::MUTABLE_FORMAT | vk::ImageCreateFlags::BLOCK_TEXEL_VIEW_COMPATIBLE);
            debug!("image format {:?} rewritten to {:?}", info.format, patched.format);
        }
        let image = self.backend.create_image(&patched).inspect_err(|e| {
            error!("vkCreateImage failed: {:?}", e);
        })?;
        self.registry.with(|t| {
            t.images.register(
                image,
                ImageShadow {
                    device: self.handle,
                    format: info.format,
                    extent: info.extent,
                    mip_levels: info.mip_levels,
                    array_layers: info.array_layers,
                },
            )
        });
        Ok(image)
    }

    pub fn destroy_image(&self, image: vk::Image) {
        self.backend.destroy_image(image);
        self.registry.with(|t| t.images.unregister(image));
    }

    pub fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> VkResult<vk::ImageView> {
        let mut patched = *info;
        patched.format = format::decode_target_format(info.format);
        self.backend.create_image_view(&patched)
    }

    pub fn destroy_image_view(&self, view: vk::ImageView) {
        self.backend.destroy_image_view(view);
    }

    // ── Command buffers ────────────────────────────────────────

    pub fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let buffers = self.backend.allocate_command_buffers(info)?;
        self.registry.with(|t| {
            for &cb in &buffers {
                t.command_buffers.register(
                    cb,
                    CommandBufferShadow {
                        device: self.handle,
                        pool: info.command_pool,
                        fence: None,
                        one_time_submit: false,
                        pending: Vec::new(),
                    },
                );
            }
        });
        Ok(buffers)
    }

    pub fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        let held = self.registry.with(|t| {
            buffers
                .iter()
                .filter_map(|&cb| t.command_buffers.unregister(cb))
                .flat_map(|shadow| shadow.pending)
                .collect::<Vec<_>>()
        });
        self.backend.free_command_buffers(pool, buffers);
        reclaim::release_all(self.releaser(), held);
    }

    pub fn destroy_command_pool(&self, pool: vk::CommandPool) {
        let held = self.registry.with(|t| {
            t.command_buffers
                .unregister_where(|_, shadow| shadow.device == self.handle && shadow.pool == pool)
                .into_iter()
                .flat_map(|(_, shadow)| shadow.pending)
                .collect::<Vec<_>>()
        });
        self.backend.destroy_command_pool(pool);
        reclaim::release_all(self.releaser(), held);
    }

    /// Resources the command buffer still holds are released when it is
    /// re-recorded, since it can no longer be pending.
    pub fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        info: &vk::CommandBufferBeginInfo<'_>,
    ) -> VkResult<()> {
        reclaim::release_held(&self.registry, self.releaser(), command_buffer);
        self.backend.begin_command_buffer(command_buffer, info)?;
        let one_time_submit = info.flags.contains(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        self.registry.with(|t| {
            if let Some(cb) = t.command_buffers.lookup_mut(command_buffer) {
                cb.one_time_submit = one_time_submit;
            }
        });
        Ok(())
    }

    pub fn reset_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        flags: vk::CommandBufferResetFlags,
    ) -> VkResult<()> {
        reclaim::release_held(&self.registry, self.releaser(), command_buffer);
        self.backend.reset_command_buffer(command_buffer, flags)
    }

    /// Replaces copies into compressed images with decode dispatches. Copies
    /// into other images, or from buffers the layer did not create, are
    /// forwarded untouched.
    pub fn cmd_copy_buffer_to_image(
        &self,
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        let image = self.registry.with(|t| {
            let image = t.images.lookup(dst).copied()?;
            let tracked = t.buffers.contains(src) && t.command_buffers.contains(command_buffer);
            (format::is_supported(image.format) && tracked).then_some(image)
        });
        let Some(image) = image else {
            self.backend
                .cmd_copy_buffer_to_image(command_buffer, src, dst, dst_layout, regions);
            return;
        };

        let decoder = Decoder {
            releaser: self.releaser(),
            pipelines: &self.pipelines,
            path: self.path,
            host_visible_memory: self.host_visible_memory,
        };
        for region in regions {
            let request = DecodeRequest {
                command_buffer,
                src,
                dst,
                dst_layout,
                image: &image,
                region,
            };
            match decoder.record(&request) {
                Ok(Some(held)) => {
                    if let Err(e) = reclaim::hold(&self.registry, command_buffer, held) {
                        error!("decode resources leaked: {}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => error!("skipping decode of {:?} region into {:?}: {}", image.format, dst, e),
            }
        }
    }

    // ── Queues ─────────────────────────────────────────────────

    pub fn get_device_queue(&self, family: u32, index: u32) -> vk::Queue {
        let queue = self.backend.get_device_queue(family, index);
        self.registry.with(|t| {
            t.queues.register(
                queue,
                QueueShadow {
                    device: self.handle,
                    family,
                },
            )
        });
        queue
    }

    pub fn queue_submit(&self, queue: vk::Queue, submits: &[vk::SubmitInfo<'_>], fence: vk::Fence) -> VkResult<()> {
        self.backend.queue_submit(queue, submits, fence)?;
        let command_buffers: Vec<vk::CommandBuffer> = submits
            .iter()
            .filter(|s| s.command_buffer_count > 0 && !s.p_command_buffers.is_null())
            .flat_map(|s| {
                // SAFETY: the application guarantees p_command_buffers points to
                // command_buffer_count handles for the duration of the call.
                unsafe { std::slice::from_raw_parts(s.p_command_buffers, s.command_buffer_count as usize) }
            })
            .copied()
            .collect();
        reclaim::on_submit(&self.registry, self.handle, &command_buffers, fence);
        Ok(())
    }

    // ── Fences ─────────────────────────────────────────────────

    pub fn create_fence(&self, info: &vk::FenceCreateInfo<'_>) -> VkResult<vk::Fence> {
        let fence = self.backend.create_fence(info)?;
        self.registry.with(|t| {
            t.fences.register(
                fence,
                FenceShadow {
                    device: self.handle,
                    pending: Vec::new(),
                },
            )
        });
        Ok(fence)
    }

    /// Every submission using `fence` must have completed before it may be
    /// destroyed, so anything it still guards is released here.
    pub fn destroy_fence(&self, fence: vk::Fence) {
        reclaim::reclaim(&self.registry, self.releaser(), fence);
        self.backend.destroy_fence(fence);
        self.registry.with(|t| t.fences.unregister(fence));
    }

    pub fn wait_for_fences(&self, fences: &[vk::Fence], wait_all: bool, timeout: u64) -> VkResult<()> {
        self.backend.wait_for_fences(fences, wait_all, timeout)?;
        for &fence in fences {
            if wait_all || matches!(self.backend.get_fence_status(fence), Ok(true)) {
                reclaim::reclaim(&self.registry, self.releaser(), fence);
            }
        }
        Ok(())
    }

    /// `Ok(true)` when signaled.
    pub fn get_fence_status(&self, fence: vk::Fence) -> VkResult<bool> {
        let signaled = self.backend.get_fence_status(fence)?;
        if signaled {
            reclaim::reclaim(&self.registry, self.releaser(), fence);
        }
        Ok(signaled)
    }

    // ── Teardown ───────────────────────────────────────────────

    /// Release everything the layer created on this device. The backend
    /// device itself is left to the caller.
    pub fn destroy(&self) {
        if let Err(e) = self.backend.device_wait_idle() {
            warn!("vkDeviceWaitIdle before teardown failed: {:?}", e);
        }
        let pending = self.registry.purge_device(self.handle);
        let released = reclaim::release_all(self.releaser(), pending);
        let mut pools = self.pools.lock();
        debug!(
            "device {:?} teardown: {} pending resources, {} descriptor pools",
            self.handle,
            released,
            pools.pool_count()
        );
        pools.destroy(self.backend());
        self.pipelines.destroy(self.backend());
    }
}

impl std::fmt::Debug for DecodeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeDevice")
            .field("handle", &self.handle)
            .field("path", &self.path)
            .field("host_visible_memory", &self.host_visible_memory)
            .finish_non_exhaustive()
    }
}
