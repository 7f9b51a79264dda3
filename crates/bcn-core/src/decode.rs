//! Records a compute decode in place of one compressed buffer-to-image copy.

use ash::vk;
use tracing::trace;

use crate::backend::{DescriptorWrite, DeviceBackend};
use crate::config::DecodePath;
use crate::error::{LayerError, LayerResult};
use crate::format::{self, FormatFamily};
use crate::pipeline::{DecodePipelines, PushConstants, WORKGROUP_SIZE};
use crate::reclaim::{self, PendingRelease, Releaser};
use crate::registry::ImageShadow;

/// Per-device state a decode needs.
pub struct Decoder<'a> {
    pub releaser: Releaser<'a>,
    pub pipelines: &'a DecodePipelines,
    /// Resolved, never `Auto`.
    pub path: DecodePath,
    pub host_visible_memory: Option<u32>,
}

/// One region of an intercepted copy.
#[derive(Debug, Clone, Copy)]
pub struct DecodeRequest<'a> {
    pub command_buffer: vk::CommandBuffer,
    pub src: vk::Buffer,
    pub dst: vk::Image,
    pub dst_layout: vk::ImageLayout,
    pub image: &'a ImageShadow,
    pub region: &'a vk::BufferImageCopy,
}

impl DecodeRequest<'_> {
    fn subresource_range(&self) -> vk::ImageSubresourceRange {
        let sub = self.region.image_subresource;
        vk::ImageSubresourceRange {
            aspect_mask: sub.aspect_mask,
            base_mip_level: sub.mip_level,
            level_count: 1,
            base_array_layer: sub.base_array_layer,
            layer_count: sub.layer_count,
        }
    }
}

/// Where the kernel writes.
enum Destination {
    View(vk::ImageView),
    Staging(vk::Buffer),
}

impl Decoder<'_> {
    fn backend(&self) -> &dyn DeviceBackend {
        self.releaser.backend
    }

    /// Record the decode of one region and return the resources the recorded
    /// commands reference. The caller must keep them alive until the
    /// submission has completed.
    ///
    /// Returns `Ok(None)` when the image's format is not compressed.
    pub fn record(&self, request: &DecodeRequest<'_>) -> LayerResult<Option<Vec<PendingRelease>>> {
        let Some(family) = format::classify(request.image.format) else {
            return Ok(None);
        };

        let mut held = Vec::with_capacity(2);
        let (set, destination) = match self.prepare(request, family, &mut held) {
            Ok(prepared) => prepared,
            Err(e) => {
                // Nothing recorded references them yet.
                reclaim::release_all(self.releaser, held);
                return Err(e);
            }
        };

        self.record_commands(request, family, set, &destination);
        trace!(
            "decode {:?} {}x{} into {:?} via {:?}",
            family,
            request.region.image_extent.width,
            request.region.image_extent.height,
            request.dst,
            self.path
        );
        Ok(Some(held))
    }

    /// Allocate and write the descriptor set plus its destination resource.
    fn prepare(
        &self,
        request: &DecodeRequest<'_>,
        family: FormatFamily,
        held: &mut Vec<PendingRelease>,
    ) -> LayerResult<(vk::DescriptorSet, Destination)> {
        let (pool, set) = self.releaser.pools.lock().allocate(self.backend())?;
        held.push(PendingRelease::DescriptorSet { pool, set });

        let source = DescriptorWrite::StorageBuffer {
            binding: 1,
            buffer: request.src,
            offset: request.region.buffer_offset,
            range: vk::WHOLE_SIZE,
        };

        let (destination, write) = match self.path {
            DecodePath::Image => {
                let view = self.create_view(request)?;
                held.push(PendingRelease::ImageView(view));
                (Destination::View(view), DescriptorWrite::StorageImage { binding: 0, view })
            }
            _ => {
                let extent = request.region.image_extent;
                let size = extent.width as vk::DeviceSize
                    * extent.height as vk::DeviceSize
                    * family.texel_size() as vk::DeviceSize;
                let (buffer, memory) = self.create_staging(size)?;
                held.push(PendingRelease::StagingBuffer { buffer, memory, size });
                (
                    Destination::Staging(buffer),
                    DescriptorWrite::StorageBuffer {
                        binding: 0,
                        buffer,
                        offset: 0,
                        range: vk::WHOLE_SIZE,
                    },
                )
            }
        };

        self.backend().update_descriptor_set(set, &[source, write]);
        Ok((set, destination))
    }

    fn create_view(&self, request: &DecodeRequest<'_>) -> LayerResult<vk::ImageView> {
        let range = request.subresource_range();
        let view_type = if range.layer_count > 1 {
            vk::ImageViewType::TYPE_2D_ARRAY
        } else {
            vk::ImageViewType::TYPE_2D
        };
        let info = vk::ImageViewCreateInfo::default()
            .image(request.dst)
            .view_type(view_type)
            .format(request.image.device_format())
            .components(vk::ComponentMapping::default())
            .subresource_range(range);
        self.backend()
            .create_image_view(&info)
            .map_err(LayerError::backend("vkCreateImageView"))
    }

    fn create_staging(&self, size: vk::DeviceSize) -> LayerResult<(vk::Buffer, vk::DeviceMemory)> {
        let memory_type = self.host_visible_memory.ok_or(LayerError::NoHostVisibleMemory)?;
        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::STORAGE_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = self
            .backend()
            .create_buffer(&info)
            .map_err(LayerError::backend("vkCreateBuffer"))?;

        let requirements = self.backend().get_buffer_memory_requirements(buffer);
        // The host-visible type must be one the staging buffer accepts.
        if requirements.memory_type_bits & (1 << memory_type) == 0 {
            self.backend().destroy_buffer(buffer);
            return Err(LayerError::NoHostVisibleMemory);
        }
        let memory = match self.backend().allocate_memory(requirements.size, memory_type) {
            Ok(memory) => memory,
            Err(e) => {
                self.backend().destroy_buffer(buffer);
                return Err(LayerError::backend("vkAllocateMemory")(e));
            }
        };
        if let Err(e) = self.backend().bind_buffer_memory(buffer, memory, 0) {
            self.backend().destroy_buffer(buffer);
            self.backend().free_memory(memory);
            return Err(LayerError::backend("vkBindBufferMemory")(e));
        }
        Ok((buffer, memory))
    }

    fn record_commands(
        &self,
        request: &DecodeRequest<'_>,
        family: FormatFamily,
        set: vk::DescriptorSet,
        destination: &Destination,
    ) {
        let cb = request.command_buffer;
        let region = request.region;
        let backend = self.backend();

        backend.cmd_bind_pipeline(cb, self.pipelines.pipeline(family));

        if let Destination::View(_) = destination {
            let to_general = vk::ImageMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_WRITE)
                .old_layout(request.dst_layout)
                .new_layout(vk::ImageLayout::GENERAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(request.dst)
                .subresource_range(request.subresource_range());
            backend.cmd_pipeline_barrier(
                cb,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::COMPUTE_SHADER,
                &[],
                &[to_general],
            );
        }

        let constants = PushConstants {
            format: request.image.format.as_raw(),
            width: region.image_extent.width as i32,
            height: region.image_extent.height as i32,
            offset: region.buffer_offset as i32,
            buffer_row_length: region.buffer_row_length as i32,
            offset_x: region.image_offset.x,
            offset_y: region.image_offset.y,
            reserved: 0,
        };
        backend.cmd_push_constants(cb, self.pipelines.layout, bytemuck::bytes_of(&constants));
        backend.cmd_bind_descriptor_set(cb, self.pipelines.layout, set);
        let (x, y) = dispatch_size(region.image_extent);
        backend.cmd_dispatch(cb, x, y, 1);

        match *destination {
            Destination::View(_) => {
                let to_final = vk::ImageMemoryBarrier::default()
                    .src_access_mask(vk::AccessFlags::SHADER_WRITE)
                    .dst_access_mask(
                        vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                            | vk::AccessFlags::SHADER_READ
                            | vk::AccessFlags::TRANSFER_READ,
                    )
                    .old_layout(vk::ImageLayout::GENERAL)
                    .new_layout(request.dst_layout)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(request.dst)
                    .subresource_range(request.subresource_range());
                backend.cmd_pipeline_barrier(
                    cb,
                    vk::PipelineStageFlags::COMPUTE_SHADER,
                    vk::PipelineStageFlags::COMPUTE_SHADER
                        | vk::PipelineStageFlags::FRAGMENT_SHADER
                        | vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                        | vk::PipelineStageFlags::TRANSFER,
                    &[],
                    &[to_final],
                );
            }
            Destination::Staging(staging) => {
                let written = vk::BufferMemoryBarrier::default()
                    .src_access_mask(vk::AccessFlags::SHADER_WRITE)
                    .dst_access_mask(vk::AccessFlags::TRANSFER_READ)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .buffer(staging)
                    .offset(0)
                    .size(vk::WHOLE_SIZE);
                backend.cmd_pipeline_barrier(
                    cb,
                    vk::PipelineStageFlags::COMPUTE_SHADER,
                    vk::PipelineStageFlags::TRANSFER,
                    &[written],
                    &[],
                );
                let copy = vk::BufferImageCopy {
                    buffer_offset: 0,
                    buffer_row_length: 0,
                    buffer_image_height: 0,
                    image_subresource: region.image_subresource,
                    image_offset: region.image_offset,
                    image_extent: region.image_extent,
                };
                backend.cmd_copy_buffer_to_image(cb, staging, request.dst, request.dst_layout, &[copy]);
            }
        }
    }
}

/// Workgroup grid covering `extent`, one group per 8x8 texels.
pub fn dispatch_size(extent: vk::Extent3D) -> (u32, u32) {
    (
        extent.width.div_ceil(WORKGROUP_SIZE),
        extent.height.div_ceil(WORKGROUP_SIZE),
    )
}
