//! In-memory `DeviceBackend` shared by the integration tests.
//!
//! Hands out synthetic handles, records every command in order, simulates
//! descriptor pool capacity and fence signalling, and counts frees so a
//! double free fails the test that caused it.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use bcn_core::backend::{DescriptorWrite, DeviceBackend};
use bcn_core::kernels::{KernelSource, KernelVariant, SPIRV_MAGIC};
use bcn_core::pipeline::PushConstants;
use bcn_core::{DecodeDevice, DecodePath, DeviceSettings, FormatFamily, LayerError, Registry};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyRegion {
    pub buffer_offset: vk::DeviceSize,
    pub buffer_row_length: u32,
    pub width: u32,
    pub height: u32,
    pub mip_level: u32,
}

impl From<&vk::BufferImageCopy> for CopyRegion {
    fn from(r: &vk::BufferImageCopy) -> Self {
        Self {
            buffer_offset: r.buffer_offset,
            buffer_row_length: r.buffer_row_length,
            width: r.image_extent.width,
            height: r.image_extent.height,
            mip_level: r.image_subresource.mip_level,
        }
    }
}

/// Recorded commands and descriptor updates, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    UpdateDescriptorSet {
        set: vk::DescriptorSet,
        writes: Vec<DescriptorWrite>,
    },
    CopyBufferToImage {
        cb: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        layout: vk::ImageLayout,
        regions: Vec<CopyRegion>,
    },
    BindPipeline {
        cb: vk::CommandBuffer,
        pipeline: vk::Pipeline,
    },
    ImageBarrier {
        cb: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    },
    BufferBarrier {
        cb: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        buffer: vk::Buffer,
    },
    PushConstants {
        cb: vk::CommandBuffer,
        constants: PushConstants,
    },
    BindDescriptorSet {
        cb: vk::CommandBuffer,
        set: vk::DescriptorSet,
    },
    Dispatch {
        cb: vk::CommandBuffer,
        x: u32,
        y: u32,
        z: u32,
    },
}

impl Call {
    pub fn name(&self) -> &'static str {
        match self {
            Call::UpdateDescriptorSet { .. } => "update_descriptor_set",
            Call::CopyBufferToImage { .. } => "copy_buffer_to_image",
            Call::BindPipeline { .. } => "bind_pipeline",
            Call::ImageBarrier { .. } => "image_barrier",
            Call::BufferBarrier { .. } => "buffer_barrier",
            Call::PushConstants { .. } => "push_constants",
            Call::BindDescriptorSet { .. } => "bind_descriptor_set",
            Call::Dispatch { .. } => "dispatch",
        }
    }
}

#[derive(Default)]
struct State {
    next_handle: u64,
    calls: Vec<Call>,

    buffers: HashSet<vk::Buffer>,
    memory: HashSet<vk::DeviceMemory>,
    views: HashSet<vk::ImageView>,
    images: HashMap<vk::Image, vk::Format>,
    image_layouts: HashMap<vk::Image, vk::ImageLayout>,
    buffer_usage: HashMap<vk::Buffer, vk::BufferUsageFlags>,

    pools: HashMap<vk::DescriptorPool, u32>,
    sets: HashMap<vk::DescriptorSet, vk::DescriptorPool>,
    fences: HashMap<vk::Fence, bool>,
    submitted: Vec<(vk::Queue, Vec<vk::CommandBuffer>, vk::Fence)>,

    shader_modules: HashSet<vk::ShaderModule>,
    pipelines: HashSet<vk::Pipeline>,
    layouts: usize,

    destroyed_buffers: Vec<vk::Buffer>,
    freed_memory: Vec<vk::DeviceMemory>,
    destroyed_views: Vec<vk::ImageView>,
    freed_sets: Vec<vk::DescriptorSet>,
    double_frees: usize,
}

/// Test double for the next layer's device entry points.
pub struct RecordingBackend {
    state: Mutex<State>,
    /// Sets per newly created descriptor pool; `None` uses the requested count.
    pub pool_capacity: Mutex<Option<u32>>,
    /// Fail `vkCreateComputePipelines` when set.
    pub fail_pipelines: Mutex<bool>,
    /// Memory types buffers accept.
    pub memory_type_bits: Mutex<u32>,
}

impl RecordingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                next_handle: 0x1000,
                ..Default::default()
            }),
            pool_capacity: Mutex::new(None),
            fail_pipelines: Mutex::new(false),
            memory_type_bits: Mutex::new(u32::MAX),
        })
    }

    fn next<H: Handle>(&self) -> H {
        let mut state = self.state.lock();
        state.next_handle += 1;
        H::from_raw(state.next_handle)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn call_names(&self) -> Vec<&'static str> {
        self.state.lock().calls.iter().map(Call::name).collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn signal(&self, fence: vk::Fence) {
        self.state.lock().fences.insert(fence, true);
    }

    pub fn image_format(&self, image: vk::Image) -> Option<vk::Format> {
        self.state.lock().images.get(&image).copied()
    }

    /// Layout after every recorded command has executed.
    pub fn image_layout(&self, image: vk::Image) -> Option<vk::ImageLayout> {
        self.state.lock().image_layouts.get(&image).copied()
    }

    pub fn buffer_usage(&self, buffer: vk::Buffer) -> Option<vk::BufferUsageFlags> {
        self.state.lock().buffer_usage.get(&buffer).copied()
    }

    pub fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    pub fn live_views(&self) -> usize {
        self.state.lock().views.len()
    }

    pub fn live_sets(&self) -> usize {
        self.state.lock().sets.len()
    }

    pub fn live_memory(&self) -> usize {
        self.state.lock().memory.len()
    }

    pub fn live_pipelines(&self) -> usize {
        self.state.lock().pipelines.len()
    }

    pub fn live_shader_modules(&self) -> usize {
        self.state.lock().shader_modules.len()
    }

    pub fn pool_count(&self) -> usize {
        self.state.lock().pools.len()
    }

    pub fn destroyed_buffers(&self) -> Vec<vk::Buffer> {
        self.state.lock().destroyed_buffers.clone()
    }

    pub fn freed_sets(&self) -> usize {
        self.state.lock().freed_sets.len()
    }

    pub fn destroyed_views(&self) -> usize {
        self.state.lock().destroyed_views.len()
    }

    pub fn double_frees(&self) -> usize {
        self.state.lock().double_frees
    }

    pub fn submissions(&self) -> usize {
        self.state.lock().submitted.len()
    }
}

impl DeviceBackend for RecordingBackend {
    fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> VkResult<vk::Buffer> {
        let buffer = self.next();
        let mut state = self.state.lock();
        state.buffers.insert(buffer);
        state.buffer_usage.insert(buffer, info.usage);
        Ok(buffer)
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        let mut state = self.state.lock();
        if !state.buffers.remove(&buffer) {
            state.double_frees += 1;
        }
        state.destroyed_buffers.push(buffer);
    }

    fn bind_buffer_memory(&self, _: vk::Buffer, _: vk::DeviceMemory, _: vk::DeviceSize) -> VkResult<()> {
        Ok(())
    }

    fn get_buffer_memory_requirements(&self, _: vk::Buffer) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size: 1 << 16,
            alignment: 256,
            memory_type_bits: *self.memory_type_bits.lock(),
        }
    }

    fn allocate_memory(&self, _: vk::DeviceSize, _: u32) -> VkResult<vk::DeviceMemory> {
        let memory = self.next();
        self.state.lock().memory.insert(memory);
        Ok(memory)
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        let mut state = self.state.lock();
        if !state.memory.remove(&memory) {
            state.double_frees += 1;
        }
        state.freed_memory.push(memory);
    }

    fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image> {
        let image = self.next();
        let mut state = self.state.lock();
        state.images.insert(image, info.format);
        state.image_layouts.insert(image, info.initial_layout);
        Ok(image)
    }

    fn destroy_image(&self, image: vk::Image) {
        self.state.lock().images.remove(&image);
    }

    fn create_image_view(&self, _: &vk::ImageViewCreateInfo<'_>) -> VkResult<vk::ImageView> {
        let view = self.next();
        self.state.lock().views.insert(view);
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        let mut state = self.state.lock();
        if !state.views.remove(&view) {
            state.double_frees += 1;
        }
        state.destroyed_views.push(view);
    }

    fn allocate_command_buffers(&self, info: &vk::CommandBufferAllocateInfo<'_>) -> VkResult<Vec<vk::CommandBuffer>> {
        Ok((0..info.command_buffer_count).map(|_| self.next()).collect())
    }

    fn free_command_buffers(&self, _: vk::CommandPool, _: &[vk::CommandBuffer]) {}

    fn destroy_command_pool(&self, _: vk::CommandPool) {}

    fn begin_command_buffer(&self, _: vk::CommandBuffer, _: &vk::CommandBufferBeginInfo<'_>) -> VkResult<()> {
        Ok(())
    }

    fn reset_command_buffer(&self, _: vk::CommandBuffer, _: vk::CommandBufferResetFlags) -> VkResult<()> {
        Ok(())
    }

    fn get_device_queue(&self, _: u32, _: u32) -> vk::Queue {
        self.next()
    }

    fn queue_submit(&self, queue: vk::Queue, submits: &[vk::SubmitInfo<'_>], fence: vk::Fence) -> VkResult<()> {
        let cbs = submits
            .iter()
            .flat_map(|s| unsafe { std::slice::from_raw_parts(s.p_command_buffers, s.command_buffer_count as usize) })
            .copied()
            .collect();
        self.state.lock().submitted.push((queue, cbs, fence));
        Ok(())
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        Ok(())
    }

    fn create_fence(&self, info: &vk::FenceCreateInfo<'_>) -> VkResult<vk::Fence> {
        let fence = self.next();
        let signaled = info.flags.contains(vk::FenceCreateFlags::SIGNALED);
        self.state.lock().fences.insert(fence, signaled);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        self.state.lock().fences.remove(&fence);
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], wait_all: bool, _: u64) -> VkResult<()> {
        let state = self.state.lock();
        let signaled = |f: &vk::Fence| state.fences.get(f).copied().unwrap_or(false);
        let done = if wait_all {
            fences.iter().all(signaled)
        } else {
            fences.iter().any(signaled)
        };
        if done {
            Ok(())
        } else {
            Err(vk::Result::TIMEOUT)
        }
    }

    fn get_fence_status(&self, fence: vk::Fence) -> VkResult<bool> {
        Ok(self.state.lock().fences.get(&fence).copied().unwrap_or(false))
    }

    fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule> {
        assert_eq!(code.first(), Some(&SPIRV_MAGIC));
        let module = self.next();
        self.state.lock().shader_modules.insert(module);
        Ok(module)
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.state.lock().shader_modules.remove(&module);
    }

    fn create_descriptor_set_layout(
        &self,
        _: &[vk::DescriptorSetLayoutBinding<'_>],
    ) -> VkResult<vk::DescriptorSetLayout> {
        self.state.lock().layouts += 1;
        Ok(self.next())
    }

    fn destroy_descriptor_set_layout(&self, _: vk::DescriptorSetLayout) {
        self.state.lock().layouts -= 1;
    }

    fn create_pipeline_layout(&self, _: vk::DescriptorSetLayout, push: vk::PushConstantRange) -> VkResult<vk::PipelineLayout> {
        assert_eq!(push.size as usize, std::mem::size_of::<PushConstants>());
        self.state.lock().layouts += 1;
        Ok(self.next())
    }

    fn destroy_pipeline_layout(&self, _: vk::PipelineLayout) {
        self.state.lock().layouts -= 1;
    }

    fn create_compute_pipeline(&self, _: vk::PipelineLayout, _: vk::ShaderModule) -> VkResult<vk::Pipeline> {
        if *self.fail_pipelines.lock() {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        let pipeline = self.next();
        self.state.lock().pipelines.insert(pipeline);
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.state.lock().pipelines.remove(&pipeline);
    }

    fn create_descriptor_pool(&self, max_sets: u32, _: &[vk::DescriptorPoolSize]) -> VkResult<vk::DescriptorPool> {
        let capacity = self.pool_capacity.lock().unwrap_or(max_sets);
        let pool = self.next();
        self.state.lock().pools.insert(pool, capacity);
        Ok(pool)
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        let mut state = self.state.lock();
        state.pools.remove(&pool);
        state.sets.retain(|_, p| *p != pool);
    }

    fn allocate_descriptor_set(&self, pool: vk::DescriptorPool, _: vk::DescriptorSetLayout) -> VkResult<vk::DescriptorSet> {
        let set = self.next();
        let mut state = self.state.lock();
        let remaining = state.pools.get_mut(&pool).ok_or(vk::Result::ERROR_UNKNOWN)?;
        if *remaining == 0 {
            return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
        }
        *remaining -= 1;
        state.sets.insert(set, pool);
        Ok(set)
    }

    fn free_descriptor_set(&self, pool: vk::DescriptorPool, set: vk::DescriptorSet) {
        let mut state = self.state.lock();
        if state.sets.remove(&set).is_none() {
            state.double_frees += 1;
        } else if let Some(remaining) = state.pools.get_mut(&pool) {
            *remaining += 1;
        }
        state.freed_sets.push(set);
    }

    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
        self.state.lock().calls.push(Call::UpdateDescriptorSet {
            set,
            writes: writes.to_vec(),
        });
    }

    fn cmd_copy_buffer_to_image(
        &self,
        cb: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        let mut state = self.state.lock();
        state.image_layouts.insert(dst, layout);
        state.calls.push(Call::CopyBufferToImage {
            cb,
            src,
            dst,
            layout,
            regions: regions.iter().map(CopyRegion::from).collect(),
        });
    }

    fn cmd_bind_pipeline(&self, cb: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.state.lock().calls.push(Call::BindPipeline { cb, pipeline });
    }

    fn cmd_bind_descriptor_set(&self, cb: vk::CommandBuffer, _: vk::PipelineLayout, set: vk::DescriptorSet) {
        self.state.lock().calls.push(Call::BindDescriptorSet { cb, set });
    }

    fn cmd_push_constants(&self, cb: vk::CommandBuffer, _: vk::PipelineLayout, data: &[u8]) {
        let constants = *bytemuck::from_bytes::<PushConstants>(data);
        self.state.lock().calls.push(Call::PushConstants { cb, constants });
    }

    fn cmd_dispatch(&self, cb: vk::CommandBuffer, x: u32, y: u32, z: u32) {
        self.state.lock().calls.push(Call::Dispatch { cb, x, y, z });
    }

    fn cmd_pipeline_barrier(
        &self,
        cb: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        buffer_barriers: &[vk::BufferMemoryBarrier<'_>],
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        let mut state = self.state.lock();
        for b in buffer_barriers {
            state.calls.push(Call::BufferBarrier {
                cb,
                src_stage,
                dst_stage,
                buffer: b.buffer,
            });
        }
        for b in image_barriers {
            state.image_layouts.insert(b.image, b.new_layout);
            state.calls.push(Call::ImageBarrier {
                cb,
                src_stage,
                dst_stage,
                image: b.image,
                old_layout: b.old_layout,
                new_layout: b.new_layout,
            });
        }
    }
}

/// Kernel source producing a minimal valid header for every blob.
pub struct FakeKernels;

impl KernelSource for FakeKernels {
    fn load(&self, family: FormatFamily, variant: KernelVariant) -> Result<Vec<u32>, LayerError> {
        let tag = family as u32 * 2 + (variant == KernelVariant::Image) as u32;
        Ok(vec![SPIRV_MAGIC, 0x0001_0000, 0, tag, 0])
    }
}

/// Kernel source that is missing one family.
pub struct MissingKernel(pub FormatFamily);

impl KernelSource for MissingKernel {
    fn load(&self, family: FormatFamily, variant: KernelVariant) -> Result<Vec<u32>, LayerError> {
        if family == self.0 {
            return Err(LayerError::Kernel {
                family,
                reason: "not found".to_string(),
            });
        }
        FakeKernels.load(family, variant)
    }
}

pub struct Harness {
    pub backend: Arc<RecordingBackend>,
    pub registry: Arc<Registry>,
    pub device: DecodeDevice,
}

pub const DEVICE: u64 = 0xd1;

pub fn settings(path: DecodePath) -> DeviceSettings {
    DeviceSettings {
        decode_path: path,
        storage_image_supported: true,
        host_visible_memory: Some(2),
        compute_queue: None,
    }
}

pub fn harness(path: DecodePath) -> Harness {
    harness_with(settings(path))
}

pub fn harness_with(settings: DeviceSettings) -> Harness {
    let backend = RecordingBackend::new();
    let registry = Arc::new(Registry::new());
    let device = DecodeDevice::new(
        vk::Device::from_raw(DEVICE),
        backend.clone(),
        registry.clone(),
        settings,
        &FakeKernels,
    )
    .expect("device");
    Harness {
        backend,
        registry,
        device,
    }
}

impl Harness {
    pub fn image(&self, format: vk::Format, width: u32, height: u32) -> vk::Image {
        let info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D { width, height, depth: 1 })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        self.device.create_image(&info).expect("image")
    }

    pub fn upload_buffer(&self, size: vk::DeviceSize) -> vk::Buffer {
        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(vk::BufferUsageFlags::TRANSFER_SRC);
        self.device.create_buffer(&info).expect("buffer")
    }

    /// A command buffer begun for a single upload submission.
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.begun_command_buffer(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
    }

    /// A command buffer that may be submitted more than once.
    pub fn reusable_command_buffer(&self) -> vk::CommandBuffer {
        self.begun_command_buffer(vk::CommandBufferUsageFlags::empty())
    }

    fn begun_command_buffer(&self, flags: vk::CommandBufferUsageFlags) -> vk::CommandBuffer {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(vk::CommandPool::from_raw(0xc0))
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let cb = self.device.allocate_command_buffers(&info).expect("command buffer")[0];
        self.device
            .begin_command_buffer(cb, &vk::CommandBufferBeginInfo::default().flags(flags))
            .expect("begin");
        cb
    }

    pub fn fence(&self) -> vk::Fence {
        self.device
            .create_fence(&vk::FenceCreateInfo::default())
            .expect("fence")
    }

    pub fn queue(&self) -> vk::Queue {
        self.device.get_device_queue(0, 0)
    }

    pub fn submit(&self, cb: vk::CommandBuffer, fence: vk::Fence) {
        let cbs = [cb];
        let submit = vk::SubmitInfo::default().command_buffers(&cbs);
        self.device
            .queue_submit(self.queue(), &[submit], fence)
            .expect("submit");
    }

    /// Record one full-image copy of a `width` x `height` region.
    pub fn copy(&self, cb: vk::CommandBuffer, src: vk::Buffer, dst: vk::Image, width: u32, height: u32) {
        self.device.cmd_copy_buffer_to_image(
            cb,
            src,
            dst,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region(width, height)],
        );
    }
}

pub fn region(width: u32, height: u32) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D::default(),
        image_extent: vk::Extent3D { width, height, depth: 1 },
    }
}
