//! Command pool and command buffer functions, including the intercepted copy.

use ash::vk;

use crate::device::layer_device;

pub unsafe extern "system" fn vkAllocateCommandBuffers(
    device: vk::Device,
    p_allocate_info: *const vk::CommandBufferAllocateInfo<'_>,
    p_command_buffers: *mut vk::CommandBuffer,
) -> vk::Result {
    if p_allocate_info.is_null() || p_command_buffers.is_null() {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }
    let Some(layer) = layer_device(device) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    match layer.engine.allocate_command_buffers(&*p_allocate_info) {
        Ok(buffers) => {
            std::ptr::copy_nonoverlapping(buffers.as_ptr(), p_command_buffers, buffers.len());
            vk::Result::SUCCESS
        }
        Err(e) => e,
    }
}

pub unsafe extern "system" fn vkFreeCommandBuffers(
    device: vk::Device,
    command_pool: vk::CommandPool,
    command_buffer_count: u32,
    p_command_buffers: *const vk::CommandBuffer,
) {
    if p_command_buffers.is_null() || command_buffer_count == 0 {
        return;
    }
    let Some(layer) = layer_device(device) else {
        return;
    };
    let buffers = std::slice::from_raw_parts(p_command_buffers, command_buffer_count as usize);
    layer.engine.free_command_buffers(command_pool, buffers);
}

pub unsafe extern "system" fn vkDestroyCommandPool(
    device: vk::Device,
    command_pool: vk::CommandPool,
    _p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    if command_pool == vk::CommandPool::null() {
        return;
    }
    if let Some(layer) = layer_device(device) {
        layer.engine.destroy_command_pool(command_pool);
    }
}

pub unsafe extern "system" fn vkBeginCommandBuffer(
    command_buffer: vk::CommandBuffer,
    p_begin_info: *const vk::CommandBufferBeginInfo<'_>,
) -> vk::Result {
    if p_begin_info.is_null() {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }
    let Some(layer) = layer_device(command_buffer) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    match layer.engine.begin_command_buffer(command_buffer, &*p_begin_info) {
        Ok(()) => vk::Result::SUCCESS,
        Err(e) => e,
    }
}

pub unsafe extern "system" fn vkResetCommandBuffer(
    command_buffer: vk::CommandBuffer,
    flags: vk::CommandBufferResetFlags,
) -> vk::Result {
    let Some(layer) = layer_device(command_buffer) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    match layer.engine.reset_command_buffer(command_buffer, flags) {
        Ok(()) => vk::Result::SUCCESS,
        Err(e) => e,
    }
}

pub unsafe extern "system" fn vkCmdCopyBufferToImage(
    command_buffer: vk::CommandBuffer,
    src_buffer: vk::Buffer,
    dst_image: vk::Image,
    dst_image_layout: vk::ImageLayout,
    region_count: u32,
    p_regions: *const vk::BufferImageCopy,
) {
    let Some(layer) = layer_device(command_buffer) else {
        return;
    };
    let regions = if p_regions.is_null() {
        &[][..]
    } else {
        std::slice::from_raw_parts(p_regions, region_count as usize)
    };
    layer
        .engine
        .cmd_copy_buffer_to_image(command_buffer, src_buffer, dst_image, dst_image_layout, regions);
}
