//! Buffer creation and memory binding.

use ash::vk;

use crate::device::layer_device;

pub unsafe extern "system" fn vkCreateBuffer(
    device: vk::Device,
    p_create_info: *const vk::BufferCreateInfo<'_>,
    _p_allocator: *const vk::AllocationCallbacks<'_>,
    p_buffer: *mut vk::Buffer,
) -> vk::Result {
    if p_create_info.is_null() || p_buffer.is_null() {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }
    let Some(layer) = layer_device(device) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    match layer.engine.create_buffer(&*p_create_info) {
        Ok(buffer) => {
            *p_buffer = buffer;
            vk::Result::SUCCESS
        }
        Err(e) => e,
    }
}

pub unsafe extern "system" fn vkDestroyBuffer(
    device: vk::Device,
    buffer: vk::Buffer,
    _p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    if buffer == vk::Buffer::null() {
        return;
    }
    if let Some(layer) = layer_device(device) {
        layer.engine.destroy_buffer(buffer);
    }
}

pub unsafe extern "system" fn vkBindBufferMemory(
    device: vk::Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    memory_offset: vk::DeviceSize,
) -> vk::Result {
    let Some(layer) = layer_device(device) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    match layer.engine.bind_buffer_memory(buffer, memory, memory_offset) {
        Ok(()) => vk::Result::SUCCESS,
        Err(e) => e,
    }
}
