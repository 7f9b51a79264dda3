//! Queue submission and fences. Waiting on or polling a fence is what
//! releases the decode resources it guards.

use ash::vk;

use crate::device::layer_device;

// ── Queue ───────────────────────────────────────────────────

pub unsafe extern "system" fn vkQueueSubmit(
    queue: vk::Queue,
    submit_count: u32,
    p_submits: *const vk::SubmitInfo<'_>,
    fence: vk::Fence,
) -> vk::Result {
    let Some(layer) = layer_device(queue) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    let submits = if p_submits.is_null() {
        &[][..]
    } else {
        std::slice::from_raw_parts(p_submits, submit_count as usize)
    };
    match layer.engine.queue_submit(queue, submits, fence) {
        Ok(()) => vk::Result::SUCCESS,
        Err(e) => e,
    }
}

// ── Fence ───────────────────────────────────────────────────

pub unsafe extern "system" fn vkCreateFence(
    device: vk::Device,
    p_create_info: *const vk::FenceCreateInfo<'_>,
    _p_allocator: *const vk::AllocationCallbacks<'_>,
    p_fence: *mut vk::Fence,
) -> vk::Result {
    if p_create_info.is_null() || p_fence.is_null() {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }
    let Some(layer) = layer_device(device) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    match layer.engine.create_fence(&*p_create_info) {
        Ok(fence) => {
            *p_fence = fence;
            vk::Result::SUCCESS
        }
        Err(e) => e,
    }
}

pub unsafe extern "system" fn vkDestroyFence(
    device: vk::Device,
    fence: vk::Fence,
    _p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    if fence == vk::Fence::null() {
        return;
    }
    if let Some(layer) = layer_device(device) {
        layer.engine.destroy_fence(fence);
    }
}

pub unsafe extern "system" fn vkWaitForFences(
    device: vk::Device,
    fence_count: u32,
    p_fences: *const vk::Fence,
    wait_all: vk::Bool32,
    timeout: u64,
) -> vk::Result {
    let Some(layer) = layer_device(device) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    let fences = if p_fences.is_null() {
        &[][..]
    } else {
        std::slice::from_raw_parts(p_fences, fence_count as usize)
    };
    match layer.engine.wait_for_fences(fences, wait_all != vk::FALSE, timeout) {
        Ok(()) => vk::Result::SUCCESS,
        Err(e) => e,
    }
}

pub unsafe extern "system" fn vkGetFenceStatus(device: vk::Device, fence: vk::Fence) -> vk::Result {
    let Some(layer) = layer_device(device) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    match layer.engine.get_fence_status(fence) {
        Ok(true) => vk::Result::SUCCESS,
        Ok(false) => vk::Result::NOT_READY,
        Err(e) => e,
    }
}
