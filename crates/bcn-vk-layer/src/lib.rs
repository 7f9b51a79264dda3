//! BCn decode Vulkan layer
//!
//! This cdylib is an implicit/explicit Vulkan layer that makes BC1-BC7
//! compressed textures usable on GPUs without native support. Compressed
//! images are created with an uncompressed format and every upload into them
//! is replaced by a compute decode recorded into the application's own
//! command buffer.
//!
//! Only the three loader entry points are exported; every hook is handed out
//! through `vkGetInstanceProcAddr` / `vkGetDeviceProcAddr`.

#![allow(non_snake_case)]

use std::ffi::{c_char, CStr};

use ash::vk;

pub mod backend;
pub mod command;
pub mod device;
pub mod dispatch;
pub mod handle_store;
pub mod image;
pub mod instance;
pub mod memory;
pub mod physical_device;
pub mod sync;

use dispatch::{dispatch_key, NegotiateLayerInterface};

macro_rules! hook {
    ($f:path) => {
        Some(std::mem::transmute::<*const (), unsafe extern "system" fn()>($f as *const ()))
    };
}

// ── Loader negotiation ──────────────────────────────────────

/// Negotiate the loader-layer interface version.
#[no_mangle]
pub unsafe extern "system" fn vkNegotiateLoaderLayerInterfaceVersion(
    p_version_struct: *mut NegotiateLayerInterface,
) -> vk::Result {
    if p_version_struct.is_null() || (*p_version_struct).s_type != dispatch::LAYER_NEGOTIATE_INTERFACE_STRUCT {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }
    let negotiate = &mut *p_version_struct;
    negotiate.loader_layer_interface_version = negotiate
        .loader_layer_interface_version
        .min(dispatch::LAYER_INTERFACE_VERSION);
    negotiate.pfn_get_instance_proc_addr = Some(vkGetInstanceProcAddr);
    negotiate.pfn_get_device_proc_addr = Some(vkGetDeviceProcAddr);
    negotiate.pfn_get_physical_device_proc_addr = std::ptr::null();
    vk::Result::SUCCESS
}

// ── Proc address lookup ─────────────────────────────────────

unsafe fn instance_hook(name: &str) -> vk::PFN_vkVoidFunction {
    match name {
        "vkGetInstanceProcAddr" => hook!(vkGetInstanceProcAddr),
        "vkCreateInstance" => hook!(instance::vkCreateInstance),
        "vkDestroyInstance" => hook!(instance::vkDestroyInstance),
        "vkEnumeratePhysicalDevices" => hook!(instance::vkEnumeratePhysicalDevices),
        "vkCreateDevice" => hook!(device::vkCreateDevice),

        // ── Physical device ─────────────────────────────────
        "vkGetPhysicalDeviceFeatures" => hook!(physical_device::vkGetPhysicalDeviceFeatures),
        "vkGetPhysicalDeviceFeatures2" => hook!(physical_device::vkGetPhysicalDeviceFeatures2),
        "vkGetPhysicalDeviceFeatures2KHR" => hook!(physical_device::vkGetPhysicalDeviceFeatures2KHR),
        "vkGetPhysicalDeviceFormatProperties" => hook!(physical_device::vkGetPhysicalDeviceFormatProperties),
        "vkGetPhysicalDeviceFormatProperties2" => hook!(physical_device::vkGetPhysicalDeviceFormatProperties2),
        "vkGetPhysicalDeviceFormatProperties2KHR" => {
            hook!(physical_device::vkGetPhysicalDeviceFormatProperties2KHR)
        }
        "vkGetPhysicalDeviceImageFormatProperties" => {
            hook!(physical_device::vkGetPhysicalDeviceImageFormatProperties)
        }
        "vkGetPhysicalDeviceImageFormatProperties2" => {
            hook!(physical_device::vkGetPhysicalDeviceImageFormatProperties2)
        }
        "vkGetPhysicalDeviceImageFormatProperties2KHR" => {
            hook!(physical_device::vkGetPhysicalDeviceImageFormatProperties2KHR)
        }
        _ => None,
    }
}

unsafe fn device_hook(name: &str) -> vk::PFN_vkVoidFunction {
    match name {
        "vkGetDeviceProcAddr" => hook!(vkGetDeviceProcAddr),
        "vkDestroyDevice" => hook!(device::vkDestroyDevice),
        "vkGetDeviceQueue" => hook!(device::vkGetDeviceQueue),

        // ── Resources ───────────────────────────────────────
        "vkCreateBuffer" => hook!(memory::vkCreateBuffer),
        "vkDestroyBuffer" => hook!(memory::vkDestroyBuffer),
        "vkBindBufferMemory" => hook!(memory::vkBindBufferMemory),
        "vkCreateImage" => hook!(image::vkCreateImage),
        "vkDestroyImage" => hook!(image::vkDestroyImage),
        "vkCreateImageView" => hook!(image::vkCreateImageView),
        "vkDestroyImageView" => hook!(image::vkDestroyImageView),

        // ── Commands ────────────────────────────────────────
        "vkAllocateCommandBuffers" => hook!(command::vkAllocateCommandBuffers),
        "vkFreeCommandBuffers" => hook!(command::vkFreeCommandBuffers),
        "vkDestroyCommandPool" => hook!(command::vkDestroyCommandPool),
        "vkBeginCommandBuffer" => hook!(command::vkBeginCommandBuffer),
        "vkResetCommandBuffer" => hook!(command::vkResetCommandBuffer),
        "vkCmdCopyBufferToImage" => hook!(command::vkCmdCopyBufferToImage),

        // ── Sync ────────────────────────────────────────────
        "vkQueueSubmit" => hook!(sync::vkQueueSubmit),
        "vkCreateFence" => hook!(sync::vkCreateFence),
        "vkDestroyFence" => hook!(sync::vkDestroyFence),
        "vkWaitForFences" => hook!(sync::vkWaitForFences),
        "vkGetFenceStatus" => hook!(sync::vkGetFenceStatus),
        _ => None,
    }
}

/// Returns the layer's hook for `p_name`, or the next layer's function.
#[no_mangle]
pub unsafe extern "system" fn vkGetInstanceProcAddr(
    instance: vk::Instance,
    p_name: *const c_char,
) -> vk::PFN_vkVoidFunction {
    if p_name.is_null() {
        return None;
    }
    let name = CStr::from_ptr(p_name).to_str().ok()?;
    if let Some(f) = instance_hook(name).or_else(|| device_hook(name)) {
        return Some(f);
    }
    if instance == vk::Instance::null() {
        return None;
    }
    let layer = handle_store::get_instance(dispatch_key(instance))?;
    (layer.next_gipa)(instance, p_name)
}

/// Returns the layer's device-level hook for `p_name`, or the next layer's function.
#[no_mangle]
pub unsafe extern "system" fn vkGetDeviceProcAddr(
    device: vk::Device,
    p_name: *const c_char,
) -> vk::PFN_vkVoidFunction {
    if p_name.is_null() || device == vk::Device::null() {
        return None;
    }
    let name = CStr::from_ptr(p_name).to_str().ok()?;
    if let Some(f) = device_hook(name) {
        return Some(f);
    }
    let layer = device::layer_device(device)?;
    (layer.next_gdpa)(device, p_name)
}
