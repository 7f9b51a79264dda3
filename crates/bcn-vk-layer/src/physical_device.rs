//! Physical device queries, patched so compressed formats look native.

use std::ffi::CStr;
use std::sync::Arc;

use ash::vk;
use bcn_core::{capabilities, format};

use crate::dispatch::{self, dispatch_key};
use crate::handle_store::{self, LayerInstance};

unsafe fn layer_instance(physical_device: vk::PhysicalDevice) -> Option<Arc<LayerInstance>> {
    handle_store::get_instance(dispatch_key(physical_device))
}

unsafe fn next_proc<F: Copy>(layer: &LayerInstance, name: &CStr) -> Option<F> {
    dispatch::instance_proc(layer.next_gipa, layer.handle, name)
}

// ── Features ────────────────────────────────────────────────

pub unsafe extern "system" fn vkGetPhysicalDeviceFeatures(
    physical_device: vk::PhysicalDevice,
    p_features: *mut vk::PhysicalDeviceFeatures,
) {
    let Some(layer) = layer_instance(physical_device) else {
        return;
    };
    (layer.fns.fp_v1_0().get_physical_device_features)(physical_device, p_features);
    if !p_features.is_null() {
        (*p_features).texture_compression_bc = vk::TRUE;
    }
}

unsafe fn features2(physical_device: vk::PhysicalDevice, p_features: *mut vk::PhysicalDeviceFeatures2<'_>, name: &CStr) {
    let Some(layer) = layer_instance(physical_device) else {
        return;
    };
    let Some(next) = next_proc::<vk::PFN_vkGetPhysicalDeviceFeatures2>(&layer, name) else {
        return;
    };
    next(physical_device, p_features);
    if !p_features.is_null() {
        (*p_features).features.texture_compression_bc = vk::TRUE;
    }
}

pub unsafe extern "system" fn vkGetPhysicalDeviceFeatures2(
    physical_device: vk::PhysicalDevice,
    p_features: *mut vk::PhysicalDeviceFeatures2<'_>,
) {
    features2(physical_device, p_features, c"vkGetPhysicalDeviceFeatures2");
}

pub unsafe extern "system" fn vkGetPhysicalDeviceFeatures2KHR(
    physical_device: vk::PhysicalDevice,
    p_features: *mut vk::PhysicalDeviceFeatures2<'_>,
) {
    features2(physical_device, p_features, c"vkGetPhysicalDeviceFeatures2KHR");
}

// ── Format properties ───────────────────────────────────────

pub unsafe extern "system" fn vkGetPhysicalDeviceFormatProperties(
    physical_device: vk::PhysicalDevice,
    format: vk::Format,
    p_format_properties: *mut vk::FormatProperties,
) {
    let Some(layer) = layer_instance(physical_device) else {
        return;
    };
    (layer.fns.fp_v1_0().get_physical_device_format_properties)(physical_device, format, p_format_properties);
    if !p_format_properties.is_null() {
        capabilities::apply_format_features(format, &mut *p_format_properties);
    }
}

unsafe fn format_properties2(
    physical_device: vk::PhysicalDevice,
    format: vk::Format,
    p_format_properties: *mut vk::FormatProperties2<'_>,
    name: &CStr,
) {
    let Some(layer) = layer_instance(physical_device) else {
        return;
    };
    let Some(next) = next_proc::<vk::PFN_vkGetPhysicalDeviceFormatProperties2>(&layer, name) else {
        return;
    };
    next(physical_device, format, p_format_properties);
    if !p_format_properties.is_null() {
        capabilities::apply_format_features(format, &mut (*p_format_properties).format_properties);
    }
}

pub unsafe extern "system" fn vkGetPhysicalDeviceFormatProperties2(
    physical_device: vk::PhysicalDevice,
    format: vk::Format,
    p_format_properties: *mut vk::FormatProperties2<'_>,
) {
    format_properties2(physical_device, format, p_format_properties, c"vkGetPhysicalDeviceFormatProperties2");
}

pub unsafe extern "system" fn vkGetPhysicalDeviceFormatProperties2KHR(
    physical_device: vk::PhysicalDevice,
    format: vk::Format,
    p_format_properties: *mut vk::FormatProperties2<'_>,
) {
    format_properties2(physical_device, format, p_format_properties, c"vkGetPhysicalDeviceFormatProperties2KHR");
}

// ── Image format properties ─────────────────────────────────

unsafe fn device_limits(layer: &LayerInstance, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceLimits {
    match handle_store::physical_device_info(physical_device) {
        Some(info) => info.limits,
        None => layer.fns.get_physical_device_properties(physical_device).limits,
    }
}

pub unsafe extern "system" fn vkGetPhysicalDeviceImageFormatProperties(
    physical_device: vk::PhysicalDevice,
    format: vk::Format,
    image_type: vk::ImageType,
    tiling: vk::ImageTiling,
    usage: vk::ImageUsageFlags,
    flags: vk::ImageCreateFlags,
    p_image_format_properties: *mut vk::ImageFormatProperties,
) -> vk::Result {
    let Some(layer) = layer_instance(physical_device) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    if !format::is_supported(format) || p_image_format_properties.is_null() {
        return (layer.fns.fp_v1_0().get_physical_device_image_format_properties)(
            physical_device,
            format,
            image_type,
            tiling,
            usage,
            flags,
            p_image_format_properties,
        );
    }
    let limits = device_limits(&layer, physical_device);
    *p_image_format_properties = capabilities::compressed_image_format_properties(&limits, image_type, tiling, flags);
    vk::Result::SUCCESS
}

unsafe fn image_format_properties2(
    physical_device: vk::PhysicalDevice,
    p_info: *const vk::PhysicalDeviceImageFormatInfo2<'_>,
    p_properties: *mut vk::ImageFormatProperties2<'_>,
    name: &CStr,
) -> vk::Result {
    let Some(layer) = layer_instance(physical_device) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    if !p_info.is_null() && !p_properties.is_null() && format::is_supported((*p_info).format) {
        let info = &*p_info;
        let limits = device_limits(&layer, physical_device);
        (*p_properties).image_format_properties =
            capabilities::compressed_image_format_properties(&limits, info.ty, info.tiling, info.flags);
        return vk::Result::SUCCESS;
    }
    match next_proc::<vk::PFN_vkGetPhysicalDeviceImageFormatProperties2>(&layer, name) {
        Some(next) => next(physical_device, p_info, p_properties),
        None => vk::Result::ERROR_FORMAT_NOT_SUPPORTED,
    }
}

pub unsafe extern "system" fn vkGetPhysicalDeviceImageFormatProperties2(
    physical_device: vk::PhysicalDevice,
    p_info: *const vk::PhysicalDeviceImageFormatInfo2<'_>,
    p_properties: *mut vk::ImageFormatProperties2<'_>,
) -> vk::Result {
    image_format_properties2(physical_device, p_info, p_properties, c"vkGetPhysicalDeviceImageFormatProperties2")
}

pub unsafe extern "system" fn vkGetPhysicalDeviceImageFormatProperties2KHR(
    physical_device: vk::PhysicalDevice,
    p_info: *const vk::PhysicalDeviceImageFormatInfo2<'_>,
    p_properties: *mut vk::ImageFormatProperties2<'_>,
) -> vk::Result {
    image_format_properties2(physical_device, p_info, p_properties, c"vkGetPhysicalDeviceImageFormatProperties2KHR")
}
