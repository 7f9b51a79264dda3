//! Instance creation, destruction and physical device enumeration.

use std::ffi::c_void;

use ash::vk::{self, Handle};
use bcn_core::LayerConfig;
use tracing::{debug, error, info};

use crate::dispatch::{self, dispatch_key};
use crate::handle_store::{self, LayerInstance, PhysicalDeviceInfo};

pub unsafe extern "system" fn vkCreateInstance(
    p_create_info: *const vk::InstanceCreateInfo<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_instance: *mut vk::Instance,
) -> vk::Result {
    if p_create_info.is_null() || p_instance.is_null() {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }

    let config = LayerConfig::from_env();
    bcn_common::logging::init_logging(config.log_filter.as_deref());

    let ci = &*p_create_info;
    let Some(next_gipa) = dispatch::take_instance_link(ci) else {
        error!("vkCreateInstance: no loader link info in pNext chain");
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let Some(create_instance) = dispatch::instance_proc::<vk::PFN_vkCreateInstance>(
        next_gipa,
        vk::Instance::null(),
        c"vkCreateInstance",
    ) else {
        error!("vkCreateInstance: next layer does not provide vkCreateInstance");
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };

    let result = create_instance(p_create_info, p_allocator, p_instance);
    if result != vk::Result::SUCCESS {
        error!("vkCreateInstance failed: {:?}", result);
        return result;
    }

    let instance = *p_instance;
    let fns = ash::Instance::load_with(
        |name| next_gipa(instance, name.as_ptr()).map_or(std::ptr::null(), |f| f as *const c_void),
        instance,
    );
    handle_store::store_instance(
        dispatch_key(instance),
        LayerInstance {
            handle: instance,
            fns,
            next_gipa,
        },
    );
    info!("BCn decode layer active on instance {:?}", instance);
    vk::Result::SUCCESS
}

pub unsafe extern "system" fn vkDestroyInstance(
    instance: vk::Instance,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    if instance == vk::Instance::null() {
        return;
    }
    let key = dispatch_key(instance);
    if let Some(layer) = handle_store::remove_instance(key) {
        handle_store::forget_physical_devices(key);
        (layer.fns.fp_v1_0().destroy_instance)(instance, p_allocator);
        debug!("instance {:?} destroyed", instance);
    }
}

pub unsafe extern "system" fn vkEnumeratePhysicalDevices(
    instance: vk::Instance,
    p_physical_device_count: *mut u32,
    p_physical_devices: *mut vk::PhysicalDevice,
) -> vk::Result {
    let key = dispatch_key(instance);
    let Some(layer) = handle_store::get_instance(key) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };

    let result = (layer.fns.fp_v1_0().enumerate_physical_devices)(instance, p_physical_device_count, p_physical_devices);
    if (result != vk::Result::SUCCESS && result != vk::Result::INCOMPLETE) || p_physical_devices.is_null() {
        return result;
    }

    let devices = std::slice::from_raw_parts(p_physical_devices, *p_physical_device_count as usize);
    for &physical_device in devices {
        let native_features = layer.fns.get_physical_device_features(physical_device);
        let limits = layer.fns.get_physical_device_properties(physical_device).limits;
        debug!(
            "physical device {:?}: native BC support = {}",
            physical_device, native_features.texture_compression_bc
        );
        handle_store::store_physical_device(
            physical_device.as_raw(),
            PhysicalDeviceInfo {
                instance: key,
                native_features,
                limits,
            },
        );
    }
    result
}
