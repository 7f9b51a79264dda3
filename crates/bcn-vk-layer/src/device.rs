//! Device creation and destruction.

use std::ffi::c_void;
use std::sync::Arc;

use ash::vk::{self, Handle};
use bcn_core::kernels::SpirvDirectory;
use bcn_core::{format, DecodeDevice, DeviceSettings, LayerConfig};
use tracing::{debug, error, info, warn};

use crate::backend::AshBackend;
use crate::dispatch::{self, dispatch_key};
use crate::handle_store::{self, LayerDevice, LayerInstance};

/// Layer state of the device owning `handle` (a device, queue or command buffer).
///
/// # Safety
/// `handle` must be a valid dispatchable handle.
pub unsafe fn layer_device<H: Handle>(handle: H) -> Option<Arc<LayerDevice>> {
    handle_store::get_device(dispatch_key(handle))
}

pub unsafe extern "system" fn vkCreateDevice(
    physical_device: vk::PhysicalDevice,
    p_create_info: *const vk::DeviceCreateInfo<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_device: *mut vk::Device,
) -> vk::Result {
    if p_create_info.is_null() || p_device.is_null() {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }
    let Some(instance) = handle_store::get_instance(dispatch_key(physical_device)) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let ci = &*p_create_info;
    let Some((next_gipa, next_gdpa)) = dispatch::take_device_link(ci) else {
        error!("vkCreateDevice: no loader link info in pNext chain");
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let Some(create_device) =
        dispatch::instance_proc::<vk::PFN_vkCreateDevice>(next_gipa, instance.handle, c"vkCreateDevice")
    else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };

    // Only ask the driver for BC sampling if it really has it.
    let native = match handle_store::physical_device_info(physical_device) {
        Some(info) => info.native_features,
        None => instance.fns.get_physical_device_features(physical_device),
    };
    let mut patched = *ci;
    let mut features = vk::PhysicalDeviceFeatures::default();
    if !ci.p_enabled_features.is_null() {
        features = *ci.p_enabled_features;
        features.texture_compression_bc &= native.texture_compression_bc;
        patched.p_enabled_features = &features;
    }

    let result = create_device(physical_device, &patched, p_allocator, p_device);
    if result != vk::Result::SUCCESS {
        error!("vkCreateDevice failed: {:?}", result);
        return result;
    }
    let device = *p_device;
    let fns = ash::Device::load_with(
        |name| next_gdpa(device, name.as_ptr()).map_or(std::ptr::null(), |f| f as *const c_void),
        device,
    );
    let backend = Arc::new(AshBackend::new(fns));

    let config = LayerConfig::from_env();
    let settings = DeviceSettings {
        decode_path: config.decode_path,
        storage_image_supported: storage_image_supported(&instance, physical_device),
        host_visible_memory: host_visible_memory(&instance, physical_device),
        compute_queue: compute_queue(&instance, physical_device, ci, &backend),
    };
    debug!("device {:?} settings: {:?}", device, settings);

    let kernels = SpirvDirectory::new(&config.shader_dir);
    let engine = match DecodeDevice::new(device, backend.clone(), handle_store::registry(), settings, &kernels) {
        Ok(engine) => engine,
        Err(e) => {
            error!("BCn decode setup failed on {:?}: {}", device, e);
            backend.raw().destroy_device(p_allocator.as_ref());
            *p_device = vk::Device::null();
            return e.as_vk_result();
        }
    };

    handle_store::store_device(
        dispatch_key(device),
        LayerDevice {
            handle: device,
            physical_device,
            backend,
            engine,
            next_gdpa,
        },
    );
    info!("device {:?} created", device);
    vk::Result::SUCCESS
}

pub unsafe extern "system" fn vkDestroyDevice(device: vk::Device, p_allocator: *const vk::AllocationCallbacks<'_>) {
    if device == vk::Device::null() {
        return;
    }
    let Some(layer) = handle_store::remove_device(dispatch_key(device)) else {
        return;
    };
    layer.engine.destroy();
    layer.backend.raw().destroy_device(p_allocator.as_ref());
    debug!("device {:?} destroyed", device);
}

pub unsafe extern "system" fn vkGetDeviceQueue(
    device: vk::Device,
    queue_family_index: u32,
    queue_index: u32,
    p_queue: *mut vk::Queue,
) {
    let Some(layer) = layer_device(device) else {
        return;
    };
    if !p_queue.is_null() {
        *p_queue = layer.engine.get_device_queue(queue_family_index, queue_index);
    }
}

/// Every decode target must support storage images for the image path.
unsafe fn storage_image_supported(instance: &LayerInstance, physical_device: vk::PhysicalDevice) -> bool {
    format::DECODE_TARGET_FORMATS.iter().all(|&target| {
        instance
            .fns
            .get_physical_device_format_properties(physical_device, target)
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::STORAGE_IMAGE)
    })
}

unsafe fn host_visible_memory(instance: &LayerInstance, physical_device: vk::PhysicalDevice) -> Option<u32> {
    let props = instance.fns.get_physical_device_memory_properties(physical_device);
    let index = props.memory_types[..props.memory_type_count as usize]
        .iter()
        .position(|t| t.property_flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE))
        .map(|i| i as u32);
    if index.is_none() {
        warn!("physical device {:?} has no host-visible memory type", physical_device);
    }
    index
}

/// Queue 0 of the first compute family, if the application asked for one.
unsafe fn compute_queue(
    instance: &LayerInstance,
    physical_device: vk::PhysicalDevice,
    create_info: &vk::DeviceCreateInfo<'_>,
    backend: &AshBackend,
) -> Option<vk::Queue> {
    let families = instance
        .fns
        .get_physical_device_queue_family_properties(physical_device);
    let family = families
        .iter()
        .position(|f| f.queue_flags.contains(vk::QueueFlags::COMPUTE))? as u32;
    let requested = if create_info.p_queue_create_infos.is_null() {
        &[][..]
    } else {
        std::slice::from_raw_parts(create_info.p_queue_create_infos, create_info.queue_create_info_count as usize)
    };
    if !requested.iter().any(|q| q.queue_family_index == family && q.queue_count > 0) {
        debug!("compute family {} not requested, no decode queue", family);
        return None;
    }
    Some(backend.raw().get_device_queue(family, 0))
}
