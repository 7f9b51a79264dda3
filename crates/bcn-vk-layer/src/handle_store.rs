//! Per-instance and per-device layer state, keyed by dispatch key.

use std::sync::{Arc, OnceLock};

use ash::vk::{self, Handle};
use bcn_core::{DecodeDevice, Registry};
use dashmap::DashMap;

use crate::backend::AshBackend;
use crate::dispatch::DispatchKey;

/// Instance-level state: the next layer's instance functions.
pub struct LayerInstance {
    pub handle: vk::Instance,
    pub fns: ash::Instance,
    pub next_gipa: vk::PFN_vkGetInstanceProcAddr,
}

/// What vkEnumeratePhysicalDevices learned about a physical device.
#[derive(Debug, Clone, Copy)]
pub struct PhysicalDeviceInfo {
    pub instance: DispatchKey,
    /// Features as reported by the driver, before the layer's override.
    pub native_features: vk::PhysicalDeviceFeatures,
    pub limits: vk::PhysicalDeviceLimits,
}

pub struct LayerDevice {
    pub handle: vk::Device,
    pub physical_device: vk::PhysicalDevice,
    pub backend: Arc<AshBackend>,
    pub engine: DecodeDevice,
    pub next_gdpa: vk::PFN_vkGetDeviceProcAddr,
}

macro_rules! layer_map {
    ($map_name:ident, $fn_map:ident, $fn_store:ident, $fn_get:ident, $fn_remove:ident, $key:ty, $value:ty) => {
        static $map_name: OnceLock<DashMap<$key, Arc<$value>>> = OnceLock::new();

        fn $fn_map() -> &'static DashMap<$key, Arc<$value>> {
            $map_name.get_or_init(DashMap::new)
        }

        pub fn $fn_store(key: $key, value: $value) -> Arc<$value> {
            let value = Arc::new(value);
            $fn_map().insert(key, value.clone());
            value
        }

        pub fn $fn_get(key: $key) -> Option<Arc<$value>> {
            $fn_map().get(&key).map(|v| v.clone())
        }

        pub fn $fn_remove(key: $key) -> Option<Arc<$value>> {
            $fn_map().remove(&key).map(|(_, v)| v)
        }
    };
}

layer_map!(INSTANCE_MAP, instance_map, store_instance, get_instance, remove_instance, DispatchKey, LayerInstance);
layer_map!(PHYS_DEV_MAP, phys_dev_map, store_physical_device, get_physical_device_info, remove_physical_device, u64, PhysicalDeviceInfo);
layer_map!(DEVICE_MAP, device_map, store_device, get_device, remove_device, DispatchKey, LayerDevice);

pub fn physical_device_info(physical_device: vk::PhysicalDevice) -> Option<Arc<PhysicalDeviceInfo>> {
    get_physical_device_info(physical_device.as_raw())
}

/// Drops cached physical devices of a destroyed instance.
pub fn forget_physical_devices(instance: DispatchKey) {
    phys_dev_map().retain(|_, info| info.instance != instance);
}

static REGISTRY: OnceLock<Arc<Registry>> = OnceLock::new();

/// Process-wide shadow registry shared by every device.
pub fn registry() -> Arc<Registry> {
    REGISTRY.get_or_init(|| Arc::new(Registry::new())).clone()
}
