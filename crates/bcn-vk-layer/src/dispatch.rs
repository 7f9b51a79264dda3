//! Loader-facing plumbing for the layer.
//!
//! Every dispatchable handle (VkInstance, VkPhysicalDevice, VkDevice, VkQueue,
//! VkCommandBuffer) starts with a pointer to the loader's dispatch table.
//! Handles that share a table share that pointer, so it identifies the owning
//! instance or device.
//!
//! The structs below mirror `vk_layer.h`, which ash does not generate.

use std::ffi::{c_void, CStr};

use ash::vk::{self, Handle};

pub type DispatchKey = usize;

/// Key of the instance or device owning `handle`.
///
/// # Safety
/// `handle` must be a valid dispatchable handle created through the loader.
pub unsafe fn dispatch_key<H: Handle>(handle: H) -> DispatchKey {
    *(handle.as_raw() as usize as *const DispatchKey)
}

pub const LOADER_INSTANCE_CREATE_INFO: vk::StructureType = vk::StructureType::from_raw(47);
pub const LOADER_DEVICE_CREATE_INFO: vk::StructureType = vk::StructureType::from_raw(48);

/// `VK_LAYER_LINK_INFO` in `VkLayerFunction`.
pub const LAYER_LINK_INFO: i32 = 0;

/// `LAYER_NEGOTIATE_INTERFACE_STRUCT`
pub const LAYER_NEGOTIATE_INTERFACE_STRUCT: i32 = 1;

/// Highest loader-layer interface version the layer speaks.
pub const LAYER_INTERFACE_VERSION: u32 = 2;

#[repr(C)]
pub struct LayerInstanceLink {
    pub p_next: *mut LayerInstanceLink,
    pub pfn_next_get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
    pub pfn_next_get_physical_device_proc_addr: *const c_void,
}

#[repr(C)]
pub struct LayerInstanceCreateInfo {
    pub s_type: vk::StructureType,
    pub p_next: *const c_void,
    pub function: i32,
    /// First member of the `u` union; the other members are never read.
    pub p_layer_info: *mut LayerInstanceLink,
}

#[repr(C)]
pub struct LayerDeviceLink {
    pub p_next: *mut LayerDeviceLink,
    pub pfn_next_get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
    pub pfn_next_get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr,
}

#[repr(C)]
pub struct LayerDeviceCreateInfo {
    pub s_type: vk::StructureType,
    pub p_next: *const c_void,
    pub function: i32,
    pub p_layer_info: *mut LayerDeviceLink,
}

#[repr(C)]
pub struct NegotiateLayerInterface {
    pub s_type: i32,
    pub p_next: *mut c_void,
    pub loader_layer_interface_version: u32,
    pub pfn_get_instance_proc_addr: Option<vk::PFN_vkGetInstanceProcAddr>,
    pub pfn_get_device_proc_addr: Option<vk::PFN_vkGetDeviceProcAddr>,
    pub pfn_get_physical_device_proc_addr: *const c_void,
}

/// Finds the loader's link-info entry in a create-info `pNext` chain.
///
/// # Safety
/// `p_next` must be a valid Vulkan structure chain.
unsafe fn find_link_info<T>(mut p_next: *const c_void, s_type: vk::StructureType) -> *mut T {
    while !p_next.is_null() {
        let base = &*(p_next as *const vk::BaseInStructure<'_>);
        if base.s_type == s_type {
            // LayerInstanceCreateInfo and LayerDeviceCreateInfo share this prefix.
            let info = &*(p_next as *const LayerInstanceCreateInfo);
            if info.function == LAYER_LINK_INFO {
                return p_next as *mut T;
            }
        }
        p_next = base.p_next as *const c_void;
    }
    std::ptr::null_mut()
}

/// Pops this layer's link from the instance chain, returning the next
/// layer's `vkGetInstanceProcAddr`.
///
/// # Safety
/// `create_info` must be the create info the loader passed to vkCreateInstance.
pub unsafe fn take_instance_link(create_info: &vk::InstanceCreateInfo<'_>) -> Option<vk::PFN_vkGetInstanceProcAddr> {
    let chain: *mut LayerInstanceCreateInfo = find_link_info(create_info.p_next, LOADER_INSTANCE_CREATE_INFO);
    if chain.is_null() || (*chain).p_layer_info.is_null() {
        return None;
    }
    let link = &*(*chain).p_layer_info;
    (*chain).p_layer_info = link.p_next;
    Some(link.pfn_next_get_instance_proc_addr)
}

/// Pops this layer's link from the device chain, returning the next layer's
/// `vkGetInstanceProcAddr` and `vkGetDeviceProcAddr`.
///
/// # Safety
/// `create_info` must be the create info the loader passed to vkCreateDevice.
pub unsafe fn take_device_link(
    create_info: &vk::DeviceCreateInfo<'_>,
) -> Option<(vk::PFN_vkGetInstanceProcAddr, vk::PFN_vkGetDeviceProcAddr)> {
    let chain: *mut LayerDeviceCreateInfo = find_link_info(create_info.p_next, LOADER_DEVICE_CREATE_INFO);
    if chain.is_null() || (*chain).p_layer_info.is_null() {
        return None;
    }
    let link = &*(*chain).p_layer_info;
    (*chain).p_layer_info = link.p_next;
    Some((link.pfn_next_get_instance_proc_addr, link.pfn_next_get_device_proc_addr))
}

/// Resolves `name` through a `vkGet*ProcAddr` and casts it to `F`.
///
/// # Safety
/// `F` must be the function pointer type matching `name`.
pub unsafe fn cast_proc<F: Copy>(pfn: vk::PFN_vkVoidFunction) -> Option<F> {
    debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<unsafe extern "system" fn()>());
    pfn.map(|f| std::mem::transmute_copy::<unsafe extern "system" fn(), F>(&f))
}

/// Next-layer entry point by name, on an instance.
///
/// # Safety
/// As for [`cast_proc`].
pub unsafe fn instance_proc<F: Copy>(
    gipa: vk::PFN_vkGetInstanceProcAddr,
    instance: vk::Instance,
    name: &CStr,
) -> Option<F> {
    cast_proc(gipa(instance, name.as_ptr()))
}
