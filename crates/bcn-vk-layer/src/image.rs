//! Image and image view creation with compressed formats rewritten.

use ash::vk;

use crate::device::layer_device;

pub unsafe extern "system" fn vkCreateImage(
    device: vk::Device,
    p_create_info: *const vk::ImageCreateInfo<'_>,
    _p_allocator: *const vk::AllocationCallbacks<'_>,
    p_image: *mut vk::Image,
) -> vk::Result {
    if p_create_info.is_null() || p_image.is_null() {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }
    let Some(layer) = layer_device(device) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    match layer.engine.create_image(&*p_create_info) {
        Ok(image) => {
            *p_image = image;
            vk::Result::SUCCESS
        }
        Err(e) => e,
    }
}

pub unsafe extern "system" fn vkDestroyImage(
    device: vk::Device,
    image: vk::Image,
    _p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    if image == vk::Image::null() {
        return;
    }
    if let Some(layer) = layer_device(device) {
        layer.engine.destroy_image(image);
    }
}

pub unsafe extern "system" fn vkCreateImageView(
    device: vk::Device,
    p_create_info: *const vk::ImageViewCreateInfo<'_>,
    _p_allocator: *const vk::AllocationCallbacks<'_>,
    p_view: *mut vk::ImageView,
) -> vk::Result {
    if p_create_info.is_null() || p_view.is_null() {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }
    let Some(layer) = layer_device(device) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    match layer.engine.create_image_view(&*p_create_info) {
        Ok(view) => {
            *p_view = view;
            vk::Result::SUCCESS
        }
        Err(e) => e,
    }
}

pub unsafe extern "system" fn vkDestroyImageView(
    device: vk::Device,
    image_view: vk::ImageView,
    _p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    if image_view == vk::ImageView::null() {
        return;
    }
    if let Some(layer) = layer_device(device) {
        layer.engine.destroy_image_view(image_view);
    }
}
