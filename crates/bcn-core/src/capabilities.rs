//! Capability answers advertised for compressed formats the hardware lacks.

use ash::vk;

use crate::format;

/// Largest resource the layer claims to support for a compressed image.
pub const MAX_RESOURCE_SIZE: vk::DeviceSize = 1 << 49;

/// Optimal-tiling features added to every supported compressed format.
pub fn compressed_format_features() -> vk::FormatFeatureFlags {
    vk::FormatFeatureFlags::SAMPLED_IMAGE
        | vk::FormatFeatureFlags::BLIT_SRC
        | vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR
        | vk::FormatFeatureFlags::TRANSFER_DST
}

/// Patches format properties returned by the next layer.
/// Returns `true` when the format was one the layer decodes.
pub fn apply_format_features(format: vk::Format, props: &mut vk::FormatProperties) -> bool {
    if !format::is_supported(format) {
        return false;
    }
    props.optimal_tiling_features |= compressed_format_features();
    true
}

/// Image format limits for a compressed format, answered from device limits
/// instead of the hardware (which would reject the format).
pub fn compressed_image_format_properties(
    limits: &vk::PhysicalDeviceLimits,
    image_type: vk::ImageType,
    tiling: vk::ImageTiling,
    flags: vk::ImageCreateFlags,
) -> vk::ImageFormatProperties {
    let max_extent = match image_type {
        vk::ImageType::TYPE_1D => vk::Extent3D {
            width: limits.max_image_dimension1_d,
            height: 1,
            depth: 1,
        },
        vk::ImageType::TYPE_3D => vk::Extent3D {
            width: limits.max_image_dimension3_d,
            height: limits.max_image_dimension3_d,
            depth: limits.max_image_dimension3_d,
        },
        _ if flags.contains(vk::ImageCreateFlags::CUBE_COMPATIBLE) => vk::Extent3D {
            width: limits.max_image_dimension_cube,
            height: limits.max_image_dimension_cube,
            depth: 1,
        },
        _ => vk::Extent3D {
            width: limits.max_image_dimension2_d,
            height: limits.max_image_dimension2_d,
            depth: 1,
        },
    };

    let single_level = tiling == vk::ImageTiling::LINEAR
        || tiling == vk::ImageTiling::DRM_FORMAT_MODIFIER_EXT
        || flags.contains(vk::ImageCreateFlags::SUBSAMPLED_EXT);
    let max_mip_levels = if single_level {
        1
    } else {
        full_mip_chain(max_extent.width.max(max_extent.height))
    };

    let max_array_layers = if tiling == vk::ImageTiling::LINEAR
        || (tiling == vk::ImageTiling::OPTIMAL && image_type == vk::ImageType::TYPE_3D)
    {
        1
    } else {
        limits.max_image_array_layers
    };

    vk::ImageFormatProperties {
        max_extent,
        max_mip_levels,
        max_array_layers,
        sample_counts: vk::SampleCountFlags::TYPE_1,
        max_resource_size: MAX_RESOURCE_SIZE,
    }
}

/// `floor(log2(dim)) + 1`
fn full_mip_chain(dim: u32) -> u32 {
    if dim == 0 {
        1
    } else {
        u32::BITS - dim.leading_zeros()
    }
}
