//! Compressed format classification.

use ash::vk;
use serde::{Deserialize, Serialize};

/// Block-compression family, one decode kernel per family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatFamily {
    /// BC1-3
    S3tc,
    /// BC4-5
    Rgtc,
    Bc6,
    Bc7,
}

impl FormatFamily {
    pub const ALL: [FormatFamily; 4] = [
        FormatFamily::S3tc,
        FormatFamily::Rgtc,
        FormatFamily::Bc6,
        FormatFamily::Bc7,
    ];

    /// Bytes per decoded texel written by the family's kernel.
    pub fn texel_size(self) -> u32 {
        match self {
            FormatFamily::Bc6 => 8,
            _ => 4,
        }
    }

    /// File stem of the family's kernel blob.
    pub fn kernel_name(self) -> &'static str {
        match self {
            FormatFamily::S3tc => "s3tc",
            FormatFamily::Rgtc => "rgtc",
            FormatFamily::Bc6 => "bc6",
            FormatFamily::Bc7 => "bc7",
        }
    }
}

/// Every compressed format the layer decodes.
pub const SUPPORTED_FORMATS: [vk::Format; 16] = [
    vk::Format::BC1_RGB_UNORM_BLOCK,
    vk::Format::BC1_RGB_SRGB_BLOCK,
    vk::Format::BC1_RGBA_UNORM_BLOCK,
    vk::Format::BC1_RGBA_SRGB_BLOCK,
    vk::Format::BC2_UNORM_BLOCK,
    vk::Format::BC2_SRGB_BLOCK,
    vk::Format::BC3_UNORM_BLOCK,
    vk::Format::BC3_SRGB_BLOCK,
    vk::Format::BC4_UNORM_BLOCK,
    vk::Format::BC4_SNORM_BLOCK,
    vk::Format::BC5_UNORM_BLOCK,
    vk::Format::BC5_SNORM_BLOCK,
    vk::Format::BC6H_UFLOAT_BLOCK,
    vk::Format::BC6H_SFLOAT_BLOCK,
    vk::Format::BC7_UNORM_BLOCK,
    vk::Format::BC7_SRGB_BLOCK,
];

pub fn classify(format: vk::Format) -> Option<FormatFamily> {
    match format {
        vk::Format::BC1_RGB_UNORM_BLOCK
        | vk::Format::BC1_RGB_SRGB_BLOCK
        | vk::Format::BC1_RGBA_UNORM_BLOCK
        | vk::Format::BC1_RGBA_SRGB_BLOCK
        | vk::Format::BC2_UNORM_BLOCK
        | vk::Format::BC2_SRGB_BLOCK
        | vk::Format::BC3_UNORM_BLOCK
        | vk::Format::BC3_SRGB_BLOCK => Some(FormatFamily::S3tc),
        vk::Format::BC4_UNORM_BLOCK
        | vk::Format::BC4_SNORM_BLOCK
        | vk::Format::BC5_UNORM_BLOCK
        | vk::Format::BC5_SNORM_BLOCK => Some(FormatFamily::Rgtc),
        vk::Format::BC6H_UFLOAT_BLOCK | vk::Format::BC6H_SFLOAT_BLOCK => Some(FormatFamily::Bc6),
        vk::Format::BC7_UNORM_BLOCK | vk::Format::BC7_SRGB_BLOCK => Some(FormatFamily::Bc7),
        _ => None,
    }
}

pub fn is_supported(format: vk::Format) -> bool {
    classify(format).is_some()
}

/// Uncompressed format a compressed format is expanded into.
///
/// Formats outside the four families are returned unchanged.
pub fn decode_target_format(format: vk::Format) -> vk::Format {
    match format {
        vk::Format::BC4_SNORM_BLOCK | vk::Format::BC5_SNORM_BLOCK => vk::Format::R8G8B8A8_SNORM,
        _ => match classify(format) {
            Some(FormatFamily::Bc6) => vk::Format::R16G16B16A16_SFLOAT,
            Some(_) => vk::Format::R8G8B8A8_UNORM,
            None => format,
        },
    }
}

/// Distinct decode target formats, used when probing storage-image support.
pub const DECODE_TARGET_FORMATS: [vk::Format; 3] = [
    vk::Format::R8G8B8A8_UNORM,
    vk::Format::R8G8B8A8_SNORM,
    vk::Format::R16G16B16A16_SFLOAT,
];

/// Byte size of one texel of a decode target format.
pub fn target_texel_size(format: vk::Format) -> u32 {
    match format {
        vk::Format::R16G16B16A16_SFLOAT => 8,
        _ => 4,
    }
}

/// Resolves a `VK_FORMAT_*` name (prefix optional) or a raw integer.
pub fn parse_format(name: &str) -> Option<vk::Format> {
    let trimmed = name.trim();
    if let Ok(raw) = trimmed.parse::<i32>() {
        return Some(vk::Format::from_raw(raw));
    }
    let upper = trimmed.to_ascii_uppercase();
    let bare = upper.strip_prefix("VK_FORMAT_").unwrap_or(&upper);
    SUPPORTED_FORMATS
        .iter()
        .chain(DECODE_TARGET_FORMATS.iter())
        .copied()
        .find(|f| format!("{:?}", f) == bare)
}
