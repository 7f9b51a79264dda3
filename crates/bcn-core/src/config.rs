use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{LayerError, LayerResult};

/// Selects the image-capable decode path (`1`, the default) or the
/// buffer-and-copy path (`0`).
pub const USE_IMAGE_VIEW_ENV: &str = "BCN_LAYER_USE_IMAGE_VIEW";
/// Overrides the directory holding the decode kernel blobs.
pub const SHADER_DIR_ENV: &str = "BCN_LAYER_SHADER_DIR";
/// Path of the TOML config file.
pub const CONFIG_PATH_ENV: &str = "BCN_LAYER_CONFIG";

/// Where decode kernels write their output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodePath {
    /// Image path if the device can write the decode targets as storage
    /// images, buffer path otherwise.
    #[default]
    Auto,
    /// Kernels write straight into the destination through a storage image view.
    Image,
    /// Kernels write into a staging buffer copied into the destination afterwards.
    Buffer,
}

impl DecodePath {
    /// Resolves the requested path against the device's storage-image support.
    /// The result is never `Auto`.
    pub fn resolve(self, storage_image_supported: bool) -> DecodePath {
        match self {
            DecodePath::Buffer => DecodePath::Buffer,
            DecodePath::Auto | DecodePath::Image if storage_image_supported => DecodePath::Image,
            DecodePath::Auto => DecodePath::Buffer,
            DecodePath::Image => {
                warn!("image decode path requested but decode targets lack storage image support, using buffer path");
                DecodePath::Buffer
            }
        }
    }

    pub fn uses_image_view(self) -> bool {
        self == DecodePath::Image
    }
}

/// Layer configuration, loaded from bcn_layer.toml and the environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayerConfig {
    #[serde(default)]
    pub decode_path: DecodePath,
    /// Directory holding `{s3tc,rgtc,bc6,bc7}[_iv].spv`
    #[serde(default = "default_shader_dir")]
    pub shader_dir: PathBuf,
    /// Tracing filter used when BCN_LAYER_LOG is unset
    #[serde(default)]
    pub log_filter: Option<String>,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            decode_path: DecodePath::default(),
            shader_dir: default_shader_dir(),
            log_filter: None,
        }
    }
}

impl LayerConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> LayerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> LayerResult<Self> {
        toml::from_str(content).map_err(|e| LayerError::Config(e.to_string()))
    }

    /// Load configuration from file if it exists, otherwise return defaults.
    /// A file that exists but does not parse is reported and ignored.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("ignoring {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Effective configuration: defaults, then the config file, then the
    /// environment.
    pub fn from_env() -> Self {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(bcn_common::platform::default_config_path);
        let mut config = Self::load_or_default(&path);
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Applies environment overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup(USE_IMAGE_VIEW_ENV) {
            self.decode_path = parse_image_view_toggle(&value);
        }
        if let Some(dir) = lookup(SHADER_DIR_ENV) {
            if !dir.is_empty() {
                self.shader_dir = PathBuf::from(dir);
            }
        }
    }
}

/// Interprets BCN_LAYER_USE_IMAGE_VIEW: non-zero integers select the image
/// path, zero or anything unparsable the buffer path.
pub fn parse_image_view_toggle(value: &str) -> DecodePath {
    match value.trim() {
        "1" => DecodePath::Image,
        "0" => DecodePath::Buffer,
        other => {
            let path = match other.parse::<i64>() {
                Ok(n) if n != 0 => DecodePath::Image,
                _ => DecodePath::Buffer,
            };
            warn!("{}={:?} is not 0 or 1, treating as {:?}", USE_IMAGE_VIEW_ENV, value, path);
            path
        }
    }
}

fn default_shader_dir() -> PathBuf {
    bcn_common::platform::default_shader_dir()
}
