//! Backend-agnostic engine of the BCn decode layer.
//!
//! Tracks shadow state for the handles the layer intercepts, owns the decode
//! compute pipelines and descriptor pools of each device, records decode
//! dispatches in place of compressed buffer-to-image copies, and releases the
//! transient resources those dispatches need once their fence has signaled.
//!
//! All Vulkan calls go through [`backend::DeviceBackend`], so the engine can be
//! driven by the real next layer or by an in-memory double in tests.

pub mod backend;
pub mod capabilities;
pub mod config;
pub mod decode;
pub mod descriptor_pool;
pub mod device;
pub mod error;
pub mod format;
pub mod kernels;
pub mod pipeline;
pub mod reclaim;
pub mod registry;

pub use backend::DeviceBackend;
pub use config::{DecodePath, LayerConfig};
pub use device::{DecodeDevice, DeviceSettings};
pub use error::LayerError;
pub use format::FormatFamily;
pub use registry::Registry;
