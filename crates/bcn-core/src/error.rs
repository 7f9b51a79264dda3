use ash::vk;

use crate::format::FormatFamily;

#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    #[error("{call} failed: {result}")]
    Backend {
        call: &'static str,
        result: vk::Result,
    },

    #[error("descriptor pools exhausted after growing to {pools} pools")]
    PoolExhausted { pools: usize },

    #[error("no host-visible memory type for staging buffers")]
    NoHostVisibleMemory,

    #[error("unregistered {kind} handle 0x{handle:x}")]
    Unregistered { kind: &'static str, handle: u64 },

    #[error("decode kernel for {family:?} unavailable: {reason}")]
    Kernel { family: FormatFamily, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LayerError {
    /// Wraps a failed backend call, keeping the result code verbatim.
    pub fn backend(call: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::Backend { call, result }
    }

    /// The native result code reported to the application.
    pub fn as_vk_result(&self) -> vk::Result {
        match self {
            Self::Backend { result, .. } => *result,
            Self::PoolExhausted { .. } => vk::Result::ERROR_OUT_OF_POOL_MEMORY,
            Self::NoHostVisibleMemory => vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            Self::Unregistered { .. } => vk::Result::ERROR_UNKNOWN,
            Self::Kernel { .. } | Self::Config(_) | Self::Io(_) => {
                vk::Result::ERROR_INITIALIZATION_FAILED
            }
        }
    }
}

impl From<LayerError> for vk::Result {
    fn from(err: LayerError) -> Self {
        err.as_vk_result()
    }
}

pub type LayerResult<T> = Result<T, LayerError>;
