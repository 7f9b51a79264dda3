use std::io::Cursor;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{LayerError, LayerResult};
use crate::format::FormatFamily;

/// Which descriptor layout a kernel was compiled against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelVariant {
    /// Binding 0 is a storage image.
    Image,
    /// Binding 0 is a storage buffer.
    Buffer,
}

impl KernelVariant {
    pub fn file_name(self, family: FormatFamily) -> String {
        match self {
            KernelVariant::Image => format!("{}_iv.spv", family.kernel_name()),
            KernelVariant::Buffer => format!("{}.spv", family.kernel_name()),
        }
    }
}

/// Supplies SPIR-V words for the decode kernels.
pub trait KernelSource: Send + Sync {
    fn load(&self, family: FormatFamily, variant: KernelVariant) -> LayerResult<Vec<u32>>;
}

/// Loads `{s3tc,rgtc,bc6,bc7}[_iv].spv` from a directory.
#[derive(Debug, Clone)]
pub struct SpirvDirectory {
    dir: PathBuf,
}

impl SpirvDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, family: FormatFamily, variant: KernelVariant) -> PathBuf {
        self.dir.join(variant.file_name(family))
    }
}

impl KernelSource for SpirvDirectory {
    fn load(&self, family: FormatFamily, variant: KernelVariant) -> LayerResult<Vec<u32>> {
        let path = self.path_of(family, variant);
        let bytes = std::fs::read(&path).map_err(|e| LayerError::Kernel {
            family,
            reason: format!("{}: {}", path.display(), e),
        })?;
        let words = ash::util::read_spv(&mut Cursor::new(&bytes)).map_err(|e| LayerError::Kernel {
            family,
            reason: format!("{}: {}", path.display(), e),
        })?;
        if words.first() != Some(&SPIRV_MAGIC) {
            return Err(LayerError::Kernel {
                family,
                reason: format!("{}: not a SPIR-V module", path.display()),
            });
        }
        debug!("loaded {} ({} words)", path.display(), words.len());
        Ok(words)
    }
}

pub const SPIRV_MAGIC: u32 = 0x0723_0203;
