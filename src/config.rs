//! Where boot state lives and the collaborators built from it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::bootloader::Bootloader;
use crate::modeenv::ModeenvStore;

/// File locations, deserializable so a host can carry them in its own
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BootPaths {
    pub modeenv_file: PathBuf,
    pub kernel_dir: PathBuf,
}

impl BootPaths {
    pub const MODEENV_FILE: &'static str = "var/lib/bootstate/modeenv.json";
    pub const KERNEL_DIR: &'static str = "boot/kernels";

    /// Default layout below `root` (`/` on a device, a temp dir in tests).
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        BootPaths {
            modeenv_file: root.join(Self::MODEENV_FILE),
            kernel_dir: root.join(Self::KERNEL_DIR),
        }
    }
}

impl Default for BootPaths {
    fn default() -> Self {
        BootPaths::under("/")
    }
}

/// Collaborators every boot target is built from.
#[derive(Debug, Clone)]
pub struct BootContext {
    pub bootloader: Arc<dyn Bootloader>,
    pub modeenv: Arc<dyn ModeenvStore>,
}

impl BootContext {
    pub fn new(bootloader: Arc<dyn Bootloader>, modeenv: Arc<dyn ModeenvStore>) -> Self {
        BootContext { bootloader, modeenv }
    }

    /// File-backed modeenv and extracted-kernel bootloader at `paths`.
    #[cfg(unix)]
    pub fn from_paths(paths: &BootPaths) -> Self {
        use crate::bootloader::ExtractedKernelBootloader;
        use crate::modeenv::FileModeenvStore;

        BootContext {
            bootloader: Arc::new(ExtractedKernelBootloader::new(&paths.kernel_dir)),
            modeenv: Arc::new(FileModeenvStore::new(&paths.modeenv_file)),
        }
    }
}
