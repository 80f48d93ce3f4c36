//! Bootloader backed by a directory of extracted kernels.
//!
//! ```text
//! <dir>/bootenv.json                   boot variables (JSON string map)
//! <dir>/<name>_<rev>.snap/kernel.efi   one asset directory per installed kernel
//! <dir>/kernel.efi     -> <name>_<rev>.snap/kernel.efi   enabled kernel
//! <dir>/try-kernel.efi -> <name>_<rev>.snap/kernel.efi   try kernel, optional
//! ```
//!
//! Links are swapped by creating the new link under a temporary name and
//! renaming it over the old one, then syncing the directory.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::bootloader::{Bootloader, BootloaderError};
use crate::modeenv::{atomic_write, sync_dir};
use crate::primitives::ArtifactPlacement;

const KERNEL_ASSET: &str = "kernel.efi";
const KERNEL_LINK: &str = "kernel.efi";
const TRY_KERNEL_LINK: &str = "try-kernel.efi";
const BOOTENV_FILE: &str = "bootenv.json";

#[derive(Debug, Clone)]
pub struct ExtractedKernelBootloader {
    dir: PathBuf,
}

impl ExtractedKernelBootloader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory a kernel's assets must be extracted to before it can be
    /// enabled.
    pub fn asset_dir(&self, kernel: &ArtifactPlacement) -> PathBuf {
        self.dir.join(kernel.filename())
    }

    fn bootenv_path(&self) -> PathBuf {
        self.dir.join(BOOTENV_FILE)
    }

    fn read_bootenv(&self) -> Result<HashMap<String, String>, BootloaderError> {
        match fs::read(self.bootenv_path()) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| BootloaderError::operation("read boot variables", e.to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(err) => Err(BootloaderError::io("read boot variables", err)),
        }
    }

    /// Resolves a link to the kernel whose asset directory it points into.
    fn read_kernel_link(&self, link: &str) -> Result<Option<ArtifactPlacement>, BootloaderError> {
        let target = match fs::read_link(self.dir.join(link)) {
            Ok(target) => target,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(BootloaderError::io("read kernel link", err)),
        };
        let filename = target
            .parent()
            .and_then(Path::file_name)
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        ArtifactPlacement::from_filename(filename)
            .map(Some)
            .map_err(|source| BootloaderError::InvalidReference { link: link.to_string(), source })
    }

    fn link_kernel(&self, link: &str, kernel: &ArtifactPlacement) -> Result<(), BootloaderError> {
        let asset = self.asset_dir(kernel).join(KERNEL_ASSET);
        if !asset.exists() {
            return Err(BootloaderError::operation(
                "enable kernel",
                format!("{kernel} is not extracted in {}", self.dir.display()),
            ));
        }
        let target = Path::new(&kernel.filename()).join(KERNEL_ASSET);
        let staging = self.dir.join(format!(".{link}.new"));
        match fs::remove_file(&staging) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(BootloaderError::io("remove stale link", err)),
        }
        std::os::unix::fs::symlink(&target, &staging)
            .map_err(|e| BootloaderError::io("create kernel link", e))?;
        fs::rename(&staging, self.dir.join(link)).map_err(|e| BootloaderError::io("replace kernel link", e))?;
        sync_dir(&self.dir).map_err(|e| BootloaderError::io("sync boot directory", e))
    }
}

impl Bootloader for ExtractedKernelBootloader {
    fn name(&self) -> &str {
        "extracted-kernel"
    }

    fn get_boot_vars(&self, names: &[&str]) -> Result<HashMap<String, String>, BootloaderError> {
        let env = self.read_bootenv()?;
        Ok(names
            .iter()
            .map(|name| (name.to_string(), env.get(*name).cloned().unwrap_or_default()))
            .collect())
    }

    fn set_boot_vars(&self, values: &HashMap<String, String>) -> Result<(), BootloaderError> {
        let mut env = self.read_bootenv()?;
        env.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
        let payload = serde_json::to_vec_pretty(&env)
            .map_err(|e| BootloaderError::operation("encode boot variables", e.to_string()))?;
        atomic_write(&self.bootenv_path(), &payload)?;
        Ok(())
    }

    fn kernel(&self) -> Result<ArtifactPlacement, BootloaderError> {
        self.read_kernel_link(KERNEL_LINK)?
            .ok_or_else(|| BootloaderError::operation("identify kernel", "no kernel is enabled"))
    }

    fn try_kernel(&self) -> Result<ArtifactPlacement, BootloaderError> {
        self.read_kernel_link(TRY_KERNEL_LINK)?.ok_or(BootloaderError::NoTryKernelRef)
    }

    fn enable_kernel(&self, kernel: &ArtifactPlacement) -> Result<(), BootloaderError> {
        self.link_kernel(KERNEL_LINK, kernel)
    }

    fn enable_try_kernel(&self, kernel: &ArtifactPlacement) -> Result<(), BootloaderError> {
        self.link_kernel(TRY_KERNEL_LINK, kernel)
    }

    fn disable_try_kernel(&self) -> Result<(), BootloaderError> {
        match fs::remove_file(self.dir.join(TRY_KERNEL_LINK)) {
            Ok(()) => sync_dir(&self.dir).map_err(|e| BootloaderError::io("sync boot directory", e)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(BootloaderError::io("disable try-kernel", err)),
        }
    }
}
