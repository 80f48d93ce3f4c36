//! Bootloader capability consumed by the kernel boot target.
//!
//! The boot script owned by the bootloader reads `kernel_status` and the
//! try-kernel reference at boot; this crate only manipulates them through the
//! [`Bootloader`] trait. None of the operations are transactional, which is
//! why the kernel commits call them in a fixed order.

use std::collections::HashMap;

use crate::modeenv::StoreError;
use crate::primitives::{ArtifactPlacement, PlacementError};

#[cfg(unix)]
pub mod extracted;

#[cfg(unix)]
pub use extracted::ExtractedKernelBootloader;

/// Boot variable carrying the kernel's [`BootStatus`](crate::types::BootStatus).
pub const KERNEL_STATUS_VAR: &str = "kernel_status";

#[derive(Debug, thiserror::Error)]
pub enum BootloaderError {
    /// There is no try-kernel reference. Expected whenever no kernel update is
    /// pending.
    #[error("no try-kernel referenced by the bootloader")]
    NoTryKernelRef,
    /// The enabled or try kernel reference does not name a valid artifact.
    #[error("invalid kernel reference {link:?}: {source}")]
    InvalidReference {
        link: String,
        #[source]
        source: PlacementError,
    },
    #[error("cannot {operation}: {reason}")]
    Operation { operation: &'static str, reason: String },
    #[error("cannot {operation}: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    BootVars(#[from] StoreError),
}

impl BootloaderError {
    pub fn operation(operation: &'static str, reason: impl Into<String>) -> Self {
        BootloaderError::Operation { operation, reason: reason.into() }
    }

    pub fn io(operation: &'static str, source: std::io::Error) -> Self {
        BootloaderError::Io { operation, source }
    }
}

/// A bootloader that boots kernels extracted next to it and resolves an
/// optional try-kernel reference while `kernel_status` is `try`.
pub trait Bootloader: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Returns the requested variables; missing variables map to `""`.
    fn get_boot_vars(&self, names: &[&str]) -> Result<HashMap<String, String>, BootloaderError>;

    fn set_boot_vars(&self, values: &HashMap<String, String>) -> Result<(), BootloaderError>;

    /// The currently enabled (non-try) kernel.
    fn kernel(&self) -> Result<ArtifactPlacement, BootloaderError>;

    /// The try-kernel, or [`BootloaderError::NoTryKernelRef`].
    fn try_kernel(&self) -> Result<ArtifactPlacement, BootloaderError>;

    fn enable_kernel(&self, kernel: &ArtifactPlacement) -> Result<(), BootloaderError>;

    fn enable_try_kernel(&self, kernel: &ArtifactPlacement) -> Result<(), BootloaderError>;

    /// Removes the try-kernel reference. Succeeds when there is none.
    fn disable_try_kernel(&self) -> Result<(), BootloaderError>;
}
