//!
//! Defines the error type returned by boot target and commit plan operations.

use crate::bootloader::BootloaderError;
use crate::modeenv::StoreError;
use crate::primitives::PlacementError;

/// Errors surfaced to the update orchestrator. Nothing here is retried
/// internally.
#[derive(Debug, thiserror::Error)]
pub enum BootStateError {
    /// Nothing to act on: no try-kernel reference at the bootloader. Callers
    /// treat this as "nothing pending".
    #[error("not found: {0}")]
    NotFound(String),
    /// A stored filename or boot variable could not be decoded. Never defaulted.
    #[error("cannot parse {what}: {reason}")]
    Parse { what: String, reason: String },
    /// A bootloader operation failed. Raised before any modeenv write of the
    /// same commit.
    #[error("bootloader {bootloader} failed: {source}")]
    Capability {
        bootloader: String,
        #[source]
        source: BootloaderError,
    },
    /// A commit plan was threaded through incompatible calls; a caller bug.
    #[error("internal error: {0}")]
    Consistency(String),
    /// The modeenv could not be read or written.
    #[error("cannot access modeenv: {0}")]
    Store(#[from] StoreError),
}

impl BootStateError {
    pub(crate) fn parse(what: impl Into<String>, reason: impl ToString) -> Self {
        BootStateError::Parse { what: what.into(), reason: reason.to_string() }
    }

    /// Classifies a bootloader failure per the taxonomy: a missing try-kernel
    /// is `NotFound`, an undecodable kernel reference is `Parse`, everything
    /// else is a `Capability` failure.
    pub(crate) fn from_bootloader(bootloader: &str, err: BootloaderError) -> Self {
        match err {
            BootloaderError::NoTryKernelRef => BootStateError::NotFound(err.to_string()),
            BootloaderError::InvalidReference { link, source } => {
                BootStateError::parse(format!("kernel reference {link}"), source)
            }
            other => BootStateError::Capability { bootloader: bootloader.to_string(), source: other },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BootStateError::NotFound(_) | BootStateError::Store(StoreError::NotFound(_)))
    }
}

impl From<PlacementError> for BootStateError {
    fn from(err: PlacementError) -> Self {
        BootStateError::parse("artifact filename", err)
    }
}
