#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(deprecated)]

//!
//! Bootstate-Core manages the try/commit boot state of the kernel and base of
//! an image-based system.
//!
//! An update is staged with [`BootTarget::set_next`], the device reboots into
//! it, and after a good boot [`BootTarget::mark_successful`] plus
//! [`CommitPlan::commit`] promote it to current. Every commit orders its side
//! effects so that an interruption at any point leaves a bootable device.

// Shared enums (TargetKind, BootStatus).
pub mod types;

// Artifact identities (Revision, ArtifactPlacement).
pub mod primitives;

pub use primitives::*;

pub mod error;

// Persisted mode environment and its load-once cache.
pub mod modeenv;

// Bootloader capability and the extracted-kernel implementation.
pub mod bootloader;

pub mod config;

// Boot targets, shared decisions and the commit plan.
pub mod boot;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use boot::{boot_target_for, BootTarget, CommitPlan, NextUpdate, Revisions};
pub use config::{BootContext, BootPaths};
pub use error::BootStateError;
pub use types::{BootStatus, TargetKind};
