pub mod base;
pub mod generic;
pub mod kernel;
pub mod plan;
pub mod target;

// Re-export the primary types so callers can use `crate::boot::*` paths.
pub use base::{BaseNextUpdate, BaseTarget};
pub use generic::Revisions;
pub use kernel::{KernelNextUpdate, KernelTarget};
pub use plan::CommitPlan;
pub use target::{boot_target_for, BootTarget, NextUpdate};
