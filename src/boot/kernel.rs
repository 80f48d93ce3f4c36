//! Kernel boot target.
//!
//! The kernel's status lives in the bootloader (`kernel_status` plus the
//! try-kernel reference) while the set of trusted kernels lives in the
//! modeenv. Commits touch both, in an order that keeps at least one trusted,
//! enabled kernel bootable after any interruption.

use std::collections::HashMap;
use std::sync::Arc;

use crate::boot::generic::{generic_set_next, select_successful, BootState, Revisions};
use crate::boot::plan::CommitPlan;
use crate::bootloader::{Bootloader, BootloaderError, KERNEL_STATUS_VAR};
use crate::config::BootContext;
use crate::error::BootStateError;
use crate::modeenv::ModeenvCache;
use crate::primitives::ArtifactPlacement;
use crate::types::BootStatus;

/// Bootloader-side kernel state read once at load time, plus the status to
/// write on commit.
#[derive(Debug, Clone)]
pub(crate) struct KernelStatusMutator {
    bootloader: Arc<dyn Bootloader>,
    current_status: BootStatus,
    commit_status: BootStatus,
    current_kernel: ArtifactPlacement,
}

impl KernelStatusMutator {
    fn load(bootloader: Arc<dyn Bootloader>) -> Result<Self, BootStateError> {
        let vars = bootloader
            .get_boot_vars(&[KERNEL_STATUS_VAR])
            .map_err(|e| BootStateError::from_bootloader(bootloader.name(), e))?;
        let raw = vars.get(KERNEL_STATUS_VAR).map(String::as_str).unwrap_or_default();
        let current_status = BootStatus::from_boot_var(raw)
            .map_err(|reason| BootStateError::parse(KERNEL_STATUS_VAR, reason))?;

        let current_kernel = bootloader
            .kernel()
            .map_err(|e| BootStateError::from_bootloader(bootloader.name(), e))?;

        Ok(KernelStatusMutator {
            bootloader,
            current_status,
            // Unless set_next decides otherwise, commit what is already there.
            commit_status: current_status,
            current_kernel,
        })
    }

    fn capability_err(&self, err: BootloaderError) -> BootStateError {
        BootStateError::from_bootloader(self.bootloader.name(), err)
    }

    fn try_kernel(&self) -> Result<Option<ArtifactPlacement>, BootStateError> {
        match self.bootloader.try_kernel() {
            Ok(kernel) => Ok(Some(kernel)),
            Err(BootloaderError::NoTryKernelRef) => Ok(None),
            Err(err) => Err(self.capability_err(err)),
        }
    }

    fn set_kernel_status(&self, status: BootStatus) -> Result<(), BootStateError> {
        let vars = HashMap::from([(KERNEL_STATUS_VAR.to_string(), status.as_boot_var().to_string())]);
        self.bootloader.set_boot_vars(&vars).map_err(|e| self.capability_err(e))
    }

    /// Bootloader half of a set_next commit. The try-kernel reference goes in
    /// before `kernel_status` changes: with the status still unset the boot
    /// script ignores the reference, whereas `try` without a reference would
    /// leave it nothing to boot.
    pub(crate) fn set_next_kernel(&self, next: &ArtifactPlacement) -> Result<(), BootStateError> {
        if next.filename() != self.current_kernel.filename() {
            tracing::debug!(kernel = %next, "enabling try-kernel");
            self.bootloader.enable_try_kernel(next).map_err(|e| self.capability_err(e))?;
        }

        // Only touch the boot environment when the value changes.
        if self.commit_status != self.current_status {
            tracing::debug!(from = %self.current_status, to = %self.commit_status, "setting kernel_status");
            self.set_kernel_status(self.commit_status)?;
        }
        Ok(())
    }

    /// Bootloader half of a mark_successful commit: clear `kernel_status`,
    /// enable the booted kernel, drop the try-kernel reference.
    ///
    /// Clearing the status first means an interruption leaves the previous,
    /// proven kernel enabled with nothing pending. The try reference is always
    /// removed, which also cleans up after earlier interrupted updates.
    pub(crate) fn mark_successful(&self, booted: &ArtifactPlacement) -> Result<(), BootStateError> {
        if self.commit_status != BootStatus::Default {
            if booted.filename() == self.current_kernel.filename() && self.commit_status == BootStatus::Trying {
                tracing::warn!(kernel = %booted, "clearing stale kernel_status=trying for the current kernel");
            }
            tracing::debug!(from = %self.commit_status, "clearing kernel_status");
            self.set_kernel_status(BootStatus::Default)?;
        }

        if booted.filename() != self.current_kernel.filename() {
            tracing::debug!(kernel = %booted, previous = %self.current_kernel, "enabling kernel");
            self.bootloader.enable_kernel(booted).map_err(|e| self.capability_err(e))?;
        }

        tracing::debug!("disabling try-kernel");
        self.bootloader.disable_try_kernel().map_err(|e| self.capability_err(e))
    }

    pub(crate) fn current_kernel(&self) -> &ArtifactPlacement {
        &self.current_kernel
    }
}

/// Boot target for the kernel.
#[derive(Debug, Clone)]
pub struct KernelTarget {
    bootloader: Arc<dyn Bootloader>,
    mutator: Option<KernelStatusMutator>,
    // Needed by set_next commits to trust the candidate and by
    // mark_successful to shrink the trusted set.
    modeenv: ModeenvCache,
}

impl KernelTarget {
    pub fn new(ctx: &BootContext) -> Self {
        KernelTarget {
            bootloader: Arc::clone(&ctx.bootloader),
            mutator: None,
            modeenv: ModeenvCache::new(Arc::clone(&ctx.modeenv)),
        }
    }

    fn load_bootenv(&mut self) -> Result<&mut KernelStatusMutator, BootStateError> {
        let mutator = match self.mutator {
            Some(ref mut mutator) => mutator,
            None => self.mutator.insert(KernelStatusMutator::load(Arc::clone(&self.bootloader))?),
        };
        Ok(mutator)
    }

    /// Current kernel, try kernel (if the bootloader references one) and
    /// `kernel_status`.
    pub fn revisions(&mut self) -> Result<Revisions, BootStateError> {
        let mutator = self.load_bootenv()?;
        let try_candidate = mutator.try_kernel()?;
        Ok(Revisions {
            current: mutator.current_kernel.clone(),
            try_candidate,
            status: mutator.current_status,
        })
    }

    /// Stages `next`. Returns whether a reboot is needed to try it; nothing
    /// is persisted until the returned update is committed.
    pub fn set_next(mut self, next: ArtifactPlacement) -> Result<(bool, KernelNextUpdate), BootStateError> {
        self.modeenv.load()?;
        let next_status = generic_set_next(&mut self, &next)?;
        let mut mutator = self.load_bootenv()?.clone();
        mutator.commit_status = next_status;

        let reboot_required = next_status == BootStatus::Try;
        tracing::debug!(kernel = %next, status = %next_status, reboot_required, "staged next kernel");
        Ok((reboot_required, KernelNextUpdate { mutator, modeenv: self.modeenv, next }))
    }

    /// Records the kernel that booted successfully into `plan`.
    pub fn mark_successful(mut self, plan: &mut CommitPlan) -> Result<(), BootStateError> {
        let booted = select_successful(&mut self)?;
        self.modeenv.load()?;
        let mutator = self.load_bootenv()?.clone();
        plan.stage_kernel(mutator, self.modeenv, booted)
    }
}

impl BootState for KernelTarget {
    fn revisions(&mut self) -> Result<Revisions, BootStateError> {
        KernelTarget::revisions(self)
    }
}

/// A staged kernel set_next, applied by [`KernelNextUpdate::commit`].
#[derive(Debug)]
pub struct KernelNextUpdate {
    mutator: KernelStatusMutator,
    modeenv: ModeenvCache,
    next: ArtifactPlacement,
}

impl KernelNextUpdate {
    /// Applies the update in this order, each step safe to be interrupted
    /// after:
    /// 1. trust the candidate in the modeenv (atomic write),
    /// 2. create the try-kernel reference,
    /// 3. set `kernel_status` to `try`.
    pub fn commit(mut self) -> Result<(), BootStateError> {
        let next_filename = self.next.filename();
        if next_filename != self.mutator.current_kernel().filename() {
            let modeenv = self.modeenv.load()?;
            modeenv.trust_kernel(&next_filename);
            if self.modeenv.write_if_changed()? {
                tracing::debug!(kernel = %next_filename, "added kernel to trusted kernels");
            }
        }

        self.mutator.set_next_kernel(&self.next)
    }
}
