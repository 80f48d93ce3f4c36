//! Commit plan for marking boots successful.
//!
//! A plan collects at most one kernel and one base decision, plus the modeenv
//! loaded by whichever target was marked first, so both land in one write.

use crate::boot::kernel::KernelStatusMutator;
use crate::error::BootStateError;
use crate::modeenv::ModeenvCache;
use crate::primitives::ArtifactPlacement;
use crate::types::{BootStatus, TargetKind};

#[derive(Debug)]
struct KernelSuccess {
    mutator: KernelStatusMutator,
    booted: ArtifactPlacement,
}

/// Accumulates `mark_successful` decisions for one invocation. Consumed by
/// [`CommitPlan::commit`]; never persisted.
#[derive(Debug, Default)]
pub struct CommitPlan {
    modeenv: Option<ModeenvCache>,
    kernel: Option<KernelSuccess>,
    base: Option<ArtifactPlacement>,
}

impl CommitPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.kernel.is_none() && self.base.is_none()
    }

    /// The artifact staged as successful for `kind`, if any.
    pub fn booted(&self, kind: TargetKind) -> Option<&ArtifactPlacement> {
        match kind {
            TargetKind::Kernel => self.kernel.as_ref().map(|k| &k.booted),
            TargetKind::Base => self.base.as_ref(),
        }
    }

    fn adopt_modeenv(&mut self, modeenv: ModeenvCache) {
        // The first target's copy wins; both were read from the same store.
        if self.modeenv.is_none() {
            self.modeenv = Some(modeenv);
        }
    }

    fn ensure_unstaged(&self, kind: TargetKind) -> Result<(), BootStateError> {
        if self.booted(kind).is_some() {
            return Err(BootStateError::Consistency(format!("commit plan already marks a {kind} successful")));
        }
        Ok(())
    }

    pub(crate) fn stage_kernel(
        &mut self,
        mutator: KernelStatusMutator,
        modeenv: ModeenvCache,
        booted: ArtifactPlacement,
    ) -> Result<(), BootStateError> {
        self.ensure_unstaged(TargetKind::Kernel)?;
        self.adopt_modeenv(modeenv);
        self.kernel = Some(KernelSuccess { mutator, booted });
        Ok(())
    }

    pub(crate) fn stage_base(
        &mut self,
        modeenv: ModeenvCache,
        booted: ArtifactPlacement,
    ) -> Result<(), BootStateError> {
        self.ensure_unstaged(TargetKind::Base)?;
        self.adopt_modeenv(modeenv);
        self.base = Some(booted);
        Ok(())
    }

    /// Applies every staged decision, kernel first:
    ///
    /// 1. clear `kernel_status`,
    /// 2. enable the booted kernel,
    /// 3. remove the try-kernel reference,
    /// 4. trust only the booted kernel,
    /// 5. reset `base_status`/`try_base` and record the booted base,
    /// 6. write the modeenv once, if 4-5 changed it.
    ///
    /// The old kernel may only leave the trusted set once the bootloader can no
    /// longer boot it, hence 4 after 2-3. A failure in 1-3 returns before any
    /// modeenv write.
    pub fn commit(self) -> Result<(), BootStateError> {
        let CommitPlan { modeenv, kernel, base } = self;
        if kernel.is_none() && base.is_none() {
            return Ok(());
        }
        let Some(mut modeenv) = modeenv else {
            return Err(BootStateError::Consistency("commit plan has no modeenv".into()));
        };

        if let Some(KernelSuccess { mutator, booted }) = &kernel {
            mutator.mark_successful(booted)?;
            let record = modeenv.load()?;
            record.current_kernels = vec![booted.filename()];
        }

        if let Some(booted) = &base {
            let record = modeenv.load()?;
            if record.base_status != BootStatus::Default || !record.try_base.is_empty() {
                tracing::debug!(status = %record.base_status, "clearing base_status");
            }
            record.base_status = BootStatus::Default;
            record.try_base.clear();
            record.base = booted.filename();
        }

        if modeenv.write_if_changed()? {
            tracing::info!(
                kernel = %kernel.as_ref().map(|k| k.booted.filename()).unwrap_or_default(),
                base = %base.as_ref().map(ArtifactPlacement::filename).unwrap_or_default(),
                "committed successful boot"
            );
        }
        Ok(())
    }
}
