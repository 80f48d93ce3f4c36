//! Base boot target. All of its state is in the modeenv, so a commit is a
//! single atomic write and cannot be half-applied.

use std::sync::Arc;

use crate::boot::generic::{generic_set_next, select_successful, BootState, Revisions};
use crate::boot::plan::CommitPlan;
use crate::config::BootContext;
use crate::error::BootStateError;
use crate::modeenv::{ModeenvCache, StoreError};
use crate::primitives::ArtifactPlacement;
use crate::types::BootStatus;

#[derive(Debug, Clone)]
pub struct BaseTarget {
    modeenv: ModeenvCache,
}

impl BaseTarget {
    pub fn new(ctx: &BootContext) -> Self {
        BaseTarget { modeenv: ModeenvCache::new(Arc::clone(&ctx.modeenv)) }
    }

    /// Current base, the try base (only reported while `Trying`) and
    /// `base_status`.
    pub fn revisions(&mut self) -> Result<Revisions, BootStateError> {
        let modeenv = self.modeenv.load()?;
        if modeenv.base.is_empty() {
            return Err(StoreError::Malformed("base is empty".into()).into());
        }
        let current = ArtifactPlacement::from_filename(&modeenv.base)
            .map_err(|e| BootStateError::parse("modeenv base", e))?;

        let try_candidate = if modeenv.base_status == BootStatus::Trying && !modeenv.try_base.is_empty() {
            let candidate = ArtifactPlacement::from_filename(&modeenv.try_base)
                .map_err(|e| BootStateError::parse("modeenv try_base", e))?;
            Some(candidate)
        } else {
            None
        };

        Ok(Revisions { current, try_candidate, status: modeenv.base_status })
    }

    /// Stages `next`. Returns whether a reboot is needed to try it.
    pub fn set_next(mut self, next: ArtifactPlacement) -> Result<(bool, BaseNextUpdate), BootStateError> {
        let status = generic_set_next(&mut self, &next)?;
        let try_base = (status == BootStatus::Try).then_some(next);
        tracing::debug!(status = %status, "staged next base");
        Ok((status == BootStatus::Try, BaseNextUpdate { modeenv: self.modeenv, status, try_base }))
    }

    /// Records the base that booted successfully into `plan`.
    pub fn mark_successful(mut self, plan: &mut CommitPlan) -> Result<(), BootStateError> {
        let booted = select_successful(&mut self)?;
        plan.stage_base(self.modeenv, booted)
    }
}

impl BootState for BaseTarget {
    fn revisions(&mut self) -> Result<Revisions, BootStateError> {
        BaseTarget::revisions(self)
    }
}

/// A staged base set_next, applied by [`BaseNextUpdate::commit`].
#[derive(Debug)]
pub struct BaseNextUpdate {
    modeenv: ModeenvCache,
    status: BootStatus,
    try_base: Option<ArtifactPlacement>,
}

impl BaseNextUpdate {
    /// Writes `try_base`/`base_status` in one atomic replace, skipped when
    /// nothing changes.
    pub fn commit(mut self) -> Result<(), BootStateError> {
        let modeenv = self.modeenv.load()?;
        match &self.try_base {
            Some(candidate) => modeenv.try_base = candidate.filename(),
            // try_base is only meaningful while a try is pending.
            None if self.status == BootStatus::Default => modeenv.try_base.clear(),
            None => {}
        }
        modeenv.base_status = self.status;

        if self.modeenv.write_if_changed()? {
            tracing::info!(status = %self.status, "committed next base");
        }
        Ok(())
    }
}
