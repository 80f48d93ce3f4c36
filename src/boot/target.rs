use crate::boot::base::{BaseNextUpdate, BaseTarget};
use crate::boot::generic::Revisions;
use crate::boot::kernel::{KernelNextUpdate, KernelTarget};
use crate::boot::plan::CommitPlan;
use crate::config::BootContext;
use crate::error::BootStateError;
use crate::primitives::ArtifactPlacement;
use crate::types::TargetKind;

/// Boot target for one artifact kind. The set of kinds is closed, so this is
/// an enum rather than a trait object.
#[derive(Debug, Clone)]
pub enum BootTarget {
    Kernel(KernelTarget),
    Base(BaseTarget),
}

/// Entry point for orchestrators.
pub fn boot_target_for(kind: TargetKind, ctx: &BootContext) -> BootTarget {
    match kind {
        TargetKind::Kernel => BootTarget::Kernel(KernelTarget::new(ctx)),
        TargetKind::Base => BootTarget::Base(BaseTarget::new(ctx)),
    }
}

impl BootTarget {
    pub fn kind(&self) -> TargetKind {
        match self {
            BootTarget::Kernel(_) => TargetKind::Kernel,
            BootTarget::Base(_) => TargetKind::Base,
        }
    }

    pub fn revisions(&mut self) -> Result<Revisions, BootStateError> {
        match self {
            BootTarget::Kernel(t) => t.revisions(),
            BootTarget::Base(t) => t.revisions(),
        }
    }

    /// Stages `next` as the artifact to boot. Returns whether a reboot is
    /// required and the update to commit.
    pub fn set_next(self, next: ArtifactPlacement) -> Result<(bool, NextUpdate), BootStateError> {
        match self {
            BootTarget::Kernel(t) => t.set_next(next).map(|(reboot, u)| (reboot, NextUpdate::Kernel(u))),
            BootTarget::Base(t) => t.set_next(next).map(|(reboot, u)| (reboot, NextUpdate::Base(u))),
        }
    }

    pub fn mark_successful(self, plan: &mut CommitPlan) -> Result<(), BootStateError> {
        match self {
            BootTarget::Kernel(t) => t.mark_successful(plan),
            BootTarget::Base(t) => t.mark_successful(plan),
        }
    }
}

/// A staged set_next for either kind.
#[derive(Debug)]
pub enum NextUpdate {
    Kernel(KernelNextUpdate),
    Base(BaseNextUpdate),
}

impl NextUpdate {
    pub fn commit(self) -> Result<(), BootStateError> {
        match self {
            NextUpdate::Kernel(u) => u.commit(),
            NextUpdate::Base(u) => u.commit(),
        }
    }
}
