//! Decision logic shared verbatim by the kernel and base targets.

use crate::error::BootStateError;
use crate::primitives::ArtifactPlacement;
use crate::types::BootStatus;

/// What a target reports about itself: the current artifact, the try
/// candidate if one is known, and the try/commit status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revisions {
    pub current: ArtifactPlacement,
    pub try_candidate: Option<ArtifactPlacement>,
    pub status: BootStatus,
}

/// Seam implemented by both boot targets so the decisions below cannot
/// diverge between them.
pub(crate) trait BootState {
    fn revisions(&mut self) -> Result<Revisions, BootStateError>;
}

/// Status to stage for `next`: re-asserting the current artifact resets the
/// status to `Default` (no reboot), anything else is staged as `Try`.
///
/// Only the current artifact is compared; a candidate that is already pending
/// is staged as `Try` again.
pub(crate) fn generic_set_next<S: BootState + ?Sized>(
    state: &mut S,
    next: &ArtifactPlacement,
) -> Result<BootStatus, BootStateError> {
    let Revisions { current, .. } = state.revisions()?;
    if current.same_artifact(next) {
        return Ok(BootStatus::Default);
    }
    Ok(BootStatus::Try)
}

/// Picks the artifact to mark successful. The boot script only moves a status
/// from `Try` to `Trying` when it boots the candidate, so `Trying` with a
/// known candidate means the candidate is what is running; in every other case
/// the current artifact is.
pub(crate) fn select_successful<S: BootState + ?Sized>(
    state: &mut S,
) -> Result<ArtifactPlacement, BootStateError> {
    let Revisions { current, try_candidate, status } = state.revisions()?;
    match (status, try_candidate) {
        (BootStatus::Trying, Some(candidate)) => Ok(candidate),
        (BootStatus::Trying, None) => {
            tracing::warn!(current = %current, "status is trying but no try candidate is known, keeping current");
            Ok(current)
        }
        _ => Ok(current),
    }
}
