use tracing::{debug, info};

use super::{CommitId, Result, TrackError, Tracker};
use crate::step::Step;
use crate::transaction::Transaction;

/// Carries the inverse of every step of commit `id` through all later
/// history and applies what still fits.
///
/// Steps are undone last to first. Each compensating map is appended to the
/// working mapping as the mirror of the step it undoes, so earlier steps of
/// the commit map through both the later history and the undo of their
/// successors.
pub(super) fn revert<S: Step>(
    tracker: &Tracker<S>,
    doc: &S::Doc,
    id: CommitId,
) -> Result<Option<Transaction<S>>> {
    if tracker.is_dirty() {
        return Err(TrackError::Uncommitted {
            pending: tracker.uncommitted(),
        });
    }
    let commit = tracker.commit(id).ok_or(TrackError::UnknownCommit(id))?;
    if tracker.is_reverted(id) {
        debug!(commit = %id, "commit already reverted");
        return Ok(None);
    }
    let Some(first) = commit.seqs().first() else {
        return Ok(None);
    };

    let base = first.index();
    let mut remap = tracker.log().slice(base..).to_mapping();
    let mut tr = Transaction::new(doc.clone());

    for (inverted, seq) in commit.inverted().iter().zip(commit.seqs()).rev() {
        let index = seq.index() - base;
        let Some(step) = inverted.map(&remap.slice(index + 1..)) else {
            debug!(commit = %id, seq = seq.index(), "step no longer applies, skipping");
            continue;
        };
        let map = step.get_map();
        match tr.step(step) {
            Ok(()) => remap.append_map(map, Some(index)),
            Err(e) => {
                debug!(commit = %id, seq = seq.index(), error = %e, "step failed, skipping");
            }
        }
    }

    if !tr.doc_changed() {
        info!(commit = %id, "nothing left to revert");
        return Ok(None);
    }

    tr.set_commit(format!("Revert '{}'", commit.message()))
        .set_reverts(id);
    info!(commit = %id, steps = tr.steps().len(), "built revert");
    Ok(Some(tr))
}
