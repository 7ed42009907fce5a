//! Collaborative editing state: the confirmed version and the local steps the
//! server has not acknowledged yet.
//!
//! Remote steps arrive in server order. Any leading steps that carry our own
//! client id confirm our oldest unconfirmed steps. The rest are applied after
//! temporarily undoing the still-unconfirmed local steps, which are then
//! mapped over the remote steps and redone.

use tracing::{debug, warn};

use crate::client_id::ClientId;
use crate::step::{self, Step};
use crate::transaction::{StepOrigin, Transaction};

/// A local step together with its inverse, so it can be undone and redone
/// around incoming remote steps.
#[derive(Debug, Clone)]
pub struct Rebaseable<S> {
    pub step: S,
    pub inverted: S,
}

#[derive(Debug, Clone)]
pub struct CollabState<S> {
    version: u64,
    unconfirmed: Vec<Rebaseable<S>>,
}

impl<S: Step> CollabState<S> {
    pub fn new(version: u64) -> Self {
        Self {
            version,
            unconfirmed: Vec::new(),
        }
    }

    /// Number of server-confirmed steps incorporated.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn unconfirmed(&self) -> &[Rebaseable<S>] {
        &self.unconfirmed
    }

    /// Moves to the state after `tr`.
    pub fn apply(&mut self, tr: &Transaction<S>) {
        if let Some(state) = tr.collab() {
            *self = state.clone();
            return;
        }
        for (k, (step, origin)) in tr.steps().iter().zip(tr.origins()).enumerate() {
            if *origin == StepOrigin::Local {
                self.unconfirmed.push(Rebaseable {
                    step: step.clone(),
                    inverted: step.invert(&tr.docs()[k]),
                });
            }
        }
    }

    /// The steps that should be sent to the server, in order.
    pub fn sendable_steps(&self) -> Vec<S> {
        self.unconfirmed.iter().map(|r| r.step.clone()).collect()
    }
}

/// Builds the transaction that merges `steps`, received from the server in
/// order and attributed to `client_ids`, into `doc`.
///
/// Fails only when a remote step cannot be applied, which means the local
/// document has diverged from the server's.
pub fn receive_transaction<S: Step>(
    doc: &S::Doc,
    collab: &CollabState<S>,
    steps: Vec<S>,
    client_ids: &[ClientId],
    our_id: ClientId,
) -> step::Result<Transaction<S>> {
    let version = collab.version + steps.len() as u64;
    let ours = client_ids
        .iter()
        .take_while(|&&id| id == our_id)
        .count()
        .min(collab.unconfirmed.len())
        .min(steps.len());
    let mut unconfirmed = collab.unconfirmed[ours..].to_vec();
    let remote = &steps[ours..];

    let mut tr = Transaction::new(doc.clone());
    if remote.is_empty() {
        debug!(version, confirmed = ours, "confirmed own steps");
        tr.set_collab(CollabState {
            version,
            unconfirmed,
        });
        return Ok(tr);
    }

    if unconfirmed.is_empty() {
        for step in remote {
            tr.step_with_origin(step.clone(), StepOrigin::Remote)?;
        }
    } else {
        unconfirmed = rebase_steps(unconfirmed, remote, &mut tr)?;
    }

    debug!(
        version,
        confirmed = ours,
        remote = remote.len(),
        rebased = unconfirmed.len(),
        "received steps"
    );
    tr.set_collab(CollabState {
        version,
        unconfirmed,
    });
    Ok(tr)
}

/// Undoes `steps`, applies `over`, then redoes whatever of `steps` still
/// applies. Each redo is recorded as the mirror of its undo.
fn rebase_steps<S: Step>(
    steps: Vec<Rebaseable<S>>,
    over: &[S],
    tr: &mut Transaction<S>,
) -> step::Result<Vec<Rebaseable<S>>> {
    for r in steps.iter().rev() {
        tr.step_with_origin(r.inverted.clone(), StepOrigin::Rebase)?;
    }
    for step in over {
        tr.step_with_origin(step.clone(), StepOrigin::Remote)?;
    }

    let mut result = Vec::with_capacity(steps.len());
    let mut map_from = steps.len();
    for r in steps {
        let mapped = r.step.map(&tr.mapping().slice(map_from..));
        map_from -= 1;
        let Some(mapped) = mapped else {
            debug!("unconfirmed step dropped by remote changes");
            continue;
        };
        let before = tr.doc().clone();
        match tr.step_with_origin(mapped.clone(), StepOrigin::Rebase) {
            Ok(()) => {
                let redo = tr.steps().len() - 1;
                tr.mapping_mut().set_mirror(map_from, redo);
                result.push(Rebaseable {
                    inverted: mapped.invert(&before),
                    step: mapped,
                });
            }
            Err(e) => warn!(error = %e, "unconfirmed step no longer applies, dropping"),
        }
    }
    Ok(result)
}
