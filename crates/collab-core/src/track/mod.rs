//! Change tracking: commits, the blame partition and selective revert.
//!
//! The tracker never touches the document. It observes every transaction
//! after it has been applied and derives its own state from it:
//!
//! - local steps are buffered as *uncommitted* until a transaction carrying a
//!   commit message seals them into a [`Commit`];
//! - every step map (local, remote or rebase) is appended to one step log so
//!   a commit's inverse can later be carried through everything that
//!   happened after it;
//! - the [`BlamePartition`] is remapped through each step and records who
//!   inserted what.

mod blame;
mod revert;

pub use blame::{Attribution, BlameError, BlamePartition, Segment};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use crate::mapping::{Assoc, Mappable, Mapping, StepMap};
use crate::step::{Document, Step};
use crate::transaction::{StepOrigin, Transaction};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackError {
    #[error("unknown commit {0}")]
    UnknownCommit(CommitId),

    #[error("{pending} uncommitted step(s) pending; commit them before reverting")]
    Uncommitted { pending: usize },
}

pub type Result<T> = std::result::Result<T, TrackError>;

/// Index of a commit in the commit sequence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CommitId(u32);

impl CommitId {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Position of a step map in the tracker's step log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepSeq(usize);

impl StepSeq {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A sealed, immutable group of local steps.
#[derive(Debug, Clone)]
pub struct Commit<S: Step> {
    id: CommitId,
    message: String,
    time: DateTime<Utc>,
    reverts: Option<CommitId>,
    steps: Vec<S>,
    inverted: Vec<S>,
    maps: Vec<StepMap>,
    seqs: Vec<StepSeq>,
}

impl<S: Step> Commit<S> {
    pub fn id(&self) -> CommitId {
        self.id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// The commit this one reverted, if it was produced by a revert.
    pub fn reverts(&self) -> Option<CommitId> {
        self.reverts
    }

    pub fn steps(&self) -> &[S] {
        &self.steps
    }

    /// Inverse of each step, each valid on the document right after it.
    pub fn inverted(&self) -> &[S] {
        &self.inverted
    }

    pub fn maps(&self) -> &[StepMap] {
        &self.maps
    }

    pub fn seqs(&self) -> &[StepSeq] {
        &self.seqs
    }
}

#[derive(Debug, Clone)]
struct PendingStep<S> {
    step: S,
    inverted: S,
    map: StepMap,
    seq: StepSeq,
}

#[derive(Debug, Clone)]
pub struct Tracker<S: Step> {
    commits: Vec<Commit<S>>,
    uncommitted: Vec<PendingStep<S>>,
    blame: BlamePartition,
    log: Mapping,
}

impl<S: Step> Tracker<S> {
    /// A clean tracker for a freshly loaded document. All of its content is
    /// untracked.
    pub fn new(doc: &S::Doc) -> Self {
        Self {
            commits: Vec::new(),
            uncommitted: Vec::new(),
            blame: BlamePartition::new(doc.size()),
            log: Mapping::new(),
        }
    }

    /// Observes an applied transaction.
    pub fn record(&mut self, tr: &Transaction<S>) {
        if tr.doc_changed() {
            let seq0 = self.log.len();
            self.log.append_mapping(tr.mapping());
            self.update_blame(tr);

            let maps = tr.mapping().maps();
            for (k, (step, origin)) in tr.steps().iter().zip(tr.origins()).enumerate() {
                if *origin != StepOrigin::Local {
                    continue;
                }
                self.uncommitted.push(PendingStep {
                    step: step.clone(),
                    inverted: step.invert(&tr.docs()[k]),
                    map: maps[k].clone(),
                    seq: StepSeq(seq0 + k),
                });
            }
        }

        if let Some(message) = tr.commit_message() {
            self.seal(message, tr.time(), tr.reverts());
        }
    }

    /// Recomputes the partition after each step of `tr` from the partition
    /// the transaction started with, so that undo/redo pairs recorded as
    /// mirrors hand their content back to its previous owner.
    fn update_blame(&mut self, tr: &Transaction<S>) {
        let base = std::mem::take(&mut self.blame);
        let mapping = tr.mapping();
        let origins = tr.origins();

        let mut blame = base.clone();
        for k in 0..mapping.len() {
            let size = tr.doc_after(k).size();
            blame = base.remap(&mapping.slice(..=k), size);
            for (i, map) in mapping.maps()[..=k].iter().enumerate() {
                let attribution = match origins[i] {
                    StepOrigin::Local => Attribution::Uncommitted,
                    StepOrigin::Remote => Attribution::Untracked,
                    StepOrigin::Rebase => continue,
                };
                let after = mapping.slice(i + 1..=k);
                map.for_each(|_, _, start, end| {
                    let from = after.map(start, Assoc::After);
                    let to = after.map(end, Assoc::Before);
                    blame.attribute(from, to, attribution);
                });
            }
            debug_assert_eq!(blame.validate(size), Ok(()));
        }
        self.blame = blame;
    }

    fn seal(&mut self, message: &str, time: DateTime<Utc>, reverts: Option<CommitId>) {
        if self.uncommitted.is_empty() {
            debug!(message, "nothing to commit");
            return;
        }

        let id = CommitId(self.commits.len() as u32);
        let pending = std::mem::take(&mut self.uncommitted);
        let mut commit = Commit {
            id,
            message: message.to_string(),
            time,
            reverts,
            steps: Vec::with_capacity(pending.len()),
            inverted: Vec::with_capacity(pending.len()),
            maps: Vec::with_capacity(pending.len()),
            seqs: Vec::with_capacity(pending.len()),
        };
        for p in pending {
            commit.steps.push(p.step);
            commit.inverted.push(p.inverted);
            commit.maps.push(p.map);
            commit.seqs.push(p.seq);
        }

        self.blame
            .reattribute(Attribution::Uncommitted, Attribution::Commit(id));
        info!(commit = %id, message, steps = commit.steps.len(), "sealed commit");
        self.commits.push(commit);
    }

    pub fn commits(&self) -> &[Commit<S>] {
        &self.commits
    }

    pub fn commit(&self, id: CommitId) -> Option<&Commit<S>> {
        self.commits.get(id.index())
    }

    /// Number of local steps applied since the last commit.
    pub fn uncommitted(&self) -> usize {
        self.uncommitted.len()
    }

    pub fn is_dirty(&self) -> bool {
        !self.uncommitted.is_empty()
    }

    pub fn blame(&self) -> &BlamePartition {
        &self.blame
    }

    /// Who owns the content at `pos`. `None` only for an empty document.
    pub fn query(&self, pos: usize) -> Option<Attribution> {
        self.blame.query(pos)
    }

    /// Every step map the document went through since load.
    pub fn log(&self) -> &Mapping {
        &self.log
    }

    /// Whether a live commit currently undoes `id`. A revert that was itself
    /// reverted does not count.
    pub fn is_reverted(&self, id: CommitId) -> bool {
        self.commits[id.index().saturating_add(1).min(self.commits.len())..]
            .iter()
            .any(|c| c.reverts == Some(id) && !self.is_reverted(c.id))
    }

    /// Builds the transaction that undoes commit `id` on top of `doc`, or
    /// `None` when there is nothing left to undo.
    pub fn revert(&self, doc: &S::Doc, id: CommitId) -> Result<Option<Transaction<S>>> {
        revert::revert(self, doc, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::{ReplaceStep, TextDoc};

    fn local(doc: &TextDoc, steps: Vec<ReplaceStep>) -> Transaction<ReplaceStep> {
        let mut tr = Transaction::new(doc.clone());
        for step in steps {
            tr.step(step).unwrap();
        }
        tr
    }

    fn commit(n: u32) -> Attribution {
        Attribution::Commit(CommitId::new(n))
    }

    // ==================== Record ====================

    #[test]
    fn test_local_steps_are_uncommitted() {
        let doc = TextDoc::new("hello");
        let mut tracker = Tracker::new(&doc);
        let tr = local(&doc, vec![ReplaceStep::insert(5, " world")]);
        tracker.record(&tr);

        assert!(tracker.is_dirty());
        assert_eq!(tracker.uncommitted(), 1);
        assert_eq!(tracker.query(2), Some(Attribution::Untracked));
        assert_eq!(tracker.query(8), Some(Attribution::Uncommitted));
        tracker.blame().validate(11).unwrap();
    }

    #[test]
    fn test_commit_seals_pending_and_batch() {
        let doc = TextDoc::new("");
        let mut tracker = Tracker::new(&doc);
        let tr = local(&doc, vec![ReplaceStep::insert(0, "ab")]);
        tracker.record(&tr);

        let mut tr = local(tr.doc(), vec![ReplaceStep::insert(2, "cd")]);
        tr.set_commit("first");
        tracker.record(&tr);

        assert!(!tracker.is_dirty());
        assert_eq!(tracker.commits().len(), 1);
        let c = &tracker.commits()[0];
        assert_eq!(c.message(), "first");
        assert_eq!(c.steps().len(), 2);
        assert_eq!(c.seqs(), &[StepSeq(0), StepSeq(1)]);
        assert_eq!(tracker.blame().segments().len(), 1);
        assert_eq!(tracker.query(3), Some(commit(0)));
    }

    #[test]
    fn test_commit_with_nothing_pending_is_noop() {
        let doc = TextDoc::new("abc");
        let mut tracker = Tracker::<ReplaceStep>::new(&doc);
        let mut tr = Transaction::new(doc.clone());
        tr.set_commit("empty");
        tracker.record(&tr);
        assert!(tracker.commits().is_empty());
    }

    #[test]
    fn test_remote_steps_stay_untracked_and_clean() {
        let doc = TextDoc::new("abc");
        let mut tracker = Tracker::new(&doc);
        let mut tr = Transaction::new(doc.clone());
        tr.step_with_origin(ReplaceStep::insert(1, "xyz"), StepOrigin::Remote)
            .unwrap();
        tracker.record(&tr);

        assert!(!tracker.is_dirty());
        assert_eq!(tracker.blame().segments().len(), 1);
        assert_eq!(tracker.query(3), Some(Attribution::Untracked));
        assert_eq!(tracker.log().len(), 1);
    }

    #[test]
    fn test_delete_shrinks_attribution() {
        let doc = TextDoc::new("");
        let mut tracker = Tracker::new(&doc);
        let mut tr = local(&doc, vec![ReplaceStep::insert(0, "aaaa")]);
        tr.set_commit("a");
        tracker.record(&tr);

        let mut tr = local(tr.doc(), vec![ReplaceStep::insert(4, "bbbb")]);
        tr.set_commit("b");
        tracker.record(&tr);

        let tr = local(tr.doc(), vec![ReplaceStep::delete(2, 6)]);
        tracker.record(&tr);

        let ranges: Vec<_> = tracker.blame().ranges().collect();
        assert_eq!(ranges, vec![(0..2, commit(0)), (2..4, commit(1))]);
        assert!(tracker.is_dirty());
    }

    #[test]
    fn test_replace_marks_inserted_text() {
        let doc = TextDoc::new("abcdef");
        let mut tracker = Tracker::new(&doc);
        let tr = local(&doc, vec![ReplaceStep::new(2, 4, "XYZ")]);
        tracker.record(&tr);
        let ranges: Vec<_> = tracker.blame().ranges().collect();
        assert_eq!(
            ranges,
            vec![
                (0..2, Attribution::Untracked),
                (2..5, Attribution::Uncommitted),
                (5..7, Attribution::Untracked),
            ]
        );
    }

    #[test]
    fn test_query_empty_document() {
        let tracker = Tracker::<ReplaceStep>::new(&TextDoc::new(""));
        assert_eq!(tracker.query(0), None);
    }

    // ==================== Reverted commits ====================

    #[test]
    fn test_is_reverted_follows_revert_chain() {
        let doc = TextDoc::new("");
        let mut tracker = Tracker::new(&doc);
        let mut tr = local(&doc, vec![ReplaceStep::insert(0, "abc")]);
        tr.set_commit("add");
        tracker.record(&tr);
        let c0 = CommitId::new(0);
        assert!(!tracker.is_reverted(c0));

        let undo = tracker.revert(tr.doc(), c0).unwrap().unwrap();
        tracker.record(&undo);
        assert!(tracker.is_reverted(c0));

        let redo = tracker
            .revert(undo.doc(), CommitId::new(1))
            .unwrap()
            .unwrap();
        tracker.record(&redo);
        assert!(tracker.is_reverted(CommitId::new(1)));
        assert!(!tracker.is_reverted(c0));
        assert_eq!(redo.doc().as_str(), "abc");
    }
}
