//! Ephemeral overlay marking the ranges owned by one commit.

use std::ops::Range;

use crate::mapping::{Assoc, Mappable};
use crate::step::Step;
use crate::track::{Attribution, BlamePartition, CommitId};
use crate::transaction::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighlightMeta {
    Add(CommitId),
    Clear(CommitId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Highlight {
    commit: Option<CommitId>,
    ranges: Vec<Range<usize>>,
}

impl Highlight {
    pub fn commit(&self) -> Option<CommitId> {
        self.commit
    }

    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    /// State after `tr`. `blame` is the partition of the document `tr`
    /// produced.
    pub fn apply<S: Step>(&self, tr: &Transaction<S>, blame: &BlamePartition) -> Self {
        match tr.highlight() {
            Some(HighlightMeta::Add(id)) if self.commit != Some(*id) => Self {
                commit: Some(*id),
                ranges: blame
                    .ranges()
                    .filter(|(_, a)| *a == Attribution::Commit(*id))
                    .map(|(range, _)| range)
                    .collect(),
            },
            Some(HighlightMeta::Clear(id)) if self.commit == Some(*id) => Self::default(),
            _ if tr.doc_changed() && self.commit.is_some() => Self {
                commit: self.commit,
                ranges: self
                    .ranges
                    .iter()
                    .filter_map(|r| {
                        let start = tr.mapping().map(r.start, Assoc::After);
                        let end = tr.mapping().map(r.end, Assoc::Before);
                        (start < end).then_some(start..end)
                    })
                    .collect(),
            },
            _ => self.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::{ReplaceStep, TextDoc};
    use crate::track::Tracker;

    fn setup() -> (TextDoc, Tracker<ReplaceStep>) {
        let doc = TextDoc::new("");
        let mut tracker = Tracker::new(&doc);
        let mut tr = Transaction::new(doc);
        tr.step(ReplaceStep::insert(0, "aaa")).unwrap();
        tr.set_commit("a");
        tracker.record(&tr);
        let mut tr2 = Transaction::new(tr.doc().clone());
        tr2.step(ReplaceStep::insert(3, "bbb")).unwrap();
        tr2.set_commit("b");
        tracker.record(&tr2);
        (tr2.doc().clone(), tracker)
    }

    fn meta(doc: &TextDoc, meta: HighlightMeta) -> Transaction<ReplaceStep> {
        let mut tr = Transaction::new(doc.clone());
        tr.set_highlight(meta);
        tr
    }

    #[test]
    fn test_add_selects_commit_ranges() {
        let (doc, tracker) = setup();
        let h = Highlight::default().apply(
            &meta(&doc, HighlightMeta::Add(CommitId::new(1))),
            tracker.blame(),
        );
        assert_eq!(h.commit(), Some(CommitId::new(1)));
        assert_eq!(h.ranges(), &[3..6]);
    }

    #[test]
    fn test_clear_only_matching_commit() {
        let (doc, tracker) = setup();
        let h = Highlight::default().apply(
            &meta(&doc, HighlightMeta::Add(CommitId::new(0))),
            tracker.blame(),
        );
        let same = h.apply(
            &meta(&doc, HighlightMeta::Clear(CommitId::new(1))),
            tracker.blame(),
        );
        assert_eq!(same, h);
        let cleared = h.apply(
            &meta(&doc, HighlightMeta::Clear(CommitId::new(0))),
            tracker.blame(),
        );
        assert_eq!(cleared, Highlight::default());
    }

    #[test]
    fn test_ranges_follow_edits() {
        let (doc, tracker) = setup();
        let h = Highlight::default().apply(
            &meta(&doc, HighlightMeta::Add(CommitId::new(1))),
            tracker.blame(),
        );
        let mut tr = Transaction::new(doc);
        tr.step(ReplaceStep::insert(0, "zz")).unwrap();
        let h = h.apply(&tr, tracker.blame());
        assert_eq!(h.ranges(), &[5..8]);
    }
}
