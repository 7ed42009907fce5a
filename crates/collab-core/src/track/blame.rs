//! The blame partition: which commit last touched each part of the document.
//!
//! Stored as end offsets only, so the partition is gap-free by construction:
//! segment `i` covers `[segments[i-1].end, segments[i].end)`.

use serde::Serialize;
use std::ops::Range;
use thiserror::Error;

use super::CommitId;
use crate::mapping::{Assoc, Mappable};

/// Who owns a range of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "commit", rename_all = "camelCase")]
pub enum Attribution {
    /// Loaded with the snapshot or written by another client.
    Untracked,
    /// Written locally and not yet sealed into a commit.
    Uncommitted,
    Commit(CommitId),
}

impl Attribution {
    pub fn commit(&self) -> Option<CommitId> {
        match self {
            Attribution::Commit(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub end: usize,
    pub attribution: Attribution,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlameError {
    #[error("segment ending at {end} does not extend past {start}")]
    NotIncreasing { start: usize, end: usize },

    #[error("adjacent segments ending at {end} share attribution {attribution:?}")]
    Redundant { end: usize, attribution: Attribution },

    #[error("partition covers {covered} units but the document has {size}")]
    SizeMismatch { covered: usize, size: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlamePartition {
    segments: Vec<Segment>,
}

impl BlamePartition {
    /// A partition for a freshly loaded document of `size` units.
    pub fn new(size: usize) -> Self {
        let mut partition = Self::default();
        partition.push(size, Attribution::Untracked);
        partition
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The document size this partition covers.
    pub fn size(&self) -> usize {
        self.segments.last().map_or(0, |s| s.end)
    }

    /// Iterates `(range, attribution)` pairs in document order.
    pub fn ranges(&self) -> impl Iterator<Item = (Range<usize>, Attribution)> + '_ {
        let starts = std::iter::once(0).chain(self.segments.iter().map(|s| s.end));
        starts
            .zip(self.segments.iter())
            .map(|(start, seg)| (start..seg.end, seg.attribution))
    }

    /// Attribution at a cursor position: the unit just before `pos`, or the
    /// first unit when `pos` is 0.
    pub fn query(&self, pos: usize) -> Option<Attribution> {
        self.segments
            .iter()
            .find(|s| s.end >= pos)
            .map(|s| s.attribution)
    }

    /// Carries every boundary through `mapping` into a document of
    /// `new_size` units.
    pub fn remap(&self, mapping: &dyn Mappable, new_size: usize) -> Self {
        let mut out = Self::default();
        if self.segments.is_empty() {
            out.push(new_size, Attribution::Untracked);
            return out;
        }
        let last = self.segments.len() - 1;
        for (i, seg) in self.segments.iter().enumerate() {
            let end = if i == last {
                new_size
            } else {
                mapping.map(seg.end, Assoc::Before).min(new_size)
            };
            out.push(end, seg.attribution);
        }
        out
    }

    /// Marks `from..to` as owned by `attribution`.
    pub fn attribute(&mut self, from: usize, to: usize, attribution: Attribution) {
        let to = to.min(self.size());
        if from >= to {
            return;
        }
        let old = std::mem::take(&mut self.segments);
        let mut start = 0;
        for seg in old {
            self.push(seg.end.min(from), seg.attribution);
            if seg.end > from && start < to {
                self.push(seg.end.min(to), attribution);
            }
            self.push(seg.end, seg.attribution);
            start = seg.end;
        }
    }

    /// Hands every range owned by `from` over to `to`.
    pub fn reattribute(&mut self, from: Attribution, to: Attribution) {
        let old = std::mem::take(&mut self.segments);
        for seg in old {
            let attribution = if seg.attribution == from {
                to
            } else {
                seg.attribution
            };
            self.push(seg.end, attribution);
        }
    }

    /// Checks the partition invariants against a document of `size` units.
    pub fn validate(&self, size: usize) -> Result<(), BlameError> {
        let mut start = 0;
        let mut prev: Option<Attribution> = None;
        for seg in &self.segments {
            if seg.end <= start {
                return Err(BlameError::NotIncreasing {
                    start,
                    end: seg.end,
                });
            }
            if prev == Some(seg.attribution) {
                return Err(BlameError::Redundant {
                    end: seg.end,
                    attribution: seg.attribution,
                });
            }
            start = seg.end;
            prev = Some(seg.attribution);
        }
        if start != size {
            return Err(BlameError::SizeMismatch {
                covered: start,
                size,
            });
        }
        Ok(())
    }

    /// Appends a segment ending at `end`, dropping it when empty and merging
    /// it into the previous one when the attribution matches.
    fn push(&mut self, end: usize, attribution: Attribution) {
        let start = self.size();
        if end <= start {
            return;
        }
        match self.segments.last_mut() {
            Some(last) if last.attribution == attribution => last.end = end,
            _ => self.segments.push(Segment { end, attribution }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{ChangedRange, StepMap};

    fn commit(n: u32) -> Attribution {
        Attribution::Commit(CommitId::new(n))
    }

    fn ranges(partition: &BlamePartition) -> Vec<(Range<usize>, Attribution)> {
        partition.ranges().collect()
    }

    #[test]
    fn test_new_partition() {
        let p = BlamePartition::new(10);
        assert_eq!(ranges(&p), vec![(0..10, Attribution::Untracked)]);
        assert!(BlamePartition::new(0).segments().is_empty());
    }

    #[test]
    fn test_attribute_splits_middle() {
        let mut p = BlamePartition::new(10);
        p.attribute(3, 5, commit(0));
        assert_eq!(
            ranges(&p),
            vec![
                (0..3, Attribution::Untracked),
                (3..5, commit(0)),
                (5..10, Attribution::Untracked),
            ]
        );
        p.validate(10).unwrap();
    }

    #[test]
    fn test_attribute_spanning_segments_merges() {
        let mut p = BlamePartition::new(10);
        p.attribute(2, 4, commit(0));
        p.attribute(6, 8, commit(0));
        p.attribute(3, 7, commit(0));
        assert_eq!(
            ranges(&p),
            vec![
                (0..2, Attribution::Untracked),
                (2..8, commit(0)),
                (8..10, Attribution::Untracked),
            ]
        );
        p.validate(10).unwrap();
    }

    #[test]
    fn test_attribute_whole_document() {
        let mut p = BlamePartition::new(4);
        p.attribute(0, 4, Attribution::Uncommitted);
        assert_eq!(ranges(&p), vec![(0..4, Attribution::Uncommitted)]);
    }

    #[test]
    fn test_attribute_empty_range_is_noop() {
        let mut p = BlamePartition::new(4);
        p.attribute(2, 2, commit(1));
        assert_eq!(p, BlamePartition::new(4));
    }

    #[test]
    fn test_remap_through_insert_extends_segment() {
        let mut p = BlamePartition::new(6);
        p.attribute(0, 3, commit(0));
        let map = StepMap::new(vec![ChangedRange {
            start: 1,
            old_size: 0,
            new_size: 2,
        }]);
        let p = p.remap(&map, 8);
        assert_eq!(
            ranges(&p),
            vec![(0..5, commit(0)), (5..8, Attribution::Untracked)]
        );
    }

    #[test]
    fn test_remap_through_delete_drops_and_merges() {
        let mut p = BlamePartition::new(9);
        p.attribute(3, 6, commit(0));
        let map = StepMap::new(vec![ChangedRange {
            start: 3,
            old_size: 3,
            new_size: 0,
        }]);
        let p = p.remap(&map, 6);
        assert_eq!(ranges(&p), vec![(0..6, Attribution::Untracked)]);
        p.validate(6).unwrap();
    }

    #[test]
    fn test_remap_insert_at_end_grows_last_segment() {
        let p = BlamePartition::new(3);
        let map = StepMap::new(vec![ChangedRange {
            start: 3,
            old_size: 0,
            new_size: 2,
        }]);
        assert_eq!(p.remap(&map, 5).size(), 5);
    }

    #[test]
    fn test_remap_empty_partition() {
        let p = BlamePartition::new(0);
        let p = p.remap(&StepMap::empty(), 4);
        assert_eq!(ranges(&p), vec![(0..4, Attribution::Untracked)]);
    }

    #[test]
    fn test_reattribute_merges_neighbours() {
        let mut p = BlamePartition::new(9);
        p.attribute(0, 3, commit(0));
        p.attribute(3, 6, Attribution::Uncommitted);
        p.reattribute(Attribution::Uncommitted, commit(0));
        assert_eq!(
            ranges(&p),
            vec![(0..6, commit(0)), (6..9, Attribution::Untracked)]
        );
    }

    #[test]
    fn test_query_cursor_semantics() {
        let mut p = BlamePartition::new(6);
        p.attribute(0, 3, commit(2));
        assert_eq!(p.query(0), Some(commit(2)));
        assert_eq!(p.query(3), Some(commit(2)));
        assert_eq!(p.query(4), Some(Attribution::Untracked));
        assert_eq!(p.query(7), None);
    }

    #[test]
    fn test_validate_reports_size_mismatch() {
        let p = BlamePartition::new(4);
        assert_eq!(
            p.validate(5),
            Err(BlameError::SizeMismatch {
                covered: 4,
                size: 5
            })
        );
    }
}
