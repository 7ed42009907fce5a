//! Position mapping: step maps and their composition.
//!
//! A [`StepMap`] describes how one edit step moved positions around. A
//! [`Mapping`] is an ordered, append-only list of step maps that can be
//! sliced into sub-ranges ([`MappingSlice`]) and used to carry a position
//! that was valid at some point in history forward to a later point.
//!
//! Maps can be paired as *mirrors* (a map and the map that undoes it). When a
//! position is mapped through a slice that contains both halves of a pair,
//! the position is recovered from the second half instead of collapsing
//! into the deleted range of the first. This is what lets positions survive
//! an undo/redo pair during rebasing, and what makes cascading reverts line
//! up with the content they restore.

use std::ops::{Bound, RangeBounds};

/// Which side a position sticks to when content is inserted right at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    /// Stay before content inserted at the position.
    Before,
    /// Move after content inserted at the position.
    After,
}

/// Token that allows a position deleted by one map to be recovered by its
/// mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recover {
    index: usize,
    offset: usize,
}

/// Result of mapping a single position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapResult {
    /// The mapped position.
    pub pos: usize,
    /// Whether the content on the `assoc` side of the position was deleted.
    pub deleted: bool,
    recover: Option<Recover>,
}

impl MapResult {
    fn moved(pos: usize) -> Self {
        Self {
            pos,
            deleted: false,
            recover: None,
        }
    }
}

/// Anything positions can be mapped through.
pub trait Mappable {
    fn map_result(&self, pos: usize, assoc: Assoc) -> MapResult;

    fn map(&self, pos: usize, assoc: Assoc) -> usize {
        self.map_result(pos, assoc).pos
    }
}

/// One replaced range: `old_size` units at `start` became `new_size` units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangedRange {
    pub start: usize,
    pub old_size: usize,
    pub new_size: usize,
}

/// The position-remapping function produced by one edit step.
///
/// Ranges are sorted by `start` and expressed in the coordinates of the
/// document *before* the step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepMap {
    ranges: Vec<ChangedRange>,
    inverted: bool,
}

impl StepMap {
    pub fn new(ranges: Vec<ChangedRange>) -> Self {
        Self {
            ranges,
            inverted: false,
        }
    }

    /// The identity map.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_identity(&self) -> bool {
        self.ranges
            .iter()
            .all(|r| r.old_size == 0 && r.new_size == 0)
    }

    /// A map that undoes this one.
    pub fn invert(&self) -> Self {
        Self {
            ranges: self.ranges.clone(),
            inverted: !self.inverted,
        }
    }

    fn sizes(&self, range: &ChangedRange) -> (usize, usize) {
        if self.inverted {
            (range.new_size, range.old_size)
        } else {
            (range.old_size, range.new_size)
        }
    }

    /// Calls `f(old_start, old_end, new_start, new_end)` for every changed
    /// range, in document order.
    pub fn for_each(&self, mut f: impl FnMut(usize, usize, usize, usize)) {
        let mut diff: isize = 0;
        for range in &self.ranges {
            let (old_size, new_size) = self.sizes(range);
            let start = if self.inverted {
                offset(range.start, -diff)
            } else {
                range.start
            };
            let new_start = offset(start, diff);
            f(start, start + old_size, new_start, new_start + new_size);
            diff += new_size as isize - old_size as isize;
        }
    }

    /// Maps a position that was deleted by this map's mirror back into the
    /// content this map (re)inserted.
    pub fn recover(&self, token: Recover) -> usize {
        let mut diff: isize = 0;
        if !self.inverted {
            for range in &self.ranges[..token.index] {
                diff += range.new_size as isize - range.old_size as isize;
            }
        }
        offset(self.ranges[token.index].start, diff) + token.offset
    }
}

impl Mappable for StepMap {
    fn map_result(&self, pos: usize, assoc: Assoc) -> MapResult {
        let mut diff: isize = 0;
        for (index, range) in self.ranges.iter().enumerate() {
            let (old_size, new_size) = self.sizes(range);
            let start = if self.inverted {
                offset(range.start, -diff)
            } else {
                range.start
            };
            if start > pos {
                break;
            }
            let end = start + old_size;
            if pos <= end {
                let side = if old_size == 0 {
                    assoc
                } else if pos == start {
                    Assoc::Before
                } else if pos == end {
                    Assoc::After
                } else {
                    assoc
                };
                let mapped = offset(start, diff)
                    + match side {
                        Assoc::Before => 0,
                        Assoc::After => new_size,
                    };
                let edge = match assoc {
                    Assoc::Before => start,
                    Assoc::After => end,
                };
                let recover = (pos != edge).then_some(Recover {
                    index,
                    offset: pos - start,
                });
                return MapResult {
                    pos: mapped,
                    deleted: pos != edge,
                    recover,
                };
            }
            diff += new_size as isize - old_size as isize;
        }
        MapResult::moved(offset(pos, diff))
    }
}

fn offset(pos: usize, diff: isize) -> usize {
    pos.saturating_add_signed(diff)
}

/// An append-only sequence of step maps with optional mirror pairs.
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    maps: Vec<StepMap>,
    mirrors: Vec<(usize, usize)>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_maps(maps: Vec<StepMap>) -> Self {
        Self {
            maps,
            mirrors: Vec::new(),
        }
    }

    pub fn maps(&self) -> &[StepMap] {
        &self.maps
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Appends a map. When `mirror_of` is set, the new map is recorded as
    /// the mirror of the map at that index.
    pub fn append_map(&mut self, map: StepMap, mirror_of: Option<usize>) {
        self.maps.push(map);
        if let Some(index) = mirror_of {
            self.set_mirror(index, self.maps.len() - 1);
        }
    }

    /// Appends every map of `other`, carrying its internal mirror pairs.
    pub fn append_mapping(&mut self, other: &Mapping) {
        let start = self.maps.len();
        for (i, map) in other.maps.iter().enumerate() {
            let mirror = other.get_mirror(i).filter(|&m| m < i).map(|m| start + m);
            self.append_map(map.clone(), mirror);
        }
    }

    pub fn set_mirror(&mut self, a: usize, b: usize) {
        self.mirrors.push((a, b));
    }

    pub fn get_mirror(&self, index: usize) -> Option<usize> {
        self.mirrors.iter().find_map(|&(a, b)| {
            if a == index {
                Some(b)
            } else if b == index {
                Some(a)
            } else {
                None
            }
        })
    }

    /// A view over the maps in `range`.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> MappingSlice<'_> {
        let from = match range.start_bound() {
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n + 1,
            Bound::Unbounded => 0,
        };
        let to = match range.end_bound() {
            Bound::Included(&n) => n + 1,
            Bound::Excluded(&n) => n,
            Bound::Unbounded => self.maps.len(),
        };
        let to = to.min(self.maps.len());
        MappingSlice {
            mapping: self,
            from: from.min(to),
            to,
        }
    }
}

impl Mappable for Mapping {
    fn map_result(&self, pos: usize, assoc: Assoc) -> MapResult {
        self.slice(..).map_result(pos, assoc)
    }
}

/// A borrowed sub-range of a [`Mapping`].
#[derive(Debug, Clone, Copy)]
pub struct MappingSlice<'a> {
    mapping: &'a Mapping,
    from: usize,
    to: usize,
}

impl MappingSlice<'_> {
    pub fn len(&self) -> usize {
        self.to - self.from
    }

    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }

    /// Copies the slice into an owned mapping, keeping mirror pairs whose
    /// both halves fall inside it.
    pub fn to_mapping(&self) -> Mapping {
        let mut owned = Mapping::from_maps(self.mapping.maps[self.from..self.to].to_vec());
        for &(a, b) in &self.mapping.mirrors {
            if (self.from..self.to).contains(&a) && (self.from..self.to).contains(&b) {
                owned.set_mirror(a - self.from, b - self.from);
            }
        }
        owned
    }
}

impl Mappable for MappingSlice<'_> {
    fn map_result(&self, pos: usize, assoc: Assoc) -> MapResult {
        let maps = &self.mapping.maps;
        let mut pos = pos;
        let mut deleted = false;
        let mut i = self.from;
        while i < self.to {
            let result = maps[i].map_result(pos, assoc);
            if let Some(token) = result.recover {
                if let Some(mirror) = self.mapping.get_mirror(i) {
                    if mirror > i && mirror < self.to {
                        pos = maps[mirror].recover(token);
                        i = mirror + 1;
                        continue;
                    }
                }
            }
            deleted |= result.deleted;
            pos = result.pos;
            i += 1;
        }
        MapResult {
            pos,
            deleted,
            recover: None,
        }
    }
}
