// src/memory/rect.rs

//! Axis-aligned 3D rectangles in element coordinates, and a set of disjoint
//! rectangles with subtraction and coalescing.
//!
//! This is the geometry underneath the validity tracker: every "valid" or
//! "current" range of a data region is a [`RectSet`].

use std::cmp::{max, min};
use std::fmt;

/// 3D element index.
pub type Id3 = [usize; 3];

/// 3D element count.
pub type Range3 = [usize; 3];

/// Half-open box `[offset, offset + extent)` along each of the three axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rect {
    pub offset: Id3,
    pub extent: Range3,
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x, y, z] = self.offset;
        let [w, h, d] = self.extent;
        write!(f, "({x},{y},{z})+({w},{h},{d})")
    }
}

impl Rect {
    pub const fn new(offset: Id3, extent: Range3) -> Self {
        Self { offset, extent }
    }

    /// Rectangle starting at the origin.
    pub const fn from_extent(extent: Range3) -> Self {
        Self::new([0, 0, 0], extent)
    }

    /// Exclusive upper corner.
    pub fn end(&self) -> Id3 {
        [
            self.offset[0] + self.extent[0],
            self.offset[1] + self.extent[1],
            self.offset[2] + self.extent[2],
        ]
    }

    /// Exclusive upper corner, or `None` if it is not representable.
    pub fn checked_end(&self) -> Option<Id3> {
        Some([
            self.offset[0].checked_add(self.extent[0])?,
            self.offset[1].checked_add(self.extent[1])?,
            self.offset[2].checked_add(self.extent[2])?,
        ])
    }

    pub fn is_empty(&self) -> bool {
        self.extent.iter().any(|&e| e == 0)
    }

    /// Number of elements covered.
    pub fn volume(&self) -> usize {
        self.extent.iter().product()
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let (a_end, b_end) = (self.end(), other.end());
        let mut offset = [0; 3];
        let mut extent = [0; 3];

        for d in 0..3 {
            let lo = max(self.offset[d], other.offset[d]);
            let hi = min(a_end[d], b_end[d]);
            if hi <= lo {
                return None;
            }
            offset[d] = lo;
            extent[d] = hi - lo;
        }

        Some(Rect::new(offset, extent))
    }

    pub fn overlaps(&self, other: &Rect) -> bool {
        self.intersection(other).is_some()
    }

    /// Whether `other` lies entirely inside `self`. Empty rectangles are
    /// contained everywhere; a rectangle whose end overflows is contained
    /// nowhere.
    pub fn contains(&self, other: &Rect) -> bool {
        if other.is_empty() {
            return true;
        }
        let (Some(a_end), Some(b_end)) = (self.checked_end(), other.checked_end()) else {
            return false;
        };
        (0..3).all(|d| self.offset[d] <= other.offset[d] && b_end[d] <= a_end[d])
    }

    /// `self` minus `other`, as at most six disjoint boxes.
    ///
    /// The box is peeled one axis at a time: the slabs below and above the
    /// overlap along an axis are emitted, and the remainder is narrowed to
    /// the overlap before moving to the next axis.
    pub fn subtract(&self, other: &Rect) -> Vec<Rect> {
        if self.is_empty() {
            return Vec::new();
        }
        let Some(overlap) = self.intersection(other) else {
            return vec![*self];
        };

        let mut pieces = Vec::new();
        let mut rest = *self;
        let overlap_end = overlap.end();

        for d in 0..3 {
            let rest_end = rest.offset[d] + rest.extent[d];

            if rest.offset[d] < overlap.offset[d] {
                let mut below = rest;
                below.extent[d] = overlap.offset[d] - rest.offset[d];
                pieces.push(below);
            }
            if overlap_end[d] < rest_end {
                let mut above = rest;
                above.offset[d] = overlap_end[d];
                above.extent[d] = rest_end - overlap_end[d];
                pieces.push(above);
            }

            rest.offset[d] = overlap.offset[d];
            rest.extent[d] = overlap.extent[d];
        }

        pieces
    }

    /// Merge two boxes that share a full face, i.e. they are adjacent along
    /// exactly one axis and identical along the other two.
    pub fn merge(&self, other: &Rect) -> Option<Rect> {
        for d in 0..3 {
            let others_equal = (0..3)
                .filter(|&o| o != d)
                .all(|o| self.offset[o] == other.offset[o] && self.extent[o] == other.extent[o]);
            if !others_equal {
                continue;
            }

            let mut merged = *self;
            if self.offset[d] + self.extent[d] == other.offset[d] {
                merged.extent[d] = self.extent[d] + other.extent[d];
                return Some(merged);
            }
            if other.offset[d] + other.extent[d] == self.offset[d] {
                merged.offset[d] = other.offset[d];
                merged.extent[d] = self.extent[d] + other.extent[d];
                return Some(merged);
            }
        }
        None
    }
}

/// A set of pairwise-disjoint rectangles.
///
/// Every mutation keeps the set disjoint and coalesces neighbours that share
/// a face, so a fully covered window is represented by a single box whenever
/// the pieces line up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RectSet {
    rects: Vec<Rect>,
}

impl RectSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rect> {
        self.rects.iter()
    }

    /// Total number of covered elements.
    pub fn volume(&self) -> usize {
        self.rects.iter().map(Rect::volume).sum()
    }

    pub fn insert(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }

        let mut pieces = vec![rect];
        for existing in &self.rects {
            pieces = pieces.iter().flat_map(|p| p.subtract(existing)).collect();
            if pieces.is_empty() {
                return;
            }
        }

        self.rects.extend(pieces);
        coalesce(&mut self.rects);
    }

    pub fn remove(&mut self, rect: &Rect) {
        if !self.rects.iter().any(|r| r.overlaps(rect)) {
            return;
        }
        self.rects = self.rects.iter().flat_map(|r| r.subtract(rect)).collect();
        coalesce(&mut self.rects);
    }

    /// Parts of the set that fall inside `window`.
    pub fn overlaps(&self, window: &Rect) -> Vec<Rect> {
        self.rects
            .iter()
            .filter_map(|r| r.intersection(window))
            .collect()
    }

    /// Parts of `window` the set does not cover.
    pub fn uncovered(&self, window: &Rect) -> Vec<Rect> {
        if window.is_empty() {
            return Vec::new();
        }

        let mut pieces = vec![*window];
        for existing in &self.rects {
            pieces = pieces.iter().flat_map(|p| p.subtract(existing)).collect();
            if pieces.is_empty() {
                break;
            }
        }

        coalesce(&mut pieces);
        pieces
    }

    pub fn covers(&self, window: &Rect) -> bool {
        self.uncovered(window).is_empty()
    }

    pub fn intersects(&self, window: &Rect) -> bool {
        self.rects.iter().any(|r| r.overlaps(window))
    }
}

/// Merge face-sharing neighbours until no pair merges, then sort so equal
/// sets compare equal.
fn coalesce(rects: &mut Vec<Rect>) {
    'outer: loop {
        for i in 0..rects.len() {
            for j in (i + 1)..rects.len() {
                if let Some(merged) = rects[i].merge(&rects[j]) {
                    rects[i] = merged;
                    rects.swap_remove(j);
                    continue 'outer;
                }
            }
        }
        break;
    }
    rects.sort();
}
