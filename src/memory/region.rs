// src/memory/region.rs

//! Per-buffer coherence tracking.
//!
//! A [`DataRegion`] is the coherence unit for one logical buffer. For every
//! device that has touched the buffer it records the device allocation and
//! two rectangle sets:
//!
//! - `valid`: ranges whose content on that device is safe to read,
//! - `current`: ranges this device wrote most recently.
//!
//! Writes are single-writer: marking a range current on one device removes it
//! from the valid and current sets of every other device. A range that is not
//! valid on a device is stale there and must be refreshed before it is read.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, warn};

use crate::memory::rect::{Id3, Range3, Rect, RectSet};
use crate::types::{DeviceId, DevicePtr};

/// Index of a data region inside a [`crate::dag::DagGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataRegionId(pub usize);

impl fmt::Display for DataRegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct Allocation {
    ptr: DevicePtr,
    valid: RectSet,
    current: RectSet,
}

impl Allocation {
    fn empty(ptr: DevicePtr) -> Self {
        Self {
            ptr,
            valid: RectSet::new(),
            current: RectSet::new(),
        }
    }
}

/// Valid and current sets of every allocation of a region at one point in
/// time. Allocation pointers are not part of it.
#[derive(Debug, Clone, Default)]
pub struct ValiditySnapshot {
    sets: BTreeMap<DeviceId, (RectSet, RectSet)>,
}

#[derive(Debug, Clone)]
pub struct DataRegion {
    id: DataRegionId,
    name: String,
    num_elements: Range3,
    element_size: usize,
    allocations: BTreeMap<DeviceId, Allocation>,
}

impl DataRegion {
    pub fn new(
        id: DataRegionId,
        name: impl Into<String>,
        num_elements: Range3,
        element_size: usize,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            num_elements,
            element_size,
            allocations: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> DataRegionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_elements(&self) -> Range3 {
        self.num_elements
    }

    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// The whole buffer as a rectangle.
    pub fn full_range(&self) -> Rect {
        Rect::from_extent(self.num_elements)
    }

    /// Bytes needed for one device copy of the buffer, or `None` if that
    /// does not fit in `usize`.
    pub fn allocation_size(&self) -> Option<usize> {
        self.num_elements
            .iter()
            .try_fold(self.element_size, |bytes, &n| bytes.checked_mul(n))
    }

    pub fn has_allocation(&self, device: DeviceId) -> bool {
        self.allocations.contains_key(&device)
    }

    /// Record a freshly allocated buffer on `device`. Nothing in it is valid.
    pub fn add_empty_allocation(&mut self, device: DeviceId, ptr: DevicePtr) {
        if let Some(previous) = self.allocations.insert(device, Allocation::empty(ptr)) {
            warn!(
                region = %self.name,
                %device,
                previous = %previous.ptr,
                "replacing existing allocation; previous contents are no longer tracked"
            );
        }
        debug!(region = %self.name, %device, %ptr, "added empty allocation");
    }

    pub fn get_memory(&self, device: DeviceId) -> Option<DevicePtr> {
        self.allocations.get(&device).map(|a| a.ptr)
    }

    /// Devices that hold an allocation, in ascending order.
    pub fn devices(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.allocations.keys().copied()
    }

    /// Sub-rectangles of the window that are not valid on `device`.
    ///
    /// An empty result means the window can be served from local data.
    pub fn get_outdated_regions(&self, device: DeviceId, offset: Id3, extent: Range3) -> Vec<Rect> {
        let window = Rect::new(offset, extent);
        match self.allocations.get(&device) {
            Some(alloc) => alloc.valid.uncovered(&window),
            None if window.is_empty() => Vec::new(),
            None => vec![window],
        }
    }

    /// Other devices holding valid data that overlaps `rect`, each paired with
    /// the overlapping sub-rectangle.
    ///
    /// Devices holding *current* data for part of `rect` are listed first,
    /// then the remaining valid holders; both groups in ascending device
    /// order. Callers take the first entry.
    pub fn get_update_source_candidates(&self, device: DeviceId, rect: &Rect) -> Vec<(DeviceId, Rect)> {
        let (writers, readers): (Vec<_>, Vec<_>) = self
            .allocations
            .iter()
            .filter(|(d, _)| **d != device)
            .partition(|(_, alloc)| alloc.current.intersects(rect));

        writers
            .into_iter()
            .chain(readers)
            .flat_map(|(d, alloc)| {
                alloc
                    .valid
                    .overlaps(rect)
                    .into_iter()
                    .map(move |piece| (*d, piece))
            })
            .collect()
    }

    /// Mark the window readable on `device` without claiming it is the
    /// latest write.
    pub fn mark_range_valid(&mut self, device: DeviceId, offset: Id3, extent: Range3) {
        let window = Rect::new(offset, extent);
        match self.allocations.get_mut(&device) {
            Some(alloc) => {
                alloc.valid.insert(window);
                debug!(region = %self.name, %device, ?window, "marked range valid");
            }
            None => warn!(
                region = %self.name,
                %device,
                "mark_range_valid on a device without allocation; ignoring"
            ),
        }
    }

    /// Mark the window as the latest write on `device` and invalidate every
    /// other device's copy of it.
    pub fn mark_range_current(&mut self, device: DeviceId, offset: Id3, extent: Range3) {
        let window = Rect::new(offset, extent);
        if !self.allocations.contains_key(&device) {
            warn!(
                region = %self.name,
                %device,
                "mark_range_current on a device without allocation; ignoring"
            );
            return;
        }

        for (d, alloc) in self.allocations.iter_mut() {
            if *d == device {
                alloc.valid.insert(window);
                alloc.current.insert(window);
            } else {
                alloc.valid.remove(&window);
                alloc.current.remove(&window);
            }
        }
        debug!(region = %self.name, %device, ?window, "marked range current");
    }

    /// Valid ranges on `device` (empty if it has no allocation).
    pub fn valid_ranges(&self, device: DeviceId) -> &[Rect] {
        self.allocations
            .get(&device)
            .map(|a| a.valid.rects())
            .unwrap_or(&[])
    }

    pub fn current_ranges(&self, device: DeviceId) -> &[Rect] {
        self.allocations
            .get(&device)
            .map(|a| a.current.rects())
            .unwrap_or(&[])
    }

    /// Whether `window` is entirely valid on `device`.
    pub fn is_valid(&self, device: DeviceId, window: &Rect) -> bool {
        self.allocations
            .get(&device)
            .is_some_and(|a| a.valid.covers(window))
    }

    pub fn validity_snapshot(&self) -> ValiditySnapshot {
        ValiditySnapshot {
            sets: self
                .allocations
                .iter()
                .map(|(d, a)| (*d, (a.valid.clone(), a.current.clone())))
                .collect(),
        }
    }

    /// Put the valid and current sets back to `snapshot`. Allocations made
    /// since the snapshot stay allocated but hold nothing valid.
    pub fn restore_validity(&mut self, mut snapshot: ValiditySnapshot) {
        for (device, alloc) in self.allocations.iter_mut() {
            let (valid, current) = snapshot.sets.remove(device).unwrap_or_default();
            alloc.valid = valid;
            alloc.current = current;
        }
        debug!(region = %self.name, "restored validity state");
    }

    /// Whether `window` fits inside the buffer.
    pub fn contains_window(&self, offset: Id3, extent: Range3) -> bool {
        self.full_range().contains(&Rect::new(offset, extent))
    }
}
