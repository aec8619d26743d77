// src/memory/mod.rs

//! Buffer coherence tracking.
//!
//! - [`rect`] holds the 3D rectangle algebra.
//! - [`region`] holds [`DataRegion`], the per-buffer validity tracker.

pub mod rect;
pub mod region;

pub use rect::{Id3, Range3, Rect, RectSet};
pub use region::{DataRegion, DataRegionId, ValiditySnapshot};
