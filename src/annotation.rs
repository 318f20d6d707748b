//! Annotation value types and the per-object keyframe store.
//!
//! - `BoundingBox`: axis-aligned rectangle in frame pixel coordinates.
//! - `AnnotatedFrame`: a box (or its absence) at one frame, tagged with provenance.
//! - `AnnotatedObject`: ordered, deduplicated keyframes for one tracked object.
//!
//! The store doubles as the tracker's memo table: interpolated frames are added
//! back so they are never recomputed. Entries only disappear when the whole
//! object is discarded on a frame source reset.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Every Nth stationary frame is reported as not stationary so downstream
/// consumers get a periodic refresh of unchanged boxes.
pub const STATIONARY_REFRESH_INTERVAL: u32 = 5;

// ----------------------------------------------------------------------------
// Value types
// ----------------------------------------------------------------------------

/// Axis-aligned rectangle in frame pixel coordinates.
///
/// Width and height are expected to be non-negative; this is left to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// A bounding box at a particular frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedFrame {
    pub frame_number: u64,
    /// `None` when the object is occluded or out of view.
    pub bbox: Option<BoundingBox>,
    /// True only for frames a human authored.
    pub is_ground_truth: bool,
    /// Consecutive interpolated frames this object has been held in place.
    pub stationary_count: u32,
}

impl AnnotatedFrame {
    pub fn new(
        frame_number: u64,
        bbox: Option<BoundingBox>,
        is_ground_truth: bool,
        stationary_count: u32,
    ) -> Self {
        Self {
            frame_number,
            bbox,
            is_ground_truth,
            stationary_count,
        }
    }

    /// Human-authored keyframe.
    pub fn keyframe(frame_number: u64, bbox: Option<BoundingBox>) -> Self {
        Self::new(frame_number, bbox, true, 0)
    }

    /// Placeholder held at frame 0 until a human says otherwise.
    pub fn invisible_origin() -> Self {
        Self::new(0, None, false, 0)
    }

    pub fn is_visible(&self) -> bool {
        self.bbox.is_some()
    }

    /// False on every `STATIONARY_REFRESH_INTERVAL`th count, including 0.
    pub fn is_stationary(&self) -> bool {
        self.stationary_count % STATIONARY_REFRESH_INTERVAL != 0
    }
}

// ----------------------------------------------------------------------------
// AnnotatedObject: sorted keyframe store
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object:{}", self.0)
    }
}

/// One object's boxes throughout the frame sequence.
///
/// Frames are keyed by frame number, so ordering and uniqueness hold by
/// construction. After the first `add`, an entry at frame 0 always exists.
#[derive(Clone, Debug)]
pub struct AnnotatedObject {
    id: ObjectId,
    label: String,
    /// Set by the author when the object is known not to move. Drives the
    /// stationary counter on interpolated frames.
    stationary: bool,
    frames: BTreeMap<u64, AnnotatedFrame>,
}

impl AnnotatedObject {
    /// Create an object with no keyframes.
    pub fn new(id: ObjectId, label: impl Into<String>, stationary: bool) -> Self {
        Self {
            id,
            label: label.into(),
            stationary,
            frames: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_stationary(&self) -> bool {
        self.stationary
    }

    /// Insert a frame, replacing any entry with the same frame number.
    ///
    /// The origin entry is injected in the same call, so no reader holding the
    /// object can see a store without frame 0.
    pub fn add(&mut self, frame: AnnotatedFrame) {
        self.frames.insert(frame.frame_number, frame);
        self.frames
            .entry(0)
            .or_insert_with(AnnotatedFrame::invisible_origin);
    }

    /// Exact lookup. Never interpolates.
    pub fn get(&self, frame_number: u64) -> Option<&AnnotatedFrame> {
        self.frames.get(&frame_number)
    }

    pub fn contains(&self, frame_number: u64) -> bool {
        self.frames.contains_key(&frame_number)
    }

    /// Frame numbers stored at or before `frame_number`, ascending.
    pub fn frame_numbers_through(
        &self,
        frame_number: u64,
    ) -> impl DoubleEndedIterator<Item = u64> + '_ {
        self.frames.range(..=frame_number).map(|(number, _)| *number)
    }

    /// All entries in ascending frame order.
    pub fn frames(&self) -> impl Iterator<Item = &AnnotatedFrame> {
        self.frames.values()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(v: f64) -> Option<BoundingBox> {
        Some(BoundingBox::new(v, v, 5.0, 5.0))
    }

    #[test]
    fn add_injects_invisible_origin() {
        let mut object = AnnotatedObject::new(ObjectId(1), "fish", false);
        assert!(object.is_empty());

        object.add(AnnotatedFrame::keyframe(7, bbox(1.0)));

        let origin = object.get(0).expect("origin frame");
        assert_eq!(origin.frame_number, 0);
        assert!(!origin.is_visible());
        assert!(!origin.is_ground_truth);
        assert_eq!(origin.stationary_count, 0);
        assert_eq!(object.len(), 2);
    }

    #[test]
    fn keyframe_at_origin_is_not_shadowed() {
        let mut object = AnnotatedObject::new(ObjectId(1), "fish", false);
        object.add(AnnotatedFrame::keyframe(0, bbox(3.0)));
        object.add(AnnotatedFrame::keyframe(4, bbox(4.0)));

        let origin = object.get(0).unwrap();
        assert!(origin.is_ground_truth);
        assert_eq!(origin.bbox, bbox(3.0));
        assert_eq!(object.len(), 2);
    }

    #[test]
    fn add_replaces_same_frame_and_keeps_order() {
        let mut object = AnnotatedObject::new(ObjectId(2), "fish", true);
        object.add(AnnotatedFrame::keyframe(9, bbox(9.0)));
        object.add(AnnotatedFrame::keyframe(3, bbox(3.0)));
        object.add(AnnotatedFrame::keyframe(6, bbox(6.0)));
        object.add(AnnotatedFrame::new(3, None, false, 2));

        let numbers: Vec<u64> = object.frames().map(|f| f.frame_number).collect();
        assert_eq!(numbers, vec![0, 3, 6, 9]);
        assert_eq!(object.get(3).unwrap().bbox, None);
        assert_eq!(object.get(3).unwrap().stationary_count, 2);
    }

    #[test]
    fn get_is_exact_match_only() {
        let mut object = AnnotatedObject::new(ObjectId(3), "fish", false);
        object.add(AnnotatedFrame::keyframe(5, bbox(5.0)));
        assert!(object.get(4).is_none());
        assert!(object.get(6).is_none());
        assert!(object.get(5).is_some());
    }

    #[test]
    fn stationary_refresh_every_fifth_count() {
        let states: Vec<bool> = (0..=11)
            .map(|count| AnnotatedFrame::new(1, bbox(1.0), false, count).is_stationary())
            .collect();
        assert_eq!(
            states,
            vec![false, true, true, true, true, false, true, true, true, true, false, true]
        );
    }
}
