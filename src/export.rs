//! Whole-clip annotation export.
//!
//! After propagation every object has an entry at every frame. `ClipExport`
//! flattens the stores into a per-frame view for downstream consumers
//! (training-set conversion, review tooling).

use serde::{Deserialize, Serialize};

use crate::annotation::{AnnotatedObject, BoundingBox, ObjectId};
use crate::error::{TrackError, TrackResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipExport {
    pub total_frames: u64,
    pub objects: Vec<ObjectSummary>,
    pub frames: Vec<FrameExport>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub id: ObjectId,
    pub label: String,
    pub stationary: bool,
    /// Number of human-authored frames.
    pub keyframes: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameExport {
    pub frame_number: u64,
    pub objects: Vec<ObjectEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub object_id: ObjectId,
    pub bbox: Option<BoundingBox>,
    pub visible: bool,
    pub ground_truth: bool,
    /// Refresh-aware flag (see `AnnotatedFrame::is_stationary`).
    pub stationary: bool,
    pub stationary_count: u32,
}

impl ClipExport {
    /// Build the export. Every object must have an entry for every frame
    /// below `total_frames`.
    pub fn from_objects(total_frames: u64, objects: &[AnnotatedObject]) -> TrackResult<Self> {
        let summaries = objects
            .iter()
            .map(|object| ObjectSummary {
                id: object.id(),
                label: object.label().to_string(),
                stationary: object.is_stationary(),
                keyframes: object.frames().filter(|f| f.is_ground_truth).count(),
            })
            .collect();

        let mut frames = Vec::with_capacity(total_frames as usize);
        for frame_number in 0..total_frames {
            let mut entries = Vec::with_capacity(objects.len());
            for object in objects {
                let frame = object
                    .get(frame_number)
                    .ok_or(TrackError::CorruptedAnnotations {
                        frame: frame_number,
                    })?;
                entries.push(ObjectEntry {
                    object_id: object.id(),
                    bbox: frame.bbox,
                    visible: frame.is_visible(),
                    ground_truth: frame.is_ground_truth,
                    stationary: frame.is_stationary(),
                    stationary_count: frame.stationary_count,
                });
            }
            frames.push(FrameExport {
                frame_number,
                objects: entries,
            });
        }

        Ok(Self {
            total_frames,
            objects: summaries,
            frames,
        })
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::AnnotatedFrame;

    #[test]
    fn flattens_objects_per_frame() {
        let mut object = AnnotatedObject::new(ObjectId(3), "salmon", true);
        let bbox = Some(BoundingBox::new(1.0, 2.0, 3.0, 4.0));
        object.add(AnnotatedFrame::keyframe(0, bbox));
        object.add(AnnotatedFrame::new(1, bbox, false, 1));

        let export = ClipExport::from_objects(2, &[object]).unwrap();

        assert_eq!(export.objects[0].keyframes, 1);
        assert_eq!(export.frames.len(), 2);
        let second = &export.frames[1].objects[0];
        assert_eq!(second.object_id, ObjectId(3));
        assert!(second.visible);
        assert!(!second.ground_truth);
        assert!(second.stationary);
        assert_eq!(second.stationary_count, 1);
    }

    #[test]
    fn gap_in_store_is_reported() {
        let mut object = AnnotatedObject::new(ObjectId(0), "salmon", false);
        object.add(AnnotatedFrame::keyframe(0, None));
        let err = ClipExport::from_objects(2, &[object]).unwrap_err();
        assert!(matches!(err, TrackError::CorruptedAnnotations { frame: 1 }));
    }
}
