//! Keyframe import for the `propagate` tool.
//!
//! ```json
//! {
//!   "objects": [
//!     {
//!       "label": "fish",
//!       "stationary": false,
//!       "keyframes": [
//!         { "frame": 0, "bbox": { "x": 10, "y": 10, "width": 5, "height": 5 } },
//!         { "frame": 12, "bbox": null }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! `stationary` is required: it is part of the object's identity, decided by
//! whoever labeled it, never inferred from box movement.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::annotation::{BoundingBox, ObjectId};
use crate::tracker::AnnotationTracker;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyframeFile {
    pub objects: Vec<KeyframeObject>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyframeObject {
    pub label: String,
    pub stationary: bool,
    pub keyframes: Vec<Keyframe>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub frame: u64,
    /// Absent or null marks the object as not visible.
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
}

impl KeyframeFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read keyframes {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid keyframes {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: Self = serde_json::from_str(raw)?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<()> {
        for object in &self.objects {
            if object.label.trim().is_empty() {
                return Err(anyhow!("object label must not be empty"));
            }
            if object.keyframes.is_empty() {
                return Err(anyhow!("object '{}' has no keyframes", object.label));
            }
            for keyframe in &object.keyframes {
                if let Some(bbox) = keyframe.bbox {
                    if bbox.width < 0.0 || bbox.height < 0.0 {
                        return Err(anyhow!(
                            "object '{}' frame {}: negative box size",
                            object.label,
                            keyframe.frame
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Register every object with the tracker and add its keyframes.
    pub fn apply(&self, tracker: &AnnotationTracker) -> Result<Vec<ObjectId>> {
        let mut ids = Vec::with_capacity(self.objects.len());
        for object in &self.objects {
            let id = tracker.add_object(object.label.clone(), object.stationary)?;
            for keyframe in &object.keyframes {
                tracker.add_keyframe(id, keyframe.frame, keyframe.bbox)?;
            }
            log::info!(
                "keyframes: {} '{}' with {} keyframes (stationary={})",
                id,
                object.label,
                object.keyframes.len(),
                object.stationary
            );
            ids.push(id);
        }
        Ok(ids)
    }
}
