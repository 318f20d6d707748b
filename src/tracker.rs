//! Keyframe propagation across the frame sequence.
//!
//! `AnnotationTracker` owns the tracked objects and fills every frame a human
//! did not label by carrying the previous frame's box forward. Propagation is
//! causal: frame `i` depends only on frame `i - 1`, so frames are always
//! tracked strictly in order and one request at a time.
//!
//! Every interpolated frame is written back into its object's store. A
//! request therefore resumes from the latest frame at or before the target
//! that every object already has, instead of starting over from frame 0.
//!
//! Dropping a `get_frame_with_objects` future between frames is safe: every
//! completed frame stays memoized and the next request picks up from there.

use anyhow::anyhow;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::annotation::{AnnotatedFrame, AnnotatedObject, BoundingBox, ObjectId};
use crate::decode::{DecodedFrame, ImageDecoder};
use crate::error::{TrackError, TrackResult};
use crate::export::ClipExport;
use crate::source::{FrameSource, FrameSourceManager, ResetSubscription};

/// Decoded image plus every object's annotation at one frame.
#[derive(Clone, Debug)]
pub struct FrameWithObjects {
    pub frame_number: u64,
    pub image: Arc<DecodedFrame>,
    pub objects: Vec<TrackedObject>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrackedObject {
    pub object_id: ObjectId,
    pub label: String,
    pub annotated_frame: AnnotatedFrame,
}

// ----------------------------------------------------------------------------
// Tracker state
// ----------------------------------------------------------------------------

struct TrackerState {
    objects: Vec<AnnotatedObject>,
    next_object_id: u64,
    /// Highest frame every object has an entry for, as established by a
    /// completed request. Lowered when an object joins without it.
    last_frame: Option<u64>,
    /// Bumped on every frame source reset. Work started under an older epoch
    /// must not be written back.
    epoch: u64,
    images: FrameCache,
}

impl TrackerState {
    fn reset(&mut self) {
        log::info!(
            "tracker: frame source reset, dropping {} objects and {} cached frames",
            self.objects.len(),
            self.images.len()
        );
        self.objects.clear();
        self.last_frame = None;
        self.images.clear();
        self.epoch += 1;
    }

    fn clamp_last_frame(&mut self) {
        if let Some(last) = self.last_frame {
            self.last_frame = start_frame(&self.objects, last).ok();
        }
    }

    fn object_mut(&mut self, id: ObjectId) -> TrackResult<&mut AnnotatedObject> {
        self.objects
            .iter_mut()
            .find(|object| object.id() == id)
            .ok_or(TrackError::UnknownObject(id))
    }
}

/// Bounded ring of recently decoded frames.
struct FrameCache {
    capacity: usize,
    frames: VecDeque<Arc<DecodedFrame>>,
}

impl FrameCache {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            frames: VecDeque::with_capacity(capacity),
        }
    }

    fn get(&self, frame_number: u64) -> Option<Arc<DecodedFrame>> {
        self.frames
            .iter()
            .find(|frame| frame.frame_number == frame_number)
            .cloned()
    }

    fn insert(&mut self, frame: Arc<DecodedFrame>) {
        self.frames
            .retain(|cached| cached.frame_number != frame.frame_number);
        while self.frames.len() >= self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    fn clear(&mut self) {
        self.frames.clear();
    }

    fn len(&self) -> usize {
        self.frames.len()
    }
}

// ----------------------------------------------------------------------------
// AnnotationTracker
// ----------------------------------------------------------------------------

pub struct AnnotationTracker {
    sources: Arc<FrameSourceManager>,
    decoder: Arc<dyn ImageDecoder>,
    state: Arc<Mutex<TrackerState>>,
    // Held across a whole forward pass; queued callers wait in order.
    in_flight: tokio::sync::Mutex<()>,
    subscription: ResetSubscription,
}

impl AnnotationTracker {
    /// Create a tracker bound to `sources`. Objects and cached frames are
    /// discarded whenever the manager installs a new source.
    pub fn new(
        sources: Arc<FrameSourceManager>,
        decoder: Arc<dyn ImageDecoder>,
        image_cache_frames: usize,
    ) -> anyhow::Result<Self> {
        let state = Arc::new(Mutex::new(TrackerState {
            objects: Vec::new(),
            next_object_id: 0,
            last_frame: None,
            epoch: 0,
            images: FrameCache::new(image_cache_frames),
        }));

        let weak: Weak<Mutex<TrackerState>> = Arc::downgrade(&state);
        let subscription = sources.on_reset(move || {
            if let Some(state) = weak.upgrade() {
                state
                    .lock()
                    .map_err(|_| anyhow!("tracker state lock poisoned"))?
                    .reset();
            }
            Ok(())
        })?;

        Ok(Self {
            sources,
            decoder,
            state,
            in_flight: tokio::sync::Mutex::new(()),
            subscription,
        })
    }

    pub fn sources(&self) -> &Arc<FrameSourceManager> {
        &self.sources
    }

    /// Frames in the active source.
    pub fn total_frames(&self) -> TrackResult<u64> {
        Ok(self.current_source()?.total_frames())
    }

    /// Start tracking a new object. It has no keyframes until one is added.
    pub fn add_object(&self, label: impl Into<String>, stationary: bool) -> TrackResult<ObjectId> {
        let mut state = self.lock_state()?;
        let id = ObjectId(state.next_object_id);
        state.next_object_id += 1;
        state
            .objects
            .push(AnnotatedObject::new(id, label, stationary));
        state.clamp_last_frame();
        Ok(id)
    }

    /// Record a human-authored box (or explicit absence) for an object.
    pub fn add_keyframe(
        &self,
        id: ObjectId,
        frame_number: u64,
        bbox: Option<BoundingBox>,
    ) -> TrackResult<()> {
        let mut state = self.lock_state()?;
        state
            .object_mut(id)?
            .add(AnnotatedFrame::keyframe(frame_number, bbox));
        state.clamp_last_frame();
        Ok(())
    }

    /// Snapshot of one object's store.
    pub fn object(&self, id: ObjectId) -> TrackResult<AnnotatedObject> {
        let state = self.lock_state()?;
        state
            .objects
            .iter()
            .find(|object| object.id() == id)
            .cloned()
            .ok_or(TrackError::UnknownObject(id))
    }

    /// Snapshot of every tracked object.
    pub fn objects(&self) -> TrackResult<Vec<AnnotatedObject>> {
        Ok(self.lock_state()?.objects.clone())
    }

    pub fn last_frame(&self) -> TrackResult<Option<u64>> {
        Ok(self.lock_state()?.last_frame)
    }

    /// Latest frame at or before `frame_number` that every object has cached.
    pub fn start_frame(&self, frame_number: u64) -> TrackResult<u64> {
        start_frame(&self.lock_state()?.objects, frame_number)
    }

    /// Image and per-object annotations for a frame, tracking forward from the
    /// resume point as needed.
    pub async fn get_frame_with_objects(&self, frame_number: u64) -> TrackResult<FrameWithObjects> {
        let _flight = self.in_flight.lock().await;

        // Epoch before source: a concurrent swap then always shows up as an
        // epoch mismatch rather than stale frames under a fresh epoch.
        let epoch = self.lock_state()?.epoch;
        let source = self.current_source()?;
        let total = source.total_frames();
        if frame_number >= total {
            return Err(TrackError::MissingFrame {
                frame: frame_number,
                total,
            });
        }

        let start = {
            let state = self.lock_state()?;
            if state.epoch != epoch {
                return Err(TrackError::SourceReset {
                    frame: frame_number,
                });
            }
            start_frame(&state.objects, frame_number)?
        };

        log::debug!(
            "tracker: frame {} requested, resuming from frame {}",
            frame_number,
            start
        );

        let mut current = start;
        let result = loop {
            let tracked = self.track(source.as_ref(), current, epoch).await?;
            if current == frame_number {
                break tracked;
            }
            current += 1;
        };

        let mut state = self.lock_state()?;
        if state.epoch == epoch {
            let last = state.last_frame.map_or(frame_number, |last| last.max(frame_number));
            state.last_frame = Some(last);
        }
        Ok(result)
    }

    /// Track every frame of the active source and export the result.
    pub async fn propagate_all(&self) -> TrackResult<ClipExport> {
        let total = self.total_frames()?;
        for frame_number in 0..total {
            self.get_frame_with_objects(frame_number).await?;
        }
        let objects = self.objects()?;
        let export = ClipExport::from_objects(total, &objects)?;
        log::info!(
            "tracker: propagated {} objects across {} frames",
            objects.len(),
            total
        );
        Ok(export)
    }

    /// One step of the forward pass. `frame_number - 1` must already be
    /// annotated for every object lacking an entry at `frame_number`.
    async fn track(
        &self,
        source: &dyn FrameSource,
        frame_number: u64,
        epoch: u64,
    ) -> TrackResult<FrameWithObjects> {
        let image = self.frame_image(source, frame_number, epoch).await?;

        let mut state = self.lock_state()?;
        if state.epoch != epoch {
            return Err(TrackError::SourceReset {
                frame: frame_number,
            });
        }
        let objects = track_objects(&mut state.objects, frame_number)?;
        Ok(FrameWithObjects {
            frame_number,
            image,
            objects,
        })
    }

    async fn frame_image(
        &self,
        source: &dyn FrameSource,
        frame_number: u64,
        epoch: u64,
    ) -> TrackResult<Arc<DecodedFrame>> {
        let cached = self.lock_state()?.images.get(frame_number);
        if let Some(image) = cached {
            return Ok(image);
        }

        let blob = source.get_frame(frame_number).await?;
        let decoder = Arc::clone(&self.decoder);
        let decoded = tokio::task::spawn_blocking(move || decoder.decode(frame_number, &blob))
            .await
            .map_err(|e| TrackError::Task(e.to_string()))??;
        let decoded = Arc::new(decoded);

        let mut state = self.lock_state()?;
        if state.epoch == epoch {
            state.images.insert(Arc::clone(&decoded));
        }
        Ok(decoded)
    }

    fn current_source(&self) -> TrackResult<Arc<dyn FrameSource>> {
        self.sources.current().map_err(|_| TrackError::Poisoned)
    }

    fn lock_state(&self) -> TrackResult<MutexGuard<'_, TrackerState>> {
        self.state.lock().map_err(|_| TrackError::Poisoned)
    }
}

impl Drop for AnnotationTracker {
    fn drop(&mut self) {
        if let Err(e) = self.sources.remove_listener(self.subscription) {
            log::warn!("tracker: failed to unsubscribe from frame source resets: {}", e);
        }
    }
}

// ----------------------------------------------------------------------------
// Propagation rules
// ----------------------------------------------------------------------------

/// Latest stored frame at or before `frame_number` shared by every object.
/// Only the first object's stored keys are walked.
fn start_frame(objects: &[AnnotatedObject], frame_number: u64) -> TrackResult<u64> {
    let Some((first, rest)) = objects.split_first() else {
        return Ok(frame_number);
    };
    first
        .frame_numbers_through(frame_number)
        .rev()
        .find(|&candidate| rest.iter().all(|object| object.contains(candidate)))
        .ok_or(TrackError::CorruptedAnnotations {
            frame: frame_number,
        })
}

/// Annotate every object at `frame_number`, memoizing synthesized frames.
///
/// All objects are resolved before any store is written, so a sequencing
/// fault leaves every store untouched.
fn track_objects(
    objects: &mut [AnnotatedObject],
    frame_number: u64,
) -> TrackResult<Vec<TrackedObject>> {
    let resolved = objects
        .iter()
        .map(|object| resolve_frame(object, frame_number))
        .collect::<TrackResult<Vec<_>>>()?;

    let mut tracked = Vec::with_capacity(objects.len());
    for (object, (annotated_frame, synthesized)) in objects.iter_mut().zip(resolved) {
        if synthesized {
            object.add(annotated_frame);
        }
        tracked.push(TrackedObject {
            object_id: object.id(),
            label: object.label().to_string(),
            annotated_frame,
        });
    }
    Ok(tracked)
}

/// Existing entry, or a carry-forward of the previous frame. The flag is true
/// when the frame was synthesized.
fn resolve_frame(object: &AnnotatedObject, frame_number: u64) -> TrackResult<(AnnotatedFrame, bool)> {
    if let Some(existing) = object.get(frame_number) {
        return Ok((*existing, false));
    }

    let previous = frame_number
        .checked_sub(1)
        .and_then(|previous| object.get(previous))
        .ok_or(TrackError::OutOfSequence {
            object: object.id(),
            frame: frame_number,
        })?;

    let stationary_count = if object.is_stationary() {
        previous.stationary_count.saturating_add(1)
    } else {
        0
    };
    log::trace!(
        "tracker: {} frame {} carried forward (stationary_count={})",
        object.id(),
        frame_number,
        stationary_count
    );
    Ok((
        AnnotatedFrame::new(frame_number, previous.bbox, false, stationary_count),
        true,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object_with(frames: &[AnnotatedFrame], stationary: bool) -> AnnotatedObject {
        let mut object = AnnotatedObject::new(ObjectId(0), "fish", stationary);
        for frame in frames {
            object.add(*frame);
        }
        object
    }

    fn bbox() -> Option<BoundingBox> {
        Some(BoundingBox::new(10.0, 10.0, 5.0, 5.0))
    }

    #[test]
    fn start_frame_finds_latest_common_frame() {
        let a = object_with(
            &[
                AnnotatedFrame::keyframe(0, bbox()),
                AnnotatedFrame::keyframe(4, bbox()),
                AnnotatedFrame::keyframe(8, bbox()),
            ],
            false,
        );
        let b = object_with(
            &[
                AnnotatedFrame::keyframe(0, bbox()),
                AnnotatedFrame::keyframe(4, bbox()),
            ],
            false,
        );
        let objects = vec![a, b];
        assert_eq!(start_frame(&objects, 9).unwrap(), 4);
        assert_eq!(start_frame(&objects, 4).unwrap(), 4);
        assert_eq!(start_frame(&objects, 3).unwrap(), 0);
    }

    #[test]
    fn start_frame_for_huge_target_walks_stored_keys_only() {
        let objects = vec![
            object_with(&[AnnotatedFrame::keyframe(0, bbox())], false),
            object_with(
                &[
                    AnnotatedFrame::keyframe(0, bbox()),
                    AnnotatedFrame::keyframe(7, bbox()),
                ],
                false,
            ),
        ];
        assert_eq!(start_frame(&objects, u64::MAX).unwrap(), 0);
    }

    #[test]
    fn start_frame_without_objects_is_target() {
        assert_eq!(start_frame(&[], 17).unwrap(), 17);
    }

    #[test]
    fn start_frame_on_object_without_origin_is_corruption() {
        let empty = AnnotatedObject::new(ObjectId(5), "ghost", false);
        let err = start_frame(&[empty], 3).unwrap_err();
        assert!(matches!(err, TrackError::CorruptedAnnotations { frame: 3 }));
    }

    #[test]
    fn carry_forward_counts_only_for_stationary_objects() {
        let mut objects = vec![
            object_with(&[AnnotatedFrame::keyframe(0, bbox())], true),
            object_with(&[AnnotatedFrame::keyframe(0, bbox())], false),
        ];
        for frame_number in 1..=3 {
            track_objects(&mut objects, frame_number).unwrap();
        }

        let counts: Vec<u32> = (1..=3)
            .map(|f| objects[0].get(f).unwrap().stationary_count)
            .collect();
        assert_eq!(counts, vec![1, 2, 3]);
        assert!((1..=3).all(|f| objects[1].get(f).unwrap().stationary_count == 0));
        assert!((1..=3).all(|f| !objects[0].get(f).unwrap().is_ground_truth));
    }

    #[test]
    fn out_of_order_frame_is_rejected_without_writes() {
        let mut objects = vec![
            object_with(
                &[
                    AnnotatedFrame::keyframe(0, bbox()),
                    AnnotatedFrame::keyframe(1, bbox()),
                ],
                false,
            ),
            object_with(&[AnnotatedFrame::keyframe(0, bbox())], false),
        ];
        let err = track_objects(&mut objects, 3).unwrap_err();
        assert!(matches!(err, TrackError::OutOfSequence { frame: 3, .. }));
        assert!(objects[0].get(3).is_none());
        assert!(objects[1].get(3).is_none());
    }

    #[test]
    fn existing_entries_are_returned_unchanged() {
        let keyframe = AnnotatedFrame::keyframe(2, None);
        let mut objects = vec![object_with(
            &[AnnotatedFrame::keyframe(0, bbox()), keyframe],
            true,
        )];
        let tracked = track_objects(&mut objects, 2).unwrap();
        assert_eq!(tracked[0].annotated_frame, keyframe);
        assert_eq!(objects[0].len(), 2);
    }

    #[test]
    fn frame_cache_evicts_oldest() {
        let mut cache = FrameCache::new(2);
        for n in 0..3 {
            cache.insert(Arc::new(DecodedFrame {
                frame_number: n,
                image: image::RgbImage::new(1, 1),
            }));
        }
        assert!(cache.get(0).is_none());
        assert!(cache.get(1).is_some());
        assert!(cache.get(2).is_some());
        assert_eq!(cache.len(), 2);
    }
}
