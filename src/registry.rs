use crate::{
    object::{BBox, TrackId, TrackedObjectView},
    session::TrackHandle,
};
use std::ops::RangeFrom;

/// A tracked object as stored in the registry.
#[derive(Debug)]
pub struct TrackedObject {
    pub id: TrackId,
    /// `None` for objects created while motion tracking was unavailable.
    pub handle: Option<TrackHandle>,
    pub detection_confidence: f32,
    pub label: String,
    pub last_known_position: BBox,
}

impl TrackedObject {
    pub fn view(&self) -> TrackedObjectView {
        TrackedObjectView {
            id: self.id,
            position: self.last_known_position,
            confidence: self.detection_confidence,
            label: self.label.clone(),
            motion_tracked: self.handle.is_some(),
        }
    }
}

/// The tracked objects in insertion order.
#[derive(Debug)]
pub struct TrackRegistry {
    tracks: Vec<TrackedObject>,
    unique_id_iter: RangeFrom<usize>,
}

impl Default for TrackRegistry {
    fn default() -> Self {
        Self {
            tracks: vec![],
            unique_id_iter: 0..,
        }
    }
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn next_id(&mut self) -> TrackId {
        match self.unique_id_iter.next() {
            Some(id) => TrackId(id),
            None => unreachable!("track id space exhausted"),
        }
    }

    /// Add a track at the end.
    ///
    /// # Panics
    ///
    /// If the track's handle is already owned by a stored track.
    pub fn insert(&mut self, track: TrackedObject) {
        if let Some(handle) = &track.handle {
            assert!(
                !self.tracks.iter().any(|t| t.handle.as_ref() == Some(handle)),
                "track handle {handle:?} is already owned by another track"
            );
        }
        self.tracks.push(track);
    }

    pub fn remove(&mut self, id: TrackId) -> Option<TrackedObject> {
        let idx = self.tracks.iter().position(|t| t.id == id)?;
        Some(self.tracks.remove(idx))
    }

    pub fn get(&self, id: TrackId) -> Option<&TrackedObject> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn get_mut(&mut self, id: TrackId) -> Option<&mut TrackedObject> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedObject> {
        self.tracks.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TrackedObject> {
        self.tracks.iter_mut()
    }

    /// Remove and return every track matching `pred`, keeping the order
    /// of the rest.
    pub fn drain_where<F>(&mut self, mut pred: F) -> Vec<TrackedObject>
    where
        F: FnMut(&TrackedObject) -> bool,
    {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.tracks)
            .into_iter()
            .partition(|t| pred(t));
        self.tracks = kept;
        removed
    }

    pub fn snapshot(&self) -> Vec<TrackedObjectView> {
        self.tracks.iter().map(TrackedObject::view).collect()
    }
}
