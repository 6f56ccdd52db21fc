use crate::{
    motion::{FrameGeometry, MotionTracker, ObjectId},
    object::BBox,
};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    fmt,
    ops::RangeFrom,
    sync::atomic::{AtomicU64, Ordering},
};
use tracing::{debug, info, warn};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Capability to query one object of one [MotionSession].
///
/// A handle cannot be cloned and is consumed by
/// [MotionSession::release], so an object is released at most once.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct TrackHandle {
    session: SessionId,
    object: ObjectId,
}

impl TrackHandle {
    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn object(&self) -> ObjectId {
        self.object
    }
}

/// Outcome of feeding an external position into a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PositionUpdate {
    Applied,
    /// The position was older than the last one recorded for the object
    /// and was ignored.
    Stale,
}

struct ObjectState {
    last_external_position_ns: u64,
    tracked_position: Option<BBox>,
}

struct SessionInner {
    tracker: Box<dyn MotionTracker>,
    objects: HashMap<ObjectId, ObjectState>,
    object_id_iter: RangeFrom<u64>,
    last_timestamp_ns: u64,
    destroyed: bool,
}

/// One live motion tracking session, tied to a fixed frame geometry.
pub struct MotionSession {
    id: SessionId,
    geometry: FrameGeometry,
    inner: Mutex<SessionInner>,
}

impl MotionSession {
    pub fn new(tracker: Box<dyn MotionTracker>, geometry: FrameGeometry) -> Self {
        let id = SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed));
        info!(%id, %geometry, "Motion tracking session created");
        Self {
            id,
            geometry,
            inner: Mutex::new(SessionInner {
                tracker,
                objects: HashMap::new(),
                object_id_iter: 0..,
                last_timestamp_ns: 0,
                destroyed: false,
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    pub fn last_timestamp_ns(&self) -> u64 {
        self.inner.lock().last_timestamp_ns
    }

    pub fn live_objects(&self) -> usize {
        self.inner.lock().objects.len()
    }

    /// Start tracking `position` in `frame`.
    pub fn seed(&self, position: &BBox, frame: &[u8], timestamp_ns: u64) -> TrackHandle {
        let mut inner = self.inner.lock();
        assert!(!inner.destroyed, "{} was already destroyed", self.id);

        let object = match inner.object_id_iter.next() {
            Some(raw) => ObjectId(raw),
            None => unreachable!("object id space exhausted"),
        };
        inner.tracker.seed(object, position, frame, timestamp_ns);
        let tracked_position = inner.tracker.position_of(object);
        inner.objects.insert(
            object,
            ObjectState {
                last_external_position_ns: timestamp_ns,
                tracked_position,
            },
        );

        TrackHandle {
            session: self.id,
            object,
        }
    }

    /// Advance to the next frame and refresh the cached position of
    /// every live object. Returns `false` once the session is destroyed.
    pub fn advance(&self, frame: &[u8], timestamp_ns: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.destroyed {
            debug!(id = %self.id, "Frame for a destroyed session dropped");
            return false;
        }

        let SessionInner {
            tracker, objects, ..
        } = &mut *inner;
        tracker.advance(frame, timestamp_ns);
        objects.iter_mut().for_each(|(&object, state)| {
            state.tracked_position = tracker.position_of(object);
        });
        inner.last_timestamp_ns = timestamp_ns;
        true
    }

    /// Tracked position as of the last frame. `None` if the tracker
    /// does not know where the object is.
    pub fn position_of(&self, handle: &TrackHandle) -> Option<BBox> {
        self.check_handle(handle);
        let inner = self.inner.lock();
        inner.objects.get(&handle.object)?.tracked_position
    }

    /// Live correlation. An object the session already forgot reports
    /// zero.
    pub fn correlation_of(&self, handle: &TrackHandle) -> f32 {
        self.check_handle(handle);
        let inner = self.inner.lock();
        if !inner.objects.contains_key(&handle.object) {
            return 0.0;
        }
        inner.tracker.correlation_of(handle.object)
    }

    /// Feed an externally known position for an object into the session.
    pub fn set_position(
        &self,
        handle: &TrackHandle,
        position: &BBox,
        timestamp_ns: u64,
    ) -> PositionUpdate {
        self.check_handle(handle);
        let mut inner = self.inner.lock();
        let SessionInner {
            tracker, objects, ..
        } = &mut *inner;

        let Some(state) = objects.get_mut(&handle.object) else {
            debug!(object = handle.object.0, "Position update for a released object");
            return PositionUpdate::Stale;
        };
        if state.last_external_position_ns > timestamp_ns {
            warn!(
                object = handle.object.0,
                last = state.last_external_position_ns,
                timestamp_ns,
                "Tried to use older position time"
            );
            return PositionUpdate::Stale;
        }

        state.last_external_position_ns = timestamp_ns;
        tracker.set_position(handle.object, position, timestamp_ns);
        state.tracked_position = tracker.position_of(handle.object);
        PositionUpdate::Applied
    }

    pub fn release(&self, handle: TrackHandle) {
        self.check_handle(&handle);
        let mut inner = self.inner.lock();
        if inner.objects.remove(&handle.object).is_some() {
            inner.tracker.release(handle.object);
        }
    }

    /// Release the external tracker. Any handle still around is dead
    /// afterwards.
    pub fn destroy(&self) {
        let mut inner = self.inner.lock();
        if inner.destroyed {
            return;
        }
        let SessionInner {
            tracker, objects, ..
        } = &mut *inner;
        objects.drain().for_each(|(object, _)| tracker.release(object));
        tracker.destroy_session();
        inner.destroyed = true;
        info!(id = %self.id, "Motion tracking session destroyed");
    }

    fn check_handle(&self, handle: &TrackHandle) {
        assert!(
            handle.session == self.id,
            "track handle of {} used with {}",
            handle.session,
            self.id
        );
    }
}

impl Drop for MotionSession {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for MotionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MotionSession")
            .field("id", &self.id)
            .field("geometry", &self.geometry)
            .finish_non_exhaustive()
    }
}
