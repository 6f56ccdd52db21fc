use crate::{
    association::{AssociationEngine, Trackable, Verdict},
    config::Config,
    error::TrackerError,
    motion::{FrameGeometry, SessionFactory},
    object::{BBox, Detection, ScreenRect, TrackId, TrackedObjectView},
    registry::{TrackRegistry, TrackedObject},
    session::{MotionSession, PositionUpdate},
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Whether motion tracking backs the tracked objects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackingState {
    /// No frame has arrived since creation or the last session release.
    Uninitialized,
    Active(FrameGeometry),
    /// The session factory reported that motion tracking is not
    /// supported. Tracks follow detections only.
    Unavailable,
}

enum SessionSlot {
    Uninitialized,
    Unavailable,
    Active(Arc<MotionSession>),
}

/// What one frame did to the tracked objects.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    /// `false` if the frame could not be handed to a motion tracker.
    pub motion_tracked: bool,
    /// Objects dropped because their correlation decayed.
    pub lost: Vec<TrackedObjectView>,
}

/// What one detection batch did to the tracked objects.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchReport {
    /// Detections without a box or below the minimum size.
    pub skipped: usize,
    pub accepted: Vec<TrackId>,
    /// Candidates that correlated too weakly or lost against a
    /// tracked object.
    pub rejected: usize,
    pub evicted: Vec<TrackId>,
    /// Largest IoU between an accepted candidate and a track it evicted.
    pub max_evicted_overlap: Option<f32>,
    /// `false` if the batch was handled without motion tracking.
    pub motion_tracked: bool,
}

/// This is the main struct to track detected boxes across frames.
///
/// Frames and detection batches may arrive from different threads at
/// different rates. Every method takes `&self`.
pub struct MultiBoxTracker {
    min_correlation: f32,
    association: AssociationEngine,
    factory: Box<dyn SessionFactory>,
    session: Mutex<SessionSlot>,
    registry: Mutex<TrackRegistry>,
    screen_rects: Mutex<Vec<ScreenRect>>,
}

impl MultiBoxTracker {
    /// This is the function to build a MultiBoxTracker.
    ///
    /// Example:
    ///
    /// ```rust
    /// use multibox_tracking::config::Config;
    /// use multibox_tracking::motion::NoMotionTracking;
    /// use multibox_tracking::MultiBoxTracker;
    ///
    /// let config = Config {
    ///     max_overlap: 0.1,
    ///     min_size: 16.0,
    ///     marginal_correlation: 0.75,
    ///     min_correlation: 0.2,
    /// };
    /// let tracker = MultiBoxTracker::new(&config, NoMotionTracking);
    /// ```
    pub fn new<F>(config: &Config, factory: F) -> Self
    where
        F: SessionFactory + 'static,
    {
        Self {
            min_correlation: config.min_correlation,
            association: AssociationEngine::new(config),
            factory: Box::new(factory),
            session: Mutex::new(SessionSlot::Uninitialized),
            registry: Mutex::new(TrackRegistry::new()),
            screen_rects: Mutex::new(vec![]),
        }
    }

    pub fn tracking_state(&self) -> TrackingState {
        match &*self.session.lock() {
            SessionSlot::Uninitialized => TrackingState::Uninitialized,
            SessionSlot::Unavailable => TrackingState::Unavailable,
            SessionSlot::Active(session) => TrackingState::Active(session.geometry()),
        }
    }

    /// Advance motion tracking by one frame and drop the objects whose
    /// correlation decayed below `min_correlation`.
    ///
    /// The first frame creates the motion tracking session. Its geometry
    /// stays fixed until [release_session](Self::release_session).
    pub fn submit_frame(
        &self,
        geometry: FrameGeometry,
        pixels: &[u8],
        timestamp_ns: u64,
    ) -> Result<FrameReport, TrackerError> {
        geometry.check_frame(pixels)?;

        let Some(session) = self.session_for_frame(geometry)? else {
            return Ok(FrameReport::default());
        };
        if !session.advance(pixels, timestamp_ns) {
            return Ok(FrameReport::default());
        }

        let mut registry = self.registry.lock();
        if !self.is_current(&session) {
            debug!(timestamp_ns, "Session released while advancing, skipping pruning");
            return Ok(FrameReport::default());
        }

        Ok(FrameReport {
            motion_tracked: true,
            lost: self.prune_lost_tracks(&mut registry, &session),
        })
    }

    /// Reconcile a detection batch with the tracked objects.
    ///
    /// `pixels` is the frame the detections were made on. While a motion
    /// tracking session is active it has to fit the session geometry,
    /// otherwise the batch fails with [TrackerError::FrameTooSmall] and
    /// the tracked objects stay as they are.
    ///
    /// Example:
    ///
    /// ```rust
    /// # use multibox_tracking::config::Config;
    /// # use multibox_tracking::motion::NoMotionTracking;
    /// # use multibox_tracking::MultiBoxTracker;
    /// use multibox_tracking::object::{BBox, Detection};
    ///
    /// let tracker = MultiBoxTracker::new(&Config::default(), NoMotionTracking);
    /// let detections = vec![
    ///     Detection::new("wagon", 0.9, BBox::new(0., 0., 100., 100.)),
    ///     Detection::new("door", 0.7, BBox::new(200., 40., 240., 120.)),
    ///     Detection::new("speck", 0.8, BBox::new(10., 10., 14., 14.)),
    /// ];
    /// // Without motion tracking no pixels are needed
    /// let report = tracker.submit_detections(&detections, &[], 123456789).unwrap();
    /// assert_eq!(report.skipped, 1);
    /// assert_eq!(tracker.current_tracks().len(), 2);
    /// ```
    pub fn submit_detections(
        &self,
        detections: &[Detection],
        pixels: &[u8],
        timestamp_ns: u64,
    ) -> Result<BatchReport, TrackerError> {
        info!(
            count = detections.len(),
            timestamp_ns, "Processing detection results"
        );
        let (trackables, screen_rects) = self.association.filter(detections);
        *self.screen_rects.lock() = screen_rects;

        let mut report = BatchReport {
            skipped: detections.len() - trackables.len(),
            ..BatchReport::default()
        };
        if trackables.is_empty() {
            info!("Nothing to track, aborting");
            return Ok(report);
        }

        let mut registry = self.registry.lock();
        let Some(session) = self.current_session() else {
            Self::replace_with_detections(&mut registry, &trackables, &mut report);
            return Ok(report);
        };
        session.geometry().check_frame(pixels)?;
        report.motion_tracked = true;

        // Leftovers from a time without motion tracking
        let untracked = registry.drain_where(|track| track.handle.is_none());
        if !untracked.is_empty() {
            debug!(count = untracked.len(), "Dropping detection-only objects");
        }

        debug!(count = trackables.len(), "Rects to track");
        for trackable in &trackables {
            self.handle_detection(
                &mut registry,
                &session,
                trackable,
                pixels,
                timestamp_ns,
                &mut report,
            );
        }
        Ok(report)
    }

    /// A point-in-time copy of the tracked objects, in insertion order.
    pub fn current_tracks(&self) -> Vec<TrackedObjectView> {
        self.registry.lock().snapshot()
    }

    /// Every box of the latest detection batch, tracked or not.
    pub fn screen_rects(&self) -> Vec<ScreenRect> {
        self.screen_rects.lock().clone()
    }

    /// Feed an externally known position of a tracked object into
    /// motion tracking. Positions older than the last one fed for the
    /// object are ignored.
    pub fn correct_track(
        &self,
        id: TrackId,
        position: BBox,
        timestamp_ns: u64,
    ) -> Result<PositionUpdate, TrackerError> {
        let mut registry = self.registry.lock();
        let session = self
            .current_session()
            .ok_or(TrackerError::TrackingUnavailable)?;
        let track = registry
            .get_mut(id)
            .ok_or(TrackerError::UnknownTrack(id))?;
        let handle = track
            .handle
            .as_ref()
            .ok_or(TrackerError::TrackingUnavailable)?;

        let update = session.set_position(handle, &position, timestamp_ns);
        if update == PositionUpdate::Applied {
            if let Some(position) = session.position_of(handle) {
                track.last_known_position = position;
            }
        }
        Ok(update)
    }

    /// Drop every motion-tracked object and destroy the session. The next
    /// frame creates a new session, possibly with another geometry.
    pub fn release_session(&self) {
        let mut registry = self.registry.lock();
        let previous = std::mem::replace(&mut *self.session.lock(), SessionSlot::Uninitialized);

        let SessionSlot::Active(session) = previous else {
            return;
        };
        let tracked = registry.drain_where(|track| track.handle.is_some());
        info!(
            id = %session.id(),
            count = tracked.len(),
            "Releasing motion tracking session"
        );
        for track in tracked {
            if let Some(handle) = track.handle {
                session.release(handle);
            }
        }
        session.destroy();
    }

    fn session_for_frame(
        &self,
        geometry: FrameGeometry,
    ) -> Result<Option<Arc<MotionSession>>, TrackerError> {
        let mut slot = self.session.lock();
        if matches!(*slot, SessionSlot::Uninitialized) {
            info!(%geometry, "Initializing motion tracker");
            *slot = match self.factory.create_session(geometry) {
                Some(tracker) => SessionSlot::Active(Arc::new(MotionSession::new(tracker, geometry))),
                None => {
                    error!("Motion tracking unavailable, tracking detections only");
                    SessionSlot::Unavailable
                }
            };
        }

        match &*slot {
            SessionSlot::Active(session) if session.geometry() == geometry => {
                Ok(Some(session.clone()))
            }
            SessionSlot::Active(session) => Err(TrackerError::GeometryMismatch {
                expected: session.geometry(),
                got: geometry,
            }),
            SessionSlot::Unavailable | SessionSlot::Uninitialized => Ok(None),
        }
    }

    fn current_session(&self) -> Option<Arc<MotionSession>> {
        match &*self.session.lock() {
            SessionSlot::Active(session) => Some(session.clone()),
            _ => None,
        }
    }

    fn is_current(&self, session: &Arc<MotionSession>) -> bool {
        self.current_session()
            .map_or(false, |current| Arc::ptr_eq(&current, session))
    }

    fn prune_lost_tracks(
        &self,
        registry: &mut TrackRegistry,
        session: &MotionSession,
    ) -> Vec<TrackedObjectView> {
        registry.iter_mut().for_each(|track| {
            let Some(handle) = &track.handle else {
                return;
            };
            if let Some(position) = session.position_of(handle) {
                track.last_known_position = position;
            }
        });

        let min_correlation = self.min_correlation;
        let lost = registry.drain_where(|track| match &track.handle {
            Some(handle) => session.correlation_of(handle) < min_correlation,
            None => false,
        });

        lost.into_iter()
            .map(|track| {
                let view = track.view();
                if let Some(handle) = track.handle {
                    info!(
                        track = %view.id,
                        label = %view.label,
                        correlation = session.correlation_of(&handle),
                        "Removing tracked object because correlation is too low"
                    );
                    session.release(handle);
                }
                view
            })
            .collect()
    }

    fn replace_with_detections(
        registry: &mut TrackRegistry,
        trackables: &[Trackable<'_>],
        report: &mut BatchReport,
    ) {
        let previous = registry.drain_where(|_| true);
        debug_assert!(previous.iter().all(|track| track.handle.is_none()));

        for Trackable { bbox, detection } in trackables {
            let id = registry.next_id();
            registry.insert(TrackedObject {
                id,
                handle: None,
                detection_confidence: detection.confidence,
                label: detection.label.clone(),
                last_known_position: *bbox,
            });
            report.accepted.push(id);
        }
    }

    fn handle_detection(
        &self,
        registry: &mut TrackRegistry,
        session: &MotionSession,
        trackable: &Trackable<'_>,
        pixels: &[u8],
        timestamp_ns: u64,
        report: &mut BatchReport,
    ) {
        let Trackable { bbox, detection } = trackable;
        let candidate = session.seed(bbox, pixels, timestamp_ns);

        let correlation = session.correlation_of(&candidate);
        if self.association.is_marginal(correlation) {
            debug!(
                label = %detection.label,
                correlation, "Correlation too low to begin tracking"
            );
            session.release(candidate);
            report.rejected += 1;
            return;
        }

        let position = session.position_of(&candidate).unwrap_or(*bbox);
        let verdict = self.association.arbitrate(
            &position,
            detection.confidence,
            registry,
            |handle| session.position_of(handle),
            |handle| session.correlation_of(handle),
        );

        match verdict {
            Verdict::Rejected { by } => {
                debug!(
                    label = %detection.label,
                    confidence = detection.confidence,
                    track = %by,
                    "Tracked object keeps its place"
                );
                session.release(candidate);
                report.rejected += 1;
            }
            Verdict::Accepted { evict, max_overlap } => {
                for id in evict {
                    let Some(track) = registry.remove(id) else {
                        continue;
                    };
                    if let Some(handle) = track.handle {
                        info!(
                            track = %id,
                            label = %track.label,
                            confidence = track.detection_confidence,
                            correlation = session.correlation_of(&handle),
                            "Removing tracked object"
                        );
                        session.release(handle);
                    }
                    report.evicted.push(id);
                }
                report.max_evicted_overlap = match (report.max_evicted_overlap, max_overlap) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                };

                let id = registry.next_id();
                info!(track = %id, label = %detection.label, "Tracking object");
                registry.insert(TrackedObject {
                    id,
                    handle: Some(candidate),
                    detection_confidence: detection.confidence,
                    label: detection.label.clone(),
                    last_known_position: position,
                });
                report.accepted.push(id);
            }
        }
    }
}
