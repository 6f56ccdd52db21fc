//! The optical-flow tracker the engine is layered on.
//!
//! The engine never looks at pixels itself. It seeds boxes into a
//! [MotionTracker] session, advances it once per frame and reads back
//! positions and correlations. Sessions are obtained from a
//! [SessionFactory], which may report that motion tracking is not
//! available at all.

use crate::{error::TrackerError, object::BBox};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Frame dimensions a session is created for. They stay fixed for the
/// lifetime of the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub width: usize,
    pub height: usize,
    pub row_stride: usize,
}

impl FrameGeometry {
    pub fn new(width: usize, height: usize, row_stride: usize) -> Self {
        Self {
            width,
            height,
            row_stride,
        }
    }

    /// Minimum number of bytes a luminance buffer of this geometry holds.
    /// Saturates at `usize::MAX`, a length no buffer reaches.
    pub fn required_len(&self) -> usize {
        self.row_stride.saturating_mul(self.height)
    }

    pub fn check_frame(&self, pixels: &[u8]) -> Result<(), TrackerError> {
        let required = self.required_len();
        if pixels.len() < required {
            return Err(TrackerError::FrameTooSmall {
                geometry: *self,
                len: pixels.len(),
                required,
            });
        }
        Ok(())
    }
}

impl fmt::Display for FrameGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} (stride {})",
            self.width, self.height, self.row_stride
        )
    }
}

/// Key of one object inside a motion tracking session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

/// One motion tracking session over a single video stream.
///
/// Implementations are called with the session's internal lock held,
/// so they never see two calls at once.
pub trait MotionTracker: Send {
    /// Start tracking `position` using the appearance in `frame`.
    fn seed(&mut self, object: ObjectId, position: &BBox, frame: &[u8], timestamp_ns: u64);

    /// Move the session to the next frame.
    fn advance(&mut self, frame: &[u8], timestamp_ns: u64);

    /// Overwrite the last known position of an object with an external one.
    fn set_position(&mut self, object: ObjectId, position: &BBox, timestamp_ns: u64);

    fn position_of(&self, object: ObjectId) -> Option<BBox>;

    fn correlation_of(&self, object: ObjectId) -> f32;

    /// Stop tracking an object. Called exactly once per seeded object.
    fn release(&mut self, object: ObjectId);

    /// Free everything the session holds. Called once, before the
    /// session is dropped.
    fn destroy_session(&mut self) {}
}

/// Creates motion tracking sessions.
pub trait SessionFactory: Send + Sync {
    /// Returns `None` when motion tracking is not supported here. The
    /// tracker then keeps working on detections alone.
    fn create_session(&self, geometry: FrameGeometry) -> Option<Box<dyn MotionTracker>>;
}

impl<F> SessionFactory for F
where
    F: Fn(FrameGeometry) -> Option<Box<dyn MotionTracker>> + Send + Sync,
{
    fn create_session(&self, geometry: FrameGeometry) -> Option<Box<dyn MotionTracker>> {
        self(geometry)
    }
}

/// A factory for platforms without an optical-flow tracker.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoMotionTracking;

impl SessionFactory for NoMotionTracking {
    fn create_session(&self, _geometry: FrameGeometry) -> Option<Box<dyn MotionTracker>> {
        None
    }
}
