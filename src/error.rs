use crate::{motion::FrameGeometry, object::TrackId};
use thiserror::Error;

/// Errors a caller of [MultiBoxTracker](crate::MultiBoxTracker) can act on.
///
/// Lost tracks, weak candidates and stale position updates are not
/// errors; they are handled inside the tracker and only logged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackerError {
    #[error("frame geometry {got} does not match the active session geometry {expected}")]
    GeometryMismatch {
        expected: FrameGeometry,
        got: FrameGeometry,
    },
    #[error("frame buffer holds {len} bytes, {geometry} needs at least {required}")]
    FrameTooSmall {
        geometry: FrameGeometry,
        len: usize,
        required: usize,
    },
    #[error("no tracked object with id {0}")]
    UnknownTrack(TrackId),
    #[error("motion tracking is unavailable")]
    TrackingUnavailable,
}
