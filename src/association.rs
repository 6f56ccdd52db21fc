use crate::{
    config::Config,
    object::{BBox, Detection, ScreenRect, TrackId},
    registry::TrackRegistry,
    session::TrackHandle,
};
use itertools::{Either, Itertools};
use noisy_float::prelude::r32;
use tracing::debug;

/// A detection that passed the size filter.
#[derive(Clone, Debug)]
pub struct Trackable<'a> {
    pub bbox: BBox,
    pub detection: &'a Detection,
}

/// What happens to a seeded candidate.
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    /// An overlapping track with a better detection score and a strong
    /// correlation keeps its place.
    Rejected { by: TrackId },
    /// The candidate is tracked after removing `evict`.
    Accepted {
        evict: Vec<TrackId>,
        /// Largest IoU among the evicted tracks.
        max_overlap: Option<f32>,
    },
}

/// Arbitrates new detections against tracked objects.
pub struct AssociationEngine {
    max_overlap: f32,
    min_size: f32,
    marginal_correlation: f32,
}

impl AssociationEngine {
    pub fn new(config: &Config) -> Self {
        let Config {
            max_overlap,
            min_size,
            marginal_correlation,
            ..
        } = *config;

        Self {
            max_overlap,
            min_size,
            marginal_correlation,
        }
    }

    /// Too small to track, or not a box at all (NaN sides).
    pub fn is_degenerate(&self, bbox: &BBox) -> bool {
        let (width, height) = (bbox.width(), bbox.height());
        width.is_nan() || height.is_nan() || width < self.min_size || height < self.min_size
    }

    /// Split a batch into detections worth tracking and render hints for
    /// every detection that has a box. Detections with a non-finite
    /// confidence are never tracked.
    pub fn filter<'a>(&self, detections: &'a [Detection]) -> (Vec<Trackable<'a>>, Vec<ScreenRect>) {
        let with_box = detections
            .iter()
            .filter_map(|detection| Some((detection.bbox?, detection)));

        let screen_rects = with_box
            .clone()
            .map(|(bbox, detection)| ScreenRect {
                confidence: detection.confidence,
                bbox,
            })
            .collect();

        let (trackables, degenerate): (Vec<_>, Vec<_>) =
            with_box.partition_map(|(bbox, detection)| {
                if self.is_degenerate(&bbox) || !detection.confidence.is_finite() {
                    Either::Right((bbox, detection.confidence))
                } else {
                    Either::Left(Trackable { bbox, detection })
                }
            });
        for (bbox, confidence) in degenerate {
            debug!(%bbox, confidence, "Degenerate rectangle");
        }

        (trackables, screen_rects)
    }

    pub fn is_marginal(&self, correlation: f32) -> bool {
        correlation < self.marginal_correlation
    }

    /// Decide the fate of a candidate at `position` against every
    /// motion-tracked entry of the registry.
    ///
    /// Tracks are compared at their live position, falling back to the
    /// last known one. Eviction marks accumulate; the registry is not
    /// touched.
    pub fn arbitrate<P, F>(
        &self,
        position: &BBox,
        confidence: f32,
        registry: &TrackRegistry,
        live_position: P,
        live_correlation: F,
    ) -> Verdict
    where
        P: Fn(&TrackHandle) -> Option<BBox>,
        F: Fn(&TrackHandle) -> f32,
    {
        let mut evict = vec![];

        for track in registry.iter() {
            let Some(handle) = &track.handle else {
                continue;
            };
            let incumbent = live_position(handle).unwrap_or(track.last_known_position);
            let iou = position.iou_with(&incumbent);
            if iou <= self.max_overlap {
                continue;
            }

            if confidence < track.detection_confidence
                && live_correlation(handle) > self.marginal_correlation
            {
                return Verdict::Rejected { by: track.id };
            }
            evict.push((track.id, iou));
        }

        let max_overlap = evict.iter().map(|&(_, iou)| r32(iou)).max().map(|iou| iou.raw());
        Verdict::Accepted {
            evict: evict.into_iter().map(|(id, _)| id).collect(),
            max_overlap,
        }
    }
}
