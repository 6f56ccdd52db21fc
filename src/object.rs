use geo::{prelude::*, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An axis-aligned box in preview frame coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BBox {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn to_rect(&self) -> Rect<f32> {
        Rect::new((self.left, self.top), (self.right, self.bottom))
    }

    pub fn area(&self) -> f32 {
        if self.width() <= 0.0 || self.height() <= 0.0 {
            return 0.0;
        }
        self.to_rect().unsigned_area()
    }

    /// The overlapping part of both boxes, or `None` if they only touch
    /// or do not meet at all.
    pub fn intersection(&self, other: &BBox) -> Option<BBox> {
        let overlap = BBox {
            left: self.left.max(other.left),
            top: self.top.max(other.top),
            right: self.right.min(other.right),
            bottom: self.bottom.min(other.bottom),
        };
        (overlap.width() > 0.0 && overlap.height() > 0.0).then_some(overlap)
    }

    pub fn iou_with(&self, other: &BBox) -> f32 {
        let Some(intersec) = self.intersection(other) else {
            return 0.0;
        };
        let intersec = intersec.area();
        let union = self.area() + other.area() - intersec;
        if union <= f32::EPSILON {
            return 0.0;
        }
        intersec / union
    }
}

impl fmt::Display for BBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// One box reported by the object detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub confidence: f32,
    pub bbox: Option<BBox>,
    pub label: String,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BBox) -> Self {
        Self {
            confidence,
            bbox: Some(bbox),
            label: label.into(),
        }
    }
}

/// Render hint for a detection considered in the latest batch,
/// whether it ended up tracked or not.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenRect {
    pub confidence: f32,
    pub bbox: BBox,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(pub usize);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Read-only copy of a tracked object handed out to consumers.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedObjectView {
    pub id: TrackId,
    pub position: BBox,
    pub confidence: f32,
    pub label: String,
    /// `false` for entries created while motion tracking was unavailable.
    pub motion_tracked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disjoint_boxes_have_no_overlap() {
        let a = BBox::new(0., 0., 10., 10.);
        let b = BBox::new(20., 20., 30., 30.);
        assert_eq!(a.intersection(&b), None);
        assert_eq!(a.iou_with(&b), 0.0);
    }

    #[test]
    fn touching_boxes_have_no_overlap() {
        let a = BBox::new(0., 0., 10., 10.);
        let b = BBox::new(10., 0., 20., 10.);
        assert_eq!(a.iou_with(&b), 0.0);
    }

    #[test]
    fn shifted_boxes_overlap() {
        let a = BBox::new(0., 0., 100., 100.);
        let b = BBox::new(10., 10., 110., 110.);
        assert_eq!(a.intersection(&b), Some(BBox::new(10., 10., 100., 100.)));
        let expected = 8100.0 / (10000.0 + 10000.0 - 8100.0);
        assert!((a.iou_with(&b) - expected).abs() < 1e-6);
    }

    #[test]
    fn identical_boxes_have_unit_iou() {
        let a = BBox::new(5., 5., 25., 45.);
        assert!((a.iou_with(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn inverted_box_has_negative_extent_and_no_area() {
        let a = BBox::new(10., 10., 0., 0.);
        assert_eq!(a.width(), -10.0);
        assert_eq!(a.area(), 0.0);
        assert_eq!(a.iou_with(&BBox::new(0., 0., 10., 10.)), 0.0);
    }
}
