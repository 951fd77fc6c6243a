//! View transform for pan/zoom and the gesture trackers that drive it.

use kurbo::{Affine, Point, Vec2};

/// Smallest allowed zoom scale.
pub const MIN_SCALE: f64 = 0.25;
/// Largest allowed zoom scale.
pub const MAX_SCALE: f64 = 3.0;
/// Scale factor applied per wheel tick or zoom button press.
pub const ZOOM_STEP: f64 = 1.05;

/// Direction of a discrete zoom event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
}

impl ZoomDirection {
    /// Derive a direction from a wheel delta (negative delta scrolls up, which zooms in).
    pub fn from_wheel(delta_y: f64) -> Self {
        if delta_y < 0.0 { ZoomDirection::In } else { ZoomDirection::Out }
    }

    fn factor(self) -> f64 {
        match self {
            ZoomDirection::In => ZOOM_STEP,
            ZoomDirection::Out => 1.0 / ZOOM_STEP,
        }
    }
}

/// Maps device pixel coordinates to logical drawing space.
///
/// `logical = (device - offset) / scale`. Never persisted; each open board
/// starts from [`ViewTransform::reset`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    /// Zoom factor. Within `[MIN_SCALE, MAX_SCALE]` unless built with
    /// [`ViewTransform::unclamped`].
    pub scale: f64,
    /// Translation in device pixels.
    pub offset: Vec2,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::reset()
    }
}

/// Clamp a scale into the supported zoom range.
pub fn clamp_scale(scale: f64) -> f64 {
    scale.clamp(MIN_SCALE, MAX_SCALE)
}

impl ViewTransform {
    /// The identity view: scale 1, no offset.
    pub const fn reset() -> Self {
        Self {
            scale: 1.0,
            offset: Vec2::ZERO,
        }
    }

    /// Create a transform, clamping the scale.
    pub fn new(scale: f64, offset: Vec2) -> Self {
        Self {
            scale: clamp_scale(scale),
            offset,
        }
    }

    /// Create a transform for offscreen framing, keeping any positive scale.
    pub fn unclamped(scale: f64, offset: Vec2) -> Self {
        Self { scale, offset }
    }

    /// Forward transform (logical to device), as used at render time.
    pub fn affine(&self) -> Affine {
        Affine::translate(self.offset) * Affine::scale(self.scale)
    }

    /// Inverse transform (device to logical), as used for input.
    pub fn inverse_affine(&self) -> Affine {
        Affine::scale(1.0 / self.scale) * Affine::translate(-self.offset)
    }

    /// Convert a device point to logical drawing space.
    pub fn to_logical(&self, device: Point) -> Point {
        Point::new(
            (device.x - self.offset.x) / self.scale,
            (device.y - self.offset.y) / self.scale,
        )
    }

    /// Convert a logical point to device coordinates.
    pub fn to_device(&self, logical: Point) -> Point {
        Point::new(
            logical.x * self.scale + self.offset.x,
            logical.y * self.scale + self.offset.y,
        )
    }

    /// Zoom one step around a device anchor, keeping the logical point under it fixed.
    pub fn zoom_at(&self, anchor: Point, direction: ZoomDirection) -> ViewTransform {
        self.scaled_around(anchor, self.scale * direction.factor())
    }

    /// Rescale so that the logical point under `anchor` stays under `anchor`.
    fn scaled_around(&self, anchor: Point, scale: f64) -> ViewTransform {
        let logical_anchor = self.to_logical(anchor);
        anchored(logical_anchor, anchor, scale)
    }
}

/// Build a transform that places `logical` at `device` with the given (clamped) scale.
fn anchored(logical: Point, device: Point, scale: f64) -> ViewTransform {
    let scale = clamp_scale(scale);
    ViewTransform {
        scale,
        offset: Vec2::new(device.x - logical.x * scale, device.y - logical.y * scale),
    }
}

/// Drag-to-pan gesture state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanGesture {
    initial_offset: Vec2,
    initial_device: Point,
    scale: f64,
}

impl PanGesture {
    /// Start panning from a device point.
    pub fn begin(device: Point, view: &ViewTransform) -> Self {
        Self {
            initial_offset: view.offset,
            initial_device: device,
            scale: view.scale,
        }
    }

    /// View for the current device point.
    pub fn update(&self, device: Point) -> ViewTransform {
        ViewTransform {
            scale: self.scale,
            offset: self.initial_offset + (device - self.initial_device),
        }
    }
}

/// Two-finger pinch-zoom gesture state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinchGesture {
    initial_distance: f64,
    initial_scale: f64,
    /// Logical point under the centroid when the gesture began.
    logical_anchor: Point,
}

impl PinchGesture {
    /// Start a pinch. Returns `None` when both touches coincide.
    pub fn begin(a: Point, b: Point, view: &ViewTransform) -> Option<Self> {
        let distance = a.distance(b);
        if distance < f64::EPSILON {
            return None;
        }
        Some(Self {
            initial_distance: distance,
            initial_scale: view.scale,
            logical_anchor: view.to_logical(a.midpoint(b)),
        })
    }

    /// View for the current touch positions.
    ///
    /// The frozen logical anchor is kept under the current centroid, so moving
    /// both fingers together also pans.
    pub fn update(&self, a: Point, b: Point) -> ViewTransform {
        let scale = a.distance(b) / self.initial_distance * self.initial_scale;
        anchored(self.logical_anchor, a.midpoint(b), scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Point, b: Point) {
        assert!((a.x - b.x).abs() < 1e-9, "{a:?} != {b:?}");
        assert!((a.y - b.y).abs() < 1e-9, "{a:?} != {b:?}");
    }

    #[test]
    fn test_default_view() {
        let view = ViewTransform::default();
        assert!((view.scale - 1.0).abs() < f64::EPSILON);
        assert_eq!(view.offset, Vec2::ZERO);
        assert_eq!(view, ViewTransform::reset());
    }

    #[test]
    fn test_to_logical_with_offset_and_scale() {
        let view = ViewTransform::new(2.0, Vec2::new(50.0, 100.0));
        let logical = view.to_logical(Point::new(150.0, 300.0));
        assert_close(logical, Point::new(50.0, 100.0));
    }

    #[test]
    fn test_roundtrip_conversion() {
        let views = [
            ViewTransform::reset(),
            ViewTransform::new(1.5, Vec2::new(30.0, -20.0)),
            ViewTransform::new(0.25, Vec2::new(-400.0, 12.5)),
            ViewTransform::new(3.0, Vec2::new(0.1, 999.0)),
        ];
        let points = [
            Point::new(0.0, 0.0),
            Point::new(123.0, 456.0),
            Point::new(-77.7, 3.3),
        ];
        for view in &views {
            for &p in &points {
                assert_close(view.to_logical(view.to_device(p)), p);
                assert_close(view.inverse_affine() * (view.affine() * p), p);
            }
        }
    }

    #[test]
    fn test_affine_matches_to_device() {
        let view = ViewTransform::new(2.5, Vec2::new(10.0, 20.0));
        let p = Point::new(4.0, -8.0);
        assert_close(view.affine() * p, view.to_device(p));
    }

    #[test]
    fn test_zoom_at_keeps_anchor_fixed() {
        let view = ViewTransform::new(1.2, Vec2::new(40.0, -15.0));
        let anchor = Point::new(300.0, 200.0);
        let before = view.to_logical(anchor);

        let zoomed = view.zoom_at(anchor, ZoomDirection::In);
        assert!((zoomed.scale - 1.2 * ZOOM_STEP).abs() < 1e-12);
        assert_close(zoomed.to_logical(anchor), before);

        let zoomed_out = zoomed.zoom_at(anchor, ZoomDirection::Out);
        assert!((zoomed_out.scale - 1.2).abs() < 1e-12);
        assert_close(zoomed_out.to_logical(anchor), before);
    }

    #[test]
    fn test_zoom_clamp() {
        let mut view = ViewTransform::reset();
        for _ in 0..200 {
            view = view.zoom_at(Point::ZERO, ZoomDirection::Out);
        }
        assert!((view.scale - MIN_SCALE).abs() < f64::EPSILON);

        for _ in 0..200 {
            view = view.zoom_at(Point::ZERO, ZoomDirection::In);
        }
        assert!((view.scale - MAX_SCALE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_wheel_direction() {
        assert_eq!(ZoomDirection::from_wheel(-3.0), ZoomDirection::In);
        assert_eq!(ZoomDirection::from_wheel(3.0), ZoomDirection::Out);
    }

    #[test]
    fn test_pan_gesture() {
        let view = ViewTransform::new(2.0, Vec2::new(10.0, 10.0));
        let pan = PanGesture::begin(Point::new(100.0, 100.0), &view);
        let panned = pan.update(Point::new(130.0, 80.0));
        assert_eq!(panned.offset, Vec2::new(40.0, -10.0));
        assert!((panned.scale - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pinch_scales_with_distance() {
        let view = ViewTransform::reset();
        let a = Point::new(100.0, 100.0);
        let b = Point::new(200.0, 100.0);
        let pinch = PinchGesture::begin(a, b, &view).unwrap();

        let spread = pinch.update(Point::new(50.0, 100.0), Point::new(250.0, 100.0));
        assert!((spread.scale - 2.0).abs() < 1e-12);
        // Centroid did not move, so the logical point under it is unchanged.
        assert_close(spread.to_logical(Point::new(150.0, 100.0)), Point::new(150.0, 100.0));
    }

    #[test]
    fn test_pinch_is_clamped() {
        let view = ViewTransform::reset();
        let pinch = PinchGesture::begin(Point::new(0.0, 0.0), Point::new(10.0, 0.0), &view).unwrap();
        let huge = pinch.update(Point::new(0.0, 0.0), Point::new(1000.0, 0.0));
        assert!((huge.scale - MAX_SCALE).abs() < f64::EPSILON);
        let tiny = pinch.update(Point::new(0.0, 0.0), Point::new(0.1, 0.0));
        assert!((tiny.scale - MIN_SCALE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pinch_degenerate() {
        let view = ViewTransform::reset();
        let p = Point::new(5.0, 5.0);
        assert!(PinchGesture::begin(p, p, &view).is_none());
    }
}
