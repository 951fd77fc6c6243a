//! Projection of marks into renderable primitives.
//!
//! This is a pure mapping: marks are never modified, and the output only
//! depends on the marks and the selected id.

use inkboard_core::marks::{Mark, ShapeKind, Tool};
use kurbo::{BezPath, Ellipse, Line, Point, Rect, Vec2};
use peniko::Color;

/// Smoothing tension applied to freehand polylines.
pub const STROKE_TENSION: f64 = 0.5;
/// Length of an arrow head along the shaft.
pub const ARROW_HEAD_LENGTH: f64 = 15.0;
/// Half the width of an arrow head's base.
pub const ARROW_HEAD_HALF_WIDTH: f64 = ARROW_HEAD_LENGTH / 2.0;
/// Font size of a label with zero stroke width.
pub const LABEL_BASE_SIZE: f64 = 16.0;

/// Fallback for colors that fail to parse.
const FALLBACK_COLOR: Color = Color::BLACK;

/// How a drawable combines with what is already on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Composite {
    /// Paint over earlier marks.
    #[default]
    Normal,
    /// Remove earlier marks where painted (destination-out).
    Erase,
}

/// Geometry of a single drawable.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    /// Smoothed freehand stroke with round caps and joins.
    Polyline(BezPath),
    /// A freehand mark with a single point.
    Dot(Point),
    Rect(Rect),
    Ellipse(Ellipse),
    Line(Line),
    /// Shaft plus a filled triangular head `[left, tip, right]`.
    /// Degenerate arrows have no head.
    Arrow { shaft: Line, head: Option<[Point; 3]> },
    /// Text anchored at its top-left corner.
    Label { anchor: Point, text: String, size: f64 },
}

/// A mark ready for the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct Drawable {
    pub mark_id: String,
    pub primitive: Primitive,
    pub color: Color,
    pub width: f64,
    pub opacity: f64,
    pub composite: Composite,
    pub highlighted: bool,
}

impl Drawable {
    /// Logical-space bounds of the primitive, ignoring stroke width.
    pub fn bounds(&self) -> Rect {
        use kurbo::Shape;
        match &self.primitive {
            Primitive::Polyline(path) => path.bounding_box(),
            Primitive::Dot(p) => Rect::from_points(*p, *p),
            Primitive::Rect(rect) => *rect,
            Primitive::Ellipse(ellipse) => ellipse.bounding_box(),
            Primitive::Line(line) => line.bounding_box(),
            Primitive::Arrow { shaft, head } => {
                let rect = shaft.bounding_box();
                head.iter().flatten().fold(rect, |r, p| r.union_pt(*p))
            }
            Primitive::Label { anchor, text, size } => {
                // Approximate extents; the renderer refines them from the real layout.
                let width = (text.chars().count() as f64 * size * 0.6).max(*size);
                Rect::new(anchor.x, anchor.y, anchor.x + width, anchor.y + size * 1.2)
            }
        }
    }
}

/// Parse a `#rgb`, `#rrggbb` or `#rrggbbaa` color.
pub fn parse_color(s: &str) -> Option<Color> {
    let hex = s.trim().strip_prefix('#')?;
    if !hex.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    match hex.len() {
        3 => {
            let mut rgb = [0u8; 3];
            for (i, c) in rgb.iter_mut().enumerate() {
                *c = channel(i..i + 1)? * 17;
            }
            Some(Color::from_rgba8(rgb[0], rgb[1], rgb[2], 255))
        }
        6 => Some(Color::from_rgba8(channel(0..2)?, channel(2..4)?, channel(4..6)?, 255)),
        8 => Some(Color::from_rgba8(
            channel(0..2)?,
            channel(2..4)?,
            channel(4..6)?,
            channel(6..8)?,
        )),
        _ => None,
    }
}

/// Project one mark.
///
/// Returns `None` for marks with no points.
pub fn project_mark(mark: &Mark, selected: Option<&str>) -> Option<Drawable> {
    let primitive = primitive_for(mark)?;
    let color = parse_color(&mark.color).unwrap_or_else(|| {
        log::debug!("Unparseable color {:?} on mark {}", mark.color, mark.id);
        FALLBACK_COLOR
    });
    Some(Drawable {
        mark_id: mark.id.clone(),
        primitive,
        color,
        width: mark.width,
        opacity: mark.opacity.clamp(0.0, 1.0),
        composite: if mark.tool == Tool::Eraser {
            Composite::Erase
        } else {
            Composite::Normal
        },
        highlighted: selected == Some(mark.id.as_str()),
    })
}

/// Project a whole board: committed marks in order, then in-progress marks.
pub fn project_board<'a>(
    committed: &'a [Mark],
    active: impl IntoIterator<Item = &'a Mark>,
    selected: Option<&str>,
) -> Vec<Drawable> {
    committed
        .iter()
        .chain(active)
        .filter_map(|mark| project_mark(mark, selected))
        .collect()
}

fn primitive_for(mark: &Mark) -> Option<Primitive> {
    let first = *mark.points.first()?;
    let last = *mark.points.last()?;
    if mark.tool == Tool::Text {
        return Some(Primitive::Label {
            anchor: first,
            text: mark.text.clone().unwrap_or_default(),
            size: LABEL_BASE_SIZE + mark.width.max(0.0),
        });
    }
    let primitive = match mark.shape_type {
        Some(ShapeKind::Rectangle) => Primitive::Rect(Rect::from_points(first, last)),
        Some(ShapeKind::Circle) => {
            let rect = Rect::from_points(first, last);
            Primitive::Ellipse(Ellipse::new(rect.center(), (rect.width() / 2.0, rect.height() / 2.0), 0.0))
        }
        Some(ShapeKind::Line) => Primitive::Line(Line::new(first, last)),
        Some(ShapeKind::Arrow) => Primitive::Arrow {
            shaft: Line::new(first, last),
            head: arrow_head(first, last),
        },
        None if mark.points.len() == 1 => Primitive::Dot(first),
        None => Primitive::Polyline(smooth_polyline(&mark.points, STROKE_TENSION)),
    };
    Some(primitive)
}

/// Triangle `[left, tip, right]` at the end of a shaft, or `None` for a zero-length shaft.
pub fn arrow_head(start: Point, end: Point) -> Option<[Point; 3]> {
    let delta = end - start;
    let len = delta.hypot();
    if len < f64::EPSILON {
        return None;
    }
    let dir = delta / len;
    let perp = Vec2::new(-dir.y, dir.x);
    let back = end - dir * ARROW_HEAD_LENGTH;
    Some([
        back + perp * ARROW_HEAD_HALF_WIDTH,
        end,
        back - perp * ARROW_HEAD_HALF_WIDTH,
    ])
}

/// Cardinal spline through `points`, as a Bézier path.
///
/// Control points for each interior vertex are placed along the chord of its
/// neighbours, split in proportion to the adjacent segment lengths. The first
/// and last segments are quadratic.
pub fn smooth_polyline(points: &[Point], tension: f64) -> BezPath {
    let mut path = BezPath::new();
    let Some(first) = points.first() else {
        return path;
    };
    path.move_to(*first);
    if points.len() < 3 || tension == 0.0 {
        for p in &points[1..] {
            path.line_to(*p);
        }
        return path;
    }

    // (incoming, outgoing) control points for every interior vertex.
    let controls: Vec<(Point, Point)> = points
        .windows(3)
        .map(|w| control_points(w[0], w[1], w[2], tension))
        .collect();

    path.quad_to(controls[0].0, points[1]);
    for i in 1..controls.len() {
        path.curve_to(controls[i - 1].1, controls[i].0, points[i + 1]);
    }
    let n = points.len();
    path.quad_to(controls[controls.len() - 1].1, points[n - 1]);
    path
}

fn control_points(p0: Point, p1: Point, p2: Point, tension: f64) -> (Point, Point) {
    let d01 = p0.distance(p1);
    let d12 = p1.distance(p2);
    let total = d01 + d12;
    if total < f64::EPSILON {
        return (p1, p1);
    }
    let chord = p2 - p0;
    let fa = tension * d01 / total;
    let fb = tension * d12 / total;
    (p1 - chord * fa, p1 + chord * fb)
}
