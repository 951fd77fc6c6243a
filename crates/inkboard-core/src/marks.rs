//! Mark definitions: the atomic drawable unit of a board.

use chrono::{SecondsFormat, Utc};
use kurbo::{Line, ParamCurveNearest, Point, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a mark.
pub type MarkId = String;

/// The only page a board has.
pub const DEFAULT_PAGE: &str = "default";

/// Generate a fresh mark id.
pub fn new_mark_id() -> MarkId {
    Uuid::new_v4().to_string()
}

/// Current time as an RFC 3339 UTC timestamp with milliseconds.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Drawing tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Pen,
    Highlighter,
    Eraser,
    Rectangle,
    Circle,
    Line,
    Arrow,
    Text,
    Select,
}

impl Tool {
    pub const ALL: [Tool; 9] = [
        Tool::Pen,
        Tool::Highlighter,
        Tool::Eraser,
        Tool::Rectangle,
        Tool::Circle,
        Tool::Line,
        Tool::Arrow,
        Tool::Text,
        Tool::Select,
    ];

    /// Wire name of the tool.
    pub fn as_str(self) -> &'static str {
        match self {
            Tool::Pen => "pen",
            Tool::Highlighter => "highlighter",
            Tool::Eraser => "eraser",
            Tool::Rectangle => "rectangle",
            Tool::Circle => "circle",
            Tool::Line => "line",
            Tool::Arrow => "arrow",
            Tool::Text => "text",
            Tool::Select => "select",
        }
    }

    /// Parse a wire name.
    pub fn parse(name: &str) -> Option<Tool> {
        Tool::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Freehand tools grow their point list while capturing.
    pub fn is_freehand(self) -> bool {
        matches!(self, Tool::Pen | Tool::Highlighter | Tool::Eraser)
    }

    /// The shape kind drawn by this tool, if it is a shape tool.
    pub fn shape_kind(self) -> Option<ShapeKind> {
        match self {
            Tool::Rectangle => Some(ShapeKind::Rectangle),
            Tool::Circle => Some(ShapeKind::Circle),
            Tool::Line => Some(ShapeKind::Line),
            Tool::Arrow => Some(ShapeKind::Arrow),
            _ => None,
        }
    }

    /// Whether this tool ever produces a mark.
    pub fn is_drawable(self) -> bool {
        self != Tool::Select
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a two-point shape mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Rectangle,
    Circle,
    Line,
    Arrow,
}

impl ShapeKind {
    pub fn tool(self) -> Tool {
        match self {
            ShapeKind::Rectangle => Tool::Rectangle,
            ShapeKind::Circle => Tool::Circle,
            ShapeKind::Line => Tool::Line,
            ShapeKind::Arrow => Tool::Arrow,
        }
    }
}

/// Identifies one physical input stream: the mouse, or a single touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionId {
    Mouse,
    Touch(u64),
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionId::Mouse => f.write_str("mouse"),
            SessionId::Touch(id) => write!(f, "touch-{id}"),
        }
    }
}

/// A committed or in-progress drawable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mark {
    pub id: MarkId,
    pub tool: Tool,
    pub points: Vec<Point>,
    pub color: String,
    pub width: f64,
    pub opacity: f64,
    pub page_id: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape_type: Option<ShapeKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Mark {
    /// Create a mark with a fresh id and timestamp.
    pub fn new(tool: Tool, origin: Point, color: impl Into<String>, width: f64, opacity: f64) -> Self {
        Self {
            id: new_mark_id(),
            tool,
            points: vec![origin],
            color: color.into(),
            width,
            opacity,
            page_id: DEFAULT_PAGE.to_string(),
            created_at: timestamp_now(),
            shape_type: tool.shape_kind(),
            text: None,
        }
    }

    /// Create a committed text label.
    pub fn text(text: impl Into<String>, anchor: Point, color: impl Into<String>, width: f64, opacity: f64) -> Self {
        let mut mark = Self::new(Tool::Text, anchor, color, width, opacity);
        mark.text = Some(text.into());
        mark
    }

    pub fn is_shape(&self) -> bool {
        self.shape_type.is_some()
    }

    /// Extend the mark with a new input point.
    ///
    /// Shapes keep only their start and the live end point; freehand marks append.
    pub fn extend(&mut self, point: Point) {
        if self.is_shape() {
            let start = self.points.first().copied().unwrap_or(point);
            self.points = vec![start, point];
        } else {
            self.points.push(point);
        }
    }

    /// Check the structural invariants of a mark.
    pub fn is_well_formed(&self) -> bool {
        if !self.tool.is_drawable() {
            return false;
        }
        if !(0.0..=1.0).contains(&self.opacity) || !self.width.is_finite() || self.width < 0.0 {
            return false;
        }
        if self.points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return false;
        }
        if self.shape_type != self.tool.shape_kind() {
            return false;
        }
        if self.tool == Tool::Text {
            return self.text.is_some() && self.points.len() == 1;
        }
        if self.text.is_some() {
            return false;
        }
        if self.is_shape() {
            return (1..=2).contains(&self.points.len());
        }
        !self.points.is_empty()
    }

    /// Axis-aligned bounds of the mark's points.
    pub fn bounds(&self) -> Rect {
        let mut iter = self.points.iter();
        let Some(first) = iter.next() else {
            return Rect::ZERO;
        };
        iter.fold(Rect::from_points(*first, *first), |r, p| r.union_pt(*p))
    }

    /// Whether a logical point lies on this mark, within `tolerance`.
    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        let tolerance = tolerance + self.width / 2.0;
        match self.shape_type {
            Some(ShapeKind::Rectangle) => self.bounds().inflate(tolerance, tolerance).contains(point),
            Some(ShapeKind::Circle) => {
                let bounds = self.bounds();
                let center = bounds.center();
                let rx = (bounds.width() / 2.0 + tolerance).max(f64::EPSILON);
                let ry = (bounds.height() / 2.0 + tolerance).max(f64::EPSILON);
                let dx = (point.x - center.x) / rx;
                let dy = (point.y - center.y) / ry;
                dx * dx + dy * dy <= 1.0
            }
            Some(ShapeKind::Line) | Some(ShapeKind::Arrow) | None => {
                if self.tool == Tool::Text {
                    return self
                        .points
                        .first()
                        .is_some_and(|p| p.distance(point) <= tolerance.max(12.0));
                }
                near_polyline(&self.points, point, tolerance)
            }
        }
    }
}

fn near_polyline(points: &[Point], point: Point, tolerance: f64) -> bool {
    match points {
        [] => false,
        [single] => single.distance(point) <= tolerance,
        _ => points.windows(2).any(|w| {
            let nearest = Line::new(w[0], w[1]).nearest(point, 1e-6);
            nearest.distance_sq.sqrt() <= tolerance
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_display() {
        assert_eq!(SessionId::Mouse.to_string(), "mouse");
        assert_eq!(SessionId::Touch(7).to_string(), "touch-7");
    }

    #[test]
    fn test_tool_wire_names() {
        for tool in Tool::ALL {
            assert_eq!(Tool::parse(tool.as_str()), Some(tool));
            let json = serde_json::to_string(&tool).unwrap();
            assert_eq!(json, format!("\"{}\"", tool.as_str()));
        }
        assert_eq!(Tool::parse("laser"), None);
    }

    #[test]
    fn test_new_shape_mark_mirrors_tool() {
        let mark = Mark::new(Tool::Arrow, Point::new(1.0, 2.0), "#000000", 5.0, 1.0);
        assert_eq!(mark.shape_type, Some(ShapeKind::Arrow));
        assert_eq!(mark.page_id, DEFAULT_PAGE);
        assert!(mark.is_well_formed());
    }

    #[test]
    fn test_extend_shape_keeps_two_points() {
        let mut mark = Mark::new(Tool::Rectangle, Point::new(0.0, 0.0), "#000000", 5.0, 1.0);
        for i in 1..10 {
            mark.extend(Point::new(i as f64, i as f64));
            assert_eq!(mark.points.len(), 2);
        }
        assert_eq!(mark.points, vec![Point::new(0.0, 0.0), Point::new(9.0, 9.0)]);
    }

    #[test]
    fn test_extend_freehand_appends() {
        let mut mark = Mark::new(Tool::Pen, Point::new(0.0, 0.0), "#000000", 5.0, 1.0);
        mark.extend(Point::new(1.0, 1.0));
        mark.extend(Point::new(2.0, 0.0));
        assert_eq!(mark.points.len(), 3);
    }

    #[test]
    fn test_wire_format() {
        let mut mark = Mark::new(Tool::Circle, Point::new(3.0, 4.0), "#EF4444", 8.0, 1.0);
        mark.id = "abc".to_string();
        mark.created_at = "2024-01-01T00:00:00.000Z".to_string();
        let value = serde_json::to_value(&mark).unwrap();
        assert_eq!(value["pageId"], "default");
        assert_eq!(value["createdAt"], "2024-01-01T00:00:00.000Z");
        assert_eq!(value["shapeType"], "circle");
        assert_eq!(value["points"][0]["x"], 3.0);
        assert!(value.get("text").is_none());
    }

    #[test]
    fn test_timestamp_format() {
        let ts = timestamp_now();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2024-01-01T00:00:00.000Z".len());
    }

    #[test]
    fn test_well_formed_rules() {
        let text = Mark::text("hi", Point::new(0.0, 0.0), "#000000", 5.0, 1.0);
        assert!(text.is_well_formed());

        let mut bad = text.clone();
        bad.text = None;
        assert!(!bad.is_well_formed());

        let mut pen = Mark::new(Tool::Pen, Point::new(0.0, 0.0), "#000000", 5.0, 1.0);
        pen.points.clear();
        assert!(!pen.is_well_formed());

        let mut shape = Mark::new(Tool::Line, Point::new(0.0, 0.0), "#000000", 5.0, 1.0);
        shape.points = vec![Point::ZERO; 3];
        assert!(!shape.is_well_formed());

        let mut opacity = Mark::new(Tool::Pen, Point::new(0.0, 0.0), "#000000", 5.0, 1.5);
        assert!(!opacity.is_well_formed());
        opacity.opacity = 0.5;
        assert!(opacity.is_well_formed());
    }

    #[test]
    fn test_hit_test() {
        let mut line = Mark::new(Tool::Pen, Point::new(0.0, 0.0), "#000000", 2.0, 1.0);
        line.extend(Point::new(100.0, 0.0));
        assert!(line.hit_test(Point::new(50.0, 3.0), 3.0));
        assert!(!line.hit_test(Point::new(50.0, 30.0), 3.0));

        let mut rect = Mark::new(Tool::Rectangle, Point::new(0.0, 0.0), "#000000", 2.0, 1.0);
        rect.extend(Point::new(50.0, 40.0));
        assert!(rect.hit_test(Point::new(25.0, 20.0), 0.0));
        assert!(!rect.hit_test(Point::new(80.0, 20.0), 0.0));
    }

    #[test]
    fn test_circle_hit_test_follows_ellipse() {
        let mut circle = Mark::new(Tool::Circle, Point::new(0.0, 0.0), "#000000", 2.0, 1.0);
        circle.extend(Point::new(100.0, 60.0));
        assert!(circle.hit_test(Point::new(50.0, 30.0), 0.0));
        assert!(circle.hit_test(Point::new(100.5, 30.0), 0.0));
        assert!(circle.hit_test(Point::new(50.0, 62.0), 1.5));
        // Box corners lie outside the ellipse.
        assert!(!circle.hit_test(Point::new(3.0, 3.0), 0.0));
        assert!(!circle.hit_test(Point::new(97.0, 57.0), 0.0));
    }

    #[test]
    fn test_bounds() {
        let mut mark = Mark::new(Tool::Pen, Point::new(10.0, 10.0), "#000000", 5.0, 1.0);
        mark.extend(Point::new(30.0, 5.0));
        mark.extend(Point::new(20.0, 25.0));
        assert_eq!(mark.bounds(), Rect::new(10.0, 5.0, 30.0, 25.0));
    }
}
