//! Current-tool settings applied to new marks.

use crate::marks::Tool;
use serde::{Deserialize, Serialize};

/// Minimum stroke width.
pub const MIN_WIDTH: f64 = 1.0;
/// Maximum stroke width.
pub const MAX_WIDTH: f64 = 30.0;
/// Default stroke width.
pub const DEFAULT_WIDTH: f64 = 5.0;
/// Opacity forced by the highlighter.
pub const HIGHLIGHTER_OPACITY: f64 = 0.5;
/// Default ink color.
pub const DEFAULT_COLOR: &str = "#000000";

/// Toolbar palette.
pub const PALETTE: [(&str, &str); 6] = [
    ("black", "#000000"),
    ("red", "#EF4444"),
    ("blue", "#3B82F6"),
    ("green", "#10B981"),
    ("yellow", "#F59E0B"),
    ("purple", "#8B5CF6"),
];

/// Stroke width presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidthPreset {
    Small,
    Medium,
    Large,
}

impl WidthPreset {
    pub fn width(self) -> f64 {
        match self {
            WidthPreset::Small => 3.0,
            WidthPreset::Medium => 8.0,
            WidthPreset::Large => 15.0,
        }
    }
}

/// Tool, color, width and opacity for the next mark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSettings {
    tool: Tool,
    color: String,
    width: f64,
    opacity: f64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            tool: Tool::Pen,
            color: DEFAULT_COLOR.to_string(),
            width: DEFAULT_WIDTH,
            opacity: 1.0,
        }
    }
}

impl ToolSettings {
    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    /// Select a tool. The highlighter forces half opacity; every other tool resets it to 1.
    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
        self.opacity = if tool == Tool::Highlighter {
            HIGHLIGHTER_OPACITY
        } else {
            1.0
        };
    }

    pub fn set_color(&mut self, color: impl Into<String>) {
        self.color = color.into();
    }

    /// Set the stroke width, clamped to the slider range.
    pub fn set_width(&mut self, width: f64) {
        if width.is_finite() {
            self.width = width.clamp(MIN_WIDTH, MAX_WIDTH);
        }
    }

    pub fn set_preset(&mut self, preset: WidthPreset) {
        self.set_width(preset.width());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ToolSettings::default();
        assert_eq!(settings.tool(), Tool::Pen);
        assert_eq!(settings.color(), "#000000");
        assert!((settings.width() - 5.0).abs() < f64::EPSILON);
        assert!((settings.opacity() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_highlighter_opacity() {
        let mut settings = ToolSettings::default();
        settings.set_tool(Tool::Highlighter);
        assert!((settings.opacity() - 0.5).abs() < f64::EPSILON);
        settings.set_tool(Tool::Pen);
        assert!((settings.opacity() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_width_clamp() {
        let mut settings = ToolSettings::default();
        settings.set_width(100.0);
        assert!((settings.width() - MAX_WIDTH).abs() < f64::EPSILON);
        settings.set_width(0.0);
        assert!((settings.width() - MIN_WIDTH).abs() < f64::EPSILON);
        settings.set_width(f64::NAN);
        assert!((settings.width() - MIN_WIDTH).abs() < f64::EPSILON);
    }

    #[test]
    fn test_presets() {
        let mut settings = ToolSettings::default();
        settings.set_preset(WidthPreset::Large);
        assert!((settings.width() - 15.0).abs() < f64::EPSILON);
        settings.set_preset(WidthPreset::Small);
        assert!((settings.width() - 3.0).abs() < f64::EPSILON);
    }
}
