//! Renderer trait abstraction.

use crate::projection::{Drawable, project_board};
use inkboard_core::{Board, ViewTransform};
use kurbo::Size;
use peniko::Color;
use thiserror::Error;

/// Renderer errors.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("Initialization failed: {0}")]
    InitFailed(String),
    #[error("Render failed: {0}")]
    RenderFailed(String),
    #[error("Readback failed: {0}")]
    Readback(String),
    #[error("Image encoding failed: {0}")]
    Encode(String),
}

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RendererError>;

/// Default canvas background.
pub const DEFAULT_BACKGROUND: Color = Color::WHITE;
/// Default selection outline color.
pub const DEFAULT_SELECTION_COLOR: Color = Color::from_rgba8(59, 130, 246, 255);

/// Context for a single render frame.
#[derive(Debug, Clone)]
pub struct RenderContext {
    /// Drawables in paint order.
    pub drawables: Vec<Drawable>,
    /// Logical-to-device transform.
    pub view: ViewTransform,
    /// Viewport size in device pixels.
    pub viewport_size: Size,
    /// Background color.
    pub background_color: Color,
    /// Selection highlight color.
    pub selection_color: Color,
}

impl RenderContext {
    /// Create a new render context.
    pub fn new(drawables: Vec<Drawable>, viewport_size: Size) -> Self {
        Self {
            drawables,
            view: ViewTransform::reset(),
            viewport_size,
            background_color: DEFAULT_BACKGROUND,
            selection_color: DEFAULT_SELECTION_COLOR,
        }
    }

    /// Project a board's committed and in-progress marks.
    pub fn for_board(board: &Board, viewport_size: Size) -> Self {
        let drawables = project_board(
            board.marks(),
            board.active_marks(),
            board.selected().map(String::as_str),
        );
        Self::new(drawables, viewport_size)
    }

    /// Set the view transform.
    pub fn with_view(mut self, view: ViewTransform) -> Self {
        self.view = view;
        self
    }

    /// Set the background color.
    pub fn with_background(mut self, color: Color) -> Self {
        self.background_color = color;
        self
    }

    /// Set the selection color.
    pub fn with_selection_color(mut self, color: Color) -> Self {
        self.selection_color = color;
        self
    }
}

/// Trait for rendering backends.
pub trait Renderer: Send + Sync {
    /// Build the scene for a frame.
    fn build_scene(&mut self, ctx: &RenderContext);

    /// Get the background color (for clearing).
    fn background_color(&self, ctx: &RenderContext) -> Color {
        ctx.background_color
    }
}
