//! Inkboard Render Library
//!
//! Projects board marks into drawables and renders them. The default
//! implementation uses Vello for GPU-accelerated rendering and can export
//! boards as PNG images.

pub mod projection;
mod renderer;

#[cfg(feature = "vello-renderer")]
mod raster;
#[cfg(feature = "vello-renderer")]
mod vello_impl;

pub use projection::{Composite, Drawable, Primitive, parse_color, project_board, project_mark};
pub use renderer::{RenderContext, RenderResult, Renderer, RendererError};

#[cfg(feature = "vello-renderer")]
pub use raster::{
    EXPORT_PADDING, ExportFormat, ImageExporter, MAX_EXPORT_DIMENSION, RasterImage, content_frame, encode_png,
};
#[cfg(feature = "vello-renderer")]
pub use vello_impl::VelloRenderer;

#[cfg(test)]
mod tests {
    use super::*;
    use inkboard_core::{Mark, Tool};
    use kurbo::{Point, Size};

    // Projection and the renderer trait carry no GPU or image-codec dependency.
    #[test]
    fn test_projection_builds_context_without_backend() {
        let mut mark = Mark::new(Tool::Pen, Point::new(0.0, 0.0), "#000000", 2.0, 1.0);
        mark.extend(Point::new(10.0, 10.0));
        let ctx = RenderContext::new(project_board(&[mark], Vec::<&Mark>::new(), None), Size::new(50.0, 50.0));
        assert_eq!(ctx.drawables.len(), 1);
        assert!(matches!(ctx.drawables[0].primitive, Primitive::Polyline(_)));
    }
}
