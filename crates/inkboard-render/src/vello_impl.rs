//! Vello-based renderer implementation.

use crate::projection::{Composite, Drawable, Primitive};
use crate::renderer::{RenderContext, Renderer};
use kurbo::{Affine, BezPath, Cap, Circle, Join, Point, Rect, Stroke};
use parley::layout::PositionedLayoutItem;
use parley::{FontContext, LayoutContext, StyleProperty};
use peniko::{BlendMode, Brush, Color, Compose, Fill, Mix};
use vello::Scene;

/// Gap between a highlighted mark and its selection outline, in device pixels.
const SELECTION_PADDING: f64 = 4.0;

/// Vello-based renderer for GPU-accelerated 2D graphics.
pub struct VelloRenderer {
    /// The Vello scene being built.
    scene: Scene,
    /// Font context for text rendering (cached to avoid re-scanning system fonts).
    font_cx: FontContext,
    /// Layout context for text rendering.
    layout_cx: LayoutContext<Brush>,
    /// Current zoom level (for zoom-independent decorations).
    zoom: f64,
    /// Set once a label has rendered without any glyphs.
    warned_missing_fonts: bool,
}

impl Default for VelloRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VelloRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VelloRenderer").field("zoom", &self.zoom).finish_non_exhaustive()
    }
}

impl VelloRenderer {
    /// Create a new Vello renderer.
    pub fn new() -> Self {
        Self {
            scene: Scene::new(),
            font_cx: FontContext::new(),
            layout_cx: LayoutContext::new(),
            zoom: 1.0,
            warned_missing_fonts: false,
        }
    }

    /// Get the built scene for rendering.
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Take ownership of the scene (resets internal scene).
    pub fn take_scene(&mut self) -> Scene {
        std::mem::take(&mut self.scene)
    }

    fn render_drawable(&mut self, drawable: &Drawable, transform: Affine) -> Rect {
        // Erasers paint opaque inside a destination-out layer; the layer alpha carries opacity.
        let color = match drawable.composite {
            Composite::Normal => drawable.color.multiply_alpha(drawable.opacity as f32),
            Composite::Erase => Color::BLACK,
        };
        let stroke = Stroke::new(drawable.width)
            .with_caps(Cap::Round)
            .with_join(Join::Round);

        match &drawable.primitive {
            Primitive::Polyline(path) => {
                self.scene.stroke(&stroke, transform, color, None, path);
            }
            Primitive::Dot(center) => {
                let dot = Circle::new(*center, (drawable.width / 2.0).max(0.5));
                self.scene.fill(Fill::NonZero, transform, color, None, &dot);
            }
            Primitive::Rect(rect) => {
                self.scene.stroke(&stroke.clone().with_join(Join::Miter), transform, color, None, rect);
            }
            Primitive::Ellipse(ellipse) => {
                self.scene.stroke(&stroke, transform, color, None, ellipse);
            }
            Primitive::Line(line) => {
                self.scene.stroke(&stroke, transform, color, None, line);
            }
            Primitive::Arrow { shaft, head } => {
                self.scene.stroke(&stroke, transform, color, None, shaft);
                if let Some([left, tip, right]) = head {
                    let mut path = BezPath::new();
                    path.move_to(*left);
                    path.line_to(*tip);
                    path.line_to(*right);
                    path.close_path();
                    self.scene.fill(Fill::NonZero, transform, color, None, &path);
                    self.scene.stroke(&stroke, transform, color, None, &path);
                }
            }
            Primitive::Label { anchor, text, size } => {
                return self.render_label(*anchor, text, *size, color, transform);
            }
        }
        drawable.bounds().inflate(drawable.width / 2.0, drawable.width / 2.0)
    }

    /// Lay out and draw a label, returning its measured bounds in logical space.
    fn render_label(&mut self, anchor: Point, text: &str, size: f64, color: Color, transform: Affine) -> Rect {
        if text.is_empty() {
            return Rect::from_points(anchor, anchor);
        }
        let brush = Brush::Solid(color);

        let mut builder = self.layout_cx.ranged_builder(&mut self.font_cx, text, 1.0, false);
        builder.push_default(StyleProperty::FontSize(size as f32));
        builder.push_default(StyleProperty::Brush(brush.clone()));
        builder.push_default(StyleProperty::FontStack(parley::FontStack::Source("sans-serif".into())));
        let mut layout = builder.build(text);
        layout.break_all_lines(None);
        layout.align(None, parley::Alignment::Start, parley::AlignmentOptions::default());

        // The anchor is the top-left of the layout box.
        let text_transform = transform * Affine::translate(anchor.to_vec2());
        let mut glyph_count = 0;

        for line in layout.lines() {
            for item in line.items() {
                let PositionedLayoutItem::GlyphRun(glyph_run) = item else {
                    continue;
                };
                let mut x = glyph_run.offset();
                let y = glyph_run.baseline();
                let run = glyph_run.run();
                let synthesis = run.synthesis();
                let glyph_xform = synthesis
                    .skew()
                    .map(|angle| Affine::skew(angle.to_radians().tan() as f64, 0.0));

                let glyphs: Vec<vello::Glyph> = glyph_run
                    .glyphs()
                    .map(|glyph| {
                        let gx = x + glyph.x;
                        let gy = y - glyph.y;
                        x += glyph.advance;
                        vello::Glyph { id: glyph.id, x: gx, y: gy }
                    })
                    .collect();
                glyph_count += glyphs.len();

                if !glyphs.is_empty() {
                    self.scene
                        .draw_glyphs(run.font())
                        .brush(&brush)
                        .hint(true)
                        .transform(text_transform)
                        .glyph_transform(glyph_xform)
                        .font_size(run.font_size())
                        .normalized_coords(run.normalized_coords())
                        .draw(Fill::NonZero, glyphs.into_iter());
                }
            }
        }

        let width = layout.width() as f64;
        let height = layout.height() as f64;
        if glyph_count == 0 {
            if !self.warned_missing_fonts {
                log::warn!("No system font available for labels; drawing placeholders");
                self.warned_missing_fonts = true;
            }
            let width = text.chars().count() as f64 * size * 0.6;
            let placeholder = Rect::new(anchor.x, anchor.y, anchor.x + width.max(size), anchor.y + size * 1.2);
            self.scene.fill(Fill::NonZero, transform, color.multiply_alpha(0.3), None, &placeholder);
            return placeholder;
        }
        Rect::new(anchor.x, anchor.y, anchor.x + width, anchor.y + height)
    }

    /// Dashed outline around a highlighted mark, constant width on screen.
    fn render_selection_outline(&mut self, bounds: Rect, color: Color, transform: Affine) {
        let pad = SELECTION_PADDING / self.zoom;
        let rect = bounds.inflate(pad, pad);
        let stroke_width = 1.0 / self.zoom;
        let dash_len = 4.0 / self.zoom;
        let stroke = Stroke::new(stroke_width).with_dashes(0.0, [dash_len, dash_len]);
        self.scene.stroke(&stroke, transform, color, None, &rect);
    }
}

impl Renderer for VelloRenderer {
    fn build_scene(&mut self, ctx: &RenderContext) {
        self.scene.reset();
        self.zoom = ctx.view.scale;

        let viewport = Rect::from_origin_size(Point::ORIGIN, ctx.viewport_size);
        let transform = ctx.view.affine();

        self.scene.fill(Fill::NonZero, Affine::IDENTITY, ctx.background_color, None, &viewport);

        // Marks share one isolated layer so erasers cut through marks, not the background.
        self.scene.push_layer(
            BlendMode::new(Mix::Normal, Compose::SrcOver),
            1.0,
            Affine::IDENTITY,
            &viewport,
        );
        let mut highlights = Vec::new();
        for drawable in &ctx.drawables {
            let bounds = match drawable.composite {
                Composite::Normal => self.render_drawable(drawable, transform),
                Composite::Erase => {
                    self.scene.push_layer(
                        BlendMode::new(Mix::Normal, Compose::DestOut),
                        drawable.opacity as f32,
                        Affine::IDENTITY,
                        &viewport,
                    );
                    let bounds = self.render_drawable(drawable, transform);
                    self.scene.pop_layer();
                    bounds
                }
            };
            if drawable.highlighted {
                highlights.push(bounds);
            }
        }
        self.scene.pop_layer();

        for bounds in highlights {
            self.render_selection_outline(bounds, ctx.selection_color, transform);
        }
    }
}
