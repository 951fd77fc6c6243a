//! Offscreen rendering and image export.

use crate::projection::project_board;
use crate::renderer::{RenderContext, RenderResult, Renderer, RendererError};
use crate::vello_impl::VelloRenderer;
use inkboard_core::{Board, Mark, ViewTransform};
use kurbo::{Size, Vec2};
use vello::util::RenderContext as DeviceContext;
use vello::{AaConfig, RenderParams};

/// Margin around the content when exporting a whole board.
pub const EXPORT_PADDING: f64 = 20.0;
/// Largest image side an export will produce, in pixels.
pub const MAX_EXPORT_DIMENSION: u32 = 8192;

/// Requested export format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Png,
    /// Vector export. Not supported; produces a PNG.
    Pdf,
}

impl ExportFormat {
    /// The format that will actually be written.
    pub fn effective(self) -> ExportFormat {
        match self {
            ExportFormat::Png => ExportFormat::Png,
            ExportFormat::Pdf => {
                log::warn!("PDF export is not supported; exporting PNG instead");
                ExportFormat::Png
            }
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Pdf => "pdf",
        }
    }
}

/// Raw RGBA pixels read back from the GPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    /// RGBA pixel data (4 bytes per pixel, no row padding).
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl RasterImage {
    pub fn to_png(&self) -> RenderResult<Vec<u8>> {
        encode_png(&self.rgba, self.width, self.height)
    }
}

/// Encode RGBA pixel data to PNG bytes.
pub fn encode_png(rgba: &[u8], width: u32, height: u32) -> RenderResult<Vec<u8>> {
    let expected = width as usize * height as usize * 4;
    if rgba.len() != expected {
        return Err(RendererError::Encode(format!(
            "expected {} bytes for {}x{}, got {}",
            expected,
            width,
            height,
            rgba.len()
        )));
    }
    let mut png_data = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut png_data, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder
            .write_header()
            .map_err(|e| RendererError::Encode(e.to_string()))?;
        writer
            .write_image_data(rgba)
            .map_err(|e| RendererError::Encode(e.to_string()))?;
    }
    Ok(png_data)
}

/// Drop the per-row alignment padding of a readback buffer.
fn strip_row_padding(data: &[u8], width: u32, height: u32, bytes_per_row: u32) -> Vec<u8> {
    let row_len = (width * 4) as usize;
    let mut rgba = Vec::with_capacity(row_len * height as usize);
    for row in 0..height as usize {
        let start = row * bytes_per_row as usize;
        rgba.extend_from_slice(&data[start..start + row_len]);
    }
    rgba
}

/// Pixel dimensions for a viewport no larger than `max_dimension` on either side.
fn pixel_size(size: Size, max_dimension: u32) -> RenderResult<(u32, u32)> {
    let width = size.width.ceil();
    let height = size.height.ceil();
    if !(width >= 1.0 && height >= 1.0) {
        return Err(RendererError::RenderFailed("cannot export an empty viewport".to_string()));
    }
    let max = f64::from(max_dimension);
    if width > max || height > max {
        return Err(RendererError::RenderFailed(format!(
            "{width}x{height} viewport exceeds the {max_dimension}px texture limit"
        )));
    }
    Ok((width as u32, height as u32))
}

/// Padded row length for texture-to-buffer copies.
fn aligned_bytes_per_row(width: u32) -> RenderResult<u32> {
    width
        .checked_mul(4)
        .and_then(|bytes| bytes.checked_next_multiple_of(vello::wgpu::COPY_BYTES_PER_ROW_ALIGNMENT))
        .ok_or_else(|| RendererError::RenderFailed(format!("row of {width} pixels is too large")))
}

/// Viewport and view that frame all drawables, or `None` for an empty board.
///
/// Content is drawn at scale 1 unless a side would exceed `max_dimension`
/// pixels, in which case the whole frame is scaled down to fit.
pub fn content_frame(ctx: &RenderContext, padding: f64, max_dimension: u32) -> Option<(Size, ViewTransform)> {
    let bounds = ctx
        .drawables
        .iter()
        .map(|d| d.bounds().inflate(d.width / 2.0, d.width / 2.0))
        .reduce(|a, b| a.union(b))?;
    let framed = bounds.inflate(padding, padding);
    let max = f64::from(max_dimension);
    let scale = (max / framed.width()).min(max / framed.height()).min(1.0);
    let size = Size::new((framed.width() * scale).min(max), (framed.height() * scale).min(max));
    let view = ViewTransform::unclamped(scale, Vec2::new(-framed.x0 * scale, -framed.y0 * scale));
    Some((size, view))
}

/// Headless GPU renderer that turns render contexts into images.
pub struct ImageExporter {
    devices: DeviceContext,
    device_id: usize,
    renderer: vello::Renderer,
    scene_builder: VelloRenderer,
}

impl std::fmt::Debug for ImageExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageExporter")
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

impl ImageExporter {
    /// Acquire a GPU device without any surface.
    pub fn new() -> RenderResult<Self> {
        let mut devices = DeviceContext::new();
        let device_id = pollster::block_on(devices.device(None))
            .ok_or_else(|| RendererError::InitFailed("no compatible GPU adapter".to_string()))?;
        let renderer = vello::Renderer::new(&devices.devices[device_id].device, vello::RendererOptions::default())
            .map_err(|e| RendererError::InitFailed(format!("{e:?}")))?;
        log::info!("Image exporter ready on device {}", device_id);
        Ok(Self {
            devices,
            device_id,
            renderer,
            scene_builder: VelloRenderer::new(),
        })
    }

    /// Largest image side this device can render.
    pub fn max_dimension(&self) -> u32 {
        let limit = self.devices.devices[self.device_id].device.limits().max_texture_dimension_2d;
        limit.min(MAX_EXPORT_DIMENSION)
    }

    /// Render a context to RGBA pixels at its viewport size.
    ///
    /// Fails with [`RendererError::RenderFailed`] when the viewport is empty or
    /// larger than [`ImageExporter::max_dimension`].
    pub fn render(&mut self, ctx: &RenderContext) -> RenderResult<RasterImage> {
        let (width, height) = pixel_size(ctx.viewport_size, self.max_dimension())?;
        let bytes_per_row = aligned_bytes_per_row(width)?;
        let readback_size = u64::from(bytes_per_row) * u64::from(height);

        let handle = &self.devices.devices[self.device_id];
        let device = &handle.device;
        let queue = &handle.queue;
        if readback_size > device.limits().max_buffer_size {
            return Err(RendererError::RenderFailed(format!(
                "{width}x{height} readback needs {readback_size} bytes, over the device buffer limit"
            )));
        }

        self.scene_builder.build_scene(ctx);
        let scene = self.scene_builder.take_scene();

        let texture = device.create_texture(&vello::wgpu::TextureDescriptor {
            label: Some("png export texture"),
            size: vello::wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: vello::wgpu::TextureDimension::D2,
            format: vello::wgpu::TextureFormat::Rgba8Unorm,
            usage: vello::wgpu::TextureUsages::STORAGE_BINDING
                | vello::wgpu::TextureUsages::COPY_SRC
                | vello::wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let texture_view = texture.create_view(&vello::wgpu::TextureViewDescriptor::default());

        let params = RenderParams {
            base_color: ctx.background_color,
            width,
            height,
            antialiasing_method: AaConfig::Area,
        };
        self.renderer
            .render_to_texture(device, queue, &scene, &texture_view, &params)
            .map_err(|e| RendererError::RenderFailed(format!("{e:?}")))?;

        let readback = device.create_buffer(&vello::wgpu::BufferDescriptor {
            label: Some("png readback buffer"),
            size: readback_size,
            usage: vello::wgpu::BufferUsages::COPY_DST | vello::wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&vello::wgpu::CommandEncoderDescriptor {
            label: Some("png copy encoder"),
        });
        encoder.copy_texture_to_buffer(
            vello::wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: vello::wgpu::Origin3d::ZERO,
                aspect: vello::wgpu::TextureAspect::All,
            },
            vello::wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: vello::wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            vello::wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(std::iter::once(encoder.finish()));

        let slice = readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(vello::wgpu::MapMode::Read, move |result| {
            tx.send(result).ok();
        });
        device
            .poll(vello::wgpu::PollType::wait())
            .map_err(|e| RendererError::Readback(format!("{e:?}")))?;
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(RendererError::Readback(e.to_string())),
            Err(_) => return Err(RendererError::Readback("map callback dropped".to_string())),
        }

        let data = slice.get_mapped_range();
        let rgba = strip_row_padding(&data, width, height, bytes_per_row);
        drop(data);
        readback.unmap();

        Ok(RasterImage { rgba, width, height })
    }

    /// Render a context and encode it in the requested format.
    pub fn export(&mut self, ctx: &RenderContext, format: ExportFormat) -> RenderResult<Vec<u8>> {
        match format.effective() {
            ExportFormat::Png | ExportFormat::Pdf => self.render(ctx)?.to_png(),
        }
    }

    /// Export every mark on the board, framed with [`EXPORT_PADDING`].
    ///
    /// Boards too large for one texture are scaled down to fit. An empty
    /// board exports a blank `EXPORT_PADDING`-sized square.
    pub fn export_board(&mut self, board: &Board, format: ExportFormat) -> RenderResult<Vec<u8>> {
        let drawables = project_board(board.marks(), Vec::<&Mark>::new(), None);
        let mut ctx = RenderContext::new(drawables, Size::new(EXPORT_PADDING, EXPORT_PADDING));
        if let Some((size, view)) = content_frame(&ctx, EXPORT_PADDING, self.max_dimension()) {
            ctx.viewport_size = size;
            ctx.view = view;
        }
        self.export(&ctx, format)
    }
}
