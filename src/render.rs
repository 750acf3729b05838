// src/render.rs
// Drawing of solved trajectories with plotters: a static PNG of every bob's path (served to the web page)
// and an animated GIF of the swinging pendulum with the path of the last bob traced behind it.
// Frames passed in here must use VerticalAxis::Up, matching the chart's y axis.
// Text (caption, tick labels) is only drawn when a title is given; it needs a system font.

use crate::error::{PendulumError, Result};
use crate::mapper::PositionFrame;
use image::ImageFormat;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::Palette99;
use std::io::Cursor;
use std::path::Path;
use tracing::info;

fn render_err<E: std::fmt::Display>(err: E) -> PendulumError {
    PendulumError::Render(err.to_string())
}

/// Padding added around the fully extended pendulum.
pub const PLOT_MARGIN: f64 = 1.0;

/// Half-width of a square plot that always contains a pendulum of this reach.
pub fn plot_limit(reach: f64) -> f64 {
    reach + PLOT_MARGIN
}

type SquareChart<'a, DB> = ChartContext<'a, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

/// Square chart over `[-limit, limit]^2` with a grid.
fn square_chart<'a, DB: DrawingBackend>(
    root: &'a DrawingArea<DB, Shift>,
    title: Option<&str>,
    limit: f64,
) -> Result<SquareChart<'a, DB>> {
    let mut builder = ChartBuilder::on(root);
    builder.margin(10);
    if let Some(title) = title {
        builder
            .caption(title, ("sans-serif", 20).into_font())
            .x_label_area_size(30)
            .y_label_area_size(30);
    }
    let mut chart = builder
        .build_cartesian_2d(-limit..limit, -limit..limit)
        .map_err(render_err)?;

    let mut mesh = chart.configure_mesh();
    if title.is_none() {
        mesh.x_labels(0).y_labels(0);
    }
    mesh.draw().map_err(render_err)?;
    Ok(chart)
}

/// Renders the path of every bob into a PNG image.
pub fn trajectory_png(
    frames: &[PositionFrame],
    limit: f64,
    title: Option<&str>,
    size: (u32, u32),
) -> Result<Vec<u8>> {
    let (w, h) = size;
    let bobs = frames.first().map_or(0, PositionFrame::bob_count);

    // RGB pixel buffer (3 bytes per pixel)
    let mut pixel_buffer = vec![0u8; (w * h * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut pixel_buffer, (w, h)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let mut chart = square_chart(&root, title, limit)?;

        let colors: Vec<ShapeStyle> = vec![BLUE.mix(0.75).stroke_width(1), RED.mix(0.75).stroke_width(1)];
        for k in 0..bobs {
            let style = colors
                .get(k)
                .cloned()
                .unwrap_or_else(|| Palette99::pick(k).stroke_width(1));
            chart
                .draw_series(LineSeries::new(frames.iter().map(|f| f.bob(k)), style))
                .map_err(render_err)?;
        }
        root.present().map_err(render_err)?;
    }

    let img_buffer = image::ImageBuffer::from_raw(w, h, pixel_buffer)
        .ok_or_else(|| PendulumError::Render("pixel buffer has the wrong size".to_string()))?;
    let dynamic_image = image::DynamicImage::ImageRgb8(img_buffer);
    let mut png_buffer = Cursor::new(Vec::new());
    dynamic_image
        .write_to(&mut png_buffer, ImageFormat::Png)
        .map_err(render_err)?;
    Ok(png_buffer.into_inner())
}

/// Settings for [`export_gif`].
#[derive(Debug, Clone)]
pub struct GifOptions {
    pub fps: u32,
    /// Draw every `stride`-th sample.
    pub stride: usize,
    pub size: (u32, u32),
    pub title: Option<String>,
}

impl Default for GifOptions {
    fn default() -> Self {
        Self {
            fps: 30,
            stride: 1,
            size: (600, 600),
            title: Some("Pendulum Animation".to_string()),
        }
    }
}

/// Fails with [`PendulumError::RenderTargetUnavailable`] if `path` cannot be created.
pub fn check_target(path: &Path) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    match std::fs::metadata(parent) {
        Ok(meta) if meta.is_dir() && !meta.permissions().readonly() => Ok(()),
        Ok(_) => Err(PendulumError::RenderTargetUnavailable {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "parent is not a writable directory",
            ),
        }),
        Err(source) => Err(PendulumError::RenderTargetUnavailable {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes an animated GIF of `frames` to `path`.
pub fn export_gif(path: &Path, frames: &[PositionFrame], limit: f64, options: &GifOptions) -> Result<()> {
    check_target(path)?;
    if frames.is_empty() {
        return Err(PendulumError::Render("no frames to export".to_string()));
    }
    let stride = options.stride.max(1);
    let delay_ms = 1000 / options.fps.max(1);

    let root = BitMapBackend::gif(path, options.size, delay_ms)
        .map_err(render_err)?
        .into_drawing_area();

    let tracer = frames[0].bob_count() - 1;
    let mut written = 0;
    for i in (0..frames.len()).step_by(stride) {
        let frame = &frames[i];
        root.fill(&WHITE).map_err(render_err)?;

        let mut chart = square_chart(&root, options.title.as_deref(), limit)?;

        // Path of the outermost bob so far.
        chart
            .draw_series(LineSeries::new(
                frames[..=i].iter().map(|f| f.bob(tracer)),
                RED.stroke_width(1),
            ))
            .map_err(render_err)?;

        // Rods and bobs.
        let points = frame.polyline();
        chart
            .draw_series(LineSeries::new(points.iter().copied(), BLUE.stroke_width(2)))
            .map_err(render_err)?;
        chart
            .draw_series(points.iter().map(|&p| Circle::new(p, 5, BLUE.filled())))
            .map_err(render_err)?;

        root.present().map_err(render_err)?;
        written += 1;
    }

    info!(path = %path.display(), frames = written, fps = options.fps, "Animation exported");
    Ok(())
}
