//! Alignment overlay: reference line, measured line, readout panel.
//!
//! Rendering is split in two stages so callers can run the expensive part off
//! their event loop:
//! 1. [`decode`] turns an encoded [`FrameSample`] into a [`DecodedImage`].
//! 2. [`paint`] draws that image plus the overlay onto a surface, synchronously.

use std::path::Path;
use std::time::Duration;

use ab_glyph::{FontArc, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::frame::{FrameError, FrameSample};
use crate::measurement::{MeasurementRecord, Severity};

pub const NEUTRAL: Rgba<u8> = Rgba([220, 220, 220, 255]);
const PANEL_BG: Rgba<u8> = Rgba([16, 16, 16, 255]);

const PANEL_MARGIN: u32 = 8;
const PANEL_WIDTH: u32 = 240;
const LINE_HEIGHT: u32 = 22;

/// Severity color mapping shared by the measured line and the readout text.
pub fn severity_color(status: Severity) -> Rgba<u8> {
    match status {
        Severity::Ok => Rgba([50, 205, 50, 255]),
        Severity::Warning => Rgba([255, 176, 0, 255]),
        Severity::Critical => Rgba([229, 40, 40, 255]),
        Severity::Unknown => Rgba([150, 150, 150, 255]),
    }
}

pub fn reference_x(surface_width: u32) -> f64 {
    surface_width as f64 / 2.0
}

pub fn measured_x(surface_width: u32, record: &MeasurementRecord) -> f64 {
    reference_x(surface_width) + record.offset_pixels
}

pub fn readout_lines(record: &MeasurementRecord, elapsed: Option<Duration>) -> Vec<String> {
    let mut lines = vec![
        format!("Offset: {:+.1} mm", record.offset_physical),
        format!("Pixels: {:+.0} px", record.offset_pixels),
        format!("Status: {}", record.status),
    ];
    if let Some(e) = elapsed {
        lines.push(format!("Elapsed: {:.1} s", e.as_secs_f64()));
    }
    lines
}

#[derive(Clone)]
pub struct OverlayStyle {
    /// Without a font only the panel box and severity swatch are drawn.
    pub font: Option<FontArc>,
    pub text_scale: f32,
    pub reference_width: u32,
    pub measured_width: u32,
    /// (dash, gap) in pixels for the reference line.
    pub dash: (u32, u32),
}

impl OverlayStyle {
    pub fn with_font_file(mut self, path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        self.font = Some(font);
        Ok(self)
    }
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            font: None,
            text_scale: 18.0,
            reference_width: 1,
            measured_width: 3,
            dash: (10, 6),
        }
    }
}

impl std::fmt::Debug for OverlayStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayStyle")
            .field("font", &self.font.is_some())
            .field("text_scale", &self.text_scale)
            .field("reference_width", &self.reference_width)
            .field("measured_width", &self.measured_width)
            .field("dash", &self.dash)
            .finish()
    }
}

/// A frame ready to be painted, at its intrinsic resolution.
#[derive(Debug, Clone)]
pub struct DecodedImage(pub RgbaImage);

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }
}

pub fn decode(frame: &FrameSample) -> Result<DecodedImage, FrameError> {
    let img = image::load_from_memory(frame.bytes()).map_err(FrameError::Decode)?;
    if img.width() == 0 || img.height() == 0 {
        return Err(FrameError::Empty);
    }
    Ok(DecodedImage(img.to_rgba8()))
}

/// Where things ended up on the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayGeometry {
    pub reference_x: f64,
    pub measured_x: f64,
    /// Column actually drawn; off-surface offsets stick to the nearest edge.
    pub drawn_x: u32,
    pub color: Rgba<u8>,
}

pub fn paint(
    surface: &mut RgbaImage,
    frame: &DecodedImage,
    record: &MeasurementRecord,
    style: &OverlayStyle,
    elapsed: Option<Duration>,
) -> OverlayGeometry {
    // Always adopt the frame's size; sources differ in resolution.
    surface.clone_from(&frame.0);
    let (w, h) = surface.dimensions();

    let ref_x = reference_x(w);
    let meas_x = measured_x(w, record);
    let color = severity_color(record.status);
    if w == 0 || h == 0 {
        return OverlayGeometry {
            reference_x: ref_x,
            measured_x: meas_x,
            drawn_x: 0,
            color,
        };
    }

    draw_dashed_vertical(surface, ref_x as f32, style.dash, NEUTRAL, style.reference_width);

    let drawn_x = if meas_x.is_finite() {
        meas_x.round().clamp(0.0, (w - 1) as f64) as u32
    } else {
        ref_x as u32
    };
    draw_vertical_band(surface, drawn_x, style.measured_width, color);

    draw_readout(surface, record, style, elapsed, color);

    OverlayGeometry {
        reference_x: ref_x,
        measured_x: meas_x,
        drawn_x,
        color,
    }
}

/// Decode and paint in one synchronous call.
pub fn render(
    surface: &mut RgbaImage,
    frame: &FrameSample,
    record: &MeasurementRecord,
    style: &OverlayStyle,
) -> Result<OverlayGeometry, FrameError> {
    let decoded = decode(frame)?;
    Ok(paint(surface, &decoded, record, style, None))
}

fn draw_dashed_vertical(
    surface: &mut RgbaImage,
    x: f32,
    (dash, gap): (u32, u32),
    color: Rgba<u8>,
    width: u32,
) {
    let h = surface.height();
    let dash = dash.max(1);
    let half = (width.max(1) / 2) as f32;
    let mut y = 0;
    while y < h {
        let end = (y + dash).min(h) as f32;
        for i in 0..width.max(1) {
            let xi = x - half + i as f32;
            draw_line_segment_mut(surface, (xi, y as f32), (xi, end - 1.0), color);
        }
        y += dash + gap;
    }
}

fn draw_vertical_band(surface: &mut RgbaImage, center: u32, width: u32, color: Rgba<u8>) {
    let (w, h) = surface.dimensions();
    let half = width.max(1) / 2;
    let x0 = center.saturating_sub(half);
    let x1 = (center + half).min(w - 1);
    let rect = Rect::at(x0 as i32, 0).of_size(x1 - x0 + 1, h);
    draw_filled_rect_mut(surface, rect, color);
}

fn draw_readout(
    surface: &mut RgbaImage,
    record: &MeasurementRecord,
    style: &OverlayStyle,
    elapsed: Option<Duration>,
    color: Rgba<u8>,
) {
    let (w, h) = surface.dimensions();
    if w <= PANEL_MARGIN * 2 || h <= PANEL_MARGIN * 2 {
        return;
    }

    let lines = readout_lines(record, elapsed);
    let panel_w = PANEL_WIDTH.min(w - PANEL_MARGIN * 2);
    let panel_h = (LINE_HEIGHT * lines.len() as u32 + PANEL_MARGIN).min(h - PANEL_MARGIN * 2);
    let origin = PANEL_MARGIN as i32;

    draw_filled_rect_mut(surface, Rect::at(origin, origin).of_size(panel_w, panel_h), PANEL_BG);
    // Severity swatch down the left edge of the panel.
    draw_filled_rect_mut(surface, Rect::at(origin, origin).of_size(4.min(panel_w), panel_h), color);

    let Some(font) = &style.font else {
        return;
    };
    let scale = PxScale::from(style.text_scale);
    for (i, line) in lines.iter().enumerate() {
        let y = origin + 4 + (i as u32 * LINE_HEIGHT) as i32;
        if y as u32 + LINE_HEIGHT > PANEL_MARGIN + panel_h {
            break;
        }
        draw_text_mut(surface, color, origin + 12, y, scale, font, line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameEncoding;
    use image::DynamicImage;

    fn frame(w: u32, h: u32) -> DecodedImage {
        DecodedImage(RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 255])))
    }

    fn rec(px: f64, status: Severity) -> MeasurementRecord {
        MeasurementRecord::new(px, px / 4.0, status, 0.0)
    }

    #[test]
    fn measured_line_sits_at_center_plus_offset() {
        for (w, px) in [(400u32, 12.0), (640, -35.5), (1920, 0.0)] {
            let r = rec(px, Severity::Ok);
            assert_eq!(measured_x(w, &r), w as f64 / 2.0 + px);
        }
    }

    #[test]
    fn color_depends_only_on_status() {
        let a = paint(
            &mut RgbaImage::new(1, 1),
            &frame(400, 300),
            &rec(5.0, Severity::Warning),
            &OverlayStyle::default(),
            None,
        );
        let b = paint(
            &mut RgbaImage::new(1, 1),
            &frame(800, 600),
            &rec(-90.0, Severity::Warning),
            &OverlayStyle::default(),
            None,
        );
        assert_eq!(a.color, b.color);
        assert_eq!(a.color, severity_color(Severity::Warning));
        assert_ne!(severity_color(Severity::Ok), severity_color(Severity::Critical));
        assert_ne!(severity_color(Severity::Unknown), severity_color(Severity::Ok));
    }

    #[test]
    fn paint_resizes_surface_and_draws_both_lines() {
        let mut surface = RgbaImage::new(10, 10);
        let g = paint(
            &mut surface,
            &frame(400, 300),
            &rec(12.0, Severity::Ok),
            &OverlayStyle::default(),
            None,
        );
        assert_eq!(surface.dimensions(), (400, 300));
        assert_eq!(g.reference_x, 200.0);
        assert_eq!(g.drawn_x, 212);

        let green = severity_color(Severity::Ok);
        assert_eq!(*surface.get_pixel(212, 200), green);
        assert_eq!(*surface.get_pixel(211, 200), green);
        assert_eq!(*surface.get_pixel(213, 200), green);
        assert_ne!(*surface.get_pixel(215, 200), green);

        // Reference dashes repeat every 16 px below the panel; gaps stay untouched.
        assert_eq!(*surface.get_pixel(200, 0), NEUTRAL);
        assert_eq!(*surface.get_pixel(200, 100), NEUTRAL);
        assert_eq!(*surface.get_pixel(200, 106), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn off_surface_offset_clamps_to_edge() {
        let mut surface = RgbaImage::new(1, 1);
        let g = paint(
            &mut surface,
            &frame(200, 100),
            &rec(1000.0, Severity::Critical),
            &OverlayStyle::default(),
            None,
        );
        assert_eq!(g.measured_x, 1100.0);
        assert_eq!(g.drawn_x, 199);
        assert_eq!(*surface.get_pixel(199, 90), severity_color(Severity::Critical));
    }

    #[test]
    fn readout_text_includes_status_and_optional_elapsed() {
        let r = MeasurementRecord::new(-8.0, -2.34, Severity::Critical, 0.0);
        let lines = readout_lines(&r, None);
        assert_eq!(lines[0], "Offset: -2.3 mm");
        assert_eq!(lines[1], "Pixels: -8 px");
        assert!(lines.iter().any(|l| l == "Status: CRITICAL"));
        assert_eq!(readout_lines(&r, Some(Duration::from_millis(1500))).len(), 4);
    }

    #[test]
    fn render_decodes_encoded_frames() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(64, 48, Rgba([9, 9, 9, 255])));
        let sample = FrameSample::encode(&img, 0.0, FrameEncoding::Png).unwrap();
        let mut surface = RgbaImage::new(1, 1);
        let g = render(&mut surface, &sample, &rec(0.0, Severity::Unknown), &OverlayStyle::default())
            .unwrap();
        assert_eq!(surface.dimensions(), (64, 48));
        assert_eq!(g.drawn_x, 32);
    }
}
