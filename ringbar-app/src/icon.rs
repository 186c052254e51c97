//! Dual-ring icon rendering.
//!
//! Renders a square tray icon with two concentric arcs using tiny-skia:
//! the outer ring shows the session (5-hour) quota, the inner ring the
//! weekly (7-day) quota. Each arc starts at the top and sweeps clockwise
//! in proportion to its percentage; the color comes from the configured
//! band lookup of that arc's own percentage. A faint full-circle track
//! sits under each arc.

use ringbar_core::{BandColor, ColorBand, band_color_for, SnapshotError, UsageSnapshot};
use tiny_skia::*;

// ============================================================================
// Constants
// ============================================================================

/// Standard tray icon size (18pt at 2x = 36px).
pub const ICON_SIZE: u32 = 36;

/// Ring geometry.
const OUTER_RADIUS: f32 = 14.5;
const INNER_RADIUS: f32 = 9.0;
const STROKE_WIDTH: f32 = 3.0;

/// Arcs start at the top of the circle.
const START_ANGLE_DEG: f32 = -90.0;

/// Angular step when flattening arcs into line segments.
const ARC_STEP_DEG: f32 = 3.0;

/// Sweep of the indeterminate loading arc.
const LOADING_SWEEP_DEG: f32 = 100.0;

// ============================================================================
// Icon Renderer
// ============================================================================

/// Renders the dual-ring tray icon.
pub struct IconRenderer {
    size: u32,
    bands: Vec<ColorBand>,
}

impl IconRenderer {
    /// Creates a renderer with the given color bands at standard size.
    pub fn new(bands: Vec<ColorBand>) -> Self {
        Self {
            size: ICON_SIZE,
            bands,
        }
    }

    /// Creates a renderer with a custom square size.
    pub fn with_size(bands: Vec<ColorBand>, size: u32) -> Self {
        Self { size, bands }
    }

    /// Renders a static frame of the current percentages.
    ///
    /// A missing snapshot or a `not_authenticated` tag renders both rings
    /// empty (tracks only).
    pub fn render_static(&self, snapshot: Option<&UsageSnapshot>) -> RenderedIcon {
        self.render_frame(snapshot, 0.0, 1.0)
    }

    /// Renders one warning frame: the same geometry as a static frame with
    /// counter-rotating start offsets and a pulse factor.
    ///
    /// The offset is added to the outer arc's start angle and subtracted
    /// from the inner's. The pulse modulates stroke width and alpha only;
    /// sweep length is always `percent/100` of the circle.
    pub fn render_warning(
        &self,
        snapshot: &UsageSnapshot,
        rotation_deg: f32,
        pulse: f32,
    ) -> RenderedIcon {
        self.render_frame(Some(snapshot), rotation_deg, pulse)
    }

    /// Renders one indeterminate loading frame: fixed-length arcs on both
    /// rings whose start angle is the phase.
    pub fn render_loading(&self, phase_deg: f32) -> RenderedIcon {
        let mut pixmap = self.blank_pixmap();
        let center = self.size as f32 / 2.0;

        self.draw_track(&mut pixmap, center, OUTER_RADIUS);
        self.draw_track(&mut pixmap, center, INNER_RADIUS);

        let color = loading_color();
        self.draw_arc(
            &mut pixmap,
            center,
            OUTER_RADIUS,
            START_ANGLE_DEG + phase_deg,
            LOADING_SWEEP_DEG,
            color,
            STROKE_WIDTH,
        );
        self.draw_arc(
            &mut pixmap,
            center,
            INNER_RADIUS,
            START_ANGLE_DEG + phase_deg,
            LOADING_SWEEP_DEG,
            color,
            STROKE_WIDTH,
        );

        self.finish(pixmap)
    }

    fn render_frame(
        &self,
        snapshot: Option<&UsageSnapshot>,
        rotation_deg: f32,
        pulse: f32,
    ) -> RenderedIcon {
        let mut pixmap = self.blank_pixmap();
        let center = self.size as f32 / 2.0;

        self.draw_track(&mut pixmap, center, OUTER_RADIUS);
        self.draw_track(&mut pixmap, center, INNER_RADIUS);

        let (session, weekly) = match snapshot {
            Some(s) if s.error != SnapshotError::NotAuthenticated => {
                (s.session_percent, s.weekly_percent)
            }
            _ => (0.0, 0.0),
        };

        let width = STROKE_WIDTH * (0.85 + 0.15 * pulse);
        let alpha = 0.75 + 0.25 * pulse;

        // Outer ring: session. Counter-rotation adds the offset here.
        self.draw_ring(
            &mut pixmap,
            center,
            OUTER_RADIUS,
            session,
            rotation_deg,
            width,
            alpha,
        );
        // Inner ring: weekly. The offset is subtracted.
        self.draw_ring(
            &mut pixmap,
            center,
            INNER_RADIUS,
            weekly,
            -rotation_deg,
            width,
            alpha,
        );

        self.finish(pixmap)
    }

    // ========================================================================
    // Drawing Helpers
    // ========================================================================

    fn blank_pixmap(&self) -> Pixmap {
        let mut pixmap =
            Pixmap::new(self.size, self.size).unwrap_or_else(|| Pixmap::new(1, 1).unwrap());
        pixmap.fill(Color::TRANSPARENT);
        pixmap
    }

    fn draw_ring(
        &self,
        pixmap: &mut Pixmap,
        center: f32,
        radius: f32,
        percent: f64,
        offset_deg: f32,
        width: f32,
        alpha: f32,
    ) {
        let sweep = (percent / 100.0 * 360.0) as f32;
        if sweep <= 0.0 {
            return;
        }

        let color = with_alpha(band_to_color(band_color_for(&self.bands, percent)), alpha);
        self.draw_arc(
            pixmap,
            center,
            radius,
            START_ANGLE_DEG + offset_deg,
            sweep,
            color,
            width,
        );
    }

    fn draw_track(&self, pixmap: &mut Pixmap, center: f32, radius: f32) {
        self.draw_arc(pixmap, center, radius, 0.0, 360.0, track_color(), STROKE_WIDTH);
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_arc(
        &self,
        pixmap: &mut Pixmap,
        center: f32,
        radius: f32,
        start_deg: f32,
        sweep_deg: f32,
        color: Color,
        width: f32,
    ) {
        let Some(path) = arc_path(center, center, radius, start_deg, sweep_deg) else {
            return;
        };

        let mut paint = Paint::default();
        paint.set_color(color);
        paint.anti_alias = true;

        let stroke = Stroke {
            width,
            line_cap: LineCap::Round,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    }

    fn finish(&self, pixmap: Pixmap) -> RenderedIcon {
        RenderedIcon {
            data: pixmap.data().to_vec(),
            width: self.size,
            height: self.size,
        }
    }
}

/// Flattens a clockwise arc into a polyline path.
fn arc_path(cx: f32, cy: f32, radius: f32, start_deg: f32, sweep_deg: f32) -> Option<Path> {
    let sweep = sweep_deg.clamp(0.0, 360.0);
    if sweep <= 0.0 {
        return None;
    }

    let steps = (sweep / ARC_STEP_DEG).ceil().max(1.0) as u32;
    let mut pb = PathBuilder::new();

    for i in 0..=steps {
        let angle = (start_deg + sweep * i as f32 / steps as f32).to_radians();
        let x = cx + radius * angle.cos();
        let y = cy + radius * angle.sin();
        if i == 0 {
            pb.move_to(x, y);
        } else {
            pb.line_to(x, y);
        }
    }

    pb.finish()
}

// ============================================================================
// Colors
// ============================================================================

fn band_to_color(band: BandColor) -> Color {
    match band {
        BandColor::Green => Color::from_rgba8(52, 199, 89, 255),
        BandColor::Yellow => Color::from_rgba8(255, 204, 0, 255),
        BandColor::Orange => Color::from_rgba8(255, 149, 0, 255),
        BandColor::Red => Color::from_rgba8(255, 59, 48, 255),
    }
}

fn track_color() -> Color {
    Color::from_rgba8(128, 128, 128, 64)
}

fn loading_color() -> Color {
    Color::from_rgba8(150, 150, 150, 220)
}

fn with_alpha(color: Color, alpha: f32) -> Color {
    Color::from_rgba(
        color.red(),
        color.green(),
        color.blue(),
        (color.alpha() * alpha).clamp(0.0, 1.0),
    )
    .unwrap_or(color)
}

// ============================================================================
// Rendered Icon
// ============================================================================

/// A rendered icon as RGBA pixel data.
pub struct RenderedIcon {
    /// Premultiplied RGBA bytes, row-major.
    pub data: Vec<u8>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl RenderedIcon {
    /// Converts to PNG bytes for platform tray consumption.
    pub fn to_png(&self) -> Vec<u8> {
        use image::{ImageBuffer, Rgba};

        let img: ImageBuffer<Rgba<u8>, _> =
            ImageBuffer::from_raw(self.width, self.height, self.data.clone())
                .expect("Failed to create image buffer");

        let mut png_data = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut png_data);
        img.write_to(&mut cursor, image::ImageFormat::Png)
            .expect("Failed to encode PNG");

        png_data
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ringbar_core::default_color_bands;

    fn renderer() -> IconRenderer {
        IconRenderer::new(default_color_bands())
    }

    fn snapshot(session: f64, weekly: f64) -> UsageSnapshot {
        let mut s = UsageSnapshot::new();
        s.session_percent = session;
        s.weekly_percent = weekly;
        s
    }

    fn painted_pixels(icon: &RenderedIcon) -> usize {
        icon.data.chunks(4).filter(|px| px[3] > 0).count()
    }

    // The faint tracks tint both full circles, so pixel counts saturate;
    // total alpha still grows with the sweep.
    fn alpha_sum(icon: &RenderedIcon) -> u64 {
        icon.data.chunks(4).map(|px| u64::from(px[3])).sum()
    }

    #[test]
    fn test_render_empty() {
        let icon = renderer().render_static(None);
        assert_eq!(icon.width, ICON_SIZE);
        assert_eq!(icon.height, ICON_SIZE);
        // Tracks are still visible.
        assert!(painted_pixels(&icon) > 0);
    }

    #[test]
    fn test_more_usage_paints_more_ink() {
        let small = renderer().render_static(Some(&snapshot(10.0, 10.0)));
        let large = renderer().render_static(Some(&snapshot(90.0, 90.0)));
        assert!(alpha_sum(&large) > alpha_sum(&small));
    }

    #[test]
    fn test_not_authenticated_renders_like_empty() {
        let mut errored = snapshot(80.0, 60.0);
        errored.error = SnapshotError::NotAuthenticated;

        let rendered = renderer().render_static(Some(&errored));
        let empty = renderer().render_static(None);
        assert_eq!(painted_pixels(&rendered), painted_pixels(&empty));
    }

    #[test]
    fn test_warning_rotation_moves_arc() {
        let snap = snapshot(95.0, 40.0);
        let a = renderer().render_warning(&snap, 0.0, 1.0);
        let b = renderer().render_warning(&snap, 90.0, 1.0);
        // Same geometry length, different placement.
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn test_loading_phase_moves_arc() {
        let a = renderer().render_loading(0.0);
        let b = renderer().render_loading(180.0);
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn test_to_png_magic_bytes() {
        let png = renderer().render_static(None).to_png();
        assert!(png.starts_with(&[0x89, 0x50, 0x4E, 0x47]));
    }

    #[test]
    fn test_arc_path_zero_sweep_is_none() {
        assert!(arc_path(18.0, 18.0, 14.0, -90.0, 0.0).is_none());
    }
}
