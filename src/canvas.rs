// ============================================================================
// RASTER SURFACE: fixed-size RGBA buffer the sketch is painted on
// ============================================================================

use std::io::Cursor;

use image::codecs::png::PngEncoder;
use image::{ImageEncoder, Rgba, RgbaImage};

use crate::components::colors::BACKGROUND;

/// Edge length of the sketch buffer (the buffer is square).
pub const CANVAS_SIZE: u32 = 512;

#[derive(Debug, thiserror::Error)]
pub enum CanvasError {
    #[error("snapshot is {got_w}x{got_h} but the canvas is {want_w}x{want_h}")]
    DimensionMismatch {
        want_w: u32,
        want_h: u32,
        got_w: u32,
        got_h: u32,
    },
    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// A point in buffer coordinates (not display coordinates).
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Immutable full copy of the canvas pixels at one moment.
///
/// Snapshots never share storage with the live buffer, so later strokes
/// cannot leak into history.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pixels: RgbaImage,
}

impl Snapshot {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        self.pixels.get_pixel_checked(x, y).copied()
    }

    pub fn memory_size(&self) -> usize {
        self.pixels.as_raw().len()
    }
}

/// The operations the sketch tools need from a pixel buffer.
pub trait RasterSurface {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Read one pixel; `None` outside the buffer.
    fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>>;

    /// Round-capped line of `width` pixels from `from` to `to`.
    fn draw_segment(&mut self, from: Point, to: Point, color: Rgba<u8>, width: f32);

    /// 4-connected exact-match fill. Returns the number of pixels changed.
    fn flood_fill(&mut self, seed_x: i64, seed_y: i64, color: Rgba<u8>) -> usize;

    fn snapshot(&self) -> Snapshot;
    fn restore(&mut self, snapshot: &Snapshot) -> Result<(), CanvasError>;

    /// Encode the buffer as a PNG byte stream.
    fn serialize(&self) -> Result<Vec<u8>, CanvasError>;
}

/// In-memory sketch buffer backed by an `RgbaImage`.
#[derive(Clone, Debug)]
pub struct CanvasState {
    pixels: RgbaImage,
}

impl Default for CanvasState {
    fn default() -> Self {
        Self::new(CANVAS_SIZE, CANVAS_SIZE)
    }
}

impl CanvasState {
    /// Allocate a `width` x `height` buffer filled with the background color.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::from_pixel(width, height, BACKGROUND),
        }
    }

    /// Refill the whole buffer with the background color.
    pub fn clear(&mut self) {
        for px in self.pixels.pixels_mut() {
            *px = BACKGROUND;
        }
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.pixels
    }

    /// PNG wrapped in a `data:` URI, the form browsers and most image APIs take.
    pub fn serialize_data_uri(&self) -> Result<String, CanvasError> {
        Ok(crate::io::to_data_uri(&self.serialize()?))
    }

    /// Paint every pixel whose center is within `radius` of the segment a-b.
    fn stamp_capsule(&mut self, a: Point, b: Point, radius: f32, color: Rgba<u8>) {
        let w = self.pixels.width() as i64;
        let h = self.pixels.height() as i64;
        if w == 0 || h == 0 || !radius.is_finite() {
            return;
        }

        // Bounding box of the capsule, clamped to the buffer
        let min_x = ((a.x.min(b.x) - radius).floor() as i64).max(0);
        let min_y = ((a.y.min(b.y) - radius).floor() as i64).max(0);
        let max_x = ((a.x.max(b.x) + radius).ceil() as i64).min(w - 1);
        let max_y = ((a.y.max(b.y) + radius).ceil() as i64).min(h - 1);
        if min_x > max_x || min_y > max_y {
            return;
        }

        let dx = b.x - a.x;
        let dy = b.y - a.y;
        let len_sq = dx * dx + dy * dy;
        let r_sq = radius * radius;

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let px = x as f32;
                let py = y as f32;
                // Closest point on the segment
                let t = if len_sq > 0.0 {
                    (((px - a.x) * dx + (py - a.y) * dy) / len_sq).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let cx = a.x + dx * t;
                let cy = a.y + dy * t;
                let dist_sq = (px - cx) * (px - cx) + (py - cy) * (py - cy);
                if dist_sq <= r_sq {
                    self.pixels.put_pixel(x as u32, y as u32, color);
                }
            }
        }
    }
}

impl RasterSurface for CanvasState {
    fn width(&self) -> u32 {
        self.pixels.width()
    }

    fn height(&self) -> u32 {
        self.pixels.height()
    }

    fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        self.pixels.get_pixel_checked(x, y).copied()
    }

    fn draw_segment(&mut self, from: Point, to: Point, color: Rgba<u8>, width: f32) {
        // Anything thinner than a pixel still leaves a 1px trail
        let radius = (width / 2.0).max(0.5);
        self.stamp_capsule(from, to, radius, color);
    }

    fn flood_fill(&mut self, seed_x: i64, seed_y: i64, color: Rgba<u8>) -> usize {
        let w = self.pixels.width();
        let h = self.pixels.height();
        if seed_x < 0 || seed_y < 0 || seed_x >= w as i64 || seed_y >= h as i64 {
            return 0;
        }

        let target = *self.pixels.get_pixel(seed_x as u32, seed_y as u32);
        if target == color {
            return 0;
        }

        let wu = w as usize;
        let raw: &mut [u8] = &mut self.pixels;

        #[inline(always)]
        fn matches(raw: &[u8], idx: usize, tc: [u8; 4]) -> bool {
            let o = idx * 4;
            raw[o..o + 4] == tc
        }

        #[inline(always)]
        fn paint(raw: &mut [u8], idx: usize, fc: [u8; 4]) {
            let o = idx * 4;
            raw[o..o + 4].copy_from_slice(&fc);
        }

        let tc = target.0;
        let fc = color.0;

        // Pixels are recolored when pushed, so the recolor doubles as the
        // visited mark and the stack never holds more entries than pixels.
        let mut stack: Vec<u32> = Vec::with_capacity(4096);
        let seed_idx = seed_y as usize * wu + seed_x as usize;
        paint(raw, seed_idx, fc);
        stack.push(seed_idx as u32);
        let mut filled = 1usize;

        while let Some(idx) = stack.pop() {
            let idx = idx as usize;
            let x = (idx % wu) as u32;
            let y = (idx / wu) as u32;

            let mut visit = |n: usize, stack: &mut Vec<u32>| {
                if matches(raw, n, tc) {
                    paint(raw, n, fc);
                    stack.push(n as u32);
                    filled += 1;
                }
            };

            if x > 0 {
                visit(idx - 1, &mut stack);
            }
            if x + 1 < w {
                visit(idx + 1, &mut stack);
            }
            if y > 0 {
                visit(idx - wu, &mut stack);
            }
            if y + 1 < h {
                visit(idx + wu, &mut stack);
            }
        }

        filled
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            pixels: self.pixels.clone(),
        }
    }

    fn restore(&mut self, snapshot: &Snapshot) -> Result<(), CanvasError> {
        if snapshot.width() != self.width() || snapshot.height() != self.height() {
            return Err(CanvasError::DimensionMismatch {
                want_w: self.width(),
                want_h: self.height(),
                got_w: snapshot.width(),
                got_h: snapshot.height(),
            });
        }
        self.pixels.copy_from_slice(snapshot.pixels.as_raw());
        Ok(())
    }

    fn serialize(&self) -> Result<Vec<u8>, CanvasError> {
        let mut out = Cursor::new(Vec::new());
        PngEncoder::new(&mut out).write_image(
            self.pixels.as_raw(),
            self.pixels.width(),
            self.pixels.height(),
            image::ColorType::Rgba8,
        )?;
        Ok(out.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::colors::HexColor;
    use pretty_assertions::assert_eq;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);

    fn count(canvas: &CanvasState, color: Rgba<u8>) -> usize {
        canvas.as_image().pixels().filter(|p| **p == color).count()
    }

    #[test]
    fn new_canvas_is_all_background() {
        let canvas = CanvasState::default();
        assert_eq!(canvas.width(), CANVAS_SIZE);
        assert_eq!(canvas.height(), CANVAS_SIZE);
        assert_eq!(count(&canvas, BACKGROUND), (CANVAS_SIZE * CANVAS_SIZE) as usize);
    }

    #[test]
    fn segment_has_round_caps_of_half_width() {
        let mut canvas = CanvasState::new(64, 64);
        canvas.draw_segment(Point::new(20.0, 32.0), Point::new(40.0, 32.0), RED, 10.0);

        // Along the line and within the radius of both caps
        assert_eq!(canvas.pixel(30, 32), Some(RED));
        assert_eq!(canvas.pixel(15, 32), Some(RED));
        assert_eq!(canvas.pixel(45, 32), Some(RED));
        assert_eq!(canvas.pixel(30, 37), Some(RED));
        // Rounded corner: (15, 37) is ~7.07 from the cap center
        assert_eq!(canvas.pixel(15, 37), Some(BACKGROUND));
        assert_eq!(canvas.pixel(14, 32), Some(BACKGROUND));
        assert_eq!(canvas.pixel(30, 38), Some(BACKGROUND));
    }

    #[test]
    fn thin_segment_is_continuous() {
        let mut canvas = CanvasState::new(32, 32);
        canvas.draw_segment(Point::new(0.0, 0.0), Point::new(31.0, 31.0), RED, 1.0);
        for i in 0..32 {
            assert_eq!(canvas.pixel(i, i), Some(RED), "gap at {i}");
        }
    }

    #[test]
    fn drawing_off_the_edge_is_clipped() {
        let mut canvas = CanvasState::new(16, 16);
        canvas.draw_segment(Point::new(-40.0, 8.0), Point::new(60.0, 8.0), RED, 3.0);
        assert_eq!(canvas.pixel(0, 8), Some(RED));
        assert_eq!(canvas.pixel(15, 8), Some(RED));

        // Entirely outside: nothing happens, nothing panics
        canvas.draw_segment(Point::new(-50.0, -50.0), Point::new(-20.0, -30.0), GREEN, 4.0);
        canvas.draw_segment(Point::new(500.0, 500.0), Point::new(900.0, 40.0), GREEN, 4.0);
        assert_eq!(count(&canvas, GREEN), 0);
    }

    #[test]
    fn fill_stays_inside_closed_outline() {
        let mut canvas = CanvasState::new(64, 64);
        // Closed red square outline from (10,10) to (40,40)
        let corners = [
            Point::new(10.0, 10.0),
            Point::new(40.0, 10.0),
            Point::new(40.0, 40.0),
            Point::new(10.0, 40.0),
            Point::new(10.0, 10.0),
        ];
        for pair in corners.windows(2) {
            canvas.draw_segment(pair[0], pair[1], RED, 3.0);
        }
        let red_before = count(&canvas, RED);
        let outline = canvas.snapshot();

        let changed = canvas.flood_fill(25, 25, GREEN);
        assert!(changed > 0);
        assert_eq!(count(&canvas, GREEN), changed);
        assert_eq!(count(&canvas, RED), red_before);

        // Every interior pixel is green, everything outside is untouched
        for y in 12..=38 {
            for x in 12..=38 {
                assert_eq!(canvas.pixel(x, y), Some(GREEN), "({x},{y})");
            }
        }
        for y in 0..64 {
            for x in 0..64 {
                if outline.pixel(x, y) == Some(RED) {
                    assert_eq!(canvas.pixel(x, y), Some(RED));
                }
            }
        }
        assert_eq!(canvas.pixel(0, 0), Some(BACKGROUND));
        assert_eq!(canvas.pixel(63, 63), Some(BACKGROUND));
    }

    #[test]
    fn fill_is_idempotent() {
        let mut canvas = CanvasState::new(32, 32);
        canvas.draw_segment(Point::new(16.0, 0.0), Point::new(16.0, 31.0), RED, 2.0);
        canvas.flood_fill(2, 2, GREEN);
        let once = canvas.snapshot();
        assert_eq!(canvas.flood_fill(2, 2, GREEN), 0);
        assert_eq!(canvas.snapshot(), once);
    }

    #[test]
    fn fill_only_touches_the_seed_region() {
        // Checkerboard of 4x4 cells: 4-connectivity makes each cell its own region
        let mut canvas = CanvasState::new(16, 16);
        let dark = HexColor::parse("#333333").unwrap().to_rgba();
        for y in 0..16u32 {
            for x in 0..16u32 {
                if ((x / 4) + (y / 4)) % 2 == 1 {
                    canvas.pixels.put_pixel(x, y, dark);
                }
            }
        }
        let before = canvas.snapshot();
        assert_eq!(canvas.flood_fill(5, 1, GREEN), 16);

        for y in 0..16u32 {
            for x in 0..16u32 {
                let in_seed_cell = (4..8).contains(&x) && (0..4).contains(&y);
                let want = if in_seed_cell { GREEN } else { before.pixel(x, y).unwrap() };
                assert_eq!(canvas.pixel(x, y), Some(want), "({x},{y})");
            }
        }
    }

    #[test]
    fn fill_diagonal_neighbours_are_not_connected() {
        let mut canvas = CanvasState::new(3, 3);
        // Red everywhere except the two diagonal corners (0,0) and (1,1)
        for y in 0..3 {
            for x in 0..3 {
                canvas.pixels.put_pixel(x, y, RED);
            }
        }
        canvas.pixels.put_pixel(0, 0, BACKGROUND);
        canvas.pixels.put_pixel(1, 1, BACKGROUND);

        assert_eq!(canvas.flood_fill(0, 0, GREEN), 1);
        assert_eq!(canvas.pixel(1, 1), Some(BACKGROUND));
    }

    #[test]
    fn fill_whole_canvas_does_not_overflow() {
        let mut canvas = CanvasState::default();
        let changed = canvas.flood_fill(0, 0, GREEN);
        assert_eq!(changed, (CANVAS_SIZE * CANVAS_SIZE) as usize);
        assert_eq!(count(&canvas, GREEN), changed);
    }

    #[test]
    fn fill_outside_bounds_is_ignored() {
        let mut canvas = CanvasState::new(8, 8);
        assert_eq!(canvas.flood_fill(-1, 3, GREEN), 0);
        assert_eq!(canvas.flood_fill(3, 8, GREEN), 0);
        assert_eq!(count(&canvas, GREEN), 0);
    }

    #[test]
    fn snapshot_is_not_aliased_with_the_live_buffer() {
        let mut canvas = CanvasState::new(8, 8);
        let snap = canvas.snapshot();
        canvas.flood_fill(0, 0, RED);
        assert_eq!(snap.pixel(0, 0), Some(BACKGROUND));

        canvas.restore(&snap).unwrap();
        assert_eq!(count(&canvas, BACKGROUND), 64);
    }

    #[test]
    fn restore_rejects_other_dimensions() {
        let mut canvas = CanvasState::new(8, 8);
        let other = CanvasState::new(4, 8).snapshot();
        assert!(matches!(
            canvas.restore(&other),
            Err(CanvasError::DimensionMismatch { got_w: 4, .. })
        ));
    }

    #[test]
    fn serialize_produces_decodable_png() {
        let mut canvas = CanvasState::new(20, 10);
        canvas.draw_segment(Point::new(2.0, 2.0), Point::new(8.0, 2.0), RED, 2.0);
        let png = canvas.serialize().unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory(&png).unwrap().into_rgba8();
        assert_eq!(decoded.dimensions(), (20, 10));
        assert_eq!(*decoded.get_pixel(5, 2), RED);
        assert_eq!(*decoded.get_pixel(5, 8), BACKGROUND);

        let uri = canvas.serialize_data_uri().unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));
    }
}
