use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageFormat, Luma};
use serde::{Deserialize, Serialize};

pub const MIN_BRUSH_WIDTH: f32 = 1.0;
pub const MAX_BRUSH_WIDTH: f32 = 200.0;
pub const MAX_MASK_EDGE: u32 = 8192;

const PAINT: Luma<u8> = Luma([255]);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerKind {
    Down,
    Move,
    Up,
    Leave,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum StrokeState {
    Idle,
    Drawing { last: Point },
}

/// Freehand mask drawn over the displayed image, in rendered pixel space.
///
/// White pixels mark the region the provider may regenerate.
#[derive(Debug, Clone)]
pub struct MaskSurface {
    raster: GrayImage,
    brush_width: f32,
    state: StrokeState,
    stroke_count: usize,
    painted: bool,
}

impl MaskSurface {
    pub fn new(brush_width: f32) -> Self {
        Self {
            raster: GrayImage::new(0, 0),
            brush_width: brush_width.clamp(MIN_BRUSH_WIDTH, MAX_BRUSH_WIDTH),
            state: StrokeState::Idle,
            stroke_count: 0,
            painted: false,
        }
    }

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    pub fn brush_width(&self) -> f32 {
        self.brush_width
    }

    pub fn set_brush_width(&mut self, width: f32) {
        if width.is_finite() {
            self.brush_width = width.clamp(MIN_BRUSH_WIDTH, MAX_BRUSH_WIDTH);
        }
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.state, StrokeState::Drawing { .. })
    }

    pub fn stroke_count(&self) -> usize {
        self.stroke_count
    }

    pub fn is_empty(&self) -> bool {
        !self.painted
    }

    /// Re-initialises the raster when the rendered image size changes.
    /// Returns true when the raster was replaced.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        let width = width.clamp(1, MAX_MASK_EDGE);
        let height = height.clamp(1, MAX_MASK_EDGE);
        if self.raster.dimensions() == (width, height) {
            return false;
        }
        self.raster = GrayImage::new(width, height);
        self.state = StrokeState::Idle;
        self.stroke_count = 0;
        self.painted = false;
        true
    }

    pub fn clear(&mut self) {
        let (width, height) = self.raster.dimensions();
        self.raster = GrayImage::new(width, height);
        self.state = StrokeState::Idle;
        self.stroke_count = 0;
        self.painted = false;
    }

    pub fn pointer(&mut self, kind: PointerKind, at: Point) {
        match kind {
            PointerKind::Down => self.pointer_down(at),
            PointerKind::Move => self.pointer_move(at),
            PointerKind::Up | PointerKind::Leave => self.pointer_up(),
        }
    }

    pub fn pointer_down(&mut self, at: Point) {
        if !at.x.is_finite() || !at.y.is_finite() {
            return;
        }
        self.state = StrokeState::Drawing { last: at };
        self.stroke_count += 1;
    }

    pub fn pointer_move(&mut self, at: Point) {
        let StrokeState::Drawing { last } = self.state else {
            return;
        };
        if !at.x.is_finite() || !at.y.is_finite() {
            return;
        }
        self.paint_segment(last, at);
        self.state = StrokeState::Drawing { last: at };
    }

    pub fn pointer_up(&mut self) {
        self.state = StrokeState::Idle;
    }

    /// Replays a whole stroke in the order it was drawn: down at the first
    /// point, a move to each following point, then up.
    pub fn draw_stroke(&mut self, points: &[Point]) {
        let Some((first, rest)) = points.split_first() else {
            return;
        };
        self.pointer_down(*first);
        for point in rest {
            self.pointer_move(*point);
        }
        self.pointer_up();
    }

    /// Round-capped segment of `brush_width` between two points.
    fn paint_segment(&mut self, from: Point, to: Point) {
        let (width, height) = self.raster.dimensions();
        if width == 0 || height == 0 {
            return;
        }
        let radius = self.brush_width / 2.0;
        let min_x = (from.x.min(to.x) - radius).floor().max(0.0) as u32;
        let min_y = (from.y.min(to.y) - radius).floor().max(0.0) as u32;
        let max_x = ((from.x.max(to.x) + radius).ceil().max(0.0) as u32).min(width - 1);
        let max_y = ((from.y.max(to.y) + radius).ceil().max(0.0) as u32).min(height - 1);
        if min_x > max_x || min_y > max_y {
            return;
        }

        let radius_sq = radius * radius;
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let center = Point::new(x as f32 + 0.5, y as f32 + 0.5);
                if distance_sq_to_segment(center, from, to) <= radius_sq {
                    self.raster.put_pixel(x, y, PAINT);
                    self.painted = true;
                }
            }
        }
    }

    pub fn raster(&self) -> &GrayImage {
        &self.raster
    }

    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        encode_png(&self.raster)
    }

    /// Encodes the mask at another pixel size (nearest neighbour keeps it binary).
    pub fn to_png_scaled(&self, width: u32, height: u32) -> Result<Vec<u8>, image::ImageError> {
        if self.raster.dimensions() == (width, height) || width == 0 || height == 0 {
            return self.to_png();
        }
        let scaled = imageops::resize(&self.raster, width, height, FilterType::Nearest);
        encode_png(&scaled)
    }
}

fn encode_png(raster: &GrayImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buffer = Cursor::new(Vec::new());
    raster.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

fn distance_sq_to_segment(p: Point, a: Point, b: Point) -> f32 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq <= f32::EPSILON {
        0.0
    } else {
        (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.x + t * dx, a.y + t * dy);
    (p.x - cx) * (p.x - cx) + (p.y - cy) * (p.y - cy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface() -> MaskSurface {
        let mut mask = MaskSurface::new(4.0);
        mask.resize(64, 48);
        mask
    }

    fn painted(mask: &MaskSurface, x: u32, y: u32) -> bool {
        mask.raster().get_pixel(x, y).0[0] == 255
    }

    fn painted_count(mask: &MaskSurface) -> usize {
        mask.raster().pixels().filter(|p| p.0[0] == 255).count()
    }

    #[test]
    fn whole_stroke_matches_the_same_pointer_sequence() {
        let points = [
            Point::new(4.0, 4.0),
            Point::new(30.0, 10.0),
            Point::new(50.0, 40.0),
        ];
        let mut by_events = surface();
        by_events.pointer(PointerKind::Down, points[0]);
        by_events.pointer(PointerKind::Move, points[1]);
        by_events.pointer(PointerKind::Move, points[2]);
        by_events.pointer(PointerKind::Up, points[2]);

        let mut by_stroke = surface();
        by_stroke.draw_stroke(&points);

        assert!(painted_count(&by_events) > 0);
        assert_eq!(by_stroke.raster(), by_events.raster());
        assert_eq!(by_stroke.stroke_count(), 1);
        assert!(!by_stroke.is_drawing());
    }

    #[test]
    fn stroke_survives_arriving_in_one_piece() {
        let points = [Point::new(4.0, 4.0), Point::new(30.0, 10.0), Point::new(50.0, 40.0)];
        let mut raced = surface();
        raced.pointer(PointerKind::Move, points[1]);
        raced.pointer(PointerKind::Down, points[0]);
        raced.pointer(PointerKind::Up, points[2]);
        raced.pointer(PointerKind::Move, points[2]);
        assert!(raced.is_empty());

        let mut whole = surface();
        whole.draw_stroke(&points);
        assert!(!whole.is_empty());
    }

    #[test]
    fn single_point_stroke_paints_nothing() {
        let mut mask = surface();
        mask.draw_stroke(&[Point::new(10.0, 10.0)]);
        mask.draw_stroke(&[]);
        assert!(mask.is_empty());
        assert!(!mask.is_drawing());
    }

    #[test]
    fn empty_flag_tracks_the_raster() {
        let mut mask = surface();
        mask.draw_stroke(&[Point::new(1.0, 1.0), Point::new(20.0, 20.0)]);
        assert!(!mask.is_empty());
        assert!(painted_count(&mask) > 0);

        mask.clear();
        assert!(mask.is_empty());
        assert_eq!(painted_count(&mask), 0);

        mask.draw_stroke(&[Point::new(1.0, 1.0), Point::new(20.0, 20.0)]);
        mask.resize(32, 32);
        assert!(mask.is_empty());
        assert_eq!(painted_count(&mask), 0);
    }

    #[test]
    fn pointer_down_alone_paints_nothing() {
        let mut mask = surface();
        mask.pointer_down(Point::new(10.0, 10.0));
        assert!(mask.is_drawing());
        assert!(mask.is_empty());
    }

    #[test]
    fn drawing_marks_pixels_along_segment() {
        let mut mask = surface();
        mask.pointer_down(Point::new(5.0, 20.0));
        mask.pointer_move(Point::new(40.0, 20.0));
        mask.pointer_up();
        assert!(!mask.is_drawing());
        assert!(painted(&mask, 5, 20));
        assert!(painted(&mask, 22, 20));
        assert!(painted(&mask, 39, 20));
        assert!(!painted(&mask, 22, 30));
        assert!(!painted(&mask, 50, 20));
    }

    #[test]
    fn moves_while_idle_are_ignored() {
        let mut mask = surface();
        mask.pointer_move(Point::new(10.0, 10.0));
        mask.pointer_move(Point::new(30.0, 30.0));
        assert!(mask.is_empty());
    }

    #[test]
    fn leaving_the_surface_ends_the_stroke() {
        let mut mask = surface();
        mask.pointer(PointerKind::Down, Point::new(1.0, 1.0));
        mask.pointer(PointerKind::Leave, Point::new(0.0, 0.0));
        mask.pointer(PointerKind::Move, Point::new(30.0, 30.0));
        assert!(mask.is_empty());
    }

    #[test]
    fn clear_always_yields_empty_raster() {
        let mut mask = surface();
        for row in 0..5 {
            let y = 5.0 + row as f32 * 8.0;
            mask.pointer_down(Point::new(2.0, y));
            mask.pointer_move(Point::new(60.0, y));
            mask.pointer_up();
        }
        mask.pointer_down(Point::new(2.0, 2.0));
        mask.pointer_move(Point::new(9.0, 9.0));
        assert_eq!(mask.stroke_count(), 6);
        assert!(!mask.is_empty());

        mask.clear();
        assert!(mask.is_empty());
        assert!(!mask.is_drawing());
        assert_eq!(mask.stroke_count(), 0);
        assert_eq!((mask.width(), mask.height()), (64, 48));
    }

    #[test]
    fn resize_reinitializes_only_on_change() {
        let mut mask = surface();
        mask.pointer_down(Point::new(2.0, 2.0));
        mask.pointer_move(Point::new(9.0, 9.0));
        assert!(!mask.resize(64, 48));
        assert!(!mask.is_empty());

        assert!(mask.resize(128, 96));
        assert_eq!((mask.width(), mask.height()), (128, 96));
        assert!(mask.is_empty());
        assert!(!mask.is_drawing());
    }

    #[test]
    fn strokes_outside_the_raster_are_clipped() {
        let mut mask = surface();
        mask.pointer_down(Point::new(-50.0, -50.0));
        mask.pointer_move(Point::new(-10.0, -10.0));
        assert!(mask.is_empty());
        mask.pointer_move(Point::new(200.0, 200.0));
        assert!(!mask.is_empty());
    }

    #[test]
    fn exports_png_at_requested_size() {
        let mut mask = surface();
        mask.pointer_down(Point::new(0.0, 0.0));
        mask.pointer_move(Point::new(63.0, 47.0));

        let png = mask.to_png().unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));

        let scaled = mask.to_png_scaled(128, 96).unwrap();
        let decoded = image::load_from_memory(&scaled).unwrap().to_luma8();
        assert_eq!(decoded.dimensions(), (128, 96));
        assert!(decoded.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }
}
