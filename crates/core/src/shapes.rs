//! Shape generators and compound layouts
//!
//! Pure geometry: every function here maps a few parameters to page-space
//! vertices. Tools build provisional and committed objects from these, and
//! the rasterizer lays out notes and stamps with the same code so hit
//! testing and drawing always agree.

use std::f32::consts::PI;

use crate::geometry::{Point, Rect};
use crate::scene::{FontDescriptor, PathSegment, StampBorder};

/// Line height as a multiple of font size
pub const LINE_HEIGHT: f32 = 1.16;

pub const ROUNDED_RECT_RADIUS: f32 = 10.0;
pub const ARROW_HEAD_LENGTH: f32 = 15.0;
pub const STAR_POINTS: usize = 5;
pub const STAR_INNER_RATIO: f32 = 0.4;

pub const SPEECH_BUBBLE_MIN_WIDTH: f32 = 50.0;
pub const SPEECH_BUBBLE_MIN_HEIGHT: f32 = 40.0;

/// Approximate text block size, used for bounds and layout
///
/// Glyph metrics depend on which fonts are installed; object bounds must
/// not, so layout uses fixed average advances.
pub fn measure_text(text: &str, font: &FontDescriptor) -> (f32, f32) {
    let advance = if font.bold { 0.6 } else { 0.55 };
    let lines: Vec<&str> = text.split('\n').collect();
    let widest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    (
        widest as f32 * font.size * advance,
        lines.len().max(1) as f32 * font.size * LINE_HEIGHT,
    )
}

/// Star with `points` tips: `2 * points` vertices alternating between the
/// outer and inner radius, starting straight up
pub fn star_points(center: Point, points: usize, outer: f32, inner: f32) -> Vec<Point> {
    let step = PI / points as f32;
    (0..points * 2)
        .map(|i| {
            let radius = if i % 2 == 0 { outer } else { inner };
            let angle = i as f32 * step - PI / 2.0;
            Point::new(center.x + radius * angle.cos(), center.y + radius * angle.sin())
        })
        .collect()
}

/// Regular polygon with its first vertex straight up
pub fn regular_polygon(center: Point, sides: usize, radius: f32) -> Vec<Point> {
    let step = 2.0 * PI / sides as f32;
    (0..sides)
        .map(|i| {
            let angle = i as f32 * step - PI / 2.0;
            Point::new(center.x + radius * angle.cos(), center.y + radius * angle.sin())
        })
        .collect()
}

/// Isosceles triangle filling `rect`, apex at the top centre
pub fn triangle_points(rect: Rect) -> Vec<Point> {
    vec![
        Point::new(rect.x + rect.width / 2.0, rect.y),
        Point::new(rect.right(), rect.bottom()),
        Point::new(rect.x, rect.bottom()),
    ]
}

/// Arrowhead triangle at `end`: tip, then the two barbs
pub fn arrow_head(start: Point, end: Point, length: f32) -> [Point; 3] {
    let angle = (end.y - start.y).atan2(end.x - start.x);
    let barb = |offset: f32| {
        let a = angle + PI + offset;
        Point::new(end.x + length * a.cos(), end.y + length * a.sin())
    };
    [end, barb(-PI / 6.0), barb(PI / 6.0)]
}

/// Speech bubble outline: rounded rectangle with a tail on the bottom edge
///
/// The box is grown to the minimum bubble size before the outline is built.
pub fn speech_bubble(rect: Rect) -> Vec<PathSegment> {
    let (x, y) = (rect.x, rect.y);
    let w = rect.width.max(SPEECH_BUBBLE_MIN_WIDTH);
    let h = rect.height.max(SPEECH_BUBBLE_MIN_HEIGHT);
    let tail = h * 0.3;
    let r = 10.0f32.min(w * 0.1).min(h * 0.1);

    use PathSegment::*;
    vec![
        MoveTo(Point::new(x + r, y)),
        LineTo(Point::new(x + w - r, y)),
        QuadTo {
            ctrl: Point::new(x + w, y),
            to: Point::new(x + w, y + r),
        },
        LineTo(Point::new(x + w, y + h - r)),
        QuadTo {
            ctrl: Point::new(x + w, y + h),
            to: Point::new(x + w - r, y + h),
        },
        LineTo(Point::new(x + w * 0.4, y + h)),
        LineTo(Point::new(x + w * 0.3, y + h + tail)),
        LineTo(Point::new(x + w * 0.25, y + h)),
        LineTo(Point::new(x + r, y + h)),
        QuadTo {
            ctrl: Point::new(x, y + h),
            to: Point::new(x, y + h - r),
        },
        LineTo(Point::new(x, y + r)),
        QuadTo {
            ctrl: Point::new(x, y),
            to: Point::new(x + r, y),
        },
        Close,
    ]
}

/// Smooth a captured pointer trail into a path: quadratic segments through
/// the midpoints of consecutive samples
pub fn smooth_stroke(points: &[Point]) -> Vec<PathSegment> {
    let Some((first, rest)) = points.split_first() else {
        return Vec::new();
    };
    let mut segments = vec![PathSegment::MoveTo(*first)];
    if rest.is_empty() {
        return segments;
    }
    for pair in points.windows(2).skip(1) {
        segments.push(PathSegment::QuadTo {
            ctrl: pair[0],
            to: pair[0].midpoint(&pair[1]),
        });
    }
    if let Some(last) = points.last() {
        segments.push(PathSegment::LineTo(*last));
    }
    segments
}

pub const NOTE_WIDTH: f32 = 160.0;
pub const NOTE_HEADER_HEIGHT: f32 = 24.0;
pub const NOTE_PADDING: f32 = 10.0;
pub const NOTE_MAX_TEXT_HEIGHT: f32 = 100.0;
pub const NOTE_FONT_SIZE: f32 = 12.0;
pub const NOTE_LINE_HEIGHT: f32 = 1.3;
pub const NOTE_TAIL_WIDTH: f32 = 16.0;
pub const NOTE_TAIL_HEIGHT: f32 = 12.0;
/// Gap between the tail and the anchor point
pub const NOTE_ANCHOR_GAP: f32 = 15.0;
pub const NOTE_COLLAPSED_RADIUS: f32 = 18.0;
/// Where an expanded note is re-anchored, relative to its collapsed origin
pub const NOTE_EXPAND_OFFSET: Point = Point::new(80.0, 100.0);

/// Resolved layout of a sticky note
#[derive(Debug, Clone, PartialEq)]
pub struct NoteLayout {
    pub card: Rect,
    pub header: Rect,
    /// Top-left of the first text line
    pub text_origin: Point,
    pub lines: Vec<String>,
    /// Visible text height (clipped)
    pub text_height: f32,
    /// Downward pointer below the card: left, right, tip
    pub tail: [Point; 3],
    pub disc_center: Point,
}

impl NoteLayout {
    pub fn new(origin: Point, text: &str) -> Self {
        let lines = wrap_text(text, NOTE_FONT_SIZE, NOTE_WIDTH - NOTE_PADDING * 2.0);
        let text_height = note_text_height(lines.len());
        let height = NOTE_HEADER_HEIGHT + text_height + NOTE_PADDING * 2.0;

        let card = Rect::new(origin.x, origin.y, NOTE_WIDTH, height);
        let tail_x = origin.x + NOTE_WIDTH / 2.0;
        let tail_top = card.bottom() - 1.0;

        Self {
            card,
            header: Rect::new(origin.x, origin.y, NOTE_WIDTH, NOTE_HEADER_HEIGHT),
            text_origin: Point::new(
                origin.x + NOTE_PADDING,
                origin.y + NOTE_HEADER_HEIGHT + NOTE_PADDING,
            ),
            lines,
            text_height,
            tail: [
                Point::new(tail_x - NOTE_TAIL_WIDTH / 2.0, tail_top),
                Point::new(tail_x + NOTE_TAIL_WIDTH / 2.0, tail_top),
                Point::new(tail_x, tail_top + NOTE_TAIL_HEIGHT),
            ],
            disc_center: origin.offset(NOTE_COLLAPSED_RADIUS, NOTE_COLLAPSED_RADIUS),
        }
    }

    /// Card origin for a note pointing at `anchor`: centred above it
    pub fn origin_for_anchor(anchor: Point, text: &str) -> Point {
        let lines = wrap_text(text, NOTE_FONT_SIZE, NOTE_WIDTH - NOTE_PADDING * 2.0);
        let height = NOTE_HEADER_HEIGHT + note_text_height(lines.len()) + NOTE_PADDING * 2.0;
        Point::new(
            anchor.x - NOTE_WIDTH / 2.0,
            anchor.y - height - NOTE_ANCHOR_GAP,
        )
    }

    pub fn bounds(&self, collapsed: bool) -> Rect {
        if collapsed {
            let d = NOTE_COLLAPSED_RADIUS * 2.0;
            Rect::new(self.card.x, self.card.y, d, d)
        } else {
            Rect::new(
                self.card.x,
                self.card.y,
                self.card.width,
                self.tail[2].y - self.card.y,
            )
        }
    }
}

fn note_text_height(lines: usize) -> f32 {
    (lines.max(1) as f32 * NOTE_FONT_SIZE * NOTE_LINE_HEIGHT).min(NOTE_MAX_TEXT_HEIGHT)
}

/// Greedy word wrap using the layout advance of [`measure_text`]
pub fn wrap_text(text: &str, font_size: f32, max_width: f32) -> Vec<String> {
    let max_chars = ((max_width / (font_size * 0.55)).floor() as usize).max(1);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let mut word = word.to_string();
            // hard-break words longer than a line
            while word.chars().count() > max_chars {
                if !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                }
                let split = word
                    .char_indices()
                    .nth(max_chars)
                    .map(|(i, _)| i)
                    .unwrap_or(word.len());
                let rest = word.split_off(split);
                lines.push(word);
                word = rest;
            }
            let needed = if line.is_empty() {
                word.chars().count()
            } else {
                line.chars().count() + 1 + word.chars().count()
            };
            if needed > max_chars && !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&word);
        }
        lines.push(line);
    }
    lines
}

pub const STAMP_FONT_SIZE: f32 = 18.0;
pub const STAMP_PADDING: f32 = 15.0;
pub const STAMP_BORDER_WIDTH: f32 = 3.0;

/// Resolved layout of a stamp: border plus centred text
#[derive(Debug, Clone, PartialEq)]
pub struct StampLayout {
    pub center: Point,
    pub border: StampBorder,
    pub text_width: f32,
    pub text_height: f32,
    /// Rectangle border (also used for the rounded variant)
    pub frame: Rect,
    /// Oval radii
    pub rx: f32,
    pub ry: f32,
}

impl StampLayout {
    pub fn font() -> FontDescriptor {
        FontDescriptor {
            family: "Arial".to_string(),
            size: STAMP_FONT_SIZE,
            bold: true,
            italic: false,
            underline: false,
        }
    }

    pub fn new(center: Point, text: &str, border: StampBorder) -> Self {
        let (text_width, text_height) = measure_text(text, &Self::font());
        let width = text_width + STAMP_PADDING * 2.0;
        let height = text_height + STAMP_PADDING * 2.0;
        let rx = width.max(height) / 2.0 + 5.0;

        Self {
            center,
            border,
            text_width,
            text_height,
            frame: Rect::new(center.x - width / 2.0, center.y - height / 2.0, width, height),
            rx,
            ry: rx * 0.7,
        }
    }

    pub fn corner_radius(&self) -> f32 {
        match self.border {
            StampBorder::Rounded => ROUNDED_RECT_RADIUS,
            _ => 0.0,
        }
    }

    pub fn bounds(&self) -> Rect {
        match self.border {
            StampBorder::Oval => Rect::new(
                self.center.x - self.rx,
                self.center.y - self.ry,
                self.rx * 2.0,
                self.ry * 2.0,
            ),
            StampBorder::Rect | StampBorder::Rounded => self.frame,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_star_alternates_radii() {
        let center = Point::new(100.0, 100.0);
        let star = star_points(center, 5, 50.0, 20.0);

        assert_eq!(star.len(), 10);
        for (i, p) in star.iter().enumerate() {
            let expected = if i % 2 == 0 { 50.0 } else { 20.0 };
            assert!(close(p.distance_to(&center), expected), "vertex {i}");
        }
        // first tip points straight up
        assert!(close(star[0].x, 100.0));
        assert!(close(star[0].y, 50.0));
    }

    #[test]
    fn test_hexagon_vertices() {
        let hex = regular_polygon(Point::new(0.0, 0.0), 6, 10.0);
        assert_eq!(hex.len(), 6);
        assert!(close(hex[0].y, -10.0));
        assert!(hex.iter().all(|p| close(p.distance_to(&Point::default()), 10.0)));
    }

    #[test]
    fn test_triangle_apex_top_centre() {
        let tri = triangle_points(Rect::new(0.0, 0.0, 40.0, 30.0));
        assert_eq!(tri[0], Point::new(20.0, 0.0));
        assert_eq!(tri[1], Point::new(40.0, 30.0));
        assert_eq!(tri[2], Point::new(0.0, 30.0));
    }

    #[test]
    fn test_arrow_head_points_back_along_shaft() {
        let head = arrow_head(Point::new(0.0, 0.0), Point::new(100.0, 0.0), 15.0);
        assert_eq!(head[0], Point::new(100.0, 0.0));
        for barb in &head[1..] {
            assert!(barb.x < 100.0);
            assert!(close(barb.distance_to(&head[0]), 15.0));
        }
        assert!(close(head[1].y, -head[2].y));
    }

    #[test]
    fn test_speech_bubble_minimum_size_and_tail() {
        let path = speech_bubble(Rect::new(0.0, 0.0, 10.0, 10.0));
        let tip = path
            .iter()
            .filter_map(|s| match s {
                PathSegment::LineTo(p) => Some(*p),
                _ => None,
            })
            .fold(Point::new(0.0, f32::MIN), |a, b| if b.y > a.y { b } else { a });

        // grown to 50x40, tail tip at (0.3w, 1.3h)
        assert!(close(tip.x, 15.0));
        assert!(close(tip.y, 52.0));
        assert_eq!(path.first(), Some(&PathSegment::MoveTo(Point::new(5.0, 0.0))));
        assert_eq!(path.last(), Some(&PathSegment::Close));
    }

    #[test]
    fn test_smooth_stroke() {
        assert!(smooth_stroke(&[]).is_empty());
        let points = [Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(20.0, 10.0)];
        let path = smooth_stroke(&points);
        assert_eq!(path.len(), 3);
        assert_eq!(path[0], PathSegment::MoveTo(points[0]));
        assert_eq!(
            path[1],
            PathSegment::QuadTo {
                ctrl: points[1],
                to: Point::new(15.0, 5.0)
            }
        );
        assert_eq!(path[2], PathSegment::LineTo(points[2]));
    }

    #[test]
    fn test_wrap_text() {
        // 140pt at 12pt text fits 21 characters
        let lines = wrap_text("the quick brown fox jumps over the lazy dog", 12.0, 140.0);
        assert_eq!(lines, vec!["the quick brown fox", "jumps over the lazy", "dog"]);
        assert_eq!(wrap_text("a\n\nb", 12.0, 140.0), vec!["a", "", "b"]);
        assert_eq!(wrap_text(&"x".repeat(30), 12.0, 140.0).len(), 2);
    }

    #[test]
    fn test_note_layout_anchored_above_point() {
        let anchor = Point::new(200.0, 300.0);
        let origin = NoteLayout::origin_for_anchor(anchor, "hi");
        let layout = NoteLayout::new(origin, "hi");

        assert_eq!(layout.card.width, NOTE_WIDTH);
        assert!(close(layout.card.center().x, 200.0));
        assert!(close(layout.card.bottom(), 300.0 - NOTE_ANCHOR_GAP));
        assert!(layout.tail[2].y < anchor.y);
        assert_eq!(layout.header.height, NOTE_HEADER_HEIGHT);
    }

    #[test]
    fn test_note_text_height_capped() {
        let long = "line\n".repeat(40);
        let layout = NoteLayout::new(Point::default(), &long);
        assert_eq!(layout.text_height, NOTE_MAX_TEXT_HEIGHT);
        assert_eq!(
            layout.card.height,
            NOTE_HEADER_HEIGHT + NOTE_MAX_TEXT_HEIGHT + NOTE_PADDING * 2.0
        );
    }

    #[test]
    fn test_stamp_layout() {
        let center = Point::new(100.0, 100.0);
        let rect = StampLayout::new(center, "DRAFT", StampBorder::Rect);
        let (tw, th) = measure_text("DRAFT", &StampLayout::font());

        assert!(close(rect.frame.width, tw + 30.0));
        assert!(close(rect.frame.height, th + 30.0));
        assert!(close(rect.bounds().center().x, center.x));
        assert!(close(rect.bounds().center().y, center.y));

        let oval = StampLayout::new(center, "DRAFT", StampBorder::Oval);
        assert!(close(oval.rx, (tw + 30.0).max(th + 30.0) / 2.0 + 5.0));
        assert!(close(oval.ry, oval.rx * 0.7));
        assert_eq!(StampLayout::new(center, "x", StampBorder::Rounded).corner_radius(), 10.0);
    }
}
