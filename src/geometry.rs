// Geometry primitives used by obstacle detection.
// All clipping happens in the local frame of an oriented query box, where the
// box spans [-half_width, half_width] x [-half_height, half_height].

use serde::{Deserialize, Serialize};

pub(crate) const GEOM_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn distance(self, other: Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Axis-aligned rectangle, used for envelopes, index cells and the neatline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Rect {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x: min_x.min(max_x),
            min_y: min_y.min(max_y),
            max_x: max_x.max(min_x),
            max_y: max_y.max(min_y),
        }
    }

    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Point>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut rect = Rect::new(first.x, first.y, first.x, first.y);
        for p in iter {
            rect.min_x = rect.min_x.min(p.x);
            rect.min_y = rect.min_y.min(p.y);
            rect.max_x = rect.max_x.max(p.x);
            rect.max_y = rect.max_y.max(p.y);
        }
        Some(rect)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min_x + self.max_x) * 0.5,
            (self.min_y + self.max_y) * 0.5,
        )
    }

    /// Inclusive intersection test; touching rectangles intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    pub fn inflate(&self, pad: f64) -> Rect {
        if pad <= 0.0 {
            return *self;
        }
        Rect {
            min_x: self.min_x - pad,
            min_y: self.min_y - pad,
            max_x: self.max_x + pad,
            max_y: self.max_y + pad,
        }
    }
}

/// Oriented rectangle: the footprint of a candidate label, possibly buffered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryRect {
    center: Point,
    half_width: f64,
    half_height: f64,
    /// Counter-clockwise rotation in radians.
    angle: f64,
}

impl QueryRect {
    pub fn new(center: Point, half_width: f64, half_height: f64, angle: f64) -> Self {
        Self {
            center,
            half_width: half_width.max(0.0),
            half_height: half_height.max(0.0),
            angle,
        }
    }

    /// Builds the box whose (unrotated) lower-left corner sits at `lower_left`,
    /// rotated about that corner by `angle`.
    pub fn from_lower_left(lower_left: Point, width: f64, height: f64, angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        let hw = width * 0.5;
        let hh = height * 0.5;
        let center = lower_left.offset(hw * cos - hh * sin, hw * sin + hh * cos);
        Self::new(center, hw, hh, angle)
    }

    pub fn center(&self) -> Point {
        self.center
    }

    pub fn half_width(&self) -> f64 {
        self.half_width
    }

    pub fn half_height(&self) -> f64 {
        self.half_height
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn axis_x(&self) -> Point {
        let (sin, cos) = self.angle.sin_cos();
        Point::new(cos, sin)
    }

    pub fn axis_y(&self) -> Point {
        let (sin, cos) = self.angle.sin_cos();
        Point::new(-sin, cos)
    }

    pub fn to_local(&self, p: Point) -> Point {
        let dx = p.x - self.center.x;
        let dy = p.y - self.center.y;
        let ax = self.axis_x();
        let ay = self.axis_y();
        Point::new(dx * ax.x + dy * ax.y, dx * ay.x + dy * ay.y)
    }

    pub fn to_world(&self, local: Point) -> Point {
        let ax = self.axis_x();
        let ay = self.axis_y();
        Point::new(
            self.center.x + local.x * ax.x + local.y * ay.x,
            self.center.y + local.x * ax.y + local.y * ay.y,
        )
    }

    /// Corners counter-clockwise starting at the local lower-left.
    pub fn corners(&self) -> [Point; 4] {
        let (hw, hh) = (self.half_width, self.half_height);
        [
            self.to_world(Point::new(-hw, -hh)),
            self.to_world(Point::new(hw, -hh)),
            self.to_world(Point::new(hw, hh)),
            self.to_world(Point::new(-hw, hh)),
        ]
    }

    pub fn lower_left(&self) -> Point {
        self.to_world(Point::new(-self.half_width, -self.half_height))
    }

    pub fn envelope(&self) -> Rect {
        // Four corners are never empty.
        Rect::from_points(self.corners()).unwrap_or(Rect::new(
            self.center.x,
            self.center.y,
            self.center.x,
            self.center.y,
        ))
    }

    /// The box in its own frame.
    pub fn local_box(&self) -> Rect {
        Rect::new(
            -self.half_width,
            -self.half_height,
            self.half_width,
            self.half_height,
        )
    }

    pub fn inflate(&self, pad: f64) -> QueryRect {
        if pad <= 0.0 {
            return *self;
        }
        QueryRect::new(
            self.center,
            self.half_width + pad,
            self.half_height + pad,
            self.angle,
        )
    }

    /// Moves the box along its own axes.
    pub fn translate_local(&self, dx: f64, dy: f64) -> QueryRect {
        QueryRect {
            center: self.to_world(Point::new(dx, dy)),
            ..*self
        }
    }

    pub fn same_rotation(&self, other: &QueryRect) -> bool {
        let diff = (self.angle - other.angle).rem_euclid(std::f64::consts::TAU);
        diff < 1e-9 || (std::f64::consts::TAU - diff) < 1e-9
    }

    /// Strict containment in the local frame; boundary points do not count.
    pub fn contains(&self, p: Point) -> bool {
        let local = self.to_local(p);
        local.x.abs() < self.half_width - GEOM_EPS && local.y.abs() < self.half_height - GEOM_EPS
    }
}

/// Sutherland-Hodgman clip of `polygon` against an axis-aligned window.
/// Works for concave subjects; the result may contain degenerate edges.
pub fn clip_polygon(polygon: &[Point], window: &Rect) -> Vec<Point> {
    let mut output: Vec<Point> = polygon.to_vec();
    let edges: [(fn(&Point, &Rect) -> bool, fn(Point, Point, &Rect) -> Point); 4] = [
        (|p, w| p.x >= w.min_x, |a, b, w| lerp_x(a, b, w.min_x)),
        (|p, w| p.x <= w.max_x, |a, b, w| lerp_x(a, b, w.max_x)),
        (|p, w| p.y >= w.min_y, |a, b, w| lerp_y(a, b, w.min_y)),
        (|p, w| p.y <= w.max_y, |a, b, w| lerp_y(a, b, w.max_y)),
    ];
    for (inside, cross) in edges {
        if output.is_empty() {
            break;
        }
        let input = std::mem::take(&mut output);
        let mut prev = input[input.len() - 1];
        for &cur in &input {
            let cur_in = inside(&cur, window);
            let prev_in = inside(&prev, window);
            if cur_in {
                if !prev_in {
                    output.push(cross(prev, cur, window));
                }
                output.push(cur);
            } else if prev_in {
                output.push(cross(prev, cur, window));
            }
            prev = cur;
        }
    }
    output
}

fn lerp_x(a: Point, b: Point, x: f64) -> Point {
    let t = if (b.x - a.x).abs() <= GEOM_EPS {
        0.0
    } else {
        (x - a.x) / (b.x - a.x)
    };
    Point::new(x, a.y + (b.y - a.y) * t)
}

fn lerp_y(a: Point, b: Point, y: f64) -> Point {
    let t = if (b.y - a.y).abs() <= GEOM_EPS {
        0.0
    } else {
        (y - a.y) / (b.y - a.y)
    };
    Point::new(a.x + (b.x - a.x) * t, y)
}

/// Liang-Barsky clip of segment `a`-`b` against an axis-aligned window.
pub fn clip_segment(a: Point, b: Point, window: &Rect) -> Option<(Point, Point)> {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;
    let checks = [
        (-dx, a.x - window.min_x),
        (dx, window.max_x - a.x),
        (-dy, a.y - window.min_y),
        (dy, window.max_y - a.y),
    ];
    for (p, q) in checks {
        if p.abs() <= GEOM_EPS {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    Some((
        Point::new(a.x + dx * t0, a.y + dy * t0),
        Point::new(a.x + dx * t1, a.y + dy * t1),
    ))
}

pub fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        sum += a.x * b.y - b.x * a.y;
    }
    sum * 0.5
}

pub fn polygon_centroid(points: &[Point]) -> Option<Point> {
    let area = polygon_area(points);
    if area.abs() <= GEOM_EPS {
        let n = points.len();
        if n == 0 {
            return None;
        }
        let sx: f64 = points.iter().map(|p| p.x).sum();
        let sy: f64 = points.iter().map(|p| p.y).sum();
        return Some(Point::new(sx / n as f64, sy / n as f64));
    }
    let mut cx = 0.0;
    let mut cy = 0.0;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        let cross = a.x * b.y - b.x * a.y;
        cx += (a.x + b.x) * cross;
        cy += (a.y + b.y) * cross;
    }
    Some(Point::new(cx / (6.0 * area), cy / (6.0 * area)))
}

/// Even-odd point-in-polygon test.
pub fn point_in_polygon(p: Point, polygon: &[Point]) -> bool {
    let mut inside = false;
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[j];
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

pub fn polyline_length(points: &[Point]) -> f64 {
    points.windows(2).map(|w| w[0].distance(w[1])).sum()
}

/// Shortest distance from `p` to any segment of the polyline.
pub fn distance_to_polyline(p: Point, points: &[Point]) -> f64 {
    match points {
        [] => f64::INFINITY,
        [only] => p.distance(*only),
        _ => points
            .windows(2)
            .map(|w| {
                let (a, b) = (w[0], w[1]);
                let (dx, dy) = (b.x - a.x, b.y - a.y);
                let len2 = dx * dx + dy * dy;
                let t = if len2 <= GEOM_EPS {
                    0.0
                } else {
                    (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0)
                };
                p.distance(Point::new(a.x + t * dx, a.y + t * dy))
            })
            .fold(f64::INFINITY, f64::min),
    }
}
