// One classified collision and the geometry fragments behind it.

use super::index::{EntryId, OwnerKind, OwnerRef, Shape};
use crate::error::{PlacementError, Result, try_push};
use crate::geometry::{GEOM_EPS, Point, QueryRect, Rect, clip_polygon, clip_segment, polygon_area};
use once_cell::unsync::OnceCell;
use std::f64::consts::PI;

/// Distance the query box must move along each of its own axes to clear an
/// obstacle. Left/right run along the box's x axis, up/down along its y axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Shifts {
    pub left: f64,
    pub right: f64,
    pub up: f64,
    pub down: f64,
}

impl Shifts {
    pub const ZERO: Shifts = Shifts {
        left: 0.0,
        right: 0.0,
        up: 0.0,
        down: 0.0,
    };

    /// Per-direction maximum: the box must clear both requirements at once.
    pub fn max(self, other: Shifts) -> Shifts {
        Shifts {
            left: self.left.max(other.left),
            right: self.right.max(other.right),
            up: self.up.max(other.up),
            down: self.down.max(other.down),
        }
    }

    pub fn reversed(self) -> Shifts {
        Shifts {
            left: self.right,
            right: self.left,
            up: self.down,
            down: self.up,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.left == 0.0 && self.right == 0.0 && self.up == 0.0 && self.down == 0.0
    }

    /// Cheapest single move that clears the obstacle.
    pub fn min_escape(&self) -> f64 {
        self.left.min(self.right).min(self.up).min(self.down)
    }
}

/// Colliding piece of an obstacle, in the query box's local frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Polygon(Vec<Point>),
    Segment(Point, Point),
    Point { at: Point, radius: f64 },
}

impl Fragment {
    fn bounds(&self) -> Option<Rect> {
        match self {
            Fragment::Polygon(points) => Rect::from_points(points.iter().copied()),
            Fragment::Segment(a, b) => Rect::from_points([*a, *b]),
            Fragment::Point { at, radius } => Some(Rect::new(at.x, at.y, at.x, at.y).inflate(*radius)),
        }
    }
}

/// How a linear obstacle crosses the box. Angles are measured from the box's
/// x axis in [0, pi), once counter-clockwise and once clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Crossing {
    pub ccw_angle: f64,
    pub cw_angle: f64,
    pub magnitude: f64,
}

#[derive(Debug, Clone)]
pub struct OverlapGeometry {
    fragment: Fragment,
    half_width: f64,
    half_height: f64,
    shifts: OnceCell<Shifts>,
    crossing: OnceCell<Crossing>,
}

impl OverlapGeometry {
    pub fn new(fragment: Fragment, query: &QueryRect) -> Self {
        Self {
            fragment,
            half_width: query.half_width(),
            half_height: query.half_height(),
            shifts: OnceCell::new(),
            crossing: OnceCell::new(),
        }
    }

    pub fn fragment(&self) -> &Fragment {
        &self.fragment
    }

    pub fn shifts(&self) -> Shifts {
        *self.shifts.get_or_init(|| {
            let Some(b) = self.fragment.bounds() else {
                return Shifts::ZERO;
            };
            Shifts {
                left: (self.half_width - b.min_x).max(0.0),
                right: (b.max_x + self.half_width).max(0.0),
                up: (b.max_y + self.half_height).max(0.0),
                down: (self.half_height - b.min_y).max(0.0),
            }
        })
    }

    pub fn crossing(&self) -> Crossing {
        *self.crossing.get_or_init(|| match &self.fragment {
            Fragment::Segment(a, b) => {
                let ccw = (b.y - a.y).atan2(b.x - a.x).rem_euclid(PI);
                let cw = (PI - ccw).rem_euclid(PI);
                Crossing {
                    ccw_angle: ccw,
                    cw_angle: cw,
                    magnitude: a.distance(*b),
                }
            }
            Fragment::Polygon(points) => Crossing {
                magnitude: polygon_area(points).abs(),
                ..Crossing::default()
            },
            Fragment::Point { .. } => Crossing::default(),
        })
    }

    pub fn shifts_computed(&self) -> bool {
        self.shifts.get().is_some()
    }

    pub fn crossing_computed(&self) -> bool {
        self.crossing.get().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObstacleKind {
    Area,
    Line,
    Point,
    Text,
    Leader,
}

impl ObstacleKind {
    pub const ALL: [ObstacleKind; 5] = [
        ObstacleKind::Area,
        ObstacleKind::Line,
        ObstacleKind::Point,
        ObstacleKind::Text,
        ObstacleKind::Leader,
    ];
}

impl From<OwnerKind> for ObstacleKind {
    fn from(kind: OwnerKind) -> Self {
        match kind {
            OwnerKind::AreaFeature => ObstacleKind::Area,
            OwnerKind::LineFeature => ObstacleKind::Line,
            OwnerKind::PointFeature => ObstacleKind::Point,
            OwnerKind::PlacedText | OwnerKind::PlacedSymbol => ObstacleKind::Text,
            OwnerKind::Leader => ObstacleKind::Leader,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObstacleOverlap {
    kind: ObstacleKind,
    owner: OwnerRef,
    entry: EntryId,
    labeled_feature: bool,
    geometries: Vec<OverlapGeometry>,
    shifts: OnceCell<Shifts>,
    crossing: OnceCell<Crossing>,
}

impl ObstacleOverlap {
    pub fn new(kind: ObstacleKind, owner: OwnerRef, entry: EntryId, labeled_feature: bool) -> Self {
        Self {
            kind,
            owner,
            entry,
            labeled_feature,
            geometries: Vec::new(),
            shifts: OnceCell::new(),
            crossing: OnceCell::new(),
        }
    }

    pub fn kind(&self) -> ObstacleKind {
        self.kind
    }

    pub fn owner(&self) -> OwnerRef {
        self.owner
    }

    pub fn entry(&self) -> EntryId {
        self.entry
    }

    /// True when the obstacle is the feature currently being labeled.
    pub fn is_labeled_feature(&self) -> bool {
        self.labeled_feature
    }

    pub fn geometries(&self) -> &[OverlapGeometry] {
        &self.geometries
    }

    pub fn push_geometry(&mut self, geometry: OverlapGeometry) -> Result<()> {
        try_push(&mut self.geometries, geometry, "overlap geometry")?;
        self.shifts = OnceCell::new();
        self.crossing = OnceCell::new();
        Ok(())
    }

    pub fn shifts(&self) -> Shifts {
        *self.shifts.get_or_init(|| {
            self.geometries
                .iter()
                .fold(Shifts::ZERO, |acc, g| acc.max(g.shifts()))
        })
    }

    /// Crossing of the longest fragment, with the summed magnitude.
    pub fn crossing(&self) -> Crossing {
        *self.crossing.get_or_init(|| {
            let mut best = Crossing::default();
            let mut longest = f64::NEG_INFINITY;
            let mut total = 0.0;
            for g in &self.geometries {
                let c = g.crossing();
                total += c.magnitude;
                if c.magnitude > longest {
                    longest = c.magnitude;
                    best = c;
                }
            }
            Crossing {
                magnitude: total,
                ..best
            }
        })
    }

    pub fn shifts_computed(&self) -> bool {
        self.shifts.get().is_some()
    }

    pub fn crossing_computed(&self) -> bool {
        self.crossing.get().is_some()
    }
}

/// Exact intersection of an index shape with the query box, as local-frame
/// fragments. Touching without interior overlap yields nothing.
pub(crate) fn collide(shape: &Shape, query: &QueryRect) -> Result<Vec<Fragment>> {
    let window = query.local_box();
    let mut fragments = Vec::new();
    match shape {
        Shape::Polygon(points) => {
            let local = to_local(points, query)?;
            if let Some(fragment) = polygon_fragment(&local, &window) {
                try_push(&mut fragments, fragment, "collision fragment")?;
            }
        }
        Shape::Box(rect) => {
            let local = rect.corners().map(|p| query.to_local(p));
            if let Some(fragment) = polygon_fragment(&local, &window) {
                try_push(&mut fragments, fragment, "collision fragment")?;
            }
        }
        Shape::Polyline(points) => {
            for w in points.windows(2) {
                let a = query.to_local(w[0]);
                let b = query.to_local(w[1]);
                let Some((ca, cb)) = clip_segment(a, b, &window) else {
                    continue;
                };
                let mid = Point::new((ca.x + cb.x) * 0.5, (ca.y + cb.y) * 0.5);
                let interior = mid.x.abs() < window.max_x - GEOM_EPS
                    && mid.y.abs() < window.max_y - GEOM_EPS;
                if interior {
                    try_push(&mut fragments, Fragment::Segment(ca, cb), "collision fragment")?;
                }
            }
        }
        Shape::Point { at, radius } => {
            let local = query.to_local(*at);
            let r = radius.max(0.0);
            let hit = local.x.abs() < window.max_x + r - GEOM_EPS
                && local.y.abs() < window.max_y + r - GEOM_EPS;
            if hit {
                let fragment = Fragment::Point {
                    at: local,
                    radius: r,
                };
                try_push(&mut fragments, fragment, "collision fragment")?;
            }
        }
    }
    Ok(fragments)
}

fn to_local(points: &[Point], query: &QueryRect) -> Result<Vec<Point>> {
    let mut local = Vec::new();
    local
        .try_reserve(points.len())
        .map_err(PlacementError::exhausted("local polygon"))?;
    local.extend(points.iter().map(|p| query.to_local(*p)));
    Ok(local)
}

fn polygon_fragment(local: &[Point], window: &Rect) -> Option<Fragment> {
    let clipped = clip_polygon(local, window);
    if clipped.len() < 3 || polygon_area(&clipped).abs() <= GEOM_EPS {
        return None;
    }
    Some(Fragment::Polygon(clipped))
}
