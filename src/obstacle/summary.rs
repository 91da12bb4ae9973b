// Aggregated result of one obstacle query.

use super::overlap::{ObstacleKind, ObstacleOverlap, Shifts};
use crate::error::{PlacementError, Result, try_push};
use crate::geometry::QueryRect;

const SHIFT_EPS: f64 = 1e-9;

/// Map-extent requirement along one of the query box's axes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct NeatlineAxis {
    /// Signed move needed to get inside: positive along the axis, negative against it.
    pub shift: f64,
    /// Furthest the box may travel along the axis before leaving the neatline.
    pub room_forward: f64,
    /// Furthest the box may travel against the axis.
    pub room_backward: f64,
    /// No move along this axis alone brings the box inside.
    pub overflow: bool,
}

impl NeatlineAxis {
    pub(crate) const UNBOUNDED: NeatlineAxis = NeatlineAxis {
        shift: 0.0,
        room_forward: f64::INFINITY,
        room_backward: f64::INFINITY,
        overflow: false,
    };

    fn merge(self, other: NeatlineAxis) -> NeatlineAxis {
        let opposed = self.shift * other.shift < 0.0;
        let shift = if other.shift.abs() > self.shift.abs() {
            other.shift
        } else {
            self.shift
        };
        NeatlineAxis {
            shift,
            room_forward: self.room_forward.min(other.room_forward),
            room_backward: self.room_backward.min(other.room_backward),
            overflow: self.overflow || other.overflow || opposed,
        }
    }

    fn reversed(self) -> NeatlineAxis {
        NeatlineAxis {
            shift: -self.shift,
            room_forward: self.room_backward,
            room_backward: self.room_forward,
            overflow: self.overflow,
        }
    }

    fn is_violated(&self) -> bool {
        self.overflow || self.shift.abs() > SHIFT_EPS
    }

    /// Overall move along the axis, or `None` when the neatline forbids it.
    fn forward(&self, obstacle_shift: f64) -> Option<f64> {
        if self.overflow || self.shift < -SHIFT_EPS {
            return None;
        }
        let need = obstacle_shift.max(self.shift);
        (need <= self.room_forward + SHIFT_EPS).then_some(need)
    }

    fn backward(&self, obstacle_shift: f64) -> Option<f64> {
        if self.overflow || self.shift > SHIFT_EPS {
            return None;
        }
        let need = obstacle_shift.max(-self.shift);
        (need <= self.room_backward + SHIFT_EPS).then_some(need)
    }
}

#[derive(Debug, Clone)]
pub struct ObstacleOverlapSummary {
    query: QueryRect,
    areas: Vec<ObstacleOverlap>,
    lines: Vec<ObstacleOverlap>,
    points: Vec<ObstacleOverlap>,
    texts: Vec<ObstacleOverlap>,
    leaders: Vec<ObstacleOverlap>,
    shifts: Shifts,
    self_up: f64,
    self_down: f64,
    neatline_x: NeatlineAxis,
    neatline_y: NeatlineAxis,
    overlapping: bool,
    complete: bool,
}

impl ObstacleOverlapSummary {
    pub fn new(query: QueryRect) -> Self {
        Self {
            query,
            areas: Vec::new(),
            lines: Vec::new(),
            points: Vec::new(),
            texts: Vec::new(),
            leaders: Vec::new(),
            shifts: Shifts::ZERO,
            self_up: 0.0,
            self_down: 0.0,
            neatline_x: NeatlineAxis::UNBOUNDED,
            neatline_y: NeatlineAxis::UNBOUNDED,
            overlapping: false,
            complete: true,
        }
    }

    pub fn query(&self) -> &QueryRect {
        &self.query
    }

    fn bucket_mut(&mut self, kind: ObstacleKind) -> &mut Vec<ObstacleOverlap> {
        match kind {
            ObstacleKind::Area => &mut self.areas,
            ObstacleKind::Line => &mut self.lines,
            ObstacleKind::Point => &mut self.points,
            ObstacleKind::Text => &mut self.texts,
            ObstacleKind::Leader => &mut self.leaders,
        }
    }

    pub fn overlaps(&self, kind: ObstacleKind) -> &[ObstacleOverlap] {
        match kind {
            ObstacleKind::Area => &self.areas,
            ObstacleKind::Line => &self.lines,
            ObstacleKind::Point => &self.points,
            ObstacleKind::Text => &self.texts,
            ObstacleKind::Leader => &self.leaders,
        }
    }

    pub fn all_overlaps(&self) -> impl Iterator<Item = &ObstacleOverlap> {
        self.areas
            .iter()
            .chain(&self.lines)
            .chain(&self.points)
            .chain(&self.texts)
            .chain(&self.leaders)
    }

    pub fn overlap_count(&self) -> usize {
        self.areas.len() + self.lines.len() + self.points.len() + self.texts.len() + self.leaders.len()
    }

    pub(crate) fn add(&mut self, overlap: ObstacleOverlap) -> Result<()> {
        let shifts = overlap.shifts();
        if overlap.is_labeled_feature() {
            self.self_up = self.self_up.max(shifts.up);
            self.self_down = self.self_down.max(shifts.down);
        }
        try_push(self.bucket_mut(overlap.kind()), overlap, "obstacle overlap")?;
        self.shifts = self.shifts.max(shifts);
        self.overlapping = true;
        Ok(())
    }

    pub(crate) fn set_neatline(&mut self, x: NeatlineAxis, y: NeatlineAxis) {
        self.neatline_x = self.neatline_x.merge(x);
        self.neatline_y = self.neatline_y.merge(y);
        if self.neatline_x.is_violated() || self.neatline_y.is_violated() {
            self.overlapping = true;
        }
    }

    pub(crate) fn mark_incomplete(&mut self) {
        self.complete = false;
    }

    pub fn is_overlapping(&self) -> bool {
        self.overlapping
    }

    /// False when the query stopped at its first obstacle.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn shifts(&self) -> Shifts {
        self.shifts
    }

    /// Up/down shifts contributed by the labeled feature alone.
    pub fn self_overlap_shifts(&self) -> (f64, f64) {
        (self.self_up, self.self_down)
    }

    /// Signed neatline shifts along the box's x and y axes.
    pub fn neatline_shifts(&self) -> (f64, f64) {
        (self.neatline_x.shift, self.neatline_y.shift)
    }

    pub fn neatline_overflow(&self) -> bool {
        self.neatline_x.overflow || self.neatline_y.overflow
    }

    /// Every collision is with the labeled feature and the neatline is met.
    pub fn only_self_overlap(&self) -> bool {
        !self.neatline_x.is_violated()
            && !self.neatline_y.is_violated()
            && self.all_overlaps().all(|o| o.is_labeled_feature())
    }

    /// Accepts collisions whose cheapest escape is within `tolerance`.
    /// An incomplete summary never fits a tolerance unless it is clean.
    pub fn fits_within(&self, tolerance: f64) -> bool {
        if !self.overlapping {
            return true;
        }
        if !self.complete || self.neatline_x.is_violated() || self.neatline_y.is_violated() {
            return false;
        }
        self.all_overlaps()
            .all(|o| o.shifts().min_escape() <= tolerance + SHIFT_EPS)
    }

    // Overall shifts combine obstacle and neatline requirements. `None` means
    // the two contradict each other and the candidate should be rejected.

    pub fn overall_shift_right(&self) -> Option<f64> {
        self.neatline_x.forward(self.shifts.right)
    }

    pub fn overall_shift_left(&self) -> Option<f64> {
        self.neatline_x.backward(self.shifts.left)
    }

    pub fn overall_shift_up(&self) -> Option<f64> {
        self.neatline_y.forward(self.shifts.up)
    }

    pub fn overall_shift_down(&self) -> Option<f64> {
        self.neatline_y.backward(self.shifts.down)
    }

    /// Merges `child` into this summary. Both must come from queries with the
    /// same rotation; shifts combine by per-direction maximum.
    pub fn absorb(&mut self, mut child: ObstacleOverlapSummary) -> Result<()> {
        if !self.query.same_rotation(&child.query) {
            return Err(PlacementError::IllegalOperation(format!(
                "cannot absorb summary at rotation {} into rotation {}",
                child.query.angle(),
                self.query.angle()
            )));
        }
        self.reserve_for(&child)?;
        for kind in ObstacleKind::ALL {
            let incoming = std::mem::take(child.bucket_mut(kind));
            self.bucket_mut(kind).extend(incoming);
        }
        self.shifts = self.shifts.max(child.shifts);
        self.self_up = self.self_up.max(child.self_up);
        self.self_down = self.self_down.max(child.self_down);
        self.neatline_x = self.neatline_x.merge(child.neatline_x);
        self.neatline_y = self.neatline_y.merge(child.neatline_y);
        self.overlapping |= child.overlapping;
        self.complete &= child.complete;
        Ok(())
    }

    /// Makes room in every bucket for the child's overlaps, so a later move
    /// cannot fail halfway.
    fn reserve_for(&mut self, child: &ObstacleOverlapSummary) -> Result<()> {
        for kind in ObstacleKind::ALL {
            let incoming = child.overlaps(kind).len();
            self.bucket_mut(kind)
                .try_reserve(incoming)
                .map_err(PlacementError::exhausted("absorbed overlaps"))?;
        }
        Ok(())
    }

    /// Mirrors the summary: left/right and up/down swap, neatline shifts negate.
    pub fn reverse_shifts(&mut self) {
        self.shifts = self.shifts.reversed();
        std::mem::swap(&mut self.self_up, &mut self.self_down);
        self.neatline_x = self.neatline_x.reversed();
        self.neatline_y = self.neatline_y.reversed();
    }
}
