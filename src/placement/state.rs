// Per-request mutable placement state: ladder counters, the working copy of
// the label, candidate history and cached feature anchors.

use super::candidate::CandidatePositions;
use super::ladder::{BufferKind, LadderLimits, OverhangSequence, Relaxation, RelaxationLadder};
use crate::error::{Result, try_push};
use crate::geometry::Point;
use crate::model::{FeatureGeometry, Label, PlacementRule};
use crate::obstacle::Buffers;

/// How far a text object may shrink per font step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontReductionGuide {
    pub step_percent: f64,
    pub min_size: f64,
}

impl FontReductionGuide {
    /// Size after `step` reductions. Always computed from the original size
    /// so repeated steps do not compound rounding.
    pub fn size_at(&self, original: f64, step: u32) -> f64 {
        if original <= self.min_size {
            return original;
        }
        let factor = 1.0 - f64::from(step) * self.step_percent / 100.0;
        (original * factor).max(self.min_size)
    }
}

/// Bookkeeping for one text object of the working label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkingTextObject {
    pub original_font_size: f64,
    pub hideable: bool,
}

/// A leader line tried between a feature and a displaced label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeaderCandidate {
    pub anchor: Point,
    pub attach: Point,
}

impl LeaderCandidate {
    pub fn length(&self) -> f64 {
        self.anchor.distance(self.attach)
    }
}

/// Where along a feature a label may sit, with the text angle there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub at: Point,
    pub angle: f64,
}

/// Geometry-kind specific sub-state. Line and area anchors are expensive to
/// derive and survive ladder steps until the state is cleared.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureState {
    Point { anchor: Anchor },
    Line { anchors: Option<Vec<Anchor>> },
    Area { anchors: Option<Vec<Anchor>> },
}

impl FeatureState {
    fn for_geometry(geometry: &FeatureGeometry) -> Self {
        match geometry {
            FeatureGeometry::Point(at) => FeatureState::Point {
                anchor: Anchor { at: *at, angle: 0.0 },
            },
            FeatureGeometry::Line(_) => FeatureState::Line { anchors: None },
            FeatureGeometry::Area(_) => FeatureState::Area { anchors: None },
        }
    }

    fn clear(&mut self) {
        match self {
            FeatureState::Point { .. } => {}
            FeatureState::Line { anchors } | FeatureState::Area { anchors } => *anchors = None,
        }
    }
}

#[derive(Debug)]
pub struct PlacementState {
    ladder: RelaxationLadder,
    base_buffers: Buffers,
    buffer_step: f64,
    font_guide: FontReductionGuide,
    baseline_font_size: Option<f64>,
    working_label: Option<Label>,
    /// Parallel to `working_label.text_objects`; both exist or neither does.
    working_objects: Vec<WorkingTextObject>,
    candidates: CandidatePositions,
    leader_candidates: Vec<LeaderCandidate>,
    overhang: OverhangSequence,
    feature: FeatureState,
}

impl PlacementState {
    /// Seeds counters and buffers from `rule` for a fresh attempt at `original`.
    pub fn initialize(original: &Label, rule: &PlacementRule, geometry: &FeatureGeometry) -> Self {
        let stackable = original
            .text_objects
            .iter()
            .any(|o| o.text.split_whitespace().nth(1).is_some());
        // Hiding stops while one non-blank object is still drawn.
        let with_text = original.text_objects.iter().filter(|o| o.has_text()).count();
        let hideable = original
            .text_objects
            .iter()
            .filter(|o| o.hideable)
            .count()
            .min(with_text.saturating_sub(1));
        let limits = LadderLimits {
            buffer_steps: if rule.buffer_step > 0.0 { rule.max_buffer_steps } else { 0 },
            font_steps: if rule.font_step_percent > 0.0 { rule.max_font_steps } else { 0 },
            stack_levels: if stackable { rule.max_stack_lines.saturating_sub(1) } else { 0 },
            hide_attempts: u32::try_from(hideable).unwrap_or(u32::MAX),
        };
        Self {
            ladder: RelaxationLadder::new(limits),
            base_buffers: Buffers {
                feature: rule.feature_buffer,
                label: rule.label_buffer,
                leader: rule.leader_buffer,
            },
            buffer_step: rule.buffer_step.max(0.0),
            font_guide: FontReductionGuide {
                step_percent: rule.font_step_percent,
                min_size: rule.min_font_size,
            },
            baseline_font_size: original.text_objects.first().map(|o| o.font_size),
            working_label: None,
            working_objects: Vec::new(),
            candidates: CandidatePositions::new(),
            leader_candidates: Vec::new(),
            overhang: OverhangSequence::new(&rule.overhang_tolerances),
            feature: FeatureState::for_geometry(geometry),
        }
    }

    pub fn ladder(&self) -> &RelaxationLadder {
        &self.ladder
    }

    /// Font size of the first text object when the state was initialized.
    pub fn baseline_font_size(&self) -> Option<f64> {
        self.baseline_font_size
    }

    pub fn font_guide(&self) -> FontReductionGuide {
        self.font_guide
    }

    /// Buffers after the current buffer steps, never below zero.
    pub fn buffers(&self) -> Buffers {
        let reduce = |base: f64, kind| {
            (base - self.buffer_step * f64::from(self.ladder.buffer_step(kind))).max(0.0)
        };
        Buffers {
            feature: reduce(self.base_buffers.feature, BufferKind::Feature),
            label: reduce(self.base_buffers.label, BufferKind::Label),
            leader: reduce(self.base_buffers.leader, BufferKind::Leader),
        }
    }

    pub fn has_working_label(&self) -> bool {
        self.working_label.is_some()
    }

    /// The label as the ladder currently shapes it. Cloned from `original`
    /// on first use after initialization or release.
    pub fn working_label<'a>(&'a mut self, original: &'a Label) -> &'a Label {
        if self.working_label.is_none() {
            self.working_objects = original
                .text_objects
                .iter()
                .map(|o| WorkingTextObject {
                    original_font_size: o.font_size,
                    hideable: o.hideable,
                })
                .collect();
            self.working_label = Some(original.clone());
            self.apply_ladder();
        }
        match &self.working_label {
            Some(label) => label,
            None => original,
        }
    }

    pub fn working_objects(&self) -> &[WorkingTextObject] {
        &self.working_objects
    }

    /// Drops the working label together with its per-object bookkeeping.
    pub fn release_working_text_objects(&mut self) {
        self.working_label = None;
        self.working_objects.clear();
    }

    fn apply_ladder(&mut self) {
        let Some(label) = self.working_label.as_mut() else {
            return;
        };
        debug_assert_eq!(label.text_objects.len(), self.working_objects.len());
        let font_step = self.ladder.font_step();
        let stack_lines = 1 + self.ladder.stack_level();
        let mut to_hide = self.ladder.hide_cursor();
        for (object, working) in label.text_objects.iter_mut().zip(&self.working_objects) {
            object.font_size = self.font_guide.size_at(working.original_font_size, font_step);
            object.stack_lines = stack_lines;
            object.hidden = working.hideable && to_hide > 0;
            if object.hidden {
                to_hide -= 1;
            }
        }
    }

    /// Advances the first transition in `order` that still has room and
    /// reshapes the working label to match.
    pub fn relax(&mut self, order: &[Relaxation]) -> Option<Relaxation> {
        let relaxation = self.ladder.advance_next(order)?;
        self.apply_ladder();
        Some(relaxation)
    }

    pub fn hidden_objects(&self) -> u32 {
        self.ladder.hide_cursor()
    }

    pub fn candidates(&self) -> &CandidatePositions {
        &self.candidates
    }

    pub fn candidates_mut(&mut self) -> &mut CandidatePositions {
        &mut self.candidates
    }

    pub fn leader_candidates(&self) -> &[LeaderCandidate] {
        &self.leader_candidates
    }

    pub fn push_leader_candidate(&mut self, leader: LeaderCandidate) -> Result<()> {
        try_push(&mut self.leader_candidates, leader, "leader candidate")
    }

    pub fn overhang_tolerance(&self) -> f64 {
        self.overhang.current()
    }

    pub fn overhang_step(&self) -> usize {
        self.overhang.step()
    }

    pub fn advance_overhang(&mut self) -> bool {
        self.overhang.advance()
    }

    pub fn feature_state(&self) -> &FeatureState {
        &self.feature
    }

    /// Cached anchors for the feature, computing them on first request.
    pub fn feature_anchors(&mut self, compute: impl FnOnce() -> Vec<Anchor>) -> &[Anchor] {
        match &mut self.feature {
            FeatureState::Point { anchor } => std::slice::from_ref(anchor),
            FeatureState::Line { anchors } | FeatureState::Area { anchors } => {
                anchors.get_or_insert_with(compute)
            }
        }
    }

    /// Forgets candidates, leaders and cached anchors. Ladder counters and
    /// the working label are kept.
    pub fn clear_state(&mut self) {
        self.candidates.clear();
        self.leader_candidates.clear();
        self.feature.clear();
    }

    /// Forgets candidate history and rewinds the overhang sequence.
    pub fn clear_placement_history(&mut self) {
        self.candidates.clear();
        self.overhang.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LabelId, TextObject};
    use crate::placement::candidate::{CandidatePosition, Justification};

    fn label() -> Label {
        Label::new(
            LabelId(1),
            vec![
                TextObject::new("Mount Rainier", 10.0),
                TextObject::new("4392 m", 8.0).hideable(),
            ],
        )
    }

    fn rule() -> PlacementRule {
        PlacementRule {
            max_font_steps: 2,
            font_step_percent: 20.0,
            min_font_size: 7.0,
            max_stack_lines: 2,
            ..PlacementRule::default()
        }
    }

    fn state() -> PlacementState {
        PlacementState::initialize(&label(), &rule(), &FeatureGeometry::Point(Point::new(0.0, 0.0)))
    }

    #[test]
    fn guide_clamps_at_minimum() {
        let guide = FontReductionGuide {
            step_percent: 20.0,
            min_size: 7.0,
        };
        assert_eq!(guide.size_at(10.0, 0), 10.0);
        assert!((guide.size_at(10.0, 1) - 8.0).abs() < 1e-9);
        assert_eq!(guide.size_at(10.0, 2), 7.0);
        assert_eq!(guide.size_at(5.0, 3), 5.0);
    }

    #[test]
    fn working_label_is_cloned_lazily() {
        let original = label();
        let mut state = state();
        assert!(!state.has_working_label());
        assert_eq!(state.baseline_font_size(), Some(10.0));
        let working = state.working_label(&original).clone();
        assert_eq!(working, original);
        assert_eq!(state.working_objects().len(), 2);
    }

    #[test]
    fn relaxation_reshapes_working_label() {
        let original = label();
        let mut state = state();
        state.working_label(&original);
        let order = [Relaxation::Font, Relaxation::Stack, Relaxation::Hide];
        assert_eq!(state.relax(&order), Some(Relaxation::Font));
        let working = state.working_label(&original);
        assert!((working.text_objects[0].font_size - 8.0).abs() < 1e-9);
        assert_eq!(working.text_objects[1].font_size, 7.0);

        assert_eq!(state.relax(&order), Some(Relaxation::Font));
        assert_eq!(state.relax(&order), Some(Relaxation::Stack));
        assert_eq!(state.relax(&order), Some(Relaxation::Hide));
        assert_eq!(state.relax(&order), None);
        let working = state.working_label(&original);
        assert_eq!(working.text_objects[0].stack_lines, 2);
        assert!(working.text_objects[1].hidden);
        assert!(!working.text_objects[0].hidden);
        assert_eq!(original.text_objects[0].font_size, 10.0);
    }

    #[test]
    fn hiding_never_takes_the_last_visible_object() {
        let point = FeatureGeometry::Point(Point::new(0.0, 0.0));
        let lone = Label::new(LabelId(2), vec![TextObject::new("Spring", 10.0).hideable()]);
        let mut state = PlacementState::initialize(&lone, &rule(), &point);
        assert_eq!(state.ladder().limit(Relaxation::Hide), 0);
        assert_eq!(state.relax(&[Relaxation::Hide]), None);
        assert!(state.working_label(&lone).has_visible_text());

        let all_hideable = Label::new(
            LabelId(3),
            vec![
                TextObject::new("Spring", 10.0).hideable(),
                TextObject::new("", 8.0).hideable(),
                TextObject::new("1850 m", 8.0).hideable(),
            ],
        );
        let mut state = PlacementState::initialize(&all_hideable, &rule(), &point);
        assert_eq!(state.ladder().limit(Relaxation::Hide), 1);
        while state.relax(&[Relaxation::Hide]).is_some() {}
        assert_eq!(state.hidden_objects(), 1);
        assert!(state.working_label(&all_hideable).has_visible_text());
    }

    #[test]
    fn release_then_reclone_keeps_ladder_effects() {
        let original = label();
        let mut state = state();
        state.relax(&[Relaxation::Font]);
        state.release_working_text_objects();
        assert!(state.working_objects().is_empty());
        let working = state.working_label(&original);
        assert!((working.text_objects[0].font_size - 8.0).abs() < 1e-9);
    }

    #[test]
    fn buffers_shrink_per_step_and_floor_at_zero() {
        let mut state = state();
        let base = state.buffers();
        for _ in 0..10 {
            state.relax(&[Relaxation::Buffer(BufferKind::Feature)]);
        }
        let relaxed = state.buffers();
        assert_eq!(relaxed.feature, 0.0);
        assert_eq!(relaxed.label, base.label);
    }

    #[test]
    fn clear_state_keeps_counters() {
        let mut state = state();
        state.relax(&[Relaxation::Font]);
        state
            .candidates_mut()
            .push(CandidatePosition::new(LabelId(1), Point::new(0.0, 0.0), 0.0, Justification::Left))
            .expect("push");
        state
            .push_leader_candidate(LeaderCandidate {
                anchor: Point::new(0.0, 0.0),
                attach: Point::new(3.0, 4.0),
            })
            .expect("push");
        assert_eq!(state.leader_candidates()[0].length(), 5.0);
        state.clear_state();
        assert!(state.candidates().is_empty());
        assert!(state.leader_candidates().is_empty());
        assert_eq!(state.ladder().font_step(), 1);
    }

    #[test]
    fn placement_history_rewinds_overhang() {
        let mut rule = rule();
        rule.overhang_tolerances = vec![0.0, 2.0];
        let mut state =
            PlacementState::initialize(&label(), &rule, &FeatureGeometry::Point(Point::new(0.0, 0.0)));
        assert!(state.advance_overhang());
        assert_eq!(state.overhang_tolerance(), 2.0);
        state.clear_placement_history();
        assert_eq!(state.overhang_step(), 0);
    }

    #[test]
    fn line_anchors_are_cached_until_cleared() {
        let geometry = FeatureGeometry::Line(vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)]);
        let mut state = PlacementState::initialize(&label(), &rule(), &geometry);
        let mut calls = 0;
        let mut compute = || {
            calls += 1;
            vec![Anchor {
                at: Point::new(5.0, 0.0),
                angle: 0.0,
            }]
        };
        assert_eq!(state.feature_anchors(&mut compute).len(), 1);
        state.feature_anchors(&mut compute);
        state.clear_state();
        state.feature_anchors(&mut compute);
        assert_eq!(calls, 2);
    }
}
