// One label waiting for (or holding) a position, and its lifecycle.

use super::candidate::CandidatePosition;
use super::state::{LeaderCandidate, PlacementState};
use crate::config::StabilityPolicy;
use crate::error::{PlacementError, Result, ValidationFailure};
use crate::geometry::QueryRect;
use crate::metrics::TextMetrics;
use crate::model::{Feature, Label, LabelClass, LabelId, PlacementRule, TextObject};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlacementStatus {
    #[default]
    UnPlaced,
    Suppressed,
    PlacedWithHiding,
    Placed,
    Forced,
}

impl PlacementStatus {
    /// Whether the label ends up drawn.
    pub fn is_placed(self) -> bool {
        matches!(
            self,
            PlacementStatus::Placed | PlacementStatus::PlacedWithHiding | PlacementStatus::Forced
        )
    }
}

/// Priority bonus for labels drawn last frame when class priority leads.
/// Smaller than the gap between adjacent integral class priorities.
const STABILITY_BONUS: f64 = 0.5;
/// Offset that lifts every previously drawn label above all others.
const STABILITY_LEAD: f64 = 1.0e6;

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLabel {
    pub position: CandidatePosition,
    pub footprint: QueryRect,
    /// The working label as drawn: reduced fonts, stacking, hidden parts.
    pub label: Label,
    pub leader: Option<LeaderCandidate>,
    /// Overhang tolerance that admitted the position.
    pub tolerance: f64,
}

#[derive(Debug)]
pub struct LabelRequest {
    label: Arc<Label>,
    feature: Arc<Feature>,
    class: Arc<LabelClass>,
    rule: Arc<PlacementRule>,
    state: PlacementState,
    placed: Option<PlacedLabel>,
    status: PlacementStatus,
    previous_status: PlacementStatus,
}

impl LabelRequest {
    /// Binds `label` to its feature and class. The class must carry a rule.
    pub fn new(label: Arc<Label>, feature: Arc<Feature>, class: Arc<LabelClass>) -> Result<Self> {
        let rule = Arc::clone(class.rule()?);
        let state = PlacementState::initialize(&label, &rule, &feature.geometry);
        Ok(Self {
            label,
            feature,
            class,
            rule,
            state,
            placed: None,
            status: PlacementStatus::UnPlaced,
            previous_status: PlacementStatus::UnPlaced,
        })
    }

    pub fn id(&self) -> LabelId {
        self.label.id
    }

    pub fn label(&self) -> &Label {
        &self.label
    }

    pub fn feature(&self) -> &Arc<Feature> {
        &self.feature
    }

    pub fn class(&self) -> &LabelClass {
        &self.class
    }

    pub fn rule(&self) -> &Arc<PlacementRule> {
        &self.rule
    }

    pub fn state(&self) -> &PlacementState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut PlacementState {
        &mut self.state
    }

    pub fn status(&self) -> PlacementStatus {
        self.status
    }

    pub fn previous_status(&self) -> PlacementStatus {
        self.previous_status
    }

    pub fn placed(&self) -> Option<&PlacedLabel> {
        self.placed.as_ref()
    }

    /// The working label for this frame, cloned from the original on first use.
    pub fn working_label(&mut self) -> &Label {
        self.state.working_label(&self.label)
    }

    /// Back to `UnPlaced` with no result and no candidate history.
    pub fn reset(&mut self) {
        self.status = PlacementStatus::UnPlaced;
        self.placed = None;
        self.state.clear_state();
        self.state.clear_placement_history();
        self.state.release_working_text_objects();
    }

    /// Starts a fresh relaxation ladder for the same label, feature and class.
    pub fn clear_placement_state(&mut self) {
        self.state = PlacementState::initialize(&self.label, &self.rule, &self.feature.geometry);
    }

    pub fn clear_placement_history(&mut self) {
        self.state.clear_placement_history();
    }

    /// Remembers this frame's outcome and starts over for the next one.
    pub fn begin_frame(&mut self) {
        self.previous_status = self.status;
        self.reset();
        self.clear_placement_state();
    }

    /// The first stacked line that stays too long even at the deepest
    /// stacking the rule allows.
    pub fn too_long_line(&self, metrics: &dyn TextMetrics) -> Option<ValidationFailure> {
        let max = self.rule.max_label_length?;
        let mut stacked = Label::clone(&self.label);
        for object in &mut stacked.text_objects {
            object.stack_lines = self.rule.max_stack_lines.max(1);
        }
        stacked.first_overlong_line(metrics, max)
    }

    pub fn is_label_too_long(&self, metrics: &dyn TextMetrics) -> bool {
        self.too_long_line(metrics).is_some()
    }

    /// Checks the request can be searched at all.
    pub fn validate(&self, metrics: &dyn TextMetrics) -> Result<()> {
        if !self.label.text_objects.iter().any(TextObject::has_text) {
            return Err(ValidationFailure::EmptyLabel.into());
        }
        if !self.feature.geometry.is_usable() {
            return Err(ValidationFailure::EmptyGeometry(self.feature.id.0).into());
        }
        if let Some(failure) = self.too_long_line(metrics) {
            return Err(failure.into());
        }
        Ok(())
    }

    /// Ranking metric; larger is placed earlier. A label drawn in the
    /// previous frame, or already drawn in this one, earns the stability bonus.
    pub fn priority(&self, policy: StabilityPolicy) -> f64 {
        let base = self.class.priority;
        let held = self.status.is_placed() || self.previous_status.is_placed();
        match (policy, held) {
            (_, false) => base,
            (StabilityPolicy::PriorityLed, true) => base + STABILITY_BONUS,
            (StabilityPolicy::StabilityLed, true) => base + STABILITY_LEAD,
        }
    }

    fn set_status(&mut self, status: PlacementStatus) {
        debug!(label = self.label.id.0, from = ?self.status, to = ?status, "label status changed");
        self.status = status;
    }

    /// Records an accepted position. Reports hiding when any part was dropped.
    /// A label with nothing left to draw is refused and the request is
    /// left untouched.
    pub fn accept(&mut self, placed: PlacedLabel) -> Result<PlacementStatus> {
        if !placed.label.has_visible_text() {
            return Err(PlacementError::IllegalOperation(format!(
                "label {} has no visible text",
                placed.label.id.0
            )));
        }
        let status = if placed.label.text_objects.iter().any(|o| o.hidden) {
            PlacementStatus::PlacedWithHiding
        } else {
            PlacementStatus::Placed
        };
        self.placed = Some(placed);
        self.set_status(status);
        Ok(status)
    }

    /// Draws the label even though it collides.
    pub fn force(&mut self, placed: PlacedLabel) {
        self.placed = Some(placed);
        self.set_status(PlacementStatus::Forced);
    }

    pub fn suppress(&mut self) {
        self.placed = None;
        self.set_status(PlacementStatus::Suppressed);
    }
}
