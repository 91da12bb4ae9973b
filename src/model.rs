// Features, labels and the shared placement rule.

use crate::config::PlacementConfig;
use crate::error::ValidationFailure;
use crate::geometry::{Point, Rect};
use crate::metrics::TextMetrics;
use crate::obstacle::ObstacleFlags;
use crate::placement::{PointPosition, Relaxation};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureGeometry {
    Point(Point),
    Line(Vec<Point>),
    Area(Vec<Point>),
}

impl FeatureGeometry {
    pub fn envelope(&self) -> Option<Rect> {
        match self {
            FeatureGeometry::Point(p) => Some(Rect::new(p.x, p.y, p.x, p.y)),
            FeatureGeometry::Line(points) | FeatureGeometry::Area(points) => {
                Rect::from_points(points.iter().copied())
            }
        }
    }

    pub fn is_usable(&self) -> bool {
        match self {
            FeatureGeometry::Point(p) => p.x.is_finite() && p.y.is_finite(),
            FeatureGeometry::Line(points) => points.len() >= 2,
            FeatureGeometry::Area(points) => points.len() >= 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: FeatureId,
    pub layer: u32,
    pub geometry: FeatureGeometry,
}

/// One separately styled piece of a label (name, elevation, route number...).
#[derive(Debug, Clone, PartialEq)]
pub struct TextObject {
    pub text: String,
    pub font_size: f64,
    /// May be dropped by the hide step of the relaxation ladder.
    pub hideable: bool,
    pub hidden: bool,
    /// Number of lines the text is currently broken into.
    pub stack_lines: u32,
}

impl TextObject {
    pub fn new(text: impl Into<String>, font_size: f64) -> Self {
        Self {
            text: text.into(),
            font_size,
            hideable: false,
            hidden: false,
            stack_lines: 1,
        }
    }

    pub fn hideable(mut self) -> Self {
        self.hideable = true;
        self
    }

    pub fn lines(&self) -> Vec<String> {
        stack_text(&self.text, self.stack_lines)
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub id: LabelId,
    pub text_objects: Vec<TextObject>,
}

impl Label {
    pub fn new(id: LabelId, text_objects: Vec<TextObject>) -> Self {
        Self { id, text_objects }
    }

    pub fn single(id: LabelId, text: impl Into<String>, font_size: f64) -> Self {
        Self::new(id, vec![TextObject::new(text, font_size)])
    }

    /// True while at least one non-blank text object is still drawn.
    pub fn has_visible_text(&self) -> bool {
        self.text_objects.iter().any(|o| !o.hidden && o.has_text())
    }

    /// Width and height of the visible text objects stacked vertically.
    pub fn extent(&self, metrics: &dyn TextMetrics) -> (f64, f64) {
        let mut width: f64 = 0.0;
        let mut height = 0.0;
        for object in self.text_objects.iter().filter(|o| !o.hidden) {
            let lines = object.lines();
            for line in &lines {
                width = width.max(metrics.text_width(line, object.font_size));
            }
            height += metrics.line_height(object.font_size) * lines.len() as f64;
        }
        (width, height)
    }

    /// First stacked line wider than `max`, if any.
    pub fn first_overlong_line(
        &self,
        metrics: &dyn TextMetrics,
        max: f64,
    ) -> Option<ValidationFailure> {
        let mut line_index = 0;
        for object in self.text_objects.iter().filter(|o| !o.hidden) {
            for line in object.lines() {
                let width = metrics.text_width(&line, object.font_size);
                if width > max {
                    return Some(ValidationFailure::LabelTooLong {
                        line: line_index,
                        width,
                        max,
                    });
                }
                line_index += 1;
            }
        }
        None
    }
}

/// Breaks `text` at word boundaries into at most `lines` roughly equal lines.
pub fn stack_text(text: &str, lines: u32) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if lines <= 1 || words.len() <= 1 {
        return vec![text.trim().to_string()];
    }
    let lines = (lines as usize).min(words.len());
    let total: usize = words.iter().map(|w| w.chars().count()).sum::<usize>() + words.len() - 1;
    let target = total.div_ceil(lines);

    let mut out: Vec<String> = Vec::with_capacity(lines);
    let mut current = String::new();
    for (i, word) in words.iter().enumerate() {
        let remaining_words = words.len() - i;
        let remaining_lines = lines - out.len();
        let must_break = !current.is_empty() && remaining_words < remaining_lines;
        let would_overflow = !current.is_empty()
            && current.chars().count() + 1 + word.chars().count() > target
            && out.len() + 1 < lines;
        if must_break || would_overflow {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Read-only placement rule shared by every label of a class. Held through
/// `Arc`; the longest holder is whichever request or class outlives the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementRule {
    pub feature_buffer: f64,
    pub label_buffer: f64,
    pub leader_buffer: f64,
    pub buffer_step: f64,
    pub max_buffer_steps: u32,
    pub font_step_percent: f64,
    pub min_font_size: f64,
    pub max_font_steps: u32,
    pub max_stack_lines: u32,
    pub max_label_length: Option<f64>,
    pub overhang_tolerances: Vec<f64>,
    pub point_offset: f64,
    pub point_positions: Vec<PointPosition>,
    pub max_bump: f64,
    pub max_leader_length: Option<f64>,
    pub allow_self_overlap: bool,
    pub never_remove: bool,
    pub avoid: ObstacleFlags,
    pub relaxation_order: Vec<Relaxation>,
}

impl PlacementRule {
    pub fn from_config(config: &PlacementConfig) -> Self {
        Self {
            feature_buffer: config.feature_buffer,
            label_buffer: config.label_buffer,
            leader_buffer: config.leader_buffer,
            buffer_step: config.buffer_step,
            max_buffer_steps: config.max_buffer_steps,
            font_step_percent: config.font_step_percent,
            min_font_size: config.min_font_size,
            max_font_steps: config.max_font_steps,
            max_stack_lines: config.max_stack_lines.max(1),
            max_label_length: None,
            overhang_tolerances: config.overhang_tolerances.clone(),
            point_offset: config.point_offset,
            point_positions: PointPosition::ALL.to_vec(),
            max_bump: config.max_bump,
            max_leader_length: None,
            allow_self_overlap: false,
            never_remove: false,
            avoid: ObstacleFlags::ALL_OBSTACLES,
            relaxation_order: Relaxation::default_order(),
        }
    }
}

impl Default for PlacementRule {
    fn default() -> Self {
        Self::from_config(&PlacementConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct LabelClass {
    pub name: String,
    /// Larger is more important.
    pub priority: f64,
    pub rule: Option<Arc<PlacementRule>>,
}

impl LabelClass {
    pub fn new(name: impl Into<String>, priority: f64, rule: Arc<PlacementRule>) -> Self {
        Self {
            name: name.into(),
            priority,
            rule: Some(rule),
        }
    }

    pub fn rule(&self) -> Result<&Arc<PlacementRule>, ValidationFailure> {
        self.rule
            .as_ref()
            .ok_or_else(|| ValidationFailure::MissingRule(self.name.clone()))
    }
}
