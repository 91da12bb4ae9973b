use crate::geometry::Rect;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::path::Path;

/// How the derived request priority weighs class priority against keeping
/// last frame's placements stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StabilityPolicy {
    #[default]
    PriorityLed,
    StabilityLed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementConfig {
    pub feature_buffer: f64,
    pub label_buffer: f64,
    pub leader_buffer: f64,
    pub buffer_step: f64,
    pub max_buffer_steps: u32,
    pub font_step_percent: f64,
    pub min_font_size: f64,
    pub max_font_steps: u32,
    pub max_stack_lines: u32,
    pub overhang_tolerances: Vec<f64>,
    pub point_offset: f64,
    /// Farthest a colliding candidate may be nudged by its escape shift.
    pub max_bump: f64,
    pub line_height: f64,
    pub grid_cell_size: f64,
    pub neatline: Option<Rect>,
    pub stability_policy: StabilityPolicy,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            feature_buffer: 2.0,
            label_buffer: 1.0,
            leader_buffer: 1.0,
            buffer_step: 0.5,
            max_buffer_steps: 4,
            font_step_percent: 10.0,
            min_font_size: 6.0,
            max_font_steps: 3,
            max_stack_lines: 3,
            overhang_tolerances: vec![0.0],
            point_offset: 2.0,
            max_bump: 4.0,
            line_height: 1.2,
            grid_cell_size: 64.0,
            neatline: None,
            stability_policy: StabilityPolicy::PriorityLed,
        }
    }
}

impl PlacementConfig {
    /// Temporarily replaces this configuration. The previous value comes back
    /// when the returned guard is dropped.
    pub fn scoped(&mut self, replacement: PlacementConfig) -> ScopedConfig<'_> {
        let previous = std::mem::replace(self, replacement);
        ScopedConfig {
            target: self,
            previous: Some(previous),
        }
    }
}

pub struct ScopedConfig<'a> {
    target: &'a mut PlacementConfig,
    previous: Option<PlacementConfig>,
}

impl Deref for ScopedConfig<'_> {
    type Target = PlacementConfig;

    fn deref(&self) -> &PlacementConfig {
        self.target
    }
}

impl DerefMut for ScopedConfig<'_> {
    fn deref_mut(&mut self) -> &mut PlacementConfig {
        self.target
    }
}

impl Drop for ScopedConfig<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *self.target = previous;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    feature_buffer: Option<f64>,
    label_buffer: Option<f64>,
    leader_buffer: Option<f64>,
    buffer_step: Option<f64>,
    max_buffer_steps: Option<u32>,
    font_step_percent: Option<f64>,
    min_font_size: Option<f64>,
    max_font_steps: Option<u32>,
    max_stack_lines: Option<u32>,
    overhang_tolerances: Option<Vec<f64>>,
    point_offset: Option<f64>,
    max_bump: Option<f64>,
    line_height: Option<f64>,
    grid_cell_size: Option<f64>,
    neatline: Option<[f64; 4]>,
    stability_policy: Option<StabilityPolicy>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<PlacementConfig> {
    let Some(path) = path else {
        return Ok(PlacementConfig::default());
    };
    let contents = std::fs::read_to_string(path)?;
    let is_json5 = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json5"));
    if is_json5 {
        parse_config_json5(&contents)
    } else {
        parse_config(&contents)
    }
}

pub fn parse_config(contents: &str) -> anyhow::Result<PlacementConfig> {
    let parsed: ConfigFile = serde_json::from_str(contents)?;
    apply_config_file(parsed)
}

pub fn parse_config_json5(contents: &str) -> anyhow::Result<PlacementConfig> {
    let parsed: ConfigFile = json5::from_str(contents)?;
    apply_config_file(parsed)
}

fn apply_config_file(parsed: ConfigFile) -> anyhow::Result<PlacementConfig> {
    let mut config = PlacementConfig::default();
    if let Some(v) = parsed.feature_buffer {
        config.feature_buffer = v;
    }
    if let Some(v) = parsed.label_buffer {
        config.label_buffer = v;
    }
    if let Some(v) = parsed.leader_buffer {
        config.leader_buffer = v;
    }
    if let Some(v) = parsed.buffer_step {
        config.buffer_step = v;
    }
    if let Some(v) = parsed.max_buffer_steps {
        config.max_buffer_steps = v;
    }
    if let Some(v) = parsed.font_step_percent {
        if !(0.0..100.0).contains(&v) {
            anyhow::bail!("fontStepPercent must be in [0, 100), got {v}");
        }
        config.font_step_percent = v;
    }
    if let Some(v) = parsed.min_font_size {
        config.min_font_size = v;
    }
    if let Some(v) = parsed.max_font_steps {
        config.max_font_steps = v;
    }
    if let Some(v) = parsed.max_stack_lines {
        config.max_stack_lines = v.max(1);
    }
    if let Some(v) = parsed.overhang_tolerances {
        if v.is_empty() {
            anyhow::bail!("overhangTolerances must not be empty");
        }
        config.overhang_tolerances = v;
    }
    if let Some(v) = parsed.point_offset {
        config.point_offset = v;
    }
    if let Some(v) = parsed.max_bump {
        config.max_bump = v.max(0.0);
    }
    if let Some(v) = parsed.line_height {
        config.line_height = v;
    }
    if let Some(v) = parsed.grid_cell_size {
        config.grid_cell_size = v;
    }
    if let Some([min_x, min_y, max_x, max_y]) = parsed.neatline {
        config.neatline = Some(Rect::new(min_x, min_y, max_x, max_y));
    }
    if let Some(v) = parsed.stability_policy {
        config.stability_policy = v;
    }
    Ok(config)
}
