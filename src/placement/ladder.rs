// The relaxation ladder: monotonic counters that loosen a label's
// constraints one step at a time when no clean candidate exists.

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Feature,
    Label,
    Leader,
}

impl BufferKind {
    pub const ALL: [BufferKind; 3] = [BufferKind::Feature, BufferKind::Label, BufferKind::Leader];

    fn slot(self) -> usize {
        match self {
            BufferKind::Feature => 0,
            BufferKind::Label => 1,
            BufferKind::Leader => 2,
        }
    }
}

/// One named transition of the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relaxation {
    Buffer(BufferKind),
    Font,
    Stack,
    Hide,
}

impl Relaxation {
    /// Clearances go first, then size, then layout, then content.
    pub fn default_order() -> Vec<Relaxation> {
        vec![
            Relaxation::Buffer(BufferKind::Label),
            Relaxation::Buffer(BufferKind::Leader),
            Relaxation::Buffer(BufferKind::Feature),
            Relaxation::Font,
            Relaxation::Stack,
            Relaxation::Hide,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LadderLimits {
    pub buffer_steps: u32,
    pub font_steps: u32,
    pub stack_levels: u32,
    pub hide_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaxationLadder {
    limits: LadderLimits,
    buffer_steps: [u32; 3],
    font_step: u32,
    stack_level: u32,
    hide_cursor: u32,
}

impl RelaxationLadder {
    pub fn new(limits: LadderLimits) -> Self {
        Self {
            limits,
            buffer_steps: [0; 3],
            font_step: 0,
            stack_level: 0,
            hide_cursor: 0,
        }
    }

    pub fn limits(&self) -> LadderLimits {
        self.limits
    }

    pub fn buffer_step(&self, kind: BufferKind) -> u32 {
        self.buffer_steps[kind.slot()]
    }

    pub fn font_step(&self) -> u32 {
        self.font_step
    }

    /// Extra lines beyond the first.
    pub fn stack_level(&self) -> u32 {
        self.stack_level
    }

    pub fn hide_cursor(&self) -> u32 {
        self.hide_cursor
    }

    pub fn step(&self, relaxation: Relaxation) -> u32 {
        match relaxation {
            Relaxation::Buffer(kind) => self.buffer_step(kind),
            Relaxation::Font => self.font_step,
            Relaxation::Stack => self.stack_level,
            Relaxation::Hide => self.hide_cursor,
        }
    }

    pub fn limit(&self, relaxation: Relaxation) -> u32 {
        match relaxation {
            Relaxation::Buffer(_) => self.limits.buffer_steps,
            Relaxation::Font => self.limits.font_steps,
            Relaxation::Stack => self.limits.stack_levels,
            Relaxation::Hide => self.limits.hide_attempts,
        }
    }

    pub fn can_advance(&self, relaxation: Relaxation) -> bool {
        self.step(relaxation) < self.limit(relaxation)
    }

    pub fn advance_buffer_step(&mut self, kind: BufferKind) -> bool {
        self.advance(Relaxation::Buffer(kind))
    }

    pub fn advance_font_step(&mut self) -> bool {
        self.advance(Relaxation::Font)
    }

    pub fn advance_stack_level(&mut self) -> bool {
        self.advance(Relaxation::Stack)
    }

    pub fn advance_hide_attempt(&mut self) -> bool {
        self.advance(Relaxation::Hide)
    }

    /// Bumps one counter. Returns false, changing nothing, at its limit.
    pub fn advance(&mut self, relaxation: Relaxation) -> bool {
        if !self.can_advance(relaxation) {
            return false;
        }
        let counter = match relaxation {
            Relaxation::Buffer(kind) => &mut self.buffer_steps[kind.slot()],
            Relaxation::Font => &mut self.font_step,
            Relaxation::Stack => &mut self.stack_level,
            Relaxation::Hide => &mut self.hide_cursor,
        };
        *counter += 1;
        debug!(?relaxation, step = *counter, "relaxation advanced");
        true
    }

    /// First transition in `order` that still has room.
    pub fn next_relaxation(&self, order: &[Relaxation]) -> Option<Relaxation> {
        order.iter().copied().find(|r| self.can_advance(*r))
    }

    pub fn advance_next(&mut self, order: &[Relaxation]) -> Option<Relaxation> {
        let next = self.next_relaxation(order)?;
        self.advance(next).then_some(next)
    }

    pub fn is_exhausted(&self, order: &[Relaxation]) -> bool {
        self.next_relaxation(order).is_none()
    }

    /// Sum of all counters; never decreases between re-initializations.
    pub fn total_steps(&self) -> u32 {
        self.buffer_steps.iter().sum::<u32>() + self.font_step + self.stack_level + self.hide_cursor
    }

    /// Upper bound on distinct ladder states for one label.
    pub fn work_bound(&self) -> u64 {
        let l = self.limits;
        let buffer = u64::from(l.buffer_steps) + 1;
        buffer.pow(3)
            * (u64::from(l.font_steps) + 1)
            * (u64::from(l.stack_levels) + 1)
            * (u64::from(l.hide_attempts) + 1)
    }
}

/// Nested tolerance sequence tried once the ladder itself is exhausted.
#[derive(Debug, Clone, PartialEq)]
pub struct OverhangSequence {
    tolerances: Vec<f64>,
    cursor: usize,
}

impl OverhangSequence {
    pub fn new(tolerances: &[f64]) -> Self {
        let mut tolerances: Vec<f64> = tolerances
            .iter()
            .copied()
            .filter(|t| t.is_finite() && *t >= 0.0)
            .collect();
        if tolerances.first().is_none_or(|t| *t > 0.0) {
            tolerances.insert(0, 0.0);
        }
        Self {
            tolerances,
            cursor: 0,
        }
    }

    pub fn current(&self) -> f64 {
        self.tolerances.get(self.cursor).copied().unwrap_or(0.0)
    }

    pub fn step(&self) -> usize {
        self.cursor
    }

    pub fn advance(&mut self) -> bool {
        if self.cursor + 1 < self.tolerances.len() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }
}
