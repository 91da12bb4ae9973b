//! Per-label placement bookkeeping.
//!
//! A [`LabelRequest`] owns a [`PlacementState`], which pairs the relaxation
//! ladder with the working copy of the label and the candidate history the
//! search has produced so far.

pub mod candidate;
pub mod ladder;
pub mod request;
pub mod state;

pub use candidate::{
    BookmarkKind, CandidateCursor, CandidatePosition, CandidatePositions, Justification,
    PointPosition,
};
pub use ladder::{BufferKind, LadderLimits, OverhangSequence, Relaxation, RelaxationLadder};
pub use request::{LabelRequest, PlacedLabel, PlacementStatus};
pub use state::{
    Anchor, FeatureState, FontReductionGuide, LeaderCandidate, PlacementState, WorkingTextObject,
};
