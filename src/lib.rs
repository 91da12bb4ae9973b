pub mod config;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod metrics;
pub mod model;
pub mod obstacle;
pub mod placement;
pub mod priority_queue;

pub use config::{PlacementConfig, StabilityPolicy, load_config};
pub use engine::{FrameReport, LabelEngine};
pub use error::{PlacementError, Result, ValidationFailure};
pub use obstacle::{ObstacleDetector, ObstacleFlags, ObstacleOverlapSummary};
pub use placement::{LabelRequest, PlacementState, PlacementStatus};
pub use priority_queue::{PriorityQueue, Ranked};
