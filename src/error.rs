use std::collections::TryReserveError;

/// Reasons a label request cannot be processed as given.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationFailure {
    #[error("stacked line {line} is {width:.2} wide, rule allows at most {max:.2}")]
    LabelTooLong { line: usize, width: f64, max: f64 },

    #[error("label has no text objects")]
    EmptyLabel,

    #[error("feature {0} has no usable geometry")]
    EmptyGeometry(u64),

    #[error("label class {0:?} has no placement rule")]
    MissingRule(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PlacementError {
    #[error("out of memory while building {what}")]
    ResourceExhaustion {
        what: &'static str,
        #[source]
        source: TryReserveError,
    },

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationFailure),

    #[error("illegal operation: {0}")]
    IllegalOperation(String),
}

impl PlacementError {
    pub(crate) fn exhausted(what: &'static str) -> impl FnOnce(TryReserveError) -> Self {
        move |source| PlacementError::ResourceExhaustion { what, source }
    }
}

pub type Result<T> = std::result::Result<T, PlacementError>;

/// Pushes onto `vec`, reporting allocation failure instead of aborting.
pub(crate) fn try_push<T>(vec: &mut Vec<T>, value: T, what: &'static str) -> Result<()> {
    vec.try_reserve(1).map_err(PlacementError::exhausted(what))?;
    vec.push(value);
    Ok(())
}
