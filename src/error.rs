use thiserror::Error;

/// Probability data with the wrong number of damage states.
///
/// Raised when a loss-based vector does not have exactly 5 entries or a
/// transfer matrix row does not have exactly 6 columns. Shape errors abort
/// the containing zone batch, not the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{context}: expected {expected} values, got {got}")]
pub struct ShapeError {
    pub context: String,
    pub expected: usize,
    pub got: usize,
}

impl ShapeError {
    pub fn new(context: impl Into<String>, expected: usize, got: usize) -> Self {
        Self {
            context: context.into(),
            expected,
            got,
        }
    }
}
