use crate::error::ShapeError;

/// Number of loss-based damage states.
pub const NUM_LOSS_STATES: usize = 5;
/// Number of recovery-based damage states.
pub const NUM_RECOVERY_STATES: usize = 6;

/// Loss-based damage state, as produced by the risk-loss model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossState {
    None,
    Slight,
    Moderate,
    Extensive,
    Complete,
}

impl LossState {
    pub const ALL: [LossState; NUM_LOSS_STATES] = [
        LossState::None,
        LossState::Slight,
        LossState::Moderate,
        LossState::Extensive,
        LossState::Complete,
    ];
}

/// Recovery-based damage state, describing functional/occupancy impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    None,
    TriggerInspection,
    LossFunction,
    NotOccupiable,
    Irreparable,
    Collapse,
}

impl RecoveryState {
    pub const ALL: [RecoveryState; NUM_RECOVERY_STATES] = [
        RecoveryState::None,
        RecoveryState::TriggerInspection,
        RecoveryState::LossFunction,
        RecoveryState::NotOccupiable,
        RecoveryState::Irreparable,
        RecoveryState::Collapse,
    ];
}

/// Per-building loss-based damage state probabilities.
///
/// Entries are probabilities and are never negative, but upstream rounding
/// slack means they need not sum to exactly 1.
#[derive(Debug, Clone, PartialEq)]
pub struct LossProbs {
    values: [f64; NUM_LOSS_STATES],
}

impl LossProbs {
    pub fn new(values: [f64; NUM_LOSS_STATES]) -> Self {
        Self { values }
    }

    /// Builds a vector from a slice, failing on wrong length.
    pub fn from_slice(values: &[f64]) -> Result<Self, ShapeError> {
        if values.len() != NUM_LOSS_STATES {
            return Err(ShapeError::new(
                "loss-based probability vector",
                NUM_LOSS_STATES,
                values.len(),
            ));
        }
        let mut out = [0.0; NUM_LOSS_STATES];
        out.copy_from_slice(values);
        Ok(Self { values: out })
    }

    pub fn get(&self, state: LossState) -> f64 {
        self.values[state as usize]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn total_mass(&self) -> f64 {
        self.values.iter().sum()
    }
}

/// Per-building recovery-based damage state probabilities, the product of a
/// [`LossProbs`] vector with the transfer matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryProbs {
    values: [f64; NUM_RECOVERY_STATES],
}

impl RecoveryProbs {
    pub fn new(values: [f64; NUM_RECOVERY_STATES]) -> Self {
        Self { values }
    }

    pub fn get(&self, state: RecoveryState) -> f64 {
        self.values[state as usize]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn total_mass(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Probability mass indicating structural loss (Irreparable + Collapse).
    pub fn irreparable_or_collapse(&self) -> f64 {
        self.get(RecoveryState::Irreparable) + self.get(RecoveryState::Collapse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loss_probs_from_slice() {
        let probs = LossProbs::from_slice(&[0.5, 0.2, 0.1, 0.1, 0.1]).unwrap();
        assert!((probs.get(LossState::None) - 0.5).abs() < 1e-12);
        assert!((probs.get(LossState::Complete) - 0.1).abs() < 1e-12);
        assert!((probs.total_mass() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_loss_probs_wrong_length() {
        let err = LossProbs::from_slice(&[0.5, 0.5]).unwrap_err();
        assert_eq!(err.expected, NUM_LOSS_STATES);
        assert_eq!(err.got, 2);
    }

    #[test]
    fn test_irreparable_or_collapse_mass() {
        let probs = RecoveryProbs::new([0.1, 0.1, 0.2, 0.2, 0.25, 0.15]);
        assert!((probs.irreparable_or_collapse() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_state_order_is_severity_order() {
        assert_eq!(LossState::ALL[0], LossState::None);
        assert_eq!(LossState::ALL[4], LossState::Complete);
        assert_eq!(RecoveryState::ALL[4], RecoveryState::Irreparable);
        assert_eq!(RecoveryState::ALL[5], RecoveryState::Collapse);
    }
}
