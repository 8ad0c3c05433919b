use anyhow::{Context, Result};

use crate::states::{LossProbs, RecoveryProbs, NUM_LOSS_STATES, NUM_RECOVERY_STATES};

/// Default empirical transfer probabilities, mirrored in
/// `data/input_data/transferProbabilities.csv`. Each row sums to 1.
const DEFAULT_TRANSFER: [[f64; NUM_RECOVERY_STATES]; NUM_LOSS_STATES] = [
    [1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [0.75, 0.25, 0.0, 0.0, 0.0, 0.0],
    [0.0, 0.5, 0.5, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.25, 0.5, 0.25, 0.0],
    [0.0, 0.0, 0.0, 0.25, 0.375, 0.375],
];

/// Empirical mapping from loss-based to recovery-based damage states.
///
/// Rows are loss-based states (None/Slight/Moderate/Extensive/Complete),
/// columns are recovery-based states (None/TriggerInspection/LossFunction/
/// NotOccupiable/Irreparable/Collapse). Element (s, j) is the probability of
/// recovery-based state j given loss-based state s. Loaded once and immutable
/// for the lifetime of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferMatrix {
    rows: [[f64; NUM_RECOVERY_STATES]; NUM_LOSS_STATES],
}

impl TransferMatrix {
    pub fn new(rows: [[f64; NUM_RECOVERY_STATES]; NUM_LOSS_STATES]) -> Self {
        Self { rows }
    }

    /// Built-in default table, used when no CSV override is provided.
    pub fn default_empirical() -> Self {
        Self::new(DEFAULT_TRANSFER)
    }

    /// Parses a 5x6 CSV table.
    ///
    /// Fails on wrong shape or non-numeric cells; this is a configuration
    /// error and aborts the run before any zone is processed.
    pub fn from_csv(content: &str) -> Result<Self> {
        let lines: Vec<&str> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        anyhow::ensure!(
            lines.len() == NUM_LOSS_STATES,
            "transfer matrix: expected {} rows, got {}",
            NUM_LOSS_STATES,
            lines.len()
        );

        let mut rows = [[0.0; NUM_RECOVERY_STATES]; NUM_LOSS_STATES];
        for (i, line) in lines.iter().enumerate() {
            let cells: Vec<&str> = line.split(',').map(str::trim).collect();
            anyhow::ensure!(
                cells.len() == NUM_RECOVERY_STATES,
                "transfer matrix row {}: expected {} columns, got {}",
                i + 1,
                NUM_RECOVERY_STATES,
                cells.len()
            );
            for (j, cell) in cells.iter().enumerate() {
                rows[i][j] = cell.parse().with_context(|| {
                    format!("transfer matrix row {} column {}: invalid number {cell:?}", i + 1, j + 1)
                })?;
            }
        }
        Ok(Self::new(rows))
    }

    pub fn row(&self, loss_state: usize) -> &[f64; NUM_RECOVERY_STATES] {
        &self.rows[loss_state]
    }

    /// Matrix-vector product: `recovery[j] = sum_s loss[s] * rows[s][j]`.
    pub fn apply(&self, loss: &LossProbs) -> RecoveryProbs {
        let mut out = [0.0; NUM_RECOVERY_STATES];
        for (s, &p) in loss.as_slice().iter().enumerate() {
            for (j, value) in out.iter_mut().enumerate() {
                *value += p * self.rows[s][j];
            }
        }
        RecoveryProbs::new(out)
    }
}

/// Converts a whole batch of buildings and accumulates the fraction of
/// probability mass indicating structural loss (Irreparable + Collapse)
/// averaged over the batch.
///
/// An empty batch yields an empty vector and a fraction of 0.
pub fn transfer_batch(loss: &[LossProbs], matrix: &TransferMatrix) -> (Vec<RecoveryProbs>, f64) {
    let mut collapsed_mass = 0.0;
    let recovery: Vec<RecoveryProbs> = loss
        .iter()
        .map(|probs| {
            let r = matrix.apply(probs);
            collapsed_mass += r.irreparable_or_collapse();
            r
        })
        .collect();
    let fraction = if recovery.is_empty() {
        0.0
    } else {
        collapsed_mass / recovery.len() as f64
    };
    (recovery, fraction)
}
