//! Per-building stochastic recovery trajectories.
//!
//! One call to [`BuildingSimulator::simulate`] is one independent Monte-Carlo
//! trial: delay stages are sampled from the empirical tables (with lognormal
//! dispersion jitter) and composed into a monotone non-decreasing step
//! function of "fraction of function recovered" over the zone timeline.

use std::fmt;
use std::str::FromStr;

use rand::distributions::Distribution;
use rand::Rng;
use statrs::distribution::LogNormal;

use crate::input::{DelayTables, Dispersions};
use crate::states::{RecoveryProbs, RecoveryState};
use crate::timeline::Timeline;

/// How per-stage delays are composed into a building trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approach {
    /// Delay stages are summed into one recovery-onset time per damage
    /// state; each state's mass is released in a single step.
    Aggregate,
    /// Stage times are sampled independently per damage state and each
    /// state's mass is released gradually at every completed stage,
    /// producing a smoother, more dispersed curve.
    Disaggregate,
}

impl FromStr for Approach {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aggregate" => Ok(Approach::Aggregate),
            "disaggregate" => Ok(Approach::Disaggregate),
            other => anyhow::bail!("unknown approach {other:?} (expected aggregate or disaggregate)"),
        }
    }
}

impl fmt::Display for Approach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Approach::Aggregate => write!(f, "aggregate"),
            Approach::Disaggregate => write!(f, "disaggregate"),
        }
    }
}

/// Delay stage samples for one building and trial, in days.
struct StageSamples {
    inspection: f64,
    assessment: f64,
    mobilization: f64,
    repair: f64,
    recovery: f64,
}

/// Generates one recovery trajectory per (building, trial) pair.
///
/// Holds read-only views of the zone's adjusted delay tables; no state
/// persists between buildings or trials, so trials may run concurrently.
pub struct BuildingSimulator<'a> {
    tables: &'a DelayTables,
    lead_jitter: Option<LogNormal>,
    repair_jitter: Option<LogNormal>,
    num_days: usize,
}

impl<'a> BuildingSimulator<'a> {
    pub fn new(tables: &'a DelayTables, dispersions: Dispersions, timeline: &Timeline) -> Self {
        Self {
            tables,
            lead_jitter: jitter_distribution(dispersions.lead_time),
            repair_jitter: jitter_distribution(dispersions.repair_time),
            num_days: timeline.len(),
        }
    }

    /// Runs one stochastic trial and returns the building trajectory, one
    /// value per timeline day.
    ///
    /// The trajectory starts at the building's undamaged probability mass and
    /// climbs toward its total mass as recovery stages complete; onsets past
    /// the timeline bound never fire (irreparable mass may plateau).
    pub fn simulate<R: Rng>(
        &self,
        probs: &RecoveryProbs,
        approach: Approach,
        rng: &mut R,
    ) -> Vec<f64> {
        match approach {
            Approach::Aggregate => self.simulate_aggregate(probs, rng),
            Approach::Disaggregate => self.simulate_disaggregate(probs, rng),
        }
    }

    fn simulate_aggregate<R: Rng>(&self, probs: &RecoveryProbs, rng: &mut R) -> Vec<f64> {
        let mut deltas = vec![0.0; self.num_days];
        let stages = self.sample_stages(rng);
        for state in RecoveryState::ALL {
            let p = probs.get(state);
            if p <= 0.0 {
                continue;
            }
            add_step(&mut deltas, state_onset(&stages, state), p);
        }
        prefix_sum(deltas)
    }

    fn simulate_disaggregate<R: Rng>(&self, probs: &RecoveryProbs, rng: &mut R) -> Vec<f64> {
        let mut deltas = vec![0.0; self.num_days];
        for state in RecoveryState::ALL {
            let p = probs.get(state);
            if p <= 0.0 {
                continue;
            }
            let stages = self.sample_stages(rng);
            let durations = stage_durations(&stages, state);
            if durations.is_empty() {
                add_step(&mut deltas, 0.0, p);
                continue;
            }
            let share = p / durations.len() as f64;
            let mut elapsed = 0.0;
            for duration in durations {
                elapsed += duration.max(0.0);
                add_step(&mut deltas, elapsed, share);
            }
        }
        prefix_sum(deltas)
    }

    fn sample_stages<R: Rng>(&self, rng: &mut R) -> StageSamples {
        StageSamples {
            inspection: self.sample_delay(&self.tables.inspection, self.lead_jitter, rng),
            assessment: self.sample_delay(&self.tables.assessment, self.lead_jitter, rng),
            mobilization: self.sample_delay(&self.tables.mobilization, self.lead_jitter, rng),
            repair: self.sample_delay(&self.tables.repair, self.repair_jitter, rng),
            recovery: self.sample_delay(&self.tables.recovery, self.repair_jitter, rng),
        }
    }

    /// Draws one empirical observation and applies the lognormal jitter.
    fn sample_delay<R: Rng>(&self, table: &[f64], jitter: Option<LogNormal>, rng: &mut R) -> f64 {
        if table.is_empty() {
            return 0.0;
        }
        let base = table[rng.gen_range(0..table.len())].max(0.0);
        match jitter {
            Some(dist) if base > 0.0 => base * dist.sample(rng),
            _ => base,
        }
    }
}

/// Median-1 lognormal multiplier; `None` when the dispersion is zero.
fn jitter_distribution(sigma: f64) -> Option<LogNormal> {
    if sigma > 0.0 {
        LogNormal::new(0.0, sigma).ok()
    } else {
        None
    }
}

/// Recovery-onset time for the aggregate approach: all applicable stages
/// summed sequentially.
fn state_onset(stages: &StageSamples, state: RecoveryState) -> f64 {
    stage_durations(stages, state).iter().sum()
}

/// Delay stages a building in the given recovery state must pass through.
///
/// Undamaged buildings recover immediately. Lightly impacted states stop
/// after the early stages; irreparable/collapsed buildings replace repair
/// with full reconstruction.
fn stage_durations(stages: &StageSamples, state: RecoveryState) -> Vec<f64> {
    match state {
        RecoveryState::None => vec![],
        RecoveryState::TriggerInspection => vec![stages.inspection],
        RecoveryState::LossFunction => vec![stages.inspection, stages.assessment],
        RecoveryState::NotOccupiable => vec![
            stages.inspection,
            stages.assessment,
            stages.mobilization,
            stages.repair,
        ],
        RecoveryState::Irreparable | RecoveryState::Collapse => vec![
            stages.inspection,
            stages.assessment,
            stages.mobilization,
            stages.recovery,
        ],
    }
}

fn add_step(deltas: &mut [f64], onset_days: f64, mass: f64) {
    let day = onset_days.max(0.0).ceil();
    if day < deltas.len() as f64 {
        deltas[day as usize] += mass;
    }
}

fn prefix_sum(mut deltas: Vec<f64>) -> Vec<f64> {
    let mut acc = 0.0;
    for value in deltas.iter_mut() {
        acc += *value;
        *value = acc;
    }
    deltas
}
