//! Monte-Carlo simulation of post-disaster community recovery.
//!
//! Per-asset loss-based damage-state probabilities are mapped through an
//! empirical transfer matrix into recovery-based states, delay distributions
//! are inflated by a collapse-severity lead-time factor, and per-building
//! recovery trajectories are sampled and averaged across Monte-Carlo trials
//! into one community-level recovery curve per zone.

pub mod building;
pub mod error;
pub mod input;
pub mod runner;
pub mod states;
pub mod timeline;
pub mod transfer;
pub mod zone;

// Prelude
pub use building::{Approach, BuildingSimulator};
pub use error::ShapeError;
pub use input::{AssetRecord, DelayTables, Dispersions, RecoveryInputs};
pub use runner::{ArtifactSink, DirSink, NullSink, RunConfig, RunSummary, SimulationRunner};
pub use states::{LossProbs, LossState, RecoveryProbs, RecoveryState};
pub use timeline::{lead_time_factor, NoSviAdjustment, SviAdjustment, Timeline, DAYS_BEFORE_EVENT};
pub use transfer::{transfer_batch, TransferMatrix};
pub use zone::{group_by_zone, ZoneAggregator, ZoneRecoveryCurve};
