//! Zone grouping and the per-zone aggregation pipeline.
//!
//! Zones are processed strictly one at a time; within a zone the Monte-Carlo
//! trials are independent and run in parallel. Floating-point summation order
//! across parallel trials is not bit-stable, so consumers compare curves with
//! a numeric tolerance.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use anyhow::Result;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::building::{Approach, BuildingSimulator};
use crate::input::{AssetRecord, RecoveryInputs};
use crate::runner::ArtifactSink;
use crate::states::LossProbs;
use crate::timeline::{plan_timeline, NoSviAdjustment, SviAdjustment, Timeline};
use crate::transfer::transfer_batch;

/// Zone identifier used when no zone field is available.
pub const UNZONED_ID: &str = "ALL";

/// RNG stream tag for the representative per-building artifact trial, kept
/// out of the averaged trial streams.
const ARTIFACT_STREAM: u64 = 0x5eed_a57e_fac7_0000;

/// Canonicalizes a zone or asset identifier.
///
/// Upstream layers sometimes store integer ids as reals ("3.0"); those
/// collapse to their integer form. Anything unparseable falls back to the
/// raw trimmed string.
pub fn canonical_id(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<f64>() {
        if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 {
            return format!("{}", value as i64);
        }
    }
    trimmed.to_string()
}

/// All assets grouped under one zone identifier. Built once per run and not
/// mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct ZoneAssets {
    pub zone_id: String,
    pub asset_refs: Vec<String>,
    pub loss_probs: Vec<LossProbs>,
    /// Socio-economic vulnerability index for the zone, when the external
    /// layer supplies one.
    pub svi_value: Option<f64>,
    /// Set when any asset row in the zone carried a shape failure; the whole
    /// zone batch is skipped with this reason.
    pub defect: Option<String>,
}

impl ZoneAssets {
    pub fn len(&self) -> usize {
        self.loss_probs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loss_probs.is_empty()
    }
}

/// Groups asset records by zone, in deterministic (sorted) zone order.
///
/// With socio-economic integration enabled, assets missing a zone mapping
/// are excluded; without it, everything pools under [`UNZONED_ID`].
///
/// A record carrying a shape failure marks its zone defective instead of
/// failing the grouping; the zone is later skipped with the asset reference
/// in the reason while all other zones run.
pub fn group_by_zone(
    records: impl IntoIterator<Item = AssetRecord>,
    integrate_svi: bool,
) -> Vec<ZoneAssets> {
    let mut zones: BTreeMap<String, ZoneAssets> = BTreeMap::new();
    for record in records {
        let zone_id = if integrate_svi {
            match record.zone_id.as_deref() {
                Some(z) if !z.trim().is_empty() => canonical_id(z),
                _ => {
                    debug!(asset = %record.asset_ref, "asset without zone mapping excluded");
                    continue;
                }
            }
        } else {
            UNZONED_ID.to_string()
        };
        let entry = zones.entry(zone_id.clone()).or_insert_with(|| ZoneAssets {
            zone_id,
            ..Default::default()
        });
        match record.loss_probs {
            Ok(probs) => {
                entry.asset_refs.push(canonical_id(&record.asset_ref));
                entry.loss_probs.push(probs);
            }
            Err(err) => {
                // First failure wins; one bad row is enough to disqualify
                // the batch.
                if entry.defect.is_none() {
                    entry.defect = Some(err.to_string());
                }
            }
        }
    }
    zones.into_values().collect()
}

/// Per-zone processing phases, strictly sequential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZonePhase {
    Idle,
    ReadingAssets,
    ComputingProbabilities,
    Simulating,
    Averaging,
    Finalizing,
    Done,
}

/// Community-level recovery curve for one zone: `days_before_event` leading
/// ones followed by the normalized averaged recovery function.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneRecoveryCurve {
    pub zone_id: String,
    pub values: Vec<f64>,
}

/// Outcome of processing one zone. Failures are surfaced here, never
/// swallowed below the aggregator boundary.
#[derive(Debug)]
pub enum ZoneOutcome {
    Completed(ZoneRecoveryCurve),
    Skipped { zone_id: String, reason: String },
}

/// Runs the per-zone pipeline: probability transfer, timeline planning,
/// Monte-Carlo trials, averaging and finalization.
pub struct ZoneAggregator {
    approach: Approach,
    days_before_event: usize,
    seed: u64,
    svi: Box<dyn SviAdjustment>,
    phase: ZonePhase,
}

impl ZoneAggregator {
    pub fn new(approach: Approach, days_before_event: usize, seed: u64) -> Self {
        Self {
            approach,
            days_before_event,
            seed,
            svi: Box::new(NoSviAdjustment),
            phase: ZonePhase::Idle,
        }
    }

    /// Replaces the default no-op socio-economic timeline adjustment.
    pub fn with_svi_adjustment(mut self, svi: Box<dyn SviAdjustment>) -> Self {
        self.svi = svi;
        self
    }

    pub fn phase(&self) -> ZonePhase {
        self.phase
    }

    /// Processes one zone.
    ///
    /// `inputs.tables` must be the raw (unscaled) observations; the scaled
    /// copies produced by timeline planning never leak back out, so the same
    /// inputs can safely serve every zone.
    pub fn process_zone(
        &mut self,
        zone: &ZoneAssets,
        inputs: &RecoveryInputs,
        sink: &mut dyn ArtifactSink,
    ) -> Result<ZoneOutcome> {
        self.phase = ZonePhase::ReadingAssets;
        if let Some(reason) = &zone.defect {
            warn!(zone = %zone.zone_id, reason = %reason, "zone batch has a malformed asset, skipping");
            self.phase = ZonePhase::Done;
            return Ok(ZoneOutcome::Skipped {
                zone_id: zone.zone_id.clone(),
                reason: reason.clone(),
            });
        }
        if zone.is_empty() {
            warn!(zone = %zone.zone_id, "zone has no qualifying assets, skipping");
            self.phase = ZonePhase::Done;
            return Ok(ZoneOutcome::Skipped {
                zone_id: zone.zone_id.clone(),
                reason: "no qualifying assets".to_string(),
            });
        }

        self.phase = ZonePhase::ComputingProbabilities;
        let (recovery_probs, fraction) = transfer_batch(&zone.loss_probs, &inputs.transfer);
        let plan = plan_timeline(&inputs.tables, fraction, self.days_before_event)?;
        let bound = self
            .svi
            .adjust_max_time(plan.timeline.len(), zone.svi_value);
        let timeline = Timeline::new(bound);
        let num_days = timeline.len();
        debug!(
            zone = %zone.zone_id,
            buildings = zone.len(),
            fraction_collapsed = fraction,
            lead_time_factor = plan.factor,
            timeline_days = num_days,
            "zone timeline planned"
        );

        let simulator = BuildingSimulator::new(&plan.tables, inputs.dispersions, &timeline);
        let approach = self.approach;
        let num_sims = inputs.num_simulations.max(1);
        let zone_seed = derive_zone_seed(self.seed, &zone.zone_id);

        self.phase = ZonePhase::Simulating;
        let community: Vec<f64> = (0..num_sims as u64)
            .into_par_iter()
            .map(|trial| {
                let mut rng = ChaCha8Rng::seed_from_u64(zone_seed.wrapping_add(trial));
                let mut sum = vec![0.0; num_days];
                for probs in &recovery_probs {
                    let trajectory = simulator.simulate(probs, approach, &mut rng);
                    for (acc, value) in sum.iter_mut().zip(&trajectory) {
                        *acc += value;
                    }
                }
                sum
            })
            .reduce(
                || vec![0.0; num_days],
                |mut left, right| {
                    for (acc, value) in left.iter_mut().zip(&right) {
                        *acc += value;
                    }
                    left
                },
            );

        self.phase = ZonePhase::Averaging;
        let averaged: Vec<f64> = community.iter().map(|v| v / num_sims as f64).collect();

        self.phase = ZonePhase::Finalizing;
        let num_buildings = zone.len() as f64;
        let mut values = Vec::with_capacity(self.days_before_event + num_days);
        values.extend(std::iter::repeat(1.0).take(self.days_before_event));
        values.extend(averaged.iter().map(|v| v / num_buildings));

        // Representative per-building trajectories from a dedicated RNG
        // stream, outside the averaged trial set.
        let mut artifact_rng = ChaCha8Rng::seed_from_u64(zone_seed ^ ARTIFACT_STREAM);
        for (asset_ref, probs) in zone.asset_refs.iter().zip(&recovery_probs) {
            let trajectory = simulator.simulate(probs, approach, &mut artifact_rng);
            sink.write_building_trajectory(&zone.zone_id, asset_ref, &trajectory)?;
        }

        self.phase = ZonePhase::Done;
        Ok(ZoneOutcome::Completed(ZoneRecoveryCurve {
            zone_id: zone.zone_id.clone(),
            values,
        }))
    }
}

/// Stable per-zone RNG seed so zone order cannot change zone results.
fn derive_zone_seed(seed: u64, zone_id: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    seed.hash(&mut hasher);
    zone_id.hash(&mut hasher);
    hasher.finish()
}
