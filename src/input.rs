//! Configuration-file and asset-table loading.
//!
//! All parsers work on string content so they can be tested without touching
//! the filesystem; thin `load` wrappers attach file paths via error context.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::error::ShapeError;
use crate::states::LossProbs;
use crate::transfer::TransferMatrix;

pub const INSPECTION_TIMES_FILE: &str = "InspectionTimes.txt";
pub const ASSESSMENT_TIMES_FILE: &str = "AssessmentTimes.txt";
pub const MOBILIZATION_TIMES_FILE: &str = "MobilizationTimes.txt";
pub const REPAIR_TIMES_FILE: &str = "RepairTimes.txt";
pub const RECOVERY_TIMES_FILE: &str = "RecoveryTimes.txt";
pub const LEAD_TIME_DISPERSION_FILE: &str = "LeadTimeDispersion.txt";
pub const REPAIR_TIME_DISPERSION_FILE: &str = "RepairTimeDispersion.txt";
pub const NUM_SIMULATIONS_FILE: &str = "NumberOfDamageSimulations.txt";
pub const TRANSFER_PROBABILITIES_FILE: &str = "transferProbabilities.csv";

/// Empirical delay observation tables, one value per observation, in days.
///
/// Loading always returns fresh allocations, so per-zone lead-time scaling
/// can never compound across zones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DelayTables {
    pub inspection: Vec<f64>,
    pub assessment: Vec<f64>,
    pub mobilization: Vec<f64>,
    pub repair: Vec<f64>,
    pub recovery: Vec<f64>,
}

impl DelayTables {
    /// Reads the five delay tables from `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        Ok(Self {
            inspection: read_numeric_file(dir, INSPECTION_TIMES_FILE)?,
            assessment: read_numeric_file(dir, ASSESSMENT_TIMES_FILE)?,
            mobilization: read_numeric_file(dir, MOBILIZATION_TIMES_FILE)?,
            repair: read_numeric_file(dir, REPAIR_TIMES_FILE)?,
            recovery: read_numeric_file(dir, RECOVERY_TIMES_FILE)?,
        })
    }
}

/// Lognormal dispersion (scale) parameters for delay sampling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dispersions {
    /// Applied to inspection, assessment and mobilization delays.
    pub lead_time: f64,
    /// Applied to repair and reconstruction delays.
    pub repair_time: f64,
}

/// Everything the simulation reads from the input-data directory.
#[derive(Debug, Clone)]
pub struct RecoveryInputs {
    pub tables: DelayTables,
    pub dispersions: Dispersions,
    pub num_simulations: usize,
    pub transfer: TransferMatrix,
}

impl RecoveryInputs {
    /// Loads and validates the whole configuration.
    ///
    /// Any missing or malformed file is fatal here, before any zone is
    /// processed.
    pub fn load(dir: &Path) -> Result<Self> {
        let tables = DelayTables::load(dir)?;
        for (name, table) in [
            (INSPECTION_TIMES_FILE, &tables.inspection),
            (ASSESSMENT_TIMES_FILE, &tables.assessment),
            (MOBILIZATION_TIMES_FILE, &tables.mobilization),
            (REPAIR_TIMES_FILE, &tables.repair),
            (RECOVERY_TIMES_FILE, &tables.recovery),
        ] {
            anyhow::ensure!(!table.is_empty(), "{name} contains no observations");
        }

        let lead_time = read_scalar_file(dir, LEAD_TIME_DISPERSION_FILE)?;
        let repair_time = read_scalar_file(dir, REPAIR_TIME_DISPERSION_FILE)?;
        anyhow::ensure!(
            lead_time >= 0.0 && repair_time >= 0.0,
            "dispersion values must be non-negative (lead={lead_time}, repair={repair_time})"
        );

        let num_simulations = read_scalar_file(dir, NUM_SIMULATIONS_FILE)? as usize;
        anyhow::ensure!(
            num_simulations >= 1,
            "{NUM_SIMULATIONS_FILE} must request at least one simulation"
        );

        let transfer_path = dir.join(TRANSFER_PROBABILITIES_FILE);
        let content = fs::read_to_string(&transfer_path)
            .with_context(|| format!("cannot read {}", transfer_path.display()))?;
        let transfer = TransferMatrix::from_csv(&content)
            .with_context(|| format!("parsing {}", transfer_path.display()))?;

        Ok(Self {
            tables,
            dispersions: Dispersions {
                lead_time,
                repair_time,
            },
            num_simulations,
            transfer,
        })
    }
}

/// Parses a newline/whitespace-delimited list of numbers.
pub fn parse_numeric_list(content: &str, name: &str) -> Result<Vec<f64>> {
    let mut values = Vec::new();
    for token in content.split_whitespace() {
        let value: f64 = token
            .parse()
            .with_context(|| format!("invalid number {token:?} in {name}"))?;
        values.push(value);
    }
    Ok(values)
}

fn read_numeric_file(dir: &Path, name: &str) -> Result<Vec<f64>> {
    let path = dir.join(name);
    let content =
        fs::read_to_string(&path).with_context(|| format!("cannot read {}", path.display()))?;
    parse_numeric_list(&content, name)
}

/// Reads the first value of a numeric file (remaining values are ignored).
fn read_scalar_file(dir: &Path, name: &str) -> Result<f64> {
    let values = read_numeric_file(dir, name)?;
    values
        .first()
        .copied()
        .with_context(|| format!("{name} is empty"))
}

/// One row of the damage-by-asset table fed in by the map layer.
///
/// A row with the wrong number of probability columns is still a record: the
/// shape failure travels with it so zone grouping can skip the containing
/// zone while every other zone keeps running.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetRecord {
    pub asset_ref: String,
    /// Zone membership, when the socio-economic layer joined one in.
    pub zone_id: Option<String>,
    pub loss_probs: Result<LossProbs, ShapeError>,
}

/// Parses a damage-by-asset CSV export.
///
/// Expected columns: asset_ref, taxonomy, then alternating (mean, stddev)
/// pairs for the five loss-based damage states. Only the means are used.
/// When `has_zone_field` is set, the final column carries the zone id joined
/// from the socio-economic layer.
///
/// Structurally broken rows (too few fields to name an asset, unparseable
/// numbers) are configuration errors and fail the whole parse; a row with a
/// wrong-length probability vector parses into a record carrying its
/// [`ShapeError`].
pub fn parse_dmg_by_asset_csv(content: &str, has_zone_field: bool) -> Result<Vec<AssetRecord>> {
    let mut lines = content.lines();
    lines.next().context("damage-by-asset table is empty")?;

    let mut records = Vec::new();
    for (idx, line) in lines.enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let record = parse_asset_row(&fields, has_zone_field)
            .with_context(|| format!("damage-by-asset row {}", idx + 2))?;
        records.push(record);
    }
    Ok(records)
}

fn parse_asset_row(fields: &[&str], has_zone_field: bool) -> Result<AssetRecord> {
    anyhow::ensure!(
        fields.len() > 2,
        "expected asset_ref, taxonomy and probability columns, got {} fields",
        fields.len()
    );
    let asset_ref = fields[0].to_string();
    let zone_id = if has_zone_field {
        fields.last().map(|z| z.to_string())
    } else {
        None
    };

    // Skip asset_ref and taxonomy, drop the trailing zone id if present, then
    // keep every second remaining field (the means, discarding the stddevs).
    let value_fields = if has_zone_field {
        &fields[2..fields.len() - 1]
    } else {
        &fields[2..]
    };
    let mut means = Vec::with_capacity(value_fields.len() / 2 + 1);
    for token in value_fields.iter().step_by(2) {
        let value: f64 = token
            .parse()
            .with_context(|| format!("invalid probability {token:?} for asset {asset_ref}"))?;
        means.push(value);
    }

    let loss_probs = LossProbs::from_slice(&means)
        .map_err(|err| ShapeError::new(format!("asset {asset_ref}"), err.expected, err.got));
    Ok(AssetRecord {
        asset_ref,
        zone_id,
        loss_probs,
    })
}
