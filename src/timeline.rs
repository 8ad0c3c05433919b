use anyhow::Result;

use crate::input::DelayTables;

/// Pre-event stable baseline window prepended to every zone curve, in days.
/// The timeline bound also carries an equal post-event buffer.
pub const DAYS_BEFORE_EVENT: usize = 200;

/// Socio-economic vulnerability weighting coefficient.
///
/// Read by the recovery model but not applied anywhere yet; the intended
/// weighting formula is an open domain question. Kept as a named constant so
/// a future [`SviAdjustment`] implementation has a documented default.
pub const SVI_WEIGHT_COEFF: f64 = 1.0;

/// Extension point for socio-economic adjustment of the recovery timeline.
///
/// The default implementation is a no-op: no validated weighting formula
/// exists, and guessing one would silently change published curves.
pub trait SviAdjustment {
    /// Returns the (possibly adjusted) timeline bound for a zone with the
    /// given vulnerability index value.
    fn adjust_max_time(&self, max_time: usize, _svi_value: Option<f64>) -> usize {
        max_time
    }
}

/// Default adjustment: none.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSviAdjustment;

impl SviAdjustment for NoSviAdjustment {}

/// Empirical lead-time correction: delays grow linearly with the fraction of
/// collapsed/irreparable buildings in the zone.
///
/// Monotonically non-decreasing on [0, 1]; 0.5 at fraction 0.
pub fn lead_time_factor(fraction_collapsed_and_irreparable: f64) -> f64 {
    0.5 * (2.31 + 0.22 * fraction_collapsed_and_irreparable * 100.0) / 2.31
}

/// Discrete day-indexed timeline `0..len`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline {
    num_days: usize,
}

impl Timeline {
    pub fn new(num_days: usize) -> Self {
        Self { num_days }
    }

    pub fn len(&self) -> usize {
        self.num_days
    }

    pub fn is_empty(&self) -> bool {
        self.num_days == 0
    }
}

/// Per-zone timeline plan: the lead-time factor, the timeline bound, and
/// freshly scaled delay tables.
#[derive(Debug, Clone)]
pub struct TimelinePlan {
    pub factor: f64,
    pub timeline: Timeline,
    /// Scaled copies of the input tables. Inspection, assessment and
    /// mobilization are multiplied by `factor`; repair and recovery keep the
    /// raw observations (intentional asymmetry in the domain model).
    pub tables: DelayTables,
}

/// Derives the timeline and adjusted delay tables for one zone.
///
/// The timeline bound is computed from the raw (unscaled) table maxima plus
/// twice the pre-event offset, so it does not vary with the zone's collapse
/// severity. The input tables are not mutated; callers can reuse them across
/// zones without compounding the scaling.
pub fn plan_timeline(
    raw: &DelayTables,
    fraction_collapsed_and_irreparable: f64,
    days_before_event: usize,
) -> Result<TimelinePlan> {
    let max_inspection = table_max(&raw.inspection, "inspection")?;
    let max_assessment = table_max(&raw.assessment, "assessment")?;
    let max_mobilization = table_max(&raw.mobilization, "mobilization")?;
    let max_repair = table_max(&raw.repair, "repair")?;

    let max_time = max_inspection.floor() as usize
        + max_assessment.floor() as usize
        + max_mobilization.floor() as usize
        + max_repair.floor() as usize
        + 2 * days_before_event;

    let factor = lead_time_factor(fraction_collapsed_and_irreparable);
    let mut tables = raw.clone();
    for value in tables
        .inspection
        .iter_mut()
        .chain(tables.assessment.iter_mut())
        .chain(tables.mobilization.iter_mut())
    {
        *value *= factor;
    }

    Ok(TimelinePlan {
        factor,
        timeline: Timeline::new(max_time),
        tables,
    })
}

fn table_max(values: &[f64], name: &str) -> Result<f64> {
    anyhow::ensure!(!values.is_empty(), "{name} delay table is empty");
    Ok(values.iter().cloned().fold(f64::NEG_INFINITY, f64::max))
}
