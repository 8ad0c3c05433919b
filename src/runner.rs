//! Thin run orchestration: configuration loading, the zone loop, artifact
//! writing, progress reporting and cooperative cancellation. This is the seam
//! where the hosting application attaches.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::building::Approach;
use crate::input::{AssetRecord, RecoveryInputs};
use crate::timeline::DAYS_BEFORE_EVENT;
use crate::zone::{group_by_zone, ZoneAggregator, ZoneOutcome, ZoneRecoveryCurve};

/// Where finished curves and per-building trajectories go.
pub trait ArtifactSink {
    fn write_zone_curve(&mut self, curve: &ZoneRecoveryCurve) -> Result<()>;

    fn write_building_trajectory(
        &mut self,
        zone_id: &str,
        asset_ref: &str,
        trajectory: &[f64],
    ) -> Result<()>;

    /// Plot rendering hook. Plotting is an external collaborator, so the
    /// default does nothing.
    fn plot_zone_curve(&mut self, _curve: &ZoneRecoveryCurve) -> Result<()> {
        Ok(())
    }
}

/// Discards everything; for dry runs and tests.
#[derive(Debug, Default)]
pub struct NullSink;

impl ArtifactSink for NullSink {
    fn write_zone_curve(&mut self, _curve: &ZoneRecoveryCurve) -> Result<()> {
        Ok(())
    }

    fn write_building_trajectory(
        &mut self,
        _zone_id: &str,
        _asset_ref: &str,
        _trajectory: &[f64],
    ) -> Result<()> {
        Ok(())
    }
}

/// Writes artifacts under an output directory:
/// `recovery_function_zone_<id>.txt` per zone, plus
/// `by_building/zone_<z>_bldg_<a>.txt` per asset.
pub struct DirSink {
    root: PathBuf,
}

impl DirSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ArtifactSink for DirSink {
    fn write_zone_curve(&mut self, curve: &ZoneRecoveryCurve) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("cannot create {}", self.root.display()))?;
        let path = self
            .root
            .join(format!("recovery_function_zone_{}.txt", curve.zone_id));
        write_series(&path, &curve.values)
    }

    fn write_building_trajectory(
        &mut self,
        zone_id: &str,
        asset_ref: &str,
        trajectory: &[f64],
    ) -> Result<()> {
        let dir = self.root.join("by_building");
        fs::create_dir_all(&dir).with_context(|| format!("cannot create {}", dir.display()))?;
        let path = dir.join(format!("zone_{zone_id}_bldg_{asset_ref}.txt"));
        write_series(&path, trajectory)
    }
}

fn write_series(path: &Path, values: &[f64]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for value in values {
        writeln!(writer, "{value}")
            .with_context(|| format!("cannot write {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("cannot write {}", path.display()))
}

/// Snapshot of run progress, reported between zones.
#[derive(Debug, Clone)]
pub struct RunProgress {
    pub zones_done: usize,
    pub zones_total: usize,
    /// Percentage complete (0-100).
    pub percent: f64,
    /// Zone about to be processed, `None` once the loop has finished.
    pub current_zone: Option<String>,
}

pub trait ProgressReporter {
    fn report(&mut self, progress: &RunProgress);
}

/// Reporter that does nothing.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&mut self, _progress: &RunProgress) {}
}

/// Reporter backed by a closure.
pub struct FnProgress<F>(pub F);

impl<F> ProgressReporter for FnProgress<F>
where
    F: FnMut(&RunProgress),
{
    fn report(&mut self, progress: &RunProgress) {
        (self.0)(progress);
    }
}

/// Cooperative cancellation flag, checked between zones only; a zone in
/// flight always runs to completion and its outputs stay on disk.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Run configuration. The pre-event window is an explicit parameter rather
/// than a process-wide global.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input_data_dir: PathBuf,
    pub approach: Approach,
    /// Group assets by the socio-economic layer's zone field; without it the
    /// whole portfolio forms a single zone.
    pub integrate_svi: bool,
    pub seed: u64,
    pub days_before_event: usize,
}

impl RunConfig {
    pub fn new(input_data_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_data_dir: input_data_dir.into(),
            approach: Approach::Aggregate,
            integrate_svi: true,
            seed: 42,
            days_before_event: DAYS_BEFORE_EVENT,
        }
    }
}

/// Per-run report: which zones completed and which were skipped (with the
/// reason), plus whether the run was cancelled early.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub completed: Vec<String>,
    pub skipped: Vec<(String, String)>,
    pub cancelled: bool,
}

/// Drives the whole run: one configuration load up front (fatal on error,
/// before any zone), then the strictly sequential zone loop.
pub struct SimulationRunner {
    config: RunConfig,
    cancel: CancelToken,
}

impl SimulationRunner {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Handle the caller can use to abort the run between zones.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn run(
        &self,
        records: Vec<AssetRecord>,
        sink: &mut dyn ArtifactSink,
        reporter: &mut dyn ProgressReporter,
    ) -> Result<RunSummary> {
        let inputs = RecoveryInputs::load(&self.config.input_data_dir).with_context(|| {
            format!(
                "loading recovery configuration from {}",
                self.config.input_data_dir.display()
            )
        })?;

        let zones = group_by_zone(records, self.config.integrate_svi);
        let total = zones.len();
        info!(
            zones = total,
            approach = %self.config.approach,
            simulations = inputs.num_simulations,
            "starting recovery run"
        );

        let mut summary = RunSummary::default();
        let mut aggregator = ZoneAggregator::new(
            self.config.approach,
            self.config.days_before_event,
            self.config.seed,
        );

        for (idx, zone) in zones.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(zones_done = idx, "run cancelled between zones");
                summary.cancelled = true;
                break;
            }
            reporter.report(&RunProgress {
                zones_done: idx,
                zones_total: total,
                percent: percent(idx, total),
                current_zone: Some(zone.zone_id.clone()),
            });

            match aggregator.process_zone(zone, &inputs, sink) {
                Ok(ZoneOutcome::Completed(curve)) => {
                    sink.write_zone_curve(&curve)?;
                    sink.plot_zone_curve(&curve)?;
                    summary.completed.push(zone.zone_id.clone());
                }
                Ok(ZoneOutcome::Skipped { zone_id, reason }) => {
                    summary.skipped.push((zone_id, reason));
                }
                Err(err) => {
                    // Per-zone failures are a zone status; the run goes on and
                    // already-written outputs stay on disk.
                    warn!(zone = %zone.zone_id, error = %format!("{err:#}"), "zone failed");
                    summary.skipped.push((zone.zone_id.clone(), format!("{err:#}")));
                }
            }
        }

        let done = summary.completed.len() + summary.skipped.len();
        reporter.report(&RunProgress {
            zones_done: done,
            zones_total: total,
            percent: percent(done, total),
            current_zone: None,
        });
        info!(
            completed = summary.completed.len(),
            skipped = summary.skipped.len(),
            cancelled = summary.cancelled,
            "recovery run finished"
        );
        Ok(summary)
    }
}

fn percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        done as f64 / total as f64 * 100.0
    }
}
