//! Per-run phase tracking and long-running EMA timing statistics.
//!
//! Every generation registers a run keyed by `series:address`. Phase
//! transitions stamp wall-clock nanoseconds and feed an exponential
//! moving average per phase; the averages drive percent/ETA estimates
//! for reports and persist across processes in a single metrics file
//! written atomically. Cache-hit runs and failed phases never touch the
//! averages.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dress::DalleDress;
use crate::error::Result;
use crate::fsutil;

/// Canonical generation phases, in progression order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    BasePrompts,
    EnhancePrompt,
    ImagePrep,
    ImageWait,
    ImageDownload,
    Annotate,
    Completed,
}

/// Phase progression order, terminal `completed` included.
pub const ORDERED_PHASES: [Phase; 8] = [
    Phase::Setup,
    Phase::BasePrompts,
    Phase::EnhancePrompt,
    Phase::ImagePrep,
    Phase::ImageWait,
    Phase::ImageDownload,
    Phase::Annotate,
    Phase::Completed,
];

/// Smoothing factor for the phase duration EMA.
const EMA_ALPHA: f64 = 0.2;

const METRICS_FILE: &str = "progress_phase_stats.json";
const METRICS_VERSION: &str = "v1";

/// Timing and status for one phase of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTiming {
    pub name: Phase,
    #[serde(rename = "startedNs")]
    pub started_ns: i64,
    #[serde(rename = "endedNs")]
    pub ended_ns: i64,
    pub skipped: bool,
    pub error: String,
}

impl PhaseTiming {
    fn new(name: Phase) -> Self {
        Self {
            name,
            started_ns: 0,
            ended_ns: 0,
            skipped: false,
            error: String::new(),
        }
    }
}

/// A point-in-time snapshot of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressReport {
    pub series: String,
    pub address: String,
    #[serde(rename = "currentPhase")]
    pub current_phase: Phase,
    #[serde(rename = "startedNs")]
    pub started_ns: i64,
    pub percent: f64,
    #[serde(rename = "etaSeconds")]
    pub eta_seconds: f64,
    pub done: bool,
    pub error: String,
    #[serde(rename = "cacheHit")]
    pub cache_hit: bool,
    pub phases: Vec<PhaseTiming>,
    #[serde(rename = "dalleDress")]
    pub dalle_dress: Option<DalleDress>,
    #[serde(rename = "phaseAverages")]
    pub phase_averages: HashMap<Phase, i64>,
}

/// Running average for one phase, in nanoseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseAverage {
    pub count: i64,
    #[serde(rename = "avgNs")]
    pub avg_ns: i64,
}

/// The persisted metrics file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    pub version: String,
    #[serde(rename = "phaseAverages")]
    pub phase_averages: HashMap<Phase, PhaseAverage>,
    #[serde(rename = "generationRuns")]
    pub generation_runs: i64,
    #[serde(rename = "cacheHits")]
    pub cache_hits: i64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            version: METRICS_VERSION.to_string(),
            phase_averages: HashMap::new(),
            generation_runs: 0,
            cache_hits: 0,
        }
    }
}

/// Wall-clock source, injectable so tests drive time by hand.
pub trait Clock: Send + Sync {
    fn now_ns(&self) -> i64;
}

/// The real clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ns(&self) -> i64 {
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0)
    }
}

#[derive(Debug)]
struct ProgressRun {
    series: String,
    address: String,
    phases: HashMap<Phase, PhaseTiming>,
    dress: DalleDress,
    start_ns: i64,
    current: Phase,
    done: bool,
    cache_hit: bool,
    err: String,
}

#[derive(Default)]
struct Inner {
    runs: HashMap<String, ProgressRun>,
    metrics: Metrics,
    metrics_loaded: bool,
}

/// Manages concurrent runs and the global phase averages.
///
/// Every operation is atomic under one lock; the metrics file is written
/// through a temp-file rename so readers never see a torn write.
pub struct ProgressManager {
    inner: Mutex<Inner>,
    metrics_dir: PathBuf,
    archive_runs: bool,
    clock: Box<dyn Clock>,
}

fn run_key(series: &str, address: &str) -> String {
    format!("{series}:{address}")
}

impl ProgressManager {
    pub fn new(metrics_dir: impl Into<PathBuf>, archive_runs: bool) -> Self {
        Self::with_clock(metrics_dir, archive_runs, Box::new(SystemClock))
    }

    pub fn with_clock(
        metrics_dir: impl Into<PathBuf>,
        archive_runs: bool,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            metrics_dir: metrics_dir.into(),
            archive_runs,
            clock,
        }
    }

    /// Register a run; a second call for the same key is a no-op.
    pub fn start_run(&self, series: &str, address: &str, dress: DalleDress) {
        let mut inner = self.inner.lock();
        let key = run_key(series, address);
        if inner.runs.contains_key(&key) {
            return;
        }
        let now = self.clock.now_ns();
        let mut phases = HashMap::new();
        for phase in ORDERED_PHASES {
            phases.insert(phase, PhaseTiming::new(phase));
        }
        phases.get_mut(&Phase::Setup).unwrap().started_ns = now;
        inner.runs.insert(
            key,
            ProgressRun {
                series: series.to_string(),
                address: address.to_string(),
                phases,
                dress,
                start_ns: now,
                current: Phase::Setup,
                done: false,
                cache_hit: false,
                err: String::new(),
            },
        );
    }

    /// Whether a run is currently registered for the key.
    pub fn has_run(&self, series: &str, address: &str) -> bool {
        self.inner.lock().runs.contains_key(&run_key(series, address))
    }

    /// End the current phase and start the next.
    pub fn transition(&self, series: &str, address: &str, next: Phase) {
        let now = self.clock.now_ns();
        let mut inner = self.inner.lock();
        let key = run_key(series, address);
        let Some(run) = inner.runs.get(&key) else {
            return;
        };
        if run.done {
            return;
        }
        let current = run.current;
        let mut close_current = false;
        {
            let run = inner.runs.get_mut(&key).unwrap();
            let cur = run.phases.get_mut(&current).unwrap();
            if cur.started_ns != 0 && cur.ended_ns == 0 && current != next {
                cur.ended_ns = now;
                close_current = true;
            }
            let nxt = run.phases.get_mut(&next).unwrap();
            if nxt.started_ns == 0 {
                nxt.started_ns = now;
            }
            run.current = next;
        }
        if close_current {
            self.update_average_locked(&mut inner, &key, current);
        }
    }

    /// Mark a phase skipped; skipped phases never feed the averages.
    pub fn skip(&self, series: &str, address: &str, phase: Phase) {
        let now = self.clock.now_ns();
        let mut inner = self.inner.lock();
        let Some(run) = inner.runs.get_mut(&run_key(series, address)) else {
            return;
        };
        let timing = run.phases.get_mut(&phase).unwrap();
        if timing.skipped {
            return;
        }
        timing.skipped = true;
        if timing.started_ns == 0 {
            timing.started_ns = now;
        }
        if timing.ended_ns == 0 {
            timing.ended_ns = timing.started_ns;
        }
    }

    /// Flag the run as a cache hit; counted and persisted once.
    pub fn mark_cache_hit(&self, series: &str, address: &str) {
        let mut inner = self.inner.lock();
        let Some(run) = inner.runs.get_mut(&run_key(series, address)) else {
            return;
        };
        if run.cache_hit {
            return;
        }
        run.cache_hit = true;
        self.load_metrics_locked(&mut inner);
        inner.metrics.cache_hits += 1;
        self.save_metrics_locked(&mut inner);
    }

    /// Finalize the run successfully. Idempotent.
    pub fn complete(&self, series: &str, address: &str) {
        let now = self.clock.now_ns();
        let mut inner = self.inner.lock();
        let key = run_key(series, address);
        let Some(run) = inner.runs.get(&key) else {
            return;
        };
        if run.done {
            return;
        }
        let current = run.current;
        let mut close_current = false;
        let cache_hit;
        {
            let run = inner.runs.get_mut(&key).unwrap();
            let cur = run.phases.get_mut(&current).unwrap();
            if cur.started_ns != 0 && cur.ended_ns == 0 {
                cur.ended_ns = now;
                close_current = true;
            }
            let comp = run.phases.get_mut(&Phase::Completed).unwrap();
            if comp.started_ns == 0 {
                comp.started_ns = now;
            }
            if comp.ended_ns == 0 {
                comp.ended_ns = now;
            }
            run.current = Phase::Completed;
            run.done = true;
            cache_hit = run.cache_hit;
        }
        if close_current {
            self.update_average_locked(&mut inner, &key, current);
        }
        if !cache_hit {
            self.load_metrics_locked(&mut inner);
            inner.metrics.generation_runs += 1;
            self.save_metrics_locked(&mut inner);
        }
        self.maybe_archive_locked(&mut inner, &key);
    }

    /// Finalize the run as failed; the in-flight phase closes without
    /// feeding the averages.
    pub fn fail(&self, series: &str, address: &str, err: &str) {
        let now = self.clock.now_ns();
        let mut inner = self.inner.lock();
        let key = run_key(series, address);
        let Some(run) = inner.runs.get_mut(&key) else {
            return;
        };
        if run.done {
            return;
        }
        run.err = err.to_string();
        run.done = true;
        let current = run.current;
        let cur = run.phases.get_mut(&current).unwrap();
        if cur.started_ns != 0 && cur.ended_ns == 0 {
            cur.ended_ns = now;
        }
        let comp = run.phases.get_mut(&Phase::Completed).unwrap();
        if comp.started_ns == 0 {
            comp.started_ns = now;
        }
        if comp.ended_ns == 0 {
            comp.ended_ns = now;
        }
        self.maybe_archive_locked(&mut inner, &key);
    }

    /// Mutate the run's dress under the manager lock.
    pub fn update_dress(&self, series: &str, address: &str, f: impl FnOnce(&mut DalleDress)) {
        let mut inner = self.inner.lock();
        if let Some(run) = inner.runs.get_mut(&run_key(series, address)) {
            f(&mut run.dress);
        }
    }

    /// Snapshot the run. Reading a finished run consumes it: the first
    /// caller to observe `done` removes the registry entry.
    pub fn get_report(&self, series: &str, address: &str) -> Option<ProgressReport> {
        let mut inner = self.inner.lock();
        self.load_metrics_locked(&mut inner);
        let key = run_key(series, address);
        let report = {
            let run = inner.runs.get(&key)?;
            self.build_report_locked(&inner, run)
        };
        if report.done {
            inner.runs.remove(&key);
        }
        Some(report)
    }

    /// A clone of the current metrics (tests and diagnostics).
    pub fn metrics(&self) -> Metrics {
        let mut inner = self.inner.lock();
        self.load_metrics_locked(&mut inner);
        inner.metrics.clone()
    }

    /// Force a metrics write regardless of pending changes.
    pub fn flush_metrics(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        self.load_metrics_locked(&mut inner);
        self.save_metrics_locked(&mut inner);
        Ok(())
    }

    fn build_report_locked(&self, inner: &Inner, run: &ProgressRun) -> ProgressReport {
        let phases: Vec<PhaseTiming> = ORDERED_PHASES
            .iter()
            .map(|p| run.phases[p].clone())
            .collect();
        let phase_averages: HashMap<Phase, i64> = inner
            .metrics
            .phase_averages
            .iter()
            .filter(|(_, avg)| avg.count > 0)
            .map(|(phase, avg)| (*phase, avg.avg_ns))
            .collect();
        let (percent, eta_seconds) = self.percent_eta_locked(inner, run);
        ProgressReport {
            series: run.series.clone(),
            address: run.address.clone(),
            current_phase: run.current,
            started_ns: run.start_ns,
            percent,
            eta_seconds,
            done: run.done,
            error: run.err.clone(),
            cache_hit: run.cache_hit,
            phases,
            dalle_dress: Some(run.dress.clone()),
            phase_averages,
        }
    }

    /// Percent and ETA from the phase averages: past phases contribute
    /// their average, the current phase its capped elapsed time.
    fn percent_eta_locked(&self, inner: &Inner, run: &ProgressRun) -> (f64, f64) {
        let avg_of = |phase: Phase| -> i64 {
            inner
                .metrics
                .phase_averages
                .get(&phase)
                .filter(|a| a.count > 0)
                .map(|a| a.avg_ns)
                .unwrap_or(0)
        };
        let total: i64 = ORDERED_PHASES
            .iter()
            .filter(|p| **p != Phase::Completed)
            .map(|p| avg_of(*p))
            .sum();
        if total == 0 {
            return (0.0, 0.0);
        }
        let now = self.clock.now_ns();
        let mut done: i64 = 0;
        for phase in ORDERED_PHASES {
            if phase == Phase::Completed {
                continue;
            }
            let timing = &run.phases[&phase];
            let avg = avg_of(phase);
            if phase == run.current {
                let mut elapsed = if timing.started_ns > 0 {
                    now - timing.started_ns
                } else {
                    0
                };
                if avg > 0 && elapsed > avg {
                    elapsed = avg;
                }
                done += elapsed;
                break;
            }
            if timing.ended_ns > 0 && avg > 0 {
                done += avg;
            }
        }
        let percent = done as f64 / total as f64 * 100.0;
        let remaining = (total - done).max(0);
        (percent, remaining as f64 / 1_000_000_000.0)
    }

    /// EMA update for a finished phase, skipped for cache hits, failed
    /// runs, skipped phases and non-positive durations.
    fn update_average_locked(&self, inner: &mut Inner, key: &str, phase: Phase) {
        let Some(run) = inner.runs.get(key) else {
            return;
        };
        let timing = &run.phases[&phase];
        if run.cache_hit
            || !run.err.is_empty()
            || timing.skipped
            || timing.started_ns == 0
            || timing.ended_ns == 0
        {
            return;
        }
        let dur = timing.ended_ns - timing.started_ns;
        if dur <= 0 {
            return;
        }
        self.load_metrics_locked(inner);
        let rec = inner.metrics.phase_averages.entry(phase).or_default();
        if rec.count == 0 {
            rec.count = 1;
            rec.avg_ns = dur;
        } else {
            rec.avg_ns = (dur as f64 * EMA_ALPHA + rec.avg_ns as f64 * (1.0 - EMA_ALPHA)) as i64;
            rec.count += 1;
        }
        self.save_metrics_locked(inner);
    }

    fn metrics_path(&self) -> PathBuf {
        self.metrics_dir.join(METRICS_FILE)
    }

    fn load_metrics_locked(&self, inner: &mut Inner) {
        if inner.metrics_loaded {
            return;
        }
        inner.metrics_loaded = true;
        let Ok(bytes) = std::fs::read(self.metrics_path()) else {
            return;
        };
        match serde_json::from_slice::<Metrics>(&bytes) {
            Ok(metrics) if metrics.version == METRICS_VERSION => inner.metrics = metrics,
            Ok(_) | Err(_) => {
                warn!(file = %self.metrics_path().display(), "ignoring unreadable metrics file");
            }
        }
    }

    fn save_metrics_locked(&self, inner: &mut Inner) {
        let Ok(json) = serde_json::to_vec_pretty(&inner.metrics) else {
            return;
        };
        if let Err(err) = fsutil::write_atomic(&self.metrics_path(), &json) {
            warn!(error = %err, "could not persist metrics");
        }
    }

    /// Archive a finished run's report when the flag is set.
    fn maybe_archive_locked(&self, inner: &mut Inner, key: &str) {
        if !self.archive_runs {
            return;
        }
        let Some(run) = inner.runs.get(key) else {
            return;
        };
        if !run.done {
            return;
        }
        let report = self.build_report_locked(inner, run);
        let dir = self.metrics_dir.join("runs");
        if std::fs::create_dir_all(&dir).is_err() {
            return;
        }
        let name = format!(
            "{}_{}_{}.json",
            report.series,
            report.address,
            chrono::Utc::now().timestamp()
        );
        if let Ok(json) = serde_json::to_vec_pretty(&report) {
            let _ = std::fs::write(dir.join(name), json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicI64, Ordering};
    use tempfile::TempDir;

    /// Clock the tests advance by hand.
    struct ManualClock(Arc<AtomicI64>);

    impl Clock for ManualClock {
        fn now_ns(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn manager(tmp: &TempDir) -> (ProgressManager, Arc<AtomicI64>) {
        let time = Arc::new(AtomicI64::new(1_000));
        let mgr = ProgressManager::with_clock(
            tmp.path().join("metrics"),
            false,
            Box::new(ManualClock(time.clone())),
        );
        (mgr, time)
    }

    fn advance(time: &AtomicI64, ns: i64) {
        time.fetch_add(ns, Ordering::SeqCst);
    }

    #[test]
    fn start_run_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let (mgr, time) = manager(&tmp);
        mgr.start_run("s", "a", DalleDress::default());
        advance(&time, 50);
        mgr.start_run("s", "a", DalleDress::default());
        let report = mgr.get_report("s", "a").unwrap();
        assert_eq!(report.started_ns, 1_000);
        assert_eq!(report.current_phase, Phase::Setup);
    }

    #[test]
    fn phases_end_in_canonical_order() {
        let tmp = TempDir::new().unwrap();
        let (mgr, time) = manager(&tmp);
        mgr.start_run("s", "a", DalleDress::default());
        for phase in &ORDERED_PHASES[1..7] {
            advance(&time, 100);
            mgr.transition("s", "a", *phase);
        }
        advance(&time, 100);
        mgr.complete("s", "a");
        let report = mgr.get_report("s", "a").unwrap();
        assert!(report.done);
        let ends: Vec<i64> = report.phases.iter().map(|p| p.ended_ns).collect();
        for pair in ends.windows(2) {
            assert!(pair[0] <= pair[1], "ends not ordered: {ends:?}");
        }
        assert!(report.phases[7].ended_ns != 0);
    }

    #[test]
    fn ema_seeds_then_converges() {
        let tmp = TempDir::new().unwrap();
        let (mgr, time) = manager(&tmp);
        // Two identical runs with a 100ns base_prompts phase.
        for run in 0..5 {
            let addr = format!("0x{run}");
            mgr.start_run("s", &addr, DalleDress::default());
            advance(&time, 100);
            mgr.transition("s", &addr, Phase::BasePrompts);
            advance(&time, 100);
            mgr.complete("s", &addr);
            let _ = mgr.get_report("s", &addr);
        }
        let metrics = mgr.metrics();
        let setup = &metrics.phase_averages[&Phase::Setup];
        assert_eq!(setup.count, 5);
        assert_eq!(setup.avg_ns, 100);
        assert_eq!(metrics.generation_runs, 5);
    }

    #[test]
    fn ema_moves_toward_new_durations() {
        let tmp = TempDir::new().unwrap();
        let (mgr, time) = manager(&tmp);
        mgr.start_run("s", "a", DalleDress::default());
        advance(&time, 100);
        mgr.transition("s", "a", Phase::BasePrompts);
        mgr.complete("s", "a");
        let _ = mgr.get_report("s", "a");

        mgr.start_run("s", "b", DalleDress::default());
        advance(&time, 200);
        mgr.transition("s", "b", Phase::BasePrompts);
        mgr.complete("s", "b");
        let _ = mgr.get_report("s", "b");

        let avg = mgr.metrics().phase_averages[&Phase::Setup].clone();
        // 0.2*200 + 0.8*100 = 120
        assert_eq!(avg.avg_ns, 120);
        assert_eq!(avg.count, 2);
    }

    #[test]
    fn cache_hit_runs_never_touch_averages() {
        let tmp = TempDir::new().unwrap();
        let (mgr, time) = manager(&tmp);
        mgr.start_run("s", "a", DalleDress::default());
        mgr.mark_cache_hit("s", "a");
        advance(&time, 500);
        mgr.transition("s", "a", Phase::BasePrompts);
        advance(&time, 500);
        mgr.complete("s", "a");
        let metrics = mgr.metrics();
        assert!(metrics.phase_averages.is_empty());
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.generation_runs, 0);
        let report = mgr.get_report("s", "a").unwrap();
        assert!(report.cache_hit);
        assert!(report.done);
    }

    #[test]
    fn failed_runs_never_touch_averages() {
        let tmp = TempDir::new().unwrap();
        let (mgr, time) = manager(&tmp);
        mgr.start_run("s", "a", DalleDress::default());
        advance(&time, 100);
        mgr.transition("s", "a", Phase::BasePrompts);
        advance(&time, 100);
        mgr.fail("s", "a", "provider exploded");
        let report = mgr.get_report("s", "a").unwrap();
        assert!(report.done);
        assert_eq!(report.error, "provider exploded");
        assert!(report.phases[7].ended_ns != 0);
        // setup closed via transition before the failure, so it counts;
        // the in-flight base_prompts phase must not.
        let metrics = mgr.metrics();
        assert!(!metrics.phase_averages.contains_key(&Phase::BasePrompts));
        assert_eq!(metrics.generation_runs, 0);
    }

    #[test]
    fn skip_stamps_without_averaging() {
        let tmp = TempDir::new().unwrap();
        let (mgr, _time) = manager(&tmp);
        mgr.start_run("s", "a", DalleDress::default());
        mgr.skip("s", "a", Phase::EnhancePrompt);
        mgr.complete("s", "a");
        let report = mgr.get_report("s", "a").unwrap();
        let enhance = &report.phases[2];
        assert!(enhance.skipped);
        assert_eq!(enhance.started_ns, enhance.ended_ns);
        assert!(!mgr.metrics().phase_averages.contains_key(&Phase::EnhancePrompt));
    }

    #[test]
    fn complete_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let (mgr, time) = manager(&tmp);
        mgr.start_run("s", "a", DalleDress::default());
        advance(&time, 100);
        mgr.complete("s", "a");
        mgr.complete("s", "a");
        assert_eq!(mgr.metrics().generation_runs, 1);
    }

    #[test]
    fn report_consumes_done_runs_only() {
        let tmp = TempDir::new().unwrap();
        let (mgr, _time) = manager(&tmp);
        mgr.start_run("s", "a", DalleDress::default());
        assert!(mgr.get_report("s", "a").is_some());
        assert!(mgr.get_report("s", "a").is_some());
        mgr.complete("s", "a");
        assert!(mgr.get_report("s", "a").unwrap().done);
        assert!(mgr.get_report("s", "a").is_none());
    }

    #[test]
    fn percent_and_eta_walk_the_averages() {
        let tmp = TempDir::new().unwrap();
        let (mgr, time) = manager(&tmp);
        // Seed averages with one clean run: setup=100, base_prompts=300.
        mgr.start_run("s", "seed", DalleDress::default());
        advance(&time, 100);
        mgr.transition("s", "seed", Phase::BasePrompts);
        advance(&time, 300);
        mgr.complete("s", "seed");
        let _ = mgr.get_report("s", "seed");

        // New run: setup finished, base_prompts half elapsed.
        mgr.start_run("s", "live", DalleDress::default());
        advance(&time, 100);
        mgr.transition("s", "live", Phase::BasePrompts);
        advance(&time, 150);
        let report = mgr.get_report("s", "live").unwrap();
        // total = 400; done = 100 (setup avg) + 150 (elapsed) = 250
        assert!((report.percent - 62.5).abs() < 0.01);
        assert!((report.eta_seconds - 150.0 / 1e9).abs() < 1e-12);
    }

    #[test]
    fn percent_zero_without_averages() {
        let tmp = TempDir::new().unwrap();
        let (mgr, _time) = manager(&tmp);
        mgr.start_run("s", "a", DalleDress::default());
        let report = mgr.get_report("s", "a").unwrap();
        assert_eq!(report.percent, 0.0);
        assert_eq!(report.eta_seconds, 0.0);
    }

    #[test]
    fn metrics_file_is_complete_json() {
        let tmp = TempDir::new().unwrap();
        let (mgr, time) = manager(&tmp);
        mgr.start_run("s", "a", DalleDress::default());
        advance(&time, 100);
        mgr.complete("s", "a");
        let path = tmp.path().join("metrics").join(METRICS_FILE);
        let metrics: Metrics =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(metrics.version, "v1");
        assert_eq!(metrics.generation_runs, 1);
        // No temp file left behind.
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(".tmp")
            })
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn archive_writes_run_snapshots() {
        let tmp = TempDir::new().unwrap();
        let time = Arc::new(AtomicI64::new(1_000));
        let mgr = ProgressManager::with_clock(
            tmp.path().join("metrics"),
            true,
            Box::new(ManualClock(time.clone())),
        );
        mgr.start_run("s", "0xaa", DalleDress::default());
        advance(&time, 100);
        mgr.complete("s", "0xaa");
        let entries: Vec<_> = std::fs::read_dir(tmp.path().join("metrics/runs"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].starts_with("s_0xaa_"));
    }

    #[test]
    fn report_wire_names_are_exact() {
        let tmp = TempDir::new().unwrap();
        let (mgr, _time) = manager(&tmp);
        mgr.start_run("s", "a", DalleDress::default());
        let report = mgr.get_report("s", "a").unwrap();
        let json = serde_json::to_value(&report).unwrap();
        let obj = json.as_object().unwrap();
        for key in [
            "series",
            "address",
            "currentPhase",
            "startedNs",
            "percent",
            "etaSeconds",
            "done",
            "error",
            "cacheHit",
            "phases",
            "dalleDress",
            "phaseAverages",
        ] {
            assert!(obj.contains_key(key), "missing report key {key}");
        }
        let phase = &json["phases"][0];
        for key in ["name", "startedNs", "endedNs", "skipped", "error"] {
            assert!(phase.get(key).is_some(), "missing phase key {key}");
        }
        assert_eq!(json["phases"][0]["name"], "setup");
        assert_eq!(json["phases"][1]["name"], "base_prompts");
    }
}
