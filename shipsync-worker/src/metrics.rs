use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use shipsync_order::{RunObserver, RunReport, SchedulerError};

/// Prometheus metrics for sync runs, fed by the scheduler's observer hook.
pub struct SyncMetrics {
    registry: Registry,

    pub runs_total: IntCounter,
    pub run_failures_total: IntCounter,
    pub run_duration_seconds: Histogram,

    /// Per-order outcomes: updated, unchanged, failed, skipped
    pub orders_total: IntCounterVec,
    /// credited, failed, retried, retry_failed
    pub settlements_total: IntCounterVec,

    pub last_run_candidates: IntGauge,
    pub last_run_finished_seconds: IntGauge,
}

impl SyncMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("shipsync".to_string()), None)?;

        let runs_total = IntCounter::new("sync_runs_total", "Completed sync runs")?;
        registry.register(Box::new(runs_total.clone()))?;

        let run_failures_total = IntCounter::new(
            "sync_run_failures_total",
            "Sync runs aborted before processing any order",
        )?;
        registry.register(Box::new(run_failures_total.clone()))?;

        let run_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("sync_run_duration_seconds", "Wall time of a sync run")
                .buckets(vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        )?;
        registry.register(Box::new(run_duration_seconds.clone()))?;

        let orders_total = IntCounterVec::new(
            Opts::new("sync_orders_total", "Orders reconciled, by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(orders_total.clone()))?;

        let settlements_total = IntCounterVec::new(
            Opts::new("settlements_total", "Seller settlement attempts, by result"),
            &["result"],
        )?;
        registry.register(Box::new(settlements_total.clone()))?;

        let last_run_candidates =
            IntGauge::new("sync_last_run_candidates", "Candidates in the last run")?;
        registry.register(Box::new(last_run_candidates.clone()))?;

        let last_run_finished_seconds = IntGauge::new(
            "sync_last_run_finished_seconds",
            "Unix time the last run finished",
        )?;
        registry.register(Box::new(last_run_finished_seconds.clone()))?;

        Ok(Self {
            registry,
            runs_total,
            run_failures_total,
            run_duration_seconds,
            orders_total,
            settlements_total,
            last_run_candidates,
            last_run_finished_seconds,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

fn as_u64(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

impl RunObserver for SyncMetrics {
    fn on_run_completed(&self, report: &RunReport) {
        self.runs_total.inc();
        let elapsed_ms = (report.finished_at - report.started_at).num_milliseconds().max(0);
        let elapsed = elapsed_ms as f64 / 1000.0;
        self.run_duration_seconds.observe(elapsed);

        for (outcome, count) in [
            ("updated", report.updated),
            ("unchanged", report.unchanged),
            ("failed", report.failed),
            ("skipped", report.skipped),
        ] {
            self.orders_total.with_label_values(&[outcome]).inc_by(as_u64(count));
        }

        let retried_ok = report.settlement_retries.saturating_sub(report.settlement_retry_failures);
        for (result, count) in [
            ("credited", report.credited.saturating_sub(retried_ok)),
            ("failed", report.settlement_failures),
            ("retried", retried_ok),
            ("retry_failed", report.settlement_retry_failures),
        ] {
            self.settlements_total.with_label_values(&[result]).inc_by(as_u64(count));
        }

        self.last_run_candidates.set(report.candidates as i64);
        self.last_run_finished_seconds.set(report.finished_at.timestamp());
    }

    fn on_run_failed(&self, _error: &SchedulerError) {
        self.run_failures_total.inc();
    }
}
