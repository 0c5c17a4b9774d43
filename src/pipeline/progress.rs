// file: src/pipeline/progress.rs
// description: ingest statistics and progress reporting
// reference: uses indicatif for progress bars and atomic counters for stats

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Totals for a run of record events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub upserted: usize,
    pub deleted: usize,
    /// Events rejected by normalization or superseded within a bulk load
    pub skipped: usize,
    /// Events that still failed after retries
    pub failed: usize,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> usize {
        self.upserted + self.deleted + self.skipped + self.failed
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        ((self.upserted + self.deleted) as f64 / total as f64) * 100.0
    }
}

/// Lock-free counters shared between ingest tasks.
#[derive(Debug, Default)]
pub struct IngestCounters {
    upserted: AtomicUsize,
    deleted: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

impl IngestCounters {
    pub fn record(&self, outcome: EventOutcome) {
        let counter = match outcome {
            EventOutcome::Upserted => &self.upserted,
            EventOutcome::Deleted => &self.deleted,
            EventOutcome::Skipped => &self.skipped,
            EventOutcome::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> IngestStats {
        IngestStats {
            upserted: self.upserted.load(Ordering::SeqCst),
            deleted: self.deleted.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

/// How one record event ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Upserted,
    Deleted,
    Skipped,
    Failed,
}

pub struct ProgressTracker {
    main_bar: ProgressBar,
    detail_bar: ProgressBar,
    counters: IngestCounters,
    start_time: Instant,
}

impl ProgressTracker {
    pub fn new(total_events: usize) -> Self {
        Self::with_color(total_events, true)
    }

    pub fn with_color(total_events: usize, colored: bool) -> Self {
        let multi_progress = MultiProgress::new();

        Self {
            main_bar: create_progress_bar(&multi_progress, total_events as u64, colored),
            detail_bar: create_detail_bar(&multi_progress),
            counters: IngestCounters::default(),
            start_time: Instant::now(),
        }
    }

    /// A tracker that draws nothing, for tests and non-interactive runs.
    pub fn hidden() -> Self {
        Self {
            main_bar: ProgressBar::hidden(),
            detail_bar: ProgressBar::hidden(),
            counters: IngestCounters::default(),
            start_time: Instant::now(),
        }
    }

    pub fn record(&self, outcome: EventOutcome) {
        self.counters.record(outcome);
        self.main_bar.inc(1);
        self.update_detail_bar();
    }

    pub fn record_many(&self, outcome: EventOutcome, count: usize) {
        (0..count).for_each(|_| self.counters.record(outcome));
        self.main_bar.inc(count as u64);
        self.update_detail_bar();
    }

    pub fn set_message(&self, message: String) {
        self.detail_bar.set_message(message);
    }

    pub fn finish(&self) {
        self.main_bar.finish_with_message("Ingest complete");
        self.detail_bar.finish_and_clear();
    }

    pub fn get_stats(&self) -> IngestStats {
        self.counters.snapshot()
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    fn update_detail_bar(&self) {
        let stats = self.counters.snapshot();
        self.detail_bar.set_message(format!(
            "Upserted: {} | Deleted: {} | Skipped: {} | Failed: {}",
            stats.upserted, stats.deleted, stats.skipped, stats.failed
        ));
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        self.finish();
    }
}

fn create_progress_bar(multi_progress: &MultiProgress, total: u64, colored: bool) -> ProgressBar {
    let bar = multi_progress.add(ProgressBar::new(total));
    let (template, chars) = if colored {
        (
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
            "█▓▒░",
        )
    } else {
        (
            "{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({eta}) {msg}",
            "=>-",
        )
    };

    if let Ok(style) = ProgressStyle::default_bar().template(template) {
        bar.set_style(style.progress_chars(chars));
    }
    bar
}

fn create_detail_bar(multi_progress: &MultiProgress) -> ProgressBar {
    let bar = multi_progress.add(ProgressBar::new(0));
    if let Ok(style) = ProgressStyle::default_bar().template("{msg}") {
        bar.set_style(style);
    }
    bar
}
