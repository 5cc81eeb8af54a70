use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::sink::Dataset;
use crate::window::DateWindow;

/// Checkpoints a sync reports as it goes. Every method defaults to doing nothing.
pub trait SyncObserver {
    fn meter_started(&mut self, _dataset: Dataset, _meter_id: &str, _index: usize, _count: usize) {}

    fn window_started(&mut self, _meter_id: &str, _window: &DateWindow) {}

    fn window_completed(&mut self, _meter_id: &str, _window: &DateWindow, _rows: usize) {}

    fn page_fetched(&mut self, _offset: u64, _total: u64, _rows: usize) {}

    fn finished(&mut self, _dataset: Dataset, _rows: u64) {}
}

impl SyncObserver for () {}

/// Reports every checkpoint through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl SyncObserver for LogObserver {
    fn meter_started(&mut self, dataset: Dataset, meter_id: &str, index: usize, count: usize) {
        info!(
            dataset = dataset.as_str(),
            meter = meter_id,
            "meter {} of {}",
            index + 1,
            count
        );
    }

    fn window_started(&mut self, meter_id: &str, window: &DateWindow) {
        info!(meter = meter_id, %window, "fetching window");
    }

    fn window_completed(&mut self, meter_id: &str, window: &DateWindow, rows: usize) {
        info!(meter = meter_id, %window, rows, "saved window");
    }

    fn page_fetched(&mut self, offset: u64, total: u64, rows: usize) {
        info!(offset, total, rows, "saved page");
    }

    fn finished(&mut self, dataset: Dataset, rows: u64) {
        info!(dataset = dataset.as_str(), rows, "download complete");
    }
}

/// Progress bar for paginated downloads; everything else goes to the log.
#[derive(Default)]
pub struct ProgressObserver {
    bar: Option<ProgressBar>,
    log: LogObserver,
}

impl ProgressObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn bar(&mut self, total: u64) -> &ProgressBar {
        self.bar.get_or_insert_with(|| {
            let pb = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} {pos}/{len} records ({per_sec}) {wide_bar} {eta}",
            ) {
                pb.set_style(style.progress_chars("=>-"));
            }
            pb
        })
    }
}

impl SyncObserver for ProgressObserver {
    fn meter_started(&mut self, dataset: Dataset, meter_id: &str, index: usize, count: usize) {
        self.log.meter_started(dataset, meter_id, index, count);
    }

    fn window_started(&mut self, meter_id: &str, window: &DateWindow) {
        self.log.window_started(meter_id, window);
    }

    fn window_completed(&mut self, meter_id: &str, window: &DateWindow, rows: usize) {
        self.log.window_completed(meter_id, window, rows);
    }

    fn page_fetched(&mut self, _offset: u64, total: u64, rows: usize) {
        self.bar(total).inc(rows as u64);
    }

    fn finished(&mut self, dataset: Dataset, rows: u64) {
        if let Some(pb) = self.bar.take() {
            pb.finish_and_clear();
        }
        self.log.finished(dataset, rows);
    }
}
