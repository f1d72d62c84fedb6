//! Terminal progress bars for transfers and checksum runs.

use std::collections::HashMap;
use std::time::Duration;

use benchpack::progress::{ProgressCallback, ProgressObserver};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::Mutex;

const BAR_TEMPLATE: &str =
    "{msg:30!} [{bar:30.cyan/dim}] {bytes}/{total_bytes} {bytes_per_sec} ({eta})";
const SPINNER_TEMPLATE: &str = "{spinner:.cyan} {msg:30!} {bytes} {bytes_per_sec}";

/// One bar per active transfer, stacked in a [`MultiProgress`].
pub struct BarObserver {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl BarObserver {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn make_bar(total: u64) -> ProgressBar {
        if total == 0 {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template(SPINNER_TEMPLATE) {
                bar.set_style(style);
            }
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        } else {
            let bar = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
                bar.set_style(style.progress_chars("=>-"));
            }
            bar
        }
    }
}

impl ProgressObserver for BarObserver {
    fn begin(&self, label: &str, total: u64) -> ProgressCallback {
        let bar = self.multi.add(Self::make_bar(total));
        bar.set_message(label.to_string());
        self.bars.lock().insert(label.to_string(), bar.clone());

        Box::new(move |done, total| {
            if total > 0 && bar.length() != Some(total) {
                bar.set_length(total);
            }
            bar.set_position(done);
        })
    }

    fn finish(&self, label: &str) {
        if let Some(bar) = self.bars.lock().remove(label) {
            bar.finish_and_clear();
        }
    }
}
