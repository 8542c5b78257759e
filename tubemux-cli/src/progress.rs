use std::sync::OnceLock;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tubemux_engine::{
    Locator, ProgressFactory, ProgressSink, ProgressUpdate, StreamDescriptor, StreamKind,
};

/// One bar per stream per job, all drawn under a shared [`MultiProgress`].
#[derive(Default)]
pub struct IndicatifProgressFactory {
    multi: MultiProgress,
}

impl IndicatifProgressFactory {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
        }
    }
}

impl ProgressFactory for IndicatifProgressFactory {
    fn create(&self, index: usize, locator: &Locator) -> Box<dyn ProgressSink> {
        Box::new(IndicatifSink {
            multi: self.multi.clone(),
            prefix: format!("#{}", index + 1),
            locator: locator.to_string(),
            video: OnceLock::new(),
            audio: OnceLock::new(),
        })
    }
}

struct IndicatifSink {
    multi: MultiProgress,
    prefix: String,
    locator: String,
    video: OnceLock<ProgressBar>,
    audio: OnceLock<ProgressBar>,
}

impl IndicatifSink {
    fn slot(&self, kind: StreamKind) -> &OnceLock<ProgressBar> {
        match kind {
            StreamKind::Video => &self.video,
            StreamKind::Audio => &self.audio,
        }
    }

    fn new_bar(&self, descriptor: &StreamDescriptor, total: Option<u64>) -> ProgressBar {
        let bar = match total {
            Some(total) => {
                let bar = ProgressBar::new(total);
                bar.set_style(bar_style());
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(spinner_style());
                bar
            }
        };
        bar.set_prefix(self.prefix.clone());
        bar.set_message(format!(
            "{} {} {}",
            descriptor.kind, descriptor.quality, self.locator
        ));
        self.multi.add(bar)
    }
}

impl ProgressSink for IndicatifSink {
    fn on_start(&self, descriptor: &StreamDescriptor, total: Option<u64>) {
        self.slot(descriptor.kind)
            .get_or_init(|| self.new_bar(descriptor, total));
    }

    fn on_progress(&self, update: &ProgressUpdate) {
        if let Some(bar) = self.slot(update.kind).get() {
            if let Some(total) = update.total
                && bar.length() != Some(total)
            {
                bar.set_length(total);
            }
            bar.set_position(update.downloaded);
        }
    }

    fn on_finish(&self, kind: StreamKind, success: bool) {
        if let Some(bar) = self.slot(kind).get() {
            if success {
                bar.finish_and_clear();
            } else {
                bar.abandon_with_message(format!("{kind} failed: {}", self.locator));
            }
        }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:.bold} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:.bold} {spinner:.blue} {bytes} ({bytes_per_sec}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}
