use crate::error::FetchError;
use crate::session::{SessionObserver, SessionStatus};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::error;
use std::sync::OnceLock;
use std::time::Duration;

const POLL_PERIOD: Duration = Duration::from_millis(200);

/// Drives one progress bar per chunked session from the session's status poll.
///
/// The bar is only added once chunks are running, so jobs that fall back to a
/// single request leave nothing behind on screen.
pub struct ProgressObserver {
    multi: MultiProgress,
    name: String,
    bar: OnceLock<ProgressBar>,
}

impl ProgressObserver {
    pub fn new(multi: &MultiProgress, name: &str) -> Self {
        Self {
            multi: multi.clone(),
            name: name.to_string(),
            bar: OnceLock::new(),
        }
    }

    fn create_progress_bar(&self, status: &SessionStatus) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(status.total_size));
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(format!("{} ({} chunks)", self.name, status.chunk_count));
        pb
    }
}

impl SessionObserver for ProgressObserver {
    fn on_start(&self, status: &SessionStatus) {
        let bar = self.bar.get_or_init(|| self.create_progress_bar(status)).clone();
        let status = status.clone();
        tokio::spawn(async move {
            status.poll(POLL_PERIOD, |bytes| bar.set_position(bytes)).await;
        });
    }

    fn on_finish(&self, bytes: u64) {
        if let Some(bar) = self.bar.get() {
            bar.set_position(bytes);
            bar.finish();
        }
    }

    fn on_error(&self, code: &'static str, cause: &FetchError) {
        error!("{}: chunk failure [{}]: {}", self.name, code, cause);
        if let Some(bar) = self.bar.get() {
            bar.abandon_with_message(format!("{}: download failed", self.name));
        }
    }
}
