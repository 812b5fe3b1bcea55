use crate::error::FetchError;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub url: String,
    pub output_dir: PathBuf,
    pub output_name: String,
}

impl Job {
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    OneShot,
    Chunked { concurrency: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    AlreadyExists,
}

#[derive(Debug)]
pub enum FetchOutcome {
    Completed { bytes: u64 },
    Ignored(IgnoreReason),
    Failed(FetchError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Completed,
    Ignored,
    Failed,
}

impl FetchOutcome {
    pub fn status(&self) -> DownloadStatus {
        match self {
            FetchOutcome::Completed { .. } => DownloadStatus::Completed,
            FetchOutcome::Ignored(_) => DownloadStatus::Ignored,
            FetchOutcome::Failed(_) => DownloadStatus::Failed,
        }
    }
}

#[derive(Debug)]
pub struct DownloadReport {
    pub url: String,
    pub output_path: Option<PathBuf>,
    pub status: DownloadStatus,
    pub bytes_downloaded: u64,
    pub duration: Duration,
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct Summary {
    pub completed: usize,
    pub ignored: usize,
    pub errored: usize,
    pub total_bytes_downloaded: u64,
    pub elapsed: Duration,
    /// Highest number of fetch units observed holding an admission slot at once.
    pub peak_in_flight: usize,
    pub reports: Vec<DownloadReport>,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.completed + self.ignored + self.errored
    }
}
