use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::existence;
use crate::naming;
use crate::progress::ProgressObserver;
use crate::session::{self, SessionObserver};
use crate::single;
use crate::types::{
    DownloadReport, DownloadStatus, FetchOutcome, IgnoreReason, Job, Strategy, Summary,
};
use futures::FutureExt;
use indicatif::{MultiProgress, ProgressDrawTarget};
use log::{debug, error, info};
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Run-wide tallies shared by every fetch unit.
#[derive(Debug, Default)]
struct Counters {
    completed: AtomicUsize,
    ignored: AtomicUsize,
    errored: AtomicUsize,
    bytes: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Counters {
    fn record(&self, status: DownloadStatus, bytes: u64) {
        let counter = match status {
            DownloadStatus::Completed => &self.completed,
            DownloadStatus::Ignored => &self.ignored,
            DownloadStatus::Failed => &self.errored,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }
}

/// Marks a unit as holding an admission slot for as long as it lives.
struct InFlight<'a>(&'a Counters);

impl<'a> InFlight<'a> {
    fn enter(counters: &'a Counters) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Builds the observer attached to each chunked session.
pub type ObserverFactory = Arc<dyn Fn(&Job) -> Arc<dyn SessionObserver> + Send + Sync>;

pub struct Downloader {
    config: FetchConfig,
    client: reqwest::Client,
    observers: ObserverFactory,
}

impl Downloader {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let client = config.build_client()?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: FetchConfig, client: reqwest::Client) -> Self {
        let progress = if config.show_progress {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };
        let observers: ObserverFactory = Arc::new(move |job: &Job| {
            Arc::new(ProgressObserver::new(&progress, &job.output_name)) as Arc<dyn SessionObserver>
        });
        Self {
            config,
            client,
            observers,
        }
    }

    /// Replaces the progress-bar observer used for chunked sessions.
    pub fn with_observer_factory(mut self, observers: ObserverFactory) -> Self {
        self.observers = observers;
        self
    }

    /// Downloads every URL and returns once all launched units have finished.
    ///
    /// Names are resolved and existing files skipped before a unit takes one of
    /// the `pool_size` admission slots; the producer waits while all slots are busy.
    /// A name already claimed by an earlier URL of the same run counts as existing.
    pub async fn download_all(&self, urls: Vec<String>) -> Summary {
        let start_time = Instant::now();
        let strategy = self.config.strategy();
        let pool_size = self.config.pool_size.max(1);
        let gate = Arc::new(Semaphore::new(pool_size));
        let counters = Arc::new(Counters::default());
        let mut units = JoinSet::new();
        let mut reports = Vec::new();
        let mut claimed = HashSet::new();

        info!(
            "Fetching {} URLs into {} ({:?}, pool size {})",
            urls.len(),
            self.config.output_dir.display(),
            strategy,
            pool_size
        );

        for url in urls {
            let job = match self.create_job(&url) {
                Ok(job) => job,
                Err(e) => {
                    error!("Skipping {}: {}", url, e);
                    counters.record(DownloadStatus::Failed, 0);
                    reports.push(report(&url, None, &FetchOutcome::Failed(e), Duration::ZERO));
                    continue;
                }
            };

            let found = if claimed.contains(&job.output_name) {
                Some(job.output_path())
            } else {
                existence::find_existing(&job.output_dir, &self.config.aux_exist_dirs, &job.output_name)
                    .await
            };
            if let Some(found) = found {
                info!("Ignore existed: {} => {}", job.url, found.display());
                let outcome = FetchOutcome::Ignored(IgnoreReason::AlreadyExists);
                counters.record(outcome.status(), 0);
                reports.push(report(&job.url, Some(job.output_path().as_path()), &outcome, Duration::ZERO));
                continue;
            }

            let permit = match Arc::clone(&gate).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Admission gate closed, dropping {}: {}", job.url, e);
                    counters.record(DownloadStatus::Failed, 0);
                    reports.push(DownloadReport {
                        url: job.url.clone(),
                        output_path: Some(job.output_path()),
                        status: DownloadStatus::Failed,
                        bytes_downloaded: 0,
                        duration: Duration::ZERO,
                        error: Some(e.to_string()),
                    });
                    continue;
                }
            };

            claimed.insert(job.output_name.clone());
            let client = self.client.clone();
            let observers = Arc::clone(&self.observers);
            let counters = Arc::clone(&counters);
            units.spawn(async move {
                let _permit = permit;
                let _slot = InFlight::enter(&counters);
                let report = run_unit(&client, &observers, job, strategy).await;
                counters.record(report.status, report.bytes_downloaded);
                report
            });
        }

        while let Some(joined) = units.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => {
                    // run_unit already catches panics; this only sees aborted tasks.
                    error!("Fetch unit ended abnormally: {}", e);
                    counters.record(DownloadStatus::Failed, 0);
                }
            }
        }

        Summary {
            completed: counters.completed.load(Ordering::SeqCst),
            ignored: counters.ignored.load(Ordering::SeqCst),
            errored: counters.errored.load(Ordering::SeqCst),
            total_bytes_downloaded: counters.bytes.load(Ordering::SeqCst),
            elapsed: start_time.elapsed(),
            peak_in_flight: counters.peak_in_flight.load(Ordering::SeqCst),
            reports,
        }
    }

    fn create_job(&self, url: &str) -> Result<Job, FetchError> {
        let output_name = naming::resolve(url, &self.config.naming)?;
        let job = Job {
            url: url.to_string(),
            output_dir: self.config.output_dir.clone(),
            output_name,
        };
        debug!("Download task: {} -> {}", job.url, job.output_path().display());
        Ok(job)
    }
}

async fn run_unit(
    client: &reqwest::Client,
    observers: &ObserverFactory,
    job: Job,
    strategy: Strategy,
) -> DownloadReport {
    let start_time = Instant::now();
    let out = job.output_path();

    let result = AssertUnwindSafe(fetch_job(client, observers, &job, strategy))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(FetchError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("fetch panicked: {}", msg),
            )))
        });

    let outcome = match result {
        Ok(bytes) => {
            info!("{} => {}", job.url, out.display());
            FetchOutcome::Completed { bytes }
        }
        Err(e) => {
            error!("Download failed for {}: {}", job.url, e);
            FetchOutcome::Failed(e)
        }
    };

    report(&job.url, Some(out.as_path()), &outcome, start_time.elapsed())
}

/// Routes one job to its fetch strategy. A chunked job whose server cannot
/// serve ranges is fetched in a single request instead.
async fn fetch_job(
    client: &reqwest::Client,
    observers: &ObserverFactory,
    job: &Job,
    strategy: Strategy,
) -> Result<u64, FetchError> {
    let out = job.output_path();
    match strategy {
        Strategy::OneShot => single::fetch_whole(client, &job.url, &out).await,
        Strategy::Chunked { concurrency } => {
            let observer = observers(job);
            match session::fetch_chunked(client, &job.url, &out, concurrency, observer).await {
                Err(FetchError::RangeUnsupported(reason)) => {
                    info!("No range support ({}), fetching in one request", reason);
                    single::fetch_whole(client, &job.url, &out).await
                }
                other => other,
            }
        }
    }
}

fn report(url: &str, path: Option<&Path>, outcome: &FetchOutcome, duration: Duration) -> DownloadReport {
    let (bytes_downloaded, error) = match outcome {
        FetchOutcome::Completed { bytes } => (*bytes, None),
        FetchOutcome::Ignored(reason) => (0, Some(format!("{:?}", reason))),
        FetchOutcome::Failed(e) => (0, Some(format!("[{}] {}", e.code(), e))),
    };
    DownloadReport {
        url: url.to_string(),
        output_path: path.map(Path::to_path_buf),
        status: outcome.status(),
        bytes_downloaded,
        duration,
        error,
    }
}

pub fn write_stats_csv(summary: &Summary, stats_path: &Path) -> Result<(), FetchError> {
    let mut wtr = csv::WriterBuilder::new().from_path(stats_path)?;

    wtr.write_record([
        "Filename",
        "Status",
        "Size (bytes)",
        "Duration (s)",
        "URL",
        "Detail",
    ])?;

    for report in &summary.reports {
        let filename = report
            .output_path
            .as_ref()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or("unknown");

        wtr.write_record([
            filename.to_string(),
            format!("{:?}", report.status),
            report.bytes_downloaded.to_string(),
            format!("{:.2}", report.duration.as_secs_f64()),
            report.url.clone(),
            report.error.clone().unwrap_or_default(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
