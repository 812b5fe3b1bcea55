//! Chunked range downloads.
//!
//! A [`DownloadSession`] probes the resource, splits it into a [`RangePlan`],
//! pre-allocates the output file and fetches every range concurrently, each task
//! writing only inside its own byte window. The first failing chunk ends the
//! session; the partially written file is removed before the error is returned.

use crate::error::FetchError;
use crate::range::{ByteRange, RangePlan};
use crate::single::{create_part_file, persist_part};
use futures::StreamExt;
use log::{debug, warn};
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempPath;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Lifecycle hooks for a chunked download.
pub trait SessionObserver: Send + Sync {
    /// Called once, after every chunk task has been launched.
    fn on_start(&self, _status: &SessionStatus) {}

    /// Called exactly once, only when every chunk completed.
    fn on_finish(&self, _bytes: u64) {}

    /// Called for a chunk failure, with the error's short code.
    fn on_error(&self, _code: &'static str, _cause: &FetchError) {}
}

pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Shared, read-only view of a running session.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub url: String,
    pub total_size: u64,
    pub chunk_count: usize,
    bytes_written: Arc<AtomicU64>,
    terminated: CancellationToken,
}

impl SessionStatus {
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.is_cancelled()
    }

    /// Resolves once the session has finished or failed.
    pub async fn terminated(&self) {
        self.terminated.cancelled().await
    }

    /// Reports `bytes_written` every `period` until the session terminates,
    /// then once more with the final count.
    pub async fn poll<F>(&self, period: Duration, mut report: F)
    where
        F: FnMut(u64),
    {
        let mut tick = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = self.terminated() => break,
                _ = tick.tick() => report(self.bytes_written()),
            }
        }
        report(self.bytes_written());
    }
}

#[derive(Debug)]
pub struct ChunkState {
    pub range_index: usize,
    pub bytes_written: u64,
    pub done: bool,
    pub error: Option<FetchError>,
}

impl ChunkState {
    fn new(range_index: usize) -> Self {
        Self {
            range_index,
            bytes_written: 0,
            done: false,
            error: None,
        }
    }
}

/// Finds the total size of `url` and checks that it can be fetched by ranges.
///
/// Tries `HEAD` first and falls back to a one-byte ranged `GET` when the server
/// rejects `HEAD` or leaves out the headers. Returns `RangeUnsupported` when the
/// size is unknown or ranges are not honoured.
pub async fn probe(client: &reqwest::Client, url: &str) -> Result<u64, FetchError> {
    if let Ok(resp) = client.head(url).send().await {
        if resp.status().is_success() {
            let accepts = resp
                .headers()
                .get(ACCEPT_RANGES)
                .and_then(|v| v.to_str().ok())
                .map_or(false, |v| v.trim().eq_ignore_ascii_case("bytes"));
            let length = resp
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            if let (true, Some(length)) = (accepts, length) {
                return Ok(length);
            }
        } else {
            debug!("HEAD {} returned {}, probing with a ranged GET", url, resp.status());
        }
    }

    let resp = client.get(url).header(RANGE, "bytes=0-0").send().await?;
    let status = resp.status();
    let content_range = resp
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range);

    match (status, content_range) {
        (StatusCode::PARTIAL_CONTENT, Some(cr)) if cr.start == Some(0) => cr
            .total
            .ok_or_else(|| FetchError::RangeUnsupported(format!("unknown size for {}", url))),
        (StatusCode::RANGE_NOT_SATISFIABLE, Some(cr)) if cr.total == Some(0) => Ok(0),
        (s, _) if s.is_success() => Err(FetchError::RangeUnsupported(url.to_string())),
        (s, _) => Err(FetchError::Status {
            status: s,
            url: url.to_string(),
        }),
    }
}

/// Parsed `Content-Range: bytes start-end/total` (either side may be `*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: Option<u64>,
    pub end: Option<u64>,
    pub total: Option<u64>,
}

pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (span, total) = rest.split_once('/')?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    let (start, end) = match span.trim() {
        "*" => (None, None),
        s => {
            let (a, b) = s.split_once('-')?;
            (Some(a.trim().parse().ok()?), Some(b.trim().parse().ok()?))
        }
    };
    Some(ContentRange { start, end, total })
}

pub struct DownloadSession {
    url: String,
    out_path: PathBuf,
    plan: RangePlan,
    observer: Arc<dyn SessionObserver>,
}

impl DownloadSession {
    pub fn new(
        url: impl Into<String>,
        out_path: impl Into<PathBuf>,
        plan: RangePlan,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            url: url.into(),
            out_path: out_path.into(),
            plan,
            observer,
        }
    }

    pub fn plan(&self) -> &RangePlan {
        &self.plan
    }

    /// Runs every chunk to completion and moves the assembled file into place.
    pub async fn run(self, client: &reqwest::Client) -> Result<u64, FetchError> {
        let total = self.plan.total_size;

        // Dropping `part` on any early return deletes the partial file.
        let part = match preallocate(&self.out_path, total).await {
            Ok(part) => part,
            Err(e) => {
                self.observer.on_error(e.code(), &e);
                return Err(e);
            }
        };

        let status = SessionStatus {
            url: self.url.clone(),
            total_size: total,
            chunk_count: self.plan.chunk_count(),
            bytes_written: Arc::new(AtomicU64::new(0)),
            terminated: CancellationToken::new(),
        };
        // Cancels the token on every exit path, so pollers always stop.
        let _terminal = status.terminated.clone().drop_guard();

        let mut tasks = JoinSet::new();
        for (index, range) in self.plan.ranges.iter().copied().enumerate() {
            let client = client.clone();
            let url = self.url.clone();
            let part = part.to_path_buf();
            let counter = Arc::clone(&status.bytes_written);
            tasks.spawn(async move { fetch_range(&client, &url, &part, index, range, counter).await });
        }
        debug!("Launched {} chunk(s) for {}", status.chunk_count, self.url);
        self.observer.on_start(&status);

        let mut chunks = Vec::with_capacity(status.chunk_count);
        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            let result = match joined {
                Ok(mut state) => match state.error.take() {
                    Some(e) => Err(e),
                    None => Ok(state),
                },
                Err(e) => Err(FetchError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("chunk task failed: {}", e),
                ))),
            };
            match result {
                Ok(state) => chunks.push(state),
                Err(e) => {
                    self.observer.on_error(e.code(), &e);
                    failure = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = failure {
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
            status.terminated.cancel();
            warn!("Chunked download of {} failed: {}", self.url, e);
            drop(part);
            return Err(e);
        }

        let written: u64 = chunks.iter().map(|c| c.bytes_written).sum();
        debug_assert!(chunks.iter().all(|c| c.done));
        debug_assert_eq!(written, total);
        for chunk in &chunks {
            debug!("{}: chunk {} wrote {} bytes", self.url, chunk.range_index, chunk.bytes_written);
        }

        if let Err(e) = persist_part(part, &self.out_path) {
            status.terminated.cancel();
            self.observer.on_error(e.code(), &e);
            return Err(e);
        }

        status.terminated.cancel();
        self.observer.on_finish(total);
        Ok(total)
    }
}

/// Probes `url` and downloads it in `concurrency` ranges into `out_path`.
///
/// Returns `RangeUnsupported` without touching the disk when the server cannot
/// serve ranges; the caller decides how to fall back.
pub async fn fetch_chunked(
    client: &reqwest::Client,
    url: &str,
    out_path: &Path,
    concurrency: usize,
    observer: Arc<dyn SessionObserver>,
) -> Result<u64, FetchError> {
    let total = probe(client, url).await?;
    let plan = RangePlan::new(total, concurrency);
    DownloadSession::new(url, out_path, plan, observer)
        .run(client)
        .await
}

async fn preallocate(out_path: &Path, total: u64) -> Result<TempPath, FetchError> {
    let (file, part) = create_part_file(out_path)?;
    file.set_len(total).await?;
    file.sync_all().await?;
    Ok(part)
}

async fn fetch_range(
    client: &reqwest::Client,
    url: &str,
    part: &Path,
    index: usize,
    range: ByteRange,
    counter: Arc<AtomicU64>,
) -> ChunkState {
    let mut state = ChunkState::new(index);
    match write_range(client, url, part, index, range, &counter, &mut state).await {
        Ok(()) => state.done = true,
        Err(e) => state.error = Some(e),
    }
    state
}

async fn write_range(
    client: &reqwest::Client,
    url: &str,
    part: &Path,
    index: usize,
    range: ByteRange,
    counter: &AtomicU64,
    state: &mut ChunkState,
) -> Result<(), FetchError> {
    let resp = client
        .get(url)
        .header(RANGE, range.header_value())
        .send()
        .await?;

    let status = resp.status();
    if status == StatusCode::OK {
        return Err(FetchError::ChunkMismatch {
            index,
            reason: "server sent the full body for a ranged request".to_string(),
        });
    }
    if status != StatusCode::PARTIAL_CONTENT {
        return Err(FetchError::Status {
            status,
            url: url.to_string(),
        });
    }

    let served = resp
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range);
    match served {
        Some(cr) if cr.start == Some(range.start) && cr.end == Some(range.end) => {}
        other => {
            return Err(FetchError::ChunkMismatch {
                index,
                reason: format!(
                    "requested {}-{}, got content range {:?}",
                    range.start, range.end, other
                ),
            })
        }
    }

    let mut file = OpenOptions::new().write(true).open(part).await?;
    file.seek(SeekFrom::Start(range.start)).await?;

    let expected = range.len();
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let len = chunk.len() as u64;
        if state.bytes_written + len > expected {
            return Err(FetchError::ChunkMismatch {
                index,
                reason: format!("more than the {} requested bytes", expected),
            });
        }
        file.write_all(&chunk).await?;
        state.bytes_written += len;
        counter.fetch_add(len, Ordering::Relaxed);
    }
    file.flush().await?;

    if state.bytes_written != expected {
        return Err(FetchError::ChunkMismatch {
            index,
            reason: format!("short body: {} of {} bytes", state.bytes_written, expected),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_range() {
        assert_eq!(
            parse_content_range("bytes 0-99/1000"),
            Some(ContentRange {
                start: Some(0),
                end: Some(99),
                total: Some(1000)
            })
        );
        assert_eq!(
            parse_content_range("bytes */0"),
            Some(ContentRange {
                start: None,
                end: None,
                total: Some(0)
            })
        );
        assert_eq!(
            parse_content_range("bytes 5-9/*").map(|c| c.total),
            Some(None)
        );
    }

    #[test]
    fn rejects_malformed_content_range() {
        assert_eq!(parse_content_range("items 0-9/10"), None);
        assert_eq!(parse_content_range("bytes 0-9"), None);
        assert_eq!(parse_content_range("bytes a-9/10"), None);
    }

    #[tokio::test]
    async fn poll_exits_after_termination() {
        let status = SessionStatus {
            url: "http://localhost/x".to_string(),
            total_size: 10,
            chunk_count: 1,
            bytes_written: Arc::new(AtomicU64::new(0)),
            terminated: CancellationToken::new(),
        };

        let watcher = status.clone();
        let poller = tokio::spawn(async move {
            let mut last = 0;
            watcher
                .poll(Duration::from_millis(5), |bytes| last = bytes)
                .await;
            last
        });

        status.bytes_written.store(10, Ordering::Relaxed);
        status.terminated.cancel();

        let last = tokio::time::timeout(Duration::from_secs(2), poller)
            .await
            .expect("poller must stop once the session terminates")
            .unwrap();
        assert_eq!(last, 10);
        assert!(status.is_terminated());
    }
}
