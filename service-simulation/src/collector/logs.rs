use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use futures::stream::{self, Stream};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, SimulationError};
use crate::models::LogEvent;

/// Timing knobs for following the log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowOptions {
    /// Pause between checks once the end of the file is reached
    pub poll_interval: Duration,
    /// First wait after the log file could not be opened
    pub reopen_backoff: Duration,
    /// Ceiling for the doubling open backoff
    pub max_backoff: Duration,
}

impl Default for FollowOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            reopen_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// Tails the simulator log and classifies its lines.
#[derive(Debug, Clone, Default)]
pub struct LogCollector {
    options: FollowOptions,
}

impl LogCollector {
    pub fn new(options: FollowOptions) -> Self {
        Self { options }
    }

    /// Follow `log_path` and yield an event for every DNS or HTTP line.
    ///
    /// The stream starts at the beginning of the file and never ends on its
    /// own: at end of file it polls for appended data. If the file shrinks,
    /// disappears or is replaced by a new file it is reopened from the start.
    /// A missing or unreadable file is retried with backoff; if `cancel` fires
    /// while the file is still unavailable the stream yields a single
    /// `SourceUnavailable` error and ends. Cancelling while following ends the
    /// stream without an error.
    pub fn watch(
        &self,
        log_path: impl Into<PathBuf>,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<LogEvent>> + Send + 'static {
        let tail = LogTail {
            path: log_path.into(),
            options: self.options.clone(),
            cancel,
            reader: None,
            file_id: None,
            offset: 0,
            pending: Vec::new(),
            read_failures: 0,
            unavailable: None,
            finished: false,
        };

        stream::unfold(tail, |mut tail| async move {
            let item = tail.next_event().await?;
            Some((item, tail))
        })
    }
}

struct LogTail {
    path: PathBuf,
    options: FollowOptions,
    cancel: CancellationToken,
    reader: Option<BufReader<File>>,
    file_id: Option<u64>,
    offset: u64,
    pending: Vec<u8>,
    read_failures: u32,
    // Why the source is currently unusable, surfaced if cancelled before it recovers
    unavailable: Option<String>,
    finished: bool,
}

impl LogTail {
    async fn next_event(&mut self) -> Option<Result<LogEvent>> {
        if self.finished {
            return None;
        }

        loop {
            if self.cancel.is_cancelled() {
                return self.stop();
            }

            if self.reader.is_none() {
                if let Err(e) = self.open().await {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
            let Some(reader) = self.reader.as_mut() else {
                continue;
            };

            match reader.read_until(b'\n', &mut self.pending).await {
                Ok(0) => {
                    self.recovered();
                    if !self.idle().await {
                        return self.stop();
                    }
                }
                Ok(n) => {
                    self.recovered();
                    self.offset += n as u64;
                    if self.pending.last() != Some(&b'\n') {
                        // Partial line, the writer has not finished it yet
                        if !self.idle().await {
                            return self.stop();
                        }
                        continue;
                    }

                    let line = String::from_utf8_lossy(&self.pending).into_owned();
                    self.pending.clear();
                    if let Some(event) = LogEvent::from_line(&line) {
                        return Some(Ok(event));
                    }
                }
                Err(e) => {
                    self.read_failures += 1;
                    if self.read_failures == 1 {
                        warn!(path = %self.path.display(), error = %e, "Simulator log unreadable, reopening");
                    } else {
                        debug!(path = %self.path.display(), error = %e, failures = self.read_failures, "Simulator log still unreadable");
                    }
                    self.unavailable = Some(e.to_string());
                    self.reset();

                    let exponent = (self.read_failures - 1).min(16);
                    let backoff = self
                        .options
                        .reopen_backoff
                        .saturating_mul(1 << exponent)
                        .min(self.options.max_backoff);
                    if !self.pause(backoff).await {
                        return self.stop();
                    }
                }
            }
        }
    }

    /// Open the log file, retrying with backoff until it exists.
    async fn open(&mut self) -> Result<()> {
        let mut backoff = self.options.reopen_backoff;
        let mut failures = 0u32;

        loop {
            match File::open(&self.path).await {
                Ok(file) => {
                    info!(path = %self.path.display(), "Following simulator log");
                    self.file_id = file.metadata().await.ok().as_ref().and_then(file_id);
                    self.reader = Some(BufReader::new(file));
                    self.offset = 0;
                    self.pending.clear();
                    return Ok(());
                }
                Err(e) => {
                    failures += 1;
                    if failures == 1 {
                        warn!(path = %self.path.display(), error = %e, "Simulator log unavailable, waiting for it");
                    } else {
                        debug!(path = %self.path.display(), error = %e, failures, "Simulator log still unavailable");
                    }

                    if !self.pause(backoff).await {
                        return Err(SimulationError::SourceUnavailable {
                            path: self.path.clone(),
                            reason: e.to_string(),
                        });
                    }
                    backoff = (backoff * 2).min(self.options.max_backoff);
                }
            }
        }
    }

    /// Called at end of file. Detects truncation, replacement or removal,
    /// then waits one poll interval. Returns false when cancelled.
    async fn idle(&mut self) -> bool {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) if self.file_id.is_some() && file_id(&meta) != self.file_id => {
                info!(path = %self.path.display(), "Simulator log replaced, reopening");
                self.reset();
                return !self.cancel.is_cancelled();
            }
            Ok(meta) if meta.len() < self.offset => {
                info!(
                    path = %self.path.display(),
                    size = meta.len(),
                    offset = self.offset,
                    "Simulator log truncated, reopening"
                );
                self.reset();
                return !self.cancel.is_cancelled();
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "Simulator log removed, reopening");
                self.unavailable = Some(e.to_string());
                self.reset();
            }
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Could not stat simulator log");
            }
        }

        self.pause(self.options.poll_interval).await
    }

    fn reset(&mut self) {
        self.reader = None;
        self.file_id = None;
        self.offset = 0;
        self.pending.clear();
    }

    fn recovered(&mut self) {
        self.read_failures = 0;
        self.unavailable = None;
    }

    /// End the stream, failing it if the source was unusable when cancelled.
    fn stop(&mut self) -> Option<Result<LogEvent>> {
        self.finished = true;
        self.unavailable.take().map(|reason| {
            Err(SimulationError::SourceUnavailable {
                path: self.path.clone(),
                reason,
            })
        })
    }

    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

#[cfg(unix)]
fn file_id(meta: &Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ino())
}

#[cfg(not(unix))]
fn file_id(_meta: &Metadata) -> Option<u64> {
    None
}
