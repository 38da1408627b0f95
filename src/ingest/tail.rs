//! JSONL file tailing.
//!
//! Reads exported log entries (one JSON `LogEntry` per line) from a file,
//! or from the newest `.jsonl` file in a directory, using synchronous
//! `std::fs` reads.

use std::fs;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{LogEntry, LogSource, RawRecord, SourceError, SubscriptionFilter};

/// Lines longer than this are skipped.
const MAX_LINE_LEN: u64 = 1_048_576;

/// Most records returned by one [`TailSource::poll`].
pub const BATCH_SIZE: usize = 256;

/// Tails a JSONL export, tracking the read offset across polls.
pub struct TailSource {
    name: String,
    path: PathBuf,
    poll_interval: Duration,
    follow: bool,
    last_offset: u64,
    last_file: Option<PathBuf>,
}

/// Outcome of reading one line from the current offset.
enum Line {
    /// A complete line of `len` bytes, newline included.
    Complete { len: u64 },
    /// An oversize line of `len` bytes that was skipped.
    Skipped { len: u64 },
    /// End of data, or a trailing line still being written.
    Pending,
}

impl TailSource {
    /// Create a source over `path` (a `.jsonl` file or a directory of them).
    ///
    /// With `follow` set the source polls forever; otherwise it reads to the
    /// current end of file once and finishes.
    pub fn new(name: &str, path: PathBuf, poll_interval: Duration, follow: bool) -> Self {
        Self {
            name: name.to_owned(),
            path,
            poll_interval,
            follow,
            last_offset: 0,
            last_file: None,
        }
    }

    /// Read up to [`BATCH_SIZE`] records appended since the previous poll.
    ///
    /// Only newline-terminated lines are consumed; a trailing partial line
    /// is left for a later poll. Lines that fail to parse or exceed 1 MiB
    /// are skipped. If the file shrank or a newer file appeared, reading
    /// restarts from the beginning.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or directory cannot be read.
    pub fn poll(&mut self) -> Result<Vec<RawRecord>, SourceError> {
        let Some(current) = resolve_file(&self.path)? else {
            return Ok(Vec::new());
        };

        if self.last_file.as_ref() != Some(&current) {
            self.last_offset = 0;
            self.last_file = Some(current.clone());
        }

        let file = fs::File::open(&current)?;
        let file_len = file.metadata()?.len();

        if file_len < self.last_offset {
            debug!(file = %current.display(), "log file truncated, rewinding");
            self.last_offset = 0;
        }
        if file_len == self.last_offset {
            return Ok(Vec::new());
        }

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(self.last_offset))?;

        let mut records = Vec::new();
        let mut buf = Vec::new();
        while records.len() < BATCH_SIZE {
            match read_line(&mut reader, &mut buf)? {
                Line::Complete { len } => {
                    self.last_offset = self.last_offset.saturating_add(len);
                    if let Ok(entry) = serde_json::from_slice::<LogEntry>(&buf) {
                        records.push(RawRecord::from(entry));
                    }
                }
                Line::Skipped { len } => {
                    debug!(file = %current.display(), bytes = len, "skipping oversize log line");
                    self.last_offset = self.last_offset.saturating_add(len);
                }
                Line::Pending => break,
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl LogSource for TailSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &mut self,
        filter: &SubscriptionFilter,
        out: mpsc::Sender<RawRecord>,
    ) -> Result<(), SourceError> {
        info!(source = %self.name, path = %self.path.display(), follow = self.follow, "tailing log file");
        loop {
            let batch = self.poll()?;
            let more = batch.len() >= BATCH_SIZE;
            for record in batch {
                if !filter.matches(&record) {
                    continue;
                }
                if out.send(record).await.is_err() {
                    debug!(source = %self.name, "consumer gone, stopping tail");
                    return Ok(());
                }
            }
            if more {
                continue;
            }
            if !self.follow {
                return Ok(());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Read one line into `buf` without ever buffering more than
/// `MAX_LINE_LEN` bytes of it.
fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Line> {
    buf.clear();
    let read = reader.by_ref().take(MAX_LINE_LEN).read_until(b'\n', buf)?;
    let len = u64::try_from(read).unwrap_or(u64::MAX);
    if buf.last() == Some(&b'\n') {
        return Ok(Line::Complete { len });
    }
    if len < MAX_LINE_LEN {
        return Ok(Line::Pending);
    }

    // Oversize: discard up to and including the next newline.
    let mut skipped = len;
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            return Ok(Line::Pending);
        }
        let (used, done) = match available.iter().position(|b| *b == b'\n') {
            Some(pos) => (pos.saturating_add(1), true),
            None => (available.len(), false),
        };
        reader.consume(used);
        skipped = skipped.saturating_add(u64::try_from(used).unwrap_or(u64::MAX));
        if done {
            return Ok(Line::Skipped { len: skipped });
        }
    }
}

/// Resolve `path` to the file to read: itself, or the newest `.jsonl` inside.
fn resolve_file(path: &Path) -> Result<Option<PathBuf>, SourceError> {
    if path.is_file() {
        return Ok(Some(path.to_owned()));
    }
    if !path.is_dir() {
        return Ok(None);
    }

    let mut best: Option<(PathBuf, std::time::SystemTime)> = None;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let candidate = entry.path();
        if candidate.extension().and_then(|ext| ext.to_str()) != Some("jsonl") {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if best.as_ref().is_none_or(|(_, t)| modified > *t) {
            best = Some((candidate, modified));
        }
    }

    Ok(best.map(|(p, _)| p))
}
