//! Follows the Factorio console log and classifies new lines.
//!
//! The tailer starts at the end of the file, polls for appended lines,
//! reopens the file from the start when it shrinks (rotation or
//! truncation) and pushes telemetry and chat into two queues.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use fmcd_core::protocol::{ChatEvent, LogLine, classify_line};

use crate::shutdown;

/// Queues filled by the tailer.
#[derive(Debug)]
pub struct TailOutput {
    /// Sentinel-stripped telemetry lines (`key::value`).
    pub telemetry: mpsc::UnboundedReceiver<String>,
    pub chat: mpsc::UnboundedReceiver<ChatEvent>,
}

/// Tailer configuration.
#[derive(Debug, Clone)]
pub struct TailConfig {
    pub path: PathBuf,
    /// Pause when no complete line is available.
    pub poll_interval: Duration,
    /// How often throughput is logged.
    pub report_interval: Duration,
}

/// Counters reported by the periodic throughput log.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TailStats {
    pub lines_read: u64,
    pub telemetry_lines: u64,
    pub chat_lines: u64,
    pub rotations: u64,
}

/// Where to position a freshly opened file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenAt {
    End,
    Start,
    Offset(u64),
}

/// Open file plus the byte offset of everything consumed so far.
struct Cursor {
    reader: BufReader<File>,
    /// Offset just past the last byte read, including a pending partial line.
    position: u64,
    /// Bytes of a line whose newline has not been written yet.
    pending: Vec<u8>,
}

impl Cursor {
    async fn open(path: &Path, at: OpenAt) -> std::io::Result<Self> {
        let mut file = File::open(path).await?;
        let position = match at {
            OpenAt::End => file.seek(SeekFrom::End(0)).await?,
            OpenAt::Start => 0,
            OpenAt::Offset(offset) => file.seek(SeekFrom::Start(offset)).await?,
        };
        Ok(Self {
            reader: BufReader::new(file),
            position,
            pending: Vec::new(),
        })
    }

    /// Next complete line without its terminator, `None` if nothing new.
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.pending).await?;
        self.position += read as u64;
        if self.pending.last() != Some(&b'\n') {
            return Ok(None);
        }
        let bytes = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&bytes);
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }

    /// Offset of the first byte not yet delivered as a line.
    fn resume_offset(&self) -> u64 {
        self.position - self.pending.len() as u64
    }
}

/// The log-tailing loop.
pub struct LogTailer {
    config: TailConfig,
    telemetry_tx: mpsc::UnboundedSender<String>,
    chat_tx: mpsc::UnboundedSender<ChatEvent>,
    stats: TailStats,
}

impl LogTailer {
    pub fn new(config: TailConfig) -> (Self, TailOutput) {
        let (telemetry_tx, telemetry) = mpsc::unbounded_channel();
        let (chat_tx, chat) = mpsc::unbounded_channel();
        let tailer = Self {
            config,
            telemetry_tx,
            chat_tx,
            stats: TailStats::default(),
        };
        (tailer, TailOutput { telemetry, chat })
    }

    /// Run until shutdown. Returns the final counters.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> TailStats {
        info!(path = %self.config.path.display(), "Log tailer started");
        let mut cursor: Option<Cursor> = None;
        // Only a file present at start-up skips its history. A file that is
        // created later, or reappears after rotation, is read from the start.
        let mut open_at = OpenAt::End;
        let mut open_failed = false;
        let mut report_started = Instant::now();
        let mut report_lines: u64 = 0;

        loop {
            if shutdown::is_requested(&shutdown) {
                break;
            }

            if report_started.elapsed() >= self.config.report_interval {
                self.report(report_lines, report_started.elapsed());
                report_started = Instant::now();
                report_lines = 0;
            }

            let Some(current) = cursor.as_mut() else {
                match Cursor::open(&self.config.path, open_at).await {
                    Ok(opened) => {
                        info!(
                            path = %self.config.path.display(),
                            offset = opened.position,
                            "Opened log file"
                        );
                        cursor = Some(opened);
                        open_at = OpenAt::Start;
                        open_failed = false;
                    }
                    Err(e) => {
                        if matches!(open_at, OpenAt::End) {
                            open_at = OpenAt::Start;
                        }
                        if !open_failed {
                            warn!(path = %self.config.path.display(), error = %e, "Cannot open log file, retrying");
                            open_failed = true;
                        }
                        if self.idle(&mut shutdown).await {
                            break;
                        }
                    }
                }
                continue;
            };

            match current.next_line().await {
                Ok(Some(line)) => {
                    report_lines += 1;
                    self.handle_line(&line);
                }
                Ok(None) => match tokio::fs::metadata(&self.config.path).await {
                    Ok(meta) if meta.len() < current.position => {
                        info!(
                            size = meta.len(),
                            offset = current.position,
                            "Log file shrank, reopening from start"
                        );
                        self.stats.rotations += 1;
                        cursor = None;
                    }
                    Ok(_) => {
                        if self.idle(&mut shutdown).await {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Log file disappeared, waiting for it to return");
                        self.stats.rotations += 1;
                        cursor = None;
                        if self.idle(&mut shutdown).await {
                            break;
                        }
                    }
                },
                Err(e) => {
                    warn!(error = %e, "Error reading log file, reopening");
                    open_at = OpenAt::Offset(current.resume_offset());
                    cursor = None;
                    if self.idle(&mut shutdown).await {
                        break;
                    }
                }
            }
        }

        info!(
            lines = self.stats.lines_read,
            telemetry = self.stats.telemetry_lines,
            chat = self.stats.chat_lines,
            rotations = self.stats.rotations,
            "Log tailer stopped"
        );
        self.stats
    }

    fn handle_line(&mut self, line: &str) {
        self.stats.lines_read += 1;
        match classify_line(line) {
            LogLine::Telemetry(raw) => {
                debug!(line = %raw, "Telemetry line");
                self.stats.telemetry_lines += 1;
                if self.telemetry_tx.send(raw).is_err() {
                    warn!("Telemetry queue closed, dropping line");
                }
            }
            LogLine::Chat(chat) => {
                debug!(user = %chat.username, "Chat line");
                self.stats.chat_lines += 1;
                if self.chat_tx.send(chat).is_err() {
                    warn!("Chat queue closed, dropping line");
                }
            }
            LogLine::Other => {}
        }
    }

    async fn idle(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        shutdown::sleep_or_cancelled(self.config.poll_interval, shutdown).await
    }

    #[allow(clippy::cast_precision_loss)]
    fn report(&self, lines: u64, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 { lines as f64 / secs } else { 0.0 };
        info!(
            lines,
            lines_per_sec = %format!("{rate:.2}"),
            seconds = %format!("{secs:.1}"),
            rotations = self.stats.rotations,
            "Log tailer throughput"
        );
    }
}
