// SPDX-License-Identifier: GPL-3.0-only

//! Telemetry CSV log
//!
//! One file per run, named after the local start time:
//!
//! ```text
//! data_2026-10-17T09-30-00.csv
//! timestamp,data
//! 81234.123456789,"Center: 320 x 240 ,Cursor: 960 x 540"
//! ```

use crate::transport::ControlReceiver;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const CSV_HEADER: &str = "timestamp,data";

/// Buffered writer for one telemetry file
pub struct CsvLogger {
    path: PathBuf,
    writer: BufWriter<File>,
    rows: u64,
}

impl CsvLogger {
    /// Create `data_<local time>.csv` in `dir` and write the header
    pub fn create(dir: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let timestamp = chrono::Local::now().format("%Y-%m-%dT%H-%M-%S");
        let path = dir.join(format!("data_{}.csv", timestamp));

        let mut writer = BufWriter::new(File::create(&path)?);
        writeln!(writer, "{}", CSV_HEADER)?;
        info!(path = %path.display(), "Telemetry log created");

        Ok(Self {
            path,
            writer,
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written, excluding the header
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Append one row stamped with monotonic time `at`
    pub fn log(&mut self, at: Duration, data: &str) -> io::Result<()> {
        writeln!(
            self.writer,
            "{}.{:09},{}",
            at.as_secs(),
            at.subsec_nanos(),
            escape_field(data)
        )?;
        self.rows += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl Drop for CsvLogger {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!(path = %self.path.display(), error = %e, "Failed to flush telemetry log");
        }
    }
}

/// Quote a field containing separators, quotes or line breaks
fn escape_field(data: &str) -> std::borrow::Cow<'_, str> {
    if data.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", data.replace('"', "\"\"")).into()
    } else {
        data.into()
    }
}

/// Periodic stage draining telemetry into the CSV log
pub struct LoggingStage {
    inbox: ControlReceiver,
    logger: Arc<Mutex<CsvLogger>>,
}

impl LoggingStage {
    pub fn new(inbox: ControlReceiver, logger: Arc<Mutex<CsvLogger>>) -> Self {
        Self { inbox, logger }
    }

    pub fn run_once(&mut self) {
        let messages = self.inbox.drain();
        if messages.is_empty() {
            return;
        }

        let mut logger = self.logger.lock();
        for message in messages {
            if let Err(e) = logger.log(message.stamp, &message.text) {
                warn!(error = %e, "Failed to write telemetry row");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ControlChannel;

    #[test]
    fn test_escape_field() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_header_and_row_format() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = CsvLogger::create(dir.path()).unwrap();
        let name = logger.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("data_") && name.ends_with(".csv"), "{name}");

        logger
            .log(Duration::new(12, 5), "Center: 1 x 2 ,Cursor: 3 x 4")
            .unwrap();
        logger.flush().unwrap();

        let content = std::fs::read_to_string(logger.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines, [CSV_HEADER, "12.000000005,\"Center: 1 x 2 ,Cursor: 3 x 4\""]);
    }

    #[test]
    fn test_stage_drains_channel() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Arc::new(Mutex::new(CsvLogger::create(dir.path()).unwrap()));
        let (tx, rx) = ControlChannel::bounded("telemetry", 8);
        let mut stage = LoggingStage::new(rx, Arc::clone(&logger));

        tx.send("one");
        tx.send("two");
        stage.run_once();

        assert_eq!(logger.lock().rows(), 2);
    }
}
