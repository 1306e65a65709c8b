//! WAF log reader
//!
//! The WAF appends to its log on its own schedule. Lookups therefore only
//! ever look at the tail of the file, scanning backward from end of file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use wafreplay_common::{RunMode, RunnerConfig};

use crate::error::{RunError, RunResult};

const CHUNK_SIZE: u64 = 8 * 1024;

/// Settings for [`LogLines::open`]
#[derive(Debug, Clone)]
pub struct LogLinesConfig {
    pub file_name: Option<PathBuf>,
    pub start_marker: Option<Vec<u8>>,
    pub end_marker: Option<Vec<u8>>,
    pub run_mode: RunMode,
    /// Lines from the end of file searched by [`LogLines::check_log_for_marker`]
    pub max_marker_lines: usize,
}

impl LogLinesConfig {
    pub fn from_runner(config: &RunnerConfig) -> Self {
        Self {
            file_name: config.log_file.clone(),
            start_marker: None,
            end_marker: None,
            run_mode: config.mode,
            max_marker_lines: config.max_marker_log_lines,
        }
    }
}

impl Default for LogLinesConfig {
    fn default() -> Self {
        Self::from_runner(&RunnerConfig::default())
    }
}

/// Open WAF log plus the markers bounding the current stage
#[derive(Debug)]
pub struct LogLines {
    file: Option<File>,
    file_name: Option<PathBuf>,
    start_marker: Option<Vec<u8>>,
    end_marker: Option<Vec<u8>>,
    max_marker_lines: usize,
}

impl LogLines {
    /// Open the log. In cloud mode no file is opened and none is required.
    pub fn open(config: LogLinesConfig) -> RunResult<Self> {
        if config.max_marker_lines == 0 {
            return Err(wafreplay_common::Error::InvalidConfig(
                "max_marker_lines must be greater than zero".to_string(),
            )
            .into());
        }

        let file = match (config.run_mode, &config.file_name) {
            (RunMode::Cloud, _) => None,
            (RunMode::Default, None) => {
                return Err(wafreplay_common::Error::InvalidConfig(
                    "no log file supplied".to_string(),
                )
                .into())
            }
            (RunMode::Default, Some(path)) => {
                let file = File::open(path).map_err(|source| RunError::LogFile {
                    path: path.clone(),
                    source,
                })?;
                debug!("Opened WAF log {}", path.display());
                Some(file)
            }
        };

        Ok(Self {
            file,
            file_name: config.file_name,
            start_marker: config.start_marker.map(|m| m.to_ascii_lowercase()),
            end_marker: config.end_marker.map(|m| m.to_ascii_lowercase()),
            max_marker_lines: config.max_marker_lines,
        })
    }

    /// The configured log path, or an empty path in cloud mode
    pub fn file_name(&self) -> &Path {
        self.file_name.as_deref().unwrap_or_else(|| Path::new(""))
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn set_start_marker(&mut self, marker: Vec<u8>) {
        self.start_marker = Some(marker.to_ascii_lowercase());
    }

    pub fn set_end_marker(&mut self, marker: Vec<u8>) {
        self.end_marker = Some(marker.to_ascii_lowercase());
    }

    pub fn start_marker(&self) -> Option<&[u8]> {
        self.start_marker.as_deref()
    }

    pub fn end_marker(&self) -> Option<&[u8]> {
        self.end_marker.as_deref()
    }

    /// Forget the markers of the previous stage
    pub fn reset_markers(&mut self) {
        self.start_marker = None;
        self.end_marker = None;
    }

    /// Search the last lines of the log for `marker`, case-insensitively.
    /// Returns the whole matching line, lower-cased.
    pub fn check_log_for_marker(&mut self, marker: &str) -> Option<Vec<u8>> {
        let needle = marker.to_ascii_lowercase().into_bytes();
        let limit = self.max_marker_lines;
        let file = self.file.as_mut()?;

        let lines = match ReverseLines::new(file) {
            Ok(lines) => lines,
            Err(e) => {
                warn!("Failed to read WAF log: {}", e);
                return None;
            }
        };

        for line in lines.take(limit) {
            match line {
                Ok(line) => {
                    let line = line.to_ascii_lowercase();
                    if contains(&line, &needle) {
                        return Some(line);
                    }
                }
                Err(e) => {
                    warn!("Failed to read WAF log: {}", e);
                    return None;
                }
            }
        }
        None
    }

    /// Lines strictly between the start and end marker, oldest first.
    /// Empty unless both markers are set and the end marker is found.
    pub fn marked_lines(&mut self) -> LogWindow {
        let (Some(start), Some(end)) = (self.start_marker.clone(), self.end_marker.clone()) else {
            return LogWindow::default();
        };
        let Some(file) = self.file.as_mut() else {
            return LogWindow::default();
        };

        let lines = match ReverseLines::new(file) {
            Ok(lines) => lines,
            Err(e) => {
                warn!("Failed to read WAF log: {}", e);
                return LogWindow::default();
            }
        };

        let mut found_end = false;
        let mut marked = Vec::new();
        for line in lines {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("Failed to read WAF log: {}", e);
                    break;
                }
            };
            let lower = line.to_ascii_lowercase();
            if !found_end {
                found_end = lower == end;
                continue;
            }
            if lower == start {
                break;
            }
            marked.push(line);
        }

        marked.reverse();
        LogWindow { lines: marked }
    }

    /// Release the file handle. Later calls are no-ops.
    pub fn close(&mut self) {
        if self.file.take().is_some() {
            debug!("Closed WAF log {}", self.file_name().display());
        }
    }
}

/// Log lines attributed to one stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogWindow {
    lines: Vec<Vec<u8>>,
}

impl LogWindow {
    pub fn new(lines: Vec<Vec<u8>>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[Vec<u8>] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Whether any line contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.lines
            .iter()
            .any(|line| String::from_utf8_lossy(line).contains(needle))
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

/// Non-empty lines of a file, last line first
struct ReverseLines<'a> {
    file: &'a mut File,
    pos: u64,
    pending: Vec<u8>,
}

impl<'a> ReverseLines<'a> {
    fn new(file: &'a mut File) -> std::io::Result<Self> {
        let pos = file.seek(SeekFrom::End(0))?;
        Ok(Self {
            file,
            pos,
            pending: Vec::new(),
        })
    }

    fn read_chunk(&mut self) -> std::io::Result<()> {
        let size = CHUNK_SIZE.min(self.pos);
        self.pos -= size;
        self.file.seek(SeekFrom::Start(self.pos))?;
        let mut chunk = vec![0u8; size as usize];
        self.file.read_exact(&mut chunk)?;
        chunk.extend_from_slice(&self.pending);
        self.pending = chunk;
        Ok(())
    }
}

impl Iterator for ReverseLines<'_> {
    type Item = std::io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(idx) = self.pending.iter().rposition(|b| *b == b'\n') {
                let line = self.pending.split_off(idx + 1);
                self.pending.truncate(idx);
                if let Some(line) = non_empty(line) {
                    return Some(Ok(line));
                }
                continue;
            }

            if self.pos == 0 {
                let line = std::mem::take(&mut self.pending);
                return non_empty(line).map(Ok);
            }

            if let Err(e) = self.read_chunk() {
                return Some(Err(e));
            }
        }
    }
}

fn non_empty(mut line: Vec<u8>) -> Option<Vec<u8>> {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    (!line.is_empty()).then_some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn log_with(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn open(path: &Path) -> LogLines {
        LogLines::open(LogLinesConfig {
            file_name: Some(path.to_path_buf()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_default_mode_requires_file_name() {
        let err = LogLines::open(LogLinesConfig::default()).unwrap_err();
        assert!(matches!(err, RunError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = LogLines::open(LogLinesConfig {
            file_name: Some(PathBuf::from("/nonexistent/waf.log")),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, RunError::LogFile { .. }));
    }

    #[test]
    fn test_cloud_mode_needs_no_file() {
        let mut ll = LogLines::open(LogLinesConfig {
            run_mode: RunMode::Cloud,
            ..Default::default()
        })
        .unwrap();
        assert!(!ll.is_open());
        assert_eq!(ll.check_log_for_marker("abc"), None);
        assert!(ll.marked_lines().is_empty());
    }

    #[test]
    fn test_marker_lookup_is_case_insensitive() {
        let log = log_with(&["first", "X-CRS-Test: abc123 seen", "last"]);
        let mut ll = open(log.path());
        let marker = ll.check_log_for_marker("ABC123").unwrap();
        assert_eq!(marker, b"x-crs-test: abc123 seen".to_vec());
    }

    #[test]
    fn test_marker_outside_scan_window_is_not_found() {
        let log = log_with(&["marker-xyz", "a", "b", "c"]);
        let mut ll = LogLines::open(LogLinesConfig {
            file_name: Some(log.path().to_path_buf()),
            max_marker_lines: 3,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(ll.check_log_for_marker("marker-xyz"), None);
    }

    #[test]
    fn test_marker_appended_after_open_is_seen() {
        let mut log = log_with(&["old line"]);
        let mut ll = open(log.path());
        assert_eq!(ll.check_log_for_marker("fresh"), None);

        writeln!(log, "fresh marker").unwrap();
        log.flush().unwrap();
        assert!(ll.check_log_for_marker("fresh").is_some());
    }

    #[test]
    fn test_marked_lines_between_markers() {
        let log = log_with(&[
            "stage one start-1",
            "stage one payload",
            "stage one end-1",
            "Start-2 header",
            "id \"920100\" matched",
            "",
            "second rule",
            "End-2 header",
            "trailing noise",
        ]);
        let mut ll = open(log.path());
        let start = ll.check_log_for_marker("start-2").unwrap();
        let end = ll.check_log_for_marker("end-2").unwrap();
        ll.set_start_marker(start);
        ll.set_end_marker(end);

        let window = ll.marked_lines();
        assert_eq!(
            window.lines(),
            &[b"id \"920100\" matched".to_vec(), b"second rule".to_vec()]
        );
        assert!(window.contains("id \"920100\""));
        assert!(!window.contains("payload"));
    }

    #[test]
    fn test_marked_lines_need_both_markers() {
        let log = log_with(&["a", "b"]);
        let mut ll = open(log.path());
        ll.set_start_marker(b"a".to_vec());
        assert!(ll.marked_lines().is_empty());
    }

    #[test]
    fn test_reverse_lines_across_chunks() {
        let long = "x".repeat(CHUNK_SIZE as usize + 10);
        let log = log_with(&["head", &long, "tail\r"]);
        let mut file = File::open(log.path()).unwrap();
        let lines: Vec<Vec<u8>> = ReverseLines::new(&mut file)
            .unwrap()
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], b"tail".to_vec());
        assert_eq!(lines[1].len(), long.len());
        assert_eq!(lines[2], b"head".to_vec());
    }

    #[test]
    fn test_close_is_idempotent() {
        let log = log_with(&["a"]);
        let mut ll = open(log.path());
        ll.close();
        assert!(!ll.is_open());
        ll.close();
        assert_eq!(ll.check_log_for_marker("a"), None);
    }
}
