use async_trait::async_trait;
use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::SubtitleError;
use crate::language_utils;

// @module: Subtitle reading, writing and output naming

// @struct: Single subtitle entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleEntry {
    // @field: Sequence number
    pub seq_num: usize,

    // @field: Start time in ms
    pub start_time_ms: u64,

    // @field: End time in ms
    pub end_time_ms: u64,

    // @field: Subtitle text, one element per displayed line
    pub lines: Vec<String>,
}

impl SubtitleEntry {
    pub fn new(seq_num: usize, start_time_ms: u64, end_time_ms: u64, lines: Vec<String>) -> Self {
        SubtitleEntry {
            seq_num,
            start_time_ms,
            end_time_ms,
            lines,
        }
    }

    // @creates: Validated subtitle entry
    // @validates: Time range and non-empty text
    pub fn new_validated(
        seq_num: usize,
        start_time_ms: u64,
        end_time_ms: u64,
        lines: Vec<String>,
    ) -> Result<Self> {
        if end_time_ms <= start_time_ms {
            return Err(anyhow!(
                "Invalid time range: end time {} <= start time {}",
                end_time_ms,
                start_time_ms
            ));
        }

        let lines: Vec<String> = lines
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        if lines.is_empty() {
            return Err(anyhow!("Empty subtitle text for entry {}", seq_num));
        }

        Ok(SubtitleEntry {
            seq_num,
            start_time_ms,
            end_time_ms,
            lines,
        })
    }

    /// Parse an SRT timestamp (HH:MM:SS,mmm) to milliseconds
    pub fn parse_timestamp(timestamp: &str) -> Result<u64> {
        let parts: Vec<&str> = timestamp.trim().split(&[':', ',', '.'][..]).collect();

        if parts.len() != 4 {
            return Err(anyhow!("Invalid timestamp format: {}", timestamp));
        }

        let hours: u64 = parts[0].parse().context("Failed to parse hours")?;
        let minutes: u64 = parts[1].parse().context("Failed to parse minutes")?;
        let seconds: u64 = parts[2].parse().context("Failed to parse seconds")?;
        let millis: u64 = parts[3].parse().context("Failed to parse milliseconds")?;

        if minutes >= 60 || seconds >= 60 || millis >= 1000 {
            return Err(anyhow!("Invalid time components in timestamp: {}", timestamp));
        }

        hours
            .checked_mul(3_600_000)
            .and_then(|ms| ms.checked_add(minutes * 60_000 + seconds * 1_000 + millis))
            .ok_or_else(|| anyhow!("Timestamp out of range: {}", timestamp))
    }

    /// Parse an SRT timing line (`start --> end`)
    pub fn parse_timing(line: &str) -> Result<(u64, u64)> {
        let (start, end) = line
            .split_once("-->")
            .ok_or_else(|| anyhow!("Missing '-->' in timing line: {}", line))?;
        // Position cues may follow the end timestamp
        let end = end.split_whitespace().next().unwrap_or_default();
        Ok((Self::parse_timestamp(start)?, Self::parse_timestamp(end)?))
    }

    /// Format a timestamp in milliseconds to SRT format (HH:MM:SS,mmm)
    pub fn format_timestamp(ms: u64) -> String {
        let hours = ms / 3_600_000;
        let minutes = (ms % 3_600_000) / 60_000;
        let seconds = (ms % 60_000) / 1_000;
        let millis = ms % 1_000;

        format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
    }
}

impl fmt::Display for SubtitleEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.seq_num)?;
        writeln!(
            f,
            "{} --> {}",
            Self::format_timestamp(self.start_time_ms),
            Self::format_timestamp(self.end_time_ms)
        )?;
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        writeln!(f)
    }
}

/// Parse SRT content into subtitle entries
///
/// Malformed blocks are skipped with a warning; content without a single
/// valid block is an error. Entries are renumbered from 1 in start order.
pub fn parse_srt_string(content: &str) -> Result<Vec<SubtitleEntry>> {
    let content = content.trim_start_matches('\u{feff}').replace("\r\n", "\n");
    let mut entries = Vec::new();

    for (block_idx, block) in content.split("\n\n").enumerate() {
        let mut lines = block.lines().map(str::trim).filter(|l| !l.is_empty());
        let Some(first) = lines.next() else {
            continue;
        };

        // The sequence number is optional in the wild
        let (seq_num, timing) = match first.parse::<usize>() {
            Ok(num) => (num, lines.next().unwrap_or_default()),
            Err(_) => (block_idx + 1, first),
        };

        let parsed = SubtitleEntry::parse_timing(timing).and_then(|(start, end)| {
            SubtitleEntry::new_validated(seq_num, start, end, lines.map(str::to_string).collect())
        });
        match parsed {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!("Skipping invalid subtitle block {}: {}", block_idx + 1, e),
        }
    }

    if entries.is_empty() {
        return Err(anyhow!("No valid subtitle entries were found in the SRT content"));
    }

    entries.sort_by_key(|entry| entry.start_time_ms);
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.seq_num = i + 1;
    }

    Ok(entries)
}

/// Render entries as SRT content
pub fn format_srt(entries: &[SubtitleEntry]) -> String {
    entries.iter().map(|e| e.to_string()).collect()
}

/// Derive the output path for a translated subtitle.
///
/// `dir/movie.srt` becomes `dir/movie.fr.srt`; a trailing two-letter
/// language marker is replaced, so `movie.en.srt` also becomes
/// `movie.fr.srt`.
pub fn create_file_path(source: &Path, target_language: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = source
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "srt".to_string());

    let base = match stem.rsplit_once('.') {
        Some((base, marker))
            if !base.is_empty() && marker.len() == 2 && language_utils::is_language_code(marker) =>
        {
            base.to_string()
        }
        _ => stem,
    };

    source.with_file_name(format!("{}.{}.{}", base, target_language, extension))
}

/// Reads and writes subtitle files for the job orchestrator
#[async_trait]
pub trait SubtitleIo: Send + Sync {
    async fn read_subtitles(&self, path: &Path) -> Result<Vec<SubtitleEntry>, SubtitleError>;

    async fn write_subtitles(&self, path: &Path, entries: &[SubtitleEntry]) -> Result<(), SubtitleError>;

    fn create_file_path(&self, source: &Path, target_language: &str) -> PathBuf {
        create_file_path(source, target_language)
    }
}

/// SRT files on the local filesystem
#[derive(Debug, Default, Clone)]
pub struct SrtSubtitles;

#[async_trait]
impl SubtitleIo for SrtSubtitles {
    async fn read_subtitles(&self, path: &Path) -> Result<Vec<SubtitleEntry>, SubtitleError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SubtitleError::Read {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        let entries = parse_srt_string(&content).map_err(|e| SubtitleError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        debug!("Read {} subtitle entries from {}", entries.len(), path.display());
        Ok(entries)
    }

    async fn write_subtitles(&self, path: &Path, entries: &[SubtitleEntry]) -> Result<(), SubtitleError> {
        let write_error = |e: std::io::Error| SubtitleError::Write {
            path: path.display().to_string(),
            message: e.to_string(),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_error)?;
        }
        tokio::fs::write(path, format_srt(entries)).await.map_err(write_error)?;

        debug!("Wrote {} subtitle entries to {}", entries.len(), path.display());
        Ok(())
    }
}
