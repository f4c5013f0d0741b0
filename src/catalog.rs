use chrono::{DateTime, Local};
use log::{info, warn};
use serde::Serialize;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

use crate::constants::{
    BYTES_PER_GB, BYTES_PER_MB, DEBUG_HEADER_LEN, DISPLAY_TIMESTAMP_FORMAT, RECORDING_EXTENSION,
    TEMP_PREFIX,
};
use crate::decode::Transcoder;
use crate::duration::audio_duration;
use crate::sniff::{detect_format, ContainerFormat};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("File not found")]
    NotFound,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Metadata derived for one stored recording
#[derive(Debug, Clone, Serialize)]
pub struct RecordingInfo {
    pub filename: String,
    pub size_mb: f64,
    pub duration: Option<f64>,
    pub format: ContainerFormat,
    pub created: String,
    pub modified: String,
}

/// Diagnostic dump of a single file
#[derive(Debug, Clone, Serialize)]
pub struct DebugInfo {
    pub filename: String,
    pub filepath: String,
    pub size_bytes: u64,
    pub size_mb: f64,
    pub format_detected: ContainerFormat,
    pub duration_seconds: Option<f64>,
    pub duration_formatted: String,
    pub file_header_hex: String,
    pub file_header_ascii: String,
    pub created: String,
    pub modified: String,
}

/// Aggregate recording stats plus usage of the disk holding them
#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub recordings_count: usize,
    pub total_size_mb: f64,
    pub disk_free_gb: f64,
    pub disk_total_gb: f64,
    pub disk_percent: f64,
}

/// The recordings directory. Everything is derived from the filesystem on
/// every call; there is no index.
#[derive(Debug, Clone)]
pub struct Catalog {
    dir: PathBuf,
    transcoder: Transcoder,
}

impl Catalog {
    pub fn new(dir: PathBuf, transcoder: Transcoder) -> Self {
        Catalog { dir, transcoder }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Map a client-supplied name to a path inside the directory.
    ///
    /// Returns `None` for anything that could escape it.
    pub fn resolve(&self, filename: &str) -> Option<PathBuf> {
        if filename.is_empty()
            || filename == "."
            || filename == ".."
            || filename.contains(['/', '\\', '\0'])
        {
            return None;
        }
        Some(self.dir.join(filename))
    }

    /// All recordings, newest modification first. Entries whose metadata
    /// cannot be read are left out.
    pub fn list(&self) -> Result<Vec<RecordingInfo>, CatalogError> {
        let mut recordings: Vec<RecordingInfo> = self
            .recording_names()?
            .iter()
            .filter_map(|name| self.file_info(name))
            .collect();

        // Fixed-width timestamp strings sort chronologically
        recordings.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(recordings)
    }

    pub fn file_info(&self, filename: &str) -> Option<RecordingInfo> {
        let path = self.resolve(filename)?;
        let meta = match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return None,
            Err(e) => {
                warn!("Error getting file info for {}: {}", filename, e);
                return None;
            }
        };
        let (created, modified) = match timestamps(&meta) {
            Ok(times) => times,
            Err(e) => {
                warn!("Error reading timestamps for {}: {}", filename, e);
                return None;
            }
        };

        Some(RecordingInfo {
            filename: filename.to_string(),
            size_mb: round_to(meta.len() as f64 / BYTES_PER_MB, 2),
            duration: audio_duration(&path, self.transcoder),
            format: detect_format(&path),
            created,
            modified,
        })
    }

    /// Remove a recording. A missing file is reported as `NotFound`.
    pub fn delete(&self, filename: &str) -> Result<(), CatalogError> {
        let path = self.resolve(filename).ok_or(CatalogError::NotFound)?;
        if !path.is_file() {
            return Err(CatalogError::NotFound);
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Deleted recording {}", filename);
                Ok(())
            }
            // Lost a race with another delete
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CatalogError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    pub fn debug_info(&self, filename: &str) -> Result<DebugInfo, CatalogError> {
        let path = self.resolve(filename).ok_or(CatalogError::NotFound)?;
        if !path.is_file() {
            return Err(CatalogError::NotFound);
        }
        debug_info_for_path(&path, self.transcoder)
    }

    pub fn stats(&self) -> Result<SystemInfo, CatalogError> {
        let names = self.recording_names()?;
        let total_bytes: u64 = names
            .iter()
            .filter_map(|name| fs::metadata(self.dir.join(name)).ok())
            .map(|meta| meta.len())
            .sum();

        let disk_total = fs2::total_space(&self.dir)?;
        let disk_free = fs2::free_space(&self.dir)?;
        let disk_available = fs2::available_space(&self.dir)?;
        let disk_used = disk_total.saturating_sub(disk_free);
        let disk_percent = if disk_total == 0 {
            0.0
        } else {
            disk_used as f64 / disk_total as f64 * 100.0
        };

        Ok(SystemInfo {
            recordings_count: names.len(),
            total_size_mb: round_to(total_bytes as f64 / BYTES_PER_MB, 2),
            disk_free_gb: round_to(disk_available as f64 / BYTES_PER_GB, 2),
            disk_total_gb: round_to(disk_total as f64 / BYTES_PER_GB, 2),
            disk_percent: round_to(disk_percent, 1),
        })
    }

    /// Names of finished `.wav` entries in the directory
    fn recording_names(&self) -> Result<Vec<String>, CatalogError> {
        let suffix = format!(".{}", RECORDING_EXTENSION);
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };
            if let Some(name) = entry.file_name().to_str() {
                // In-flight uploads live here too until converted
                if name.ends_with(&suffix) && !name.starts_with(TEMP_PREFIX) {
                    names.push(name.to_string());
                }
            }
        }

        Ok(names)
    }
}

/// Diagnostic dump for any file on disk
pub fn debug_info_for_path(path: &Path, transcoder: Transcoder) -> Result<DebugInfo, CatalogError> {
    let meta = fs::metadata(path)?;
    let (created, modified) = timestamps(&meta)?;
    let duration = audio_duration(path, transcoder);

    let mut header = Vec::with_capacity(DEBUG_HEADER_LEN);
    File::open(path)?
        .take(DEBUG_HEADER_LEN as u64)
        .read_to_end(&mut header)?;

    let filepath = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

    Ok(DebugInfo {
        filename: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        filepath: filepath.display().to_string(),
        size_bytes: meta.len(),
        size_mb: round_to(meta.len() as f64 / BYTES_PER_MB, 2),
        format_detected: detect_format(path),
        duration_seconds: duration,
        duration_formatted: format_duration(duration),
        file_header_hex: header.iter().map(|b| format!("{:02x}", b)).collect(),
        file_header_ascii: header
            .iter()
            .map(|&b| if (32..=126).contains(&b) { b as char } else { '.' })
            .collect(),
        created,
        modified,
    })
}

/// `M:SS`, or `Unknown` for a missing or zero duration
pub fn format_duration(seconds: Option<f64>) -> String {
    match seconds {
        Some(secs) if secs > 0.0 => {
            let minutes = (secs / 60.0).floor() as u64;
            let remaining = (secs % 60.0).floor() as u64;
            format!("{}:{:02}", minutes, remaining)
        }
        _ => "Unknown".to_string(),
    }
}

fn timestamps(meta: &fs::Metadata) -> std::io::Result<(String, String)> {
    let modified = meta.modified()?;
    // Not every filesystem records a birth time
    let created = meta.created().unwrap_or(modified);
    Ok((format_time(created), format_time(modified)))
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time)
        .format(DISPLAY_TIMESTAMP_FORMAT)
        .to_string()
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
