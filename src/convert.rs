use bytes::Bytes;
use chrono::Local;
use hound::WavWriter;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::audio::{quantize, PcmAudio};
use crate::constants::{
    FILENAME_TIMESTAMP_FORMAT, RECORDING_EXTENSION, RECORDING_PREFIX, TEMP_PREFIX,
};
use crate::decode::{DecodeError, Transcoder};
use crate::quality::{QualityProfile, QualityTier};
use crate::status::{Phase, Stage, StatusTracker};

/// Same-second uploads beyond this many give up instead of probing further
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// One uploaded recording, as received from the client
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub data: Bytes,
    /// Raw `quality` form value
    pub quality: String,
    /// Client-reported capture settings. Accepted but never applied; the
    /// quality tier decides the output format.
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    /// File name of the multipart part, if the client sent one
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

impl UploadRequest {
    pub fn new(data: impl Into<Bytes>, quality: impl Into<String>) -> Self {
        UploadRequest {
            data: data.into(),
            quality: quality.into(),
            sample_rate: None,
            channels: None,
            file_name: None,
            content_type: None,
        }
    }
}

/// Result reported back to the uploading client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UploadOutcome {
    Converted {
        success: bool,
        filename: String,
        quality: String,
        sample_rate: u32,
        bit_depth: u16,
        channels: u16,
        duration: f64,
    },
    /// Conversion was skipped or failed; the upload was stored verbatim
    StoredRaw {
        success: bool,
        filename: String,
        warning: String,
    },
}

impl UploadOutcome {
    pub fn filename(&self) -> &str {
        match self {
            UploadOutcome::Converted { filename, .. } => filename,
            UploadOutcome::StoredRaw { filename, .. } => filename,
        }
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    /// Nothing usable was stored
    #[error("Upload failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Upload → temp file → decode → transform → WAV pipeline
#[derive(Debug, Clone)]
pub struct ConversionPipeline {
    dir: PathBuf,
    transcoder: Transcoder,
}

impl ConversionPipeline {
    pub fn new(dir: PathBuf, transcoder: Transcoder) -> Self {
        ConversionPipeline { dir, transcoder }
    }

    /// Store one upload, converting it to the requested quality when
    /// possible and falling back to the raw bytes otherwise.
    ///
    /// Only a failure to store anything at all is an error.
    pub fn process(
        &self,
        request: &UploadRequest,
        status: &StatusTracker,
    ) -> Result<UploadOutcome, UploadError> {
        let timestamp = Local::now().format(FILENAME_TIMESTAMP_FORMAT).to_string();
        let tier = QualityTier::from_form(&request.quality);
        let profile = tier.profile();

        status.begin_upload();

        if request.sample_rate.is_some() || request.channels.is_some() {
            debug!(
                "Ignoring client capture hints (sample_rate={:?}, channels={:?}); using {} profile",
                request.sample_rate,
                request.channels,
                tier.as_str()
            );
        }

        let received = self.receive(request, &timestamp).and_then(|temp| {
            let reserved = self.reserve_name(&timestamp, &request.quality)?;
            Ok((temp, reserved))
        });
        let (temp, (filename, final_file)) = match received {
            Ok(received) => received,
            Err(e) => {
                error!("Failed to store upload: {}", e);
                status.fail(Stage::AudioProcessing, e.to_string());
                return Err(e.into());
            }
        };
        let final_path = self.dir.join(&filename);

        let converted = final_file
            .try_clone()
            .map_err(DecodeError::from)
            .and_then(|output| self.convert(temp.path(), &profile, output, status));

        match converted {
            Ok(duration) => {
                remove_temp(temp);
                status.set(Stage::AudioProcessing, Phase::Success);
                status.set(Stage::FileConversion, Phase::Success);
                info!(
                    "Saved {} ({} Hz, {}-bit, {} ch, {:.2}s)",
                    filename, profile.sample_rate, profile.bits_per_sample, profile.channels, duration
                );

                Ok(UploadOutcome::Converted {
                    success: true,
                    filename,
                    quality: request.quality.clone(),
                    sample_rate: profile.sample_rate,
                    bit_depth: profile.bits_per_sample,
                    channels: profile.channels,
                    duration,
                })
            }
            Err(e) => {
                let warning = match e {
                    DecodeError::Unavailable(_) => "Audio conversion not available",
                    DecodeError::Failed(_) => "Conversion failed",
                };
                warn!("{} for {}: {}; storing upload as received", warning, filename, e);
                status.fail(Stage::FileConversion, e.to_string());

                remove_temp(temp);
                if let Err(e) = store_raw(&final_path, &final_file, &request.data) {
                    error!("Failed to store raw upload {}: {}", filename, e);
                    status.fail(Stage::AudioProcessing, e.to_string());
                    return Err(e.into());
                }
                status.set(Stage::AudioProcessing, Phase::Success);

                Ok(UploadOutcome::StoredRaw {
                    success: true,
                    filename,
                    warning: warning.to_string(),
                })
            }
        }
    }

    /// Persist the raw upload to a temp file next to the recordings
    fn receive(&self, request: &UploadRequest, timestamp: &str) -> std::io::Result<NamedTempFile> {
        fs::create_dir_all(&self.dir)?;

        let prefix = format!("{}{}_", TEMP_PREFIX, timestamp);
        let suffix = upload_extension(request.file_name.as_deref(), request.content_type.as_deref())
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();

        let mut temp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&suffix)
            .tempfile_in(&self.dir)?;
        temp.write_all(&request.data)?;
        temp.flush()?;

        debug!("Received {} bytes into {}", request.data.len(), temp.path().display());
        Ok(temp)
    }

    /// Claim `recording_<timestamp>_<quality>.wav`, adding `_2`, `_3`, ...
    /// when an earlier upload in the same second already holds the name.
    fn reserve_name(&self, timestamp: &str, quality: &str) -> std::io::Result<(String, File)> {
        let base = format!("{}{}_{}", RECORDING_PREFIX, timestamp, filename_label(quality));

        for attempt in 1..=MAX_NAME_ATTEMPTS {
            let filename = if attempt == 1 {
                format!("{}.{}", base, RECORDING_EXTENSION)
            } else {
                format!("{}_{}.{}", base, attempt, RECORDING_EXTENSION)
            };

            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.dir.join(&filename))
            {
                Ok(file) => return Ok((filename, file)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("no free file name for {} after {} attempts", base, MAX_NAME_ATTEMPTS),
        ))
    }

    /// Decode the temp file and write it to `output` at the target profile.
    /// Returns the duration of the converted audio.
    fn convert(
        &self,
        input: &Path,
        profile: &QualityProfile,
        output: File,
        status: &StatusTracker,
    ) -> Result<f64, DecodeError> {
        let audio = self
            .transcoder
            .decode_file(input)?
            .set_frame_rate(profile.sample_rate)
            .set_sample_width(profile.bits_per_sample)
            .set_channels(profile.channels);

        status.set(Stage::FileConversion, Phase::Processing);
        debug!("Encoding WAV with {}", profile.codec_name());

        write_wav(&audio, profile, output)?;
        Ok(audio.duration_secs())
    }
}

/// Encode PCM as WAV with the profile's rate, channels and integer depth
pub fn write_wav(audio: &PcmAudio, profile: &QualityProfile, output: File) -> Result<(), DecodeError> {
    let mut writer = WavWriter::new(BufWriter::new(output), profile.wav_spec())?;
    for &sample in &audio.samples {
        writer.write_sample(quantize(sample, profile.bits_per_sample))?;
    }
    writer.finalize()?;
    Ok(())
}

/// Overwrite the reserved recording with the upload as received. On failure
/// the reserved name is released again.
fn store_raw(path: &Path, file: &File, data: &[u8]) -> std::io::Result<()> {
    let write = |mut file: &File| -> std::io::Result<()> {
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(data)?;
        file.flush()
    };

    let result = write(file);
    if result.is_err() {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to release {}: {}", path.display(), e);
        }
    }
    result
}

fn remove_temp(temp: NamedTempFile) {
    let path = temp.path().to_path_buf();
    if let Err(e) = temp.close() {
        warn!("Failed to remove temp file {}: {}", path.display(), e);
    }
}

/// Quality value as it appears in a file name; only `[A-Za-z0-9_-]` survive
fn filename_label(quality: &str) -> String {
    let label: String = quality
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(32)
        .collect();
    if label.is_empty() {
        QualityTier::from_form(quality).as_str().to_string()
    } else {
        label
    }
}

/// Format hint for the decoder: the part's file extension, else one implied
/// by its content type, else none (the decoder probes the content).
fn upload_extension(file_name: Option<&str>, content_type: Option<&str>) -> Option<String> {
    let from_name = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase());
    if from_name.is_some() {
        return from_name;
    }

    let mime = content_type?
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let ext = match mime.as_str() {
        "audio/webm" | "video/webm" => "webm",
        "audio/ogg" | "application/ogg" => "ogg",
        "audio/wav" | "audio/wave" | "audio/x-wav" | "audio/vnd.wave" => "wav",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/x-m4a" | "video/mp4" => "mp4",
        "audio/flac" | "audio/x-flac" => "flac",
        "audio/aac" => "aac",
        _ => return None,
    };
    Some(ext.to_string())
}
