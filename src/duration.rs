use log::{debug, warn};
use std::path::Path;

use crate::constants::ESTIMATE_BYTES_PER_SECOND;
use crate::decode::{DecodeError, Transcoder};
use crate::sniff::{detect_format, ContainerFormat};

/// Outcome of one duration strategy
#[derive(Debug)]
enum Attempt {
    Seconds(f64),
    /// This strategy cannot answer; let the next one try
    Fallthrough(String),
    /// Stop; the duration is unknown
    GiveUp(String),
}

type Strategy = fn(&Path, Transcoder) -> Attempt;

/// Tried in order until one produces a duration or gives up
const STRATEGIES: &[(&str, Strategy)] = &[
    ("wav header", from_wav_header),
    ("full decode", from_full_decode),
    ("size estimate", from_file_size),
];

/// Playable duration of a stored recording in seconds, or `None` when it
/// cannot be determined.
pub fn audio_duration(path: &Path, transcoder: Transcoder) -> Option<f64> {
    for (name, strategy) in STRATEGIES {
        match strategy(path, transcoder) {
            Attempt::Seconds(secs) => {
                debug!("Duration of {} from {}: {:.3}s", path.display(), name, secs);
                return Some(secs);
            }
            Attempt::Fallthrough(reason) => {
                warn!("{} failed for {}: {}", name, path.display(), reason);
            }
            Attempt::GiveUp(reason) => {
                warn!("Could not determine duration for {}: {}", path.display(), reason);
                return None;
            }
        }
    }
    None
}

fn from_wav_header(path: &Path, _transcoder: Transcoder) -> Attempt {
    match hound::WavReader::open(path) {
        Ok(reader) => {
            let rate = reader.spec().sample_rate;
            if rate == 0 {
                return Attempt::Fallthrough("sample rate is zero".to_string());
            }
            Attempt::Seconds(reader.duration() as f64 / rate as f64)
        }
        // RIFF/WAVE preamble present but the chunks are cut short; hound
        // reports the short read as a plain I/O error
        Err(hound::Error::IoError(e)) if detect_format(path) == ContainerFormat::Wav => {
            Attempt::Fallthrough(format!("truncated WAV: {}", e))
        }
        Err(hound::Error::IoError(e)) => Attempt::GiveUp(e.to_string()),
        // Malformed or non-standard container: worth a full decode
        Err(e) => Attempt::Fallthrough(format!("non-standard WAV format: {}", e)),
    }
}

fn from_full_decode(path: &Path, transcoder: Transcoder) -> Attempt {
    match transcoder.decode_file(path) {
        Ok(audio) => Attempt::Seconds(audio.duration_secs()),
        Err(DecodeError::Unavailable(reason)) => Attempt::Fallthrough(reason),
        Err(DecodeError::Failed(reason)) => Attempt::GiveUp(reason),
    }
}

/// Rough guess assuming 16-bit stereo at 44.1kHz
fn from_file_size(path: &Path, _transcoder: Transcoder) -> Attempt {
    match std::fs::metadata(path) {
        Ok(meta) => {
            let estimated = meta.len() as f64 / ESTIMATE_BYTES_PER_SECOND;
            debug!("Estimated duration for {}: {:.2}s", path.display(), estimated);
            Attempt::Seconds(estimated)
        }
        Err(e) => Attempt::GiveUp(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};
    use std::fs;

    fn write_silence(path: &Path, sample_rate: u32, channels: u16, secs: u32) {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for _ in 0..(sample_rate * secs * channels as u32) {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_standard_wav_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two_seconds.wav");
        write_silence(&path, 44100, 2, 2);

        let duration = audio_duration(&path, Transcoder::Enabled).unwrap();
        assert!((duration - 2.0).abs() < 1e-6, "got {}", duration);
    }

    #[test]
    fn test_size_estimate_when_decoder_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw_upload.wav");
        let bytes = vec![0x42u8; 352_800];
        fs::write(&path, &bytes).unwrap();

        let duration = audio_duration(&path, Transcoder::Disabled).unwrap();
        assert!((duration - 352_800.0 / 176_400.0).abs() < 1e-9);
    }

    #[test]
    fn test_header_only_wav_falls_back_to_estimate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("header_only.wav");
        fs::write(&path, b"RIFF\x04\x00\x00\x00WAVE").unwrap();

        let duration = audio_duration(&path, Transcoder::Disabled).unwrap();
        assert!((duration - 12.0 / 176_400.0).abs() < 1e-12);
    }

    #[test]
    fn test_undecodable_file_has_no_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        fs::write(&path, b"this is definitely not audio data").unwrap();

        assert_eq!(audio_duration(&path, Transcoder::Enabled), None);
    }

    #[test]
    fn test_missing_file_has_no_duration() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            audio_duration(&dir.path().join("missing.wav"), Transcoder::Disabled),
            None
        );
    }
}
