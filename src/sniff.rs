use log::warn;
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::constants::SNIFF_HEADER_LEN;

/// Container format detected for a stored file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContainerFormat {
    #[serde(rename = "WAV")]
    Wav,
    /// Has a WAV extension but no RIFF/WAVE header
    #[serde(rename = "WAV (non-standard)")]
    WavNonStandard,
    #[serde(rename = "OGG")]
    Ogg,
    #[serde(rename = "FLAC")]
    Flac,
    #[serde(rename = "MP3")]
    Mp3,
    #[serde(rename = "WebM")]
    WebM,
    #[serde(rename = "MP4")]
    Mp4,
    Unknown,
}

impl ContainerFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerFormat::Wav => "WAV",
            ContainerFormat::WavNonStandard => "WAV (non-standard)",
            ContainerFormat::Ogg => "OGG",
            ContainerFormat::Flac => "FLAC",
            ContainerFormat::Mp3 => "MP3",
            ContainerFormat::WebM => "WebM",
            ContainerFormat::Mp4 => "MP4",
            ContainerFormat::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a file by its magic bytes, then by its extension.
///
/// Read errors are logged and reported as `Unknown`.
pub fn detect_format(path: &Path) -> ContainerFormat {
    match read_header(path) {
        Ok(header) => from_magic(&header).unwrap_or_else(|| from_extension(path)),
        Err(e) => {
            warn!("Error detecting format for {}: {}", path.display(), e);
            ContainerFormat::Unknown
        }
    }
}

fn read_header(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut header = Vec::with_capacity(SNIFF_HEADER_LEN);
    file.take(SNIFF_HEADER_LEN as u64).read_to_end(&mut header)?;
    Ok(header)
}

/// Match leading bytes against known signatures, in priority order
pub fn from_magic(header: &[u8]) -> Option<ContainerFormat> {
    if header.starts_with(b"RIFF") && header.get(8..12) == Some(&b"WAVE"[..]) {
        Some(ContainerFormat::Wav)
    } else if header.starts_with(b"OggS") {
        Some(ContainerFormat::Ogg)
    } else if header.starts_with(b"fLaC") {
        Some(ContainerFormat::Flac)
    } else if header.starts_with(b"ID3")
        || header.starts_with(&[0xFF, 0xFB])
        || header.starts_with(&[0xFF, 0xF3])
    {
        Some(ContainerFormat::Mp3)
    } else if header.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        Some(ContainerFormat::WebM)
    } else if header.starts_with(&[0x00, 0x00, 0x00, 0x20, 0x66, 0x74, 0x79, 0x70]) {
        Some(ContainerFormat::Mp4)
    } else {
        None
    }
}

pub fn from_extension(path: &Path) -> ContainerFormat {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("wav") | Some("wave") => ContainerFormat::WavNonStandard,
        Some("mp3") => ContainerFormat::Mp3,
        Some("ogg") | Some("oga") => ContainerFormat::Ogg,
        Some("flac") => ContainerFormat::Flac,
        Some("webm") => ContainerFormat::WebM,
        Some("m4a") | Some("mp4") => ContainerFormat::Mp4,
        _ => ContainerFormat::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_magic_bytes_take_priority_over_extension() {
        let dir = tempfile::tempdir().unwrap();
        let cases: Vec<(&[u8], ContainerFormat)> = vec![
            (&b"RIFF\x24\x00\x00\x00WAVEfmt "[..], ContainerFormat::Wav),
            (&b"OggS\x00\x02\x00\x00\x00\x00\x00\x00"[..], ContainerFormat::Ogg),
            (&b"fLaC\x00\x00\x00\x22\x00\x00\x00\x00"[..], ContainerFormat::Flac),
            (&b"ID3\x04\x00\x00\x00\x00\x00\x00\x00\x00"[..], ContainerFormat::Mp3),
            (&b"\xFF\xFB\x90\x64\x00\x00\x00\x00\x00\x00\x00\x00"[..], ContainerFormat::Mp3),
            (&b"\xFF\xF3\x90\x64\x00\x00\x00\x00\x00\x00\x00\x00"[..], ContainerFormat::Mp3),
            (&b"\x1A\x45\xDF\xA3\x9F\x42\x86\x81\x01\x00\x00\x00"[..], ContainerFormat::WebM),
            (&b"\x00\x00\x00\x20ftypM4A "[..], ContainerFormat::Mp4),
        ];

        for (i, (bytes, expected)) in cases.into_iter().enumerate() {
            // Deliberately misleading extension
            let path = write_file(dir.path(), &format!("file_{}.flac", i), bytes);
            assert_eq!(detect_format(&path), expected, "case {}", i);
        }
    }

    #[test]
    fn test_extension_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let junk = b"not audio at all";

        assert_eq!(detect_format(&write_file(dir.path(), "a.flac", junk)), ContainerFormat::Flac);
        assert_eq!(
            detect_format(&write_file(dir.path(), "b.wav", junk)),
            ContainerFormat::WavNonStandard
        );
        assert_eq!(detect_format(&write_file(dir.path(), "c.WEBM", junk)), ContainerFormat::WebM);
        assert_eq!(detect_format(&write_file(dir.path(), "d.m4a", junk)), ContainerFormat::Mp4);
        assert_eq!(detect_format(&write_file(dir.path(), "e.bin", junk)), ContainerFormat::Unknown);
        assert_eq!(detect_format(&write_file(dir.path(), "noext", junk)), ContainerFormat::Unknown);
    }

    #[test]
    fn test_riff_without_wave_is_not_wav() {
        assert_eq!(from_magic(b"RIFF\x00\x00\x00\x00AVI LIST"), None);
        assert_eq!(from_magic(b"RIFF"), None);
    }

    #[test]
    fn test_missing_file_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detect_format(&dir.path().join("gone.wav")), ContainerFormat::Unknown);
    }

    #[test]
    fn test_serializes_as_display_tag() {
        let json = serde_json::to_string(&ContainerFormat::WavNonStandard).unwrap();
        assert_eq!(json, "\"WAV (non-standard)\"");
        assert_eq!(ContainerFormat::Unknown.to_string(), "Unknown");
    }
}
