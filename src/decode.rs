use log::{debug, warn};
use opus::{Channels, Decoder as OpusDecoder};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{
    CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_NULL, CODEC_TYPE_OPUS,
};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use crate::audio::PcmAudio;

/// Opus always decodes at 48kHz
const OPUS_SAMPLE_RATE: u32 = 48000;

/// Largest Opus frame is 120ms
const OPUS_MAX_FRAME_SAMPLES: usize = 5760;

#[derive(Debug, Error)]
pub enum DecodeError {
    /// The decode/encode capability is switched off or missing
    #[error("audio conversion not available: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Failed(String),
}

impl From<SymphoniaError> for DecodeError {
    fn from(e: SymphoniaError) -> Self {
        DecodeError::Failed(e.to_string())
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(e: std::io::Error) -> Self {
        DecodeError::Failed(e.to_string())
    }
}

impl From<opus::Error> for DecodeError {
    fn from(e: opus::Error) -> Self {
        DecodeError::Failed(format!("Opus decode error: {}", e))
    }
}

impl From<hound::Error> for DecodeError {
    fn from(e: hound::Error) -> Self {
        DecodeError::Failed(format!("WAV encode error: {}", e))
    }
}

/// Handle to the general-purpose audio decoder.
///
/// `Disabled` behaves like a missing decoding library: every call reports
/// [`DecodeError::Unavailable`] so callers take their degraded path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transcoder {
    Enabled,
    Disabled,
}

impl Transcoder {
    pub fn from_config(enabled: bool) -> Self {
        if enabled {
            Transcoder::Enabled
        } else {
            Transcoder::Disabled
        }
    }

    pub fn ensure_available(&self) -> Result<(), DecodeError> {
        match self {
            Transcoder::Enabled => Ok(()),
            Transcoder::Disabled => Err(DecodeError::Unavailable(
                "transcoding disabled in configuration".to_string(),
            )),
        }
    }

    /// Decode a whole file to interleaved f32 PCM.
    ///
    /// The file extension, when present, is passed to the prober as a hint;
    /// otherwise the container is detected from content.
    pub fn decode_file(&self, path: &Path) -> Result<PcmAudio, DecodeError> {
        self.ensure_available()?;

        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::Failed("No audio track found".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();
        let mut decoder = PacketDecoder::for_track(&codec_params)?;

        let mut samples: Vec<f32> = Vec::new();
        let mut packets_decoded = 0u64;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != track_id {
                continue;
            }

            decoder.decode(&packet, &mut samples)?;
            packets_decoded += 1;
        }

        let (sample_rate, channels) = decoder
            .output_format()
            .ok_or_else(|| DecodeError::Failed("Unknown sample rate or channel count".to_string()))?;

        if samples.is_empty() {
            return Err(DecodeError::Failed(format!(
                "No audio decoded from {}",
                path.display()
            )));
        }

        debug!(
            "Decoded {} packets from {}: {} Hz, {} channels, {} samples",
            packets_decoded,
            path.display(),
            sample_rate,
            channels,
            samples.len()
        );

        Ok(PcmAudio {
            samples,
            sample_rate,
            channels,
        })
    }
}

/// Symphonia ships no Opus decoder, so Opus tracks demuxed by symphonia
/// (WebM, Ogg) go through libopus instead.
enum PacketDecoder {
    Symphonia {
        decoder: Box<dyn Decoder>,
        format: Option<(u32, u16)>,
    },
    Opus {
        decoder: OpusDecoder,
        channels: u16,
        buffer: Vec<f32>,
    },
}

impl PacketDecoder {
    fn for_track(params: &CodecParameters) -> Result<Self, DecodeError> {
        if params.codec == CODEC_TYPE_OPUS {
            let channels = params.channels.map(|c| c.count()).unwrap_or(1).clamp(1, 2) as u16;
            let opus_channels = if channels == 1 {
                Channels::Mono
            } else {
                Channels::Stereo
            };
            let decoder = OpusDecoder::new(OPUS_SAMPLE_RATE, opus_channels)?;
            return Ok(PacketDecoder::Opus {
                decoder,
                channels,
                buffer: vec![0.0; OPUS_MAX_FRAME_SAMPLES * channels as usize],
            });
        }

        let decoder = symphonia::default::get_codecs().make(params, &DecoderOptions::default())?;
        let format = match (params.sample_rate, params.channels) {
            (Some(rate), Some(channels)) => Some((rate, channels.count() as u16)),
            _ => None,
        };
        Ok(PacketDecoder::Symphonia { decoder, format })
    }

    /// Decode one packet, appending interleaved samples to `out`.
    ///
    /// A corrupt packet is logged and skipped; the rest of the stream may
    /// still be usable.
    fn decode(&mut self, packet: &Packet, out: &mut Vec<f32>) -> Result<(), DecodeError> {
        match self {
            PacketDecoder::Symphonia { decoder, format } => {
                let decoded = match decoder.decode(packet) {
                    Ok(decoded) => decoded,
                    Err(SymphoniaError::DecodeError(e)) => {
                        warn!("Skipping undecodable packet: {}", e);
                        return Ok(());
                    }
                    Err(e) => return Err(e.into()),
                };

                let spec = *decoded.spec();
                *format = Some((spec.rate, spec.channels.count() as u16));

                if decoded.frames() == 0 {
                    return Ok(());
                }

                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                out.extend_from_slice(buf.samples());
                Ok(())
            }
            PacketDecoder::Opus {
                decoder,
                channels,
                buffer,
            } => {
                match decoder.decode_float(packet.buf(), buffer, false) {
                    Ok(frames) => out.extend_from_slice(&buffer[..frames * *channels as usize]),
                    Err(e) => warn!("Skipping undecodable Opus packet: {}", e),
                }
                Ok(())
            }
        }
    }

    fn output_format(&self) -> Option<(u32, u16)> {
        match self {
            PacketDecoder::Symphonia { format, .. } => *format,
            PacketDecoder::Opus { channels, .. } => Some((OPUS_SAMPLE_RATE, *channels)),
        }
    }
}
