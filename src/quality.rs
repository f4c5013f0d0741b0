use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Named quality bucket selected by the client at upload time
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    /// 48kHz, 24-bit, stereo
    High,
    /// 44.1kHz, 16-bit, stereo
    Medium,
    /// 22.05kHz, 16-bit, mono
    Low,
}

/// Target audio profile a converted recording is written with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QualityProfile {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
}

impl QualityTier {
    /// Parse the `quality` form field. Anything unrecognized gets the `low`
    /// profile.
    pub fn from_form(value: &str) -> Self {
        match value {
            "high" => QualityTier::High,
            "medium" => QualityTier::Medium,
            _ => QualityTier::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::High => "high",
            QualityTier::Medium => "medium",
            QualityTier::Low => "low",
        }
    }

    pub fn profile(&self) -> QualityProfile {
        match self {
            QualityTier::High => QualityProfile {
                sample_rate: 48000,
                bits_per_sample: 24,
                channels: 2,
            },
            QualityTier::Medium => QualityProfile {
                sample_rate: 44100,
                bits_per_sample: 16,
                channels: 2,
            },
            QualityTier::Low => QualityProfile {
                sample_rate: 22050,
                bits_per_sample: 16,
                channels: 1,
            },
        }
    }
}

impl QualityProfile {
    /// Bytes per sample for a single channel
    pub fn sample_width(&self) -> u16 {
        self.bits_per_sample / 8
    }

    /// PCM codec name matching the bit depth
    pub fn codec_name(&self) -> &'static str {
        if self.bits_per_sample == 24 {
            "pcm_s24le"
        } else {
            "pcm_s16le"
        }
    }

    pub fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: hound::SampleFormat::Int,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_match_tiers() {
        let high = QualityTier::High.profile();
        assert_eq!((high.sample_rate, high.bits_per_sample, high.channels), (48000, 24, 2));

        let medium = QualityTier::Medium.profile();
        assert_eq!((medium.sample_rate, medium.bits_per_sample, medium.channels), (44100, 16, 2));

        let low = QualityTier::Low.profile();
        assert_eq!((low.sample_rate, low.bits_per_sample, low.channels), (22050, 16, 1));
    }

    #[test]
    fn test_unknown_tier_falls_through_to_low() {
        assert_eq!(QualityTier::from_form("ultra"), QualityTier::Low);
        assert_eq!(QualityTier::from_form(""), QualityTier::Low);
        assert_eq!(QualityTier::from_form("High"), QualityTier::Low);
        assert_eq!(QualityTier::from_form("medium"), QualityTier::Medium);
    }

    #[test]
    fn test_codec_follows_bit_depth() {
        assert_eq!(QualityTier::High.profile().codec_name(), "pcm_s24le");
        assert_eq!(QualityTier::Medium.profile().codec_name(), "pcm_s16le");
        assert_eq!(QualityTier::High.profile().sample_width(), 3);
    }
}
