/// Decoded PCM held in memory between decode and encode.
///
/// Samples are interleaved f32 in [-1.0, 1.0].
#[derive(Debug, Clone)]
pub struct PcmAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmAudio {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Change the sample rate, keeping the channel layout
    pub fn set_frame_rate(self, target_rate: u32) -> Self {
        let samples = resample(&self.samples, self.channels, self.sample_rate, target_rate);
        PcmAudio {
            samples,
            sample_rate: target_rate,
            channels: self.channels,
        }
    }

    /// Snap every sample to the grid of a signed integer of `bits_per_sample`
    pub fn set_sample_width(mut self, bits_per_sample: u16) -> Self {
        let max = full_scale(bits_per_sample);
        for sample in self.samples.iter_mut() {
            *sample = quantize(*sample, bits_per_sample) as f32 / max;
        }
        self
    }

    /// Change the channel count. Mono is the mean of all source channels;
    /// widening copies the mono mix into every output channel.
    pub fn set_channels(self, target_channels: u16) -> Self {
        if target_channels == self.channels || self.channels == 0 {
            return self;
        }

        let src = self.channels as usize;
        let dst = target_channels as usize;
        let mut out = Vec::with_capacity(self.frames() * dst);

        for frame in self.samples.chunks_exact(src) {
            if dst == 1 {
                out.push(frame.iter().sum::<f32>() / src as f32);
            } else if src == 1 {
                out.extend(std::iter::repeat(frame[0]).take(dst));
            } else {
                for ch in 0..dst {
                    // Extra output channels reuse the last source channel
                    out.push(frame[ch.min(src - 1)]);
                }
            }
        }

        PcmAudio {
            samples: out,
            sample_rate: self.sample_rate,
            channels: target_channels,
        }
    }
}

/// Linear-interpolation resampler over interleaved frames
pub fn resample(samples: &[f32], channels: u16, src_rate: u32, target_rate: u32) -> Vec<f32> {
    if src_rate == target_rate || channels == 0 || src_rate == 0 {
        return samples.to_vec();
    }

    let channels = channels as usize;
    let src_frames = samples.len() / channels;
    let ratio = target_rate as f64 / src_rate as f64;
    let new_frames = (src_frames as f64 * ratio) as usize;
    let mut resampled = Vec::with_capacity(new_frames * channels);

    for i in 0..new_frames {
        let src_pos = i as f64 / ratio;
        let src_idx = src_pos as usize;
        let frac = (src_pos - src_idx as f64) as f32;

        for ch in 0..channels {
            let sample = if src_idx + 1 < src_frames {
                let s1 = samples[src_idx * channels + ch];
                let s2 = samples[(src_idx + 1) * channels + ch];
                s1 + frac * (s2 - s1)
            } else if src_idx < src_frames {
                samples[src_idx * channels + ch]
            } else {
                0.0
            };
            resampled.push(sample);
        }
    }

    resampled
}

/// Scale a float sample to a signed integer of the given bit depth
pub fn quantize(sample: f32, bits_per_sample: u16) -> i32 {
    let clamped = sample.clamp(-1.0, 1.0);
    (clamped * full_scale(bits_per_sample)).round() as i32
}

fn full_scale(bits_per_sample: u16) -> f32 {
    ((1i64 << (bits_per_sample.clamp(2, 32) - 1)) - 1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_same_rate_is_identity() {
        let samples = vec![0.1, -0.2, 0.3, -0.4];
        assert_eq!(resample(&samples, 2, 44100, 44100), samples);
    }

    #[test]
    fn test_resample_keeps_duration() {
        let audio = PcmAudio {
            samples: vec![0.0; 44100 * 2],
            sample_rate: 44100,
            channels: 2,
        };
        let out = audio.set_frame_rate(48000);
        assert_eq!(out.sample_rate, 48000);
        assert_eq!(out.frames(), 48000);
        assert!((out.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_resample_interpolates_per_channel() {
        // Left ramps up, right stays constant
        let samples = vec![0.0, 0.5, 1.0, 0.5];
        let out = resample(&samples, 2, 1, 2);
        assert_eq!(out.len(), 8);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 0.5);
        assert!((out[2] - 0.5).abs() < 1e-6);
        assert_eq!(out[3], 0.5);
    }

    #[test]
    fn test_downmix_to_mono_averages() {
        let audio = PcmAudio {
            samples: vec![1.0, 0.0, -0.5, -0.5],
            sample_rate: 8000,
            channels: 2,
        };
        let mono = audio.set_channels(1);
        assert_eq!(mono.channels, 1);
        assert_eq!(mono.samples, vec![0.5, -0.5]);
    }

    #[test]
    fn test_upmix_mono_duplicates() {
        let audio = PcmAudio {
            samples: vec![0.25, -0.75],
            sample_rate: 8000,
            channels: 1,
        };
        let stereo = audio.set_channels(2);
        assert_eq!(stereo.samples, vec![0.25, 0.25, -0.75, -0.75]);
    }

    #[test]
    fn test_quantize_clamps_and_scales() {
        assert_eq!(quantize(1.0, 16), i16::MAX as i32);
        assert_eq!(quantize(2.0, 16), i16::MAX as i32);
        assert_eq!(quantize(-1.0, 16), -(i16::MAX as i32));
        assert_eq!(quantize(0.0, 24), 0);
        assert_eq!(quantize(1.0, 24), 8_388_607);
    }
}
