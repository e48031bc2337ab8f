//! Streaming format conversion into the recording format.

use super::audio_source::StreamFormat;

/// Converts chunks of interleaved i16 audio to a target rate and channel
/// count, carrying interpolation state across chunks so block boundaries
/// do not click.
///
/// Linear interpolation: fine for speech, not for music production.
#[derive(Debug, Clone)]
pub struct StreamResampler {
    from: StreamFormat,
    to: StreamFormat,
    step: f64,
    position: f64,
    /// Last converted frame of the previous chunk
    carry: Vec<f32>,
}

impl StreamResampler {
    pub fn new(from: StreamFormat, to: StreamFormat) -> Self {
        Self {
            from,
            to,
            step: from.sample_rate as f64 / to.sample_rate as f64,
            position: 0.0,
            carry: Vec::new(),
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.from == self.to
    }

    pub fn process(&mut self, interleaved: &[i16]) -> Vec<i16> {
        if self.is_passthrough() {
            return interleaved.to_vec();
        }

        let converted = self.convert_channels(interleaved);
        if self.from.sample_rate == self.to.sample_rate {
            return converted.iter().map(|&s| to_i16(s)).collect();
        }

        let channels = self.to.channels as usize;
        let mut frames = std::mem::take(&mut self.carry);
        frames.extend_from_slice(&converted);
        let total = frames.len() / channels;
        if total < 2 {
            self.carry = frames;
            return Vec::new();
        }

        let mut out = Vec::with_capacity(((total as f64 / self.step) as usize + 1) * channels);
        loop {
            let index = self.position as usize;
            if index + 1 >= total {
                break;
            }
            let frac = (self.position - index as f64) as f32;
            for channel in 0..channels {
                let a = frames[index * channels + channel];
                let b = frames[(index + 1) * channels + channel];
                out.push(to_i16(a + (b - a) * frac));
            }
            self.position += self.step;
        }

        self.position -= (total - 1) as f64;
        self.carry = frames[(total - 1) * channels..].to_vec();
        out
    }

    fn convert_channels(&self, interleaved: &[i16]) -> Vec<f32> {
        let from = self.from.channels.max(1) as usize;
        let to = self.to.channels.max(1) as usize;
        let frames = interleaved.len() / from;
        let mut out = Vec::with_capacity(frames * to);

        for frame in interleaved.chunks_exact(from) {
            if to == 1 {
                let sum: f32 = frame.iter().map(|&s| s as f32).sum();
                out.push(sum / from as f32);
            } else {
                for channel in 0..to {
                    out.push(frame[channel.min(from - 1)] as f32);
                }
            }
        }
        out
    }
}

fn to_i16(sample: f32) -> i16 {
    sample
        .round()
        .clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(sample_rate: u32, channels: u16) -> StreamFormat {
        StreamFormat {
            sample_rate,
            channels,
        }
    }

    #[test]
    fn test_same_format_is_untouched() {
        let mut resampler = StreamResampler::new(format(44_100, 2), format(44_100, 2));
        assert!(resampler.is_passthrough());
        assert_eq!(resampler.process(&[1, 2, 3, 4]), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_mono_to_stereo_duplicates() {
        let mut resampler = StreamResampler::new(format(44_100, 1), format(44_100, 2));
        assert_eq!(resampler.process(&[10, -20]), vec![10, 10, -20, -20]);
    }

    #[test]
    fn test_stereo_to_mono_averages() {
        let mut resampler = StreamResampler::new(format(44_100, 2), format(44_100, 1));
        assert_eq!(resampler.process(&[100, 300, -50, 50]), vec![200, 0]);
    }

    #[test]
    fn test_downsample_halves_length() {
        let mut resampler = StreamResampler::new(format(48_000, 1), format(24_000, 1));
        let input: Vec<i16> = (0..48).collect();
        let output = resampler.process(&input);
        assert_eq!(output.len(), 24);
        assert_eq!(&output[..4], &[0, 2, 4, 6]);
    }

    #[test]
    fn test_chunked_matches_single_pass() {
        let input: Vec<i16> = (0..480).map(|i| ((i * 37) % 2000) as i16 - 1000).collect();

        let mut whole = StreamResampler::new(format(48_000, 1), format(44_100, 1));
        let expected = whole.process(&input);

        let mut chunked = StreamResampler::new(format(48_000, 1), format(44_100, 1));
        let mut actual = Vec::new();
        for chunk in input.chunks(37) {
            actual.extend(chunked.process(chunk));
        }

        assert_eq!(actual.len(), expected.len());
        for (a, b) in actual.iter().zip(&expected) {
            assert!((a - b).abs() <= 1);
        }
    }

    #[test]
    fn test_upsample_constant_signal() {
        let mut resampler = StreamResampler::new(format(22_050, 1), format(44_100, 1));
        let output = resampler.process(&[500; 100]);
        assert!(output.len() >= 196);
        assert!(output.iter().all(|&s| s == 500));
    }
}
