//! Streaming file encoders.
//!
//! Every block is written through to disk as soon as it is encoded, so a
//! crash mid-meeting leaves a playable file up to the last block.

use hound::{SampleFormat, WavSpec, WavWriter};
use mp3lame_encoder::{Bitrate, FlushNoGap, InterleavedPcm, MonoPcm, Quality};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::error::EncodeError;
use crate::config::{AudioConfig, Codec};

pub trait AudioEncoder {
    /// Encode interleaved samples and flush them to the file.
    fn encode(&mut self, samples: &[i16]) -> Result<(), EncodeError>;

    /// Finalize the file, returning its size in bytes.
    fn finish(self: Box<Self>) -> Result<u64, EncodeError>;
}

/// Open the encoder selected by `audio.codec`, creating `path`.
pub fn create_encoder(path: &Path, audio: &AudioConfig) -> Result<Box<dyn AudioEncoder>, EncodeError> {
    if !(1..=2).contains(&audio.channels) {
        return Err(EncodeError::Channels(audio.channels));
    }
    match audio.codec {
        Codec::Mp3 => Ok(Box::new(Mp3FileEncoder::create(path, audio)?)),
        Codec::Wav => Ok(Box::new(WavFileEncoder::create(path, audio)?)),
    }
}

pub struct Mp3FileEncoder {
    encoder: mp3lame_encoder::Encoder,
    file: File,
    path: PathBuf,
    channels: usize,
    buffer: Vec<u8>,
}

fn lame_error<E: std::fmt::Debug>(e: E) -> EncodeError {
    EncodeError::Mp3(format!("{:?}", e))
}

fn bitrate(kbps: u32) -> Result<Bitrate, EncodeError> {
    Ok(match kbps {
        8 => Bitrate::Kbps8,
        16 => Bitrate::Kbps16,
        24 => Bitrate::Kbps24,
        32 => Bitrate::Kbps32,
        40 => Bitrate::Kbps40,
        48 => Bitrate::Kbps48,
        64 => Bitrate::Kbps64,
        80 => Bitrate::Kbps80,
        96 => Bitrate::Kbps96,
        112 => Bitrate::Kbps112,
        128 => Bitrate::Kbps128,
        160 => Bitrate::Kbps160,
        192 => Bitrate::Kbps192,
        224 => Bitrate::Kbps224,
        256 => Bitrate::Kbps256,
        320 => Bitrate::Kbps320,
        other => return Err(EncodeError::Mp3(format!("unsupported bitrate {} kbps", other))),
    })
}

fn quality(level: u8) -> Quality {
    match level {
        0 => Quality::Best,
        1 => Quality::SecondBest,
        2 => Quality::NearBest,
        3 => Quality::VeryNice,
        4 => Quality::Nice,
        5 => Quality::Good,
        6 => Quality::Decent,
        7 => Quality::Ok,
        8 => Quality::SecondWorst,
        _ => Quality::Worst,
    }
}

impl Mp3FileEncoder {
    pub fn create(path: &Path, audio: &AudioConfig) -> Result<Self, EncodeError> {
        let mut builder = mp3lame_encoder::Builder::new()
            .ok_or_else(|| EncodeError::Mp3("failed to allocate LAME encoder".to_string()))?;
        builder
            .set_num_channels(audio.channels as u8)
            .map_err(lame_error)?;
        builder
            .set_sample_rate(audio.sample_rate)
            .map_err(lame_error)?;
        builder
            .set_brate(bitrate(audio.bitrate_kbps)?)
            .map_err(lame_error)?;
        builder
            .set_quality(quality(audio.quality))
            .map_err(lame_error)?;
        let encoder = builder.build().map_err(lame_error)?;

        let file = File::create(path)?;
        debug!(
            "MP3 encoder ready: {} Hz, {} ch, {} kbps",
            audio.sample_rate, audio.channels, audio.bitrate_kbps
        );

        Ok(Self {
            encoder,
            file,
            path: path.to_path_buf(),
            channels: audio.channels as usize,
            buffer: Vec::new(),
        })
    }
}

impl AudioEncoder for Mp3FileEncoder {
    fn encode(&mut self, samples: &[i16]) -> Result<(), EncodeError> {
        let frames = samples.len() / self.channels;
        self.buffer.clear();
        self.buffer
            .reserve(mp3lame_encoder::max_required_buffer_size(frames));

        if self.channels == 2 {
            self.encoder
                .encode_to_vec(InterleavedPcm(samples), &mut self.buffer)
        } else {
            self.encoder.encode_to_vec(MonoPcm(samples), &mut self.buffer)
        }
        .map_err(lame_error)?;

        self.file.write_all(&self.buffer)?;
        self.file.flush()?;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<u64, EncodeError> {
        self.buffer.clear();
        self.buffer
            .reserve(mp3lame_encoder::max_required_buffer_size(0).max(7200));
        self.encoder
            .flush_to_vec::<FlushNoGap>(&mut self.buffer)
            .map_err(lame_error)?;

        self.file.write_all(&self.buffer)?;
        self.file.sync_all()?;
        Ok(std::fs::metadata(&self.path)?.len())
    }
}

pub struct WavFileEncoder {
    writer: WavWriter<BufWriter<File>>,
    path: PathBuf,
}

impl WavFileEncoder {
    pub fn create(path: &Path, audio: &AudioConfig) -> Result<Self, EncodeError> {
        let spec = WavSpec {
            channels: audio.channels,
            sample_rate: audio.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        Ok(Self {
            writer: WavWriter::create(path, spec)?,
            path: path.to_path_buf(),
        })
    }
}

impl AudioEncoder for WavFileEncoder {
    fn encode(&mut self, samples: &[i16]) -> Result<(), EncodeError> {
        for &sample in samples {
            self.writer.write_sample(sample)?;
        }
        // rewrites the header so the file is valid up to here
        self.writer.flush()?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<u64, EncodeError> {
        let Self { writer, path } = *self;
        writer.finalize()?;
        Ok(std::fs::metadata(path)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_config() -> AudioConfig {
        AudioConfig {
            codec: Codec::Wav,
            sample_rate: 8_000,
            channels: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_wav_is_readable_after_each_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.wav");

        let mut encoder = create_encoder(&path, &wav_config()).unwrap();
        encoder.encode(&[100, -100, 200, -200]).unwrap();

        // not finalized yet, the header must already describe the samples
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.len(), 4);
        drop(reader);

        encoder.encode(&[1, 2]).unwrap();
        let bytes = encoder.finish().unwrap();
        assert!(bytes >= 44 + 6 * 2);

        let samples: Vec<i16> = hound::WavReader::open(&path)
            .unwrap()
            .into_samples::<i16>()
            .map(|s| s.unwrap())
            .collect();
        assert_eq!(samples, vec![100, -100, 200, -200, 1, 2]);
    }

    #[test]
    fn test_mp3_produces_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.mp3");
        let audio = AudioConfig::default();

        let mut encoder = create_encoder(&path, &audio).unwrap();
        let block: Vec<i16> = (0..audio.block_frames * 2)
            .map(|i| ((i as f32 * 0.05).sin() * 8_000.0) as i16)
            .collect();
        for _ in 0..20 {
            encoder.encode(&block).unwrap();
        }
        let bytes = encoder.finish().unwrap();
        assert!(bytes > 1_000);
    }

    #[test]
    fn test_rejects_surround_layout() {
        let dir = tempfile::tempdir().unwrap();
        let audio = AudioConfig {
            channels: 6,
            ..wav_config()
        };
        assert!(matches!(
            create_encoder(&dir.path().join("x.wav"), &audio),
            Err(EncodeError::Channels(6))
        ));
    }

    #[test]
    fn test_quality_levels_cover_range() {
        assert!(matches!(quality(0), Quality::Best));
        assert!(matches!(quality(9), Quality::Worst));
        assert!(bitrate(128).is_ok());
        assert!(bitrate(100).is_err());
    }
}
