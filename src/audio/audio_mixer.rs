//! Additive two-source mixer.
//!
//! Each source is buffered independently. A block is emitted when both have
//! a full block, or when one source runs more than `max_lag` ahead, in which
//! case the missing part of the other is treated as silence.

use std::collections::VecDeque;

use super::audio_source::SourceKind;

/// Sum two equally formatted buffers sample by sample, clipping to i16.
/// The shorter input is zero-extended.
pub fn mix_clipped(a: &[i16], b: &[i16]) -> Vec<i16> {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            let sum = a.get(i).copied().unwrap_or(0) as i32 + b.get(i).copied().unwrap_or(0) as i32;
            sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MixerStats {
    pub blocks: u64,
    /// Samples substituted with silence because a source fell behind
    pub zero_filled: u64,
}

pub struct AudioMixer {
    block_samples: usize,
    max_lag_samples: usize,
    microphone: VecDeque<i16>,
    system: VecDeque<i16>,
    stats: MixerStats,
}

impl AudioMixer {
    /// Sizes are in frames; `channels` converts them to samples.
    pub fn new(block_frames: usize, max_lag_blocks: usize, channels: u16) -> Self {
        let block_samples = block_frames.max(1) * channels.max(1) as usize;
        Self {
            block_samples,
            max_lag_samples: block_samples * max_lag_blocks,
            microphone: VecDeque::new(),
            system: VecDeque::new(),
            stats: MixerStats::default(),
        }
    }

    /// Queue samples that are already in the recording format.
    pub fn push(&mut self, kind: SourceKind, samples: &[i16]) {
        match kind {
            SourceKind::Microphone => self.microphone.extend(samples),
            SourceKind::System => self.system.extend(samples),
        }
    }

    pub fn buffered(&self, kind: SourceKind) -> usize {
        match kind {
            SourceKind::Microphone => self.microphone.len(),
            SourceKind::System => self.system.len(),
        }
    }

    pub fn next_block(&mut self) -> Option<Vec<i16>> {
        let block = self.block_samples;
        let both_ready = self.microphone.len() >= block && self.system.len() >= block;
        let lagging = self.microphone.len().max(self.system.len()) > block + self.max_lag_samples;

        if both_ready || lagging {
            Some(self.take(block))
        } else {
            None
        }
    }

    /// Mix out everything still buffered, zero-filling the shorter source.
    pub fn flush(&mut self) -> Option<Vec<i16>> {
        let remaining = self.microphone.len().max(self.system.len());
        if remaining == 0 {
            return None;
        }
        Some(self.take(remaining))
    }

    pub fn stats(&self) -> MixerStats {
        self.stats
    }

    fn take(&mut self, count: usize) -> Vec<i16> {
        let mic: Vec<i16> = drain_up_to(&mut self.microphone, count);
        let sys: Vec<i16> = drain_up_to(&mut self.system, count);
        let filled = (count - mic.len()) + (count - sys.len());

        self.stats.blocks += 1;
        self.stats.zero_filled += filled as u64;

        let mut mixed = mix_clipped(&mic, &sys);
        mixed.resize(count, 0);
        mixed
    }
}

fn drain_up_to(buffer: &mut VecDeque<i16>, count: usize) -> Vec<i16> {
    let n = count.min(buffer.len());
    buffer.drain(..n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mix_is_clipped_sum() {
        let a = [1000, -1000, 30_000, -30_000, 0];
        let b = [2000, 500, 10_000, -10_000, 7];
        assert_eq!(
            mix_clipped(&a, &b),
            vec![3000, -500, i16::MAX, i16::MIN, 7]
        );
    }

    #[test]
    fn test_single_active_source_keeps_volume() {
        let speech = [1200, -800, 400];
        assert_eq!(mix_clipped(&speech, &[0, 0, 0]), speech.to_vec());
    }

    #[test]
    fn test_equal_streams_mix_per_block() {
        let mut mixer = AudioMixer::new(4, 2, 1);
        mixer.push(SourceKind::Microphone, &[1, 2, 3, 4, 5, 6, 7, 8]);
        mixer.push(SourceKind::System, &[10, 20, 30, 40, 50, 60, 70, 80]);

        assert_eq!(mixer.next_block(), Some(vec![11, 22, 33, 44]));
        assert_eq!(mixer.next_block(), Some(vec![55, 66, 77, 88]));
        assert_eq!(mixer.next_block(), None);
        assert_eq!(mixer.stats().zero_filled, 0);
    }

    #[test]
    fn test_waits_for_slower_source_within_lag() {
        let mut mixer = AudioMixer::new(4, 2, 1);
        mixer.push(SourceKind::Microphone, &[1; 12]);
        assert_eq!(mixer.next_block(), None);

        mixer.push(SourceKind::System, &[1; 4]);
        assert_eq!(mixer.next_block(), Some(vec![2; 4]));
    }

    #[test]
    fn test_stalled_source_is_zero_filled() {
        let mut mixer = AudioMixer::new(4, 2, 1);
        // system stalls entirely while the microphone keeps producing
        mixer.push(SourceKind::Microphone, &[5; 20]);

        let mut blocks = Vec::new();
        while let Some(block) = mixer.next_block() {
            blocks.push(block);
        }

        // emits until the microphone is no longer more than the lag ahead
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|b| b == &vec![5; 4]));
        assert_eq!(mixer.stats().zero_filled, 8);
        assert_eq!(mixer.buffered(SourceKind::Microphone), 12);
    }

    #[test]
    fn test_partial_underrun_fills_tail() {
        let mut mixer = AudioMixer::new(4, 0, 1);
        mixer.push(SourceKind::Microphone, &[1; 8]);
        mixer.push(SourceKind::System, &[100, 100]);

        assert_eq!(mixer.next_block(), Some(vec![101, 101, 1, 1]));
        assert_eq!(mixer.stats().zero_filled, 2);
    }

    #[test]
    fn test_flush_drains_remainder() {
        let mut mixer = AudioMixer::new(4, 2, 2);
        mixer.push(SourceKind::Microphone, &[1, 1, 2, 2]);
        mixer.push(SourceKind::System, &[3, 3]);

        assert_eq!(mixer.next_block(), None);
        assert_eq!(mixer.flush(), Some(vec![4, 4, 2, 2]));
        assert_eq!(mixer.flush(), None);
    }
}
