//! Capture source abstraction.
//!
//! A source pushes interleaved i16 blocks into a shared bounded queue at its
//! device's own pace and native format. The mixing worker on the other end
//! resamples and aligns them.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

use super::error::DeviceError;
use crate::config::AudioConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Microphone,
    /// System output loopback ("Stereo Mix")
    System,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Microphone => "microphone",
            SourceKind::System => "system",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Native format a source delivers in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone)]
pub struct CapturedBlock {
    pub kind: SourceKind,
    /// Interleaved samples in the source's native format
    pub samples: Vec<i16>,
}

/// Producer end of the capture queue.
///
/// Never blocks: when the queue is full the oldest block is discarded to
/// make room, so capture callbacks keep their real-time budget.
#[derive(Clone)]
pub struct BlockSink {
    tx: Sender<CapturedBlock>,
    // held only to evict from the front when full
    evict: Receiver<CapturedBlock>,
    dropped: Arc<AtomicU64>,
}

impl BlockSink {
    pub fn bounded(capacity: usize) -> (Self, Receiver<CapturedBlock>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        let sink = Self {
            tx,
            evict: rx.clone(),
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (sink, rx)
    }

    pub fn push(&self, block: CapturedBlock) {
        let mut block = block;
        loop {
            match self.tx.try_send(block) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(oldest) = self.evict.try_recv() {
                        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        if dropped == 1 || dropped % 100 == 0 {
                            warn!(
                                "Capture queue full, dropped oldest {} block ({} dropped so far)",
                                oldest.kind, dropped
                            );
                        }
                    }
                    block = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// One capture device.
///
/// Implementations own whatever thread drives the device; `start` returns
/// once the stream is live.
pub trait CaptureSource: Send {
    fn kind(&self) -> SourceKind;

    fn device_name(&self) -> &str;

    fn format(&self) -> StreamFormat;

    fn start(&mut self, sink: BlockSink) -> Result<(), DeviceError>;

    /// Stop delivering blocks. Safe to call more than once.
    fn stop(&mut self);
}

/// Opens capture sources by role.
pub trait CaptureBackend: Send + Sync {
    fn open(
        &self,
        kind: SourceKind,
        audio: &AudioConfig,
    ) -> Result<Box<dyn CaptureSource>, DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(value: i16) -> CapturedBlock {
        CapturedBlock {
            kind: SourceKind::Microphone,
            samples: vec![value; 4],
        }
    }

    #[test]
    fn test_full_queue_drops_oldest() {
        let (sink, rx) = BlockSink::bounded(2);
        sink.push(block(1));
        sink.push(block(2));
        sink.push(block(3));

        assert_eq!(sink.dropped(), 1);
        let remaining: Vec<i16> = rx.try_iter().map(|b| b.samples[0]).collect();
        assert_eq!(remaining, vec![2, 3]);
    }

    #[test]
    fn test_clones_share_drop_counter() {
        let (sink, _rx) = BlockSink::bounded(1);
        let other = sink.clone();
        sink.push(block(1));
        other.push(block(2));
        sink.push(block(3));
        assert_eq!(other.dropped(), 2);
    }
}
