//! Capture → mix → encode pipeline for one recording.
//!
//! Both capture sources feed one bounded queue. A dedicated
//! `mixer-encoder` thread resamples each source into the recording format,
//! mixes aligned blocks and streams them to the encoder, so neither capture
//! nor the async runtime ever waits on the disk.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::audio_mixer::{AudioMixer, MixerStats};
use super::audio_source::{
    BlockSink, CaptureBackend, CaptureSource, CapturedBlock, SourceKind, StreamFormat,
};
use super::encoder::{create_encoder, AudioEncoder};
use super::error::{DeviceError, EncodeError, RecordingError};
use super::resample::StreamResampler;
use crate::config::AudioConfig;

/// Reported when the encoder dies in the middle of a recording.
#[derive(Debug, Clone)]
pub struct EngineFailure {
    pub output_path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct RecordingSummary {
    pub output_path: PathBuf,
    pub bytes_written: u64,
    pub blocks: u64,
    /// Frames of silence inserted for a source that fell behind
    pub zero_filled_frames: u64,
    /// Capture blocks discarded because the queue was full
    pub dropped_blocks: u64,
}

struct WorkerSummary {
    bytes: u64,
    stats: MixerStats,
}

struct ActiveCapture {
    output_path: PathBuf,
    sources: Vec<Box<dyn CaptureSource>>,
    sink: BlockSink,
    stop: Sender<()>,
    done: Receiver<Result<WorkerSummary, EncodeError>>,
    worker: JoinHandle<()>,
}

pub struct AudioMixerEngine {
    backend: Arc<dyn CaptureBackend>,
    audio: AudioConfig,
    shutdown_timeout: Duration,
    failures: mpsc::UnboundedSender<EngineFailure>,
    active: Option<ActiveCapture>,
}

impl AudioMixerEngine {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        audio: AudioConfig,
        shutdown_timeout: Duration,
        failures: mpsc::UnboundedSender<EngineFailure>,
    ) -> Self {
        Self {
            backend,
            audio,
            shutdown_timeout,
            failures,
            active: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.output_path.as_path())
    }

    /// Open both devices and start streaming into `output_path`.
    ///
    /// Nothing is left running and no file is left behind on error.
    pub fn start(&mut self, output_path: &Path) -> Result<(), RecordingError> {
        if let Some(active) = &self.active {
            return Err(RecordingError::AlreadyRunning(active.output_path.clone()));
        }

        let mut sources = vec![
            self.backend.open(SourceKind::Microphone, &self.audio)?,
            self.backend.open(SourceKind::System, &self.audio)?,
        ];

        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent).map_err(EncodeError::from)?;
        }

        let target = StreamFormat {
            sample_rate: self.audio.sample_rate,
            channels: self.audio.channels,
        };
        let pipeline = MixPipeline::new(&sources, target, &self.audio);

        let (sink, frames) = BlockSink::bounded(self.audio.queue_capacity);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);

        let audio = self.audio.clone();
        let path = output_path.to_path_buf();
        let failures = self.failures.clone();

        // the encoder is created on the worker: LAME handles are not Send
        let worker = std::thread::Builder::new()
            .name("mixer-encoder".to_string())
            .spawn(move || {
                let encoder = match create_encoder(&path, &audio) {
                    Ok(encoder) => {
                        let _ = ready_tx.send(Ok(()));
                        encoder
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let result = run_worker(encoder, pipeline, frames, stop_rx, &path, &failures);
                let _ = done_tx.send(result);
            })
            .map_err(EncodeError::from)?;

        let ready = ready_rx.recv().unwrap_or(Err(EncodeError::WorkerGone));
        if let Err(e) = ready {
            let _ = worker.join();
            remove_partial(output_path);
            return Err(e.into());
        }

        if let Err(e) = start_all(&mut sources, &sink) {
            let _ = stop_tx.send(());
            let _ = worker.join();
            remove_partial(output_path);
            return Err(e.into());
        }

        info!("Audio capture started, writing to {:?}", output_path);
        self.active = Some(ActiveCapture {
            output_path: output_path.to_path_buf(),
            sources,
            sink,
            stop: stop_tx,
            done: done_rx,
            worker,
        });
        Ok(())
    }

    /// Stop capture, drain the queue and finalize the file.
    ///
    /// Waits at most the shutdown timeout for the encoder; after that the
    /// worker is detached and `StopTimeout` is returned.
    pub fn stop(&mut self) -> Result<Option<RecordingSummary>, RecordingError> {
        let Some(mut active) = self.active.take() else {
            return Ok(None);
        };

        for source in active.sources.iter_mut() {
            source.stop();
        }
        let _ = active.stop.send(());

        match active.done.recv_timeout(self.shutdown_timeout) {
            Ok(Ok(worker)) => {
                if active.worker.join().is_err() {
                    error!("mixer-encoder thread panicked after finishing");
                }
                let channels = self.audio.channels.max(1) as u64;
                let summary = RecordingSummary {
                    output_path: active.output_path,
                    bytes_written: worker.bytes,
                    blocks: worker.stats.blocks,
                    zero_filled_frames: worker.stats.zero_filled / channels,
                    dropped_blocks: active.sink.dropped(),
                };
                info!(
                    "Audio capture finished: {:?} ({} bytes, {} blocks)",
                    summary.output_path, summary.bytes_written, summary.blocks
                );
                if summary.zero_filled_frames > 0 || summary.dropped_blocks > 0 {
                    warn!(
                        "Recording had {} silent filler frames and {} dropped capture blocks",
                        summary.zero_filled_frames, summary.dropped_blocks
                    );
                }
                Ok(Some(summary))
            }
            Ok(Err(e)) => {
                let _ = active.worker.join();
                Err(e.into())
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Encoder did not finish within {:?}, detaching it",
                    self.shutdown_timeout
                );
                Err(RecordingError::StopTimeout)
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = active.worker.join();
                Err(EncodeError::WorkerGone.into())
            }
        }
    }
}

impl Drop for AudioMixerEngine {
    fn drop(&mut self) {
        if self.active.is_some() {
            if let Err(e) = self.stop() {
                error!("Failed to finalize recording on drop: {}", e);
            }
        }
    }
}

fn start_all(
    sources: &mut [Box<dyn CaptureSource>],
    sink: &BlockSink,
) -> Result<(), DeviceError> {
    let mut started = 0;
    let mut failure = None;
    for source in sources.iter_mut() {
        match source.start(sink.clone()) {
            Ok(()) => started += 1,
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    match failure {
        None => Ok(()),
        Some(e) => {
            for source in sources[..started].iter_mut() {
                source.stop();
            }
            Err(e)
        }
    }
}

fn remove_partial(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove unused recording file {:?}: {}", path, e);
        }
    }
}

/// Per-source format conversion in front of the mixer.
struct MixPipeline {
    microphone: StreamResampler,
    system: StreamResampler,
    mixer: AudioMixer,
}

impl MixPipeline {
    fn new(sources: &[Box<dyn CaptureSource>], target: StreamFormat, audio: &AudioConfig) -> Self {
        let format_of = |kind: SourceKind| {
            sources
                .iter()
                .find(|s| s.kind() == kind)
                .map(|s| s.format())
                .unwrap_or(target)
        };

        let microphone = StreamResampler::new(format_of(SourceKind::Microphone), target);
        let system = StreamResampler::new(format_of(SourceKind::System), target);
        if !microphone.is_passthrough() || !system.is_passthrough() {
            debug!(
                "Converting capture to {} Hz, {} ch",
                target.sample_rate, target.channels
            );
        }

        Self {
            microphone,
            system,
            mixer: AudioMixer::new(audio.block_frames, audio.max_lag_blocks, audio.channels),
        }
    }

    fn push(&mut self, block: CapturedBlock) {
        let converted = match block.kind {
            SourceKind::Microphone => self.microphone.process(&block.samples),
            SourceKind::System => self.system.process(&block.samples),
        };
        self.mixer.push(block.kind, &converted);
    }

    fn encode_ready(&mut self, encoder: &mut dyn AudioEncoder) -> Result<(), EncodeError> {
        while let Some(mixed) = self.mixer.next_block() {
            encoder.encode(&mixed)?;
        }
        Ok(())
    }
}

fn run_worker(
    mut encoder: Box<dyn AudioEncoder>,
    mut pipeline: MixPipeline,
    frames: Receiver<CapturedBlock>,
    stop: Receiver<()>,
    path: &Path,
    failures: &mpsc::UnboundedSender<EngineFailure>,
) -> Result<WorkerSummary, EncodeError> {
    loop {
        crossbeam_channel::select! {
            recv(frames) -> block => {
                let Ok(block) = block else { break };
                pipeline.push(block);
                if let Err(e) = pipeline.encode_ready(encoder.as_mut()) {
                    error!("Encoding {:?} failed: {}", path, e);
                    // closes the file with what was written so far
                    drop(encoder);
                    let _ = failures.send(EngineFailure {
                        output_path: path.to_path_buf(),
                        message: e.to_string(),
                    });
                    return Err(e);
                }
            }
            recv(stop) -> _ => break,
        }
    }

    // sources are already stopped, whatever is queued is final
    for block in frames.try_iter() {
        pipeline.push(block);
    }
    pipeline.encode_ready(encoder.as_mut())?;
    if let Some(rest) = pipeline.mixer.flush() {
        encoder.encode(&rest)?;
    }

    let stats = pipeline.mixer.stats();
    let bytes = encoder.finish()?;
    Ok(WorkerSummary { bytes, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Codec;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct ToneSource {
        kind: SourceKind,
        format: StreamFormat,
        value: i16,
        running: Arc<AtomicBool>,
        thread: Option<std::thread::JoinHandle<()>>,
    }

    impl CaptureSource for ToneSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn device_name(&self) -> &str {
            "tone"
        }

        fn format(&self) -> StreamFormat {
            self.format
        }

        fn start(&mut self, sink: BlockSink) -> Result<(), DeviceError> {
            self.running.store(true, Ordering::SeqCst);
            let running = self.running.clone();
            let (kind, value, channels) = (self.kind, self.value, self.format.channels);
            self.thread = Some(std::thread::spawn(move || {
                while running.load(Ordering::SeqCst) {
                    sink.push(CapturedBlock {
                        kind,
                        samples: vec![value; 160 * channels as usize],
                    });
                    std::thread::sleep(Duration::from_millis(2));
                }
            }));
            Ok(())
        }

        fn stop(&mut self) {
            self.running.store(false, Ordering::SeqCst);
            if let Some(thread) = self.thread.take() {
                let _ = thread.join();
            }
        }
    }

    struct ToneBackend {
        system_available: bool,
    }

    impl CaptureBackend for ToneBackend {
        fn open(
            &self,
            kind: SourceKind,
            audio: &AudioConfig,
        ) -> Result<Box<dyn CaptureSource>, DeviceError> {
            if kind == SourceKind::System && !self.system_available {
                return Err(DeviceError::NotFound {
                    kind,
                    wanted: audio.system_device.clone(),
                });
            }
            Ok(Box::new(ToneSource {
                kind,
                // the microphone runs at half rate in mono to exercise conversion
                format: match kind {
                    SourceKind::Microphone => StreamFormat {
                        sample_rate: 4_000,
                        channels: 1,
                    },
                    SourceKind::System => StreamFormat {
                        sample_rate: 8_000,
                        channels: 2,
                    },
                },
                value: 100,
                running: Arc::new(AtomicBool::new(false)),
                thread: None,
            }))
        }
    }

    fn engine(system_available: bool) -> (AudioMixerEngine, mpsc::UnboundedReceiver<EngineFailure>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let audio = AudioConfig {
            codec: Codec::Wav,
            sample_rate: 8_000,
            channels: 2,
            block_frames: 256,
            ..Default::default()
        };
        let engine = AudioMixerEngine::new(
            Arc::new(ToneBackend { system_available }),
            audio,
            Duration::from_secs(5),
            tx,
        );
        (engine, rx)
    }

    #[test]
    fn test_records_mixed_audio_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meeting.wav");
        let (mut engine, _failures) = engine(true);

        engine.start(&path).unwrap();
        assert!(engine.is_running());
        assert_eq!(engine.output_path(), Some(path.as_path()));
        std::thread::sleep(Duration::from_millis(100));

        let summary = engine.stop().unwrap().unwrap();
        assert!(!engine.is_running());
        assert!(summary.blocks > 0);
        assert!(summary.bytes_written > 44);

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        // both tones are 100, so aligned frames mix to 200
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert!(samples.iter().any(|&s| s == 200));
    }

    #[test]
    fn test_second_start_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (mut engine, _failures) = engine(true);

        engine.start(&dir.path().join("a.wav")).unwrap();
        assert!(matches!(
            engine.start(&dir.path().join("b.wav")),
            Err(RecordingError::AlreadyRunning(_))
        ));
        engine.stop().unwrap();
    }

    #[test]
    fn test_missing_loopback_fails_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skipped.wav");
        let (mut engine, _failures) = engine(false);

        assert!(matches!(
            engine.start(&path),
            Err(RecordingError::Device(DeviceError::NotFound { .. }))
        ));
        assert!(!engine.is_running());
        assert!(!path.exists());
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let (mut engine, _failures) = engine(true);
        assert!(engine.stop().unwrap().is_none());
    }
}
