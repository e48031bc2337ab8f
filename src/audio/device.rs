//! cpal-backed capture.
//!
//! cpal streams are not `Send` on every host, so each stream is built and
//! owned by its own thread; the [`CpalCapture`] handle only keeps the stop
//! signal and the join handle.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use crossbeam_channel::Sender;
use std::thread::JoinHandle;
use tracing::{debug, error, info};

use super::audio_source::{
    BlockSink, CaptureBackend, CaptureSource, CapturedBlock, SourceKind, StreamFormat,
};
use super::error::DeviceError;
use super::{mic_source, system_source};
use crate::config::AudioConfig;

/// A capture device as reported by the host.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub sample_format: Option<String>,
    pub is_default: bool,
}

pub fn list_input_devices() -> Result<Vec<DeviceInfo>, DeviceError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .map_err(|e| DeviceError::Enumerate(e.to_string()))?;

    let mut infos = Vec::new();
    for device in devices {
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        let config = device.default_input_config().ok();
        infos.push(DeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            sample_rate: config.as_ref().map(|c| c.sample_rate().0),
            channels: config.as_ref().map(|c| c.channels()),
            sample_format: config.as_ref().map(|c| c.sample_format().to_string()),
            name,
        });
    }
    Ok(infos)
}

/// Input devices of the default host, paired with their names.
pub(crate) fn named_input_devices(
    host: &cpal::Host,
) -> Result<Vec<(String, cpal::Device)>, DeviceError> {
    let devices = host
        .input_devices()
        .map_err(|e| DeviceError::Enumerate(e.to_string()))?;
    Ok(devices
        .filter_map(|device| device.name().ok().map(|name| (name, device)))
        .collect())
}

/// Opens the configured microphone and loopback devices on the default host.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CaptureBackend for CpalBackend {
    fn open(
        &self,
        kind: SourceKind,
        audio: &AudioConfig,
    ) -> Result<Box<dyn CaptureSource>, DeviceError> {
        let host = cpal::default_host();
        let device = match kind {
            SourceKind::Microphone => {
                mic_source::resolve_microphone(&host, &audio.microphone_device)?
            }
            SourceKind::System => system_source::resolve_loopback(&host, &audio.system_device)?,
        };
        Ok(Box::new(CpalCapture::new(kind, device)?))
    }
}

struct Running {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

pub struct CpalCapture {
    kind: SourceKind,
    device: cpal::Device,
    name: String,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    running: Option<Running>,
}

impl CpalCapture {
    /// Capture in the device's default input format.
    pub fn new(kind: SourceKind, device: cpal::Device) -> Result<Self, DeviceError> {
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        let supported = device
            .default_input_config()
            .map_err(|e| DeviceError::Format {
                device: name.clone(),
                message: e.to_string(),
            })?;

        info!(
            "Using {} device '{}' ({} Hz, {} ch, {})",
            kind,
            name,
            supported.sample_rate().0,
            supported.channels(),
            supported.sample_format()
        );

        Ok(Self {
            kind,
            device,
            name,
            sample_format: supported.sample_format(),
            config: supported.config(),
            running: None,
        })
    }
}

impl CaptureSource for CpalCapture {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn device_name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> StreamFormat {
        StreamFormat {
            sample_rate: self.config.sample_rate.0,
            channels: self.config.channels,
        }
    }

    fn start(&mut self, sink: BlockSink) -> Result<(), DeviceError> {
        if self.running.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let device = self.device.clone();
        let config = self.config.clone();
        let sample_format = self.sample_format;
        let kind = self.kind;
        let name = self.name.clone();

        let thread = std::thread::Builder::new()
            .name(format!("capture-{}", kind))
            .spawn(move || {
                let stream = match open_stream(&device, &config, sample_format, kind, &name, sink)
                {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // returns on stop or when the handle is dropped
                let _ = stop_rx.recv();
                drop(stream);
                debug!("{} capture stream closed", kind);
            })
            .map_err(|e| DeviceError::Stream {
                device: self.name.clone(),
                message: e.to_string(),
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.running = Some(Running {
                    stop: stop_tx,
                    thread,
                });
                info!("{} capture started on '{}'", self.kind, self.name);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(DeviceError::ThreadGone(self.name.clone()))
            }
        }
    }

    fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.stop.send(());
            if running.thread.join().is_err() {
                error!("{} capture thread panicked", self.kind);
            }
            info!("{} capture stopped", self.kind);
        }
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    kind: SourceKind,
    name: &str,
    sink: BlockSink,
) -> Result<cpal::Stream, DeviceError> {
    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, kind, sink),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, kind, sink),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, kind, sink),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, kind, sink),
        other => {
            return Err(DeviceError::UnsupportedFormat {
                device: name.to_string(),
                format: other.to_string(),
            })
        }
    }
    .map_err(|e| DeviceError::Stream {
        device: name.to_string(),
        message: e.to_string(),
    })?;

    stream.play().map_err(|e| DeviceError::Stream {
        device: name.to_string(),
        message: e.to_string(),
    })?;
    Ok(stream)
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    kind: SourceKind,
    sink: BlockSink,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            sink.push(CapturedBlock {
                kind,
                samples: data.iter().map(|&s| s.to_sample::<i16>()).collect(),
            });
        },
        move |err| error!("{} capture stream error: {}", kind, err),
        None,
    )
}
