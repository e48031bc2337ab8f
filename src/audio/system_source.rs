//! Loopback ("what the speakers play") device selection.
//!
//! Windows exposes it as "Stereo Mix", PulseAudio/PipeWire as a "Monitor of"
//! source, and virtual drivers usually call it a loopback.

use tracing::info;

use super::audio_source::SourceKind;
use super::device::named_input_devices;
use super::error::DeviceError;
use super::mic_source::match_device_name;

const LOOPBACK_HINTS: &[&str] = &["stereo mix", "monitor", "loopback"];

/// Configured name first, then the well-known loopback names.
pub fn match_loopback_name<S: AsRef<str>>(names: &[S], wanted: &str) -> Option<usize> {
    if !wanted.trim().is_empty() {
        if let Some(index) = match_device_name(names, wanted) {
            return Some(index);
        }
    }
    LOOPBACK_HINTS
        .iter()
        .find_map(|hint| match_device_name(names, hint))
}

pub fn resolve_loopback(host: &cpal::Host, wanted: &str) -> Result<cpal::Device, DeviceError> {
    let mut devices = named_input_devices(host)?;
    let names: Vec<&str> = devices.iter().map(|(name, _)| name.as_str()).collect();

    match match_loopback_name(&names, wanted) {
        Some(index) => {
            let (name, device) = devices.swap_remove(index);
            info!("System audio device '{}' selected", name);
            Ok(device)
        }
        None => Err(DeviceError::NotFound {
            kind: SourceKind::System,
            wanted: wanted.to_string(),
        }),
    }
}
