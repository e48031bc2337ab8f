//! Microphone device selection.

use cpal::traits::HostTrait;
use tracing::info;

use super::audio_source::SourceKind;
use super::device::named_input_devices;
use super::error::DeviceError;

/// Index of the first name containing `wanted`, ignoring case.
pub fn match_device_name<S: AsRef<str>>(names: &[S], wanted: &str) -> Option<usize> {
    let wanted = wanted.to_lowercase();
    names
        .iter()
        .position(|name| name.as_ref().to_lowercase().contains(&wanted))
}

/// An empty `wanted` selects the host's default input.
pub fn resolve_microphone(host: &cpal::Host, wanted: &str) -> Result<cpal::Device, DeviceError> {
    if wanted.trim().is_empty() {
        return host
            .default_input_device()
            .ok_or(DeviceError::NoDefaultInput);
    }

    let mut devices = named_input_devices(host)?;
    let names: Vec<&str> = devices.iter().map(|(name, _)| name.as_str()).collect();
    match match_device_name(&names, wanted) {
        Some(index) => {
            let (name, device) = devices.swap_remove(index);
            info!("Microphone '{}' matched '{}'", name, wanted);
            Ok(device)
        }
        None => Err(DeviceError::NotFound {
            kind: SourceKind::Microphone,
            wanted: wanted.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_is_case_insensitive_substring() {
        let names = ["Speakers (Realtek)", "Microphone Array (Realtek)", "Stereo Mix"];
        assert_eq!(match_device_name(&names, "microphone"), Some(1));
        assert_eq!(match_device_name(&names, "STEREO"), Some(2));
        assert_eq!(match_device_name(&names, "headset"), None);
    }

    #[test]
    fn test_first_match_wins() {
        let names = ["USB Microphone", "Microphone (Webcam)"];
        assert_eq!(match_device_name(&names, "Microphone"), Some(0));
    }
}
