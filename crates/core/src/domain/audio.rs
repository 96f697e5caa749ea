//! Audio device model shared by the core and the platform backend
//!
//! The equalizer itself never touches a device. These types describe what
//! the backend in the `infra` crate found and what the duplex stream should
//! be opened with.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in the audio subsystem
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// Streams need at least one channel
    #[error("Unsupported channel count: {0} (expected at least 1)")]
    UnsupportedChannels(u16),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Backend identifier for an audio device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Audio sample rate in Hz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleRate {
    Hz44100,
    Hz48000,
    Hz88200,
    Hz96000,
    Custom(u32),
}

impl SampleRate {
    pub fn hz(&self) -> u32 {
        match self {
            SampleRate::Hz44100 => 44100,
            SampleRate::Hz48000 => 48000,
            SampleRate::Hz88200 => 88200,
            SampleRate::Hz96000 => 96000,
            SampleRate::Custom(hz) => *hz,
        }
    }

    pub fn from_hz(hz: u32) -> Self {
        match hz {
            44100 => SampleRate::Hz44100,
            48000 => SampleRate::Hz48000,
            88200 => SampleRate::Hz88200,
            96000 => SampleRate::Hz96000,
            hz => SampleRate::Custom(hz),
        }
    }

    /// Rate as the equalizer's `prepare` expects it
    pub fn as_f64(&self) -> f64 {
        f64::from(self.hz())
    }
}

/// Direction of an audio device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Input,
    Output,
    Duplex,
}

/// What the backend reports about one device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub device_type: DeviceType,
    pub default_sample_rate: Option<SampleRate>,
    pub max_channels: u16,
    pub is_default: bool,
}

impl DeviceInfo {
    pub fn is_input(&self) -> bool {
        matches!(self.device_type, DeviceType::Input | DeviceType::Duplex)
    }

    pub fn is_output(&self) -> bool {
        matches!(self.device_type, DeviceType::Output | DeviceType::Duplex)
    }
}

/// Settings the duplex equalizer stream is opened with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSettings {
    pub sample_rate: SampleRate,
    /// Frames per device callback; also the equalizer's max block size
    pub block_size: u32,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            sample_rate: SampleRate::Hz48000,
            block_size: 512,
            input_device: None,
            output_device: None,
        }
    }
}

impl StreamSettings {
    /// Reject settings the equalizer cannot be prepared with
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate.hz() == 0 {
            return Err(AudioError::UnsupportedConfiguration(
                "sample rate must be positive".to_string(),
            ));
        }
        if self.block_size == 0 {
            return Err(AudioError::UnsupportedConfiguration(
                "block size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Platform-agnostic device discovery
pub trait AudioEnumerator: Send + Sync {
    /// List all available audio devices
    fn devices(&self) -> Result<Vec<DeviceInfo>>;

    fn input_devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self.devices()?.into_iter().filter(DeviceInfo::is_input).collect())
    }

    fn output_devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self.devices()?.into_iter().filter(DeviceInfo::is_output).collect())
    }

    fn default_input_device(&self) -> Result<DeviceInfo>;

    fn default_output_device(&self) -> Result<DeviceInfo>;

    /// Find a device by exact name, falling back to a case-insensitive
    /// substring match
    fn device_by_name(&self, name: &str) -> Result<DeviceInfo> {
        let devices = self.devices()?;
        if let Some(device) = devices.iter().find(|d| d.name == name) {
            return Ok(device.clone());
        }
        let needle = name.to_lowercase();
        devices
            .into_iter()
            .find(|d| d.name.to_lowercase().contains(&needle))
            .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeEnumerator(Vec<DeviceInfo>);

    fn device(name: &str, device_type: DeviceType) -> DeviceInfo {
        DeviceInfo {
            id: DeviceId::new(name),
            name: name.to_string(),
            device_type,
            default_sample_rate: Some(SampleRate::Hz48000),
            max_channels: 2,
            is_default: false,
        }
    }

    impl AudioEnumerator for FakeEnumerator {
        fn devices(&self) -> Result<Vec<DeviceInfo>> {
            Ok(self.0.clone())
        }

        fn default_input_device(&self) -> Result<DeviceInfo> {
            self.input_devices()?
                .into_iter()
                .next()
                .ok_or_else(|| AudioError::DeviceNotFound("default input".to_string()))
        }

        fn default_output_device(&self) -> Result<DeviceInfo> {
            self.output_devices()?
                .into_iter()
                .next()
                .ok_or_else(|| AudioError::DeviceNotFound("default output".to_string()))
        }
    }

    fn fake() -> FakeEnumerator {
        FakeEnumerator(vec![
            device("Built-in Microphone", DeviceType::Input),
            device("Built-in Speakers", DeviceType::Output),
            device("USB Interface", DeviceType::Duplex),
        ])
    }

    #[test]
    fn test_sample_rate_conversion() {
        assert_eq!(SampleRate::Hz48000.hz(), 48000);
        assert_eq!(SampleRate::from_hz(88200), SampleRate::Hz88200);
        assert_eq!(SampleRate::from_hz(22050), SampleRate::Custom(22050));
        assert_eq!(SampleRate::Hz44100.as_f64(), 44100.0);
    }

    #[test]
    fn test_direction_filters() {
        let e = fake();
        let inputs: Vec<_> = e.input_devices().unwrap().into_iter().map(|d| d.name).collect();
        let outputs: Vec<_> = e.output_devices().unwrap().into_iter().map(|d| d.name).collect();
        assert_eq!(inputs, ["Built-in Microphone", "USB Interface"]);
        assert_eq!(outputs, ["Built-in Speakers", "USB Interface"]);
    }

    #[test]
    fn test_device_by_name() {
        let e = fake();
        assert_eq!(e.device_by_name("USB Interface").unwrap().device_type, DeviceType::Duplex);
        assert_eq!(e.device_by_name("speakers").unwrap().name, "Built-in Speakers");
        assert!(matches!(
            e.device_by_name("Headphones"),
            Err(AudioError::DeviceNotFound(name)) if name == "Headphones"
        ));
    }

    #[test]
    fn test_unsupported_channels_message() {
        let message = AudioError::UnsupportedChannels(0).to_string();
        assert_eq!(message, "Unsupported channel count: 0 (expected at least 1)");
    }

    #[test]
    fn test_stream_settings_validation() {
        assert!(StreamSettings::default().validate().is_ok());

        let zero_block = StreamSettings {
            block_size: 0,
            ..StreamSettings::default()
        };
        assert!(zero_block.validate().is_err());

        let zero_rate = StreamSettings {
            sample_rate: SampleRate::Custom(0),
            ..StreamSettings::default()
        };
        assert!(zero_rate.validate().is_err());
    }
}
