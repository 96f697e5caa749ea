//! CPAL-based device discovery
//!
//! Maps CPAL devices onto the core `DeviceInfo` model and resolves the
//! configured device names back to `cpal::Device` handles for the stream.

use cpal::traits::{DeviceTrait, HostTrait};
use tracing::{debug, info, warn};
use triband_core::domain::audio::{
    AudioEnumerator, AudioError, DeviceId, DeviceInfo, DeviceType, Result, SampleRate,
};

#[allow(deprecated)]
fn device_name(device: &cpal::Device) -> String {
    device
        .name()
        .unwrap_or_else(|_| "Unknown Device".to_string())
}

/// Build the domain view of one CPAL device
fn describe(device: &cpal::Device, device_type: DeviceType, is_default: bool) -> DeviceInfo {
    let name = device_name(device);

    let default_config = match device_type {
        DeviceType::Output => device.default_output_config(),
        _ => device
            .default_input_config()
            .or_else(|_| device.default_output_config()),
    };
    let default_sample_rate = default_config
        .as_ref()
        .ok()
        .map(|config| SampleRate::from_hz(config.sample_rate()));

    let input_channels = device
        .supported_input_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0);
    let output_channels = device
        .supported_output_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0);

    debug!(name = %name, ?device_type, "Described device");

    DeviceInfo {
        id: DeviceId::new(name.clone()),
        name,
        device_type,
        default_sample_rate,
        max_channels: input_channels.max(output_channels),
        is_default,
    }
}

/// CPAL-based audio enumerator
pub struct CpalEnumerator {
    host: cpal::Host,
}

impl Default for CpalEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalEnumerator {
    pub fn new() -> Self {
        let host = cpal::default_host();
        debug!("Using audio host: {:?}", host.id());
        Self { host }
    }

    pub fn host(&self) -> &cpal::Host {
        &self.host
    }

    fn device_type(device: &cpal::Device) -> Option<DeviceType> {
        let has_input = device
            .supported_input_configs()
            .is_ok_and(|mut c| c.next().is_some());
        let has_output = device
            .supported_output_configs()
            .is_ok_and(|mut c| c.next().is_some());

        match (has_input, has_output) {
            (true, true) => Some(DeviceType::Duplex),
            (true, false) => Some(DeviceType::Input),
            (false, true) => Some(DeviceType::Output),
            (false, false) => None,
        }
    }

    /// Resolve an input device by name, or the default when `name` is None
    pub fn find_input(&self, name: Option<&str>) -> Result<cpal::Device> {
        match name {
            None => self
                .host
                .default_input_device()
                .ok_or_else(|| AudioError::DeviceNotFound("No default input device".to_string())),
            Some(name) => self.find_by_name(name, |d| d.supported_input_configs().is_ok()),
        }
    }

    /// Resolve an output device by name, or the default when `name` is None
    pub fn find_output(&self, name: Option<&str>) -> Result<cpal::Device> {
        match name {
            None => self
                .host
                .default_output_device()
                .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string())),
            Some(name) => self.find_by_name(name, |d| d.supported_output_configs().is_ok()),
        }
    }

    fn find_by_name(&self, name: &str, usable: impl Fn(&cpal::Device) -> bool) -> Result<cpal::Device> {
        let devices: Vec<cpal::Device> = self
            .host
            .devices()
            .map_err(|e| AudioError::StreamError(e.to_string()))?
            .filter(|d| usable(d))
            .collect();

        let needle = name.to_lowercase();
        let exact = devices.iter().position(|d| device_name(d) == name);
        let partial = || {
            devices
                .iter()
                .position(|d| device_name(d).to_lowercase().contains(&needle))
        };

        exact
            .or_else(partial)
            .and_then(|index| devices.into_iter().nth(index))
            .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))
    }
}

impl AudioEnumerator for CpalEnumerator {
    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        let default_input = self.host.default_input_device().map(|d| device_name(&d));
        let default_output = self.host.default_output_device().map(|d| device_name(&d));

        let cpal_devices = self
            .host
            .devices()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let mut devices = Vec::new();
        for device in cpal_devices {
            let Some(device_type) = Self::device_type(&device) else {
                warn!(name = %device_name(&device), "Skipping device without inputs or outputs");
                continue;
            };
            let name = device_name(&device);
            let is_default =
                default_input.as_deref() == Some(&name) || default_output.as_deref() == Some(&name);
            devices.push(describe(&device, device_type, is_default));
        }

        info!("Found {} audio devices", devices.len());
        Ok(devices)
    }

    fn default_input_device(&self) -> Result<DeviceInfo> {
        let device = self.find_input(None)?;
        Ok(describe(&device, DeviceType::Input, true))
    }

    fn default_output_device(&self) -> Result<DeviceInfo> {
        let device = self.find_output(None)?;
        Ok(describe(&device, DeviceType::Output, true))
    }
}
