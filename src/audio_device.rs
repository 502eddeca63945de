// src/audio_device.rs

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host, HostId};

fn get_host_from_id(host_id: HostId) -> Result<Host> {
    cpal::host_from_id(host_id).with_context(|| format!("Failed to get audio host {}", host_id.name()))
}

/// The saved host if it is available, otherwise the platform default.
pub fn select_host(host_name: Option<&str>) -> HostId {
    let default_id = cpal::default_host().id();
    let Some(name) = host_name else {
        return default_id;
    };
    match cpal::available_hosts().into_iter().find(|id| id.name() == name) {
        Some(id) => id,
        None => {
            log::warn!("Audio host '{name}' not available, using {}", default_id.name());
            default_id
        }
    }
}

pub fn get_input_devices(host_id: HostId) -> Result<Vec<(String, Device)>> {
    let host = get_host_from_id(host_id)?;
    let devices = host.input_devices()?;
    Ok(devices.filter_map(|d| d.name().ok().map(|name| (name, d))).collect())
}

pub fn get_output_devices(host_id: HostId) -> Result<Vec<(String, Device)>> {
    let host = get_host_from_id(host_id)?;
    let devices = host.output_devices()?;
    Ok(devices.filter_map(|d| d.name().ok().map(|name| (name, d))).collect())
}

/// Finds a device by name, or the host default when `name` is `None`.
pub fn find_input_device(host_id: HostId, name: Option<&str>) -> Result<Device> {
    match name {
        Some(name) => get_input_devices(host_id)?
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d)
            .ok_or_else(|| anyhow::anyhow!("Input device not found: {}", name)),
        None => get_host_from_id(host_id)?
            .default_input_device()
            .ok_or_else(|| anyhow::anyhow!("No default input device")),
    }
}

pub fn find_output_device(host_id: HostId, name: Option<&str>) -> Result<Device> {
    match name {
        Some(name) => get_output_devices(host_id)?
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d)
            .ok_or_else(|| anyhow::anyhow!("Output device not found: {}", name)),
        None => get_host_from_id(host_id)?
            .default_output_device()
            .ok_or_else(|| anyhow::anyhow!("No default output device")),
    }
}

/// Human-readable listing of every host and its devices.
pub fn describe_devices() -> Result<String> {
    let mut report = String::new();
    for host_id in cpal::available_hosts() {
        report.push_str(&format!("{}\n", host_id.name()));
        for (name, device) in get_input_devices(host_id)? {
            let channels = device.default_input_config().map(|c| c.channels()).unwrap_or(0);
            report.push_str(&format!("  in  {name} ({channels} ch)\n"));
        }
        for (name, device) in get_output_devices(host_id)? {
            let channels = device.default_output_config().map(|c| c.channels()).unwrap_or(0);
            report.push_str(&format!("  out {name} ({channels} ch)\n"));
        }
    }
    Ok(report)
}
