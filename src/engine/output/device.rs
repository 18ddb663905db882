//! Output device discovery and selection.

use cpal::traits::{DeviceTrait, HostTrait};

use crate::engine::output::DeviceError;

/// Picks the first output device whose name contains `needle`
/// (case-insensitive), or the host default when `needle` is `None`.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device, DeviceError> {
    if let Some(needle) = needle {
        let found = host.output_devices()?.find(|d| {
            d.description()
                .map(|desc| matches_device_name(&desc.name(), needle))
                .unwrap_or(false)
        });
        return found.ok_or_else(|| DeviceError::NoMatch(needle.to_string()));
    }

    host.default_output_device().ok_or(DeviceError::NoDefaultDevice)
}

/// Chooses the output config: the device default unless `target_rate` is
/// given, in which case the range closest to it wins (`f32` preferred).
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: Option<u32>,
) -> Result<cpal::SupportedStreamConfig, DeviceError> {
    let Some(target) = target_rate else {
        return Ok(device.default_output_config()?);
    };

    let mut best: Option<(u32, u8, cpal::SupportedStreamConfig)> = None;
    for range in device.supported_output_configs()? {
        let rank = sample_format_rank(range.sample_format());
        if rank == u8::MAX {
            continue;
        }
        let rate = clamp_rate(range.min_sample_rate(), range.max_sample_rate(), target);
        let distance = rate.abs_diff(target);
        let better = match &best {
            None => true,
            Some((d, r, _)) => distance < *d || (distance == *d && rank < *r),
        };
        if better {
            best = Some((distance, rank, range.with_sample_rate(rate)));
        }
    }
    best.map(|(_, _, cfg)| cfg).ok_or(DeviceError::NoConfig)
}

/// Names of all output devices, in host order.
pub fn list_devices(host: &cpal::Host) -> Result<Vec<String>, DeviceError> {
    let mut names = Vec::new();
    for device in host.output_devices()? {
        match device.description() {
            Ok(desc) => names.push(desc.to_string()),
            Err(err) => tracing::debug!("skipping unnamed device: {err}"),
        }
    }
    Ok(names)
}

pub fn device_name(device: &cpal::Device) -> String {
    device
        .description()
        .map(|desc| desc.to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

fn clamp_rate(min: u32, max: u32, target: u32) -> u32 {
    target.clamp(min, max.max(min))
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => u8::MAX,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
