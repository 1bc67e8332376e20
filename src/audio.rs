//! Audio device handling and stream processing

use crate::constants::audio::{BUFFER_SIZE, SAMPLE_BUFFER_LEN};
use crate::error::{AppError, AppResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat, SizedSample};
use log::{error, info, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// An available input device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    pub id: String,
    pub label: String,
}

/// Enumerate input devices on the default host
pub fn list_input_devices() -> AppResult<Vec<InputDevice>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()?
        .filter_map(|d| d.name().ok())
        .map(|name| InputDevice {
            id: name.clone(),
            label: name,
        })
        .collect();
    Ok(devices)
}

/// Pick the preferred device if it is still present, else the first one
pub fn select_device<'a>(devices: &'a [InputDevice], preferred: Option<&str>) -> Option<&'a InputDevice> {
    preferred
        .and_then(|id| devices.iter().find(|d| d.id == id))
        .or_else(|| devices.first())
}

/// The device after `current`, wrapping around
pub fn next_device<'a>(devices: &'a [InputDevice], current: Option<&str>) -> Option<&'a InputDevice> {
    let index = current
        .and_then(|id| devices.iter().position(|d| d.id == id))
        .map_or(0, |i| (i + 1) % devices.len());
    devices.get(index)
}

/// Most recent mono samples written by the audio callback
#[derive(Debug)]
pub struct SampleWindow {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Downmix interleaved frames to mono by averaging channels
    pub fn push_interleaved(&mut self, data: &[f32], channels: usize) {
        for frame in data.chunks(channels.max(1)) {
            let sum: f32 = frame.iter().sum();
            self.push(sum / frame.len() as f32);
        }
    }

    /// Copy the window into `out`, oldest first
    pub fn copy_into(&self, out: &mut Vec<f32>) {
        out.clear();
        out.extend(self.samples.iter());
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.samples.len()
    }
}

pub type SharedWindow = Arc<Mutex<SampleWindow>>;

/// Find an input device by name, or the host default
fn find_device(device_id: Option<&str>) -> AppResult<cpal::Device> {
    let host = cpal::default_host();
    if let Some(name) = device_id {
        host.input_devices()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| AppError::AudioDevice(format!("Specified device not found: {}", name)))
    } else {
        host.default_input_device()
            .ok_or_else(|| AppError::AudioDevice("No default input device available".to_string()))
    }
}

/// Prefer a mono config at the device's default rate and format
fn choose_config(device: &cpal::Device) -> AppResult<cpal::SupportedStreamConfig> {
    let default = device.default_input_config()?;
    if default.channels() == 1 {
        return Ok(default);
    }
    let rate = default.sample_rate();
    let mono = device.supported_input_configs()?.find(|range| {
        range.channels() == 1
            && range.sample_format() == default.sample_format()
            && range.min_sample_rate() <= rate
            && range.max_sample_rate() >= rate
    });
    Ok(mono.map(|range| range.with_sample_rate(rate)).unwrap_or(default))
}

/// Build an input stream converting any sample type into the shared window
fn build_input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    window: SharedWindow,
) -> AppResult<cpal::Stream>
where
    T: SizedSample,
    f32: cpal::FromSample<T>,
{
    let channels = config.channels as usize;
    let mut converted = Vec::new();
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            converted.clear();
            converted.extend(data.iter().map(|s| s.to_sample::<f32>()));
            window
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push_interleaved(&converted, channels);
        },
        |err| error!("Audio stream error: {}", err),
        None,
    )?;
    Ok(stream)
}

/// A running capture on one input device
pub trait CaptureSession: Sized {
    /// Acquire the device and start capturing
    fn open(device_id: Option<&str>) -> AppResult<Self>;

    fn device(&self) -> &InputDevice;

    /// Copy the latest sample buffer for analysis
    fn read_samples(&self, out: &mut Vec<f32>);

    /// Release the device
    fn stop(self);
}

/// Exclusive owner of a running cpal capture stream
pub struct MonitorSession {
    stream: cpal::Stream,
    window: SharedWindow,
    device: InputDevice,
}

impl CaptureSession for MonitorSession {
    fn open(device_id: Option<&str>) -> AppResult<Self> {
        let device = find_device(device_id)?;
        let name = device.name()?;
        let supported = choose_config(&device)?;

        let config = cpal::StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: BUFFER_SIZE,
        };
        let window = Arc::new(Mutex::new(SampleWindow::new(SAMPLE_BUFFER_LEN)));
        let shared = Arc::clone(&window);

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_input_stream::<f32>(&device, &config, shared)?,
            SampleFormat::I16 => build_input_stream::<i16>(&device, &config, shared)?,
            SampleFormat::U16 => build_input_stream::<u16>(&device, &config, shared)?,
            other => {
                return Err(AppError::AudioStream(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        };
        stream.play()?;

        info!(
            "Monitoring {} ({} ch @ {} Hz)",
            name, config.channels, config.sample_rate.0
        );

        Ok(Self {
            stream,
            window,
            device: InputDevice {
                id: name.clone(),
                label: name,
            },
        })
    }

    fn device(&self) -> &InputDevice {
        &self.device
    }

    fn read_samples(&self, out: &mut Vec<f32>) {
        self.window
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .copy_into(out);
    }

    /// A failing pause is not fatal
    fn stop(self) {
        if let Err(e) = self.stream.pause() {
            warn!("Ignoring error while stopping {}: {}", self.device.label, e);
        }
        drop(self.stream);
        info!("Stopped monitoring {}", self.device.label);
    }
}
