// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info};

use crate::audio::mixer::Mixer;
use crate::audio::{AudioError, OutputSink, TimeSource, VoiceId, VoiceRequest};
use crate::playsync::CancelHandle;

/// An output device as reported by the host.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub host: String,
    pub max_channels: u16,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name, self.max_channels, self.host
        )
    }
}

/// Lists the output devices of every available host.
pub fn list_devices() -> Result<Vec<DeviceInfo>, AudioError> {
    // Suppress noisy output here.
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    let mut devices = Vec::new();
    for host_id in cpal::available_hosts() {
        let host = cpal::host_from_id(host_id).map_err(|e| AudioError::Host(e.to_string()))?;
        let host_devices = match host.devices() {
            Ok(host_devices) => host_devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };

        for device in host_devices {
            let Ok(output_configs) = device.supported_output_configs() else {
                continue;
            };
            let max_channels = output_configs
                .map(|config| config.channels())
                .max()
                .unwrap_or(0);
            if max_channels == 0 {
                continue;
            }

            let Ok(name) = device.name() else {
                continue;
            };
            devices.push(DeviceInfo {
                name,
                host: host_id.name().to_string(),
                max_channels,
            });
        }
    }

    devices.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(devices)
}

/// Finds an output device by name. "default" selects the default host's default device.
fn find_device(name: &str) -> Result<cpal::Device, AudioError> {
    if name == "default" {
        return cpal::default_host()
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()));
    }

    for host_id in cpal::available_hosts() {
        let host = cpal::host_from_id(host_id).map_err(|e| AudioError::Host(e.to_string()))?;
        let Ok(devices) = host.output_devices() else {
            continue;
        };
        for device in devices {
            if device.name().is_ok_and(|device_name| device_name.trim() == name) {
                return Ok(device);
            }
        }
    }
    Err(AudioError::DeviceNotFound(name.to_string()))
}

/// f32 callback: mix directly into the cpal buffer.
fn create_f32_callback(
    mixer: Arc<Mixer>,
) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) + Send + 'static {
    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        mixer.render(data);
    }
}

/// Integer callback: mix into scratch and convert.
fn create_converting_callback<T: cpal::Sample + cpal::FromSample<f32>>(
    mixer: Arc<Mixer>,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static {
    let mut scratch = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        scratch.resize(data.len(), 0.0f32);
        mixer.render(&mut scratch);
        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(src);
        }
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    mixer: Arc<Mixer>,
) -> Result<cpal::Stream, AudioError> {
    let on_error = |err: cpal::StreamError| error!("CPAL output stream error: {}", err);
    let stream = match sample_format {
        cpal::SampleFormat::F32 => {
            device.build_output_stream(config, create_f32_callback(mixer), on_error, None)
        }
        cpal::SampleFormat::I16 => device.build_output_stream(
            config,
            create_converting_callback::<i16>(mixer),
            on_error,
            None,
        ),
        cpal::SampleFormat::I32 => device.build_output_stream(
            config,
            create_converting_callback::<i32>(mixer),
            on_error,
            None,
        ),
        cpal::SampleFormat::U16 => device.build_output_stream(
            config,
            create_converting_callback::<u16>(mixer),
            on_error,
            None,
        ),
        other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
    };
    stream.map_err(|e| AudioError::Stream(e.to_string()))
}

/// A cpal output device that plays whatever its mixer renders.
///
/// The stream lives on its own thread until the device is closed or dropped.
pub struct Device {
    name: String,
    mixer: Arc<Mixer>,
    cancel_handle: CancelHandle,
    output_thread: Option<JoinHandle<()>>,
}

impl Device {
    /// Opens the named device with its default output configuration.
    pub fn open(name: &str) -> Result<Device, AudioError> {
        let device = find_device(name)?;
        let supported = device
            .default_output_config()
            .map_err(|e| AudioError::Stream(e.to_string()))?;
        let sample_format = supported.sample_format();
        let num_channels = supported.channels();
        let sample_rate = supported.sample_rate();

        let config = cpal::StreamConfig {
            channels: num_channels,
            sample_rate: sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };
        let mixer = Arc::new(Mixer::new(num_channels, sample_rate));
        let cancel_handle = CancelHandle::new();

        // The stream is created inside the thread and reports back whether it started.
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let output_thread = {
            let mixer = mixer.clone();
            let cancel_handle = cancel_handle.clone();
            thread::spawn(move || {
                let stream = match build_stream(&device, &config, sample_format, mixer) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::Stream(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Keep the stream alive until closed.
                cancel_handle.wait();
                drop(stream);
            })
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = output_thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = output_thread.join();
                return Err(AudioError::Stream("output thread exited".to_string()));
            }
        }

        info!(
            device = name,
            channels = num_channels,
            sample_rate,
            format = format!("{:?}", sample_format),
            "CPAL output stream started"
        );
        Ok(Device {
            name: name.to_string(),
            mixer,
            cancel_handle,
            output_thread: Some(output_thread),
        })
    }
}

impl OutputSink for Device {
    fn time_source(&self) -> Arc<dyn TimeSource> {
        self.mixer.time_source()
    }

    fn start_voice(&self, request: VoiceRequest) -> VoiceId {
        self.mixer.start_voice(request)
    }

    fn stop_voice(&self, voice: VoiceId, at: Option<f64>) {
        self.mixer.stop_voice(voice, at);
    }

    fn take_ended(&self) -> Vec<VoiceId> {
        self.mixer.take_ended()
    }

    fn close(&self) {
        self.mixer.close();
        self.cancel_handle.cancel();
    }

    fn is_closed(&self) -> bool {
        self.mixer.is_closed()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.close();
        if let Some(thread) = self.output_thread.take() {
            let _ = thread.join();
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}, Rate={})",
            self.name,
            self.mixer.num_channels(),
            self.mixer.sample_rate()
        )
    }
}
