// src/port.rs

//! Moves a logical stereo port in and out of a device's channel layout.

use crate::buffer::{port_samples, MAX_DEVICE_CHANNELS, MAX_SAMPLES, PORT_CHANNELS};

/// Read access to a device block addressed by absolute channel index.
pub trait DeviceInput {
    fn channel_count(&self) -> usize;
    fn sample(&self, channel: usize, frame: usize) -> f32;
}

/// Write access to a device block addressed by absolute channel index.
pub trait DeviceOutput {
    fn channel_count(&self) -> usize;
    fn set_sample(&mut self, channel: usize, frame: usize, value: f32);
    fn silence(&mut self, frames: usize);
}

/// A device block stored frame by frame, `channels` samples per frame.
pub struct Interleaved<T> {
    data: T,
    channels: usize,
}

impl<T> Interleaved<T> {
    pub fn new(data: T, channels: usize) -> Self {
        Self {
            data,
            channels: channels.max(1),
        }
    }
}

impl<T: AsRef<[f32]>> DeviceInput for Interleaved<T> {
    fn channel_count(&self) -> usize {
        self.channels
    }

    fn sample(&self, channel: usize, frame: usize) -> f32 {
        self.data
            .as_ref()
            .get(frame * self.channels + channel)
            .copied()
            .unwrap_or(0.0)
    }
}

impl<T: AsMut<[f32]>> DeviceOutput for Interleaved<T> {
    fn channel_count(&self) -> usize {
        self.channels
    }

    fn set_sample(&mut self, channel: usize, frame: usize, value: f32) {
        if let Some(s) = self.data.as_mut().get_mut(frame * self.channels + channel) {
            *s = value;
        }
    }

    fn silence(&mut self, frames: usize) {
        let data = self.data.as_mut();
        let end = (frames * self.channels).min(data.len());
        data[..end].fill(0.0);
    }
}

/// A device block with one buffer per channel.
pub struct NonInterleaved<'a, C> {
    channels: &'a mut [C],
}

impl<'a, C> NonInterleaved<'a, C> {
    pub fn new(channels: &'a mut [C]) -> Self {
        Self { channels }
    }
}

/// Read-only counterpart of [`NonInterleaved`].
pub struct NonInterleavedRef<'a, C> {
    channels: &'a [C],
}

impl<'a, C> NonInterleavedRef<'a, C> {
    pub fn new(channels: &'a [C]) -> Self {
        Self { channels }
    }
}

impl<C: AsRef<[f32]>> DeviceInput for NonInterleavedRef<'_, C> {
    fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn sample(&self, channel: usize, frame: usize) -> f32 {
        self.channels
            .get(channel)
            .and_then(|c| c.as_ref().get(frame))
            .copied()
            .unwrap_or(0.0)
    }
}

impl<C: AsMut<[f32]>> DeviceOutput for NonInterleaved<'_, C> {
    fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn set_sample(&mut self, channel: usize, frame: usize, value: f32) {
        if let Some(s) = self
            .channels
            .get_mut(channel)
            .and_then(|c| c.as_mut().get_mut(frame))
        {
            *s = value;
        }
    }

    fn silence(&mut self, frames: usize) {
        for channel in self.channels.iter_mut() {
            let data = channel.as_mut();
            let end = frames.min(data.len());
            data[..end].fill(0.0);
        }
    }
}

/// Ascending list of the device channels that are marked active.
///
/// Port `n` is built from entries `2n` and `2n + 1`, so port 0 is always the
/// two lowest-numbered active channels even when the driver reports a gappy
/// layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelMap {
    channels: [u8; MAX_DEVICE_CHANNELS],
    count: usize,
}

impl ChannelMap {
    pub fn from_mask(mask: u64, device_channels: usize) -> Self {
        let mut channels = [0u8; MAX_DEVICE_CHANNELS];
        let mut count = 0;
        for channel in 0..device_channels.min(MAX_DEVICE_CHANNELS) {
            if mask & (1u64 << channel) != 0 {
                channels[count] = channel as u8;
                count += 1;
            }
        }
        Self { channels, count }
    }

    pub fn all(device_channels: usize) -> Self {
        Self::from_mask(u64::MAX, device_channels)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Absolute device channel behind a logical (active) channel index.
    pub fn device_channel(&self, logical: usize) -> Option<usize> {
        (logical < self.count).then(|| self.channels[logical] as usize)
    }

    /// Whether `channel` takes part in any port of this map.
    pub fn contains(&self, channel: usize) -> bool {
        self.channels[..self.count]
            .iter()
            .any(|&c| c as usize == channel)
    }
}

/// Interleaved input/output scratch for one logical port.
pub struct PortBuffer {
    number: usize,
    input: Box<[f32]>,
    output: Box<[f32]>,
    prepared: bool,
}

impl PortBuffer {
    pub fn new(number: usize) -> Self {
        Self {
            number,
            input: vec![0.0; MAX_SAMPLES].into_boxed_slice(),
            output: vec![0.0; MAX_SAMPLES].into_boxed_slice(),
            prepared: false,
        }
    }

    pub fn number(&self) -> usize {
        self.number
    }

    /// First logical channel of this port within a [`ChannelMap`].
    pub fn channel_offset(&self) -> usize {
        self.number * PORT_CHANNELS
    }

    /// Called once per block boundary so the next `extract` reads fresh audio.
    pub fn reset(&mut self) {
        self.prepared = false;
    }

    /// Pulls this port's two channels out of `device` into the interleaved
    /// input scratch. A port whose second channel falls off the end of the
    /// map duplicates its single channel into L and R. Repeated calls within
    /// the same block return the already prepared buffer.
    pub fn extract<D: DeviceInput>(&mut self, device: &D, map: &ChannelMap, frames: usize) -> &mut [f32] {
        let len = port_samples(frames);
        if self.prepared {
            return &mut self.input[..len];
        }
        let frames = len / PORT_CHANNELS;
        let offset = self.channel_offset();
        let input = &mut self.input[..len];
        input.fill(0.0);

        match (map.device_channel(offset), map.device_channel(offset + 1)) {
            (Some(left), Some(right)) => {
                for (i, frame) in input.chunks_exact_mut(PORT_CHANNELS).enumerate().take(frames) {
                    frame[0] = device.sample(left, i);
                    frame[1] = device.sample(right, i);
                }
            }
            (Some(mono), None) => {
                for (i, frame) in input.chunks_exact_mut(PORT_CHANNELS).enumerate().take(frames) {
                    let s = device.sample(mono, i);
                    frame[0] = s;
                    frame[1] = s;
                }
            }
            _ => {}
        }
        self.prepared = true;
        input
    }

    /// Copies the interleaved output scratch to this port's device channels.
    /// A mono last port only receives the left channel; nothing is summed.
    pub fn transfer<D: DeviceOutput>(&self, device: &mut D, map: &ChannelMap, frames: usize) {
        let len = port_samples(frames);
        let frames = len / PORT_CHANNELS;
        let output = &self.output[..len];

        let offset = self.channel_offset();
        let left = map.device_channel(offset);
        let right = map.device_channel(offset + 1);
        for (i, frame) in output.chunks_exact(PORT_CHANNELS).enumerate().take(frames) {
            if let Some(left) = left {
                device.set_sample(left, i, frame[0]);
            }
            if let Some(right) = right {
                device.set_sample(right, i, frame[1]);
            }
        }
    }

    pub fn clear_output(&mut self, frames: usize) {
        self.output[..port_samples(frames)].fill(0.0);
    }

    pub fn input(&self, frames: usize) -> &[f32] {
        &self.input[..port_samples(frames)]
    }

    pub fn input_mut(&mut self, frames: usize) -> &mut [f32] {
        &mut self.input[..port_samples(frames)]
    }

    pub fn output(&self, frames: usize) -> &[f32] {
        &self.output[..port_samples(frames)]
    }

    pub fn output_mut(&mut self, frames: usize) -> &mut [f32] {
        &mut self.output[..port_samples(frames)]
    }

    /// Both scratch buffers of the port for the current block.
    pub fn buffers_mut(&mut self, frames: usize) -> (&mut [f32], &mut [f32]) {
        let len = port_samples(frames);
        (&mut self.input[..len], &mut self.output[..len])
    }
}
