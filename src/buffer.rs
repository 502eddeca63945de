// src/buffer.rs

//! Frame and port conventions shared by the whole audio path.
//!
//! A port is always stereo and its buffers are interleaved `[L, R, L, R, ..]`.
//! Every scratch buffer is sized for [`MAX_FRAMES`] up front and never grows.

/// Channels per logical port.
pub const PORT_CHANNELS: usize = 2;

/// Largest block the engine accepts from a host.
pub const MAX_FRAMES: usize = 4096;

/// Interleaved capacity of one port buffer.
pub const MAX_SAMPLES: usize = MAX_FRAMES * PORT_CHANNELS;

/// Logical ports a bridge can expose.
pub const MAX_PORTS: usize = 8;

/// Device channels addressable by an active-channel mask.
pub const MAX_DEVICE_CHANNELS: usize = 64;

/// Number of interleaved samples covering `frames` frames of one port.
#[inline]
pub fn port_samples(frames: usize) -> usize {
    frames.min(MAX_FRAMES) * PORT_CHANNELS
}

/// Adds `src` into `dest` sample by sample, scaled by `gain`.
#[inline]
pub fn mix_into(dest: &mut [f32], src: &[f32], gain: f32) {
    for (d, s) in dest.iter_mut().zip(src) {
        *d += *s * gain;
    }
}

/// Largest absolute value on the left channel of an interleaved port buffer.
pub fn left_peak(buffer: &[f32]) -> f32 {
    buffer
        .iter()
        .step_by(PORT_CHANNELS)
        .fold(0.0f32, |max, &v| max.max(v.abs()))
}
