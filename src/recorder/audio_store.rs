// src/recorder/audio_store.rs

use crate::buffer::{mix_into, PORT_CHANNELS};

/// Recorded content behind a track, keyed by frame.
pub trait AudioStore: Send {
    /// Frames of content currently held.
    fn frames(&self) -> usize;

    /// Adds up to `dest.len() / 2` frames starting at content frame `frame`
    /// into `dest`. Returns the number of frames mixed.
    fn mix(&self, frame: usize, dest: &mut [f32]) -> usize;

    /// Stores interleaved `src` at the absolute engine frame `frame`.
    /// Returns the number of frames kept.
    fn append(&mut self, frame: u64, src: &[f32]) -> usize;

    fn reset(&mut self);
}

/// Interleaved stereo store with a capacity fixed at construction, so
/// appending never reallocates on the audio thread.
pub struct VecAudio {
    samples: Vec<f32>,
    capacity_frames: usize,
    origin: Option<u64>,
}

impl VecAudio {
    pub fn with_capacity(capacity_frames: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity_frames * PORT_CHANNELS),
            capacity_frames,
            origin: None,
        }
    }

    /// A store preloaded with interleaved content, e.g. a loop read from disk.
    pub fn from_samples(samples: Vec<f32>) -> Self {
        let capacity_frames = samples.len() / PORT_CHANNELS;
        Self {
            samples,
            capacity_frames,
            origin: Some(0),
        }
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity_frames
    }

    /// Absolute engine frame of the first appended frame.
    pub fn origin(&self) -> Option<u64> {
        self.origin
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

impl AudioStore for VecAudio {
    fn frames(&self) -> usize {
        self.samples.len() / PORT_CHANNELS
    }

    fn mix(&self, frame: usize, dest: &mut [f32]) -> usize {
        let start = frame * PORT_CHANNELS;
        if start >= self.samples.len() {
            return 0;
        }
        let len = dest.len().min(self.samples.len() - start);
        mix_into(&mut dest[..len], &self.samples[start..start + len], 1.0);
        len / PORT_CHANNELS
    }

    fn append(&mut self, frame: u64, src: &[f32]) -> usize {
        let origin = *self.origin.get_or_insert(frame);
        let Some(start) = frame.checked_sub(origin).map(|f| f as usize) else {
            log::trace!("Append before store origin ignored");
            return 0;
        };
        if start >= self.capacity_frames {
            return 0;
        }
        let frames = (src.len() / PORT_CHANNELS).min(self.capacity_frames - start);
        let end = (start + frames) * PORT_CHANNELS;
        if self.samples.len() < end {
            self.samples.resize(end, 0.0);
        }
        self.samples[start * PORT_CHANNELS..end].copy_from_slice(&src[..frames * PORT_CHANNELS]);
        frames
    }

    fn reset(&mut self) {
        self.samples.clear();
        self.origin = None;
    }
}
