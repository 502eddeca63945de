// src/sample.rs

//! Triggered sample playback.
//!
//! A [`track::SampleTrack`] owns up to eight [`player::SamplePlayer`]s. Each
//! player keeps a small pool of [`cursor::SampleCursor`]s and is fed down/up
//! events through a [`trigger::trigger_queue`] ring.

pub mod cursor;
pub mod loader;
pub mod player;
pub mod track;
pub mod trigger;

use crate::buffer::PORT_CHANNELS;

/// Interleaved stereo audio loaded once and shared read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    name: String,
    samples: Vec<f32>,
}

impl Sample {
    /// `samples` must be interleaved stereo. A trailing odd sample is dropped.
    pub fn new(name: impl Into<String>, mut samples: Vec<f32>) -> Self {
        samples.truncate(samples.len() / PORT_CHANNELS * PORT_CHANNELS);
        Self {
            name: name.into(),
            samples,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / PORT_CHANNELS
    }
}
