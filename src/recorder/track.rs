// src/recorder/track.rs

use std::any::Any;

use super::audio_store::{AudioStore, VecAudio};
use crate::buffer::PORT_CHANNELS;

/// What a track learns about the block being processed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    pub sample_rate: u32,
    pub frames: usize,
    /// Absolute engine frame of the first frame in the block.
    pub frame: u64,
}

/// Flags every track carries. `processed` is rewritten by the recorder on
/// every block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackState {
    pub finished: bool,
    pub recording: bool,
    pub mute: bool,
    pub selected: bool,
    pub processed: bool,
    pub input_port: usize,
    pub output_port: usize,
    /// Input level that must be exceeded before recording begins. Zero disables the gate.
    pub threshold: f32,
}

/// One unit of work scheduled by the recorder each block.
pub trait RecorderTrack: Send {
    fn state(&self) -> &TrackState;

    fn state_mut(&mut self) -> &mut TrackState;

    /// Priority tracks run before all others in the same block.
    fn is_priority(&self) -> bool {
        false
    }

    fn process_buffers(&mut self, block: &BlockInfo, input: Option<&mut [f32]>, output: Option<&mut [f32]>);

    /// Drops recorded content but keeps the track.
    fn reset(&mut self);

    /// Non-real-time preparation run when the transport starts.
    fn prepare(&mut self) {}

    /// Arms or disarms recording. Runs on the audio thread.
    fn set_recording(&mut self, recording: bool) {
        self.state_mut().recording = recording;
    }

    fn set_mute(&mut self, mute: bool) {
        self.state_mut().mute = mute;
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A looping track that plays back and records into an [`AudioStore`].
pub struct AudioTrack {
    state: TrackState,
    audio: Option<Box<dyn AudioStore>>,
    play_frame: usize,
    capacity_frames: usize,
    gate_open: bool,
}

impl AudioTrack {
    /// An empty track. Without a store it reports `finished` on its first
    /// block unless [`RecorderTrack::prepare`] gives it one.
    pub fn new(capacity_frames: usize) -> Self {
        Self {
            state: TrackState::default(),
            audio: None,
            play_frame: 0,
            capacity_frames,
            gate_open: false,
        }
    }

    pub fn with_audio(audio: Box<dyn AudioStore>) -> Self {
        let capacity_frames = audio.frames();
        Self {
            audio: Some(audio),
            ..Self::new(capacity_frames)
        }
    }

    pub fn set_ports(&mut self, input_port: usize, output_port: usize) {
        self.state.input_port = input_port;
        self.state.output_port = output_port;
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.state.threshold = threshold.max(0.0);
    }

    pub fn audio(&self) -> Option<&dyn AudioStore> {
        self.audio.as_deref()
    }

    pub fn play_frame(&self) -> usize {
        self.play_frame
    }

    fn record(&mut self, block: &BlockInfo, input: &[f32]) {
        let Some(audio) = self.audio.as_mut() else {
            return;
        };
        let mut skip = 0;
        if !self.gate_open {
            let threshold = self.state.threshold;
            if threshold > 0.0 {
                match input
                    .chunks_exact(PORT_CHANNELS)
                    .position(|frame| frame.iter().any(|s| s.abs() > threshold))
                {
                    Some(first) => skip = first,
                    None => return,
                }
            }
            self.gate_open = true;
        }
        audio.append(block.frame + skip as u64, &input[skip * PORT_CHANNELS..]);
    }
}

impl RecorderTrack for AudioTrack {
    fn state(&self) -> &TrackState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut TrackState {
        &mut self.state
    }

    fn process_buffers(&mut self, block: &BlockInfo, input: Option<&mut [f32]>, output: Option<&mut [f32]>) {
        let Some(audio) = self.audio.as_ref() else {
            self.state.finished = true;
            return;
        };

        // Muting only silences the track; its position keeps moving.
        if !self.state.mute {
            if let Some(output) = output {
                audio.mix(self.play_frame, output);
            }
        }
        self.play_frame += block.frames;
        if self.play_frame >= audio.frames() && !self.state.recording {
            self.state.finished = true;
        }

        if self.state.recording && !self.state.finished {
            if let Some(input) = input {
                self.record(block, input);
            }
        }
    }

    fn reset(&mut self) {
        if let Some(audio) = self.audio.as_mut() {
            audio.reset();
        }
        self.play_frame = 0;
        self.gate_open = false;
        self.state.finished = false;
    }

    /// Gives the track a store whenever it has room for one, so arming it
    /// later on the audio thread needs no allocation.
    fn prepare(&mut self) {
        if self.audio.is_none() && (self.state.recording || self.capacity_frames > 0) {
            self.audio = Some(Box::new(VecAudio::with_capacity(self.capacity_frames)));
            self.state.finished = false;
        }
    }

    /// Arming starts a new take. Disarming rewinds so the take plays back
    /// from its first frame.
    fn set_recording(&mut self, recording: bool) {
        if recording == self.state.recording {
            return;
        }
        self.state.recording = recording;
        self.gate_open = false;
        self.play_frame = 0;
        if let Some(audio) = self.audio.as_mut() {
            if recording {
                audio.reset();
            }
            self.state.finished = false;
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
