// src/sample/cursor.rs

//! One in-flight playback of a sample.
//!
//! A cursor has two playheads over the same sample. The play half mixes into
//! the output buffer. The record half mixes into the input buffer, delayed by
//! the device round trip, so downstream tracks record the sample as if it had
//! come back through the interface.

use crate::buffer::PORT_CHANNELS;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorState {
    Playing,
    /// Fading from `fade_start` to silence at `max_frames`. When both are
    /// equal the playhead runs to that frame at full level.
    Stopping { fade_start: usize, max_frames: usize },
    Stopped,
}

#[derive(Clone, Copy, Debug)]
struct Playhead {
    /// Negative while latency has not been consumed yet.
    frame: i64,
    state: CursorState,
}

impl Playhead {
    fn stopped() -> Self {
        Self {
            frame: 0,
            state: CursorState::Stopped,
        }
    }

    fn starting_at(frame: i64) -> Self {
        Self {
            frame,
            state: CursorState::Playing,
        }
    }

    fn end(&self, len: usize) -> usize {
        match self.state {
            CursorState::Stopping { max_frames, .. } => max_frames.min(len),
            _ => len,
        }
    }

    fn gain(&self, frame: usize) -> f32 {
        match self.state {
            CursorState::Stopping { fade_start, max_frames } if max_frames > fade_start && frame >= fade_start => {
                (max_frames - frame) as f32 / (max_frames - fade_start) as f32
            }
            _ => 1.0,
        }
    }

    /// Handles the playhead sitting at its end. Returns true if it wrapped
    /// and should keep playing.
    fn at_end(&mut self, len: usize, wrap: bool) -> bool {
        if let CursorState::Stopping { max_frames, .. } = self.state {
            if wrap {
                log::trace!("Sample cursor asked to wrap while stopping at frame {max_frames} of {len}");
            }
            self.state = CursorState::Stopped;
            return false;
        }
        if wrap && len > 0 {
            self.frame = 0;
            return true;
        }
        self.state = CursorState::Stopped;
        false
    }

    fn play(&mut self, sample: &[f32], mut dest: Option<&mut [f32]>, frames: usize, wrap: bool) {
        if self.state == CursorState::Stopped {
            return;
        }

        let mut out = 0;
        if self.frame < 0 {
            let advanced = self.frame + frames as i64;
            if advanced <= 0 {
                self.frame = advanced;
                return;
            }
            out = (-self.frame) as usize;
            self.frame = 0;
        }

        let len = sample.len() / PORT_CHANNELS;
        loop {
            if self.frame as usize >= self.end(len) && !self.at_end(len, wrap) {
                return;
            }
            if out >= frames {
                return;
            }
            let pos = self.frame as usize;
            let count = (frames - out).min(self.end(len) - pos);
            if let Some(dest) = dest.as_deref_mut() {
                for i in 0..count {
                    let gain = self.gain(pos + i);
                    let src = (pos + i) * PORT_CHANNELS;
                    let dst = (out + i) * PORT_CHANNELS;
                    for ch in 0..PORT_CHANNELS {
                        dest[dst + ch] += sample[src + ch] * gain;
                    }
                }
            }
            self.frame += count as i64;
            out += count;
        }
    }

    fn stop_at(&mut self, state: CursorState) {
        if self.state == CursorState::Playing {
            self.state = state;
        }
    }
}

/// Fade of `fade_frames` from `pos`, or a run to the natural end when less
/// than that is left.
fn stop_state(pos: usize, len: usize, fade_frames: usize) -> CursorState {
    if len.saturating_sub(pos) < fade_frames {
        CursorState::Stopping {
            fade_start: len,
            max_frames: len,
        }
    } else {
        CursorState::Stopping {
            fade_start: pos,
            max_frames: pos + fade_frames,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SampleCursor {
    play: Playhead,
    record: Playhead,
}

impl Default for SampleCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleCursor {
    /// A stopped cursor, ready to be started from a pool.
    pub fn new() -> Self {
        Self {
            play: Playhead::stopped(),
            record: Playhead::stopped(),
        }
    }

    /// Restarts both halves. The record half trails by `record_delay` frames.
    pub fn start(&mut self, record_delay: usize) {
        self.play = Playhead::starting_at(0);
        self.record = Playhead::starting_at(-(record_delay as i64));
    }

    /// Mixes the next `frames` frames of `sample` into `output` and, through
    /// the record half, into `input`.
    pub fn play(&mut self, sample: &[f32], input: Option<&mut [f32]>, output: Option<&mut [f32]>, frames: usize, wrap: bool) {
        self.play.play(sample, output, frames, wrap);
        self.record.play(sample, input, frames, wrap);
    }

    /// Schedules a fade of `fade_frames` from the play half's position, or a
    /// run to the natural end when less than that is left. The record half
    /// stops at the same sample frame while it trails the play half within
    /// one pass. If it is still finishing the previous loop pass, it fades
    /// from its own position instead.
    pub fn stop(&mut self, len: usize, fade_frames: usize) {
        if self.play.state != CursorState::Playing && self.record.state != CursorState::Playing {
            return;
        }
        let state = stop_state(self.play.frame.max(0) as usize, len, fade_frames);
        let record_state = match state {
            CursorState::Stopping { fade_start, .. } if self.record.frame > fade_start as i64 => {
                stop_state(self.record.frame as usize, len, fade_frames)
            }
            _ => state,
        };
        self.play.stop_at(state);
        self.record.stop_at(record_state);
    }

    /// True once stop was requested or the play half ran out.
    pub fn is_stopping(&self) -> bool {
        self.play.state != CursorState::Playing
    }

    /// True only when both halves are done.
    pub fn is_stopped(&self) -> bool {
        self.play.state == CursorState::Stopped && self.record.state == CursorState::Stopped
    }

    pub fn state(&self) -> CursorState {
        self.play.state
    }

    pub fn record_state(&self) -> CursorState {
        self.record.state
    }

    /// Play half position in sample frames.
    pub fn frame(&self) -> i64 {
        self.play.frame
    }

    pub fn record_frame(&self) -> i64 {
        self.record.frame
    }
}
