// src/recorder/calibration.rs

//! Round-trip latency and noise floor measurement.
//!
//! The run first listens for a quarter second to find the noise floor, then
//! repeatedly plays a short ping on port 0 and waits for it to come back on
//! the input. The non-real-time side blocks in [`RecorderHandle::calibrate`]
//! until the run finishes or the poll budget runs out.

use std::sync::atomic::Ordering;

use super::{RecorderCommand, RecorderHandle, TransportShared};
use crate::buffer::{left_peak, PORT_CHANNELS};
use crate::container::Sleeper;

/// Successful echoes needed for a result.
pub const CALIBRATION_SAMPLES: usize = 10;
pub const CALIBRATION_POLL_MS: u64 = 1000;
pub const CALIBRATION_POLL_LIMIT: usize = 5;
pub const PING_AMPLITUDE: f32 = 0.8;
pub const PING_FRAMES: usize = 8;
pub const ECHO_THRESHOLD: f32 = 0.3;
/// Seconds of left-channel input kept in the capture buffer.
pub const CAPTURE_SECONDS: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationResult {
    pub timeout: bool,
    pub noise_floor: f32,
    /// Mean round trip in frames. Zero when `timeout` is set.
    pub latency: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum CalibrationOutcome {
    Complete,
    Timeout,
}

pub(super) struct CalibrationRun {
    active: bool,
    start_frame: u64,
    noise_floor: f32,
    ping_frame: Option<u64>,
    /// No new ping before this frame, so the tail of the last echo is not
    /// mistaken for the next one.
    rearm_frame: u64,
    latencies: [i64; CALIBRATION_SAMPLES],
    count: usize,
    capture: Vec<f32>,
    captured: usize,
}

impl CalibrationRun {
    pub(super) fn new() -> Self {
        Self {
            active: false,
            start_frame: 0,
            noise_floor: 0.0,
            ping_frame: None,
            rearm_frame: 0,
            latencies: [0; CALIBRATION_SAMPLES],
            count: 0,
            capture: Vec::new(),
            captured: 0,
        }
    }

    pub(super) fn is_active(&self) -> bool {
        self.active
    }

    pub(super) fn begin(&mut self, frame: u64, capture: Vec<f32>) {
        self.active = true;
        self.start_frame = frame;
        self.noise_floor = 0.0;
        self.ping_frame = None;
        self.rearm_frame = 0;
        self.latencies = [0; CALIBRATION_SAMPLES];
        self.count = 0;
        self.capture = capture;
        self.captured = 0;
    }

    pub(super) fn abort(&mut self) {
        self.active = false;
        self.ping_frame = None;
    }

    pub(super) fn take_capture(&mut self) -> Vec<f32> {
        let mut capture = std::mem::take(&mut self.capture);
        capture.truncate(self.captured);
        self.captured = 0;
        capture
    }

    pub(super) fn publish(&self, shared: &TransportShared, timeout: bool) {
        let total: i64 = self.latencies[..self.count].iter().sum();
        shared.noise_floor.store(self.noise_floor.to_bits(), Ordering::Relaxed);
        shared.latency_total.store(total, Ordering::Relaxed);
        shared.latency_count.store(self.count, Ordering::Relaxed);
        shared.timed_out.store(timeout, Ordering::Relaxed);
    }

    /// Advances the measurement by one block. `frame` is the absolute engine frame of
    /// the block, `input`/`output` are the port 0 buffers.
    pub(super) fn step(&mut self, frame: u64, sample_rate: u32, input: &[f32], output: &mut [f32]) -> Option<CalibrationOutcome> {
        if !self.active {
            return None;
        }
        self.capture_input(input);

        let noise_window = sample_rate as u64 / 4;
        if frame.saturating_sub(self.start_frame) < noise_window {
            self.noise_floor = self.noise_floor.max(left_peak(input));
            return None;
        }

        let Some(ping) = self.ping_frame else {
            if frame < self.rearm_frame {
                return None;
            }
            for out in output.iter_mut().take(PING_FRAMES * PORT_CHANNELS) {
                *out = PING_AMPLITUDE;
            }
            self.ping_frame = Some(frame);
            return None;
        };

        let echo = input
            .iter()
            .step_by(PORT_CHANNELS)
            .position(|sample| sample.abs() > ECHO_THRESHOLD);
        match echo {
            Some(offset) => {
                let echo_frame = frame + offset as u64;
                self.latencies[self.count] = echo_frame as i64 - ping as i64;
                self.count += 1;
                self.ping_frame = None;
                self.rearm_frame = echo_frame + PING_FRAMES as u64;
                if self.count == CALIBRATION_SAMPLES {
                    self.active = false;
                    return Some(CalibrationOutcome::Complete);
                }
                None
            }
            None => {
                let frames = (input.len() / PORT_CHANNELS) as u64;
                if frame + frames - ping > sample_rate as u64 {
                    log::warn!("Calibration ping at frame {ping} never came back");
                    self.active = false;
                    self.ping_frame = None;
                    return Some(CalibrationOutcome::Timeout);
                }
                None
            }
        }
    }

    fn capture_input(&mut self, input: &[f32]) {
        let room = self.capture.len() - self.captured;
        for (dest, sample) in self.capture[self.captured..]
            .iter_mut()
            .zip(input.iter().step_by(PORT_CHANNELS))
        {
            *dest = *sample;
        }
        self.captured += room.min(input.len() / PORT_CHANNELS);
    }
}

impl RecorderHandle {
    /// Measures the device round trip. Blocks the caller, polling through
    /// `sleeper`, while the audio side runs the measurement. The capture buffer is
    /// sized for `sample_rate` and allocated here, never on the audio thread.
    pub fn calibrate(&mut self, sleeper: &mut dyn Sleeper, sample_rate: u32) -> CalibrationResult {
        let capture = vec![0.0f32; sample_rate as usize * CAPTURE_SECONDS];
        self.shared.reset_calibration();
        self.shared.calibrating.store(true, Ordering::Release);

        if self.commands.push(RecorderCommand::Calibrate { capture }).is_err() {
            log::warn!("Recorder command queue full, calibration not started");
            self.shared.calibrating.store(false, Ordering::Release);
            return CalibrationResult {
                timeout: true,
                noise_floor: 0.0,
                latency: 0,
            };
        }

        for _ in 0..CALIBRATION_POLL_LIMIT {
            if !self.shared.calibrating.load(Ordering::Acquire) {
                break;
            }
            sleeper.sleep(CALIBRATION_POLL_MS);
        }

        // Still set means the audio side never finished; it aborts the run
        // when it sees the flag drop.
        let abandoned = self.shared.calibrating.swap(false, Ordering::AcqRel);
        if abandoned {
            log::warn!("Calibration did not finish in time");
            self.shared.timed_out.store(true, Ordering::Relaxed);
        }

        let result = self.shared.calibration_result();
        if result.timeout {
            log::warn!("Calibration timed out, noise floor {:.4}", result.noise_floor);
        } else {
            log::info!(
                "Calibration finished: latency {} frames, noise floor {:.4}",
                result.latency,
                result.noise_floor
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 4000;

    fn block(frames: usize, value: f32) -> Vec<f32> {
        vec![value; frames * PORT_CHANNELS]
    }

    #[test]
    fn noise_window_tracks_left_peak() {
        let mut run = CalibrationRun::new();
        run.begin(0, vec![0.0; 64]);
        let mut input = block(100, 0.0);
        input[10] = 0.02;
        input[11] = 0.9; // right channel is ignored
        let mut output = block(100, 0.0);
        assert_eq!(run.step(0, RATE, &input, &mut output), None);
        assert_eq!(run.noise_floor, 0.02);
        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn ping_then_echo_records_latency() {
        let mut run = CalibrationRun::new();
        run.begin(0, Vec::new());
        let frames = 100;
        let mut frame = (RATE / 4) as u64;

        let mut output = block(frames, 0.0);
        run.step(frame, RATE, &block(frames, 0.0), &mut output);
        assert_eq!(&output[..PING_FRAMES * 2], &[PING_AMPLITUDE; PING_FRAMES * 2]);
        assert_eq!(output[PING_FRAMES * 2], 0.0);

        frame += frames as u64;
        let mut input = block(frames, 0.0);
        input[2 * 37] = 0.5;
        run.step(frame, RATE, &input, &mut block(frames, 0.0));
        assert_eq!(run.count, 1);
        assert_eq!(run.latencies[0], frames as i64 + 37);
        assert_eq!(run.ping_frame, None);
    }

    #[test]
    fn missing_echo_times_out() {
        let mut run = CalibrationRun::new();
        run.begin(0, Vec::new());
        let frames = 500;
        let mut frame = (RATE / 4) as u64;
        let mut outcome = None;
        while outcome.is_none() && frame < 10 * RATE as u64 {
            outcome = run.step(frame, RATE, &block(frames, 0.0), &mut block(frames, 0.0));
            frame += frames as u64;
        }
        assert_eq!(outcome, Some(CalibrationOutcome::Timeout));
        assert!(!run.is_active());
    }

    #[test]
    fn long_echo_tail_is_not_a_second_echo() {
        let mut run = CalibrationRun::new();
        run.begin(0, Vec::new());
        let frames = 2;
        let latency = 10;
        let mut echoes: Vec<u64> = Vec::new();
        let mut frame = (RATE / 4) as u64;

        while run.count < 3 {
            let input: Vec<f32> = (0..frames as u64)
                .flat_map(|i| {
                    let at = frame + i;
                    let level = if echoes.iter().any(|&e| at >= e && at < e + PING_FRAMES as u64) { 0.5 } else { 0.0 };
                    [level, level]
                })
                .collect();
            let mut output = block(frames, 0.0);
            assert_eq!(run.step(frame, RATE, &input, &mut output), None);
            if output[0] == PING_AMPLITUDE {
                echoes.push(frame + latency);
            }
            frame += frames as u64;
            assert!(frame < RATE as u64, "calibration stalled");
        }
        assert_eq!(&run.latencies[..3], &[latency as i64; 3]);
    }

    #[test]
    fn capture_keeps_left_channel_until_full() {
        let mut run = CalibrationRun::new();
        run.begin(0, vec![0.0; 3]);
        let input = vec![1.0, -1.0, 2.0, -2.0];
        run.step(0, RATE, &input, &mut block(2, 0.0));
        run.step(2, RATE, &input, &mut block(2, 0.0));
        assert_eq!(run.take_capture(), vec![1.0, 2.0, 1.0]);
    }
}
