// src/recorder.rs

//! Block scheduler and transport.
//!
//! The [`Recorder`] lives on the audio thread. Everything the rest of the
//! program needs to do to it while audio is running goes through the
//! [`RecorderHandle`]: commands over a ring buffer, state back over atomics.

pub mod audio_store;
pub mod calibration;
pub mod monitor;
pub mod track;

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use ringbuf::{HeapConsumer, HeapProducer, HeapRb};

use crate::bridge::BlockHandler;
use crate::container::AudioContainer;
use calibration::{CalibrationRun, CalibrationResult, CalibrationOutcome};
use monitor::RecorderMonitor;
use track::{BlockInfo, RecorderTrack};

pub const MAX_TRACKS: usize = 64;
const COMMAND_CAPACITY: usize = 64;

/// Stable slot index of a track inside the recorder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TrackId(pub usize);

#[derive(Debug)]
pub enum RecorderCommand {
    Start,
    Stop,
    SetAutoStop(bool),
    Select(TrackId),
    SetRecording(TrackId, bool),
    SetMute(TrackId, bool),
    /// Flips recording on the selected track.
    ToggleRecording,
    /// Flips mute on the selected track.
    ToggleMute,
    ResetTracks,
    Calibrate { capture: Vec<f32> },
}

/// State published by the audio side and read anywhere.
#[derive(Debug, Default)]
pub struct TransportShared {
    running: AtomicBool,
    auto_stop: AtomicBool,
    calibrating: AtomicBool,
    frame: AtomicU64,
    noise_floor: AtomicU32,
    latency_total: AtomicI64,
    latency_count: AtomicUsize,
    timed_out: AtomicBool,
}

impl TransportShared {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_auto_stop(&self) -> bool {
        self.auto_stop.load(Ordering::Relaxed)
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibrating.load(Ordering::Acquire)
    }

    /// Input frames seen by the recorder so far.
    pub fn frame(&self) -> u64 {
        self.frame.load(Ordering::Relaxed)
    }

    fn reset_calibration(&self) {
        self.noise_floor.store(0, Ordering::Relaxed);
        self.latency_total.store(0, Ordering::Relaxed);
        self.latency_count.store(0, Ordering::Relaxed);
        self.timed_out.store(false, Ordering::Relaxed);
    }

    fn calibration_result(&self) -> CalibrationResult {
        let count = self.latency_count.load(Ordering::Relaxed);
        let timeout = self.timed_out.load(Ordering::Relaxed) || count == 0;
        CalibrationResult {
            timeout,
            noise_floor: f32::from_bits(self.noise_floor.load(Ordering::Relaxed)),
            latency: if timeout {
                0
            } else {
                self.latency_total.load(Ordering::Relaxed) / count as i64
            },
        }
    }
}

/// Control side of a [`Recorder`] that is owned by the audio thread.
pub struct RecorderHandle {
    commands: HeapProducer<RecorderCommand>,
    shared: Arc<TransportShared>,
}

impl RecorderHandle {
    pub fn start(&mut self) {
        self.send(RecorderCommand::Start);
    }

    pub fn stop(&mut self) {
        self.send(RecorderCommand::Stop);
    }

    pub fn set_auto_stop(&mut self, auto_stop: bool) {
        self.send(RecorderCommand::SetAutoStop(auto_stop));
    }

    pub fn select(&mut self, id: TrackId) {
        self.send(RecorderCommand::Select(id));
    }

    pub fn set_recording(&mut self, id: TrackId, recording: bool) {
        self.send(RecorderCommand::SetRecording(id, recording));
    }

    pub fn set_mute(&mut self, id: TrackId, mute: bool) {
        self.send(RecorderCommand::SetMute(id, mute));
    }

    pub fn toggle_recording(&mut self) {
        self.send(RecorderCommand::ToggleRecording);
    }

    pub fn toggle_mute(&mut self) {
        self.send(RecorderCommand::ToggleMute);
    }

    pub fn reset_tracks(&mut self) {
        self.send(RecorderCommand::ResetTracks);
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn is_calibrating(&self) -> bool {
        self.shared.is_calibrating()
    }

    pub fn shared(&self) -> Arc<TransportShared> {
        self.shared.clone()
    }

    fn send(&mut self, command: RecorderCommand) {
        if let Err(command) = self.commands.push(command) {
            log::warn!("Recorder command queue full, dropped {command:?}");
        }
    }
}

pub struct Recorder {
    tracks: Vec<Option<Box<dyn RecorderTrack>>>,
    frame: u64,
    running: bool,
    auto_stop: bool,
    in_container: bool,
    monitor: Option<Box<dyn RecorderMonitor>>,
    commands: HeapConsumer<RecorderCommand>,
    shared: Arc<TransportShared>,
    calibration: CalibrationRun,
}

impl Recorder {
    pub fn new() -> (Self, RecorderHandle) {
        let (producer, consumer) = HeapRb::<RecorderCommand>::new(COMMAND_CAPACITY).split();
        let shared = Arc::new(TransportShared::default());
        let recorder = Self {
            tracks: Vec::with_capacity(MAX_TRACKS),
            frame: 0,
            running: false,
            auto_stop: false,
            in_container: false,
            monitor: None,
            commands: consumer,
            shared: shared.clone(),
            calibration: CalibrationRun::new(),
        };
        let handle = RecorderHandle {
            commands: producer,
            shared,
        };
        (recorder, handle)
    }

    /// Registers a track in the first free slot. The track is prepared
    /// here, on the caller's thread, so a later start needs no allocation.
    pub fn add(&mut self, mut track: Box<dyn RecorderTrack>) -> Option<TrackId> {
        track.prepare();
        if let Some(index) = self.tracks.iter().position(Option::is_none) {
            self.tracks[index] = Some(track);
            log::info!("Track added in slot {index}");
            return Some(TrackId(index));
        }
        if self.tracks.len() >= MAX_TRACKS {
            log::warn!("Recorder already holds {MAX_TRACKS} tracks");
            return None;
        }
        self.tracks.push(Some(track));
        log::info!("Track added in slot {}", self.tracks.len() - 1);
        Some(TrackId(self.tracks.len() - 1))
    }

    pub fn remove(&mut self, id: TrackId) -> Option<Box<dyn RecorderTrack>> {
        let track = self.tracks.get_mut(id.0)?.take();
        if track.is_some() {
            log::info!("Track removed from slot {}", id.0);
        }
        track
    }

    /// Marks one track selected and clears the flag on all others.
    pub fn select(&mut self, id: TrackId) {
        for (index, track) in self.tracks.iter_mut().enumerate() {
            if let Some(track) = track {
                track.state_mut().selected = index == id.0;
            }
        }
    }

    pub fn selected(&self) -> Option<TrackId> {
        self.tracks
            .iter()
            .position(|t| t.as_ref().map_or(false, |t| t.state().selected))
            .map(TrackId)
    }

    pub fn track(&self, id: TrackId) -> Option<&dyn RecorderTrack> {
        self.tracks.get(id.0)?.as_deref()
    }

    pub fn track_mut(&mut self, id: TrackId) -> Option<&mut (dyn RecorderTrack + 'static)> {
        self.tracks.get_mut(id.0)?.as_deref_mut()
    }

    pub fn downcast<T: 'static>(&self, id: TrackId) -> Option<&T> {
        self.track(id)?.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: 'static>(&mut self, id: TrackId) -> Option<&mut T> {
        self.track_mut(id)?.as_any_mut().downcast_mut::<T>()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_some()).count()
    }

    pub fn set_monitor(&mut self, monitor: Box<dyn RecorderMonitor>) {
        self.monitor = Some(monitor);
    }

    /// Starts the transport. Call from a non-real-time context; tracks that
    /// are about to record get their backing store here.
    pub fn start(&mut self) {
        for track in self.tracks.iter_mut().flatten() {
            track.prepare();
        }
        self.set_running(true);
    }

    /// Suppresses track processing. Blocks keep arriving.
    pub fn stop(&mut self) {
        self.set_running(false);
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_auto_stop(&mut self, auto_stop: bool) {
        self.auto_stop = auto_stop;
        self.shared.auto_stop.store(auto_stop, Ordering::Relaxed);
    }

    pub fn is_auto_stop(&self) -> bool {
        self.auto_stop
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn shared(&self) -> Arc<TransportShared> {
        self.shared.clone()
    }

    /// Left-channel input recorded during the last calibration.
    pub fn take_calibration_capture(&mut self) -> Vec<f32> {
        self.calibration.take_capture()
    }

    /// Per-block entry point.
    pub fn container_audio_available(&mut self, container: &mut dyn AudioContainer) {
        if self.in_container {
            log::error!("Recorder re-entered while a block is still in progress");
            return;
        }
        self.in_container = true;

        self.handle_commands();

        let frames = container.interrupt_frames();
        let sample_rate = container.sample_rate();
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.recorder_enter(frames, sample_rate);
        }

        if self.running {
            if self.shared.is_calibrating() {
                self.calibrate_step(container);
            } else {
                self.process_tracks(container);
            }
        }

        if let Some(monitor) = self.monitor.as_mut() {
            monitor.recorder_exit(frames, sample_rate);
        }

        self.frame += frames as u64;
        self.shared.frame.store(self.frame, Ordering::Relaxed);
        self.in_container = false;
    }

    fn handle_commands(&mut self) {
        while let Some(command) = self.commands.pop() {
            match command {
                RecorderCommand::Start => self.set_running(true),
                RecorderCommand::Stop => self.set_running(false),
                RecorderCommand::SetAutoStop(auto_stop) => self.set_auto_stop(auto_stop),
                RecorderCommand::Select(id) => self.select(id),
                RecorderCommand::SetRecording(id, recording) => self.with_track(Some(id), |t| t.set_recording(recording)),
                RecorderCommand::SetMute(id, mute) => self.with_track(Some(id), |t| t.set_mute(mute)),
                RecorderCommand::ToggleRecording => {
                    let selected = self.selected();
                    self.with_track(selected, |t| {
                        let recording = !t.state().recording;
                        t.set_recording(recording);
                    });
                }
                RecorderCommand::ToggleMute => {
                    let selected = self.selected();
                    self.with_track(selected, |t| {
                        let mute = !t.state().mute;
                        t.set_mute(mute);
                    });
                }
                RecorderCommand::ResetTracks => {
                    for track in self.tracks.iter_mut().flatten() {
                        track.reset();
                    }
                }
                RecorderCommand::Calibrate { capture } => {
                    self.calibration.begin(self.frame, capture);
                    self.set_running(true);
                }
            }
        }

        // The handle gave up waiting.
        if self.calibration.is_active() && !self.shared.is_calibrating() {
            self.calibration.abort();
            self.calibration.publish(&self.shared, true);
            self.set_running(false);
        }
    }

    fn with_track(&mut self, id: Option<TrackId>, apply: impl FnOnce(&mut dyn RecorderTrack)) {
        match id.and_then(|id| self.track_mut(id)) {
            Some(track) => apply(track),
            None => log::warn!("Track command for {id:?} has no target"),
        }
    }

    fn calibrate_step(&mut self, container: &mut dyn AudioContainer) {
        let sample_rate = container.sample_rate();
        let Some(buffers) = container.interrupt_buffers(0, 0) else {
            return;
        };
        let outcome = self.calibration.step(self.frame, sample_rate, buffers.input, buffers.output);
        if let Some(outcome) = outcome {
            self.calibration.publish(&self.shared, outcome == CalibrationOutcome::Timeout);
            self.shared.calibrating.store(false, Ordering::Release);
            self.set_running(false);
        }
    }

    /// Runs priority tracks, then everything not yet processed this block.
    fn process_tracks(&mut self, container: &mut dyn AudioContainer) {
        let block = BlockInfo {
            sample_rate: container.sample_rate(),
            frames: container.interrupt_frames(),
            frame: self.frame,
        };

        for index in 0..self.tracks.len() {
            if let Some(track) = self.tracks[index].as_deref_mut() {
                if track.is_priority() {
                    process_track(track, container, &block);
                    track.state_mut().processed = true;
                } else {
                    track.state_mut().processed = false;
                }
            }
        }

        for index in 0..self.tracks.len() {
            if let Some(track) = self.tracks[index].as_deref_mut() {
                if !track.state().processed {
                    process_track(track, container, &block);
                    track.state_mut().processed = true;
                }
            }
        }

        if self.auto_stop {
            let all_finished = self
                .tracks
                .iter()
                .flatten()
                .all(|t| t.state().finished && !t.state().recording);
            if all_finished {
                log::debug!("All tracks finished, stopping at frame {}", self.frame);
                self.set_running(false);
            }
        }
    }

    fn set_running(&mut self, running: bool) {
        self.running = running;
        self.shared.running.store(running, Ordering::Release);
    }
}

fn process_track(track: &mut dyn RecorderTrack, container: &mut dyn AudioContainer, block: &BlockInfo) {
    let (input_port, output_port) = (track.state().input_port, track.state().output_port);
    match container.interrupt_buffers(input_port, output_port) {
        Some(buffers) => track.process_buffers(block, Some(buffers.input), Some(buffers.output)),
        None => track.process_buffers(block, None, None),
    }
}

impl BlockHandler for Recorder {
    fn process_block(&mut self, container: &mut dyn AudioContainer) {
        self.container_audio_available(container);
    }
}
