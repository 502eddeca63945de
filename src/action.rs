// src/action.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::container::{Sleeper, SystemSleeper};
use crate::error::{Error, Result};
use crate::recorder::calibration::CalibrationResult;
use crate::recorder::{RecorderHandle, TrackId};
use crate::sample::track::SampleTriggers;
use crate::settings::{AppSettings, BindingTrigger};

/// Everything a binding can ask for.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Sample(usize),
    Start,
    Stop,
    ToggleAutoStop,
    Calibrate,
    /// Selects the n-th audio track.
    SelectTrack(usize),
    /// Arms or disarms the selected track.
    ToggleRecord,
    ToggleMute,
}

/// Binding lookup built once at startup.
#[derive(Debug, Default, Clone)]
pub struct ActionTable {
    bindings: HashMap<BindingTrigger, Action>,
}

impl ActionTable {
    pub fn from_settings(settings: &AppSettings) -> Result<Self> {
        let mut bindings = HashMap::new();
        for binding in &settings.bindings {
            match binding.action {
                Action::Sample(index) if index >= settings.samples.len() => {
                    return Err(Error::Config(format!(
                        "binding {:?} targets sample {index}, only {} configured",
                        binding.trigger,
                        settings.samples.len()
                    )));
                }
                Action::SelectTrack(index) if index >= settings.track_count => {
                    return Err(Error::Config(format!(
                        "binding {:?} targets track {index}, only {} configured",
                        binding.trigger, settings.track_count
                    )));
                }
                _ => {}
            }
            if let Some(previous) = bindings.insert(binding.trigger, binding.action) {
                log::warn!("{:?} was bound to {previous:?}, now {:?}", binding.trigger, binding.action);
            }
        }
        Ok(Self { bindings })
    }

    pub fn lookup(&self, trigger: BindingTrigger) -> Option<Action> {
        self.bindings.get(&trigger).copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Runs actions from MIDI or keyboard against the engine's control handles.
pub struct Dispatcher {
    table: ActionTable,
    samples: SampleTriggers,
    recorder: RecorderHandle,
    tracks: Vec<TrackId>,
    auto_stop: bool,
    sample_rate: u32,
    sleeper: Box<dyn Sleeper + Send>,
    last_calibration: Option<CalibrationResult>,
}

impl Dispatcher {
    pub fn new(table: ActionTable, samples: SampleTriggers, recorder: RecorderHandle, sample_rate: u32) -> Self {
        let auto_stop = recorder.shared().is_auto_stop();
        Self {
            table,
            samples,
            recorder,
            tracks: Vec::new(),
            auto_stop,
            sample_rate,
            sleeper: Box::new(SystemSleeper),
            last_calibration: None,
        }
    }

    /// Audio tracks in the order [`Action::SelectTrack`] counts them.
    pub fn with_tracks(mut self, tracks: Vec<TrackId>) -> Self {
        self.tracks = tracks;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper + Send>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Looks up `trigger` and runs its action. Returns the action, if bound.
    pub fn handle(&mut self, trigger: BindingTrigger, down: bool) -> Option<Action> {
        let action = self.table.lookup(trigger)?;
        self.dispatch(action, down);
        Some(action)
    }

    /// Samples see both edges. Every other action fires on down only.
    pub fn dispatch(&mut self, action: Action, down: bool) {
        if let Action::Sample(index) = action {
            self.samples.trigger(index, down);
            return;
        }
        if !down {
            return;
        }
        log::debug!("Dispatching {action:?}");
        match action {
            Action::Sample(_) => {}
            Action::Start => self.recorder.start(),
            Action::Stop => self.recorder.stop(),
            Action::ToggleAutoStop => {
                self.auto_stop = !self.auto_stop;
                log::info!("Auto stop {}", if self.auto_stop { "on" } else { "off" });
                self.recorder.set_auto_stop(self.auto_stop);
            }
            Action::Calibrate => {
                let result = self.recorder.calibrate(self.sleeper.as_mut(), self.sample_rate);
                self.last_calibration = Some(result);
            }
            Action::SelectTrack(index) => match self.tracks.get(index) {
                Some(&id) => self.recorder.select(id),
                None => log::warn!("No audio track {index} to select, {} available", self.tracks.len()),
            },
            Action::ToggleRecord => self.recorder.toggle_recording(),
            Action::ToggleMute => self.recorder.toggle_mute(),
        }
    }

    pub fn last_calibration(&self) -> Option<CalibrationResult> {
        self.last_calibration
    }

    pub fn recorder(&self) -> &RecorderHandle {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut RecorderHandle {
        &mut self.recorder
    }
}
