// src/settings.rs

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::action::Action;
use crate::error::{Error, Result};
use crate::recorder::MAX_TRACKS;
use crate::sample::track::MAX_TRACK_SAMPLES;

pub const DEFAULT_SETTINGS_FILE: &str = "looprack.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub host_name: Option<String>,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub sample_rate: Option<u32>,
    pub buffer_size: Option<u32>,
    pub midi_port_name: Option<String>,
    pub midi_channel: u8,
    pub auto_stop: bool,
    pub fade_frames: usize,
    pub record_threshold: f32,
    pub input_latency: usize,
    pub output_latency: usize,
    pub track_count: usize,
    pub track_capacity_seconds: u32,
    pub samples: Vec<SampleSettings>,
    pub bindings: Vec<BindingSettings>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            host_name: None,
            input_device: None,
            output_device: None,
            sample_rate: None,
            buffer_size: None,
            midi_port_name: None,
            midi_channel: 0,
            auto_stop: false,
            fade_frames: 128,
            record_threshold: 0.0,
            input_latency: 0,
            output_latency: 0,
            track_count: 4,
            track_capacity_seconds: 60,
            samples: Vec::new(),
            bindings: Vec::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct SampleSettings {
    pub filename: PathBuf,
    pub sustain: bool,
    #[serde(rename = "loop")]
    pub looping: bool,
    pub concurrent: bool,
}

impl SampleSettings {
    /// Relative filenames are taken relative to the settings file.
    pub fn resolve(&self, base_dir: &Path) -> PathBuf {
        if self.filename.is_absolute() {
            self.filename.clone()
        } else {
            base_dir.join(&self.filename)
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingTrigger {
    MidiNote(u8),
    Key(char),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingSettings {
    pub trigger: BindingTrigger,
    pub action: Action,
}

impl AppSettings {
    pub fn validate(&self) -> Result<()> {
        if self.samples.len() > MAX_TRACK_SAMPLES {
            return Err(Error::Config(format!(
                "{} samples configured, at most {MAX_TRACK_SAMPLES} are supported",
                self.samples.len()
            )));
        }
        // One slot is taken by the sample track.
        if self.track_count >= MAX_TRACKS {
            return Err(Error::Config(format!(
                "track_count {} exceeds the limit of {}",
                self.track_count,
                MAX_TRACKS - 1
            )));
        }
        if self.midi_channel > 15 {
            return Err(Error::Config(format!("midi_channel {} is not 0-15", self.midi_channel)));
        }
        if !(0.0..1.0).contains(&self.record_threshold) {
            return Err(Error::Config(format!(
                "record_threshold {} must be in 0.0..1.0",
                self.record_threshold
            )));
        }
        Ok(())
    }

    pub fn track_capacity_frames(&self, sample_rate: u32) -> usize {
        self.track_capacity_seconds as usize * sample_rate as usize
    }
}

/// Reads settings from `path`, falling back to defaults when the file does
/// not exist.
pub fn load_settings(path: &Path) -> Result<AppSettings> {
    if !path.exists() {
        log::info!("No settings at {}, using defaults", path.display());
        return Ok(AppSettings::default());
    }
    let json_string = fs::read_to_string(path)?;
    let settings: AppSettings = serde_json::from_str(&json_string)?;
    settings.validate()?;
    log::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> Result<()> {
    let json_string = serde_json::to_string_pretty(settings)?;
    fs::write(path, json_string)?;
    Ok(())
}
