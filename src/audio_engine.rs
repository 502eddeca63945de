// src/audio_engine.rs

use std::sync::atomic::AtomicU32;
use std::sync::Arc;

use ringbuf::HeapConsumer;

use crate::bridge::BlockBridge;
use crate::buffer::{MAX_DEVICE_CHANNELS, MAX_FRAMES, MAX_PORTS, PORT_CHANNELS};
use crate::error::{Error, Result};
use crate::port::Interleaved;
use crate::recorder::monitor::CpuLoadMonitor;
use crate::recorder::track::{AudioTrack, RecorderTrack};
use crate::recorder::{Recorder, RecorderHandle, TrackId};
use crate::sample::player::{PlayerConfig, SamplePlayer};
use crate::sample::track::{SampleTrack, SampleTriggers};
use crate::sample::Sample;
use crate::settings::AppSettings;

/// Everything the control side keeps once the engine moves to the audio
/// thread.
pub struct EngineControls {
    pub recorder: RecorderHandle,
    pub samples: SampleTriggers,
    pub cpu_load: Arc<AtomicU32>,
    pub sample_track: TrackId,
    pub audio_tracks: Vec<TrackId>,
}

/// Owns the recorder behind a block bridge and feeds it from the input ring.
pub struct AudioEngine {
    bridge: BlockBridge<Recorder>,
    input_consumer: Option<HeapConsumer<f32>>,
    input_channels: usize,
    input_scratch: Vec<f32>,
    sample_rate: u32,
}

/// Stereo ports needed to cover `channels` device channels.
pub fn port_count_for(channels: usize) -> usize {
    channels.div_ceil(PORT_CHANNELS).clamp(1, MAX_PORTS)
}

impl AudioEngine {
    /// Builds the recorder with one sample track followed by the configured
    /// audio tracks, the first of them selected and armed. `samples` must
    /// line up with `settings.samples`.
    pub fn from_settings(
        settings: &AppSettings,
        samples: Vec<Sample>,
        sample_rate: u32,
        input_channels: usize,
        output_channels: usize,
    ) -> Result<(Self, EngineControls)> {
        settings.validate()?;
        if samples.len() != settings.samples.len() {
            return Err(Error::Config(format!(
                "{} samples loaded for {} configured",
                samples.len(),
                settings.samples.len()
            )));
        }

        let port_count = port_count_for(input_channels.max(output_channels));
        let (mut recorder, handle) = Recorder::new();

        let players = samples
            .into_iter()
            .zip(settings.samples.iter())
            .map(|(sample, config)| SamplePlayer::new(Arc::new(sample), PlayerConfig::from(config), settings.fade_frames))
            .collect();
        let mut sample_track = SampleTrack::new(players);
        sample_track.set_latencies(settings.input_latency, settings.output_latency);
        let sample_triggers = sample_track.triggers();
        let sample_track = recorder
            .add(Box::new(sample_track))
            .ok_or_else(|| Error::Config("No room for the sample track".into()))?;

        let capacity = settings.track_capacity_frames(sample_rate);
        let mut audio_tracks = Vec::with_capacity(settings.track_count);
        for index in 0..settings.track_count {
            let mut track = AudioTrack::new(capacity);
            track.set_ports(index % port_count, 0);
            track.set_threshold(settings.record_threshold);
            // The first track starts armed; the rest wait to be selected.
            track.set_recording(index == 0);
            let id = recorder
                .add(Box::new(track))
                .ok_or_else(|| Error::Config(format!("No room for audio track {index}")))?;
            audio_tracks.push(id);
        }
        if let Some(&first) = audio_tracks.first() {
            recorder.select(first);
        }

        recorder.set_auto_stop(settings.auto_stop);
        let monitor = CpuLoadMonitor::new();
        let cpu_load = monitor.load_handle();
        recorder.set_monitor(Box::new(monitor));

        let mut bridge = BlockBridge::new(port_count, sample_rate);
        bridge.set_handler(recorder);
        log::info!(
            "Engine ready: {} Hz, {} ports, {} audio tracks, {} samples",
            sample_rate,
            port_count,
            audio_tracks.len(),
            sample_triggers.len()
        );

        let engine = Self {
            bridge,
            input_consumer: None,
            input_channels: input_channels.clamp(1, MAX_DEVICE_CHANNELS),
            input_scratch: vec![0.0; MAX_FRAMES * MAX_DEVICE_CHANNELS],
            sample_rate,
        };
        let controls = EngineControls {
            recorder: handle,
            samples: sample_triggers,
            cpu_load,
            sample_track,
            audio_tracks,
        };
        Ok((engine, controls))
    }

    /// Connects the ring the input stream writes interleaved frames into.
    pub fn attach_input(&mut self, consumer: HeapConsumer<f32>, channels: usize) {
        self.input_consumer = Some(consumer);
        self.input_channels = channels.clamp(1, MAX_DEVICE_CHANNELS);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn recorder(&self) -> Option<&Recorder> {
        self.bridge.handler()
    }

    pub fn recorder_mut(&mut self) -> Option<&mut Recorder> {
        self.bridge.handler_mut()
    }

    /// Fills `output` (interleaved, `output_channels` per frame, at most
    /// [`MAX_FRAMES`] frames) from one block of queued input.
    pub fn process_interleaved(&mut self, output: &mut [f32], output_channels: usize) {
        let output_channels = output_channels.max(1);
        let frames = (output.len() / output_channels).min(MAX_FRAMES);
        let wanted = frames * self.input_channels;
        let scratch = &mut self.input_scratch[..wanted];

        let read = match self.input_consumer.as_mut() {
            Some(consumer) => {
                // Keep at most two blocks queued so input latency cannot drift.
                let limit = wanted * 2;
                if consumer.len() > limit {
                    consumer.skip(consumer.len() - limit);
                }
                consumer.pop_slice(scratch)
            }
            None => 0,
        };
        scratch[read..].fill(0.0);

        let input = Interleaved::new(&*scratch, self.input_channels);
        let mut device_output = Interleaved::new(&mut output[..frames * output_channels], output_channels);
        self.bridge.process_block(0, frames, &input, &mut device_output);
    }
}
