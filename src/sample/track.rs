// src/sample/track.rs

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::player::SamplePlayer;
use super::trigger::{trigger_shared, SharedTriggerSender};
use crate::recorder::track::{BlockInfo, RecorderTrack, TrackState};

pub const MAX_TRACK_SAMPLES: usize = 8;

const NO_SAMPLE: usize = usize::MAX;

struct SampleTrackShared {
    queues: Vec<SharedTriggerSender>,
    frames: Vec<usize>,
    last_sample: AtomicUsize,
}

/// Cloneable trigger source for a [`SampleTrack`] that lives on the audio
/// thread. Clones serialize on each sample's sender lock.
#[derive(Clone)]
pub struct SampleTriggers {
    shared: Arc<SampleTrackShared>,
}

impl SampleTriggers {
    pub fn trigger(&self, index: usize, down: bool) {
        let Some(queue) = self.shared.queues.get(index) else {
            log::warn!("Sample {index} out of range, {} loaded", self.shared.queues.len());
            return;
        };
        trigger_shared(queue, down);
        if down {
            self.shared.last_sample.store(index, Ordering::Relaxed);
        }
    }

    pub fn len(&self) -> usize {
        self.shared.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.queues.is_empty()
    }

    /// Length of the most recently triggered sample, 0 if none yet.
    pub fn last_sample_frames(&self) -> usize {
        let last = self.shared.last_sample.load(Ordering::Relaxed);
        if last == NO_SAMPLE {
            return 0;
        }
        self.shared.frames.get(last).copied().unwrap_or(0)
    }
}

/// Priority track that plays triggered samples into its output and injects
/// them into its input before ordinary tracks see it.
pub struct SampleTrack {
    state: TrackState,
    players: Vec<SamplePlayer>,
    triggers: SampleTriggers,
}

impl SampleTrack {
    pub fn new(mut players: Vec<SamplePlayer>) -> Self {
        if players.len() > MAX_TRACK_SAMPLES {
            log::warn!("Sample track holds {MAX_TRACK_SAMPLES} samples, ignoring {} more", players.len() - MAX_TRACK_SAMPLES);
            players.truncate(MAX_TRACK_SAMPLES);
        }
        let shared = SampleTrackShared {
            queues: players.iter().map(SamplePlayer::sender).collect(),
            frames: players.iter().map(SamplePlayer::frames).collect(),
            last_sample: AtomicUsize::new(NO_SAMPLE),
        };
        Self {
            state: TrackState::default(),
            players,
            triggers: SampleTriggers {
                shared: Arc::new(shared),
            },
        }
    }

    pub fn trigger(&self, index: usize, down: bool) {
        self.triggers.trigger(index, down);
    }

    pub fn triggers(&self) -> SampleTriggers {
        self.triggers.clone()
    }

    pub fn last_sample_frames(&self) -> usize {
        self.triggers.last_sample_frames()
    }

    pub fn set_latencies(&mut self, input: usize, output: usize) {
        for player in self.players.iter_mut() {
            player.set_latencies(input, output);
        }
    }

    pub fn set_ports(&mut self, input_port: usize, output_port: usize) {
        self.state.input_port = input_port;
        self.state.output_port = output_port;
    }

    pub fn players(&self) -> &[SamplePlayer] {
        &self.players
    }
}

impl RecorderTrack for SampleTrack {
    fn state(&self) -> &TrackState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut TrackState {
        &mut self.state
    }

    fn is_priority(&self) -> bool {
        true
    }

    fn process_buffers(&mut self, block: &BlockInfo, mut input: Option<&mut [f32]>, mut output: Option<&mut [f32]>) {
        for player in self.players.iter_mut() {
            player.play(input.as_deref_mut(), output.as_deref_mut(), block.frames);
        }
        self.state.finished = self.players.iter().all(SamplePlayer::is_idle);
    }

    fn reset(&mut self) {
        for player in self.players.iter_mut() {
            player.reset();
        }
        self.state.finished = true;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::player::PlayerConfig;
    use crate::sample::Sample;

    fn track(lengths: &[usize]) -> SampleTrack {
        let players = lengths
            .iter()
            .enumerate()
            .map(|(i, &frames)| {
                let sample = Sample::new(format!("s{i}"), vec![0.25; frames * 2]);
                SamplePlayer::new(Arc::new(sample), PlayerConfig::default(), 4)
            })
            .collect();
        SampleTrack::new(players)
    }

    fn block(frames: usize) -> BlockInfo {
        BlockInfo {
            sample_rate: 48000,
            frames,
            frame: 0,
        }
    }

    #[test]
    fn out_of_range_trigger_is_ignored() {
        let mut track = track(&[10]);
        track.trigger(3, true);
        assert_eq!(track.last_sample_frames(), 0);
        track.process_buffers(&block(4), None, None);
        assert!(track.state().finished);
    }

    #[test]
    fn last_sample_follows_downs() {
        let track = track(&[10, 20]);
        let triggers = track.triggers();
        triggers.trigger(1, true);
        assert_eq!(track.last_sample_frames(), 20);
        triggers.trigger(0, true);
        triggers.trigger(1, false);
        assert_eq!(track.last_sample_frames(), 10);
    }

    #[test]
    fn players_sum_into_shared_buffers() {
        let mut track = track(&[10, 10]);
        track.trigger(0, true);
        track.trigger(1, true);
        let mut input = vec![0.0f32; 8];
        let mut output = vec![0.0f32; 8];
        track.process_buffers(&block(4), Some(&mut input), Some(&mut output));
        assert_eq!(output, vec![0.5; 8]);
        assert_eq!(input, vec![0.5; 8]);
        assert!(!track.state().finished);
        assert!(track.is_priority());
    }

    #[test]
    fn cloned_triggers_from_many_threads_stay_bounded() {
        let mut track = track(&[1000]);
        let producers: Vec<_> = (0..4)
            .map(|_| {
                let triggers = track.triggers();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        triggers.trigger(0, i % 2 == 0);
                    }
                })
            })
            .collect();

        while producers.iter().any(|p| !p.is_finished()) {
            track.process_buffers(&block(4), None, None);
        }
        for producer in producers {
            producer.join().unwrap();
        }
        track.process_buffers(&block(4), None, None);
        assert!(track.players()[0].active_cursors() <= crate::sample::player::MAX_CURSORS);
    }

    #[test]
    fn extra_players_are_dropped() {
        let track = track(&[1; 10]);
        assert_eq!(track.players().len(), MAX_TRACK_SAMPLES);
        assert_eq!(track.triggers().len(), MAX_TRACK_SAMPLES);
    }
}
