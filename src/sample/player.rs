// src/sample/player.rs

use std::sync::Arc;

use super::cursor::SampleCursor;
use super::trigger::{trigger_queue, trigger_shared, SharedTriggerSender, TriggerReceiver};
use super::Sample;
use crate::settings::SampleSettings;

/// Cursors one player can have in flight at once.
pub const MAX_CURSORS: usize = 8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlayerConfig {
    /// Plays while held and stops on release.
    pub sustain: bool,
    pub looping: bool,
    /// New triggers overlap running playbacks instead of replacing them.
    pub concurrent: bool,
}

impl From<&SampleSettings> for PlayerConfig {
    fn from(settings: &SampleSettings) -> Self {
        Self {
            sustain: settings.sustain,
            looping: settings.looping,
            concurrent: settings.concurrent,
        }
    }
}

/// Triggerable playback of one sample over a fixed pool of cursors.
pub struct SamplePlayer {
    sample: Arc<Sample>,
    config: PlayerConfig,
    sender: SharedTriggerSender,
    triggers: TriggerReceiver,
    cursors: [SampleCursor; MAX_CURSORS],
    active: [usize; MAX_CURSORS],
    active_len: usize,
    free: [usize; MAX_CURSORS],
    free_len: usize,
    fade_frames: usize,
    input_latency: usize,
    output_latency: usize,
}

impl SamplePlayer {
    pub fn new(sample: Arc<Sample>, config: PlayerConfig, fade_frames: usize) -> Self {
        let (sender, triggers) = trigger_queue(config.sustain);
        Self {
            sample,
            config,
            sender: sender.into_shared(),
            triggers,
            cursors: [SampleCursor::new(); MAX_CURSORS],
            active: [0; MAX_CURSORS],
            active_len: 0,
            free: std::array::from_fn(|i| MAX_CURSORS - 1 - i),
            free_len: MAX_CURSORS,
            fade_frames,
            input_latency: 0,
            output_latency: 0,
        }
    }

    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    pub fn config(&self) -> PlayerConfig {
        self.config
    }

    pub fn frames(&self) -> usize {
        self.sample.frames()
    }

    /// Producer side of the trigger queue, for control threads.
    pub fn sender(&self) -> SharedTriggerSender {
        self.sender.clone()
    }

    /// Control side only; takes the sender lock.
    pub fn trigger(&self, down: bool) {
        trigger_shared(&self.sender, down);
    }

    /// Device latencies in frames. The record half of every new cursor
    /// trails the play half by their sum.
    pub fn set_latencies(&mut self, input: usize, output: usize) {
        self.input_latency = input;
        self.output_latency = output;
    }

    pub fn active_cursors(&self) -> usize {
        self.active_len
    }

    pub fn is_idle(&self) -> bool {
        self.active_len == 0
    }

    /// Cursors in play order, for inspection.
    pub fn cursors(&self) -> impl Iterator<Item = &SampleCursor> {
        self.active[..self.active_len].iter().map(|&slot| &self.cursors[slot])
    }

    /// Consumes pending triggers, then advances every active cursor by
    /// `frames`, retiring the ones that finished.
    pub fn play(&mut self, mut input: Option<&mut [f32]>, mut output: Option<&mut [f32]>, frames: usize) {
        while let Some(down) = self.triggers.pop() {
            if down {
                if !self.config.concurrent {
                    self.stop_all();
                }
                self.start_cursor();
            } else if self.config.concurrent {
                self.stop_one();
            } else {
                self.stop_all();
            }
        }

        let wrap = self.config.looping || (self.config.sustain && self.triggers.is_down());
        let samples = self.sample.samples();
        let mut kept = 0;
        for n in 0..self.active_len {
            let slot = self.active[n];
            let cursor = &mut self.cursors[slot];
            cursor.play(samples, input.as_deref_mut(), output.as_deref_mut(), frames, wrap);
            if cursor.is_stopped() {
                self.free[self.free_len] = slot;
                self.free_len += 1;
            } else {
                self.active[kept] = slot;
                kept += 1;
            }
        }
        self.active_len = kept;
    }

    /// Drops every cursor and pending trigger without fading.
    pub fn reset(&mut self) {
        self.triggers.clear();
        for n in 0..self.active_len {
            let slot = self.active[n];
            self.cursors[slot] = SampleCursor::new();
            self.free[self.free_len] = slot;
            self.free_len += 1;
        }
        self.active_len = 0;
    }

    fn start_cursor(&mut self) {
        if self.free_len == 0 {
            log::warn!("All {MAX_CURSORS} cursors of '{}' busy, trigger dropped", self.sample.name());
            return;
        }
        self.free_len -= 1;
        let slot = self.free[self.free_len];
        self.cursors[slot].start(self.input_latency + self.output_latency);
        self.active[self.active_len] = slot;
        self.active_len += 1;
    }

    fn stop_all(&mut self) {
        let len = self.sample.frames();
        for &slot in &self.active[..self.active_len] {
            self.cursors[slot].stop(len, self.fade_frames);
        }
    }

    fn stop_one(&mut self) {
        let len = self.sample.frames();
        let next = self.active[..self.active_len]
            .iter()
            .copied()
            .find(|&slot| !self.cursors[slot].is_stopping());
        if let Some(slot) = next {
            self.cursors[slot].stop(len, self.fade_frames);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(frames: usize, config: PlayerConfig, fade_frames: usize) -> SamplePlayer {
        SamplePlayer::new(Arc::new(Sample::new("test", vec![0.5; frames * 2])), config, fade_frames)
    }

    #[test]
    fn non_concurrent_retrigger_crossfades() {
        let mut player = player(1000, PlayerConfig::default(), 16);
        player.trigger(true);
        player.trigger(true);

        let mut out = vec![0.0f32; 16];
        player.play(None, Some(&mut out), 8);
        assert_eq!(player.active_cursors(), 2);
        let states: Vec<bool> = player.cursors().map(|c| c.is_stopping()).collect();
        assert_eq!(states, vec![true, false]);

        player.play(None, None, 8);
        player.play(None, None, 8);
        assert_eq!(player.active_cursors(), 1);
    }

    #[test]
    fn concurrent_down_overlaps_and_up_stops_one() {
        let config = PlayerConfig {
            sustain: true,
            concurrent: true,
            ..Default::default()
        };
        let mut player = player(1000, config, 100);
        player.trigger(true);
        player.play(None, None, 4);
        player.trigger(false);
        player.trigger(true);
        player.play(None, None, 4);
        assert_eq!(player.active_cursors(), 2);
        let stopping: Vec<bool> = player.cursors().map(|c| c.is_stopping()).collect();
        assert_eq!(stopping, vec![true, false]);

        player.trigger(false);
        player.play(None, None, 4);
        assert!(player.cursors().all(|c| c.is_stopping()));

        player.play(None, None, 200);
        assert!(player.is_idle());
    }

    #[test]
    fn sustain_release_fades_out() {
        let config = PlayerConfig {
            sustain: true,
            ..Default::default()
        };
        let mut player = player(10, config, 4);
        player.trigger(true);
        for _ in 0..5 {
            player.play(None, None, 4);
        }
        // Held past the end, so it wrapped.
        assert_eq!(player.active_cursors(), 1);

        player.trigger(false);
        player.play(None, None, 4);
        player.play(None, None, 4);
        assert!(player.is_idle());
    }

    #[test]
    fn pool_exhaustion_drops_trigger() {
        let config = PlayerConfig {
            concurrent: true,
            ..Default::default()
        };
        let mut player = player(1000, config, 4);
        for _ in 0..MAX_CURSORS {
            player.trigger(true);
        }
        player.play(None, None, 1);
        player.trigger(true);
        player.play(None, None, 1);
        assert_eq!(player.active_cursors(), MAX_CURSORS);
    }

    #[test]
    fn record_half_writes_input_after_latency() {
        let mut player = player(100, PlayerConfig::default(), 4);
        player.set_latencies(2, 1);
        player.trigger(true);
        let mut input = vec![0.0f32; 8];
        let mut output = vec![0.0f32; 8];
        player.play(Some(&mut input), Some(&mut output), 4);
        assert_eq!(output, vec![0.5; 8]);
        assert_eq!(&input[..6], &[0.0; 6]);
        assert_eq!(&input[6..], &[0.5; 2]);
    }

    #[test]
    fn reset_returns_cursors_to_pool() {
        let mut player = player(1000, PlayerConfig { concurrent: true, ..Default::default() }, 4);
        player.trigger(true);
        player.trigger(true);
        player.play(None, None, 4);
        player.reset();
        assert!(player.is_idle());
        for _ in 0..MAX_CURSORS {
            player.trigger(true);
        }
        player.play(None, None, 4);
        assert_eq!(player.active_cursors(), MAX_CURSORS);
    }
}
