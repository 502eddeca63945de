use std::collections::VecDeque;

use looprack::bridge::BlockBridge;
use looprack::container::Sleeper;
use looprack::port::Interleaved;
use looprack::recorder::Recorder;

/// A stereo device whose output comes back on its input `latency` frames
/// later, optionally with a constant offset on the left input channel and
/// extra audio mixed into the input.
pub struct Loopback {
    pub bridge: BlockBridge<Recorder>,
    pub block_frames: usize,
    pub sample_rate: u32,
    pub noise: f32,
    pub feedback: bool,
    pub external: VecDeque<f32>,
    pub last_output: Vec<f32>,
    delay: VecDeque<f32>,
}

impl Loopback {
    pub fn new(recorder: Recorder, latency: usize, block_frames: usize, sample_rate: u32) -> Self {
        let mut bridge = BlockBridge::new(1, sample_rate);
        bridge.set_handler(recorder);
        Self {
            bridge,
            block_frames,
            sample_rate,
            noise: 0.0,
            feedback: true,
            external: VecDeque::new(),
            last_output: Vec::new(),
            delay: std::iter::repeat(0.0).take(latency * 2).collect(),
        }
    }

    pub fn recorder(&self) -> &Recorder {
        self.bridge.handler().unwrap()
    }

    pub fn recorder_mut(&mut self) -> &mut Recorder {
        self.bridge.handler_mut().unwrap()
    }

    pub fn run_block(&mut self) {
        let samples = self.block_frames * 2;
        let input: Vec<f32> = (0..samples)
            .map(|i| {
                let returned = self.delay.pop_front().unwrap_or(0.0);
                let external = self.external.pop_front().unwrap_or(0.0);
                let noise = if i % 2 == 0 { self.noise } else { 0.0 };
                returned + external + noise
            })
            .collect();
        let mut output = vec![0.0f32; samples];

        self.bridge.process_block(
            0,
            self.block_frames,
            &Interleaved::new(&input[..], 2),
            &mut Interleaved::new(&mut output[..], 2),
        );

        if self.feedback {
            self.delay.extend(output.iter().copied());
        }
        self.last_output = output;
    }

    pub fn run_frames(&mut self, frames: usize) {
        for _ in 0..frames.div_ceil(self.block_frames) {
            self.run_block();
        }
    }
}

impl Sleeper for Loopback {
    fn sleep(&mut self, millis: u64) {
        let frames = self.sample_rate as u64 * millis / 1000;
        self.run_frames(frames as usize);
    }
}
