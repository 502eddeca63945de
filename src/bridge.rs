// src/bridge.rs

//! Per-block adapter between a host callback and the engine.
//!
//! The bridge owns one interleaved [`PortBuffer`] per logical port. For every
//! host block it fills the port inputs, clears the port outputs, runs the
//! registered [`BlockHandler`] and writes the port outputs back to the host.

use std::time::Instant;

use crate::buffer::{MAX_FRAMES, MAX_PORTS};
use crate::container::{AudioContainer, PortBuffers};
use crate::port::{ChannelMap, DeviceInput, DeviceOutput, PortBuffer};

/// Receives each block once the port inputs are ready.
pub trait BlockHandler {
    fn process_block(&mut self, container: &mut dyn AudioContainer);
}

pub struct BlockBridge<H> {
    handler: Option<H>,
    ports: Vec<PortBuffer>,
    input_mask: u64,
    output_mask: u64,
    sample_rate: u32,
    last_interrupt_frames: usize,
    in_handler: bool,
    started: Instant,
}

impl<H: BlockHandler> BlockBridge<H> {
    pub fn new(port_count: usize, sample_rate: u32) -> Self {
        let port_count = port_count.clamp(1, MAX_PORTS);
        Self {
            handler: None,
            ports: (0..port_count).map(PortBuffer::new).collect(),
            input_mask: u64::MAX,
            output_mask: u64::MAX,
            sample_rate,
            last_interrupt_frames: 0,
            in_handler: false,
            started: Instant::now(),
        }
    }

    pub fn set_handler(&mut self, handler: H) {
        self.handler = Some(handler);
    }

    pub fn handler(&self) -> Option<&H> {
        self.handler.as_ref()
    }

    pub fn handler_mut(&mut self) -> Option<&mut H> {
        self.handler.as_mut()
    }

    /// Restricts which device channels feed and receive ports.
    pub fn set_active_channels(&mut self, input_mask: u64, output_mask: u64) {
        self.input_mask = input_mask;
        self.output_mask = output_mask;
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    pub fn last_interrupt_frames(&self) -> usize {
        self.last_interrupt_frames
    }

    /// Processes `num_samples` frames starting at `start_sample` of the host
    /// buffers. Blocks larger than [`MAX_FRAMES`] are cut into slices that
    /// each run the full cycle once.
    pub fn process_block<I, O>(&mut self, start_sample: usize, num_samples: usize, input: &I, output: &mut O)
    where
        I: DeviceInput,
        O: DeviceOutput,
    {
        let mut offset = 0;
        while offset < num_samples {
            let frames = (num_samples - offset).min(MAX_FRAMES);
            let start = start_sample + offset;
            self.run_slice(&Shifted::new(input, start), &mut ShiftedMut::new(output, start), frames);
            offset += frames;
        }
    }

    fn run_slice<I, O>(&mut self, input: &I, output: &mut O, frames: usize)
    where
        I: DeviceInput,
        O: DeviceOutput,
    {
        self.last_interrupt_frames = frames;

        let input_map = ChannelMap::from_mask(self.input_mask, input.channel_count());
        for port in self.ports.iter_mut() {
            port.reset();
            port.extract(input, &input_map, frames);
            port.clear_output(frames);
        }

        if self.in_handler {
            log::error!("Audio block delivered while the previous one is still being handled");
        } else {
            self.in_handler = true;
            match self.handler.as_mut() {
                Some(handler) => {
                    let mut context = BlockContext {
                        ports: &mut self.ports,
                        frames,
                        sample_rate: self.sample_rate,
                        started: self.started,
                    };
                    handler.process_block(&mut context);
                }
                None => self.loopback(frames),
            }
            self.in_handler = false;
        }

        output.silence(frames);
        let output_map = ChannelMap::from_mask(self.output_mask, output.channel_count());
        for port in self.ports.iter() {
            port.transfer(output, &output_map, frames);
        }
    }

    // Bring-up check with no handler registered: echo every port.
    fn loopback(&mut self, frames: usize) {
        for port in self.ports.iter_mut() {
            let (input, output) = port.buffers_mut(frames);
            output.copy_from_slice(input);
        }
    }
}

struct BlockContext<'a> {
    ports: &'a mut [PortBuffer],
    frames: usize,
    sample_rate: u32,
    started: Instant,
}

impl AudioContainer for BlockContext<'_> {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn interrupt_frames(&self) -> usize {
        self.frames
    }

    fn interrupt_buffers(&mut self, input_port: usize, output_port: usize) -> Option<PortBuffers<'_>> {
        let count = self.ports.len();
        if input_port >= count || output_port >= count {
            return None;
        }
        let frames = self.frames;
        if input_port == output_port {
            let (input, output) = self.ports[input_port].buffers_mut(frames);
            return Some(PortBuffers { input, output });
        }
        let (input, output) = if input_port < output_port {
            let (low, high) = self.ports.split_at_mut(output_port);
            (low[input_port].input_mut(frames), high[0].output_mut(frames))
        } else {
            let (low, high) = self.ports.split_at_mut(input_port);
            (high[0].input_mut(frames), low[output_port].output_mut(frames))
        };
        Some(PortBuffers { input, output })
    }

    fn millisecond_counter(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

struct Shifted<'a, D> {
    device: &'a D,
    start: usize,
}

impl<'a, D> Shifted<'a, D> {
    fn new(device: &'a D, start: usize) -> Self {
        Self { device, start }
    }
}

impl<D: DeviceInput> DeviceInput for Shifted<'_, D> {
    fn channel_count(&self) -> usize {
        self.device.channel_count()
    }

    fn sample(&self, channel: usize, frame: usize) -> f32 {
        self.device.sample(channel, self.start + frame)
    }
}

struct ShiftedMut<'a, D> {
    device: &'a mut D,
    start: usize,
}

impl<'a, D> ShiftedMut<'a, D> {
    fn new(device: &'a mut D, start: usize) -> Self {
        Self { device, start }
    }
}

impl<D: DeviceOutput> DeviceOutput for ShiftedMut<'_, D> {
    fn channel_count(&self) -> usize {
        self.device.channel_count()
    }

    fn set_sample(&mut self, channel: usize, frame: usize, value: f32) {
        self.device.set_sample(channel, self.start + frame, value);
    }

    fn silence(&mut self, frames: usize) {
        if self.start == 0 {
            self.device.silence(frames);
            return;
        }
        for channel in 0..self.device.channel_count() {
            for frame in 0..frames {
                self.device.set_sample(channel, self.start + frame, 0.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{NonInterleaved, NonInterleavedRef};

    struct Gain(f32);

    impl BlockHandler for Gain {
        fn process_block(&mut self, container: &mut dyn AudioContainer) {
            let buffers = container.interrupt_buffers(0, 0).unwrap();
            for (o, i) in buffers.output.iter_mut().zip(buffers.input.iter()) {
                *o = *i * self.0;
            }
        }
    }

    struct CrossPort;

    impl BlockHandler for CrossPort {
        fn process_block(&mut self, container: &mut dyn AudioContainer) {
            assert!(container.interrupt_buffers(0, 5).is_none());
            let buffers = container.interrupt_buffers(1, 0).unwrap();
            buffers.output.copy_from_slice(buffers.input);
        }
    }

    #[test]
    fn loopback_without_handler_preserves_selected_channels() {
        let mut bridge: BlockBridge<Gain> = BlockBridge::new(1, 44100);
        bridge.set_active_channels(0b0110, 0b0110);
        let inputs: Vec<Vec<f32>> = (0..4).map(|c| vec![c as f32 + 0.5; 16]).collect();
        let mut outputs = vec![vec![9.0f32; 16]; 4];

        bridge.process_block(0, 16, &NonInterleavedRef::new(&inputs), &mut NonInterleaved::new(&mut outputs));

        assert_eq!(outputs[1], inputs[1]);
        assert_eq!(outputs[2], inputs[2]);
        assert!(outputs[0].iter().all(|&s| s == 0.0));
        assert!(outputs[3].iter().all(|&s| s == 0.0));
        assert_eq!(bridge.last_interrupt_frames(), 16);
    }

    #[test]
    fn handler_sees_port_audio() {
        let mut bridge = BlockBridge::new(1, 48000);
        bridge.set_handler(Gain(0.5));
        let inputs = vec![vec![1.0f32; 8], vec![-1.0f32; 8]];
        let mut outputs = vec![vec![0.0f32; 8]; 2];

        bridge.process_block(0, 8, &NonInterleavedRef::new(&inputs), &mut NonInterleaved::new(&mut outputs));

        assert!(outputs[0].iter().all(|&s| s == 0.5));
        assert!(outputs[1].iter().all(|&s| s == -0.5));
    }

    #[test]
    fn input_and_output_can_use_different_ports() {
        let mut bridge = BlockBridge::new(2, 48000);
        bridge.set_handler(CrossPort);
        let inputs: Vec<Vec<f32>> = (0..4).map(|c| vec![c as f32; 4]).collect();
        let mut outputs = vec![vec![0.0f32; 4]; 4];

        bridge.process_block(0, 4, &NonInterleavedRef::new(&inputs), &mut NonInterleaved::new(&mut outputs));

        assert!(outputs[0].iter().all(|&s| s == 2.0));
        assert!(outputs[1].iter().all(|&s| s == 3.0));
        assert!(outputs[2].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn oversized_blocks_are_sliced() {
        let frames = MAX_FRAMES + 100;
        let mut bridge = BlockBridge::new(1, 48000);
        bridge.set_handler(Gain(2.0));
        let inputs = vec![vec![0.25f32; frames], vec![0.25f32; frames]];
        let mut outputs = vec![vec![0.0f32; frames]; 2];

        bridge.process_block(0, frames, &NonInterleavedRef::new(&inputs), &mut NonInterleaved::new(&mut outputs));

        assert!(outputs[0].iter().all(|&s| s == 0.5));
        assert_eq!(bridge.last_interrupt_frames(), 100);
    }

    #[test]
    fn start_sample_offsets_into_host_buffers() {
        let mut bridge = BlockBridge::new(1, 48000);
        bridge.set_handler(Gain(1.0));
        let inputs = vec![vec![1.0f32; 8], vec![1.0f32; 8]];
        let mut outputs = vec![vec![7.0f32; 8]; 2];

        bridge.process_block(4, 4, &NonInterleavedRef::new(&inputs), &mut NonInterleaved::new(&mut outputs));

        assert_eq!(&outputs[0][..4], &[7.0; 4]);
        assert_eq!(&outputs[0][4..], &[1.0; 4]);
    }
}
