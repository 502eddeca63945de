// src/container.rs

//! What the engine needs from whatever hosts it for one block.

use std::time::Duration;

/// The two interleaved buffers of a port for the current block.
///
/// Both slices hold `frames * 2` samples and are only valid until the block
/// returns.
pub struct PortBuffers<'a> {
    pub input: &'a mut [f32],
    pub output: &'a mut [f32],
}

/// Per-block view of the host, handed to the block handler.
pub trait AudioContainer {
    fn sample_rate(&self) -> u32;

    /// Frames in the block currently being processed.
    fn interrupt_frames(&self) -> usize;

    /// Buffers for the given ports, or `None` if either port does not exist.
    /// Input and output may come from different ports.
    fn interrupt_buffers(&mut self, input_port: usize, output_port: usize) -> Option<PortBuffers<'_>>;

    fn millisecond_counter(&self) -> u64;
}

/// Blocking wait used by synchronous, non-real-time routines.
pub trait Sleeper {
    fn sleep(&mut self, millis: u64);
}

/// Sleeps the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSleeper;

impl Sleeper for SystemSleeper {
    fn sleep(&mut self, millis: u64) {
        std::thread::sleep(Duration::from_millis(millis));
    }
}
