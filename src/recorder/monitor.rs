// src/recorder/monitor.rs

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Hook notified around every block the recorder handles.
pub trait RecorderMonitor: Send {
    fn recorder_enter(&mut self, frames: usize, sample_rate: u32);
    fn recorder_exit(&mut self, frames: usize, sample_rate: u32);
}

/// Publishes the share of the block period spent inside the recorder,
/// scaled by 1000 (1000 = the whole period).
pub struct CpuLoadMonitor {
    entered: Option<Instant>,
    load: Arc<AtomicU32>,
}

impl CpuLoadMonitor {
    pub fn new() -> Self {
        Self {
            entered: None,
            load: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Shared cell the UI side reads.
    pub fn load_handle(&self) -> Arc<AtomicU32> {
        self.load.clone()
    }
}

impl Default for CpuLoadMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl RecorderMonitor for CpuLoadMonitor {
    fn recorder_enter(&mut self, _frames: usize, _sample_rate: u32) {
        self.entered = Some(Instant::now());
    }

    fn recorder_exit(&mut self, frames: usize, sample_rate: u32) {
        let Some(entered) = self.entered.take() else {
            return;
        };
        if frames == 0 || sample_rate == 0 {
            return;
        }
        let buffer_duration_seconds = frames as f32 / sample_rate as f32;
        let load_ratio = entered.elapsed().as_secs_f32() / buffer_duration_seconds;
        self.load.store((load_ratio * 1000.0) as u32, Ordering::Relaxed);
    }
}

/// Reads a load value published by [`CpuLoadMonitor`] as a ratio.
pub fn load_ratio(load: &AtomicU32) -> f32 {
    load.load(Ordering::Relaxed) as f32 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_without_enter_publishes_nothing() {
        let mut monitor = CpuLoadMonitor::new();
        monitor.recorder_exit(256, 48000);
        assert_eq!(monitor.load_handle().load(Ordering::Relaxed), 0);
    }

    #[test]
    fn slow_block_reports_overload() {
        let mut monitor = CpuLoadMonitor::new();
        let load = monitor.load_handle();
        monitor.recorder_enter(1, 48000);
        std::thread::sleep(std::time::Duration::from_millis(2));
        monitor.recorder_exit(1, 48000);
        assert!(load_ratio(&load) > 1.0);
    }
}
