// src/sample/trigger.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use ringbuf::{HeapConsumer, HeapProducer, HeapRb};

pub const TRIGGER_CAPACITY: usize = 8;

/// Builds the down/up event queue for one sample. The sender stays on the
/// control side, the receiver moves to the audio thread with the player.
pub fn trigger_queue(sustain: bool) -> (TriggerSender, TriggerReceiver) {
    let (producer, consumer) = HeapRb::<bool>::new(TRIGGER_CAPACITY).split();
    let held = Arc::new(AtomicBool::new(false));
    let sender = TriggerSender {
        producer,
        held: held.clone(),
        sustain,
    };
    (sender, TriggerReceiver { consumer, held })
}

/// Producer half. Not `Clone`; share it through [`SharedTriggerSender`].
pub struct TriggerSender {
    producer: HeapProducer<bool>,
    held: Arc<AtomicBool>,
    sustain: bool,
}

/// A sender several control threads can trigger through.
pub type SharedTriggerSender = Arc<Mutex<TriggerSender>>;

impl TriggerSender {
    /// Collapses autorepeat: a held sustain sample ignores repeated downs,
    /// and ups only matter for sustain samples. A full queue drops the
    /// newest event.
    pub fn trigger(&mut self, down: bool) {
        let was_down = self.held.load(Ordering::Relaxed);
        let enqueue = if down { !was_down || !self.sustain } else { self.sustain };
        if enqueue && self.producer.push(down).is_err() {
            log::trace!("Trigger queue full, dropping {}", if down { "down" } else { "up" });
        }
        self.held.store(down, Ordering::Release);
    }

    pub fn is_down(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }

    pub fn into_shared(self) -> SharedTriggerSender {
        Arc::new(Mutex::new(self))
    }
}

/// Locks a shared sender and triggers it. A poisoned lock still holds a
/// consistent producer, so it is used as is.
pub fn trigger_shared(sender: &Mutex<TriggerSender>, down: bool) {
    sender.lock().unwrap_or_else(PoisonError::into_inner).trigger(down);
}

/// Consumer half, owned by the audio thread.
pub struct TriggerReceiver {
    consumer: HeapConsumer<bool>,
    held: Arc<AtomicBool>,
}

impl TriggerReceiver {
    pub fn pop(&mut self) -> Option<bool> {
        self.consumer.pop()
    }

    /// True while the last event from the producer was a down.
    pub fn is_down(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    /// Discards pending events.
    pub fn clear(&mut self) {
        let pending = self.consumer.len();
        self.consumer.skip(pending);
    }
}
