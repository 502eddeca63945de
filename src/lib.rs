// src/lib.rs

//! Live-looping engine: a block-driven recorder with priority sample
//! injection, plus the cpal/midir glue that runs it on real devices.

pub mod action;
pub mod audio_device;
pub mod audio_engine;
pub mod audio_io;
pub mod bridge;
pub mod buffer;
pub mod container;
pub mod error;
pub mod midi;
pub mod port;
pub mod recorder;
pub mod sample;
pub mod settings;

pub use error::{Error, Result};
