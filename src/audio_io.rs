// src/audio_io.rs

use crate::audio_device;
use crate::audio_engine::AudioEngine;
use crate::buffer::MAX_FRAMES;
use crate::settings::AppSettings;
use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, Device, FromSample, Sample, SampleFormat, Stream, StreamConfig};
use ringbuf::{HeapProducer, HeapRb};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Devices and configs chosen from the settings, before any stream exists.
pub struct StreamSetup {
    pub input_device: Device,
    pub output_device: Device,
    pub input_config: StreamConfig,
    pub output_config: StreamConfig,
    pub sample_format: SampleFormat,
}

impl StreamSetup {
    pub fn sample_rate(&self) -> u32 {
        self.output_config.sample_rate.0
    }

    pub fn input_channels(&self) -> usize {
        self.input_config.channels as usize
    }

    pub fn output_channels(&self) -> usize {
        self.output_config.channels as usize
    }
}

pub fn negotiate(settings: &AppSettings) -> Result<StreamSetup> {
    let host_id = audio_device::select_host(settings.host_name.as_deref());
    let input_device = audio_device::find_input_device(host_id, settings.input_device.as_deref())?;
    let output_device = audio_device::find_output_device(host_id, settings.output_device.as_deref())?;
    log::info!("Using input device: {}", input_device.name()?);
    log::info!("Using output device: {}", output_device.name()?);

    let default_input_config = input_device
        .default_input_config()
        .context("Input device has no default config")?;
    let default_output_config = output_device
        .default_output_config()
        .context("Output device has no default config")?;
    let sample_format = default_output_config.sample_format();

    let mut input_config: StreamConfig = default_input_config.into();
    let mut output_config: StreamConfig = default_output_config.into();
    for config in [&mut input_config, &mut output_config] {
        if let Some(sr) = settings.sample_rate {
            config.sample_rate = cpal::SampleRate(sr);
        }
        if let Some(bs) = settings.buffer_size {
            config.buffer_size = BufferSize::Fixed(bs);
        }
    }
    // Both streams must tick at the same rate for the ring in between.
    input_config.sample_rate = output_config.sample_rate;

    Ok(StreamSetup {
        input_device,
        output_device,
        input_config,
        output_config,
        sample_format,
    })
}

/// Opens and starts both streams. The output callback drives the engine.
pub fn run_streams(setup: &StreamSetup, mut engine: AudioEngine, xrun_count: Arc<AtomicUsize>) -> Result<(Stream, Stream)> {
    let input_channels = setup.input_channels();
    let ring_len = setup.sample_rate() as usize * input_channels;
    let (producer, consumer) = HeapRb::<f32>::new(ring_len.max(MAX_FRAMES * input_channels)).split();
    engine.attach_input(consumer, input_channels);

    fn run<T>(setup: &StreamSetup, producer: HeapProducer<f32>, engine: AudioEngine, xrun_count: Arc<AtomicUsize>) -> Result<(Stream, Stream)>
    where
        T: Sample + cpal::SizedSample + FromSample<f32>,
        f32: FromSample<T>,
    {
        let input_stream = build_input_stream::<T>(&setup.input_device, &setup.input_config, producer, xrun_count.clone())?;
        let output_stream = build_output_stream::<T>(&setup.output_device, &setup.output_config, engine, xrun_count)?;
        input_stream.play()?;
        output_stream.play()?;
        Ok((input_stream, output_stream))
    }

    let streams = match setup.sample_format {
        SampleFormat::F32 => run::<f32>(setup, producer, engine, xrun_count)?,
        SampleFormat::I16 => run::<i16>(setup, producer, engine, xrun_count)?,
        SampleFormat::U16 => run::<u16>(setup, producer, engine, xrun_count)?,
        format => return Err(anyhow::anyhow!("Unsupported sample format {}", format)),
    };

    let buffer_size = match setup.output_config.buffer_size {
        BufferSize::Fixed(size) => size.to_string(),
        BufferSize::Default => "default".to_string(),
    };
    log::info!(
        "Streams started: {} Hz, buffer {}, {} in / {} out channels",
        setup.sample_rate(),
        buffer_size,
        input_channels,
        setup.output_channels()
    );
    Ok(streams)
}

fn build_input_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut producer: HeapProducer<f32>,
    xrun_count: Arc<AtomicUsize>,
) -> Result<Stream>
where
    T: Sample + cpal::SizedSample,
    f32: FromSample<T>,
{
    let err_fn = move |err| {
        log::error!("Input stream error: {}", err);
        xrun_count.fetch_add(1, Ordering::Relaxed);
    };
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            for &sample in data {
                // Ring full means the output side stalled; newest input is lost.
                if producer.push(f32::from_sample(sample)).is_err() {
                    break;
                }
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

fn build_output_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut engine: AudioEngine,
    xrun_count: Arc<AtomicUsize>,
) -> Result<Stream>
where
    T: Sample + cpal::SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let err_fn = move |err| {
        log::error!("Output stream error: {}", err);
        xrun_count.fetch_add(1, Ordering::Relaxed);
    };
    let mut output_buffer = vec![0.0f32; MAX_FRAMES * channels];

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            for chunk in data.chunks_mut(MAX_FRAMES * channels) {
                let block = &mut output_buffer[..chunk.len()];
                engine.process_interleaved(block, channels);
                for (out, &sample) in chunk.iter_mut().zip(block.iter()) {
                    *out = T::from_sample(sample);
                }
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}
