// src/sample/loader.rs

use std::path::Path;

use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

use super::Sample;
use crate::error::{Error, Result};

/// Reads a WAV file into an interleaved stereo [`Sample`] at `target_rate`.
///
/// Mono files are duplicated into both channels, files with more than two
/// channels keep the first two.
pub fn load_sample(path: &Path, target_rate: u32) -> Result<Sample> {
    if !path.exists() {
        return Err(Error::SampleNotFound(path.to_path_buf()));
    }
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f32 * scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let frames = samples.len() / channels;
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for frame in samples.chunks_exact(channels) {
        left.push(frame[0]);
        right.push(if channels > 1 { frame[1] } else { frame[0] });
    }

    let (left, right) = if spec.sample_rate != target_rate && frames > 0 {
        log::info!(
            "Resampling '{}' from {} Hz to {} Hz",
            path.display(),
            spec.sample_rate,
            target_rate
        );
        resample(left, right, spec.sample_rate, target_rate)?
    } else {
        (left, right)
    };

    let interleaved = left.iter().zip(right.iter()).flat_map(|(&l, &r)| [l, r]).collect();
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    log::debug!("Loaded sample '{}' ({} frames)", name, left.len());
    Ok(Sample::new(name, interleaved))
}

fn resample(left: Vec<f32>, right: Vec<f32>, source_rate: u32, target_rate: u32) -> Result<(Vec<f32>, Vec<f32>)> {
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = target_rate as f64 / source_rate as f64;
    let expected = (left.len() as f64 * ratio).ceil() as usize;
    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 2.0, params, left.len(), 2).map_err(|e| Error::Resample(e.to_string()))?;
    let delay = resampler.output_delay();

    let waves_in = vec![left, right];
    let mut waves_out = resampler
        .process(&waves_in, None)
        .map_err(|e| Error::Resample(e.to_string()))?;
    // Flush the filter so the tail of the sample comes out too.
    while waves_out[0].len() < expected + delay {
        let tail = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| Error::Resample(e.to_string()))?;
        if tail[0].is_empty() {
            break;
        }
        for (wave, tail) in waves_out.iter_mut().zip(tail) {
            wave.extend_from_slice(&tail);
        }
    }

    for wave in waves_out.iter_mut() {
        wave.drain(..delay.min(wave.len()));
        wave.truncate(expected);
    }
    let mut waves_out = waves_out.into_iter();
    let left = waves_out.next().unwrap_or_default();
    let right = waves_out.next().unwrap_or_default();
    Ok((left, right))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, channels: u16, rate: u32, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn mono_is_duplicated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kick.wav");
        write_wav(&path, 1, 48000, &[16384, -16384, 0]);

        let sample = load_sample(&path, 48000).unwrap();
        assert_eq!(sample.name(), "kick");
        assert_eq!(sample.frames(), 3);
        assert_eq!(sample.samples(), &[0.5, 0.5, -0.5, -0.5, 0.0, 0.0]);
    }

    #[test]
    fn extra_channels_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multi.wav");
        write_wav(&path, 3, 48000, &[8192, 16384, 32767, 0, -8192, 32767]);

        let sample = load_sample(&path, 48000).unwrap();
        assert_eq!(sample.samples(), &[0.25, 0.5, 0.0, -0.25]);
    }

    #[test]
    fn rate_mismatch_is_resampled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 1, 24000, &vec![1000i16; 2400]);

        let sample = load_sample(&path, 48000).unwrap();
        assert_eq!(sample.frames(), 4800);
        let level = 1000.0 / 32768.0;
        let left: Vec<f32> = sample.samples().iter().step_by(2).copied().collect();
        assert!((left[2400] - level).abs() < level * 0.01, "middle {}", left[2400]);
        assert!(left[4600..4700].iter().all(|&s| s > level * 0.5), "tail was cut");
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_sample(Path::new("/nonexistent/looprack.wav"), 48000).unwrap_err();
        assert!(matches!(err, Error::SampleNotFound(_)));
    }
}
