mod common;

use std::sync::Arc;

use common::Loopback;
use looprack::recorder::audio_store::VecAudio;
use looprack::recorder::track::{AudioTrack, RecorderTrack};
use looprack::recorder::Recorder;
use looprack::sample::player::{PlayerConfig, SamplePlayer};
use looprack::sample::track::SampleTrack;
use looprack::sample::Sample;

const RATE: u32 = 48000;

fn recording_track(capacity: usize) -> AudioTrack {
    let mut track = AudioTrack::new(capacity);
    track.set_recording(true);
    track
}

fn recorded(device: &Loopback, id: looprack::recorder::TrackId) -> Vec<f32> {
    let track = device.recorder().downcast::<AudioTrack>(id).unwrap();
    let audio = track.audio().unwrap();
    let mut content = vec![0.0f32; audio.frames() * 2];
    audio.mix(0, &mut content);
    content
}

#[test]
fn sample_injection_is_recorded_in_the_same_block() {
    let (mut recorder, _handle) = Recorder::new();
    // Registered first, so only priority ordering can put the sample ahead of it.
    let audio_id = recorder.add(Box::new(recording_track(RATE as usize))).unwrap();

    let sample = Arc::new(Sample::new("hit", vec![0.5; 64 * 2]));
    let sample_track = SampleTrack::new(vec![SamplePlayer::new(sample, PlayerConfig::default(), 16)]);
    let triggers = sample_track.triggers();
    recorder.add(Box::new(sample_track)).unwrap();
    recorder.start();

    let mut device = Loopback::new(recorder, 10_000, 128, RATE);
    triggers.trigger(0, true);
    device.run_block();

    let content = recorded(&device, audio_id);
    assert_eq!(content.len(), 128 * 2);
    assert!(content[..64 * 2].iter().all(|&s| s == 0.5));
    assert!(content[64 * 2..].iter().all(|&s| s == 0.0));
    assert!(device.last_output[..64 * 2].iter().all(|&s| s == 0.5));
    assert_eq!(triggers.last_sample_frames(), 64);
}

#[test]
fn auto_stop_halts_processing_until_restart() {
    let (mut recorder, _handle) = Recorder::new();
    let content = vec![0.25f32; 300 * 2];
    let id = recorder
        .add(Box::new(AudioTrack::with_audio(Box::new(VecAudio::from_samples(content)))))
        .unwrap();
    recorder.set_auto_stop(true);
    recorder.start();

    let mut device = Loopback::new(recorder, 10_000, 256, RATE);
    device.run_block();
    assert!(device.recorder().is_running());
    device.run_block();
    assert!(!device.recorder().is_running());

    let position = |device: &Loopback| device.recorder().downcast::<AudioTrack>(id).unwrap().play_frame();
    assert_eq!(position(&device), 512);
    device.run_block();
    assert_eq!(position(&device), 512);
    assert!(device.last_output.iter().all(|&s| s == 0.0));
    assert_eq!(device.recorder().frame(), 768);

    device.recorder_mut().start();
    device.run_block();
    assert_eq!(position(&device), 768);
    assert!(!device.recorder().is_running());
}

#[test]
fn threshold_drops_quiet_lead_in() {
    let (mut recorder, _handle) = Recorder::new();
    let mut track = recording_track(RATE as usize);
    track.set_threshold(0.1);
    let id = recorder.add(Box::new(track)).unwrap();
    recorder.start();

    let mut device = Loopback::new(recorder, 10_000, 256, RATE);
    let k = 100;
    device.external.extend(std::iter::repeat(0.01).take(k * 2));
    device.external.extend(std::iter::repeat(0.5).take((256 - k) * 2));
    device.run_block();

    let content = recorded(&device, id);
    assert_eq!(content.len(), (256 - k) * 2);
    assert!(content.iter().all(|&s| s == 0.5));
    let frames = device
        .recorder()
        .downcast::<AudioTrack>(id)
        .unwrap()
        .audio()
        .map(|a| a.frames());
    assert_eq!(frames, Some(256 - k));
}

#[test]
fn handle_starts_and_resets_tracks() {
    let (mut recorder, mut handle) = Recorder::new();
    let id = recorder.add(Box::new(recording_track(RATE as usize))).unwrap();
    let mut device = Loopback::new(recorder, 10_000, 64, RATE);
    device.external.extend(std::iter::repeat(0.2).take(64 * 2 * 4));

    device.run_block();
    assert!(!handle.is_running());
    assert_eq!(device.recorder().downcast::<AudioTrack>(id).unwrap().audio().unwrap().frames(), 0);

    handle.start();
    device.run_block();
    device.run_block();
    assert!(handle.is_running());
    assert_eq!(recorded(&device, id).len(), 128 * 2);

    handle.reset_tracks();
    device.run_block();
    assert_eq!(recorded(&device, id).len(), 64 * 2);
    assert_eq!(handle.shared().frame(), 256);
}

#[test]
fn sample_with_latency_reaches_input_later() {
    let (mut recorder, _handle) = Recorder::new();
    let audio_id = recorder.add(Box::new(recording_track(RATE as usize))).unwrap();
    let sample = Arc::new(Sample::new("late", vec![0.5; 32 * 2]));
    let mut sample_track = SampleTrack::new(vec![SamplePlayer::new(sample, PlayerConfig::default(), 16)]);
    sample_track.set_latencies(40, 24);
    sample_track.trigger(0, true);
    recorder.add(Box::new(sample_track)).unwrap();
    recorder.start();

    let mut device = Loopback::new(recorder, 10_000, 128, RATE);
    device.run_block();

    let content = recorded(&device, audio_id);
    let left: Vec<f32> = content.iter().step_by(2).copied().collect();
    assert!(left[..64].iter().all(|&s| s == 0.0));
    assert!(left[64..96].iter().all(|&s| s == 0.5));
    assert!(left[96..].iter().all(|&s| s == 0.0));
    // The output side plays immediately.
    assert!(device.last_output[..64].iter().all(|&s| s == 0.5));
}

#[test]
fn handle_arms_disarms_and_mutes_tracks() {
    let (mut recorder, mut handle) = Recorder::new();
    let id = recorder.add(Box::new(AudioTrack::new(RATE as usize))).unwrap();
    recorder.select(id);
    recorder.start();
    let mut device = Loopback::new(recorder, 10_000, 64, RATE);

    device.external.extend(std::iter::repeat(0.3).take(64 * 2));
    device.run_block();
    assert_eq!(recorded(&device, id).len(), 0);

    handle.set_recording(id, true);
    device.external.extend(std::iter::repeat(0.3).take(64 * 2));
    device.run_block();
    assert_eq!(recorded(&device, id), vec![0.3; 64 * 2]);

    // Disarming the selected track plays the take back from its start.
    handle.toggle_recording();
    device.run_block();
    assert!(device.last_output.iter().all(|&s| s == 0.3));
    assert!(!device.recorder().track(id).unwrap().state().recording);

    handle.set_recording(id, true);
    device.external.extend(std::iter::repeat(0.3).take(64 * 2));
    device.run_block();
    handle.toggle_recording();
    handle.toggle_mute();
    device.run_block();
    assert!(device.last_output.iter().all(|&s| s == 0.0));
    assert!(device.recorder().track(id).unwrap().state().mute);

    handle.set_mute(id, false);
    device.run_block();
    assert!(!device.recorder().track(id).unwrap().state().mute);
}
