//! Integration tests for the equalizer
//!
//! These tests drive the complete pipeline from parameter edits to processed
//! audio: store, update orchestration, stereo processing, presets and
//! response analysis.

use proptest::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;
use triband_core::domain::config::{
    Command, CommandExecutor, ParameterCommandExecutor, Preset, PresetManager,
};
use triband_core::domain::dsp::{make_low_cut_bank, make_peak};
use triband_core::domain::params::{
    FilterKind, ParamId, ParameterSnapshot, ParameterSource, ParameterStore, Slope,
};
use triband_core::domain::processor::Equalizer;
use triband_infra::analysis::measure_impulse_response;
use triband_infra::audio::BlockAdapter;
use triband_tests::{
    generate_silence, generate_sine_wave, measure_tone_gain, process_in_blocks, SAMPLE_RATE,
};

fn shared_eq() -> (Arc<ParameterStore>, Equalizer<Arc<ParameterStore>>) {
    let store = Arc::new(ParameterStore::new());
    let mut eq = Equalizer::new(Arc::clone(&store));
    eq.prepare(SAMPLE_RATE, 512);
    (store, eq)
}

// ============================================================================
// DEFAULT BEHAVIOUR
// ============================================================================

#[test]
fn test_default_parameters_are_nearly_transparent() {
    let (_store, mut eq) = shared_eq();
    for freq in [100.0, 750.0, 5000.0] {
        let gain = measure_tone_gain(&mut eq, freq);
        assert!(gain.abs() < 0.1, "{freq} Hz gain {gain:.3} dB");
    }
}

#[test]
fn test_silence_in_silence_out() {
    let (store, mut eq) = shared_eq();
    store.set(ParamId::PeakGain, 24.0);
    store.set_low_cut_slope(Slope::Db48);

    let mut left = generate_silence(512);
    let mut right = generate_silence(512);
    eq.process(&mut left, &mut right);

    assert!(left.iter().chain(&right).all(|&s| s == 0.0));
}

#[test]
fn test_nan_writes_leave_signal_audible() {
    let (store, mut eq) = shared_eq();
    store.set(ParamId::PeakFreq, f32::NAN);
    store.set_normalized(ParamId::LowCutFreq, f32::NAN);

    let snapshot = store.snapshot();
    assert_eq!(snapshot.peak_freq, 20.0);
    assert_eq!(snapshot.low_cut_freq, 20.0);

    let gain = measure_tone_gain(&mut eq, 1000.0);
    assert!(gain.abs() < 0.1, "gain {gain:.3} dB");
}

// ============================================================================
// BAND BEHAVIOUR
// ============================================================================

#[test]
fn test_peak_boost_and_cut() {
    let (store, mut eq) = shared_eq();
    store.set(ParamId::PeakFreq, 1000.0);
    store.set(ParamId::PeakGain, 12.0);
    store.set(ParamId::PeakQuality, 2.0);

    let boost = measure_tone_gain(&mut eq, 1000.0);
    assert!((boost - 12.0).abs() < 0.2, "boost {boost:.3} dB");

    store.set(ParamId::PeakGain, -12.0);
    let cut = measure_tone_gain(&mut eq, 1000.0);
    assert!((cut + 12.0).abs() < 0.2, "cut {cut:.3} dB");

    // Far from the centre the band is inactive
    let far = measure_tone_gain(&mut eq, 100.0);
    assert!(far.abs() < 0.5, "far {far:.3} dB");
}

#[test]
fn test_notch_removes_hum() {
    let (store, mut eq) = shared_eq();
    store.set_filter_kind(FilterKind::Notch);
    store.set(ParamId::PeakFreq, 60.0);
    store.set(ParamId::PeakQuality, 5.0);

    assert!(measure_tone_gain(&mut eq, 60.0) < -30.0);
    assert!(measure_tone_gain(&mut eq, 1000.0).abs() < 0.1);
}

#[test]
fn test_band_pass_isolates_centre() {
    let (store, mut eq) = shared_eq();
    store.set_filter_kind(FilterKind::BandPass);
    store.set(ParamId::PeakFreq, 2000.0);
    store.set(ParamId::PeakQuality, 4.0);

    let centre = measure_tone_gain(&mut eq, 2000.0);
    assert!(centre.abs() < 0.2, "centre {centre:.3} dB");
    assert!(measure_tone_gain(&mut eq, 200.0) < -20.0);
    assert!(measure_tone_gain(&mut eq, 15000.0) < -15.0);
}

#[test]
fn test_slopes_get_steeper() {
    let (store, mut eq) = shared_eq();
    store.set(ParamId::LowCutFreq, 1000.0);

    let mut previous = 0.0;
    for slope in Slope::ALL {
        store.set_low_cut_slope(slope);
        let gain = measure_tone_gain(&mut eq, 250.0);
        // Two octaves below cutoff: about 12 dB/oct per section
        let expected = -24.0 * slope.sections() as f64;
        assert!((gain - expected).abs() < 2.0, "{slope}: {gain:.2} dB, expected {expected}");
        assert!(gain < previous);
        previous = gain;
    }
}

#[test]
fn test_high_cut_attenuates_top_end() {
    let (store, mut eq) = shared_eq();
    store.set(ParamId::HighCutFreq, 2000.0);
    store.set_high_cut_slope(Slope::Db36);

    assert!(measure_tone_gain(&mut eq, 200.0).abs() < 0.1);
    let at_cutoff = measure_tone_gain(&mut eq, 2000.0);
    assert!((at_cutoff + 3.01).abs() < 0.2, "cutoff {at_cutoff:.3} dB");
    assert!(measure_tone_gain(&mut eq, 8000.0) < -60.0);
}

// ============================================================================
// STEREO AND BLOCK CONSISTENCY
// ============================================================================

#[test]
fn test_left_and_right_match_for_equal_input() {
    let (store, mut eq) = shared_eq();
    store.replace(&ParameterSnapshot {
        low_cut_freq: 80.0,
        high_cut_freq: 12000.0,
        peak_freq: 3000.0,
        peak_gain_db: 5.0,
        low_cut_slope: Slope::Db36,
        ..ParameterSnapshot::default()
    });

    let input = generate_sine_wave(440.0, SAMPLE_RATE, 4096);
    let mut left = input.clone();
    let mut right = input;
    process_in_blocks(&mut eq, &mut left, &mut right, 256);

    assert_eq!(left, right);
}

#[test]
fn test_same_input_same_output() {
    let snapshot = ParameterSnapshot {
        filter_kind: FilterKind::Peak,
        peak_gain_db: -7.5,
        peak_quality: 0.6,
        high_cut_slope: Slope::Db48,
        high_cut_freq: 6000.0,
        ..ParameterSnapshot::default()
    };
    let input = generate_sine_wave(1234.0, SAMPLE_RATE, 2048);

    let run = || {
        let mut eq = Equalizer::new(snapshot);
        eq.prepare(SAMPLE_RATE, 512);
        let mut left = input.clone();
        let mut right = input.clone();
        process_in_blocks(&mut eq, &mut left, &mut right, 512);
        left
    };

    assert_eq!(run(), run());
}

#[test]
fn test_parameter_edit_mid_stream_takes_effect_next_block() {
    let (store, mut eq) = shared_eq();
    let input = generate_sine_wave(1000.0, SAMPLE_RATE, 512);

    let (mut l, mut r) = (input.clone(), input.clone());
    eq.process(&mut l, &mut r);
    let before = *eq.processor().left().mid_band().coeffs();

    store.set(ParamId::PeakGain, 6.0);
    assert_eq!(*eq.processor().left().mid_band().coeffs(), before);

    let (mut l, mut r) = (input.clone(), input);
    eq.process(&mut l, &mut r);
    let expected = make_peak(&store.snapshot(), SAMPLE_RATE);
    assert_eq!(*eq.processor().left().mid_band().coeffs(), expected[0]);
    assert_eq!(*eq.processor().right().mid_band().coeffs(), expected[0]);
}

#[test]
fn test_concurrent_edits_never_produce_invalid_state() {
    let (store, mut eq) = shared_eq();
    let writer_store = Arc::clone(&store);

    let writer = std::thread::spawn(move || {
        for i in 0..2000 {
            let n = (i % 100) as f32 / 100.0;
            writer_store.set_normalized(ParamId::LowCutFreq, n);
            writer_store.set_normalized(ParamId::PeakGain, 1.0 - n);
            writer_store.set(ParamId::LowCutSlope, (i % 4) as f32);
            writer_store.set(ParamId::ChooseFilter, (i % 3) as f32);
        }
    });

    let input = generate_sine_wave(300.0, SAMPLE_RATE, 256);
    for _ in 0..400 {
        let (mut l, mut r) = (input.clone(), input.clone());
        eq.process(&mut l, &mut r);
        assert!(l.iter().chain(&r).all(|s| s.is_finite()));
        let snapshot = store.snapshot();
        assert!(snapshot.low_cut_freq >= 20.0 && snapshot.low_cut_freq <= 20000.0);
    }
    writer.join().unwrap();

    // Once edits stop, the chain settles on the final values
    let (mut l, mut r) = (input.clone(), input);
    eq.process(&mut l, &mut r);
    let active = eq.processor().left().low_cut().active_coefficients();
    assert_eq!(active, make_low_cut_bank(&store.snapshot(), SAMPLE_RATE));
}

#[test]
fn test_interleaved_adapter_matches_planar_blocks() {
    let snapshot = ParameterSnapshot {
        low_cut_freq: 150.0,
        low_cut_slope: Slope::Db24,
        ..ParameterSnapshot::default()
    };
    let left = generate_sine_wave(100.0, SAMPLE_RATE, 3000);
    let right = generate_sine_wave(7000.0, SAMPLE_RATE, 3000);

    let mut eq = Equalizer::new(snapshot);
    eq.prepare(SAMPLE_RATE, 3000);
    let (mut l, mut r) = (left.clone(), right.clone());
    eq.process(&mut l, &mut r);

    let mut adapter = BlockAdapter::new(Equalizer::new(snapshot), SAMPLE_RATE, 480);
    let mut interleaved: Vec<f32> = left.iter().zip(&right).flat_map(|(&a, &b)| [a, b]).collect();
    adapter.process_interleaved(&mut interleaved, 2);

    let expected: Vec<f32> = l.iter().zip(&r).flat_map(|(&a, &b)| [a, b]).collect();
    assert_eq!(interleaved, expected);
}

// ============================================================================
// PRESETS AND ANALYSIS
// ============================================================================

#[tokio::test]
async fn test_preset_round_trip_drives_processing() {
    let temp_dir = TempDir::new().unwrap();
    let presets = PresetManager::new(temp_dir.path().to_path_buf());
    let (store, mut eq) = shared_eq();
    let executor = ParameterCommandExecutor::new(Arc::clone(&store), presets.clone());

    executor
        .execute(Command::SetParameter {
            id: ParamId::PeakGain,
            value: 9.0,
        })
        .await;
    executor
        .execute(Command::SavePreset {
            name: "boost".to_string(),
        })
        .await;
    executor.execute(Command::ResetToDefaults).await;

    assert!(measure_tone_gain(&mut eq, 750.0).abs() < 0.1);

    executor
        .execute(Command::LoadPreset {
            name: "boost".to_string(),
        })
        .await;
    let gain = measure_tone_gain(&mut eq, 750.0);
    assert!((gain - 9.0).abs() < 0.2, "gain {gain:.3} dB");

    let saved: Preset = presets.load_preset("boost").await.unwrap();
    assert_eq!(saved.parameters, store.snapshot());
}

#[test]
fn test_measured_response_tracks_store() {
    let (store, mut eq) = shared_eq();
    store.set(ParamId::PeakFreq, 1000.0);
    store.set(ParamId::PeakGain, 10.0);
    // Refresh coefficients from the store
    eq.process(&mut [], &mut []);

    let measured = measure_impulse_response(&mut eq, 32768).unwrap();
    assert!((measured.db_at(1000.0) - 10.0).abs() < 0.2);
    assert!(measured.db_at(20.0) < -2.0);
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_any_normalized_setting_stays_bounded(
        normalized in proptest::collection::vec(0.0f32..=1.0, ParamId::ALL.len()),
    ) {
        let (store, mut eq) = shared_eq();
        for (id, n) in ParamId::ALL.into_iter().zip(normalized) {
            store.set_normalized(id, n);
        }

        let input = generate_sine_wave(440.0, SAMPLE_RATE, 2048);
        let (mut left, mut right) = (input.clone(), input);
        process_in_blocks(&mut eq, &mut left, &mut right, 512);

        // Peak gain is at most +24 dB, cut banks never amplify
        let limit = 10f32.powf(24.0 / 20.0) * 4.0;
        prop_assert!(left.iter().chain(&right).all(|s| s.is_finite() && s.abs() < limit));
        prop_assert_eq!(left, right);
    }
}
