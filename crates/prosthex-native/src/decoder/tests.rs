//! End-to-end decoding tests: frames in, control signals out

use nalgebra::DMatrix;
use serde_json::json;

use prosthex_core::math::SparseWeightMatrix;
use prosthex_core::types::Window;

use super::*;
use crate::ml::esn::{ReservoirNetwork, Scaling};
use crate::ml::features::FeatureExtractor;
use crate::model::loader::tests::{scratch_dir, write};
use crate::model::loader::{GMLVQ_FILE, OUTPUT_WEIGHTS_FILE, RESERVOIR_FILE};
use crate::processing::buffer::StreamingWindowBuffer;
use crate::processing::filters::CombFilter;

const CHANNELS: usize = 8;

/// Deterministic multi-tone signal with a slow per-channel drift
fn sample(t: usize, c: usize) -> f64 {
    let (tf, cf) = (t as f64, c as f64);
    (cf + 1.0) * (0.37 * (tf + 1.0) * (cf + 1.0)).sin() + 0.02 * tf * cf
}

fn frames(n: usize) -> Vec<Vec<f64>> {
    (0..n).map(|t| (0..CHANNELS).map(|c| sample(t, c)).collect()).collect()
}

fn input_weights() -> DMatrix<f64> {
    DMatrix::from_fn(4, CHANNELS, |i, j| (((3 * i + j) % 7) as f64 - 3.0) / 10.0)
}

fn output_weights() -> DMatrix<f64> {
    DMatrix::from_row_slice(2, 4, &[0.5, -0.3, 0.8, 0.1, -0.2, 0.6, 0.4, -0.7])
}

const RESERVOIR_TRIPLETS: [(usize, usize, f64); 5] =
    [(1, 2, 0.3), (2, 3, -0.2), (3, 4, 0.4), (4, 1, 0.1), (3, 3, 0.25)];

fn tiny_network() -> ReservoirNetwork {
    let w_res = SparseWeightMatrix::from_one_based(&RESERVOIR_TRIPLETS, 4, 4).unwrap();
    let input = Scaling { offset: vec![1.0; CHANNELS], low: vec![-2.0; CHANNELS], high: vec![4.0; CHANNELS] };
    let output = Scaling { offset: vec![0.1, -0.1], low: vec![-2.0, -1.0], high: vec![2.0, 1.0] };
    ReservoirNetwork::new(input_weights(), w_res, output_weights(), 0.7, input, output).unwrap()
}

fn assert_close(got: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(got.len(), expected.len());
    for (g, e) in got.iter().zip(expected) {
        assert!((g - e).abs() < tol, "got {got:?}, expected {expected:?}");
    }
}

#[test]
fn test_window_to_reservoir_output() {
    let window = Window::from_rows(&frames(50)).unwrap();
    let features = FeatureExtractor::default().extract(&window).unwrap();
    assert_close(
        &features,
        &[
            -0.654_183_887_988_399_4,
            0.721_113_043_196_136_6,
            1.571_885_910_025_200_3,
            2.175_472_336_159_935_5,
            2.642_012_750_348_927_7,
            3.022_465_235_095_483,
            3.344_882_796_331_663,
            3.633_011_790_438_146_7,
        ],
        1e-9,
    );

    let mut esn = tiny_network();
    esn.update(&features).unwrap();
    assert_close(
        esn.state(),
        &[0.281_204_958_593_837_7, -0.158_763_306_068_462_48, 0.119_365_486_685_600_57, -0.067_158_936_135_554_74],
        1e-6,
    );
    assert_close(&esn.output(), &[0.654_015_933_704_765_2, -0.156_741_525_390_716_42], 1e-6);

    // Second step sees the recurrent contribution of the first
    esn.update(&features).unwrap();
    assert_close(&esn.output(), &[0.808_341_994_322_978_5, -0.190_401_642_437_897_95], 1e-6);
}

#[test]
fn test_consecutive_windows_share_context() {
    let mut buffer = StreamingWindowBuffer::new(8, 4, CHANNELS).unwrap();
    let mut windows: Vec<Window> = Vec::new();
    for frame in frames(200) {
        if buffer.store(&frame).unwrap() {
            windows.push(buffer.retrieve().unwrap());
        }
    }
    assert!(windows.len() >= 2);
    for pair in windows.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        for o in 0..4 {
            assert_eq!(next.row(o), prev.row(prev.frames() - 4 + o));
        }
    }
}

#[test]
fn test_comb_filter_batches_match_whole_stream() {
    let stream = Window::from_rows(&frames(48)).unwrap();
    let whole = CombFilter::mains(CHANNELS).unwrap().filter(&stream).unwrap();

    let mut filter = CombFilter::mains(CHANNELS).unwrap();
    let first = filter.filter(&stream.slice_frames(0, 24)).unwrap();
    let second = filter.filter(&stream.slice_frames(24, 48)).unwrap();
    assert_eq!(first.concat(&second).unwrap(), whole);
}

fn write_esn_model(dir: &std::path::Path) {
    let w_in: Vec<Vec<f64>> = input_weights().row_iter().map(|r| r.iter().copied().collect()).collect();
    let w_out: Vec<Vec<f64>> = output_weights().row_iter().map(|r| r.iter().copied().collect()).collect();
    let triplets: Vec<[f64; 3]> =
        RESERVOIR_TRIPLETS.iter().map(|&(r, c, v)| [r as f64, c as f64, v]).collect();
    write(
        dir,
        RESERVOIR_FILE,
        &json!({"esn": {
            "wInp": w_in,
            "wRes": {"_ArraySize_": [4, 4], "_ArrayData_": triplets},
            "dt": 0.7,
            "inpOffset": vec![1.0; CHANNELS],
            "inpRange": [vec![-2.0; CHANNELS], vec![4.0; CHANNELS]],
            "updateRule": "leaky-tanh"
        }}),
    );
    write(
        dir,
        OUTPUT_WEIGHTS_FILE,
        &json!({"esn": {"wOut": w_out, "outOffset": [0.1, -0.1], "outRange": [[-2.0, -1.0], [2.0, 1.0]]}}),
    );
}

#[test]
fn test_echo_state_controller_matches_manual_chain() {
    let dir = scratch_dir("e2e-esn");
    write_esn_model(&dir);

    let mut controller = Controller::new(ControllerKind::EchoState, &Settings::default()).unwrap();
    assert_eq!(controller.set_configuration(&dir), ConfigResult::Ok);
    assert!(controller.is_enabled());

    let config = DecoderConfig::default();
    let mut buffer = StreamingWindowBuffer::new(config.packet_size, config.overlap, CHANNELS).unwrap();
    let mut filter = CombFilter::mains(CHANNELS).unwrap();
    let extractor = FeatureExtractor::default();
    let mut esn = tiny_network();

    let mut updates = 0;
    for frame in frames(120) {
        let changed = controller.on_emg(&frame).unwrap();
        if buffer.store(&frame).unwrap() {
            let window = buffer.retrieve().unwrap();
            esn.update(&extractor.extract(&filter.filter(&window).unwrap()).unwrap()).unwrap();
            assert!(changed);
            updates += 1;
            let expected = esn.normalized_output();
            assert_close(&[controller.opening_velocity(), controller.rotation_velocity()], &expected[..2], 1e-12);
        } else {
            assert!(!changed);
        }
    }
    assert_eq!(updates, 7);
    assert!(controller.opening_velocity().abs() <= 1.0);
    assert!(controller.rotation_velocity().abs() <= 1.0);
}

#[test]
fn test_gmlvq_controller_smooths_labels() {
    let dir = scratch_dir("e2e-gmlvq");
    let identity: Vec<Vec<f64>> =
        (0..CHANNELS).map(|i| (0..CHANNELS).map(|j| if i == j { 1.0 } else { 0.0 }).collect()).collect();
    let opening = json!({"w": [vec![0.0; CHANNELS]], "c_w": [1], "omega": identity});
    let rotation = json!({"w": [vec![0.0; CHANNELS]], "c_w": [[-1]], "lambda": identity});
    write(&dir, GMLVQ_FILE, &json!({"gmlvq": [[opening], [rotation]]}));

    let mut controller = Controller::new(ControllerKind::Gmlvq, &Settings::default()).unwrap();
    assert_eq!(controller.set_configuration(&dir), ConfigResult::Ok);

    // Windows complete at frames 24 and 40
    let mut windows = 0;
    for frame in frames(40) {
        if controller.on_emg(&frame).unwrap() {
            windows += 1;
        }
    }
    assert_eq!(windows, 2);
    // v1 = 0.45 · 0.8, v2 = v1 + 0.55 · v1
    assert!((controller.opening_velocity() - 0.558).abs() < 1e-12);
    assert!((controller.rotation_velocity() + 0.558).abs() < 1e-12);
}

#[test]
fn test_halted_pipeline_stops_ingestion() {
    let dir = scratch_dir("e2e-halt");
    write_esn_model(&dir);
    let mut controller = Controller::new(ControllerKind::EchoState, &Settings::default()).unwrap();
    assert!(!controller.set_configuration(&dir).is_error());

    let err = controller.on_emg(&[0.0; 3]).unwrap_err();
    assert!(matches!(err, DecoderError::Processing(_)));
    let err = controller.on_emg(&[0.0; CHANNELS]).unwrap_err();
    assert!(matches!(err, DecoderError::Halted { .. }));
    assert!(controller.pipeline().is_some_and(DecodePipeline::is_halted));

    // Reconfiguring starts a fresh stream
    assert!(!controller.set_configuration(&dir).is_error());
    assert!(!controller.on_emg(&[0.0; CHANNELS]).unwrap());
}

#[tokio::test]
async fn test_polled_and_event_ingestion_agree() {
    let dir = scratch_dir("e2e-ingest");
    write_esn_model(&dir);

    let mut results = Vec::new();
    for mode in [IngestionMode::Polled, IngestionMode::Event] {
        let mut controller = Controller::new(ControllerKind::EchoState, &Settings::default()).unwrap();
        assert!(!controller.set_configuration(&dir).is_error());
        let mut ingestion = Ingestion::new(mode, shared(controller), 16);
        let mut signals = ingestion.subscribe();
        for frame in frames(120) {
            ingestion.deliver(ArmbandEvent::Emg(frame.into())).await.unwrap();
        }
        let decoder = std::sync::Arc::clone(ingestion.decoder());
        let stats = ingestion.finish().await.unwrap();
        assert_eq!(stats, IngestStats { frames: 120, windows: 7, ignored: 0 });

        let mut last = None;
        while let Ok(signal) = signals.try_recv() {
            last = Some(signal);
        }
        let last = last.unwrap();
        assert_eq!(last, ControlSignal::of(&decoder.lock().unwrap()));
        results.push(last);
    }
    assert_eq!(results[0], results[1]);
}
