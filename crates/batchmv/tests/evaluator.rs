//! End-to-end evaluation tests on the host device.

use batchmv::{
    BatchEvaluator, EvalConfig, EvalError, FatalAction, HostBatch, Stage, reference_products,
};
use batchmv_device::{BlasStatus, HostDevice, HostDeviceConfig};

fn device_with_alignment(pitch_alignment: usize) -> HostDevice {
    HostDevice::with_config(HostDeviceConfig {
        pitch_alignment,
        memory_limit: None,
    })
}

#[test]
fn test_scalar_example() {
    let device = HostDevice::new();
    let batch = HostBatch::uniform(1, 1, 3.0f32, 2.0).unwrap();
    let eval = BatchEvaluator::new(&device).evaluate(&batch).unwrap();
    assert_eq!(eval.results, vec![6.0]);
}

#[test]
fn test_uniform_batches_equal_a_b_size() {
    let device = HostDevice::new();
    let evaluator = BatchEvaluator::new(&device);

    for &(size, num) in &[(1, 7), (2, 3), (5, 1), (16, 16), (33, 4)] {
        let (a, b) = (0.5f64, 3.0f64);
        let batch = HostBatch::uniform(size, num, a, b).unwrap();
        let eval = evaluator.evaluate(&batch).unwrap();

        assert_eq!(eval.results.len(), size * num);
        let expected = a * b * size as f64;
        for (i, &c) in eval.results.iter().enumerate() {
            assert!(
                (c - expected).abs() < 1e-12,
                "size={} num={} result {} = {}, expected {}",
                size,
                num,
                i,
                c,
                expected
            );
        }
    }
    assert_eq!(device.live_allocations(), 0);
}

#[test]
fn test_results_follow_batch_order() {
    // Identity matrices scaled by i + 1, vectors filled with i.
    let device = device_with_alignment(128);
    let (size, num) = (3, 10);
    let batch = HostBatch::from_fn(
        size,
        num,
        |i, row, col| if row == col { (i + 1) as f32 } else { 0.0 },
        |i, _| i as f32,
    )
    .unwrap();
    let eval = BatchEvaluator::new(&device).evaluate(&batch).unwrap();

    for i in 0..num {
        let expected = ((i + 1) * i) as f32;
        assert_eq!(eval.result(i).unwrap(), &[expected; 3][..], "problem {}", i);
    }
}

#[test]
fn test_padded_pitch_matches_reference() {
    // 5 f32 columns = 20 bytes, padded to 256
    let device = device_with_alignment(256);
    let (size, num) = (5, 6);
    let batch = HostBatch::from_fn(
        size,
        num,
        |i, row, col| (i as f32) - (row as f32) * 0.5 + (col as f32) * 0.25,
        |i, row| 1.0 + (i * row) as f32 * 0.125,
    )
    .unwrap();

    let eval = BatchEvaluator::new(&device).evaluate(&batch).unwrap();
    assert_eq!(eval.pitches.matrices, 64);
    assert_eq!(eval.pitches.results, 64);

    let reference = reference_products(&batch);
    assert!(eval.max_abs_error(&reference) < 1e-4);
}

#[test]
fn test_unpadded_pitch() {
    let device = device_with_alignment(4);
    let batch = HostBatch::uniform(3, 5, 2.0f32, 1.0).unwrap();
    let eval = BatchEvaluator::new(&device).evaluate(&batch).unwrap();

    assert_eq!(eval.pitches.vectors, 3);
    assert_eq!(eval.results, vec![6.0; 15]);
}

#[test]
fn test_compute_failure_has_no_results_and_no_leaks() {
    let device = HostDevice::new();
    device.fail_next_gemm(BlasStatus::ExecutionFailed);
    let batch = HostBatch::uniform(2, 2, 1.0f32, 1.0).unwrap();

    let err = BatchEvaluator::new(&device).evaluate(&batch).unwrap_err();
    assert_eq!(err.blas_status(), Some(BlasStatus::ExecutionFailed));
    assert_eq!(device.live_allocations(), 0);

    // The device is still usable afterwards.
    let eval = BatchEvaluator::new(&device).evaluate(&batch).unwrap();
    assert_eq!(eval.results, vec![2.0; 4]);
    assert_eq!(device.live_allocations(), 0);
}

#[test]
fn test_allocation_failure_releases_earlier_buffers() {
    // Room for the matrices and vectors, not the results.
    let device = HostDevice::with_config(HostDeviceConfig {
        pitch_alignment: 64,
        memory_limit: Some(64 * 8 + 64 * 2 + 32),
    });
    let batch = HostBatch::uniform(4, 2, 1.0f32, 1.0).unwrap();

    let err = BatchEvaluator::new(&device).evaluate(&batch).unwrap_err();
    assert!(matches!(
        err,
        EvalError::Device {
            stage: Stage::DeviceAlloc,
            ..
        }
    ));
    assert_eq!(device.live_allocations(), 0);
    assert_eq!(device.bytes_in_use(), 0);
}

#[test]
fn test_oversized_pitch_alignment_fails_cleanly() {
    let config = EvalConfig {
        pitch_alignment: usize::MAX,
        ..Default::default()
    };
    assert!(matches!(config.validate(), Err(EvalError::InvalidConfig(_))));

    // The device itself reports the overflow instead of panicking.
    let device = device_with_alignment(usize::MAX);
    let batch = HostBatch::uniform(2, 3, 1.0f32, 1.0).unwrap();
    let err = BatchEvaluator::new(&device).evaluate(&batch).unwrap_err();
    assert_eq!(err.stage(), Some(Stage::DeviceAlloc));
    assert_eq!(err.fatal_action(), FatalAction::Abort);
    assert_eq!(device.live_allocations(), 0);
}
