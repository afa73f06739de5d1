#![cfg(feature = "assert_process_allocs")]

use assert_no_alloc::{assert_no_alloc, AllocDisabler};
use blocknr::{BlockProcessor, Pipeline, PRESETS};

#[global_allocator]
static A: AllocDisabler = AllocDisabler;

fn tone_with_clicks(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let t = i as f32 / 12_000.0;
            let click = if i % 997 == 500 { 0.8 } else { 0.0 };
            0.05 * (2.0 * std::f32::consts::PI * 700.0 * t).sin() + click
        })
        .collect()
}

#[test]
fn test_presets_process_without_allocating() {
    for name in PRESETS.names() {
        let mut pipeline = Pipeline::from_config(PRESETS.get(name).unwrap()).unwrap();
        let mut signal = tone_with_clicks(12_000);
        for block in signal.chunks_mut(1000) {
            assert_no_alloc(|| pipeline.process_block(block)).unwrap();
        }
        for block in signal.chunks_mut(blocknr::MAX_BLOCK_LEN) {
            assert_no_alloc(|| pipeline.process_block(block)).unwrap();
        }
    }
}
