use anyhow::{Context, Result};
use blocknr::codec::{AudioDecoder, WavDecoder};
use blocknr::{BlockProcessor, Pipeline, PRESETS};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::PathBuf;

const RENDER_BLOCK: usize = 1024;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let (Some(preset), Some(input), Some(output)) = (
        args.next(),
        args.next().map(PathBuf::from),
        args.next().map(PathBuf::from),
    ) else {
        let names: Vec<&str> = PRESETS.names().collect();
        anyhow::bail!(
            "usage: nr_render <preset> <input.wav> <output.wav>\npresets: {}",
            names.join(", ")
        );
    };

    let cfg = PRESETS
        .get(&preset)
        .with_context(|| format!("preset '{preset}'"))?;
    let mut pipeline = Pipeline::from_config(cfg)?;

    let bytes = std::fs::read(&input)
        .with_context(|| format!("failed to read '{}'", input.display()))?;
    let audio = WavDecoder
        .decode(&bytes)
        .with_context(|| format!("failed to decode '{}'", input.display()))?;
    log::info!(
        "rendering '{}' ({} samples @ {} Hz) with '{preset}', latency {} samples",
        input.display(),
        audio.samples.len(),
        audio.sample_rate,
        pipeline.latency()
    );

    let mut samples = audio.samples;
    for (i, block) in samples.chunks_mut(RENDER_BLOCK).enumerate() {
        pipeline
            .process_block(block)
            .with_context(|| format!("block {i} failed"))?;
    }
    pipeline.destroy()?;

    let spec = WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(&output, spec)
        .with_context(|| format!("failed to create '{}'", output.display()))?;
    for &s in &samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;

    println!("Render summary for '{}':", output.display());
    println!("  preset           : {preset}");
    println!("  samples written  : {}", samples.len());
    Ok(())
}
