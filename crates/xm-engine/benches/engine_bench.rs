//! Engine throughput benchmarks.
//!
//! Measures `generate_samples` cost for a module exercising every
//! channel so a render budget regression shows up before it reaches
//! a real-time caller.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use xm_engine::Engine;
use xm_ir::{Context, FrequencyType, Instrument, Module, Pattern, PatternSlot, Sample, Note};

const SAMPLE_RATE: u32 = 48_000;
const CHANNEL_COUNTS: &[u8] = &[4, 8, 16, 32];

fn build_module(num_channels: u8) -> Context {
    let mut module = Module::default();
    module.num_channels = num_channels;
    module.frequency_type = FrequencyType::Linear;
    module.default_tempo = 6;
    module.default_bpm = 125;
    module.order.push(0);
    module.num_patterns = 1;
    module.num_instruments = 1;
    module.num_samples = 1;

    let mut ctx = Context::new(module, SAMPLE_RATE);

    let waveform_len = 4096u32;
    ctx.waveform = (0..waveform_len)
        .map(|i| (i as f32 / waveform_len as f32 * std::f32::consts::TAU).sin())
        .collect();

    let mut sample = Sample::new("sine");
    sample.length = waveform_len;
    sample.base = 0;
    ctx.samples.push(sample);

    let mut instrument = Instrument::new("lead");
    instrument.sample_base = 0;
    instrument.set_single_sample();
    ctx.instruments.push(instrument);

    let mut pattern = Pattern::new(64, num_channels);
    for channel in 0..num_channels {
        let mut slot = PatternSlot::empty();
        slot.note = Note::On(48);
        slot.instrument = 1;
        *pattern.slot_mut(0, channel) = slot;
    }
    ctx.patterns.push(pattern);

    ctx
}

fn bench_generate_samples(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate_samples");

    for &channels in CHANNEL_COUNTS {
        group.bench_with_input(BenchmarkId::new("channels", channels), &channels, |b, &n| {
            let mut engine = Engine::new(build_module(n));
            let mut buffer = vec![0.0f32; 2 * 1024];

            b.iter(|| {
                engine.generate_samples(black_box(&mut buffer));
                black_box(&buffer);
            });
        });
    }

    group.finish();
}

fn bench_full_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_song_loop");
    group.bench_function("16_channels_one_second", |b| {
        b.iter_batched(
            || Engine::new(build_module(16)),
            |mut engine| {
                let mut buffer = vec![0.0f32; 2 * SAMPLE_RATE as usize];
                engine.generate_samples(&mut buffer);
                black_box(buffer);
            },
            criterion::BatchSize::LargeInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_generate_samples, bench_full_loop);
criterion_main!(benches);
