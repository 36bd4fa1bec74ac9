//! Allocation-free render path test.
//!
//! `Engine::generate_samples` is the real-time boundary: it must never
//! touch the heap once a module is loaded. This builds a small but
//! busy module in-memory (arpeggio, vibrato, volume envelope, pattern
//! loop) and renders several seconds of audio under a global allocator
//! that aborts on any allocation.

use assert_no_alloc::{assert_no_alloc, AllocDisabler};

#[cfg(debug_assertions)]
#[global_allocator]
static A: AllocDisabler = AllocDisabler;

use xm_engine::Engine;
use xm_ir::{
    AutoVibrato, Context, Envelope, EnvelopePoint, FrequencyType, Instrument, Module, Note,
    Pattern, PatternSlot, Sample,
};

fn busy_context() -> Context {
    let mut module = Module::default();
    module.num_channels = 4;
    module.frequency_type = FrequencyType::Linear;
    module.default_tempo = 6;
    module.default_bpm = 125;
    module.order.push(0);
    module.num_patterns = 1;
    module.num_instruments = 1;
    module.num_samples = 1;

    let mut pattern = Pattern::new(8, 4);
    for row in 0..8u16 {
        pattern.slot_mut(row, 0).note = Note::On(48);
        pattern.slot_mut(row, 0).instrument = 1;
        pattern.slot_mut(row, 0).effect_type = 0x00; // arpeggio
        pattern.slot_mut(row, 0).effect_param = 0x47;

        pattern.slot_mut(row, 1).note = Note::On(52);
        pattern.slot_mut(row, 1).instrument = 1;
        pattern.slot_mut(row, 1).effect_type = 0x04; // vibrato
        pattern.slot_mut(row, 1).effect_param = 0x68;
    }
    pattern.slot_mut(0, 2).note = Note::On(55);
    pattern.slot_mut(0, 2).instrument = 1;
    pattern.slot_mut(6, 2).note = Note::Off;
    // pattern loop: E6x on row 0, jump back once on row 7
    pattern.slot_mut(0, 3).effect_type = 0x0E;
    pattern.slot_mut(0, 3).effect_param = 0x60;
    pattern.slot_mut(7, 3).effect_type = 0x0E;
    pattern.slot_mut(7, 3).effect_param = 0x61;

    let mut instrument = Instrument::new("lead");
    instrument.set_single_sample();
    instrument.volume_envelope = Envelope {
        points: [
            EnvelopePoint { frame: 0, value: 0 },
            EnvelopePoint { frame: 4, value: 64 },
            EnvelopePoint { frame: 20, value: 32 },
        ]
        .into_iter()
        .collect(),
        sustain_point: Some(1),
        loop_start_point: None,
        loop_end_point: None,
        enabled: true,
    };
    instrument.autovibrato = AutoVibrato { waveform: Default::default(), sweep: 8, depth: 4, rate: 32 };

    let mut sample = Sample::new("saw");
    let waveform: Vec<f32> = (0..256).map(|i| (i as f32 / 128.0) - 1.0).collect();
    sample.length = waveform.len() as u32;
    sample.loop_start = 0;
    sample.loop_length = waveform.len() as u32;
    sample.loop_type = xm_ir::LoopType::Forward;

    let mut ctx = Context::new(module, 48_000);
    ctx.patterns.push(pattern);
    ctx.instruments.push(instrument);
    ctx.samples.push(sample);
    ctx.waveform = waveform;
    ctx
}

#[test]
fn render_several_seconds_without_allocating() {
    let mut engine = Engine::new(busy_context());
    let mut buffer = [0.0f32; 1024];

    assert_no_alloc(|| {
        for _ in 0..(48_000 * 5 / 512) {
            engine.generate_samples(&mut buffer);
        }
    });
}
