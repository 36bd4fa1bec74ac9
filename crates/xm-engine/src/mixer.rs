//! Sample generator: drives the tick scheduler and renders output
//! frames from channel state, per spec 4.5.
//!
//! `Engine::generate_samples` is the hot path and must not allocate;
//! with the `alloc_check` feature it is wrapped in
//! `assert_no_alloc::assert_no_alloc` so a CI build can catch a
//! regression before it reaches a real-time caller.

use xm_ir::{ChannelState, Context, LoopType};

use crate::frequency;
use crate::scheduler::{self, TickKind};

/// Microstep subsample resolution used to track fractional tick
/// duration without float drift across a long render.
const TICK_SUBSAMPLE_BITS: u32 = 13;
const TICK_SUBSAMPLES: i64 = 1 << TICK_SUBSAMPLE_BITS;

/// Output amplitude scale applied after summing all channels, leaving
/// headroom for many simultaneously loud channels.
const AMPLIFICATION: f32 = 0.25;

fn tick_duration_in_subsamples(bpm: u16, sample_rate: u32) -> i64 {
    // One tick lasts 2.5 / bpm seconds (FT2's fixed tick-rate formula).
    let numerator = sample_rate as i64 * TICK_SUBSAMPLES * 5;
    numerator / (bpm.max(1) as i64 * 2)
}

/// Owns a loaded module's playback state and renders it to interleaved
/// stereo `f32` output frames.
pub struct Engine {
    pub context: Context,
    remaining_subsamples_in_tick: i64,
    halted: bool,
}

impl Engine {
    pub fn new(context: Context) -> Self {
        let mut engine = Self {
            context,
            remaining_subsamples_in_tick: 0,
            halted: false,
        };
        engine.prime_first_tick();
        engine
    }

    fn prime_first_tick(&mut self) {
        self.remaining_subsamples_in_tick =
            tick_duration_in_subsamples(self.context.position.bpm, self.context.sample_rate);
    }

    /// Restore playback to the start of the song.
    pub fn reset(&mut self) {
        self.context.reset();
        self.halted = false;
        self.prime_first_tick();
    }

    /// True once playback has reached `max_loop_count` and every
    /// subsequent call to `generate_samples` will produce silence.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Jump the transport to a specific order/row/tick. Channels stop
    /// playing immediately; the row at the target position triggers on
    /// the next tick-0 boundary, same as any other row.
    pub fn seek(&mut self, order: u16, row: u16, tick: u16) {
        self.context.position.order_index = order;
        self.context.position.pattern_row = row;
        self.context.position.current_tick = tick.min(self.context.position.tempo.saturating_sub(1));
        self.context.position.pattern_delay_rows_remaining = 0;
        for channel in &mut self.context.channels {
            channel.playing = false;
        }
        self.halted = false;
        self.prime_first_tick();
    }

    /// Fill `output` (interleaved stereo, `output.len()` must be even)
    /// with freshly generated audio, advancing playback by
    /// `output.len() / 2` output frames.
    pub fn generate_samples(&mut self, output: &mut [f32]) {
        for frame in output.chunks_exact_mut(2) {
            if self.halted {
                frame[0] = 0.0;
                frame[1] = 0.0;
                continue;
            }

            if self.remaining_subsamples_in_tick <= 0 {
                match scheduler::on_tick(&mut self.context) {
                    TickKind::Halted => {
                        self.halted = true;
                        frame[0] = 0.0;
                        frame[1] = 0.0;
                        continue;
                    }
                    _ => {
                        self.remaining_subsamples_in_tick +=
                            tick_duration_in_subsamples(self.context.position.bpm, self.context.sample_rate);
                    }
                }
            }
            self.remaining_subsamples_in_tick -= TICK_SUBSAMPLES;

            let (left, right) = render_frame(&mut self.context);
            frame[0] = left.clamp(-1.0, 1.0);
            frame[1] = right.clamp(-1.0, 1.0);
            self.context.generated_frames += 1;
        }
    }

    #[cfg(feature = "alloc_check")]
    pub fn generate_samples_checked(&mut self, output: &mut [f32]) {
        assert_no_alloc::assert_no_alloc(|| self.generate_samples(output));
    }
}

/// Render exactly one stereo output frame from the current channel
/// state and advance every playing channel's sample position.
fn render_frame(ctx: &mut Context) -> (f32, f32) {
    let frequency_type = ctx.module.frequency_type;
    let sample_rate = ctx.sample_rate;
    let global_volume = ctx.global.volume;
    let samples = &ctx.samples;
    let waveform = &ctx.waveform;
    let instruments = &ctx.instruments;

    let mut left = 0.0f32;
    let mut right = 0.0f32;

    for channel in &mut ctx.channels {
        if channel.muted || !channel.playing || channel.sample == u16::MAX {
            continue;
        }
        let Some(sample) = samples.get(channel.sample as usize) else {
            continue;
        };
        if sample.is_empty() {
            continue;
        }

        let sounding_period = frequency::clamp_period(frequency_type, channel.period + channel.autovibrato_offset);
        channel.step = frequency::period_to_step(frequency_type, sounding_period, sample_rate);

        let instrument = ctx_instrument(channel, instruments);
        let raw = read_interpolated(waveform, sample, channel);
        let amplitude = channel_amplitude(instrument, channel, global_volume);
        let ramped = ramp_amplitude(channel, raw);
        let value = ramped * amplitude;

        let pan = channel_pan(instrument, channel);
        left += value * (1.0 - pan);
        right += value * pan;

        advance_position(channel, sample);
    }

    (left * AMPLIFICATION, right * AMPLIFICATION)
}

fn ctx_instrument<'a>(
    channel: &ChannelState,
    instruments: &'a [xm_ir::Instrument],
) -> Option<&'a xm_ir::Instrument> {
    instruments.get(channel.instrument.checked_sub(1)? as usize)
}

fn channel_amplitude(instrument: Option<&xm_ir::Instrument>, channel: &ChannelState, global_volume: u8) -> f32 {
    if !channel.tremor_active {
        return 0.0;
    }
    let envelope_scale = instrument
        .filter(|i| i.volume_envelope.enabled)
        .map(|i| i.volume_envelope.value_at(channel.volume_envelope_frame) as f32 / 64.0)
        .unwrap_or(1.0);
    let fadeout_scale = channel.fadeout_volume as f32 / 32768.0;
    (channel.volume as f32 / 64.0) * (global_volume as f32 / 64.0) * envelope_scale * fadeout_scale
}

/// Overlay the triggering instrument's panning envelope on top of the
/// channel's own panning, centered on the envelope's disabled/default
/// midpoint of 32 so a flat or absent envelope leaves panning alone.
fn channel_pan(instrument: Option<&xm_ir::Instrument>, channel: &ChannelState) -> f32 {
    let envelope_value = instrument
        .map(|i| i.panning_envelope.value_at(channel.panning_envelope_frame) as i32)
        .unwrap_or(32);
    let pan_byte = (channel.panning as i32 + (envelope_value - 32) * 4).clamp(0, 255);
    pan_byte as f32 / 255.0
}

/// Linear interpolation between the frame at `sample_position` and its
/// successor, using `2^MICROSTEP_BITS` as the fractional scale.
fn read_interpolated(waveform: &[f32], sample: &xm_ir::Sample, channel: &ChannelState) -> f32 {
    let index = channel.sample_position >> xm_ir::MICROSTEP_BITS;
    let frac = (channel.sample_position & ((1 << xm_ir::MICROSTEP_BITS) - 1)) as f32
        / (1u32 << xm_ir::MICROSTEP_BITS) as f32;

    let a = waveform_at(waveform, sample, index);
    let b = waveform_at(waveform, sample, index.wrapping_add(1));
    a + (b - a) * frac
}

fn waveform_at(waveform: &[f32], sample: &xm_ir::Sample, index: u32) -> f32 {
    if index >= sample.length {
        if sample.has_loop() && sample.loop_type == LoopType::Forward {
            let looped = sample.loop_start + (index - sample.loop_start) % sample.loop_length.max(1);
            return waveform
                .get((sample.base + looped) as usize)
                .copied()
                .unwrap_or(0.0);
        }
        return 0.0;
    }
    waveform.get((sample.base + index) as usize).copied().unwrap_or(0.0)
}

/// Cross-fade the first `RAMPING_POINTS` frames of a freshly triggered
/// sample against the tail of whatever was previously playing, to
/// suppress the discontinuity click.
fn ramp_amplitude(channel: &mut ChannelState, raw: f32) -> f32 {
    let index = (channel.sample_position >> xm_ir::MICROSTEP_BITS) as usize;
    if index < xm_ir::RAMPING_POINTS {
        let t = index as f32 / xm_ir::RAMPING_POINTS as f32;
        let tail = channel.end_of_previous_sample[index];
        return tail + (raw - tail) * t;
    }
    raw
}

fn advance_position(channel: &mut ChannelState, sample: &xm_ir::Sample) {
    let max_position = (sample.length as u64) << xm_ir::MICROSTEP_BITS;

    if channel.loop_forward {
        channel.sample_position = channel.sample_position.saturating_add(channel.step);
    } else {
        channel.sample_position = channel.sample_position.saturating_sub(channel.step);
    }

    match sample.loop_type {
        LoopType::None => {
            if channel.sample_position as u64 >= max_position {
                channel.playing = false;
            }
        }
        LoopType::Forward => {
            let loop_start_micro = (sample.loop_start as u64) << xm_ir::MICROSTEP_BITS;
            let loop_end_micro = (sample.loop_end() as u64) << xm_ir::MICROSTEP_BITS;
            if sample.has_loop() && channel.sample_position as u64 >= loop_end_micro {
                let overshoot = channel.sample_position as u64 - loop_end_micro;
                let span = (loop_end_micro - loop_start_micro).max(1);
                channel.sample_position = (loop_start_micro + overshoot % span) as u32;
            }
        }
        LoopType::PingPong => {
            let loop_start_micro = (sample.loop_start as u64) << xm_ir::MICROSTEP_BITS;
            let loop_end_micro = (sample.loop_end() as u64) << xm_ir::MICROSTEP_BITS;
            if sample.has_loop() {
                if channel.loop_forward && channel.sample_position as u64 >= loop_end_micro {
                    channel.sample_position = loop_end_micro as u32;
                    channel.loop_forward = false;
                } else if !channel.loop_forward && (channel.sample_position as u64) <= loop_start_micro {
                    channel.sample_position = loop_start_micro as u32;
                    channel.loop_forward = true;
                }
            }
        }
    }
}
