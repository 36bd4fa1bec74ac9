//! Effect processor: interprets decoded volume/effect columns and
//! mutates channel state, per spec 4.4.
//!
//! Split into two passes: `trigger_slot` runs once when a row starts
//! (note triggers, instrument/sample resolution, and effects that fire
//! exactly once per row), and `apply_tick` runs on every tick,
//! including tick 0, to integrate whatever continuous effect is
//! currently active on each channel (portamento, vibrato, tremolo,
//! volume slides, tremor, arpeggio, multi-retrig).

use xm_ir::{
    ActiveEffect, ChannelState, Context, Effect, EffectMemory, Instrument, Note, PatternSlot,
    VolumeColumn,
};

use crate::frequency;

/// Row-level outcome accumulated while triggering a row's slots, fed
/// back to the scheduler after all channels have been processed.
#[derive(Clone, Copy, Debug, Default)]
pub struct RowIntent {
    pub position_jump_order: Option<u16>,
    pub pattern_break_row: Option<u16>,
    pub pattern_delay_extra_rows: Option<u16>,
}

/// Handle one channel's slot at the start of a row: resolve and
/// trigger notes, apply volume-column and tick-0-only effects, and set
/// up whatever continuous effect the row's effect column names.
pub fn trigger_slot(ctx: &mut Context, channel_index: usize, slot: &PatternSlot, intent: &mut RowIntent) {
    let effect = Effect::decode(slot.effect_type, slot.effect_param);
    let volume = VolumeColumn::decode(slot.volume_column);

    if let Some(channel) = ctx.channels.get_mut(channel_index) {
        channel.pending_note_delay = None;
    }

    if let Effect::NoteDelay(delay) = effect {
        if delay > 0 {
            if let Some(channel) = ctx.channels.get_mut(channel_index) {
                channel.pending_note_delay = Some((delay as u16, *slot));
            }
            apply_row_effect(ctx, channel_index, effect, intent);
            return;
        }
    }

    dispatch_note(ctx, channel_index, slot);

    if let Some(channel) = ctx.channels.get_mut(channel_index) {
        apply_volume_column_trigger(channel, volume);
        channel.active_effect = active_effect_for(channel, effect);
    }

    apply_row_effect(ctx, channel_index, effect, intent);
}

/// Replay the note/volume/effect columns of any slot held back by
/// `EDx` (note-delay) whose target tick has arrived, via the same
/// trigger path a normal row would take.
fn apply_pending_note_delays(ctx: &mut Context, tick: u16) {
    for channel_index in 0..ctx.channels.len() {
        let Some((delay_tick, slot)) = ctx.channels[channel_index].pending_note_delay else {
            continue;
        };
        if delay_tick != tick {
            continue;
        }
        ctx.channels[channel_index].pending_note_delay = None;

        let effect = Effect::decode(slot.effect_type, slot.effect_param);
        let volume = VolumeColumn::decode(slot.volume_column);

        dispatch_note(ctx, channel_index, &slot);

        if let Some(channel) = ctx.channels.get_mut(channel_index) {
            apply_volume_column_trigger(channel, volume);
            channel.active_effect = active_effect_for(channel, effect);
        }
    }
}

/// Resolve a slot's note/instrument columns into a trigger (or key-off)
/// on the channel, unless the slot is a tone-portamento that should
/// instead update `porta_target_period` without retriggering.
fn dispatch_note(ctx: &mut Context, channel_index: usize, slot: &PatternSlot) {
    let is_tone_porta = matches!(
        Effect::decode(slot.effect_type, slot.effect_param),
        Effect::TonePorta(_) | Effect::TonePortaVolSlide(_)
    );

    if slot.instrument != 0 {
        if let Some(channel) = ctx.channels.get_mut(channel_index) {
            channel.instrument = slot.instrument as u16;
        }
    }

    match slot.note {
        Note::Off => {
            if let Some(channel) = ctx.channels.get_mut(channel_index) {
                channel.key_off();
            }
        }
        Note::On(note_value) => {
            let instrument_index = ctx
                .channels
                .get(channel_index)
                .map(|c| c.instrument)
                .unwrap_or(0);
            let Some((sample_index, relative_note, finetune)) =
                resolve_sample(ctx, instrument_index, note_value)
            else {
                return;
            };
            let period = compute_period(ctx, note_value, relative_note, finetune);

            if is_tone_porta {
                if let Some(channel) = ctx.channels.get_mut(channel_index) {
                    channel.porta_target_period = period;
                }
                return;
            }

            let (volume, panning) = ctx
                .samples
                .get(sample_index as usize)
                .map(|s| (s.volume, s.panning))
                .unwrap_or((64, 128));

            if let Some(channel) = ctx.channels.get_mut(channel_index) {
                channel.trigger(instrument_index, sample_index, period);
                channel.volume = volume;
                channel.panning = panning;
            }
        }
        Note::None => {}
    }
}

fn resolve_sample(ctx: &Context, instrument_index: u16, note: u8) -> Option<(u16, i8, i8)> {
    let instrument = ctx.instruments.get(instrument_index.checked_sub(1)? as usize)?;
    let sample_index = instrument.sample_for_note(note)?;
    let sample = ctx.samples.get(sample_index as usize)?;
    Some((sample_index, sample.relative_note, sample.finetune))
}

fn compute_period(ctx: &Context, note: u8, relative_note: i8, finetune: i8) -> f32 {
    match ctx.module.frequency_type {
        xm_ir::FrequencyType::Linear => {
            frequency::note_to_linear_period(note as f32, relative_note, finetune)
        }
        xm_ir::FrequencyType::Amiga => frequency::note_to_amiga_period(note as f32, relative_note),
    }
}

/// Volume-column commands that fire once, at the moment a row starts.
fn apply_volume_column_trigger(channel: &mut ChannelState, volume: VolumeColumn) {
    match volume {
        VolumeColumn::Volume(v) => channel.volume = v.min(64),
        VolumeColumn::Panning(p) => channel.panning = p,
        _ => {}
    }
}

/// Translate a decoded effect into the tagged `ActiveEffect` that
/// `apply_tick` will integrate every tick this row, resolving memory
/// as needed. Row-only effects (handled in `apply_row_effect`) map to
/// `ActiveEffect::None`.
fn active_effect_for(channel: &mut ChannelState, effect: Effect) -> ActiveEffect {
    let mem = &mut channel.memory;
    match effect {
        Effect::PortaUp(p) => ActiveEffect::PortaUp(EffectMemory::resolve(&mut mem.porta_up, p)),
        Effect::PortaDown(p) => ActiveEffect::PortaDown(EffectMemory::resolve(&mut mem.porta_down, p)),
        Effect::TonePorta(p) => {
            EffectMemory::resolve(&mut mem.tone_porta_speed, p);
            ActiveEffect::TonePorta
        }
        Effect::TonePortaVolSlide(p) => {
            ActiveEffect::TonePortaVolSlide(EffectMemory::resolve(&mut mem.volume_slide, p))
        }
        Effect::Vibrato { speed, depth } => {
            if speed != 0 {
                channel.vibrato.speed = speed;
            }
            if depth != 0 {
                channel.vibrato.depth = depth;
            }
            ActiveEffect::Vibrato
        }
        Effect::VibratoVolSlide(p) => {
            ActiveEffect::VibratoVolSlide(EffectMemory::resolve(&mut mem.volume_slide, p))
        }
        Effect::Tremolo { speed, depth } => {
            if speed != 0 {
                channel.tremolo.speed = speed;
            }
            if depth != 0 {
                channel.tremolo.depth = depth;
            }
            ActiveEffect::Tremolo
        }
        Effect::VolumeSlide(p) => {
            ActiveEffect::VolumeSlide(EffectMemory::resolve(&mut mem.volume_slide, p))
        }
        Effect::GlobalVolumeSlide(p) => {
            ActiveEffect::GlobalVolumeSlide(EffectMemory::resolve(&mut mem.global_volume_slide, p))
        }
        Effect::PanningSlide(p) => {
            ActiveEffect::PanningSlide(EffectMemory::resolve(&mut mem.panning_slide, p))
        }
        Effect::Tremor { on, off } => {
            let on = EffectMemory::resolve(&mut mem.tremor_on, on);
            let off = EffectMemory::resolve(&mut mem.tremor_off, off);
            channel.tremor_ticks_remaining = on;
            let _ = off;
            ActiveEffect::Tremor
        }
        Effect::MultiRetrig { interval, volume_change } => {
            let interval = EffectMemory::resolve(&mut mem.multi_retrig_interval, interval);
            if volume_change != 0 {
                mem.multi_retrig_volume_change = volume_change;
            }
            ActiveEffect::MultiRetrig { interval, volume_change: mem.multi_retrig_volume_change }
        }
        Effect::RetriggerNote(interval) => {
            let interval = EffectMemory::resolve(&mut mem.multi_retrig_interval, interval);
            ActiveEffect::MultiRetrig { interval, volume_change: 0 }
        }
        Effect::Arpeggio { x, y } => ActiveEffect::Arpeggio { x, y },
        _ => ActiveEffect::None,
    }
}

/// Effects that fire exactly once, at tick 0 of the row they appear on.
fn apply_row_effect(ctx: &mut Context, channel_index: usize, effect: Effect, intent: &mut RowIntent) {
    match effect {
        Effect::PositionJump(order) => intent.position_jump_order = Some(order as u16),
        Effect::PatternBreak(row) => intent.pattern_break_row = Some(row as u16),
        Effect::PatternDelay(extra_rows) => {
            intent.pattern_delay_extra_rows = Some(extra_rows as u16)
        }
        Effect::SetSpeed(tempo) => {
            if tempo > 0 {
                ctx.position.tempo = tempo as u16;
            }
        }
        Effect::SetBpm(bpm) => ctx.position.bpm = bpm as u16,
        Effect::SetVolume(v) => {
            if let Some(channel) = ctx.channels.get_mut(channel_index) {
                channel.volume = v.min(64);
            }
        }
        Effect::SetPanning(p) => {
            if let Some(channel) = ctx.channels.get_mut(channel_index) {
                channel.panning = p;
            }
        }
        Effect::SetGlobalVolume(v) => ctx.global.volume = v.min(64),
        Effect::SampleOffset(units) => {
            if let Some(channel) = ctx.channels.get_mut(channel_index) {
                let units = EffectMemory::resolve(&mut channel.memory.sample_offset, units);
                channel.sample_position = (units as u32) << 8 << xm_ir::MICROSTEP_BITS;
            }
        }
        Effect::FinePortaUp(p) => {
            let step = resolve_memory(ctx, channel_index, |m| &mut m.fine_porta_up, p) as f32;
            apply_porta(ctx, channel_index, -step);
        }
        Effect::FinePortaDown(p) => {
            let step = resolve_memory(ctx, channel_index, |m| &mut m.fine_porta_down, p) as f32;
            apply_porta(ctx, channel_index, step);
        }
        Effect::ExtraFinePortaUp(p) => {
            let step = resolve_memory(ctx, channel_index, |m| &mut m.extra_fine_porta_up, p) as f32;
            apply_porta(ctx, channel_index, -step / 4.0);
        }
        Effect::ExtraFinePortaDown(p) => {
            let step = resolve_memory(ctx, channel_index, |m| &mut m.extra_fine_porta_down, p) as f32;
            apply_porta(ctx, channel_index, step / 4.0);
        }
        Effect::FineVolumeSlideUp(p) => {
            let step = resolve_memory(ctx, channel_index, |m| &mut m.fine_volume_slide_up, p) as i16;
            apply_volume_delta(ctx, channel_index, step);
        }
        Effect::FineVolumeSlideDown(p) => {
            let step = resolve_memory(ctx, channel_index, |m| &mut m.fine_volume_slide_down, p) as i16;
            apply_volume_delta(ctx, channel_index, -step);
        }
        Effect::NoteCut(delay) => {
            if delay == 0 {
                if let Some(channel) = ctx.channels.get_mut(channel_index) {
                    channel.volume = 0;
                }
            }
        }
        Effect::KeyOff(_) => {
            if let Some(channel) = ctx.channels.get_mut(channel_index) {
                channel.key_off();
            }
        }
        Effect::SetFinetune(_) => {}
        Effect::PatternLoop(count) => {
            if let Some(channel) = ctx.channels.get_mut(channel_index) {
                if count == 0 {
                    channel.pattern_loop_origin = ctx.position.pattern_row;
                } else if channel.pattern_loop_count == 0 {
                    channel.pattern_loop_count = count;
                    intent.pattern_break_row = Some(channel.pattern_loop_origin);
                } else {
                    channel.pattern_loop_count -= 1;
                    if channel.pattern_loop_count > 0 {
                        intent.pattern_break_row = Some(channel.pattern_loop_origin);
                    }
                }
            }
        }
        _ => {}
    }
}

fn resolve_memory(ctx: &mut Context, channel_index: usize, field: impl Fn(&mut EffectMemory) -> &mut u8, param: u8) -> u8 {
    ctx.channels
        .get_mut(channel_index)
        .map(|c| EffectMemory::resolve(field(&mut c.memory), param))
        .unwrap_or(param)
}

fn apply_porta(ctx: &mut Context, channel_index: usize, delta: f32) {
    let frequency_type = ctx.module.frequency_type;
    if let Some(channel) = ctx.channels.get_mut(channel_index) {
        channel.period = frequency::clamp_period(frequency_type, channel.period + delta);
    }
}

fn apply_volume_delta(ctx: &mut Context, channel_index: usize, delta: i16) {
    if let Some(channel) = ctx.channels.get_mut(channel_index) {
        channel.volume = (channel.volume as i16 + delta).clamp(0, 64) as u8;
    }
}

/// Integrate the channel's currently active continuous effect by one
/// tick. Called for every tick, including tick 0.
pub fn apply_tick(ctx: &mut Context) {
    let tick = ctx.position.current_tick;
    apply_pending_note_delays(ctx, tick);

    let frequency_type = ctx.module.frequency_type;
    let instruments = &ctx.instruments;
    let global_volume = &mut ctx.global.volume;

    for channel in &mut ctx.channels {
        advance_fadeout(channel, instruments);
        advance_envelopes(channel, instruments);
        advance_autovibrato(channel, instruments);
        apply_active_effect(channel, frequency_type, tick, global_volume);
    }
}

fn channel_instrument<'a>(channel: &ChannelState, instruments: &'a [Instrument]) -> Option<&'a Instrument> {
    instruments.get(channel.instrument.checked_sub(1)? as usize)
}

fn advance_fadeout(channel: &mut ChannelState, instruments: &[Instrument]) {
    if channel.sustained || !channel.playing {
        return;
    }
    let fadeout = channel_instrument(channel, instruments)
        .map(|i| i.volume_fadeout)
        .unwrap_or(0);
    channel.fadeout_volume = channel.fadeout_volume.saturating_sub(fadeout);
}

/// Advance the volume/panning envelope frame counters by one tick,
/// applying loop wraparound and sustain clamping from the triggering
/// instrument's envelopes.
fn advance_envelopes(channel: &mut ChannelState, instruments: &[Instrument]) {
    let Some(instrument) = channel_instrument(channel, instruments) else {
        return;
    };
    channel.volume_envelope_frame = instrument
        .volume_envelope
        .advance_frame(channel.volume_envelope_frame.saturating_add(1), channel.sustained);
    channel.panning_envelope_frame = instrument
        .panning_envelope
        .advance_frame(channel.panning_envelope_frame.saturating_add(1), channel.sustained);
}

/// Autovibrato runs unconditionally every tick whenever the triggering
/// instrument declares a nonzero depth, independent of the channel's
/// active effect. `depth` ramps in linearly over `sweep` ticks since
/// the note was triggered; the result is stored in `autovibrato_offset`
/// and applied at mix time rather than folded into `period`, so it
/// never compounds with whatever else is adjusting `period` that tick.
fn advance_autovibrato(channel: &mut ChannelState, instruments: &[Instrument]) {
    let Some(instrument) = channel_instrument(channel, instruments) else {
        channel.autovibrato_offset = 0.0;
        return;
    };
    let autovibrato = &instrument.autovibrato;
    if autovibrato.depth == 0 {
        channel.autovibrato_offset = 0.0;
        return;
    }

    let swept_depth = if autovibrato.sweep == 0 {
        autovibrato.depth as i32
    } else {
        let ticks = channel.autovibrato_sweep_ticks.min(autovibrato.sweep as u16) as i32;
        autovibrato.depth as i32 * ticks / autovibrato.sweep as i32
    };

    let waveform = autovibrato_waveform(autovibrato.waveform);
    let value = oscillator_value(waveform, channel.autovibrato_phase) * swept_depth / 32;
    channel.autovibrato_offset = value as f32;

    channel.autovibrato_phase = channel.autovibrato_phase.wrapping_add(autovibrato.rate);
    channel.autovibrato_sweep_ticks = channel.autovibrato_sweep_ticks.saturating_add(1);
}

fn apply_active_effect(
    channel: &mut ChannelState,
    frequency_type: xm_ir::FrequencyType,
    tick: u16,
    global_volume: &mut u8,
) {
    match channel.active_effect {
        ActiveEffect::PortaUp(speed) => {
            channel.period = frequency::clamp_period(frequency_type, channel.period - speed as f32);
        }
        ActiveEffect::PortaDown(speed) => {
            channel.period = frequency::clamp_period(frequency_type, channel.period + speed as f32);
        }
        ActiveEffect::TonePorta => slide_toward_target(channel, frequency_type),
        ActiveEffect::TonePortaVolSlide(param) => {
            slide_toward_target(channel, frequency_type);
            slide_volume(channel, param);
        }
        ActiveEffect::Vibrato => apply_vibrato(channel, frequency_type),
        ActiveEffect::VibratoVolSlide(param) => {
            apply_vibrato(channel, frequency_type);
            slide_volume(channel, param);
        }
        ActiveEffect::Tremolo => apply_tremolo(channel),
        ActiveEffect::VolumeSlide(param) => slide_volume(channel, param),
        ActiveEffect::GlobalVolumeSlide(param) => slide_global_volume(global_volume, param),
        ActiveEffect::PanningSlide(param) => slide_panning(channel, param),
        ActiveEffect::Tremor => apply_tremor(channel),
        ActiveEffect::MultiRetrig { interval, volume_change } => {
            apply_multi_retrig(channel, interval, volume_change, tick)
        }
        ActiveEffect::Arpeggio { x, y } => apply_arpeggio(channel, frequency_type, x, y, tick),
        ActiveEffect::None => {}
    }
}

fn slide_global_volume(global_volume: &mut u8, param: u8) {
    let up = (param >> 4) & 0x0F;
    let down = param & 0x0F;
    let delta = if up > 0 { up as i16 } else { -(down as i16) };
    *global_volume = (*global_volume as i16 + delta).clamp(0, 64) as u8;
}

fn slide_toward_target(channel: &mut ChannelState, frequency_type: xm_ir::FrequencyType) {
    let speed = channel.memory.tone_porta_speed as f32;
    if channel.period < channel.porta_target_period {
        channel.period = (channel.period + speed).min(channel.porta_target_period);
    } else if channel.period > channel.porta_target_period {
        channel.period = (channel.period - speed).max(channel.porta_target_period);
    }
    channel.period = frequency::clamp_period(frequency_type, channel.period);
}

fn slide_volume(channel: &mut ChannelState, param: u8) {
    let up = (param >> 4) & 0x0F;
    let down = param & 0x0F;
    let delta = if up > 0 { up as i16 } else { -(down as i16) };
    channel.volume = (channel.volume as i16 + delta).clamp(0, 64) as u8;
}

fn slide_panning(channel: &mut ChannelState, param: u8) {
    let right = (param >> 4) & 0x0F;
    let left = param & 0x0F;
    let delta = if right > 0 { right as i16 } else { -(left as i16) };
    channel.panning = (channel.panning as i16 + delta * 4).clamp(0, 255) as u8;
}

const SINE_TABLE: [i32; 32] = [
    0, 24, 49, 74, 97, 120, 141, 161, 180, 197, 212, 224, 235, 244, 250, 253, 255, 253, 250, 244,
    235, 224, 212, 197, 180, 161, 141, 120, 97, 74, 49, 24,
];

fn oscillator_value(waveform: xm_ir::OscillatorWaveform, phase: u8) -> i32 {
    let step = (phase / 2) as usize % 32;
    let rising = phase % 4 < 2;
    let magnitude = match waveform {
        xm_ir::OscillatorWaveform::Sine => SINE_TABLE[step] as i32,
        xm_ir::OscillatorWaveform::RampDown => 255 - (phase as i32 % 64) * 255 / 64,
        xm_ir::OscillatorWaveform::Square => {
            if rising {
                255
            } else {
                0
            }
        }
        xm_ir::OscillatorWaveform::Random => SINE_TABLE[(phase as usize * 7) % 32] as i32,
    };
    let sign = if phase < 32 { 1 } else { -1 };
    sign * magnitude
}

/// Autovibrato declares its waveform in its own enum (same four shapes
/// as the effect-column oscillator) so it can share `oscillator_value`.
fn autovibrato_waveform(waveform: xm_ir::AutoVibratoWaveform) -> xm_ir::OscillatorWaveform {
    match waveform {
        xm_ir::AutoVibratoWaveform::Sine => xm_ir::OscillatorWaveform::Sine,
        xm_ir::AutoVibratoWaveform::RampDown => xm_ir::OscillatorWaveform::RampDown,
        xm_ir::AutoVibratoWaveform::Square => xm_ir::OscillatorWaveform::Square,
        xm_ir::AutoVibratoWaveform::Random => xm_ir::OscillatorWaveform::Random,
    }
}

fn apply_vibrato(channel: &mut ChannelState, frequency_type: xm_ir::FrequencyType) {
    let value = oscillator_value(channel.vibrato.waveform, channel.vibrato.phase) * channel.vibrato.depth as i32 / 32;
    channel.period = frequency::clamp_period(frequency_type, channel.orig_period + value as f32);
    channel.vibrato.phase = channel.vibrato.phase.wrapping_add(channel.vibrato.speed);
}

fn apply_tremolo(channel: &mut ChannelState) {
    let value = oscillator_value(channel.tremolo.waveform, channel.tremolo.phase) * channel.tremolo.depth as i32 / 32;
    channel.volume = (channel.volume as i32 + value / 4).clamp(0, 64) as u8;
    channel.tremolo.phase = channel.tremolo.phase.wrapping_add(channel.tremolo.speed);
}

fn apply_tremor(channel: &mut ChannelState) {
    if channel.tremor_ticks_remaining == 0 {
        channel.tremor_active = !channel.tremor_active;
        channel.tremor_ticks_remaining = if channel.tremor_active {
            channel.memory.tremor_on
        } else {
            channel.memory.tremor_off
        };
    } else {
        channel.tremor_ticks_remaining -= 1;
    }
}

fn apply_multi_retrig(channel: &mut ChannelState, interval: u8, volume_change: u8, tick: u16) {
    if interval == 0 {
        return;
    }
    if tick % interval as u16 == 0 {
        channel.sample_position = 0;
        apply_retrig_volume_change(channel, volume_change);
    }
}

fn apply_retrig_volume_change(channel: &mut ChannelState, code: u8) {
    let delta: i16 = match code {
        0x1 => -1,
        0x2 => -2,
        0x3 => -4,
        0x4 => -8,
        0x5 => -16,
        0x6 => -100,
        0x7 => -200,
        0x9 => 1,
        0xA => 2,
        0xB => 4,
        0xC => 8,
        0xD => 16,
        0xE => 100,
        0xF => 200,
        _ => 0,
    };
    if code == 0x6 {
        channel.volume = (channel.volume as i32 * 2 / 3) as u8;
    } else if code == 0x7 {
        channel.volume /= 2;
    } else if code == 0xE {
        channel.volume = (channel.volume as i32 * 3 / 2).min(64) as u8;
    } else if code == 0xF {
        channel.volume = (channel.volume as u16 * 2).min(64) as u8;
    } else {
        channel.volume = (channel.volume as i16 + delta).clamp(0, 64) as u8;
    }
}

fn apply_arpeggio(channel: &mut ChannelState, frequency_type: xm_ir::FrequencyType, x: u8, y: u8, tick: u16) {
    let semitone_offset = match tick % 3 {
        0 => 0,
        1 => x as i32,
        _ => y as i32,
    };
    let semitone_units = match frequency_type {
        xm_ir::FrequencyType::Linear => semitone_offset as f32 * 64.0,
        xm_ir::FrequencyType::Amiga => 0.0,
    };
    channel.period = match frequency_type {
        xm_ir::FrequencyType::Linear => {
            frequency::clamp_period(frequency_type, channel.orig_period - semitone_units)
        }
        xm_ir::FrequencyType::Amiga => channel.orig_period,
    };
}
