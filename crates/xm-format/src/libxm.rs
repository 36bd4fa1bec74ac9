//! `libxm` compact serializer: a post-load dump of a `Context` for
//! embedded/read-only deployment, and its loader.
//!
//! The format is a short header (magic, ABI version, an endianness
//! marker written verbatim so a mismatched-endian build refuses to
//! load it) followed by the context's flat arrays concatenated in a
//! fixed order. Waveform data may optionally be re-delta-coded to
//! shrink the file; `LibxmOptions::zero_waveforms` instead emits a
//! template with the waveform bytes zeroed, for an embedded build that
//! supplies its own samples.

use xm_ir::{
    AutoVibrato, AutoVibratoWaveform, Context, Envelope, EnvelopePoint, FrequencyType, Instrument,
    LoadError, LoopType, Module, Note, Pattern, PatternSlot, Sample, MAX_ENVELOPE_POINTS,
    NOTE_MAP_SIZE,
};

use crate::delta;
use crate::reader::{write_fixed_string, Reader};

const MAGIC: &[u8; 4] = b"LIBX";
const ABI_VERSION: u8 = 1;
const ENDIAN_MARKER: u16 = 0xA55A;

const FLAG_DELTA_CODED: u8 = 0x1;
const FLAG_TEMPLATE: u8 = 0x2;

/// Options controlling how `serialize_libxm` writes the waveform blob.
#[derive(Clone, Copy, Debug, Default)]
pub struct LibxmOptions {
    /// Re-delta-code the waveform data (quantized to 16-bit) to shrink
    /// the file. Introduces quantization error, so it is off by
    /// default and not used by the round-trip audio-equality test.
    pub delta_code_waveform: bool,
    /// Emit a template: every waveform sample is written as zero.
    /// Structure (patterns, instruments, envelopes) is preserved so an
    /// embedded build can supply its own sample data out of band.
    pub zero_waveforms: bool,
}

/// Dump a loaded context to the `libxm` compact format.
pub fn serialize_libxm(ctx: &Context, options: LibxmOptions) -> Vec<u8> {
    let mut out = Vec::new();

    // A zeroed template is written as plain zero bytes regardless of
    // `delta_code_waveform`, so the flag byte must agree: template mode
    // always wins.
    let mut flags = 0u8;
    if options.delta_code_waveform && !options.zero_waveforms {
        flags |= FLAG_DELTA_CODED;
    }
    if options.zero_waveforms {
        flags |= FLAG_TEMPLATE;
    }

    out.extend_from_slice(MAGIC);
    out.push(ABI_VERSION);
    out.extend_from_slice(&ENDIAN_MARKER.to_le_bytes());
    out.push(flags);
    out.extend_from_slice(&ctx.sample_rate.to_le_bytes());
    out.push(ctx.module.num_channels);
    out.push(matches!(ctx.module.frequency_type, FrequencyType::Linear) as u8);
    out.extend_from_slice(&ctx.module.restart_position.to_le_bytes());
    out.push(ctx.module.default_tempo);
    out.push(ctx.module.default_bpm);
    write_fixed_string(&mut out, &ctx.module.name, 20);
    write_fixed_string(&mut out, &ctx.module.tracker_name, 20);

    out.extend_from_slice(&(ctx.module.order.len() as u16).to_le_bytes());
    out.extend_from_slice(&ctx.module.order);

    out.extend_from_slice(&(ctx.patterns.len() as u16).to_le_bytes());
    out.extend_from_slice(&(ctx.instruments.len() as u16).to_le_bytes());
    out.extend_from_slice(&(ctx.samples.len() as u16).to_le_bytes());
    out.extend_from_slice(&(ctx.waveform.len() as u32).to_le_bytes());

    for pattern in &ctx.patterns {
        write_pattern(&mut out, pattern, ctx.module.num_channels);
    }
    for instrument in &ctx.instruments {
        write_instrument(&mut out, instrument);
    }
    for sample in &ctx.samples {
        write_sample(&mut out, sample);
    }
    write_waveform(&mut out, &ctx.waveform, options);

    out
}

/// Load a `libxm`-format byte buffer into a ready-to-play context.
pub fn load_libxm(data: &[u8]) -> Result<Context, LoadError> {
    let mut r = Reader::new(data);

    if r.read_bytes(4)? != MAGIC {
        return Err(LoadError::BadLibxmHeader);
    }
    let abi_version = r.read_u8()?;
    if abi_version != ABI_VERSION {
        return Err(LoadError::BadLibxmHeader);
    }
    let endian_marker = r.read_u16_le()?;
    if endian_marker != ENDIAN_MARKER {
        return Err(LoadError::BadLibxmHeader);
    }
    let flags = r.read_u8()?;
    let delta_coded = flags & FLAG_DELTA_CODED != 0;

    let sample_rate = r.read_u32_le()?;
    let num_channels = r.read_u8()?;
    let frequency_type = if r.read_u8()? != 0 {
        FrequencyType::Linear
    } else {
        FrequencyType::Amiga
    };
    let restart_position = r.read_u16_le()?;
    let default_tempo = r.read_u8()?;
    let default_bpm = r.read_u8()?;
    let name = r.read_fixed_string(20)?;
    let tracker_name = r.read_fixed_string(20)?;

    let order_len = r.read_u16_le()?;
    let order_bytes = r.read_bytes(order_len as usize)?;

    let num_patterns = r.read_u16_le()?;
    let num_instruments = r.read_u16_le()?;
    let num_samples = r.read_u16_le()?;
    let waveform_len = r.read_u32_le()?;

    let mut module = Module::default();
    let _ = module.name.try_push_str(&name);
    let _ = module.tracker_name.try_push_str(&tracker_name);
    module.num_channels = num_channels;
    module.frequency_type = frequency_type;
    module.restart_position = restart_position;
    module.num_patterns = num_patterns;
    module.num_instruments = num_instruments;
    module.num_samples = num_samples;
    module.default_tempo = default_tempo;
    module.default_bpm = default_bpm;
    for &index in order_bytes {
        module.order.try_push(index).map_err(|_| LoadError::TooManyEntities)?;
    }

    let mut patterns = Vec::with_capacity(num_patterns as usize);
    for _ in 0..num_patterns {
        patterns.push(read_pattern(&mut r, num_channels)?);
    }

    let mut instruments = Vec::with_capacity(num_instruments as usize);
    for _ in 0..num_instruments {
        instruments.push(read_instrument(&mut r)?);
    }

    let mut samples = Vec::with_capacity(num_samples as usize);
    for _ in 0..num_samples {
        samples.push(read_sample(&mut r)?);
    }

    let waveform = read_waveform(&mut r, waveform_len, delta_coded)?;

    let mut ctx = Context::new(module, sample_rate);
    ctx.patterns = patterns;
    ctx.instruments = instruments;
    ctx.samples = samples;
    ctx.waveform = waveform;
    Ok(ctx)
}

fn write_pattern(out: &mut Vec<u8>, pattern: &Pattern, num_channels: u8) {
    out.extend_from_slice(&pattern.num_rows.to_le_bytes());
    for row in 0..pattern.num_rows {
        for &slot in pattern.row(row).iter().take(num_channels as usize) {
            out.push(slot.note.to_raw());
            out.push(slot.instrument);
            out.push(slot.volume_column);
            out.push(slot.effect_type);
            out.push(slot.effect_param);
        }
    }
}

fn read_pattern(r: &mut Reader, num_channels: u8) -> Result<Pattern, LoadError> {
    let num_rows = r.read_u16_le()?;
    let mut pattern = Pattern::new(num_rows, num_channels);
    for row in 0..pattern.num_rows {
        for channel in 0..num_channels {
            let note = Note::from_raw(r.read_u8()?);
            let instrument = r.read_u8()?;
            let volume_column = r.read_u8()?;
            let effect_type = r.read_u8()?;
            let effect_param = r.read_u8()?;
            *pattern.slot_mut(row, channel) = PatternSlot {
                note,
                instrument,
                volume_column,
                effect_type,
                effect_param,
            };
        }
    }
    Ok(pattern)
}

fn write_envelope(out: &mut Vec<u8>, envelope: &Envelope) {
    out.push(envelope.points.len() as u8);
    for point in &envelope.points {
        out.extend_from_slice(&point.frame.to_le_bytes());
        out.push(point.value);
    }
    out.push(envelope.sustain_point.unwrap_or(0xFF));
    out.push(envelope.loop_start_point.unwrap_or(0xFF));
    out.push(envelope.loop_end_point.unwrap_or(0xFF));
    out.push(envelope.enabled as u8);
}

fn read_envelope(r: &mut Reader) -> Result<Envelope, LoadError> {
    let num_points = r.read_u8()? as usize;
    if num_points > MAX_ENVELOPE_POINTS {
        return Err(LoadError::BadEnvelope);
    }
    let mut envelope = Envelope::new();
    for _ in 0..num_points {
        let frame = r.read_u16_le()?;
        let value = r.read_u8()?;
        envelope
            .points
            .try_push(EnvelopePoint { frame, value })
            .map_err(|_| LoadError::BadEnvelope)?;
    }
    let sustain = r.read_u8()?;
    let loop_start = r.read_u8()?;
    let loop_end = r.read_u8()?;
    envelope.enabled = r.read_u8()? != 0;
    envelope.sustain_point = (sustain != 0xFF).then_some(sustain);
    envelope.loop_start_point = (loop_start != 0xFF).then_some(loop_start);
    envelope.loop_end_point = (loop_end != 0xFF).then_some(loop_end);
    envelope.clamp_invariants();
    Ok(envelope)
}

fn write_instrument(out: &mut Vec<u8>, instrument: &Instrument) {
    write_fixed_string(out, &instrument.name, 22);
    out.extend_from_slice(&instrument.sample_base.to_le_bytes());
    out.push(instrument.num_samples);
    out.extend_from_slice(&instrument.sample_map);
    write_envelope(out, &instrument.volume_envelope);
    write_envelope(out, &instrument.panning_envelope);
    out.extend_from_slice(&instrument.volume_fadeout.to_le_bytes());
    out.push(instrument.autovibrato.waveform as u8);
    out.push(instrument.autovibrato.sweep);
    out.push(instrument.autovibrato.depth);
    out.push(instrument.autovibrato.rate);
}

fn read_instrument(r: &mut Reader) -> Result<Instrument, LoadError> {
    let name = r.read_fixed_string(22)?;
    let mut instrument = Instrument::new(&name);
    instrument.sample_base = r.read_u16_le()?;
    instrument.num_samples = r.read_u8()?;
    instrument.sample_map.copy_from_slice(r.read_bytes(NOTE_MAP_SIZE)?);
    instrument.volume_envelope = read_envelope(r)?;
    instrument.panning_envelope = read_envelope(r)?;
    instrument.volume_fadeout = r.read_u16_le()?;
    let waveform = match r.read_u8()? {
        0 => AutoVibratoWaveform::Sine,
        1 => AutoVibratoWaveform::RampDown,
        2 => AutoVibratoWaveform::Square,
        _ => AutoVibratoWaveform::Random,
    };
    instrument.autovibrato = AutoVibrato {
        waveform,
        sweep: r.read_u8()?,
        depth: r.read_u8()?,
        rate: r.read_u8()?,
    };
    Ok(instrument)
}

fn write_sample(out: &mut Vec<u8>, sample: &Sample) {
    write_fixed_string(out, &sample.name, 22);
    out.extend_from_slice(&sample.base.to_le_bytes());
    out.extend_from_slice(&sample.length.to_le_bytes());
    out.extend_from_slice(&sample.loop_start.to_le_bytes());
    out.extend_from_slice(&sample.loop_length.to_le_bytes());
    out.push(sample.loop_type as u8);
    out.push(sample.volume);
    out.push(sample.panning);
    out.push(sample.finetune as u8);
    out.push(sample.relative_note as u8);
}

fn read_sample(r: &mut Reader) -> Result<Sample, LoadError> {
    let name = r.read_fixed_string(22)?;
    let mut sample = Sample::new(&name);
    sample.base = r.read_u32_le()?;
    sample.length = r.read_u32_le()?;
    sample.loop_start = r.read_u32_le()?;
    sample.loop_length = r.read_u32_le()?;
    sample.loop_type = match r.read_u8()? {
        1 => LoopType::Forward,
        2 => LoopType::PingPong,
        _ => LoopType::None,
    };
    sample.volume = r.read_u8()?;
    sample.panning = r.read_u8()?;
    sample.finetune = r.read_i8()?;
    sample.relative_note = r.read_i8()?;
    Ok(sample)
}

fn write_waveform(out: &mut Vec<u8>, waveform: &[f32], options: LibxmOptions) {
    if options.zero_waveforms {
        out.extend(core::iter::repeat(0u8).take(waveform.len() * 4));
        return;
    }
    if options.delta_code_waveform {
        let quantized: Vec<i16> = waveform
            .iter()
            .map(|&v| (v.clamp(-1.0, 1.0) * 32767.0).round() as i16)
            .collect();
        let encoded = delta::encode_delta_16(&quantized);
        out.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        out.extend_from_slice(&encoded);
        return;
    }
    for &sample in waveform {
        out.extend_from_slice(&sample.to_le_bytes());
    }
}

fn read_waveform(r: &mut Reader, frame_count: u32, delta_coded: bool) -> Result<Vec<f32>, LoadError> {
    if delta_coded {
        let byte_len = r.read_u32_le()? as usize;
        let encoded = r.read_bytes(byte_len)?;
        let decoded = delta::decode_delta_16(encoded);
        Ok(decoded.iter().map(|&v| v as f32 / 32768.0).collect())
    } else {
        let raw = r.read_bytes(frame_count as usize * 4)?;
        Ok(raw
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xm::load_xm;
    use xm_engine::Engine;

    #[test]
    fn round_trip_without_delta_coding_is_bit_identical_audio() {
        let xm_bytes = crate::test_fixtures::minimal_xm();
        let ctx_direct = load_xm(&xm_bytes, 48_000).unwrap();

        let libxm_bytes = serialize_libxm(&ctx_direct, LibxmOptions::default());
        let ctx_roundtrip = load_libxm(&libxm_bytes).unwrap();

        let mut engine_direct = Engine::new(ctx_direct);
        let mut engine_roundtrip = Engine::new(ctx_roundtrip);

        let mut direct_out = [0.0f32; 512];
        let mut roundtrip_out = [0.0f32; 512];
        engine_direct.generate_samples(&mut direct_out);
        engine_roundtrip.generate_samples(&mut roundtrip_out);
        assert_eq!(direct_out, roundtrip_out);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = serialize_libxm(&Context::new(Module::default(), 48_000), LibxmOptions::default());
        bytes[0] = b'X';
        assert_eq!(load_libxm(&bytes).unwrap_err(), LoadError::BadLibxmHeader);
    }

    #[test]
    fn rejects_wrong_abi_version() {
        let mut bytes = serialize_libxm(&Context::new(Module::default(), 48_000), LibxmOptions::default());
        bytes[4] = 0xFF;
        assert_eq!(load_libxm(&bytes).unwrap_err(), LoadError::BadLibxmHeader);
    }

    #[test]
    fn rejects_mismatched_endian_marker() {
        let mut bytes = serialize_libxm(&Context::new(Module::default(), 48_000), LibxmOptions::default());
        bytes[5] = 0xA5;
        bytes[6] = 0x5A;
        assert_eq!(load_libxm(&bytes).unwrap_err(), LoadError::BadLibxmHeader);
    }

    #[test]
    fn zero_waveforms_option_emits_silent_template() {
        let xm_bytes = crate::test_fixtures::minimal_xm();
        let ctx = load_xm(&xm_bytes, 48_000).unwrap();
        let options = LibxmOptions { zero_waveforms: true, ..Default::default() };
        let libxm_bytes = serialize_libxm(&ctx, options);
        let reloaded = load_libxm(&libxm_bytes).unwrap();
        assert!(reloaded.waveform.iter().all(|&v| v == 0.0));
        assert_eq!(reloaded.waveform.len(), ctx.waveform.len());
    }

    #[test]
    fn delta_coded_waveform_round_trips_within_quantization_error() {
        let xm_bytes = crate::test_fixtures::minimal_xm();
        let ctx = load_xm(&xm_bytes, 48_000).unwrap();
        let options = LibxmOptions { delta_code_waveform: true, ..Default::default() };
        let libxm_bytes = serialize_libxm(&ctx, options);
        let reloaded = load_libxm(&libxm_bytes).unwrap();
        assert_eq!(reloaded.waveform.len(), ctx.waveform.len());
        for (a, b) in ctx.waveform.iter().zip(reloaded.waveform.iter()) {
            assert!((a - b).abs() < 1.0 / 32767.0 * 2.0);
        }
    }
}
