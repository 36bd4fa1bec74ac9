//! `.xm` binary loader.
//!
//! Parses a FastTracker II Extended Module file (version 0x0104+) into
//! a populated `xm_ir::Context`. The two fixed-size header records (the
//! 60-byte main header and the 20-byte fixed part of the song header)
//! are parsed with `binrw`; everything after them — packed patterns,
//! conditional instrument extensions, delta-coded sample data — is
//! variable-length or presence-bit-compressed and is walked with a
//! plain byte cursor instead.

use binrw::io::Cursor;
use binrw::{binrw, BinRead};

use xm_ir::{
    AutoVibrato, AutoVibratoWaveform, Context, Envelope, EnvelopePoint, FrequencyType, Instrument,
    LoadError, LoopType, Module, Note, Pattern, PatternSlot, Sample, MAX_ENVELOPE_POINTS,
    MAX_ORDER_LENGTH, MAX_SAMPLES_PER_INSTRUMENT, MICROSTEP_BITS, NOTE_MAP_SIZE,
};

use crate::delta;
use crate::reader::Reader;

const MAGIC: &[u8; 17] = b"Extended Module: ";
const MIN_VERSION: u16 = 0x0104;
const MAX_PATTERNS: usize = 256;
const MAX_INSTRUMENTS: usize = 128;
/// Longest sample buffer a `Sample` can address without overflowing the
/// fixed-point `(index << MICROSTEP_BITS) | fraction` position.
const MAX_SAMPLE_FRAMES: u64 = (u32::MAX as u64) >> MICROSTEP_BITS;

#[binrw]
#[brw(little)]
struct FileHeader {
    magic: [u8; 17],
    name: [u8; 20],
    _marker: u8,
    tracker_name: [u8; 20],
    version: u16,
}

#[binrw]
#[brw(little)]
struct SongHeaderFixed {
    header_size: u32,
    song_length: u16,
    restart_position: u16,
    num_channels: u16,
    num_patterns: u16,
    num_instruments: u16,
    flags: u16,
    default_tempo: u16,
    default_bpm: u16,
}

fn fixed_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim_end().into()
}

/// Parse a `.xm` byte buffer into a ready-to-play context.
pub fn load_xm(data: &[u8], sample_rate: u32) -> Result<Context, LoadError> {
    if data.len() < 60 {
        return Err(LoadError::Truncated);
    }
    let mut cursor = Cursor::new(&data[0..60]);
    let header = FileHeader::read(&mut cursor).map_err(|_| LoadError::Truncated)?;
    if &header.magic != MAGIC {
        return Err(LoadError::BadMagic);
    }
    if header.version < MIN_VERSION {
        return Err(LoadError::UnsupportedVersion);
    }

    if data.len() < 80 {
        return Err(LoadError::Truncated);
    }
    let mut cursor = Cursor::new(&data[60..80]);
    let song = SongHeaderFixed::read(&mut cursor).map_err(|_| LoadError::Truncated)?;

    if song.num_channels == 0 || song.num_channels > 255 {
        return Err(LoadError::TooManyChannels);
    }
    if song.song_length as usize > MAX_ORDER_LENGTH
        || song.num_patterns as usize > MAX_PATTERNS
        || song.num_instruments as usize > MAX_INSTRUMENTS
    {
        return Err(LoadError::TooManyEntities);
    }

    let order_offset = 80;
    if data.len() < order_offset + MAX_ORDER_LENGTH {
        return Err(LoadError::Truncated);
    }
    let order_bytes = &data[order_offset..order_offset + MAX_ORDER_LENGTH];

    let mut module = Module::default();
    let _ = module.name.try_push_str(&fixed_str(&header.name));
    let _ = module.tracker_name.try_push_str(&fixed_str(&header.tracker_name));
    module.num_channels = song.num_channels as u8;
    module.frequency_type = if song.flags & 0x1 != 0 {
        FrequencyType::Linear
    } else {
        FrequencyType::Amiga
    };
    module.restart_position = song.restart_position;
    module.num_patterns = song.num_patterns;
    module.num_instruments = song.num_instruments;
    module.default_tempo = (song.default_tempo.max(1).min(31)) as u8;
    module.default_bpm = (song.default_bpm.max(32).min(255)) as u8;

    for &raw_index in order_bytes.iter().take(song.song_length as usize) {
        let clamped = if (raw_index as u16) < song.num_patterns.max(1) {
            raw_index
        } else {
            0
        };
        module.order.try_push(clamped).map_err(|_| LoadError::TooManyEntities)?;
    }
    if module.restart_position as usize >= module.order.len().max(1) {
        module.restart_position = 0;
    }

    let base = 60 + song.header_size as usize;
    let body_start = base.max(order_offset + MAX_ORDER_LENGTH);

    let mut reader = Reader::new(data);
    reader.seek(body_start);

    let mut patterns = Vec::with_capacity(song.num_patterns as usize);
    for _ in 0..song.num_patterns {
        patterns.push(read_pattern(&mut reader, module.num_channels)?);
    }

    let mut instruments = Vec::with_capacity(song.num_instruments as usize);
    let mut samples = Vec::new();
    let mut waveform = Vec::new();
    for _ in 0..song.num_instruments {
        instruments.push(read_instrument(&mut reader, &mut samples, &mut waveform)?);
    }

    let mut ctx = Context::new(module, sample_rate);
    ctx.module.num_samples = samples.len() as u16;
    ctx.patterns = patterns;
    ctx.instruments = instruments;
    ctx.samples = samples;
    ctx.waveform = waveform;
    Ok(ctx)
}

fn read_pattern(reader: &mut Reader, num_channels: u8) -> Result<Pattern, LoadError> {
    let header_start = reader.pos();
    let header_len = reader.read_u32_le()?;
    let _packing_type = reader.read_u8()?;
    let num_rows = reader.read_u16_le()?;
    let packed_size = reader.read_u16_le()?;

    reader.seek(header_start + header_len as usize);
    let packed = reader.read_bytes(packed_size as usize)?;

    let mut pattern = Pattern::new(num_rows, num_channels);
    let mut slot_reader = Reader::new(packed);
    for row in 0..pattern.num_rows {
        for channel in 0..num_channels {
            *pattern.slot_mut(row, channel) = decode_slot(&mut slot_reader)?;
        }
    }
    Ok(pattern)
}

/// Decode one presence-bit-compressed pattern slot.
///
/// If the first byte has its MSB set, its low five bits say which of
/// note/instrument/volume/effect-type/effect-param follow in the
/// stream; absent fields default to zero. Otherwise the byte itself is
/// the note and all four remaining fields follow unconditionally.
fn decode_slot(r: &mut Reader) -> Result<PatternSlot, LoadError> {
    let first = r.read_u8()?;
    let mut slot = PatternSlot::empty();

    if first & 0x80 != 0 {
        if first & 0x01 != 0 {
            slot.note = Note::from_raw(r.read_u8()?);
        }
        if first & 0x02 != 0 {
            slot.instrument = r.read_u8()?;
        }
        if first & 0x04 != 0 {
            slot.volume_column = r.read_u8()?;
        }
        if first & 0x08 != 0 {
            slot.effect_type = r.read_u8()?;
        }
        if first & 0x10 != 0 {
            slot.effect_param = r.read_u8()?;
        }
    } else {
        slot.note = Note::from_raw(first);
        slot.instrument = r.read_u8()?;
        slot.volume_column = r.read_u8()?;
        slot.effect_type = r.read_u8()?;
        slot.effect_param = r.read_u8()?;
    }
    Ok(slot)
}

struct RawSampleMeta {
    length: u32,
    loop_start: u32,
    loop_length: u32,
    volume: u8,
    finetune: i8,
    sample_type: u8,
    panning: u8,
    relative_note: i8,
    name: String,
}

fn read_instrument(
    reader: &mut Reader,
    samples: &mut Vec<Sample>,
    waveform: &mut Vec<f32>,
) -> Result<Instrument, LoadError> {
    let header_start = reader.pos();
    let header_size = reader.read_u32_le()?;
    let name = reader.read_fixed_string(22)?;
    let _instrument_type = reader.read_u8()?;
    let num_samples = reader.read_u16_le()?;

    if num_samples as usize > MAX_SAMPLES_PER_INSTRUMENT {
        return Err(LoadError::TooManyEntities);
    }

    let mut instrument = Instrument::new(&name);
    instrument.num_samples = num_samples as u8;
    instrument.sample_base = samples.len() as u16;

    if num_samples == 0 {
        reader.seek(header_start + header_size as usize);
        return Ok(instrument);
    }

    let _sample_header_size = reader.read_u32_le()?;

    let sample_map = reader.read_bytes(NOTE_MAP_SIZE)?;
    let max_slot = num_samples.saturating_sub(1) as u8;
    for (i, &raw) in sample_map.iter().enumerate() {
        instrument.sample_map[i] = raw.min(max_slot);
    }

    let volume_points = read_envelope_points(reader)?;
    let panning_points = read_envelope_points(reader)?;

    let num_volume_points = reader.read_u8()?;
    let num_panning_points = reader.read_u8()?;
    let volume_sustain = reader.read_u8()?;
    let volume_loop_start = reader.read_u8()?;
    let volume_loop_end = reader.read_u8()?;
    let panning_sustain = reader.read_u8()?;
    let panning_loop_start = reader.read_u8()?;
    let panning_loop_end = reader.read_u8()?;
    let volume_type = reader.read_u8()?;
    let panning_type = reader.read_u8()?;
    let vibrato_type = reader.read_u8()?;
    let vibrato_sweep = reader.read_u8()?;
    let vibrato_depth = reader.read_u8()?;
    let vibrato_rate = reader.read_u8()?;
    let volume_fadeout = reader.read_u16_le()?;
    reader.skip(2)?;

    instrument.volume_envelope = build_envelope(
        &volume_points,
        num_volume_points,
        volume_type,
        volume_sustain,
        volume_loop_start,
        volume_loop_end,
    )?;
    instrument.panning_envelope = build_envelope(
        &panning_points,
        num_panning_points,
        panning_type,
        panning_sustain,
        panning_loop_start,
        panning_loop_end,
    )?;
    instrument.volume_fadeout = volume_fadeout;
    instrument.autovibrato = AutoVibrato {
        waveform: match vibrato_type & 0x3 {
            0 => AutoVibratoWaveform::Sine,
            1 => AutoVibratoWaveform::RampDown,
            2 => AutoVibratoWaveform::Square,
            _ => AutoVibratoWaveform::Random,
        },
        sweep: vibrato_sweep,
        depth: vibrato_depth,
        rate: vibrato_rate,
    };

    reader.seek(header_start + header_size as usize);

    let mut metas = Vec::with_capacity(num_samples as usize);
    for _ in 0..num_samples {
        metas.push(read_sample_header(reader)?);
    }
    for meta in metas {
        samples.push(finish_sample(reader, meta, waveform)?);
    }

    Ok(instrument)
}

fn read_envelope_points(reader: &mut Reader) -> Result<[EnvelopePoint; MAX_ENVELOPE_POINTS], LoadError> {
    let mut points = [EnvelopePoint::default(); MAX_ENVELOPE_POINTS];
    for point in points.iter_mut() {
        point.frame = reader.read_u16_le()?;
        point.value = reader.read_u16_le()? as u8;
    }
    Ok(points)
}

fn build_envelope(
    points: &[EnvelopePoint; MAX_ENVELOPE_POINTS],
    num_points: u8,
    env_type: u8,
    sustain: u8,
    loop_start: u8,
    loop_end: u8,
) -> Result<Envelope, LoadError> {
    if num_points as usize > MAX_ENVELOPE_POINTS {
        return Err(LoadError::BadEnvelope);
    }
    let mut envelope = Envelope::new();
    for &point in points.iter().take(num_points as usize) {
        envelope.points.try_push(point).map_err(|_| LoadError::BadEnvelope)?;
    }
    envelope.enabled = env_type & 0x1 != 0;
    if env_type & 0x2 != 0 {
        envelope.sustain_point = Some(sustain);
    }
    if env_type & 0x4 != 0 {
        envelope.loop_start_point = Some(loop_start);
        envelope.loop_end_point = Some(loop_end);
    }
    envelope.clamp_invariants();
    Ok(envelope)
}

fn read_sample_header(reader: &mut Reader) -> Result<RawSampleMeta, LoadError> {
    let length = reader.read_u32_le()?;
    let loop_start = reader.read_u32_le()?;
    let loop_length = reader.read_u32_le()?;
    let volume = reader.read_u8()?;
    let finetune = reader.read_i8()?;
    let sample_type = reader.read_u8()?;
    let panning = reader.read_u8()?;
    let relative_note = reader.read_i8()?;
    reader.skip(1)?;
    let name = reader.read_fixed_string(22)?;
    Ok(RawSampleMeta {
        length,
        loop_start,
        loop_length,
        volume,
        finetune,
        sample_type,
        panning,
        relative_note,
        name,
    })
}

/// `meta.sample_type` bit 4 selects 16-bit samples; bits 0-1 select the
/// loop mode (0 none, 1 forward, 2 ping-pong; 3 is reserved and treated
/// as no-loop).
fn finish_sample(
    reader: &mut Reader,
    meta: RawSampleMeta,
    waveform: &mut Vec<f32>,
) -> Result<Sample, LoadError> {
    let is_16bit = meta.sample_type & 0x10 != 0;
    let raw = reader.read_bytes(meta.length as usize)?;

    let base = waveform.len() as u32;
    let frame_count = if is_16bit {
        let decoded = delta::decode_delta_16(raw);
        waveform.extend(decoded.iter().map(|&v| v as f32 / 32768.0));
        decoded.len() as u32
    } else {
        let decoded = delta::decode_delta_8(raw);
        waveform.extend(decoded.iter().map(|&v| v as f32 / 128.0));
        decoded.len() as u32
    };

    if frame_count as u64 > MAX_SAMPLE_FRAMES {
        return Err(LoadError::BadSample);
    }

    let byte_divisor = if is_16bit { 2 } else { 1 };
    let loop_start = meta.loop_start / byte_divisor;
    let loop_length = meta.loop_length / byte_divisor;
    if loop_start as u64 + loop_length as u64 > frame_count as u64 {
        return Err(LoadError::BadSample);
    }

    let mut sample = Sample::new(&meta.name);
    sample.base = base;
    sample.length = frame_count;
    sample.loop_start = loop_start;
    sample.loop_length = loop_length;
    sample.loop_type = match meta.sample_type & 0x3 {
        1 => LoopType::Forward,
        2 => LoopType::PingPong,
        _ => LoopType::None,
    };
    sample.volume = meta.volume.min(64);
    sample.panning = meta.panning;
    sample.finetune = (meta.finetune as i32 / 8).clamp(-16, 15) as i8;
    sample.relative_note = meta.relative_note;
    Ok(sample)
}
