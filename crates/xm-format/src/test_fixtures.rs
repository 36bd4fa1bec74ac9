//! Hand-built minimal `.xm`/`libxm` byte buffers for tests.
//!
//! No real module files ship with this crate, so every test constructs
//! its own fixture the way the loader expects to read it: one pattern,
//! one instrument, one sample.

fn push_fixed_str(out: &mut Vec<u8>, s: &str, len: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(len);
    out.extend_from_slice(&bytes[..n]);
    out.extend(core::iter::repeat(0u8).take(len - n));
}

/// A minimal valid `.xm`: 2 channels, 1 pattern (1 row), 1 instrument
/// with 1 non-looping 8-bit sample, linear frequency table.
pub(crate) fn minimal_xm() -> Vec<u8> {
    let mut buf = Vec::new();

    // --- main header (60 bytes) ---
    buf.extend_from_slice(b"Extended Module: ");
    push_fixed_str(&mut buf, "test song", 20);
    buf.push(0x1A);
    push_fixed_str(&mut buf, "xm-format fixture", 20);
    buf.extend_from_slice(&0x0104u16.to_le_bytes());
    assert_eq!(buf.len(), 60);

    // --- song header (20 fixed bytes + 256-byte order table) ---
    buf.extend_from_slice(&276u32.to_le_bytes()); // header_size
    buf.extend_from_slice(&1u16.to_le_bytes()); // song_length
    buf.extend_from_slice(&0u16.to_le_bytes()); // restart_position
    buf.extend_from_slice(&2u16.to_le_bytes()); // num_channels
    buf.extend_from_slice(&1u16.to_le_bytes()); // num_patterns
    buf.extend_from_slice(&1u16.to_le_bytes()); // num_instruments
    buf.extend_from_slice(&1u16.to_le_bytes()); // flags: linear frequencies
    buf.extend_from_slice(&6u16.to_le_bytes()); // default_tempo
    buf.extend_from_slice(&125u16.to_le_bytes()); // default_bpm
    let mut order = [0u8; 256];
    order[0] = 0;
    buf.extend_from_slice(&order);
    assert_eq!(buf.len(), 60 + 276);

    // --- pattern 0: 1 row, 2 channels, both slots uncompressed ---
    let mut packed = Vec::new();
    packed.extend_from_slice(&[48, 1, 0, 0, 0]); // channel 0: note C-4-ish, instrument 1
    packed.extend_from_slice(&[0, 0, 0, 0, 0]); // channel 1: empty
    buf.extend_from_slice(&9u32.to_le_bytes()); // pattern header length
    buf.push(0); // packing type
    buf.extend_from_slice(&1u16.to_le_bytes()); // num_rows
    buf.extend_from_slice(&(packed.len() as u16).to_le_bytes()); // packed_size
    buf.extend_from_slice(&packed);

    // --- instrument 0 ---
    buf.extend_from_slice(&243u32.to_le_bytes()); // instrument header size
    push_fixed_str(&mut buf, "lead", 22);
    buf.push(0); // instrument type (unused)
    buf.extend_from_slice(&1u16.to_le_bytes()); // num_samples
    buf.extend_from_slice(&40u32.to_le_bytes()); // sample header size
    buf.extend_from_slice(&[0u8; 96]); // sample keymap (all -> sample 0)
    buf.extend_from_slice(&[0u8; 48]); // volume envelope points (disabled)
    buf.extend_from_slice(&[0u8; 48]); // panning envelope points (disabled)
    buf.push(0); // num volume points
    buf.push(0); // num panning points
    buf.push(0); // volume sustain point
    buf.push(0); // volume loop start point
    buf.push(0); // volume loop end point
    buf.push(0); // panning sustain point
    buf.push(0); // panning loop start point
    buf.push(0); // panning loop end point
    buf.push(0); // volume type (disabled)
    buf.push(0); // panning type (disabled)
    buf.push(0); // vibrato type
    buf.push(0); // vibrato sweep
    buf.push(0); // vibrato depth
    buf.push(0); // vibrato rate
    buf.extend_from_slice(&0u16.to_le_bytes()); // volume fadeout
    buf.extend_from_slice(&[0u8; 2]); // reserved

    // --- sample 0: 8-bit, no loop, 4 delta-coded bytes ---
    let sample_data = [10u8, (-5i8) as u8, 3, 2]; // decodes to 10, 5, 8, 10
    buf.extend_from_slice(&(sample_data.len() as u32).to_le_bytes()); // length (bytes)
    buf.extend_from_slice(&0u32.to_le_bytes()); // loop_start
    buf.extend_from_slice(&0u32.to_le_bytes()); // loop_length
    buf.push(64); // volume
    buf.push(0); // finetune
    buf.push(0); // sample type: 8-bit, no loop
    buf.push(128); // panning
    buf.push(0); // relative_note
    buf.push(0); // reserved
    push_fixed_str(&mut buf, "kick", 22);
    buf.extend_from_slice(&sample_data);

    buf
}
