//! Sample metadata.
//!
//! Waveform data itself lives in `Context::waveform`, one flat `f32`
//! buffer shared by every sample; a `Sample` is an offset + length into
//! it. This keeps the context's allocations to a fixed handful
//! (patterns, slots, instruments, samples, waveform, channels) rather
//! than one per sample, per the loader's layout requirement.

use arrayvec::ArrayString;

/// Sample loop mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopType {
    #[default]
    None,
    Forward,
    PingPong,
}

/// A sample's metadata: everything except the waveform bytes.
///
/// Invariant: `length <= u32::MAX >> MICROSTEP_BITS` so the fixed-point
/// sample position (`index << MICROSTEP_BITS | fraction`) cannot
/// overflow a `u32`.
#[derive(Clone, Debug)]
pub struct Sample {
    pub name: ArrayString<22>,
    /// Offset into `Context::waveform`.
    pub base: u32,
    /// Length in frames.
    pub length: u32,
    pub loop_start: u32,
    pub loop_length: u32,
    pub loop_type: LoopType,
    /// 0..=64.
    pub volume: u8,
    /// 0..=255 (128 = center).
    pub panning: u8,
    /// -16..=15, in 1/16-semitone units.
    pub finetune: i8,
    /// Offset from C-4 in semitones.
    pub relative_note: i8,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            name: ArrayString::new(),
            base: 0,
            length: 0,
            loop_start: 0,
            loop_length: 0,
            loop_type: LoopType::None,
            volume: 64,
            panning: 128,
            finetune: 0,
            relative_note: 0,
        }
    }
}

impl Sample {
    pub fn new(name: &str) -> Self {
        let mut sample = Self::default();
        let _ = sample.name.try_push_str(name);
        sample
    }

    pub fn loop_end(&self) -> u32 {
        self.loop_start + self.loop_length
    }

    pub fn has_loop(&self) -> bool {
        self.loop_type != LoopType::None && self.loop_length > 0
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}
