//! Per-channel playback state — the richest entity in the context.
//!
//! Follows the design note that a C-style "one byte doubles as current
//! parameter and memory" scheme should become two separate things in a
//! typed implementation: a fixed record of per-family *memory* bytes
//! (`EffectMemory`), and a tagged enum of whatever tick-driven effect is
//! *currently* active (`ActiveEffect`). Memory persists across rows;
//! the active effect is set fresh each time a row's effect column is
//! read.

use crate::pattern::PatternSlot;

/// Sub-sample fixed-point bits: `sample_position` packs
/// `(frame_index << MICROSTEP_BITS) | fraction`.
pub const MICROSTEP_BITS: u32 = 9;

/// Cross-fade length (in output frames) used to suppress clicks at
/// note triggers.
pub const RAMPING_POINTS: usize = 8;

/// 64-step oscillator waveform selector shared by vibrato and tremolo.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OscillatorWaveform {
    #[default]
    Sine,
    RampDown,
    Square,
    Random,
}

impl OscillatorWaveform {
    pub fn from_control_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => OscillatorWaveform::Sine,
            1 => OscillatorWaveform::RampDown,
            2 => OscillatorWaveform::Square,
            _ => OscillatorWaveform::Random,
        }
    }
}

/// Per-channel oscillator state for vibrato/tremolo.
#[derive(Clone, Copy, Debug, Default)]
pub struct Oscillator {
    pub waveform: OscillatorWaveform,
    /// If true (control bit 2), phase is not reset on a new note.
    pub inhibit_retrigger: bool,
    pub phase: u8,
    pub speed: u8,
    pub depth: u8,
}

/// Per-effect-family memory: the last nonzero parameter seen for that
/// family. A zero parameter on a later row reuses this value.
#[derive(Clone, Copy, Debug, Default)]
pub struct EffectMemory {
    pub porta_up: u8,
    pub porta_down: u8,
    pub fine_porta_up: u8,
    pub fine_porta_down: u8,
    pub extra_fine_porta_up: u8,
    pub extra_fine_porta_down: u8,
    pub tone_porta_speed: u8,
    pub volume_slide: u8,
    pub fine_volume_slide_up: u8,
    pub fine_volume_slide_down: u8,
    pub global_volume_slide: u8,
    pub panning_slide: u8,
    pub sample_offset: u8,
    pub multi_retrig_interval: u8,
    pub multi_retrig_volume_change: u8,
    pub pattern_loop_count: u8,
    pub tremor_on: u8,
    pub tremor_off: u8,
}

impl EffectMemory {
    /// Resolve `param`, falling back to `*mem` when zero, and persist
    /// whichever value is used back into `*mem`.
    pub fn resolve(mem: &mut u8, param: u8) -> u8 {
        let value = if param == 0 { *mem } else { param };
        *mem = value;
        value
    }
}

/// Whatever tick-driven effect is currently active on this channel,
/// re-derived from the row's effect column each time a new row plays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ActiveEffect {
    #[default]
    None,
    PortaUp(u8),
    PortaDown(u8),
    TonePorta,
    TonePortaVolSlide(u8),
    Vibrato,
    VibratoVolSlide(u8),
    Tremolo,
    VolumeSlide(u8),
    GlobalVolumeSlide(u8),
    PanningSlide(u8),
    Tremor,
    MultiRetrig { interval: u8, volume_change: u8 },
    Arpeggio { x: u8, y: u8 },
}

/// Mixing and effect state for a single tracker channel.
#[derive(Clone, Debug)]
pub struct ChannelState {
    /// 0 = no instrument assigned.
    pub instrument: u16,
    /// Resolved index into `Context::samples`; `u16::MAX` = none.
    pub sample: u16,
    pub playing: bool,
    pub muted: bool,

    /// Current pitch: 1/64-semitone units in linear mode, Amiga period
    /// in Amiga mode.
    pub period: f32,
    pub orig_period: f32,
    pub porta_target_period: f32,

    /// `(frame_index << MICROSTEP_BITS) | fraction`.
    pub sample_position: u32,
    /// Microsteps advanced per output frame.
    pub step: u32,
    pub loop_forward: bool,

    pub volume: u8,
    pub panning: u8,
    /// 0..=32768, decremented by `instrument.volume_fadeout` per tick
    /// after key-off.
    pub fadeout_volume: u16,
    /// False once a key-off has been received; gates envelope sustain.
    pub sustained: bool,

    pub volume_envelope_frame: u16,
    pub panning_envelope_frame: u16,

    pub vibrato: Oscillator,
    pub tremolo: Oscillator,
    pub autovibrato_phase: u8,
    pub autovibrato_sweep_ticks: u16,
    /// Current autovibrato period offset, applied at mix time on top of
    /// `period` rather than folded into it, so it never compounds across
    /// ticks the way a direct `period +=` would.
    pub autovibrato_offset: f32,

    /// Current tremor on/off latch (true = audible).
    pub tremor_active: bool,
    pub tremor_ticks_remaining: u8,

    pub pattern_loop_origin: u16,
    pub pattern_loop_count: u8,

    pub memory: EffectMemory,
    pub active_effect: ActiveEffect,
    /// Row held back by a note-delay effect: `(target tick, slot)`,
    /// replayed through the normal trigger path once the current tick
    /// reaches the target.
    pub pending_note_delay: Option<(u16, PatternSlot)>,

    /// Volume ramp target and the tail of the previous waveform, used
    /// to cross-fade across a trigger.
    pub ramp_target_volume: f32,
    pub ramp_current_volume: f32,
    pub end_of_previous_sample: [f32; RAMPING_POINTS],
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            instrument: 0,
            sample: u16::MAX,
            playing: false,
            muted: false,
            period: 0.0,
            orig_period: 0.0,
            porta_target_period: 0.0,
            sample_position: 0,
            step: 0,
            loop_forward: true,
            volume: 64,
            panning: 128,
            fadeout_volume: 32768,
            sustained: true,
            volume_envelope_frame: 0,
            panning_envelope_frame: 0,
            vibrato: Oscillator::default(),
            tremolo: Oscillator::default(),
            autovibrato_phase: 0,
            autovibrato_sweep_ticks: 0,
            autovibrato_offset: 0.0,
            tremor_active: true,
            tremor_ticks_remaining: 0,
            pattern_loop_origin: 0,
            pattern_loop_count: 0,
            memory: EffectMemory::default(),
            active_effect: ActiveEffect::None,
            pending_note_delay: None,
            ramp_target_volume: 1.0,
            ramp_current_volume: 1.0,
            end_of_previous_sample: [0.0; RAMPING_POINTS],
        }
    }
}

impl ChannelState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to initial state, preserving nothing (used by `Engine::reset`).
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Begin a new note: set position/instrument/sample and reset the
    /// envelope and fadeout trackers, but leave effect memory intact
    /// (memory persists across triggers).
    pub fn trigger(&mut self, instrument: u16, sample: u16, period: f32) {
        self.instrument = instrument;
        self.sample = sample;
        self.period = period;
        self.orig_period = period;
        self.sample_position = 0;
        self.loop_forward = true;
        self.playing = true;
        self.sustained = true;
        self.fadeout_volume = 32768;
        self.volume_envelope_frame = 0;
        self.panning_envelope_frame = 0;
        self.autovibrato_sweep_ticks = 0;
        self.tremor_active = true;
        if !self.vibrato.inhibit_retrigger {
            self.vibrato.phase = 0;
        }
        if !self.tremolo.inhibit_retrigger {
            self.tremolo.phase = 0;
        }
    }

    /// Key-off: release sustain so envelopes resume advancing/fading.
    pub fn key_off(&mut self) {
        self.sustained = false;
    }

    pub fn cut(&mut self) {
        self.playing = false;
        self.volume = 0;
    }
}
