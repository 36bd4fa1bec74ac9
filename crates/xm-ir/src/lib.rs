//! Core IR types for the tracker playback engine.
//!
//! This crate defines the intermediate representation shared by the
//! format loaders and the playback engine: a `Module` (static song
//! data), `Pattern`/`Instrument`/`Sample`/`Envelope` (its building
//! blocks), `ChannelState` (mutable per-channel playback state), and
//! `Context` (everything tied together into one flat, allocation-free
//! arena).
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod analysis;
mod channel;
mod context;
mod effects;
mod envelope;
mod error;
mod instrument;
mod module;
mod pattern;
mod sample;

pub use analysis::{analyze, ModuleFeatures};
pub use channel::{
    ActiveEffect, ChannelState, EffectMemory, Oscillator, OscillatorWaveform, MICROSTEP_BITS,
    RAMPING_POINTS,
};
pub use context::{Context, GlobalState, PlaybackPosition};
pub use effects::{Effect, VolumeColumn};
pub use envelope::{Envelope, EnvelopePoint, MAX_ENVELOPE_POINTS};
pub use error::LoadError;
pub use instrument::{
    AutoVibrato, AutoVibratoWaveform, Instrument, MAX_SAMPLES_PER_INSTRUMENT, NOTE_MAP_SIZE,
};
pub use module::{FrequencyType, Module, MAX_ORDER_LENGTH};
pub use pattern::{Note, Pattern, PatternSlot};
pub use sample::{LoopType, Sample};
