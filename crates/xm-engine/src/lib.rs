//! Tick scheduler, effect processor and sample generator for the xmplay
//! XM playback engine.
//!
//! `xm_ir` owns the data model; this crate owns the behavior that turns
//! a loaded `Context` into audio, one output frame at a time.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod effects;
pub mod frequency;
pub mod mixer;
pub mod scheduler;

pub use effects::{trigger_slot, RowIntent};
pub use frequency::{
    amiga_period_to_frequency, clamp_period, linear_period_to_frequency, note_to_amiga_period,
    note_to_linear_period, period_to_frequency, period_to_step, AMIGA_PERIOD_MAX, AMIGA_PERIOD_MIN,
    LINEAR_PERIOD_MIN, LINEAR_PERIOD_MAX,
};
pub use mixer::Engine;
pub use scheduler::{on_tick, TickKind};
