//! `Context`: the complete, contiguous playback state.
//!
//! Everything the scheduler and mixer touch during a tick lives here in
//! a handful of flat arenas — no per-entity heap allocation once a
//! module is loaded, so `generate_samples` can run allocation-free.

use alloc::vec::Vec;

use crate::channel::ChannelState;
use crate::instrument::Instrument;
use crate::module::Module;
use crate::pattern::Pattern;
use crate::sample::Sample;

/// Transport/scheduler state: where playback currently is in the song.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlaybackPosition {
    pub order_index: u16,
    pub pattern_row: u16,
    /// Ticks elapsed within the current row (0..tempo).
    pub current_tick: u16,
    /// Tempo in ticks/row (renamed "speed" in some trackers).
    pub tempo: u16,
    pub bpm: u16,
    /// Set by EEy; remaining rows to hold once reached.
    pub pattern_delay_rows_remaining: u16,
    pub has_looped: bool,
    pub loop_count: u32,
}

/// Global (non-per-channel) mixer state.
#[derive(Clone, Copy, Debug)]
pub struct GlobalState {
    /// 0..=64.
    pub volume: u8,
    pub max_loop_count: u32,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self { volume: 64, max_loop_count: 0 }
    }
}

/// The complete, owned state required to play a module: static song
/// data plus everything that changes tick to tick.
pub struct Context {
    pub module: Module,
    pub patterns: Vec<Pattern>,
    pub instruments: Vec<Instrument>,
    pub samples: Vec<Sample>,
    /// Shared waveform storage; every `Sample` is an offset + length
    /// into this one buffer.
    pub waveform: Vec<f32>,
    pub channels: Vec<ChannelState>,
    pub position: PlaybackPosition,
    pub global: GlobalState,
    /// Output sample rate in Hz, used to derive `ChannelState::step`.
    pub sample_rate: u32,
    /// Running output-frame counter since the last `reset`/`seek`.
    pub generated_frames: u64,
}

impl Context {
    pub fn new(module: Module, sample_rate: u32) -> Self {
        let num_channels = module.num_channels as usize;
        let mut position = PlaybackPosition::default();
        position.tempo = module.default_tempo.max(1) as u16;
        position.bpm = module.default_bpm.max(1) as u16;

        Self {
            module,
            patterns: Vec::new(),
            instruments: Vec::new(),
            samples: Vec::new(),
            waveform: Vec::new(),
            channels: (0..num_channels).map(|_| ChannelState::new()).collect(),
            position,
            global: GlobalState::default(),
            sample_rate,
            generated_frames: 0,
        }
    }

    pub fn pattern(&self, index: u8) -> Option<&Pattern> {
        self.patterns.get(index as usize)
    }

    pub fn current_pattern(&self) -> Option<&Pattern> {
        let pattern_index = self.module.pattern_at(self.position.order_index as usize)?;
        self.pattern(pattern_index)
    }

    /// Restore playback to the module's start, preserving loaded song
    /// data but clearing all transport and channel state.
    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }
        self.position = PlaybackPosition::default();
        self.position.tempo = self.module.default_tempo.max(1) as u16;
        self.position.bpm = self.module.default_bpm.max(1) as u16;
        self.global = GlobalState::default();
        self.generated_frames = 0;
    }

    pub fn mute_channel(&mut self, channel: usize, muted: bool) {
        if let Some(ch) = self.channels.get_mut(channel) {
            ch.muted = muted;
        }
    }

    pub fn mute_instrument(&mut self, instrument: u16, muted: bool) {
        for ch in &mut self.channels {
            if ch.instrument == instrument {
                ch.muted = muted;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_context_allocates_one_channel_state_per_module_channel() {
        let mut module = Module::default();
        module.num_channels = 4;
        module.default_tempo = 6;
        module.default_bpm = 125;
        let ctx = Context::new(module, 48_000);
        assert_eq!(ctx.channels.len(), 4);
        assert_eq!(ctx.position.tempo, 6);
        assert_eq!(ctx.position.bpm, 125);
    }

    #[test]
    fn reset_clears_transport_but_keeps_song_data() {
        let mut module = Module::default();
        module.num_channels = 2;
        module.default_tempo = 6;
        module.default_bpm = 125;
        let mut ctx = Context::new(module, 48_000);
        ctx.position.order_index = 5;
        ctx.generated_frames = 1000;
        ctx.channels[0].trigger(1, 0, 428.0);
        ctx.reset();
        assert_eq!(ctx.position.order_index, 0);
        assert_eq!(ctx.generated_frames, 0);
        assert!(!ctx.channels[0].playing);
        assert_eq!(ctx.module.num_channels, 2);
    }

    #[test]
    fn mute_instrument_mutes_every_channel_playing_it() {
        let mut module = Module::default();
        module.num_channels = 2;
        let mut ctx = Context::new(module, 48_000);
        ctx.channels[0].trigger(3, 0, 428.0);
        ctx.channels[1].trigger(4, 0, 428.0);
        ctx.mute_instrument(3, true);
        assert!(ctx.channels[0].muted);
        assert!(!ctx.channels[1].muted);
    }
}
