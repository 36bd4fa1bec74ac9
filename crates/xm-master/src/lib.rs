//! Headless controller for the xmplay XM engine.
//!
//! Wraps `xm_engine::Engine` behind the interface spec'd for external
//! collaborators: create a context from `.xm` or `libxm` bytes, pull
//! interleaved stereo frames, then destroy it. There is no
//! audio-device backend here — that boundary is out of scope, so a
//! caller wanting real-time playback owns its own device loop and
//! just keeps calling `generate_samples`.

mod wav;

use xm_engine::Engine;
use xm_format::{load_libxm, load_xm};
use xm_ir::{Context, LoadError, Module};

// Re-export common types so callers don't need xm-ir/xm-format directly.
pub use xm_ir::PlaybackPosition;
pub use xm_format::LibxmOptions as SerializeOptions;

pub use wav::{frames_to_wav, write_wav};

/// Headless tracker controller — owns a `Context` and its playback
/// engine.
pub struct Controller {
    engine: Engine,
}

impl Controller {
    /// A controller with nothing loaded: a silent, single-channel
    /// context at 48kHz.
    pub fn new() -> Self {
        Self {
            engine: Engine::new(Context::new(Module::default(), 48_000)),
        }
    }

    // --- Module management ---

    pub fn context(&self) -> &Context {
        &self.engine.context
    }

    /// Load a `.xm` binary, replacing whatever was previously loaded.
    pub fn create_from_xm(&mut self, data: &[u8], sample_rate: u32) -> Result<(), LoadError> {
        let ctx = load_xm(data, sample_rate)?;
        self.engine = Engine::new(ctx);
        Ok(())
    }

    /// Load a `libxm` compact dump. The sample rate was fixed at
    /// serialization time, so unlike `create_from_xm` there's no rate
    /// parameter here.
    pub fn create_from_libxm(&mut self, data: &[u8]) -> Result<(), LoadError> {
        let ctx = load_libxm(data)?;
        self.engine = Engine::new(ctx);
        Ok(())
    }

    /// Dump the currently loaded module to the `libxm` compact format.
    pub fn serialize_libxm(&self, options: SerializeOptions) -> Vec<u8> {
        xm_format::serialize_libxm(&self.engine.context, options)
    }

    /// Release the loaded module, returning to the empty default
    /// state `new()` starts in.
    pub fn destroy(&mut self) {
        *self = Self::new();
    }

    // --- Transport ---

    pub fn reset(&mut self) {
        self.engine.reset();
    }

    pub fn seek(&mut self, order: u16, row: u16, tick: u16) {
        self.engine.seek(order, row, tick);
    }

    pub fn set_max_loop_count(&mut self, n: u32) {
        self.engine.context.global.max_loop_count = n;
    }

    pub fn get_loop_count(&self) -> u32 {
        self.engine.context.position.loop_count
    }

    pub fn mute_channel(&mut self, channel: usize, muted: bool) {
        self.engine.context.mute_channel(channel, muted);
    }

    pub fn mute_instrument(&mut self, instrument: u16, muted: bool) {
        self.engine.context.mute_instrument(instrument, muted);
    }

    pub fn position(&self) -> PlaybackPosition {
        self.engine.context.position
    }

    /// Output frames generated since the last load, `reset`, or `seek`.
    pub fn frames_generated(&self) -> u64 {
        self.engine.context.generated_frames
    }

    // --- Sample generation ---

    /// Fill `out` (interleaved stereo) with freshly generated audio.
    pub fn generate_samples(&mut self, out: &mut [f32]) {
        self.engine.generate_samples(out);
    }

    #[cfg(feature = "alloc_check")]
    pub fn generate_samples_checked(&mut self, out: &mut [f32]) {
        self.engine.generate_samples_checked(out);
    }

    // --- Offline rendering ---

    /// Render up to `max_frames` stereo frames, stopping early if
    /// `max_loop_count` halts the engine first.
    pub fn render_frames(&mut self, max_frames: usize) -> Vec<f32> {
        const CHUNK_FRAMES: usize = 1024;
        let mut out = Vec::with_capacity(max_frames * 2);
        let mut scratch = [0.0f32; CHUNK_FRAMES * 2];

        let mut remaining = max_frames;
        while remaining > 0 && !self.engine.is_halted() {
            let chunk_frames = remaining.min(CHUNK_FRAMES);
            let chunk = &mut scratch[..chunk_frames * 2];
            self.engine.generate_samples(chunk);
            out.extend_from_slice(chunk);
            remaining -= chunk_frames;
        }
        out
    }

    pub fn render_to_wav(&mut self, max_seconds: u32) -> Vec<u8> {
        let sample_rate = self.engine.context.sample_rate;
        let max_frames = (sample_rate as usize) * (max_seconds as usize);
        let frames = self.render_frames(max_frames);
        wav::frames_to_wav(&frames, sample_rate)
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}
