//! Read-only summary statistics over a loaded module.
//!
//! Useful for quick sanity checks on a freshly loaded file and for the
//! CLI's `--info` output; not used by the scheduler or mixer.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::effects::Effect;
use crate::module::Module;
use crate::pattern::{Note, Pattern};

/// Aggregate statistics gathered by walking every pattern referenced by
/// a module's order table.
#[derive(Clone, Debug, Default)]
pub struct ModuleFeatures {
    pub total_rows: u32,
    pub total_notes: u32,
    pub note_range: Option<(u8, u8)>,
    pub instruments_used: u32,
    pub effects_used: Vec<Effect>,
    pub has_key_off: bool,
    pub has_volume_column: bool,
    pub distinct_patterns_played: u32,
}

impl ModuleFeatures {
    fn record_note(&mut self, note: u8) {
        self.total_notes += 1;
        self.note_range = Some(match self.note_range {
            Some((lo, hi)) => (lo.min(note), hi.max(note)),
            None => (note, note),
        });
    }

    fn record_effect(&mut self, effect: Effect) {
        if effect == Effect::None {
            return;
        }
        if !self.effects_used.contains(&effect) {
            self.effects_used.push(effect);
        }
    }
}

impl fmt::Display for ModuleFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "rows: {}", self.total_rows)?;
        writeln!(f, "notes: {}", self.total_notes)?;
        if let Some((lo, hi)) = self.note_range {
            writeln!(f, "note range: {lo}-{hi}")?;
        }
        writeln!(f, "instruments used: {}", self.instruments_used)?;
        writeln!(f, "distinct effects: {}", self.effects_used.len())?;
        writeln!(f, "key-off present: {}", self.has_key_off)?;
        write!(f, "volume column present: {}", self.has_volume_column)
    }
}

/// Walk every pattern reachable through `module`'s order table and
/// collect summary statistics.
pub fn analyze(module: &Module, patterns: &[Pattern]) -> ModuleFeatures {
    let mut features = ModuleFeatures::default();
    let mut instruments_seen: Vec<u8> = Vec::new();
    let mut patterns_seen: Vec<u8> = Vec::new();

    for position in 0..module.length() {
        let Some(pattern_index) = module.pattern_at(position) else {
            continue;
        };
        if !patterns_seen.contains(&pattern_index) {
            patterns_seen.push(pattern_index);
        }
        let Some(pattern) = patterns.get(pattern_index as usize) else {
            continue;
        };
        features.total_rows += pattern.num_rows as u32;

        for row in 0..pattern.num_rows {
            for slot in pattern.row(row) {
                match slot.note {
                    Note::On(n) => features.record_note(n),
                    Note::Off => features.has_key_off = true,
                    Note::None => {}
                }
                if slot.instrument != 0 && !instruments_seen.contains(&slot.instrument) {
                    instruments_seen.push(slot.instrument);
                }
                if slot.volume_column != 0 {
                    features.has_volume_column = true;
                }
                features.record_effect(Effect::decode(slot.effect_type, slot.effect_param));
            }
        }
    }

    features.instruments_used = instruments_seen.len() as u32;
    features.distinct_patterns_played = patterns_seen.len() as u32;
    features
}

/// Render a module's feature summary as a display-ready string.
pub fn summarize(module: &Module, patterns: &[Pattern]) -> String {
    analyze(module, patterns).to_string()
}
