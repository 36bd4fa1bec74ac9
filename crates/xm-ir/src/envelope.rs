//! Volume/panning envelopes: up to 12 piecewise-linear points.

use arrayvec::ArrayVec;

/// Maximum breakpoints per envelope (XM hard limit).
pub const MAX_ENVELOPE_POINTS: usize = 12;

/// One envelope breakpoint: a frame (tick count since trigger) and a
/// value in `0..=64`. Points must be strictly ordered by frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnvelopePoint {
    pub frame: u16,
    pub value: u8,
}

/// A volume or panning envelope.
///
/// Invariants: `points.len() > MAX_ENVELOPE_POINTS` disables the
/// envelope; an out-of-range `sustain_point` or `loop_start_point`
/// disables sustain or loop respectively; `loop_start_point <=
/// loop_end_point`.
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    pub points: ArrayVec<EnvelopePoint, MAX_ENVELOPE_POINTS>,
    pub sustain_point: Option<u8>,
    pub loop_start_point: Option<u8>,
    pub loop_end_point: Option<u8>,
    pub enabled: bool,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance an envelope-tracking frame counter by one tick, applying
    /// loop-point wraparound and sustain clamping.
    ///
    /// `sustained` is false once the channel has received a key-off;
    /// while true, the frame counter is held at `sustain_point` instead
    /// of advancing past it.
    pub fn advance_frame(&self, frame: u16, sustained: bool) -> u16 {
        if !self.enabled || self.points.is_empty() {
            return frame;
        }

        if sustained {
            if let Some(sp) = self.sustain_point_frame() {
                if frame >= sp {
                    return sp;
                }
            }
        }

        if let (Some(start), Some(end)) = (self.loop_start_point_frame(), self.loop_end_point_frame()) {
            if frame >= end {
                return start;
            }
        }

        frame
    }

    /// Evaluate the envelope at `frame`, linearly interpolating between
    /// the bracketing points. Returns 32 (volume/panning midpoint) if
    /// the envelope is disabled or empty — the spec's documented
    /// default for both curve kinds used here (callers scale panning
    /// separately if they need a different default).
    pub fn value_at(&self, frame: u16) -> u8 {
        if !self.enabled || self.points.is_empty() {
            return 32;
        }

        let mut prev = self.points[0];
        for &point in self.points.iter() {
            if point.frame > frame {
                if point.frame == prev.frame {
                    return point.value;
                }
                let t = (frame - prev.frame) as i32;
                let d = (point.frame - prev.frame) as i32;
                let v = prev.value as i32
                    + (point.value as i32 - prev.value as i32) * t / d;
                return v as u8;
            }
            prev = point;
        }
        prev.value
    }

    fn sustain_point_frame(&self) -> Option<u16> {
        self.sustain_point
            .and_then(|idx| self.points.get(idx as usize))
            .map(|p| p.frame)
    }

    fn loop_start_point_frame(&self) -> Option<u16> {
        self.loop_start_point
            .and_then(|idx| self.points.get(idx as usize))
            .map(|p| p.frame)
    }

    fn loop_end_point_frame(&self) -> Option<u16> {
        self.loop_end_point
            .and_then(|idx| self.points.get(idx as usize))
            .map(|p| p.frame)
    }

    /// Validate `sustain_point`/`loop_start_point`/`loop_end_point`
    /// against the actual point count, disabling any that are
    /// out-of-range rather than rejecting the whole envelope.
    pub fn clamp_invariants(&mut self) {
        let n = self.points.len() as u8;
        if matches!(self.sustain_point, Some(p) if p >= n) {
            self.sustain_point = None;
        }
        let loop_valid = matches!(
            (self.loop_start_point, self.loop_end_point),
            (Some(s), Some(e)) if s < n && e < n && s <= e
        );
        if !loop_valid {
            self.loop_start_point = None;
            self.loop_end_point = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_point_envelope() -> Envelope {
        let mut env = Envelope::new();
        env.enabled = true;
        env.points.push(EnvelopePoint { frame: 0, value: 64 });
        env.points.push(EnvelopePoint { frame: 100, value: 0 });
        env
    }

    #[test]
    fn value_at_interpolates_linearly() {
        let env = two_point_envelope();
        assert_eq!(env.value_at(0), 64);
        assert_eq!(env.value_at(50), 32);
        assert_eq!(env.value_at(100), 0);
    }

    #[test]
    fn value_at_holds_past_last_point() {
        let env = two_point_envelope();
        assert_eq!(env.value_at(500), 0);
    }

    #[test]
    fn disabled_envelope_returns_midpoint_default() {
        let mut env = two_point_envelope();
        env.enabled = false;
        assert_eq!(env.value_at(50), 32);
    }

    #[test]
    fn advance_frame_loops_at_loop_end() {
        let mut env = two_point_envelope();
        env.points.push(EnvelopePoint { frame: 150, value: 10 });
        env.loop_start_point = Some(0);
        env.loop_end_point = Some(2);
        assert_eq!(env.advance_frame(150, true), 0);
        assert_eq!(env.advance_frame(10, true), 10);
    }

    #[test]
    fn advance_frame_clamps_at_sustain_while_sustained() {
        let mut env = two_point_envelope();
        env.sustain_point = Some(1);
        assert_eq!(env.advance_frame(100, true), 100);
        assert_eq!(env.advance_frame(150, true), 100);
        assert_eq!(env.advance_frame(150, false), 150);
    }

    #[test]
    fn clamp_invariants_disables_out_of_range_sustain() {
        let mut env = two_point_envelope();
        env.sustain_point = Some(5);
        env.clamp_invariants();
        assert_eq!(env.sustain_point, None);
    }

    #[test]
    fn clamp_invariants_disables_inverted_loop() {
        let mut env = two_point_envelope();
        env.loop_start_point = Some(1);
        env.loop_end_point = Some(0);
        env.clamp_invariants();
        assert_eq!(env.loop_start_point, None);
        assert_eq!(env.loop_end_point, None);
    }
}
