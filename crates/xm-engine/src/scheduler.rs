//! Pattern/tick scheduler: `OnTick` state-machine per spec 4.3.
//!
//! Driven once per tick boundary by the mixer. Reads the current row
//! when `current_tick == 0`, otherwise does nothing itself (per-tick
//! effect updates are the effect processor's job, run by the mixer
//! right after `on_tick` returns).

use xm_ir::{Context, PatternSlot};

use crate::effects::{self, RowIntent};

/// What the scheduler decided to do this tick, for the mixer/effect
/// processor to act on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TickKind {
    #[default]
    SameRow,
    NewRow,
    Halted,
}

/// Advance the transport by exactly one tick and, if this tick starts
/// a new row, trigger that row's notes/instruments and feed its
/// effect columns to the effect processor for per-row dispatch.
///
/// Returns what kind of tick this was; `Halted` means `max_loop_count`
/// was reached and the caller should stop requesting samples.
pub fn on_tick(ctx: &mut Context) -> TickKind {
    if ctx.global.max_loop_count > 0 && ctx.position.loop_count >= ctx.global.max_loop_count {
        return TickKind::Halted;
    }

    let is_new_row = ctx.position.current_tick == 0;
    let mut intent = RowIntent::default();

    if is_new_row {
        if ctx.position.pattern_delay_rows_remaining > 0 {
            ctx.position.pattern_delay_rows_remaining -= 1;
        } else {
            execute_row(ctx, &mut intent);
        }
    }
    effects::apply_tick(ctx);

    ctx.position.current_tick += 1;
    if ctx.position.current_tick >= ctx.position.tempo {
        ctx.position.current_tick = 0;
        advance_row(ctx, intent);
    }

    if ctx.global.max_loop_count > 0 && ctx.position.loop_count >= ctx.global.max_loop_count {
        TickKind::Halted
    } else if is_new_row {
        TickKind::NewRow
    } else {
        TickKind::SameRow
    }
}

/// Trigger every channel's slot for the current row and run tick-0
/// (row) effects, recording any jump/break/delay/loop request.
fn execute_row(ctx: &mut Context, intent: &mut RowIntent) {
    let Some(pattern_index) = ctx.module.pattern_at(ctx.position.order_index as usize) else {
        return;
    };
    let Some(pattern) = ctx.patterns.get(pattern_index as usize) else {
        return;
    };
    let row = ctx.position.pattern_row.min(pattern.num_rows.saturating_sub(1));
    let num_channels = pattern.num_channels() as usize;

    let mut slots: heapless::Vec<PatternSlot, 64> = heapless::Vec::new();
    for slot in pattern.row(row).iter().take(num_channels.min(64)) {
        let _ = slots.push(*slot);
    }

    for (channel_index, slot) in slots.iter().enumerate() {
        effects::trigger_slot(ctx, channel_index, slot, intent);
    }
}

/// Apply the result of a completed row (jump/break/delay/loop) and
/// advance to the next row, pattern, or order-table wraparound.
fn advance_row(ctx: &mut Context, intent: RowIntent) {
    if let Some(delay_rows) = intent.pattern_delay_extra_rows {
        ctx.position.pattern_delay_rows_remaining = delay_rows;
    }

    if let Some(order) = intent.position_jump_order {
        ctx.position.order_index = order;
        ctx.position.pattern_row = intent.pattern_break_row.unwrap_or(0);
        normalize_row_overflow(ctx);
        wrap_order(ctx);
        return;
    }

    if let Some(break_row) = intent.pattern_break_row {
        ctx.position.order_index = ctx.position.order_index.wrapping_add(1);
        ctx.position.pattern_row = break_row;
        normalize_row_overflow(ctx);
        wrap_order(ctx);
        return;
    }

    ctx.position.pattern_row += 1;
    let num_rows = ctx
        .current_pattern()
        .map(|p| p.num_rows)
        .unwrap_or(1);
    if ctx.position.pattern_row >= num_rows {
        ctx.position.order_index = ctx.position.order_index.wrapping_add(1);
        ctx.position.pattern_row = 0;
        wrap_order(ctx);
    }
}

/// A destination pattern may be shorter than the break-row target; FT2
/// wraps that case to row 0 rather than clamping.
fn normalize_row_overflow(ctx: &mut Context) {
    wrap_order(ctx);
    if let Some(num_rows) = ctx.current_pattern().map(|p| p.num_rows) {
        if ctx.position.pattern_row >= num_rows {
            ctx.position.pattern_row = 0;
        }
    }
}

fn wrap_order(ctx: &mut Context) {
    if ctx.position.order_index as usize >= ctx.module.length() {
        ctx.position.order_index = ctx.module.restart_position;
        ctx.position.loop_count += 1;
        ctx.position.has_looped = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xm_ir::{Module, Pattern};

    fn two_row_context() -> Context {
        let mut module = Module::default();
        module.num_channels = 1;
        module.default_tempo = 2;
        module.order.push(0);
        module.num_patterns = 1;
        let mut ctx = Context::new(module, 48_000);
        ctx.patterns.push(Pattern::new(2, 1));
        ctx
    }

    #[test]
    fn ticks_advance_row_after_tempo_ticks() {
        let mut ctx = two_row_context();
        assert_eq!(on_tick(&mut ctx), TickKind::NewRow);
        assert_eq!(ctx.position.pattern_row, 0);
        assert_eq!(on_tick(&mut ctx), TickKind::SameRow);
        assert_eq!(ctx.position.pattern_row, 1);
    }

    #[test]
    fn order_wraps_to_restart_position_and_counts_loop() {
        let mut ctx = two_row_context();
        for _ in 0..8 {
            on_tick(&mut ctx);
        }
        assert_eq!(ctx.position.order_index, 0);
        assert!(ctx.position.loop_count >= 1);
    }

    #[test]
    fn halts_once_max_loop_count_reached() {
        let mut ctx = two_row_context();
        ctx.global.max_loop_count = 1;
        let mut halted = false;
        for _ in 0..16 {
            if on_tick(&mut ctx) == TickKind::Halted {
                halted = true;
                break;
            }
        }
        assert!(halted);
    }
}
