//! xmplay CLI — headless `.xm`/`libxm` loading, feature summary, and
//! WAV export.
//!
//! Usage:
//!   xmplay path/to/file.xm
//!   xmplay path/to/file.xm --wav output.wav
//!   xmplay path/to/file.libxm --libxm

use std::io::Write;
use std::{env, fs};
use xm_master::Controller;

const DEFAULT_SAMPLE_RATE: u32 = 48_000;

fn main() {
    let args: Vec<String> = env::args().collect();
    let path = args.get(1).unwrap_or_else(|| {
        eprintln!("Usage: xmplay <file.xm> [--wav output.wav] [--libxm]");
        std::process::exit(1);
    });

    let wav_path = args
        .iter()
        .position(|a| a == "--wav")
        .and_then(|i| args.get(i + 1))
        .cloned();
    let is_libxm = args.iter().any(|a| a == "--libxm");

    let data = fs::read(path).unwrap_or_else(|e| {
        eprintln!("Failed to read {}: {}", path, e);
        std::process::exit(1);
    });

    let mut ctrl = Controller::new();
    let load_result = if is_libxm {
        ctrl.create_from_libxm(&data)
    } else {
        ctrl.create_from_xm(&data, DEFAULT_SAMPLE_RATE)
    };
    load_result.unwrap_or_else(|e| {
        eprintln!("Failed to load module: {:?}", e);
        std::process::exit(1);
    });

    print_summary(&ctrl);

    match wav_path {
        Some(wav) => render_to_wav(&mut ctrl, &wav),
        None => print_playback_progress(&mut ctrl),
    }
}

fn print_summary(ctrl: &Controller) {
    let ctx = ctrl.context();
    println!("Title:    {}", ctx.module.name);
    println!("Channels: {}", ctx.module.num_channels);
    println!("Patterns: {}", ctx.patterns.len());
    println!("Orders:   {}", ctx.module.order.len());
    println!(
        "Tempo:    {} BPM, Speed: {}",
        ctx.module.default_bpm, ctx.module.default_tempo
    );

    let samples_with_data = ctx.samples.iter().filter(|s| !s.is_empty()).count();
    println!("Samples:  {} (with data)", samples_with_data);
    println!();

    let features = xm_ir::analyze(&ctx.module, &ctx.patterns);
    print!("{}", features);
    println!();
}

/// Without a real audio device, "live" playback just renders in small
/// chunks and reports the transport position as it goes.
fn print_playback_progress(ctrl: &mut Controller) {
    const CHUNK_FRAMES: usize = DEFAULT_SAMPLE_RATE as usize / 50;
    ctrl.set_max_loop_count(1);

    let mut scratch = [0.0f32; CHUNK_FRAMES * 2];
    println!("Rendering...");
    println!();

    while ctrl.get_loop_count() == 0 {
        ctrl.generate_samples(&mut scratch);
        let pos = ctrl.position();
        print!(
            "\rOrd: {:02X} | Row: {:02X} | Tick: {:02}",
            pos.order_index, pos.pattern_row, pos.current_tick
        );
        let _ = std::io::stdout().flush();
    }

    println!("\rDone.                              ");
}

fn render_to_wav(ctrl: &mut Controller, path: &str) {
    let max_seconds: u32 = 300;
    ctrl.set_max_loop_count(1);
    println!("Rendering to {}...", path);

    let wav = ctrl.render_to_wav(max_seconds);
    println!("Rendered {} bytes", wav.len());

    fs::write(path, &wav).unwrap_or_else(|e| {
        eprintln!("Failed to write {}: {}", path, e);
        std::process::exit(1);
    });

    println!("Done.");
}
