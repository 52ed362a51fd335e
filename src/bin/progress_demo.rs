//! Realtime demo for the progress timer
//!
//! Plays a pretend clip: renders a text progress bar, pauses halfway for a
//! moment, then resumes until the end.
//!
//! Usage:
//!   cargo run --bin progress_demo -- --duration 3000       # clip length in ms
//!   cargo run --bin progress_demo -- --fps 30 --no-frames  # timeout scheduler at 30 fps
//!   RUST_LOG=progress_timer=debug cargo run --bin progress_demo

use progress_timer::{
    EventLoop, HostConfig, ProgressTimer, Span, TimeoutHost, TimerConfig, TimerOptions,
};
use std::env;
use std::io::Write;
use tracing_subscriber::EnvFilter;

const BAR_WIDTH: usize = 40;
const PAUSE_MS: f64 = 750.0;

fn render(position: u64, duration: Span) {
    let line = match duration {
        Span::Finite(total) if total > 0 => {
            let filled = (position as usize * BAR_WIDTH) / total as usize;
            format!(
                "[{}{}] {:>6.2}s / {:.2}s",
                "#".repeat(filled.min(BAR_WIDTH)),
                ".".repeat(BAR_WIDTH - filled.min(BAR_WIDTH)),
                position as f64 / 1000.0,
                total as f64 / 1000.0
            )
        }
        _ => format!("[{}] {:>6.2}s", "?".repeat(BAR_WIDTH), position as f64 / 1000.0),
    };
    let mut out = std::io::stdout();
    let _ = write!(out, "\r{}", line);
    let _ = out.flush();
}

fn print_help() {
    println!("progress_demo [--duration MS] [--fps N] [--no-frames]");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    let mut duration_ms = 3000.0;
    let mut fps = 30.0;
    let mut frames = true;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--duration" | "-d" => {
                i += 1;
                if i < args.len() {
                    duration_ms = args[i].parse().unwrap_or(duration_ms);
                }
            }
            "--fps" | "-f" => {
                i += 1;
                if i < args.len() {
                    fps = args[i].parse().unwrap_or(fps);
                }
            }
            "--no-frames" => {
                frames = false;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                print_help();
                return Ok(());
            }
        }
        i += 1;
    }

    let host = EventLoop::realtime(HostConfig {
        fps: 60.0,
        frames_enabled: frames,
    });

    let timer = ProgressTimer::new(
        TimerOptions::new(render).with_config(TimerConfig {
            fallback_target_frame_rate: fps,
            ..Default::default()
        }),
        host.services(),
    )?;
    println!("scheduler: {:?}", timer.scheduler_kind());

    timer.set(0.0, Some(duration_ms)).start();

    let pause = timer.downgrade();
    host.set_timeout(
        duration_ms / 2.0,
        Box::new(move || {
            if let Some(t) = pause.upgrade() {
                t.stop();
            }
        }),
    );
    let resume = timer.downgrade();
    host.set_timeout(
        duration_ms / 2.0 + PAUSE_MS,
        Box::new(move || {
            if let Some(t) = resume.upgrade() {
                t.start();
            }
        }),
    );

    host.run_until(|| false);
    println!();
    println!("done at {}ms", timer.position());

    Ok(())
}
