//! # tracecap - Reference Workload
//!
//! Initializes the capture engine on the main thread, runs a small
//! instrumented workload for a number of frames (optionally alongside worker
//! threads), switches capture off and dumps the merged log.
//!
//! ```text
//! init ─▶ want_capturing(on) ─▶ [frame ─▶ workload] × N ─▶ join workers
//!      ─▶ want_capturing(off, instant) ─▶ write_captures ─▶ deinit
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use std::fs::File;
use std::io::BufWriter;
use std::time::Instant;

use tracecap::cli::Args;
use tracecap::{DumpError, FunctionScope, Resolution};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<DumpError>().is_none() && err.to_string().to_lowercase().contains("invalid argument") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    if args.frames == 0 {
        anyhow::bail!("Invalid argument: --frames must be at least 1");
    }
    let quiet = args.quiet;
    let resolution = if args.high_res { Resolution::High } else { Resolution::Low };

    tracecap::init();
    if !quiet {
        eprintln!("abilities: {}", tracecap::abilities());
    }
    tracecap::want_capturing(true, !args.deferred);

    let started = Instant::now();
    let workers: Vec<_> = (0..args.threads)
        .map(|index| {
            std::thread::Builder::new()
                .name(format!("worker-{index}"))
                .spawn(move || worker(resolution))
                .context("Failed to spawn worker thread")
        })
        .collect::<Result<_>>()?;

    for frame in 0..args.frames {
        match resolution {
            Resolution::Low => tracecap::frame(),
            Resolution::High => tracecap::hr_frame(),
        }
        debug!("Frame {frame}");
        run_frame(resolution, args.loop_count, frame);
    }

    for handle in workers {
        handle.join().map_err(|_| anyhow::anyhow!("Worker thread panicked"))?;
    }

    tracecap::want_capturing(false, true);
    let lines = match &args.output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            tracecap::write_captures_to(&mut writer)?
        }
        None => tracecap::write_captures()?,
    };
    tracecap::deinit();

    info!("Dumped {lines} lines in {:?}", started.elapsed());
    if !quiet {
        eprintln!(
            "captured {} frames, {} worker threads, {lines} lines{}",
            args.frames,
            args.threads,
            args.output.as_ref().map(|path| format!(" -> {}", path.display())).unwrap_or_default()
        );
    }
    Ok(())
}

// ============================================================================
// Workload
// ============================================================================

fn scope(function: fn(Resolution), resolution: Resolution) -> FunctionScope {
    FunctionScope::new(function as usize as u64, resolution)
}

fn normal_func(resolution: Resolution) {
    let _scope = scope(normal_func, resolution);
}

fn other_func(resolution: Resolution) {
    let _scope = scope(other_func, resolution);
}

fn func_with_arg(resolution: Resolution, value: i32) {
    let _scope = FunctionScope::new(func_with_arg as usize as u64, resolution);
    tracecap::int_arg(0, value);
}

fn func_with_multiple_args(resolution: Resolution, a: i32, b: i32, c: i32, d: u32) {
    let _scope = FunctionScope::new(func_with_multiple_args as usize as u64, resolution);
    tracecap::int_arg(0, a);
    tracecap::int_arg(1, b);
    tracecap::int_arg(2, c);
    tracecap::int_arg_with_base(3, d, 16);
}

fn func_with_mixed_args(resolution: Resolution, enabled: bool, ratio: f64, name: &str) {
    let _scope = FunctionScope::new(func_with_mixed_args as usize as u64, resolution);
    tracecap::bool_arg(0, enabled);
    tracecap::float_arg(1, ratio);
    tracecap::ptr_arg(2, name.as_ptr());
    tracecap::data(name.as_bytes());
}

fn looped_func(resolution: Resolution, count: usize) {
    let _scope = FunctionScope::new(looped_func as usize as u64, resolution);
    tracecap::int_arg(0, count);

    let outer = tracecap::ForLoopScope::new(resolution);
    for i in 0..count {
        let _iter = outer.iteration(i);
        normal_func(resolution);

        let value = Box::new(10i32);
        let _block = tracecap::MemoryScope::new(std::ptr::addr_of!(*value), size_of::<i32>(), resolution);
    }
}

fn run_frame(resolution: Resolution, loop_count: usize, frame: u64) {
    normal_func(resolution);
    other_func(resolution);
    func_with_arg(resolution, if frame == 0 { 10 } else { 69 });
    if frame > 0 {
        func_with_multiple_args(resolution, 1, 2, 3, 0xbeef);
        func_with_mixed_args(resolution, frame % 2 == 0, 0.5, "frame");
        looped_func(resolution, loop_count);
    }
}

fn worker(resolution: Resolution) {
    let _thread = tracecap::ThreadScope::new(resolution);
    normal_func(resolution);
    other_func(resolution);
    func_with_arg(resolution, 239_874);
    func_with_multiple_args(resolution, 34_987_234, 239_874_283, 237_984_723, 0x8c0d_5a66);
    let frames = [worker as usize, run_frame as usize];
    tracecap::callstack(&frames);
}
