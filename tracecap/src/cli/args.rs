//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "tracecap",
    about = "Run an instrumented reference workload and dump the captured trace",
    after_help = "\
EXAMPLES:
    tracecap                                 Two frames on the main thread, dump to stdout
    tracecap --threads 16                    Also run 16 instrumented worker threads
    tracecap --high-res --output trace.txt   Cycle counter timestamps, dump to a file
    RUST_LOG=debug tracecap --deferred       Toggle capture at frame boundaries"
)]
pub struct Args {
    /// Instrumented worker threads to spawn
    #[arg(long, default_value = "0")]
    pub threads: usize,

    /// Main loop frames to run
    #[arg(long, default_value = "2")]
    pub frames: u64,

    /// Iterations of the looped workload
    #[arg(long, default_value = "10")]
    pub loop_count: usize,

    /// Record with the high resolution (cycle counter) variants
    #[arg(long)]
    pub high_res: bool,

    /// Toggle capture at frame boundaries instead of instantly
    #[arg(long)]
    pub deferred: bool,

    /// Write the dump to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Suppress the summary on stderr
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["tracecap"]);
        assert_eq!(args.threads, 0);
        assert_eq!(args.frames, 2);
        assert_eq!(args.loop_count, 10);
        assert!(!args.high_res && !args.deferred && !args.quiet);
        assert!(args.output.is_none());
    }

    #[test]
    fn test_flags() {
        let args = Args::parse_from([
            "tracecap",
            "--threads",
            "16",
            "--loop-count",
            "3",
            "--high-res",
            "--deferred",
            "-o",
            "out.txt",
        ]);
        assert_eq!(args.threads, 16);
        assert_eq!(args.loop_count, 3);
        assert!(args.high_res && args.deferred);
        assert_eq!(args.output, Some(PathBuf::from("out.txt")));
    }
}
