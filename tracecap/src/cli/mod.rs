//! Command-line interface of the `tracecap` binary

pub mod args;

pub use args::Args;
