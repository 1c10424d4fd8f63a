//! Marlin firmware
//!
//! - [`command`]: console triggers and their G-code translation
//! - [`position_parser`]: `M114` report parsing
//! - [`tracker`]: the [`Stage`](tracker::Stage), which owns the coordinator and the
//!   last confirmed position
//! - [`simulator`]: an in-memory Marlin board for `--simulate` and tests

pub mod command;
pub mod position_parser;
pub mod simulator;
pub mod tracker;
