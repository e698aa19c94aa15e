//! Shared utilities for the Lumen crates: logging, command line, profiling,
//! collections and camera math.

pub mod camera;
pub mod cli;
pub mod collections;
pub mod log;
pub mod math;
pub mod profile;
