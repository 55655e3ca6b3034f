//! Sweatbox CLI - turns command line arguments into a generation job.

pub mod args;

pub use args::{Args, ParkingArg};
