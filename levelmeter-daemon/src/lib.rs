//! Level meter daemon library
//!
//! This module re-exports the daemon's modules for integration testing.

pub mod config;
pub mod display;
pub mod ipc;
pub mod meter;
pub mod socket;

pub use config::{MeterConfig, Overrides};
pub use display::TerminalDisplay;
pub use ipc::{IpcCommand, IpcServer};
pub use meter::{Meter, MeterStatus};
