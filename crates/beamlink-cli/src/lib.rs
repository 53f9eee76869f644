//! Beamlink CLI library
//!
//! Offline decoding tools for tap payloads and an in-process two-device
//! simulation built on the runtime's link manager.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::{Cli, Commands};
pub use commands::{
    decode_barcode, decode_ndef, decode_oob, handover_request, simulate, CommandDispatcher,
    OobFormat, Render, SimulationOptions, SimulationReport,
};
pub use config::AppConfig;
pub use error::{CliError, Result};
