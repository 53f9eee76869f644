//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decode a hex-encoded NDEF message
    DecodeNdef {
        /// Message bytes (hex)
        hex: String,
    },
    /// Decode a hex-encoded out-of-band carrier payload
    DecodeOob {
        /// Payload bytes (hex)
        hex: String,
        /// Payload is an LE OOB record
        #[arg(long, conflicts_with = "nokia")]
        le: bool,
        /// Payload is a Nokia legacy record
        #[arg(long)]
        nokia: bool,
    },
    /// Decode the URI carried by a barcode-type tag identifier
    Barcode {
        /// Tag identifier (hex)
        hex: String,
    },
    /// Print an encoded handover request for a carrier address
    HandoverRequest {
        /// Carrier address (AA:BB:CC:DD:EE:FF); defaults to the configured one
        #[arg(short, long)]
        address: Option<String>,
    },
    /// Run one simulated tap between two in-process devices
    Simulate {
        /// URI to push from the sending device
        #[arg(short, long)]
        uri: Option<String>,
        /// Content locators to hand over (repeatable)
        #[arg(long = "content")]
        content: Vec<String>,
        /// Ask for confirmation and confirm it, instead of sending immediately
        #[arg(long)]
        confirm: bool,
        /// Seconds to wait for the transfer to finish
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },
}
