//! Beamlink Runtime
//!
//! Tokio side of the proximity exchange engine:
//! - `LinkManager`: the actor owning the link state machine, its timers and
//!   background workers
//! - `LinkTransportPool`: the outbound channels of one attempt cycle
//! - `services`: handover, SNEP and NPP clients and inbound handlers
//!
//! Pure logic lives in `beamlink-core`; this crate only schedules it.

pub mod link;
pub mod pool;
pub mod services;

pub use link::{run_send, LinkManager, LinkManagerBuilder, LinkSnapshot};
pub use pool::LinkTransportPool;
pub use services::{
    report_channel, serve_handover, serve_npp, serve_snep, HandoverClient,
    HandoverServerContext, InboundReport, NppClient, ReportReceiver, ReportSender, SnepClient,
    SnepMessenger, SnepServerContext,
};
