//! Link lifecycle runtime
//!
//! [`LinkManager`] drives the pure link machine from radio events and runs
//! its effects: timers, the connect worker, the send worker and the inbound
//! service handlers.

pub mod manager;
pub mod workflow;

pub use manager::{LinkManager, LinkManagerBuilder, LinkSnapshot};
pub use workflow::run_send;
