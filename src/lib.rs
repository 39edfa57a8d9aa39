//! Mock Debug Adapter Protocol (DAP) server core.
//!
//! [`session`] holds the execution-control state machine (breakpoints,
//! stepping, synthetic stack); [`protocol`] and [`server`] are the wire
//! surface around it.

pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod tracer;
