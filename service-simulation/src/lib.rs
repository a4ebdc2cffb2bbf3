//! Network simulation orchestration for the Pack-A-Mal sandbox
//!
//! Samples under dynamic analysis run in a network with no real internet.
//! INetSim answers their DNS and HTTP traffic; this crate prepares and
//! observes it:
//!
//! - [`inetsim`] renders the simulator's config file
//! - [`readiness`] holds startup until the simulator accepts connections
//! - [`collector`] follows the simulator log and extracts DNS/HTTP events
//! - [`handlers`] serves the `/status` liveness endpoint
//! - [`networksim`] decides which sandbox traffic gets redirected

pub mod collector;
pub mod config;
pub mod error;
pub mod handlers;
pub mod inetsim;
pub mod models;
pub mod networksim;
pub mod readiness;

pub use error::{Result, SimulationError};
