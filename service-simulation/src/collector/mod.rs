//! Simulator log collection
//!
//! Follows INetSim's activity log and turns the DNS and HTTP lines into
//! [`LogEvent`](crate::models::LogEvent)s.

pub mod logs;

pub use logs::{FollowOptions, LogCollector};
