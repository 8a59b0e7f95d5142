//! Fleet CLI - command line tools for exercising the fleet pipeline.
//!
//! - send_track: simulated vehicle publishing over the broker

pub mod sim;
