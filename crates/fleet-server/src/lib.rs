//! Shared library surface for the fleet server and its tests.

pub mod api;
pub mod cache;
pub mod config;
pub mod ingest;
pub mod loops;
pub mod state;
