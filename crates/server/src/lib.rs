//! HTTP surface of the reelforge job orchestrator.

pub mod api;
pub mod metrics;
pub mod state;
