//! ChannelLab Runner — orchestration around the core engine.
//!
//! - Config loading, validation, and content-hashed run IDs
//! - Weekly expiry calendar (Thursday expiries, Monday-Thursday cycles)
//! - CSV market data loading
//! - Per-cycle replay and parallel whole-run orchestration
//! - Performance metrics

pub mod calendar;
pub mod config;
pub mod cycle;
pub mod data;
pub mod data_loader;
pub mod metrics;
pub mod runner;
