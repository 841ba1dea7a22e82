//! MINTWATCH: Autonomous generative-art release collector
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod ledger;
pub mod transport;
pub mod correlation;
pub mod strategy;
pub mod engine;
pub mod dashboard;
