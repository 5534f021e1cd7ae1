//! Crate-level scenario tests.
//!
//! - `determinism.rs`: same seed and inputs replay identically
//! - `integration.rs`: requests played end to end through the simulation host
//!   and mirrored by client players
//! - `helpers.rs`: behavior harness, definition factories and scenario setup

pub mod helpers;
