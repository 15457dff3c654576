//! Files written by the binary.
//!
//! - [`json`]: the state file shared between invocations and the per-date
//!   `today.json` edition

pub mod json;
