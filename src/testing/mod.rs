//! Testing utilities
//!
//! In-memory store and transport for exercising the bridge without a broker
//! or a database.

pub mod mocks;

pub use mocks::*;
