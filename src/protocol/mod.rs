//! Wire payloads and storage records for the counter bridge
//!
//! This module defines the JSON shapes the counting device publishes, the
//! parsed forms the bridge works with, and the normalized record handed to
//! the store gateway.

pub mod messages;
pub mod topics;

pub use messages::*;
pub use topics::*;
