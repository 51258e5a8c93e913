//! # IPB Bus Library
//!
//! Command and observe an appliance controller over its inter-processor bus (IPB).
//!
//! This library provides the protocol engine: frame encoding and validation,
//! the reception loop with resynchronization, and the ERD dictionary driven
//! decoder and command encoder.

pub mod appliance;
pub mod bus;
pub mod config;
pub mod erd;
pub mod error;
pub mod ipb;
pub mod logging;
pub mod serial;
