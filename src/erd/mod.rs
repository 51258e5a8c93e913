//! # ERD Module
//!
//! Schema-driven access to appliance resources (ERDs).
//!
//! This module handles:
//! - ERD definitions and the dictionary they are loaded from
//! - Decoding received payloads into named, typed fields
//! - Validating and encoding command values

pub mod schema;
pub mod library;
pub mod decode;
pub mod command;
