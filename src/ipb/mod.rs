//! # IPB Protocol Module
//!
//! Implementation of the inter-processor bus (IPB) framing.
//!
//! This module handles:
//! - Frame encoding with addressing and sequence policy
//! - Header and body validation, including streaming resynchronization
//! - The CRC16 checksum protecting both frame sections

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod crc;
