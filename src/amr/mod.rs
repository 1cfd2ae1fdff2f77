//! # AMR Protocol Module
//!
//! Wire formats of ERT utility-meter broadcasts.
//!
//! This module handles:
//! - SCM, SCM+ and IDM record layouts and frame header tags
//! - BCH-16 and CCITT-16 checksum validation
//! - MSB-first bit-field extraction for packed interval data
//! - Encoding records back into sealed raw messages and line samples

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod crc;
pub mod bits;
