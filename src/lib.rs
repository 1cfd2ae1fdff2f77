//! # AMR Decoder Library
//!
//! Receive-side decoding of ERT utility-meter broadcasts (SCM, SCM+ and IDM).
//!
//! This library turns a Manchester-coded bit stream, one sample per radio
//! clock edge, into checksum-validated typed records delivered to a single
//! callback.

pub mod amr;
pub mod config;
pub mod error;
pub mod receiver;
pub mod ring;
