//! FileConverter - video and image conversion orchestration
//!
//! This library crate exposes the conversion layer for the binary and for
//! integration testing.

pub mod conversion;
