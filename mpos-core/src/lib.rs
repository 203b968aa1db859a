//! # mpos-core
//!
//! Core protocol implementation for mPOS payment terminal peripherals.
//!
//! This crate provides the low-level protocol primitives:
//! - Frame structure and encoding/decoding
//! - Checksum calculation
//! - Command and response codes
//! - Stream reassembly of chunked link data
//! - Protocol constants

pub mod checksum;
pub mod command;
pub mod constants;
pub mod error;
pub mod frame;
pub mod reassembler;

pub use command::{CommandCode, ResponseCode};
pub use error::{Error, Result};
pub use frame::{ChecksumPolicy, CommandFrame, ResponseRecord};
pub use reassembler::{RawFrame, StreamReassembler, StreamState};

/// Longest parameter a 3-digit length prefix can describe
pub const MAX_PARAMETER_LEN: usize = 999;
