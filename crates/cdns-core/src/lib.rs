//! Core types for the C-DNS capture encoder.
//!
//! This crate provides the foundations shared by the format and writer
//! layers:
//!
//! - **Types**: the observed-transaction data model (`DnsMessage`,
//!   `QueryResponse`, `AddressEvent`, `PacketStatistics`)
//! - **Configuration**: output, rotation, masking and exclusion settings
//! - **Errors**: comprehensive error handling with [`CdnsError`]
//!
//! Packet capture, DNS parsing and query/response matching live upstream;
//! this crate only defines the shapes they hand over for encoding.

pub mod address;
pub mod config;
mod error;
pub mod types;

pub use config::{Compression, Configuration, HintsExcluded};
pub use error::{CdnsError, Result};
pub use types::*;
