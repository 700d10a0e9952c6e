//! Rotating file output and the C-DNS block writer.
//!
//! [`BlockCborWriter`] is the entry point: construct it with a
//! [`cdns_core::Configuration`], feed it matched query/response pairs and
//! address events, and it produces rotated, optionally compressed C-DNS
//! files. The capture, parsing and matching stages live upstream.

pub mod pattern;
pub mod sink;
mod writer;

pub use pattern::OutputPattern;
pub use sink::CaptureSink;
pub use writer::BlockCborWriter;
