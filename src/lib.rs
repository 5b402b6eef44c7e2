//! Pull-based screen recording pipeline.
//!
//! [`pipeline`] holds the dataflow engine, [`capture`] the sources feeding
//! it, [`workers`] the output writers and [`recorder`] ties them together
//! for the `castrec` binary.

pub mod capture;
pub mod config;
pub mod errors;
pub mod pipeline;
pub mod recorder;
pub mod workers;
