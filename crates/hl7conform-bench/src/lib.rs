//! Profile and message generator and benchmark utilities for hl7conform.
//!
//! This crate provides deterministic generation of conformance profiles,
//! their table libraries and conforming messages for benchmarking and
//! property-based testing of `hl7conform-core`.

pub mod generator;

pub use generator::{GeneratedCase, GeneratorConfig, SizeTier, generate_case};
