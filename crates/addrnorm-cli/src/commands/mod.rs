//! CLI command implementations.

pub mod normalize;
