//! Core types: errors, configuration, node path helpers.

pub mod config;
pub mod errors;
pub mod paths;
