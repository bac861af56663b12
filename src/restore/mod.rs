//! Restore pipeline: decoder → filter → ancestor chain → materializer → restorer.

pub mod engine;
pub mod filter;
pub mod materializer;
pub mod restorer;
pub mod tracker;

#[cfg(test)]
mod test_properties;
