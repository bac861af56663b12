//! Restore activity log: append-only JSONL, one line per node outcome.

pub mod jsonl;
