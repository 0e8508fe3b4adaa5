//! Integration tests for why-did answers
//!
//! Tests explanation caching, block attachment, terminal dependencies,
//! and answer ranking against recorded traces.

mod properties;
mod scenarios;
