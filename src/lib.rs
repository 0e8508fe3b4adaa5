//! Hindsight - Why did this happen, and why didn't that?
//!
//! This crate re-exports all layers of the Hindsight system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 2: hindsight_engine     - Why-did answers, why-didn't questions
//! Layer 1: hindsight_trace      - Trace query interface, program model, recorded traces
//! Layer 0: hindsight_foundation - Core types (EventId, EventKind, Error)
//! ```

pub use hindsight_engine as engine;
pub use hindsight_foundation as foundation;
pub use hindsight_trace as trace;
