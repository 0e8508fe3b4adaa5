//! Recorded executions for Hindsight.
//!
//! This crate provides:
//! - [`TraceQuery`] - The read-only interface every analysis is written against
//! - [`Program`] - Static knowledge about the recorded program
//! - [`RecordedTrace`] - An in-memory trace, built with [`TraceBuilder`]

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod program;
pub mod query;
pub mod recorded;

pub use program::{
    Class, Instruction, InstructionKind, LoopPath, Method, Program, ProgramBuilder,
};
pub use query::TraceQuery;
pub use recorded::{EventRecord, RecordedTrace, TraceBuilder};
