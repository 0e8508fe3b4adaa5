//! Core identifiers, event kinds, and errors for Hindsight.
//!
//! This crate provides:
//! - [`EventId`] - Totally ordered identifier of one recorded occurrence
//! - Static identifiers ([`InstructionId`], [`MethodId`], [`ClassId`], [`LoopPathId`])
//! - Runtime identifiers ([`ThreadId`], [`ObjectId`])
//! - [`EventKind`] - The closed set of event kinds and their facets
//! - [`Error`] - Error types, including the "no value available" outcome

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod event;
pub mod id;

pub use error::{Error, ErrorKind, Result};
pub use event::EventKind;
pub use id::{ClassId, EventId, InstructionId, LoopPathId, MethodId, ObjectId, ThreadId};
