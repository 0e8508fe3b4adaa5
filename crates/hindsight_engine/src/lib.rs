//! Why-did and why-didn't explanations over recorded executions.
//!
//! This crate provides:
//! - [`explain`] - Backward causal explanation of events that occurred,
//!   grouped into blocks by control dependency
//! - [`whynot`] - Backward analysis of instructions that did not execute
//! - [`config`] - Switches for the optional refinements of both analyses
//!
//! Both analyses read the trace only through
//! [`TraceQuery`](hindsight_trace::TraceQuery) and own their caches
//! exclusively; one trace may back any number of answers and questions.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod explain;
pub mod whynot;

pub use config::AnalysisConfig;
pub use explain::{Answer, AnswerListener, AnswerSequence, Cause, Explanation, NodeId};
pub use whynot::{CancellationFlag, Expectation, Question, Reason, ReasonKind, UnexecutedInstruction};
