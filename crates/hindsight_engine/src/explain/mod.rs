//! Backward causal explanation of recorded events.
//!
//! An [`Answer`] lazily builds [`Explanation`] nodes, each wrapping one
//! event with its data and heap causes, and groups them into blocks by
//! control dependency:
//!
//! - invocation, branch, exception and method-entry events are blocks of
//!   the events they control;
//! - iterations of a loop collapse into one loop block per loop and thread;
//! - events with no control dependency belong to their thread block.

mod answer;
mod block;
mod node;
mod terminal;

pub use answer::{Answer, AnswerListener, AnswerSequence};
pub use node::{Cause, CauseSource, Explanation, LoopRun, NodeId, NodeKind, Status};
