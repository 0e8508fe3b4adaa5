//! Why an instruction did not execute.
//!
//! A [`Question`] builds a graph of [`UnexecutedInstruction`] nodes. Each
//! node gets a [`Reason`]; nodes whose reason is the non-execution of other
//! instructions (callers of the method, guarding branches) link those as
//! incoming edges. Edges only point at finished nodes, so the graph is
//! acyclic even for mutually recursive methods.

mod cancel;
mod expectation;
mod question;
mod reason;
mod snapshot;

pub use cancel::CancellationFlag;
pub use expectation::{Expectation, Match};
pub use question::{Question, UnexecutedId, UnexecutedInstruction};
pub use reason::{Reason, ReasonKind};
pub use snapshot::{NodeSnapshot, QuestionSnapshot};
