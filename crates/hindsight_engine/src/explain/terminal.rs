//! Projection of an explanation onto the dependencies worth showing a reader.

use std::collections::{BTreeMap, HashSet};

use hindsight_foundation::EventId;

use super::answer::Answer;
use super::node::NodeId;

impl Answer<'_> {
    /// Returns the terminal data dependencies of an event, mapped to the
    /// effect that directly consumed each one.
    ///
    /// A value-produced cause is terminal only when it has no causes of its
    /// own; intermediate values are walked through. Definitions, arguments,
    /// invocations, returns and instantiations are always terminal. Causes
    /// with an empty cause list (pushed constants) contribute nothing.
    /// When a terminal is reached from several effects the last one visited
    /// wins.
    ///
    /// # Panics
    ///
    /// Panics if the walk reaches an unexplained node, which would mean the
    /// explanation cache lost track of a node.
    pub fn terminal_data_dependencies(&mut self, event: EventId) -> BTreeMap<EventId, EventId> {
        let root = self.explain(event);
        let mut terminals = BTreeMap::new();
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut pending = vec![root];

        while let Some(effect) = pending.pop() {
            if !visited.insert(effect) {
                continue;
            }
            let effect_event = self.node(effect).event();
            for cause in self.node(effect).causes() {
                let kind = self.trace.kind(cause.event);
                if kind.is_value_produced() {
                    if self.node(cause.node).causes().is_empty() {
                        terminals.insert(cause.event, effect_event);
                    } else {
                        pending.push(cause.node);
                    }
                } else if kind.is_terminal_kind() {
                    terminals.insert(cause.event, effect_event);
                } else {
                    pending.push(cause.node);
                }
            }
        }
        terminals
    }
}
