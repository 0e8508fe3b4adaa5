//! Block bookkeeping: loop paths, loop runs, and nesting depth.

use hindsight_foundation::{EventId, LoopPathId};

use super::answer::Answer;
use super::node::{LoopRun, NodeId, NodeKind};

impl Answer<'_> {
    /// Returns the members of a block in event order.
    #[must_use]
    pub fn members(&self, block: NodeId) -> Vec<NodeId> {
        self.node(block).members.values().copied().collect()
    }

    /// Returns the loop path a branch execution followed, if any.
    ///
    /// The result is memoized on the node. Non-branch nodes have no path.
    pub fn loop_path(&mut self, node: NodeId) -> Option<LoopPathId> {
        let NodeKind::Branch { loop_path } = self.nodes[node.slot()].kind else {
            return None;
        };
        if let Some(resolved) = loop_path {
            return resolved;
        }
        let resolved = self.match_loop_path(self.nodes[node.slot()].event);
        self.nodes[node.slot()].kind = NodeKind::Branch {
            loop_path: Some(resolved),
        };
        resolved
    }

    fn match_loop_path(&self, event: EventId) -> Option<LoopPathId> {
        let program = self.trace.program();
        let branch = program.instruction(self.trace.instruction(event))?;
        branch
            .loop_paths
            .iter()
            .find(|path| {
                let mut cursor = Some(event);
                for (step, &expected) in path.branches.iter().enumerate() {
                    if step > 0 {
                        cursor = cursor.and_then(|e| self.next_branch_in_frame(e));
                    }
                    match cursor {
                        Some(e) if self.trace.instruction(e) == expected => {}
                        _ => return false,
                    }
                }
                !path.branches.is_empty()
            })
            .map(|path| path.id)
    }

    fn next_branch_in_frame(&self, event: EventId) -> Option<EventId> {
        let mut cursor = self.trace.next_event_in_frame(event);
        while let Some(next) = cursor {
            if self.trace.kind(next).is_branch() {
                return Some(next);
            }
            cursor = self.trace.next_event_in_frame(next);
        }
        None
    }

    /// Returns true if a branch block repeats the loop path of an earlier
    /// iteration in the same run of its loop block.
    #[must_use]
    pub fn is_redundant(&self, node: NodeId) -> bool {
        let Some(owner) = self.node(node).owner else {
            return false;
        };
        let NodeKind::Loop { runs } = &self.node(owner).kind else {
            return false;
        };
        runs.iter().any(|run| {
            run.members
                .iter()
                .position(|&m| m == node)
                .is_some_and(|index| index > 0)
        })
    }

    /// Returns the runs of a loop block.
    #[must_use]
    pub fn loop_runs(&self, block: NodeId) -> &[LoopRun] {
        match &self.node(block).kind {
            NodeKind::Loop { runs } => runs,
            _ => &[],
        }
    }

    pub(super) fn recompute_runs(&mut self, block: NodeId) {
        let members = self.members(block);
        let mut runs: Vec<LoopRun> = Vec::new();
        for member in members {
            if !matches!(self.nodes[member.slot()].kind, NodeKind::Branch { .. }) {
                continue;
            }
            // Branch blocks without a path neither extend nor break a run.
            let Some(path) = self.loop_path(member) else {
                continue;
            };
            match runs.last_mut() {
                Some(run) if run.path == path => run.members.push(member),
                _ => runs.push(LoopRun {
                    path,
                    members: vec![member],
                }),
            }
        }
        self.nodes[block.slot()].kind = NodeKind::Loop { runs };
    }

    /// Records a newly attached block's depth on its thread block.
    ///
    /// Blocks never nest across threads, so the thread block of the block's
    /// own thread is the root of its chain.
    pub(super) fn record_depth(&mut self, block: NodeId, depth: usize) {
        let thread = self.trace.thread(self.nodes[block.slot()].event);
        let Some(&root) = self.thread_blocks.get(&thread) else {
            return;
        };
        if let NodeKind::Thread {
            max_depth, deepest, ..
        } = &mut self.nodes[root.slot()].kind
        {
            if depth > *max_depth {
                *max_depth = depth;
                *deepest = Some(block);
            }
        }
    }
}
