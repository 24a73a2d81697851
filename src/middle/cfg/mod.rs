//! A read-only index of the basic blocks of a [`Body`]. The stream stays the
//! system of record: the graph is rebuilt whenever a pass needs fresh block
//! boundaries, predecessors or reachability.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    error::{CompileError, Result},
    index::Index,
    middle::lir::{Body, LabelId, NodeId, NodeKind},
};

pub mod phi;

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub label: LabelId,
    /// From the label node to the terminator, inclusive
    pub nodes: Vec<NodeId>,
    pub predecessors: BTreeSet<LabelId>,
    pub successors: BTreeSet<LabelId>,
}

impl BasicBlock {
    pub fn label_node(&self) -> NodeId {
        self.nodes[0]
    }

    pub fn terminator(&self) -> NodeId {
        self.nodes[self.nodes.len() - 1]
    }
}

#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    pub entry: LabelId,
    blocks: BTreeMap<LabelId, BasicBlock>,
    /// Labels in stream order
    order: Vec<LabelId>,
}

impl ControlFlowGraph {
    /// Splits the stream into blocks, checking that every block starts with a
    /// label, ends with exactly one terminator and only branches to labels
    /// which are defined once
    pub fn build(body: &Body) -> Result<Self> {
        let mut blocks = BTreeMap::new();
        let mut order = Vec::new();
        let mut current: Option<(LabelId, Vec<NodeId>)> = None;

        for id in body.iter() {
            let kind = body.kind(id);

            if let NodeKind::Label(label) = kind {
                if let Some((open, _)) = &current {
                    return Err(CompileError::invariant(format!(
                        "block L{} falls into L{} without a terminator",
                        open.index(),
                        label.index()
                    )));
                }

                if blocks.contains_key(label) {
                    return Err(CompileError::invariant(format!(
                        "label L{} is defined more than once",
                        label.index()
                    )));
                }

                current = Some((*label, vec![id]));
                continue;
            }

            let Some((label, nodes)) = current.as_mut() else {
                return Err(CompileError::invariant(format!(
                    "node {} is not inside a block",
                    id.index()
                )));
            };

            nodes.push(id);

            if kind.is_terminator() {
                let label = *label;
                let nodes = std::mem::take(nodes);
                current = None;

                order.push(label);
                blocks.insert(
                    label,
                    BasicBlock {
                        label,
                        nodes,
                        predecessors: BTreeSet::new(),
                        successors: kind.successors().into_iter().collect(),
                    },
                );
            }
        }

        if let Some((label, _)) = current {
            return Err(CompileError::invariant(format!(
                "block L{} has no terminator",
                label.index()
            )));
        }

        let Some(entry) = order.first().copied() else {
            return Err(CompileError::invariant("method body has no blocks"));
        };

        let edges = blocks
            .values()
            .flat_map(|block| block.successors.iter().map(|s| (block.label, *s)))
            .collect::<Vec<_>>();

        for (from, to) in edges {
            let Some(target) = blocks.get_mut(&to) else {
                return Err(CompileError::invariant(format!(
                    "L{} branches to undefined label L{}",
                    from.index(),
                    to.index()
                )));
            };
            target.predecessors.insert(from);
        }

        Ok(Self {
            entry,
            blocks,
            order,
        })
    }

    pub fn block(&self, label: LabelId) -> Option<&BasicBlock> {
        self.blocks.get(&label)
    }

    /// Blocks in stream order
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.order.iter().map(|label| &self.blocks[label])
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Labels reachable from the entry along branch edges
    pub fn reachable(&self) -> BTreeSet<LabelId> {
        let mut reachable = BTreeSet::new();
        let mut stack = vec![self.entry];

        while let Some(label) = stack.pop() {
            if !reachable.insert(label) {
                continue;
            }

            stack.extend(self.blocks[&label].successors.iter().copied());
        }

        reachable
    }

    /// Predecessors of `label` which are themselves reachable
    pub fn reachable_predecessors(
        &self,
        label: LabelId,
        reachable: &BTreeSet<LabelId>,
    ) -> BTreeSet<LabelId> {
        self.blocks
            .get(&label)
            .map(|block| block.predecessors.intersection(reachable).copied().collect())
            .unwrap_or_default()
    }

    /// Solves a forward dataflow problem over the reachable blocks and returns
    /// the fact holding on entry to each of them
    pub fn solve_forward<A: ForwardAnalysis>(
        &self,
        body: &Body,
        analysis: &A,
        max_iterations: usize,
    ) -> Result<BTreeMap<LabelId, A::Fact>> {
        let reachable = self.reachable();
        let mut inputs: BTreeMap<LabelId, A::Fact> = BTreeMap::new();
        let mut outputs: BTreeMap<LabelId, A::Fact> = reachable
            .iter()
            .map(|label| (*label, analysis.top()))
            .collect();

        for _ in 0..max_iterations.max(1) {
            let mut changed = false;

            for block in self.blocks().filter(|b| reachable.contains(&b.label)) {
                let input = match block.label == self.entry {
                    true => analysis.entry(),
                    false => block
                        .predecessors
                        .iter()
                        .filter_map(|p| outputs.get(p))
                        .fold(None, |acc: Option<A::Fact>, fact| match acc {
                            Some(acc) => Some(analysis.meet(&acc, fact)),
                            None => Some(fact.clone()),
                        })
                        .unwrap_or_else(|| analysis.top()),
                };

                let mut output = input.clone();
                for node in &block.nodes {
                    analysis.transfer(body, *node, &mut output);
                }

                if outputs.get(&block.label) != Some(&output) {
                    outputs.insert(block.label, output);
                    changed = true;
                }
                inputs.insert(block.label, input);
            }

            if !changed {
                return Ok(inputs);
            }
        }

        Err(CompileError::invariant(format!(
            "dataflow did not converge within {max_iterations} iterations"
        )))
    }

    /// Checks that the incoming edges of every phi are exactly the reachable
    /// predecessors of its block
    pub fn check_phi_edges(&self, body: &Body) -> Result<()> {
        let reachable = self.reachable();

        for block in self.blocks().filter(|b| reachable.contains(&b.label)) {
            let predecessors = self.reachable_predecessors(block.label, &reachable);

            for node in &block.nodes {
                let NodeKind::Phi { incoming, .. } = body.kind(*node) else {
                    continue;
                };

                if !incoming.keys().copied().eq(predecessors.iter().copied()) {
                    return Err(CompileError::invariant(format!(
                        "phi {} in L{} does not match the predecessors of its block",
                        node.index(),
                        block.label.index()
                    )));
                }
            }
        }

        Ok(())
    }
}

/// A forward dataflow problem. Facts start at `top` and are combined with
/// `meet` where control flow joins.
pub trait ForwardAnalysis {
    type Fact: Clone + PartialEq;

    /// Fact on entry to the method
    fn entry(&self) -> Self::Fact;

    /// Identity of `meet`, the starting point of every other block
    fn top(&self) -> Self::Fact;

    fn meet(&self, a: &Self::Fact, b: &Self::Fact) -> Self::Fact;

    fn transfer(&self, body: &Body, node: NodeId, fact: &mut Self::Fact);
}
