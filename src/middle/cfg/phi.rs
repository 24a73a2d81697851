//! Resolves loads of threaded variables to the values stored into them.
//!
//! Lowering records, on every branch, the last value stored to each threaded
//! variable in the branching block. A load is answered by the last store in
//! its own block, or else by the value reaching the block's label. That value
//! comes from the branch registry of each reachable predecessor. When the
//! predecessors disagree a phi is placed at the label. Entry values are
//! memoized per label and variable, and a phi is registered before its inputs
//! are resolved so loops terminate.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::{
    error::{CompileError, Result},
    middle::{
        cfg::ControlFlowGraph,
        lir::{Body, LabelId, NodeId, NodeKind, Place, VariableId},
    },
};

/// Places phis for every threaded variable, replaces threaded loads by the
/// values they observe and removes threaded stores. Expects unreachable blocks
/// to have been removed already. Returns the number of phis left in the body.
pub fn place_phis(body: &mut Body) -> Result<usize> {
    let cfg = ControlFlowGraph::build(body)?;
    let reachable = cfg.reachable();

    let mut placement = PhiPlacement {
        body,
        cfg: &cfg,
        reachable: &reachable,
        entries: BTreeMap::new(),
    };

    let mut substitutions = BTreeMap::new();
    let mut dead = Vec::new();

    for block in cfg.blocks().filter(|b| reachable.contains(&b.label)) {
        let mut current: BTreeMap<VariableId, NodeId> = BTreeMap::new();

        for node in &block.nodes {
            match placement.body.kind(*node) {
                NodeKind::Store {
                    place: Place::Local(variable),
                    value,
                    ..
                } if placement.body.variables[*variable].threaded => {
                    current.insert(*variable, *value);
                    dead.push(*node);
                }
                NodeKind::Load(Place::Local(variable))
                    if placement.body.variables[*variable].threaded =>
                {
                    let variable = *variable;
                    let value = match current.get(&variable) {
                        Some(value) => *value,
                        None => placement.entry_value(block.label, variable)?,
                    };

                    substitutions.insert(*node, value);
                    dead.push(*node);
                }
                _ => {}
            }
        }
    }

    body.substitute_uses(&substitutions);
    for node in dead {
        body.unlink(node);
    }

    remove_trivial_phis(body);

    let phis = body
        .iter()
        .filter(|id| matches!(body.kind(*id), NodeKind::Phi { .. }))
        .count();
    debug!("placed {phis} phis");

    Ok(phis)
}

struct PhiPlacement<'a> {
    body: &'a mut Body,
    cfg: &'a ControlFlowGraph,
    reachable: &'a BTreeSet<LabelId>,
    /// Value of a variable on entry to a label
    entries: BTreeMap<(LabelId, VariableId), NodeId>,
}

impl PhiPlacement<'_> {
    fn entry_value(&mut self, label: LabelId, variable: VariableId) -> Result<NodeId> {
        if let Some(value) = self.entries.get(&(label, variable)) {
            return Ok(*value);
        }

        let predecessors = self.cfg.reachable_predecessors(label, self.reachable);

        match predecessors.len() {
            0 => Err(CompileError::invariant(format!(
                "load of `{}` has no reachable preceding store",
                self.body.variables[variable].name
            ))),
            1 => {
                let predecessor = *predecessors.first().unwrap_or(&label);
                let value = self.exit_value(predecessor, label, variable)?;
                self.entries.insert((label, variable), value);
                Ok(value)
            }
            _ => {
                let Some(label_node) = self.body.labels[label].node else {
                    return Err(CompileError::invariant("phi placed at an undefined label"));
                };

                let ty = self.body.variables[variable].ty;
                let span = self.body.node(label_node).span;
                let phi = self.body.insert_after(
                    label_node,
                    NodeKind::Phi {
                        label,
                        variable,
                        incoming: BTreeMap::new(),
                    },
                    Some(ty),
                    span,
                );
                self.entries.insert((label, variable), phi);

                let mut values = BTreeMap::new();
                for predecessor in predecessors {
                    values.insert(predecessor, self.exit_value(predecessor, label, variable)?);
                }

                if let NodeKind::Phi { incoming, .. } = &mut self.body.nodes[phi].kind {
                    *incoming = values;
                }

                Ok(phi)
            }
        }
    }

    /// Value of `variable` when `predecessor` branches to `target`
    fn exit_value(
        &mut self,
        predecessor: LabelId,
        target: LabelId,
        variable: VariableId,
    ) -> Result<NodeId> {
        let recorded = self.body.labels[target]
            .incoming
            .get(&predecessor)
            .and_then(|stores| stores.get(&variable))
            .copied();

        match recorded {
            Some(value) => Ok(value),
            None => self.entry_value(predecessor, variable),
        }
    }
}

/// Removes phis whose incoming values, ignoring the phi itself, are all the
/// same value. Repeats until none are left, since removing one can make
/// another trivial. Returns whether anything was removed.
pub fn remove_trivial_phis(body: &mut Body) -> bool {
    let mut changed = false;

    loop {
        let trivial = body.iter().find_map(|id| {
            let NodeKind::Phi { incoming, .. } = body.kind(id) else {
                return None;
            };

            let distinct = incoming
                .values()
                .filter(|value| **value != id)
                .collect::<BTreeSet<_>>();

            match distinct.len() {
                1 => distinct.first().map(|value| (id, **value)),
                _ => None,
            }
        });

        let Some((phi, value)) = trivial else {
            return changed;
        };

        body.substitute_uses(&BTreeMap::from([(phi, value)]));
        body.unlink(phi);
        changed = true;
    }
}

/// Restricts the incoming edges of every phi to the current reachable
/// predecessors of its block, then removes phis which became trivial
pub fn prune_phis(body: &mut Body, cfg: &ControlFlowGraph) -> bool {
    let reachable = cfg.reachable();
    let mut changed = false;

    let phis = body
        .iter()
        .filter(|id| matches!(body.kind(*id), NodeKind::Phi { .. }))
        .collect::<Vec<_>>();

    for phi in phis {
        let NodeKind::Phi { label, .. } = body.kind(phi) else {
            continue;
        };
        let predecessors = cfg.reachable_predecessors(*label, &reachable);

        if let NodeKind::Phi { incoming, .. } = &mut body.nodes[phi].kind {
            let before = incoming.len();
            incoming.retain(|predecessor, _| predecessors.contains(predecessor));
            changed |= incoming.len() != before;
        }
    }

    remove_trivial_phis(body) || changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        middle::{
            lir::{Branch, Literal, Variable, VariableKind},
            ty::{ModifiedType, TypeContext},
        },
        span::Span,
    };

    /// A loop counting `i` up while a flag selects the start value:
    ///
    /// ```text
    /// entry: i = 0; br cond
    /// body:  i = i + 1; br cond
    /// cond:  br (i < 10) ? body : end
    /// end:   return i
    /// ```
    #[test]
    fn loop_variables_get_phis_and_loads_resolve() {
        let ctx = TypeContext::new();
        let int = ModifiedType::new(ctx.int());
        let mut body = Body::new();
        let i = body.add_variable(Variable::new(&ctx, "i", int, VariableKind::Local));
        let (entry, body_label, cond, end) = (
            body.new_label(),
            body.new_label(),
            body.new_label(),
            body.new_label(),
        );
        let span = Span::default();

        body.append(NodeKind::Label(entry), None, span);
        let zero = body.append(NodeKind::Literal(Literal::Int(0)), Some(int), span);
        body.append(NodeKind::Store { place: Place::Local(i), value: zero, initializing: false }, None, span);
        body.append(NodeKind::Branch(Branch::Unconditional(cond)), None, span);
        body.labels[cond].incoming.insert(entry, BTreeMap::from([(i, zero)]));

        body.append(NodeKind::Label(body_label), None, span);
        let load = body.append(NodeKind::Load(Place::Local(i)), Some(int), span);
        let one = body.append(NodeKind::Literal(Literal::Int(1)), Some(int), span);
        let next = body.append(
            NodeKind::Binary {
                operator: crate::middle::hir::BinaryOp::Add,
                lhs: load,
                rhs: one,
            },
            Some(int),
            span,
        );
        body.append(NodeKind::Store { place: Place::Local(i), value: next, initializing: false }, None, span);
        body.append(NodeKind::Branch(Branch::Unconditional(cond)), None, span);
        body.labels[cond].incoming.insert(body_label, BTreeMap::from([(i, next)]));

        body.append(NodeKind::Label(cond), None, span);
        let current = body.append(NodeKind::Load(Place::Local(i)), Some(int), span);
        let ten = body.append(NodeKind::Literal(Literal::Int(10)), Some(int), span);
        let test = body.append(
            NodeKind::Compare {
                operator: crate::middle::hir::CompareOp::Less,
                lhs: current,
                rhs: ten,
            },
            Some(ModifiedType::new(ctx.boolean())),
            span,
        );
        body.append(
            NodeKind::Branch(Branch::Conditional {
                condition: test,
                on_true: body_label,
                on_false: end,
            }),
            None,
            span,
        );
        body.labels[body_label].incoming.insert(cond, BTreeMap::new());
        body.labels[end].incoming.insert(cond, BTreeMap::new());

        body.append(NodeKind::Label(end), None, span);
        let result = body.append(NodeKind::Load(Place::Local(i)), Some(int), span);
        let ret = body.append(
            NodeKind::Return {
                value: Some(result),
                implicit: false,
            },
            None,
            span,
        );

        assert_eq!(place_phis(&mut body).unwrap(), 1);

        let phi = body
            .iter()
            .find(|id| matches!(body.kind(*id), NodeKind::Phi { .. }))
            .unwrap();
        let NodeKind::Phi { incoming, .. } = body.kind(phi) else {
            unreachable!()
        };

        assert_eq!(incoming, &BTreeMap::from([(entry, zero), (body_label, next)]));
        assert_eq!(body.kind(next).operands(), vec![phi, one]);
        assert_eq!(body.kind(test).operands(), vec![phi, ten]);
        assert_eq!(body.kind(ret).operands(), vec![phi]);
        assert!(!body.iter().any(|id| matches!(body.kind(id), NodeKind::Store { .. } | NodeKind::Load(_))));

        let cfg = ControlFlowGraph::build(&body).unwrap();
        cfg.check_phi_edges(&body).unwrap();
    }

    #[test]
    fn load_without_store_is_an_invariant_violation() {
        let ctx = TypeContext::new();
        let int = ModifiedType::new(ctx.int());
        let mut body = Body::new();
        let x = body.add_variable(Variable::new(&ctx, "x", int, VariableKind::Temporary));
        let entry = body.new_label();
        let span = Span::default();

        body.append(NodeKind::Label(entry), None, span);
        let load = body.append(NodeKind::Load(Place::Local(x)), Some(int), span);
        body.append(
            NodeKind::Return {
                value: Some(load),
                implicit: false,
            },
            None,
            span,
        );

        assert!(matches!(
            place_phis(&mut body),
            Err(CompileError::InvariantViolation { .. })
        ));
    }
}
