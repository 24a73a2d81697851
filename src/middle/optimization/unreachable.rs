use log::trace;

use crate::{
    diagnostics::{DiagnosticCollector, DiagnosticKind, report},
    error::Result,
    middle::{
        cfg::{ControlFlowGraph, phi},
        lir::{Body, Branch, NodeId, NodeKind, Place, VariableKind},
    },
    span::Span,
};

/// Unlinks every block not reachable from the method entry. When a collector
/// is given, each removed block containing user code is reported. Phis are
/// then restricted to their current predecessors, which also drops the edges
/// of a branch folded to one side while the other side stays reachable.
/// Returns whether anything changed.
pub fn remove_unreachable_code(
    body: &mut Body,
    mut diagnostics: Option<&mut DiagnosticCollector>,
) -> Result<bool> {
    let cfg = ControlFlowGraph::build(body)?;
    let reachable = cfg.reachable();
    let mut removed = 0;

    for block in cfg.blocks().filter(|b| !reachable.contains(&b.label)) {
        if let Some(diagnostics) = diagnostics.as_deref_mut() {
            let span = block
                .nodes
                .iter()
                .filter(|node| is_user_code(body, **node))
                .map(|node| body.node(*node).span)
                .reduce(Span::to);

            if let Some(span) = span {
                report!(diagnostics, DiagnosticKind::UnreachableCode, span, "unreachable code");
            }
        }

        for node in &block.nodes {
            body.unlink(*node);
        }
        removed += 1;
    }

    if removed > 0 {
        trace!("removed {removed} unreachable blocks");
    }

    let cfg = ControlFlowGraph::build(body)?;
    let pruned = phi::prune_phis(body, &cfg);

    Ok(removed > 0 || pruned)
}

/// Labels, phis, plain branches and the implicit return added at the end of a
/// method are bookkeeping, not code the user wrote
fn is_user_code(body: &Body, node: NodeId) -> bool {
    match body.kind(node) {
        NodeKind::Label(_)
        | NodeKind::Phi { .. }
        | NodeKind::Branch(Branch::Unconditional(_))
        | NodeKind::Return { implicit: true, .. } => false,
        NodeKind::Load(Place::Local(variable)) => {
            body.variables[*variable].kind != VariableKind::This
        }
        _ => true,
    }
}
