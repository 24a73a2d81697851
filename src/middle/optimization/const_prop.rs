use crate::middle::{
    hir::UnaryOp,
    lir::{Body, Branch, Literal, NodeId, NodeKind},
};

/// Replaces conditional branches on a known boolean with unconditional ones.
/// Only the direct definition of the condition is inspected: a literal, or a
/// negation of something known. Returns whether any branch was rewritten.
pub fn propagate_constants(body: &mut Body) -> bool {
    let branches = body
        .iter()
        .filter_map(|id| match body.kind(id) {
            NodeKind::Branch(Branch::Conditional {
                condition,
                on_true,
                on_false,
            }) => Some((id, *condition, *on_true, *on_false)),
            _ => None,
        })
        .collect::<Vec<_>>();

    let mut changed = false;

    for (branch, condition, on_true, on_false) in branches {
        let Some(value) = constant_condition(body, condition) else {
            continue;
        };

        let target = match value {
            true => on_true,
            false => on_false,
        };

        body.replace(branch, NodeKind::Branch(Branch::Unconditional(target)));
        changed = true;
    }

    changed
}

fn constant_condition(body: &Body, condition: NodeId) -> Option<bool> {
    match body.kind(condition) {
        NodeKind::Literal(Literal::Bool(value)) => Some(*value),
        NodeKind::Unary {
            operator: UnaryOp::Not,
            operand,
        } => constant_condition(body, *operand).map(|value| !value),
        _ => None,
    }
}
