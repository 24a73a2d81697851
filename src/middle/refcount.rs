//! Reference count instrumentation.
//!
//! Heap objects count their durable holders and a new allocation starts at
//! zero. A store is durable when its destination outlives the instruction: a
//! field, an array element or a reference counted variable. Before every
//! durable store of a reference the new value is incremented and the old one
//! is loaded and decremented. Every exit from the method releases the
//! reference counted variables. A returned reference is incremented first and
//! the caller adopts that count.
//!
//! A variable stored on some paths into an exit or a store but not on all of
//! them is set to null at entry, so the release never reads an unset slot.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::{
    error::Result,
    middle::{
        cfg::{ControlFlowGraph, ForwardAnalysis},
        lir::{Body, Literal, NodeId, NodeKind, Place, VariableId, VariableKind},
        module::Method,
        ty::{ModifiedType, TypeContext},
    },
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefcountSummary {
    pub increments: usize,
    pub decrements: usize,
}

/// Reference counted variables which have been stored on some path, or with
/// `all_paths` on every path
struct StoredVariables<'a> {
    body: &'a Body,
    all_paths: bool,
}

impl ForwardAnalysis for StoredVariables<'_> {
    type Fact = BTreeSet<VariableId>;

    fn entry(&self) -> Self::Fact {
        // parameters hold the caller's value, counted on entry
        self.body
            .variables
            .enumerate()
            .filter(|(_, v)| v.reference_counted && v.kind == VariableKind::Parameter)
            .map(|(id, _)| id)
            .collect()
    }

    fn top(&self) -> Self::Fact {
        match self.all_paths {
            true => self
                .body
                .variables
                .enumerate()
                .filter(|(_, v)| v.reference_counted)
                .map(|(id, _)| id)
                .collect(),
            false => BTreeSet::new(),
        }
    }

    fn meet(&self, a: &Self::Fact, b: &Self::Fact) -> Self::Fact {
        match self.all_paths {
            true => a.intersection(b).copied().collect(),
            false => a.union(b).copied().collect(),
        }
    }

    fn transfer(&self, body: &Body, node: NodeId, fact: &mut Self::Fact) {
        if let NodeKind::Store {
            place: Place::Local(variable),
            ..
        } = body.kind(node)
        {
            if body.variables[*variable].reference_counted {
                fact.insert(*variable);
            }
        }
    }
}

enum Edit {
    Store {
        store: NodeId,
        place: Place,
        increment: Option<NodeId>,
        release_old: bool,
        old_ty: Option<ModifiedType>,
    },
    Exit {
        exit: NodeId,
        returned: Vec<NodeId>,
        live: BTreeSet<VariableId>,
    },
}

pub fn insert_reference_counts(
    ctx: &TypeContext,
    method: &mut Method,
    max_iterations: usize,
) -> Result<RefcountSummary> {
    let signature = ctx.signature(method.signature);
    let Some(body) = method.body.as_mut() else {
        return Ok(RefcountSummary::default());
    };

    let cfg = ControlFlowGraph::build(body)?;
    let reachable = cfg.reachable();
    let may = StoredVariables {
        body,
        all_paths: false,
    };
    let must = StoredVariables {
        body,
        all_paths: true,
    };
    let stored_on_some = cfg.solve_forward(body, &may, max_iterations)?;
    let stored_on_all = cfg.solve_forward(body, &must, max_iterations)?;
    let is_reference = |ty: Option<ModifiedType>| ty.is_some_and(|ty| ctx.is_reference(ty.ty));

    let mut edits = Vec::new();
    // released somewhere without being stored on every path there
    let mut unset = BTreeSet::new();

    for block in cfg.blocks().filter(|b| reachable.contains(&b.label)) {
        let mut stored = stored_on_some.get(&block.label).cloned().unwrap_or_default();
        let mut definite = stored_on_all.get(&block.label).cloned().unwrap_or_default();
        // allocations of this block which nothing else has seen yet, with the
        // places of each which were already stored to
        let mut fresh: BTreeMap<NodeId, BTreeSet<String>> = BTreeMap::new();

        for node in &block.nodes {
            match body.kind(*node) {
                NodeKind::Store {
                    place,
                    value,
                    initializing,
                } => {
                    let durable = match place {
                        Place::Local(variable) => body.variables[*variable].reference_counted,
                        Place::Field { .. } | Place::Element { .. } => {
                            is_reference(body.node(*value).ty)
                        }
                        Place::Constant { .. } => false,
                    };

                    if !durable {
                        continue;
                    }

                    // a null holds nothing and a call result already carries
                    // the count its callee handed over
                    let increment = match body.kind(*value) {
                        NodeKind::Literal(Literal::Null) | NodeKind::Call { .. } => None,
                        _ => Some(*value),
                    };

                    let (release_old, old_ty) = match place {
                        _ if *initializing => (false, None),
                        Place::Local(variable) => {
                            if stored.contains(variable) && !definite.contains(variable) {
                                unset.insert(*variable);
                            }
                            (
                                stored.contains(variable),
                                Some(body.variables[*variable].ty),
                            )
                        }
                        Place::Field { object, name } => (
                            !fresh.get(object).is_some_and(|s| !s.contains(name)),
                            body.node(*object)
                                .ty
                                .and_then(|ty| ctx.field_type(ty.ty, name))
                                .or(body.node(*value).ty),
                        ),
                        Place::Element { array, .. } => (
                            !fresh.get(array).is_some_and(|s| !s.contains("[]")),
                            body.node(*array)
                                .ty
                                .and_then(|ty| ctx.as_array(ty.ty))
                                .map(|(element, _)| ModifiedType::new(element).nullable())
                                .or(body.node(*value).ty),
                        ),
                        Place::Constant { .. } => (false, None),
                    };

                    edits.push(Edit::Store {
                        store: *node,
                        place: place.clone(),
                        increment,
                        release_old,
                        old_ty,
                    });

                    match place {
                        Place::Local(variable) => {
                            stored.insert(*variable);
                            definite.insert(*variable);
                        }
                        Place::Field { object, name } => {
                            if let Some(places) = fresh.get_mut(object) {
                                places.insert(name.clone());
                            }
                        }
                        Place::Element { array, .. } => {
                            if let Some(places) = fresh.get_mut(array) {
                                places.insert("[]".to_string());
                            }
                        }
                        Place::Constant { .. } => {}
                    }
                }
                NodeKind::Allocate { .. } | NodeKind::AllocateArray { .. } => {
                    fresh.insert(*node, BTreeSet::new());
                }
                NodeKind::Call {
                    receiver,
                    arguments,
                    ..
                } => {
                    // the callee may store into anything it is handed
                    fresh.remove(receiver);
                    for argument in arguments {
                        fresh.remove(argument);
                    }
                }
                NodeKind::Return { value, .. } => {
                    let returned = match value {
                        Some(value) if !signature.is_create() => match body.kind(*value) {
                            NodeKind::Sequence(values) => values
                                .iter()
                                .copied()
                                .filter(|v| is_reference(body.node(*v).ty))
                                .collect(),
                            _ if is_reference(body.node(*value).ty) => vec![*value],
                            _ => Vec::new(),
                        },
                        _ => Vec::new(),
                    };

                    unset.extend(stored.difference(&definite).copied());
                    edits.push(Edit::Exit {
                        exit: *node,
                        returned,
                        live: stored.clone(),
                    });
                }
                NodeKind::Throw { .. } | NodeKind::EnterFinally { resume: None, .. } => {
                    unset.extend(stored.difference(&definite).copied());
                    edits.push(Edit::Exit {
                        exit: *node,
                        returned: Vec::new(),
                        live: stored.clone(),
                    });
                }
                _ => {}
            }
        }
    }

    let mut summary = RefcountSummary::default();

    for edit in edits {
        match edit {
            Edit::Store {
                store,
                place,
                increment,
                release_old,
                old_ty,
            } => {
                let span = body.node(store).span;

                if let Some(value) = increment {
                    body.insert_before(store, NodeKind::Increment { value }, None, span);
                    summary.increments += 1;
                }

                if release_old {
                    let old = body.insert_before(store, NodeKind::Load(place), old_ty, span);
                    body.insert_before(store, NodeKind::Decrement { value: old }, None, span);
                    summary.decrements += 1;
                }
            }
            Edit::Exit {
                exit,
                returned,
                live,
            } => {
                let span = body.node(exit).span;

                for value in returned {
                    body.insert_before(exit, NodeKind::Increment { value }, None, span);
                    summary.increments += 1;
                }

                for variable in live {
                    let ty = body.variables[variable].ty;
                    let value =
                        body.insert_before(exit, NodeKind::Load(Place::Local(variable)), Some(ty), span);
                    body.insert_before(exit, NodeKind::Decrement { value }, None, span);
                    summary.decrements += 1;
                }
            }
        }
    }

    // parameters are counted on entry so that releasing them on exit balances
    let entry = cfg.block(cfg.entry).map(|block| block.label_node());
    if let Some(mut anchor) = entry {
        let parameters = body
            .variables
            .enumerate()
            .filter(|(_, v)| v.reference_counted && v.kind == VariableKind::Parameter)
            .map(|(id, v)| (id, v.ty))
            .collect::<Vec<_>>();

        for (variable, ty) in parameters {
            let span = body.node(anchor).span;
            let value = body.insert_after(anchor, NodeKind::Load(Place::Local(variable)), Some(ty), span);
            anchor = body.insert_after(value, NodeKind::Increment { value }, None, span);
            summary.increments += 1;
        }

        for variable in unset {
            let span = body.node(anchor).span;
            let null = ModifiedType::new(ctx.null()).nullable();
            let value = body.insert_after(anchor, NodeKind::Literal(Literal::Null), Some(null), span);
            anchor = body.insert_after(
                value,
                NodeKind::Store {
                    place: Place::Local(variable),
                    value,
                    initializing: false,
                },
                None,
                span,
            );
        }
    }

    debug!(
        "{}: inserted {} increments and {} decrements",
        signature.mangled_name, summary.increments, summary.decrements
    );

    Ok(summary)
}
