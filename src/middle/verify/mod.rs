//! Checks that every create of a module leaves each non-nullable reference
//! field initialized, and that no field is read before it is written.
//!
//! Creates are analysed in delegation order so that a `this(...)` call can
//! credit the fields the delegated create is known to initialize. Locked and
//! private methods called on `this` are summarized by the fields they read
//! before writing them, which makes calling them from a create a read of
//! those fields.

use std::collections::{BTreeMap, BTreeSet};

use log::trace;

use crate::{
    diagnostics::{DiagnosticCollector, DiagnosticKind, report},
    error::Result,
    middle::{
        cfg::{ControlFlowGraph, ForwardAnalysis},
        lir::{Body, CallKind, NodeId, NodeKind, Place},
        module::Module,
        ty::{SignatureId, TypeContext},
    },
    span::Span,
};

pub mod call_graph;

use call_graph::{CallGraph, CreateGraph, is_this};

/// Verifies `module` and its nested modules
pub fn check_field_initialization(
    ctx: &TypeContext,
    module: &Module,
    max_iterations: usize,
    diagnostics: &mut DiagnosticCollector,
) -> Result<()> {
    check_module(ctx, module, max_iterations, diagnostics)?;

    for inner in &module.inner {
        check_field_initialization(ctx, inner, max_iterations, diagnostics)?;
    }

    Ok(())
}

fn check_module(
    ctx: &TypeContext,
    module: &Module,
    max_iterations: usize,
    diagnostics: &mut DiagnosticCollector,
) -> Result<()> {
    let creates = CreateGraph::build(ctx, module);
    let order = match creates.topological_order() {
        Ok(order) => order,
        Err(cycle) => {
            let span = cycle
                .first()
                .and_then(|create| module.method(*create))
                .map_or(module.span, |method| method.span);

            report!(
                diagnostics,
                DiagnosticKind::CircularCreate,
                span,
                "create calls are circular"
            );
            return Ok(());
        }
    };

    let required = module
        .fields
        .iter()
        .filter(|field| field.needs_initialization(ctx))
        .map(|field| field.name.clone())
        .collect::<BTreeSet<_>>();

    if required.is_empty() {
        return Ok(());
    }

    let call_graph = CallGraph::build(ctx, module);
    let used = used_before_written(ctx, module, &call_graph, &required, max_iterations)?;
    let mut initialized: BTreeMap<SignatureId, BTreeSet<String>> = BTreeMap::new();

    for create in order {
        let Some(method) = module.method(create) else {
            continue;
        };
        let signature = ctx.signature(create);

        let Some(body) = &method.body else {
            // implemented elsewhere, trusted to initialize everything
            initialized.insert(create, required.clone());
            continue;
        };

        let analysis = FieldWrites {
            required: &required,
            delegated: &initialized,
        };
        let summary = summarize(body, &analysis, &used, max_iterations)?;

        for read in &summary.reads {
            match read.through {
                Some(callee) => {
                    report!(
                        diagnostics,
                        DiagnosticKind::FieldUsedBeforeInitialization,
                        read.span,
                        "field {} is used by {} before it is initialized",
                        read.field,
                        ctx.signature(callee).name
                    );
                }
                None => {
                    report!(
                        diagnostics,
                        DiagnosticKind::FieldUsedBeforeInitialization,
                        read.span,
                        "field {} is used before it is initialized",
                        read.field
                    );
                }
            }
        }

        // private creates are only reachable through another create
        if !signature.modifiers.is_private() {
            for field in required.difference(&summary.initialized) {
                let span = match method.synthesized {
                    true => module
                        .fields
                        .iter()
                        .find(|f| &f.name == field)
                        .map_or(method.span, |f| f.span),
                    false => method.span,
                };

                report!(
                    diagnostics,
                    DiagnosticKind::UninitializedField,
                    span,
                    "non-nullable field {field} might not be initialized by a create"
                );
            }
        }

        trace!(
            "{} initializes {:?}",
            signature.mangled_name, summary.initialized
        );
        initialized.insert(create, summary.initialized);
    }

    Ok(())
}

/// Fields of `this` written on every path so far
struct FieldWrites<'a> {
    required: &'a BTreeSet<String>,
    /// Fields initialized by the creates analysed so far
    delegated: &'a BTreeMap<SignatureId, BTreeSet<String>>,
}

impl ForwardAnalysis for FieldWrites<'_> {
    type Fact = BTreeSet<String>;

    fn entry(&self) -> Self::Fact {
        BTreeSet::new()
    }

    fn top(&self) -> Self::Fact {
        self.required.clone()
    }

    fn meet(&self, a: &Self::Fact, b: &Self::Fact) -> Self::Fact {
        a.intersection(b).cloned().collect()
    }

    fn transfer(&self, body: &Body, node: NodeId, fact: &mut Self::Fact) {
        match body.kind(node) {
            NodeKind::Store {
                place: Place::Field { object, name },
                ..
            } if is_this(body, *object) && self.required.contains(name) => {
                fact.insert(name.clone());
            }
            NodeKind::Call {
                signature,
                kind: CallKind::Delegate,
                ..
            } => {
                if let Some(fields) = self.delegated.get(signature) {
                    fact.extend(fields.iter().cloned());
                }
            }
            _ => {}
        }
    }
}

struct Read {
    field: String,
    span: Span,
    /// The method reading the field, when it is read by a call
    through: Option<SignatureId>,
}

struct Summary {
    reads: Vec<Read>,
    /// Fields initialized on every reachable return
    initialized: BTreeSet<String>,
}

fn summarize(
    body: &Body,
    analysis: &FieldWrites<'_>,
    used: &BTreeMap<SignatureId, BTreeSet<String>>,
    max_iterations: usize,
) -> Result<Summary> {
    let cfg = ControlFlowGraph::build(body)?;
    let reachable = cfg.reachable();
    let facts = cfg.solve_forward(body, analysis, max_iterations)?;

    // loads of the old value ahead of a store only feed its release
    let released = body
        .iter()
        .filter_map(|id| match body.kind(id) {
            NodeKind::Decrement { value } => Some(*value),
            _ => None,
        })
        .collect::<BTreeSet<_>>();

    let mut reads = Vec::new();
    let mut initialized: Option<BTreeSet<String>> = None;

    for block in cfg.blocks().filter(|b| reachable.contains(&b.label)) {
        let Some(mut fact) = facts.get(&block.label).cloned() else {
            continue;
        };

        for node in &block.nodes {
            match body.kind(*node) {
                NodeKind::Load(Place::Field { object, name })
                    if is_this(body, *object)
                        && analysis.required.contains(name)
                        && !fact.contains(name)
                        && !released.contains(node) =>
                {
                    reads.push(Read {
                        field: name.clone(),
                        span: body.node(*node).span,
                        through: None,
                    });
                }
                NodeKind::Call {
                    signature,
                    receiver,
                    ..
                } if is_this(body, *receiver) => {
                    for field in used.get(signature).into_iter().flatten() {
                        if !fact.contains(field) {
                            reads.push(Read {
                                field: field.clone(),
                                span: body.node(*node).span,
                                through: Some(*signature),
                            });
                        }
                    }
                }
                NodeKind::Return { .. } => {
                    initialized = Some(match initialized {
                        Some(fields) => fields.intersection(&fact).cloned().collect(),
                        None => fact.clone(),
                    });
                }
                _ => {}
            }

            analysis.transfer(body, *node, &mut fact);
        }
    }

    Ok(Summary {
        reads,
        // a create which never returns initializes everything vacuously
        initialized: initialized.unwrap_or_else(|| analysis.required.clone()),
    })
}

/// For every locked or private method, the fields it may read before writing
/// them itself, including through the methods it calls on `this`
fn used_before_written(
    ctx: &TypeContext,
    module: &Module,
    call_graph: &CallGraph,
    required: &BTreeSet<String>,
    max_iterations: usize,
) -> Result<BTreeMap<SignatureId, BTreeSet<String>>> {
    let mut used: BTreeMap<SignatureId, BTreeSet<String>> = call_graph
        .nodes()
        .filter(|signature| !ctx.signature(*signature).is_create())
        .map(|signature| (signature, BTreeSet::new()))
        .collect();

    let no_delegates = BTreeMap::new();
    let analysis = FieldWrites {
        required,
        delegated: &no_delegates,
    };
    let mut worklist = used.keys().copied().collect::<BTreeSet<_>>();

    while let Some(signature) = worklist.pop_first() {
        let Some(body) = module.method(signature).and_then(|m| m.body.as_ref()) else {
            continue;
        };

        let summary = summarize(body, &analysis, &used, max_iterations)?;
        let fields = used.entry(signature).or_default();
        let before = fields.len();
        fields.extend(summary.reads.into_iter().map(|read| read.field));

        if fields.len() != before {
            let callers = call_graph
                .callers(signature)
                .filter(|caller| used.contains_key(caller))
                .collect::<Vec<_>>();
            worklist.extend(callers);
        }
    }

    Ok(used)
}
