use std::collections::{BTreeMap, BTreeSet};

use crate::middle::{
    lir::{Body, CallKind, NodeId, NodeKind, Place, VariableKind},
    module::Module,
    ty::{Modifiers, SignatureId, TypeContext},
};

/// Whether `node` loads the receiver of the method
pub(super) fn is_this(body: &Body, node: NodeId) -> bool {
    match body.kind(node) {
        NodeKind::Load(Place::Local(variable)) => {
            body.variables[*variable].kind == VariableKind::This
        }
        _ => false,
    }
}

fn calls(body: &Body) -> impl Iterator<Item = (NodeId, SignatureId, NodeId, CallKind)> + '_ {
    body.iter().filter_map(|id| match body.kind(id) {
        NodeKind::Call {
            signature,
            receiver,
            kind,
            ..
        } => Some((id, *signature, *receiver, *kind)),
        _ => None,
    })
}

/// Calls between the creates of a module and the methods they may run while
/// the object is still partially initialized: locked and private methods,
/// invoked on `this`.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    nodes: BTreeSet<SignatureId>,
    /// Callee to the methods invoking it
    callers: BTreeMap<SignatureId, BTreeSet<SignatureId>>,
}

impl CallGraph {
    pub fn build(ctx: &TypeContext, module: &Module) -> Self {
        let nodes = module
            .methods
            .iter()
            .filter(|m| m.body.is_some())
            .filter(|m| {
                let signature = ctx.signature(m.signature);
                signature.is_create()
                    || signature.modifiers.is_locked()
                    || signature.modifiers.is_private()
            })
            .map(|m| m.signature)
            .collect::<BTreeSet<_>>();

        let mut callers: BTreeMap<SignatureId, BTreeSet<SignatureId>> = BTreeMap::new();

        for method in &module.methods {
            let Some(body) = &method.body else {
                continue;
            };
            if !nodes.contains(&method.signature) {
                continue;
            }

            for (_, callee, receiver, _) in calls(body) {
                if nodes.contains(&callee) && is_this(body, receiver) {
                    callers.entry(callee).or_default().insert(method.signature);
                }
            }
        }

        Self { nodes, callers }
    }

    pub fn contains(&self, signature: SignatureId) -> bool {
        self.nodes.contains(&signature)
    }

    pub fn nodes(&self) -> impl Iterator<Item = SignatureId> + '_ {
        self.nodes.iter().copied()
    }

    pub fn callers(&self, callee: SignatureId) -> impl Iterator<Item = SignatureId> + '_ {
        self.callers.get(&callee).into_iter().flatten().copied()
    }
}

/// Creates of a module and the create each one delegates to with `this(...)`
#[derive(Debug, Clone, Default)]
pub struct CreateGraph {
    creates: BTreeSet<SignatureId>,
    delegates: BTreeMap<SignatureId, SignatureId>,
}

impl CreateGraph {
    pub fn build(ctx: &TypeContext, module: &Module) -> Self {
        let mut graph = Self::default();

        for method in &module.methods {
            let signature = ctx.signature(method.signature);
            if !signature.is_create() {
                continue;
            }
            graph.creates.insert(method.signature);

            let Some(body) = &method.body else {
                continue;
            };

            let target = calls(body).find_map(|(_, callee, _, kind)| {
                let target = ctx.signature(callee);
                let external = target
                    .modifiers
                    .intersects(Modifiers::IMPORT | Modifiers::NATIVE);

                (kind == CallKind::Delegate && target.owner == module.ty && !external)
                    .then_some(callee)
            });

            if let Some(target) = target {
                graph.delegates.insert(method.signature, target);
            }
        }

        graph
    }

    pub fn delegate(&self, create: SignatureId) -> Option<SignatureId> {
        self.delegates.get(&create).copied()
    }

    /// Orders the creates so that every create comes after the one it
    /// delegates to. Ties are broken by signature order. On a cycle, returns
    /// the creates which could not be ordered.
    pub fn topological_order(&self) -> Result<Vec<SignatureId>, Vec<SignatureId>> {
        let mut dependents: BTreeMap<SignatureId, Vec<SignatureId>> = BTreeMap::new();
        let mut pending: BTreeMap<SignatureId, usize> = BTreeMap::new();

        for create in &self.creates {
            match self.delegates.get(create) {
                Some(target) if self.creates.contains(target) => {
                    dependents.entry(*target).or_default().push(*create);
                    pending.insert(*create, 1);
                }
                _ => {
                    pending.insert(*create, 0);
                }
            }
        }

        let mut ready = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(create, _)| *create)
            .collect::<BTreeSet<_>>();
        let mut order = Vec::with_capacity(self.creates.len());

        while let Some(create) = ready.pop_first() {
            order.push(create);
            pending.remove(&create);

            for dependent in dependents.get(&create).into_iter().flatten() {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        match pending.is_empty() {
            true => Ok(order),
            false => Err(pending.into_keys().collect()),
        }
    }
}
