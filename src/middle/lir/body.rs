use std::collections::BTreeMap;

use crate::{
    index::IndexVec,
    middle::{
        lir::{Label, LabelId, Node, NodeId, NodeKind, Variable, VariableId, VariableKind},
        ty::{ModifiedType, TypeContext},
    },
    span::Span,
};

/// The instruction stream of one method. Nodes live in an arena and are
/// chained through their `prev`/`next` links. Passes never edit a node's kind
/// in place: they allocate a replacement and splice it into the stream, so a
/// [`NodeId`] always names the same value.
#[derive(Debug, Clone, Default)]
pub struct Body {
    pub nodes: IndexVec<NodeId, Node>,
    pub labels: IndexVec<LabelId, Label>,
    pub variables: IndexVec<VariableId, Variable>,
    pub entry: Option<NodeId>,
    pub tail: Option<NodeId>,
}

impl Variable {
    pub fn new(
        ctx: &TypeContext,
        name: impl Into<String>,
        ty: ModifiedType,
        kind: VariableKind,
    ) -> Self {
        let is_local = matches!(kind, VariableKind::Local | VariableKind::Temporary);
        let primitive = ctx.is_primitive(ty.ty);

        Self {
            name: name.into(),
            ty,
            kind,
            threaded: is_local && primitive,
            reference_counted: ctx.is_reference(ty.ty) && kind != VariableKind::This,
        }
    }
}

impl Body {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(&mut self, variable: Variable) -> VariableId {
        self.variables.push(variable)
    }

    pub fn new_label(&mut self) -> LabelId {
        self.labels.push(Label {
            node: None,
            incoming: BTreeMap::new(),
        })
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id].kind
    }

    /// Allocates a node without linking it into the stream
    fn allocate(&mut self, kind: NodeKind, ty: Option<ModifiedType>, span: Span) -> NodeId {
        self.nodes.push(Node {
            kind,
            ty,
            span,
            prev: None,
            next: None,
            linked: false,
        })
    }

    fn record_label(&mut self, id: NodeId) {
        if let NodeKind::Label(label) = self.nodes[id].kind {
            self.labels[label].node = Some(id);
        }
    }

    pub fn append(&mut self, kind: NodeKind, ty: Option<ModifiedType>, span: Span) -> NodeId {
        let id = self.allocate(kind, ty, span);

        match self.tail {
            Some(tail) => {
                self.nodes[tail].next = Some(id);
                self.nodes[id].prev = Some(tail);
            }
            None => self.entry = Some(id),
        }

        self.nodes[id].linked = true;
        self.tail = Some(id);
        self.record_label(id);
        id
    }

    pub fn insert_before(
        &mut self,
        anchor: NodeId,
        kind: NodeKind,
        ty: Option<ModifiedType>,
        span: Span,
    ) -> NodeId {
        let id = self.allocate(kind, ty, span);
        let prev = self.nodes[anchor].prev;

        self.nodes[id].prev = prev;
        self.nodes[id].next = Some(anchor);
        self.nodes[anchor].prev = Some(id);

        match prev {
            Some(prev) => self.nodes[prev].next = Some(id),
            None => self.entry = Some(id),
        }

        self.nodes[id].linked = true;
        self.record_label(id);
        id
    }

    pub fn insert_after(
        &mut self,
        anchor: NodeId,
        kind: NodeKind,
        ty: Option<ModifiedType>,
        span: Span,
    ) -> NodeId {
        let id = self.allocate(kind, ty, span);
        let next = self.nodes[anchor].next;

        self.nodes[id].prev = Some(anchor);
        self.nodes[id].next = next;
        self.nodes[anchor].next = Some(id);

        match next {
            Some(next) => self.nodes[next].prev = Some(id),
            None => self.tail = Some(id),
        }

        self.nodes[id].linked = true;
        self.record_label(id);
        id
    }

    /// Removes a node from the stream. Its arena slot stays allocated.
    pub fn unlink(&mut self, id: NodeId) {
        if !self.nodes[id].linked {
            return;
        }

        let (prev, next) = (self.nodes[id].prev, self.nodes[id].next);

        match prev {
            Some(prev) => self.nodes[prev].next = next,
            None => self.entry = next,
        }
        match next {
            Some(next) => self.nodes[next].prev = prev,
            None => self.tail = prev,
        }

        if let NodeKind::Label(label) = self.nodes[id].kind {
            if self.labels[label].node == Some(id) {
                self.labels[label].node = None;
            }
        }

        let node = &mut self.nodes[id];
        node.prev = None;
        node.next = None;
        node.linked = false;
    }

    /// Splices a new node with the given kind in place of `old` and redirects
    /// every use of `old` to it
    pub fn replace(&mut self, old: NodeId, kind: NodeKind) -> NodeId {
        let (ty, span) = (self.nodes[old].ty, self.nodes[old].span);
        let new = self.insert_before(old, kind, ty, span);
        self.unlink(old);
        self.substitute_uses(&BTreeMap::from([(old, new)]));
        new
    }

    /// Walks the stream from the entry node
    pub fn iter(&self) -> NodeIter<'_> {
        NodeIter {
            body: self,
            next: self.entry,
        }
    }

    /// Rewrites operands of every linked node through `substitutions`.
    /// Substitution chains are followed to their end.
    pub fn substitute_uses(&mut self, substitutions: &BTreeMap<NodeId, NodeId>) {
        if substitutions.is_empty() {
            return;
        }

        let resolve = |mut id: NodeId| {
            // chains are acyclic, but bound the walk anyway
            for _ in 0..=substitutions.len() {
                match substitutions.get(&id) {
                    Some(next) if *next != id => id = *next,
                    _ => break,
                }
            }
            id
        };

        let linked = self.iter().collect::<Vec<_>>();
        for id in linked {
            for operand in self.nodes[id].kind.operands_mut() {
                *operand = resolve(*operand);
            }
        }
    }

    /// Linked nodes which consume the value of each node
    pub fn users(&self) -> BTreeMap<NodeId, Vec<NodeId>> {
        let mut users: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();

        for id in self.iter() {
            for operand in self.nodes[id].kind.operands() {
                users.entry(operand).or_default().push(id);
            }
        }

        users
    }

    pub fn is_linked(&self, id: NodeId) -> bool {
        self.nodes[id].linked
    }

    /// Number of nodes currently in the stream
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }
}

pub struct NodeIter<'a> {
    body: &'a Body,
    next: Option<NodeId>,
}

impl Iterator for NodeIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.body.nodes[current].next;
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::lir::{Branch, Literal};

    #[test]
    fn linking_keeps_stream_order() {
        let mut body = Body::new();
        let label = body.new_label();

        let l = body.append(NodeKind::Label(label), None, Span::default());
        let ret = body.append(
            NodeKind::Return {
                value: None,
                implicit: true,
            },
            None,
            Span::default(),
        );
        let one = body.insert_after(l, NodeKind::Literal(Literal::Int(1)), None, Span::default());
        let zero = body.insert_before(one, NodeKind::Literal(Literal::Int(0)), None, Span::default());

        assert_eq!(body.iter().collect::<Vec<_>>(), vec![l, zero, one, ret]);
        assert_eq!(body.labels[label].node, Some(l));

        body.unlink(zero);
        body.unlink(ret);
        assert_eq!(body.iter().collect::<Vec<_>>(), vec![l, one]);
        assert_eq!(body.tail, Some(one));
        assert!(!body.is_linked(zero));
    }

    #[test]
    fn replace_redirects_uses() {
        let mut body = Body::new();
        let label = body.new_label();
        let target = body.new_label();

        body.append(NodeKind::Label(label), None, Span::default());
        let condition = body.append(NodeKind::Literal(Literal::Bool(true)), None, Span::default());
        let branch = body.append(
            NodeKind::Branch(Branch::Conditional {
                condition,
                on_true: target,
                on_false: target,
            }),
            None,
            Span::default(),
        );

        let negated = body.replace(condition, NodeKind::Literal(Literal::Bool(false)));

        assert!(!body.is_linked(condition));
        assert_eq!(body.kind(branch).operands(), vec![negated]);
        assert_eq!(body.users()[&negated], vec![branch]);
    }
}
