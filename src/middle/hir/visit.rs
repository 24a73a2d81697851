//! Read-only traversal of the typed tree. Implementors override the nodes they
//! care about and call the matching `walk_*` function to keep descending.

use super::{Block, Class, Expr, ExprKind, Literal, MethodDecl, Stmt, StmtKind, Suffix, SuffixKind};

pub trait Visitor: Sized {
    fn visit_class(&mut self, class: &Class) {
        walk_class(self, class)
    }

    fn visit_method(&mut self, method: &MethodDecl) {
        walk_method(self, method)
    }

    fn visit_block(&mut self, block: &Block) {
        walk_block(self, block)
    }

    fn visit_statement(&mut self, statement: &Stmt) {
        walk_statement(self, statement)
    }

    fn visit_expression(&mut self, expression: &Expr) {
        walk_expression(self, expression)
    }

    fn visit_suffix(&mut self, suffix: &Suffix) {
        walk_suffix(self, suffix)
    }

    fn visit_literal(&mut self, _literal: &Literal) {}
}

pub fn walk_class(visitor: &mut impl Visitor, class: &Class) {
    for field in &class.fields {
        if let Some(initializer) = &field.initializer {
            visitor.visit_expression(initializer);
        }
    }

    for constant in &class.constants {
        visitor.visit_expression(&constant.value);
    }

    for method in &class.methods {
        visitor.visit_method(method);
    }

    for inner in &class.inner {
        visitor.visit_class(inner);
    }
}

pub fn walk_method(visitor: &mut impl Visitor, method: &MethodDecl) {
    if let Some(body) = &method.body {
        visitor.visit_block(body);
    }
}

pub fn walk_block(visitor: &mut impl Visitor, block: &Block) {
    for statement in &block.statements {
        visitor.visit_statement(statement);
    }
}

pub fn walk_statement(visitor: &mut impl Visitor, statement: &Stmt) {
    match &statement.kind {
        StmtKind::Local { initializer, .. } => {
            if let Some(initializer) = initializer {
                visitor.visit_expression(initializer);
            }
        }
        StmtKind::Expr(expression) | StmtKind::Throw(expression) => {
            visitor.visit_expression(expression)
        }
        StmtKind::Assign { targets, value, .. } => {
            for target in targets {
                visitor.visit_expression(target);
            }
            visitor.visit_expression(value);
        }
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            visitor.visit_expression(condition);
            visitor.visit_block(then_branch);

            if let Some(else_branch) = else_branch {
                visitor.visit_block(else_branch);
            }
        }
        StmtKind::While { condition, body } | StmtKind::Do { body, condition } => {
            visitor.visit_expression(condition);
            visitor.visit_block(body);
        }
        StmtKind::For {
            init,
            condition,
            update,
            body,
        } => {
            for statement in init {
                visitor.visit_statement(statement);
            }
            if let Some(condition) = condition {
                visitor.visit_expression(condition);
            }
            for statement in update {
                visitor.visit_statement(statement);
            }
            visitor.visit_block(body);
        }
        StmtKind::Foreach {
            collection, body, ..
        } => {
            visitor.visit_expression(collection);
            visitor.visit_block(body);
        }
        StmtKind::Break | StmtKind::Continue => {}
        StmtKind::Return(values) => {
            for value in values {
                visitor.visit_expression(value);
            }
        }
        StmtKind::Try {
            body,
            recover,
            catches,
            finally,
        } => {
            visitor.visit_block(body);
            for catch in catches {
                visitor.visit_block(&catch.body);
            }
            if let Some(recover) = recover {
                visitor.visit_block(recover);
            }
            if let Some(finally) = finally {
                visitor.visit_block(finally);
            }
        }
        StmtKind::Switch {
            scrutinee,
            cases,
            default,
        } => {
            visitor.visit_expression(scrutinee);
            for case in cases {
                for label in &case.labels {
                    visitor.visit_expression(label);
                }
                visitor.visit_block(&case.body);
            }
            if let Some(default) = default {
                visitor.visit_block(default);
            }
        }
        StmtKind::Block(block) => visitor.visit_block(block),
        StmtKind::ExplicitCreate { arguments, .. } => {
            for argument in arguments {
                visitor.visit_expression(argument);
            }
        }
    }
}

pub fn walk_expression(visitor: &mut impl Visitor, expression: &Expr) {
    match &expression.kind {
        ExprKind::Literal(literal) => visitor.visit_literal(literal),
        ExprKind::Local(_) | ExprKind::This | ExprKind::Constant { .. } => {}
        ExprKind::Chain { base, suffixes } => {
            visitor.visit_expression(base);
            for suffix in suffixes {
                visitor.visit_suffix(suffix);
            }
        }
        ExprKind::Unary { operand, .. } => visitor.visit_expression(operand),
        ExprKind::Binary { lhs, rhs, .. } | ExprKind::Compare { lhs, rhs, .. } => {
            visitor.visit_expression(lhs);
            visitor.visit_expression(rhs);
        }
        ExprKind::Or(operands) | ExprKind::And(operands) | ExprKind::Sequence(operands) => {
            for operand in operands {
                visitor.visit_expression(operand);
            }
        }
        ExprKind::Conditional {
            condition,
            then_value,
            else_value,
        } => {
            visitor.visit_expression(condition);
            visitor.visit_expression(then_value);
            visitor.visit_expression(else_value);
        }
        ExprKind::Coalesce { value, fallback } => {
            visitor.visit_expression(value);
            visitor.visit_expression(fallback);
        }
        ExprKind::Check(inner) | ExprKind::Cast(inner) => visitor.visit_expression(inner),
        ExprKind::Create { arguments, .. } => {
            for argument in arguments {
                visitor.visit_expression(argument);
            }
        }
        ExprKind::NewArray { sizes } => {
            for size in sizes {
                visitor.visit_expression(size);
            }
        }
    }
}

pub fn walk_suffix(visitor: &mut impl Visitor, suffix: &Suffix) {
    match &suffix.kind {
        SuffixKind::Field(_) | SuffixKind::Length => {}
        SuffixKind::Index(indices) => {
            for index in indices {
                visitor.visit_expression(index);
            }
        }
        SuffixKind::Call { arguments, .. } => {
            for argument in arguments {
                visitor.visit_expression(argument);
            }
        }
    }
}

/// Finds `this(...)` invocations. A create which delegates to another create
/// of its class must not run the field initializers itself.
#[derive(Debug, Default)]
pub struct DelegationFinder {
    pub delegates: bool,
}

impl DelegationFinder {
    pub fn delegates(block: &Block) -> bool {
        let mut finder = Self::default();
        finder.visit_block(block);
        finder.delegates
    }
}

impl Visitor for DelegationFinder {
    fn visit_statement(&mut self, statement: &Stmt) {
        if let StmtKind::ExplicitCreate {
            kind: super::CreateKind::This,
            ..
        } = statement.kind
        {
            self.delegates = true;
        }

        walk_statement(self, statement)
    }

    // expressions never contain statements
    fn visit_expression(&mut self, _expression: &Expr) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        index::Index,
        middle::{
            hir::CreateKind,
            ty::{ModifiedType, SignatureId, TypeContext},
        },
        span::Span,
    };

    #[derive(Default)]
    struct LiteralCounter(usize);

    impl Visitor for LiteralCounter {
        fn visit_literal(&mut self, _literal: &Literal) {
            self.0 += 1;
        }
    }

    #[test]
    fn finds_nested_delegation() {
        let ctx = TypeContext::new();
        let int = ModifiedType::new(ctx.int());
        let signature = SignatureId::new(0);

        let one = Expr::new(ExprKind::Literal(Literal::Int(1)), int, Span::new(5, 6));
        let delegate = Stmt::new(
            StmtKind::ExplicitCreate {
                kind: CreateKind::This,
                signature,
                arguments: vec![one.clone()],
            },
            Span::new(0, 8),
        );
        let inner = Block::new(vec![delegate], Span::new(0, 8));
        let nested = Block::new(
            vec![Stmt::new(StmtKind::Block(inner), Span::new(0, 10))],
            Span::new(0, 10),
        );

        assert!(DelegationFinder::delegates(&nested));
        assert!(!DelegationFinder::delegates(&Block::new(
            vec![Stmt::new(StmtKind::Expr(one.clone()), Span::new(0, 2))],
            Span::new(0, 2)
        )));

        let mut counter = LiteralCounter::default();
        counter.visit_block(&nested);
        assert_eq!(counter.0, 1);
    }
}
