#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use tacc::{
    config::Config,
    diagnostics::{DiagnosticCollector, DiagnosticKind},
    middle::{
        hir::{self, Block, CompareOp, Expr, ExprKind, Literal, Stmt, StmtKind, Suffix, SuffixKind},
        lir::{Body, NodeKind, pretty_print},
        module::{self, Module},
        ty::{ClassType, Modifiers, ModifiedType, SignatureId, SignatureKind, TypeContext, TypeId},
    },
    pipeline,
    span::Span,
};

/// Hands out disjoint spans so that diagnostics never shadow each other
pub fn span() -> Span {
    static NEXT: AtomicUsize = AtomicUsize::new(1);
    let start = NEXT.fetch_add(10, Ordering::Relaxed);
    Span::new(start, start + 5)
}

/* Types */

pub fn int(ctx: &TypeContext) -> ModifiedType {
    ModifiedType::new(ctx.int())
}

pub fn boolean(ctx: &TypeContext) -> ModifiedType {
    ModifiedType::new(ctx.boolean())
}

pub fn string(ctx: &TypeContext) -> ModifiedType {
    ModifiedType::new(ctx.string())
}

/* Expressions */

pub fn int_literal(ctx: &TypeContext, value: i64) -> Expr {
    Expr::new(ExprKind::Literal(Literal::Int(value)), int(ctx), span())
}

pub fn bool_literal(ctx: &TypeContext, value: bool) -> Expr {
    Expr::new(ExprKind::Literal(Literal::Bool(value)), boolean(ctx), span())
}

pub fn string_literal(ctx: &TypeContext, value: &str) -> Expr {
    Expr::new(
        ExprKind::Literal(Literal::String(value.to_string())),
        string(ctx),
        span(),
    )
}

pub fn local(name: &str, ty: ModifiedType) -> Expr {
    Expr::new(ExprKind::Local(name.to_string()), ty, span())
}

pub fn this(class: TypeId) -> Expr {
    Expr::new(ExprKind::This, ModifiedType::new(class), span())
}

/// `this.name`
pub fn this_field(class: TypeId, name: &str, ty: ModifiedType) -> Expr {
    Expr::new(
        ExprKind::Chain {
            base: Box::new(this(class)),
            suffixes: vec![Suffix {
                kind: SuffixKind::Field(name.to_string()),
                ty,
                span: span(),
            }],
        },
        ty,
        span(),
    )
}

/// `this.method(arguments)`
pub fn this_call(ctx: &TypeContext, class: TypeId, signature: SignatureId, arguments: Vec<Expr>) -> Expr {
    let ty = ctx
        .signature(signature)
        .returns
        .first()
        .copied()
        .unwrap_or_else(|| ModifiedType::new(ctx.object()));

    Expr::new(
        ExprKind::Chain {
            base: Box::new(this(class)),
            suffixes: vec![Suffix {
                kind: SuffixKind::Call {
                    signature,
                    arguments,
                },
                ty,
                span: span(),
            }],
        },
        ty,
        span(),
    )
}

pub fn create(class: TypeId, signature: SignatureId, arguments: Vec<Expr>) -> Expr {
    Expr::new(
        ExprKind::Create {
            signature,
            arguments,
        },
        ModifiedType::new(class),
        span(),
    )
}

pub fn less(ctx: &TypeContext, lhs: Expr, rhs: Expr) -> Expr {
    Expr::new(
        ExprKind::Compare {
            operator: CompareOp::Less,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        boolean(ctx),
        span(),
    )
}

pub fn or(ctx: &TypeContext, operands: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::Or(operands), boolean(ctx), span())
}

/* Statements */

pub fn stmt(kind: StmtKind) -> Stmt {
    Stmt::new(kind, span())
}

pub fn block(statements: Vec<Stmt>) -> Block {
    Block::new(statements, span())
}

pub fn declare(name: &str, ty: ModifiedType, initializer: Option<Expr>) -> Stmt {
    stmt(StmtKind::Local {
        name: name.to_string(),
        ty,
        initializer,
    })
}

pub fn assign(target: Expr, value: Expr) -> Stmt {
    stmt(StmtKind::Assign {
        targets: vec![target],
        operator: None,
        value,
    })
}

pub fn if_else(condition: Expr, then_branch: Vec<Stmt>, else_branch: Option<Vec<Stmt>>) -> Stmt {
    stmt(StmtKind::If {
        condition,
        then_branch: block(then_branch),
        else_branch: else_branch.map(block),
    })
}

pub fn ret(values: Vec<Expr>) -> Stmt {
    stmt(StmtKind::Return(values))
}

pub fn delegate(signature: SignatureId, arguments: Vec<Expr>) -> Stmt {
    stmt(StmtKind::ExplicitCreate {
        kind: hir::CreateKind::This,
        signature,
        arguments,
    })
}

/* Classes */

pub fn class(ctx: &mut TypeContext, name: &str) -> hir::Class {
    let mut ty = ClassType::new(name);
    ty.extends = Some(ctx.object());

    hir::Class {
        ty: ctx.add_class(ty),
        span: span(),
        fields: Vec::new(),
        constants: Vec::new(),
        methods: Vec::new(),
        inner: Vec::new(),
    }
}

pub fn add_field(ctx: &mut TypeContext, class: &mut hir::Class, name: &str, ty: ModifiedType) {
    ctx.add_field(class.ty, name, ty);
    class.fields.push(hir::FieldDecl {
        name: name.to_string(),
        ty,
        initializer: None,
        span: span(),
    });
}

pub struct MethodBuilder<'a> {
    name: &'a str,
    kind: SignatureKind,
    parameters: Vec<(&'a str, ModifiedType)>,
    returns: Vec<ModifiedType>,
    modifiers: Modifiers,
}

impl<'a> MethodBuilder<'a> {
    pub fn method(name: &'a str) -> Self {
        Self {
            name,
            kind: SignatureKind::Method,
            parameters: Vec::new(),
            returns: Vec::new(),
            modifiers: Modifiers::PUBLIC,
        }
    }

    pub fn create() -> Self {
        Self {
            kind: SignatureKind::Create,
            ..Self::method("create")
        }
    }

    pub fn parameter(mut self, name: &'a str, ty: ModifiedType) -> Self {
        self.parameters.push((name, ty));
        self
    }

    pub fn returns(mut self, ty: ModifiedType) -> Self {
        self.returns.push(ty);
        self
    }

    pub fn modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Registers the signature without a body yet
    pub fn declare(self, ctx: &mut TypeContext, class: &hir::Class) -> (SignatureId, Vec<String>) {
        let signature = ctx.add_signature(
            class.ty,
            self.name,
            self.kind,
            self.parameters.iter().map(|(_, ty)| *ty).collect(),
            self.returns,
            self.modifiers,
            span(),
        );

        (
            signature,
            self.parameters.iter().map(|(name, _)| name.to_string()).collect(),
        )
    }

    pub fn build(self, ctx: &mut TypeContext, class: &mut hir::Class, body: Vec<Stmt>) -> SignatureId {
        let (signature, parameter_names) = self.declare(ctx, class);
        define(class, signature, parameter_names, body);
        signature
    }
}

/// Attaches a body to a signature registered with [`MethodBuilder::declare`]
pub fn define(class: &mut hir::Class, signature: SignatureId, parameter_names: Vec<String>, body: Vec<Stmt>) {
    class.methods.push(hir::MethodDecl {
        signature,
        parameter_names,
        body: Some(block(body)),
        span: span(),
        synthesized: false,
    });
}

/* Compilation */

pub fn compile_with(
    ctx: &mut TypeContext,
    mut class: hir::Class,
    config: &Config,
) -> (Module, DiagnosticCollector) {
    module::synthesize_default_creates(ctx, &mut class);

    let mut diagnostics = DiagnosticCollector::new();
    let module = pipeline::compile_module(ctx, &class, config, &mut diagnostics).unwrap();
    (module, diagnostics)
}

pub fn compile(ctx: &mut TypeContext, class: hir::Class) -> (Module, DiagnosticCollector) {
    compile_with(ctx, class, &Config::default())
}

pub fn method_body<'m>(ctx: &TypeContext, module: &'m Module, name: &str) -> &'m Body {
    module
        .method_named(ctx, name)
        .and_then(|method| method.body.as_ref())
        .unwrap()
}

pub fn listing(ctx: &TypeContext, body: &Body) -> String {
    strip_ansi_escapes::strip_str(pretty_print::body_to_string(ctx, body))
}

pub fn count(body: &Body, predicate: impl Fn(&NodeKind) -> bool) -> usize {
    body.iter().filter(|id| predicate(body.kind(*id))).count()
}

pub fn kinds(diagnostics: &DiagnosticCollector) -> Vec<DiagnosticKind> {
    diagnostics.diagnostics().iter().map(|d| d.kind).collect()
}
