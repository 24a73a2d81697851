//! Lowering of the typed tree into LIR. Structured control flow becomes labels
//! and branches. Every branch records, per threaded variable, the value last
//! stored in the branching block so that phi placement can later resolve loads
//! without a dominance computation.

use std::collections::BTreeMap;

use log::trace;

use crate::{
    error::{CompileError, Result},
    middle::{
        hir::{self, StmtKind, visit::DelegationFinder},
        lir::{
            Body, Branch, CallKind, LabelId, Literal, NodeId, NodeKind, Place, Variable,
            VariableId, VariableKind,
        },
        ty::{MethodSignature, ModifiedType, TypeContext},
    },
    span::Span,
};

mod expression;

/// Lowers the body of one method. Returns `None` for methods without a body.
pub fn lower_method(
    ctx: &TypeContext,
    class: &hir::Class,
    method: &hir::MethodDecl,
    constants: &BTreeMap<String, Literal>,
) -> Result<Option<Body>> {
    let Some(block) = &method.body else {
        return Ok(None);
    };

    let signature = ctx.signature(method.signature);
    let mut lowering = BodyLoweringContext::new(ctx, class, signature, constants, method);

    lowering.span = block.span;
    if signature.is_create() {
        lowering.lower_create_body(block)?;
    } else {
        lowering.lower_block(block, Scope::default())?;
    }

    lowering.span = method.span;
    let body = lowering.finish();

    trace!(
        "lowered {}:\n{}",
        signature.mangled_name,
        crate::middle::lir::pretty_print::body_to_string(ctx, &body)
    );

    Ok(Some(body))
}

/// Targets of the innermost enclosing constructs, passed down by value
#[derive(Debug, Clone, Copy, Default)]
struct Scope {
    /// Where a failed `check` jumps to
    recover: Option<LabelId>,
    break_to: Option<LabelId>,
    continue_to: Option<LabelId>,
}

struct BodyLoweringContext<'a> {
    ctx: &'a TypeContext,
    class: &'a hir::Class,
    signature: &'a MethodSignature,
    constants: &'a BTreeMap<String, Literal>,

    body: Body,
    this: VariableId,
    names: Vec<BTreeMap<String, VariableId>>,

    /// Label of the block being emitted
    current_label: LabelId,
    /// Whether the current block still lacks a terminator
    open: bool,
    /// Last value stored to each threaded variable in the current block
    stores: BTreeMap<VariableId, NodeId>,
    /// Span of the innermost statement being lowered
    span: Span,
}

impl<'a> BodyLoweringContext<'a> {
    fn new(
        ctx: &'a TypeContext,
        class: &'a hir::Class,
        signature: &'a MethodSignature,
        constants: &'a BTreeMap<String, Literal>,
        method: &hir::MethodDecl,
    ) -> Self {
        let mut body = Body::new();

        let this = body.add_variable(Variable::new(
            ctx,
            "this",
            ModifiedType::new(class.ty),
            VariableKind::This,
        ));

        let mut parameters = BTreeMap::new();
        for (name, ty) in method.parameter_names.iter().zip(&signature.parameters) {
            let id = body.add_variable(Variable::new(ctx, name.clone(), *ty, VariableKind::Parameter));
            parameters.insert(name.clone(), id);
        }

        let entry = body.new_label();

        let mut lowering = Self {
            ctx,
            class,
            signature,
            constants,
            body,
            this,
            names: vec![parameters],
            current_label: entry,
            open: false,
            stores: BTreeMap::new(),
            span: method.span,
        };

        lowering.define_label(entry);
        lowering
    }

    /* Emission */

    fn emit(&mut self, kind: NodeKind, ty: Option<ModifiedType>) -> NodeId {
        self.body.append(kind, ty, self.span)
    }

    fn emit_value(&mut self, kind: NodeKind, ty: ModifiedType) -> NodeId {
        self.emit(kind, Some(ty))
    }

    fn literal(&mut self, literal: Literal, ty: ModifiedType) -> NodeId {
        self.emit_value(NodeKind::Literal(literal), ty)
    }

    fn null(&mut self) -> NodeId {
        let ty = ModifiedType::new(self.ctx.null()).nullable();
        self.literal(Literal::Null, ty)
    }

    fn boolean(&self) -> ModifiedType {
        ModifiedType::new(self.ctx.boolean())
    }

    fn int(&self) -> ModifiedType {
        ModifiedType::new(self.ctx.int())
    }

    fn load(&mut self, place: Place, ty: ModifiedType) -> NodeId {
        self.emit_value(NodeKind::Load(place), ty)
    }

    fn load_variable(&mut self, variable: VariableId) -> NodeId {
        let ty = self.body.variables[variable].ty;
        self.load(Place::Local(variable), ty)
    }

    fn load_this(&mut self) -> NodeId {
        self.load_variable(self.this)
    }

    fn store(&mut self, place: Place, value: NodeId) {
        if let Place::Local(variable) = place {
            if self.body.variables[variable].threaded {
                self.stores.insert(variable, value);
            }
        }

        self.emit(
            NodeKind::Store {
                place,
                value,
                initializing: false,
            },
            None,
        );
    }

    /// Stores into a place of an object or array allocated by the lowering
    /// itself, before anything else can observe it
    fn initialize(&mut self, place: Place, value: NodeId) {
        self.emit(
            NodeKind::Store {
                place,
                value,
                initializing: true,
            },
            None,
        );
    }

    /// Casts `value` up to `to` when `to` strictly supertypes `from`
    fn coerce(&mut self, value: NodeId, from: ModifiedType, to: ModifiedType) -> NodeId {
        if self.ctx.is_strict_supertype(to.ty, from.ty) {
            self.emit_value(NodeKind::Cast { value }, to)
        } else {
            value
        }
    }

    /// Emits a terminator and records the threaded stores of the current block
    /// on every label it can branch to
    fn terminate(&mut self, kind: NodeKind) {
        let targets = kind.successors();
        self.emit(kind, None);

        for target in targets {
            self.body.labels[target]
                .incoming
                .entry(self.current_label)
                .or_default()
                .extend(self.stores.iter().map(|(variable, value)| (*variable, *value)));
        }

        self.open = false;
        self.stores.clear();
    }

    fn branch(&mut self, target: LabelId) {
        self.terminate(NodeKind::Branch(Branch::Unconditional(target)));
    }

    fn branch_if(&mut self, condition: NodeId, on_true: LabelId, on_false: LabelId) {
        self.terminate(NodeKind::Branch(Branch::Conditional {
            condition,
            on_true,
            on_false,
        }));
    }

    /// Starts a new block. A block which would fall into the label is closed
    /// with an explicit branch first.
    fn define_label(&mut self, label: LabelId) {
        if self.open {
            self.branch(label);
        }

        self.emit(NodeKind::Label(label), None);
        self.current_label = label;
        self.open = true;
        self.stores.clear();
    }

    /// Opens a block for whatever follows a terminator. It stays unreachable
    /// unless something branches to it.
    fn fresh_label(&mut self) {
        let label = self.body.new_label();
        self.define_label(label);
    }

    /* Names */

    fn declare(&mut self, name: &str, ty: ModifiedType) -> VariableId {
        let id = self
            .body
            .add_variable(Variable::new(self.ctx, name, ty, VariableKind::Local));

        if let Some(names) = self.names.last_mut() {
            names.insert(name.to_string(), id);
        }

        id
    }

    fn temporary(&mut self, ty: ModifiedType) -> VariableId {
        let name = format!("${}", self.body.variables.len());
        self.body
            .add_variable(Variable::new(self.ctx, name, ty, VariableKind::Temporary))
    }

    fn lookup(&self, name: &str) -> Result<VariableId> {
        self.names
            .iter()
            .rev()
            .find_map(|names| names.get(name).copied())
            .ok_or_else(|| CompileError::invariant(format!("unresolved local `{name}`")))
    }

    fn with_names<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.names.push(BTreeMap::new());
        let result = f(self);
        self.names.pop();
        result
    }

    /* Statements */

    fn lower_block(&mut self, block: &hir::Block, scope: Scope) -> Result<()> {
        self.with_names(|this| this.lower_statements(&block.statements, scope))
    }

    fn lower_statements(&mut self, statements: &[hir::Stmt], scope: Scope) -> Result<()> {
        for statement in statements {
            self.lower_statement(statement, scope)?;
        }

        Ok(())
    }

    /// A create runs the field initializers of its class right after the
    /// `super(...)` call, unless it delegates to another create with `this(...)`
    fn lower_create_body(&mut self, block: &hir::Block) -> Result<()> {
        let class = self.class;
        let initializes = !DelegationFinder::delegates(block);

        self.with_names(|this| {
            let mut statements = block.statements.as_slice();

            if let Some((first, rest)) = statements.split_first() {
                if let StmtKind::ExplicitCreate {
                    kind: hir::CreateKind::Super,
                    ..
                } = first.kind
                {
                    this.lower_statement(first, Scope::default())?;
                    statements = rest;
                }
            }

            if initializes {
                for field in &class.fields {
                    let Some(initializer) = &field.initializer else {
                        continue;
                    };

                    let outer = std::mem::replace(&mut this.span, field.span);
                    let object = this.load_this();
                    let value = this.lower_expression(initializer, Scope::default())?;
                    let value = this.coerce(value, initializer.ty, field.ty);
                    this.store(
                        Place::Field {
                            object,
                            name: field.name.clone(),
                        },
                        value,
                    );
                    this.span = outer;
                }
            }

            this.lower_statements(statements, Scope::default())
        })
    }

    fn lower_statement(&mut self, statement: &hir::Stmt, scope: Scope) -> Result<()> {
        let outer = std::mem::replace(&mut self.span, statement.span);
        let result = self.lower_statement_kind(statement, scope);
        self.span = outer;
        result
    }

    fn lower_statement_kind(&mut self, statement: &hir::Stmt, scope: Scope) -> Result<()> {
        match &statement.kind {
            StmtKind::Local {
                name,
                ty,
                initializer,
            } => {
                let value = match initializer {
                    Some(initializer) => {
                        let value = self.lower_expression(initializer, scope)?;
                        self.coerce(value, initializer.ty, *ty)
                    }
                    None => self.default_value(*ty),
                };

                let variable = self.declare(name, *ty);
                self.store(Place::Local(variable), value);
            }
            StmtKind::Expr(expression) => {
                self.lower_expression(expression, scope)?;
            }
            StmtKind::Assign {
                targets,
                operator,
                value,
            } => self.lower_assignment(targets, *operator, value, scope)?,
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let on_true = self.body.new_label();
                let on_false = self.body.new_label();
                let end = match else_branch {
                    Some(_) => self.body.new_label(),
                    None => on_false,
                };

                let condition = self.lower_expression(condition, scope)?;
                self.branch_if(condition, on_true, on_false);

                self.define_label(on_true);
                self.lower_block(then_branch, scope)?;

                if let Some(else_branch) = else_branch {
                    self.branch(end);
                    self.define_label(on_false);
                    self.lower_block(else_branch, scope)?;
                }

                self.define_label(end);
            }
            StmtKind::While { condition, body } => {
                self.lower_loop(Some(condition), body, &[], false, scope)?
            }
            StmtKind::Do { body, condition } => {
                self.lower_loop(Some(condition), body, &[], true, scope)?
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => self.with_names(|this| {
                this.lower_statements(init, scope)?;
                this.lower_loop(condition.as_ref(), body, update, false, scope)
            })?,
            StmtKind::Foreach {
                name,
                ty,
                collection,
                body,
            } => self.lower_foreach(name, *ty, collection, body, scope)?,
            StmtKind::Break => {
                let target = scope
                    .break_to
                    .ok_or_else(|| CompileError::invariant("break outside of a loop"))?;
                self.branch(target);
                self.fresh_label();
            }
            StmtKind::Continue => {
                let target = scope
                    .continue_to
                    .ok_or_else(|| CompileError::invariant("continue outside of a loop"))?;
                self.branch(target);
                self.fresh_label();
            }
            StmtKind::Return(values) => self.lower_return(values, scope)?,
            StmtKind::Throw(exception) => {
                let exception = self.lower_expression(exception, scope)?;
                self.terminate(NodeKind::Throw { exception });
                self.fresh_label();
            }
            StmtKind::Try {
                body,
                recover,
                catches,
                finally,
            } => {
                if !catches.is_empty() {
                    return Err(CompileError::unsupported("catch clause", statement.span));
                }
                if finally.is_some() {
                    return Err(CompileError::unsupported("finally block", statement.span));
                }

                match recover {
                    Some(handler) => {
                        let recover = self.body.new_label();
                        let done = self.body.new_label();

                        self.lower_block(
                            body,
                            Scope {
                                recover: Some(recover),
                                ..scope
                            },
                        )?;
                        self.branch(done);

                        self.define_label(recover);
                        self.lower_block(handler, scope)?;
                        self.define_label(done);
                    }
                    None => self.lower_block(body, scope)?,
                }
            }
            StmtKind::Switch { .. } => {
                return Err(CompileError::unsupported("switch statement", statement.span));
            }
            StmtKind::Block(block) => self.lower_block(block, scope)?,
            StmtKind::ExplicitCreate {
                kind,
                signature,
                arguments,
            } => {
                let receiver = self.load_this();
                let kind = match kind {
                    hir::CreateKind::This => CallKind::Delegate,
                    hir::CreateKind::Super => CallKind::Super,
                };
                self.lower_call(*signature, receiver, arguments, kind, scope)?;
            }
        }

        Ok(())
    }

    /// The value a variable declared without an initializer starts with
    fn default_value(&mut self, ty: ModifiedType) -> NodeId {
        match self.ctx.as_primitive(ty.ty) {
            Some(kind) => self.literal(kind.default_literal(), ty),
            None => self.null(),
        }
    }

    /// `while`, `do` and `for` loops. The layout is always
    ///
    /// ```text
    ///     br <condition | body>
    /// body:
    ///     ...
    /// update:
    ///     ...
    /// condition:
    ///     br <test> ? body : end
    /// end:
    /// ```
    ///
    /// where `do` loops enter at the body and the others at the condition.
    fn lower_loop(
        &mut self,
        condition: Option<&hir::Expr>,
        body: &hir::Block,
        update: &[hir::Stmt],
        body_first: bool,
        scope: Scope,
    ) -> Result<()> {
        let body_label = self.body.new_label();
        let condition_label = self.body.new_label();
        let end = self.body.new_label();
        let update_label = match update.is_empty() {
            true => condition_label,
            false => self.body.new_label(),
        };

        self.branch(match body_first {
            true => body_label,
            false => condition_label,
        });

        self.define_label(body_label);
        self.lower_block(
            body,
            Scope {
                break_to: Some(end),
                continue_to: Some(update_label),
                ..scope
            },
        )?;

        if !update.is_empty() {
            self.define_label(update_label);
            self.lower_statements(update, scope)?;
        }

        self.define_label(condition_label);
        let test = match condition {
            Some(condition) => self.lower_expression(condition, scope)?,
            None => {
                let ty = self.boolean();
                self.literal(Literal::Bool(true), ty)
            }
        };
        self.branch_if(test, body_label, end);

        self.define_label(end);
        Ok(())
    }

    /// Iterates over a one dimensional array with a hidden index variable
    fn lower_foreach(
        &mut self,
        name: &str,
        ty: ModifiedType,
        collection: &hir::Expr,
        body: &hir::Block,
        scope: Scope,
    ) -> Result<()> {
        let Some((element, dimensions)) = self.ctx.as_array(collection.ty.ty) else {
            return Err(CompileError::unsupported(
                "foreach over a non-array collection",
                self.span,
            ));
        };

        if dimensions != 1 {
            return Err(CompileError::unsupported(
                "foreach over a multidimensional array",
                self.span,
            ));
        }

        let int = self.int();
        let array = self.lower_expression(collection, scope)?;
        let length = self.emit_value(NodeKind::Length { array }, int);

        let index = self.temporary(int);
        let zero = self.literal(Literal::Int(0), int);
        self.store(Place::Local(index), zero);

        let body_label = self.body.new_label();
        let update_label = self.body.new_label();
        let condition_label = self.body.new_label();
        let end = self.body.new_label();

        self.branch(condition_label);

        self.define_label(body_label);
        self.with_names(|this| {
            let i = this.load_variable(index);
            let value = this.load(
                Place::Element {
                    array,
                    indices: vec![i],
                },
                ModifiedType::new(element),
            );
            let value = this.coerce(value, ModifiedType::new(element), ty);
            let variable = this.declare(name, ty);
            this.store(Place::Local(variable), value);

            this.lower_block(
                body,
                Scope {
                    break_to: Some(end),
                    continue_to: Some(update_label),
                    ..scope
                },
            )
        })?;

        self.define_label(update_label);
        self.increment_index(index);

        self.define_label(condition_label);
        let i = self.load_variable(index);
        let test = self.emit_value(
            NodeKind::Compare {
                operator: hir::CompareOp::Less,
                lhs: i,
                rhs: length,
            },
            self.boolean(),
        );
        self.branch_if(test, body_label, end);

        self.define_label(end);
        Ok(())
    }

    fn increment_index(&mut self, index: VariableId) {
        let int = self.int();
        let i = self.load_variable(index);
        let one = self.literal(Literal::Int(1), int);
        let next = self.emit_value(
            NodeKind::Binary {
                operator: hir::BinaryOp::Add,
                lhs: i,
                rhs: one,
            },
            int,
        );
        self.store(Place::Local(index), next);
    }

    /// Several values are returned as one sequence. A single value of the
    /// method's sequence type, such as the result of another multi-value call,
    /// is returned as it is.
    fn lower_return(&mut self, values: &[hir::Expr], scope: Scope) -> Result<()> {
        let declared = self.signature.returns.clone();
        let mut lowered = Vec::with_capacity(values.len());

        for (index, value) in values.iter().enumerate() {
            let node = self.lower_expression(value, scope)?;
            lowered.push(match declared.get(index) {
                Some(ty) if values.len() == declared.len() => self.coerce(node, value.ty, *ty),
                _ => node,
            });
        }

        let value = match lowered.as_slice() {
            [] if self.signature.is_create() => Some(self.load_this()),
            [] => None,
            [single] => Some(*single),
            _ => Some(self.emit(NodeKind::Sequence(lowered), self.signature.result)),
        };

        self.terminate(NodeKind::Return {
            value,
            implicit: false,
        });
        self.fresh_label();
        Ok(())
    }

    /// `a = b = c` evaluates `c` once and stores it right to left.
    /// `a += b` loads `a`, applies the operator and stores the result back.
    fn lower_assignment(
        &mut self,
        targets: &[hir::Expr],
        operator: Option<hir::BinaryOp>,
        value: &hir::Expr,
        scope: Scope,
    ) -> Result<()> {
        if let Some(operator) = operator {
            let [target] = targets else {
                return Err(CompileError::invariant(
                    "compound assignment with several targets",
                ));
            };

            let place = self.lower_place(target, scope)?;
            let current = self.load(place.clone(), target.ty);
            let rhs = self.lower_expression(value, scope)?;
            let rhs = self.coerce(rhs, value.ty, target.ty);
            let result = self.emit_value(
                NodeKind::Binary {
                    operator,
                    lhs: current,
                    rhs,
                },
                target.ty,
            );
            self.store(place, result);
            return Ok(());
        }

        let mut current = self.lower_expression(value, scope)?;
        let mut current_ty = value.ty;

        for target in targets.iter().rev() {
            current = self.coerce(current, current_ty, target.ty);
            current_ty = target.ty;

            let place = self.lower_place(target, scope)?;
            self.store(place, current);
        }

        Ok(())
    }

    /// Closes the method. Falling off the end returns implicitly (creates
    /// return `this`). An empty label left behind by a final `return` is
    /// dropped instead.
    fn finish(mut self) -> Body {
        if self.open {
            let dangling = self.body.tail.filter(|tail| {
                let node = self.body.node(*tail);
                let NodeKind::Label(label) = node.kind else {
                    return false;
                };

                self.body.labels[label].incoming.is_empty()
                    && node
                        .prev
                        .is_some_and(|prev| self.body.kind(prev).is_terminator())
            });

            match dangling {
                Some(tail) => self.body.unlink(tail),
                None => {
                    let value = self.signature.is_create().then(|| self.load_this());
                    self.terminate(NodeKind::Return {
                        value,
                        implicit: true,
                    });
                }
            }
        }

        self.body
    }
}
