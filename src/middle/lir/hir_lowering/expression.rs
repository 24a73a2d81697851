use super::{BodyLoweringContext, Scope};
use crate::{
    error::{CompileError, Result},
    middle::{
        hir::{self, CompareOp, ExprKind, SuffixKind},
        lir::{CallKind, NodeId, NodeKind, Place},
        ty::{ModifiedType, SignatureId},
    },
};

impl BodyLoweringContext<'_> {
    pub(super) fn lower_expression(&mut self, expression: &hir::Expr, scope: Scope) -> Result<NodeId> {
        let ty = expression.ty;

        match &expression.kind {
            ExprKind::Literal(literal) => Ok(self.literal(literal.clone(), ty)),
            ExprKind::Local(name) => {
                let variable = self.lookup(name)?;
                Ok(self.load(Place::Local(variable), ty))
            }
            ExprKind::This => Ok(self.load_this()),
            ExprKind::Constant { owner, name } => {
                // constants of the class being compiled are already folded
                if *owner == self.class.ty {
                    if let Some(value) = self.constants.get(name) {
                        return Ok(self.literal(value.clone(), ty));
                    }
                }

                Ok(self.load(
                    Place::Constant {
                        owner: *owner,
                        name: name.clone(),
                    },
                    ty,
                ))
            }
            ExprKind::Chain { base, suffixes } => {
                let mut current = self.lower_expression(base, scope)?;
                for suffix in suffixes {
                    current = self.lower_suffix(current, suffix, scope)?;
                }
                Ok(current)
            }
            ExprKind::Unary { operator, operand } => {
                let operand = self.lower_expression(operand, scope)?;
                Ok(self.emit_value(
                    NodeKind::Unary {
                        operator: *operator,
                        operand,
                    },
                    ty,
                ))
            }
            ExprKind::Binary { operator, lhs, rhs } => {
                let shift = matches!(
                    operator,
                    hir::BinaryOp::ShiftLeft
                        | hir::BinaryOp::ShiftRight
                        | hir::BinaryOp::RotateLeft
                        | hir::BinaryOp::RotateRight
                );

                let lhs_value = self.lower_expression(lhs, scope)?;
                let lhs_value = self.coerce(lhs_value, lhs.ty, ty);
                let rhs_value = self.lower_expression(rhs, scope)?;
                // the shift amount keeps its own type
                let rhs_value = match shift {
                    true => rhs_value,
                    false => self.coerce(rhs_value, rhs.ty, ty),
                };

                Ok(self.emit_value(
                    NodeKind::Binary {
                        operator: *operator,
                        lhs: lhs_value,
                        rhs: rhs_value,
                    },
                    ty,
                ))
            }
            ExprKind::Compare { operator, lhs, rhs } => match operator {
                CompareOp::Equal | CompareOp::NotEqual if self.ctx.is_reference(lhs.ty.ty) => {
                    self.lower_object_equality(*operator, lhs, rhs, ty, scope)
                }
                _ => {
                    let lhs = self.lower_expression(lhs, scope)?;
                    let rhs = self.lower_expression(rhs, scope)?;
                    Ok(self.emit_value(
                        NodeKind::Compare {
                            operator: *operator,
                            lhs,
                            rhs,
                        },
                        ty,
                    ))
                }
            },
            ExprKind::Or(operands) => self.lower_short_circuit(operands, true, ty, scope),
            ExprKind::And(operands) => self.lower_short_circuit(operands, false, ty, scope),
            ExprKind::Conditional {
                condition,
                then_value,
                else_value,
            } => {
                let merge = self.temporary(ty);
                let on_true = self.body.new_label();
                let on_false = self.body.new_label();
                let end = self.body.new_label();

                let condition = self.lower_expression(condition, scope)?;
                self.branch_if(condition, on_true, on_false);

                self.define_label(on_true);
                let value = self.lower_expression(then_value, scope)?;
                let value = self.coerce(value, then_value.ty, ty);
                self.store(Place::Local(merge), value);
                self.branch(end);

                self.define_label(on_false);
                let value = self.lower_expression(else_value, scope)?;
                let value = self.coerce(value, else_value.ty, ty);
                self.store(Place::Local(merge), value);

                self.define_label(end);
                Ok(self.load_variable(merge))
            }
            ExprKind::Coalesce { value, fallback } => {
                let merge = self.temporary(ty);
                let non_null = self.body.new_label();
                let is_null = self.body.new_label();
                let end = self.body.new_label();

                let current = self.lower_expression(value, scope)?;
                let test = self.null_test(current);
                self.branch_if(test, is_null, non_null);

                self.define_label(non_null);
                let current = self.coerce(current, value.ty, ty);
                self.store(Place::Local(merge), current);
                self.branch(end);

                self.define_label(is_null);
                let other = self.lower_expression(fallback, scope)?;
                let other = self.coerce(other, fallback.ty, ty);
                self.store(Place::Local(merge), other);

                self.define_label(end);
                Ok(self.load_variable(merge))
            }
            ExprKind::Check(inner) => {
                let recover = scope.recover.ok_or_else(|| {
                    CompileError::invariant("check expression outside of a recover block")
                })?;

                let value = self.lower_expression(inner, scope)?;
                let test = self.null_test(value);
                let proceed = self.body.new_label();
                self.branch_if(test, recover, proceed);
                self.define_label(proceed);

                Ok(value)
            }
            ExprKind::Cast(inner) => {
                let value = self.lower_expression(inner, scope)?;
                Ok(self.emit_value(NodeKind::Cast { value }, ty))
            }
            ExprKind::Create {
                signature,
                arguments,
            } => {
                let object = self.emit_value(NodeKind::Allocate { class: ty.ty }, ty);
                self.lower_call(*signature, object, arguments, CallKind::Normal, scope)?;
                Ok(object)
            }
            ExprKind::NewArray { sizes } => {
                let int = self.int();
                let mut values = Vec::with_capacity(sizes.len());
                for size in sizes {
                    let value = self.lower_expression(size, scope)?;
                    values.push(self.coerce(value, size.ty, int));
                }

                self.lower_array_allocation(ty, &values)
            }
            ExprKind::Sequence(values) => {
                let mut lowered = Vec::with_capacity(values.len());
                for value in values {
                    lowered.push(self.lower_expression(value, scope)?);
                }
                Ok(self.emit_value(NodeKind::Sequence(lowered), ty))
            }
        }
    }

    fn lower_suffix(&mut self, receiver: NodeId, suffix: &hir::Suffix, scope: Scope) -> Result<NodeId> {
        match &suffix.kind {
            SuffixKind::Field(name) => Ok(self.load(
                Place::Field {
                    object: receiver,
                    name: name.clone(),
                },
                suffix.ty,
            )),
            SuffixKind::Index(indices) => {
                let indices = self.lower_indices(indices, scope)?;
                Ok(self.load(
                    Place::Element {
                        array: receiver,
                        indices,
                    },
                    suffix.ty,
                ))
            }
            SuffixKind::Call {
                signature,
                arguments,
            } => self.lower_call(*signature, receiver, arguments, CallKind::Normal, scope),
            SuffixKind::Length => Ok(self.emit_value(NodeKind::Length { array: receiver }, suffix.ty)),
        }
    }

    fn lower_indices(&mut self, indices: &[hir::Expr], scope: Scope) -> Result<Vec<NodeId>> {
        let int = self.int();
        let mut lowered = Vec::with_capacity(indices.len());

        for index in indices {
            let value = self.lower_expression(index, scope)?;
            lowered.push(self.coerce(value, index.ty, int));
        }

        Ok(lowered)
    }

    /// The place an assignment target names. Everything but the final field or
    /// index suffix is evaluated as a value.
    pub(super) fn lower_place(&mut self, target: &hir::Expr, scope: Scope) -> Result<Place> {
        match &target.kind {
            ExprKind::Local(name) => Ok(Place::Local(self.lookup(name)?)),
            ExprKind::Chain { base, suffixes } => {
                let Some((last, rest)) = suffixes.split_last() else {
                    return Err(CompileError::unsupported("assignment target", target.span));
                };

                let mut current = self.lower_expression(base, scope)?;
                for suffix in rest {
                    current = self.lower_suffix(current, suffix, scope)?;
                }

                match &last.kind {
                    SuffixKind::Field(name) => Ok(Place::Field {
                        object: current,
                        name: name.clone(),
                    }),
                    SuffixKind::Index(indices) => Ok(Place::Element {
                        array: current,
                        indices: self.lower_indices(indices, scope)?,
                    }),
                    SuffixKind::Call { .. } | SuffixKind::Length => {
                        Err(CompileError::unsupported("assignment target", target.span))
                    }
                }
            }
            _ => Err(CompileError::unsupported("assignment target", target.span)),
        }
    }

    /// Arguments are cast up to the declared parameter types. Several return
    /// values arrive as one sequence. A returned reference, or a sequence
    /// holding one, is adopted into a temporary which owns the count the
    /// callee handed over.
    pub(super) fn lower_call(
        &mut self,
        signature: SignatureId,
        receiver: NodeId,
        arguments: &[hir::Expr],
        kind: CallKind,
        scope: Scope,
    ) -> Result<NodeId> {
        let target = self.ctx.signature(signature);
        let mut lowered = Vec::with_capacity(arguments.len());

        for (argument, parameter) in arguments.iter().zip(&target.parameters) {
            let value = self.lower_expression(argument, scope)?;
            lowered.push(self.coerce(value, argument.ty, *parameter));
        }

        let ty = target.result;

        let call = self.emit(
            NodeKind::Call {
                signature,
                receiver,
                arguments: lowered,
                kind,
            },
            ty,
        );

        match ty {
            Some(ty) if self.ctx.is_reference(ty.ty) && !target.is_create() => {
                let owner = self.temporary(ty);
                self.store(Place::Local(owner), call);
                Ok(self.load_variable(owner))
            }
            _ => Ok(call),
        }
    }

    /// `value === null`
    fn null_test(&mut self, value: NodeId) -> NodeId {
        let null = self.null();
        let ty = self.boolean();
        self.emit_value(
            NodeKind::Compare {
                operator: CompareOp::Same,
                lhs: value,
                rhs: null,
            },
            ty,
        )
    }

    /// `a or b or c` and `a and b and c`. Each operand is stored into a merge
    /// variable and tested. A deciding operand jumps straight to the end,
    /// otherwise evaluation continues with the next one.
    fn lower_short_circuit(
        &mut self,
        operands: &[hir::Expr],
        is_or: bool,
        ty: ModifiedType,
        scope: Scope,
    ) -> Result<NodeId> {
        let Some((last, rest)) = operands.split_last() else {
            return Err(CompileError::invariant("short circuit operator without operands"));
        };

        let merge = self.temporary(ty);
        let done = self.body.new_label();

        for operand in rest {
            let value = self.lower_expression(operand, scope)?;
            self.store(Place::Local(merge), value);

            let next = self.body.new_label();
            match is_or {
                true => self.branch_if(value, done, next),
                false => self.branch_if(value, next, done),
            }
            self.define_label(next);
        }

        let value = self.lower_expression(last, scope)?;
        self.store(Place::Local(merge), value);

        self.define_label(done);
        Ok(self.load_variable(merge))
    }

    /// `a == b` on objects. A null `a` is equal only to a null `b`, otherwise
    /// the `equal` method of `a` decides. Without an applicable `equal` the
    /// comparison falls back to identity.
    fn lower_object_equality(
        &mut self,
        operator: CompareOp,
        lhs: &hir::Expr,
        rhs: &hir::Expr,
        ty: ModifiedType,
        scope: Scope,
    ) -> Result<NodeId> {
        let left = self.lower_expression(lhs, scope)?;
        let right = self.lower_expression(rhs, scope)?;

        let merge = self.temporary(ty);
        let is_null = self.body.new_label();
        let non_null = self.body.new_label();
        let done = self.body.new_label();

        let test = self.null_test(left);
        self.branch_if(test, is_null, non_null);

        self.define_label(is_null);
        let both_null = self.null_test(right);
        self.store(Place::Local(merge), both_null);
        self.branch(done);

        self.define_label(non_null);
        let equal = match self.ctx.resolve_overload(lhs.ty.ty, "equal", &[rhs.ty.ty]) {
            Ok(signature) => {
                let parameter = self.ctx.signature(signature).parameters[0];
                let argument = self.coerce(right, rhs.ty, parameter);
                self.emit_value(
                    NodeKind::Call {
                        signature,
                        receiver: left,
                        arguments: vec![argument],
                        kind: CallKind::Normal,
                    },
                    ty,
                )
            }
            Err(_) => self.emit_value(
                NodeKind::Compare {
                    operator: CompareOp::Same,
                    lhs: left,
                    rhs: right,
                },
                ty,
            ),
        };
        self.store(Place::Local(merge), equal);

        self.define_label(done);
        let result = self.load_variable(merge);

        Ok(match operator {
            CompareOp::NotEqual => self.emit_value(
                NodeKind::Unary {
                    operator: hir::UnaryOp::Not,
                    operand: result,
                },
                ty,
            ),
            _ => result,
        })
    }

    /// Allocates an array whose elements may themselves be arrays. The first
    /// `dimensions` sizes belong to this level. When sizes remain, a loop fills
    /// every element with a nested allocation.
    fn lower_array_allocation(&mut self, ty: ModifiedType, sizes: &[NodeId]) -> Result<NodeId> {
        let Some((element, dimensions)) = self.ctx.as_array(ty.ty) else {
            return Err(CompileError::invariant("array allocation of a non-array type"));
        };

        let dimensions = dimensions as usize;
        if sizes.len() < dimensions {
            return Err(CompileError::invariant(format!(
                "array allocation with {} sizes for {dimensions} dimensions",
                sizes.len()
            )));
        }

        let (own, rest) = sizes.split_at(dimensions);
        let array = self.emit_value(
            NodeKind::AllocateArray {
                sizes: own.to_vec(),
            },
            ty,
        );

        if rest.is_empty() || self.ctx.as_array(element).is_none() {
            return Ok(array);
        }

        let int = self.int();
        let mut total = own[0];
        for size in &own[1..] {
            total = self.emit_value(
                NodeKind::Binary {
                    operator: hir::BinaryOp::Multiply,
                    lhs: total,
                    rhs: *size,
                },
                int,
            );
        }

        let index = self.temporary(int);
        let zero = self.literal(hir::Literal::Int(0), int);
        self.store(Place::Local(index), zero);

        let condition = self.body.new_label();
        let body = self.body.new_label();
        let end = self.body.new_label();

        self.branch(condition);

        self.define_label(body);
        let inner = self.lower_array_allocation(ModifiedType::new(element), rest)?;
        let i = self.load_variable(index);
        self.initialize(
            Place::Element {
                array,
                indices: vec![i],
            },
            inner,
        );
        self.increment_index(index);

        self.define_label(condition);
        let i = self.load_variable(index);
        let test = self.emit_value(
            NodeKind::Compare {
                operator: CompareOp::Less,
                lhs: i,
                rhs: total,
            },
            self.boolean(),
        );
        self.branch_if(test, body, end);

        self.define_label(end);
        Ok(array)
    }
}
