//! Assembly of a class into a [`Module`]: constants are folded, every method
//! is lowered into its own [`Body`], and nested classes become nested modules.

use std::collections::BTreeMap;

use log::debug;

use crate::{
    error::{CompileError, Result},
    middle::{
        hir::{self, BinaryOp, ExprKind, UnaryOp},
        lir::{Body, Literal, hir_lowering},
        ty::{Modifiers, ModifiedType, SignatureId, SignatureKind, TypeContext, TypeId},
    },
    span::Span,
};

#[derive(Debug, Clone)]
pub struct Module {
    pub ty: TypeId,
    pub span: Span,
    pub fields: Vec<ModuleField>,
    pub constants: BTreeMap<String, Literal>,
    pub methods: Vec<Method>,
    pub inner: Vec<Module>,
}

#[derive(Debug, Clone)]
pub struct ModuleField {
    pub name: String,
    pub ty: ModifiedType,
    pub span: Span,
}

impl ModuleField {
    /// Non-nullable reference fields must be set by every create
    pub fn needs_initialization(&self, ctx: &TypeContext) -> bool {
        !self.ty.modifiers.is_nullable()
            && !self.ty.modifiers.is_constant()
            && ctx.is_reference(self.ty.ty)
    }
}

#[derive(Debug, Clone)]
pub struct Method {
    pub signature: SignatureId,
    pub span: Span,
    /// Default create added because the class declared none
    pub synthesized: bool,
    pub body: Option<Body>,
    /// Finally continuations entered from `body`
    pub continuations: Vec<Body>,
}

impl Module {
    /// Lowers a class and its nested classes. Default creates must have been
    /// added with [`synthesize_default_creates`] beforehand.
    pub fn assemble(ctx: &TypeContext, class: &hir::Class) -> Result<Module> {
        debug!("assembling module {}", ctx.type_name(class.ty));

        let mut constants = BTreeMap::new();
        for constant in &class.constants {
            let value = fold_constant(ctx, class.ty, &constant.value, &constants)?;
            constants.insert(constant.name.clone(), value);
        }

        let mut methods = Vec::with_capacity(class.methods.len());
        for method in &class.methods {
            let signature = ctx.signature(method.signature);
            let body = hir_lowering::lower_method(ctx, class, method, &constants)
                .map_err(|e| e.in_method(signature.mangled_name.clone()))?;

            methods.push(Method {
                signature: method.signature,
                span: method.span,
                synthesized: method.synthesized,
                body,
                continuations: Vec::new(),
            });
        }

        let inner = class
            .inner
            .iter()
            .map(|inner| Module::assemble(ctx, inner))
            .collect::<Result<Vec<_>>>()?;

        Ok(Module {
            ty: class.ty,
            span: class.span,
            fields: class
                .fields
                .iter()
                .map(|field| ModuleField {
                    name: field.name.clone(),
                    ty: field.ty,
                    span: field.span,
                })
                .collect(),
            constants,
            methods,
            inner,
        })
    }

    pub fn method(&self, signature: SignatureId) -> Option<&Method> {
        self.methods.iter().find(|m| m.signature == signature)
    }

    /// Looks up a method by name, for tests and tools
    pub fn method_named<'m>(&'m self, ctx: &TypeContext, name: &str) -> Option<&'m Method> {
        self.methods
            .iter()
            .find(|m| ctx.signature(m.signature).name == name)
    }
}

/// Gives every class without a create a public, empty one
pub fn synthesize_default_creates(ctx: &mut TypeContext, class: &mut hir::Class) {
    let has_create = class
        .methods
        .iter()
        .any(|m| ctx.signature(m.signature).kind == SignatureKind::Create);

    if !has_create && !ctx.is_interface(class.ty) {
        let signature = ctx.add_signature(
            class.ty,
            "create",
            SignatureKind::Create,
            Vec::new(),
            Vec::new(),
            Modifiers::PUBLIC,
            class.span,
        );

        class.methods.push(hir::MethodDecl {
            signature,
            parameter_names: Vec::new(),
            body: Some(hir::Block::new(Vec::new(), class.span)),
            span: class.span,
            synthesized: true,
        });
    }

    for inner in &mut class.inner {
        synthesize_default_creates(ctx, inner);
    }
}

/// Evaluates a constant initializer. Constants may refer to constants of the
/// same class declared before them.
fn fold_constant(
    ctx: &TypeContext,
    owner: TypeId,
    expression: &hir::Expr,
    folded: &BTreeMap<String, Literal>,
) -> Result<Literal> {
    let unsupported = || CompileError::unsupported("non-constant initializer", expression.span);

    match &expression.kind {
        ExprKind::Literal(literal) => Ok(literal.clone()),
        ExprKind::Constant { owner: from, name } if *from == owner => {
            folded.get(name).cloned().ok_or_else(unsupported)
        }
        ExprKind::Unary { operator, operand } => {
            match (operator, fold_constant(ctx, owner, operand, folded)?) {
                (UnaryOp::Negate, Literal::Int(value)) => Ok(Literal::Int(value.wrapping_neg())),
                (UnaryOp::Negate, Literal::Float(value)) => Ok(Literal::Float(-value)),
                (UnaryOp::Not, Literal::Bool(value)) => Ok(Literal::Bool(!value)),
                (UnaryOp::Complement, Literal::Int(value)) => Ok(Literal::Int(!value)),
                (UnaryOp::Complement, Literal::UInt(value)) => Ok(Literal::UInt(!value)),
                _ => Err(unsupported()),
            }
        }
        ExprKind::Binary { operator, lhs, rhs } => {
            let lhs = fold_constant(ctx, owner, lhs, folded)?;
            let rhs = fold_constant(ctx, owner, rhs, folded)?;

            let value = match (lhs, rhs) {
                (Literal::Int(a), Literal::Int(b)) => fold_int(*operator, a, b).map(Literal::Int),
                (Literal::UInt(a), Literal::UInt(b)) => {
                    fold_uint(*operator, a, b).map(Literal::UInt)
                }
                (Literal::Float(a), Literal::Float(b)) => match operator {
                    BinaryOp::Add => Some(Literal::Float(a + b)),
                    BinaryOp::Subtract => Some(Literal::Float(a - b)),
                    BinaryOp::Multiply => Some(Literal::Float(a * b)),
                    BinaryOp::Divide => Some(Literal::Float(a / b)),
                    _ => None,
                },
                (Literal::String(a), Literal::String(b)) if *operator == BinaryOp::Add => {
                    Some(Literal::String(a + &b))
                }
                _ => None,
            };

            value.ok_or_else(unsupported)
        }
        ExprKind::Cast(inner) => {
            let value = fold_constant(ctx, owner, inner, folded)?;
            let Some(target) = ctx.as_primitive(expression.ty.ty) else {
                return Ok(value);
            };

            match (value, target.is_floating(), target.is_integral()) {
                (Literal::Int(v), true, _) => Ok(Literal::Float(v as f64)),
                (Literal::UInt(v), true, _) => Ok(Literal::Float(v as f64)),
                (Literal::Float(v), _, true) => Ok(Literal::Int(v as i64)),
                (value, _, _) => Ok(value),
            }
        }
        _ => Err(unsupported()),
    }
}

fn fold_int(operator: BinaryOp, a: i64, b: i64) -> Option<i64> {
    match operator {
        BinaryOp::Add => Some(a.wrapping_add(b)),
        BinaryOp::Subtract => Some(a.wrapping_sub(b)),
        BinaryOp::Multiply => Some(a.wrapping_mul(b)),
        BinaryOp::Divide => a.checked_div(b),
        BinaryOp::Modulus => a.checked_rem(b),
        BinaryOp::BitAnd => Some(a & b),
        BinaryOp::BitOr => Some(a | b),
        BinaryOp::BitXor => Some(a ^ b),
        BinaryOp::ShiftLeft => Some(a.wrapping_shl(b as u32)),
        BinaryOp::ShiftRight => Some(a.wrapping_shr(b as u32)),
        BinaryOp::RotateLeft | BinaryOp::RotateRight => None,
    }
}

fn fold_uint(operator: BinaryOp, a: u64, b: u64) -> Option<u64> {
    match operator {
        BinaryOp::Add => Some(a.wrapping_add(b)),
        BinaryOp::Subtract => Some(a.wrapping_sub(b)),
        BinaryOp::Multiply => Some(a.wrapping_mul(b)),
        BinaryOp::Divide => a.checked_div(b),
        BinaryOp::Modulus => a.checked_rem(b),
        BinaryOp::BitAnd => Some(a & b),
        BinaryOp::BitOr => Some(a | b),
        BinaryOp::BitXor => Some(a ^ b),
        BinaryOp::ShiftLeft => Some(a.wrapping_shl(b as u32)),
        BinaryOp::ShiftRight => Some(a.wrapping_shr(b as u32)),
        BinaryOp::RotateLeft => Some(a.rotate_left(b as u32)),
        BinaryOp::RotateRight => Some(a.rotate_right(b as u32)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::ty::ClassType;

    fn int_expr(ctx: &TypeContext, kind: ExprKind) -> hir::Expr {
        hir::Expr::new(kind, ModifiedType::new(ctx.int()), Span::new(0, 1))
    }

    fn class(ctx: &mut TypeContext) -> hir::Class {
        let ty = ctx.add_class(ClassType::new("Counter"));
        hir::Class {
            ty,
            span: Span::new(0, 100),
            fields: Vec::new(),
            constants: Vec::new(),
            methods: Vec::new(),
            inner: Vec::new(),
        }
    }

    #[test]
    fn constants_fold_in_declaration_order() {
        let mut ctx = TypeContext::new();
        let mut class = class(&mut ctx);
        let int = ModifiedType::new(ctx.int()).with(Modifiers::CONSTANT);

        let six = int_expr(
            &ctx,
            ExprKind::Binary {
                operator: BinaryOp::Multiply,
                lhs: Box::new(int_expr(&ctx, ExprKind::Literal(Literal::Int(2)))),
                rhs: Box::new(int_expr(&ctx, ExprKind::Literal(Literal::Int(3)))),
            },
        );
        let negated = int_expr(
            &ctx,
            ExprKind::Unary {
                operator: UnaryOp::Negate,
                operand: Box::new(int_expr(
                    &ctx,
                    ExprKind::Constant {
                        owner: class.ty,
                        name: "SIX".into(),
                    },
                )),
            },
        );

        class.constants = vec![
            hir::ConstantDecl {
                name: "SIX".into(),
                ty: int,
                value: six,
                span: Span::new(0, 10),
            },
            hir::ConstantDecl {
                name: "MINUS_SIX".into(),
                ty: int,
                value: negated,
                span: Span::new(10, 20),
            },
        ];

        synthesize_default_creates(&mut ctx, &mut class);
        let module = Module::assemble(&ctx, &class).unwrap();

        assert_eq!(module.constants["SIX"], Literal::Int(6));
        assert_eq!(module.constants["MINUS_SIX"], Literal::Int(-6));
    }

    #[test]
    fn non_constant_initializers_are_unsupported() {
        let mut ctx = TypeContext::new();
        let mut class = class(&mut ctx);
        let int = ModifiedType::new(ctx.int());

        class.constants.push(hir::ConstantDecl {
            name: "BAD".into(),
            ty: int,
            value: int_expr(&ctx, ExprKind::Local("x".into())),
            span: Span::new(0, 10),
        });

        let err = Module::assemble(&ctx, &class).unwrap_err();
        assert!(matches!(
            err,
            CompileError::Unsupported {
                construct: "non-constant initializer",
                ..
            }
        ));
    }

    #[test]
    fn default_create_is_synthesized_once() {
        let mut ctx = TypeContext::new();
        let mut class = class(&mut ctx);

        synthesize_default_creates(&mut ctx, &mut class);
        synthesize_default_creates(&mut ctx, &mut class);

        assert_eq!(class.methods.len(), 1);
        assert!(class.methods[0].synthesized);

        let module = Module::assemble(&ctx, &class).unwrap();
        let create = module.method_named(&ctx, "create").unwrap();
        assert!(create.body.is_some());
    }
}
