//! Human readable listings of LIR. Values and labels are renumbered in stream
//! order so that listings stay stable while passes allocate and discard nodes.

use std::collections::BTreeMap;

use colored::Colorize;
use itertools::Itertools;

use crate::{
    index::Index,
    middle::{
        lir::{Body, Branch, CallKind, LabelId, NodeId, NodeKind, Place},
        module::{Method, Module},
        ty::TypeContext,
    },
};

pub struct BodyPrinter<'a> {
    ctx: &'a TypeContext,
    body: &'a Body,
    values: BTreeMap<NodeId, usize>,
    labels: BTreeMap<LabelId, usize>,
}

impl<'a> BodyPrinter<'a> {
    pub fn new(ctx: &'a TypeContext, body: &'a Body) -> Self {
        let mut values = BTreeMap::new();
        let mut labels = BTreeMap::new();

        for id in body.iter() {
            match &body.node(id).kind {
                NodeKind::Label(label) => {
                    labels.insert(*label, labels.len());
                }
                _ if body.node(id).ty.is_some() => {
                    values.insert(id, values.len());
                }
                _ => {}
            }
        }

        Self {
            ctx,
            body,
            values,
            labels,
        }
    }

    fn value(&self, id: NodeId) -> String {
        match self.values.get(&id) {
            Some(n) => format!("%{n}"),
            // a value which is not in the stream anymore
            None => format!("%?{}", id.index()),
        }
    }

    fn label(&self, label: LabelId) -> String {
        match self.labels.get(&label) {
            Some(n) => format!("L{n}"),
            None => format!("L?{}", label.index()),
        }
    }

    fn place(&self, place: &Place) -> String {
        match place {
            Place::Local(variable) => self.body.variables[*variable].name.clone(),
            Place::Field { object, name } => format!("{}.{name}", self.value(*object)),
            Place::Element { array, indices } => format!(
                "{}[{}]",
                self.value(*array),
                indices.iter().map(|i| self.value(*i)).join(", ")
            ),
            Place::Constant { owner, name } => {
                format!("{}:{name}", self.ctx.type_name(*owner))
            }
        }
    }

    fn instruction(&self, id: NodeId) -> String {
        let node = self.body.node(id);

        let text = match &node.kind {
            NodeKind::Literal(literal) => {
                format!("{} {}", "literal".cyan(), literal.to_string().purple())
            }
            NodeKind::Load(place) => format!("{} {}", "load".cyan(), self.place(place)),
            NodeKind::Store {
                place,
                value,
                initializing,
            } => format!(
                "{} {} {} {}",
                match *initializing {
                    true => "init".cyan(),
                    false => "store".cyan(),
                },
                self.place(place),
                "<-".white(),
                self.value(*value)
            ),
            NodeKind::Unary { operator, operand } => {
                format!("{}{}", operator.to_string().white(), self.value(*operand))
            }
            NodeKind::Binary { operator, lhs, rhs } => format!(
                "{} {} {}",
                self.value(*lhs),
                operator.to_string().white(),
                self.value(*rhs)
            ),
            NodeKind::Compare { operator, lhs, rhs } => format!(
                "{} {} {}",
                self.value(*lhs),
                operator.to_string().white(),
                self.value(*rhs)
            ),
            NodeKind::Cast { value } => format!(
                "{} {} to {}",
                "cast".cyan(),
                self.value(*value),
                node.ty
                    .map(|ty| self.ctx.colored_name(ty.ty).to_string())
                    .unwrap_or_default()
            ),
            NodeKind::Call {
                signature,
                receiver,
                arguments,
                kind,
            } => {
                let keyword = match kind {
                    CallKind::Normal => "call",
                    CallKind::Delegate => "call this",
                    CallKind::Super => "call super",
                };

                format!(
                    "{} {} {}({})",
                    keyword.cyan(),
                    self.ctx.signature(*signature).mangled_name.blue(),
                    self.value(*receiver),
                    arguments.iter().map(|a| self.value(*a)).join(", ")
                )
            }
            NodeKind::Sequence(values) => format!(
                "{} ({})",
                "sequence".cyan(),
                values.iter().map(|v| self.value(*v)).join(", ")
            ),
            NodeKind::Branch(Branch::Unconditional(target)) => {
                format!("{} {}", "br".cyan(), self.label(*target).blue())
            }
            NodeKind::Branch(Branch::Conditional {
                condition,
                on_true,
                on_false,
            }) => format!(
                "{} {} ? {} : {}",
                "br".cyan(),
                self.value(*condition),
                self.label(*on_true).blue(),
                self.label(*on_false).blue()
            ),
            NodeKind::Branch(Branch::Indirect { address, targets }) => format!(
                "{} {} [{}]",
                "br indirect".cyan(),
                self.value(*address),
                targets.iter().map(|t| self.label(*t)).join(", ").blue()
            ),
            NodeKind::Label(label) => return format!("{}:", self.label(*label)).bright_red().to_string(),
            NodeKind::Phi {
                variable, incoming, ..
            } => format!(
                "{} {} [{}]",
                "phi".cyan(),
                self.body.variables[*variable].name,
                incoming
                    .iter()
                    .map(|(label, value)| format!("{}: {}", self.label(*label), self.value(*value)))
                    .join(", ")
            ),
            NodeKind::Return { value: Some(value), .. } => {
                format!("{} {}", "return".cyan(), self.value(*value))
            }
            NodeKind::Return { value: None, .. } => "return".cyan().to_string(),
            NodeKind::Throw { exception } => {
                format!("{} {}", "throw".cyan(), self.value(*exception))
            }
            NodeKind::Allocate { class } => {
                format!("{} {}", "allocate".cyan(), self.ctx.colored_name(*class))
            }
            NodeKind::AllocateArray { sizes } => format!(
                "{} {}({})",
                "allocate".cyan(),
                node.ty
                    .map(|ty| self.ctx.colored_name(ty.ty).to_string())
                    .unwrap_or_default(),
                sizes.iter().map(|s| self.value(*s)).join(", ")
            ),
            NodeKind::Length { array } => format!("{} {}", "length".cyan(), self.value(*array)),
            NodeKind::LandingPad => "landing pad".cyan().to_string(),
            NodeKind::EnterFinally {
                continuation,
                resume,
            } => match resume {
                Some(resume) => format!(
                    "{} #{continuation} resume {}",
                    "enter finally".cyan(),
                    self.label(*resume).blue()
                ),
                None => format!("{} #{continuation}", "enter finally".cyan()),
            },
            NodeKind::ExitFinally { targets } => format!(
                "{} [{}]",
                "exit finally".cyan(),
                targets.iter().map(|t| self.label(*t)).join(", ").blue()
            ),
            NodeKind::Increment { value } => format!("{} {}", "inc".cyan(), self.value(*value)),
            NodeKind::Decrement { value } => format!("{} {}", "dec".cyan(), self.value(*value)),
        };

        match self.values.get(&id) {
            Some(_) => format!("    {} {} {text}", self.value(id), "=".white()),
            None => format!("    {text}"),
        }
    }
}

impl core::fmt::Display for BodyPrinter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for id in self.body.iter() {
            writeln!(f, "{}", self.instruction(id))?;
        }

        Ok(())
    }
}

pub fn body_to_string(ctx: &TypeContext, body: &Body) -> String {
    BodyPrinter::new(ctx, body).to_string()
}

pub fn method_to_string(ctx: &TypeContext, method: &Method) -> String {
    let signature = ctx.signature(method.signature);
    let header = format!(
        "{} {}",
        "method".magenta(),
        signature.mangled_name.blue()
    );

    match &method.body {
        Some(body) => format!("{header} {}\n{}{}", "{".white(), body_to_string(ctx, body), "}".white()),
        None => format!("{header};"),
    }
}

pub fn module_to_string(ctx: &TypeContext, module: &Module) -> String {
    let mut out = format!("{} {}\n", "class".magenta(), ctx.colored_name(module.ty));

    for (name, value) in &module.constants {
        out.push_str(&format!("{} {name} = {}\n", "constant".magenta(), value.to_string().purple()));
    }

    for method in &module.methods {
        out.push_str(&method_to_string(ctx, method));
        out.push('\n');
    }

    for inner in &module.inner {
        out.push_str(&module_to_string(ctx, inner));
    }

    out
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{
        middle::lir::{Literal, Variable, VariableKind},
        middle::ty::ModifiedType,
        span::Span,
    };

    #[test]
    fn renumbers_values_and_labels() {
        let ctx = TypeContext::new();
        let int = ModifiedType::new(ctx.int());
        let mut body = Body::new();

        let x = body.add_variable(Variable::new(&ctx, "x", int, VariableKind::Local));
        let _unused = body.new_label();
        let entry = body.new_label();
        let exit = body.new_label();

        body.append(NodeKind::Label(entry), None, Span::default());
        let one = body.append(NodeKind::Literal(Literal::Int(1)), Some(int), Span::default());
        body.append(
            NodeKind::Store {
                place: Place::Local(x),
                value: one,
                initializing: false,
            },
            None,
            Span::default(),
        );
        body.append(NodeKind::Branch(Branch::Unconditional(exit)), None, Span::default());
        body.append(NodeKind::Label(exit), None, Span::default());
        let load = body.append(NodeKind::Load(Place::Local(x)), Some(int), Span::default());
        body.append(
            NodeKind::Return {
                value: Some(load),
                implicit: false,
            },
            None,
            Span::default(),
        );

        let listing = body_to_string(&ctx, &body);
        let plain = String::from_utf8(strip_ansi_escapes::strip(listing.as_bytes())).unwrap();

        assert_eq!(
            plain,
            indoc! {"
                L0:
                    %0 = literal 1
                    store x <- %0
                    br L1
                L1:
                    %1 = load x
                    return %1
            "}
        );
    }
}
