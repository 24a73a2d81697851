mod common;

use common::*;
use tacc::{
    config::Config,
    diagnostics::DiagnosticKind,
    middle::{
        cfg::ControlFlowGraph,
        hir::{Expr, ExprKind, UnaryOp},
        lir::{Literal, NodeKind, Place},
        optimization,
        ty::TypeContext,
    },
};

#[test]
fn short_circuit_on_a_true_literal_skips_the_rest() {
    let mut ctx = TypeContext::new();
    let mut class = class(&mut ctx, "Logic");
    let boolean = boolean(&ctx);

    let condition = or(&ctx, vec![bool_literal(&ctx, true), local("b", boolean)]);
    MethodBuilder::method("either")
        .parameter("b", boolean)
        .returns(boolean)
        .build(&mut ctx, &mut class, vec![ret(vec![condition])]);

    let (module, diagnostics) = compile(&mut ctx, class);
    let body = method_body(&ctx, &module, "either");

    // folding is not something the user wrote, so nothing is reported
    assert!(diagnostics.is_empty());
    assert_eq!(count(body, |kind| matches!(kind, NodeKind::Load(Place::Local(_)))), 0);
    assert_eq!(count(body, |kind| matches!(kind, NodeKind::Phi { .. })), 0);

    let NodeKind::Return {
        value: Some(value), ..
    } = body.kind(body.tail.unwrap())
    else {
        panic!("method does not end in a return");
    };
    assert!(matches!(body.kind(*value), NodeKind::Literal(tacc::middle::lir::Literal::Bool(true))));
}

#[test]
fn negated_constant_conditions_are_folded() {
    let mut ctx = TypeContext::new();
    let mut class = class(&mut ctx, "Folding");
    let int = int(&ctx);

    let condition = Expr::new(
        ExprKind::Unary {
            operator: UnaryOp::Not,
            operand: Box::new(bool_literal(&ctx, true)),
        },
        boolean(&ctx),
        span(),
    );
    let body = vec![
        if_else(condition, vec![ret(vec![int_literal(&ctx, 1)])], None),
        ret(vec![int_literal(&ctx, 2)]),
    ];
    MethodBuilder::method("two")
        .returns(int)
        .build(&mut ctx, &mut class, body);

    let (module, diagnostics) = compile(&mut ctx, class);
    let body = method_body(&ctx, &module, "two");

    assert!(diagnostics.is_empty());
    assert_eq!(count(body, |kind| matches!(kind, NodeKind::Return { .. })), 1);
    assert_eq!(count(body, |kind| matches!(kind, NodeKind::Label(_))), 2);
}

#[test]
fn folding_can_be_disabled() {
    let mut ctx = TypeContext::new();
    let mut class = class(&mut ctx, "Unfolded");
    let boolean = boolean(&ctx);

    let condition = or(&ctx, vec![bool_literal(&ctx, true), local("b", boolean)]);
    MethodBuilder::method("either")
        .parameter("b", boolean)
        .returns(boolean)
        .build(&mut ctx, &mut class, vec![ret(vec![condition])]);

    let config = Config::default().with_optimize(false);
    let (module, _) = compile_with(&mut ctx, class, &config);
    let body = method_body(&ctx, &module, "either");

    assert_eq!(count(body, |kind| matches!(kind, NodeKind::Phi { .. })), 1);
    assert_eq!(count(body, |kind| matches!(kind, NodeKind::Load(Place::Local(_)))), 1);
}

#[test]
fn fixpoint_is_idempotent() {
    let mut ctx = TypeContext::new();
    let mut class = class(&mut ctx, "Stable");
    let (int, boolean) = (int(&ctx), boolean(&ctx));

    let body = vec![
        declare("x", int, Some(int_literal(&ctx, 0))),
        if_else(
            or(&ctx, vec![local("b", boolean), bool_literal(&ctx, false)]),
            vec![assign(local("x", int), int_literal(&ctx, 1))],
            Some(vec![assign(local("x", int), int_literal(&ctx, 2))]),
        ),
        ret(vec![local("x", int)]),
    ];
    MethodBuilder::method("stable")
        .parameter("b", boolean)
        .returns(int)
        .build(&mut ctx, &mut class, body);

    let (mut module, _) = compile_with(
        &mut ctx,
        class,
        &Config::default().with_reference_counting(false),
    );
    let method = module
        .methods
        .iter_mut()
        .find(|m| ctx.signature(m.signature).name == "stable")
        .unwrap();
    let body = method.body.as_mut().unwrap();

    let before = listing(&ctx, body);
    assert_eq!(optimization::run_fixpoint(body, 8).unwrap(), 1);
    assert_eq!(listing(&ctx, body), before);
}

#[test]
fn code_after_return_is_reported_once() {
    let mut ctx = TypeContext::new();
    let mut class = class(&mut ctx, "Early");
    let int = int(&ctx);

    let body = vec![
        ret(vec![int_literal(&ctx, 1)]),
        declare("y", int, Some(int_literal(&ctx, 2))),
        declare("z", int, Some(int_literal(&ctx, 3))),
    ];
    MethodBuilder::method("early")
        .returns(int)
        .build(&mut ctx, &mut class, body);

    let (module, diagnostics) = compile(&mut ctx, class);

    assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::UnreachableCode]);
    assert_eq!(
        count(method_body(&ctx, &module, "early"), |kind| matches!(kind, NodeKind::Literal(_))),
        1
    );
}

#[test]
fn falling_off_a_value_returning_method_is_reported() {
    let mut ctx = TypeContext::new();
    let mut class = class(&mut ctx, "Partial");
    let (int, boolean) = (int(&ctx), boolean(&ctx));

    let body = vec![if_else(
        local("c", boolean),
        vec![ret(vec![int_literal(&ctx, 1)])],
        None,
    )];
    let method = MethodBuilder::method("partial")
        .parameter("c", boolean)
        .returns(int)
        .build(&mut ctx, &mut class, body);
    let span = class.methods.iter().find(|m| m.signature == method).unwrap().span;

    let (_, diagnostics) = compile(&mut ctx, class);

    assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::NotAllPathsReturn]);
    assert_eq!(diagnostics.diagnostics()[0].span, span);
}

#[test]
fn folding_toward_a_merge_drops_the_skipped_phi_edge() {
    let mut ctx = TypeContext::new();
    let mut class = class(&mut ctx, "Merging");
    let int = int(&ctx);

    // int x = 0; if (true) { x = 1; } return x;
    let statements = vec![
        declare("x", int, Some(int_literal(&ctx, 0))),
        if_else(
            bool_literal(&ctx, true),
            vec![assign(local("x", int), int_literal(&ctx, 1))],
            None,
        ),
        ret(vec![local("x", int)]),
    ];
    MethodBuilder::method("one")
        .returns(int)
        .build(&mut ctx, &mut class, statements);

    let (module, diagnostics) = compile(&mut ctx, class);
    let body = method_body(&ctx, &module, "one");

    assert!(diagnostics.is_empty());
    ControlFlowGraph::build(body).unwrap().check_phi_edges(body).unwrap();
    assert_eq!(count(body, |kind| matches!(kind, NodeKind::Phi { .. })), 0);

    let NodeKind::Return {
        value: Some(value), ..
    } = body.kind(body.tail.unwrap())
    else {
        panic!("method does not end in a return");
    };
    assert!(matches!(body.kind(*value), NodeKind::Literal(Literal::Int(1))));
}

#[test]
fn constant_conditional_expressions_collapse_to_one_arm() {
    let mut ctx = TypeContext::new();
    let mut class = class(&mut ctx, "Ternary");
    let int = int(&ctx);

    let choice = Expr::new(
        ExprKind::Conditional {
            condition: Box::new(bool_literal(&ctx, true)),
            then_value: Box::new(int_literal(&ctx, 1)),
            else_value: Box::new(int_literal(&ctx, 2)),
        },
        int,
        span(),
    );
    MethodBuilder::method("first")
        .returns(int)
        .build(&mut ctx, &mut class, vec![ret(vec![choice])]);

    let (module, diagnostics) = compile(&mut ctx, class);
    let body = method_body(&ctx, &module, "first");

    assert!(diagnostics.is_empty());
    ControlFlowGraph::build(body).unwrap().check_phi_edges(body).unwrap();
    assert_eq!(
        listing(&ctx, body),
        indoc::indoc! {"
            L0:
                %0 = literal true
                br L1
            L1:
                %1 = literal 1
                br L2
            L2:
                return %1
        "}
    );
}

#[test]
fn loops_keep_phi_edges_in_step_with_their_predecessors() {
    let mut ctx = TypeContext::new();
    let mut class = class(&mut ctx, "Looping");
    let (int, boolean) = (int(&ctx), boolean(&ctx));

    // int i = 0; while (b || false) { i = i + 1; } return i;
    let statements = vec![
        declare("i", int, Some(int_literal(&ctx, 0))),
        stmt(tacc::middle::hir::StmtKind::While {
            condition: or(&ctx, vec![local("b", boolean), bool_literal(&ctx, false)]),
            body: block(vec![assign(local("i", int), int_literal(&ctx, 1))]),
        }),
        ret(vec![local("i", int)]),
    ];
    MethodBuilder::method("spin")
        .parameter("b", boolean)
        .returns(int)
        .build(&mut ctx, &mut class, statements);

    let (module, _) = compile(&mut ctx, class);
    let body = method_body(&ctx, &module, "spin");

    ControlFlowGraph::build(body).unwrap().check_phi_edges(body).unwrap();
    assert!(count(body, |kind| matches!(kind, NodeKind::Phi { .. })) > 0);
}
