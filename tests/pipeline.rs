mod common;

use common::*;
use tacc::{
    compile_program,
    config::Config,
    diagnostics::{DiagnosticKind, Reporter},
    middle::{
        hir::{self, StmtKind},
        lir::pretty_print,
        ty::TypeContext,
    },
};

/// A few classes with something for every pass to do, built the same way on
/// every call
fn program(ctx: &mut TypeContext) -> Vec<hir::Class> {
    let mut classes = Vec::new();

    for n in 0..6 {
        let mut class = class(ctx, &format!("Class{n}"));
        let (int, boolean, string) = (int(ctx), boolean(ctx), string(ctx));
        add_field(ctx, &mut class, "label", string);

        // every other class forgets to set its label
        let create_body = match n % 2 {
            0 => vec![assign(
                this_field(class.ty, "label", string),
                string_literal(ctx, "ready"),
            )],
            _ => Vec::new(),
        };
        MethodBuilder::create().build(ctx, &mut class, create_body);

        let body = vec![
            declare("x", int, Some(int_literal(ctx, n))),
            if_else(
                or(ctx, vec![local("c", boolean), bool_literal(ctx, true)]),
                vec![assign(local("x", int), int_literal(ctx, 1))],
                None,
            ),
            stmt(StmtKind::While {
                condition: less(ctx, local("x", int), int_literal(ctx, 10)),
                body: block(vec![assign(local("x", int), int_literal(ctx, 10))]),
            }),
            ret(vec![local("x", int)]),
        ];
        MethodBuilder::method("run")
            .parameter("c", boolean)
            .returns(int)
            .build(ctx, &mut class, body);

        classes.push(class);
    }

    classes
}

fn run(parallel: bool) -> (Vec<String>, Vec<String>) {
    let mut ctx = TypeContext::new();
    let mut classes = program(&mut ctx);
    let mut reporter = Reporter::new(false);
    let config = Config::default().with_parallel(parallel);

    let modules = compile_program(&mut ctx, &mut classes, &config, &mut reporter).unwrap();

    let listings = modules
        .iter()
        .map(|module| strip_ansi_escapes::strip_str(pretty_print::module_to_string(&ctx, module)))
        .collect();
    let diagnostics = reporter
        .diagnostics()
        .iter()
        // spans differ between runs, the helpers allocate them globally
        .map(|d| format!("{:?} {}", d.kind, d.message))
        .collect();

    (listings, diagnostics)
}

#[test]
fn parallel_compilation_matches_sequential() {
    assert_eq!(run(true), run(false));
}

#[test]
fn diagnostics_are_merged_in_class_order() {
    let (_, diagnostics) = run(true);

    assert_eq!(diagnostics.len(), 3);
    assert!(diagnostics.iter().all(|d| d.starts_with("UninitializedField")));
}

#[test]
fn reporter_counts_by_severity() {
    let mut ctx = TypeContext::new();
    let mut classes = program(&mut ctx);
    let mut reporter = Reporter::new(false);

    compile_program(&mut ctx, &mut classes, &Config::default(), &mut reporter).unwrap();

    assert_eq!(reporter.error_count(), 3);
    assert_eq!(reporter.warning_count(), 0);
    assert!(reporter.has_errors());
}

#[test]
fn warnings_fail_the_build_when_denied() {
    let mut ctx = TypeContext::new();
    let mut class = class(&mut ctx, "Wasteful");
    let int = int(&ctx);

    let body = vec![
        ret(vec![int_literal(&ctx, 1)]),
        declare("unused", int, Some(int_literal(&ctx, 2))),
    ];
    MethodBuilder::method("wasteful")
        .returns(int)
        .build(&mut ctx, &mut class, body);

    let mut classes = vec![class];
    let mut lenient = Reporter::new(false);
    let mut strict = Reporter::new(true);

    compile_program(&mut ctx, &mut classes.clone(), &Config::default(), &mut lenient).unwrap();
    compile_program(&mut ctx, &mut classes, &Config::default(), &mut strict).unwrap();

    assert_eq!(lenient.warning_count(), 1);
    assert!(!lenient.has_errors());
    assert!(strict.has_errors());
    assert_eq!(strict.diagnostics()[0].kind, DiagnosticKind::UnreachableCode);
}

#[test]
fn diagnostics_render_their_kind_and_location() {
    let mut ctx = TypeContext::new();
    let mut class = class(&mut ctx, "Rendered");
    let string = string(&ctx);
    add_field(&mut ctx, &mut class, "title", string);
    let field_span = class.fields[0].span;

    let (_, diagnostics) = compile(&mut ctx, class);
    let rendered = strip_ansi_escapes::strip_str(diagnostics.diagnostics()[0].to_string());

    assert!(rendered.ends_with(&format!(
        "error[uninitialized-field]: non-nullable field title might not be initialized by a create (at {field_span})"
    )));
}
