//! The optimization fixpoint: unreachable code elimination and constant
//! propagation of branch conditions, followed by the check that every path
//! through a value returning method ends in an explicit return.

use log::debug;

use crate::{
    config::Config,
    diagnostics::{DiagnosticCollector, DiagnosticKind, report},
    error::{CompileError, Result},
    middle::{
        cfg::{ControlFlowGraph, phi},
        lir::{Body, NodeKind},
        module::Method,
        ty::TypeContext,
    },
};

pub mod const_prop;
pub mod unreachable;

pub use const_prop::propagate_constants;
pub use unreachable::remove_unreachable_code;

/// Removes unreachable code (reporting it), places phis, runs the fixpoint
/// when enabled and checks that all paths return
pub fn optimize_method(
    ctx: &TypeContext,
    method: &mut Method,
    config: &Config,
    diagnostics: &mut DiagnosticCollector,
) -> Result<()> {
    let signature = ctx.signature(method.signature);
    let Some(body) = method.body.as_mut() else {
        return Ok(());
    };

    remove_unreachable_code(body, Some(diagnostics))?;
    phi::place_phis(body)?;

    if config.optimize {
        let iterations = run_fixpoint(body, config.max_fixpoint_iterations)?;
        debug!(
            "{}: optimization fixpoint reached after {iterations} iterations",
            signature.mangled_name
        );
    }

    if !signature.returns.is_empty() && !signature.is_create() {
        check_all_paths_return(body, method.span, diagnostics)?;
    }

    Ok(())
}

/// Alternates constant propagation and unreachable code removal until neither
/// changes anything. Returns the number of iterations it took.
pub fn run_fixpoint(body: &mut Body, max_iterations: usize) -> Result<usize> {
    for iteration in 1..=max_iterations {
        let propagated = propagate_constants(body);
        let removed = remove_unreachable_code(body, None)?;

        if !propagated && !removed {
            return Ok(iteration);
        }
    }

    Err(CompileError::invariant(format!(
        "optimization did not reach a fixpoint within {max_iterations} iterations"
    )))
}

/// An implicit return which is still reachable means control can fall off the
/// end of the method without producing a value
fn check_all_paths_return(
    body: &Body,
    span: crate::span::Span,
    diagnostics: &mut DiagnosticCollector,
) -> Result<()> {
    let cfg = ControlFlowGraph::build(body)?;
    let reachable = cfg.reachable();

    let falls_off = cfg
        .blocks()
        .filter(|b| reachable.contains(&b.label))
        .any(|b| {
            matches!(
                body.kind(b.terminator()),
                NodeKind::Return { implicit: true, .. }
            )
        });

    if falls_off {
        report!(
            diagnostics,
            DiagnosticKind::NotAllPathsReturn,
            span,
            "not all paths of this method return a value"
        );
    }

    Ok(())
}
