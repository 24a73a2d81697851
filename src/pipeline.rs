//! Drives the middle end over whole classes: lowering, optimization,
//! reference counting and field verification, in that order.

use std::thread;

use log::{debug, info, trace};

use crate::{
    config::Config,
    diagnostics::{DiagnosticCollector, Reporter},
    error::{CompileError, Result},
    middle::{
        hir,
        lir::pretty_print,
        module::{self, Module},
        optimization, refcount,
        ty::TypeContext,
        verify,
    },
};

/// Compiles one class and its nested classes. Diagnostics go to
/// `diagnostics`; the error is reserved for unsupported constructs and broken
/// invariants.
pub fn compile_module(
    ctx: &TypeContext,
    class: &hir::Class,
    config: &Config,
    diagnostics: &mut DiagnosticCollector,
) -> Result<Module> {
    /* Lower */

    let mut module = Module::assemble(ctx, class)?;

    /* Optimize and instrument */

    process_methods(ctx, &mut module, config, diagnostics)?;

    /* Verify */

    if config.verify_fields {
        verify::check_field_initialization(
            ctx,
            &module,
            config.max_fixpoint_iterations,
            diagnostics,
        )?;
    }

    debug!(
        "compiled {} with {} diagnostics",
        ctx.type_name(module.ty),
        diagnostics.len()
    );
    trace!("{}", pretty_print::module_to_string(ctx, &module));

    Ok(module)
}

fn process_methods(
    ctx: &TypeContext,
    module: &mut Module,
    config: &Config,
    diagnostics: &mut DiagnosticCollector,
) -> Result<()> {
    for method in &mut module.methods {
        let name = &ctx.signature(method.signature).mangled_name;
        debug!("processing {name}");

        optimization::optimize_method(ctx, method, config, diagnostics)
            .map_err(|e| e.in_method(name.clone()))?;

        if config.reference_counting {
            refcount::insert_reference_counts(ctx, method, config.max_fixpoint_iterations)
                .map_err(|e| e.in_method(name.clone()))?;
        }
    }

    for inner in &mut module.inner {
        process_methods(ctx, inner, config, diagnostics)?;
    }

    Ok(())
}

/// Compiles every class of a program. Classes without a create get a default
/// one first, which is the only change made to `ctx`. With
/// [`Config::parallel`] each class is compiled on its own thread; the result
/// and the order of the diagnostics are the same either way.
pub fn compile_program(
    ctx: &mut TypeContext,
    classes: &mut [hir::Class],
    config: &Config,
    reporter: &mut Reporter,
) -> Result<Vec<Module>> {
    for class in classes.iter_mut() {
        module::synthesize_default_creates(ctx, class);
    }

    let ctx: &TypeContext = ctx;
    let classes: &[hir::Class] = classes;

    info!(
        "compiling {} classes{}",
        classes.len(),
        if config.parallel { " in parallel" } else { "" }
    );

    let results = match config.parallel {
        true => compile_parallel(ctx, classes, config)?,
        false => classes
            .iter()
            .map(|class| {
                let mut diagnostics = DiagnosticCollector::new();
                let module = compile_module(ctx, class, config, &mut diagnostics);
                (module, diagnostics)
            })
            .collect(),
    };

    let mut modules = Vec::with_capacity(results.len());
    for (module, diagnostics) in results {
        reporter.merge(diagnostics);
        modules.push(module?);
    }

    Ok(modules)
}

type ModuleResult = (Result<Module>, DiagnosticCollector);

fn compile_parallel(
    ctx: &TypeContext,
    classes: &[hir::Class],
    config: &Config,
) -> Result<Vec<ModuleResult>> {
    thread::scope(|scope| {
        let handles = classes
            .iter()
            .map(|class| {
                scope.spawn(move || {
                    let mut diagnostics = DiagnosticCollector::new();
                    let module = compile_module(ctx, class, config, &mut diagnostics);
                    (module, diagnostics)
                })
            })
            .collect::<Vec<_>>();

        handles
            .into_iter()
            .zip(classes)
            .map(|(handle, class)| {
                handle.join().map_err(|_| {
                    CompileError::invariant(format!(
                        "compilation of {} panicked",
                        ctx.type_name(class.ty)
                    ))
                })
            })
            .collect()
    })
}
