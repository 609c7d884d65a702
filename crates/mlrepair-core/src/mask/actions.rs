use model_syntax::{Call, Expr, ExprKind, ParentIndex};

use super::{splice, MaskAction};
use crate::program::{MaskedProgram, SourceProgram};

const LAYERS: &str = "__root__.keras.layers.";
const OPTIMIZERS: &str = "__root__.keras.optimizers.";

/// `fit` arguments that carry data rather than hyperparameters.
const FIT_DATA_ARGS: &[&str] = &["x", "y", "validation_data", "callbacks"];

/// Every call expression of the program, in source order.
fn calls<'a>(index: &ParentIndex<'a>) -> Vec<(&'a Expr, Call<'a>)> {
    index
        .iter()
        .filter_map(|(_, node)| node.as_expr())
        .filter_map(|expr| expr.as_call().map(|call| (expr, call)))
        .collect()
}

fn has_prefix(call: &Call<'_>, prefix: &str) -> bool {
    matches!(call.func_path(), Some(path) if path.starts_with(prefix))
}

/// `receiver.method(...)` where the receiver is a local value, not a
/// resolved module path.
fn is_method(call: &Call<'_>, method: &str) -> bool {
    match &call.func.kind {
        ExprKind::Attribute { value, attr } => {
            attr == method
                && !matches!(value.dotted_path(), Some(path) if path.starts_with("__root__"))
        }
        _ => false,
    }
}

/// Argument values of `call`, positional first.
fn argument_values<'a>(call: &Call<'a>) -> impl Iterator<Item = &'a Expr> {
    call.args
        .iter()
        .chain(call.keywords.iter().map(|k| &k.value))
}

fn mask_each<'a>(
    program: &SourceProgram,
    exprs: impl IntoIterator<Item = &'a Expr>,
) -> Vec<MaskedProgram> {
    exprs
        .into_iter()
        .filter_map(|expr| splice(&program.text, expr.span))
        .collect()
}

/// Each argument of each layer constructor call.
pub struct LayerArgumentMask;

impl MaskAction for LayerArgumentMask {
    fn name(&self) -> &'static str {
        "layer_argument"
    }

    fn apply(&self, program: &SourceProgram) -> Vec<MaskedProgram> {
        let index = ParentIndex::build(&program.module);
        let values = calls(&index)
            .into_iter()
            .filter(|(_, call)| has_prefix(call, LAYERS))
            .flat_map(|(_, call)| argument_values(&call).collect::<Vec<_>>());
        mask_each(program, values)
    }
}

/// Each layer constructor call as a whole.
pub struct LayerConstructMask;

impl MaskAction for LayerConstructMask {
    fn name(&self) -> &'static str {
        "layer_construct"
    }

    fn apply(&self, program: &SourceProgram) -> Vec<MaskedProgram> {
        let index = ParentIndex::build(&program.module);
        let constructors = calls(&index)
            .into_iter()
            .filter(|(_, call)| has_prefix(call, LAYERS))
            .map(|(expr, _)| expr);
        mask_each(program, constructors)
    }
}

/// Each optimizer construction, then each of its arguments.
pub struct OptimizerMask;

impl MaskAction for OptimizerMask {
    fn name(&self) -> &'static str {
        "optimizer"
    }

    fn apply(&self, program: &SourceProgram) -> Vec<MaskedProgram> {
        let index = ParentIndex::build(&program.module);
        let exprs = calls(&index)
            .into_iter()
            .filter(|(_, call)| has_prefix(call, OPTIMIZERS))
            .flat_map(|(expr, call)| {
                std::iter::once(expr)
                    .chain(argument_values(&call))
                    .collect::<Vec<_>>()
            });
        mask_each(program, exprs)
    }
}

/// Each argument of `compile` calls.
pub struct CompileArgumentMask;

impl MaskAction for CompileArgumentMask {
    fn name(&self) -> &'static str {
        "compile_argument"
    }

    fn apply(&self, program: &SourceProgram) -> Vec<MaskedProgram> {
        let index = ParentIndex::build(&program.module);
        let values = calls(&index)
            .into_iter()
            .filter(|(_, call)| is_method(call, "compile"))
            .flat_map(|(_, call)| argument_values(&call).collect::<Vec<_>>());
        mask_each(program, values)
    }
}

/// Each keyword hyperparameter of `fit` calls. Data and callbacks are left
/// alone.
pub struct FitArgumentMask;

impl MaskAction for FitArgumentMask {
    fn name(&self) -> &'static str {
        "fit_argument"
    }

    fn apply(&self, program: &SourceProgram) -> Vec<MaskedProgram> {
        let index = ParentIndex::build(&program.module);
        let values = calls(&index)
            .into_iter()
            .filter(|(_, call)| is_method(call, "fit"))
            .flat_map(|(_, call)| {
                call.keywords
                    .iter()
                    .filter(|k| {
                        matches!(&k.arg, Some(arg) if !FIT_DATA_ARGS.contains(&arg.as_str()))
                    })
                    .map(|k| &k.value)
                    .collect::<Vec<_>>()
            });
        mask_each(program, values)
    }
}
