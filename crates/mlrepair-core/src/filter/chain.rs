//! Recognition of the layer chain a placeholder sits in.
//!
//! Two shapes are recognised over the simple statements of a program, in
//! order:
//!
//! - sequential: `m = Sequential(...)` followed by `m.add(<layer>)` lines;
//! - functional: `x = Input(...)` followed by `y = <Layer>(...)(x)` links,
//!   each consuming the previous link's output.

use model_syntax::{unparse_stmt, Expr, ExprKind, Module, ParentIndex, Stmt, StmtKind};

use crate::program::MASK_TOKEN;

const SEQUENTIAL: &str = "__root__.keras.models.Sequential(";
const INPUT: &str = "__root__.keras.layers.Input(";
pub(crate) const LAYERS: &str = "__root__.keras.layers.";

/// Layers of the chain in order, and the index of the layer holding the
/// placeholder.
#[derive(Debug)]
pub(crate) struct LayerChain<'a> {
    pub layers: Vec<&'a Expr>,
    pub position: usize,
}

impl LayerChain<'_> {
    pub fn len(&self) -> usize {
        self.layers.len()
    }
}

pub(crate) fn recognise(module: &Module) -> Option<LayerChain<'_>> {
    let index = ParentIndex::build(module);
    let stmts: Vec<&Stmt> = index
        .iter()
        .filter_map(|(_, node)| node.as_stmt())
        .filter(|s| matches!(s.kind, StmtKind::Assign { .. } | StmtKind::Expr { .. }))
        .collect();
    sequential(&stmts).or_else(|| functional(&stmts))
}

fn single_target(stmt: &Stmt) -> Option<(&str, &Expr)> {
    match &stmt.kind {
        StmtKind::Assign { targets, value } if targets.len() == 1 => {
            Some((targets[0].as_name()?, value))
        }
        _ => None,
    }
}

fn sequential<'a>(stmts: &[&'a Stmt]) -> Option<LayerChain<'a>> {
    let mut model: Option<&str> = None;
    let mut layers = Vec::new();
    let mut position = None;
    for &stmt in stmts {
        let text = unparse_stmt(stmt);
        if text.contains(SEQUENTIAL) {
            if model.is_some() {
                return None;
            }
            model = Some(single_target(stmt)?.0);
            continue;
        }
        let Some(name) = model else { continue };
        if let Some(layer) = added_layer(stmt, name) {
            if text.contains(MASK_TOKEN) {
                position = Some(layers.len());
            }
            layers.push(layer);
        }
    }
    Some(LayerChain {
        layers,
        position: position?,
    })
}

/// `<model>.add(<layer>)`.
fn added_layer<'a>(stmt: &'a Stmt, model: &str) -> Option<&'a Expr> {
    let StmtKind::Expr { value } = &stmt.kind else {
        return None;
    };
    let call = value.as_call()?;
    match &call.func.kind {
        ExprKind::Attribute { value, attr } if attr == "add" && value.as_name() == Some(model) => {
            call.args.first().or_else(|| call.keyword("layer"))
        }
        _ => None,
    }
}

fn functional<'a>(stmts: &[&'a Stmt]) -> Option<LayerChain<'a>> {
    let mut tensor: Option<&str> = None;
    let mut layers = Vec::new();
    let mut position = None;
    for &stmt in stmts {
        let text = unparse_stmt(stmt);
        if text.contains(INPUT) {
            if tensor.is_some() {
                return None;
            }
            let (name, value) = single_target(stmt)?;
            tensor = Some(name);
            layers.push(value);
            continue;
        }
        let Some(input) = tensor else { continue };
        if let Some((output, layer)) = applied_layer(stmt, input) {
            if text.contains(MASK_TOKEN) {
                position = Some(layers.len());
            }
            layers.push(layer);
            tensor = Some(output);
        }
    }
    Some(LayerChain {
        layers,
        position: position?,
    })
}

/// `<output> = <layer>(<input>)`, where `<layer>` is a layer constructor
/// call or the placeholder.
fn applied_layer<'a>(stmt: &'a Stmt, input: &str) -> Option<(&'a str, &'a Expr)> {
    let (output, value) = single_target(stmt)?;
    let call = value.as_call()?;
    let consumes_input = call.keywords.is_empty()
        && call.args.len() == 1
        && call.args[0].as_name() == Some(input);
    if !consumes_input {
        return None;
    }
    let layer = call.func;
    let is_layer = match layer.as_call() {
        Some(inner) => matches!(inner.func_path(), Some(path) if path.starts_with(LAYERS)),
        None => layer.as_name() == Some(MASK_TOKEN),
    };
    is_layer.then_some((output, layer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_syntax::{parse, unparse_expr};

    fn chain(src: &str) -> Option<(Vec<String>, usize)> {
        let module = parse(src).unwrap();
        recognise(&module).map(|c| {
            (
                c.layers.iter().map(|l| unparse_expr(l)).collect(),
                c.position,
            )
        })
    }

    #[test]
    fn test_sequential_chain() {
        let src = "\
model = __root__.keras.models.Sequential()
model.add(__root__.keras.layers.Dense(units=64))
other.add(__root__.keras.layers.Dense(units=1))
model.add(__root__.keras.layers.Dense(units=__mask_0__))
";
        let (layers, position) = chain(src).unwrap();
        assert_eq!(layers.len(), 2);
        assert_eq!(position, 1);
    }

    #[test]
    fn test_two_sequential_models_is_unrecognised() {
        let src = "\
a = __root__.keras.models.Sequential()
b = __root__.keras.models.Sequential()
a.add(__mask_0__)
";
        assert!(chain(src).is_none());
    }

    #[test]
    fn test_functional_chain_with_rebinding() {
        let src = "\
x = __root__.keras.layers.Input(shape=(784,))
x = __root__.keras.layers.Dense(units=64)(x)
y = __root__.keras.layers.Dense(units=__mask_0__)(x)
";
        let (layers, position) = chain(src).unwrap();
        assert_eq!(
            layers,
            vec![
                "__root__.keras.layers.Input(shape=(784,))",
                "__root__.keras.layers.Dense(units=64)",
                "__root__.keras.layers.Dense(units=__mask_0__)",
            ]
        );
        assert_eq!(position, 2);
    }

    #[test]
    fn test_placeholder_outside_chain() {
        let src = "\
model = __root__.keras.models.Sequential()
model.add(__root__.keras.layers.Dense(units=64))
model.fit(x, epochs=__mask_0__)
";
        assert!(chain(src).is_none());
    }

    #[test]
    fn test_nested_statements_are_seen() {
        let src = "\
def build():
    model = __root__.keras.models.Sequential()
    model.add(__mask_0__)
    return model
";
        assert_eq!(chain(src).unwrap().1, 0);
    }
}
