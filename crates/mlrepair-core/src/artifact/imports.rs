//! Turning a canonical repaired program back into runnable source.
//!
//! Canonical programs refer to library names through the synthetic root
//! qualifier and carry no imports for them. [`trainable_source`] strips the
//! qualifier and prepends an [`ImportPlan`] covering every module the
//! program reaches.

use std::collections::BTreeSet;

use model_syntax::visit::walk_module_exprs_mut;
use model_syntax::{parse, serialize, strip_root, Expr, ExprKind, ParentIndex, ROOT};

use crate::error::Result;

/// Modules a program may import. Each member is optional: a module that
/// is not installed leaves the rest of the program runnable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportPlan {
    modules: BTreeSet<String>,
}

impl ImportPlan {
    /// Add every proper prefix of the module part of `path`. For
    /// `keras.layers.Dense` that is `keras` and `keras.layers`.
    pub fn add_path(&mut self, path: &str) {
        let parts: Vec<&str> = path.split('.').collect();
        for end in 1..parts.len() {
            self.modules.insert(parts[..end].join("."));
        }
    }

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Guarded import statements, one block per module, sorted.
    pub fn render(&self) -> String {
        self.modules
            .iter()
            .map(|module| format!("try:\n    import {module}\nexcept ImportError:\n    pass\n"))
            .collect()
    }
}

/// The import plan of a canonical program.
pub fn import_plan(program: &str) -> Result<ImportPlan> {
    let module = parse(program)?;
    let index = ParentIndex::build(&module);
    let mut plan = ImportPlan::default();
    for (_, node) in index.iter() {
        if let Some(path) = node.as_expr().and_then(Expr::dotted_path) {
            if let Some(relative) = strip_root(&path) {
                plan.add_path(relative);
            }
        }
    }
    Ok(plan)
}

/// Drop the root qualifier: `__root__.a.b` becomes `a.b`.
fn strip_qualifier(expr: &mut Expr) {
    let ExprKind::Attribute { value, attr } = &expr.kind else {
        return;
    };
    if value.as_name() == Some(ROOT) {
        *expr = Expr::new(ExprKind::Name(attr.clone()), expr.span);
    }
}

/// Runnable source for a canonical program: guarded imports followed by
/// the program without root qualifiers.
pub fn trainable_source(program: &str) -> Result<String> {
    let plan = import_plan(program)?;
    let mut module = parse(program)?;
    walk_module_exprs_mut(&mut module, &mut strip_qualifier);
    let body = serialize(&module);
    if plan.is_empty() {
        return Ok(body);
    }
    Ok(format!("{}{}", plan.render(), body))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAM: &str = "\
model = __root__.keras.models.Sequential()
model.add(__root__.keras.layers.Dense(units=10))
x = __root__.numpy.random.rand(3)
";

    #[test]
    fn test_import_plan_prefixes() {
        let plan = import_plan(PROGRAM).unwrap();
        let modules: Vec<&str> = plan.modules().collect();
        assert_eq!(
            modules,
            vec!["keras", "keras.layers", "keras.models", "numpy", "numpy.random"]
        );
    }

    #[test]
    fn test_trainable_source() {
        let source = trainable_source(PROGRAM).unwrap();
        assert!(source.starts_with("try:\n    import keras\nexcept ImportError:\n    pass\n"));
        assert!(source.ends_with(
            "model = keras.models.Sequential()\nmodel.add(keras.layers.Dense(units=10))\nx = numpy.random.rand(3)\n"
        ));
        assert!(!source.contains(ROOT));
        // the result is a valid program
        assert!(parse(&source).is_ok());
    }

    #[test]
    fn test_program_without_root_paths() {
        let source = trainable_source("x = 1\n").unwrap();
        assert_eq!(source, "x = 1\n");
    }

    #[test]
    fn test_unparseable_program() {
        assert!(trainable_source("x = (").is_err());
    }
}
