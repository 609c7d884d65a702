//! Usage canonicalization.
//!
//! Rewrites the many ways of spelling the same framework call into one form
//! so that canonical serializations can be compared byte for byte:
//!
//! 1. imported names become `__root__.<qualified.path>` chains and the
//!    imports that bound them are dropped,
//! 2. equivalent accessor paths collapse onto one spelling,
//! 3. calls with a known signature get keyword arguments in signature order.
//!
//! The transform is idempotent.

use std::collections::{HashMap, HashSet};

use crate::ast::*;
use crate::index::{NodeRef, ParentIndex};
use crate::parser::parse;
use crate::printer::serialize;
use crate::signatures::{self, Signature, PATH_ALIASES};
use crate::span::Span;
use crate::visit::{retain_stmts, walk_module_exprs_mut, walk_stmts_mut};
use crate::Result;

/// Synthetic qualifier that anchors resolved import paths.
pub const ROOT: &str = "__root__";

pub fn canonicalize_usage(mut module: Module) -> Module {
    let resolved = resolvable_imports(&module);
    if !resolved.is_empty() {
        drop_resolved_imports(&mut module, &resolved);
    }
    walk_module_exprs_mut(&mut module, &mut |expr| {
        if let Some(path) = expr.as_name().and_then(|id| resolved.get(id)) {
            *expr = Expr::dotted(&format!("{ROOT}.{path}"));
        }
        rewrite_accessor(expr);
        normalize_call(expr);
    });
    module
}

/// `serialize(canonicalize_usage(parse(text)))`.
pub fn canonical_form(text: &str) -> Result<String> {
    Ok(serialize(&canonicalize_usage(parse(text)?)))
}

/// Strip the root qualifier: `__root__.a.b` becomes `a.b`.
pub fn strip_root(path: &str) -> Option<&str> {
    path.strip_prefix(ROOT)?.strip_prefix('.')
}

// ---------------------------------------------------------------------------
// Import resolution
// ---------------------------------------------------------------------------

/// Alias name to qualified module path, for every import alias whose name is
/// bound nowhere else and bound to a single path.
fn resolvable_imports(module: &Module) -> HashMap<String, String> {
    let index = ParentIndex::build(module);
    let mut aliases: HashMap<String, String> = HashMap::new();
    let mut conflicting: HashSet<String> = HashSet::new();
    let mut bound: HashSet<String> = HashSet::new();

    for (_, node) in index.iter() {
        match node {
            NodeRef::Stmt(stmt) => {
                for (name, path) in import_bindings(stmt) {
                    match aliases.get(&name) {
                        Some(existing) if *existing != path => {
                            conflicting.insert(name);
                        }
                        Some(_) => {}
                        None => {
                            aliases.insert(name, path);
                        }
                    }
                }
                stmt_bindings(stmt, &mut bound);
            }
            NodeRef::Expr(expr) => {
                if let ExprKind::NamedExpr { target, .. } = &expr.kind {
                    target_names(target, &mut bound);
                }
            }
            NodeRef::Param(param) => {
                bound.insert(param.name.clone());
            }
            NodeRef::WithItem(item) => {
                if let Some(target) = &item.target {
                    target_names(target, &mut bound);
                }
            }
            NodeRef::Handler(handler) => {
                if let Some(name) = &handler.name {
                    bound.insert(name.clone());
                }
            }
            NodeRef::Comprehension(generator) => target_names(&generator.target, &mut bound),
            NodeRef::Keyword(_) => {}
        }
    }

    aliases.retain(|name, _| !bound.contains(name) && !conflicting.contains(name));
    aliases
}

/// Names an import statement binds, with the path each one resolves to.
fn import_bindings(stmt: &Stmt) -> Vec<(String, String)> {
    match &stmt.kind {
        StmtKind::Import { names } => names
            .iter()
            .map(|alias| match &alias.asname {
                Some(asname) => (asname.clone(), alias.name.clone()),
                None => {
                    let head = alias.bound_name().to_string();
                    (head.clone(), head)
                }
            })
            .collect(),
        StmtKind::ImportFrom {
            module: Some(module),
            names,
            level: 0,
        } if module.as_str() != "__future__" => names
            .iter()
            .filter(|alias| alias.name != "*")
            .map(|alias| {
                (
                    alias.bound_name().to_string(),
                    format!("{module}.{}", alias.name),
                )
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn stmt_bindings(stmt: &Stmt, bound: &mut HashSet<String>) {
    match &stmt.kind {
        StmtKind::Assign { targets, .. } | StmtKind::Delete { targets } => {
            for target in targets {
                target_names(target, bound);
            }
        }
        StmtKind::AugAssign { target, .. }
        | StmtKind::AnnAssign { target, .. }
        | StmtKind::For { target, .. } => target_names(target, bound),
        StmtKind::FunctionDef(def) => {
            bound.insert(def.name.clone());
        }
        StmtKind::ClassDef(class) => {
            bound.insert(class.name.clone());
        }
        StmtKind::Global { names } | StmtKind::Nonlocal { names } => {
            bound.extend(names.iter().cloned());
        }
        // relative and __future__ imports stay as written
        StmtKind::ImportFrom { module, names, level }
            if *level > 0 || module.as_deref() == Some("__future__") =>
        {
            bound.extend(names.iter().map(|alias| alias.bound_name().to_string()));
        }
        _ => {}
    }
}

fn target_names(target: &Expr, bound: &mut HashSet<String>) {
    match &target.kind {
        ExprKind::Name(id) => {
            bound.insert(id.clone());
        }
        ExprKind::Tuple(elts) | ExprKind::List(elts) => {
            for elt in elts {
                target_names(elt, bound);
            }
        }
        ExprKind::Starred(inner) => target_names(inner, bound),
        _ => {}
    }
}

fn drop_resolved_imports(module: &mut Module, resolved: &HashMap<String, String>) {
    walk_stmts_mut(module, &mut |stmt| match &mut stmt.kind {
        StmtKind::Import { names } => {
            names.retain(|alias| !resolved.contains_key(alias.bound_name()))
        }
        StmtKind::ImportFrom {
            module: Some(module),
            names,
            level: 0,
        } if module.as_str() != "__future__" => {
            names.retain(|alias| !resolved.contains_key(alias.bound_name()))
        }
        _ => {}
    });
    retain_stmts(module, &mut |stmt| match &stmt.kind {
        StmtKind::Import { names } | StmtKind::ImportFrom { names, .. } => !names.is_empty(),
        _ => true,
    });
}

// ---------------------------------------------------------------------------
// Accessor paths
// ---------------------------------------------------------------------------

/// Canonical spelling of a dotted path without the root qualifier.
pub fn canonical_path(path: &str) -> String {
    let mut current = path.to_string();
    for _ in 0..PATH_ALIASES.len() {
        let mut changed = false;
        for (from, to) in PATH_ALIASES {
            if let Some(rest) = current.strip_prefix(from) {
                if rest.is_empty() || rest.starts_with('.') {
                    current = format!("{to}{rest}");
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
    current
}

fn rewrite_accessor(expr: &mut Expr) {
    if !matches!(expr.kind, ExprKind::Attribute { .. }) {
        return;
    }
    let Some(path) = expr.dotted_path() else {
        return;
    };
    let Some(relative) = strip_root(&path) else {
        return;
    };
    let canonical = canonical_path(relative);
    if canonical != relative {
        let span = expr.span;
        *expr = Expr::dotted(&format!("{ROOT}.{canonical}"));
        expr.span = span;
    }
}

// ---------------------------------------------------------------------------
// Call normalization
// ---------------------------------------------------------------------------

fn call_signature(func: &Expr) -> Option<Signature> {
    if let Some(path) = func.dotted_path() {
        if let Some(relative) = strip_root(&path) {
            return signatures::constructor(relative);
        }
    }
    match &func.kind {
        ExprKind::Attribute { value, attr } => {
            // Methods reached through an imported module are not model methods.
            let through_root = value
                .dotted_path()
                .is_some_and(|base| base == ROOT || strip_root(&base).is_some());
            if through_root {
                None
            } else {
                signatures::method(attr)
            }
        }
        _ => None,
    }
}

fn normalize_call(expr: &mut Expr) {
    let ExprKind::Call {
        func,
        args,
        keywords,
    } = &mut expr.kind
    else {
        return;
    };
    let Some(sig) = call_signature(func) else {
        return;
    };
    if args.iter().any(|a| matches!(a.kind, ExprKind::Starred(_)))
        || keywords.iter().any(|k| k.arg.is_none())
        || args.len() > sig.max_positional
    {
        return;
    }

    let mut seen: HashSet<&str> = sig.params[..args.len()].iter().copied().collect();
    for keyword in keywords.iter() {
        let name = sig.rename(keyword.arg.as_deref().unwrap_or_default());
        if !seen.insert(name) {
            return;
        }
    }

    for keyword in keywords.iter_mut() {
        if let Some(arg) = &keyword.arg {
            let renamed = sig.rename(arg);
            if renamed != arg {
                keyword.arg = Some(renamed.to_string());
            }
        }
    }
    let converted: Vec<Keyword> = args
        .drain(..)
        .zip(sig.params)
        .map(|(value, name)| Keyword {
            arg: Some((*name).to_string()),
            value,
            span: Span::SYNTHETIC,
        })
        .collect();
    keywords.splice(0..0, converted);
    let order = |k: &Keyword| {
        k.arg
            .as_deref()
            .and_then(|name| sig.position(name))
            .unwrap_or(sig.params.len())
    };
    keywords.sort_by_key(order);
}
