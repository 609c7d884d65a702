//! Mutable tree walkers used by rewrites.
//!
//! Expression walks are post-order: children are rewritten before the
//! callback sees their parent.

use crate::ast::*;

pub fn walk_module_exprs_mut(module: &mut Module, f: &mut dyn FnMut(&mut Expr)) {
    for stmt in &mut module.body {
        walk_stmt_exprs_mut(stmt, f);
    }
}

fn walk_opt(expr: Option<&mut Expr>, f: &mut dyn FnMut(&mut Expr)) {
    if let Some(expr) = expr {
        walk_expr_mut(expr, f);
    }
}

fn walk_all(exprs: &mut [Expr], f: &mut dyn FnMut(&mut Expr)) {
    for expr in exprs {
        walk_expr_mut(expr, f);
    }
}

fn walk_block(stmts: &mut [Stmt], f: &mut dyn FnMut(&mut Expr)) {
    for stmt in stmts {
        walk_stmt_exprs_mut(stmt, f);
    }
}

fn walk_params(params: &mut [Param], f: &mut dyn FnMut(&mut Expr)) {
    for param in params {
        walk_opt(param.annotation.as_mut(), f);
        walk_opt(param.default.as_mut(), f);
    }
}

fn walk_comprehensions(generators: &mut [Comprehension], f: &mut dyn FnMut(&mut Expr)) {
    for generator in generators {
        walk_expr_mut(&mut generator.target, f);
        walk_expr_mut(&mut generator.iter, f);
        walk_all(&mut generator.ifs, f);
    }
}

pub fn walk_stmt_exprs_mut(stmt: &mut Stmt, f: &mut dyn FnMut(&mut Expr)) {
    match &mut stmt.kind {
        StmtKind::Expr { value } => walk_expr_mut(value, f),
        StmtKind::Assign { targets, value } => {
            walk_all(targets, f);
            walk_expr_mut(value, f);
        }
        StmtKind::AugAssign { target, value, .. } => {
            walk_expr_mut(target, f);
            walk_expr_mut(value, f);
        }
        StmtKind::AnnAssign {
            target,
            annotation,
            value,
        } => {
            walk_expr_mut(target, f);
            walk_expr_mut(annotation, f);
            walk_opt(value.as_mut(), f);
        }
        StmtKind::Import { .. }
        | StmtKind::ImportFrom { .. }
        | StmtKind::Pass
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Global { .. }
        | StmtKind::Nonlocal { .. } => {}
        StmtKind::FunctionDef(def) => {
            walk_all(&mut def.decorators, f);
            walk_params(&mut def.params, f);
            walk_opt(def.returns.as_mut(), f);
            walk_block(&mut def.body, f);
        }
        StmtKind::ClassDef(class) => {
            walk_all(&mut class.decorators, f);
            walk_all(&mut class.bases, f);
            for keyword in &mut class.keywords {
                walk_expr_mut(&mut keyword.value, f);
            }
            walk_block(&mut class.body, f);
        }
        StmtKind::Return { value } => walk_opt(value.as_mut(), f),
        StmtKind::Delete { targets } => walk_all(targets, f),
        StmtKind::Raise { exc, cause } => {
            walk_opt(exc.as_mut(), f);
            walk_opt(cause.as_mut(), f);
        }
        StmtKind::Assert { test, msg } => {
            walk_expr_mut(test, f);
            walk_opt(msg.as_mut(), f);
        }
        StmtKind::If { test, body, orelse } | StmtKind::While { test, body, orelse } => {
            walk_expr_mut(test, f);
            walk_block(body, f);
            walk_block(orelse, f);
        }
        StmtKind::For {
            target,
            iter,
            body,
            orelse,
            ..
        } => {
            walk_expr_mut(target, f);
            walk_expr_mut(iter, f);
            walk_block(body, f);
            walk_block(orelse, f);
        }
        StmtKind::With { items, body, .. } => {
            for item in items {
                walk_expr_mut(&mut item.context, f);
                walk_opt(item.target.as_mut(), f);
            }
            walk_block(body, f);
        }
        StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            walk_block(body, f);
            for handler in handlers {
                walk_opt(handler.kind.as_mut(), f);
                walk_block(&mut handler.body, f);
            }
            walk_block(orelse, f);
            walk_block(finalbody, f);
        }
    }
}

pub fn walk_expr_mut(expr: &mut Expr, f: &mut dyn FnMut(&mut Expr)) {
    match &mut expr.kind {
        ExprKind::Name(_) | ExprKind::Constant(_) | ExprKind::FString(_) => {}
        ExprKind::Attribute { value, .. }
        | ExprKind::Starred(value)
        | ExprKind::Await(value)
        | ExprKind::YieldFrom(value) => walk_expr_mut(value, f),
        ExprKind::Yield(value) => walk_opt(value.as_deref_mut(), f),
        ExprKind::Call {
            func,
            args,
            keywords,
        } => {
            walk_expr_mut(func, f);
            walk_all(args, f);
            for keyword in keywords {
                walk_expr_mut(&mut keyword.value, f);
            }
        }
        ExprKind::Subscript { value, slice } => {
            walk_expr_mut(value, f);
            walk_expr_mut(slice, f);
        }
        ExprKind::Slice { lower, upper, step } => {
            walk_opt(lower.as_deref_mut(), f);
            walk_opt(upper.as_deref_mut(), f);
            walk_opt(step.as_deref_mut(), f);
        }
        ExprKind::BinOp { left, right, .. } => {
            walk_expr_mut(left, f);
            walk_expr_mut(right, f);
        }
        ExprKind::UnaryOp { operand, .. } => walk_expr_mut(operand, f),
        ExprKind::BoolOp { values, .. } => walk_all(values, f),
        ExprKind::Compare {
            left, comparators, ..
        } => {
            walk_expr_mut(left, f);
            walk_all(comparators, f);
        }
        ExprKind::IfExp { test, body, orelse } => {
            walk_expr_mut(body, f);
            walk_expr_mut(test, f);
            walk_expr_mut(orelse, f);
        }
        ExprKind::Lambda { params, body } => {
            walk_params(params, f);
            walk_expr_mut(body, f);
        }
        ExprKind::NamedExpr { target, value } => {
            walk_expr_mut(target, f);
            walk_expr_mut(value, f);
        }
        ExprKind::Tuple(elts) | ExprKind::List(elts) | ExprKind::Set(elts) => walk_all(elts, f),
        ExprKind::Dict { keys, values } => {
            for key in keys.iter_mut().flatten() {
                walk_expr_mut(key, f);
            }
            walk_all(values, f);
        }
        ExprKind::ListComp { elt, generators }
        | ExprKind::SetComp { elt, generators }
        | ExprKind::GeneratorExp { elt, generators } => {
            walk_expr_mut(elt, f);
            walk_comprehensions(generators, f);
        }
        ExprKind::DictComp {
            key,
            value,
            generators,
        } => {
            walk_expr_mut(key, f);
            walk_expr_mut(value, f);
            walk_comprehensions(generators, f);
        }
    }
    f(expr);
}

/// Visit every statement, parents before their nested blocks.
pub fn walk_stmts_mut(module: &mut Module, f: &mut dyn FnMut(&mut Stmt)) {
    walk_stmt_block_mut(&mut module.body, f);
}

fn walk_stmt_block_mut(block: &mut [Stmt], f: &mut dyn FnMut(&mut Stmt)) {
    for stmt in block {
        f(stmt);
        match &mut stmt.kind {
            StmtKind::FunctionDef(def) => walk_stmt_block_mut(&mut def.body, f),
            StmtKind::ClassDef(class) => walk_stmt_block_mut(&mut class.body, f),
            StmtKind::If { body, orelse, .. }
            | StmtKind::While { body, orelse, .. }
            | StmtKind::For { body, orelse, .. } => {
                walk_stmt_block_mut(body, f);
                walk_stmt_block_mut(orelse, f);
            }
            StmtKind::With { body, .. } => walk_stmt_block_mut(body, f),
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                walk_stmt_block_mut(body, f);
                for handler in handlers {
                    walk_stmt_block_mut(&mut handler.body, f);
                }
                walk_stmt_block_mut(orelse, f);
                walk_stmt_block_mut(finalbody, f);
            }
            _ => {}
        }
    }
}

/// Drop statements for which `keep` returns false, at every nesting level.
/// A block left empty is refilled with `pass`.
pub fn retain_stmts(module: &mut Module, keep: &mut dyn FnMut(&Stmt) -> bool) {
    retain_block(&mut module.body, keep, false);
}

fn retain_block(block: &mut Vec<Stmt>, keep: &mut dyn FnMut(&Stmt) -> bool, must_fill: bool) {
    block.retain(|stmt| keep(stmt));
    for stmt in block.iter_mut() {
        match &mut stmt.kind {
            StmtKind::FunctionDef(def) => retain_block(&mut def.body, keep, true),
            StmtKind::ClassDef(class) => retain_block(&mut class.body, keep, true),
            StmtKind::If { body, orelse, .. }
            | StmtKind::While { body, orelse, .. }
            | StmtKind::For { body, orelse, .. } => {
                retain_block(body, keep, true);
                retain_block(orelse, keep, false);
            }
            StmtKind::With { body, .. } => retain_block(body, keep, true),
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                retain_block(body, keep, true);
                for handler in handlers {
                    retain_block(&mut handler.body, keep, true);
                }
                retain_block(orelse, keep, false);
                retain_block(finalbody, keep, false);
            }
            _ => {}
        }
    }
    if must_fill && block.is_empty() {
        block.push(Stmt::synthetic(StmtKind::Pass));
    }
}
