//! Parent lookup over an immutable tree.
//!
//! [`ParentIndex::build`] walks a module once in pre-order, giving every node
//! a [`NodeId`] and recording its parent in a side table. Nodes themselves
//! never point back at their parents.

use crate::ast::*;
use crate::printer::{unparse_expr, unparse_keyword, unparse_params, unparse_stmt};
use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Borrowed reference to any indexed node.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Stmt(&'a Stmt),
    Expr(&'a Expr),
    Keyword(&'a Keyword),
    Param(&'a Param),
    WithItem(&'a WithItem),
    Handler(&'a ExceptHandler),
    Comprehension(&'a Comprehension),
}

impl<'a> NodeRef<'a> {
    pub fn span(&self) -> Span {
        match self {
            NodeRef::Stmt(s) => s.span,
            NodeRef::Expr(e) => e.span,
            NodeRef::Keyword(k) => k.span,
            NodeRef::Param(p) => p.span,
            NodeRef::WithItem(w) => w.span,
            NodeRef::Handler(h) => h.span,
            NodeRef::Comprehension(c) => c.span,
        }
    }

    pub fn as_stmt(&self) -> Option<&'a Stmt> {
        match self {
            NodeRef::Stmt(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_expr(&self) -> Option<&'a Expr> {
        match self {
            NodeRef::Expr(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_keyword(&self) -> Option<&'a Keyword> {
        match self {
            NodeRef::Keyword(k) => Some(k),
            _ => None,
        }
    }

    /// Canonical text of this node alone.
    pub fn unparse(&self) -> String {
        match self {
            NodeRef::Stmt(s) => unparse_stmt(s),
            NodeRef::Expr(e) => unparse_expr(e),
            NodeRef::Keyword(k) => unparse_keyword(k),
            NodeRef::Param(p) => unparse_params(std::slice::from_ref(*p)),
            NodeRef::WithItem(w) => match &w.target {
                Some(target) => format!("{} as {}", unparse_expr(&w.context), unparse_expr(target)),
                None => unparse_expr(&w.context),
            },
            NodeRef::Handler(h) => match (&h.kind, &h.name) {
                (Some(kind), Some(name)) => format!("except {} as {name}:", unparse_expr(kind)),
                (Some(kind), None) => format!("except {}:", unparse_expr(kind)),
                _ => "except:".to_string(),
            },
            NodeRef::Comprehension(c) => {
                let mut text = format!("for {} in {}", unparse_expr(&c.target), unparse_expr(&c.iter));
                for cond in &c.ifs {
                    text.push_str(" if ");
                    text.push_str(&unparse_expr(cond));
                }
                text
            }
        }
    }

    /// Direct children in source order.
    pub fn children(&self) -> Vec<NodeRef<'a>> {
        let mut out = Vec::new();
        match *self {
            NodeRef::Stmt(stmt) => stmt_children(stmt, &mut out),
            NodeRef::Expr(expr) => expr_children(expr, &mut out),
            NodeRef::Keyword(k) => out.push(NodeRef::Expr(&k.value)),
            NodeRef::Param(p) => {
                push_opt(&mut out, p.annotation.as_ref());
                push_opt(&mut out, p.default.as_ref());
            }
            NodeRef::WithItem(w) => {
                out.push(NodeRef::Expr(&w.context));
                push_opt(&mut out, w.target.as_ref());
            }
            NodeRef::Handler(h) => {
                push_opt(&mut out, h.kind.as_ref());
                push_stmts(&mut out, &h.body);
            }
            NodeRef::Comprehension(c) => {
                out.push(NodeRef::Expr(&c.target));
                out.push(NodeRef::Expr(&c.iter));
                push_exprs(&mut out, &c.ifs);
            }
        }
        out
    }
}

fn push_opt<'a>(out: &mut Vec<NodeRef<'a>>, expr: Option<&'a Expr>) {
    if let Some(expr) = expr {
        out.push(NodeRef::Expr(expr));
    }
}

fn push_exprs<'a>(out: &mut Vec<NodeRef<'a>>, exprs: &'a [Expr]) {
    out.extend(exprs.iter().map(NodeRef::Expr));
}

fn push_stmts<'a>(out: &mut Vec<NodeRef<'a>>, stmts: &'a [Stmt]) {
    out.extend(stmts.iter().map(NodeRef::Stmt));
}

fn stmt_children<'a>(stmt: &'a Stmt, out: &mut Vec<NodeRef<'a>>) {
    match &stmt.kind {
        StmtKind::Expr { value } => out.push(NodeRef::Expr(value)),
        StmtKind::Assign { targets, value } => {
            push_exprs(out, targets);
            out.push(NodeRef::Expr(value));
        }
        StmtKind::AugAssign { target, value, .. } => {
            out.push(NodeRef::Expr(target));
            out.push(NodeRef::Expr(value));
        }
        StmtKind::AnnAssign {
            target,
            annotation,
            value,
        } => {
            out.push(NodeRef::Expr(target));
            out.push(NodeRef::Expr(annotation));
            push_opt(out, value.as_ref());
        }
        StmtKind::Import { .. }
        | StmtKind::ImportFrom { .. }
        | StmtKind::Pass
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Global { .. }
        | StmtKind::Nonlocal { .. } => {}
        StmtKind::FunctionDef(def) => {
            push_exprs(out, &def.decorators);
            out.extend(def.params.iter().map(NodeRef::Param));
            push_opt(out, def.returns.as_ref());
            push_stmts(out, &def.body);
        }
        StmtKind::ClassDef(class) => {
            push_exprs(out, &class.decorators);
            push_exprs(out, &class.bases);
            out.extend(class.keywords.iter().map(NodeRef::Keyword));
            push_stmts(out, &class.body);
        }
        StmtKind::Return { value } => push_opt(out, value.as_ref()),
        StmtKind::Delete { targets } => push_exprs(out, targets),
        StmtKind::Raise { exc, cause } => {
            push_opt(out, exc.as_ref());
            push_opt(out, cause.as_ref());
        }
        StmtKind::Assert { test, msg } => {
            out.push(NodeRef::Expr(test));
            push_opt(out, msg.as_ref());
        }
        StmtKind::If { test, body, orelse } | StmtKind::While { test, body, orelse } => {
            out.push(NodeRef::Expr(test));
            push_stmts(out, body);
            push_stmts(out, orelse);
        }
        StmtKind::For {
            target,
            iter,
            body,
            orelse,
            ..
        } => {
            out.push(NodeRef::Expr(target));
            out.push(NodeRef::Expr(iter));
            push_stmts(out, body);
            push_stmts(out, orelse);
        }
        StmtKind::With { items, body, .. } => {
            out.extend(items.iter().map(NodeRef::WithItem));
            push_stmts(out, body);
        }
        StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            push_stmts(out, body);
            out.extend(handlers.iter().map(NodeRef::Handler));
            push_stmts(out, orelse);
            push_stmts(out, finalbody);
        }
    }
}

fn expr_children<'a>(expr: &'a Expr, out: &mut Vec<NodeRef<'a>>) {
    match &expr.kind {
        ExprKind::Name(_) | ExprKind::Constant(_) | ExprKind::FString(_) => {}
        ExprKind::Attribute { value, .. }
        | ExprKind::Starred(value)
        | ExprKind::Await(value)
        | ExprKind::YieldFrom(value) => out.push(NodeRef::Expr(value)),
        ExprKind::Yield(value) => push_opt(out, value.as_deref()),
        ExprKind::Call {
            func,
            args,
            keywords,
        } => {
            out.push(NodeRef::Expr(func));
            push_exprs(out, args);
            out.extend(keywords.iter().map(NodeRef::Keyword));
        }
        ExprKind::Subscript { value, slice } => {
            out.push(NodeRef::Expr(value));
            out.push(NodeRef::Expr(slice));
        }
        ExprKind::Slice { lower, upper, step } => {
            push_opt(out, lower.as_deref());
            push_opt(out, upper.as_deref());
            push_opt(out, step.as_deref());
        }
        ExprKind::BinOp { left, right, .. } => {
            out.push(NodeRef::Expr(left));
            out.push(NodeRef::Expr(right));
        }
        ExprKind::UnaryOp { operand, .. } => out.push(NodeRef::Expr(operand)),
        ExprKind::BoolOp { values, .. } => push_exprs(out, values),
        ExprKind::Compare {
            left, comparators, ..
        } => {
            out.push(NodeRef::Expr(left));
            push_exprs(out, comparators);
        }
        ExprKind::IfExp { test, body, orelse } => {
            out.push(NodeRef::Expr(body));
            out.push(NodeRef::Expr(test));
            out.push(NodeRef::Expr(orelse));
        }
        ExprKind::Lambda { params, body } => {
            out.extend(params.iter().map(NodeRef::Param));
            out.push(NodeRef::Expr(body));
        }
        ExprKind::NamedExpr { target, value } => {
            out.push(NodeRef::Expr(target));
            out.push(NodeRef::Expr(value));
        }
        ExprKind::Tuple(elts) | ExprKind::List(elts) | ExprKind::Set(elts) => {
            push_exprs(out, elts)
        }
        ExprKind::Dict { keys, values } => {
            for (key, value) in keys.iter().zip(values) {
                push_opt(out, key.as_ref());
                out.push(NodeRef::Expr(value));
            }
        }
        ExprKind::ListComp { elt, generators }
        | ExprKind::SetComp { elt, generators }
        | ExprKind::GeneratorExp { elt, generators } => {
            out.push(NodeRef::Expr(elt));
            out.extend(generators.iter().map(NodeRef::Comprehension));
        }
        ExprKind::DictComp {
            key,
            value,
            generators,
        } => {
            out.push(NodeRef::Expr(key));
            out.push(NodeRef::Expr(value));
            out.extend(generators.iter().map(NodeRef::Comprehension));
        }
    }
}

/// Pre-order node table with parent links, built once per tree.
#[derive(Debug)]
pub struct ParentIndex<'a> {
    nodes: Vec<NodeRef<'a>>,
    parents: Vec<Option<NodeId>>,
}

impl<'a> ParentIndex<'a> {
    pub fn build(module: &'a Module) -> Self {
        let mut index = Self {
            nodes: Vec::new(),
            parents: Vec::new(),
        };
        for stmt in &module.body {
            index.visit(NodeRef::Stmt(stmt), None);
        }
        index
    }

    fn visit(&mut self, node: NodeRef<'a>, parent: Option<NodeId>) {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        self.parents.push(parent);
        for child in node.children() {
            self.visit(child, Some(id));
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> NodeRef<'a> {
        self.nodes[id.0]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(id.0).copied().flatten()
    }

    /// Proper ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_, 'a> {
        Ancestors {
            index: self,
            next: self.parent(id),
        }
    }

    /// All nodes in pre-order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, NodeRef<'a>)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeId(i), *node))
    }

    /// First node in pre-order matching `pred`.
    pub fn find(&self, pred: impl Fn(&NodeRef<'a>) -> bool) -> Option<NodeId> {
        self.iter().find(|(_, node)| pred(node)).map(|(id, _)| id)
    }

    /// First `Name` expression with identifier `id`.
    pub fn find_name(&self, id: &str) -> Option<NodeId> {
        self.find(|node| matches!(node.as_expr().and_then(Expr::as_name), Some(name) if name == id))
    }

    /// Nearest statement at or above `id`.
    pub fn enclosing_stmt(&self, id: NodeId) -> Option<NodeId> {
        if matches!(self.node(id), NodeRef::Stmt(_)) {
            return Some(id);
        }
        self.ancestors(id)
            .find(|a| matches!(self.node(*a), NodeRef::Stmt(_)))
    }
}

/// Iterator returned by [`ParentIndex::ancestors`].
pub struct Ancestors<'i, 'a> {
    index: &'i ParentIndex<'a>,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_, '_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.index.parent(current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_ancestors_walk_to_the_statement() {
        let module = parse("model.add(Dense(units=__mask_0__))\n").unwrap();
        let index = ParentIndex::build(&module);
        let mask = index.find_name("__mask_0__").unwrap();
        let chain: Vec<String> = index
            .ancestors(mask)
            .map(|id| index.node(id).unparse())
            .collect();
        assert_eq!(
            chain,
            vec![
                "units=__mask_0__".to_string(),
                "Dense(units=__mask_0__)".to_string(),
                "model.add(Dense(units=__mask_0__))".to_string(),
                "model.add(Dense(units=__mask_0__))".to_string(),
            ]
        );
        let stmt = index.enclosing_stmt(mask).unwrap();
        assert!(matches!(index.node(stmt), NodeRef::Stmt(_)));
        assert_eq!(index.parent(stmt), None);
    }

    #[test]
    fn test_preorder_visits_parents_first() {
        let module = parse("def f(a=1):\n    return a + 2\n").unwrap();
        let index = ParentIndex::build(&module);
        for (id, _) in index.iter() {
            if let Some(parent) = index.parent(id) {
                assert!(parent < id);
            }
        }
        assert!(index.len() > 4);
    }

    #[test]
    fn test_nested_blocks_are_indexed() {
        let module = parse("if x:\n    for i in y:\n        z = __mask_0__\n").unwrap();
        let index = ParentIndex::build(&module);
        let mask = index.find_name("__mask_0__").unwrap();
        let statements = index
            .ancestors(mask)
            .filter(|id| matches!(index.node(*id), NodeRef::Stmt(_)))
            .count();
        assert_eq!(statements, 3);
    }
}
