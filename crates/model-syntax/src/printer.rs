//! Canonical pretty-printer.
//!
//! Output is deterministic: four-space indentation, one statement per line,
//! no comments or blank lines, `repr`-style string quoting, and only the
//! parentheses precedence requires. Tuples are always parenthesized except
//! as subscript slices. Two trees are identical exactly when their
//! serializations are byte-equal.

use crate::ast::*;
use crate::literal::{docstring_literal, repr_str};

// Binding strength, loosest first.
const NAMED: u8 = 0;
const YIELD: u8 = 1;
const TEST: u8 = 2;
const OR: u8 = 3;
const AND: u8 = 4;
const NOT: u8 = 5;
const CMP: u8 = 6;
const BOR: u8 = 7;
const BXOR: u8 = 8;
const BAND: u8 = 9;
const SHIFT: u8 = 10;
const ARITH: u8 = 11;
const TERM: u8 = 12;
const FACTOR: u8 = 13;
const POWER: u8 = 14;
const AWAIT: u8 = 15;
const ATOM: u8 = 16;

/// Serialize a whole module.
pub fn serialize(module: &Module) -> String {
    let mut printer = Printer::default();
    printer.body(&module.body);
    printer.out
}

/// Serialize one statement (and its nested block, if any).
pub fn unparse_stmt(stmt: &Stmt) -> String {
    let mut printer = Printer::default();
    printer.stmt(stmt);
    printer.out.trim_end_matches('\n').to_string()
}

pub fn unparse_expr(expr: &Expr) -> String {
    let mut printer = Printer::default();
    printer.expr(expr, YIELD);
    printer.out
}

pub fn unparse_keyword(keyword: &Keyword) -> String {
    let mut printer = Printer::default();
    printer.keyword(keyword);
    printer.out
}

pub fn unparse_params(params: &[Param]) -> String {
    Printer::default().params(params)
}

#[derive(Default)]
struct Printer {
    out: String,
    indent: usize,
}

fn binop_precedence(op: BinOp) -> u8 {
    match op {
        BinOp::BitOr => BOR,
        BinOp::BitXor => BXOR,
        BinOp::BitAnd => BAND,
        BinOp::LShift | BinOp::RShift => SHIFT,
        BinOp::Add | BinOp::Sub => ARITH,
        BinOp::Mult | BinOp::MatMult | BinOp::Div | BinOp::FloorDiv | BinOp::Mod => TERM,
        BinOp::Pow => POWER,
    }
}

fn precedence(expr: &Expr) -> u8 {
    match &expr.kind {
        ExprKind::NamedExpr { .. } => NAMED,
        ExprKind::Yield(_) | ExprKind::YieldFrom(_) => YIELD,
        ExprKind::Lambda { .. } | ExprKind::IfExp { .. } => TEST,
        ExprKind::BoolOp { op: BoolOp::Or, .. } => OR,
        ExprKind::BoolOp { op: BoolOp::And, .. } => AND,
        ExprKind::UnaryOp { op: UnaryOp::Not, .. } => NOT,
        ExprKind::Compare { .. } => CMP,
        ExprKind::BinOp { op, .. } => binop_precedence(*op),
        ExprKind::UnaryOp { .. } => FACTOR,
        ExprKind::Await(_) => AWAIT,
        _ => ATOM,
    }
}

impl Printer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn render(&self, f: impl FnOnce(&mut Printer)) -> String {
        let mut sub = Printer::default();
        f(&mut sub);
        sub.out
    }

    fn block(&mut self, body: &[Stmt]) {
        self.indent += 1;
        if body.is_empty() {
            self.line("pass");
        }
        for stmt in body {
            self.stmt(stmt);
        }
        self.indent -= 1;
    }

    /// Statements of a module, class or function body. A leading string
    /// is printed as a triple-quoted docstring.
    fn body(&mut self, body: &[Stmt]) {
        let mut rest = body;
        if let Some((first, tail)) = body.split_first() {
            if let Some(doc) = docstring(first) {
                self.line(&docstring_literal(doc));
                rest = tail;
            }
        }
        for stmt in rest {
            self.stmt(stmt);
        }
    }

    fn documented_block(&mut self, body: &[Stmt]) {
        self.indent += 1;
        if body.is_empty() {
            self.line("pass");
        }
        self.body(body);
        self.indent -= 1;
    }

    fn expr_text(&self, expr: &Expr, min: u8) -> String {
        self.render(|p| p.expr(expr, min))
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expr { value } => {
                let text = self.expr_text(value, YIELD);
                self.line(&text);
            }
            StmtKind::Assign { targets, value } => {
                let mut text = String::new();
                for target in targets {
                    text.push_str(&self.expr_text(target, TEST));
                    text.push_str(" = ");
                }
                text.push_str(&self.expr_text(value, YIELD));
                self.line(&text);
            }
            StmtKind::AugAssign { target, op, value } => {
                let text = format!(
                    "{} {}= {}",
                    self.expr_text(target, TEST),
                    op.symbol(),
                    self.expr_text(value, YIELD)
                );
                self.line(&text);
            }
            StmtKind::AnnAssign {
                target,
                annotation,
                value,
            } => {
                let mut text = format!(
                    "{}: {}",
                    self.expr_text(target, TEST),
                    self.expr_text(annotation, TEST)
                );
                if let Some(value) = value {
                    text.push_str(" = ");
                    text.push_str(&self.expr_text(value, YIELD));
                }
                self.line(&text);
            }
            StmtKind::Import { names } => {
                let text = format!("import {}", aliases(names));
                self.line(&text);
            }
            StmtKind::ImportFrom {
                module,
                names,
                level,
            } => {
                let text = format!(
                    "from {}{} import {}",
                    ".".repeat(*level),
                    module.as_deref().unwrap_or(""),
                    aliases(names)
                );
                self.line(&text);
            }
            StmtKind::FunctionDef(def) => {
                for decorator in &def.decorators {
                    let text = format!("@{}", self.expr_text(decorator, TEST));
                    self.line(&text);
                }
                let mut head = String::new();
                if def.is_async {
                    head.push_str("async ");
                }
                head.push_str(&format!("def {}({})", def.name, self.params(&def.params)));
                if let Some(returns) = &def.returns {
                    head.push_str(" -> ");
                    head.push_str(&self.expr_text(returns, TEST));
                }
                head.push(':');
                self.line(&head);
                self.documented_block(&def.body);
            }
            StmtKind::ClassDef(class) => {
                for decorator in &class.decorators {
                    let text = format!("@{}", self.expr_text(decorator, TEST));
                    self.line(&text);
                }
                let mut head = format!("class {}", class.name);
                if !class.bases.is_empty() || !class.keywords.is_empty() {
                    head.push('(');
                    head.push_str(&self.render(|p| p.arguments(&class.bases, &class.keywords)));
                    head.push(')');
                }
                head.push(':');
                self.line(&head);
                self.documented_block(&class.body);
            }
            StmtKind::Return { value } => match value {
                Some(value) => {
                    let text = format!("return {}", self.expr_text(value, TEST));
                    self.line(&text);
                }
                None => self.line("return"),
            },
            StmtKind::Delete { targets } => {
                let parts: Vec<String> = targets.iter().map(|t| self.expr_text(t, TEST)).collect();
                let text = format!("del {}", parts.join(", "));
                self.line(&text);
            }
            StmtKind::Pass => self.line("pass"),
            StmtKind::Break => self.line("break"),
            StmtKind::Continue => self.line("continue"),
            StmtKind::Global { names } => {
                let text = format!("global {}", names.join(", "));
                self.line(&text);
            }
            StmtKind::Nonlocal { names } => {
                let text = format!("nonlocal {}", names.join(", "));
                self.line(&text);
            }
            StmtKind::Raise { exc, cause } => {
                let mut text = "raise".to_string();
                if let Some(exc) = exc {
                    text.push(' ');
                    text.push_str(&self.expr_text(exc, TEST));
                }
                if let Some(cause) = cause {
                    text.push_str(" from ");
                    text.push_str(&self.expr_text(cause, TEST));
                }
                self.line(&text);
            }
            StmtKind::Assert { test, msg } => {
                let mut text = format!("assert {}", self.expr_text(test, TEST));
                if let Some(msg) = msg {
                    text.push_str(", ");
                    text.push_str(&self.expr_text(msg, TEST));
                }
                self.line(&text);
            }
            StmtKind::If { test, body, orelse } => {
                let text = format!("if {}:", self.expr_text(test, NAMED + 1));
                self.line(&text);
                self.block(body);
                self.orelse_chain(orelse);
            }
            StmtKind::While { test, body, orelse } => {
                let text = format!("while {}:", self.expr_text(test, NAMED + 1));
                self.line(&text);
                self.block(body);
                self.else_block(orelse);
            }
            StmtKind::For {
                is_async,
                target,
                iter,
                body,
                orelse,
            } => {
                let text = format!(
                    "{}for {} in {}:",
                    if *is_async { "async " } else { "" },
                    self.expr_text(target, TEST),
                    self.expr_text(iter, TEST)
                );
                self.line(&text);
                self.block(body);
                self.else_block(orelse);
            }
            StmtKind::With {
                is_async,
                items,
                body,
            } => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|item| {
                        let mut part = self.expr_text(&item.context, TEST);
                        if let Some(target) = &item.target {
                            part.push_str(" as ");
                            part.push_str(&self.expr_text(target, TEST));
                        }
                        part
                    })
                    .collect();
                let text = format!(
                    "{}with {}:",
                    if *is_async { "async " } else { "" },
                    parts.join(", ")
                );
                self.line(&text);
                self.block(body);
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.line("try:");
                self.block(body);
                for handler in handlers {
                    let mut text = "except".to_string();
                    if let Some(kind) = &handler.kind {
                        text.push(' ');
                        text.push_str(&self.expr_text(kind, TEST));
                        if let Some(name) = &handler.name {
                            text.push_str(" as ");
                            text.push_str(name);
                        }
                    }
                    text.push(':');
                    self.line(&text);
                    self.block(&handler.body);
                }
                self.else_block(orelse);
                if !finalbody.is_empty() {
                    self.line("finally:");
                    self.block(finalbody);
                }
            }
        }
    }

    fn orelse_chain(&mut self, orelse: &[Stmt]) {
        if let [single] = orelse {
            if let StmtKind::If { test, body, orelse } = &single.kind {
                let text = format!("elif {}:", self.expr_text(test, NAMED + 1));
                self.line(&text);
                self.block(body);
                self.orelse_chain(orelse);
                return;
            }
        }
        self.else_block(orelse);
    }

    fn else_block(&mut self, orelse: &[Stmt]) {
        if !orelse.is_empty() {
            self.line("else:");
            self.block(orelse);
        }
    }

    fn params(&self, params: &[Param]) -> String {
        let parts: Vec<String> = params
            .iter()
            .map(|param| {
                let mut text = match param.kind {
                    ParamKind::Normal => param.name.clone(),
                    ParamKind::PositionalOnlyMarker => return "/".to_string(),
                    ParamKind::KeywordOnlyMarker => return "*".to_string(),
                    ParamKind::VarArgs => format!("*{}", param.name),
                    ParamKind::VarKeywords => format!("**{}", param.name),
                };
                if let Some(annotation) = &param.annotation {
                    text.push_str(": ");
                    text.push_str(&self.expr_text(annotation, TEST));
                }
                if let Some(default) = &param.default {
                    text.push_str(if param.annotation.is_some() { " = " } else { "=" });
                    text.push_str(&self.expr_text(default, TEST));
                }
                text
            })
            .collect();
        parts.join(", ")
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn expr(&mut self, expr: &Expr, min: u8) {
        let wrap = precedence(expr) < min;
        if wrap {
            self.out.push('(');
        }
        self.expr_inner(expr);
        if wrap {
            self.out.push(')');
        }
    }

    fn comma_list(&mut self, items: &[Expr]) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.expr(item, TEST);
        }
    }

    fn keyword(&mut self, keyword: &Keyword) {
        match &keyword.arg {
            Some(arg) => {
                self.out.push_str(arg);
                self.out.push('=');
                self.expr(&keyword.value, TEST);
            }
            None => {
                self.out.push_str("**");
                self.expr(&keyword.value, BOR);
            }
        }
    }

    fn arguments(&mut self, args: &[Expr], keywords: &[Keyword]) {
        self.comma_list(args);
        for (i, keyword) in keywords.iter().enumerate() {
            if i > 0 || !args.is_empty() {
                self.out.push_str(", ");
            }
            self.keyword(keyword);
        }
    }

    fn comprehensions(&mut self, generators: &[Comprehension]) {
        for generator in generators {
            self.out
                .push_str(if generator.is_async { " async for " } else { " for " });
            self.expr(&generator.target, TEST);
            self.out.push_str(" in ");
            self.expr(&generator.iter, OR);
            for cond in &generator.ifs {
                self.out.push_str(" if ");
                self.expr(cond, OR);
            }
        }
    }

    fn slice_element(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Slice { lower, upper, step } => {
                if let Some(lower) = lower {
                    self.expr(lower, TEST);
                }
                self.out.push(':');
                if let Some(upper) = upper {
                    self.expr(upper, TEST);
                }
                if let Some(step) = step {
                    self.out.push(':');
                    self.expr(step, TEST);
                }
            }
            _ => self.expr(expr, TEST),
        }
    }

    fn expr_inner(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Name(id) => self.out.push_str(id),
            ExprKind::Constant(constant) => self.constant(constant),
            ExprKind::FString(raw) => self.out.push_str(raw),
            ExprKind::Attribute { value, attr } => {
                let int_base = matches!(value.kind, ExprKind::Constant(Constant::Int(_)));
                if int_base {
                    self.out.push('(');
                    self.expr_inner(value);
                    self.out.push(')');
                } else {
                    self.expr(value, ATOM);
                }
                self.out.push('.');
                self.out.push_str(attr);
            }
            ExprKind::Call {
                func,
                args,
                keywords,
            } => {
                self.expr(func, ATOM);
                self.out.push('(');
                self.arguments(args, keywords);
                self.out.push(')');
            }
            ExprKind::Subscript { value, slice } => {
                self.expr(value, ATOM);
                self.out.push('[');
                match &slice.kind {
                    ExprKind::Tuple(elts) if !elts.is_empty() => {
                        for (i, elt) in elts.iter().enumerate() {
                            if i > 0 {
                                self.out.push_str(", ");
                            }
                            self.slice_element(elt);
                        }
                        if elts.len() == 1 {
                            self.out.push(',');
                        }
                    }
                    _ => self.slice_element(slice),
                }
                self.out.push(']');
            }
            ExprKind::Slice { .. } => self.slice_element(expr),
            ExprKind::Starred(value) => {
                self.out.push('*');
                self.expr(value, BOR);
            }
            ExprKind::BinOp { left, op, right } => {
                let prec = binop_precedence(*op);
                let (left_min, right_min) = if *op == BinOp::Pow {
                    (AWAIT, FACTOR)
                } else {
                    (prec, prec + 1)
                };
                self.expr(left, left_min);
                self.out.push(' ');
                self.out.push_str(op.symbol());
                self.out.push(' ');
                self.expr(right, right_min);
            }
            ExprKind::UnaryOp { op, operand } => match op {
                UnaryOp::Not => {
                    self.out.push_str("not ");
                    self.expr(operand, NOT);
                }
                UnaryOp::Invert | UnaryOp::UAdd | UnaryOp::USub => {
                    self.out.push(match op {
                        UnaryOp::Invert => '~',
                        UnaryOp::UAdd => '+',
                        _ => '-',
                    });
                    self.expr(operand, FACTOR);
                }
            },
            ExprKind::BoolOp { op, values } => {
                let (word, prec) = match op {
                    BoolOp::And => (" and ", AND),
                    BoolOp::Or => (" or ", OR),
                };
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(word);
                    }
                    self.expr(value, prec + 1);
                }
            }
            ExprKind::Compare {
                left,
                ops,
                comparators,
            } => {
                self.expr(left, CMP + 1);
                for (op, comparator) in ops.iter().zip(comparators) {
                    self.out.push(' ');
                    self.out.push_str(op.symbol());
                    self.out.push(' ');
                    self.expr(comparator, CMP + 1);
                }
            }
            ExprKind::IfExp { test, body, orelse } => {
                self.expr(body, OR);
                self.out.push_str(" if ");
                self.expr(test, OR);
                self.out.push_str(" else ");
                self.expr(orelse, TEST);
            }
            ExprKind::Lambda { params, body } => {
                self.out.push_str("lambda");
                if !params.is_empty() {
                    self.out.push(' ');
                    let text = self.params(params);
                    self.out.push_str(&text);
                }
                self.out.push_str(": ");
                self.expr(body, TEST);
            }
            ExprKind::NamedExpr { target, value } => {
                self.expr(target, ATOM);
                self.out.push_str(" := ");
                self.expr(value, TEST);
            }
            ExprKind::Tuple(elts) => {
                self.out.push('(');
                self.comma_list(elts);
                if elts.len() == 1 {
                    self.out.push(',');
                }
                self.out.push(')');
            }
            ExprKind::List(elts) => {
                self.out.push('[');
                self.comma_list(elts);
                self.out.push(']');
            }
            ExprKind::Set(elts) => {
                self.out.push('{');
                self.comma_list(elts);
                self.out.push('}');
            }
            ExprKind::Dict { keys, values } => {
                self.out.push('{');
                for (i, (key, value)) in keys.iter().zip(values).enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    match key {
                        Some(key) => {
                            self.expr(key, TEST);
                            self.out.push_str(": ");
                            self.expr(value, TEST);
                        }
                        None => {
                            self.out.push_str("**");
                            self.expr(value, BOR);
                        }
                    }
                }
                self.out.push('}');
            }
            ExprKind::ListComp { elt, generators } => {
                self.out.push('[');
                self.expr(elt, TEST);
                self.comprehensions(generators);
                self.out.push(']');
            }
            ExprKind::SetComp { elt, generators } => {
                self.out.push('{');
                self.expr(elt, TEST);
                self.comprehensions(generators);
                self.out.push('}');
            }
            ExprKind::GeneratorExp { elt, generators } => {
                self.out.push('(');
                self.expr(elt, TEST);
                self.comprehensions(generators);
                self.out.push(')');
            }
            ExprKind::DictComp {
                key,
                value,
                generators,
            } => {
                self.out.push('{');
                self.expr(key, TEST);
                self.out.push_str(": ");
                self.expr(value, TEST);
                self.comprehensions(generators);
                self.out.push('}');
            }
            ExprKind::Await(value) => {
                self.out.push_str("await ");
                self.expr(value, ATOM);
            }
            ExprKind::Yield(value) => {
                self.out.push_str("yield");
                if let Some(value) = value {
                    self.out.push(' ');
                    self.expr(value, TEST);
                }
            }
            ExprKind::YieldFrom(value) => {
                self.out.push_str("yield from ");
                self.expr(value, TEST);
            }
        }
    }

    fn constant(&mut self, constant: &Constant) {
        match constant {
            Constant::None => self.out.push_str("None"),
            Constant::Bool(true) => self.out.push_str("True"),
            Constant::Bool(false) => self.out.push_str("False"),
            Constant::Ellipsis => self.out.push_str("..."),
            Constant::Int(text)
            | Constant::Float(text)
            | Constant::Imaginary(text)
            | Constant::Bytes(text) => self.out.push_str(text),
            Constant::Str(value) => self.out.push_str(&repr_str(value)),
        }
    }
}

fn docstring(stmt: &Stmt) -> Option<&str> {
    let StmtKind::Expr { value } = &stmt.kind else {
        return None;
    };
    match &value.kind {
        ExprKind::Constant(Constant::Str(text)) if !text.is_empty() => Some(text),
        _ => None,
    }
}

fn aliases(names: &[Alias]) -> String {
    names
        .iter()
        .map(|alias| match &alias.asname {
            Some(asname) => format!("{} as {}", alias.name, asname),
            None => alias.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn roundtrip(src: &str) -> String {
        serialize(&parse(src).unwrap())
    }

    #[test]
    fn test_whitespace_and_quotes_are_normalized() {
        let a = roundtrip("model.add( Dense(64,activation = \"relu\") )\n");
        let b = roundtrip("model.add(Dense(64, activation='relu'))");
        assert_eq!(a, b);
        assert_eq!(a, "model.add(Dense(64, activation='relu'))\n");
    }

    #[test]
    fn test_comments_are_dropped() {
        let out = roundtrip("# build\nx = 1  # one\n\n\ny = 2\n");
        assert_eq!(out, "x = 1\ny = 2\n");
    }

    #[test]
    fn test_minimal_parentheses() {
        assert_eq!(roundtrip("x = (a + b) * c\n"), "x = (a + b) * c\n");
        assert_eq!(roundtrip("x = a + (b * c)\n"), "x = a + b * c\n");
        assert_eq!(roundtrip("x = a - (b - c)\n"), "x = a - (b - c)\n");
        assert_eq!(roundtrip("x = (-2) ** 2\n"), "x = (-2) ** 2\n");
        assert_eq!(roundtrip("x = 2 ** -1\n"), "x = 2 ** -1\n");
        assert_eq!(roundtrip("x = not (a and b)\n"), "x = not (a and b)\n");
    }

    #[test]
    fn test_tuples_are_parenthesized() {
        assert_eq!(roundtrip("a, b = 1, 2\n"), "(a, b) = (1, 2)\n");
        assert_eq!(roundtrip("s = (784,)\n"), "s = (784,)\n");
        assert_eq!(roundtrip("x[1, 2]\n"), "x[1, 2]\n");
        assert_eq!(roundtrip("x[1:2, ::3]\n"), "x[1:2, ::3]\n");
    }

    #[test]
    fn test_blocks_and_elif() {
        let src = "\
if a:
  x = 1
elif b:
  x = 2
else:
  x = 3
";
        assert_eq!(
            roundtrip(src),
            "if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n"
        );
    }

    #[test]
    fn test_serialization_is_a_fixed_point() {
        let src = "\
import keras
def build(units=10, *args, k: int = 1, **kw):
    model = keras.models.Sequential()
    model.add(keras.layers.Dense(units, input_shape=[784]))
    data = {k: v for (k, v) in pairs if v}
    f = lambda: (yield)
    return model
";
        let once = roundtrip(src);
        let twice = roundtrip(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_docstrings_are_triple_quoted() {
        let src = r#"'module doc'
def f():
    '''doc'''
    return 1
class C:
    'line one\nline two'
x = 'not a docstring'
"#;
        let expected = r#""""module doc"""
def f():
    """doc"""
    return 1
class C:
    """line one
line two"""
x = 'not a docstring'
"#;
        assert_eq!(roundtrip(src), expected);
        assert_eq!(roundtrip(expected), expected);
    }

    #[test]
    fn test_empty_block_renders_pass() {
        let module = Module {
            body: vec![Stmt::synthetic(StmtKind::If {
                test: Expr::name("x"),
                body: Vec::new(),
                orelse: Vec::new(),
            })],
        };
        assert_eq!(serialize(&module), "if x:\n    pass\n");
    }
}
