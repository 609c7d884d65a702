//! Structural model for Keras-style model programs.
//!
//! Layer 0 of the repair pipeline: parse source text into a tree, print it
//! back in one canonical form, canonicalize framework usage, look up parents
//! and decide structural equivalence. Pure, no I/O.

pub mod ast;
pub mod canonical;
pub mod equivalence;
pub mod error;
pub mod index;
pub mod lexer;
pub mod literal;
pub mod parser;
pub mod printer;
pub mod signatures;
pub mod span;
pub mod visit;

pub use ast::{
    Alias, Call, Constant, Expr, ExprKind, Keyword, Module, Param, ParamKind, Stmt, StmtKind,
};
pub use canonical::{canonical_form, canonical_path, canonicalize_usage, strip_root, ROOT};
pub use equivalence::structurally_equivalent;
pub use error::{ParseError, ParseErrorCode, Result};
pub use index::{NodeId, NodeRef, ParentIndex};
pub use parser::{parse, parse_expression};
pub use printer::{serialize, unparse_expr, unparse_stmt};
pub use span::Span;
