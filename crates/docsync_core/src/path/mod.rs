//! Path expressions: a JSONPath-like language for selecting document values.
//!
//! Expressions are parsed into an [`Expr`] tree, printed back with
//! [`std::fmt::Display`] and evaluated level by level with a [`Matcher`].

mod ast;
mod descender;
mod extract;
mod matcher;
mod parser;
mod printer;
mod tokenizer;

pub use ast::{Alias, Constraint, Expr, Literal, Operator, Range};
pub use descender::Descender;
pub use extract::{extract, extract_with_path, keyed_path, PathMatch};
pub(crate) use extract::child_at;
pub use matcher::{resolve, Lead, MatchResult, Matcher, Target};
pub use parser::parse;
pub use printer::{segment_to_expr, to_path_string};
pub use tokenizer::is_identifier;
