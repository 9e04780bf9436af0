//! Error type shared across the crate.
//!
//! Name lookups, type resolution, and location-expression evaluation all fail
//! in ways the caller may want to distinguish (retry with a different name,
//! fall back to a different table, report to the user), so everything is one
//! enum rather than per-module error types.

use thiserror::Error;

use crate::locexpr::LocOp;
use crate::scope::ScopePath;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// No symbol of the requested name exists in the table consulted.
    #[error("no symbol found named \"{0}\"")]
    UnknownSymbol(String),

    /// More than one symbol matched and the caller required a unique result.
    /// The candidates are the fully scoped paths of every match.
    #[error("\"{name}\" is ambiguous: {}", render_candidates(.candidates))]
    AmbiguousSymbol {
        name: String,
        candidates: Vec<ScopePath>,
    },

    /// The symbol exists but is not an externally visible (global) one.
    #[error("\"{0}\" is not a global symbol")]
    NotAGlobal(String),

    /// Only declarations of the type were found, never a definition.
    #[error("no definition found for type \"{name}\" ({declarations} declaration(s) seen)")]
    UndefinedType { name: String, declarations: usize },

    /// A type declarator mixed pointer and array suffixes, or was otherwise
    /// not parseable.
    #[error("cannot parse type declarator \"{0}\"")]
    BadDeclarator(String),

    /// A location expression used an operator the evaluator does not
    /// implement. Carries the full original expression for diagnosis.
    #[error("unsupported operator {op} in location expression \"{}\"", render_ops(.expr))]
    UnsupportedLocationOperator {
        op: gimli::DwOp,
        expr: Vec<LocOp>,
    },

    /// A location expression underflowed its stack or otherwise could not be
    /// executed to completion.
    #[error("malformed location expression \"{}\"", render_ops(.expr))]
    MalformedLocationExpression { expr: Vec<LocOp> },

    /// No unwind information covers the given program counter.
    #[error("no stack frame information for pc {pc:#x}")]
    NoStackFrameInfo { pc: u64 },

    /// The entity has no address ranges recorded in the debug info.
    #[error("no address ranges recorded for \"{0}\"")]
    NoAddressRanges(String),

    /// Two symbol trees disagreed about whether a name is a scope or a
    /// symbol, or a merge precondition did not hold.
    #[error("cannot merge symbol trees: {0}")]
    StructuralMerge(String),
}

fn render_candidates(candidates: &[ScopePath]) -> String {
    candidates
        .iter()
        .map(|c| c.join("::"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_ops(ops: &[LocOp]) -> String {
    ops.iter()
        .map(|op| op.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
