pub mod error;
pub mod locexpr;
pub mod merge;
pub mod reader;
mod resolve;
pub mod scope;
pub mod session;
pub mod symbol;

pub use error::Error;
pub use merge::{merge, Merged, Provenance};
pub use reader::{
    AttrRecord, AttrValue, DebugReader, FrameRules, MemberRef, RegisterSet, SymbolRef,
    UnwindRule,
};
pub use scope::{
    Entry, ScopeMap, ScopeNode, ScopePath, Supplement, SymbolTable, TableOptions,
    GLOBALS_SCOPE,
};
pub use session::{CompilationUnit, NameFilter, NameFilters, Session};
pub use symbol::{
    EnumSymbol, FunctionSymbol, OffsetFunction, StackFrame, TypeSymbol, VariableSymbol,
};
