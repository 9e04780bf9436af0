//! The boundary between the session layer and a raw debug-info reader.
//!
//! A reader owns one parsed debug-info image (a base ROM or a patch) and
//! exposes its content as opaque symbol references plus category maps. The
//! session never walks DIEs itself; everything it needs comes through this
//! trait.

use std::collections::BTreeMap;

use gimli::constants as gim_con;
use gimli::{DwAt, DwTag};
use indexmap::IndexMap;

use crate::error::Error;
use crate::locexpr::LocOp;
use crate::scope::ScopeMap;

/// Opaque handle for one entity inside a reader. Only meaningful to the
/// reader that issued it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolRef(pub u64);

/// A single decoded attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    U64(u64),
    Flag(bool),
    Str(String),
    Ref(SymbolRef),
    Encoding(gim_con::DwAte),
}

impl AttrValue {
    pub fn u64_value(&self) -> Option<u64> {
        match self {
            AttrValue::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn sym_ref(&self) -> Option<SymbolRef> {
        match self {
            AttrValue::Ref(r) => Some(*r),
            _ => None,
        }
    }

    pub fn string(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn encoding(&self) -> Option<gim_con::DwAte> {
        match self {
            AttrValue::Encoding(e) => Some(*e),
            _ => None,
        }
    }
}

/// A struct or union member: name, byte offset within the aggregate, and
/// the reference of the member's own record.
#[derive(Clone, Debug, PartialEq)]
pub struct MemberRef {
    pub name: String,
    pub offset: u64,
    pub rref: SymbolRef,
}

/// Everything known about one variable or type, pre-digested by the
/// reader. For variables, the type-shaped fields describe the variable's
/// type.
#[derive(Clone, Debug, PartialEq)]
pub struct AttrRecord {
    /// DWARF tag of the described type.
    pub tag: DwTag,
    /// Entity name: the variable name for variables, the type name for
    /// types.
    pub name: String,
    /// For variables, the name of the variable's type.
    pub type_name: Option<String>,
    pub byte_size: Option<u64>,
    pub signed: Option<bool>,
    /// For typedefs of base types, the underlying base type's name.
    pub base_type_name: Option<String>,
    /// Array element count, when the tag is an array type.
    pub num_elements: Option<u64>,
    pub bit_offset: Option<u64>,
    pub bit_size: Option<u64>,
    /// Array element type, nested inline.
    pub element_type: Option<Box<AttrRecord>>,
    /// Pointee type, nested inline.
    pub pointed_to: Option<Box<AttrRecord>>,
    pub members: Vec<MemberRef>,
    /// Enumerator name/value pairs in declaration order.
    pub enumerators: IndexMap<String, i64>,
}

impl Default for AttrRecord {
    fn default() -> Self {
        Self {
            tag: DwTag(0),
            name: String::new(),
            type_name: None,
            byte_size: None,
            signed: None,
            base_type_name: None,
            num_elements: None,
            bit_offset: None,
            bit_size: None,
            element_type: None,
            pointed_to: None,
            members: Vec::new(),
            enumerators: IndexMap::new(),
        }
    }
}

/// Register number -> value snapshot handed in by the execution
/// environment when unwinding.
pub type RegisterSet = BTreeMap<u16, u64>;

/// How to recover one register of the calling frame.
#[derive(Clone, Debug, PartialEq)]
pub enum UnwindRule {
    Undefined,
    SameValue,
    /// Value stored at CFA + offset.
    CfaOffset(i64),
    /// Value lives in another register.
    Register(u16),
}

/// Frame recovery rules at one program counter: how to compute the CFA
/// (base register plus offset) and per-register rules.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameRules {
    pub cfa_register: u16,
    pub cfa_offset: i64,
    pub registers: BTreeMap<u16, UnwindRule>,
}

/// Access to one parsed debug-info image.
///
/// Category maps are two-level-or-deeper trees whose top level is the
/// compilation unit name (or [`crate::scope::GLOBALS_SCOPE`]); leaves are
/// symbol references. Compilation units come back flat, keyed by source
/// path, because path separators vary by build host.
pub trait DebugReader {
    fn variables(&self) -> ScopeMap<SymbolRef>;
    fn functions(&self, include_abstract: bool) -> ScopeMap<SymbolRef>;
    fn types(&self) -> ScopeMap<SymbolRef>;
    fn enums(&self) -> ScopeMap<SymbolRef>;
    fn compilation_units(&self) -> BTreeMap<String, Vec<SymbolRef>>;
    /// All enumerator constants in the image, name -> value.
    fn enumerators(&self) -> IndexMap<String, i64>;

    /// Full record for a variable reference.
    fn variable_record(&self, r: SymbolRef) -> Result<AttrRecord, Error>;
    /// Full record for a type reference.
    fn type_record(&self, r: SymbolRef) -> Result<AttrRecord, Error>;
    /// Types defined within one compilation unit (possibly fragmented
    /// across several unit references).
    fn cu_types(&self, refs: &[SymbolRef]) -> ScopeMap<SymbolRef>;
    fn cu_enums(&self, refs: &[SymbolRef]) -> ScopeMap<SymbolRef>;

    /// Formal parameters of a function, in declaration order.
    fn formal_parameters(&self, r: SymbolRef) -> Vec<(String, SymbolRef)>;
    /// Local variables declared anywhere inside a function.
    fn local_variables(&self, r: SymbolRef) -> Vec<(String, SymbolRef)>;
    /// Inlined calls expanded inside a function body.
    fn inline_calls(&self, r: SymbolRef) -> Vec<SymbolRef>;
    /// The function's return type reference, absent for void.
    fn return_type(&self, r: SymbolRef) -> Option<SymbolRef>;

    /// (low, high) address ranges of a function or compilation unit.
    /// `None` when the entity carries no range attributes at all.
    fn ranges(&self, r: SymbolRef) -> Option<Vec<(u64, u64)>>;
    /// Raw attribute access for the odd attribute the digested records do
    /// not carry.
    fn attr(&self, r: SymbolRef, at: DwAt) -> Option<AttrValue>;
    /// Decoded location expression for a variable, selected for `pc`.
    /// `has_started` distinguishes a frozen frame mid-call from one whose
    /// prologue has not run.
    fn location(&self, r: SymbolRef, pc: u64, has_started: bool) -> Option<Vec<LocOp>>;
    /// Unwind rules for a pc expressed as an offset into the function.
    fn unwind_info(
        &self,
        r: SymbolRef,
        pc_offset: u64,
        regs: &RegisterSet,
    ) -> Option<FrameRules>;
    /// Unwind rules for an absolute pc, function unknown.
    fn unwind_at_pc(&self, pc: u64, regs: &RegisterSet) -> Option<FrameRules>;
    /// Source file and line for a pc inside a function.
    fn source_line(&self, r: SymbolRef, pc: u64) -> Option<(String, u32)>;
    /// Whether the symbol has external (global) linkage.
    fn is_external(&self, r: SymbolRef) -> bool;

    fn pointer_size(&self) -> u64;
    fn int_size(&self) -> u64 {
        4
    }

    fn set_verbosity(&self, _level: u8) {}
}
