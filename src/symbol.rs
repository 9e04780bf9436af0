//! Lazy façades over reader symbol references.
//!
//! A façade pairs a `SymbolRef` with the reader that issued it and fetches
//! the underlying record once, on first use. Records are enriched as they
//! come in: pointer and pointer-array byte sizes that DWARF producers
//! routinely omit are filled from the reader's pointer size, bitfield
//! attributes override the digested layout, and base-type signedness is
//! derived from the DWARF encoding.

use std::cell::OnceCell;

use gimli::constants as gim_con;
use gimli::DwTag;
use indexmap::IndexMap;

use crate::error::Error;
use crate::locexpr::{self, LocOp};
use crate::reader::{
    AttrRecord, DebugReader, FrameRules, RegisterSet, SymbolRef,
};

/// Typedef chains in real firmware are short; anything deeper is a cycle.
const MAX_ALIAS_DEPTH: usize = 16;

fn enhance_sizes<R: DebugReader>(rec: &mut AttrRecord, reader: &R) {
    if rec.byte_size.is_none() {
        match rec.tag {
            gim_con::DW_TAG_pointer_type => {
                rec.byte_size = Some(reader.pointer_size());
            }
            gim_con::DW_TAG_array_type => {
                let elem_is_pointer = rec
                    .element_type
                    .as_ref()
                    .map_or(false, |e| e.tag == gim_con::DW_TAG_pointer_type);
                if elem_is_pointer {
                    rec.byte_size = Some(
                        reader.pointer_size() * rec.num_elements.unwrap_or(1),
                    );
                }
            }
            _ => {}
        }
    }
    if let Some(elem) = rec.element_type.as_mut() {
        enhance_sizes(elem, reader);
    }
    if let Some(pointee) = rec.pointed_to.as_mut() {
        enhance_sizes(pointee, reader);
    }
}

fn enhance_record<R: DebugReader>(rec: &mut AttrRecord, rref: SymbolRef, reader: &R) {
    enhance_sizes(rec, reader);

    // Bitfield attributes, when present, supersede the digested layout.
    if let Some(v) = reader
        .attr(rref, gim_con::DW_AT_bit_offset)
        .and_then(|v| v.u64_value())
    {
        rec.bit_offset = Some(v);
    }
    if let Some(v) = reader
        .attr(rref, gim_con::DW_AT_bit_size)
        .and_then(|v| v.u64_value())
    {
        rec.bit_size = Some(v);
        if let Some(size) = reader
            .attr(rref, gim_con::DW_AT_byte_size)
            .and_then(|v| v.u64_value())
        {
            rec.byte_size = Some(size);
        }
    }

    if rec.tag == gim_con::DW_TAG_base_type && rec.signed.is_none() {
        let aliased = rec
            .base_type_name
            .as_ref()
            .map_or(false, |base| *base != rec.name);
        if !aliased {
            if let Some(e) = reader
                .attr(rref, gim_con::DW_AT_encoding)
                .and_then(|v| v.encoding())
            {
                rec.signed =
                    Some(e == gim_con::DW_ATE_signed || e == gim_con::DW_ATE_signed_char);
            }
        }
    }
}

/// Signedness for records that alias another type: chase the type
/// reference chain until an encoding shows up.
fn chase_signedness<R: DebugReader>(start: SymbolRef, reader: &R) -> bool {
    let mut r = start;
    for _ in 0..MAX_ALIAS_DEPTH {
        match reader.attr(r, gim_con::DW_AT_type).and_then(|v| v.sym_ref()) {
            Some(next) => {
                if let Some(e) = reader
                    .attr(next, gim_con::DW_AT_encoding)
                    .and_then(|v| v.encoding())
                {
                    return e == gim_con::DW_ATE_signed
                        || e == gim_con::DW_ATE_signed_char;
                }
                r = next;
            }
            None => break,
        }
    }
    false
}

/// A type, resolved lazily from its reference.
pub struct TypeSymbol<'r, R: DebugReader> {
    rref: SymbolRef,
    reader: &'r R,
    record: OnceCell<AttrRecord>,
}

impl<R: DebugReader> Clone for TypeSymbol<'_, R> {
    fn clone(&self) -> Self {
        Self {
            rref: self.rref,
            reader: self.reader,
            record: self.record.clone(),
        }
    }
}

impl<'r, R: DebugReader> TypeSymbol<'r, R> {
    pub fn new(rref: SymbolRef, reader: &'r R) -> Self {
        Self {
            rref,
            reader,
            record: OnceCell::new(),
        }
    }

    /// A façade whose record is synthesized rather than read, used for
    /// derived pointer and array types. `rref` remains that of the
    /// underlying named type.
    pub(crate) fn synthesized(rref: SymbolRef, reader: &'r R, record: AttrRecord) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(record);
        Self {
            rref,
            reader,
            record: cell,
        }
    }

    pub fn reference(&self) -> SymbolRef {
        self.rref
    }

    pub fn record(&self) -> Result<&AttrRecord, Error> {
        if let Some(rec) = self.record.get() {
            return Ok(rec);
        }
        let mut rec = self.reader.type_record(self.rref)?;
        enhance_record(&mut rec, self.rref, self.reader);
        Ok(self.record.get_or_init(|| rec))
    }

    pub fn type_name(&self) -> Result<String, Error> {
        Ok(self.record()?.name.clone())
    }

    pub fn tag(&self) -> Result<DwTag, Error> {
        Ok(self.record()?.tag)
    }

    /// Byte size, falling back to the target's `int` size when the debug
    /// info records none at all.
    pub fn byte_size(&self) -> Result<u64, Error> {
        let rec = self.record()?;
        Ok(rec.byte_size.unwrap_or_else(|| self.reader.int_size()))
    }

    pub fn is_signed(&self) -> Result<bool, Error> {
        let rec = self.record()?;
        if let Some(s) = rec.signed {
            return Ok(s);
        }
        if rec.tag == gim_con::DW_TAG_base_type || rec.tag == gim_con::DW_TAG_typedef {
            return Ok(chase_signedness(self.rref, self.reader));
        }
        Ok(false)
    }

    /// A struct or union entry with no size is a forward declaration;
    /// another compilation unit holds the definition.
    pub fn is_declaration(&self) -> Result<bool, Error> {
        let rec = self.record()?;
        Ok((rec.tag == gim_con::DW_TAG_structure_type
            || rec.tag == gim_con::DW_TAG_union_type)
            && rec.byte_size.is_none())
    }

    pub fn base_type_name(&self) -> Result<Option<String>, Error> {
        Ok(self.record()?.base_type_name.clone())
    }

    /// Members of a struct or union: (name, byte offset, member type).
    pub fn members(&self) -> Result<Vec<(String, u64, TypeSymbol<'r, R>)>, Error> {
        Ok(self
            .record()?
            .members
            .iter()
            .map(|m| {
                (
                    m.name.clone(),
                    m.offset,
                    TypeSymbol::new(m.rref, self.reader),
                )
            })
            .collect())
    }

    pub fn enumerators(&self) -> Result<&IndexMap<String, i64>, Error> {
        Ok(&self.record()?.enumerators)
    }

    /// The type "pointer to self".
    pub fn pointer_to(&self) -> Result<TypeSymbol<'r, R>, Error> {
        let base = self.record()?;
        let name = if base.name.ends_with('*') {
            format!("{}*", base.name)
        } else {
            format!("{} *", base.name)
        };
        let rec = AttrRecord {
            tag: gim_con::DW_TAG_pointer_type,
            name,
            byte_size: Some(self.reader.pointer_size()),
            pointed_to: Some(Box::new(base.clone())),
            ..AttrRecord::default()
        };
        Ok(TypeSymbol::synthesized(self.rref, self.reader, rec))
    }

    /// The type "array of `n` of self". Applying this repeatedly builds
    /// multi-dimensional arrays outermost-last, matching C declarator
    /// order.
    pub fn array_of(&self, n: u64) -> Result<TypeSymbol<'r, R>, Error> {
        let base = self.record()?;
        let name = match base.name.find('[') {
            Some(i) => format!("{}[{}]{}", &base.name[..i], n, &base.name[i..]),
            None => format!("{}[{}]", base.name, n),
        };
        let rec = AttrRecord {
            tag: gim_con::DW_TAG_array_type,
            name,
            byte_size: Some(self.byte_size()? * n),
            num_elements: Some(n),
            element_type: Some(Box::new(base.clone())),
            ..AttrRecord::default()
        };
        Ok(TypeSymbol::synthesized(self.rref, self.reader, rec))
    }
}

/// An enumeration type with value lookup by name.
pub struct EnumSymbol<'r, R: DebugReader> {
    inner: TypeSymbol<'r, R>,
}

impl<'r, R: DebugReader> EnumSymbol<'r, R> {
    pub fn new(rref: SymbolRef, reader: &'r R) -> Self {
        Self {
            inner: TypeSymbol::new(rref, reader),
        }
    }

    pub fn type_symbol(&self) -> &TypeSymbol<'r, R> {
        &self.inner
    }

    pub fn type_name(&self) -> Result<String, Error> {
        self.inner.type_name()
    }

    pub fn byte_size(&self) -> Result<u64, Error> {
        self.inner.byte_size()
    }

    pub fn value(&self, name: &str) -> Result<Option<i64>, Error> {
        Ok(self.inner.enumerators()?.get(name).copied())
    }

    pub fn names(&self) -> Result<Vec<String>, Error> {
        Ok(self.inner.enumerators()?.keys().cloned().collect())
    }

    pub fn items(&self) -> Result<Vec<(String, i64)>, Error> {
        Ok(self
            .inner
            .enumerators()?
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect())
    }
}

/// A variable, static or local.
pub struct VariableSymbol<'r, R: DebugReader> {
    rref: SymbolRef,
    reader: &'r R,
    record: OnceCell<AttrRecord>,
    static_location: OnceCell<Option<u64>>,
}

impl<R: DebugReader> Clone for VariableSymbol<'_, R> {
    fn clone(&self) -> Self {
        Self {
            rref: self.rref,
            reader: self.reader,
            record: self.record.clone(),
            static_location: self.static_location.clone(),
        }
    }
}

impl<'r, R: DebugReader> VariableSymbol<'r, R> {
    pub fn new(rref: SymbolRef, reader: &'r R) -> Self {
        Self {
            rref,
            reader,
            record: OnceCell::new(),
            static_location: OnceCell::new(),
        }
    }

    pub fn reference(&self) -> SymbolRef {
        self.rref
    }

    pub fn record(&self) -> Result<&AttrRecord, Error> {
        if let Some(rec) = self.record.get() {
            return Ok(rec);
        }
        let mut rec = self.reader.variable_record(self.rref)?;
        enhance_record(&mut rec, self.rref, self.reader);
        Ok(self.record.get_or_init(|| rec))
    }

    pub fn name(&self) -> Result<String, Error> {
        Ok(self.record()?.name.clone())
    }

    pub fn type_name(&self) -> Result<String, Error> {
        let rec = self.record()?;
        Ok(rec.type_name.clone().unwrap_or_else(|| rec.name.clone()))
    }

    pub fn byte_size(&self) -> Result<u64, Error> {
        let rec = self.record()?;
        Ok(rec.byte_size.unwrap_or_else(|| self.reader.int_size()))
    }

    pub fn bit_offset(&self) -> Result<Option<u64>, Error> {
        Ok(self.record()?.bit_offset)
    }

    pub fn bit_size(&self) -> Result<Option<u64>, Error> {
        Ok(self.record()?.bit_size)
    }

    pub fn is_signed(&self) -> Result<bool, Error> {
        let rec = self.record()?;
        if let Some(s) = rec.signed {
            return Ok(s);
        }
        Ok(chase_signedness(self.rref, self.reader))
    }

    pub fn is_global(&self) -> bool {
        self.reader.is_external(self.rref)
    }

    /// Members of the variable's type: (name, byte offset, member type).
    pub fn members(&self) -> Result<Vec<(String, u64, TypeSymbol<'r, R>)>, Error> {
        Ok(self
            .record()?
            .members
            .iter()
            .map(|m| {
                (
                    m.name.clone(),
                    m.offset,
                    TypeSymbol::new(m.rref, self.reader),
                )
            })
            .collect())
    }

    /// The variable's static address, if it has one. Variables that live
    /// in registers, were optimized away, or whose location needs machine
    /// state have none.
    pub fn static_location(&self) -> Option<u64> {
        *self.static_location.get_or_init(|| {
            let ops = self.reader.location(self.rref, 0, false)?;
            match locexpr::evaluate(&ops) {
                Ok(addr) => addr,
                Err(e) => {
                    tracing::debug!(error = %e, "variable has no static location");
                    None
                }
            }
        })
    }

    /// The raw location expression selected for a pc, for callers that
    /// can evaluate register-relative locations themselves.
    pub fn location_expression(&self, pc: u64, has_started: bool) -> Option<Vec<LocOp>> {
        self.reader.location(self.rref, pc, has_started)
    }
}

/// A function, concrete or inlined. Names of inlined instances live on
/// the abstract origin, so that reference is resolved up front.
pub struct FunctionSymbol<'r, R: DebugReader> {
    rref: SymbolRef,
    origin: SymbolRef,
    reader: &'r R,
    ranges: OnceCell<Vec<(u64, u64)>>,
}

impl<R: DebugReader> Clone for FunctionSymbol<'_, R> {
    fn clone(&self) -> Self {
        Self {
            rref: self.rref,
            origin: self.origin,
            reader: self.reader,
            ranges: self.ranges.clone(),
        }
    }
}

impl<'r, R: DebugReader> FunctionSymbol<'r, R> {
    pub fn new(rref: SymbolRef, reader: &'r R) -> Self {
        let origin = reader
            .attr(rref, gim_con::DW_AT_abstract_origin)
            .and_then(|v| v.sym_ref())
            .unwrap_or(rref);
        Self {
            rref,
            origin,
            reader,
            ranges: OnceCell::new(),
        }
    }

    pub fn reference(&self) -> SymbolRef {
        self.rref
    }

    pub fn name(&self) -> Option<String> {
        self.reader
            .attr(self.origin, gim_con::DW_AT_name)
            .and_then(|v| v.string().map(str::to_string))
    }

    fn display_name(&self) -> String {
        self.name()
            .unwrap_or_else(|| format!("function at ref {:#x}", self.rref.0))
    }

    /// True for an inlined instance of another function.
    pub fn is_inline(&self) -> bool {
        self.origin != self.rref
    }

    pub fn is_global(&self) -> bool {
        self.reader.is_external(self.rref)
    }

    /// Address ranges, with relative high addresses (a producer quirk:
    /// high < low means high is a length) corrected to absolute.
    pub fn ranges(&self) -> Result<&[(u64, u64)], Error> {
        if let Some(r) = self.ranges.get() {
            return Ok(r);
        }
        let raw = self
            .reader
            .ranges(self.rref)
            .ok_or_else(|| Error::NoAddressRanges(self.display_name()))?;
        let corrected = correct_ranges(raw);
        Ok(self.ranges.get_or_init(|| corrected))
    }

    pub fn address(&self) -> Result<u64, Error> {
        self.ranges()?
            .first()
            .map(|r| r.0)
            .ok_or_else(|| Error::NoAddressRanges(self.display_name()))
    }

    pub fn end_address(&self) -> Result<u64, Error> {
        self.ranges()?
            .last()
            .map(|r| r.1)
            .ok_or_else(|| Error::NoAddressRanges(self.display_name()))
    }

    /// Total size of all ranges, in bytes.
    pub fn size(&self) -> Result<u64, Error> {
        Ok(self.ranges()?.iter().map(|(lo, hi)| hi - lo).sum())
    }

    pub fn contains(&self, pc: u64) -> Result<bool, Error> {
        Ok(self
            .ranges()?
            .iter()
            .any(|&(lo, hi)| lo <= pc && pc < hi))
    }

    pub fn params(&self) -> Vec<(String, VariableSymbol<'r, R>)> {
        self.reader
            .formal_parameters(self.rref)
            .into_iter()
            .map(|(name, r)| (name, VariableSymbol::new(r, self.reader)))
            .collect()
    }

    pub fn locals(&self) -> Vec<(String, VariableSymbol<'r, R>)> {
        self.reader
            .local_variables(self.rref)
            .into_iter()
            .map(|(name, r)| (name, VariableSymbol::new(r, self.reader)))
            .collect()
    }

    pub fn inline_calls(&self) -> Vec<FunctionSymbol<'r, R>> {
        self.reader
            .inline_calls(self.rref)
            .into_iter()
            .map(|r| FunctionSymbol::new(r, self.reader))
            .collect()
    }

    pub fn return_type(&self) -> Option<TypeSymbol<'r, R>> {
        self.reader
            .return_type(self.rref)
            .map(|r| TypeSymbol::new(r, self.reader))
    }

    /// (type name, parameter name) pairs in declaration order.
    pub fn signature(&self) -> Result<Vec<(String, String)>, Error> {
        self.params()
            .into_iter()
            .map(|(name, var)| Ok((var.type_name()?, name)))
            .collect()
    }

    pub fn signature_string(&self) -> Result<String, Error> {
        let ret = match self.return_type() {
            Some(t) => t.type_name()?,
            None => "void".to_string(),
        };
        let args = self
            .signature()?
            .iter()
            .map(|(ty, name)| format!("{} {}", ty, name))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!("{} {}({})", ret, self.display_name(), args))
    }

    /// Frame recovery rules for a pc inside this function.
    pub fn frame_info(
        &self,
        pc: u64,
        executing_pc: bool,
        regs: &RegisterSet,
    ) -> Result<StackFrame<'r, R>, Error> {
        let base = self.address()?;
        let offset = pc
            .checked_sub(base)
            .ok_or(Error::NoStackFrameInfo { pc })?;
        let rules = self
            .reader
            .unwind_info(self.rref, offset, regs)
            .ok_or(Error::NoStackFrameInfo { pc })?;
        Ok(StackFrame {
            function: self.clone(),
            base,
            pc_offset: offset,
            executing_pc,
            rules,
        })
    }

    /// A view of this function loaded at a different address, as happens
    /// when a ROM function is replaced by a patched copy in RAM. The
    /// patched copy may carry an extra preamble before the code the debug
    /// info describes. Returns `None` when the load address matches the
    /// debug info and no adjustment is needed.
    pub fn with_load_address(
        &self,
        adjusted_address: u64,
        adjusted_size: u64,
    ) -> Result<Option<OffsetFunction<'r, R>>, Error> {
        // Bit 0 is a thumb/interwork marker, not part of the address.
        let adjusted_address = adjusted_address & !1;
        let base = self.address()? & !1;
        if adjusted_address == base {
            return Ok(None);
        }
        let preamble = if adjusted_size == 0 {
            0
        } else {
            adjusted_size.saturating_sub(self.size()?)
        };
        Ok(Some(OffsetFunction {
            offset: adjusted_address as i64 - base as i64,
            preamble,
            inner: self.clone(),
        }))
    }
}

pub(crate) fn correct_ranges(raw: Vec<(u64, u64)>) -> Vec<(u64, u64)> {
    raw.into_iter()
        .map(|(lo, hi)| if hi < lo { (lo, lo + hi) } else { (lo, hi) })
        .collect()
}

/// A function viewed at its actual load address. Program counters are
/// translated back to the addresses the debug info was built for; pcs that
/// fall inside the preamble are clamped to the function entry.
pub struct OffsetFunction<'r, R: DebugReader> {
    inner: FunctionSymbol<'r, R>,
    offset: i64,
    preamble: u64,
}

impl<'r, R: DebugReader> OffsetFunction<'r, R> {
    pub fn inner(&self) -> &FunctionSymbol<'r, R> {
        &self.inner
    }

    pub fn preamble_size(&self) -> u64 {
        self.preamble
    }

    fn to_loaded(&self, debug_pc: u64) -> u64 {
        (debug_pc as i64 + self.offset) as u64 + self.preamble
    }

    /// Translates a loaded pc back into debug-info terms, clamped to the
    /// function entry for pcs inside the preamble.
    pub fn to_debug_pc(&self, loaded_pc: u64) -> Result<u64, Error> {
        let base = self.inner.address()?;
        let translated = (loaded_pc & !1) as i64 - self.offset - self.preamble as i64;
        Ok((translated.max(0) as u64).max(base))
    }

    pub fn address(&self) -> Result<u64, Error> {
        Ok((self.inner.address()? as i64 + self.offset) as u64)
    }

    pub fn end_address(&self) -> Result<u64, Error> {
        Ok(self.to_loaded(self.inner.end_address()?))
    }

    pub fn size(&self) -> Result<u64, Error> {
        Ok(self.inner.size()? + self.preamble)
    }

    pub fn contains(&self, pc: u64) -> Result<bool, Error> {
        let pc = pc & !1;
        Ok(self.address()? <= pc && pc < self.end_address()?)
    }

    pub fn name(&self) -> Option<String> {
        self.inner.name()
    }

    pub fn params(&self) -> Vec<(String, VariableSymbol<'r, R>)> {
        self.inner.params()
    }

    pub fn locals(&self) -> Vec<(String, VariableSymbol<'r, R>)> {
        self.inner.locals()
    }

    pub fn signature_string(&self) -> Result<String, Error> {
        self.inner.signature_string()
    }

    pub fn frame_info(
        &self,
        pc: u64,
        executing_pc: bool,
        regs: &RegisterSet,
    ) -> Result<StackFrame<'r, R>, Error> {
        let debug_pc = self.to_debug_pc(pc)?;
        self.inner.frame_info(debug_pc, executing_pc, regs)
    }
}

/// One stack frame: a function plus the unwind rules in force at its pc.
pub struct StackFrame<'r, R: DebugReader> {
    function: FunctionSymbol<'r, R>,
    base: u64,
    pc_offset: u64,
    executing_pc: bool,
    rules: FrameRules,
}

impl<'r, R: DebugReader> StackFrame<'r, R> {
    pub fn function(&self) -> &FunctionSymbol<'r, R> {
        &self.function
    }

    pub fn rules(&self) -> &FrameRules {
        &self.rules
    }

    pub fn pc(&self) -> u64 {
        self.base + self.pc_offset
    }

    pub fn source_line(&self) -> Option<(String, u32)> {
        self.function
            .reader
            .source_line(self.function.rref, self.pc())
    }

    pub fn params(&self) -> Vec<(String, VariableSymbol<'r, R>)> {
        self.function.params()
    }

    pub fn locals(&self) -> Vec<(String, VariableSymbol<'r, R>)> {
        self.function.locals()
    }

    /// Location expression for one of this frame's variables at the
    /// frame's pc.
    pub fn local_var_loc(&self, var: &VariableSymbol<'r, R>) -> Option<Vec<LocOp>> {
        var.location_expression(self.pc(), self.executing_pc)
    }
}
