//! A debug-info session over one or more readers.
//!
//! A session owns a set of readers (a base ROM image plus any patch
//! images), merges their symbol trees lazily per category, and routes every
//! per-symbol query back to the reader a symbol actually came from using
//! the merge provenance. Sessions built over single images can themselves
//! be combined, with patch images shadowing ROM symbols.

use std::cell::OnceCell;
use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::error::Error;
use crate::merge::{merge, Provenance};
use crate::reader::{DebugReader, FrameRules, RegisterSet, SymbolRef};
use crate::resolve;
use crate::scope::{Entry, ScopeMap, ScopePath, SymbolTable, TableOptions};
use crate::symbol::{EnumSymbol, FunctionSymbol, TypeSymbol, VariableSymbol};

/// Keep-this-name predicates applied while merging category maps, used to
/// drop compiler-generated noise symbols up front.
pub type NameFilter = Box<dyn Fn(&str) -> bool>;

#[derive(Default)]
pub struct NameFilters {
    pub variables: Option<NameFilter>,
    pub functions: Option<NameFilter>,
    pub types: Option<NameFilter>,
    pub enums: Option<NameFilter>,
    pub compilation_units: Option<NameFilter>,
}

/// A merged category: the lookup table plus the provenance of its leaves.
struct Category<T = SymbolRef> {
    table: SymbolTable<T>,
    provenance: Provenance,
}

/// Upper bound on readers consulted during unwinding. Purely a safety net
/// against pathological reader lists.
const MAX_UNWIND_READERS: usize = 100;

pub struct Session<R: DebugReader> {
    readers: Vec<R>,
    /// Merge source index -> index into `readers`. Identity for sessions
    /// built directly over readers; offset-mapped for combined sessions.
    source_base: Vec<usize>,
    filters: NameFilters,
    include_abstract: bool,
    vars: OnceCell<Category>,
    funcs: OnceCell<Category>,
    types: OnceCell<Category>,
    enums: OnceCell<Category>,
    cus: OnceCell<Category<Vec<SymbolRef>>>,
    econsts: OnceCell<IndexMap<String, i64>>,
}

impl<R: DebugReader> Session<R> {
    pub fn new(readers: Vec<R>, filters: NameFilters) -> Self {
        Self::with_options(readers, filters, false)
    }

    /// `include_abstract` additionally exposes abstract-instance function
    /// entries (the out-of-line skeletons of inlined functions).
    pub fn with_options(
        readers: Vec<R>,
        filters: NameFilters,
        include_abstract: bool,
    ) -> Self {
        let source_base = (0..readers.len()).collect();
        Self {
            readers,
            source_base,
            filters,
            include_abstract,
            vars: OnceCell::new(),
            funcs: OnceCell::new(),
            types: OnceCell::new(),
            enums: OnceCell::new(),
            cus: OnceCell::new(),
            econsts: OnceCell::new(),
        }
    }

    pub fn readers(&self) -> &[R] {
        &self.readers
    }

    pub fn set_verbosity(&self, level: u8) {
        for r in &self.readers {
            r.set_verbosity(level);
        }
    }

    fn merge_category<T: Clone>(
        maps: &[ScopeMap<T>],
        filter: Option<&NameFilter>,
        opts: TableOptions,
    ) -> Result<Category<T>, Error> {
        let refs: Vec<&ScopeMap<T>> = maps.iter().collect();
        let filter = filter.map(|f| f.as_ref() as &dyn Fn(&str) -> bool);
        let merged = merge(&refs, filter)?;
        Ok(Category {
            table: SymbolTable::new(merged.map, opts),
            provenance: merged.provenance,
        })
    }

    fn force<'a, T: Clone>(
        cell: &'a OnceCell<Category<T>>,
        build: impl FnOnce() -> Result<Category<T>, Error>,
    ) -> Result<&'a Category<T>, Error> {
        if let Some(cat) = cell.get() {
            return Ok(cat);
        }
        let cat = build()?;
        Ok(cell.get_or_init(|| cat))
    }

    fn var_cat(&self) -> Result<&Category, Error> {
        Self::force(&self.vars, || {
            let maps: Vec<_> = self.readers.iter().map(|r| r.variables()).collect();
            Self::merge_category(&maps, self.filters.variables.as_ref(), TableOptions::default())
        })
    }

    fn func_cat(&self) -> Result<&Category, Error> {
        Self::force(&self.funcs, || {
            let maps: Vec<_> = self
                .readers
                .iter()
                .map(|r| r.functions(self.include_abstract))
                .collect();
            Self::merge_category(&maps, self.filters.functions.as_ref(), TableOptions::default())
        })
    }

    fn type_cat(&self) -> Result<&Category, Error> {
        Self::force(&self.types, || {
            let maps: Vec<_> = self.readers.iter().map(|r| r.types()).collect();
            Self::merge_category(&maps, self.filters.types.as_ref(), combined_opts())
        })
    }

    fn enum_cat(&self) -> Result<&Category, Error> {
        Self::force(&self.enums, || {
            let maps: Vec<_> = self.readers.iter().map(|r| r.enums()).collect();
            Self::merge_category(&maps, self.filters.enums.as_ref(), combined_opts())
        })
    }

    fn cu_cat(&self) -> Result<&Category<Vec<SymbolRef>>, Error> {
        Self::force(&self.cus, || {
            let maps: Vec<_> = self
                .readers
                .iter()
                .map(|r| unflatten_cus(r.compilation_units()))
                .collect();
            Self::merge_category(&maps, self.filters.compilation_units.as_ref(), cu_opts())
        })
    }

    /// All enumerator constants across all readers, later readers winning
    /// name collisions.
    pub fn enumerators(&self) -> &IndexMap<String, i64> {
        self.econsts.get_or_init(|| {
            let mut all = IndexMap::new();
            for r in &self.readers {
                all.extend(r.enumerators());
            }
            all
        })
    }

    pub fn enumerator(&self, name: &str) -> Option<i64> {
        self.enumerators().get(name).copied()
    }

    fn reader_for(&self, provenance: &Provenance, path: &[String]) -> &R {
        let src = provenance.source_index(path) as usize;
        let idx = self.source_base.get(src).copied().unwrap_or(0);
        &self.readers[idx]
    }

    /// The merged variable table, for callers that want raw enumeration
    /// or search.
    pub fn variables(&self) -> Result<&SymbolTable<SymbolRef>, Error> {
        Ok(&self.var_cat()?.table)
    }

    pub fn functions(&self) -> Result<&SymbolTable<SymbolRef>, Error> {
        Ok(&self.func_cat()?.table)
    }

    pub fn types(&self) -> Result<&SymbolTable<SymbolRef>, Error> {
        Ok(&self.type_cat()?.table)
    }

    pub fn enums(&self) -> Result<&SymbolTable<SymbolRef>, Error> {
        Ok(&self.enum_cat()?.table)
    }

    pub fn compilation_units(&self) -> Result<&SymbolTable<Vec<SymbolRef>>, Error> {
        Ok(&self.cu_cat()?.table)
    }

    pub fn get_variable(&self, name: &str) -> Result<VariableSymbol<'_, R>, Error> {
        let cat = self.var_cat()?;
        let (key, leaf) = cat
            .table
            .lookup_symbol(name, true, None)?
            .ok_or_else(|| Error::UnknownSymbol(name.to_string()))?;
        Ok(VariableSymbol::new(leaf, self.reader_for(&cat.provenance, &key)))
    }

    /// Every variable matching the (possibly partially scoped) name, one
    /// façade per match.
    pub fn get_variable_all(
        &self,
        name: &str,
    ) -> Result<Vec<(ScopePath, VariableSymbol<'_, R>)>, Error> {
        let cat = self.var_cat()?;
        let keys = cat.table.scoped_name_matches(name);
        if keys.is_empty() {
            return Err(Error::UnknownSymbol(name.to_string()));
        }
        let mut out = Vec::new();
        for key in keys {
            if let Entry::Symbol(leaf) = cat.table.get_path(&key)? {
                let reader = self.reader_for(&cat.provenance, &key);
                out.push((key, VariableSymbol::new(leaf, reader)));
            }
        }
        Ok(out)
    }

    /// Like `get_variable`, but the match must have external linkage. A
    /// name that exists only as a local is reported as `NotAGlobal`.
    pub fn get_global_variable(&self, name: &str) -> Result<VariableSymbol<'_, R>, Error> {
        let cat = self.var_cat()?;
        let is_global = |k: &[String], r: &SymbolRef| {
            self.reader_for(&cat.provenance, k).is_external(*r)
        };
        match cat.table.lookup_symbol(name, true, Some(&is_global)) {
            Ok(Some((key, leaf))) => {
                Ok(VariableSymbol::new(leaf, self.reader_for(&cat.provenance, &key)))
            }
            Ok(None) => Err(Error::NotAGlobal(name.to_string())),
            Err(Error::UnknownSymbol(_))
                if !cat.table.scoped_name_matches(name).is_empty() =>
            {
                Err(Error::NotAGlobal(name.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    pub fn get_function(&self, name: &str) -> Result<FunctionSymbol<'_, R>, Error> {
        let cat = self.func_cat()?;
        match cat.table.lookup_symbol(name, true, None) {
            Ok(Some((key, leaf))) => {
                Ok(FunctionSymbol::new(leaf, self.reader_for(&cat.provenance, &key)))
            }
            Ok(None) => Err(Error::UnknownSymbol(name.to_string())),
            Err(ambiguous @ Error::AmbiguousSymbol { .. }) => {
                // A static in several compilation units plus one external
                // definition is common; prefer the external one.
                let is_global = |k: &[String], r: &SymbolRef| {
                    self.reader_for(&cat.provenance, k).is_external(*r)
                };
                match cat.table.lookup_symbol(name, true, Some(&is_global)) {
                    Ok(Some((key, leaf))) => Ok(FunctionSymbol::new(
                        leaf,
                        self.reader_for(&cat.provenance, &key),
                    )),
                    _ => Err(ambiguous),
                }
            }
            Err(e) => Err(e),
        }
    }

    pub fn get_function_addr(&self, name: &str) -> Result<u64, Error> {
        self.get_function(name)?.address()
    }

    fn cu_scoped_symbol(
        &self,
        cat: &Category,
        cu: &str,
        name: &str,
    ) -> Result<(ScopePath, SymbolRef), Error> {
        let sub = cat
            .table
            .get(cu)?
            .scope()
            .ok_or_else(|| Error::UnknownSymbol(cu.to_string()))?;
        let (rel, leaf) = sub
            .lookup_symbol(name, true, None)?
            .ok_or_else(|| Error::UnknownSymbol(name.to_string()))?;
        let mut full = vec![cu.to_string()];
        full.extend(rel);
        Ok((full, leaf))
    }

    pub fn get_cu_variable(
        &self,
        cu: &str,
        name: &str,
    ) -> Result<VariableSymbol<'_, R>, Error> {
        let cat = self.var_cat()?;
        let (key, leaf) = self.cu_scoped_symbol(cat, cu, name)?;
        Ok(VariableSymbol::new(leaf, self.reader_for(&cat.provenance, &key)))
    }

    pub fn get_cu_function(
        &self,
        cu: &str,
        name: &str,
    ) -> Result<FunctionSymbol<'_, R>, Error> {
        let cat = self.func_cat()?;
        let (key, leaf) = self.cu_scoped_symbol(cat, cu, name)?;
        Ok(FunctionSymbol::new(leaf, self.reader_for(&cat.provenance, &key)))
    }

    /// Resolves a C-style type declarator ("Foo", "struct bar *",
    /// "uint16[8]") against the merged type table.
    pub fn get_type(&self, name: &str) -> Result<TypeSymbol<'_, R>, Error> {
        let cat = self.type_cat()?;
        let wrap = |k: &[String], r: SymbolRef| {
            TypeSymbol::new(r, self.reader_for(&cat.provenance, k))
        };
        resolve::resolve_in(&cat.table, &wrap, name)
    }

    /// Resolves a declarator within one compilation unit's scope of the
    /// merged table.
    pub fn get_cu_type(&self, cu: &str, name: &str) -> Result<TypeSymbol<'_, R>, Error> {
        let cat = self.type_cat()?;
        let sub = cat
            .table
            .get(cu)?
            .scope()
            .ok_or_else(|| Error::UnknownSymbol(cu.to_string()))?;
        let wrap = |k: &[String], r: SymbolRef| {
            let mut full = vec![cu.to_string()];
            full.extend(k.iter().cloned());
            TypeSymbol::new(r, self.reader_for(&cat.provenance, &full))
        };
        resolve::resolve_in(&sub, &wrap, name)
    }

    /// All type names in the merged table, deduplicated across
    /// compilation units.
    pub fn get_type_names(&self) -> Result<Vec<String>, Error> {
        let cat = self.type_cat()?;
        let sep = cat.table.sep().to_string();
        Ok(cat
            .table
            .keys(None)
            .into_iter()
            .map(|k| k.join(&sep))
            .collect())
    }

    /// Looks up an enumeration type, tolerating ambiguity (first match
    /// wins) and retrying with the "enum " tag prefix DWARF producers
    /// sometimes bake into the name.
    pub fn get_enum(&self, name: &str) -> Result<EnumSymbol<'_, R>, Error> {
        let cat = self.enum_cat()?;
        let attempt = |n: &str| cat.table.lookup_symbol(n, false, None);
        let found = match attempt(name) {
            Ok(found) => found,
            Err(Error::UnknownSymbol(_)) => {
                match attempt(&format!("enum {}", name)) {
                    Ok(found) => found,
                    Err(Error::UnknownSymbol(_)) => None,
                    Err(e) => return Err(e),
                }
            }
            Err(e) => return Err(e),
        };
        let (key, leaf) = found.ok_or_else(|| Error::UnknownSymbol(name.to_string()))?;
        Ok(EnumSymbol::new(leaf, self.reader_for(&cat.provenance, &key)))
    }

    /// Paths of all non-global variables matching the name.
    pub fn lookup_local_variables(&self, name: &str) -> Result<Vec<ScopePath>, Error> {
        let cat = self.var_cat()?;
        Ok(cat
            .table
            .scoped_name_matches(name)
            .into_iter()
            .filter(|key| match cat.table.get_path(key) {
                Ok(Entry::Symbol(leaf)) => {
                    !self.reader_for(&cat.provenance, key).is_external(leaf)
                }
                _ => false,
            })
            .collect())
    }

    pub fn global_variable_list(
        &self,
    ) -> Result<Vec<(ScopePath, VariableSymbol<'_, R>)>, Error> {
        let cat = self.var_cat()?;
        let is_global = |k: &[String], r: &SymbolRef| {
            self.reader_for(&cat.provenance, k).is_external(*r)
        };
        Ok(cat
            .table
            .items(Some(&is_global))
            .into_iter()
            .map(|(key, leaf)| {
                let reader = self.reader_for(&cat.provenance, &key);
                (key, VariableSymbol::new(leaf, reader))
            })
            .collect())
    }

    pub fn global_function_list(
        &self,
    ) -> Result<Vec<(ScopePath, FunctionSymbol<'_, R>)>, Error> {
        let cat = self.func_cat()?;
        let is_global = |k: &[String], r: &SymbolRef| {
            self.reader_for(&cat.provenance, k).is_external(*r)
        };
        Ok(cat
            .table
            .items(Some(&is_global))
            .into_iter()
            .map(|(key, leaf)| {
                let reader = self.reader_for(&cat.provenance, &key);
                (key, FunctionSymbol::new(leaf, reader))
            })
            .collect())
    }

    /// Every function in the image: (name within its unit, defining unit
    /// for statics, façade). Globals report no unit.
    pub fn function_list(
        &self,
    ) -> Result<Vec<(String, Option<String>, FunctionSymbol<'_, R>)>, Error> {
        let cat = self.func_cat()?;
        let sep = cat.table.sep().to_string();
        let mut out = Vec::new();
        for (key, leaf) in cat.table.items(None) {
            if key.len() < 2 {
                continue;
            }
            let reader = self.reader_for(&cat.provenance, &key);
            let func = FunctionSymbol::new(leaf, reader);
            let cu = if func.is_global() {
                None
            } else {
                Some(key[0].clone())
            };
            out.push((key[1..].join(&sep), cu, func));
        }
        Ok(out)
    }

    /// The compilation units that define a function of this name.
    pub fn function_cus(&self, name: &str) -> Result<Vec<String>, Error> {
        let cat = self.func_cat()?;
        let mut cus: Vec<String> = Vec::new();
        for key in cat.table.scoped_name_matches(name) {
            if let Some(first) = key.first() {
                if !cus.contains(first) {
                    cus.push(first.clone());
                }
            }
        }
        Ok(cus)
    }

    /// Finds the compilation unit named by `path` (matched by its trailing
    /// path components, so "main.c" finds "src/main.c" if unique).
    pub fn get_cu(&self, path: &str) -> Result<CompilationUnit<'_, R>, Error> {
        let cat = self.cu_cat()?;
        let (key, refs) = cat
            .table
            .lookup_symbol(path, true, None)?
            .ok_or_else(|| Error::UnknownSymbol(path.to_string()))?;
        let reader = self.reader_for(&cat.provenance, &key);
        Ok(CompilationUnit {
            session: self,
            key,
            refs,
            reader,
            types: OnceCell::new(),
            enums: OnceCell::new(),
            ranges: OnceCell::new(),
        })
    }

    /// Unwind rules for an absolute pc, trying each reader in turn.
    pub fn get_frame_info(&self, pc: u64, regs: &RegisterSet) -> Result<FrameRules, Error> {
        for r in self.readers.iter().take(MAX_UNWIND_READERS) {
            if let Some(rules) = r.unwind_at_pc(pc, regs) {
                return Ok(rules);
            }
        }
        Err(Error::NoStackFrameInfo { pc })
    }

    /// Combines per-image sessions into one, later sessions shadowing
    /// earlier ones. Each input must be an unmerged (single-effective-
    /// source) session: combining already-combined sessions would lose
    /// their internal routing.
    pub fn combine(sessions: Vec<Session<R>>) -> Result<Session<R>, Error> {
        let mut var_maps = Vec::new();
        let mut func_maps = Vec::new();
        let mut type_maps = Vec::new();
        let mut enum_maps = Vec::new();
        let mut cu_maps = Vec::new();
        let mut econsts = IndexMap::new();
        for s in &sessions {
            for (cat_name, trivial) in [
                ("variables", s.var_cat()?.provenance.is_trivial()),
                ("functions", s.func_cat()?.provenance.is_trivial()),
                ("types", s.type_cat()?.provenance.is_trivial()),
                ("enums", s.enum_cat()?.provenance.is_trivial()),
                ("compilation units", s.cu_cat()?.provenance.is_trivial()),
            ] {
                if !trivial {
                    return Err(Error::StructuralMerge(format!(
                        "input session has non-trivial {} provenance",
                        cat_name
                    )));
                }
            }
            var_maps.push(s.var_cat()?.table.snapshot());
            func_maps.push(s.func_cat()?.table.snapshot());
            type_maps.push(s.type_cat()?.table.snapshot());
            enum_maps.push(s.enum_cat()?.table.snapshot());
            cu_maps.push(s.cu_cat()?.table.snapshot());
            econsts.extend(s.enumerators().clone());
        }

        let vars = Self::merge_category(&var_maps, None, TableOptions::default())?;
        let funcs = Self::merge_category(&func_maps, None, TableOptions::default())?;
        let types = Self::merge_category(&type_maps, None, combined_opts())?;
        let enums = Self::merge_category(&enum_maps, None, combined_opts())?;
        let cus = Self::merge_category(&cu_maps, None, cu_opts())?;

        let mut source_base = Vec::new();
        let mut offset = 0;
        for s in &sessions {
            source_base.push(offset);
            offset += s.readers.len();
        }
        let include_abstract = sessions.first().map_or(false, |s| s.include_abstract);
        let readers: Vec<R> = sessions.into_iter().flat_map(|s| s.readers).collect();

        let combined = Session {
            readers,
            source_base,
            filters: NameFilters::default(),
            include_abstract,
            vars: OnceCell::new(),
            funcs: OnceCell::new(),
            types: OnceCell::new(),
            enums: OnceCell::new(),
            cus: OnceCell::new(),
            econsts: OnceCell::new(),
        };
        let _ = combined.vars.set(vars);
        let _ = combined.funcs.set(funcs);
        let _ = combined.types.set(types);
        let _ = combined.enums.set(enums);
        let _ = combined.cus.set(cus);
        let _ = combined.econsts.set(econsts);
        Ok(combined)
    }
}

fn combined_opts() -> TableOptions {
    TableOptions {
        combine_outermost: true,
        ..TableOptions::default()
    }
}

fn cu_opts() -> TableOptions {
    TableOptions {
        sep: "/".to_string(),
        ..TableOptions::default()
    }
}

fn unflatten_cus(flat: BTreeMap<String, Vec<SymbolRef>>) -> ScopeMap<Vec<SymbolRef>> {
    SymbolTable::from_flat(flat, "/", Some("\\"), cu_opts()).snapshot()
}

/// One compilation unit of a session: its own type and enum namespaces,
/// its code ranges, and scoped access to the session's variable and
/// function tables.
pub struct CompilationUnit<'s, R: DebugReader> {
    session: &'s Session<R>,
    key: ScopePath,
    refs: Vec<SymbolRef>,
    reader: &'s R,
    types: OnceCell<SymbolTable<SymbolRef>>,
    enums: OnceCell<SymbolTable<SymbolRef>>,
    ranges: OnceCell<Vec<(u64, u64)>>,
}

impl<'s, R: DebugReader> CompilationUnit<'s, R> {
    /// Full source path of the unit.
    pub fn name(&self) -> String {
        self.key.join("/")
    }

    /// The unit's scope name in the session's symbol tables (its base
    /// file name).
    pub fn scope_name(&self) -> &str {
        self.key.last().map(String::as_str).unwrap_or_default()
    }

    pub fn references(&self) -> &[SymbolRef] {
        &self.refs
    }

    pub fn get_variable(&self, name: &str) -> Result<VariableSymbol<'s, R>, Error> {
        self.session.get_cu_variable(self.scope_name(), name)
    }

    pub fn get_function(&self, name: &str) -> Result<FunctionSymbol<'s, R>, Error> {
        self.session.get_cu_function(self.scope_name(), name)
    }

    pub fn variable_names(&self) -> Result<Vec<String>, Error> {
        self.scope_symbol_names(self.session.variables()?)
    }

    pub fn function_names(&self) -> Result<Vec<String>, Error> {
        self.scope_symbol_names(self.session.functions()?)
    }

    fn scope_symbol_names(
        &self,
        table: &SymbolTable<SymbolRef>,
    ) -> Result<Vec<String>, Error> {
        match table.get(self.scope_name()) {
            Ok(Entry::Scope(sub)) => {
                let sep = sub.sep().to_string();
                Ok(sub.keys(None).into_iter().map(|k| k.join(&sep)).collect())
            }
            Ok(Entry::Symbol(_)) | Err(Error::UnknownSymbol(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn type_table(&self) -> &SymbolTable<SymbolRef> {
        self.types.get_or_init(|| {
            SymbolTable::new(self.reader.cu_types(&self.refs), TableOptions::default())
        })
    }

    fn enum_table(&self) -> &SymbolTable<SymbolRef> {
        self.enums.get_or_init(|| {
            SymbolTable::new(self.reader.cu_enums(&self.refs), TableOptions::default())
        })
    }

    /// Resolves a declarator against this unit's own type namespace.
    pub fn get_type(&self, name: &str) -> Result<TypeSymbol<'s, R>, Error> {
        let reader = self.reader;
        let wrap = move |_k: &[String], r: SymbolRef| TypeSymbol::new(r, reader);
        resolve::resolve_in(self.type_table(), &wrap, name)
    }

    pub fn get_enum(&self, name: &str) -> Result<EnumSymbol<'s, R>, Error> {
        let table = self.enum_table();
        let attempt = |n: &str| table.lookup_symbol(n, false, None);
        let found = match attempt(name) {
            Ok(found) => found,
            Err(Error::UnknownSymbol(_)) => match attempt(&format!("enum {}", name)) {
                Ok(found) => found,
                Err(Error::UnknownSymbol(_)) => None,
                Err(e) => return Err(e),
            },
            Err(e) => return Err(e),
        };
        let (_, leaf) = found.ok_or_else(|| Error::UnknownSymbol(name.to_string()))?;
        Ok(EnumSymbol::new(leaf, self.reader))
    }

    /// Code ranges of the unit, gathered across all of its fragments,
    /// deduplicated and sorted. Fragments without range attributes are
    /// allowed and contribute nothing.
    pub fn ranges(&self) -> &[(u64, u64)] {
        self.ranges.get_or_init(|| {
            let mut all: Vec<(u64, u64)> = Vec::new();
            for r in &self.refs {
                if let Some(raw) = self.reader.ranges(*r) {
                    all.extend(crate::symbol::correct_ranges(raw));
                }
            }
            all.sort_unstable();
            all.dedup();
            all
        })
    }

    pub fn address(&self) -> Result<u64, Error> {
        self.ranges()
            .first()
            .map(|r| r.0)
            .ok_or_else(|| Error::NoAddressRanges(self.name()))
    }

    pub fn end_address(&self) -> Result<u64, Error> {
        self.ranges()
            .last()
            .map(|r| r.1)
            .ok_or_else(|| Error::NoAddressRanges(self.name()))
    }

    pub fn contains(&self, pc: u64) -> bool {
        self.ranges().iter().any(|&(lo, hi)| lo <= pc && pc < hi)
    }
}
