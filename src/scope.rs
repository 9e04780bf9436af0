//! Scoped symbol tables.
//!
//! Debug info for these parts is organized as a tree of named scopes:
//! compilation units at the top, then namespaces/functions, with symbols as
//! leaves. `SymbolTable` wraps such a tree and provides the lookup operations
//! the rest of the crate is built on: whole-path access, innermost-name
//! lookup with optional scope qualifiers, ambiguity policies, minimal unique
//! subkeys, and regex search.
//!
//! A table hands out cheap nested views of its sub-scopes; all views share
//! the underlying tree through an `Rc<RefCell<..>>`, and each view keeps its
//! own lazily built name index.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use regex::Regex;

use crate::error::Error;

/// Reserved scope name holding symbols that belong to no named scope.
pub const GLOBALS_SCOPE: &str = "<globals>";

/// A path of scope names from some root down to a symbol or sub-scope.
pub type ScopePath = Vec<String>;

/// One level of a symbol tree: names map either to nested scopes or to
/// leaf symbols.
pub type ScopeMap<T> = BTreeMap<String, ScopeNode<T>>;

#[derive(Clone, Debug, PartialEq)]
pub enum ScopeNode<T> {
    Scope(ScopeMap<T>),
    Leaf(T),
}

impl<T> ScopeNode<T> {
    pub fn as_scope(&self) -> Option<&ScopeMap<T>> {
        match self {
            ScopeNode::Scope(m) => Some(m),
            ScopeNode::Leaf(_) => None,
        }
    }

    pub fn as_leaf(&self) -> Option<&T> {
        match self {
            ScopeNode::Scope(_) => None,
            ScopeNode::Leaf(v) => Some(v),
        }
    }
}

/// Result of `SymbolTable::get`: either a leaf symbol or a nested view of a
/// sub-scope.
pub enum Entry<T> {
    Symbol(T),
    Scope(SymbolTable<T>),
}

impl<T> Entry<T> {
    pub fn symbol(self) -> Option<T> {
        match self {
            Entry::Symbol(v) => Some(v),
            Entry::Scope(_) => None,
        }
    }

    pub fn scope(self) -> Option<SymbolTable<T>> {
        match self {
            Entry::Symbol(_) => None,
            Entry::Scope(t) => Some(t),
        }
    }
}

/// Predicate applied to (path, leaf) pairs during enumeration and lookup.
/// Paths are relative to the view the operation was invoked on.
pub type Filter<'a, T> = &'a dyn Fn(&[String], &T) -> bool;

/// Lookup and enumeration policies for a table.
#[derive(Clone, Debug)]
pub struct TableOptions {
    /// Skip the `<globals>` bucket during enumeration (name lookup still
    /// sees it).
    pub ignore_globals: bool,
    /// Separator used when string keys are split into path components.
    pub sep: String,
    /// Report an unknown name as an error rather than `Ok(None)`.
    pub strict_unknown: bool,
    /// Report an ambiguous name as an error rather than `Ok(None)`.
    pub strict_ambiguous: bool,
    /// Treat keys differing only in their outermost component as one key.
    /// Used for type tables, where the same type is emitted per compilation
    /// unit.
    pub combine_outermost: bool,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            ignore_globals: true,
            sep: "::".to_string(),
            strict_unknown: true,
            strict_ambiguous: true,
            combine_outermost: false,
        }
    }
}

/// A deferred set of extra symbols folded into a table on first use.
///
/// The producer typically reads a symbol table from a different section of
/// the same image (e.g. ELF symbols supplementing DWARF), so entries whose
/// address collides with a symbol already present are dropped, with the
/// colliding entry's size backfilled onto the existing symbol if that one
/// has none.
pub struct Supplement<T> {
    pub producer: Box<dyn FnOnce() -> ScopeMap<T>>,
    pub address_of: Box<dyn Fn(&T) -> Option<u64>>,
    pub size_of: Box<dyn Fn(&T) -> Option<u64>>,
    pub backfill_size: Box<dyn Fn(&mut T, u64)>,
}

pub struct SymbolTable<T> {
    root: Rc<RefCell<ScopeMap<T>>>,
    /// Path from the shared root down to the scope this view presents.
    prefix: ScopePath,
    opts: TableOptions,
    /// Innermost name -> all paths (relative to this view) ending in it.
    index: RefCell<Option<HashMap<String, Vec<ScopePath>>>>,
    /// With `combine_outermost`, maps each stripped key back to the full
    /// key it stands for. Populated during enumeration.
    keys_mapping: RefCell<HashMap<ScopePath, ScopePath>>,
    supplement: RefCell<Option<Supplement<T>>>,
}

impl<T: Clone> SymbolTable<T> {
    pub fn new(map: ScopeMap<T>, opts: TableOptions) -> Self {
        Self {
            root: Rc::new(RefCell::new(map)),
            prefix: Vec::new(),
            opts,
            index: RefCell::new(None),
            keys_mapping: RefCell::new(HashMap::new()),
            supplement: RefCell::new(None),
        }
    }

    /// Builds a nested tree from flat `sep`-joined keys. `alt_sep`, if
    /// given, is normalized to `sep` first (e.g. mixed path separators in
    /// compilation unit names).
    pub fn from_flat(
        flat: impl IntoIterator<Item = (String, T)>,
        sep: &str,
        alt_sep: Option<&str>,
        opts: TableOptions,
    ) -> Self {
        let mut map = ScopeMap::new();
        for (key, value) in flat {
            let key = match alt_sep {
                Some(alt) => key.replace(alt, sep),
                None => key,
            };
            let parts: Vec<&str> = key.split(sep).collect();
            let mut cursor = &mut map;
            for part in &parts[..parts.len() - 1] {
                let node = cursor
                    .entry(part.to_string())
                    .or_insert_with(|| ScopeNode::Scope(ScopeMap::new()));
                cursor = match node {
                    ScopeNode::Scope(m) => m,
                    // A leaf already claimed this name; the flat key wins.
                    ScopeNode::Leaf(_) => {
                        *node = ScopeNode::Scope(ScopeMap::new());
                        match node {
                            ScopeNode::Scope(m) => m,
                            ScopeNode::Leaf(_) => unreachable!(),
                        }
                    }
                };
            }
            cursor.insert(parts[parts.len() - 1].to_string(), ScopeNode::Leaf(value));
        }
        Self::new(map, opts)
    }

    pub fn with_supplement(self, supplement: Supplement<T>) -> Self {
        *self.supplement.borrow_mut() = Some(supplement);
        self
    }

    pub fn sep(&self) -> &str {
        &self.opts.sep
    }

    pub fn options(&self) -> &TableOptions {
        &self.opts
    }

    /// Clones out the subtree this view presents.
    pub fn snapshot(&self) -> ScopeMap<T> {
        self.apply_supplement();
        let root = self.root.borrow();
        match lookup_node(&root, &self.prefix) {
            None => root.clone(),
            Some(ScopeNode::Scope(m)) => m.clone(),
            Some(ScopeNode::Leaf(_)) => ScopeMap::new(),
        }
    }

    fn subtable(&self, rel: &[String]) -> SymbolTable<T> {
        let mut prefix = self.prefix.clone();
        prefix.extend(rel.iter().cloned());
        SymbolTable {
            root: Rc::clone(&self.root),
            prefix,
            opts: self.opts.clone(),
            index: RefCell::new(None),
            keys_mapping: RefCell::new(HashMap::new()),
            supplement: RefCell::new(None),
        }
    }

    fn split(&self, name: &str) -> ScopePath {
        name.split(self.opts.sep.as_str())
            .map(str::to_string)
            .collect()
    }

    fn join(&self, path: &[String]) -> String {
        path.join(&self.opts.sep)
    }

    /// Whole-path access. `name` is split on the table separator.
    pub fn get(&self, name: &str) -> Result<Entry<T>, Error> {
        self.get_path(&self.split(name))
    }

    pub fn get_path(&self, path: &[String]) -> Result<Entry<T>, Error> {
        self.apply_supplement();
        let path = self.map_combined_key(path);
        let root = self.root.borrow();
        let mut full = self.prefix.clone();
        full.extend(path.iter().cloned());
        match lookup_node(&root, &full) {
            Some(ScopeNode::Leaf(v)) => Ok(Entry::Symbol(v.clone())),
            Some(ScopeNode::Scope(_)) => {
                drop(root);
                Ok(Entry::Scope(self.subtable(&path)))
            }
            None => Err(Error::UnknownSymbol(self.join(&path))),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_ok()
    }

    fn map_combined_key(&self, path: &[String]) -> ScopePath {
        if self.opts.combine_outermost {
            if let Some(full) = self.keys_mapping.borrow().get(path) {
                return full.clone();
            }
        }
        path.to_vec()
    }

    /// All (path, leaf) pairs under this view, honoring `ignore_globals`
    /// but not `combine_outermost`.
    fn raw_items(&self) -> Vec<(ScopePath, T)> {
        self.walk_items(self.opts.ignore_globals)
    }

    /// `ignore_globals` is an enumeration policy only; the name index must
    /// still cover the globals bucket.
    fn all_items(&self) -> Vec<(ScopePath, T)> {
        self.walk_items(false)
    }

    fn walk_items(&self, skip_globals: bool) -> Vec<(ScopePath, T)> {
        let root = self.root.borrow();
        let mut out = Vec::new();
        if let Some(scope) = self.view_scope(&root) {
            let mut path = Vec::new();
            collect_items(scope, skip_globals, &mut path, &mut out);
        }
        out
    }

    /// Recursive symbol paths. With `combine_outermost` the outermost
    /// component is stripped and duplicates collapsed.
    pub fn keys(&self, filter: Option<Filter<T>>) -> Vec<ScopePath> {
        self.items(filter).into_iter().map(|(k, _)| k).collect()
    }

    pub fn values(&self, filter: Option<Filter<T>>) -> Vec<T> {
        self.items(filter).into_iter().map(|(_, v)| v).collect()
    }

    pub fn items(&self, filter: Option<Filter<T>>) -> Vec<(ScopePath, T)> {
        self.apply_supplement();
        let raw = self.raw_items();
        let mut out = Vec::new();
        if self.opts.combine_outermost {
            let mut mapping = self.keys_mapping.borrow_mut();
            for (full, value) in raw {
                if let Some(f) = filter {
                    if !f(&full, &value) {
                        continue;
                    }
                }
                if full.len() < 2 {
                    continue;
                }
                let stripped: ScopePath = full[1..].to_vec();
                if out.iter().any(|(k, _)| *k == stripped) {
                    continue;
                }
                mapping.entry(stripped.clone()).or_insert(full);
                out.push((stripped, value));
            }
        } else {
            for (full, value) in raw {
                if let Some(f) = filter {
                    if !f(&full, &value) {
                        continue;
                    }
                }
                out.push((full, value));
            }
        }
        out
    }

    /// True if any symbol under this view passes the filter. Short form of
    /// `!keys(filter).is_empty()` kept separate because callers use it on
    /// large tables.
    pub fn any_keys(&self, filter: Option<Filter<T>>) -> bool {
        self.apply_supplement();
        self.raw_items()
            .iter()
            .any(|(k, v)| filter.map_or(true, |f| f(k, v)))
    }

    /// Names of leaf symbols immediately at this level.
    pub fn symbol_keys(&self, filter: Option<Filter<T>>) -> Vec<String> {
        self.symbol_items(filter).into_iter().map(|(k, _)| k).collect()
    }

    pub fn symbol_values(&self, filter: Option<Filter<T>>) -> Vec<T> {
        self.symbol_items(filter).into_iter().map(|(_, v)| v).collect()
    }

    pub fn symbol_items(&self, filter: Option<Filter<T>>) -> Vec<(String, T)> {
        self.apply_supplement();
        let root = self.root.borrow();
        let mut out = Vec::new();
        if let Some(scope) = self.view_scope(&root) {
            for (name, node) in scope {
                if let ScopeNode::Leaf(v) = node {
                    let path = vec![name.clone()];
                    if filter.map_or(true, |f| f(&path, v)) {
                        out.push((name.clone(), v.clone()));
                    }
                }
            }
        }
        out
    }

    /// Names of nested scopes immediately at this level, `<globals>`
    /// included.
    pub fn scope_keys(&self) -> Vec<String> {
        self.apply_supplement();
        let root = self.root.borrow();
        let mut out = Vec::new();
        if let Some(scope) = self.view_scope(&root) {
            for (name, node) in scope {
                if matches!(node, ScopeNode::Scope(_)) {
                    out.push(name.clone());
                }
            }
        }
        out
    }

    pub fn scope_items(&self) -> Vec<(String, SymbolTable<T>)> {
        self.scope_keys()
            .into_iter()
            .map(|name| {
                let sub = self.subtable(std::slice::from_ref(&name));
                (name, sub)
            })
            .collect()
    }

    pub fn scope_values(&self) -> Vec<SymbolTable<T>> {
        self.scope_items().into_iter().map(|(_, t)| t).collect()
    }

    fn view_scope<'a>(&self, root: &'a ScopeMap<T>) -> Option<&'a ScopeMap<T>> {
        if self.prefix.is_empty() {
            Some(root)
        } else {
            lookup_node(root, &self.prefix)?.as_scope()
        }
    }

    fn ensure_index(&self) {
        self.apply_supplement();
        self.build_index();
    }

    fn build_index(&self) {
        if self.index.borrow().is_some() {
            return;
        }
        let mut index: HashMap<String, Vec<ScopePath>> = HashMap::new();
        for (path, _) in self.all_items() {
            if let Some(last) = path.last() {
                index.entry(last.clone()).or_default().push(path.clone());
            }
        }
        *self.index.borrow_mut() = Some(index);
    }

    /// Every path whose innermost component equals the innermost component
    /// of `name`, scope qualifiers ignored.
    pub fn name_matches(&self, name: &str) -> Vec<ScopePath> {
        self.name_matches_path(&self.split(name))
    }

    fn name_matches_path(&self, name: &[String]) -> Vec<ScopePath> {
        self.ensure_index();
        let Some(last) = name.last() else {
            return Vec::new();
        };
        self.index
            .borrow()
            .as_ref()
            .and_then(|idx| idx.get(last).cloned())
            .unwrap_or_default()
    }

    /// Like `name_matches`, but any scope components in `name` must match
    /// the trailing scopes of the candidate (just above the leaf).
    pub fn scoped_name_matches(&self, name: &str) -> Vec<ScopePath> {
        self.scoped_name_matches_path(&self.split(name))
    }

    fn scoped_name_matches_path(&self, name: &[String]) -> Vec<ScopePath> {
        let matches = self.name_matches_path(name);
        let scope = &name[..name.len().saturating_sub(1)];
        if scope.is_empty() {
            return matches;
        }
        matches
            .into_iter()
            .filter(|m| {
                m.len() > scope.len()
                    && m[m.len() - 1 - scope.len()..m.len() - 1] == *scope
            })
            .collect()
    }

    /// Looks up a (possibly partially scoped) name, returning the full key.
    ///
    /// With `require_unique`, exactly one candidate must survive the filter;
    /// otherwise the first passing candidate wins. Unknown and ambiguous
    /// outcomes are errors or `Ok(None)` per the table's strictness options.
    pub fn lookup_key(
        &self,
        name: &str,
        require_unique: bool,
        filter: Option<Filter<T>>,
    ) -> Result<Option<ScopePath>, Error> {
        let parts = self.split(name);
        let scoped = self.scoped_name_matches_path(&parts);
        if scoped.is_empty() {
            return self.unknown(name);
        }
        let filtered: Vec<ScopePath> = match filter {
            Some(f) => {
                let mut passing = Vec::new();
                for key in scoped {
                    let leaf = match self.leaf_at(&key) {
                        Some(v) => v,
                        None => continue,
                    };
                    if f(&key, &leaf) {
                        passing.push(key);
                        if !require_unique {
                            break;
                        }
                    }
                }
                passing
            }
            None if require_unique => scoped,
            None => vec![scoped.into_iter().next().unwrap()],
        };
        match filtered.len() {
            0 => self.unknown(name),
            1 => Ok(Some(filtered.into_iter().next().unwrap())),
            _ => {
                if self.opts.combine_outermost {
                    let stripped = &filtered[0][1..];
                    if filtered.iter().all(|k| k.len() > 1 && k[1..] == *stripped) {
                        return Ok(Some(filtered.into_iter().next().unwrap()));
                    }
                }
                self.ambiguous(name, filtered)
            }
        }
    }

    /// `lookup_key` plus the leaf fetch.
    pub fn lookup_symbol(
        &self,
        name: &str,
        require_unique: bool,
        filter: Option<Filter<T>>,
    ) -> Result<Option<(ScopePath, T)>, Error> {
        match self.lookup_key(name, require_unique, filter)? {
            Some(key) => {
                let leaf = self
                    .leaf_at(&key)
                    .ok_or_else(|| Error::UnknownSymbol(name.to_string()))?;
                Ok(Some((key, leaf)))
            }
            None => Ok(None),
        }
    }

    fn leaf_at(&self, path: &[String]) -> Option<T> {
        let root = self.root.borrow();
        let mut full = self.prefix.clone();
        full.extend(path.iter().cloned());
        lookup_node(&root, &full)?.as_leaf().cloned()
    }

    fn unknown<U>(&self, name: &str) -> Result<Option<U>, Error> {
        if self.opts.strict_unknown {
            Err(Error::UnknownSymbol(name.to_string()))
        } else {
            Ok(None)
        }
    }

    fn ambiguous<U>(
        &self,
        name: &str,
        candidates: Vec<ScopePath>,
    ) -> Result<Option<U>, Error> {
        if self.opts.strict_ambiguous {
            Err(Error::AmbiguousSymbol {
                name: name.to_string(),
                candidates,
            })
        } else {
            Ok(None)
        }
    }

    /// The shortest trailing sub-path of `key` that still names its symbol
    /// uniquely. Fails with `AmbiguousSymbol` when even the full key is
    /// shared, and with `UnknownSymbol` when the key matches nothing.
    pub fn minimal_unique_subkey(&self, key: &str) -> Result<ScopePath, Error> {
        let parts = self.split(key);
        for depth in 1..=parts.len() {
            let sub = &parts[parts.len() - depth..];
            let matches = self.scoped_name_matches_path(sub);
            match matches.len() {
                0 => return Err(Error::UnknownSymbol(key.to_string())),
                1 => return Ok(sub.to_vec()),
                _ => continue,
            }
        }
        Err(Error::AmbiguousSymbol {
            name: key.to_string(),
            candidates: self.scoped_name_matches_path(&parts),
        })
    }

    /// Keys whose leaf name matches `re` starting at its first character.
    /// Scope components are not searched.
    pub fn search(&self, re: &Regex) -> Vec<ScopePath> {
        self.keys(None)
            .into_iter()
            .filter(|k| {
                k.last()
                    .and_then(|leaf| re.find(leaf))
                    .map_or(false, |m| m.start() == 0)
            })
            .collect()
    }

    fn apply_supplement(&self) {
        let supp = match self.supplement.borrow_mut().take() {
            Some(s) => s,
            None => return,
        };
        // The pre-supplement index must exist first: supplementary names
        // are only added to it when they do not shadow an existing name.
        self.build_index();

        let produced = (supp.producer)();
        let mut known: HashMap<u64, ScopePath> = HashMap::new();
        for (path, leaf) in self.raw_items() {
            if let Some(addr) = (supp.address_of)(&leaf) {
                known.entry(addr).or_insert(path);
            }
        }

        let mut accepted: ScopeMap<T> = ScopeMap::new();
        let mut backfills: Vec<(ScopePath, u64)> = Vec::new();
        for (scope_name, node) in produced {
            match node {
                ScopeNode::Scope(members) => {
                    let mut kept = ScopeMap::new();
                    for (name, member) in members {
                        match member {
                            ScopeNode::Leaf(leaf) => {
                                match (supp.address_of)(&leaf).and_then(|a| known.get(&a)) {
                                    Some(existing) => {
                                        if let Some(size) = (supp.size_of)(&leaf) {
                                            backfills.push((existing.clone(), size));
                                        }
                                    }
                                    None => {
                                        kept.insert(name, ScopeNode::Leaf(leaf));
                                    }
                                }
                            }
                            nested @ ScopeNode::Scope(_) => {
                                kept.insert(name, nested);
                            }
                        }
                    }
                    if !kept.is_empty() {
                        accepted.insert(scope_name, ScopeNode::Scope(kept));
                    }
                }
                ScopeNode::Leaf(leaf) => {
                    match (supp.address_of)(&leaf).and_then(|a| known.get(&a)) {
                        Some(existing) => {
                            if let Some(size) = (supp.size_of)(&leaf) {
                                backfills.push((existing.clone(), size));
                            }
                        }
                        None => {
                            accepted.insert(scope_name, ScopeNode::Leaf(leaf));
                        }
                    }
                }
            }
        }

        {
            let mut root = self.root.borrow_mut();
            for (path, size) in backfills {
                let mut full = self.prefix.clone();
                full.extend(path);
                if let Some(ScopeNode::Leaf(leaf)) = lookup_node_mut(&mut root, &full) {
                    if (supp.size_of)(leaf).is_none() {
                        (supp.backfill_size)(leaf, size);
                    }
                }
            }
            let target = if self.prefix.is_empty() {
                Some(&mut *root)
            } else {
                match lookup_node_mut(&mut root, &self.prefix) {
                    Some(ScopeNode::Scope(m)) => Some(m),
                    _ => None,
                }
            };
            if let Some(target) = target {
                for (name, node) in accepted {
                    target.insert(name, node);
                }
            }
        }

        // Extend the index with names not already present; a supplementary
        // symbol never shadows an existing name.
        let fresh = self.all_items();
        let mut index = self.index.borrow_mut();
        if let Some(index) = index.as_mut() {
            for (path, _) in fresh {
                if let Some(last) = path.last() {
                    if !index.contains_key(last) {
                        index.entry(last.clone()).or_default().push(path);
                    }
                }
            }
        }
    }
}

fn lookup_node<'a, T>(map: &'a ScopeMap<T>, path: &[String]) -> Option<&'a ScopeNode<T>> {
    let (first, rest) = path.split_first()?;
    let mut node = map.get(first)?;
    for comp in rest {
        node = node.as_scope()?.get(comp)?;
    }
    Some(node)
}

fn lookup_node_mut<'a, T>(
    map: &'a mut ScopeMap<T>,
    path: &[String],
) -> Option<&'a mut ScopeNode<T>> {
    let (first, rest) = path.split_first()?;
    let mut node = map.get_mut(first)?;
    for comp in rest {
        node = match node {
            ScopeNode::Scope(m) => m.get_mut(comp)?,
            ScopeNode::Leaf(_) => return None,
        };
    }
    Some(node)
}

fn collect_items<T: Clone>(
    scope: &ScopeMap<T>,
    ignore_globals: bool,
    path: &mut ScopePath,
    out: &mut Vec<(ScopePath, T)>,
) {
    for (name, node) in scope {
        if ignore_globals && name == GLOBALS_SCOPE {
            continue;
        }
        path.push(name.clone());
        match node {
            ScopeNode::Leaf(v) => out.push((path.clone(), v.clone())),
            ScopeNode::Scope(m) => collect_items(m, ignore_globals, path, out),
        }
        path.pop();
    }
}
