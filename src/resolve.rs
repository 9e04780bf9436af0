//! Resolving C-style type declarators against a type table.
//!
//! Callers name types the way they write them in source: `"Foo"`,
//! `"struct bar *"`, `"uint16[8]"`. The base name is looked up with a
//! preference for definitions over forward declarations, then pointer and
//! array suffixes are applied as derived types.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::Error;
use crate::reader::{DebugReader, SymbolRef};
use crate::scope::SymbolTable;
use crate::symbol::TypeSymbol;

/// Bound on alias / struct-prefix retries while resolving a base name.
const MAX_RESOLVE_DEPTH: usize = 16;

#[derive(Debug, PartialEq)]
pub(crate) struct Declarator {
    pub base: String,
    pub pointer_levels: usize,
    /// Array dimensions in application order: innermost (rightmost) first.
    pub dims: Vec<u64>,
}

pub(crate) fn parse_declarator(name: &str) -> Result<Declarator, Error> {
    let mut s = name.trim();
    let mut pointer_levels = 0;
    while let Some(stripped) = s.strip_suffix('*') {
        s = stripped.trim_end();
        pointer_levels += 1;
    }

    static DIM_RE: OnceLock<Regex> = OnceLock::new();
    let re = DIM_RE.get_or_init(|| {
        Regex::new(r"^(.*)\[(0[xX][0-9a-fA-F]+|\d+)\]$").unwrap()
    });

    let mut s = s.to_string();
    let mut dims = Vec::new();
    loop {
        let (rest, dim) = match re.captures(&s) {
            Some(caps) => {
                let dim_str = caps.get(2).unwrap().as_str();
                let dim = if let Some(hex) = dim_str
                    .strip_prefix("0x")
                    .or_else(|| dim_str.strip_prefix("0X"))
                {
                    u64::from_str_radix(hex, 16)
                        .map_err(|_| Error::BadDeclarator(name.to_string()))?
                } else {
                    dim_str
                        .parse()
                        .map_err(|_| Error::BadDeclarator(name.to_string()))?
                };
                (caps.get(1).unwrap().as_str().trim_end().to_string(), dim)
            }
            None => break,
        };
        dims.push(dim);
        s = rest;
    }

    // Pointer-to-array and array-of-pointer spellings are not supported,
    // nor is anything with leftover declarator punctuation.
    if pointer_levels > 0 && !dims.is_empty() {
        return Err(Error::BadDeclarator(name.to_string()));
    }
    if s.contains('*') || s.contains('[') || s.contains(']') || s.is_empty() {
        return Err(Error::BadDeclarator(name.to_string()));
    }

    Ok(Declarator {
        base: s,
        pointer_levels,
        dims,
    })
}

/// Resolves `name` against `table`. `wrap` turns a (path, reference) pair
/// into a type façade bound to the right reader; the session supplies
/// provenance-aware routing, compilation units their own reader.
pub(crate) fn resolve_in<'r, R, W>(
    table: &SymbolTable<SymbolRef>,
    wrap: &W,
    name: &str,
) -> Result<TypeSymbol<'r, R>, Error>
where
    R: DebugReader,
    W: Fn(&[String], SymbolRef) -> TypeSymbol<'r, R>,
{
    let decl = parse_declarator(name)?;
    let mut ty = resolve_base(table, wrap, &decl.base, 0)?;
    for _ in 0..decl.pointer_levels {
        ty = ty.pointer_to()?;
    }
    for n in decl.dims {
        ty = ty.array_of(n)?;
    }
    Ok(ty)
}

fn resolve_base<'r, R, W>(
    table: &SymbolTable<SymbolRef>,
    wrap: &W,
    name: &str,
    depth: usize,
) -> Result<TypeSymbol<'r, R>, Error>
where
    R: DebugReader,
    W: Fn(&[String], SymbolRef) -> TypeSymbol<'r, R>,
{
    if depth >= MAX_RESOLVE_DEPTH {
        return Err(Error::UndefinedType {
            name: name.to_string(),
            declarations: 0,
        });
    }

    // Definitions win; the same type is commonly declared forward in many
    // compilation units but defined in one. Ambiguity between several
    // definitions is tolerated, first match wins.
    let is_definition = |k: &[String], r: &SymbolRef| {
        !wrap(k, *r).is_declaration().unwrap_or(true)
    };
    let found = match table.lookup_symbol(name, false, Some(&is_definition)) {
        Ok(found) => found,
        Err(Error::UnknownSymbol(_)) => None,
        Err(e) => return Err(e),
    };
    if let Some((key, leaf)) = found {
        return Ok(wrap(&key, leaf));
    }

    let decls = table.scoped_name_matches(name);
    if decls.is_empty() {
        // C code spells aggregate types "struct foo"; debug info sometimes
        // stores them that way even when the caller does not.
        if !name.starts_with("struct ") {
            return resolve_base(table, wrap, &format!("struct {}", name), depth + 1);
        }
        return Err(Error::UnknownSymbol(name.to_string()));
    }

    // Only declarations exist here. An opaque typedef can still carry the
    // underlying base type's name; chase it.
    let key = &decls[0];
    if let Ok(crate::scope::Entry::Symbol(leaf)) = table.get_path(key) {
        let ty = wrap(key, leaf);
        if let Some(alias) = ty.base_type_name()? {
            if alias != name {
                return resolve_base(table, wrap, &alias, depth + 1);
            }
        }
    }
    Err(Error::UndefinedType {
        name: name.to_string(),
        declarations: decls.len(),
    })
}
