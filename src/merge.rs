//! Merging symbol trees from multiple debug-info sources.
//!
//! Firmware images are debugged against a base ROM plus zero or more patch
//! images. Each source contributes a symbol tree; later sources win name
//! collisions, and a provenance tree records which source each surviving
//! leaf came from so per-symbol queries can be routed back to the right
//! reader.

use std::collections::BTreeMap;

use crate::error::Error;
use crate::scope::{ScopeMap, ScopeNode};

/// Records, per leaf path, the index of the source a symbol came from.
///
/// Leaves contributed by the first source are not recorded; `source_index`
/// answers 0 for them. A provenance with no entries at all is "trivial":
/// everything resolves against source 0.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Provenance {
    root: BTreeMap<String, ProvNode>,
}

#[derive(Clone, Debug, PartialEq)]
enum ProvNode {
    Scope(BTreeMap<String, ProvNode>),
    Leaf(u32),
}

impl Provenance {
    pub fn source_index(&self, path: &[String]) -> u32 {
        let mut scope = &self.root;
        let Some((last, rest)) = path.split_last() else {
            return 0;
        };
        for comp in rest {
            match scope.get(comp) {
                Some(ProvNode::Scope(m)) => scope = m,
                _ => return 0,
            }
        }
        match scope.get(last) {
            Some(ProvNode::Leaf(i)) => *i,
            _ => 0,
        }
    }

    pub fn is_trivial(&self) -> bool {
        self.root.is_empty()
    }

    fn record(&mut self, path: &[String], source: u32) {
        let mut scope = &mut self.root;
        let (last, rest) = match path.split_last() {
            Some(p) => p,
            None => return,
        };
        for comp in rest {
            let node = scope
                .entry(comp.clone())
                .or_insert_with(|| ProvNode::Scope(BTreeMap::new()));
            if matches!(node, ProvNode::Leaf(_)) {
                // A whole-scope replacement supersedes an old leaf record.
                *node = ProvNode::Scope(BTreeMap::new());
            }
            scope = match node {
                ProvNode::Scope(m) => m,
                ProvNode::Leaf(_) => unreachable!(),
            };
        }
        scope.insert(last.clone(), ProvNode::Leaf(source));
    }
}

/// A merged symbol tree plus the provenance of its leaves.
#[derive(Clone, Debug)]
pub struct Merged<T> {
    pub map: ScopeMap<T>,
    pub provenance: Provenance,
}

/// Folds `sources` together in order, later sources replacing earlier
/// entries of the same path. `name_filter`, if given, is applied to leaf
/// names from every source.
pub fn merge<T: Clone>(
    sources: &[&ScopeMap<T>],
    name_filter: Option<&dyn Fn(&str) -> bool>,
) -> Result<Merged<T>, Error> {
    let mut merged = Merged {
        map: ScopeMap::new(),
        provenance: Provenance::default(),
    };
    for (i, source) in sources.iter().enumerate() {
        let source_index = if i == 0 { None } else { Some(i as u32) };
        let replaced = combine_level(
            &mut merged.map,
            source,
            &mut Vec::new(),
            source_index,
            &mut merged.provenance,
            name_filter,
        )?;
        if let Some(idx) = source_index {
            tracing::debug!(source = idx, replaced, "merged symbol source");
        }
    }
    Ok(merged)
}

fn combine_level<T: Clone>(
    dst: &mut ScopeMap<T>,
    src: &ScopeMap<T>,
    path: &mut Vec<String>,
    source_index: Option<u32>,
    provenance: &mut Provenance,
    name_filter: Option<&dyn Fn(&str) -> bool>,
) -> Result<usize, Error> {
    let mut replaced = 0;
    for (name, node) in src {
        match node {
            ScopeNode::Leaf(value) => {
                if let Some(f) = name_filter {
                    if !f(name) {
                        continue;
                    }
                }
                match dst.insert(name.clone(), ScopeNode::Leaf(value.clone())) {
                    Some(ScopeNode::Scope(_)) => {
                        return Err(Error::StructuralMerge(format!(
                            "\"{}\" is a scope in one source and a symbol in another",
                            name
                        )))
                    }
                    Some(ScopeNode::Leaf(_)) => replaced += 1,
                    None => {}
                }
                if let Some(idx) = source_index {
                    path.push(name.clone());
                    provenance.record(path, idx);
                    path.pop();
                }
            }
            ScopeNode::Scope(sub) => {
                let entry = dst
                    .entry(name.clone())
                    .or_insert_with(|| ScopeNode::Scope(ScopeMap::new()));
                let dst_sub = match entry {
                    ScopeNode::Scope(m) => m,
                    ScopeNode::Leaf(_) => {
                        return Err(Error::StructuralMerge(format!(
                            "\"{}\" is a symbol in one source and a scope in another",
                            name
                        )))
                    }
                };
                path.push(name.clone());
                replaced += combine_level(
                    dst_sub,
                    sub,
                    path,
                    source_index,
                    provenance,
                    name_filter,
                )?;
                path.pop();
            }
        }
    }
    Ok(replaced)
}
