//! Hierarchy header resolution.
//!
//! A hierarchy column is identified by its `(main, sub)` header pair, e.g.
//! `TOWER G6` / `Floor-1`. The pair is normalized into a dotted canonical name
//! (`tower_g6.floor_1`), legacy prefixes are rewritten through the alias
//! table, and the name is looked up in the project's precast tree. When the
//! canonical name is absent every alias spelling is tried in turn.

use std::collections::HashMap;

use crate::config::HierarchySettings;
use crate::db::entities::precast;
use crate::sanitize::ltree_path;
use crate::workbook::ColumnHeader;

/// Trims, lowercases and turns whitespace and hyphens into single
/// underscores.
pub fn normalize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        if ch.is_whitespace() || ch == '-' || ch == '_' {
            if !out.ends_with('_') {
                out.push('_');
            }
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out
}

/// Groups of interchangeable name prefixes. The first spelling of each group
/// is canonical.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    groups: Vec<Vec<String>>,
}

impl AliasTable {
    pub fn new(groups: Vec<Vec<String>>) -> Self {
        let groups = groups
            .into_iter()
            .map(|group| {
                let mut normalized: Vec<String> = Vec::new();
                for alias in group {
                    let alias = normalize_name(&alias);
                    if !alias.is_empty() && !normalized.contains(&alias) {
                        normalized.push(alias);
                    }
                }
                normalized
            })
            .filter(|group| !group.is_empty())
            .collect();
        Self { groups }
    }

    pub fn from_settings(settings: &HierarchySettings) -> Self {
        Self::new(settings.aliases.clone())
    }

    /// Longest alias that prefixes `label`, with its group.
    fn matching_prefix(&self, label: &str) -> Option<(&[String], &str)> {
        self.groups
            .iter()
            .flat_map(|group| {
                group
                    .iter()
                    .filter(move |alias| label.starts_with(alias.as_str()))
                    .map(move |alias| (group.as_slice(), alias.as_str()))
            })
            .max_by_key(|(_, alias)| alias.len())
    }

    /// Rewrites a known prefix to its canonical spelling.
    pub fn canonical_label(&self, label: &str) -> String {
        match self.matching_prefix(label) {
            Some((group, alias)) => format!("{}{}", group[0], &label[alias.len()..]),
            None => label.to_string(),
        }
    }

    /// Every spelling of `label`, canonical first.
    pub fn label_spellings(&self, label: &str) -> Vec<String> {
        let canonical = self.canonical_label(label);
        match self.matching_prefix(&canonical) {
            Some((group, alias)) => {
                let rest = &canonical[alias.len()..];
                group
                    .iter()
                    .map(|prefix| format!("{}{}", prefix, rest))
                    .collect()
            }
            None => vec![canonical],
        }
    }
}

/// Normalized parts of a header pair, with aliases applied.
fn canonical_parts(aliases: &AliasTable, main: &str, sub: &str) -> Vec<String> {
    [main, sub]
        .into_iter()
        .map(normalize_name)
        .filter(|part| !part.is_empty())
        .map(|part| aliases.canonical_label(&part))
        .collect()
}

/// Canonical dotted name of a header pair.
pub fn canonical_name(aliases: &AliasTable, main: &str, sub: &str) -> String {
    canonical_parts(aliases, main, sub).join(".")
}

/// Ltree-sanitized lookup candidates, canonical first and without
/// duplicates.
pub fn variations(aliases: &AliasTable, main: &str, sub: &str) -> Vec<String> {
    let mut combos: Vec<String> = vec![String::new()];
    for part in canonical_parts(aliases, main, sub) {
        let spellings = aliases.label_spellings(&part);
        combos = combos
            .iter()
            .flat_map(|prefix| {
                spellings.iter().map(move |spelling| {
                    if prefix.is_empty() {
                        spelling.clone()
                    } else {
                        format!("{}.{}", prefix, spelling)
                    }
                })
            })
            .collect();
    }

    let mut out: Vec<String> = Vec::with_capacity(combos.len());
    for combo in combos {
        let sanitized = ltree_path(&combo);
        if !sanitized.is_empty() && !out.contains(&sanitized) {
            out.push(sanitized);
        }
    }
    out
}

/// Snapshot of a project's precast tree keyed by stored path.
#[derive(Debug, Clone, Default)]
pub struct PrecastIndex {
    by_path: HashMap<String, precast::Model>,
}

impl PrecastIndex {
    pub fn new(nodes: Vec<precast::Model>) -> Self {
        let mut by_path = HashMap::with_capacity(nodes.len());
        for node in nodes {
            if let Some(previous) = by_path.insert(node.path.clone(), node) {
                log::warn!(
                    "Duplicate precast path '{}', keeping the later node",
                    previous.path
                );
            }
        }
        Self { by_path }
    }

    pub fn get(&self, path: &str) -> Option<&precast::Model> {
        self.by_path.get(path)
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Nodes with a real parent: the leaves a hierarchy column addresses.
    pub fn placement_count(&self) -> usize {
        self.by_path
            .values()
            .filter(|node| node.real_parent().is_some())
            .count()
    }
}

/// Precast node matched by a header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHierarchy {
    pub hierarchy_id: i32,
    pub path: String,
    /// Stored name, not the spreadsheet spelling.
    pub naming_convention: String,
    pub parent_id: Option<i32>,
}

/// Resolves header pairs against a precast snapshot.
#[derive(Debug, Clone, Copy)]
pub struct HierarchyResolver<'a> {
    aliases: &'a AliasTable,
    index: &'a PrecastIndex,
}

impl<'a> HierarchyResolver<'a> {
    pub fn new(aliases: &'a AliasTable, index: &'a PrecastIndex) -> Self {
        Self { aliases, index }
    }

    /// Returns the matched node, or every candidate tried.
    pub fn resolve(&self, main: &str, sub: &str) -> Result<ResolvedHierarchy, Vec<String>> {
        let candidates = variations(self.aliases, main, sub);
        for candidate in &candidates {
            if let Some(node) = self.index.get(candidate) {
                return Ok(ResolvedHierarchy {
                    hierarchy_id: node.id,
                    path: node.path.clone(),
                    naming_convention: node.naming_convention.clone(),
                    parent_id: node.real_parent(),
                });
            }
        }
        Err(candidates)
    }

    pub fn resolve_header(&self, header: &ColumnHeader) -> Result<ResolvedHierarchy, Vec<String>> {
        self.resolve(&header.main, &header.sub)
    }
}
