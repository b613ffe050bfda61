//! The canonical BT store: one invoice as a tree of business groups holding
//! business terms.
//!
//! Groups live in an arena and are addressed by [`GroupId`]; parents and
//! children refer to each other by index only. Repeatable groups keep their
//! insertion order, which is the extraction order for invoice lines.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use super::error::BelegError;
use super::registry::{BtRegistry, ROOT_GROUP};
use super::value::BtValue;

/// Index of a group in an [`InvoiceDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupId(usize);

impl GroupId {
    /// The invoice root (BG-0).
    pub const ROOT: GroupId = GroupId(0);

    pub fn index(&self) -> usize {
        self.0
    }
}

/// One business term occurrence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusinessTerm {
    pub code: String,
    pub value: BtValue,
    /// Where the value came from in the raw extraction.
    pub source_path: Option<String>,
    /// Extraction confidence in `0.0..=1.0`; cleared once a rule rewrites
    /// the value.
    pub confidence: Option<f64>,
    pub group: GroupId,
    /// Id of the rule that last wrote this value, if any.
    pub written_by: Option<String>,
}

/// A business group instance.
#[derive(Debug, Clone, Serialize)]
pub struct Group {
    code: String,
    parent: Option<GroupId>,
    repeatable: bool,
    terms: BTreeMap<String, BusinessTerm>,
    children: Vec<GroupId>,
}

impl Group {
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn parent(&self) -> Option<GroupId> {
        self.parent
    }

    pub fn terms(&self) -> impl Iterator<Item = &BusinessTerm> {
        self.terms.values()
    }

    pub fn children(&self) -> &[GroupId] {
        &self.children
    }
}

/// Provenance attached to a value entering the store.
#[derive(Debug, Clone, Default)]
pub struct Provenance {
    pub source_path: Option<String>,
    pub confidence: Option<f64>,
    pub written_by: Option<String>,
}

/// The canonical representation of one invoice.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDocument {
    groups: Vec<Group>,
}

impl Default for InvoiceDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl InvoiceDocument {
    /// An empty document holding only the root group.
    pub fn new() -> Self {
        Self {
            groups: vec![Group {
                code: ROOT_GROUP.to_string(),
                parent: None,
                repeatable: false,
                terms: BTreeMap::new(),
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> GroupId {
        GroupId::ROOT
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(id.0)
    }

    /// Children of `parent` with the given group code, in insertion order.
    pub fn children_of<'a>(
        &'a self,
        parent: GroupId,
        code: &'a str,
    ) -> impl Iterator<Item = GroupId> + 'a {
        self.group(parent)
            .map(|g| g.children.as_slice())
            .unwrap_or(&[])
            .iter()
            .copied()
            .filter(move |id| self.groups[id.0].code == code)
    }

    /// Every instance of `code` anywhere in the document, in insertion order.
    pub fn instances<'a>(&'a self, code: &'a str) -> impl Iterator<Item = GroupId> + 'a {
        self.groups
            .iter()
            .enumerate()
            .filter(move |(_, g)| g.code == code)
            .map(|(i, _)| GroupId(i))
    }

    /// The unique instance of a singular group, if it exists.
    pub fn find_singular(&self, registry: &BtRegistry, code: &str) -> Option<GroupId> {
        registry.group(code)?;
        let chain = registry.group_chain(code);
        let mut current = GroupId::ROOT;
        for step in chain.iter().skip(1) {
            current = self.children_of(current, step).next()?;
        }
        Some(current)
    }

    /// The unique instance of a singular group, created (with any missing
    /// ancestors) if absent.
    pub fn ensure_singular(
        &mut self,
        registry: &BtRegistry,
        code: &str,
    ) -> Result<GroupId, BelegError> {
        if !registry.is_singular_path(code) {
            return Err(BelegError::Store(format!(
                "{code} is repeatable or below a repeatable group"
            )));
        }
        self.ensure_first(registry, code)
    }

    /// The first instance of `code`, following first instances down from
    /// the root and creating whatever is missing on the way.
    pub fn ensure_first(
        &mut self,
        registry: &BtRegistry,
        code: &str,
    ) -> Result<GroupId, BelegError> {
        if registry.group(code).is_none() {
            return Err(BelegError::Store(format!("unknown group {code}")));
        }
        let chain = registry.group_chain(code);
        let mut current = GroupId::ROOT;
        for step in chain.iter().skip(1) {
            let existing = self.children_of(current, step).next();
            current = match existing {
                Some(existing) => existing,
                None => self.push_group(registry, current, step)?,
            };
        }
        Ok(current)
    }

    /// Append a new instance of group `code` under `parent`.
    pub fn push_group(
        &mut self,
        registry: &BtRegistry,
        parent: GroupId,
        code: &str,
    ) -> Result<GroupId, BelegError> {
        let spec = registry
            .group(code)
            .ok_or_else(|| BelegError::Store(format!("unknown group {code}")))?;
        let parent_code = self
            .group(parent)
            .map(|g| g.code.as_str())
            .ok_or_else(|| BelegError::Store(format!("unknown parent group #{}", parent.0)))?;
        if spec.parent.as_deref() != Some(parent_code) {
            return Err(BelegError::Store(format!(
                "{code} cannot be placed under {parent_code}"
            )));
        }
        if let Some(max) = spec.cardinality.max() {
            if self.children_of(parent, code).count() >= max {
                return Err(BelegError::Store(format!(
                    "{code} allows at most {max} occurrence(s)"
                )));
            }
        }

        let id = GroupId(self.groups.len());
        self.groups.push(Group {
            code: code.to_string(),
            parent: Some(parent),
            repeatable: spec.cardinality.is_repeatable(),
            terms: BTreeMap::new(),
            children: Vec::new(),
        });
        self.groups[parent.0].children.push(id);
        Ok(id)
    }

    pub fn get(&self, group: GroupId, code: &str) -> Option<&BusinessTerm> {
        self.group(group)?.terms.get(code)
    }

    pub fn value(&self, group: GroupId, code: &str) -> Option<&BtValue> {
        self.get(group, code).map(|t| &t.value)
    }

    pub fn decimal(&self, group: GroupId, code: &str) -> Option<Decimal> {
        self.value(group, code).and_then(BtValue::as_decimal)
    }

    pub fn text(&self, group: GroupId, code: &str) -> Option<&str> {
        self.value(group, code).and_then(BtValue::as_str)
    }

    /// Look up a term whose group is singular without knowing the group id.
    pub fn singular_term(&self, registry: &BtRegistry, code: &str) -> Option<&BusinessTerm> {
        let spec = registry.term(code)?;
        let group = self.find_singular(registry, &spec.group)?;
        self.get(group, code)
    }

    pub fn singular_value(&self, registry: &BtRegistry, code: &str) -> Option<&BtValue> {
        self.singular_term(registry, code).map(|t| &t.value)
    }

    /// Insert or replace a term, enforcing the registry invariants. Returns
    /// the previous occurrence.
    pub fn insert(
        &mut self,
        registry: &BtRegistry,
        group: GroupId,
        code: &str,
        value: BtValue,
        provenance: Provenance,
    ) -> Result<Option<BusinessTerm>, BelegError> {
        let spec = registry
            .term(code)
            .ok_or_else(|| BelegError::Store(format!("{code} is not in the registry")))?;
        let node = self
            .groups
            .get_mut(group.0)
            .ok_or_else(|| BelegError::Store(format!("unknown group #{}", group.0)))?;
        if node.code != spec.group {
            return Err(BelegError::Store(format!(
                "{code} belongs to {}, not {}",
                spec.group, node.code
            )));
        }
        if !spec.data_type.accepts(&value) {
            return Err(BelegError::Store(format!(
                "{code} expects {:?}, got {value:?}",
                spec.data_type
            )));
        }
        let term = BusinessTerm {
            code: code.to_string(),
            value,
            source_path: provenance.source_path,
            confidence: provenance.confidence,
            group,
            written_by: provenance.written_by,
        };
        Ok(node.terms.insert(code.to_string(), term))
    }

    /// Overwrite the value of a term on behalf of a rule, keeping its
    /// source path. Returns the previous occurrence.
    pub fn rewrite(
        &mut self,
        registry: &BtRegistry,
        group: GroupId,
        code: &str,
        value: BtValue,
        rule_id: &str,
    ) -> Result<Option<BusinessTerm>, BelegError> {
        let source_path = self.get(group, code).and_then(|t| t.source_path.clone());
        self.insert(
            registry,
            group,
            code,
            value,
            Provenance {
                source_path,
                confidence: None,
                written_by: Some(rule_id.to_string()),
            },
        )
    }

    pub fn remove(&mut self, group: GroupId, code: &str) -> Option<BusinessTerm> {
        self.groups.get_mut(group.0)?.terms.remove(code)
    }

    /// Human-readable path of a group, e.g. `BG-4/BG-5` or `BG-25[2]`.
    /// The root renders as an empty string.
    pub fn group_path(&self, id: GroupId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(gid) = current {
            let Some(node) = self.group(gid) else { break };
            let Some(parent) = node.parent else { break };
            if node.repeatable {
                let position = self
                    .children_of(parent, &node.code)
                    .position(|c| c == gid)
                    .unwrap_or(0);
                segments.push(format!("{}[{}]", node.code, position + 1));
            } else {
                segments.push(node.code.clone());
            }
            current = Some(parent);
        }
        segments.reverse();
        segments.join("/")
    }

    /// Path of a term, e.g. `BT-1` or `BG-25[2]/BT-131`.
    pub fn term_path(&self, group: GroupId, code: &str) -> String {
        let prefix = self.group_path(group);
        if prefix.is_empty() {
            code.to_string()
        } else {
            format!("{prefix}/{code}")
        }
    }

    /// Every term in the document, group by group.
    pub fn terms(&self) -> impl Iterator<Item = &BusinessTerm> {
        self.groups.iter().flat_map(|g| g.terms.values())
    }

    /// Path → value view of the whole document; two documents with equal
    /// snapshots carry the same business content.
    pub fn snapshot(&self) -> BTreeMap<String, BtValue> {
        self.terms()
            .map(|t| (self.term_path(t.group, &t.code), t.value.clone()))
            .collect()
    }
}
