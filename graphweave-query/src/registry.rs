// Copyright 2025 Graphweave Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Variable registry
//!
//! Tracks every live variable name of a container together with its
//! semantic label (the class URI it stands for) and a reference count
//! shared among all aliases of the same label. Disambiguated aliases
//! use a `name_N` suffix minted from that shared count.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub label: String,
    pub count: u32,
}

/// Variable name to semantic-label bookkeeping for one container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableRegistry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn label_of(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|entry| entry.label.as_str())
    }

    pub fn count_of(&self, name: &str) -> Option<u32> {
        self.entries.get(name).map(|entry| entry.count)
    }

    /// First registered name carrying the given semantic label.
    pub fn name_for_label(&self, label: &str) -> Option<&str> {
        if label.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|(_, entry)| entry.label == label)
            .map(|(name, _)| name.as_str())
    }

    /// Every alias registered for the given semantic label, in order.
    pub fn aliases_for_label(&self, label: &str) -> Vec<String> {
        if label.is_empty() {
            return Vec::new();
        }
        self.entries
            .iter()
            .filter(|(_, entry)| entry.label == label)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Registers a new name. Aliases sharing the label keep one shared
    /// reference count: the new entry copies it and every holder is
    /// bumped together.
    pub fn register(&mut self, name: &str, label: &str) {
        let shared = self
            .entries
            .values()
            .filter(|entry| !label.is_empty() && entry.label == label)
            .map(|entry| entry.count)
            .max()
            .unwrap_or(0);
        self.bump_label(label);
        self.entries.insert(
            name.to_owned(),
            RegistryEntry {
                label: label.to_owned(),
                count: shared + 1,
            },
        );
    }

    /// Increments the shared count of every alias carrying the label.
    pub fn bump_label(&mut self, label: &str) {
        if label.is_empty() {
            return;
        }
        for entry in self.entries.values_mut() {
            if entry.label == label {
                entry.count += 1;
            }
        }
    }

    /// `castingDetail_1` -> `castingDetail`.
    pub fn base_name(name: &str) -> &str {
        match name.rfind('_') {
            Some(pos) if name[pos + 1..].chars().all(|c| c.is_ascii_digit())
                && pos + 1 < name.len() =>
            {
                &name[..pos]
            }
            _ => name,
        }
    }

    /// `base` if unused, else the first free `base_N`.
    pub fn next_free_name(&self, base: &str) -> String {
        if !self.contains(base) {
            return base.to_owned();
        }
        let mut i = 1u32;
        loop {
            let candidate = format!("{base}_{i}");
            if !self.contains(&candidate) {
                return candidate;
            }
            i += 1;
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
