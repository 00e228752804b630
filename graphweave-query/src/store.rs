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

//! Session store
//!
//! Containers live here between calls, keyed by id. Sessions are fully
//! independent; the store only guards the map itself. Eviction and TTL
//! policy belong to the embedding service.

use crate::container::QueryContainer;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Shared in-memory container store.
#[derive(Debug, Default)]
pub struct ContainerStore {
    containers: RwLock<HashMap<String, QueryContainer>>,
}

impl ContainerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, container: QueryContainer) {
        self.containers
            .write()
            .insert(container.id.clone(), container);
    }

    pub fn get(&self, id: &str) -> Option<QueryContainer> {
        self.containers.read().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<QueryContainer> {
        self.containers.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.containers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.read().is_empty()
    }
}
