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

//! Decision audit records
//!
//! Every oracle round-trip the engine makes is captured as a
//! [`DecisionRecord`] so that sessions can be replayed and disputed
//! choices inspected after the fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One oracle consultation: the prompts sent, the raw reply, and the
/// index the engine derived from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub system_prompt: String,
    pub user_prompt: String,
    pub reply: String,
    /// Index actually applied, after fallback handling.
    pub chosen_index: usize,
    pub latency_ms: u64,
    pub model: String,
    pub at: DateTime<Utc>,
}

impl DecisionRecord {
    pub fn new(
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        reply: impl Into<String>,
        chosen_index: usize,
        latency_ms: u64,
        model: impl Into<String>,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            reply: reply.into(),
            chosen_index,
            latency_ms,
            model: model.into(),
            at: Utc::now(),
        }
    }
}
