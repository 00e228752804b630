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

//! HTTP execution adapter
//!
//! Implements the execution port against a SPARQL-protocol endpoint over
//! GET, with `application/sparql-results+json` responses. The adapter
//! prepends the configured prefix declarations and appends a result cap
//! when the query lacks one.

use async_trait::async_trait;
use graphweave_core::{EngineConfig, ExecutionError, ExecutionPort, QueryOutcome};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Execution port backed by a live SPARQL endpoint.
pub struct HttpExecutionPort {
    client: reqwest::Client,
    endpoint: String,
    prefix_declarations: String,
    default_timeout: Duration,
}

impl HttpExecutionPort {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            prefix_declarations: config.prefix_table.declarations(),
            default_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    fn prepare(&self, query: &str, result_cap: usize) -> String {
        let mut prepared = format!("{}\n{}", self.prefix_declarations, query);
        if !prepared.to_ascii_uppercase().contains("LIMIT") {
            prepared.push_str(&format!("\nLIMIT {result_cap}"));
        }
        prepared
    }
}

#[async_trait]
impl ExecutionPort for HttpExecutionPort {
    async fn execute(
        &self,
        query: &str,
        result_cap: usize,
        timeout: Option<Duration>,
    ) -> Result<QueryOutcome, ExecutionError> {
        let prepared = self.prepare(query, result_cap);
        debug!(result_cap, "executing query");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("query", prepared.as_str())])
            .header(reqwest::header::ACCEPT, "application/sparql-results+json")
            .timeout(timeout.unwrap_or(self.default_timeout))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExecutionError::Timeout
                } else {
                    ExecutionError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(ExecutionError::Rejected(format!(
                "endpoint returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ExecutionError::Transport(e.to_string()))?;

        let bindings = body
            .pointer("/results/bindings")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut rows = Vec::with_capacity(bindings.len().min(result_cap));
        for binding in bindings.iter().take(result_cap) {
            let Some(object) = binding.as_object() else {
                continue;
            };
            let mut row = HashMap::new();
            for (key, cell) in object {
                if let Some(value) = cell.pointer("/value").and_then(|v| v.as_str()) {
                    row.insert(key.clone(), value.to_owned());
                }
            }
            rows.push(row);
        }
        debug!(count = rows.len(), "query returned");
        Ok(QueryOutcome {
            count: rows.len(),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphweave_core::EngineConfig;

    #[test]
    fn prepare_appends_cap_only_when_absent() {
        let port = HttpExecutionPort::new(&EngineConfig::default());
        let with_cap = port.prepare("SELECT * WHERE { ?s ?p ?o } LIMIT 5", 1);
        assert!(!with_cap.ends_with("LIMIT 1"));
        let without = port.prepare("SELECT * WHERE { ?s ?p ?o }", 1);
        assert!(without.ends_with("LIMIT 1"));
    }

    #[test]
    fn prepare_prepends_prefix_declarations() {
        let port = HttpExecutionPort::new(&EngineConfig::default());
        let prepared = port.prepare("SELECT * WHERE { ?s ?p ?o }", 1);
        assert!(prepared.starts_with("PREFIX "));
    }
}
