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

//! Engine configuration
//!
//! Endpoint location, timeouts, the prefix table, and the URI namespaces
//! the engine treats as belonging to the target knowledge base. Defaults
//! describe the DOREMUS music knowledge graph; everything is overridable
//! from a TOML file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Prefix table used to expand and contract URIs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrefixTable {
    /// prefix -> namespace base, ordered for deterministic rendering.
    pub prefixes: BTreeMap<String, String>,
}

impl PrefixTable {
    /// Expand `prefix:Local` to a full URI; already-full URIs pass through.
    pub fn expand(&self, uri: &str) -> String {
        let uri = uri.trim_start_matches('<').trim_end_matches('>');
        if uri.starts_with("http://") || uri.starts_with("https://") {
            return uri.to_string();
        }
        if let Some((prefix, local)) = uri.split_once(':') {
            if let Some(base) = self.prefixes.get(prefix) {
                return format!("{base}{local}");
            }
        }
        uri.to_string()
    }

    /// Contract a full URI to `prefix:Local` when a known namespace matches.
    pub fn contract(&self, uri: &str) -> String {
        for (prefix, base) in &self.prefixes {
            if let Some(local) = uri.strip_prefix(base.as_str()) {
                return format!("{prefix}:{local}");
            }
        }
        uri.to_string()
    }

    /// `PREFIX` declarations, one per line, for prepending to query text.
    pub fn declarations(&self) -> String {
        let mut out = String::new();
        for (prefix, base) in &self.prefixes {
            out.push_str(&format!("PREFIX {prefix}: <{base}>\n"));
        }
        out
    }
}

/// Engine-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Query endpoint URL.
    pub endpoint: String,

    /// Timeout for ordinary executions, in seconds.
    pub request_timeout_secs: u64,

    /// Timeout for dry-run validations, in seconds. Kept short so a bad
    /// module fails fast instead of stalling the session.
    pub dry_run_timeout_secs: u64,

    /// Prefix declarations prepended to every executed query.
    pub prefix_table: PrefixTable,

    /// Namespaces that entity URIs from the target knowledge base may live
    /// in. A URI-shaped value outside all of these fails the sanity check.
    pub entity_uri_prefixes: Vec<String>,

    /// Namespaces preferred when pruning equivalent-URI expansions.
    pub preferred_expansion_prefixes: Vec<String>,

    /// Cap on equivalent URIs kept per VALUES clause.
    pub max_values_expansion: usize,

    /// Relation used for quantity-equality triples appended by the
    /// component-constraint orchestrator; None disables counted constraints.
    pub quantity_relation: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut prefixes = BTreeMap::new();
        for (p, base) in [
            ("mus", "http://data.doremus.org/ontology#"),
            ("ecrm", "http://erlangen-crm.org/current/"),
            ("efrbroo", "http://erlangen-crm.org/efrbroo/"),
            ("skos", "http://www.w3.org/2004/02/skos/core#"),
            ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
            ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
            ("foaf", "http://xmlns.com/foaf/0.1/"),
            ("schema", "http://schema.org/"),
            ("time", "http://www.w3.org/2006/time#"),
            ("geonames", "http://www.geonames.org/ontology#"),
            ("xsd", "http://www.w3.org/2001/XMLSchema#"),
        ] {
            prefixes.insert(p.to_string(), base.to_string());
        }

        Self {
            endpoint: "https://data.doremus.org/sparql/".to_string(),
            request_timeout_secs: 60,
            dry_run_timeout_secs: 15,
            prefix_table: PrefixTable { prefixes },
            entity_uri_prefixes: vec![
                "http://data.doremus.org/".to_string(),
                "http://www.mimo-db.eu/".to_string(),
                "http://sws.geonames.org/".to_string(),
            ],
            preferred_expansion_prefixes: vec![
                "http://data.doremus.org/vocabulary/iaml/".to_string(),
            ],
            max_values_expansion: 4,
            quantity_relation: Some("mus:U30_foresees_quantity_of_mop".to_string()),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// any missing field.
    pub fn from_toml_file(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Whether a URI-shaped value claims to be an entity of the target
    /// knowledge base. Vocabulary URIs outside the configured namespaces
    /// (e.g. plain RDF schema terms) are not subject to the sanity check.
    pub fn looks_like_entity_uri(&self, uri: &str) -> bool {
        (uri.starts_with("http://") || uri.starts_with("https://"))
            && self.entity_uri_prefixes.iter().any(|p| uri.starts_with(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_and_contract_roundtrip() {
        let cfg = EngineConfig::default();
        let full = cfg.prefix_table.expand("mus:U12_has_genre");
        assert_eq!(full, "http://data.doremus.org/ontology#U12_has_genre");
        assert_eq!(cfg.prefix_table.contract(&full), "mus:U12_has_genre");
    }

    #[test]
    fn unknown_prefix_passes_through() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.prefix_table.expand("unknown:Thing"), "unknown:Thing");
    }

    #[test]
    fn entity_uri_detection_respects_namespaces() {
        let cfg = EngineConfig::default();
        assert!(cfg.looks_like_entity_uri("http://data.doremus.org/artist/abc"));
        assert!(!cfg.looks_like_entity_uri("http://www.w3.org/2000/01/rdf-schema#label"));
        assert!(!cfg.looks_like_entity_uri("mus:U12_has_genre"));
    }

    #[test]
    fn toml_overrides_merge_with_defaults() {
        let text = "endpoint = \"http://localhost:8890/sparql\"\nmax_values_expansion = 2\n";
        let cfg: EngineConfig = toml::from_str(text).unwrap();
        assert_eq!(cfg.endpoint, "http://localhost:8890/sparql");
        assert_eq!(cfg.max_values_expansion, 2);
        assert_eq!(cfg.dry_run_timeout_secs, 15);
    }
}
