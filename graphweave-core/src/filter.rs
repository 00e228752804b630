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

//! Filter expressions

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A single filter condition attached to the query.
///
/// With a function name the args are wrapped as `function(arg, arg, ...)`;
/// without one the args already form a raw boolean expression and are
/// joined with spaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterExpr {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    pub args: Vec<String>,
}

impl FilterExpr {
    pub fn call(function: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            function: Some(function.into()),
            args,
        }
    }

    pub fn raw(args: Vec<String>) -> Self {
        Self {
            function: None,
            args,
        }
    }

    /// Case-insensitive regex match on a variable, the usual fallback when
    /// entity resolution finds no URI.
    pub fn regex_match(variable: &str, pattern: &str) -> Self {
        Self::call(
            "REGEX",
            vec![
                format!("?{variable}"),
                format!("\"{pattern}\""),
                "\"i\"".to_string(),
            ],
        )
    }

    /// Render the bare expression (without the enclosing `FILTER (...)`).
    pub fn render(&self) -> String {
        match &self.function {
            Some(f) => format!("{f}({})", self.args.join(", ")),
            None => self.args.join(" "),
        }
    }

    /// Variable names referenced anywhere in the argument strings.
    pub fn variables(&self) -> Vec<String> {
        let re = var_regex();
        let mut out = Vec::new();
        for arg in &self.args {
            for cap in re.captures_iter(arg) {
                let name = cap[1].to_string();
                if !out.contains(&name) {
                    out.push(name);
                }
            }
        }
        out
    }

    /// Rename every `?old` occurrence in the argument strings.
    pub fn rename_variable(&mut self, old: &str, new: &str) {
        let needle = format!("?{old}");
        let replacement = format!("?{new}");
        for arg in &mut self.args {
            if arg == &needle {
                *arg = replacement.clone();
            }
        }
    }
}

fn var_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\?(\w+)").expect("static regex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_call_and_raw() {
        let f = FilterExpr::regex_match("name", "mozart");
        assert_eq!(f.render(), "REGEX(?name, \"mozart\", \"i\")");

        let r = FilterExpr::raw(vec!["?start".into(), ">=".into(), "1800".into()]);
        assert_eq!(r.render(), "?start >= 1800");
    }

    #[test]
    fn extracts_variables_from_args() {
        let r = FilterExpr::raw(vec!["?start".into(), ">=".into(), "?end".into()]);
        assert_eq!(r.variables(), vec!["start".to_string(), "end".to_string()]);
    }

    #[test]
    fn rename_only_touches_exact_tokens() {
        let mut f = FilterExpr::raw(vec!["?start".into(), ">=".into(), "1800".into()]);
        f.rename_variable("start", "begin");
        assert_eq!(f.render(), "?begin >= 1800");
    }
}
