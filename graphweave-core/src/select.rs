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

//! SELECT items, aggregators, and HAVING conditions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Aggregation functions supported in SELECT and HAVING.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Aggregator {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Sample,
}

impl fmt::Display for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Aggregator::Count => "COUNT",
            Aggregator::Sum => "SUM",
            Aggregator::Avg => "AVG",
            Aggregator::Min => "MIN",
            Aggregator::Max => "MAX",
            Aggregator::Sample => "SAMPLE",
        };
        f.write_str(s)
    }
}

impl FromStr for Aggregator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "COUNT" => Ok(Aggregator::Count),
            "SUM" => Ok(Aggregator::Sum),
            "AVG" => Ok(Aggregator::Avg),
            "MIN" => Ok(Aggregator::Min),
            "MAX" => Ok(Aggregator::Max),
            "SAMPLE" => Ok(Aggregator::Sample),
            other => Err(format!("invalid aggregator: {other}")),
        }
    }
}

/// One entry of the SELECT list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectItem {
    pub name: String,
    /// Semantic label of the selected variable; empty when unknown.
    #[serde(default)]
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregator: Option<Aggregator>,
}

impl SelectItem {
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            aggregator: None,
        }
    }

    pub fn aggregated(mut self, aggregator: Aggregator) -> Self {
        self.aggregator = Some(aggregator);
        self
    }
}

/// Comparison operators for HAVING conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Inclusive range: needs both `value` and `value_end`.
    Range,
}

impl Comparison {
    fn symbol(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
            Comparison::Range => "range",
        }
    }
}

/// A HAVING condition over an aggregated variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HavingCondition {
    pub aggregator: Aggregator,
    pub variable: String,
    pub operator: Comparison,
    pub value: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_end: Option<i64>,
}

impl HavingCondition {
    /// Render the bare condition; conditions are `&&`-joined by the caller.
    pub fn render(&self) -> String {
        let agg = format!("{}(?{})", self.aggregator, self.variable);
        match (self.operator, self.value_end) {
            (Comparison::Range, Some(end)) => {
                format!("{agg} >= {} && {agg} <= {end}", self.value)
            }
            // Range without an upper bound degenerates to a lower bound.
            (Comparison::Range, None) => format!("{agg} >= {}", self.value),
            (op, _) => format!("{agg} {} {}", op.symbol(), self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregator_roundtrip() {
        assert_eq!("count".parse::<Aggregator>().unwrap(), Aggregator::Count);
        assert_eq!(Aggregator::Sample.to_string(), "SAMPLE");
        assert!("median".parse::<Aggregator>().is_err());
    }

    #[test]
    fn having_renders_range_and_simple() {
        let h = HavingCondition {
            aggregator: Aggregator::Count,
            variable: "detail".into(),
            operator: Comparison::Range,
            value: 2,
            value_end: Some(4),
        };
        assert_eq!(h.render(), "COUNT(?detail) >= 2 && COUNT(?detail) <= 4");

        let h = HavingCondition {
            aggregator: Aggregator::Sum,
            variable: "qty".into(),
            operator: Comparison::Gte,
            value: 3,
            value_end: None,
        };
        assert_eq!(h.render(), "SUM(?qty) >= 3");
    }
}
