//! Declarative filters.
//!
//! A [`Filter`] carries at most one [`Condition`] on one column plus the
//! sort/limit/offset attributes. On the wire a filter is a flat object
//! (`column`, `value`, `valueFrom`, `valueTo`, `like`, `notlike`, `regex`,
//! `sort`, `direction`, `limit`, `offset`, `toUnixTime`); the conversion
//! keeps the highest-precedence condition when several are populated.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::DbError;
use crate::value::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "ASC")]
    Asc,
    #[serde(alias = "DESC")]
    Desc,
}

impl SortDirection {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Condition kinds, listed in precedence order.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(Value),
    Like(String),
    NotLike(String),
    Regex(String),
    Range {
        from: Option<Value>,
        to: Option<Value>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FilterSpec", into = "FilterSpec")]
pub struct Filter {
    pub column: Option<String>,
    pub condition: Option<Condition>,
    pub sort: Option<String>,
    pub direction: Option<SortDirection>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub to_unix_time: bool,
}

impl Filter {
    /// A filter constraining `column`; chain a condition method next.
    pub fn on(column: impl Into<String>) -> Self {
        Self {
            column: Some(column.into()),
            ..Self::default()
        }
    }

    pub fn equals(mut self, value: impl Into<Value>) -> Self {
        self.condition = Some(Condition::Equals(value.into()));
        self
    }

    pub fn like(mut self, pattern: impl Into<String>) -> Self {
        self.condition = Some(Condition::Like(pattern.into()));
        self
    }

    pub fn not_like(mut self, pattern: impl Into<String>) -> Self {
        self.condition = Some(Condition::NotLike(pattern.into()));
        self
    }

    pub fn regex(mut self, pattern: impl Into<String>) -> Self {
        self.condition = Some(Condition::Regex(pattern.into()));
        self
    }

    pub fn between(mut self, from: impl Into<Value>, to: impl Into<Value>) -> Self {
        self.condition = Some(Condition::Range {
            from: Some(from.into()),
            to: Some(to.into()),
        });
        self
    }

    pub fn at_least(mut self, from: impl Into<Value>) -> Self {
        self.condition = Some(Condition::Range {
            from: Some(from.into()),
            to: None,
        });
        self
    }

    pub fn at_most(mut self, to: impl Into<Value>) -> Self {
        self.condition = Some(Condition::Range {
            from: None,
            to: Some(to.into()),
        });
        self
    }

    pub fn sort_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some(column.into());
        self.direction = Some(direction);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn unix_time(mut self) -> Self {
        self.to_unix_time = true;
        self
    }

    /// A condition needs a column to apply to.
    pub fn validate(&self) -> Result<(), DbError> {
        if self.condition.is_some() && self.column.as_deref().is_none_or(|c| c.trim().is_empty()) {
            return Err(DbError::validation("filter condition is missing its column"));
        }
        Ok(())
    }
}

/// Flat wire form of a filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FilterSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value_from: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value_to: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    like: Option<String>,
    #[serde(alias = "notLike", skip_serializing_if = "Option::is_none")]
    notlike: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    regex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    direction: Option<SortDirection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<u64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    to_unix_time: bool,
}

impl TryFrom<FilterSpec> for Filter {
    type Error = DbError;

    fn try_from(spec: FilterSpec) -> Result<Self, Self::Error> {
        // JSON null deserializes to None, so an explicit `"value": null` is no condition.
        let groups = [
            spec.value.is_some(),
            spec.like.is_some(),
            spec.notlike.is_some(),
            spec.regex.is_some(),
            spec.value_from.is_some() || spec.value_to.is_some(),
        ];
        if groups.iter().filter(|set| **set).count() > 1 {
            tracing::warn!(
                column = spec.column.as_deref().unwrap_or_default(),
                "filter sets several conditions; keeping the highest-precedence one"
            );
        }
        let condition = if let Some(value) = spec.value {
            Some(Condition::Equals(value))
        } else if let Some(pattern) = spec.like {
            Some(Condition::Like(pattern))
        } else if let Some(pattern) = spec.notlike {
            Some(Condition::NotLike(pattern))
        } else if let Some(pattern) = spec.regex {
            Some(Condition::Regex(pattern))
        } else if spec.value_from.is_some() || spec.value_to.is_some() {
            Some(Condition::Range {
                from: spec.value_from,
                to: spec.value_to,
            })
        } else {
            None
        };
        let filter = Self {
            column: spec.column,
            condition,
            sort: spec.sort,
            direction: spec.direction,
            limit: spec.limit,
            offset: spec.offset,
            to_unix_time: spec.to_unix_time,
        };
        filter.validate()?;
        Ok(filter)
    }
}

impl From<Filter> for FilterSpec {
    fn from(filter: Filter) -> Self {
        let mut spec = Self {
            column: filter.column,
            sort: filter.sort,
            direction: filter.direction,
            limit: filter.limit,
            offset: filter.offset,
            to_unix_time: filter.to_unix_time,
            ..Self::default()
        };
        match filter.condition {
            Some(Condition::Equals(value)) => spec.value = Some(value),
            Some(Condition::Like(pattern)) => spec.like = Some(pattern),
            Some(Condition::NotLike(pattern)) => spec.notlike = Some(pattern),
            Some(Condition::Regex(pattern)) => spec.regex = Some(pattern),
            Some(Condition::Range { from, to }) => {
                spec.value_from = from;
                spec.value_to = to;
            }
            None => {}
        }
        spec
    }
}

/// One filter or an ordered list of them; AND-combined when compiled.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Filters(pub Vec<Filter>);

impl Filters {
    pub fn as_slice(&self) -> &[Filter] {
        &self.0
    }
}

impl From<Filter> for Filters {
    fn from(filter: Filter) -> Self {
        Self(vec![filter])
    }
}

impl From<Vec<Filter>> for Filters {
    fn from(filters: Vec<Filter>) -> Self {
        Self(filters)
    }
}

/// Accepts one filter object, a list of them, or null. The JSON shape picks
/// the form so a malformed filter reports its own validation error.
impl<'de> Deserialize<'de> for Filters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let filters = match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Null => Vec::new(),
            list @ serde_json::Value::Array(_) => {
                serde_json::from_value(list).map_err(D::Error::custom)?
            }
            one => vec![serde_json::from_value(one).map_err(D::Error::custom)?],
        };
        Ok(Self(filters))
    }
}
