//! Query expression AST.
//!
//! A [`QueryExpression`] is the plain-data result of a builder chain: the
//! selected fields, target object, where clauses, ordering, and paging. The
//! [`Grammar`](super::grammar::Grammar) renders it to query text; nothing
//! else interprets it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use forceorm_core::{ForceError, ForceResult};

use crate::value::Value;

/// A comparison operator of the remote query language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `LIKE`
    Like,
    /// `IN`
    In,
    /// `NOT IN`
    NotIn,
    /// `INCLUDES` (multi-select picklists)
    Includes,
    /// `EXCLUDES` (multi-select picklists)
    Excludes,
}

impl Operator {
    /// The operator as it appears in query text.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "LIKE",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Includes => "INCLUDES",
            Self::Excludes => "EXCLUDES",
        }
    }

    /// Returns `true` for the ordering and equality comparisons.
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }

    /// Returns `true` for the operators that take a set on the right-hand side.
    pub const fn is_set(self) -> bool {
        matches!(self, Self::In | Self::NotIn | Self::Includes | Self::Excludes)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = ForceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_uppercase().as_str() {
            "=" => Ok(Self::Eq),
            "!=" | "<>" => Ok(Self::Ne),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            "LIKE" => Ok(Self::Like),
            "IN" => Ok(Self::In),
            "NOT IN" => Ok(Self::NotIn),
            "INCLUDES" => Ok(Self::Includes),
            "EXCLUDES" => Ok(Self::Excludes),
            _ => Err(ForceError::InvalidOperator(s.to_string())),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl Direction {
    /// Parses a direction; anything other than `asc` (any case) is descending.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("asc") {
            Self::Asc
        } else {
            Self::Desc
        }
    }

    /// The direction keyword.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// A field ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// The field to order by.
    pub field: String,
    /// The sort direction.
    pub direction: Direction,
    /// Whether to put nulls first or last.
    pub nulls_first: Option<bool>,
}

impl OrderBy {
    /// Creates an ascending order.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
            nulls_first: None,
        }
    }

    /// Creates a descending order.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
            nulls_first: None,
        }
    }
}

/// A selected field.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectField {
    /// A plain field name (or function such as `COUNT()`).
    Field(String),
    /// A parenthesised sub-select.
    Subquery(Box<QueryExpression>),
}

impl From<&str> for SelectField {
    fn from(name: &str) -> Self {
        Self::Field(name.to_string())
    }
}

impl From<String> for SelectField {
    fn from(name: String) -> Self {
        Self::Field(name)
    }
}

/// The right-hand side of a date clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateValue {
    /// A calendar date, rendered `YYYY-MM-DD`.
    Date(NaiveDate),
    /// A timestamp, rendered with its offset.
    DateTime(DateTime<FixedOffset>),
}

impl DateValue {
    /// Parses a calendar date (`2024-01-15`) or an RFC 3339 timestamp.
    pub fn parse(s: &str) -> ForceResult<Self> {
        let trimmed = s.trim();
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return Ok(Self::Date(date));
        }
        DateTime::parse_from_rfc3339(trimmed)
            .map(Self::DateTime)
            .map_err(|_| ForceError::InvalidDate(s.to_string()))
    }

    /// Converts a temporal [`Value`]; other variants yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Date(d) => Some(Self::Date(*d)),
            Value::DateTime(dt) => Some(Self::from(*dt)),
            Value::DateTimeTz(dt) => Some(Self::from(*dt)),
            _ => None,
        }
    }
}

impl From<NaiveDate> for DateValue {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

impl From<DateTime<FixedOffset>> for DateValue {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Self::DateTime(dt)
    }
}

impl From<DateTime<Utc>> for DateValue {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt.fixed_offset())
    }
}

impl From<NaiveDateTime> for DateValue {
    fn from(dt: NaiveDateTime) -> Self {
        Self::DateTime(dt.and_utc().fixed_offset())
    }
}

/// One where clause. The grammar dispatches purely on the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereClause {
    /// `field op literal`
    Basic {
        /// The field name.
        field: String,
        /// The operator.
        operator: Operator,
        /// The literal.
        value: Value,
    },
    /// `field IN (literals)`
    In {
        /// The field name.
        field: String,
        /// The literal set.
        values: Vec<Value>,
    },
    /// `field NOT IN (literals)`
    NotIn {
        /// The field name.
        field: String,
        /// The literal set.
        values: Vec<Value>,
    },
    /// `field IN (sub-select)`, compiled when the clause was added.
    InSub {
        /// The field name.
        field: String,
        /// The compiled sub-select text.
        query: String,
    },
    /// `field NOT IN (sub-select)`, compiled when the clause was added.
    NotInSub {
        /// The field name.
        field: String,
        /// The compiled sub-select text.
        query: String,
    },
    /// `field = null`
    Null {
        /// The field name.
        field: String,
    },
    /// `field != null`
    NotNull {
        /// The field name.
        field: String,
    },
    /// `field op date`
    Date {
        /// The field name.
        field: String,
        /// The operator.
        operator: Operator,
        /// The date or timestamp.
        date: DateValue,
    },
    /// `field op true|false`
    Boolean {
        /// The field name.
        field: String,
        /// The operator.
        operator: Operator,
        /// The boolean literal.
        value: bool,
    },
    /// `field op (sub-select)`, compiled together with the outer query.
    Sub {
        /// The field name.
        field: String,
        /// The operator.
        operator: Operator,
        /// The nested query.
        query: Box<QueryExpression>,
    },
    /// A parenthesised group of clauses, AND-combined.
    Nested {
        /// The grouped clauses.
        wheres: Vec<WhereClause>,
    },
}

impl WhereClause {
    /// The field this clause constrains; `None` for nested groups.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Basic { field, .. }
            | Self::In { field, .. }
            | Self::NotIn { field, .. }
            | Self::InSub { field, .. }
            | Self::NotInSub { field, .. }
            | Self::Null { field }
            | Self::NotNull { field }
            | Self::Date { field, .. }
            | Self::Boolean { field, .. }
            | Self::Sub { field, .. } => Some(field),
            Self::Nested { .. } => None,
        }
    }

    /// A short name for the variant, used in error messages.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Basic { .. } => "Basic",
            Self::In { .. } => "In",
            Self::NotIn { .. } => "NotIn",
            Self::InSub { .. } => "InSub",
            Self::NotInSub { .. } => "NotInSub",
            Self::Null { .. } => "Null",
            Self::NotNull { .. } => "NotNull",
            Self::Date { .. } => "Date",
            Self::Boolean { .. } => "Boolean",
            Self::Sub { .. } => "Sub",
            Self::Nested { .. } => "Nested",
        }
    }
}

/// The complete query AST.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryExpression {
    /// Selected fields; empty means the grammar's default fields.
    pub fields: Vec<SelectField>,
    /// The target object.
    pub from: String,
    /// Where clauses, AND-combined in insertion order.
    pub wheres: Vec<WhereClause>,
    /// Orderings, in insertion order.
    pub orders: Vec<OrderBy>,
    /// LIMIT.
    pub limit: Option<usize>,
    /// OFFSET.
    pub offset: Option<usize>,
}

impl QueryExpression {
    /// Creates an expression targeting `object`.
    pub fn new(object: impl Into<String>) -> Self {
        Self {
            from: object.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_parse() {
        assert_eq!("=".parse::<Operator>().unwrap(), Operator::Eq);
        assert_eq!("<>".parse::<Operator>().unwrap(), Operator::Ne);
        assert_eq!("not  in".parse::<Operator>().unwrap(), Operator::NotIn);
        assert_eq!("like".parse::<Operator>().unwrap(), Operator::Like);
        assert!(matches!(
            "~=".parse::<Operator>(),
            Err(ForceError::InvalidOperator(_))
        ));
    }

    #[test]
    fn test_operator_roundtrip_text() {
        for op in [Operator::Eq, Operator::Ge, Operator::NotIn, Operator::Excludes] {
            assert_eq!(op.as_str().parse::<Operator>().unwrap(), op);
        }
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!(Direction::parse("asc"), Direction::Asc);
        assert_eq!(Direction::parse("ASC"), Direction::Asc);
        assert_eq!(Direction::parse("desc"), Direction::Desc);
        assert_eq!(Direction::parse("sideways"), Direction::Desc);
    }

    #[test]
    fn test_date_value_parse() {
        assert_eq!(
            DateValue::parse("2024-01-15").unwrap(),
            DateValue::Date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
        );
        assert!(matches!(
            DateValue::parse("2024-01-15T10:00:00+02:00").unwrap(),
            DateValue::DateTime(_)
        ));
        assert!(matches!(
            DateValue::parse("yesterday"),
            Err(ForceError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_clause_field() {
        let clause = WhereClause::Null {
            field: "Email".to_string(),
        };
        assert_eq!(clause.field(), Some("Email"));
        assert_eq!(WhereClause::Nested { wheres: vec![] }.field(), None);
    }
}
