//! Query-language grammar.
//!
//! [`Grammar::compile_select`] renders a [`QueryExpression`] into query text
//! in the fixed segment order `SELECT`, `FROM`, `WHERE`, `ORDER BY`, `LIMIT`,
//! `OFFSET`, omitting any segment whose value is unset or empty. Compiling is
//! pure: the same expression always renders the same text, and nothing is
//! logged here.
//!
//! When a grammar carries the [`ObjectSchema`] of the queried object, literal
//! formatting of `Basic` and set clauses consults the declared field type, so
//! a string compared against a boolean or date field is rendered as that type.

use std::sync::Arc;

use chrono::SecondsFormat;
use forceorm_core::{ForceError, ForceResult};

use super::expression::{
    DateValue, Operator, OrderBy, QueryExpression, SelectField, WhereClause,
};
use crate::schema::{FieldType, ObjectSchema};
use crate::value::Value;

/// Renders query expressions into the remote query language.
#[derive(Debug, Clone)]
pub struct Grammar {
    schema: Option<Arc<ObjectSchema>>,
    default_fields: Vec<String>,
}

impl Default for Grammar {
    fn default() -> Self {
        Self {
            schema: None,
            default_fields: vec!["Id".to_string()],
        }
    }
}

impl Grammar {
    /// A schema-less grammar selecting `Id` by default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fields rendered when an expression selects nothing.
    #[must_use]
    pub fn with_default_fields(mut self, fields: Vec<String>) -> Self {
        self.default_fields = fields;
        self
    }

    /// Attaches the schema used for literal formatting.
    #[must_use]
    pub fn with_schema(mut self, schema: Arc<ObjectSchema>) -> Self {
        self.schema = Some(schema);
        self
    }

    /// The attached schema, if any.
    pub fn schema(&self) -> Option<&ObjectSchema> {
        self.schema.as_deref()
    }

    /// The grammar nested sub-selects compile with: same defaults, no schema.
    fn nested(&self) -> Self {
        Self {
            schema: None,
            default_fields: self.default_fields.clone(),
        }
    }

    /// Compiles a SELECT statement.
    pub fn compile_select(&self, query: &QueryExpression) -> ForceResult<String> {
        let mut text = String::from("SELECT ");

        let fields: Vec<String> = if query.fields.is_empty() {
            self.default_fields.clone()
        } else {
            query
                .fields
                .iter()
                .map(|field| match field {
                    SelectField::Field(name) => Ok(name.clone()),
                    SelectField::Subquery(sub) => {
                        Ok(format!("({})", self.nested().compile_select(sub)?))
                    }
                })
                .collect::<ForceResult<_>>()?
        };
        text.push_str(&fields.join(", "));

        text.push_str(" FROM ");
        text.push_str(&query.from);

        let wheres = self.compile_wheres(&query.wheres)?;
        if !wheres.is_empty() {
            text.push_str(" WHERE ");
            text.push_str(&wheres);
        }

        if !query.orders.is_empty() {
            let orders: Vec<String> = query.orders.iter().map(compile_order).collect();
            text.push_str(" ORDER BY ");
            text.push_str(&orders.join(", "));
        }

        if let Some(limit) = query.limit {
            text.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = query.offset {
            text.push_str(&format!(" OFFSET {offset}"));
        }

        Ok(text)
    }

    /// Renders a clause list AND-joined, without a leading keyword.
    fn compile_wheres(&self, wheres: &[WhereClause]) -> ForceResult<String> {
        let mut parts = Vec::with_capacity(wheres.len());
        for clause in wheres {
            let rendered = self.compile_where(clause)?;
            if !rendered.is_empty() {
                parts.push(rendered);
            }
        }
        Ok(parts.join(" AND "))
    }

    fn compile_where(&self, clause: &WhereClause) -> ForceResult<String> {
        match clause {
            WhereClause::Basic {
                field,
                operator,
                value,
            } => {
                if matches!(operator, Operator::In | Operator::NotIn) {
                    return Err(unsupported(clause, *operator));
                }
                Ok(format!(
                    "{field} {operator} {}",
                    self.format_for_field(field, value)
                ))
            }
            WhereClause::In { field, values } => {
                if values.is_empty() {
                    return Ok(format!("{field} = null AND {field} != null"));
                }
                Ok(format!("{field} IN ({})", self.format_list(field, values)))
            }
            WhereClause::NotIn { field, values } => {
                if values.is_empty() {
                    return Ok(format!("({field} = null OR {field} != null)"));
                }
                Ok(format!(
                    "{field} NOT IN ({})",
                    self.format_list(field, values)
                ))
            }
            WhereClause::InSub { field, query } => Ok(format!("{field} IN ({query})")),
            WhereClause::NotInSub { field, query } => Ok(format!("{field} NOT IN ({query})")),
            WhereClause::Null { field } => Ok(format!("{field} = null")),
            WhereClause::NotNull { field } => Ok(format!("{field} != null")),
            WhereClause::Date {
                field,
                operator,
                date,
            } => {
                if !operator.is_comparison() {
                    return Err(unsupported(clause, *operator));
                }
                Ok(format!("{field} {operator} {}", format_date(date)))
            }
            WhereClause::Boolean {
                field,
                operator,
                value,
            } => {
                if !matches!(operator, Operator::Eq | Operator::Ne) {
                    return Err(unsupported(clause, *operator));
                }
                Ok(format!("{field} {operator} {value}"))
            }
            WhereClause::Sub {
                field,
                operator,
                query,
            } => {
                if !matches!(operator, Operator::In | Operator::NotIn) {
                    return Err(unsupported(clause, *operator));
                }
                Ok(format!(
                    "{field} {operator} ({})",
                    self.nested().compile_select(query)?
                ))
            }
            WhereClause::Nested { wheres } => {
                let inner = self.compile_wheres(wheres)?;
                if inner.is_empty() {
                    Ok(String::new())
                } else {
                    Ok(format!("({inner})"))
                }
            }
        }
    }

    fn format_list(&self, field: &str, values: &[Value]) -> String {
        values
            .iter()
            .map(|v| self.format_for_field(field, v))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Formats `value` for comparison against `field`, honouring the schema.
    pub fn format_for_field(&self, field: &str, value: &Value) -> String {
        let declared = self.schema.as_ref().and_then(|s| s.field_type(field));
        if let (Some(field_type), Value::String(s)) = (declared, value) {
            match field_type {
                FieldType::Boolean => {
                    if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false") {
                        return s.to_ascii_lowercase();
                    }
                }
                FieldType::Date | FieldType::DateTime => {
                    if let Ok(date) = DateValue::parse(s) {
                        return format_date(&date);
                    }
                }
                FieldType::String | FieldType::Other => {}
            }
        }
        format_value(value)
    }
}

fn unsupported(clause: &WhereClause, operator: Operator) -> ForceError {
    ForceError::UnsupportedClauseKind(format!(
        "{} clause with operator {operator}",
        clause.kind()
    ))
}

fn compile_order(order: &OrderBy) -> String {
    let nulls = match order.nulls_first {
        Some(true) => " NULLS FIRST",
        Some(false) => " NULLS LAST",
        None => "",
    };
    format!("{} {}{nulls}", order.field, order.direction.as_str())
}

/// Single-quotes a string literal, backslash-escaping quotes, backslashes,
/// and control whitespace.
pub fn quote_string(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('\'');
    for c in s.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            other => quoted.push(other),
        }
    }
    quoted.push('\'');
    quoted
}

/// Renders a date literal: `YYYY-MM-DD`, or a timestamp with its offset.
pub fn format_date(date: &DateValue) -> String {
    match date {
        DateValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        DateValue::DateTime(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, false),
    }
}

/// Renders a literal without schema information.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => quote_string(s),
        Value::Date(d) => format_date(&DateValue::Date(*d)),
        Value::DateTime(dt) => format_date(&DateValue::from(*dt)),
        Value::DateTimeTz(dt) => format_date(&DateValue::from(*dt)),
        Value::Time(t) => t.format("%H:%M:%S%.3fZ").to_string(),
        Value::Json(j) => quote_string(&j.to_string()),
        Value::List(items) => format!(
            "({})",
            items.iter().map(format_value).collect::<Vec<_>>().join(", ")
        ),
    }
}
