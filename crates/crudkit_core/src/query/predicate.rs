//! Field-level filter expressions for façade reads and bulk deletes.

use crate::model::descriptor::{quote_ident, EntityDescriptor};
use crate::query::{QueryError, QueryResult};
use rusqlite::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Filter over entity fields; compiled against a descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every row.
    All,
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn all() -> Self {
        Self::All
    }

    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Le, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ge, value)
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Self::And(mut parts) => {
                parts.push(other);
                Self::And(parts)
            }
            first => Self::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match self {
            Self::Or(mut parts) => {
                parts.push(other);
                Self::Or(parts)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    /// Compiles to a `WHERE` body with `?` placeholders, values in order.
    pub(crate) fn to_sql(
        &self,
        descriptor: &EntityDescriptor,
    ) -> QueryResult<(String, Vec<Value>)> {
        let mut values = Vec::new();
        let sql = self.write_sql(descriptor, &mut values)?;
        Ok((sql, values))
    }

    fn write_sql(
        &self,
        descriptor: &EntityDescriptor,
        values: &mut Vec<Value>,
    ) -> QueryResult<String> {
        match self {
            Self::All => Ok("1 = 1".to_string()),
            Self::Compare { field, op, value } => {
                let mapping = descriptor.mapping_for_field(field).ok_or_else(|| {
                    QueryError::UnknownField {
                        entity: descriptor.entity().to_string(),
                        field: field.clone(),
                    }
                })?;
                let column = quote_ident(&mapping.column);
                match (value, op) {
                    (Value::Null, CompareOp::Eq) => Ok(format!("{column} IS NULL")),
                    (Value::Null, CompareOp::Ne) => Ok(format!("{column} IS NOT NULL")),
                    _ => {
                        values.push(value.clone());
                        Ok(format!("{column} {} ?", op.sql()))
                    }
                }
            }
            Self::And(parts) => join(parts, " AND ", "1 = 1", descriptor, values),
            Self::Or(parts) => join(parts, " OR ", "1 = 0", descriptor, values),
        }
    }
}

fn join(
    parts: &[Predicate],
    separator: &str,
    empty: &str,
    descriptor: &EntityDescriptor,
    values: &mut Vec<Value>,
) -> QueryResult<String> {
    if parts.is_empty() {
        return Ok(empty.to_string());
    }
    let compiled = parts
        .iter()
        .map(|part| part.write_sql(descriptor, values).map(|sql| format!("({sql})")))
        .collect::<QueryResult<Vec<_>>>()?;
    Ok(compiled.join(separator))
}

#[cfg(test)]
mod tests {
    use super::Predicate;
    use crate::model::descriptor::EntityDescriptor;
    use crate::model::entity::Entity;
    use crate::model::Employee;
    use crate::query::QueryError;
    use rusqlite::types::Value;

    fn employee() -> EntityDescriptor {
        Employee::describe(EntityDescriptor::builder(Employee::NAME))
            .build()
            .unwrap()
    }

    #[test]
    fn compiles_nested_predicates_with_ordered_values() {
        let predicate = Predicate::eq("city", Value::Text("Miami".to_string()))
            .and(Predicate::gt("id", 2).or(Predicate::le("mobile_no", 10_i64)));
        let (sql, values) = predicate.to_sql(&employee()).unwrap();
        assert_eq!(
            sql,
            "(\"city\" = ?) AND ((\"Emp_ID\" > ?) OR (\"mobileNo\" <= ?))"
        );
        assert_eq!(
            values,
            vec![
                Value::Text("Miami".to_string()),
                Value::Integer(2),
                Value::Integer(10)
            ]
        );
    }

    #[test]
    fn null_comparisons_use_is_null() {
        let (sql, values) = Predicate::eq("post", Value::Null).to_sql(&employee()).unwrap();
        assert_eq!(sql, "\"post\" IS NULL");
        assert!(values.is_empty());
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = Predicate::eq("salary", 1).to_sql(&employee()).unwrap_err();
        assert!(matches!(err, QueryError::UnknownField { field, .. } if field == "salary"));
    }
}
