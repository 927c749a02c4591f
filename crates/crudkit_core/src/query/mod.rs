//! Parameterized query model and execution.
//!
//! # Responsibility
//! - Describe statements (native SQL or entity language) with their bound
//!   parameters and expected result shape.
//! - Check parameter binding strictly before a statement reaches the store.
//! - Materialize rows into records, projections or coerced scalars.
//!
//! # Invariants
//! - A statement never executes with missing, extra or misnamed parameters.
//! - Binding and coercion failures leave any open unit of work untouched.

mod executor;
mod lexer;
mod predicate;
mod translate;

pub use executor::{QueryExecutor, ResultSet, Rows};
pub(crate) use executor::{is_read_only, prepare, run_update, PreparedStatement};
pub use predicate::{CompareOp, Predicate};

use crate::db::DbError;
use crate::model::entity::{value_type_name, FieldError};
use crate::registry::RegistryError;
use rusqlite::types::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub type QueryResult<T> = Result<T, QueryError>;

/// Statement language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryLanguage {
    /// Passed to the store as written.
    Native,
    /// Entity and field names, translated to tables and columns first.
    Entity,
}

/// Result shape expected from a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultShape {
    /// Whole records of the named entity.
    Entity(String),
    /// Ordered tuples of heterogeneous values.
    Projection,
    /// Exactly one value.
    Scalar,
    /// Rows-affected count of a mutating statement.
    Update,
}

/// A statement plus its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    text: String,
    language: QueryLanguage,
    shape: ResultShape,
    positional: Vec<Value>,
    named: Vec<(String, Value)>,
}

impl Query {
    pub fn native(text: impl Into<String>) -> Self {
        Self::new(text, QueryLanguage::Native)
    }

    pub fn entity(text: impl Into<String>) -> Self {
        Self::new(text, QueryLanguage::Entity)
    }

    fn new(text: impl Into<String>, language: QueryLanguage) -> Self {
        Self {
            text: text.into(),
            language,
            shape: ResultShape::Projection,
            positional: Vec::new(),
            named: Vec::new(),
        }
    }

    /// Binds the next positional parameter.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Binds a named parameter. The leading `:` is optional.
    pub fn bind_named(mut self, name: &str, value: impl Into<Value>) -> Self {
        let name = name.strip_prefix(':').unwrap_or(name);
        self.named.push((name.to_string(), value.into()));
        self
    }

    pub fn bind_text(self, value: impl Into<String>) -> Self {
        self.bind(Value::Text(value.into()))
    }

    pub fn bind_named_text(self, name: &str, value: impl Into<String>) -> Self {
        self.bind_named(name, Value::Text(value.into()))
    }

    pub fn with_shape(mut self, shape: ResultShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn language(&self) -> QueryLanguage {
        self.language
    }

    pub fn shape(&self) -> &ResultShape {
        &self.shape
    }

    pub(crate) fn positional(&self) -> &[Value] {
        &self.positional
    }

    pub(crate) fn named(&self) -> &[(String, Value)] {
        &self.named
    }
}

/// Statement declared once per entity type and referenced by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedQuery {
    pub name: String,
    pub language: QueryLanguage,
    pub text: String,
    pub shape: ResultShape,
}

impl NamedQuery {
    pub fn new(
        name: impl Into<String>,
        language: QueryLanguage,
        text: impl Into<String>,
        shape: ResultShape,
    ) -> Self {
        Self {
            name: name.into(),
            language,
            text: text.into(),
            shape,
        }
    }

    /// Unbound query ready for parameters.
    pub fn to_query(&self) -> Query {
        Query::new(self.text.clone(), self.language).with_shape(self.shape.clone())
    }
}

/// Parameter binding mismatch, detected before execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterBindingError {
    CountMismatch { expected: usize, actual: usize },
    /// Named values bound to positional placeholders or the reverse.
    StyleMismatch { expected: &'static str },
    MixedPlaceholders,
    MissingNamed(String),
    UnexpectedNamed(String),
    DuplicateNamed(String),
}

impl Display for ParameterBindingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CountMismatch { expected, actual } => write!(
                f,
                "statement expects {expected} parameter(s), {actual} bound"
            ),
            Self::StyleMismatch { expected } => {
                write!(f, "statement expects {expected} parameters")
            }
            Self::MixedPlaceholders => {
                write!(f, "statement mixes named and positional placeholders")
            }
            Self::MissingNamed(name) => write!(f, "parameter `:{name}` is not bound"),
            Self::UnexpectedNamed(name) => {
                write!(f, "parameter `:{name}` does not appear in the statement")
            }
            Self::DuplicateNamed(name) => write!(f, "parameter `:{name}` bound twice"),
        }
    }
}

impl Error for ParameterBindingError {}

/// Scalar result incompatible with the requested type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeCoercionError {
    pub expected: &'static str,
    pub found: String,
}

impl Display for TypeCoercionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot coerce {} to {}", self.found, self.expected)
    }
}

impl Error for TypeCoercionError {}

#[derive(Debug)]
pub enum QueryError {
    Syntax(String),
    ParameterBinding(ParameterBindingError),
    TypeCoercion(TypeCoercionError),
    Registry(RegistryError),
    UnknownField { entity: String, field: String },
    /// Selected columns do not fit the requested result shape.
    ShapeMismatch(String),
    NoResult,
    NonUniqueResult { rows: usize, columns: usize },
    Materialize(FieldError),
    Timeout(Duration),
    Db(DbError),
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syntax(message) => write!(f, "query syntax error: {message}"),
            Self::ParameterBinding(err) => write!(f, "parameter binding failed: {err}"),
            Self::TypeCoercion(err) => write!(f, "{err}"),
            Self::Registry(err) => write!(f, "{err}"),
            Self::UnknownField { entity, field } => {
                write!(f, "entity `{entity}` has no field `{field}`")
            }
            Self::ShapeMismatch(message) => write!(f, "result shape mismatch: {message}"),
            Self::NoResult => write!(f, "query returned no result"),
            Self::NonUniqueResult { rows, columns } => write!(
                f,
                "expected a single value, query returned {rows} row(s) x {columns} column(s)"
            ),
            Self::Materialize(err) => write!(f, "cannot materialize record: {err}"),
            Self::Timeout(limit) => {
                write!(f, "statement exceeded timeout of {}ms", limit.as_millis())
            }
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for QueryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ParameterBinding(err) => Some(err),
            Self::TypeCoercion(err) => Some(err),
            Self::Registry(err) => Some(err),
            Self::Materialize(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ParameterBindingError> for QueryError {
    fn from(value: ParameterBindingError) -> Self {
        Self::ParameterBinding(value)
    }
}

impl From<TypeCoercionError> for QueryError {
    fn from(value: TypeCoercionError) -> Self {
        Self::TypeCoercion(value)
    }
}

impl From<RegistryError> for QueryError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

impl From<FieldError> for QueryError {
    fn from(value: FieldError) -> Self {
        Self::Materialize(value)
    }
}

impl From<DbError> for QueryError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for QueryError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Numeric types a scalar result can be coerced into.
pub trait FromScalar: Sized {
    const TYPE_NAME: &'static str;

    fn from_scalar(value: &Value) -> Option<Self>;

    fn coerce(value: &Value) -> Result<Self, TypeCoercionError> {
        Self::from_scalar(value).ok_or_else(|| TypeCoercionError {
            expected: Self::TYPE_NAME,
            found: describe_value(value),
        })
    }
}

impl FromScalar for i64 {
    const TYPE_NAME: &'static str = "i64";

    fn from_scalar(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(value) => Some(*value),
            Value::Real(value) if value.fract() == 0.0 && value.abs() < 9.0e15 => {
                Some(*value as i64)
            }
            _ => None,
        }
    }
}

macro_rules! scalar_via_i64 {
    ($($ty:ty),*) => {
        $(
            impl FromScalar for $ty {
                const TYPE_NAME: &'static str = stringify!($ty);

                fn from_scalar(value: &Value) -> Option<Self> {
                    i64::from_scalar(value).and_then(|value| <$ty>::try_from(value).ok())
                }
            }
        )*
    };
}

scalar_via_i64!(i32, u32, u64, usize);

impl FromScalar for f64 {
    const TYPE_NAME: &'static str = "f64";

    fn from_scalar(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(value) => Some(*value as f64),
            Value::Real(value) => Some(*value),
            _ => None,
        }
    }
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Integer(value) => format!("integer {value}"),
        Value::Real(value) => format!("real {value}"),
        Value::Text(value) => format!("text {value:?}"),
        Value::Blob(_) => value_type_name(value).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{FromScalar, Query};
    use rusqlite::types::Value;

    #[test]
    fn scalar_coercion_checks_range_and_type() {
        assert_eq!(i32::coerce(&Value::Integer(5)).unwrap(), 5);
        assert_eq!(i64::coerce(&Value::Real(4.0)).unwrap(), 4);
        assert_eq!(f64::coerce(&Value::Integer(3)).unwrap(), 3.0);

        let overflow = i32::coerce(&Value::Integer(i64::from(i32::MAX) + 1)).unwrap_err();
        assert_eq!(overflow.expected, "i32");
        assert!(u32::coerce(&Value::Integer(-1)).is_err());
        assert!(i64::coerce(&Value::Real(1.5)).is_err());
        let text = i64::coerce(&Value::Text("7".to_string())).unwrap_err();
        assert_eq!(text.found, "text \"7\"");
        assert!(i64::coerce(&Value::Null).is_err());
    }

    #[test]
    fn bind_named_strips_leading_colon() {
        let query = Query::entity("SELECT p FROM Product p WHERE p.price > :min")
            .bind_named(":min", 100)
            .bind_named_text("name", "Pen");
        assert_eq!(query.named()[0].0, "min");
        assert_eq!(query.named()[1].1, Value::Text("Pen".to_string()));
    }
}
