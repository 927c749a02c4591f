//! Employee record.
//!
//! # Invariants
//! - `name` is unique across the table and at most 15 characters.

use crate::model::descriptor::{ColumnMapping, DescriptorBuilder};
use crate::model::entity::{Entity, FieldError, FieldValues};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: i32,
    pub name: String,
    pub city: String,
    pub post: String,
    /// Stored as `mobileNo`.
    pub mobile_no: i64,
}

impl Employee {
    pub fn new(
        id: i32,
        name: impl Into<String>,
        city: impl Into<String>,
        post: impl Into<String>,
        mobile_no: i64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            city: city.into(),
            post: post.into(),
            mobile_no,
        }
    }
}

impl Display for Employee {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Employee [id={}, name={}, city={}, post={}, mobileNo={}]",
            self.id, self.name, self.city, self.post, self.mobile_no
        )
    }
}

impl Entity for Employee {
    const NAME: &'static str = "Employee";

    fn describe(builder: DescriptorBuilder) -> DescriptorBuilder {
        builder
            .table("emp_3")
            .id(ColumnMapping::integer("id").column("Emp_ID"))
            .column(
                ColumnMapping::text("name")
                    .column("Emp_Name")
                    .max_length(15)
                    .not_null()
                    .unique(),
            )
            .column(ColumnMapping::text("city"))
            .column(ColumnMapping::text("post"))
            .column(ColumnMapping::integer("mobile_no").column("mobileNo").not_null())
    }

    fn id(&self) -> Value {
        Value::Integer(i64::from(self.id))
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::Integer(i64::from(self.id))),
            ("name", Value::Text(self.name.clone())),
            ("city", Value::Text(self.city.clone())),
            ("post", Value::Text(self.post.clone())),
            ("mobile_no", Value::Integer(self.mobile_no)),
        ]
    }

    fn from_fields(fields: &FieldValues) -> Result<Self, FieldError> {
        Ok(Self {
            id: fields.get_i32("id")?,
            name: fields.get_text("name")?,
            city: fields.get_opt_text("city")?.unwrap_or_default(),
            post: fields.get_opt_text("post")?.unwrap_or_default(),
            mobile_no: fields.get_i64("mobile_no")?,
        })
    }
}
