//! Student record.

use crate::model::descriptor::{ColumnMapping, DescriptorBuilder};
use crate::model::entity::{Entity, FieldError, FieldValues};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: i32,
    pub name: String,
    pub course: String,
    pub city: String,
    pub mobile_no: i64,
}

impl Student {
    pub fn new(
        id: i32,
        name: impl Into<String>,
        course: impl Into<String>,
        city: impl Into<String>,
        mobile_no: i64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            course: course.into(),
            city: city.into(),
            mobile_no,
        }
    }
}

impl Display for Student {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Student [id={}, name={}, course={}, city={}, mobileNo={}]",
            self.id, self.name, self.course, self.city, self.mobile_no
        )
    }
}

impl Entity for Student {
    const NAME: &'static str = "Student";

    fn describe(builder: DescriptorBuilder) -> DescriptorBuilder {
        builder
            .table("student")
            .id(ColumnMapping::integer("id"))
            .column(ColumnMapping::text("name"))
            .column(ColumnMapping::text("course"))
            .column(ColumnMapping::text("city"))
            .column(ColumnMapping::integer("mobile_no").column("mobileNo").not_null())
    }

    fn id(&self) -> Value {
        Value::Integer(i64::from(self.id))
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::Integer(i64::from(self.id))),
            ("name", Value::Text(self.name.clone())),
            ("course", Value::Text(self.course.clone())),
            ("city", Value::Text(self.city.clone())),
            ("mobile_no", Value::Integer(self.mobile_no)),
        ]
    }

    fn from_fields(fields: &FieldValues) -> Result<Self, FieldError> {
        Ok(Self {
            id: fields.get_i32("id")?,
            name: fields.get_opt_text("name")?.unwrap_or_default(),
            course: fields.get_opt_text("course")?.unwrap_or_default(),
            city: fields.get_opt_text("city")?.unwrap_or_default(),
            mobile_no: fields.get_i64("mobile_no")?,
        })
    }
}
