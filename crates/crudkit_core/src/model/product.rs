//! Product record and its named queries.

use crate::model::descriptor::{ColumnMapping, DescriptorBuilder};
use crate::model::entity::{Entity, FieldError, FieldValues};
use crate::query::{NamedQuery, QueryLanguage, ResultShape};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub const UPDATE_PRICE_BY_ID: &str = "Product.UpdatePriceById";
pub const DELETE_BY_NAME: &str = "Product.deleteByName";
pub const COUNT_PRODUCTS: &str = "Product.countProducts";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i32,
    pub name: String,
    /// Free-form date string, stored verbatim.
    pub manufacturing_date: String,
    pub price: i32,
}

impl Product {
    pub fn new(
        id: i32,
        name: impl Into<String>,
        manufacturing_date: impl Into<String>,
        price: i32,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            manufacturing_date: manufacturing_date.into(),
            price,
        }
    }
}

impl Display for Product {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Product [id={}, name={}, manufacturingDate={}, price={}]",
            self.id, self.name, self.manufacturing_date, self.price
        )
    }
}

impl Entity for Product {
    const NAME: &'static str = "Product";

    fn describe(builder: DescriptorBuilder) -> DescriptorBuilder {
        builder
            .table("Product_2")
            .id(ColumnMapping::integer("id").column("Product_id"))
            .column(ColumnMapping::text("name").max_length(25))
            .column(ColumnMapping::text("manufacturing_date").column("manufacturingDate"))
            .column(ColumnMapping::integer("price").not_null())
    }

    fn named_queries() -> Vec<NamedQuery> {
        vec![
            NamedQuery::new(
                UPDATE_PRICE_BY_ID,
                QueryLanguage::Entity,
                "UPDATE Product p SET p.price = :price WHERE p.id = :id",
                ResultShape::Update,
            ),
            NamedQuery::new(
                DELETE_BY_NAME,
                QueryLanguage::Entity,
                "DELETE FROM Product p WHERE p.name = :name",
                ResultShape::Update,
            ),
            NamedQuery::new(
                COUNT_PRODUCTS,
                QueryLanguage::Entity,
                "SELECT COUNT(p) FROM Product p",
                ResultShape::Scalar,
            ),
        ]
    }

    fn id(&self) -> Value {
        Value::Integer(i64::from(self.id))
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::Integer(i64::from(self.id))),
            ("name", Value::Text(self.name.clone())),
            (
                "manufacturing_date",
                Value::Text(self.manufacturing_date.clone()),
            ),
            ("price", Value::Integer(i64::from(self.price))),
        ]
    }

    fn from_fields(fields: &FieldValues) -> Result<Self, FieldError> {
        Ok(Self {
            id: fields.get_i32("id")?,
            name: fields.get_opt_text("name")?.unwrap_or_default(),
            manufacturing_date: fields
                .get_opt_text("manufacturing_date")?
                .unwrap_or_default(),
            price: fields.get_i32("price")?,
        })
    }
}
