//! Entity query language translation.
//!
//! Statements name one entity instead of a table and address fields through
//! an identification variable:
//!
//! ```text
//! SELECT p FROM Product p WHERE p.price > :min
//! UPDATE Product p SET p.price = :price WHERE p.id = :id
//! SELECT COUNT(p) FROM Product p
//! ```
//!
//! # Invariants
//! - Exactly one entity per statement; joins, subqueries and `INSERT` are
//!   rejected.
//! - Placeholders, literals and comments pass through untouched.

use crate::model::descriptor::{quote_ident, EntityDescriptor};
use crate::query::lexer::{Token, TokenKind};
use crate::query::{QueryError, QueryResult};
use crate::registry::EntityRegistry;

/// Keywords that may directly follow the entity name and are never aliases.
const CLAUSE_KEYWORDS: &[&str] = &[
    "WHERE", "SET", "ORDER", "GROUP", "HAVING", "LIMIT", "OFFSET", "UNION", "JOIN", "INNER",
    "LEFT", "RIGHT", "CROSS", "ON",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Translation {
    pub sql: String,
    pub entity: String,
}

pub(crate) fn translate(
    tokens: &[Token<'_>],
    registry: &EntityRegistry,
) -> QueryResult<Translation> {
    let significant: Vec<usize> = (0..tokens.len())
        .filter(|&index| !tokens[index].is_trivia())
        .collect();

    if let Some(&index) = significant
        .iter()
        .find(|&&index| tokens[index].is_keyword("INSERT") || tokens[index].is_keyword("JOIN"))
    {
        return Err(QueryError::Syntax(format!(
            "`{}` is not supported in entity queries",
            tokens[index].text.to_ascii_uppercase()
        )));
    }

    let anchors: Vec<usize> = significant
        .iter()
        .copied()
        .filter(|&index| tokens[index].is_keyword("FROM") || tokens[index].is_keyword("UPDATE"))
        .collect();
    let anchor = match anchors.as_slice() {
        [only] => *only,
        [] => {
            return Err(QueryError::Syntax(
                "entity query names no entity (expected FROM or UPDATE)".to_string(),
            ))
        }
        _ => {
            return Err(QueryError::Syntax(
                "entity queries address exactly one entity".to_string(),
            ))
        }
    };

    let position = significant
        .iter()
        .position(|&index| index == anchor)
        .unwrap_or_default();
    let next_significant = |offset: usize| significant.get(position + offset).copied();

    let entity_index = next_significant(1)
        .filter(|&index| tokens[index].kind == TokenKind::Ident)
        .ok_or_else(|| {
            QueryError::Syntax(format!(
                "expected entity name after {}",
                tokens[anchor].text.to_ascii_uppercase()
            ))
        })?;
    let entity = tokens[entity_index].text;
    let descriptor = registry.resolve_name(entity)?;

    // `Entity [AS] alias`
    let mut alias_index = None;
    let mut dropped_until = entity_index;
    if let Some(candidate) = next_significant(2) {
        let token = &tokens[candidate];
        if token.is_keyword("AS") {
            let alias = next_significant(3)
                .filter(|&index| tokens[index].kind == TokenKind::Ident)
                .ok_or_else(|| QueryError::Syntax("expected alias after AS".to_string()))?;
            alias_index = Some(alias);
            dropped_until = alias;
        } else if token.kind == TokenKind::Ident
            && !CLAUSE_KEYWORDS
                .iter()
                .any(|keyword| token.is_keyword(keyword))
        {
            alias_index = Some(candidate);
            dropped_until = candidate;
        }
    }
    let qualifier = alias_index.map_or(entity, |index| tokens[index].text);

    let mut sql = String::with_capacity(tokens.iter().map(|token| token.text.len()).sum());
    let mut index = 0;
    while index < tokens.len() {
        let token = &tokens[index];

        if index == entity_index {
            sql.push_str(&quote_ident(descriptor.table()));
            index = dropped_until + 1;
            continue;
        }

        let is_qualifier =
            token.kind == TokenKind::Ident && token.text.eq_ignore_ascii_case(qualifier);
        if !is_qualifier {
            sql.push_str(token.text);
            index += 1;
            continue;
        }

        let dotted_field = tokens
            .get(index + 1)
            .filter(|dot| dot.is_symbol("."))
            .and_then(|_| tokens.get(index + 2))
            .filter(|field| field.kind == TokenKind::Ident);
        if let Some(field) = dotted_field {
            sql.push_str(&column_for(descriptor, field.text)?);
            index += 3;
            continue;
        }

        if is_count_argument(tokens, &significant, index) {
            sql.push('*');
        } else {
            sql.push_str(&descriptor.column_list());
        }
        index += 1;
    }

    Ok(Translation {
        sql,
        entity: descriptor.entity().to_string(),
    })
}

fn column_for(descriptor: &EntityDescriptor, field: &str) -> QueryResult<String> {
    descriptor
        .mapping_for_field(field)
        .map(|mapping| quote_ident(&mapping.column))
        .ok_or_else(|| QueryError::UnknownField {
            entity: descriptor.entity().to_string(),
            field: field.to_string(),
        })
}

/// True for the `p` in `COUNT(p)`.
fn is_count_argument(tokens: &[Token<'_>], significant: &[usize], index: usize) -> bool {
    let Some(position) = significant.iter().position(|&other| other == index) else {
        return false;
    };
    if position < 2 {
        return false;
    }
    let open = &tokens[significant[position - 1]];
    let function = &tokens[significant[position - 2]];
    let close = significant.get(position + 1).map(|&other| &tokens[other]);
    open.is_symbol("(") && function.is_keyword("COUNT") && close.is_some_and(|t| t.is_symbol(")"))
}

#[cfg(test)]
mod tests {
    use super::translate;
    use crate::model::{Employee, Product};
    use crate::query::lexer::tokenize;
    use crate::query::QueryError;
    use crate::registry::{EntityRegistry, RegistryError};

    fn registry() -> EntityRegistry {
        EntityRegistry::builder()
            .register::<Product>()
            .unwrap()
            .register::<Employee>()
            .unwrap()
            .build()
    }

    fn sql(text: &str) -> Result<String, QueryError> {
        let tokens = tokenize(text).unwrap();
        translate(&tokens, &registry()).map(|translation| translation.sql)
    }

    #[test]
    fn select_alias_expands_to_every_column() {
        assert_eq!(
            sql("SELECT p FROM Product p WHERE p.price > :min").unwrap(),
            "SELECT \"Product_id\", \"name\", \"manufacturingDate\", \"price\" FROM \"Product_2\" WHERE \"price\" > :min"
        );
    }

    #[test]
    fn projection_fields_map_to_columns() {
        assert_eq!(
            sql("SELECT e.id, e.mobile_no FROM Employee AS e ORDER BY e.name").unwrap(),
            "SELECT \"Emp_ID\", \"mobileNo\" FROM \"emp_3\" ORDER BY \"Emp_Name\""
        );
    }

    #[test]
    fn update_delete_and_count_translate() {
        assert_eq!(
            sql("UPDATE Product p SET p.price = :price WHERE p.id = :id").unwrap(),
            "UPDATE \"Product_2\" SET \"price\" = :price WHERE \"Product_id\" = :id"
        );
        assert_eq!(
            sql("DELETE FROM Product p WHERE p.name = :name").unwrap(),
            "DELETE FROM \"Product_2\" WHERE \"name\" = :name"
        );
        assert_eq!(
            sql("SELECT COUNT(p) FROM Product p").unwrap(),
            "SELECT COUNT(*) FROM \"Product_2\""
        );
    }

    #[test]
    fn entity_name_qualifies_fields_without_alias() {
        assert_eq!(
            sql("SELECT Product.name FROM Product WHERE Product.price = 1").unwrap(),
            "SELECT \"name\" FROM \"Product_2\" WHERE \"price\" = 1"
        );
    }

    #[test]
    fn literals_are_left_alone() {
        assert_eq!(
            sql("SELECT p.id FROM Product p WHERE p.name = 'p.name'").unwrap(),
            "SELECT \"Product_id\" FROM \"Product_2\" WHERE \"name\" = 'p.name'"
        );
    }

    #[test]
    fn unknown_entity_field_and_unsupported_forms_fail() {
        assert!(matches!(
            sql("SELECT x FROM Widget x"),
            Err(QueryError::Registry(RegistryError::UnknownEntity(_)))
        ));
        assert!(matches!(
            sql("SELECT p.weight FROM Product p"),
            Err(QueryError::UnknownField { field, .. }) if field == "weight"
        ));
        assert!(matches!(
            sql("INSERT INTO Product VALUES (1)"),
            Err(QueryError::Syntax(_))
        ));
        assert!(matches!(
            sql("SELECT p FROM Product p WHERE p.id IN (SELECT e.id FROM Employee e)"),
            Err(QueryError::Syntax(_))
        ));
        assert!(matches!(sql("SELECT 1"), Err(QueryError::Syntax(_))));
    }
}
