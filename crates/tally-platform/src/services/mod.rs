pub mod auth;
pub mod company;
pub mod inventory;
pub mod invoice;
pub mod ledger;
pub mod product;
pub mod user;

use sqlx::{Encode, Postgres, QueryBuilder, Type};

use crate::error::{ServiceError, ServiceResult};

/// Builds `UPDATE <table> SET a = $1, b = $2, updated_at = NOW() WHERE ...`
/// from whichever fields a request supplied.
pub(crate) struct UpdateSet<'args> {
    builder: QueryBuilder<'args, Postgres>,
    assignments: usize,
}

impl<'args> UpdateSet<'args> {
    pub(crate) fn new(table: &str) -> Self {
        Self {
            builder: QueryBuilder::new(format!("UPDATE {table} SET ")),
            assignments: 0,
        }
    }

    pub(crate) fn set<T>(&mut self, column: &str, value: T) -> &mut Self
    where
        T: 'args + Encode<'args, Postgres> + Type<Postgres> + Send,
    {
        if self.assignments > 0 {
            self.builder.push(", ");
        }
        self.builder.push(column).push(" = ").push_bind(value);
        self.assignments += 1;
        self
    }

    pub(crate) fn set_some<T>(&mut self, column: &str, value: Option<T>) -> &mut Self
    where
        T: 'args + Encode<'args, Postgres> + Type<Postgres> + Send,
    {
        if let Some(value) = value {
            self.set(column, value);
        }
        self
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.assignments == 0
    }

    /// Fails when nothing was assigned; otherwise returns the builder positioned
    /// after `WHERE ` for the caller's key predicate.
    pub(crate) fn into_where(mut self) -> ServiceResult<QueryBuilder<'args, Postgres>> {
        if self.is_empty() {
            return Err(ServiceError::invalid("no fields to update"));
        }
        self.builder.push(", updated_at = NOW() WHERE ");
        Ok(self.builder)
    }
}

/// Trimmed, non-empty text or a validation error naming the field.
pub(crate) fn required_text(value: &str, field: &str) -> ServiceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::invalid(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// Trimmed text; blank becomes `None`.
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Patch value for a nullable text column: absent leaves it alone, blank
/// clears it.
pub(crate) fn nullable_patch(value: Option<String>) -> Option<Option<String>> {
    value.map(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Patch value for a required text column: blank is rejected.
pub(crate) fn required_patch(value: Option<String>, field: &str) -> ServiceResult<Option<String>> {
    value.map(|value| required_text(&value, field)).transpose()
}

pub(crate) fn normalize_email(value: &str) -> ServiceResult<String> {
    let email = value.trim().to_ascii_lowercase();
    if email.is_empty() {
        return Err(ServiceError::invalid("email is required"));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(ServiceError::invalid("email is not valid")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_set_lists_only_supplied_columns() {
        let mut update = UpdateSet::new("warehouses");
        update
            .set_some("name", Some("Jebel Ali DC".to_string()))
            .set_some::<String>("location", None)
            .set("is_active", false);

        let mut builder = update.into_where().unwrap();
        builder.push("id = ").push_bind(7_i64);

        assert_eq!(
            builder.sql(),
            "UPDATE warehouses SET name = $1, is_active = $2, updated_at = NOW() WHERE id = $3"
        );
    }

    #[test]
    fn empty_update_is_invalid() {
        let update = UpdateSet::new("products");
        assert!(matches!(update.into_where(), Err(ServiceError::Invalid(_))));
    }

    #[test]
    fn text_helpers_trim_and_clear() {
        assert_eq!(optional_text(Some("  ".to_string())), None);
        assert_eq!(nullable_patch(Some(String::new())), Some(None));
        assert_eq!(nullable_patch(None), None);
        assert!(required_patch(Some(" ".to_string()), "name").is_err());
        assert_eq!(normalize_email(" Owner@Example.AE ").unwrap(), "owner@example.ae");
        assert!(normalize_email("owner").is_err());
    }
}
