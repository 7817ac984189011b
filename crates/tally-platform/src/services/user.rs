use sqlx::{PgPool, Row, postgres::PgRow};
use tally_core::{Role, User};

use crate::contracts::{CreateUserRequest, UpdateUserRequest};
use crate::error::{ServiceError, ServiceResult, in_use_or, unique_or};
use crate::password::{hash_password_blocking, validate_new_password};
use crate::schema::{USERS, parse_column};
use crate::services::{UpdateSet, normalize_email, required_patch, required_text};

pub(crate) fn user_from_row(row: &PgRow) -> ServiceResult<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        role: parse_column(row, "role", Role::parse)?,
        company_id: row.try_get("company_id")?,
        is_active: row.try_get("is_active")?,
        last_login: row.try_get("last_login")?,
    })
}

pub(crate) fn parse_role(value: Option<&str>) -> ServiceResult<Role> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => Role::parse(value).ok_or_else(|| {
            ServiceError::invalid("role must be admin, manager, accountant or user")
        }),
        None => Ok(Role::default()),
    }
}

pub async fn list(pool: &PgPool, company_id: i64) -> ServiceResult<Vec<User>> {
    let sql = format!(
        "SELECT {} FROM users WHERE company_id = $1 ORDER BY last_name, first_name, id",
        USERS.select_list()
    );
    let rows = sqlx::query(&sql).bind(company_id).fetch_all(pool).await?;

    rows.iter().map(user_from_row).collect()
}

pub async fn get(pool: &PgPool, company_id: i64, id: i64) -> ServiceResult<Option<User>> {
    let sql = format!(
        "SELECT {} FROM users WHERE id = $1 AND company_id = $2",
        USERS.select_list()
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(company_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(user_from_row).transpose()
}

/// Unscoped lookup used by the auth layer.
pub async fn by_id(pool: &PgPool, id: i64) -> ServiceResult<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = $1", USERS.select_list());
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;

    row.as_ref().map(user_from_row).transpose()
}

/// Creates a user in the caller's company. Without a password the account
/// exists but cannot log in until an admin resets it.
pub async fn create(
    pool: &PgPool,
    company_id: i64,
    request: CreateUserRequest,
) -> ServiceResult<i64> {
    let email = normalize_email(&request.email)?;
    let first_name = required_text(&request.first_name, "firstName")?;
    let last_name = required_text(&request.last_name, "lastName")?;
    let role = parse_role(request.role.as_deref())?;

    let password_hash = match request.password {
        Some(password) if !password.is_empty() => {
            validate_new_password(&password).map_err(|err| ServiceError::invalid(err.to_string()))?;
            Some(hash_password_blocking(password).await?)
        }
        _ => None,
    };

    let row = sqlx::query(
        r#"
        INSERT INTO users (company_id, email, password_hash, first_name, last_name, role, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(company_id)
    .bind(&email)
    .bind(password_hash)
    .bind(&first_name)
    .bind(&last_name)
    .bind(role.as_str())
    .bind(request.is_active.unwrap_or(true))
    .fetch_one(pool)
    .await
    .map_err(|err| unique_or(err, format!("user with email {email} already exists")))?;

    Ok(row.try_get("id")?)
}

/// `company_id` is not updatable.
pub async fn update(
    pool: &PgPool,
    company_id: i64,
    id: i64,
    request: UpdateUserRequest,
) -> ServiceResult<bool> {
    let email = request
        .email
        .as_deref()
        .map(normalize_email)
        .transpose()?;
    let role = request
        .role
        .as_deref()
        .map(|role| parse_role(Some(role)))
        .transpose()?;

    let mut update = UpdateSet::new("users");
    update
        .set_some("email", email.clone())
        .set_some("first_name", required_patch(request.first_name, "firstName")?)
        .set_some("last_name", required_patch(request.last_name, "lastName")?)
        .set_some("role", role.map(|role| role.as_str().to_string()))
        .set_some("is_active", request.is_active);

    let mut builder = update.into_where()?;
    builder
        .push("id = ")
        .push_bind(id)
        .push(" AND company_id = ")
        .push_bind(company_id);

    let result = builder.build().execute(pool).await.map_err(|err| {
        unique_or(
            err,
            format!(
                "user with email {} already exists",
                email.as_deref().unwrap_or_default()
            ),
        )
    })?;

    Ok(result.rows_affected() > 0)
}

pub async fn delete(pool: &PgPool, company_id: i64, id: i64) -> ServiceResult<bool> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1 AND company_id = $2")
        .bind(id)
        .bind(company_id)
        .execute(pool)
        .await
        .map_err(|err| in_use_or(err, "user has created journal entries"))?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_defaults_to_user_and_rejects_unknown() {
        assert_eq!(parse_role(None).unwrap(), Role::User);
        assert_eq!(parse_role(Some("  ")).unwrap(), Role::User);
        assert_eq!(parse_role(Some("Accountant")).unwrap(), Role::Accountant);
        assert!(matches!(
            parse_role(Some("superuser")),
            Err(ServiceError::Invalid(_))
        ));
    }
}
