use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use tally_core::{Company, SmeProfile, StandardsProfile};
use tracing::info;

use crate::contracts::{CreateCompanyRequest, UpdateCompanyRequest};
use crate::error::{ServiceResult, in_use_or};
use crate::schema::COMPANIES;
use crate::services::{UpdateSet, nullable_patch, optional_text, required_patch, required_text};

const DEFAULT_COUNTRY: &str = "UAE";

fn company_from_row(row: &PgRow) -> ServiceResult<Company> {
    Ok(Company {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        trade_license_number: row.try_get("trade_license_number")?,
        tax_registration_number: row.try_get("tax_registration_number")?,
        address: row.try_get("address")?,
        city: row.try_get("city")?,
        country: row.try_get("country")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        website: row.try_get("website")?,
        fiscal_year_start: row.try_get("fiscal_year_start")?,
        base_currency: row.try_get("base_currency")?,
        logo_url: row.try_get("logo_url")?,
    })
}

/// Callers only ever see their own company.
pub async fn list(pool: &PgPool, company_id: i64) -> ServiceResult<Vec<Company>> {
    Ok(get(pool, company_id, company_id).await?.into_iter().collect())
}

pub async fn get(pool: &PgPool, company_id: i64, id: i64) -> ServiceResult<Option<Company>> {
    if id != company_id {
        return Ok(None);
    }

    let sql = format!(
        "SELECT {} FROM companies WHERE id = $1",
        COMPANIES.select_list()
    );
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;

    row.as_ref().map(company_from_row).transpose()
}

pub async fn create(pool: &PgPool, request: CreateCompanyRequest) -> ServiceResult<i64> {
    let seed = request.seed_chart_of_accounts.unwrap_or(true);

    let mut tx = pool.begin().await?;
    let company_id = insert_company(&mut tx, request).await?;
    if seed {
        seed_chart(&mut tx, company_id, &SmeProfile).await?;
    }
    tx.commit().await?;

    info!(company_id, seeded = seed, "company created");
    Ok(company_id)
}

pub async fn update(
    pool: &PgPool,
    company_id: i64,
    id: i64,
    request: UpdateCompanyRequest,
) -> ServiceResult<bool> {
    if id != company_id {
        return Ok(false);
    }

    let mut update = UpdateSet::new("companies");
    update
        .set_some("name", required_patch(request.name, "name")?)
        .set_some(
            "trade_license_number",
            nullable_patch(request.trade_license_number),
        )
        .set_some(
            "tax_registration_number",
            nullable_patch(request.tax_registration_number),
        )
        .set_some("address", nullable_patch(request.address))
        .set_some("city", nullable_patch(request.city))
        .set_some("country", required_patch(request.country, "country")?)
        .set_some("phone", nullable_patch(request.phone))
        .set_some("email", nullable_patch(request.email))
        .set_some("website", nullable_patch(request.website))
        .set_some("fiscal_year_start", request.fiscal_year_start)
        .set_some(
            "base_currency",
            required_patch(request.base_currency, "baseCurrency")?
                .map(|currency| currency.to_ascii_uppercase()),
        )
        .set_some("logo_url", nullable_patch(request.logo_url));

    let mut builder = update.into_where()?;
    builder.push("id = ").push_bind(id);
    let result = builder.build().execute(pool).await?;

    Ok(result.rows_affected() > 0)
}

/// Everything owned by the company is removed with it.
pub async fn delete(pool: &PgPool, company_id: i64, id: i64) -> ServiceResult<bool> {
    if id != company_id {
        return Ok(false);
    }

    let result = sqlx::query("DELETE FROM companies WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|err| in_use_or(err, "company still has dependent records"))?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn insert_company(
    tx: &mut Transaction<'_, Postgres>,
    request: CreateCompanyRequest,
) -> ServiceResult<i64> {
    let name = required_text(&request.name, "name")?;
    let country = optional_text(request.country).unwrap_or_else(|| DEFAULT_COUNTRY.to_string());
    let base_currency = optional_text(request.base_currency)
        .map(|currency| currency.to_ascii_uppercase())
        .unwrap_or_else(|| SmeProfile.base_currency().to_string());

    let row = sqlx::query(
        r#"
        INSERT INTO companies (
            name, trade_license_number, tax_registration_number, address, city, country,
            phone, email, website, fiscal_year_start, base_currency, logo_url
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING id
        "#,
    )
    .bind(&name)
    .bind(optional_text(request.trade_license_number))
    .bind(optional_text(request.tax_registration_number))
    .bind(optional_text(request.address))
    .bind(optional_text(request.city))
    .bind(&country)
    .bind(optional_text(request.phone))
    .bind(optional_text(request.email))
    .bind(optional_text(request.website))
    .bind(request.fiscal_year_start)
    .bind(&base_currency)
    .bind(optional_text(request.logo_url))
    .fetch_one(&mut **tx)
    .await?;

    Ok(row.try_get("id")?)
}

pub(crate) async fn seed_chart(
    tx: &mut Transaction<'_, Postgres>,
    company_id: i64,
    profile: &(dyn StandardsProfile + Sync),
) -> ServiceResult<()> {
    let chart = profile.chart_of_accounts();
    for account in &chart {
        sqlx::query(
            r#"
            INSERT INTO chart_of_accounts (
                company_id, account_code, account_name, account_type, account_category
            )
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(company_id)
        .bind(account.code)
        .bind(account.name)
        .bind(account.account_type.as_str())
        .bind(account.category)
        .execute(&mut **tx)
        .await?;
    }

    info!(
        company_id,
        profile = profile.name(),
        accounts = chart.len(),
        "chart of accounts seeded"
    );
    Ok(())
}
