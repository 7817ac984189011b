use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgRow};
use tally_core::{AmountIssue, Product, ProductType, check_amount};

use crate::contracts::{CreateProductRequest, ProductQuery, UpdateProductRequest};
use crate::error::{ServiceError, ServiceResult, in_use_or, unique_or};
use crate::schema::{PRODUCTS, parse_column};
use crate::services::{
    UpdateSet, nullable_patch, optional_text, required_patch, required_text,
};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

pub(crate) fn product_from_row(row: &PgRow) -> ServiceResult<Product> {
    Ok(Product {
        id: row.try_get("id")?,
        company_id: row.try_get("company_id")?,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        product_type: parse_column(row, "type", ProductType::parse)?,
        purchase_price: row.try_get("purchase_price")?,
        sale_price: row.try_get("sale_price")?,
        tax_rate: row.try_get("tax_rate")?,
        is_active: row.try_get("is_active")?,
    })
}

fn parse_product_type(value: &str) -> ServiceResult<ProductType> {
    ProductType::parse(value)
        .ok_or_else(|| ServiceError::invalid("type must be inventory or service"))
}

fn check_price(value: Option<Decimal>, field: &str) -> ServiceResult<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if value < Decimal::ZERO {
        return Err(ServiceError::invalid(format!("{field} must not be negative")));
    }
    check_amount(value).map_err(|issue| {
        ServiceError::invalid(match issue {
            AmountIssue::TooPrecise => format!("{field} allows at most 4 decimal places"),
            AmountIssue::OutOfRange => format!("{field} is outside the supported range"),
        })
    })?;
    Ok(())
}

fn check_tax_rate(value: Option<Decimal>) -> ServiceResult<()> {
    match value {
        Some(value) if value < Decimal::ZERO || value > HUNDRED => Err(ServiceError::invalid(
            "taxRate must be between 0 and 100",
        )),
        Some(value) if check_amount(value).is_err() => Err(ServiceError::invalid(
            "taxRate allows at most 4 decimal places",
        )),
        _ => Ok(()),
    }
}

pub async fn list(
    pool: &PgPool,
    company_id: i64,
    query: &ProductQuery,
) -> ServiceResult<Vec<Product>> {
    let sql = format!(
        r#"
        SELECT {}
        FROM products
        WHERE company_id = $1
          AND ($2::text IS NULL OR category = $2)
          AND ($3::boolean IS NULL OR is_active = $3)
        ORDER BY code
        "#,
        PRODUCTS.select_list()
    );
    let rows = sqlx::query(&sql)
        .bind(company_id)
        .bind(optional_text(query.category.clone()))
        .bind(query.active)
        .fetch_all(pool)
        .await?;

    rows.iter().map(product_from_row).collect()
}

pub async fn get(pool: &PgPool, company_id: i64, id: i64) -> ServiceResult<Option<Product>> {
    let sql = format!(
        "SELECT {} FROM products WHERE id = $1 AND company_id = $2",
        PRODUCTS.select_list()
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(company_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(product_from_row).transpose()
}

pub async fn by_code(
    pool: &PgPool,
    company_id: i64,
    code: &str,
) -> ServiceResult<Option<Product>> {
    let sql = format!(
        "SELECT {} FROM products WHERE company_id = $1 AND code = $2",
        PRODUCTS.select_list()
    );
    let row = sqlx::query(&sql)
        .bind(company_id)
        .bind(code.trim())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(product_from_row).transpose()
}

pub async fn create(
    pool: &PgPool,
    company_id: i64,
    request: CreateProductRequest,
) -> ServiceResult<i64> {
    let code = required_text(&request.code, "code")?;
    let name = required_text(&request.name, "name")?;
    let product_type = match request.product_type.as_deref() {
        Some(value) => parse_product_type(value)?,
        None => ProductType::Inventory,
    };
    let sale_price = request
        .sale_price
        .ok_or_else(|| ServiceError::invalid("salePrice is required"))?;
    check_price(Some(sale_price), "salePrice")?;
    check_price(request.purchase_price, "purchasePrice")?;
    check_tax_rate(request.tax_rate)?;

    let row = sqlx::query(
        r#"
        INSERT INTO products (
            company_id, code, name, description, category, type,
            purchase_price, sale_price, tax_rate, is_active
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#,
    )
    .bind(company_id)
    .bind(&code)
    .bind(&name)
    .bind(optional_text(request.description))
    .bind(optional_text(request.category))
    .bind(product_type.as_str())
    .bind(request.purchase_price)
    .bind(sale_price)
    .bind(request.tax_rate)
    .bind(request.is_active.unwrap_or(true))
    .fetch_one(pool)
    .await
    .map_err(|err| unique_or(err, format!("product code {code} already exists")))?;

    Ok(row.try_get("id")?)
}

pub async fn update(
    pool: &PgPool,
    company_id: i64,
    id: i64,
    request: UpdateProductRequest,
) -> ServiceResult<bool> {
    let product_type = request
        .product_type
        .as_deref()
        .map(parse_product_type)
        .transpose()?;
    check_price(request.sale_price, "salePrice")?;
    check_price(request.purchase_price, "purchasePrice")?;
    check_tax_rate(request.tax_rate)?;
    let code = required_patch(request.code, "code")?;

    let mut update = UpdateSet::new("products");
    update
        .set_some("code", code.clone())
        .set_some("name", required_patch(request.name, "name")?)
        .set_some("description", nullable_patch(request.description))
        .set_some("category", nullable_patch(request.category))
        .set_some(
            "type",
            product_type.map(|product_type| product_type.as_str().to_string()),
        )
        .set_some("purchase_price", request.purchase_price)
        .set_some("sale_price", request.sale_price)
        .set_some("tax_rate", request.tax_rate)
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
                "product code {} already exists",
                code.as_deref().unwrap_or_default()
            ),
        )
    })?;

    Ok(result.rows_affected() > 0)
}

/// Products referenced by invoice items cannot be deleted.
pub async fn delete(pool: &PgPool, company_id: i64, id: i64) -> ServiceResult<bool> {
    let result = sqlx::query("DELETE FROM products WHERE id = $1 AND company_id = $2")
        .bind(id)
        .bind(company_id)
        .execute(pool)
        .await
        .map_err(|err| in_use_or(err, "product is referenced by invoice items"))?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_and_rate_bounds() {
        assert!(check_price(Some(Decimal::ZERO), "salePrice").is_ok());
        assert!(check_price(None, "purchasePrice").is_ok());
        assert!(check_price(Some(Decimal::new(-1, 2)), "salePrice").is_err());
        assert!(check_price(Some(Decimal::new(1, 5)), "salePrice").is_err());
        assert!(check_price(Some(Decimal::MAX), "purchasePrice").is_err());

        assert!(check_tax_rate(Some(Decimal::new(5, 0))).is_ok());
        assert!(check_tax_rate(Some(Decimal::new(101, 0))).is_err());
        assert!(check_tax_rate(Some(Decimal::NEGATIVE_ONE)).is_err());
        assert!(check_tax_rate(Some(Decimal::new(500_001, 5))).is_err());
    }

    #[test]
    fn product_type_accepts_known_values_only() {
        assert_eq!(parse_product_type("Service").unwrap(), ProductType::Service);
        assert!(matches!(
            parse_product_type("bundle"),
            Err(ServiceError::Invalid(_))
        ));
    }
}
