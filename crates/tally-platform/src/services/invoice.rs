use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use tally_core::{EInvoiceStatus, Invoice, InvoiceItem, InvoiceStatus, InvoiceType};
use tally_finance::{InvoiceTotals, ItemAmounts, ItemInput, compute_item, summarize_items};
use tracing::info;

use crate::contracts::{
    CreateInvoiceRequest, InvoiceItemRequest, InvoiceQuery, InvoiceWithItems,
    UpdateInvoiceItemRequest, UpdateInvoiceRequest,
};
use crate::error::{ServiceError, ServiceResult, unique_or};
use crate::schema::{INVOICE_ITEMS, INVOICES, parse_column, parse_optional_column};
use crate::services::{UpdateSet, nullable_patch, optional_text, required_patch, required_text};

fn invoice_from_row(row: &PgRow) -> ServiceResult<Invoice> {
    Ok(Invoice {
        id: row.try_get("id")?,
        company_id: row.try_get("company_id")?,
        invoice_number: row.try_get("invoice_number")?,
        invoice_type: parse_column(row, "invoice_type", InvoiceType::parse)?,
        customer_id: row.try_get("customer_id")?,
        supplier_id: row.try_get("supplier_id")?,
        issue_date: row.try_get("issue_date")?,
        due_date: row.try_get("due_date")?,
        status: parse_column(row, "status", InvoiceStatus::parse)?,
        subtotal: row.try_get("subtotal")?,
        tax_amount: row.try_get("tax_amount")?,
        discount_amount: row.try_get("discount_amount")?,
        total_amount: row.try_get("total_amount")?,
        notes: row.try_get("notes")?,
        terms: row.try_get("terms")?,
        is_recurring: row.try_get("is_recurring")?,
        recurrence_pattern: row.try_get("recurrence_pattern")?,
        next_recurrence_date: row.try_get("next_recurrence_date")?,
        e_invoice_status: parse_optional_column(row, "e_invoice_status", EInvoiceStatus::parse)?,
        e_invoice_reference: row.try_get("e_invoice_reference")?,
    })
}

fn item_from_row(row: &PgRow) -> ServiceResult<InvoiceItem> {
    Ok(InvoiceItem {
        id: row.try_get("id")?,
        invoice_id: row.try_get("invoice_id")?,
        product_id: row.try_get("product_id")?,
        description: row.try_get("description")?,
        quantity: row.try_get("quantity")?,
        unit_price: row.try_get("unit_price")?,
        tax_rate: row.try_get("tax_rate")?,
        tax_amount: row.try_get("tax_amount")?,
        discount_percentage: row.try_get("discount_percentage")?,
        discount_amount: row.try_get("discount_amount")?,
        total_amount: row.try_get("total_amount")?,
    })
}

fn parse_type(value: &str) -> ServiceResult<InvoiceType> {
    InvoiceType::parse(value)
        .ok_or_else(|| ServiceError::invalid("type must be sales or purchase"))
}

fn parse_status(value: &str) -> ServiceResult<InvoiceStatus> {
    InvoiceStatus::parse(value).ok_or_else(|| {
        ServiceError::invalid("status must be draft, sent, paid, overdue or cancelled")
    })
}

fn parse_e_invoice_status(value: &str) -> ServiceResult<EInvoiceStatus> {
    EInvoiceStatus::parse(value).ok_or_else(|| {
        ServiceError::invalid("eInvoiceStatus must be not_applicable, pending, sent or failed")
    })
}

fn check_dates(issue_date: NaiveDate, due_date: NaiveDate) -> ServiceResult<()> {
    if due_date < issue_date {
        return Err(ServiceError::invalid("dueDate must not be before issueDate"));
    }
    Ok(())
}

/// Line values as they will be stored once the amounts are computed.
#[derive(Debug, Clone)]
struct PricedItem {
    product_id: i64,
    description: Option<String>,
    input: ItemInput,
    amounts: ItemAmounts,
}

/// Prices one line. The product's tax rate applies when the line has none.
fn price_item(
    product_id: i64,
    description: Option<String>,
    mut input: ItemInput,
    product_tax_rate: Option<Decimal>,
) -> ServiceResult<PricedItem> {
    input.tax_rate = input.tax_rate.or(product_tax_rate);
    let amounts = compute_item(&input)?;

    Ok(PricedItem {
        product_id,
        description: optional_text(description),
        input,
        amounts,
    })
}

pub async fn list(
    pool: &PgPool,
    company_id: i64,
    query: &InvoiceQuery,
) -> ServiceResult<Vec<Invoice>> {
    let invoice_type = query.invoice_type.as_deref().map(parse_type).transpose()?;
    let status = query.status.as_deref().map(parse_status).transpose()?;

    let sql = format!(
        r#"
        SELECT {}
        FROM invoices
        WHERE company_id = $1
          AND ($2::text IS NULL OR invoice_type = $2)
          AND ($3::text IS NULL OR status = $3)
        ORDER BY issue_date DESC, id DESC
        "#,
        INVOICES.select_list()
    );
    let rows = sqlx::query(&sql)
        .bind(company_id)
        .bind(invoice_type.map(InvoiceType::as_str))
        .bind(status.map(InvoiceStatus::as_str))
        .fetch_all(pool)
        .await?;

    rows.iter().map(invoice_from_row).collect()
}

/// Sent invoices past their due date, oldest due first.
pub async fn overdue(pool: &PgPool, company_id: i64) -> ServiceResult<Vec<Invoice>> {
    let sql = format!(
        r#"
        SELECT {}
        FROM invoices
        WHERE company_id = $1 AND status = $2 AND due_date < CURRENT_DATE
        ORDER BY due_date ASC, id ASC
        "#,
        INVOICES.select_list()
    );
    let rows = sqlx::query(&sql)
        .bind(company_id)
        .bind(InvoiceStatus::Sent.as_str())
        .fetch_all(pool)
        .await?;

    rows.iter().map(invoice_from_row).collect()
}

pub async fn get(
    pool: &PgPool,
    company_id: i64,
    id: i64,
) -> ServiceResult<Option<InvoiceWithItems>> {
    let sql = format!(
        "SELECT {} FROM invoices WHERE id = $1 AND company_id = $2",
        INVOICES.select_list()
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(company_id)
        .fetch_optional(pool)
        .await?;

    with_items(pool, row).await
}

pub async fn by_number(
    pool: &PgPool,
    company_id: i64,
    invoice_number: &str,
) -> ServiceResult<Option<InvoiceWithItems>> {
    let sql = format!(
        "SELECT {} FROM invoices WHERE company_id = $1 AND invoice_number = $2",
        INVOICES.select_list()
    );
    let row = sqlx::query(&sql)
        .bind(company_id)
        .bind(invoice_number.trim())
        .fetch_optional(pool)
        .await?;

    with_items(pool, row).await
}

async fn with_items(pool: &PgPool, row: Option<PgRow>) -> ServiceResult<Option<InvoiceWithItems>> {
    let Some(row) = row else {
        return Ok(None);
    };
    let invoice = invoice_from_row(&row)?;
    let mut conn = pool.acquire().await?;
    let items = load_items(&mut conn, invoice.id).await?;

    Ok(Some(InvoiceWithItems { invoice, items }))
}

/// Creates the header and every item in one transaction, with totals computed
/// from the items.
pub async fn create(
    pool: &PgPool,
    company_id: i64,
    request: CreateInvoiceRequest,
) -> ServiceResult<i64> {
    let invoice_number = required_text(&request.invoice_number, "invoiceNumber")?;
    let invoice_type = parse_type(&request.invoice_type)?;
    let status = match request.status.as_deref() {
        Some(value) => parse_status(value)?,
        None => InvoiceStatus::default(),
    };
    let e_invoice_status = request
        .e_invoice_status
        .as_deref()
        .map(parse_e_invoice_status)
        .transpose()?;
    let issue_date = request
        .issue_date
        .unwrap_or_else(|| Utc::now().date_naive());
    let due_date = request
        .due_date
        .ok_or_else(|| ServiceError::invalid("dueDate is required"))?;
    check_dates(issue_date, due_date)?;

    let mut tx = pool.begin().await?;

    let mut priced = Vec::with_capacity(request.items.len());
    for item in request.items {
        let product_tax_rate = product_tax_rate(&mut tx, company_id, item.product_id).await?;
        let input = item_input(&item);
        priced.push(price_item(
            item.product_id,
            item.description,
            input,
            product_tax_rate,
        )?);
    }
    let totals = summarize_items(priced.iter().map(|item| item.amounts))?;

    let row = sqlx::query(
        r#"
        INSERT INTO invoices (
            company_id, invoice_number, invoice_type, customer_id, supplier_id, issue_date,
            due_date, status, subtotal, tax_amount, discount_amount, total_amount, notes, terms,
            is_recurring, recurrence_pattern, next_recurrence_date, e_invoice_status,
            e_invoice_reference
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
        RETURNING id
        "#,
    )
    .bind(company_id)
    .bind(&invoice_number)
    .bind(invoice_type.as_str())
    .bind(request.customer_id)
    .bind(request.supplier_id)
    .bind(issue_date)
    .bind(due_date)
    .bind(status.as_str())
    .bind(totals.subtotal)
    .bind(totals.tax_amount)
    .bind(totals.discount_amount)
    .bind(totals.total_amount)
    .bind(optional_text(request.notes))
    .bind(optional_text(request.terms))
    .bind(request.is_recurring.unwrap_or(false))
    .bind(optional_text(request.recurrence_pattern))
    .bind(request.next_recurrence_date)
    .bind(e_invoice_status.map(EInvoiceStatus::as_str))
    .bind(optional_text(request.e_invoice_reference))
    .fetch_one(&mut *tx)
    .await
    .map_err(|err| unique_or(err, format!("invoice number {invoice_number} already exists")))?;
    let invoice_id: i64 = row.try_get("id")?;

    for item in &priced {
        insert_item(&mut tx, invoice_id, item).await?;
    }

    tx.commit().await?;

    info!(
        invoice_id,
        company_id,
        items = priced.len(),
        total = %totals.total_amount,
        "invoice created"
    );
    Ok(invoice_id)
}

/// Header fields only; totals follow the items.
pub async fn update(
    pool: &PgPool,
    company_id: i64,
    id: i64,
    request: UpdateInvoiceRequest,
) -> ServiceResult<bool> {
    let invoice_type = request.invoice_type.as_deref().map(parse_type).transpose()?;
    let status = request.status.as_deref().map(parse_status).transpose()?;
    let e_invoice_status = request
        .e_invoice_status
        .as_deref()
        .map(parse_e_invoice_status)
        .transpose()?;
    if let (Some(issue_date), Some(due_date)) = (request.issue_date, request.due_date) {
        check_dates(issue_date, due_date)?;
    }
    let invoice_number = required_patch(request.invoice_number, "invoiceNumber")?;

    let mut update = UpdateSet::new("invoices");
    update
        .set_some("invoice_number", invoice_number.clone())
        .set_some(
            "invoice_type",
            invoice_type.map(|value| value.as_str().to_string()),
        )
        .set_some("customer_id", request.customer_id)
        .set_some("supplier_id", request.supplier_id)
        .set_some("issue_date", request.issue_date)
        .set_some("due_date", request.due_date)
        .set_some("status", status.map(|value| value.as_str().to_string()))
        .set_some("notes", nullable_patch(request.notes))
        .set_some("terms", nullable_patch(request.terms))
        .set_some("is_recurring", request.is_recurring)
        .set_some(
            "recurrence_pattern",
            nullable_patch(request.recurrence_pattern),
        )
        .set_some("next_recurrence_date", request.next_recurrence_date)
        .set_some(
            "e_invoice_status",
            e_invoice_status.map(|value| value.as_str().to_string()),
        )
        .set_some(
            "e_invoice_reference",
            nullable_patch(request.e_invoice_reference),
        );

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
                "invoice number {} already exists",
                invoice_number.as_deref().unwrap_or_default()
            ),
        )
    })?;

    Ok(result.rows_affected() > 0)
}

pub async fn delete(pool: &PgPool, company_id: i64, id: i64) -> ServiceResult<bool> {
    let mut tx = pool.begin().await?;

    if !lock_invoice(&mut tx, company_id, id).await? {
        return Ok(false);
    }
    sqlx::query("DELETE FROM invoice_items WHERE invoice_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM invoices WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

/// `None` when the invoice does not exist for this company.
pub async fn items(
    pool: &PgPool,
    company_id: i64,
    invoice_id: i64,
) -> ServiceResult<Option<Vec<InvoiceItem>>> {
    let mut conn = pool.acquire().await?;
    let exists = sqlx::query("SELECT 1 FROM invoices WHERE id = $1 AND company_id = $2")
        .bind(invoice_id)
        .bind(company_id)
        .fetch_optional(&mut *conn)
        .await?
        .is_some();
    if !exists {
        return Ok(None);
    }

    Ok(Some(load_items(&mut conn, invoice_id).await?))
}

pub async fn add_item(
    pool: &PgPool,
    company_id: i64,
    invoice_id: i64,
    request: InvoiceItemRequest,
) -> ServiceResult<i64> {
    let mut tx = pool.begin().await?;
    if !lock_invoice(&mut tx, company_id, invoice_id).await? {
        return Err(ServiceError::NotFound("invoice"));
    }

    let product_tax_rate = product_tax_rate(&mut tx, company_id, request.product_id).await?;
    let input = item_input(&request);
    let priced = price_item(request.product_id, request.description, input, product_tax_rate)?;
    let item_id = insert_item(&mut tx, invoice_id, &priced).await?;
    recompute_totals(&mut tx, invoice_id).await?;

    tx.commit().await?;
    Ok(item_id)
}

pub async fn update_item(
    pool: &PgPool,
    company_id: i64,
    item_id: i64,
    request: UpdateInvoiceItemRequest,
) -> ServiceResult<bool> {
    let mut tx = pool.begin().await?;

    let sql = format!(
        r#"
        SELECT {}
        FROM invoice_items it
        JOIN invoices inv ON inv.id = it.invoice_id
        WHERE it.id = $1 AND inv.company_id = $2
        FOR UPDATE OF inv, it
        "#,
        INVOICE_ITEMS.qualified("it")
    );
    let Some(row) = sqlx::query(&sql)
        .bind(item_id)
        .bind(company_id)
        .fetch_optional(&mut *tx)
        .await?
    else {
        return Ok(false);
    };
    let existing = item_from_row(&row)?;

    let product_id = request.product_id.unwrap_or(existing.product_id);
    let input = merge_item(&existing, &request);
    let description = match nullable_patch(request.description) {
        Some(description) => description,
        None => existing.description.clone(),
    };
    let product_tax_rate = product_tax_rate(&mut tx, company_id, product_id).await?;
    let priced = price_item(product_id, description, input, product_tax_rate)?;

    sqlx::query(
        r#"
        UPDATE invoice_items
        SET product_id = $2, description = $3, quantity = $4, unit_price = $5, tax_rate = $6,
            tax_amount = $7, discount_percentage = $8, discount_amount = $9, total_amount = $10,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(item_id)
    .bind(priced.product_id)
    .bind(&priced.description)
    .bind(priced.input.quantity)
    .bind(priced.input.unit_price)
    .bind(priced.input.tax_rate)
    .bind(priced.amounts.tax_amount)
    .bind(priced.input.discount_percentage)
    .bind(priced.amounts.discount_amount)
    .bind(priced.amounts.total_amount)
    .execute(&mut *tx)
    .await?;
    recompute_totals(&mut tx, existing.invoice_id).await?;

    tx.commit().await?;
    Ok(true)
}

pub async fn delete_item(pool: &PgPool, company_id: i64, item_id: i64) -> ServiceResult<bool> {
    let mut tx = pool.begin().await?;

    let Some(row) = sqlx::query(
        r#"
        SELECT it.invoice_id
        FROM invoice_items it
        JOIN invoices inv ON inv.id = it.invoice_id
        WHERE it.id = $1 AND inv.company_id = $2
        FOR UPDATE OF inv, it
        "#,
    )
    .bind(item_id)
    .bind(company_id)
    .fetch_optional(&mut *tx)
    .await?
    else {
        return Ok(false);
    };
    let invoice_id: i64 = row.try_get("invoice_id")?;

    sqlx::query("DELETE FROM invoice_items WHERE id = $1")
        .bind(item_id)
        .execute(&mut *tx)
        .await?;
    recompute_totals(&mut tx, invoice_id).await?;

    tx.commit().await?;
    Ok(true)
}

fn item_input(request: &InvoiceItemRequest) -> ItemInput {
    ItemInput {
        quantity: request.quantity,
        unit_price: request.unit_price,
        tax_rate: request.tax_rate,
        discount_percentage: request.discount_percentage,
        discount_amount: request.discount_amount,
    }
}

/// Supplied fields override the stored ones. Supplying either discount field
/// replaces both.
fn merge_item(existing: &InvoiceItem, request: &UpdateInvoiceItemRequest) -> ItemInput {
    let (discount_percentage, discount_amount) =
        if request.discount_percentage.is_some() || request.discount_amount.is_some() {
            (request.discount_percentage, request.discount_amount)
        } else if existing.discount_percentage.is_some() {
            (existing.discount_percentage, None)
        } else {
            (None, existing.discount_amount)
        };

    ItemInput {
        quantity: request.quantity.unwrap_or(existing.quantity),
        unit_price: request.unit_price.unwrap_or(existing.unit_price),
        tax_rate: request.tax_rate.or(existing.tax_rate),
        discount_percentage,
        discount_amount,
    }
}

async fn lock_invoice(conn: &mut PgConnection, company_id: i64, id: i64) -> ServiceResult<bool> {
    let row = sqlx::query("SELECT id FROM invoices WHERE id = $1 AND company_id = $2 FOR UPDATE")
        .bind(id)
        .bind(company_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.is_some())
}

/// The product's default tax rate. Products of other companies are not found.
async fn product_tax_rate(
    conn: &mut PgConnection,
    company_id: i64,
    product_id: i64,
) -> ServiceResult<Option<Decimal>> {
    let row = sqlx::query("SELECT tax_rate FROM products WHERE id = $1 AND company_id = $2")
        .bind(product_id)
        .bind(company_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(ServiceError::NotFound("product"))?;

    Ok(row.try_get("tax_rate")?)
}

async fn insert_item(
    conn: &mut PgConnection,
    invoice_id: i64,
    item: &PricedItem,
) -> ServiceResult<i64> {
    let row = sqlx::query(
        r#"
        INSERT INTO invoice_items (
            invoice_id, product_id, description, quantity, unit_price, tax_rate, tax_amount,
            discount_percentage, discount_amount, total_amount
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#,
    )
    .bind(invoice_id)
    .bind(item.product_id)
    .bind(&item.description)
    .bind(item.input.quantity)
    .bind(item.input.unit_price)
    .bind(item.input.tax_rate)
    .bind(item.amounts.tax_amount)
    .bind(item.input.discount_percentage)
    .bind(item.amounts.discount_amount)
    .bind(item.amounts.total_amount)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.try_get("id")?)
}

async fn load_items(conn: &mut PgConnection, invoice_id: i64) -> ServiceResult<Vec<InvoiceItem>> {
    let sql = format!(
        "SELECT {} FROM invoice_items WHERE invoice_id = $1 ORDER BY id",
        INVOICE_ITEMS.select_list()
    );
    let rows = sqlx::query(&sql)
        .bind(invoice_id)
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(item_from_row).collect()
}

async fn recompute_totals(conn: &mut PgConnection, invoice_id: i64) -> ServiceResult<InvoiceTotals> {
    let items = load_items(conn, invoice_id).await?;
    let totals = summarize_items(items.iter().map(ItemAmounts::from))?;

    sqlx::query(
        r#"
        UPDATE invoices
        SET subtotal = $2, tax_amount = $3, discount_amount = $4, total_amount = $5, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(invoice_id)
    .bind(totals.subtotal)
    .bind(totals.tax_amount)
    .bind(totals.discount_amount)
    .bind(totals.total_amount)
    .execute(&mut *conn)
    .await?;

    Ok(totals)
}
