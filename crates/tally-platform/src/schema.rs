//! Column lists for every table the services read.
//!
//! Each mapping drives the SELECT list of its service and is checked against
//! `information_schema.columns` once at startup.

use std::collections::HashSet;

use anyhow::Result;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::info;

use crate::error::ServiceError;

#[derive(Debug, Clone, Copy)]
pub struct TableMapping {
    pub table: &'static str,
    pub columns: &'static [&'static str],
}

impl TableMapping {
    pub fn select_list(&self) -> String {
        self.columns.join(", ")
    }

    /// Columns prefixed with a table alias, e.g. `i.id, i.product_id`.
    pub fn qualified(&self, alias: &str) -> String {
        self.columns
            .iter()
            .map(|column| format!("{alias}.{column}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn missing_columns(&self, present: &HashSet<String>) -> Vec<&'static str> {
        self.columns
            .iter()
            .copied()
            .filter(|column| !present.contains(*column))
            .collect()
    }
}

pub const COMPANIES: TableMapping = TableMapping {
    table: "companies",
    columns: &[
        "id",
        "name",
        "trade_license_number",
        "tax_registration_number",
        "address",
        "city",
        "country",
        "phone",
        "email",
        "website",
        "fiscal_year_start",
        "base_currency",
        "logo_url",
    ],
};

pub const USERS: TableMapping = TableMapping {
    table: "users",
    columns: &[
        "id",
        "email",
        "first_name",
        "last_name",
        "role",
        "company_id",
        "is_active",
        "last_login",
    ],
};

pub const USER_CREDENTIALS: TableMapping = TableMapping {
    table: "users",
    columns: &["id", "password_hash", "is_active"],
};

pub const CHART_OF_ACCOUNTS: TableMapping = TableMapping {
    table: "chart_of_accounts",
    columns: &[
        "id",
        "company_id",
        "account_code",
        "account_name",
        "account_type",
        "account_category",
        "is_active",
        "description",
    ],
};

pub const JOURNAL_ENTRIES: TableMapping = TableMapping {
    table: "journal_entries",
    columns: &[
        "id",
        "company_id",
        "entry_number",
        "entry_date",
        "description",
        "reference",
        "is_posted",
        "created_by",
        "created_at",
        "updated_at",
    ],
};

pub const JOURNAL_ENTRY_LINES: TableMapping = TableMapping {
    table: "journal_entry_lines",
    columns: &[
        "id",
        "journal_entry_id",
        "account_id",
        "description",
        "debit_amount",
        "credit_amount",
    ],
};

pub const PRODUCTS: TableMapping = TableMapping {
    table: "products",
    columns: &[
        "id",
        "company_id",
        "code",
        "name",
        "description",
        "category",
        "type",
        "purchase_price",
        "sale_price",
        "tax_rate",
        "is_active",
    ],
};

pub const WAREHOUSES: TableMapping = TableMapping {
    table: "warehouses",
    columns: &["id", "company_id", "name", "location", "is_active"],
};

pub const INVENTORY: TableMapping = TableMapping {
    table: "inventory",
    columns: &[
        "id",
        "product_id",
        "warehouse_id",
        "quantity_on_hand",
        "reorder_level",
        "reorder_quantity",
        "last_stock_take_date",
    ],
};

pub const INVOICES: TableMapping = TableMapping {
    table: "invoices",
    columns: &[
        "id",
        "company_id",
        "invoice_number",
        "invoice_type",
        "customer_id",
        "supplier_id",
        "issue_date",
        "due_date",
        "status",
        "subtotal",
        "tax_amount",
        "discount_amount",
        "total_amount",
        "notes",
        "terms",
        "is_recurring",
        "recurrence_pattern",
        "next_recurrence_date",
        "e_invoice_status",
        "e_invoice_reference",
    ],
};

pub const INVOICE_ITEMS: TableMapping = TableMapping {
    table: "invoice_items",
    columns: &[
        "id",
        "invoice_id",
        "product_id",
        "description",
        "quantity",
        "unit_price",
        "tax_rate",
        "tax_amount",
        "discount_percentage",
        "discount_amount",
        "total_amount",
    ],
};

pub const ALL_MAPPINGS: &[TableMapping] = &[
    COMPANIES,
    USERS,
    USER_CREDENTIALS,
    CHART_OF_ACCOUNTS,
    JOURNAL_ENTRIES,
    JOURNAL_ENTRY_LINES,
    PRODUCTS,
    WAREHOUSES,
    INVENTORY,
    INVOICES,
    INVOICE_ITEMS,
];

pub async fn verify_schema(pool: &PgPool) -> Result<()> {
    let mut drift = Vec::new();

    for mapping in ALL_MAPPINGS {
        let rows = sqlx::query(
            r#"
            SELECT column_name::text AS column_name
            FROM information_schema.columns
            WHERE table_schema = current_schema() AND table_name = $1
            "#,
        )
        .bind(mapping.table)
        .fetch_all(pool)
        .await?;

        let mut present = HashSet::with_capacity(rows.len());
        for row in rows {
            present.insert(row.try_get::<String, _>("column_name")?);
        }

        let missing = mapping.missing_columns(&present);
        if !missing.is_empty() {
            drift.push(format!("{}({})", mapping.table, missing.join(", ")));
        }
    }

    if !drift.is_empty() {
        anyhow::bail!("database schema is missing columns: {}", drift.join("; "));
    }

    info!(tables = ALL_MAPPINGS.len(), "database schema verified");
    Ok(())
}

/// Reads a text column and converts it with an enum's `parse`.
pub(crate) fn parse_column<T>(
    row: &PgRow,
    column: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<T, ServiceError> {
    let raw: String = row.try_get(column)?;
    parse(&raw).ok_or_else(|| {
        ServiceError::Internal(anyhow::anyhow!("unexpected value {raw:?} in column {column}"))
    })
}

pub(crate) fn parse_optional_column<T>(
    row: &PgRow,
    column: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<Option<T>, ServiceError> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|raw| {
        parse(&raw).ok_or_else(|| {
            ServiceError::Internal(anyhow::anyhow!("unexpected value {raw:?} in column {column}"))
        })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_list_and_qualified_follow_column_order() {
        assert_eq!(
            WAREHOUSES.select_list(),
            "id, company_id, name, location, is_active"
        );
        assert_eq!(
            WAREHOUSES.qualified("w"),
            "w.id, w.company_id, w.name, w.location, w.is_active"
        );
    }

    #[test]
    fn missing_columns_reports_drift() {
        let present: HashSet<String> = ["id", "company_id", "name", "is_active"]
            .into_iter()
            .map(str::to_string)
            .collect();

        assert_eq!(WAREHOUSES.missing_columns(&present), vec!["location"]);
    }

    #[test]
    fn mappings_have_unique_columns() {
        for mapping in ALL_MAPPINGS {
            let unique: HashSet<_> = mapping.columns.iter().collect();
            assert_eq!(unique.len(), mapping.columns.len(), "{}", mapping.table);
        }
    }
}
