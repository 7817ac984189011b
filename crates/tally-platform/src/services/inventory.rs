use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use tally_core::{Inventory, ProductType, Warehouse};
use tally_inventory::{
    InventorySummary, StockChange, ValuationLine, compare_urgency, stock_ratio, summarize,
    validate_quantity,
};
use tracing::info;

use crate::contracts::{
    AdjustInventoryRequest, CreateInventoryRequest, CreateWarehouseRequest, InventoryQuery,
    LowStockItem, UpdateInventoryRequest, UpdateWarehouseRequest, WarehouseStock,
};
use crate::error::{ServiceError, ServiceResult, in_use_or};
use crate::schema::{INVENTORY, WAREHOUSES, parse_column};
use crate::services::{UpdateSet, nullable_patch, optional_text, required_patch, required_text};

fn warehouse_from_row(row: &PgRow) -> ServiceResult<Warehouse> {
    Ok(Warehouse {
        id: row.try_get("id")?,
        company_id: row.try_get("company_id")?,
        name: row.try_get("name")?,
        location: row.try_get("location")?,
        is_active: row.try_get("is_active")?,
    })
}

fn inventory_from_row(row: &PgRow) -> ServiceResult<Inventory> {
    Ok(Inventory {
        id: row.try_get("id")?,
        product_id: row.try_get("product_id")?,
        warehouse_id: row.try_get("warehouse_id")?,
        quantity_on_hand: row.try_get("quantity_on_hand")?,
        reorder_level: row.try_get("reorder_level")?,
        reorder_quantity: row.try_get("reorder_quantity")?,
        last_stock_take_date: row.try_get("last_stock_take_date")?,
    })
}

fn check_optional_quantity(value: Option<Decimal>) -> ServiceResult<()> {
    if let Some(value) = value {
        validate_quantity(value)?;
    }
    Ok(())
}

pub async fn list_warehouses(pool: &PgPool, company_id: i64) -> ServiceResult<Vec<Warehouse>> {
    let sql = format!(
        "SELECT {} FROM warehouses WHERE company_id = $1 ORDER BY name, id",
        WAREHOUSES.select_list()
    );
    let rows = sqlx::query(&sql).bind(company_id).fetch_all(pool).await?;

    rows.iter().map(warehouse_from_row).collect()
}

pub async fn get_warehouse(
    pool: &PgPool,
    company_id: i64,
    id: i64,
) -> ServiceResult<Option<Warehouse>> {
    let sql = format!(
        "SELECT {} FROM warehouses WHERE id = $1 AND company_id = $2",
        WAREHOUSES.select_list()
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(company_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(warehouse_from_row).transpose()
}

pub async fn create_warehouse(
    pool: &PgPool,
    company_id: i64,
    request: CreateWarehouseRequest,
) -> ServiceResult<i64> {
    let name = required_text(&request.name, "name")?;

    let row = sqlx::query(
        r#"
        INSERT INTO warehouses (company_id, name, location, is_active)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(company_id)
    .bind(&name)
    .bind(optional_text(request.location))
    .bind(request.is_active.unwrap_or(true))
    .fetch_one(pool)
    .await?;

    Ok(row.try_get("id")?)
}

pub async fn update_warehouse(
    pool: &PgPool,
    company_id: i64,
    id: i64,
    request: UpdateWarehouseRequest,
) -> ServiceResult<bool> {
    let mut update = UpdateSet::new("warehouses");
    update
        .set_some("name", required_patch(request.name, "name")?)
        .set_some("location", nullable_patch(request.location))
        .set_some("is_active", request.is_active);

    let mut builder = update.into_where()?;
    builder
        .push("id = ")
        .push_bind(id)
        .push(" AND company_id = ")
        .push_bind(company_id);
    let result = builder.build().execute(pool).await?;

    Ok(result.rows_affected() > 0)
}

/// Refuses while any inventory row still points at the warehouse.
pub async fn delete_warehouse(pool: &PgPool, company_id: i64, id: i64) -> ServiceResult<bool> {
    let stocked = sqlx::query("SELECT 1 FROM inventory WHERE warehouse_id = $1 LIMIT 1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .is_some();
    if stocked {
        return Err(ServiceError::conflict(
            "warehouse still holds inventory records",
        ));
    }

    let result = sqlx::query("DELETE FROM warehouses WHERE id = $1 AND company_id = $2")
        .bind(id)
        .bind(company_id)
        .execute(pool)
        .await
        .map_err(|err| in_use_or(err, "warehouse still holds inventory records"))?;

    Ok(result.rows_affected() > 0)
}

pub async fn list(
    pool: &PgPool,
    company_id: i64,
    query: &InventoryQuery,
) -> ServiceResult<Vec<Inventory>> {
    let sql = format!(
        r#"
        SELECT {}
        FROM inventory i
        JOIN products p ON p.id = i.product_id
        WHERE p.company_id = $1
          AND ($2::bigint IS NULL OR i.product_id = $2)
          AND ($3::bigint IS NULL OR i.warehouse_id = $3)
        ORDER BY i.id
        "#,
        INVENTORY.qualified("i")
    );
    let rows = sqlx::query(&sql)
        .bind(company_id)
        .bind(query.product_id)
        .bind(query.warehouse_id)
        .fetch_all(pool)
        .await?;

    rows.iter().map(inventory_from_row).collect()
}

pub async fn get(pool: &PgPool, company_id: i64, id: i64) -> ServiceResult<Option<Inventory>> {
    let sql = format!(
        r#"
        SELECT {}
        FROM inventory i
        JOIN products p ON p.id = i.product_id
        WHERE i.id = $1 AND p.company_id = $2
        "#,
        INVENTORY.qualified("i")
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(company_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(inventory_from_row).transpose()
}

/// Stock of one product in every warehouse, with warehouse names.
pub async fn product_inventory(
    pool: &PgPool,
    company_id: i64,
    product_id: i64,
) -> ServiceResult<Vec<WarehouseStock>> {
    let sql = format!(
        r#"
        SELECT {}, w.name AS warehouse_name
        FROM inventory i
        JOIN products p ON p.id = i.product_id
        JOIN warehouses w ON w.id = i.warehouse_id
        WHERE i.product_id = $1 AND p.company_id = $2
        ORDER BY w.name, i.id
        "#,
        INVENTORY.qualified("i")
    );
    let rows = sqlx::query(&sql)
        .bind(product_id)
        .bind(company_id)
        .fetch_all(pool)
        .await?;

    let mut stock = Vec::with_capacity(rows.len());
    for row in rows {
        stock.push(WarehouseStock {
            inventory: inventory_from_row(&row)?,
            warehouse_name: row.try_get("warehouse_name")?,
        });
    }

    Ok(stock)
}

/// Inserts the `(product, warehouse)` row or overwrites the existing one.
pub async fn create(
    pool: &PgPool,
    company_id: i64,
    request: CreateInventoryRequest,
) -> ServiceResult<i64> {
    validate_quantity(request.quantity_on_hand)?;
    check_optional_quantity(request.reorder_level)?;
    check_optional_quantity(request.reorder_quantity)?;

    let mut tx = pool.begin().await?;
    ensure_owned(&mut tx, company_id, request.product_id, request.warehouse_id).await?;

    let row = sqlx::query(
        r#"
        INSERT INTO inventory (
            product_id, warehouse_id, quantity_on_hand, reorder_level, reorder_quantity, last_stock_take_date
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (product_id, warehouse_id) DO UPDATE SET
            quantity_on_hand = EXCLUDED.quantity_on_hand,
            reorder_level = EXCLUDED.reorder_level,
            reorder_quantity = EXCLUDED.reorder_quantity,
            last_stock_take_date = EXCLUDED.last_stock_take_date,
            updated_at = NOW()
        RETURNING id
        "#,
    )
    .bind(request.product_id)
    .bind(request.warehouse_id)
    .bind(request.quantity_on_hand)
    .bind(request.reorder_level)
    .bind(request.reorder_quantity)
    .bind(request.last_stock_take_date)
    .fetch_one(&mut *tx)
    .await?;
    let id: i64 = row.try_get("id")?;

    tx.commit().await?;
    Ok(id)
}

pub async fn update(
    pool: &PgPool,
    company_id: i64,
    id: i64,
    request: UpdateInventoryRequest,
) -> ServiceResult<bool> {
    check_optional_quantity(request.quantity_on_hand)?;
    check_optional_quantity(request.reorder_level)?;
    check_optional_quantity(request.reorder_quantity)?;

    let mut update = UpdateSet::new("inventory");
    update
        .set_some("quantity_on_hand", request.quantity_on_hand)
        .set_some("reorder_level", request.reorder_level)
        .set_some("reorder_quantity", request.reorder_quantity)
        .set_some("last_stock_take_date", request.last_stock_take_date);

    let mut builder = update.into_where()?;
    builder
        .push("id = ")
        .push_bind(id)
        .push(" AND product_id IN (SELECT id FROM products WHERE company_id = ")
        .push_bind(company_id)
        .push(")");
    let result = builder.build().execute(pool).await?;

    Ok(result.rows_affected() > 0)
}

/// Applies a signed delta to one `(product, warehouse)` row under a row lock.
pub async fn adjust(
    pool: &PgPool,
    company_id: i64,
    request: AdjustInventoryRequest,
) -> ServiceResult<Inventory> {
    let mut tx = pool.begin().await?;
    ensure_owned(&mut tx, company_id, request.product_id, request.warehouse_id).await?;

    let current = sqlx::query(
        r#"
        SELECT quantity_on_hand
        FROM inventory
        WHERE product_id = $1 AND warehouse_id = $2
        FOR UPDATE
        "#,
    )
    .bind(request.product_id)
    .bind(request.warehouse_id)
    .fetch_optional(&mut *tx)
    .await?
    .map(|row| row.try_get::<Decimal, _>("quantity_on_hand"))
    .transpose()?;

    let change = tally_inventory::adjust(current, request.quantity)?;
    let sql = match change {
        StockChange::Create { .. } => format!(
            r#"
            INSERT INTO inventory (product_id, warehouse_id, quantity_on_hand)
            VALUES ($1, $2, $3)
            ON CONFLICT (product_id, warehouse_id) DO UPDATE SET
                quantity_on_hand = inventory.quantity_on_hand + EXCLUDED.quantity_on_hand,
                updated_at = NOW()
            RETURNING {}
            "#,
            INVENTORY.select_list()
        ),
        StockChange::Update { .. } => format!(
            r#"
            UPDATE inventory
            SET quantity_on_hand = $3, updated_at = NOW()
            WHERE product_id = $1 AND warehouse_id = $2
            RETURNING {}
            "#,
            INVENTORY.select_list()
        ),
    };
    let row = sqlx::query(&sql)
        .bind(request.product_id)
        .bind(request.warehouse_id)
        .bind(change.quantity_on_hand())
        .fetch_one(&mut *tx)
        .await?;
    let inventory = inventory_from_row(&row)?;

    tx.commit().await?;

    info!(
        product_id = request.product_id,
        warehouse_id = request.warehouse_id,
        delta = %request.quantity,
        on_hand = %inventory.quantity_on_hand,
        "inventory adjusted"
    );
    Ok(inventory)
}

/// Rows at or below their reorder level, most urgent first.
pub async fn low_stock(pool: &PgPool, company_id: i64) -> ServiceResult<Vec<LowStockItem>> {
    let rows = sqlx::query(
        r#"
        SELECT
            i.id, i.product_id, p.code AS product_code, p.name AS product_name,
            i.warehouse_id, w.name AS warehouse_name, i.quantity_on_hand, i.reorder_level
        FROM inventory i
        JOIN products p ON p.id = i.product_id
        JOIN warehouses w ON w.id = i.warehouse_id
        WHERE p.company_id = $1
          AND i.reorder_level IS NOT NULL
          AND i.quantity_on_hand <= i.reorder_level
        "#,
    )
    .bind(company_id)
    .fetch_all(pool)
    .await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        items.push(LowStockItem {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            product_code: row.try_get("product_code")?,
            product_name: row.try_get("product_name")?,
            warehouse_id: row.try_get("warehouse_id")?,
            warehouse_name: row.try_get("warehouse_name")?,
            quantity_on_hand: row.try_get("quantity_on_hand")?,
            reorder_level: row.try_get("reorder_level")?,
        });
    }
    sort_by_urgency(&mut items);

    Ok(items)
}

fn sort_by_urgency(items: &mut [LowStockItem]) {
    items.sort_by(|left, right| {
        compare_urgency(
            stock_ratio(left.quantity_on_hand, left.reorder_level),
            stock_ratio(right.quantity_on_hand, right.reorder_level),
        )
        .then(left.id.cmp(&right.id))
    });
}

pub async fn summary(pool: &PgPool, company_id: i64) -> ServiceResult<InventorySummary> {
    let rows = sqlx::query(
        r#"
        SELECT i.product_id, p.type, p.purchase_price, i.quantity_on_hand, i.reorder_level
        FROM inventory i
        JOIN products p ON p.id = i.product_id
        WHERE p.company_id = $1
        "#,
    )
    .bind(company_id)
    .fetch_all(pool)
    .await?;

    let mut lines = Vec::with_capacity(rows.len());
    for row in &rows {
        lines.push(ValuationLine {
            product_id: row.try_get("product_id")?,
            product_type: parse_column(row, "type", ProductType::parse)?,
            purchase_price: row.try_get("purchase_price")?,
            quantity_on_hand: row.try_get("quantity_on_hand")?,
            reorder_level: row.try_get("reorder_level")?,
        });
    }

    Ok(summarize(lines))
}

async fn ensure_owned(
    conn: &mut PgConnection,
    company_id: i64,
    product_id: i64,
    warehouse_id: i64,
) -> ServiceResult<()> {
    let product = sqlx::query("SELECT 1 FROM products WHERE id = $1 AND company_id = $2")
        .bind(product_id)
        .bind(company_id)
        .fetch_optional(&mut *conn)
        .await?;
    if product.is_none() {
        return Err(ServiceError::NotFound("product"));
    }

    let warehouse = sqlx::query("SELECT 1 FROM warehouses WHERE id = $1 AND company_id = $2")
        .bind(warehouse_id)
        .bind(company_id)
        .fetch_optional(&mut *conn)
        .await?;
    if warehouse.is_none() {
        return Err(ServiceError::NotFound("warehouse"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, on_hand: i64, level: Option<i64>) -> LowStockItem {
        LowStockItem {
            id,
            product_id: id,
            product_code: format!("SKU-{id}"),
            product_name: "Printer paper".to_string(),
            warehouse_id: 1,
            warehouse_name: "Main".to_string(),
            quantity_on_hand: Decimal::from(on_hand),
            reorder_level: level.map(Decimal::from),
        }
    }

    #[test]
    fn low_stock_sorts_by_ratio_then_id() {
        let mut items = vec![
            item(1, 8, Some(10)),
            item(2, 0, Some(0)),
            item(3, 1, Some(10)),
            item(4, 5, Some(10)),
            item(5, 2, Some(20)),
        ];

        sort_by_urgency(&mut items);

        let order: Vec<i64> = items.iter().map(|item| item.id).collect();
        assert_eq!(order, vec![3, 5, 4, 1, 2]);
    }

    #[test]
    fn negative_reorder_settings_are_rejected() {
        assert!(check_optional_quantity(None).is_ok());
        assert!(check_optional_quantity(Some(Decimal::TEN)).is_ok());
        assert!(matches!(
            check_optional_quantity(Some(Decimal::NEGATIVE_ONE)),
            Err(ServiceError::Stock(_))
        ));
    }
}
