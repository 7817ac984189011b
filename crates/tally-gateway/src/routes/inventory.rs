use axum::{
    Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use tally_core::{Inventory, Warehouse};
use tally_inventory::InventorySummary;
use tally_platform::{
    AdjustInventoryRequest, CreateInventoryRequest, CreateWarehouseRequest, IdResponse,
    InventoryQuery, LowStockItem, UpdateInventoryRequest, UpdateWarehouseRequest,
    WarehouseStock, services::inventory,
};

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiJson, ApiResult, Created, created, done, ok};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/inventory", get(list_inventory).post(create_inventory))
        .route("/inventory/low-stock", get(list_low_stock))
        .route("/inventory/summary", get(get_summary))
        .route("/inventory/adjust", post(adjust_inventory))
        .route("/inventory/products/{product_id}", get(get_product_inventory))
        .route(
            "/inventory/warehouses",
            get(list_warehouses).post(create_warehouse),
        )
        .route(
            "/inventory/warehouses/{id}",
            get(get_warehouse)
                .put(update_warehouse)
                .delete(delete_warehouse),
        )
        .route(
            "/inventory/{id}",
            get(get_inventory).put(update_inventory),
        )
}

async fn list_inventory(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<InventoryQuery>,
) -> ApiResult<Vec<Inventory>> {
    ok(inventory::list(&state.pool, caller.company_id(), &query).await?)
}

async fn get_inventory(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Inventory> {
    let found = inventory::get(&state.pool, caller.company_id(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("inventory record"))?;
    ok(found)
}

async fn get_product_inventory(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(product_id): Path<i64>,
) -> ApiResult<Vec<WarehouseStock>> {
    ok(inventory::product_inventory(&state.pool, caller.company_id(), product_id).await?)
}

async fn create_inventory(
    State(state): State<AppState>,
    caller: AuthUser,
    ApiJson(payload): ApiJson<CreateInventoryRequest>,
) -> Created<IdResponse> {
    let id = inventory::create(&state.pool, caller.company_id(), payload).await?;
    created(IdResponse { id })
}

async fn update_inventory(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<UpdateInventoryRequest>,
) -> ApiResult<()> {
    if !inventory::update(&state.pool, caller.company_id(), id, payload).await? {
        return Err(ApiError::not_found("inventory record"));
    }
    done("inventory updated")
}

async fn adjust_inventory(
    State(state): State<AppState>,
    caller: AuthUser,
    ApiJson(payload): ApiJson<AdjustInventoryRequest>,
) -> ApiResult<Inventory> {
    ok(inventory::adjust(&state.pool, caller.company_id(), payload).await?)
}

async fn list_low_stock(
    State(state): State<AppState>,
    caller: AuthUser,
) -> ApiResult<Vec<LowStockItem>> {
    ok(inventory::low_stock(&state.pool, caller.company_id()).await?)
}

async fn get_summary(
    State(state): State<AppState>,
    caller: AuthUser,
) -> ApiResult<InventorySummary> {
    ok(inventory::summary(&state.pool, caller.company_id()).await?)
}

async fn list_warehouses(
    State(state): State<AppState>,
    caller: AuthUser,
) -> ApiResult<Vec<Warehouse>> {
    ok(inventory::list_warehouses(&state.pool, caller.company_id()).await?)
}

async fn get_warehouse(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Warehouse> {
    let found = inventory::get_warehouse(&state.pool, caller.company_id(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("warehouse"))?;
    ok(found)
}

async fn create_warehouse(
    State(state): State<AppState>,
    caller: AuthUser,
    ApiJson(payload): ApiJson<CreateWarehouseRequest>,
) -> Created<IdResponse> {
    let id = inventory::create_warehouse(&state.pool, caller.company_id(), payload).await?;
    created(IdResponse { id })
}

async fn update_warehouse(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<UpdateWarehouseRequest>,
) -> ApiResult<()> {
    if !inventory::update_warehouse(&state.pool, caller.company_id(), id, payload).await? {
        return Err(ApiError::not_found("warehouse"));
    }
    done("warehouse updated")
}

async fn delete_warehouse(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    if !inventory::delete_warehouse(&state.pool, caller.company_id(), id).await? {
        return Err(ApiError::not_found("warehouse"));
    }
    done("warehouse deleted")
}
