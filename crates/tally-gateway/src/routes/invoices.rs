use axum::{
    Router,
    extract::{Path, Query, State},
    routing::{get, put},
};
use tally_core::{Invoice, InvoiceItem};
use tally_platform::{
    CreateInvoiceRequest, IdResponse, InvoiceItemRequest, InvoiceQuery, InvoiceWithItems,
    UpdateInvoiceItemRequest, UpdateInvoiceRequest, services::invoice,
};

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiJson, ApiResult, Created, created, done, ok};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/invoices", get(list_invoices).post(create_invoice))
        .route("/invoices/overdue", get(list_overdue))
        .route("/invoices/number/{number}", get(get_invoice_by_number))
        .route(
            "/invoices/{id}",
            get(get_invoice).put(update_invoice).delete(delete_invoice),
        )
        .route("/invoices/{id}/items", get(list_items).post(add_item))
        .route(
            "/invoices/items/{item_id}",
            put(update_item).delete(delete_item),
        )
}

async fn list_invoices(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<InvoiceQuery>,
) -> ApiResult<Vec<Invoice>> {
    ok(invoice::list(&state.pool, caller.company_id(), &query).await?)
}

async fn list_overdue(State(state): State<AppState>, caller: AuthUser) -> ApiResult<Vec<Invoice>> {
    ok(invoice::overdue(&state.pool, caller.company_id()).await?)
}

async fn get_invoice(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<InvoiceWithItems> {
    let found = invoice::get(&state.pool, caller.company_id(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("invoice"))?;
    ok(found)
}

async fn get_invoice_by_number(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(number): Path<String>,
) -> ApiResult<InvoiceWithItems> {
    let found = invoice::by_number(&state.pool, caller.company_id(), &number)
        .await?
        .ok_or_else(|| ApiError::not_found("invoice"))?;
    ok(found)
}

async fn create_invoice(
    State(state): State<AppState>,
    caller: AuthUser,
    ApiJson(payload): ApiJson<CreateInvoiceRequest>,
) -> Created<IdResponse> {
    let id = invoice::create(&state.pool, caller.company_id(), payload).await?;
    created(IdResponse { id })
}

async fn update_invoice(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<UpdateInvoiceRequest>,
) -> ApiResult<()> {
    if !invoice::update(&state.pool, caller.company_id(), id, payload).await? {
        return Err(ApiError::not_found("invoice"));
    }
    done("invoice updated")
}

async fn delete_invoice(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    if !invoice::delete(&state.pool, caller.company_id(), id).await? {
        return Err(ApiError::not_found("invoice"));
    }
    done("invoice deleted")
}

async fn list_items(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Vec<InvoiceItem>> {
    let items = invoice::items(&state.pool, caller.company_id(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("invoice"))?;
    ok(items)
}

async fn add_item(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<InvoiceItemRequest>,
) -> Created<IdResponse> {
    let item_id = invoice::add_item(&state.pool, caller.company_id(), id, payload).await?;
    created(IdResponse { id: item_id })
}

async fn update_item(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(item_id): Path<i64>,
    ApiJson(payload): ApiJson<UpdateInvoiceItemRequest>,
) -> ApiResult<()> {
    if !invoice::update_item(&state.pool, caller.company_id(), item_id, payload).await? {
        return Err(ApiError::not_found("invoice item"));
    }
    done("invoice item updated")
}

async fn delete_item(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(item_id): Path<i64>,
) -> ApiResult<()> {
    if !invoice::delete_item(&state.pool, caller.company_id(), item_id).await? {
        return Err(ApiError::not_found("invoice item"));
    }
    done("invoice item deleted")
}
