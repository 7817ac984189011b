use axum::{
    Router,
    extract::{Path, Query, State},
    routing::get,
};
use tally_core::Product;
use tally_platform::{
    CreateProductRequest, IdResponse, ProductQuery, UpdateProductRequest, services::product,
};

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiJson, ApiResult, Created, created, done, ok};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/code/{code}", get(get_product_by_code))
        .route(
            "/products/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
}

async fn list_products(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<ProductQuery>,
) -> ApiResult<Vec<Product>> {
    ok(product::list(&state.pool, caller.company_id(), &query).await?)
}

async fn get_product(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Product> {
    let found = product::get(&state.pool, caller.company_id(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("product"))?;
    ok(found)
}

async fn get_product_by_code(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(code): Path<String>,
) -> ApiResult<Product> {
    let found = product::by_code(&state.pool, caller.company_id(), &code)
        .await?
        .ok_or_else(|| ApiError::not_found("product"))?;
    ok(found)
}

async fn create_product(
    State(state): State<AppState>,
    caller: AuthUser,
    ApiJson(payload): ApiJson<CreateProductRequest>,
) -> Created<IdResponse> {
    let id = product::create(&state.pool, caller.company_id(), payload).await?;
    created(IdResponse { id })
}

async fn update_product(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<UpdateProductRequest>,
) -> ApiResult<()> {
    if !product::update(&state.pool, caller.company_id(), id, payload).await? {
        return Err(ApiError::not_found("product"));
    }
    done("product updated")
}

async fn delete_product(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    if !product::delete(&state.pool, caller.company_id(), id).await? {
        return Err(ApiError::not_found("product"));
    }
    done("product deleted")
}
