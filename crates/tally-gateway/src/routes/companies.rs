use axum::{
    Router,
    extract::{Path, State},
    routing::get,
};
use tally_core::Company;
use tally_platform::{CreateCompanyRequest, IdResponse, UpdateCompanyRequest, services::company};

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiJson, ApiResult, Created, created, done, ok};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/companies", get(list_companies).post(create_company))
        .route(
            "/companies/{id}",
            get(get_company).put(update_company).delete(delete_company),
        )
}

async fn list_companies(
    State(state): State<AppState>,
    caller: AuthUser,
) -> ApiResult<Vec<Company>> {
    ok(company::list(&state.pool, caller.company_id()).await?)
}

async fn get_company(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Company> {
    let found = company::get(&state.pool, caller.company_id(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("company"))?;
    ok(found)
}

async fn create_company(
    State(state): State<AppState>,
    caller: AuthUser,
    ApiJson(payload): ApiJson<CreateCompanyRequest>,
) -> Created<IdResponse> {
    caller.require_admin()?;
    let id = company::create(&state.pool, payload).await?;
    created(IdResponse { id })
}

async fn update_company(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<UpdateCompanyRequest>,
) -> ApiResult<()> {
    caller.require_admin()?;
    if !company::update(&state.pool, caller.company_id(), id, payload).await? {
        return Err(ApiError::not_found("company"));
    }
    done("company updated")
}

async fn delete_company(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    caller.require_admin()?;
    if !company::delete(&state.pool, caller.company_id(), id).await? {
        return Err(ApiError::not_found("company"));
    }
    done("company deleted")
}
