use axum::{
    Router,
    extract::{Path, State},
    routing::get,
};
use tally_core::User;
use tally_platform::{CreateUserRequest, IdResponse, UpdateUserRequest, services::user};

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiJson, ApiResult, Created, created, done, ok};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
}

async fn list_users(State(state): State<AppState>, caller: AuthUser) -> ApiResult<Vec<User>> {
    ok(user::list(&state.pool, caller.company_id()).await?)
}

async fn get_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<User> {
    let found = user::get(&state.pool, caller.company_id(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("user"))?;
    ok(found)
}

async fn create_user(
    State(state): State<AppState>,
    caller: AuthUser,
    ApiJson(payload): ApiJson<CreateUserRequest>,
) -> Created<IdResponse> {
    caller.require_admin()?;
    let id = user::create(&state.pool, caller.company_id(), payload).await?;
    created(IdResponse { id })
}

async fn update_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<UpdateUserRequest>,
) -> ApiResult<()> {
    caller.require_admin()?;
    if !user::update(&state.pool, caller.company_id(), id, payload).await? {
        return Err(ApiError::not_found("user"));
    }
    done("user updated")
}

async fn delete_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    caller.require_admin()?;
    if caller.0.id == id {
        return Err(ApiError::bad_request("users cannot delete themselves"));
    }
    if !user::delete(&state.pool, caller.company_id(), id).await? {
        return Err(ApiError::not_found("user"));
    }
    done("user deleted")
}
