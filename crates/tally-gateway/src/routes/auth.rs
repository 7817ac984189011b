use axum::{Router, extract::State, routing::post};
use tally_platform::{
    AuthResponse, ChangePasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest,
    VerifyResponse,
};

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::error::{ApiJson, ApiResult, Created, created, done, ok};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/verify", post(verify))
        .route("/auth/change-password", post(change_password))
        .route("/auth/reset-password", post(reset_password))
}

async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> ApiResult<AuthResponse> {
    ok(state.auth.login(payload).await?)
}

async fn register(
    State(state): State<AppState>,
    sponsor: Option<AuthUser>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Created<AuthResponse> {
    let sponsor = sponsor.map(|AuthUser(user)| user);
    created(state.auth.register(payload, sponsor.as_ref()).await?)
}

async fn verify(AuthUser(user): AuthUser) -> ApiResult<VerifyResponse> {
    ok(VerifyResponse { user })
}

async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> ApiResult<()> {
    state.auth.change_password(&user, payload).await?;
    done("password changed")
}

async fn reset_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(payload): ApiJson<ResetPasswordRequest>,
) -> ApiResult<()> {
    state.auth.reset_password(&user, payload).await?;
    done("password reset")
}
