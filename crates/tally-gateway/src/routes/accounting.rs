use axum::{
    Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use tally_core::{ChartOfAccount, JournalEntrySummary, JournalEntryWithLines};
use tally_platform::{
    AccountQuery, CreateAccountRequest, CreateJournalEntryRequest, IdResponse,
    UpdateAccountRequest, services::ledger,
};

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiJson, ApiResult, Created, created, done, ok};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/accounting/accounts",
            get(list_accounts).post(create_account),
        )
        .route("/accounting/accounts/code/{code}", get(get_account_by_code))
        .route(
            "/accounting/accounts/{id}",
            get(get_account).put(update_account).delete(delete_account),
        )
        .route(
            "/accounting/journal-entries",
            get(list_journal_entries).post(create_journal_entry),
        )
        .route(
            "/accounting/journal-entries/{id}",
            get(get_journal_entry).delete(delete_journal_entry),
        )
        .route(
            "/accounting/journal-entries/{id}/post",
            post(post_journal_entry),
        )
}

async fn list_accounts(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<AccountQuery>,
) -> ApiResult<Vec<ChartOfAccount>> {
    let filter = ledger::account_filter(&query)?;
    ok(state.ledger.accounts(caller.company_id(), filter).await?)
}

async fn get_account(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<ChartOfAccount> {
    let account = state
        .ledger
        .account(caller.company_id(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("account"))?;
    ok(account)
}

async fn get_account_by_code(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(code): Path<String>,
) -> ApiResult<ChartOfAccount> {
    let account = state
        .ledger
        .account_by_code(caller.company_id(), &code)
        .await?
        .ok_or_else(|| ApiError::not_found("account"))?;
    ok(account)
}

async fn create_account(
    State(state): State<AppState>,
    caller: AuthUser,
    ApiJson(payload): ApiJson<CreateAccountRequest>,
) -> Created<IdResponse> {
    let account = ledger::new_account(caller.company_id(), payload)?;
    let id = state.ledger.create_account(account).await?;
    created(IdResponse { id })
}

async fn update_account(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<UpdateAccountRequest>,
) -> ApiResult<()> {
    let patch = ledger::account_patch(payload)?;
    if !state
        .ledger
        .update_account(caller.company_id(), id, patch)
        .await?
    {
        return Err(ApiError::not_found("account"));
    }
    done("account updated")
}

async fn delete_account(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    if !state.ledger.delete_account(caller.company_id(), id).await? {
        return Err(ApiError::not_found("account"));
    }
    done("account deleted")
}

async fn list_journal_entries(
    State(state): State<AppState>,
    caller: AuthUser,
) -> ApiResult<Vec<JournalEntrySummary>> {
    ok(state.ledger.journal_entries(caller.company_id()).await?)
}

async fn get_journal_entry(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<JournalEntryWithLines> {
    let entry = state
        .ledger
        .journal_entry(caller.company_id(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("journal entry"))?;
    ok(entry)
}

async fn create_journal_entry(
    State(state): State<AppState>,
    caller: AuthUser,
    ApiJson(payload): ApiJson<CreateJournalEntryRequest>,
) -> Created<IdResponse> {
    let entry = ledger::new_journal_entry(caller.company_id(), caller.0.id, payload)?;
    let id = state.ledger.create_journal_entry(entry).await?;
    created(IdResponse { id })
}

async fn post_journal_entry(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<JournalEntryWithLines> {
    ok(state
        .ledger
        .post_journal_entry(caller.company_id(), id)
        .await?)
}

async fn delete_journal_entry(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    state
        .ledger
        .delete_journal_entry(caller.company_id(), id)
        .await?;
    done("journal entry deleted")
}
