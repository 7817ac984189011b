use anyhow::anyhow;
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgRow};
use tally_core::{
    AccountFilter, AccountPatch, AccountType, ChartOfAccount, JournalEntry, JournalEntryLine,
    JournalEntrySummary, JournalEntryWithLines, LedgerError, LedgerStore, NewAccount,
    NewJournalEntry, NewJournalLine, PostingStatus,
};

use crate::contracts::{
    AccountQuery, CreateAccountRequest, CreateJournalEntryRequest, UpdateAccountRequest,
};
use crate::error::{ServiceError, ServiceResult, is_foreign_key_violation, is_unique_violation};
use crate::schema::{CHART_OF_ACCOUNTS, JOURNAL_ENTRIES, JOURNAL_ENTRY_LINES};
use crate::services::{UpdateSet, nullable_patch, optional_text, required_patch};

/// Postgres-backed chart of accounts and journal.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn storage(err: sqlx::Error) -> LedgerError {
    LedgerError::Storage(err.into())
}

fn account_from_row(row: &PgRow) -> Result<ChartOfAccount, LedgerError> {
    let raw_type: String = row.try_get("account_type").map_err(storage)?;
    let account_type = AccountType::parse(&raw_type).ok_or_else(|| {
        LedgerError::Storage(anyhow::anyhow!("unexpected account type {raw_type:?}"))
    })?;

    Ok(ChartOfAccount {
        id: row.try_get("id").map_err(storage)?,
        company_id: row.try_get("company_id").map_err(storage)?,
        account_code: row.try_get("account_code").map_err(storage)?,
        account_name: row.try_get("account_name").map_err(storage)?,
        account_type,
        account_category: row.try_get("account_category").map_err(storage)?,
        is_active: row.try_get("is_active").map_err(storage)?,
        description: row.try_get("description").map_err(storage)?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<JournalEntry, LedgerError> {
    let is_posted: bool = row.try_get("is_posted").map_err(storage)?;

    Ok(JournalEntry {
        id: row.try_get("id").map_err(storage)?,
        company_id: row.try_get("company_id").map_err(storage)?,
        entry_number: row.try_get("entry_number").map_err(storage)?,
        entry_date: row.try_get("entry_date").map_err(storage)?,
        description: row.try_get("description").map_err(storage)?,
        reference: row.try_get("reference").map_err(storage)?,
        posting: PostingStatus::from_flag(is_posted),
        created_by: row.try_get("created_by").map_err(storage)?,
        created_by_name: row.try_get("created_by_name").map_err(storage)?,
        created_at: row.try_get("created_at").map_err(storage)?,
        updated_at: row.try_get("updated_at").map_err(storage)?,
    })
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn list_accounts(
        &self,
        company_id: i64,
        filter: AccountFilter,
    ) -> Result<Vec<ChartOfAccount>, LedgerError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM chart_of_accounts
            WHERE company_id = $1
              AND ($2::text IS NULL OR account_type = $2)
              AND (NOT $3 OR is_active)
            ORDER BY account_code
            "#,
            CHART_OF_ACCOUNTS.select_list()
        );
        let rows = sqlx::query(&sql)
            .bind(company_id)
            .bind(filter.account_type.map(AccountType::as_str))
            .bind(filter.active_only)
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;

        rows.iter().map(account_from_row).collect()
    }

    async fn account_by_id(&self, id: i64) -> Result<Option<ChartOfAccount>, LedgerError> {
        let sql = format!(
            "SELECT {} FROM chart_of_accounts WHERE id = $1",
            CHART_OF_ACCOUNTS.select_list()
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn account_by_code(
        &self,
        company_id: i64,
        account_code: &str,
    ) -> Result<Option<ChartOfAccount>, LedgerError> {
        let sql = format!(
            "SELECT {} FROM chart_of_accounts WHERE company_id = $1 AND account_code = $2",
            CHART_OF_ACCOUNTS.select_list()
        );
        let row = sqlx::query(&sql)
            .bind(company_id)
            .bind(account_code)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn create_account(&self, account: NewAccount) -> Result<i64, LedgerError> {
        let row = sqlx::query(
            r#"
            INSERT INTO chart_of_accounts (
                company_id, account_code, account_name, account_type, account_category, is_active, description
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(account.company_id)
        .bind(&account.account_code)
        .bind(&account.account_name)
        .bind(account.account_type.as_str())
        .bind(&account.account_category)
        .bind(account.is_active)
        .bind(&account.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                LedgerError::DuplicateAccountCode(account.account_code.clone())
            } else {
                storage(err)
            }
        })?;

        row.try_get("id").map_err(storage)
    }

    async fn update_account(&self, id: i64, patch: AccountPatch) -> Result<bool, LedgerError> {
        let duplicate_code = patch.account_code.clone();

        let mut update = UpdateSet::new("chart_of_accounts");
        update
            .set_some("account_code", patch.account_code)
            .set_some("account_name", patch.account_name)
            .set_some(
                "account_type",
                patch.account_type.map(|account_type| account_type.as_str().to_string()),
            )
            .set_some("account_category", patch.account_category)
            .set_some("is_active", patch.is_active)
            .set_some(
                "description",
                patch
                    .description
                    .map(|description| (!description.is_empty()).then_some(description)),
            );
        let mut builder = update.into_where().map_err(|_| LedgerError::InvalidField {
            field: "body",
            reason: "must contain at least one field",
        })?;
        builder.push("id = ").push_bind(id);

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|err| match duplicate_code {
                Some(code) if is_unique_violation(&err) => LedgerError::DuplicateAccountCode(code),
                _ => storage(err),
            })?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_account(&self, id: i64) -> Result<bool, LedgerError> {
        let result = sqlx::query("DELETE FROM chart_of_accounts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|err| {
                if is_foreign_key_violation(&err) {
                    LedgerError::AccountInUse(id)
                } else {
                    storage(err)
                }
            })?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_journal_entry(&self, entry: &NewJournalEntry) -> Result<i64, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        // the creator must belong to the entry's company
        let row = sqlx::query(
            r#"
            INSERT INTO journal_entries (
                company_id, entry_number, entry_date, description, reference, is_posted, created_by
            )
            SELECT $1, $2, $3, $4, $5, $6, u.id
            FROM users u
            WHERE u.id = $7 AND u.company_id = $1
            RETURNING id
            "#,
        )
        .bind(entry.company_id)
        .bind(&entry.entry_number)
        .bind(entry.entry_date)
        .bind(&entry.description)
        .bind(&entry.reference)
        .bind(PostingStatus::Draft.as_flag())
        .bind(entry.created_by)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                LedgerError::DuplicateEntryNumber(entry.entry_number.clone())
            } else {
                storage(err)
            }
        })?
        .ok_or_else(|| {
            LedgerError::Storage(anyhow!(
                "user {} does not belong to company {}",
                entry.created_by,
                entry.company_id
            ))
        })?;
        let entry_id: i64 = row.try_get("id").map_err(storage)?;

        for line in &entry.lines {
            insert_line(&mut tx, entry.company_id, entry_id, line).await?;
        }

        tx.commit().await.map_err(storage)?;
        Ok(entry_id)
    }

    async fn mark_posted(&self, id: i64) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE journal_entries
            SET is_posted = $2, updated_at = NOW()
            WHERE id = $1 AND is_posted = $3
            "#,
        )
        .bind(id)
        .bind(PostingStatus::Posted.as_flag())
        .bind(PostingStatus::Draft.as_flag())
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_journal_entries(
        &self,
        company_id: i64,
    ) -> Result<Vec<JournalEntrySummary>, LedgerError> {
        let sql = format!(
            r#"
            SELECT
                {},
                u.first_name || ' ' || u.last_name AS created_by_name,
                COALESCE(SUM(l.debit_amount), 0) AS total_debit,
                COALESCE(SUM(l.credit_amount), 0) AS total_credit
            FROM journal_entries je
            JOIN users u ON u.id = je.created_by
            LEFT JOIN journal_entry_lines l ON l.journal_entry_id = je.id
            WHERE je.company_id = $1
            GROUP BY je.id, u.first_name, u.last_name
            ORDER BY je.entry_date DESC, je.id DESC
            "#,
            JOURNAL_ENTRIES.qualified("je")
        );
        let rows = sqlx::query(&sql)
            .bind(company_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            summaries.push(JournalEntrySummary {
                entry: entry_from_row(&row)?,
                total_debit: row.try_get::<Decimal, _>("total_debit").map_err(storage)?,
                total_credit: row.try_get::<Decimal, _>("total_credit").map_err(storage)?,
            });
        }

        Ok(summaries)
    }

    async fn journal_entry_with_lines(
        &self,
        id: i64,
    ) -> Result<Option<JournalEntryWithLines>, LedgerError> {
        let header_sql = format!(
            r#"
            SELECT {}, u.first_name || ' ' || u.last_name AS created_by_name
            FROM journal_entries je
            JOIN users u ON u.id = je.created_by
            WHERE je.id = $1
            "#,
            JOURNAL_ENTRIES.qualified("je")
        );
        let Some(header) = sqlx::query(&header_sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
        else {
            return Ok(None);
        };
        let entry = entry_from_row(&header)?;

        let lines_sql = format!(
            r#"
            SELECT {}, a.account_code, a.account_name
            FROM journal_entry_lines l
            JOIN chart_of_accounts a ON a.id = l.account_id
            WHERE l.journal_entry_id = $1
            ORDER BY l.id
            "#,
            JOURNAL_ENTRY_LINES.qualified("l")
        );
        let rows = sqlx::query(&lines_sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;

        let mut lines = Vec::with_capacity(rows.len());
        for row in rows {
            lines.push(JournalEntryLine {
                id: row.try_get("id").map_err(storage)?,
                journal_entry_id: row.try_get("journal_entry_id").map_err(storage)?,
                account_id: row.try_get("account_id").map_err(storage)?,
                account_code: row.try_get("account_code").map_err(storage)?,
                account_name: row.try_get("account_name").map_err(storage)?,
                description: row.try_get("description").map_err(storage)?,
                debit_amount: row.try_get("debit_amount").map_err(storage)?,
                credit_amount: row.try_get("credit_amount").map_err(storage)?,
            });
        }

        Ok(Some(JournalEntryWithLines { entry, lines }))
    }

    async fn delete_draft_entry(&self, id: i64) -> Result<bool, LedgerError> {
        let result = sqlx::query("DELETE FROM journal_entries WHERE id = $1 AND is_posted = $2")
            .bind(id)
            .bind(PostingStatus::Draft.as_flag())
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        Ok(result.rows_affected() > 0)
    }
}

/// Inserts one line, refusing accounts outside the entry's company. An early
/// return drops `tx`, which rolls the whole entry back.
async fn insert_line(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    company_id: i64,
    entry_id: i64,
    line: &NewJournalLine,
) -> Result<(), LedgerError> {
    let result = sqlx::query(
        r#"
        INSERT INTO journal_entry_lines (
            journal_entry_id, account_id, description, debit_amount, credit_amount
        )
        SELECT $1, a.id, $3, $4, $5
        FROM chart_of_accounts a
        WHERE a.id = $2 AND a.company_id = $6
        "#,
    )
    .bind(entry_id)
    .bind(line.account_id)
    .bind(&line.description)
    .bind(line.debit_amount)
    .bind(line.credit_amount)
    .bind(company_id)
    .execute(&mut **tx)
    .await
    .map_err(storage)?;

    if result.rows_affected() == 0 {
        return Err(LedgerError::AccountNotFound(line.account_id));
    }

    Ok(())
}

pub fn new_account(company_id: i64, request: CreateAccountRequest) -> ServiceResult<NewAccount> {
    let account_type = AccountType::parse(&request.account_type).ok_or_else(|| {
        ServiceError::invalid("accountType must be asset, liability, equity, revenue or expense")
    })?;

    Ok(NewAccount {
        company_id,
        account_code: request.account_code,
        account_name: request.account_name,
        account_type,
        account_category: optional_text(request.account_category).unwrap_or_default(),
        is_active: request.is_active.unwrap_or(true),
        description: optional_text(request.description),
    })
}

pub fn account_patch(request: UpdateAccountRequest) -> ServiceResult<AccountPatch> {
    let account_type = request
        .account_type
        .as_deref()
        .map(|value| {
            AccountType::parse(value).ok_or_else(|| {
                ServiceError::invalid(
                    "accountType must be asset, liability, equity, revenue or expense",
                )
            })
        })
        .transpose()?;

    Ok(AccountPatch {
        account_code: required_patch(request.account_code, "accountCode")?,
        account_name: required_patch(request.account_name, "accountName")?,
        account_type,
        account_category: request
            .account_category
            .map(|category| category.trim().to_string()),
        is_active: request.is_active,
        description: nullable_patch(request.description)
            .map(|description| description.unwrap_or_default()),
    })
}

pub fn account_filter(query: &AccountQuery) -> ServiceResult<AccountFilter> {
    let account_type = query
        .account_type
        .as_deref()
        .map(|value| {
            AccountType::parse(value)
                .ok_or_else(|| ServiceError::invalid(format!("unknown account type {value:?}")))
        })
        .transpose()?;

    Ok(AccountFilter {
        account_type,
        active_only: query.active.unwrap_or(false),
    })
}

pub fn new_journal_entry(
    company_id: i64,
    created_by: i64,
    request: CreateJournalEntryRequest,
) -> ServiceResult<NewJournalEntry> {
    let entry_date = request
        .entry_date
        .ok_or_else(|| ServiceError::invalid("entryDate is required"))?;

    Ok(NewJournalEntry {
        company_id,
        entry_number: request.entry_number,
        entry_date,
        description: request.description.trim().to_string(),
        reference: optional_text(request.reference),
        created_by,
        lines: request
            .lines
            .into_iter()
            .map(|line| NewJournalLine {
                account_id: line.account_id,
                description: optional_text(line.description),
                debit_amount: line.debit_amount,
                credit_amount: line.credit_amount,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::contracts::JournalLineRequest;

    #[test]
    fn journal_request_maps_to_new_entry() {
        let request = CreateJournalEntryRequest {
            entry_number: "JE-0100".to_string(),
            entry_date: NaiveDate::from_ymd_opt(2025, 5, 1),
            description: "  Rent for May ".to_string(),
            reference: Some(" ".to_string()),
            lines: vec![
                JournalLineRequest {
                    account_id: 9,
                    description: Some("Office rent".to_string()),
                    debit_amount: Decimal::new(5000, 0),
                    credit_amount: Decimal::ZERO,
                },
                JournalLineRequest {
                    account_id: 1,
                    description: None,
                    debit_amount: Decimal::ZERO,
                    credit_amount: Decimal::new(5000, 0),
                },
            ],
        };

        let entry = new_journal_entry(4, 17, request).unwrap();

        assert_eq!(entry.company_id, 4);
        assert_eq!(entry.created_by, 17);
        assert_eq!(entry.description, "Rent for May");
        assert_eq!(entry.reference, None);
        assert_eq!(entry.lines.len(), 2);
        assert_eq!(entry.lines[0].description.as_deref(), Some("Office rent"));
    }

    #[test]
    fn missing_entry_date_is_invalid() {
        let err = new_journal_entry(1, 1, CreateJournalEntryRequest::default()).unwrap_err();
        assert!(matches!(err, ServiceError::Invalid(message) if message.contains("entryDate")));
    }

    #[test]
    fn account_patch_turns_blank_description_into_clear() {
        let patch = account_patch(UpdateAccountRequest {
            description: Some("   ".to_string()),
            account_type: Some("Revenue".to_string()),
            ..UpdateAccountRequest::default()
        })
        .unwrap();

        assert_eq!(patch.description.as_deref(), Some(""));
        assert_eq!(patch.account_type, Some(AccountType::Revenue));
        assert!(account_patch(UpdateAccountRequest {
            account_name: Some(String::new()),
            ..UpdateAccountRequest::default()
        })
        .is_err());
    }

    #[test]
    fn account_filter_rejects_unknown_type() {
        let query = AccountQuery {
            account_type: Some("contra".to_string()),
            active: None,
        };
        assert!(account_filter(&query).is_err());

        let query = AccountQuery {
            account_type: Some("asset".to_string()),
            active: Some(true),
        };
        let filter = account_filter(&query).unwrap();
        assert_eq!(filter.account_type, Some(AccountType::Asset));
        assert!(filter.active_only);
    }
}
