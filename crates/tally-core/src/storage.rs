use async_trait::async_trait;

use crate::error::LedgerError;
use crate::ledger::{
    AccountFilter, AccountPatch, ChartOfAccount, JournalEntrySummary, JournalEntryWithLines,
    NewAccount, NewJournalEntry,
};

/// Persistence for the chart of accounts and journal entries.
///
/// Implementations must make `insert_journal_entry` all-or-nothing: either the
/// header and every line become visible, or none of them do. Balance checks
/// belong to the caller; a store only enforces referential rules (a line's
/// account must exist within the entry's company).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn list_accounts(
        &self,
        company_id: i64,
        filter: AccountFilter,
    ) -> Result<Vec<ChartOfAccount>, LedgerError>;

    async fn account_by_id(&self, id: i64) -> Result<Option<ChartOfAccount>, LedgerError>;

    async fn account_by_code(
        &self,
        company_id: i64,
        account_code: &str,
    ) -> Result<Option<ChartOfAccount>, LedgerError>;

    async fn create_account(&self, account: NewAccount) -> Result<i64, LedgerError>;

    /// Returns `false` when no account with `id` exists.
    async fn update_account(&self, id: i64, patch: AccountPatch) -> Result<bool, LedgerError>;

    async fn delete_account(&self, id: i64) -> Result<bool, LedgerError>;

    async fn insert_journal_entry(&self, entry: &NewJournalEntry) -> Result<i64, LedgerError>;

    /// Flips an unposted entry to posted. Returns `false` when the entry does
    /// not exist or is already posted.
    async fn mark_posted(&self, id: i64) -> Result<bool, LedgerError>;

    /// Ordered by entry date descending, then id descending.
    async fn list_journal_entries(
        &self,
        company_id: i64,
    ) -> Result<Vec<JournalEntrySummary>, LedgerError>;

    async fn journal_entry_with_lines(
        &self,
        id: i64,
    ) -> Result<Option<JournalEntryWithLines>, LedgerError>;

    /// Removes an unposted entry and its lines. Returns `false` when the entry
    /// does not exist or is posted.
    async fn delete_draft_entry(&self, id: i64) -> Result<bool, LedgerError>;
}
